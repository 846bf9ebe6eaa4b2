mod backend_client;

pub use backend_client::{backend_stream_url, BackendClient};
