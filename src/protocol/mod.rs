pub mod conversation;
pub mod destination;
pub mod source;

pub use conversation::{
    extract_backend_request, parse_chat_request, BackendRequest, ChatRequest,
    ConversationMessage, Role,
};
pub use destination::{push_assistant_frame, DestinationMessage};
pub use source::{parse_source_payload, SourceParseError, SourcePayload, SourceResponse};
