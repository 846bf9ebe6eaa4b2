pub mod relay;
pub mod sse;
pub mod transcoder;

pub use relay::{run_relay, spawn_relay, RelayBodyStream, RelayOutcome, RELAY_CHANNEL_CAPACITY};
pub use sse::{FrameSplitter, SseDemultiplexer, Utf8StreamDecoder, FRAME_SEPARATOR};
pub use transcoder::{
    EventTranscoder, FrameOutcome, MessageIdSource, PassThroughReason, TranscodeStats,
    UuidMessageIds,
};
