//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, ChatBackend, ChatEvent, ChatFile, ChatRequest, ChatTurn, ClientConfig,
    ClientError, DifyClient, MessageEndEvent, MessageEvent, StreamError, StreamHandler,
    StreamProcessor, TurnDelta, TurnOutcome, decode_stream_content,
};
