//! Streaming client for Dify chat apps.
//!
//! The core is the stream processor: it reassembles the `data: {json}`
//! event stream of `POST /chat-messages` from arbitrarily split byte chunks
//! and routes each record to a [`StreamHandler`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dify_chat_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = DifyClient::new(ClientConfig::new("https://api.dify.ai/v1", "app-..."))?;
//! let outcome = ChatTurn::new(Arc::new(client), ChatRequest::new("Say hello", "user-1"))
//!     .run(|delta| print!("{}", delta.text))
//!     .await?;
//!
//! println!("\n[conversation {}]", outcome.conversation_id);
//! # Ok(())
//! # }
//! ```

/// Dify API request and response bodies.
pub mod api;
/// HTTP client.
pub mod client;
/// Client configuration.
pub mod config;
/// Unicode-escape decoding of answer text.
pub mod content;
/// Error types.
pub mod errors;
/// Stream session driver, handler contract and cancellation.
pub mod processor;
/// Prelude for typical usage.
pub mod prelude;
/// Decoded stream records.
pub mod stream;
/// Frame decoding and chunk reassembly.
pub mod transport;
/// Single query/answer exchange built on the processor.
pub mod turn;

pub use api::{AppParameters, ChatFile, ChatRequest, Page, RemoteConversation, RemoteMessage, UploadedFile};
pub use client::{ByteStream, DifyClient};
pub use config::ClientConfig;
pub use content::decode_stream_content;
pub use errors::{ClientError, StreamError};
pub use processor::{
    AbortHandle, AbortSignal, Callbacks, StreamHandler, StreamProcessor, event_stream, process,
};
pub use stream::{ChatEvent, ErrorEvent, MessageEndEvent, MessageEvent, StreamRecord, Usage};
pub use transport::{StreamReassembler, decode_frame};
pub use turn::{ChatBackend, ChatTurn, TurnDelta, TurnOutcome};
