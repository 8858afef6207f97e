use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::ChatRequest;
use crate::client::{ByteStream, DifyClient};
use crate::content::decode_stream_content;
use crate::errors::{ClientError, StreamError};
use crate::processor::{AbortSignal, StreamHandler, StreamProcessor};
use crate::stream::{MessageEndEvent, MessageEvent, Usage};

/// Backend operations a chat turn needs.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends the query and returns the raw event stream.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ClientError>;

    /// Asks the backend to stop generating for `task_id`.
    async fn stop(&self, task_id: &str, user: &str) -> Result<(), ClientError>;
}

#[async_trait::async_trait]
impl ChatBackend for DifyClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ClientError> {
        self.send_chat_message(request).await
    }

    async fn stop(&self, task_id: &str, user: &str) -> Result<(), ClientError> {
        self.stop_response(task_id, user).await
    }
}

/// Decoded answer fragment handed to the delta observer.
#[derive(Clone, Copy, Debug)]
pub struct TurnDelta<'a> {
    pub text: &'a str,
    pub conversation_id: &'a str,
    pub task_id: &'a str,
}

/// Result of one chat exchange.
///
/// A turn interrupted mid-stream still returns the answer received so far,
/// with the cause in `interruption`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurnOutcome {
    pub conversation_id: String,
    pub message_id: String,
    pub task_id: String,
    pub answer: String,
    pub usage: Option<Usage>,
    /// `message_end` was received.
    pub completed: bool,
    pub interruption: Option<StreamError>,
}

impl TurnOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.interruption, Some(StreamError::Cancelled))
    }
}

/// One query/answer exchange with a chat backend.
pub struct ChatTurn {
    backend: Arc<dyn ChatBackend>,
    request: ChatRequest,
    abort: Option<AbortSignal>,
}

impl ChatTurn {
    pub fn new(backend: Arc<dyn ChatBackend>, request: ChatRequest) -> Self {
        Self {
            backend,
            request,
            abort: None,
        }
    }

    /// Makes the turn cancellable. On cancellation the backend is asked to
    /// stop the task if its id is already known.
    pub fn with_abort(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }

    /// Sends the request and streams the answer, calling `on_delta` with each
    /// decoded fragment as it arrives.
    ///
    /// Errors before the stream opens are returned as `Err`; failures during
    /// the stream are recorded in [`TurnOutcome::interruption`].
    pub async fn run<F>(self, on_delta: F) -> Result<TurnOutcome, ClientError>
    where
        F: FnMut(TurnDelta<'_>),
    {
        let cancelled = || TurnOutcome {
            conversation_id: self.request.conversation_id.clone().unwrap_or_default(),
            interruption: Some(StreamError::Cancelled),
            ..TurnOutcome::default()
        };
        if self.abort.as_ref().is_some_and(AbortSignal::is_aborted) {
            return Ok(cancelled());
        }

        let opening = self.backend.open_stream(&self.request);
        let body = match self.abort.clone() {
            Some(mut signal) => tokio::select! {
                biased;
                () = signal.aborted() => {
                    debug!("chat turn cancelled while opening the stream");
                    return Ok(cancelled());
                }
                body = opening => body?,
            },
            None => opening.await?,
        };
        let mut accumulator = TurnAccumulator {
            outcome: TurnOutcome {
                conversation_id: self.request.conversation_id.clone().unwrap_or_default(),
                ..TurnOutcome::default()
            },
            on_delta,
        };

        let mut processor = StreamProcessor::new();
        if let Some(signal) = self.abort.clone() {
            processor = processor.with_abort(signal);
        }
        let result = processor.process(Some(body), &mut accumulator).await;
        let mut outcome = accumulator.outcome;
        if let Err(err) = result {
            outcome.interruption = Some(err);
        }

        if outcome.is_cancelled() && !outcome.task_id.is_empty() {
            debug!(task_id = %outcome.task_id, "requesting server-side stop");
            if let Err(e) = self.backend.stop(&outcome.task_id, &self.request.user).await {
                warn!(task_id = %outcome.task_id, error = %e, "stop request failed");
            }
        }
        Ok(outcome)
    }
}

struct TurnAccumulator<F> {
    outcome: TurnOutcome,
    on_delta: F,
}

impl<F> StreamHandler for TurnAccumulator<F>
where
    F: FnMut(TurnDelta<'_>),
{
    fn on_message(&mut self, event: MessageEvent) {
        if !event.conversation_id.is_empty() {
            self.outcome.conversation_id = event.conversation_id;
        }
        if !event.message_id.is_empty() {
            self.outcome.message_id = event.message_id;
        }
        if !event.task_id.is_empty() {
            self.outcome.task_id = event.task_id;
        }
        let text = decode_stream_content(&event.answer);
        if text.is_empty() {
            return;
        }
        self.outcome.answer.push_str(&text);
        (self.on_delta)(TurnDelta {
            text: &text,
            conversation_id: &self.outcome.conversation_id,
            task_id: &self.outcome.task_id,
        });
    }

    fn on_complete(&mut self, event: MessageEndEvent) {
        let message_id = event.final_message_id().to_string();
        if !message_id.is_empty() {
            self.outcome.message_id = message_id;
        }
        if !event.conversation_id.is_empty() {
            self.outcome.conversation_id = event.conversation_id.clone();
        }
        if !event.task_id.is_empty() {
            self.outcome.task_id = event.task_id.clone();
        }
        self.outcome.usage = event.usage().cloned();
        self.outcome.completed = true;
    }

    fn on_error(&mut self, error: &StreamError) {
        debug!(error = %error, answer_len = self.outcome.answer.len(), "chat turn interrupted");
    }
}
