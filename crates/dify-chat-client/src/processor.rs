use std::collections::VecDeque;
use std::fmt;

use futures::{Stream, StreamExt as _, stream};
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::errors::StreamError;
use crate::stream::{ChatEvent, MessageEndEvent, MessageEvent, StreamRecord};
use crate::transport::StreamReassembler;

/// Receives the outcome of a stream session.
///
/// `on_message` is called once per `message` record in arrival order,
/// `on_complete` once per `message_end` record and `on_error` at most once,
/// for the fatal condition that ends the session.
pub trait StreamHandler {
    fn on_message(&mut self, event: MessageEvent);
    fn on_complete(&mut self, event: MessageEndEvent);
    fn on_error(&mut self, error: &StreamError);
}

/// [`StreamHandler`] built from three closures.
pub struct Callbacks<M, C, E> {
    on_message: M,
    on_complete: C,
    on_error: E,
}

impl<M, C, E> Callbacks<M, C, E>
where
    M: FnMut(MessageEvent),
    C: FnMut(MessageEndEvent),
    E: FnMut(&StreamError),
{
    pub fn new(on_message: M, on_complete: C, on_error: E) -> Self {
        Self {
            on_message,
            on_complete,
            on_error,
        }
    }
}

impl<M, C, E> StreamHandler for Callbacks<M, C, E>
where
    M: FnMut(MessageEvent),
    C: FnMut(MessageEndEvent),
    E: FnMut(&StreamError),
{
    fn on_message(&mut self, event: MessageEvent) {
        (self.on_message)(event);
    }

    fn on_complete(&mut self, event: MessageEndEvent) {
        (self.on_complete)(event);
    }

    fn on_error(&mut self, error: &StreamError) {
        (self.on_error)(error);
    }
}

/// Handle used to request cancellation of a stream session.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

/// Receiving side of an [`AbortHandle`], given to the processor.
#[derive(Clone, Debug)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortHandle {
    /// Creates a linked handle/signal pair.
    pub fn new() -> (Self, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, AbortSignal { rx })
    }

    /// Requests cancellation. The session observes it before its next read
    /// or while waiting on one, and ends with `StreamError::Cancelled`.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    pub(crate) async fn aborted(&mut self) {
        if self.rx.wait_for(|aborted| *aborted).await.is_err() {
            // handle dropped without aborting
            std::future::pending::<()>().await;
        }
    }
}

/// Drives one stream session from a pull-based byte source to a
/// [`StreamHandler`].
#[derive(Clone, Debug, Default)]
pub struct StreamProcessor {
    abort: Option<AbortSignal>,
}

impl StreamProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the session cancellable through `signal`.
    pub fn with_abort(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }

    /// Consumes `source` until it ends, an `error` record arrives, a read
    /// fails or the session is aborted.
    ///
    /// A new chunk is only pulled after every record of the previous one has
    /// been handed to `handler`. Fatal conditions are reported to
    /// `handler.on_error` exactly once and returned as `Err`.
    pub async fn process<S, B, E, H>(
        &self,
        source: Option<S>,
        handler: &mut H,
    ) -> Result<(), StreamError>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: fmt::Display,
        H: StreamHandler + ?Sized,
    {
        let Some(mut source) = source else {
            return fail(handler, StreamError::MissingSource);
        };
        let mut abort = self.abort.clone();
        let mut reassembler = StreamReassembler::new();
        let mut chunks = 0_u64;

        loop {
            if abort.as_ref().is_some_and(AbortSignal::is_aborted) {
                return fail(handler, StreamError::Cancelled);
            }
            let next = match abort.as_mut() {
                Some(signal) => tokio::select! {
                    biased;
                    () = signal.aborted() => return fail(handler, StreamError::Cancelled),
                    next = source.next() => next,
                },
                None => source.next().await,
            };

            match next {
                Some(Ok(chunk)) => {
                    chunks = chunks.saturating_add(1);
                    trace!(seq = chunks, len = chunk.as_ref().len(), "stream chunk");
                    for record in reassembler.push_chunk(chunk.as_ref()) {
                        dispatch(record, handler)?;
                    }
                }
                Some(Err(e)) => {
                    return fail(handler, StreamError::transport(format!("stream read failed: {e}")));
                }
                None => {
                    if let Some(record) = reassembler.finish() {
                        dispatch(record, handler)?;
                    }
                    debug!(chunks, "stream ended");
                    return Ok(());
                }
            }
        }
    }
}

/// Processes `source` with a non-cancellable [`StreamProcessor`].
pub async fn process<S, B, E, H>(source: Option<S>, handler: &mut H) -> Result<(), StreamError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: fmt::Display,
    H: StreamHandler + ?Sized,
{
    StreamProcessor::new().process(source, handler).await
}

fn dispatch<H>(record: StreamRecord, handler: &mut H) -> Result<(), StreamError>
where
    H: StreamHandler + ?Sized,
{
    match record {
        StreamRecord::MessageEnd(event) => handler.on_complete(event),
        StreamRecord::Message(event) => handler.on_message(event),
        StreamRecord::Error(event) => return fail(handler, StreamError::ErrorEvent(event)),
        StreamRecord::Unknown => trace!("ignoring record with unhandled event"),
    }
    Ok(())
}

fn fail<H>(handler: &mut H, error: StreamError) -> Result<(), StreamError>
where
    H: StreamHandler + ?Sized,
{
    debug!(error = %error, "stream session failed");
    handler.on_error(&error);
    Err(error)
}

/// Lazy form of [`process`]: yields `message` and `message_end` records as
/// they are reassembled.
///
/// The stream ends after the source is exhausted, or right after yielding
/// the first `Err` (read failure or `error` record).
pub fn event_stream<S, B, E>(source: S) -> impl Stream<Item = Result<ChatEvent, StreamError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    struct State<S> {
        source: S,
        reassembler: StreamReassembler,
        pending: VecDeque<StreamRecord>,
        done: bool,
    }

    stream::try_unfold(
        State {
            source,
            reassembler: StreamReassembler::new(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                while let Some(record) = state.pending.pop_front() {
                    match record {
                        StreamRecord::Message(event) => {
                            return Ok(Some((ChatEvent::Message(event), state)));
                        }
                        StreamRecord::MessageEnd(event) => {
                            return Ok(Some((ChatEvent::MessageEnd(event), state)));
                        }
                        StreamRecord::Error(event) => return Err(StreamError::ErrorEvent(event)),
                        StreamRecord::Unknown => {}
                    }
                }
                if state.done {
                    return Ok(None);
                }

                match state.source.next().await {
                    Some(Ok(chunk)) => {
                        let records = state.reassembler.push_chunk(chunk.as_ref());
                        state.pending.extend(records);
                    }
                    Some(Err(e)) => {
                        return Err(StreamError::transport(format!("stream read failed: {e}")));
                    }
                    None => {
                        state.done = true;
                        state.pending.extend(state.reassembler.finish());
                    }
                }
            }
        },
    )
}
