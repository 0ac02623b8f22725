//! Conversation Engine: owns the per-mode conversation state, drives one-shot
//! and streaming completions against a [`ModelClient`], and publishes stream
//! events on a bounded result channel.
//!
//! One driver call (one-shot or streaming) runs at a time per engine, while
//! other tasks may concurrently call [`Engine::interrupt`], switch modes or
//! read state. The state lock is never held across an `.await`.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::client::{ChunkStream, CompletionRequest, ModelClient};
use crate::core::error::{ClientError, EngineError};
use crate::core::message::Message;
use crate::core::mode::Mode;
use crate::core::normalizer::{is_streamed_text_executable, parse_exec_output, ExecResult};
use crate::core::prompt::PromptContext;
use crate::core::state::ConversationState;

#[cfg(test)]
mod tests;

/// Overall budget of a one-shot request, retries included.
pub const ONE_SHOT_DEADLINE: Duration = Duration::from_secs(30);
/// Overall budget of a streaming request.
pub const STREAM_DEADLINE: Duration = Duration::from_secs(60);
/// Attempts made for a one-shot request before giving up.
pub const MAX_ATTEMPTS: u32 = 3;
/// Backoff after attempt `n` is `n * RETRY_BACKOFF_STEP`.
pub const RETRY_BACKOFF_STEP: Duration = Duration::from_secs(1);
/// How long `interrupt` waits for room on the result channel.
pub const INTERRUPT_SEND_WINDOW: Duration = Duration::from_millis(100);
/// Capacity of the result channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 10;

/// Event published on the result channel during a streaming session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental reply text, in provider order.
    Delta(String),
    /// The stream ended normally. Exactly one per successful session.
    Final { executable: bool },
    /// The stream failed; never followed by `Final`.
    Error(String),
    /// The session was interrupted by the caller.
    Interrupt,
}

impl StreamEvent {
    /// Whether the consumer should stop reading for the current session.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Delta(_))
    }
}

/// How a streaming loop ended when it did not fail.
#[derive(Debug, PartialEq, Eq)]
enum StreamOutcome {
    Completed(String),
    Interrupted(String),
}

/// An operation in flight: the running flag stays set until this is dropped.
struct Operation<'a> {
    engine: &'a Engine,
    id: u64,
    cancel: CancellationToken,
    mode: Mode,
    request: CompletionRequest,
}

impl Drop for Operation<'_> {
    fn drop(&mut self) {
        self.engine.write_state().stop_operation(self.id);
    }
}

pub struct Engine {
    client: Arc<dyn ModelClient>,
    state: RwLock<ConversationState>,
    events: mpsc::Sender<StreamEvent>,
    closed: CancellationToken,
}

impl Engine {
    /// Create an engine and the receiving end of its result channel.
    pub fn new(
        client: Arc<dyn ModelClient>,
        mode: Mode,
        prompt_context: PromptContext,
    ) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let engine = Self {
            client,
            state: RwLock::new(ConversationState::new(mode, prompt_context)),
            events,
            closed: CancellationToken::new(),
        };
        (engine, rx)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ConversationState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ConversationState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> Mode {
        self.read_state().mode()
    }

    pub fn is_running(&self) -> bool {
        self.read_state().is_running()
    }

    pub fn system_instruction(&self) -> String {
        self.read_state().system_instruction().to_string()
    }

    pub fn pipe_context(&self) -> Option<String> {
        self.read_state().pipe_context().map(str::to_string)
    }

    /// Snapshot of the stored history for `mode`.
    pub fn history(&self, mode: Mode) -> Vec<Message> {
        self.read_state().history(mode).to_vec()
    }

    pub fn set_mode(&self, mode: Mode) {
        self.write_state().set_mode(mode);
    }

    pub fn set_pipe_context(&self, pipe: impl Into<String>) {
        self.write_state().set_pipe_context(pipe);
    }

    pub fn clear_active(&self) {
        self.write_state().clear_active();
    }

    pub fn reset_all(&self) {
        self.write_state().reset_all();
    }

    /// Close the model connection. In-flight requests fail and later ones
    /// are rejected with [`EngineError::Closed`].
    pub fn close(&self) {
        self.closed.cancel();
        self.client.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Stop the operation in flight, if any.
    ///
    /// Pushes [`StreamEvent::Interrupt`] when the channel has room within
    /// [`INTERRUPT_SEND_WINDOW`], then cancels the operation that was running
    /// when called. An operation started after that one is left alone.
    /// Returns whether an operation was running.
    pub async fn interrupt(&self) -> bool {
        let Some((id, token)) = self.read_state().current_operation() else {
            return false;
        };

        let _ = timeout(INTERRUPT_SEND_WINDOW, self.events.send(StreamEvent::Interrupt)).await;

        token.cancel();
        self.write_state().stop_operation(id);
        true
    }

    fn begin(&self, input: &str, budget: Duration) -> Result<Operation<'_>, EngineError> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }

        let cancel = CancellationToken::new();
        let deadline = Instant::now() + budget;
        let mut state = self.write_state();
        let id = state.begin_operation(cancel.clone());
        state.refresh_system_instruction();
        state.append_user(input);

        let request = CompletionRequest {
            system_instruction: state.system_instruction().to_string(),
            history: state.outgoing_history(),
            message: input.to_string(),
            deadline,
        };
        let mode = state.mode();
        drop(state);

        Ok(Operation {
            engine: self,
            id,
            cancel,
            mode,
            request,
        })
    }

    /// Exec-style completion: one request with retries, normalized into an
    /// [`ExecResult`]. The raw reply text is what gets stored in history.
    pub async fn run_one_shot(&self, input: &str) -> Result<ExecResult, EngineError> {
        let operation = self.begin(input, ONE_SHOT_DEADLINE)?;

        let text = generate_with_retry(self.client.as_ref(), &operation.request).await?;
        if text.is_empty() {
            return Err(EngineError::EmptyResponse);
        }

        let result = parse_exec_output(&text);
        self.write_state()
            .append_to(operation.mode, Message::assistant(text));
        Ok(result)
    }

    /// Streaming completion. Events are published on the result channel; the
    /// return value only reports success or failure.
    pub async fn run_streaming(&self, input: &str) -> Result<(), EngineError> {
        let operation = self.begin(input, STREAM_DEADLINE)?;
        let deadline = operation.request.deadline;

        let opened = timeout_at(
            deadline,
            self.client.generate_stream(operation.request.clone()),
        )
        .await
        .map_err(|_| EngineError::DeadlineExceeded)?;

        let chunks = match opened {
            Ok(chunks) => chunks,
            Err(err) => {
                let _ = deliver(&self.events, StreamEvent::Error(err.to_string()), deadline).await;
                return Err(stream_failure(err));
            }
        };

        match drive_stream(chunks, &self.events, &operation.cancel, deadline).await? {
            StreamOutcome::Completed(text) => {
                let executable = operation.mode == Mode::Exec && is_streamed_text_executable(&text);
                deliver(&self.events, StreamEvent::Final { executable }, deadline).await?;
                self.write_state()
                    .append_to(operation.mode, Message::assistant(text));
            }
            StreamOutcome::Interrupted(text) => {
                self.write_state()
                    .append_to(operation.mode, Message::assistant(text));
            }
        }

        Ok(())
    }
}

fn stream_failure(err: ClientError) -> EngineError {
    match err {
        ClientError::Closed => EngineError::Closed,
        other => EngineError::Stream(other),
    }
}

/// Send one request, retrying transport failures with linear backoff until
/// [`MAX_ATTEMPTS`] is reached or the deadline passes.
async fn generate_with_retry(
    client: &dyn ModelClient,
    request: &CompletionRequest,
) -> Result<String, EngineError> {
    let deadline = request.deadline;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match timeout_at(deadline, client.generate(request.clone())).await {
            Err(_) => return Err(EngineError::DeadlineExceeded),
            Ok(Ok(text)) => return Ok(text),
            Ok(Err(ClientError::Closed)) => return Err(EngineError::Closed),
            Ok(Err(err)) => err,
        };

        if attempt >= MAX_ATTEMPTS {
            return Err(EngineError::Request {
                attempts: attempt,
                source: err,
            });
        }

        let resume_at = (Instant::now() + RETRY_BACKOFF_STEP * attempt).min(deadline);
        sleep_until(resume_at).await;
    }
}

/// Publish `event`, racing the send against `deadline`.
async fn deliver(
    events: &mpsc::Sender<StreamEvent>,
    event: StreamEvent,
    deadline: Instant,
) -> Result<(), EngineError> {
    match timeout_at(deadline, events.send(event)).await {
        Err(_) => Err(EngineError::DeadlineExceeded),
        Ok(Err(_)) => Err(EngineError::ChannelClosed),
        Ok(Ok(())) => Ok(()),
    }
}

/// Forward chunks as `Delta` events until the stream ends, fails, is
/// cancelled, or the deadline passes. Only reads its arguments; the caller
/// decides what to do with the accumulated text.
async fn drive_stream(
    mut chunks: ChunkStream,
    events: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    deadline: Instant,
) -> Result<StreamOutcome, EngineError> {
    let mut buffer = String::new();

    loop {
        if cancel.is_cancelled() {
            return Ok(StreamOutcome::Interrupted(buffer));
        }

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamOutcome::Interrupted(buffer)),
            _ = sleep_until(deadline) => return Err(EngineError::DeadlineExceeded),
            next = chunks.next() => next,
        };

        match next {
            None => return Ok(StreamOutcome::Completed(buffer)),
            Some(Err(err)) => {
                let _ = deliver(events, StreamEvent::Error(err.to_string()), deadline).await;
                return Err(stream_failure(err));
            }
            Some(Ok(text)) => {
                if text.is_empty() {
                    continue;
                }
                buffer.push_str(&text);
                deliver(events, StreamEvent::Delta(text), deadline).await?;
            }
        }
    }
}
