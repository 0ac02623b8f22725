//! Model Client Adapter: the seam between the engine and the remote
//! completion service.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::time::Instant;

use crate::core::error::ClientError;
use crate::core::message::Message;

pub mod gemini;
pub mod sse;

pub use gemini::{GeminiClient, GeminiSettings};

/// Ordered text chunks of a streaming completion. The stream ends on
/// end-of-stream; an `Err` item is terminal.
pub type ChunkStream = BoxStream<'static, Result<String, ClientError>>;

/// One completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_instruction: String,
    /// Full outgoing conversation, oldest first. It already ends with the
    /// user turn carrying `message`.
    pub history: Vec<Message>,
    /// Text of the newest user turn.
    pub message: String,
    /// Point in time after which the call must give up.
    pub deadline: Instant,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Single-shot generation returning the complete reply text.
    async fn generate(&self, request: CompletionRequest) -> Result<String, ClientError>;

    /// Streaming generation. Opening failures are returned directly; failures
    /// after the stream is open arrive as an `Err` item.
    async fn generate_stream(&self, request: CompletionRequest)
        -> Result<ChunkStream, ClientError>;

    /// Close the underlying connection. Requests in flight fail with
    /// [`ClientError::Closed`] rather than hanging.
    fn close(&self);
}
