//! Test doubles shared by the engine and CLI tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::client::{ChunkStream, CompletionRequest, ModelClient};
use crate::core::error::ClientError;

pub fn ok_chunks(chunks: &[&str]) -> Vec<Result<String, ClientError>> {
    chunks.iter().map(|chunk| Ok(chunk.to_string())).collect()
}

pub enum Reply {
    Text(&'static str),
    Fail(&'static str),
    Hang,
}

pub enum StreamReply {
    Chunks(Vec<Result<String, ClientError>>),
    Live(mpsc::UnboundedReceiver<Result<String, ClientError>>),
    OpenFail(&'static str),
}

/// In-memory client that plays back scripted replies and records requests.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Reply>>,
    streams: Mutex<VecDeque<StreamReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
    closed: CancellationToken,
}

impl ScriptedClient {
    pub fn with_replies(replies: Vec<Reply>) -> Arc<Self> {
        let client = Self::default();
        *client.replies.lock().unwrap() = replies.into();
        Arc::new(client)
    }

    pub fn with_stream(reply: StreamReply) -> Arc<Self> {
        let client = Self::default();
        client.streams.lock().unwrap().push_back(reply);
        Arc::new(client)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn live_chunks(
    rx: mpsc::UnboundedReceiver<Result<String, ClientError>>,
    closed: CancellationToken,
) -> ChunkStream {
    futures_util::stream::unfold((rx, closed), |(mut rx, closed)| async move {
        let item = tokio::select! {
            _ = closed.cancelled() => Some(Err(ClientError::Closed)),
            item = rx.recv() => item,
        };
        item.map(|item| (item, (rx, closed)))
    })
    .boxed()
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn generate(&self, request: CompletionRequest) -> Result<String, ClientError> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text.to_string()),
            Some(Reply::Fail(message)) => Err(ClientError::Stream(message.to_string())),
            Some(Reply::Hang) => {
                self.closed.cancelled().await;
                Err(ClientError::Closed)
            }
            None => Err(ClientError::Stream("script exhausted".to_string())),
        }
    }

    async fn generate_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<ChunkStream, ClientError> {
        self.requests.lock().unwrap().push(request);
        let reply = self.streams.lock().unwrap().pop_front();
        match reply {
            Some(StreamReply::Chunks(chunks)) => Ok(futures_util::stream::iter(chunks).boxed()),
            Some(StreamReply::Live(rx)) => Ok(live_chunks(rx, self.closed.clone())),
            Some(StreamReply::OpenFail(message)) => {
                Err(ClientError::Stream(message.to_string()))
            }
            None => Err(ClientError::Stream("script exhausted".to_string())),
        }
    }

    fn close(&self) {
        self.closed.cancel();
    }
}
