use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::sse::{format_api_error, SseDecoder};
use super::{ChunkStream, CompletionRequest, ModelClient};
use crate::api::{Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig};
use crate::core::error::ClientError;
use crate::core::models::resolve_model_name;
use crate::utils::url::model_method_url;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Clone, Debug)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub generation: GenerationConfig,
}

impl GeminiSettings {
    pub fn new(api_key: impl Into<String>, model: &str) -> Self {
        Self {
            api_key: api_key.into(),
            model: resolve_model_name(model).to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            generation: GenerationConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// [`ModelClient`] speaking the Gemini REST API.
pub struct GeminiClient {
    http: reqwest::Client,
    settings: GeminiSettings,
    closed: CancellationToken,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings) -> Self {
        Self::with_http_client(reqwest::Client::new(), settings)
    }

    pub fn with_http_client(http: reqwest::Client, settings: GeminiSettings) -> Self {
        Self {
            http,
            settings,
            closed: CancellationToken::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn request_body(&self, request: &CompletionRequest) -> GenerateContentRequest {
        let system_instruction = (!request.system_instruction.is_empty())
            .then(|| Content::text(None, request.system_instruction.clone()));

        GenerateContentRequest {
            system_instruction,
            contents: request.history.iter().map(Content::from).collect(),
            generation_config: self.settings.generation.clone(),
        }
    }

    async fn send(
        &self,
        url: String,
        request: &CompletionRequest,
    ) -> Result<reqwest::Response, ClientError> {
        if self.closed.is_cancelled() {
            return Err(ClientError::Closed);
        }

        debug!(
            model = %self.settings.model,
            turns = request.history.len(),
            url = %url,
            "sending Gemini request"
        );

        let body = self.request_body(request);
        let timeout = request.deadline.saturating_duration_since(Instant::now());
        let pending = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.settings.api_key)
            .timeout(timeout)
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = self.closed.cancelled() => return Err(ClientError::Closed),
            response = pending => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            debug!(status = status.as_u16(), "Gemini request rejected");
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: format_api_error(&error_text),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, request: CompletionRequest) -> Result<String, ClientError> {
        let url = model_method_url(&self.settings.base_url, &self.settings.model, "generateContent");
        let response = self.send(url, &request).await?;

        let payload = tokio::select! {
            _ = self.closed.cancelled() => return Err(ClientError::Closed),
            payload = response.text() => payload?,
        };

        let parsed: GenerateContentResponse =
            serde_json::from_str(&payload).map_err(|err| ClientError::Decode(err.to_string()))?;
        Ok(parsed.text())
    }

    async fn generate_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<ChunkStream, ClientError> {
        let url = format!(
            "{}?alt=sse",
            model_method_url(
                &self.settings.base_url,
                &self.settings.model,
                "streamGenerateContent"
            )
        );
        let response = self.send(url, &request).await?;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();

        Ok(sse_chunks(body, self.closed.clone()))
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

type ByteStream = BoxStream<'static, reqwest::Result<Vec<u8>>>;

struct SseState {
    body: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, ClientError>>,
    done: bool,
    closed: CancellationToken,
}

impl SseState {
    fn enqueue(&mut self, events: Vec<Result<String, ClientError>>) {
        for event in events {
            let is_error = event.is_err();
            self.pending.push_back(event);
            if is_error {
                self.done = true;
                break;
            }
        }
    }
}

enum BodyPoll {
    Closed,
    Next(Option<reqwest::Result<Vec<u8>>>),
}

fn sse_chunks(body: ByteStream, closed: CancellationToken) -> ChunkStream {
    let state = SseState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
        closed,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.done {
                return None;
            }

            let closed = state.closed.clone();
            let poll = tokio::select! {
                _ = closed.cancelled() => BodyPoll::Closed,
                next = state.body.next() => BodyPoll::Next(next),
            };

            match poll {
                BodyPoll::Closed => {
                    state.done = true;
                    state.pending.push_back(Err(ClientError::Closed));
                }
                BodyPoll::Next(Some(Ok(bytes))) => {
                    let events = state.decoder.push(&bytes);
                    state.enqueue(events);
                }
                BodyPoll::Next(Some(Err(err))) => {
                    state.done = true;
                    state.pending.push_back(Err(ClientError::Http(err)));
                }
                BodyPoll::Next(None) => {
                    let events = state.decoder.finish();
                    state.enqueue(events);
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}
