use std::error::Error as StdError;
use std::fmt;

/// Failures reported by a [`ModelClient`](crate::core::client::ModelClient).
#[derive(Debug)]
pub enum ClientError {
    /// The HTTP exchange itself failed (connect, TLS, timeout, body read).
    Http(reqwest::Error),

    /// The provider answered with a non-success status.
    Api {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Formatted provider error body.
        message: String,
    },

    /// The provider answered, but the payload could not be decoded.
    Decode(String),

    /// The stream carried an in-band error or broke off mid-way.
    Stream(String),

    /// The client was closed while, or before, the request was in flight.
    Closed,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Http(err) => write!(f, "HTTP request failed: {err}"),
            ClientError::Api { status, message } => write!(f, "HTTP {status}: {message}"),
            ClientError::Decode(message) => write!(f, "Invalid response payload: {message}"),
            ClientError::Stream(message) => f.write_str(message),
            ClientError::Closed => f.write_str("Model client is closed"),
        }
    }
}

impl StdError for ClientError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ClientError::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(err)
    }
}

/// Failures surfaced by the conversation engine.
#[derive(Debug)]
pub enum EngineError {
    /// No API key could be resolved; fatal and never retried.
    MissingCredential,

    /// Every attempt of a one-shot request failed.
    Request {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Failure of the last attempt.
        source: ClientError,
    },

    /// The provider answered a one-shot request with no text.
    EmptyResponse,

    /// A streaming request failed to open or broke off.
    Stream(ClientError),

    /// The operation's deadline passed before it completed.
    DeadlineExceeded,

    /// The consumer side of the result channel has gone away.
    ChannelClosed,

    /// The engine was closed.
    Closed,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::MissingCredential => f.write_str("Gemini API key is missing"),
            EngineError::Request { attempts, source } => write!(
                f,
                "Failed to get a response from the Gemini API after {attempts} attempt{}: {source}",
                if *attempts == 1 { "" } else { "s" }
            ),
            EngineError::EmptyResponse => f.write_str("Empty response from the Gemini API"),
            EngineError::Stream(source) => {
                write!(f, "Failed to stream from the Gemini API: {source}")
            }
            EngineError::DeadlineExceeded => f.write_str("Request deadline exceeded"),
            EngineError::ChannelClosed => f.write_str("Result channel receiver was dropped"),
            EngineError::Closed => f.write_str("Engine is closed"),
        }
    }
}

impl StdError for EngineError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            EngineError::Request { source, .. } => Some(source),
            EngineError::Stream(source) => Some(source),
            _ => None,
        }
    }
}
