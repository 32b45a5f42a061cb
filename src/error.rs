//! Error taxonomy for backend calls and user input.

use thiserror::Error;

/// Generic message shown for transport failures.
pub const NETWORK_ERROR_MESSAGE: &str = "网络错误，请稍后重试";

#[derive(Debug, Error)]
pub enum ClientError {
    /// Rejected locally before any request was issued.
    #[error("{0}")]
    Validation(String),

    /// The backend answered with a non-2xx status.
    #[error("{message}")]
    Backend { status: u16, message: String },

    /// Connection refused, timeout, or a body that could not be read.
    #[error("network error: {0}")]
    Network(String),

    /// A 2xx body that was not the JSON we expected.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Builds a backend error from a response body, preferring the body's
    /// `error` field, then FastAPI's `detail`, then a generic message.
    pub fn from_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                ["error", "detail"].iter().find_map(|key| match v.get(*key) {
                    Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
                    Some(other) if !other.is_null() => Some(other.to_string()),
                    _ => None,
                })
            })
            .unwrap_or_else(|| format!("请求失败 (HTTP {})", status));
        ClientError::Backend { status, message }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::Decode(_))
    }

    /// Text for the notification banner.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(msg) => msg.clone(),
            ClientError::Backend { message, .. } => message.clone(),
            ClientError::Network(_) | ClientError::Decode(_) => NETWORK_ERROR_MESSAGE.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
