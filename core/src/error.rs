//! Normalized error shape for every failure the sync core surfaces.
//!
//! # Design
//! Callers see exactly one error type regardless of where a request failed:
//! connection refused, a non-2xx status, or a body that would not decode all
//! become an `ApiError` carrying a human-readable `message`. Backend-specific
//! fields from a JSON error body are preserved in `extra` so pages can still
//! reach them. The type is `Clone` because a single failed fetch is delivered
//! to every caller that joined it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A failed request, normalized to `{message, status?, ...extra}`.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,

    /// HTTP status code, absent for transport-level failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Any other fields the backend put in its error body.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            extra: Map::new(),
        }
    }

    /// A failure below HTTP: DNS, connect, timeout, reset.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::new(err.to_string())
    }

    /// A 2xx response whose body could not be decoded.
    pub fn invalid_body(err: impl std::fmt::Display) -> Self {
        Self::new(format!("invalid response body: {err}"))
    }

    /// A request payload that could not be encoded as JSON.
    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::new(format!("serialization failed: {err}"))
    }

    /// Normalize a non-2xx response.
    ///
    /// A JSON object body donates its `message` (or string `detail`) field
    /// and keeps everything else in `extra`. Any other body becomes the
    /// message verbatim; an empty one falls back to `HTTP {status}`.
    pub fn from_response(status: u16, body: &str) -> Self {
        let fallback = || format!("HTTP {status}");
        let (message, extra) = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(mut fields)) => {
                let message = match fields.remove("message") {
                    Some(Value::String(message)) => message,
                    Some(other) => {
                        fields.insert("message".to_string(), other);
                        detail_or(&fields, fallback)
                    }
                    None => detail_or(&fields, fallback),
                };
                (message, fields)
            }
            _ => {
                let text = body.trim();
                let message = if text.is_empty() { fallback() } else { text.to_string() };
                (message, Map::new())
            }
        };
        Self {
            message,
            status: Some(status),
            extra,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

fn detail_or(fields: &Map<String, Value>, fallback: impl FnOnce() -> String) -> String {
    match fields.get("detail") {
        Some(Value::String(detail)) => detail.clone(),
        _ => fallback(),
    }
}
