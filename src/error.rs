// src/error.rs
// =============================================================================
// Page-level errors.
//
// These end up in the JSON response (as {"code": ..., "message": ...}) and
// decide the HTTP status the API answers with. Link-level problems never
// show up here; they are folded into the link counts instead.
// =============================================================================

use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: u16 },

    #[error("failed to fetch {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("failed to parse HTML from {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("request to {url} timed out after {}s", .timeout.as_secs())]
    Timeout { url: String, timeout: Duration },

    #[error("circuit breaker is open, not fetching {url}")]
    CircuitOpen { url: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// Stable machine-readable code, part of the JSON contract
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "INVALID_URL",
            Self::Http { .. } => "HTTP_ERROR",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::Parse { .. } => "PARSE_ERROR",
            Self::Timeout { .. } => "TIMEOUT_ERROR",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    // Sorts a reqwest failure into timeout vs. everything else
    pub fn from_fetch(url: &str, timeout: Duration, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
                timeout,
            }
        } else {
            Self::Network {
                url: url.to_string(),
                reason: error.to_string(),
            }
        }
    }
}

// Serialized as {"code": "...", "message": "..."}
impl Serialize for AnalysisError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("AnalysisError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let err = AnalysisError::Http {
            url: "https://x.test".to_string(),
            status: 404,
        };
        assert_eq!(err.code(), "HTTP_ERROR");
        assert_eq!(err.to_string(), "HTTP 404 fetching https://x.test");
        assert_eq!(AnalysisError::Internal("boom".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_serializes_code_and_message() {
        let err = AnalysisError::Timeout {
            url: "https://slow.test".to_string(),
            timeout: Duration::from_secs(30),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "TIMEOUT_ERROR");
        assert_eq!(json["message"], "request to https://slow.test timed out after 30s");
    }
}
