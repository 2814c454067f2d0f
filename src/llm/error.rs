//! Error types for the language model module

use thiserror::Error;

/// Language model provider errors
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network-level failure reaching the provider
    #[error("Network error: {reason}")]
    Network { reason: String },

    /// Provider rejected the credentials
    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// Provider returned a non-success status
    #[error("Provider API error: {reason}")]
    Api { reason: String },

    /// Response body could not be interpreted
    #[error("Invalid provider response: {reason}")]
    InvalidResponse { reason: String },

    /// Request timed out
    #[error("Provider request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Client misconfiguration (missing key, bad endpoint)
    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

impl LlmError {
    /// Check if the request may succeed when retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Network { .. } | LlmError::Timeout { .. } | LlmError::RateLimited { .. }
        )
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout { timeout_ms: 0 }
        } else if err.is_connect() || err.is_request() {
            LlmError::Network {
                reason: format!("Connection failed: {}", err),
            }
        } else if err.is_decode() {
            LlmError::InvalidResponse {
                reason: err.to_string(),
            }
        } else {
            LlmError::Api {
                reason: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::InvalidResponse {
            reason: err.to_string(),
        }
    }
}

/// Result type for language model calls
pub type LlmResult<T> = Result<T, LlmError>;
