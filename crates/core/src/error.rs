//! Error types for the SmartSeva domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum. The user-facing side of
//! the query taxonomy (`ValidationError`, `GenerationFailure`) carries fixed
//! messages so a raw fault never reaches the caller.

use thiserror::Error;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Retrieval failed: {0}")]
    QueryFailed(String),

    #[error("Failed to load corpus from {path}: {reason}")]
    LoadFailed { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("No focused session; nothing to write to")]
    NoFocusedSession,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// --- Query taxonomy ---

/// Bad input, surfaced immediately with no side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid query: Empty query")]
    Empty,

    #[error("Invalid query: Query too long ({length} characters, maximum {max})")]
    TooLong { length: usize, max: usize },
}

impl ValidationError {
    /// The single fragment shown to the caller.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

/// A classified fault from the completion service.
///
/// Only the class is ever shown to the caller; the raw fault is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GenerationFailure {
    #[error("rate limited")]
    RateLimited,

    #[error("timed out")]
    Timeout,

    #[error("context processing")]
    Context,

    #[error("unclassified")]
    Other,
}

impl GenerationFailure {
    /// Classify a provider fault.
    ///
    /// Typed variants are matched first; everything else falls back to
    /// substring matching on the lowercased message.
    pub fn classify(err: &ProviderError) -> Self {
        match err {
            ProviderError::RateLimited { .. } => Self::RateLimited,
            ProviderError::Timeout(_) => Self::Timeout,
            other => Self::classify_message(&other.to_string()),
        }
    }

    /// Substring classification of a raw fault message.
    pub fn classify_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("rate limit") {
            Self::RateLimited
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else if lower.contains("context") {
            Self::Context
        } else {
            Self::Other
        }
    }

    /// The apology fragment streamed to the caller.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RateLimited => "Rate limit exceeded. Please wait a moment and try again.",
            Self::Timeout => "Request timed out. Please try with a shorter query.",
            Self::Context => {
                "Context processing error. Please ensure documents are properly loaded."
            }
            Self::Other => "An error occurred while processing your query. Please try again.",
        }
    }
}
