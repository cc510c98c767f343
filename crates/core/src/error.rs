//! Error types for the GuildPilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all GuildPilot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Operation errors ---
    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),

    // --- Chat platform errors ---
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Provider temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Response blocked by provider: {0}")]
    Blocked(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether the failure is worth retrying with backoff.
    ///
    /// Only rate limiting and gateway/server-unavailable statuses qualify;
    /// everything else ends the current round.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Unavailable(_) => true,
            Self::ApiError { status_code, .. } => {
                matches!(status_code, 429 | 502 | 503 | 504)
            }
            _ => false,
        }
    }

    /// Server-suggested wait before retrying, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum OperationError {
    #[error("Operation not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {operation} — {reason}")]
    ExecutionFailed { operation: String, reason: String },

    #[error("Permission denied: {operation} — {reason}")]
    PermissionDenied { operation: String, reason: String },

    #[error("Invalid operation arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Message edit failed: {0}")]
    EditFailed(String),

    #[error("Channel history unavailable: {0}")]
    HistoryUnavailable(String),

    #[error("Attachment unavailable: {0}")]
    AttachmentUnavailable(String),
}
