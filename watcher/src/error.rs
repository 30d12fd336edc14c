//! Error types for the balance watcher

use thiserror::Error;

/// Result type alias for watcher operations
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Error types for watcher operations
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Node API error: status={status} - {message}")]
    NodeApi { status: u16, message: String },

    #[error("Notification error: {message}")]
    Notification { message: String },

    #[error("No balances fetched: poll outcome {outcome}")]
    NoBalances { outcome: &'static str },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WatcherError {
    /// Create a new invalid amount error
    pub fn invalid_amount<S: Into<String>>(value: S) -> Self {
        Self::InvalidAmount(value.into())
    }

    /// Create a new node API error
    pub fn node_api<S: Into<String>>(status: u16, message: S) -> Self {
        Self::NodeApi {
            status,
            message: message.into(),
        }
    }

    /// Create a new notification error
    pub fn notification<S: Into<String>>(message: S) -> Self {
        Self::Notification {
            message: message.into(),
        }
    }

    /// Create a new error for a poll that produced no snapshot
    pub fn no_balances(outcome: &'static str) -> Self {
        Self::NoBalances { outcome }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Check if the next poll may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        match self {
            WatcherError::Network(_) => true,
            WatcherError::NodeApi { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            WatcherError::Config(_) => "config",
            WatcherError::Network(_) => "network",
            WatcherError::Serialization(_) => "serialization",
            WatcherError::Io(_) => "io",
            WatcherError::InvalidEndpoint(_) => "validation",
            WatcherError::InvalidAmount(_) => "validation",
            WatcherError::NodeApi { .. } => "node_api",
            WatcherError::Notification { .. } => "notification",
            WatcherError::NoBalances { .. } => "poll",
            WatcherError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_api_retryable() {
        assert!(WatcherError::node_api(503, "unavailable").is_retryable());
        assert!(WatcherError::node_api(429, "slow down").is_retryable());
        assert!(!WatcherError::node_api(401, "unauthorized").is_retryable());
        assert!(!WatcherError::invalid_amount("-1").is_retryable());
    }

    #[test]
    fn test_category() {
        assert_eq!(WatcherError::node_api(500, "boom").category(), "node_api");
        assert_eq!(WatcherError::invalid_amount("x").category(), "validation");
        assert_eq!(WatcherError::internal("x").category(), "internal");
    }

    #[test]
    fn test_display() {
        let err = WatcherError::node_api(401, "invalid token");
        assert_eq!(err.to_string(), "Node API error: status=401 - invalid token");
    }
}
