//! Chain error taxonomy
//!
//! Every chain client maps raw RPC failures into [`ChainError`]. Only the
//! retryable classes (`Transient`, `RateLimited`) are retried by callers.

use thiserror::Error;

/// Classified failure of a chain RPC call or transaction submission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Timeouts, connection resets, 5xx responses, lagging nodes
    #[error("transient RPC failure: {0}")]
    Transient(String),

    /// HTTP 429 or a provider-specific "too many requests" response
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Malformed request, invalid address, reverted transaction
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl ChainError {
    /// Classify an error by its message text
    ///
    /// Unrecognised messages are treated as transient; the retry budget bounds
    /// how long that can go on.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("rate limit")
            || lower.contains("ratelimit")
        {
            return ChainError::RateLimited(message);
        }

        if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("connection")
            || lower.contains("network")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("504")
            || lower.contains("bad gateway")
            || lower.contains("service unavailable")
            || lower.contains("temporarily unavailable")
            || lower.contains("blockhash not found")
            || lower.contains("node is behind")
            || lower.contains("nonce too low")
        {
            return ChainError::Transient(message);
        }

        if lower.contains("revert")
            || lower.contains("invalid")
            || lower.contains("insufficient funds")
            || lower.contains("malformed")
            || lower.contains("already processed")
            || lower.contains("already been processed")
            || lower.contains("unauthorized")
            || lower.contains("not authorized")
        {
            return ChainError::Permanent(message);
        }

        ChainError::Transient(message)
    }

    /// Whether a retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Transient(_) | ChainError::RateLimited(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ChainError::RateLimited(_))
    }

    /// Contract rejected the call because the origin transaction was already settled
    pub fn is_already_processed(&self) -> bool {
        let lower = self.message().to_lowercase();
        lower.contains("already processed") || lower.contains("already been processed")
    }

    /// Short label used in logs and metrics
    pub fn class(&self) -> &'static str {
        match self {
            ChainError::Transient(_) => "transient",
            ChainError::RateLimited(_) => "rate_limited",
            ChainError::Permanent(_) => "permanent",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ChainError::Transient(m) | ChainError::RateLimited(m) | ChainError::Permanent(m) => m,
        }
    }
}
