use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Sub-classification of adapter failures (exchange clients, datahub
/// gateways, trading bridges).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorKind {
    Network,
    RateLimit,
    Auth,
    InsufficientFunds,
    Unknown,
}

impl std::fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::Auth => "auth",
            Self::InsufficientFunds => "insufficient_funds",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl AdapterErrorKind {
    /// Best-effort classification of an error message from a duck-typed
    /// collaborator that does not carry structured error kinds.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("rate limit") || lower.contains("429") || lower.contains("too many") {
            Self::RateLimit
        } else if lower.contains("auth")
            || lower.contains("api key")
            || lower.contains("signature")
            || lower.contains("401")
            || lower.contains("403")
        {
            Self::Auth
        } else if lower.contains("insufficient") {
            Self::InsufficientFunds
        } else if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("connect")
            || lower.contains("network")
            || lower.contains("dns")
        {
            Self::Network
        } else {
            Self::Unknown
        }
    }
}

/// Store-level failures. Kept as a separate enum so callers can match on
/// the backing technology without string inspection.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Error taxonomy exposed by every public operation of the crate.
///
/// Market-rule failures (market closed, lot size, sellable quantity,
/// price limits) are deliberately absent: those produce a rejected
/// `PaperOrder`, never an error.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} adapter failure: {message}")]
    Adapter {
        kind: AdapterErrorKind,
        message: String,
    },

    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),
}

impl CoreError {
    pub fn adapter(kind: AdapterErrorKind, message: impl Into<String>) -> Self {
        Self::Adapter {
            kind,
            message: message.into(),
        }
    }

    /// Wrap a duck-typed collaborator failure, classifying its kind from
    /// the rendered message.
    pub fn from_adapter_failure(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        Self::Adapter {
            kind: AdapterErrorKind::classify(&message),
            message,
        }
    }

    /// Category tag surfaced to hosts alongside structured results.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Adapter { .. } => "adapter",
            Self::Persistence(_) => "persistence",
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(PersistenceError::Sqlite(err))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(PersistenceError::Json(err))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(PersistenceError::Io(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_rate_limit() {
        assert_eq!(
            AdapterErrorKind::classify("HTTP 429: rate limit exceeded"),
            AdapterErrorKind::RateLimit
        );
    }

    #[test]
    fn classify_auth() {
        assert_eq!(
            AdapterErrorKind::classify("invalid API key"),
            AdapterErrorKind::Auth
        );
    }

    #[test]
    fn classify_network() {
        assert_eq!(
            AdapterErrorKind::classify("connection timed out"),
            AdapterErrorKind::Network
        );
    }

    #[test]
    fn classify_unknown_fallback() {
        assert_eq!(
            AdapterErrorKind::classify("something odd happened"),
            AdapterErrorKind::Unknown
        );
    }

    #[test]
    fn category_tags() {
        assert_eq!(CoreError::NotFound("x".into()).category(), "not_found");
        assert_eq!(
            CoreError::InvalidInput("x".into()).category(),
            "invalid_input"
        );
        assert_eq!(
            CoreError::adapter(AdapterErrorKind::Network, "x").category(),
            "adapter"
        );
    }
}
