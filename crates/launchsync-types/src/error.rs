//! Error types shared between the core and its external adapters.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed call to an external service.
///
/// Adapters produce the class from explicit status signalling; the core
/// never inspects error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network failure, rate limit or timeout. Retried next cycle.
    Transient,
    /// Access revoked. Triggers destination self-healing.
    PermanentForbidden,
    /// Target already absent.
    NotFound,
    /// Anything else; logged, never treated as permanent.
    Other,
}

impl ErrorClass {
    /// Maps an HTTP status code to a class.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::PermanentForbidden,
            404 | 410 => Self::NotFound,
            408 | 429 => Self::Transient,
            500..=599 => Self::Transient,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::PermanentForbidden => "permanent_forbidden",
            Self::NotFound => "not_found",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call to the calendar service, delivery transport or feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{class} external error: {message}")]
pub struct ExternalError {
    pub class: ErrorClass,
    pub message: String,
}

impl ExternalError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transient, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::PermanentForbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::NotFound, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Other, message)
    }

    pub fn is_forbidden(&self) -> bool {
        self.class == ErrorClass::PermanentForbidden
    }

    pub fn is_not_found(&self) -> bool {
        self.class == ErrorClass::NotFound
    }
}

/// A malformed upstream or stored record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataInconsistency {
    #[error("event record has no id")]
    MissingId,

    #[error("event {id} starts after it ends")]
    InvertedWindow { id: String },

    #[error("unknown status code: {0}")]
    UnknownStatus(u8),
}
