use serde::Serialize;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpsErrorKind {
    Authentication,
    Protocol,
    Timeout,
    NotConnected,
    Capacity,
    NotFound,
    Decryption,
    Persistence,
    KeyInit,
    InvalidParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpsError {
    pub kind: OpsErrorKind,
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl OpsError {
    pub fn new(kind: OpsErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            retryable: matches!(kind, OpsErrorKind::Timeout | OpsErrorKind::Capacity),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::Authentication, "AUTHENTICATION", message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::Protocol, "PROTOCOL", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::Timeout, "TIMEOUT", message)
    }

    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::NotConnected, "NOT_CONNECTED", message)
    }

    pub fn capacity(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::Capacity, "CAPACITY", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::NotFound, "NOT_FOUND", message)
    }

    pub fn decryption(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::Decryption, "DECRYPTION", message)
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::Persistence, "PERSISTENCE", message)
    }

    pub fn key_init(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::KeyInit, "KEY_INIT", message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::InvalidParams, "INVALID_PARAMS", message)
    }
}

impl fmt::Display for OpsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for OpsError {}

impl From<std::io::Error> for OpsError {
    fn from(err: std::io::Error) -> Self {
        OpsError::persistence(err.to_string())
    }
}
