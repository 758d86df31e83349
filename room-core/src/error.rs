//! Error taxonomy shared by every component, modeled after the
//! propagation policy in the room control plane's error handling design:
//! each [`ErrorKind`] maps to a fixed externally-visible outcome, so
//! callers (the REST layer, the proxy) never have to guess how to
//! react to a given failure.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of a failure, used by the HTTP layer to pick a
/// status code without inspecting the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Room ID or name is unknown.
    NotFound,
    /// Bad name pattern, unknown image, bad label key, bad request body.
    InvalidInput,
    /// Pull already active, port range exhausted, or similar state clash.
    Conflict,
    /// Container runtime unreachable or failed mid-call.
    HostFailure,
    /// Container labels on an externally-managed container are incomplete.
    DecodeDamage,
    /// Mount path not whitelisted, or storage disabled but required.
    PolicyRefused,
    /// The host event stream closed unexpectedly; the projector can't continue.
    Fatal,
}

#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn host_failure(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::with_source(ErrorKind::HostFailure, message, source)
    }

    /// A container carries labels that don't parse; mirrors the source's
    /// "damaged container labels: X not found" message so downstream
    /// log lines stay greppable across a rewrite.
    pub fn damaged_labels(field: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::DecodeDamage,
            format!("damaged container labels: {field} not found"),
        )
    }

    pub fn policy_refused(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PolicyRefused, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }
}

impl From<bollard::errors::Error> for Error {
    fn from(err: bollard::errors::Error) -> Self {
        Error::host_failure("docker daemon call failed", err)
    }
}
