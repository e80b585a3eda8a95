//! Error types for the input pipeline.
//!
//! Every failure a tool call can surface is an [`InputError`]. Each variant
//! carries a stable [`kind`](InputError::kind) code so agents can branch on it
//! without parsing messages.

use thiserror::Error;

use crate::backend::BackendError;

/// Structured failure of a tool call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InputError {
    /// Bad tool parameters or out-of-screen coordinates.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No virtual-key mapping exists for a character typed with `method=vk`.
    #[error("no virtual-key mapping for character {ch:?} at position {index}")]
    UnmappableCharacter { ch: char, index: usize },

    /// The native backend is missing or uninitialized. Fatal for the call.
    #[error("backend unavailable after {completed} primitive(s): {reason}")]
    BackendUnavailable { reason: String, completed: usize },

    /// A single primitive was refused while the backend stayed responsive.
    #[error("backend rejected primitive {index}: {reason}")]
    BackendRejected { reason: String, index: usize },

    /// Rate-limiter configuration values were rejected; the old config stays.
    #[error("invalid rate limiter configuration: {0}")]
    ConfigurationInvalid(String),

    /// The caller aborted the call; the emitted prefix is left as is.
    #[error("cancelled after {completed} primitive(s)")]
    Cancelled { completed: usize },
}

impl InputError {
    /// Machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            InputError::InvalidArgument(_) => "InvalidArgument",
            InputError::UnmappableCharacter { .. } => "UnmappableCharacter",
            InputError::BackendUnavailable { .. } => "BackendUnavailable",
            InputError::BackendRejected { .. } => "BackendRejected",
            InputError::ConfigurationInvalid(_) => "ConfigurationInvalid",
            InputError::Cancelled { .. } => "Cancelled",
        }
    }

    /// Maps a backend failure on primitive `index`, with `completed`
    /// primitives already done, into the call-level error.
    pub fn from_backend(err: BackendError, index: usize, completed: usize) -> Self {
        match err {
            BackendError::Unavailable(reason) => {
                InputError::BackendUnavailable { reason, completed }
            }
            BackendError::Rejected(reason) => InputError::BackendRejected { reason, index },
        }
    }

    /// Whether the failure aborts the remainder of the call.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, InputError::BackendRejected { .. })
    }
}

pub type InputResult<T> = Result<T, InputError>;
