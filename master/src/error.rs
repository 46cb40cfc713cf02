//! Master-specific error types

use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MasterError {
    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Resource manager transport error: {message}")]
    TransportError { message: String },

    #[error("Failed to start slot {slot_id} on {host}: {message}")]
    SlotStartFailed {
        slot_id: String,
        host: String,
        message: String,
    },

    #[error("Failed to stop slot {slot_id}: {message}")]
    SlotStopFailed { slot_id: String, message: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl MasterError {
    pub fn config(field: impl Into<String>) -> Self {
        MasterError::ConfigurationError { field: field.into() }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        MasterError::TransportError {
            message: message.into(),
        }
    }

    /// Whether the error came from validating the cohort before anything ran
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MasterError::ConfigurationError { .. } | MasterError::SharedError(_)
        )
    }
}

pub type MasterResult<T> = Result<T, MasterError>;
