//! Client-specific error types

use cohort_master::MasterError;
use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid cohort options: {0}")]
    InvalidOptions(#[from] MasterError),

    #[error("Failed to launch application master {binary}: {message}")]
    LaunchFailed { binary: String, message: String },

    #[error("Application master exited with status {exit_code} without writing {path}")]
    ReportMissing { path: String, exit_code: i32 },

    #[error("Failed to signal application master: {message}")]
    SignalFailed { message: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ClientError {
    pub fn launch(binary: impl std::fmt::Display, message: impl Into<String>) -> Self {
        ClientError::LaunchFailed {
            binary: binary.to_string(),
            message: message.into(),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
