//! Shared error types for the cohort launcher

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Illegal hosts specified. Format should be `host1:num1,host2:num2,...`. Specified hosts: {input}")]
    InvalidHostList { input: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Failed to read application report {path}: {message}")]
    ReportError { path: String, message: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
