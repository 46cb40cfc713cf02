//! Shared types for the cohort launcher
//!
//! Contains the pieces both the submission client and the application master
//! need: logging setup, host list parsing, and the final application report.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;

pub use errors::*;
pub use types::*;

pub use messages::ApplicationReport;
