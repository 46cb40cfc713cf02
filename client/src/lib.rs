//! Submission client for the cohort application master
//!
//! Validates the cohort options, starts the master with its output redirected
//! into the log directory, and follows it until the final application report
//! is available.

pub mod error;
pub mod monitor;
pub mod submit;
pub mod traits;

pub use error::{ClientError, ClientResult};
pub use monitor::{ApplicationMonitor, ApplicationOutcome};
pub use submit::{MasterCommand, Submission};
pub use traits::MasterHandle;
