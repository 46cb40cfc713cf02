//! Messages exchanged between the master and the submission client
//!
//! - `report`: final application report written when the master unregisters

pub mod report;

pub use report::ApplicationReport;
