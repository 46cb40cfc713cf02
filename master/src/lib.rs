//! Application master for launching a fixed-size cohort of cooperating processes
//!
//! The master waits until the resource manager has granted every slot the
//! cohort needs, builds one launch command encoding the address of every
//! member, starts all members, and reports SUCCEEDED only if each of them
//! exits cleanly.

pub mod cli;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use core::{AllocationBarrier, CohortSpec, CohortSpecBuilder, CompletionQuorum, FinalStatus, StatusReport};
pub use error::{MasterError, MasterResult};
pub use orchestrator::Orchestrator;
pub use traits::{NodeManager, ResourceEvent, ResourceManager};
