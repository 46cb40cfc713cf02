//! Core coordination logic
//!
//! Allocation barrier, address table and command synthesis, launch
//! dispatch and the completion quorum. Nothing in here performs I/O except
//! through the collaborator traits.

pub mod allocation;
pub mod barrier;
pub mod command;
pub mod completion;
pub mod dispatcher;
pub mod slot;
pub mod spec;
pub mod status;

pub use allocation::{AllocationBarrier, AllocationOutcome, LaunchPlan};
pub use barrier::{Accumulator, BatchOutcome, CountingBarrier, Rejection};
pub use command::{AddressEntry, AddressTable, CommandTemplate, ORDINAL_PLACEHOLDER};
pub use completion::{CompletionOutcome, CompletionQuorum, QuorumResult};
pub use dispatcher::LaunchDispatcher;
pub use slot::{AssignedSlot, SlotCompletion, SlotGrant, SlotId};
pub use spec::{CohortSpec, CohortSpecBuilder, SlotRequest, SlotResources};
pub use status::{FinalStatus, StatusReport};
