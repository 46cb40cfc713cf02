//! Collaborator traits with mockall annotations for testing
//!
//! The master never talks to a cluster directly. It consumes an event feed
//! and issues fire-and-forget calls through these two traits, which keeps the
//! coordination logic testable with mocks or an in-process cluster.

use shared::FinalApplicationStatus;
use tokio::sync::mpsc;

use crate::core::{SlotCompletion, SlotGrant, SlotId, SlotRequest};
use crate::error::MasterResult;

/// Events delivered by the resource manager after registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    /// Slots granted since the last heartbeat
    Allocated(Vec<SlotGrant>),
    /// Slots whose process has exited
    Completed(Vec<SlotCompletion>),
    /// The resource manager asks the master to shut down
    ShutdownRequested,
    /// Unrecoverable transport failure; no further events follow
    Error(String),
}

/// Resource manager abstraction
///
/// Grants compute slots and reports their completion through the feed
/// returned by `register`.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ResourceManager: Send + Sync {
    /// Register the master and open the event feed
    async fn register(&self) -> MasterResult<mpsc::Receiver<ResourceEvent>>;

    /// Ask for one slot, pinned to a host or anywhere
    async fn request_slots(&self, request: SlotRequest) -> MasterResult<()>;

    /// Hand a granted slot back without using it
    async fn release_slot(&self, slot_id: SlotId) -> MasterResult<()>;

    /// Record the final verdict and deregister
    ///
    /// # Parameters
    /// - `status`: SUCCEEDED or FAILED
    /// - `report`: human-readable status line
    async fn unregister(&self, status: FinalApplicationStatus, report: String) -> MasterResult<()>;

    /// Stop the event feed; used when the transport fails
    async fn stop(&self);
}

/// Node manager abstraction
///
/// Starts and stops the process of a granted slot on its host.
#[mockall::automock]
#[async_trait::async_trait]
pub trait NodeManager: Send + Sync {
    /// Start `command` in the slot; completion arrives later through the
    /// resource manager feed
    async fn start_slot(&self, grant: SlotGrant, command: String) -> MasterResult<()>;

    /// Stop the slot's process if it is still running
    async fn stop_slot(&self, slot_id: SlotId) -> MasterResult<()>;
}
