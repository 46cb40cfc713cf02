//! Launch dispatcher
//!
//! One task per accepted slot. Each task suspends until the allocation
//! barrier opens, fills in its ordinal and issues a single start request.
//! Start failures are logged and never retried.
//!
//! Cancellation only reaches tasks still waiting for the barrier. A start
//! request already sent to the node manager runs to completion so that its
//! slot is recorded and can be stopped.

use std::sync::Arc;

use shared::{process_debug, process_error, process_info, process_warn, ProcessId};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::allocation::AllocationBarrier;
use super::slot::{AssignedSlot, SlotId};
use crate::traits::NodeManager;

/// How a launch task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LaunchEnd {
    Started,
    Failed,
    Cancelled,
}

pub struct LaunchDispatcher<N: NodeManager + 'static> {
    node_manager: Arc<N>,
    allocation: Arc<AllocationBarrier>,
    tasks: Mutex<Vec<JoinHandle<LaunchEnd>>>,
    /// Slots whose start request was accepted by the node manager
    launched: Arc<Mutex<Vec<SlotId>>>,
    cancel: watch::Sender<bool>,
}

impl<N: NodeManager + 'static> LaunchDispatcher<N> {
    pub fn new(node_manager: Arc<N>, allocation: Arc<AllocationBarrier>) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            node_manager,
            allocation,
            tasks: Mutex::new(Vec::new()),
            launched: Arc::new(Mutex::new(Vec::new())),
            cancel,
        }
    }

    /// Spawn one launch task per slot
    pub async fn dispatch(&self, slots: Vec<AssignedSlot>) {
        let mut tasks = self.tasks.lock().await;
        for slot in slots {
            let node_manager = Arc::clone(&self.node_manager);
            let allocation = Arc::clone(&self.allocation);
            let launched = Arc::clone(&self.launched);
            let cancel = self.cancel.subscribe();
            tasks.push(tokio::spawn(Self::launch(node_manager, allocation, launched, cancel, slot)));
        }
    }

    async fn launch(
        node_manager: Arc<N>,
        allocation: Arc<AllocationBarrier>,
        launched: Arc<Mutex<Vec<SlotId>>>,
        mut cancel: watch::Receiver<bool>,
        slot: AssignedSlot,
    ) -> LaunchEnd {
        process_debug!(
            ProcessId::current(),
            "⏳ Slot {} on {} waiting for the full cohort",
            slot.grant.slot_id,
            slot.grant.host
        );
        let plan = tokio::select! {
            biased;
            _ = async {
                let _ = cancel.wait_for(|cancelled| *cancelled).await;
            } => {
                process_debug!(ProcessId::current(), "Launch of slot {} cancelled", slot.grant.slot_id);
                return LaunchEnd::Cancelled;
            }
            plan = allocation.wait_open() => plan,
        };

        let Some((ordinal, command)) = plan.command_for(&slot) else {
            process_error!(
                ProcessId::current(),
                "❌ Slot {} on {} has no entry in the address table",
                slot.grant.slot_id,
                slot.grant.host
            );
            return LaunchEnd::Failed;
        };

        process_info!(
            ProcessId::current(),
            "🚀 Starting process {} in slot {} on {}",
            ordinal,
            slot.grant.slot_id,
            slot.grant.host
        );

        let slot_id = slot.grant.slot_id.clone();
        let host = slot.grant.host.clone();
        match node_manager.start_slot(slot.grant, command).await {
            Ok(()) => {
                launched.lock().await.push(slot_id.clone());
                process_debug!(ProcessId::current(), "✅ Slot {} started", slot_id);
                LaunchEnd::Started
            }
            Err(e) => {
                process_error!(
                    ProcessId::current(),
                    "❌ Failed to start worker slot {} on {}: {}",
                    slot_id,
                    host,
                    e
                );
                LaunchEnd::Failed
            }
        }
    }

    /// Launch tasks still waiting or starting
    pub async fn pending(&self) -> usize {
        let tasks = self.tasks.lock().await;
        tasks.iter().filter(|task| !task.is_finished()).count()
    }

    /// Slots whose process was started
    pub async fn launched(&self) -> Vec<SlotId> {
        self.launched.lock().await.clone()
    }

    /// Wait for every launch task spawned so far
    pub async fn join_all(&self) {
        self.join_tasks().await;
    }

    /// Cancel launches still waiting for the barrier and wait for the starts
    /// already in flight; returns how many launches were cancelled
    pub async fn cancel_pending(&self) -> usize {
        self.cancel.send_replace(true);
        self.join_tasks().await
    }

    async fn join_tasks(&self) -> usize {
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        let mut cancelled = 0;
        for task in tasks {
            match task.await {
                Ok(LaunchEnd::Cancelled) => cancelled += 1,
                Ok(_) => {}
                Err(e) => {
                    process_warn!(ProcessId::current(), "⚠️ Launch task ended abnormally: {}", e);
                }
            }
        }
        cancelled
    }

    /// Best-effort stop of every started slot
    pub async fn stop_launched(&self) {
        for slot_id in self.launched().await {
            if let Err(e) = self.node_manager.stop_slot(slot_id.clone()).await {
                process_warn!(ProcessId::current(), "⚠️ Failed to stop slot {}: {}", slot_id, e);
            }
        }
    }
}
