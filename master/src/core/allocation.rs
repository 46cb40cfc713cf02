//! Allocation barrier
//!
//! Collects slot grants until the whole cohort is allocated, assigning each
//! grant the next local ordinal on its host. Reaching the cohort size builds
//! the [`LaunchPlan`] once and releases every launch task waiting on it.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use shared::{process_debug, ProcessId};

use super::barrier::{Accumulator, CountingBarrier, Rejection};
use super::command::{AddressTable, CommandTemplate};
use super::slot::{AssignedSlot, SlotGrant, SlotId};
use super::spec::CohortSpec;

/// Everything a launch task needs once the cohort is complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub table: AddressTable,
    pub template: CommandTemplate,
}

impl LaunchPlan {
    /// Global ordinal of an accepted slot
    pub fn ordinal_of(&self, slot: &AssignedSlot) -> Option<u32> {
        self.table.ordinal(&slot.grant.host, slot.local_ordinal)
    }

    /// The slot's launch command, with its ordinal filled in
    pub fn command_for(&self, slot: &AssignedSlot) -> Option<(u32, String)> {
        let ordinal = self.ordinal_of(slot)?;
        Some((ordinal, self.template.instantiate(ordinal)))
    }
}

/// Allocation state folded under the barrier's lock
pub struct AllocationLedger {
    spec: Arc<CohortSpec>,
    grants: Vec<AssignedSlot>,
    per_host: BTreeMap<String, u32>,
    members: HashSet<SlotId>,
}

impl AllocationLedger {
    fn new(spec: Arc<CohortSpec>) -> Self {
        Self {
            spec,
            grants: Vec::new(),
            per_host: BTreeMap::new(),
            members: HashSet::new(),
        }
    }
}

impl Accumulator for AllocationLedger {
    type Event = SlotGrant;
    type Accepted = AssignedSlot;
    type Output = Arc<LaunchPlan>;

    fn is_duplicate(&self, grant: &SlotGrant) -> bool {
        self.members.contains(&grant.slot_id)
    }

    fn accumulate(&mut self, grant: SlotGrant) -> AssignedSlot {
        let counter = self.per_host.entry(grant.host.clone()).or_insert(0);
        let local_ordinal = *counter;
        *counter += 1;

        self.members.insert(grant.slot_id.clone());
        let assigned = AssignedSlot { grant, local_ordinal };
        self.grants.push(assigned.clone());
        assigned
    }

    fn finalize(&mut self) -> Arc<LaunchPlan> {
        let table = AddressTable::build(&self.per_host, self.spec.port_base());
        let template = CommandTemplate::synthesize(&self.spec, &table);
        Arc::new(LaunchPlan { table, template })
    }
}

/// What one batch of grants did to the allocation
#[derive(Debug, Default)]
pub struct AllocationOutcome {
    /// Grants accepted into the cohort, in arrival order
    pub assigned: Vec<AssignedSlot>,
    /// Grants beyond the cohort size, to be handed back to the resource manager
    pub surplus: Vec<SlotGrant>,
    /// Grants for slots already in the cohort
    pub duplicates: Vec<SlotGrant>,
    /// Set only by the batch that completed the cohort
    pub opened: Option<Arc<LaunchPlan>>,
    pub allocated: usize,
}

pub struct AllocationBarrier {
    barrier: CountingBarrier<AllocationLedger>,
}

impl AllocationBarrier {
    pub fn new(spec: Arc<CohortSpec>) -> Self {
        let expected = spec.requested_count() as usize;
        Self {
            barrier: CountingBarrier::new(expected, AllocationLedger::new(spec)),
        }
    }

    pub fn expected(&self) -> usize {
        self.barrier.target()
    }

    /// Fold a batch of grants; callable concurrently from the event feed
    pub async fn on_grants(&self, batch: Vec<SlotGrant>) -> AllocationOutcome {
        let outcome = self.barrier.accept_batch(batch).await;

        let mut result = AllocationOutcome {
            assigned: outcome.accepted,
            allocated: outcome.count,
            ..AllocationOutcome::default()
        };
        for (grant, reason) in outcome.rejected {
            match reason {
                Rejection::Surplus => result.surplus.push(grant),
                Rejection::Duplicate => result.duplicates.push(grant),
            }
        }
        if outcome.opened {
            result.opened = self.barrier.output().await;
        }

        process_debug!(
            ProcessId::current(),
            "📦 Allocation {}/{} ({} assigned, {} surplus, {} duplicate)",
            result.allocated,
            self.expected(),
            result.assigned.len(),
            result.surplus.len(),
            result.duplicates.len()
        );

        result
    }

    /// Suspend until the whole cohort is allocated
    pub async fn wait_open(&self) -> Arc<LaunchPlan> {
        self.barrier.wait().await
    }

    pub async fn plan(&self) -> Option<Arc<LaunchPlan>> {
        self.barrier.output().await
    }

    pub async fn is_open(&self) -> bool {
        self.barrier.is_open().await
    }

    pub async fn allocated(&self) -> usize {
        self.barrier.count().await
    }

    /// Whether `slot_id` was accepted into the cohort
    pub async fn is_member(&self, slot_id: &SlotId) -> bool {
        self.barrier.inspect(|ledger| ledger.members.contains(slot_id)).await
    }

    /// Accepted slots in arrival order
    pub async fn assigned_slots(&self) -> Vec<AssignedSlot> {
        self.barrier.inspect(|ledger| ledger.grants.clone()).await
    }
}
