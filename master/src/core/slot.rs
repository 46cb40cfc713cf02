//! Slot identifiers and the events that reference them

use std::fmt;

/// Identifier the resource manager gives a granted slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(String);

impl SlotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A slot granted on a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotGrant {
    pub slot_id: SlotId,
    pub host: String,
}

impl SlotGrant {
    pub fn new(slot_id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            slot_id: SlotId::new(slot_id),
            host: host.into(),
        }
    }
}

/// Terminal exit status of a slot's process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotCompletion {
    pub slot_id: SlotId,
    pub exit_code: i32,
}

impl SlotCompletion {
    pub fn new(slot_id: impl Into<String>, exit_code: i32) -> Self {
        Self {
            slot_id: SlotId::new(slot_id),
            exit_code,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// A grant accepted into the cohort, with its per-host ordinal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedSlot {
    pub grant: SlotGrant,
    pub local_ordinal: u32,
}
