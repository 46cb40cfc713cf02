//! Test fixtures and data for master tests

use cohort_master::core::SlotGrant;
use cohort_master::core::SlotCompletion;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const APP_ID: &'static str = "app_1700000000000_0001";
    pub const PROGRAM: &'static str = "/opt/cohort/worker";
    pub const LOG_DIR: &'static str = "/var/log/cohort";
    pub const PORT_BASE: u32 = 2100;
    pub const THREADS: u32 = 2;

    /// Slot id in the same shape the local cluster hands out
    pub fn slot_id(seq: u32) -> String {
        format!("container_{}_{:06}", Self::APP_ID, seq)
    }

    pub fn grant(seq: u32, host: &str) -> SlotGrant {
        SlotGrant::new(Self::slot_id(seq), host)
    }

    pub fn completion(seq: u32, exit_code: i32) -> SlotCompletion {
        SlotCompletion::new(Self::slot_id(seq), exit_code)
    }

    /// `count` grants on one host, numbered from 1
    pub fn grants_on(host: &str, count: u32) -> Vec<SlotGrant> {
        (1..=count).map(|seq| Self::grant(seq, host)).collect()
    }
}
