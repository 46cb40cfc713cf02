//! Common test utilities and infrastructure
//!
//! Shared fixtures, a scripted in-memory cluster, and builders used across
//! the master test suites.

#![allow(dead_code, unused_imports)]

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items for convenience
pub use fixtures::TestFixtures;
pub use helpers::{ClusterHarness, SpecBuilder, TestHelpers};
