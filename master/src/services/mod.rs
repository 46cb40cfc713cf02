//! Service implementations
//!
//! Concrete collaborators for running the master without an external cluster.

pub mod local_cluster;

#[cfg(test)]
mod tests;

pub use local_cluster::{LocalCluster, LocalClusterConfig, LocalNodeManager, LocalResourceManager};
