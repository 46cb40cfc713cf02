//! Tests for the in-process cluster
//!
//! These run real `sh` processes, so they only assume a POSIX shell.

use assert_matches::assert_matches;
use shared::{ApplicationReport, FinalApplicationStatus};
use tempfile::TempDir;
use tokio::time::timeout;

use super::common::{next_event, TEST_HEARTBEAT, TEST_TIMEOUT};
use crate::core::{SlotGrant, SlotId, SlotRequest, SlotResources};
use crate::error::MasterError;
use crate::services::local_cluster::{
    LocalCluster, LocalClusterConfig, LocalNodeManager, LocalResourceManager, RELEASED_EXIT_CODE,
};
use crate::traits::{NodeManager, ResourceEvent, ResourceManager};

fn cluster(log_dir: &std::path::Path, hosts: &[&str]) -> (LocalResourceManager, LocalNodeManager) {
    let config = LocalClusterConfig::new("app_42", log_dir)
        .with_hosts(hosts.iter().map(|h| h.to_string()).collect())
        .with_heartbeat(TEST_HEARTBEAT);
    LocalCluster::new(config)
}

fn anywhere() -> SlotRequest {
    SlotRequest {
        host: None,
        resources: SlotResources::default(),
    }
}

fn on(host: &str) -> SlotRequest {
    SlotRequest {
        host: Some(host.to_string()),
        resources: SlotResources::default(),
    }
}

fn single_completion(event: ResourceEvent) -> (SlotId, i32) {
    match event {
        ResourceEvent::Completed(mut batch) if batch.len() == 1 => {
            let completion = batch.remove(0);
            (completion.slot_id, completion.exit_code)
        }
        other => panic!("Expected a single completion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_default_config_uses_localhost() {
    let config = LocalClusterConfig::new("app", "/logs").with_hosts(Vec::new());
    assert_eq!(config.hosts, vec!["localhost".to_string()]);
    assert_eq!(config.heartbeat.as_millis(), 1000);
}

#[tokio::test]
async fn test_register_twice_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (resource_manager, _) = cluster(dir.path(), &["n1"]);

    let _feed = resource_manager.register().await.unwrap();
    let second = resource_manager.register().await;
    assert_matches!(second, Err(MasterError::TransportError { .. }));

    resource_manager.stop().await;
}

#[tokio::test]
async fn test_pending_requests_granted_in_one_heartbeat() {
    let dir = TempDir::new().unwrap();
    let (resource_manager, _) = cluster(dir.path(), &["n1", "n2"]);

    // Queue everything before the first heartbeat fires
    for _ in 0..3 {
        resource_manager.request_slots(anywhere()).await.unwrap();
    }
    let mut feed = resource_manager.register().await.unwrap();

    let event = next_event(&mut feed).await;
    assert_eq!(
        event,
        ResourceEvent::Allocated(vec![
            SlotGrant::new("container_app_42_000001", "n1"),
            SlotGrant::new("container_app_42_000002", "n2"),
            SlotGrant::new("container_app_42_000003", "n1"),
        ])
    );
    assert_eq!(resource_manager.pending_requests().await, 0);

    resource_manager.stop().await;
}

#[tokio::test]
async fn test_request_for_unknown_host_stays_pending() {
    let dir = TempDir::new().unwrap();
    let (resource_manager, _) = cluster(dir.path(), &["n1"]);

    resource_manager.request_slots(on("ghost")).await.unwrap();
    resource_manager.request_slots(on("n1")).await.unwrap();
    let mut feed = resource_manager.register().await.unwrap();

    let event = next_event(&mut feed).await;
    assert_matches!(event, ResourceEvent::Allocated(batch) if batch.len() == 1 && batch[0].host == "n1");

    // Give a few more heartbeats a chance
    tokio::time::sleep(TEST_HEARTBEAT * 5).await;
    assert_eq!(resource_manager.pending_requests().await, 1);
    assert!(feed.try_recv().is_err(), "No grant for a host outside the cluster");

    resource_manager.stop().await;
}

#[tokio::test]
async fn test_release_reports_aborted_completion() {
    let dir = TempDir::new().unwrap();
    let (resource_manager, _) = cluster(dir.path(), &["n1"]);
    let mut feed = resource_manager.register().await.unwrap();

    resource_manager
        .release_slot(SlotId::new("container_app_42_000009"))
        .await
        .unwrap();

    let (slot_id, exit_code) = single_completion(next_event(&mut feed).await);
    assert_eq!(slot_id.as_str(), "container_app_42_000009");
    assert_eq!(exit_code, RELEASED_EXIT_CODE);

    resource_manager.stop().await;
}

#[tokio::test]
async fn test_release_never_blocks_on_a_full_feed() {
    let dir = TempDir::new().unwrap();
    let (resource_manager, _) = cluster(dir.path(), &["n1"]);
    let mut feed = resource_manager.register().await.unwrap();

    // More releases than the feed can buffer, with nobody draining it
    let released = 300;
    for seq in 0..released {
        timeout(
            TEST_TIMEOUT,
            resource_manager.release_slot(SlotId::new(format!("container_app_42_{seq:06}"))),
        )
        .await
        .expect("release waited for room in the feed")
        .unwrap();
    }

    let mut seen = std::collections::HashSet::new();
    for _ in 0..released {
        let (slot_id, exit_code) = single_completion(next_event(&mut feed).await);
        assert_eq!(exit_code, RELEASED_EXIT_CODE);
        seen.insert(slot_id);
    }
    assert_eq!(seen.len(), released);

    resource_manager.stop().await;
}

#[tokio::test]
async fn test_start_slot_reports_exit_code() {
    let dir = TempDir::new().unwrap();
    let (resource_manager, node_manager) = cluster(dir.path(), &["n1"]);
    let mut feed = resource_manager.register().await.unwrap();

    node_manager
        .start_slot(SlotGrant::new("c1", "n1"), "exit 3".to_string())
        .await
        .unwrap();

    let (slot_id, exit_code) = single_completion(next_event(&mut feed).await);
    assert_eq!(slot_id.as_str(), "c1");
    assert_eq!(exit_code, 3);
    assert_eq!(node_manager.running().await, 0);

    resource_manager.stop().await;
}

#[tokio::test]
async fn test_start_slot_exposes_host_label() {
    let dir = TempDir::new().unwrap();
    let (resource_manager, node_manager) = cluster(dir.path(), &["n7"]);
    let mut feed = resource_manager.register().await.unwrap();

    node_manager
        .start_slot(
            SlotGrant::new("c1", "n7"),
            "test \"$COHORT_HOST\" = n7 && test \"$COHORT_SLOT_ID\" = c1".to_string(),
        )
        .await
        .unwrap();

    let (_, exit_code) = single_completion(next_event(&mut feed).await);
    assert_eq!(exit_code, 0);

    resource_manager.stop().await;
}

#[tokio::test]
async fn test_start_slot_without_registration_fails() {
    let dir = TempDir::new().unwrap();
    let (_, node_manager) = cluster(dir.path(), &["n1"]);

    let result = node_manager
        .start_slot(SlotGrant::new("c1", "n1"), "true".to_string())
        .await;
    assert_matches!(result, Err(MasterError::TransportError { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn test_stop_slot_terminates_process() {
    let dir = TempDir::new().unwrap();
    let (resource_manager, node_manager) = cluster(dir.path(), &["n1"]);
    let mut feed = resource_manager.register().await.unwrap();

    node_manager
        .start_slot(SlotGrant::new("c1", "n1"), "sleep 30".to_string())
        .await
        .unwrap();
    assert_eq!(node_manager.running().await, 1);

    node_manager.stop_slot(SlotId::new("c1")).await.unwrap();

    let (slot_id, exit_code) = single_completion(next_event(&mut feed).await);
    assert_eq!(slot_id.as_str(), "c1");
    assert_ne!(exit_code, 0);

    resource_manager.stop().await;
}

#[tokio::test]
async fn test_stop_unknown_slot_is_noop() {
    let dir = TempDir::new().unwrap();
    let (_, node_manager) = cluster(dir.path(), &["n1"]);
    assert!(node_manager.stop_slot(SlotId::new("missing")).await.is_ok());
}

#[tokio::test]
async fn test_unregister_writes_report_and_closes_feed() {
    let dir = TempDir::new().unwrap();
    let log_dir = dir.path().join("logs");
    let (resource_manager, _) = cluster(&log_dir, &["n1"]);
    let mut feed = resource_manager.register().await.unwrap();

    resource_manager
        .unregister(
            FinalApplicationStatus::Failed,
            "Requested: 3, Allocated: 3, Completed: 3, Succeeded: 2, Failed: 1".to_string(),
        )
        .await
        .unwrap();

    let path = ApplicationReport::path_for(&log_dir, "app_42");
    let json = tokio::fs::read_to_string(&path).await.unwrap();
    let report = ApplicationReport::from_json(&path, &json).unwrap();
    assert_eq!(report.app_id, "app_42");
    assert_eq!(report.final_status, FinalApplicationStatus::Failed);
    assert!(report.diagnostics.ends_with("Failed: 1"));

    let closed = timeout(TEST_TIMEOUT, feed.recv()).await.unwrap();
    assert!(closed.is_none(), "Feed should close after unregistering");
}
