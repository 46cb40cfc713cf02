//! Service-specific tests

#[cfg(test)]
mod local_cluster;

#[cfg(test)]
pub mod common {
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::traits::ResourceEvent;

    /// Standard timeout for async operations in tests
    pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Short heartbeat so grants arrive quickly
    pub const TEST_HEARTBEAT: Duration = Duration::from_millis(10);

    /// Receive the next feed event or fail the test
    pub async fn next_event(feed: &mut mpsc::Receiver<ResourceEvent>) -> ResourceEvent {
        timeout(TEST_TIMEOUT, feed.recv())
            .await
            .expect("Timed out waiting for a feed event")
            .expect("Feed closed unexpectedly")
    }
}
