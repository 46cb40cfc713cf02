//! Handle on a running application master, mockable for monitor tests

use crate::error::ClientResult;

#[mockall::automock]
#[async_trait::async_trait]
pub trait MasterHandle: Send {
    /// OS process id, if the master is still known to the OS
    fn id(&self) -> Option<u32>;

    /// Exit status once the master has exited, `None` while it runs
    async fn try_exit_code(&mut self) -> ClientResult<Option<i32>>;

    /// Ask the master to stop; it still reports before exiting
    async fn interrupt(&mut self) -> ClientResult<()>;
}
