use tokio::task::JoinHandle;
use tracing::error;

use crate::bail;
use crate::error::{BulkResult, ErrorKind};

/// Handle to a worker running on its own task.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    panic_kind: ErrorKind,
    join_handle: JoinHandle<BulkResult<()>>,
}

impl WorkerHandle {
    pub(crate) fn new(
        name: &'static str,
        panic_kind: ErrorKind,
        join_handle: JoinHandle<BulkResult<()>>,
    ) -> Self {
        Self {
            name,
            panic_kind,
            join_handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Waits for the worker to stop and returns its result.
    pub async fn wait(self) -> BulkResult<()> {
        match self.join_handle.await {
            Ok(result) => result,
            Err(err) => {
                error!(worker = self.name, error = %err, "worker task panicked");
                bail!(self.panic_kind, "A worker panicked", err);
            }
        }
    }
}
