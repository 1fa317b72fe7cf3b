use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::bail;
use crate::error::{BulkResult, ErrorKind};
use crate::queue::WorkItem;
use crate::test_utils::notify::TimedNotify;
use crate::types::ItemKey;
use crate::workers::WorkItemHandler;

#[derive(Default)]
struct Inner {
    handled: Vec<ItemKey>,
    failing: HashSet<ItemKey>,
    waiters: Vec<(usize, Arc<Notify>)>,
}

impl Inner {
    fn check_waiters(&mut self) {
        let handled = self.handled.len();
        self.waiters.retain(|(count, notify)| {
            if handled >= *count {
                notify.notify_one();
                return false;
            }
            true
        });
    }
}

/// A work item handler that records the keys it handled.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the handler fail for `key`.
    pub async fn fail_for(&self, key: ItemKey) {
        self.inner.lock().await.failing.insert(key);
    }

    /// Lets `key` be handled again after [`RecordingHandler::fail_for`].
    pub async fn recover(&self, key: &ItemKey) {
        self.inner.lock().await.failing.remove(key);
    }

    pub async fn handled(&self) -> Vec<ItemKey> {
        self.inner.lock().await.handled.clone()
    }

    /// Returns a notification fired once `count` items were handled in total.
    pub async fn notify_on_handled(&self, count: usize) -> TimedNotify {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.lock().await;
        inner.waiters.push((count, notify.clone()));
        inner.check_waiters();

        TimedNotify::new(notify)
    }
}

#[async_trait::async_trait]
impl WorkItemHandler for RecordingHandler {
    async fn handle(&self, item: &WorkItem) -> BulkResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.failing.contains(&item.key) {
            bail!(
                ErrorKind::RecordProcessingFailed,
                "Scripted handler failure",
                item.key
            );
        }

        inner.handled.push(item.key.clone());
        inner.check_waiters();

        Ok(())
    }
}
