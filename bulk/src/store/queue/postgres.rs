use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bulk_config::shared::PgConnectionConfig;
use bulk_postgres::work_items::{self, WorkItemRow};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::BulkResult;
use crate::queue::{Candidate, WorkItem};
use crate::store::queue::{InsertOutcome, MergedItem, QueueStore};
use crate::types::{ItemKey, OperationId};

/// Queue store backed by the `bulk.work_items` table.
///
/// Several queues share the table; rows are partitioned by pool name.
#[derive(Debug, Clone)]
pub struct PostgresQueueStore {
    pool_name: String,
    pool: PgPool,
    ready: Arc<OnceCell<()>>,
}

impl PostgresQueueStore {
    pub fn new(pool_name: impl Into<String>, config: &PgConnectionConfig) -> Self {
        Self::with_pool(pool_name, bulk_postgres::connect_store_pool(config))
    }

    pub fn with_pool(pool_name: impl Into<String>, pool: PgPool) -> Self {
        Self {
            pool_name: pool_name.into(),
            pool,
            ready: Arc::new(OnceCell::new()),
        }
    }

    fn to_row(&self, item: &WorkItem) -> BulkResult<WorkItemRow> {
        Ok(WorkItemRow {
            pool_name: self.pool_name.clone(),
            key: item.key.as_bytes().to_vec(),
            scheduled: item.scheduled,
            attempts: i32::try_from(item.attempts)?,
            properties: serde_json::to_value(&item.properties)?,
            operation_ids: item
                .operation_ids
                .as_ref()
                .map(|ids| ids.iter().map(OperationId::as_uuid).collect()),
        })
    }
}

fn from_row(row: WorkItemRow) -> BulkResult<WorkItem> {
    let properties: BTreeMap<String, String> = serde_json::from_value(row.properties)?;

    Ok(WorkItem {
        key: ItemKey::new(row.key),
        scheduled: row.scheduled,
        attempts: u32::try_from(row.attempts)?,
        properties,
        operation_ids: row
            .operation_ids
            .map(|ids| ids.into_iter().map(OperationId::from_uuid).collect()),
    })
}

impl QueueStore for PostgresQueueStore {
    async fn wait_ready(&self) -> BulkResult<()> {
        self.ready
            .get_or_try_init(|| async {
                work_items::check_work_items_table(&self.pool).await?;
                info!(pool = %self.pool_name, "work item table is ready");
                Ok::<_, sqlx::Error>(())
            })
            .await?;

        Ok(())
    }

    async fn insert(&self, item: &WorkItem) -> BulkResult<InsertOutcome> {
        let row = self.to_row(item)?;

        if work_items::insert_work_item(&self.pool, &row).await? {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::DuplicateKey)
        }
    }

    async fn merge(&self, item: &WorkItem) -> BulkResult<Option<MergedItem>> {
        let row = self.to_row(item)?;

        let Some(merged) = work_items::merge_work_item(&self.pool, &row).await? else {
            return Ok(None);
        };

        let previous_operation_ids: BTreeSet<_> = merged
            .previous_operation_ids
            .unwrap_or_default()
            .into_iter()
            .map(OperationId::from_uuid)
            .collect();

        Ok(Some(MergedItem {
            item: from_row(merged.row)?,
            previous_operation_ids,
        }))
    }

    async fn due_candidates(&self, now: DateTime<Utc>, limit: usize) -> BulkResult<Vec<Candidate>> {
        let rows =
            work_items::get_due_work_items(&self.pool, &self.pool_name, now, i64::try_from(limit)?)
                .await?;

        Ok(rows
            .into_iter()
            .map(|row| Candidate {
                key: ItemKey::new(row.key),
                scheduled: row.scheduled,
            })
            .collect())
    }

    async fn claim(
        &self,
        key: &ItemKey,
        expected_scheduled: DateTime<Utc>,
        next_scheduled: DateTime<Utc>,
    ) -> BulkResult<Option<WorkItem>> {
        work_items::claim_work_item(
            &self.pool,
            &self.pool_name,
            key.as_bytes(),
            expected_scheduled,
            next_scheduled,
        )
        .await?
        .map(from_row)
        .transpose()
    }

    async fn get(&self, key: &ItemKey) -> BulkResult<Option<WorkItem>> {
        work_items::get_work_item(&self.pool, &self.pool_name, key.as_bytes())
            .await?
            .map(from_row)
            .transpose()
    }

    async fn remove(&self, key: &ItemKey) -> BulkResult<Option<WorkItem>> {
        work_items::delete_work_item(&self.pool, &self.pool_name, key.as_bytes())
            .await?
            .map(from_row)
            .transpose()
    }

    async fn remove_claimed(
        &self,
        key: &ItemKey,
        scheduled: DateTime<Utc>,
    ) -> BulkResult<Option<WorkItem>> {
        work_items::delete_claimed_work_item(&self.pool, &self.pool_name, key.as_bytes(), scheduled)
            .await?
            .map(from_row)
            .transpose()
    }

    async fn clear(&self) -> BulkResult<u64> {
        Ok(work_items::delete_all_work_items(&self.pool, &self.pool_name).await?)
    }
}
