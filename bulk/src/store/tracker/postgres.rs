use std::collections::BTreeMap;

use bulk_config::shared::PgConnectionConfig;
use bulk_postgres::operations::{self, OperationRow};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::BulkResult;
use crate::store::tracker::{OperationState, TrackerStore, VersionedOperation};
use crate::types::OperationId;

/// Tracker store backed by the `bulk.operations` table.
///
/// A row with a completion time belongs to the complete partition, any other row to the
/// in-progress partition.
#[derive(Debug, Clone)]
pub struct PostgresTrackerStore {
    pool: PgPool,
}

impl PostgresTrackerStore {
    pub fn new(config: &PgConnectionConfig) -> Self {
        Self::with_pool(bulk_postgres::connect_store_pool(config))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn from_row(row: OperationRow) -> BulkResult<VersionedOperation> {
    let state = match row.completed_at {
        Some(completed_at) => OperationState::Complete { completed_at },
        None => OperationState::InProgress {
            counter: row.counter,
            fixed: row.fixed,
        },
    };

    Ok(VersionedOperation {
        state,
        version: u64::try_from(row.version)?,
    })
}

impl TrackerStore for PostgresTrackerStore {
    async fn get(&self, operation_id: OperationId) -> BulkResult<Option<VersionedOperation>> {
        operations::get_operation(&self.pool, operation_id.as_uuid())
            .await?
            .map(from_row)
            .transpose()
    }

    async fn insert(&self, operation_id: OperationId) -> BulkResult<bool> {
        Ok(operations::insert_operation(&self.pool, operation_id.as_uuid()).await?)
    }

    async fn replace(
        &self,
        operation_id: OperationId,
        expected_version: u64,
        state: OperationState,
    ) -> BulkResult<bool> {
        let (counter, fixed, completed_at) = match state {
            OperationState::InProgress { counter, fixed } => (counter, fixed, None),
            OperationState::Complete { completed_at } => (0, true, Some(completed_at)),
        };

        Ok(operations::update_operation(
            &self.pool,
            operation_id.as_uuid(),
            i64::try_from(expected_version)?,
            counter,
            fixed,
            completed_at,
        )
        .await?)
    }

    async fn remove_complete(&self, operation_id: OperationId) -> BulkResult<bool> {
        Ok(operations::delete_complete_operation(&self.pool, operation_id.as_uuid()).await?)
    }

    async fn complete_operations(&self) -> BulkResult<BTreeMap<OperationId, DateTime<Utc>>> {
        let rows = operations::get_complete_operations(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(operation_id, completed_at)| (OperationId::from_uuid(operation_id), completed_at))
            .collect())
    }

    async fn clear(&self) -> BulkResult<u64> {
        Ok(operations::delete_all_operations(&self.pool).await?)
    }
}
