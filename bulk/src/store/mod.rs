//! Storage backends for the work queue and the completion tracker.

pub mod queue;
pub mod tracker;

use bulk_config::shared::PgConnectionConfig;
use tracing::info;

use crate::error::BulkResult;
use crate::store::queue::PostgresQueueStore;
use crate::store::tracker::PostgresTrackerStore;

/// Applies the store migrations and returns Postgres stores for the queue `pool_name`
/// and the tracker, sharing one connection pool.
pub async fn connect_postgres_stores(
    pool_name: &str,
    config: &PgConnectionConfig,
) -> BulkResult<(PostgresQueueStore, PostgresTrackerStore)> {
    bulk_postgres::migrations::migrate_store(config).await?;

    let pool = bulk_postgres::connect_store_pool(config);
    info!(pool = %pool_name, host = %config.host, "connected postgres stores");

    Ok((
        PostgresQueueStore::with_pool(pool_name, pool.clone()),
        PostgresTrackerStore::with_pool(pool),
    ))
}
