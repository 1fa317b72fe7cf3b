//! Postgres layout and queries backing the durable work queue and completion tracker.

pub mod migrations;
pub mod operations;
pub mod work_items;

use std::time::Duration;

use bulk_config::shared::{BULK_STORE_OPTIONS, IntoConnectOptions, PgConnectionConfig};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

/// Maximum number of connections kept by a store pool.
const MAX_POOL_CONNECTIONS: u32 = 4;

/// Time after which an idle pooled connection is closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds a lazily connected pool for the store tables.
///
/// No connection is opened until the first query runs.
pub fn connect_store_pool(config: &PgConnectionConfig) -> PgPool {
    let options: PgConnectOptions = config.with_db(Some(&BULK_STORE_OPTIONS));

    PgPoolOptions::new()
        .min_connections(0)
        .max_connections(MAX_POOL_CONNECTIONS)
        .idle_timeout(Some(IDLE_TIMEOUT))
        .connect_lazy_with(options)
}
