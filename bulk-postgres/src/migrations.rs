use bulk_config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::Executor;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::info;

const NUM_POOL_CONNECTIONS: u32 = 1;

/// Creates the `bulk` schema and applies the queue and tracker migrations.
pub async fn migrate_store(config: &PgConnectionConfig) -> Result<(), sqlx::Error> {
    let options: PgConnectOptions = config
        .with_db(None)
        .application_name("bulk_update_migrator");

    let pool = PgPoolOptions::new()
        .max_connections(NUM_POOL_CONNECTIONS)
        .min_connections(NUM_POOL_CONNECTIONS)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("create schema if not exists bulk;").await?;
                // Keeps the `_sqlx_migrations` bookkeeping table inside the `bulk` schema.
                conn.execute("set search_path = 'bulk';").await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await?;

    let migrator = sqlx::migrate!("./migrations");
    migrator.run(&pool).await?;

    info!("bulk store migrations applied");

    Ok(())
}
