use bulk_config::shared::{
    BulkConfig, BulkUpdateConfig, IndexObserverConfig, QueueConfig, ReleaseAgentConfig,
    StoreConfig,
};

/// Returns an in-memory configuration with retry and poll intervals short enough for tests.
pub fn test_bulk_config(pool_name: &str, index_name: &str) -> BulkConfig {
    let mut queue = QueueConfig::new(pool_name);
    queue.retry_delay_ms = 50;
    queue.poll_interval_ms = 10;

    BulkConfig {
        queue,
        observer: IndexObserverConfig {
            index_name: index_name.to_string(),
        },
        bulk_update: BulkUpdateConfig::default(),
        release_agent: ReleaseAgentConfig {
            enabled: true,
            interval_ms: 20,
        },
        store: StoreConfig::Memory,
    }
}
