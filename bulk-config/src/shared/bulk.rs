use serde::Deserialize;

use crate::Config;
use crate::shared::{
    BulkUpdateConfig, IndexObserverConfig, QueueConfig, ReleaseAgentConfig, StoreConfig,
    ValidationError,
};

/// Top-level configuration of a bulk update service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BulkConfig {
    pub queue: QueueConfig,
    pub observer: IndexObserverConfig,
    #[serde(default)]
    pub bulk_update: BulkUpdateConfig,
    #[serde(default)]
    pub release_agent: ReleaseAgentConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl BulkConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.queue.validate()?;
        self.observer.validate()?;
        self.bulk_update.validate()?;
        self.release_agent.validate()?;
        self.store.validate()
    }
}

impl Config for BulkConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_document_deserializes_with_defaults() {
        let config: BulkConfig = serde_json::from_str(
            r#"{
                "queue": { "pool_name": "contact_indexing" },
                "observer": { "index_name": "contacts" }
            }"#,
        )
        .unwrap();

        assert!(matches!(config.store, StoreConfig::Memory));
        assert_eq!(config.bulk_update.job_name_prefix, "bulk_update:");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn postgres_store_reads_connection() {
        let config: BulkConfig = serde_json::from_str(
            r#"{
                "queue": { "pool_name": "contact_indexing" },
                "observer": { "index_name": "contacts" },
                "store": { "postgres": { "connection": {
                    "host": "localhost", "port": 5432, "name": "bulk",
                    "username": "postgres", "password": "secret"
                } } }
            }"#,
        )
        .unwrap();

        match config.store {
            StoreConfig::Postgres { connection } => {
                assert_eq!(connection.port, 5432);
                assert!(!connection.tls.enabled);
            }
            StoreConfig::Memory => panic!("expected a postgres store"),
        }
    }

    #[test]
    fn empty_index_name_fails_validation() {
        let config: BulkConfig = serde_json::from_str(
            r#"{
                "queue": { "pool_name": "contact_indexing" },
                "observer": { "index_name": " " }
            }"#,
        )
        .unwrap();

        assert!(config.validate().is_err());
    }
}
