use serde::Deserialize;

use crate::shared::{PgConnectionConfig, ValidationError};

/// Backend used for the work queue and completion tracker stores.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-process store; state is lost on restart.
    #[default]
    Memory,
    Postgres { connection: PgConnectionConfig },
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            StoreConfig::Memory => Ok(()),
            StoreConfig::Postgres { connection } => connection.tls.validate(),
        }
    }
}
