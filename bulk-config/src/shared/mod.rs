//! Shared configuration types for bulk update services.

mod agent;
mod base;
mod bulk;
mod bulk_update;
mod connection;
mod observer;
mod queue;
mod store;

pub use agent::ReleaseAgentConfig;
pub use base::ValidationError;
pub use bulk::BulkConfig;
pub use bulk_update::BulkUpdateConfig;
pub use connection::{
    BULK_STORE_OPTIONS, IntoConnectOptions, PgConnectionConfig, PgConnectionOptions, TlsConfig,
};
pub use observer::IndexObserverConfig;
pub use queue::{DuplicateKeyPolicy, QueueConfig};
pub use store::StoreConfig;
