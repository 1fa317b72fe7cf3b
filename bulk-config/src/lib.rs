//! Configuration types and the layered loader for bulk update services.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_bulk_config, load_bulk_config_from, load_config_from};
