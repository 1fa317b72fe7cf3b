use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Identifies the search index whose rebuild cycles gate operation release.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IndexObserverConfig {
    pub index_name: String,
}

impl IndexObserverConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.index_name.trim().is_empty() {
            return Err(ValidationError::invalid(
                "observer.index_name",
                "must not be empty",
            ));
        }

        Ok(())
    }
}
