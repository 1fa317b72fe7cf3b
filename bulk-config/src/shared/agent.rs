use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Schedule of the agent that unlocks resources once their operations are released.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReleaseAgentConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl ReleaseAgentConfig {
    pub const DEFAULT_INTERVAL_MS: u64 = 30_000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval_ms == 0 {
            return Err(ValidationError::invalid(
                "release_agent.interval_ms",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for ReleaseAgentConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_ms: default_interval_ms(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_interval_ms() -> u64 {
    ReleaseAgentConfig::DEFAULT_INTERVAL_MS
}
