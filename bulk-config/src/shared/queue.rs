use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// What `add` does when an item with the same key is already queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// Leave the existing item untouched and report the add as not performed.
    Reject,
    /// Reschedule the existing item, overwrite its properties and union its operation ids.
    #[default]
    MergeAndUpdate,
}

/// Configuration of one named work queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QueueConfig {
    /// Name of the pool; events are routed by this name, compared case-insensitively.
    pub pool_name: String,
    /// A disabled queue accepts no new items.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Delay before a checked-out item becomes due again, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Number of checkouts after which an item is evicted instead of returned.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Size of the due-candidate pool a checkout picks from.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default)]
    pub duplicate_key_policy: DuplicateKeyPolicy,
    /// Idle backoff of queue consumers, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl QueueConfig {
    pub const DEFAULT_RETRY_DELAY_MS: u64 = 60_000;

    pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

    pub const DEFAULT_CANDIDATE_LIMIT: usize = 16;

    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

    /// Creates a configuration for `pool_name` with every other field defaulted.
    pub fn new(pool_name: impl Into<String>) -> Self {
        Self {
            pool_name: pool_name.into(),
            enabled: default_enabled(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_attempts: default_retry_attempts(),
            candidate_limit: default_candidate_limit(),
            duplicate_key_policy: DuplicateKeyPolicy::default(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.pool_name.trim().is_empty() {
            return Err(ValidationError::invalid("queue.pool_name", "must not be empty"));
        }

        if self.candidate_limit == 0 {
            return Err(ValidationError::invalid(
                "queue.candidate_limit",
                "must be greater than 0",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(ValidationError::invalid(
                "queue.poll_interval_ms",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}

fn default_retry_delay_ms() -> u64 {
    QueueConfig::DEFAULT_RETRY_DELAY_MS
}

fn default_retry_attempts() -> u32 {
    QueueConfig::DEFAULT_RETRY_ATTEMPTS
}

fn default_candidate_limit() -> usize {
    QueueConfig::DEFAULT_CANDIDATE_LIMIT
}

fn default_poll_interval_ms() -> u64 {
    QueueConfig::DEFAULT_POLL_INTERVAL_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: QueueConfig =
            serde_json::from_str(r#"{ "pool_name": "contacts" }"#).unwrap();

        assert!(config.enabled);
        assert_eq!(config.candidate_limit, 16);
        assert_eq!(config.duplicate_key_policy, DuplicateKeyPolicy::MergeAndUpdate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duplicate_key_policy_uses_snake_case() {
        let config: QueueConfig = serde_json::from_str(
            r#"{ "pool_name": "contacts", "duplicate_key_policy": "reject" }"#,
        )
        .unwrap();

        assert_eq!(config.duplicate_key_policy, DuplicateKeyPolicy::Reject);
    }

    #[test]
    fn zero_candidate_limit_is_rejected() {
        let mut config = QueueConfig::new("contacts");
        config.candidate_limit = 0;

        assert!(config.validate().is_err());
    }
}
