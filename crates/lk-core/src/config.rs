use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

/// Default nesting limit for publishes triggered from inside handlers.
pub const DEFAULT_MAX_PUBLISH_DEPTH: u32 = 32;

/// Engine-wide configuration.
///
/// Every key is optional when loaded from JSON; missing keys keep their
/// defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Current snapshot and save-record schema version.
    pub version: u32,
    /// Prefix for every durable save key (`<namespace>_<slot>`).
    pub namespace: String,
    /// Byte budget shared by all keys under the namespace.
    pub storage_budget_bytes: u64,
    /// Number of numbered manual save slots.
    pub manual_slots: u32,
    /// Capacity of the recovery history buffer (oldest entries evicted).
    pub history_capacity: usize,
    /// Maximum nesting of publishes issued from inside bus handlers.
    pub max_publish_depth: u32,
    /// Checkpoint used when a minimal state has to be synthesized.
    pub default_checkpoint: String,
    /// Actor health used for fresh and synthesized states.
    pub default_health: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            namespace: "lorekeeper".to_string(),
            storage_budget_bytes: 5 * 1024 * 1024,
            manual_slots: 3,
            history_capacity: 10,
            max_publish_depth: DEFAULT_MAX_PUBLISH_DEPTH,
            default_checkpoint: "game_start".to_string(),
            default_health: 100.0,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration document and check its ranges.
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> CoreResult<()> {
        if self.namespace.is_empty() {
            return Err(CoreError::ConfigValue {
                field: "namespace",
                reason: "must not be empty".to_string(),
            });
        }
        if self.history_capacity == 0 {
            return Err(CoreError::ConfigValue {
                field: "historyCapacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.default_health.is_finite() || self.default_health < 0.0 {
            return Err(CoreError::ConfigValue {
                field: "defaultHealth",
                reason: format!("{} is not a non-negative number", self.default_health),
            });
        }
        Ok(())
    }

    /// Set the schema version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the save key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the storage byte budget.
    pub fn with_storage_budget(mut self, bytes: u64) -> Self {
        self.storage_budget_bytes = bytes;
        self
    }

    /// Set the number of manual save slots.
    pub fn with_manual_slots(mut self, slots: u32) -> Self {
        self.manual_slots = slots;
        self
    }

    /// Set the recovery history capacity (at least 1).
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }

    /// Set the nested publish limit.
    pub fn with_max_publish_depth(mut self, depth: u32) -> Self {
        self.max_publish_depth = depth;
        self
    }

    /// Set the checkpoint used for synthesized states.
    pub fn with_default_checkpoint(mut self, checkpoint: impl Into<String>) -> Self {
        self.default_checkpoint = checkpoint.into();
        self
    }

    /// Set the default actor health.
    pub fn with_default_health(mut self, health: f64) -> Self {
        self.default_health = health;
        self
    }
}
