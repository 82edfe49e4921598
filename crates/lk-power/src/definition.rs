//! Power definitions.
//!
//! The external format is a JSON list of
//! `{id, name, description, type, cooldownMs, range?, effects, unlockConditionTag, activationKey}`.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use lk_core::PowerEffect;

use crate::error::{PowerError, PowerResult};

/// How a power behaves when activated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerKind {
    /// Fires its effects; duration effects keep it active until they expire.
    #[default]
    Active,
    /// Each activation flips it on or off.
    Toggle,
    /// Always in effect once unlocked; cannot be activated.
    Passive,
}

impl std::fmt::Display for PowerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Toggle => write!(f, "toggle"),
            Self::Passive => write!(f, "passive"),
        }
    }
}

/// Static definition of a power.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerDefinition {
    /// Unique power id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Description shown to the player.
    #[serde(default)]
    pub description: String,
    /// Activation behaviour.
    #[serde(default, rename = "type")]
    pub kind: PowerKind,
    /// Cooldown after activation, zero for none.
    #[serde(default)]
    pub cooldown_ms: u64,
    /// Reach in scene units, if the power targets something.
    #[serde(default)]
    pub range: Option<f64>,
    /// Effects applied on activation.
    #[serde(default)]
    pub effects: Vec<PowerEffect>,
    /// Tag describing what unlocks the power.
    #[serde(default)]
    pub unlock_condition_tag: Option<String>,
    /// Input binding hint for the presentation layer.
    #[serde(default)]
    pub activation_key: Option<String>,
}

impl PowerDefinition {
    /// A definition with no effects and no cooldown.
    pub fn new(id: impl Into<String>, kind: PowerKind) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            kind,
            cooldown_ms: 0,
            range: None,
            effects: Vec::new(),
            unlock_condition_tag: None,
            activation_key: None,
        }
    }

    /// Set the cooldown.
    pub fn with_cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.cooldown_ms = cooldown_ms;
        self
    }

    /// Append an effect.
    pub fn with_effect(mut self, kind: impl Into<String>, duration_ms: Option<u64>) -> Self {
        self.effects.push(PowerEffect {
            kind: kind.into(),
            duration_ms,
            value: None,
        });
        self
    }

    /// The longest non-instantaneous effect, if any.
    pub fn active_duration_ms(&self) -> Option<u64> {
        self.effects
            .iter()
            .filter(|e| !e.is_instantaneous())
            .filter_map(|e| e.duration_ms)
            .max()
    }
}

/// The loaded set of power definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerCatalog {
    powers: Vec<PowerDefinition>,
    by_id: HashMap<String, usize>,
}

impl PowerCatalog {
    /// Build a catalog from definitions. Later duplicates of an id are dropped.
    pub fn new(definitions: impl IntoIterator<Item = PowerDefinition>) -> Self {
        let mut catalog = Self::default();
        for definition in definitions {
            if catalog.by_id.contains_key(&definition.id) {
                tracing::warn!(power_id = %definition.id, "duplicate power id; keeping the first definition");
                continue;
            }
            catalog
                .by_id
                .insert(definition.id.clone(), catalog.powers.len());
            catalog.powers.push(definition);
        }
        catalog
    }

    /// Load a definition list. A `{"powers": [...]}` wrapper is also accepted.
    pub fn from_value(data: &Value) -> PowerResult<Self> {
        let list = match data {
            Value::Array(_) => Some(data),
            Value::Object(map) => map.get("powers").filter(|v| v.is_array()),
            _ => None,
        }
        .ok_or_else(|| PowerError::Malformed("expected a list of powers".to_string()))?;
        let definitions = Vec::<PowerDefinition>::deserialize(list)?;
        Ok(Self::new(definitions))
    }

    /// Parse and load JSON text.
    pub fn from_json_str(json: &str) -> PowerResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Read and load a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> PowerResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| PowerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Look up a definition.
    pub fn get(&self, power_id: &str) -> Option<&PowerDefinition> {
        self.by_id.get(power_id).map(|&i| &self.powers[i])
    }

    /// Whether `power_id` is defined.
    pub fn contains(&self, power_id: &str) -> bool {
        self.by_id.contains_key(power_id)
    }

    /// Definitions in load order.
    pub fn iter(&self) -> impl Iterator<Item = &PowerDefinition> {
        self.powers.iter()
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.powers.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.powers.is_empty()
    }
}
