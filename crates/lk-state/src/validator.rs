//! Structural checks on aggregate snapshots.
//!
//! Snapshots are checked as JSON so a section with the wrong shape can be
//! reported instead of failing to parse. Each top-level section has its own
//! [`SectionCheck`]; new sections register a check without touching the
//! others.

use chrono::DateTime;
use lk_core::AggregateSnapshot;
use serde_json::{Map, Value};

/// Outcome of validating one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// `true` when there are no errors.
    pub is_valid: bool,
    /// Problems that make the snapshot untrustworthy.
    pub errors: Vec<String>,
    /// Tolerable oddities.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn finish(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// A structural check for one top-level snapshot section.
pub trait SectionCheck {
    /// The top-level key this check owns.
    fn section(&self) -> &str;

    /// Check a present section. Returns one message per problem found.
    fn check(&self, section: &Value) -> Vec<String>;
}

/// Runs the root checks and every registered section check.
pub struct StateValidator {
    version: u32,
    checks: Vec<Box<dyn SectionCheck>>,
}

impl StateValidator {
    /// A validator with the story, power, inventory, and actor checks.
    pub fn new(version: u32) -> Self {
        let mut validator = Self::without_checks(version);
        validator.register(StoryCheck);
        validator.register(PowerCheck);
        validator.register(InventoryCheck);
        validator.register(ActorCheck);
        validator
    }

    /// A validator that only checks the root fields.
    pub fn without_checks(version: u32) -> Self {
        Self {
            version,
            checks: Vec::new(),
        }
    }

    /// Add a section check. Checks run in registration order.
    pub fn register(&mut self, check: impl SectionCheck + 'static) {
        self.checks.push(Box::new(check));
    }

    /// The schema version snapshots are expected to carry.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Validate a snapshot document.
    pub fn validate(&self, snapshot: &Value) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let Some(root) = snapshot.as_object() else {
            errors.push("snapshot is not an object".to_string());
            return ValidationReport::finish(errors, warnings);
        };

        match root.get("version").and_then(Value::as_u64) {
            Some(v) if v != u64::from(self.version) => {
                tracing::warn!(found = v, expected = self.version, "snapshot version mismatch");
                warnings.push(format!(
                    "version {v} differs from current version {}",
                    self.version
                ));
            }
            Some(_) => {}
            None => errors.push("version is missing or not a non-negative integer".to_string()),
        }

        match root.get("timestamp").and_then(Value::as_str) {
            Some(ts) if DateTime::parse_from_rfc3339(ts).is_err() => {
                errors.push(format!("timestamp {ts:?} is not RFC 3339"));
            }
            Some(_) => {}
            None => errors.push("timestamp is missing or not a string".to_string()),
        }

        match root.get("scene") {
            None | Some(Value::Null | Value::String(_)) => {}
            Some(_) => errors.push("scene must be a string".to_string()),
        }

        for check in &self.checks {
            let name = check.section();
            match root.get(name) {
                None | Some(Value::Null) => warnings.push(format!("{name} section is missing")),
                Some(section) => errors.extend(
                    check
                        .check(section)
                        .into_iter()
                        .map(|problem| format!("{name}: {problem}")),
                ),
            }
        }

        ValidationReport::finish(errors, warnings)
    }

    /// Validate a typed snapshot.
    pub fn validate_snapshot(&self, snapshot: &AggregateSnapshot) -> ValidationReport {
        self.validate(&snapshot.to_value())
    }
}

impl Default for StateValidator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl std::fmt::Debug for StateValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sections: Vec<&str> = self.checks.iter().map(|c| c.section()).collect();
        f.debug_struct("StateValidator")
            .field("version", &self.version)
            .field("sections", &sections)
            .finish()
    }
}

fn as_object<'a>(
    section: &'a Value,
    problems: &mut Vec<String>,
) -> Option<&'a Map<String, Value>> {
    let object = section.as_object();
    if object.is_none() {
        problems.push("section is not an object".to_string());
    }
    object
}

fn require_string_list(
    object: &Map<String, Value>,
    key: &str,
    required: bool,
    problems: &mut Vec<String>,
) {
    match object.get(key) {
        None if !required => {}
        None => problems.push(format!("{key} is missing")),
        Some(Value::Array(items)) => {
            if items.iter().any(|item| !item.is_string()) {
                problems.push(format!("{key} must contain only strings"));
            }
        }
        Some(_) => problems.push(format!("{key} must be a list")),
    }
}

fn require_number(object: &Map<String, Value>, key: &str, problems: &mut Vec<String>) {
    if !object.get(key).is_some_and(Value::is_number) {
        problems.push(format!("{key} must be a number"));
    }
}

/// Story section: checkpoint, completed events, flags, unlocked powers.
#[derive(Debug, Clone, Copy)]
pub struct StoryCheck;

impl SectionCheck for StoryCheck {
    fn section(&self) -> &str {
        "story"
    }

    fn check(&self, section: &Value) -> Vec<String> {
        let mut problems = Vec::new();
        let Some(story) = as_object(section, &mut problems) else {
            return problems;
        };
        match story.get("checkpoint") {
            None | Some(Value::Null | Value::String(_)) => {}
            Some(_) => problems.push("checkpoint must be a string".to_string()),
        }
        require_string_list(story, "completedEventIds", true, &mut problems);
        require_string_list(story, "unlockedPowerIds", true, &mut problems);
        match story.get("flags") {
            Some(Value::Object(flags)) => {
                for (key, value) in flags {
                    if !(value.is_boolean() || value.is_number() || value.is_string()) {
                        problems.push(format!("flag {key:?} is not a scalar"));
                    }
                }
            }
            Some(_) => problems.push("flags must be a map".to_string()),
            None => problems.push("flags is missing".to_string()),
        }
        problems
    }
}

/// Power section: unlocked and active sets, cooldown timestamps.
#[derive(Debug, Clone, Copy)]
pub struct PowerCheck;

impl SectionCheck for PowerCheck {
    fn section(&self) -> &str {
        "power"
    }

    fn check(&self, section: &Value) -> Vec<String> {
        let mut problems = Vec::new();
        let Some(power) = as_object(section, &mut problems) else {
            return problems;
        };
        require_string_list(power, "unlockedPowerIds", true, &mut problems);
        require_string_list(power, "activePowerIds", false, &mut problems);
        match power.get("cooldowns") {
            None => {}
            Some(Value::Object(cooldowns)) => {
                for (id, expires) in cooldowns {
                    let parses = expires
                        .as_str()
                        .is_some_and(|ts| DateTime::parse_from_rfc3339(ts).is_ok());
                    if !parses {
                        problems.push(format!("cooldown for {id:?} is not a timestamp"));
                    }
                }
            }
            Some(_) => problems.push("cooldowns must be a map".to_string()),
        }
        problems
    }
}

/// Inventory section: item counts.
#[derive(Debug, Clone, Copy)]
pub struct InventoryCheck;

impl SectionCheck for InventoryCheck {
    fn section(&self) -> &str {
        "inventory"
    }

    fn check(&self, section: &Value) -> Vec<String> {
        let mut problems = Vec::new();
        let Some(inventory) = as_object(section, &mut problems) else {
            return problems;
        };
        match inventory.get("items") {
            Some(Value::Object(items)) => {
                for (item, count) in items {
                    let fits = count.as_u64().is_some_and(|n| u32::try_from(n).is_ok());
                    if !fits {
                        problems.push(format!("count for {item:?} is not a valid quantity"));
                    }
                }
            }
            Some(_) => problems.push("items must be a map".to_string()),
            None => problems.push("items is missing".to_string()),
        }
        problems
    }
}

/// Actor section: position and health.
#[derive(Debug, Clone, Copy)]
pub struct ActorCheck;

impl SectionCheck for ActorCheck {
    fn section(&self) -> &str {
        "actor"
    }

    fn check(&self, section: &Value) -> Vec<String> {
        let mut problems = Vec::new();
        let Some(actor) = as_object(section, &mut problems) else {
            return problems;
        };
        match actor.get("position").and_then(Value::as_object) {
            Some(position) => {
                require_number(position, "x", &mut problems);
                require_number(position, "y", &mut problems);
            }
            None => problems.push("position must be an object".to_string()),
        }
        require_number(actor, "health", &mut problems);
        require_number(actor, "maxHealth", &mut problems);
        problems
    }
}
