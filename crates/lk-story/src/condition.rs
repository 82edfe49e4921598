//! Condition evaluation for story event triggers.

use lk_core::FlagValue;
use serde::Deserialize;

/// Read-only view of the narrative state that conditions test.
pub trait NarrativeState {
    /// The value of a story flag.
    fn flag(&self, key: &str) -> Option<&FlagValue>;
    /// Whether an event has completed.
    fn is_event_completed(&self, event_id: &str) -> bool;
    /// Whether a power has been unlocked.
    fn is_power_unlocked(&self, power_id: &str) -> bool;
    /// The current checkpoint.
    fn current_checkpoint(&self) -> Option<&str>;
}

/// A single trigger predicate.
///
/// Deserialized from `{"type": "...", ...}`. Unknown or incomplete entries
/// load as [`Condition::Unrecognized`] and never hold, so one bad trigger
/// does not prevent the rest of a story from loading.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "ConditionRepr")]
pub enum Condition {
    /// A flag equals a value.
    Flag {
        /// Flag key.
        flag: String,
        /// Expected value.
        value: FlagValue,
    },
    /// An event has completed.
    EventCompleted {
        /// Event id.
        event_id: String,
    },
    /// A power has been unlocked.
    PowerUnlocked {
        /// Power id.
        power_id: String,
    },
    /// The current checkpoint is this one.
    CheckpointReached {
        /// Checkpoint id.
        checkpoint_id: String,
    },
    /// A condition the evaluator does not understand.
    Unrecognized {
        /// The `type` tag as written, with a note if a field was missing.
        kind: String,
    },
}

impl Condition {
    /// Test this condition against the current state.
    pub fn is_satisfied<S: NarrativeState + ?Sized>(&self, state: &S) -> bool {
        match self {
            Condition::Flag { flag, value } => state.flag(flag).is_some_and(|v| v == value),
            Condition::EventCompleted { event_id } => state.is_event_completed(event_id),
            Condition::PowerUnlocked { power_id } => state.is_power_unlocked(power_id),
            Condition::CheckpointReached { checkpoint_id } => {
                state.current_checkpoint() == Some(checkpoint_id.as_str())
            }
            Condition::Unrecognized { kind } => {
                tracing::warn!(kind = %kind, "unrecognized condition treated as unsatisfied");
                false
            }
        }
    }
}

/// Evaluate a trigger list. Every condition must hold; an empty list always does.
pub fn evaluate<S: NarrativeState + ?Sized>(conditions: &[Condition], state: &S) -> bool {
    conditions.iter().all(|c| c.is_satisfied(state))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConditionRepr {
    #[serde(rename = "type", default)]
    kind: String,
    flag: Option<String>,
    value: Option<FlagValue>,
    event_id: Option<String>,
    power_id: Option<String>,
    checkpoint_id: Option<String>,
}

impl From<ConditionRepr> for Condition {
    fn from(repr: ConditionRepr) -> Self {
        let missing = |field: &str| Condition::Unrecognized {
            kind: format!("{} (missing {field})", repr.kind),
        };
        match repr.kind.as_str() {
            "flag" => match repr.flag {
                Some(flag) => Condition::Flag {
                    flag,
                    value: repr.value.unwrap_or_default(),
                },
                None => missing("flag"),
            },
            "eventCompleted" => match repr.event_id {
                Some(event_id) => Condition::EventCompleted { event_id },
                None => missing("eventId"),
            },
            "powerUnlocked" => match repr.power_id {
                Some(power_id) => Condition::PowerUnlocked { power_id },
                None => missing("powerId"),
            },
            "checkpointReached" => match repr.checkpoint_id {
                Some(checkpoint_id) => Condition::CheckpointReached { checkpoint_id },
                None => missing("checkpointId"),
            },
            other => Condition::Unrecognized {
                kind: other.to_string(),
            },
        }
    }
}
