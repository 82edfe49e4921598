//! Effects applied when a story event fires.

use lk_core::FlagValue;
use serde::Deserialize;

/// A state change carried by a story event.
///
/// Accepts the tagged form (`{"type": "unlockPower", "powerId": "p"}`) and
/// the shorthand form (`{"unlockPower": "p"}`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "EffectRepr")]
pub enum Effect {
    /// Set a story flag.
    SetFlag {
        /// Flag key.
        flag: String,
        /// Value to set.
        value: FlagValue,
    },
    /// Unlock a power.
    UnlockPower {
        /// Power id.
        power_id: String,
    },
    /// Move the current checkpoint.
    SetCheckpoint {
        /// Checkpoint id.
        checkpoint_id: String,
    },
    /// An effect the processor does not understand; skipped with a warning.
    Unrecognized {
        /// Description of what was found.
        kind: String,
    },
}

/// Receives effects from [`apply_effects`].
///
/// Implementations must not fail on ids they do not know.
pub trait EffectTarget {
    /// Write a story flag.
    fn apply_set_flag(&self, flag: &str, value: &FlagValue);
    /// Hand a power unlock to whoever owns capabilities.
    fn apply_unlock_power(&self, power_id: &str, cause: &str);
    /// Move the current checkpoint.
    fn apply_set_checkpoint(&self, checkpoint_id: &str);
}

/// The effect processor: apply `effects` in list order on behalf of `cause`.
pub fn apply_effects<T: EffectTarget + ?Sized>(effects: &[Effect], cause: &str, target: &T) {
    for effect in effects {
        match effect {
            Effect::SetFlag { flag, value } => target.apply_set_flag(flag, value),
            Effect::UnlockPower { power_id } => target.apply_unlock_power(power_id, cause),
            Effect::SetCheckpoint { checkpoint_id } => target.apply_set_checkpoint(checkpoint_id),
            Effect::Unrecognized { kind } => {
                tracing::warn!(cause, kind = %kind, "skipping unrecognized effect");
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EffectRepr {
    #[serde(rename = "type")]
    kind: Option<String>,
    flag: Option<String>,
    value: Option<FlagValue>,
    power_id: Option<String>,
    checkpoint_id: Option<String>,
    set_flag: Option<String>,
    unlock_power: Option<String>,
    set_checkpoint: Option<String>,
}

impl From<EffectRepr> for Effect {
    fn from(repr: EffectRepr) -> Self {
        let EffectRepr {
            kind,
            flag,
            value,
            power_id,
            checkpoint_id,
            set_flag,
            unlock_power,
            set_checkpoint,
        } = repr;

        let flag = flag.or(set_flag);
        let power_id = power_id.or(unlock_power);
        let checkpoint_id = checkpoint_id.or(set_checkpoint);

        let kind = match kind {
            Some(kind) => kind,
            None => match (&flag, &power_id, &checkpoint_id) {
                (Some(_), None, None) => "setFlag".to_string(),
                (None, Some(_), None) => "unlockPower".to_string(),
                (None, None, Some(_)) => "setCheckpoint".to_string(),
                _ => {
                    return Effect::Unrecognized {
                        kind: "untagged effect without exactly one action".to_string(),
                    };
                }
            },
        };

        match (kind.as_str(), flag, power_id, checkpoint_id) {
            ("setFlag", Some(flag), _, _) => Effect::SetFlag {
                flag,
                value: value.unwrap_or_default(),
            },
            ("unlockPower", _, Some(power_id), _) => Effect::UnlockPower { power_id },
            ("setCheckpoint", _, _, Some(checkpoint_id)) => Effect::SetCheckpoint { checkpoint_id },
            ("setFlag" | "unlockPower" | "setCheckpoint", ..) => Effect::Unrecognized {
                kind: format!("{kind} (missing target)"),
            },
            _ => Effect::Unrecognized { kind: kind.clone() },
        }
    }
}
