//! Commands accepted from presentation layers.

use lk_core::FlagValue;
use lk_story::StoryEvent;
use serde::Deserialize;
use serde_json::Value;

/// A request from outside the engine.
///
/// Deserializes from `{"command": "<name>", ...}` with camelCase names, e.g.
/// `{"command": "activatePower", "powerId": "dash"}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    /// Fire a story event if its triggers hold.
    TriggerEvent {
        /// Event to fire.
        event_id: String,
    },
    /// Set a story flag.
    SetFlag {
        /// Flag name.
        key: String,
        /// New value.
        value: FlagValue,
    },
    /// Move the checkpoint pointer.
    SetCheckpoint {
        /// Checkpoint to make current.
        checkpoint_id: String,
    },
    /// Unlock a power directly.
    UnlockPower {
        /// Power to unlock.
        power_id: String,
    },
    /// Activate an unlocked power.
    ActivatePower {
        /// Power to activate.
        power_id: String,
        /// Caller data passed through to `power.activated`.
        #[serde(default)]
        context: Value,
    },
    /// Save to a manual slot.
    ManualSave {
        /// Slot number.
        slot: u32,
    },
    /// Load a save and restore it into the live state.
    Load {
        /// Slot key, e.g. `manual_save_0`.
        key: String,
    },
    /// Delete a save.
    DeleteSave {
        /// Slot key.
        key: String,
    },
    /// Return every subsystem to its initial state.
    ResetAll,
}

impl Command {
    /// Parse a command document.
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        Self::deserialize(value)
    }

    /// The command's wire name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TriggerEvent { .. } => "triggerEvent",
            Self::SetFlag { .. } => "setFlag",
            Self::SetCheckpoint { .. } => "setCheckpoint",
            Self::UnlockPower { .. } => "unlockPower",
            Self::ActivatePower { .. } => "activatePower",
            Self::ManualSave { .. } => "manualSave",
            Self::Load { .. } => "load",
            Self::DeleteSave { .. } => "deleteSave",
            Self::ResetAll => "resetAll",
        }
    }
}

/// What a command did.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// The story event fired.
    Triggered(StoryEvent),
    /// The command took effect.
    Applied,
    /// The command was refused or had nothing to do.
    Refused(String),
}

impl CommandOutcome {
    /// Whether the command took effect.
    pub fn is_applied(&self) -> bool {
        !matches!(self, Self::Refused(_))
    }

    pub(crate) fn from_flag(applied: bool, refusal: impl FnOnce() -> String) -> Self {
        if applied {
            Self::Applied
        } else {
            Self::Refused(refusal())
        }
    }
}
