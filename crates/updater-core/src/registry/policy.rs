//! Per-registration permission policy.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flags gating what the dispatcher may do for one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// A callback's install request may be turned into an install task.
    pub allow_install: bool,
    /// Change notifications are delivered at all.
    pub allow_receive_message: bool,
}

impl Default for Policy {
    /// Fresh registrations hear about changes but may not trigger installs
    /// until the policy owner grants it.
    fn default() -> Self {
        Self {
            allow_install: false,
            allow_receive_message: true,
        }
    }
}

impl Policy {
    pub fn apply(&mut self, patch: &PolicyPatch) {
        if let Some(allow_install) = patch.allow_install {
            self.allow_install = allow_install;
        }
        if let Some(allow_receive_message) = patch.allow_receive_message {
            self.allow_receive_message = allow_receive_message;
        }
    }
}

/// Partial policy update; absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_install: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_receive_message: Option<bool>,
}

impl PolicyPatch {
    pub fn allow_install(mut self, allow: bool) -> Self {
        self.allow_install = Some(allow);
        self
    }

    pub fn allow_receive_message(mut self, allow: bool) -> Self {
        self.allow_receive_message = Some(allow);
        self
    }

    /// Read a patch out of an arbitrary JSON object.
    ///
    /// Only the recognised boolean fields are picked up; unknown fields and
    /// recognised fields of the wrong type are ignored.
    pub fn from_json(value: &Value) -> Self {
        Self {
            allow_install: value.get("allow_install").and_then(Value::as_bool),
            allow_receive_message: value.get("allow_receive_message").and_then(Value::as_bool),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allow_install.is_none() && self.allow_receive_message.is_none()
    }
}
