use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::signals::types::SignalKey;

/// A registered device. Owned by the client; the relay only reads it at
/// fan-out time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub token: String,
    #[serde(default)]
    pub settings: RecipientSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientSettings {
    #[serde(default)]
    pub is_pro: bool,
    #[serde(default = "default_enabled")]
    pub notifications_enabled: bool,
    /// Per-signal opt-in keyed by wire name. Missing keys mean "deliver".
    #[serde(default, alias = "perSignalOptIn")]
    pub signals: BTreeMap<String, bool>,
}

fn default_enabled() -> bool {
    true
}

impl Default for RecipientSettings {
    fn default() -> Self {
        Self {
            is_pro: false,
            notifications_enabled: true,
            signals: BTreeMap::new(),
        }
    }
}

/// Outcome of an opt-in lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptIn {
    Enabled,
    Disabled,
    /// No explicit setting; delivered (fail-open).
    Defaulted,
}

impl RecipientSettings {
    pub fn opt_in(&self, key: Option<SignalKey>) -> OptIn {
        let Some(key) = key else {
            return OptIn::Defaulted;
        };

        let mut seen = false;
        for settings_key in key.settings_keys() {
            match self.signals.get(settings_key.as_str()) {
                Some(false) => return OptIn::Disabled,
                Some(true) => seen = true,
                None => {}
            }
        }

        if seen {
            OptIn::Enabled
        } else {
            OptIn::Defaulted
        }
    }
}

/// Provider-ready message for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    pub sound: String,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PushTicket {
    Ok {
        id: String,
    },
    Error {
        message: String,
        #[serde(default)]
        details: Option<serde_json::Value>,
    },
}

impl PushTicket {
    pub fn is_ok(&self) -> bool {
        matches!(self, PushTicket::Ok { .. })
    }
}
