//! Live reload message protocol.
//!
//! JSON objects tagged by `type`, sent from the dev server to the browser:
//!
//! - `connected`: handshake finished
//! - `reload`: a watch cycle finished, refresh the page
//! - `error`: a watch cycle failed, show an overlay
//! - `clear_error`: hide the overlay

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HotReloadMessage {
    Reload {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    Connected {
        /// Server version for compatibility check
        version: String,
    },

    Error {
        /// Failing stage name
        stage: String,
        error: String,
    },

    #[serde(rename = "clear_error")]
    ClearError,
}

impl HotReloadMessage {
    pub fn reload() -> Self {
        Self::Reload { reason: None }
    }

    pub fn reload_with_reason(reason: impl Into<String>) -> Self {
        Self::Reload {
            reason: Some(reason.into()),
        }
    }

    pub fn connected() -> Self {
        Self::Connected {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn error(stage: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Error {
            stage: stage.into(),
            error: error.into(),
        }
    }

    pub fn clear_error() -> Self {
        Self::ClearError
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"reload"}"#.to_string())
    }

    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}
