//! Outbound commands understood by the host application.
//!
//! Every message serializes to a JSON object carrying an `event`
//! discriminator, e.g. `{"event":"showOk","context":"..."}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::inbound::Settings;

/// Where a title or image is shown: hardware and software (0), hardware
/// only (1) or software only (2).
pub const TARGET_BOTH: u8 = 0;
pub const TARGET_HARDWARE: u8 = 1;
pub const TARGET_SOFTWARE: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenUrlPayload {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessagePayload {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTitlePayload {
    /// Title to display; an empty title falls back to the user's title.
    pub title: String,
    pub target: u8,
    /// Limit the change to one state of a multi-state action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<u32>,
}

impl SetTitlePayload {
    pub fn new<S: Into<String>>(title: S) -> Self {
        Self {
            title: title.into(),
            target: TARGET_BOTH,
            state: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetImagePayload {
    /// Base64 data URL (`data:image/png;base64,...`) or SVG.
    pub image: String,
    pub target: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<u32>,
}

impl SetImagePayload {
    pub fn new<S: Into<String>>(image: S) -> Self {
        Self {
            image: image.into(),
            target: TARGET_BOTH,
            state: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStatePayload {
    pub state: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchToProfilePayload {
    pub profile: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetFeedbackLayoutPayload {
    /// Built-in layout id or relative path to a layout JSON file.
    pub layout: String,
}

/// Schema-checked outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum OutboundMessage {
    SetSettings {
        context: String,
        payload: Settings,
    },
    GetSettings {
        context: String,
    },
    SetGlobalSettings {
        context: String,
        payload: Settings,
    },
    GetGlobalSettings {
        context: String,
    },
    OpenUrl {
        payload: OpenUrlPayload,
    },
    LogMessage {
        payload: LogMessagePayload,
    },
    SetTitle {
        context: String,
        payload: SetTitlePayload,
    },
    SetImage {
        context: String,
        payload: SetImagePayload,
    },
    SetFeedback {
        context: String,
        payload: Settings,
    },
    SetFeedbackLayout {
        context: String,
        payload: SetFeedbackLayoutPayload,
    },
    ShowAlert {
        context: String,
    },
    ShowOk {
        context: String,
    },
    SetState {
        context: String,
        payload: SetStatePayload,
    },
    SwitchToProfile {
        context: String,
        device: String,
        payload: SwitchToProfilePayload,
    },
    SendToPropertyInspector {
        action: String,
        context: String,
        payload: Value,
    },
    SendToPlugin {
        action: String,
        context: String,
        payload: Value,
    },
}

impl OutboundMessage {
    /// Wire name of the `event` discriminator.
    #[must_use]
    pub const fn event(&self) -> &'static str {
        match self {
            Self::SetSettings { .. } => "setSettings",
            Self::GetSettings { .. } => "getSettings",
            Self::SetGlobalSettings { .. } => "setGlobalSettings",
            Self::GetGlobalSettings { .. } => "getGlobalSettings",
            Self::OpenUrl { .. } => "openUrl",
            Self::LogMessage { .. } => "logMessage",
            Self::SetTitle { .. } => "setTitle",
            Self::SetImage { .. } => "setImage",
            Self::SetFeedback { .. } => "setFeedback",
            Self::SetFeedbackLayout { .. } => "setFeedbackLayout",
            Self::ShowAlert { .. } => "showAlert",
            Self::ShowOk { .. } => "showOk",
            Self::SetState { .. } => "setState",
            Self::SwitchToProfile { .. } => "switchToProfile",
            Self::SendToPropertyInspector { .. } => "sendToPropertyInspector",
            Self::SendToPlugin { .. } => "sendToPlugin",
        }
    }
}
