//! Registration handshake and the host `Info` document passed at launch.

use serde::{Deserialize, Serialize};

/// First message on a fresh connection: `{"event": <registerEvent>, "uuid": <pluginUuid>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub event: String,
    pub uuid: String,
}

impl Registration {
    pub fn new<S1: Into<String>, S2: Into<String>>(event: S1, uuid: S2) -> Self {
        Self {
            event: event.into(),
            uuid: uuid.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoApplication {
    #[serde(default)]
    pub font: String,
    pub language: String,
    pub platform: String,
    pub platform_version: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoPlugin {
    pub uuid: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoColors {
    pub button_pressed_background_color: Option<String>,
    pub button_pressed_border_color: Option<String>,
    pub button_pressed_text_color: Option<String>,
    pub disabled_color: Option<String>,
    pub highlight_color: Option<String>,
    pub mouse_down_color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoDeviceSize {
    pub columns: u32,
    pub rows: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoDevice {
    pub id: String,
    pub name: String,
    pub size: InfoDeviceSize,
    #[serde(rename = "type")]
    pub kind: u32,
}

/// Environment description handed to the plugin on launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    pub application: InfoApplication,
    pub plugin: InfoPlugin,
    pub device_pixel_ratio: u32,
    #[serde(default)]
    pub colors: InfoColors,
    #[serde(default)]
    pub devices: Vec<InfoDevice>,
}

impl Info {
    /// Parse the `-info` launch argument.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the document does not match.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_parses_host_document() {
        let info: Info = Info::from_json(
            r##"{
                "application": {"font": ".AppleSystemUIFont", "language": "en", "platform": "mac",
                                "platformVersion": "14.1", "version": "6.4.0"},
                "plugin": {"uuid": "com.example.plugin", "version": "1.0.0"},
                "devicePixelRatio": 2,
                "colors": {"highlightColor": "#0078FFFF"},
                "devices": [{"id": "D1", "name": "Stream Deck", "size": {"columns": 5, "rows": 3}, "type": 0}]
            }"##,
        )
        .unwrap();

        assert_eq!(info.plugin.uuid, "com.example.plugin");
        assert_eq!(info.device_pixel_ratio, 2);
        assert_eq!(info.colors.highlight_color.as_deref(), Some("#0078FFFF"));
        assert_eq!(info.devices[0].size.columns, 5);
    }

    #[test]
    fn test_registration_wire_shape() {
        let reg: Registration = Registration::new("registerPlugin", "abc");
        assert_eq!(
            serde_json::to_string(&reg).unwrap(),
            r#"{"event":"registerPlugin","uuid":"abc"}"#
        );
    }
}
