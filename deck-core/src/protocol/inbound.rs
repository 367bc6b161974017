//! Inbound protocol messages.
//!
//! The connection hands us JSON objects of the form
//! `{ "event", "context"?, "action"?, "device"?, "payload"? }`. They are first
//! decoded into the loosely typed [`InboundEvent`] and then, once the routing
//! table has told us which shape to expect, into one of the typed events
//! wrapped by [`EventPayload`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DeckError, DeckResult};

/// Free-form settings object persisted by the host application.
pub type Settings = Map<String, Value>;

/// Raw inbound message after JSON decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub event: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Remaining top level fields, e.g. `deviceInfo`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InboundEvent {
    /// Build an event by name; mostly useful for synthesized events and tests.
    pub fn new<S: Into<String>>(event: S) -> Self {
        Self {
            event: event.into(),
            context: None,
            action: None,
            device: None,
            payload: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn with_action<S: Into<String>>(mut self, action: S) -> Self {
        self.action = Some(action.into());
        self
    }

    #[must_use]
    pub fn with_device<S: Into<String>>(mut self, device: S) -> Self {
        self.device = Some(device.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// `PayloadValidation` when the frame is not a JSON object or has no
    /// string `event` field.
    pub fn decode(text: &str) -> DeckResult<Self> {
        serde_json::from_str::<Self>(text)
            .map_err(|e: serde_json::Error| DeckError::payload_validation("<undecoded>", e.to_string()))
    }

    /// # Errors
    ///
    /// `PayloadValidation` when the frame has no `context`.
    pub fn require_context(&self) -> DeckResult<&str> {
        self.context
            .as_deref()
            .ok_or_else(|| self.missing("context"))
    }

    /// # Errors
    ///
    /// `PayloadValidation` when the frame has no `action`.
    pub fn require_action(&self) -> DeckResult<&str> {
        self.action.as_deref().ok_or_else(|| self.missing("action"))
    }

    /// # Errors
    ///
    /// `PayloadValidation` when the frame has no `device`.
    pub fn require_device(&self) -> DeckResult<&str> {
        self.device.as_deref().ok_or_else(|| self.missing("device"))
    }

    /// Deserialize the `payload` object into `T`.
    ///
    /// # Errors
    ///
    /// `PayloadValidation` when `payload` is absent or does not fit `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> DeckResult<T> {
        let payload: &Value = self.payload.as_ref().ok_or_else(|| self.missing("payload"))?;
        T::deserialize(payload).map_err(|e: serde_json::Error| {
            DeckError::payload_validation(&self.event, format!("payload: {e}"))
        })
    }

    /// Deserialize a top level field kept in `extra`.
    ///
    /// # Errors
    ///
    /// `PayloadValidation` when `key` is absent or does not fit `T`.
    pub fn extra_as<T: DeserializeOwned>(&self, key: &str) -> DeckResult<T> {
        let value: &Value = self.extra.get(key).ok_or_else(|| self.missing(key))?;
        T::deserialize(value).map_err(|e: serde_json::Error| {
            DeckError::payload_validation(&self.event, format!("{key}: {e}"))
        })
    }

    fn missing(&self, field: &str) -> DeckError {
        DeckError::payload_validation(&self.event, format!("missing field `{field}`"))
    }
}

/* ============================ Payload kinds ============================ */

/// Shape a route expects its inbound message to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Settings,
    GlobalSettings,
    Key,
    TouchTap,
    Dial,
    DialRotate,
    Appearance,
    TitleParameters,
    DeviceConnect,
    Device,
    Application,
    SystemWake,
    PropertyInspector,
    PluginMessage,
}

impl PayloadKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Settings => "Settings",
            Self::GlobalSettings => "GlobalSettings",
            Self::Key => "Key",
            Self::TouchTap => "TouchTap",
            Self::Dial => "Dial",
            Self::DialRotate => "DialRotate",
            Self::Appearance => "Appearance",
            Self::TitleParameters => "TitleParameters",
            Self::DeviceConnect => "DeviceConnect",
            Self::Device => "Device",
            Self::Application => "Application",
            Self::SystemWake => "SystemWake",
            Self::PropertyInspector => "PropertyInspector",
            Self::PluginMessage => "PluginMessage",
        }
    }

    /// Validate `raw` against this shape and build the typed event.
    ///
    /// # Errors
    ///
    /// `PayloadValidation` naming the first missing or malformed field.
    pub fn parse(self, raw: &InboundEvent) -> DeckResult<EventPayload> {
        let parsed: EventPayload = match self {
            Self::Settings => EventPayload::Settings(SettingsEvent {
                target: ActionTarget::from_raw(raw)?,
                payload: raw.payload_as()?,
            }),
            Self::GlobalSettings => EventPayload::GlobalSettings(GlobalSettingsEvent {
                payload: raw.payload_as()?,
            }),
            Self::Key => EventPayload::Key(KeyEvent {
                target: ActionTarget::from_raw(raw)?,
                payload: raw.payload_as()?,
            }),
            Self::TouchTap => EventPayload::TouchTap(TouchTapEvent {
                target: ActionTarget::from_raw(raw)?,
                payload: raw.payload_as()?,
            }),
            Self::Dial => EventPayload::Dial(DialEvent {
                target: ActionTarget::from_raw(raw)?,
                payload: raw.payload_as()?,
            }),
            Self::DialRotate => EventPayload::DialRotate(DialRotateEvent {
                target: ActionTarget::from_raw(raw)?,
                payload: raw.payload_as()?,
            }),
            Self::Appearance => EventPayload::Appearance(AppearanceEvent {
                target: ActionTarget::from_raw(raw)?,
                payload: raw.payload_as()?,
            }),
            Self::TitleParameters => EventPayload::TitleParameters(TitleParametersEvent {
                target: ActionTarget::from_raw(raw)?,
                payload: raw.payload_as()?,
            }),
            Self::DeviceConnect => EventPayload::DeviceConnect(DeviceConnectEvent {
                device: raw.require_device()?.to_owned(),
                device_info: raw.extra_as("deviceInfo")?,
            }),
            Self::Device => EventPayload::Device(DeviceEvent {
                device: raw.require_device()?.to_owned(),
            }),
            Self::Application => EventPayload::Application(ApplicationEvent {
                payload: raw.payload_as()?,
            }),
            Self::SystemWake => EventPayload::SystemWake(SystemWakeEvent),
            Self::PropertyInspector => EventPayload::PropertyInspector(PropertyInspectorEvent {
                target: ActionTarget::from_raw(raw)?,
            }),
            Self::PluginMessage => EventPayload::PluginMessage(PluginMessageEvent {
                target: ActionTarget::from_raw(raw)?,
                payload: raw.payload.clone().unwrap_or(Value::Null),
            }),
        };

        Ok(parsed)
    }
}

/* ============================ Typed events ============================= */

/// Position of a key or dial on the device grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub column: u32,
    pub row: u32,
}

/// Addressing shared by every action scoped event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTarget {
    /// Action type identifier.
    pub action: String,
    /// Identifier of the placed button or dial.
    pub context: String,
    pub device: Option<String>,
}

impl ActionTarget {
    fn from_raw(raw: &InboundEvent) -> DeckResult<Self> {
        Ok(Self {
            action: raw.require_action()?.to_owned(),
            context: raw.require_context()?.to_owned(),
            device: raw.device.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPayload {
    #[serde(default)]
    pub settings: Settings,
    pub coordinates: Option<Coordinates>,
    pub state: Option<u32>,
    #[serde(default)]
    pub is_in_multi_action: bool,
    pub controller: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettingsEvent {
    pub target: ActionTarget,
    pub payload: SettingsPayload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettingsPayload {
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSettingsEvent {
    pub payload: GlobalSettingsPayload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPayload {
    #[serde(default)]
    pub settings: Settings,
    pub coordinates: Option<Coordinates>,
    pub state: Option<u32>,
    pub user_desired_state: Option<u32>,
    #[serde(default)]
    pub is_in_multi_action: bool,
}

/// Key press, release, or one of the synthesized gestures.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEvent {
    pub target: ActionTarget,
    pub payload: KeyPayload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TouchTapPayload {
    #[serde(default)]
    pub settings: Settings,
    pub coordinates: Option<Coordinates>,
    pub tap_pos: Option<[i32; 2]>,
    #[serde(default)]
    pub hold: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TouchTapEvent {
    pub target: ActionTarget,
    pub payload: TouchTapPayload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialPayload {
    #[serde(default)]
    pub settings: Settings,
    pub coordinates: Option<Coordinates>,
    pub controller: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialEvent {
    pub target: ActionTarget,
    pub payload: DialPayload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialRotatePayload {
    #[serde(default)]
    pub settings: Settings,
    pub coordinates: Option<Coordinates>,
    pub ticks: i32,
    #[serde(default)]
    pub pressed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialRotateEvent {
    pub target: ActionTarget,
    pub payload: DialRotatePayload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppearancePayload {
    #[serde(default)]
    pub settings: Settings,
    pub coordinates: Option<Coordinates>,
    pub controller: Option<String>,
    pub state: Option<u32>,
    #[serde(default)]
    pub is_in_multi_action: bool,
}

/// `willAppear` / `willDisappear`.
#[derive(Debug, Clone, PartialEq)]
pub struct AppearanceEvent {
    pub target: ActionTarget,
    pub payload: AppearancePayload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleParameters {
    pub font_family: Option<String>,
    pub font_size: Option<u32>,
    pub font_style: Option<String>,
    #[serde(default)]
    pub font_underline: bool,
    #[serde(default)]
    pub show_title: bool,
    pub title_alignment: Option<String>,
    pub title_color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleParametersPayload {
    #[serde(default)]
    pub settings: Settings,
    pub coordinates: Option<Coordinates>,
    pub state: Option<u32>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub title_parameters: TitleParameters,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TitleParametersEvent {
    pub target: ActionTarget,
    pub payload: TitleParametersPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSize {
    pub columns: u32,
    pub rows: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: u32,
    pub size: Option<DeviceSize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConnectEvent {
    pub device: String,
    pub device_info: DeviceInfo,
}

/// `deviceDidDisconnect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub device: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationPayload {
    pub application: String,
}

/// `applicationDidLaunch` / `applicationDidTerminate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationEvent {
    pub payload: ApplicationPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemWakeEvent;

/// `propertyInspectorDidAppear` / `propertyInspectorDidDisappear`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInspectorEvent {
    pub target: ActionTarget,
}

/// `sendToPlugin` / `sendToPropertyInspector`: arbitrary JSON from the
/// property inspector.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginMessageEvent {
    pub target: ActionTarget,
    pub payload: Value,
}

/// Typed event handed to handlers, one variant per [`PayloadKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Settings(SettingsEvent),
    GlobalSettings(GlobalSettingsEvent),
    Key(KeyEvent),
    TouchTap(TouchTapEvent),
    Dial(DialEvent),
    DialRotate(DialRotateEvent),
    Appearance(AppearanceEvent),
    TitleParameters(TitleParametersEvent),
    DeviceConnect(DeviceConnectEvent),
    Device(DeviceEvent),
    Application(ApplicationEvent),
    SystemWake(SystemWakeEvent),
    PropertyInspector(PropertyInspectorEvent),
    PluginMessage(PluginMessageEvent),
}

impl EventPayload {
    #[must_use]
    pub const fn kind(&self) -> PayloadKind {
        match self {
            Self::Settings(_) => PayloadKind::Settings,
            Self::GlobalSettings(_) => PayloadKind::GlobalSettings,
            Self::Key(_) => PayloadKind::Key,
            Self::TouchTap(_) => PayloadKind::TouchTap,
            Self::Dial(_) => PayloadKind::Dial,
            Self::DialRotate(_) => PayloadKind::DialRotate,
            Self::Appearance(_) => PayloadKind::Appearance,
            Self::TitleParameters(_) => PayloadKind::TitleParameters,
            Self::DeviceConnect(_) => PayloadKind::DeviceConnect,
            Self::Device(_) => PayloadKind::Device,
            Self::Application(_) => PayloadKind::Application,
            Self::SystemWake(_) => PayloadKind::SystemWake,
            Self::PropertyInspector(_) => PayloadKind::PropertyInspector,
            Self::PluginMessage(_) => PayloadKind::PluginMessage,
        }
    }

    /// Action addressing, for action scoped events.
    #[must_use]
    pub const fn target(&self) -> Option<&ActionTarget> {
        match self {
            Self::Settings(ev) => Some(&ev.target),
            Self::Key(ev) => Some(&ev.target),
            Self::TouchTap(ev) => Some(&ev.target),
            Self::Dial(ev) => Some(&ev.target),
            Self::DialRotate(ev) => Some(&ev.target),
            Self::Appearance(ev) => Some(&ev.target),
            Self::TitleParameters(ev) => Some(&ev.target),
            Self::PropertyInspector(ev) => Some(&ev.target),
            Self::PluginMessage(ev) => Some(&ev.target),
            Self::GlobalSettings(_)
            | Self::DeviceConnect(_)
            | Self::Device(_)
            | Self::Application(_)
            | Self::SystemWake(_) => None,
        }
    }

    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.target().map(|t: &ActionTarget| t.context.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_keeps_unknown_top_level_fields() {
        let raw: InboundEvent = InboundEvent::decode(
            r#"{"event":"deviceDidConnect","device":"D1","deviceInfo":{"name":"XL","type":2,"size":{"columns":8,"rows":4}}}"#,
        )
        .unwrap();

        assert_eq!(raw.event, "deviceDidConnect");
        assert_eq!(raw.device.as_deref(), Some("D1"));
        assert!(raw.extra.contains_key("deviceInfo"));

        let EventPayload::DeviceConnect(ev) = PayloadKind::DeviceConnect.parse(&raw).unwrap() else {
            panic!("expected device connect payload");
        };
        assert_eq!(ev.device_info.name, "XL");
        assert_eq!(ev.device_info.kind, 2);
        assert_eq!(ev.device_info.size, Some(DeviceSize { columns: 8, rows: 4 }));
    }

    #[test]
    fn test_decode_requires_event_name() {
        let err: DeckError = InboundEvent::decode(r#"{"context":"ctx1"}"#).unwrap_err();
        assert!(matches!(err, DeckError::PayloadValidation { .. }));

        assert!(InboundEvent::decode("not json").is_err());
    }

    #[test]
    fn test_key_event_parses_camel_case_payload() {
        let raw: InboundEvent = InboundEvent::new("keyDown")
            .with_action("com.example.a")
            .with_context("ctx1")
            .with_device("D1")
            .with_payload(json!({
                "settings": {"count": 3},
                "coordinates": {"column": 1, "row": 2},
                "isInMultiAction": true,
                "userDesiredState": 1
            }));

        let EventPayload::Key(ev) = PayloadKind::Key.parse(&raw).unwrap() else {
            panic!("expected key payload");
        };
        assert_eq!(ev.target.context, "ctx1");
        assert_eq!(ev.target.action, "com.example.a");
        assert_eq!(ev.payload.coordinates, Some(Coordinates { column: 1, row: 2 }));
        assert!(ev.payload.is_in_multi_action);
        assert_eq!(ev.payload.user_desired_state, Some(1));
        assert_eq!(ev.payload.settings.get("count"), Some(&json!(3)));
    }

    #[test]
    fn test_missing_required_field_is_a_validation_failure() {
        let no_context: InboundEvent = InboundEvent::new("keyUp")
            .with_action("com.example.a")
            .with_payload(json!({}));
        let err: DeckError = PayloadKind::Key.parse(&no_context).unwrap_err();
        assert!(err.to_string().contains("context"));

        let no_payload: InboundEvent = InboundEvent::new("applicationDidLaunch");
        assert!(PayloadKind::Application.parse(&no_payload).is_err());

        let wrong_type: InboundEvent = InboundEvent::new("dialRotate")
            .with_action("a")
            .with_context("c")
            .with_payload(json!({"ticks": "three"}));
        assert!(PayloadKind::DialRotate.parse(&wrong_type).is_err());
    }

    #[test]
    fn test_system_wake_needs_nothing() {
        let raw: InboundEvent = InboundEvent::new("systemDidWakeUp");
        let parsed: EventPayload = PayloadKind::SystemWake.parse(&raw).unwrap();
        assert_eq!(parsed.kind(), PayloadKind::SystemWake);
        assert!(parsed.context().is_none());
    }
}
