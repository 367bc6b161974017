//! Event routing table.
//!
//! Maps each inbound event name to a [`Route`]: who receives it
//! ([`DispatchScope`]), what shape it must have ([`PayloadKind`]) and which
//! handler method runs ([`HandlerMethod`]). The table is built once at
//! startup and never mutated; lookups for names it does not know return
//! `None` so newer hosts can send events this build has never heard of.

use std::collections::HashMap;

use ahash::RandomState;
use tracing::debug;

use crate::error::{DeckError, DeckResult};
use crate::protocol::inbound::PayloadKind;

/// Tracing target for dispatch operations.
pub const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Synthetic event emitted when a key is held past its long-press delay.
pub const KEY_LONG_PRESS: &str = "keyLongPress";

/// Synthetic event emitted for a release inside the double-press window.
pub const KEY_DOUBLE_PRESS: &str = "keyDoublePress";

pub const KEY_DOWN: &str = "keyDown";
pub const KEY_UP: &str = "keyUp";

/// Handler population a route is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchScope {
    /// Only the plugin root observes the event.
    PluginOnly,
    /// Every registered action receives its own copy.
    BroadcastToAllActions,
    /// The single action named by the event's `action` field.
    TargetedAction,
}

/// Handler method a route invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerMethod {
    OnDidReceiveSettings,
    OnDidReceiveGlobalSettings,
    OnKeyDown,
    OnKeyUp,
    OnKeyLongPress,
    OnKeyDoublePress,
    OnTouchTap,
    OnDialDown,
    OnDialUp,
    OnDialPress,
    OnDialRotate,
    OnWillAppear,
    OnWillDisappear,
    OnTitleParametersDidChange,
    OnDeviceDidConnect,
    OnDeviceDidDisconnect,
    OnApplicationDidLaunch,
    OnApplicationDidTerminate,
    OnSystemDidWakeUp,
    OnPropertyInspectorDidAppear,
    OnPropertyInspectorDidDisappear,
    OnSendToPlugin,
    OnSendToPropertyInspector,
}

impl HandlerMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnDidReceiveSettings => "on_did_receive_settings",
            Self::OnDidReceiveGlobalSettings => "on_did_receive_global_settings",
            Self::OnKeyDown => "on_key_down",
            Self::OnKeyUp => "on_key_up",
            Self::OnKeyLongPress => "on_key_long_press",
            Self::OnKeyDoublePress => "on_key_double_press",
            Self::OnTouchTap => "on_touch_tap",
            Self::OnDialDown => "on_dial_down",
            Self::OnDialUp => "on_dial_up",
            Self::OnDialPress => "on_dial_press",
            Self::OnDialRotate => "on_dial_rotate",
            Self::OnWillAppear => "on_will_appear",
            Self::OnWillDisappear => "on_will_disappear",
            Self::OnTitleParametersDidChange => "on_title_parameters_did_change",
            Self::OnDeviceDidConnect => "on_device_did_connect",
            Self::OnDeviceDidDisconnect => "on_device_did_disconnect",
            Self::OnApplicationDidLaunch => "on_application_did_launch",
            Self::OnApplicationDidTerminate => "on_application_did_terminate",
            Self::OnSystemDidWakeUp => "on_system_did_wake_up",
            Self::OnPropertyInspectorDidAppear => "on_property_inspector_did_appear",
            Self::OnPropertyInspectorDidDisappear => "on_property_inspector_did_disappear",
            Self::OnSendToPlugin => "on_send_to_plugin",
            Self::OnSendToPropertyInspector => "on_send_to_property_inspector",
        }
    }

    /// Payload shape this method's signature accepts.
    #[must_use]
    pub const fn payload_kind(self) -> PayloadKind {
        match self {
            Self::OnDidReceiveSettings => PayloadKind::Settings,
            Self::OnDidReceiveGlobalSettings => PayloadKind::GlobalSettings,
            Self::OnKeyDown | Self::OnKeyUp | Self::OnKeyLongPress | Self::OnKeyDoublePress => {
                PayloadKind::Key
            }
            Self::OnTouchTap => PayloadKind::TouchTap,
            Self::OnDialDown | Self::OnDialUp | Self::OnDialPress => PayloadKind::Dial,
            Self::OnDialRotate => PayloadKind::DialRotate,
            Self::OnWillAppear | Self::OnWillDisappear => PayloadKind::Appearance,
            Self::OnTitleParametersDidChange => PayloadKind::TitleParameters,
            Self::OnDeviceDidConnect => PayloadKind::DeviceConnect,
            Self::OnDeviceDidDisconnect => PayloadKind::Device,
            Self::OnApplicationDidLaunch | Self::OnApplicationDidTerminate => {
                PayloadKind::Application
            }
            Self::OnSystemDidWakeUp => PayloadKind::SystemWake,
            Self::OnPropertyInspectorDidAppear | Self::OnPropertyInspectorDidDisappear => {
                PayloadKind::PropertyInspector
            }
            Self::OnSendToPlugin | Self::OnSendToPropertyInspector => PayloadKind::PluginMessage,
        }
    }
}

/// Immutable routing descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    pub scope: DispatchScope,
    pub payload: PayloadKind,
    pub handler: HandlerMethod,
}

impl Route {
    /// Route whose payload kind is implied by the handler method.
    #[must_use]
    pub const fn new(scope: DispatchScope, handler: HandlerMethod) -> Self {
        Self {
            scope,
            payload: handler.payload_kind(),
            handler,
        }
    }

    #[must_use]
    pub const fn targeted(handler: HandlerMethod) -> Self {
        Self::new(DispatchScope::TargetedAction, handler)
    }

    #[must_use]
    pub const fn broadcast(handler: HandlerMethod) -> Self {
        Self::new(DispatchScope::BroadcastToAllActions, handler)
    }

    #[must_use]
    pub const fn plugin_only(handler: HandlerMethod) -> Self {
        Self::new(DispatchScope::PluginOnly, handler)
    }
}

/// Event name to route lookup.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    routes: HashMap<String, Route, RandomState>,
}

impl RoutingTable {
    #[must_use]
    pub fn builder() -> RoutingTableBuilder {
        RoutingTableBuilder::default()
    }

    /// Every event the host protocol defines, plus the two synthesized key
    /// gestures.
    ///
    /// # Errors
    ///
    /// Only if the built-in table were inconsistent; callers treat that as
    /// fatal at startup.
    pub fn standard() -> DeckResult<Self> {
        use HandlerMethod as M;

        Self::builder()
            .route("didReceiveSettings", Route::targeted(M::OnDidReceiveSettings))?
            .route(KEY_DOWN, Route::targeted(M::OnKeyDown))?
            .route(KEY_UP, Route::targeted(M::OnKeyUp))?
            .route(KEY_LONG_PRESS, Route::targeted(M::OnKeyLongPress))?
            .route(KEY_DOUBLE_PRESS, Route::targeted(M::OnKeyDoublePress))?
            .route("touchTap", Route::targeted(M::OnTouchTap))?
            .route("dialDown", Route::targeted(M::OnDialDown))?
            .route("dialUp", Route::targeted(M::OnDialUp))?
            .route("dialPress", Route::targeted(M::OnDialPress))?
            .route("dialRotate", Route::targeted(M::OnDialRotate))?
            .route("willAppear", Route::targeted(M::OnWillAppear))?
            .route("willDisappear", Route::targeted(M::OnWillDisappear))?
            .route(
                "titleParametersDidChange",
                Route::targeted(M::OnTitleParametersDidChange),
            )?
            .route(
                "propertyInspectorDidAppear",
                Route::targeted(M::OnPropertyInspectorDidAppear),
            )?
            .route(
                "propertyInspectorDidDisappear",
                Route::targeted(M::OnPropertyInspectorDidDisappear),
            )?
            .route("sendToPlugin", Route::targeted(M::OnSendToPlugin))?
            .route(
                "sendToPropertyInspector",
                Route::targeted(M::OnSendToPropertyInspector),
            )?
            .route(
                "didReceiveGlobalSettings",
                Route::broadcast(M::OnDidReceiveGlobalSettings),
            )?
            .route("deviceDidConnect", Route::broadcast(M::OnDeviceDidConnect))?
            .route("deviceDidDisconnect", Route::broadcast(M::OnDeviceDidDisconnect))?
            .route("applicationDidLaunch", Route::broadcast(M::OnApplicationDidLaunch))?
            .route(
                "applicationDidTerminate",
                Route::broadcast(M::OnApplicationDidTerminate),
            )?
            .route("systemDidWakeUp", Route::broadcast(M::OnSystemDidWakeUp))
            .map(RoutingTableBuilder::build)
    }

    /// Look up the route for an event name.
    #[must_use]
    pub fn resolve(&self, event: &str) -> Option<&Route> {
        self.routes.get(event)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Route)> {
        self.routes.iter().map(|(name, route)| (name.as_str(), route))
    }
}

/// Checked construction of a [`RoutingTable`].
#[derive(Debug, Default)]
pub struct RoutingTableBuilder {
    routes: HashMap<String, Route, RandomState>,
}

impl RoutingTableBuilder {
    /// Add one route.
    ///
    /// # Errors
    ///
    /// `DuplicateRoute` if the name is already taken, `RouteMismatch` if the
    /// handler method cannot accept the declared payload kind.
    pub fn route<S: Into<String>>(mut self, event: S, route: Route) -> DeckResult<Self> {
        let event: String = event.into();

        if route.handler.payload_kind() != route.payload {
            return Err(DeckError::RouteMismatch {
                event,
                method: route.handler.as_str(),
                payload: route.payload.as_str(),
            });
        }

        if self.routes.contains_key(&event) {
            return Err(DeckError::DuplicateRoute { event });
        }

        debug!(
            target: DISPATCH_TARGET,
            event = %event,
            scope = ?route.scope,
            method = route.handler.as_str(),
            "route registered"
        );
        self.routes.insert(event, route);
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> RoutingTable {
        RoutingTable {
            routes: self.routes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_resolves_every_protocol_event() {
        let table: RoutingTable = RoutingTable::standard().unwrap();
        assert_eq!(table.len(), 23);

        let key_down: &Route = table.resolve("keyDown").unwrap();
        assert_eq!(key_down.scope, DispatchScope::TargetedAction);
        assert_eq!(key_down.payload, PayloadKind::Key);
        assert_eq!(key_down.handler, HandlerMethod::OnKeyDown);

        let global: &Route = table.resolve("didReceiveGlobalSettings").unwrap();
        assert_eq!(global.scope, DispatchScope::BroadcastToAllActions);
        assert_eq!(global.handler, HandlerMethod::OnDidReceiveGlobalSettings);

        assert!(table.resolve(KEY_LONG_PRESS).is_some());
        assert!(table.resolve(KEY_DOUBLE_PRESS).is_some());
    }

    #[test]
    fn test_resolve_returns_exactly_what_was_registered() {
        let table: RoutingTable = RoutingTable::standard().unwrap();
        for (name, route) in table.iter() {
            assert_eq!(table.resolve(name), Some(route));
            assert_eq!(route.payload, route.handler.payload_kind());
        }
    }

    #[test]
    fn test_unknown_event_is_not_found() {
        let table: RoutingTable = RoutingTable::standard().unwrap();
        assert!(table.resolve("unknownThing").is_none());
        assert!(table.resolve("").is_none());
        assert!(table.resolve("KEYDOWN").is_none());
    }

    #[test]
    fn test_duplicate_event_name_is_rejected() {
        let err: DeckError = RoutingTable::builder()
            .route("keyDown", Route::targeted(HandlerMethod::OnKeyDown))
            .unwrap()
            .route("keyDown", Route::plugin_only(HandlerMethod::OnKeyUp))
            .unwrap_err();

        assert!(matches!(err, DeckError::DuplicateRoute { ref event } if event == "keyDown"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_mismatched_payload_is_rejected() {
        let route: Route = Route {
            scope: DispatchScope::TargetedAction,
            payload: PayloadKind::Dial,
            handler: HandlerMethod::OnKeyDown,
        };
        let err: DeckError = RoutingTable::builder().route("keyDown", route).unwrap_err();
        assert!(matches!(err, DeckError::RouteMismatch { .. }));
    }
}
