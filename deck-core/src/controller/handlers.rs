//! Handler capability traits.
//!
//! Three small interfaces instead of one inheritance tree:
//! - [`PluginEventObserver`]: plugin-wide events (devices, applications,
//!   global settings, wake-up).
//! - [`ActionEventHandler`]: one object per action type, receiving the
//!   events of every button placed with that action plus the plugin-wide
//!   broadcasts.
//! - [`PluginHandler`]: the plugin root, which may observe every event.
//!
//! Outbound commands go through the [`Sender`] carried by [`EventContext`].
//! Every method defaults to a no-op, so implementors override only what they
//! need.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;

use super::key_timing::KeyTiming;
use super::routing::HandlerMethod;
use super::sender::Sender;
use crate::model::settings::{GlobalSettings, SettingsCache};
use crate::protocol::inbound::{
    AppearanceEvent, ApplicationEvent, DeviceConnectEvent, DeviceEvent, DialEvent,
    DialRotateEvent, EventPayload, GlobalSettingsEvent, KeyEvent, PluginMessageEvent,
    PropertyInspectorEvent, Settings, SettingsEvent, SystemWakeEvent, TitleParametersEvent,
    TouchTapEvent,
};
use crate::protocol::registration::Info;

/// Result every handler method returns; an `Err` is logged at the task boundary.
pub type HandlerResult = anyhow::Result<()>;

/// What a handler invocation may see and do.
///
/// Action handlers read their own action's settings cache; the plugin root
/// reads the plugin-wide one.
#[derive(Debug, Clone)]
pub struct EventContext {
    sender: Sender,
    global: Arc<GlobalSettings>,
    settings: Option<Arc<SettingsCache>>,
    context: Option<String>,
    info: Option<Arc<Info>>,
}

impl EventContext {
    pub(crate) fn new(
        sender: Sender,
        global: Arc<GlobalSettings>,
        settings: Option<Arc<SettingsCache>>,
        context: Option<String>,
        info: Option<Arc<Info>>,
    ) -> Self {
        Self {
            sender,
            global,
            settings,
            context,
            info,
        }
    }

    #[must_use]
    pub const fn sender(&self) -> &Sender {
        &self.sender
    }

    /// Button instance the event belongs to, if any.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Latest global settings pushed by the host.
    #[must_use]
    pub fn global_settings(&self) -> Arc<Settings> {
        self.global.snapshot()
    }

    /// Cached settings of this event's button.
    #[must_use]
    pub fn settings(&self) -> Option<Settings> {
        let context: &str = self.context.as_deref()?;
        self.settings.as_ref()?.get(context)
    }

    #[must_use]
    pub fn setting(&self, key: &str) -> Option<Value> {
        let context: &str = self.context.as_deref()?;
        self.settings.as_ref()?.value(context, key)
    }

    /// Host environment passed at launch, when the glue provided it.
    #[must_use]
    pub fn info(&self) -> Option<&Info> {
        self.info.as_deref()
    }
}

/// Plugin-wide events. Broadcast to every action and observed by the plugin root.
#[async_trait]
pub trait PluginEventObserver: Send + Sync {
    async fn on_did_receive_global_settings(
        &self,
        _cx: &EventContext,
        _event: &GlobalSettingsEvent,
    ) -> HandlerResult {
        Ok(())
    }

    async fn on_device_did_connect(
        &self,
        _cx: &EventContext,
        _event: &DeviceConnectEvent,
    ) -> HandlerResult {
        Ok(())
    }

    async fn on_device_did_disconnect(
        &self,
        _cx: &EventContext,
        _event: &DeviceEvent,
    ) -> HandlerResult {
        Ok(())
    }

    async fn on_application_did_launch(
        &self,
        _cx: &EventContext,
        _event: &ApplicationEvent,
    ) -> HandlerResult {
        Ok(())
    }

    async fn on_application_did_terminate(
        &self,
        _cx: &EventContext,
        _event: &ApplicationEvent,
    ) -> HandlerResult {
        Ok(())
    }

    async fn on_system_did_wake_up(
        &self,
        _cx: &EventContext,
        _event: &SystemWakeEvent,
    ) -> HandlerResult {
        Ok(())
    }
}

/// One live object per action type, shared by all its button instances.
#[async_trait]
pub trait ActionEventHandler: PluginEventObserver {
    /// Action type identifier from the plugin manifest, e.g. `com.example.volume.up`.
    fn action_id(&self) -> &str;

    /// Opt into long and double press detection.
    ///
    /// `None` delivers raw `keyDown`/`keyUp` unchanged.
    fn key_timing(&self) -> Option<KeyTiming> {
        None
    }

    async fn on_did_receive_settings(
        &self,
        _cx: &EventContext,
        _event: &SettingsEvent,
    ) -> HandlerResult {
        Ok(())
    }

    async fn on_key_down(&self, _cx: &EventContext, _event: &KeyEvent) -> HandlerResult {
        Ok(())
    }

    async fn on_key_up(&self, _cx: &EventContext, _event: &KeyEvent) -> HandlerResult {
        Ok(())
    }

    /// Key held for at least the long-press delay. The release that follows
    /// is swallowed.
    async fn on_key_long_press(&self, _cx: &EventContext, _event: &KeyEvent) -> HandlerResult {
        Ok(())
    }

    /// Release within the double-press window of the previous release.
    async fn on_key_double_press(&self, _cx: &EventContext, _event: &KeyEvent) -> HandlerResult {
        Ok(())
    }

    async fn on_touch_tap(&self, _cx: &EventContext, _event: &TouchTapEvent) -> HandlerResult {
        Ok(())
    }

    async fn on_dial_down(&self, _cx: &EventContext, _event: &DialEvent) -> HandlerResult {
        Ok(())
    }

    async fn on_dial_up(&self, _cx: &EventContext, _event: &DialEvent) -> HandlerResult {
        Ok(())
    }

    async fn on_dial_press(&self, _cx: &EventContext, _event: &DialEvent) -> HandlerResult {
        Ok(())
    }

    async fn on_dial_rotate(&self, _cx: &EventContext, _event: &DialRotateEvent) -> HandlerResult {
        Ok(())
    }

    async fn on_will_appear(&self, _cx: &EventContext, _event: &AppearanceEvent) -> HandlerResult {
        Ok(())
    }

    async fn on_will_disappear(
        &self,
        _cx: &EventContext,
        _event: &AppearanceEvent,
    ) -> HandlerResult {
        Ok(())
    }

    async fn on_title_parameters_did_change(
        &self,
        _cx: &EventContext,
        _event: &TitleParametersEvent,
    ) -> HandlerResult {
        Ok(())
    }

    async fn on_property_inspector_did_appear(
        &self,
        _cx: &EventContext,
        _event: &PropertyInspectorEvent,
    ) -> HandlerResult {
        Ok(())
    }

    async fn on_property_inspector_did_disappear(
        &self,
        _cx: &EventContext,
        _event: &PropertyInspectorEvent,
    ) -> HandlerResult {
        Ok(())
    }

    async fn on_send_to_plugin(
        &self,
        _cx: &EventContext,
        _event: &PluginMessageEvent,
    ) -> HandlerResult {
        Ok(())
    }

    async fn on_send_to_property_inspector(
        &self,
        _cx: &EventContext,
        _event: &PluginMessageEvent,
    ) -> HandlerResult {
        Ok(())
    }
}

/// The plugin root. Sees plugin-wide events through [`PluginEventObserver`]
/// and every action scoped event through [`PluginHandler::on_action_event`].
#[async_trait]
pub trait PluginHandler: PluginEventObserver {
    async fn on_action_event(
        &self,
        _cx: &EventContext,
        _method: HandlerMethod,
        _event: &EventPayload,
    ) -> HandlerResult {
        Ok(())
    }
}

/// Plugin root that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPlugin;

impl PluginEventObserver for NoopPlugin {}

impl PluginHandler for NoopPlugin {}

fn mismatch(method: HandlerMethod, event: &EventPayload) -> anyhow::Error {
    anyhow!(
        "{} cannot take a {} payload",
        method.as_str(),
        event.kind().as_str()
    )
}

/// Plugin-wide methods shared by both handler kinds. `None` when `method`
/// is not one of them.
async fn invoke_observer<O: PluginEventObserver + ?Sized>(
    observer: &O,
    method: HandlerMethod,
    cx: &EventContext,
    event: &EventPayload,
) -> Option<HandlerResult> {
    use EventPayload as P;
    use HandlerMethod as M;

    let result: HandlerResult = match (method, event) {
        (M::OnDidReceiveGlobalSettings, P::GlobalSettings(ev)) => {
            observer.on_did_receive_global_settings(cx, ev).await
        }
        (M::OnDeviceDidConnect, P::DeviceConnect(ev)) => observer.on_device_did_connect(cx, ev).await,
        (M::OnDeviceDidDisconnect, P::Device(ev)) => observer.on_device_did_disconnect(cx, ev).await,
        (M::OnApplicationDidLaunch, P::Application(ev)) => {
            observer.on_application_did_launch(cx, ev).await
        }
        (M::OnApplicationDidTerminate, P::Application(ev)) => {
            observer.on_application_did_terminate(cx, ev).await
        }
        (M::OnSystemDidWakeUp, P::SystemWake(ev)) => observer.on_system_did_wake_up(cx, ev).await,
        _ => return None,
    };
    Some(result)
}

/// Call the trait method `method` names on an action handler.
pub(crate) async fn invoke_action(
    handler: &dyn ActionEventHandler,
    method: HandlerMethod,
    cx: &EventContext,
    event: &EventPayload,
) -> HandlerResult {
    use EventPayload as P;
    use HandlerMethod as M;

    match (method, event) {
        (M::OnDidReceiveSettings, P::Settings(ev)) => handler.on_did_receive_settings(cx, ev).await,
        (M::OnKeyDown, P::Key(ev)) => handler.on_key_down(cx, ev).await,
        (M::OnKeyUp, P::Key(ev)) => handler.on_key_up(cx, ev).await,
        (M::OnKeyLongPress, P::Key(ev)) => handler.on_key_long_press(cx, ev).await,
        (M::OnKeyDoublePress, P::Key(ev)) => handler.on_key_double_press(cx, ev).await,
        (M::OnTouchTap, P::TouchTap(ev)) => handler.on_touch_tap(cx, ev).await,
        (M::OnDialDown, P::Dial(ev)) => handler.on_dial_down(cx, ev).await,
        (M::OnDialUp, P::Dial(ev)) => handler.on_dial_up(cx, ev).await,
        (M::OnDialPress, P::Dial(ev)) => handler.on_dial_press(cx, ev).await,
        (M::OnDialRotate, P::DialRotate(ev)) => handler.on_dial_rotate(cx, ev).await,
        (M::OnWillAppear, P::Appearance(ev)) => handler.on_will_appear(cx, ev).await,
        (M::OnWillDisappear, P::Appearance(ev)) => handler.on_will_disappear(cx, ev).await,
        (M::OnTitleParametersDidChange, P::TitleParameters(ev)) => {
            handler.on_title_parameters_did_change(cx, ev).await
        }
        (M::OnPropertyInspectorDidAppear, P::PropertyInspector(ev)) => {
            handler.on_property_inspector_did_appear(cx, ev).await
        }
        (M::OnPropertyInspectorDidDisappear, P::PropertyInspector(ev)) => {
            handler.on_property_inspector_did_disappear(cx, ev).await
        }
        (M::OnSendToPlugin, P::PluginMessage(ev)) => handler.on_send_to_plugin(cx, ev).await,
        (M::OnSendToPropertyInspector, P::PluginMessage(ev)) => {
            handler.on_send_to_property_inspector(cx, ev).await
        }
        _ => match invoke_observer(handler, method, cx, event).await {
            Some(result) => result,
            None => Err(mismatch(method, event)),
        },
    }
}

/// Deliver an event to the plugin root.
pub(crate) async fn invoke_plugin(
    plugin: &dyn PluginHandler,
    method: HandlerMethod,
    cx: &EventContext,
    event: &EventPayload,
) -> HandlerResult {
    match invoke_observer(plugin, method, cx, event).await {
        Some(result) => result,
        None if event.target().is_some() => plugin.on_action_event(cx, method, event).await,
        None => Err(mismatch(method, event)),
    }
}
