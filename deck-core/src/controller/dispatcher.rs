//! ``src/controller/dispatcher.rs``
//! ============================================================================
//! # Dispatcher: inbound event -> scheduled handler invocations
//!
//! `dispatch` runs synchronously on the read loop and returns as soon as
//! every invocation is scheduled. Per event:
//!
//! 1. resolve the route (unknown name: warning, dropped)
//! 2. parse the payload for the route's kind (invalid: error, dropped)
//! 3. apply settings side effects before any handler runs
//! 4. raw keys of actions with key timing: let the [`KeyTimingEngine`]
//!    decide, then continue under the raw or the derived route name
//! 5. schedule the plugin root
//! 6. branch on scope: plugin only, one targeted action, or every action

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{Span, debug_span, trace};

use super::handlers::{
    ActionEventHandler, EventContext, PluginHandler, invoke_action, invoke_plugin,
};
use super::key_timing::{KeyDecision, KeyGesture, KeyTiming, KeyTimingEngine, LongPressFired};
use super::registry::{InstanceRegistry, RegisteredAction};
use super::routing::{DISPATCH_TARGET, DispatchScope, HandlerMethod, Route, RoutingTable};
use super::sender::Sender;
use super::supervisor::TaskSupervisor;
use crate::error::{DeckError, DeckResult};
use crate::model::settings::SettingsCache;
use crate::protocol::inbound::{EventPayload, InboundEvent, KeyEvent};
use crate::protocol::registration::Info;

/// Shared, read-mostly dispatch state. Cheap to share behind an `Arc`.
pub struct Dispatcher {
    routes: Arc<RoutingTable>,
    registry: Arc<InstanceRegistry>,
    plugin: Arc<dyn PluginHandler>,
    sender: Sender,
    supervisor: TaskSupervisor,
    timing: KeyTimingEngine,
    info: Option<Arc<Info>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.len())
            .field("actions", &self.registry.len())
            .field("supervisor", &self.supervisor.stats())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Build a dispatcher and the receiver of timer-fired long presses,
    /// which the caller feeds back through [`Self::dispatch_long_press`].
    #[must_use]
    pub fn new(
        routes: Arc<RoutingTable>,
        registry: Arc<InstanceRegistry>,
        plugin: Arc<dyn PluginHandler>,
        sender: Sender,
    ) -> (Self, mpsc::UnboundedReceiver<LongPressFired>) {
        let (timing, long_presses) = KeyTimingEngine::new();
        let dispatcher: Self = Self {
            routes,
            registry,
            plugin,
            sender,
            supervisor: TaskSupervisor::new(),
            timing,
            info: None,
        };
        (dispatcher, long_presses)
    }

    /// Host environment handed to every [`EventContext`].
    #[must_use]
    pub fn with_info(mut self, info: Info) -> Self {
        self.info = Some(Arc::new(info));
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    #[must_use]
    pub const fn key_timing(&self) -> &KeyTimingEngine {
        &self.timing
    }

    #[must_use]
    pub const fn sender(&self) -> &Sender {
        &self.sender
    }

    /// Route one inbound event and schedule its handlers.
    ///
    /// Returns the number of invocations scheduled.
    ///
    /// # Errors
    ///
    /// `UnknownRoute`, `PayloadValidation` or `UnregisteredAction`. The error
    /// has already been logged; callers just move on to the next event.
    pub fn dispatch(&self, raw: &InboundEvent) -> DeckResult<usize> {
        self.try_dispatch(raw).inspect_err(DeckError::log)
    }

    /// Deliver a long press emitted by the key timing engine.
    ///
    /// # Errors
    ///
    /// As [`Self::dispatch`]; also logged already.
    pub fn dispatch_long_press(&self, fired: LongPressFired) -> DeckResult<usize> {
        self.deliver_gesture(KeyGesture::LongPress, fired.event)
            .inspect_err(DeckError::log)
    }

    fn try_dispatch(&self, raw: &InboundEvent) -> DeckResult<usize> {
        let route: Route = *self
            .routes
            .resolve(&raw.event)
            .ok_or_else(|| DeckError::unknown_route(&raw.event))?;

        let payload: EventPayload = route.payload.parse(raw)?;
        self.apply_side_effects(&payload);

        trace!(
            target: DISPATCH_TARGET,
            event = %raw.event,
            scope = ?route.scope,
            method = route.handler.as_str(),
            "dispatching"
        );

        if let Some((timing, key)) = self.timed_key(route, &payload) {
            return self.apply_key_timing(&raw.event, route, timing, key, &payload);
        }

        self.route_event(&raw.event, route, Arc::new(payload))
    }

    /// Cache updates happen before any handler can observe the event.
    fn apply_side_effects(&self, payload: &EventPayload) {
        match payload {
            EventPayload::Settings(ev) => self.registry.update_settings(
                Some(&ev.target.action),
                &ev.target.context,
                &ev.payload.settings,
            ),
            EventPayload::GlobalSettings(ev) => self
                .registry
                .global_settings()
                .replace(ev.payload.settings.clone()),
            _ => {}
        }
    }

    /// A raw key event aimed at an action that opted into key timing.
    fn timed_key<'a>(
        &self,
        route: Route,
        payload: &'a EventPayload,
    ) -> Option<(KeyTiming, &'a KeyEvent)> {
        if route.scope != DispatchScope::TargetedAction || !is_raw_key(route.handler) {
            return None;
        }
        let EventPayload::Key(key) = payload else {
            return None;
        };
        let timing: KeyTiming = self
            .registry
            .lookup_action(&key.target.action)?
            .key_timing()?;
        Some((timing, key))
    }

    fn route_event(
        &self,
        event: &str,
        route: Route,
        payload: Arc<EventPayload>,
    ) -> DeckResult<usize> {
        let mut scheduled: usize = 1;
        self.schedule_plugin(event, route.handler, &payload);

        match route.scope {
            DispatchScope::PluginOnly => {}
            DispatchScope::BroadcastToAllActions => {
                for action in self.registry.all_actions() {
                    self.schedule_action(event, action, route.handler, &payload);
                    scheduled += 1;
                }
            }
            DispatchScope::TargetedAction => {
                let action_id: &str = payload
                    .target()
                    .map(|target| target.action.as_str())
                    .ok_or_else(|| {
                        DeckError::payload_validation(event, "targeted event carries no action")
                    })?;
                let action: &RegisteredAction = self
                    .registry
                    .lookup_action(action_id)
                    .ok_or_else(|| DeckError::unregistered_action(event, action_id))?;

                self.schedule_action(event, action, route.handler, &payload);
                scheduled += 1;
            }
        }

        Ok(scheduled)
    }

    /// Nobody sees a raw key of a timed action until the engine decided
    /// what it is; held and swallowed keys schedule nothing.
    fn apply_key_timing(
        &self,
        event: &str,
        route: Route,
        timing: KeyTiming,
        key: &KeyEvent,
        payload: &EventPayload,
    ) -> DeckResult<usize> {
        let decision: KeyDecision = if route.handler == HandlerMethod::OnKeyDown {
            self.timing.key_down(timing, key)
        } else {
            self.timing.key_up(timing, key)
        };

        trace!(
            target: DISPATCH_TARGET,
            context = %key.target.context,
            ?decision,
            "key timing decision"
        );

        match decision {
            KeyDecision::Deliver(KeyGesture::Down | KeyGesture::Up) => {
                self.route_event(event, route, Arc::new(payload.clone()))
            }
            KeyDecision::Deliver(gesture) => self.deliver_gesture(gesture, key.clone()),
            KeyDecision::Pending | KeyDecision::Suppressed => Ok(0),
        }
    }

    /// Re-enter a derived gesture under its synthetic route name.
    fn deliver_gesture(&self, gesture: KeyGesture, key: KeyEvent) -> DeckResult<usize> {
        let event: &str = gesture.event_name();
        let route: Route = *self
            .routes
            .resolve(event)
            .ok_or_else(|| DeckError::unknown_route(event))?;

        self.route_event(event, route, Arc::new(EventPayload::Key(key)))
    }

    fn context_for(&self, settings: &Arc<SettingsCache>, payload: &EventPayload) -> EventContext {
        EventContext::new(
            self.sender.clone(),
            Arc::clone(self.registry.global_settings()),
            Some(Arc::clone(settings)),
            payload.context().map(str::to_owned),
            self.info.clone(),
        )
    }

    fn schedule_plugin(&self, event: &str, method: HandlerMethod, payload: &Arc<EventPayload>) {
        let plugin: Arc<dyn PluginHandler> = Arc::clone(&self.plugin);
        let cx: EventContext = self.context_for(self.registry.context_settings(), payload);
        let payload: Arc<EventPayload> = Arc::clone(payload);
        let span: Span = debug_span!(
            target: DISPATCH_TARGET,
            "plugin_handler",
            event,
            method = method.as_str(),
            context = payload.context().unwrap_or_default(),
        );

        self.supervisor.spawn(method.as_str(), "plugin".to_owned(), span, async move {
            invoke_plugin(plugin.as_ref(), method, &cx, &payload).await
        });
    }

    fn schedule_action(
        &self,
        event: &str,
        action: &RegisteredAction,
        method: HandlerMethod,
        payload: &Arc<EventPayload>,
    ) {
        let handler: Arc<dyn ActionEventHandler> = Arc::clone(action.handler());
        let cx: EventContext = self.context_for(action.settings(), payload);
        let payload: Arc<EventPayload> = Arc::clone(payload);
        let label: String = match payload.context() {
            Some(context) => format!("{}/{context}", action.id()),
            None => action.id().to_owned(),
        };
        let span: Span = debug_span!(
            target: DISPATCH_TARGET,
            "action_handler",
            event,
            action = action.id(),
            method = method.as_str(),
            context = payload.context().unwrap_or_default(),
        );

        self.supervisor.spawn(method.as_str(), label, span, async move {
            invoke_action(handler.as_ref(), method, &cx, &payload).await
        });
    }
}

const fn is_raw_key(method: HandlerMethod) -> bool {
    matches!(method, HandlerMethod::OnKeyDown | HandlerMethod::OnKeyUp)
}
