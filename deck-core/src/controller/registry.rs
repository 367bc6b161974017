//! InstanceRegistry: action handlers by action type, plus the settings caches
//!
//! - One handler object per action type, kept in registration order
//! - Per-context settings, both plugin-wide and per owning action
//! - Key timing resolved once at registration (handler opt-in, config override)
//!
//! Registration happens before the runtime starts reading; afterwards the
//! registry is shared read-only and only the caches change.

use std::{any::type_name, collections::HashMap, sync::Arc};

use ahash::RandomState;
use indexmap::IndexMap;
use tracing::{debug, info};

use super::handlers::ActionEventHandler;
use super::key_timing::KeyTiming;
use crate::error::{DeckError, DeckResult};
use crate::model::settings::{GlobalSettings, SettingsCache};
use crate::protocol::inbound::Settings;

/// A registered action type.
#[derive(Clone)]
pub struct RegisteredAction {
    id: String,
    handler: Arc<dyn ActionEventHandler>,
    settings: Arc<SettingsCache>,
    timing: Option<KeyTiming>,
}

impl RegisteredAction {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn handler(&self) -> &Arc<dyn ActionEventHandler> {
        &self.handler
    }

    /// Settings of this action's buttons, by context.
    #[must_use]
    pub const fn settings(&self) -> &Arc<SettingsCache> {
        &self.settings
    }

    /// Effective press thresholds; `None` when the action did not opt in.
    #[must_use]
    pub const fn key_timing(&self) -> Option<KeyTiming> {
        self.timing
    }
}

impl std::fmt::Debug for RegisteredAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredAction")
            .field("id", &self.id)
            .field("contexts", &self.settings.len())
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct InstanceRegistry {
    actions: IndexMap<String, RegisteredAction, RandomState>,
    contexts: Arc<SettingsCache>,
    global: Arc<GlobalSettings>,
    timing_overrides: HashMap<String, KeyTiming, RandomState>,
}

impl InstanceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Thresholds that replace an action's own [`ActionEventHandler::key_timing`].
    #[must_use]
    pub fn with_timing_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, KeyTiming)>,
    {
        self.set_timing_overrides(overrides);
        self
    }

    /// Install overrides, also for actions registered earlier.
    pub fn set_timing_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, KeyTiming)>,
    {
        let overrides: HashMap<String, KeyTiming, RandomState> = overrides.into_iter().collect();
        for (id, action) in &mut self.actions {
            if let Some(timing) = overrides.get(id) {
                action.timing = Some(*timing);
            }
        }
        self.timing_overrides = overrides;
    }

    /// Register one handler for its action type.
    ///
    /// # Errors
    ///
    /// `MissingActionIdentifier` for a blank id, `DuplicateRegistration` when
    /// the id is taken. The registry is unchanged on error.
    pub fn register_action<H: ActionEventHandler + 'static>(
        &mut self,
        handler: H,
    ) -> DeckResult<&RegisteredAction> {
        self.register_shared(Arc::new(handler))
    }

    /// Same as [`Self::register_action`] for a handler the caller keeps a handle to.
    ///
    /// # Errors
    ///
    /// See [`Self::register_action`].
    pub fn register_shared<H: ActionEventHandler + 'static>(
        &mut self,
        handler: Arc<H>,
    ) -> DeckResult<&RegisteredAction> {
        let id: String = handler.action_id().trim().to_owned();
        if id.is_empty() {
            return Err(DeckError::MissingActionIdentifier {
                type_name: type_name::<H>(),
            });
        }
        if self.actions.contains_key(&id) {
            return Err(DeckError::DuplicateRegistration { action: id });
        }

        let timing: Option<KeyTiming> = self
            .timing_overrides
            .get(&id)
            .copied()
            .or_else(|| handler.key_timing());

        info!(action = %id, ?timing, "Registered action handler");

        let entry: RegisteredAction = RegisteredAction {
            id: id.clone(),
            handler,
            settings: Arc::new(SettingsCache::new()),
            timing,
        };
        let (index, _) = self.actions.insert_full(id, entry);

        Ok(&self.actions[index])
    }

    #[must_use]
    pub fn lookup_action(&self, action_id: &str) -> Option<&RegisteredAction> {
        self.actions.get(action_id)
    }

    /// All actions in registration order.
    pub fn all_actions(&self) -> impl Iterator<Item = &RegisteredAction> {
        self.actions.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Merge a settings push into the plugin-wide cache and, when the owning
    /// action is registered, into that action's cache.
    pub fn update_settings(&self, action_id: Option<&str>, context: &str, partial: &Settings) {
        self.contexts.merge(context, partial);

        if let Some(action) = action_id.and_then(|id: &str| self.actions.get(id)) {
            action.settings.merge(context, partial);
        }

        debug!(context, keys = partial.len(), "Settings cache updated");
    }

    /// Plugin-wide settings snapshot of one context.
    #[must_use]
    pub fn settings(&self, context: &str) -> Option<Settings> {
        self.contexts.get(context)
    }

    #[must_use]
    pub const fn context_settings(&self) -> &Arc<SettingsCache> {
        &self.contexts
    }

    #[must_use]
    pub const fn global_settings(&self) -> &Arc<GlobalSettings> {
        &self.global
    }
}
