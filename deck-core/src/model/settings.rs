//!
//! ``deck-core/src/model/settings.rs``
//!
//! Settings caches fed by `didReceiveSettings` / `didReceiveGlobalSettings`.
//! Writers are the dispatcher's built-in update step; readers are handlers
//! running concurrently on other tasks.

use std::sync::Arc;

use ahash::RandomState;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde_json::Value;

use crate::protocol::inbound::Settings;

/// Per-context settings, keyed by the button's `context` id.
///
/// Each entry is updated under its shard lock, so a reader always sees a
/// whole merged map, never half of an update.
#[derive(Debug)]
pub struct SettingsCache {
    entries: DashMap<String, Settings, RandomState>,
}

impl SettingsCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Merge `partial` into the cached settings of `context`; last write wins per key.
    pub fn merge(&self, context: &str, partial: &Settings) {
        let mut entry = self.entries.entry(context.to_owned()).or_default();
        for (key, value) in partial {
            entry.insert(key.clone(), value.clone());
        }
    }

    /// Snapshot of one context's settings.
    #[must_use]
    pub fn get(&self, context: &str) -> Option<Settings> {
        self.entries.get(context).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn value(&self, context: &str, key: &str) -> Option<Value> {
        self.entries
            .get(context)
            .and_then(|entry| entry.value().get(key).cloned())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SettingsCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide settings shared by every action.
///
/// Replaced wholesale on every push; readers get an immutable snapshot.
#[derive(Debug)]
pub struct GlobalSettings {
    current: ArcSwap<Settings>,
}

impl GlobalSettings {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Settings::new()),
        }
    }

    pub fn replace(&self, settings: Settings) {
        self.current.store(Arc::new(settings));
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Settings> {
        self.current.load_full()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.current.load().get(key).cloned()
    }
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(value: Value) -> Settings {
        match value {
            Value::Object(map) => map,
            _ => Settings::new(),
        }
    }

    #[test]
    fn test_merge_is_last_write_wins_per_key() {
        let cache: SettingsCache = SettingsCache::new();
        cache.merge("ctx1", &settings(json!({"a": 1, "b": 2})));
        cache.merge("ctx1", &settings(json!({"b": 3, "c": 4})));

        assert_eq!(
            cache.get("ctx1"),
            Some(settings(json!({"a": 1, "b": 3, "c": 4})))
        );
        assert_eq!(cache.value("ctx1", "b"), Some(json!(3)));
        assert!(cache.get("ctx2").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_global_settings_snapshot_survives_replace() {
        let global: GlobalSettings = GlobalSettings::new();
        global.replace(settings(json!({"x": 1})));

        let before: Arc<Settings> = global.snapshot();
        global.replace(settings(json!({"x": 2})));

        assert_eq!(before.get("x"), Some(&json!(1)));
        assert_eq!(global.get("x"), Some(json!(2)));
    }
}
