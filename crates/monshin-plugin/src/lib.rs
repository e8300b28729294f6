//! monshin-plugin
//!
//! Convention-based plugin resolution shared by the persistence, LLM-provider,
//! and secret-manager discovery points.
//!
//! Implementations register themselves in a process-global [`PluginRegistry`]
//! under a short key (our feature-gated Firestore adapter does this at
//! startup; a privately distributed crate linked into the binary does the
//! same). Resolution walks an ordered candidate list — a delimited
//! environment override first, then conventional fallback keys — and returns
//! the first registered hit. A key with no registration is skipped silently:
//! an absent plugin is expected, not an error. Whether absence is fatal is
//! the caller's decision.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

/// A process-global named registry for one kind of plugin.
pub struct PluginRegistry<P: ?Sized> {
    entries: RwLock<HashMap<String, Arc<P>>>,
}

impl<P: ?Sized> Default for PluginRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ?Sized> PluginRegistry<P> {
    pub fn new() -> Self {
        PluginRegistry {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a plugin under `key`. A later registration for the same key
    /// replaces the earlier one, which is how an external implementation
    /// overrides a built-in.
    pub fn register(&self, key: impl Into<String>, plugin: Arc<P>) {
        let key = key.into();
        debug!(key = %key, "plugin registered");
        self.entries.write().insert(key, plugin);
    }

    pub fn get(&self, key: &str) -> Option<Arc<P>> {
        self.entries.read().get(key).cloned()
    }

    pub fn registered_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Walk the candidate list and return the first registered plugin,
    /// together with the key that matched. `None` when nothing resolves.
    pub fn resolve(
        &self,
        override_spec: Option<&str>,
        fallbacks: &[&str],
    ) -> Option<(String, Arc<P>)> {
        for key in candidate_keys(override_spec, fallbacks) {
            if let Some(plugin) = self.get(&key) {
                debug!(key = %key, "plugin resolved");
                return Some((key, plugin));
            }
            debug!(key = %key, "plugin candidate not registered, skipping");
        }
        None
    }

    /// [`resolve`](Self::resolve) with the override read from an environment
    /// variable.
    pub fn resolve_from_env(&self, env_key: &str, fallbacks: &[&str]) -> Option<(String, Arc<P>)> {
        let override_spec = std::env::var(env_key).ok();
        self.resolve(override_spec.as_deref(), fallbacks)
    }
}

/// Build the ordered candidate list: keys from the delimited override first
/// (split on `;` and `,`, trimmed, empties dropped), then the conventional
/// fallbacks. Duplicates keep their first position.
pub fn candidate_keys(override_spec: Option<&str>, fallbacks: &[&str]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    let mut push = |key: &str| {
        let key = key.trim();
        if !key.is_empty() && !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    };
    if let Some(spec) = override_spec {
        for part in spec.split([';', ',']) {
            push(part);
        }
    }
    for key in fallbacks {
        push(key);
    }
    keys
}
