//! Persistence-adapter plugin discovery.
//!
//! The Firestore adapter is not statically wired into the selector: it (or a
//! privately distributed replacement) registers a [`BackendPlugin`] under a
//! key, and the selector resolves the key through the ordered candidate list
//! in [`monshin_plugin`]. An unresolvable key is only an error when the
//! selected backend requires it — the selector makes that call.

use std::sync::Arc;

use async_trait::async_trait;
use monshin_plugin::PluginRegistry;
use once_cell::sync::Lazy;

use crate::backend::PersistenceBackend;
use crate::config::StoreConfig;
use crate::error::StoreError;

/// Conventional lookup keys tried when `MONSHIN_PERSISTENCE_PLUGINS` is not
/// set.
pub const DEFAULT_BACKEND_PLUGIN_KEYS: &[&str] = &["firestore"];

/// A factory for an externally supplied persistence adapter.
#[async_trait]
pub trait BackendPlugin: Send + Sync {
    fn key(&self) -> &'static str;

    /// Construct (but do not `init`) an adapter from the given config.
    async fn connect(&self, config: &StoreConfig)
    -> Result<Box<dyn PersistenceBackend>, StoreError>;
}

static BACKEND_PLUGINS: Lazy<PluginRegistry<dyn BackendPlugin>> = Lazy::new(|| {
    let registry = PluginRegistry::new();
    #[cfg(feature = "firestore")]
    registry.register(
        crate::firestore::FirestorePlugin.key(),
        Arc::new(crate::firestore::FirestorePlugin) as Arc<dyn BackendPlugin>,
    );
    registry
});

/// The process-global persistence plugin registry.
pub fn backend_plugins() -> &'static PluginRegistry<dyn BackendPlugin> {
    &BACKEND_PLUGINS
}

/// Register an external adapter plugin. Call before
/// [`crate::context::PersistenceContext::connect`].
pub fn register_backend_plugin(plugin: Arc<dyn BackendPlugin>) {
    let key = plugin.key().to_string();
    backend_plugins().register(key, plugin);
}

/// Resolve the cloud adapter plugin using the configured candidate list.
pub fn resolve_backend_plugin(config: &StoreConfig) -> Option<(String, Arc<dyn BackendPlugin>)> {
    backend_plugins().resolve(config.plugin_spec.as_deref(), DEFAULT_BACKEND_PLUGIN_KEYS)
}
