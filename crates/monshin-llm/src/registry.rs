//! The provider registry: built-in providers in their fixed conventional
//! order, plus at most one discovered external plugin.

use std::sync::Arc;

use monshin_plugin::PluginRegistry;
use once_cell::sync::Lazy;
use tracing::warn;

use crate::error::LlmError;
use crate::meta::ProviderMeta;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;
use crate::provider::{LlmProvider, coerced_meta};

/// Built-in provider keys, in presentation order.
pub const BUILTIN_PROVIDER_KEYS: &[&str] = &["ollama", "openai"];

/// Environment override naming external provider plugin keys, delimited by
/// `;` or `,`.
pub const LLM_PLUGIN_ENV: &str = "MONSHIN_LLM_PROVIDER_PLUGINS";

static PROVIDERS: Lazy<PluginRegistry<dyn LlmProvider>> = Lazy::new(|| {
    let registry = PluginRegistry::new();
    registry.register("ollama", Arc::new(OllamaProvider::new()) as Arc<dyn LlmProvider>);
    registry.register("openai", Arc::new(OpenAiProvider::new()) as Arc<dyn LlmProvider>);
    registry
});

/// The process-global provider registry.
pub fn providers() -> &'static PluginRegistry<dyn LlmProvider> {
    &PROVIDERS
}

/// Register an external provider. The declared metadata must coerce into the
/// canonical shape; a provider that fails coercion is rejected here, at
/// discovery time. Registering under a built-in key overrides the built-in.
pub fn register_provider_plugin(provider: Arc<dyn LlmProvider>) -> Result<(), LlmError> {
    let meta = ProviderMeta::from_value(&provider.metadata())?;
    providers().register(meta.key.clone(), provider);
    Ok(())
}

/// The provider the active settings name, or `UnknownProvider`.
pub fn active_provider(key: &str) -> Result<Arc<dyn LlmProvider>, LlmError> {
    providers()
        .get(key)
        .ok_or_else(|| LlmError::UnknownProvider(key.to_string()))
}

/// The discovered external provider, if any. Candidates come from the
/// [`LLM_PLUGIN_ENV`] override first, then any registered non-built-in key.
pub fn external_provider() -> Option<(String, Arc<dyn LlmProvider>)> {
    let extra: Vec<String> = providers()
        .registered_keys()
        .into_iter()
        .filter(|key| !BUILTIN_PROVIDER_KEYS.contains(&key.as_str()))
        .collect();
    let fallbacks: Vec<&str> = extra.iter().map(String::as_str).collect();
    providers().resolve_from_env(LLM_PLUGIN_ENV, &fallbacks)
}

/// Presentation metadata: built-ins in their fixed order, then the external
/// plugin when one resolved. Providers whose metadata fails coercion are
/// skipped with a warning, never fatal.
pub fn provider_meta_list() -> Vec<ProviderMeta> {
    let mut metas = Vec::new();
    for &key in BUILTIN_PROVIDER_KEYS {
        let Some(provider) = providers().get(key) else {
            continue;
        };
        match coerced_meta(provider.as_ref()) {
            Some(meta) => metas.push(meta),
            None => warn!(key, "provider metadata failed coercion, skipping"),
        }
    }
    if let Some((key, provider)) = external_provider()
        && !BUILTIN_PROVIDER_KEYS.contains(&key.as_str())
    {
        match coerced_meta(provider.as_ref()) {
            Some(meta) => metas.push(meta),
            None => warn!(key = %key, "provider metadata failed coercion, skipping"),
        }
    }
    metas
}
