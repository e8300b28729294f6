//! monshin-secrets
//!
//! Optional secret-manager plugin point. A deployment that keeps credentials
//! in an external manager links a crate that registers a [`SecretProvider`];
//! everyone else runs without one. The loader is consulted only when
//! `MONSHIN_SECRET_MANAGER=1`, and an absent plugin yields an empty secret
//! set, never an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use monshin_plugin::PluginRegistry;
use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::{debug, info};

/// Flag enabling secret-manager lookup at startup.
pub const SECRET_MANAGER_ENV: &str = "MONSHIN_SECRET_MANAGER";

/// Ordered candidate keys for the secret-provider lookup, delimited by `;`
/// or `,`.
pub const SECRET_PLUGIN_ENV: &str = "MONSHIN_SECRET_MANAGER_PLUGINS";

/// Conventional lookup keys tried when no override is set.
pub const DEFAULT_SECRET_PLUGIN_KEYS: &[&str] = &["vault", "secretmanager"];

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret provider failed: {0}")]
    Provider(String),
}

/// An externally supplied source of named secrets.
pub trait SecretProvider: Send + Sync {
    fn key(&self) -> &'static str;

    /// Fetch all secrets this provider manages for the deployment.
    fn load_secrets(&self) -> Result<BTreeMap<String, String>, SecretError>;
}

static SECRET_PROVIDERS: Lazy<PluginRegistry<dyn SecretProvider>> =
    Lazy::new(PluginRegistry::new);

/// The process-global secret-provider registry.
pub fn secret_providers() -> &'static PluginRegistry<dyn SecretProvider> {
    &SECRET_PROVIDERS
}

/// Register an external secret provider. Call before [`load_secrets`].
pub fn register_secret_provider(provider: Arc<dyn SecretProvider>) {
    let key = provider.key().to_string();
    secret_providers().register(key, provider);
}

fn manager_enabled() -> bool {
    std::env::var(SECRET_MANAGER_ENV).as_deref() == Ok("1")
}

/// Load secrets from the resolved provider.
///
/// Returns the empty map when the manager flag is off or no plugin resolves;
/// only a provider that resolved and then failed is an error.
pub fn load_secrets() -> Result<BTreeMap<String, String>, SecretError> {
    if !manager_enabled() {
        debug!("secret manager disabled, skipping lookup");
        return Ok(BTreeMap::new());
    }
    let Some((key, provider)) =
        secret_providers().resolve_from_env(SECRET_PLUGIN_ENV, DEFAULT_SECRET_PLUGIN_KEYS)
    else {
        info!("secret manager enabled but no provider plugin resolved; no secrets available");
        return Ok(BTreeMap::new());
    };
    let secrets = provider.load_secrets()?;
    info!(provider = %key, count = secrets.len(), "secrets loaded");
    Ok(secrets)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl SecretProvider for Fixed {
        fn key(&self) -> &'static str {
            "fixed"
        }

        fn load_secrets(&self) -> Result<BTreeMap<String, String>, SecretError> {
            let mut map = BTreeMap::new();
            map.insert("couchdb_password".to_string(), "s3cret".to_string());
            Ok(map)
        }
    }

    #[test]
    fn registered_provider_resolves_by_key() {
        register_secret_provider(Arc::new(Fixed));
        let (key, provider) = secret_providers()
            .resolve(Some("fixed"), DEFAULT_SECRET_PLUGIN_KEYS)
            .expect("fixed provider registered");
        assert_eq!(key, "fixed");
        assert_eq!(
            provider.load_secrets().unwrap()["couchdb_password"],
            "s3cret"
        );
    }

    #[test]
    fn absence_resolves_to_nothing_without_error() {
        assert!(
            secret_providers()
                .resolve(Some("not-linked"), &["also-not-linked"])
                .is_none()
        );
    }
}
