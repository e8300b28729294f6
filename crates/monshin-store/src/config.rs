//! Backend-selection and connection configuration, read from the
//! environment at startup. Credential fields the environment leaves empty
//! are filled from the secret manager when one is enabled.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::StoreError;

/// Which backend the operator selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    Firestore,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Firestore => "firestore",
        }
    }

    /// Parse the selection value. Unknown values are a configuration error,
    /// never silently defaulted.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "sqlite" => Ok(BackendKind::Sqlite),
            "firestore" => Ok(BackendKind::Firestore),
            other => Err(StoreError::Validation(format!(
                "unknown persistence backend {other:?} (expected \"sqlite\" or \"firestore\")"
            ))),
        }
    }
}

/// CouchDB connection details for the optional session mirror.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Firestore connection details. `init` requires either an emulator host or
/// a non-empty project id.
#[derive(Debug, Clone, Default)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Collection-name prefix used to namespace several deployments in one
    /// project.
    pub prefix: String,
    pub emulator_host: Option<String>,
    /// Path to a file holding a bearer token for the REST API. Not needed
    /// against the emulator.
    pub credentials_path: Option<PathBuf>,
}

/// Everything the selector needs to construct the active adapter.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Ordered candidate keys for the persistence plugin lookup
    /// (`MONSHIN_PERSISTENCE_PLUGINS`), delimited by `;` or `,`.
    pub plugin_spec: Option<String>,
    pub sqlite_path: PathBuf,
    pub couch: Option<CouchConfig>,
    pub firestore: FirestoreConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            backend: BackendKind::Sqlite,
            plugin_spec: None,
            sqlite_path: PathBuf::from("monshin.db"),
            couch: None,
            firestore: FirestoreConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Read configuration from `MONSHIN_*` environment variables.
    pub fn from_env() -> Result<Self, StoreError> {
        let backend = match std::env::var("MONSHIN_PERSISTENCE_BACKEND") {
            Ok(value) => BackendKind::parse(value.trim())?,
            Err(_) => BackendKind::Sqlite,
        };

        let couch = std::env::var("MONSHIN_COUCHDB_URL").ok().map(|url| CouchConfig {
            url,
            database: std::env::var("MONSHIN_COUCHDB_DATABASE")
                .unwrap_or_else(|_| "monshin_sessions".to_string()),
            username: std::env::var("MONSHIN_COUCHDB_USER").ok(),
            password: std::env::var("MONSHIN_COUCHDB_PASSWORD").ok(),
        });

        let mut config = StoreConfig {
            backend,
            plugin_spec: std::env::var("MONSHIN_PERSISTENCE_PLUGINS").ok(),
            sqlite_path: std::env::var("MONSHIN_SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("monshin.db")),
            couch,
            firestore: FirestoreConfig {
                project_id: std::env::var("MONSHIN_FIRESTORE_PROJECT").unwrap_or_default(),
                prefix: std::env::var("MONSHIN_FIRESTORE_PREFIX").unwrap_or_default(),
                emulator_host: std::env::var("MONSHIN_FIRESTORE_EMULATOR_HOST").ok(),
                credentials_path: std::env::var("MONSHIN_FIRESTORE_CREDENTIALS")
                    .ok()
                    .map(PathBuf::from),
            },
        };

        let secrets = monshin_secrets::load_secrets()
            .map_err(|e| StoreError::Validation(format!("secret manager: {e}")))?;
        config.apply_secrets(&secrets);
        Ok(config)
    }

    /// Fill credential fields the environment left empty from the secret
    /// manager's map. Explicit environment values always win; an empty map
    /// (manager disabled or no provider linked) changes nothing.
    pub fn apply_secrets(&mut self, secrets: &BTreeMap<String, String>) {
        if let Some(couch) = &mut self.couch {
            if couch.username.is_none() {
                couch.username = secrets.get("couchdb_user").cloned();
            }
            if couch.password.is_none() {
                couch.password = secrets.get("couchdb_password").cloned();
            }
        }
        if self.firestore.credentials_path.is_none()
            && let Some(path) = secrets.get("firestore_credentials")
        {
            self.firestore.credentials_path = Some(PathBuf::from(path));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_rejects_unknown_values() {
        assert_eq!(BackendKind::parse("sqlite").unwrap(), BackendKind::Sqlite);
        assert_eq!(
            BackendKind::parse("firestore").unwrap(),
            BackendKind::Firestore
        );
        assert!(matches!(
            BackendKind::parse("couchdb"),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn secrets_fill_only_missing_credentials() {
        let mut config = StoreConfig {
            couch: Some(CouchConfig {
                url: "http://couch:5984".to_string(),
                database: "monshin_sessions".to_string(),
                username: Some("explicit".to_string()),
                password: None,
            }),
            ..Default::default()
        };
        let mut secrets = BTreeMap::new();
        secrets.insert("couchdb_user".to_string(), "from-vault".to_string());
        secrets.insert("couchdb_password".to_string(), "s3cret".to_string());
        secrets.insert(
            "firestore_credentials".to_string(),
            "/run/secrets/firestore-token".to_string(),
        );

        config.apply_secrets(&secrets);

        let couch = config.couch.as_ref().unwrap();
        // The environment's explicit value wins over the secret.
        assert_eq!(couch.username.as_deref(), Some("explicit"));
        assert_eq!(couch.password.as_deref(), Some("s3cret"));
        assert_eq!(
            config.firestore.credentials_path,
            Some(PathBuf::from("/run/secrets/firestore-token"))
        );
    }

    #[test]
    fn an_empty_secret_map_changes_nothing() {
        let mut config = StoreConfig::default();
        config.apply_secrets(&BTreeMap::new());
        assert!(config.couch.is_none());
        assert!(config.firestore.credentials_path.is_none());
    }
}
