//! The facade application code talks to.
//!
//! A [`PersistenceContext`] is constructed once at startup from
//! [`StoreConfig`] and owns the active adapter behind the trait object.
//! Callers never name a concrete backend type; swapping the store is a
//! configuration change, not a code change.

use tracing::info;

use monshin_core::models::audit::AuditEntry;
use monshin_core::models::prompt::{PromptConfig, PromptKind};
use monshin_core::models::session::Session;
use monshin_core::models::settings::{AppSettings, LlmSettings};
use monshin_core::models::snapshot::{ImportMode, QuestionnaireSnapshot, SessionSnapshot};
use monshin_core::models::template::Template;
use monshin_core::models::user::UserRecord;

use crate::backend::{PersistenceBackend, SessionQuery};
use crate::config::{BackendKind, StoreConfig};
use crate::error::StoreError;
use crate::plugin::resolve_backend_plugin;
use crate::sqlite::SqliteBackend;

pub struct PersistenceContext {
    backend: Box<dyn PersistenceBackend>,
    kind: BackendKind,
}

impl PersistenceContext {
    /// Select, construct, and initialize the configured adapter.
    ///
    /// A selected backend that cannot be provided is a startup failure —
    /// the context never silently falls back to another store.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let backend: Box<dyn PersistenceBackend> = match config.backend {
            BackendKind::Sqlite => Box::new(SqliteBackend::open(config)?),
            BackendKind::Firestore => {
                let Some((key, plugin)) = resolve_backend_plugin(config) else {
                    return Err(StoreError::Validation(
                        "firestore backend selected but no persistence plugin resolved; \
                         check MONSHIN_PERSISTENCE_PLUGINS and the enabled adapter features"
                            .to_string(),
                    ));
                };
                info!(plugin = %key, "resolved persistence plugin");
                plugin.connect(config).await?
            }
        };
        backend.init().await?;
        info!(backend = config.backend.as_str(), "persistence backend ready");
        Ok(PersistenceContext {
            backend,
            kind: config.backend,
        })
    }

    /// Wrap an already-constructed adapter. Used by tests and by embedders
    /// that build their own backend.
    pub fn with_backend(backend: Box<dyn PersistenceBackend>, kind: BackendKind) -> Self {
        PersistenceContext { backend, kind }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    /// Reduced health verdict for status surfaces: `true` when the store
    /// answers. Falls back to a template listing for adapters without a
    /// dedicated probe path.
    pub async fn check_cloud_health(&self) -> bool {
        match self.backend.health_check().await {
            Ok(()) => true,
            Err(StoreError::NotImplemented { .. }) => {
                self.backend.list_templates().await.is_ok()
            }
            Err(_) => false,
        }
    }

    // ── Forwarders ───────────────────────────────────────────────────────────

    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.backend.shutdown().await
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        self.backend.health_check().await
    }

    pub async fn upsert_template(&self, template: Template) -> Result<(), StoreError> {
        self.backend.upsert_template(template).await
    }

    pub async fn get_template(
        &self,
        template_id: &str,
        visit_type: &str,
    ) -> Result<Option<Template>, StoreError> {
        self.backend.get_template(template_id, visit_type).await
    }

    pub async fn list_templates(&self) -> Result<Vec<Template>, StoreError> {
        self.backend.list_templates().await
    }

    pub async fn delete_template(
        &self,
        template_id: &str,
        visit_type: &str,
    ) -> Result<(), StoreError> {
        self.backend.delete_template(template_id, visit_type).await
    }

    pub async fn rename_template(&self, old_id: &str, new_id: &str) -> Result<(), StoreError> {
        self.backend.rename_template(old_id, new_id).await
    }

    pub async fn save_session(&self, session: Session) -> Result<Session, StoreError> {
        self.backend.save_session(session).await
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        self.backend.get_session(id).await
    }

    pub async fn list_sessions(&self, query: &SessionQuery) -> Result<Vec<Session>, StoreError> {
        self.backend.list_sessions(query).await
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        self.backend.delete_session(id).await
    }

    pub async fn delete_sessions(&self, ids: &[String]) -> Result<usize, StoreError> {
        self.backend.delete_sessions(ids).await
    }

    pub async fn export_sessions(&self) -> Result<SessionSnapshot, StoreError> {
        self.backend.export_sessions().await
    }

    pub async fn import_sessions(
        &self,
        snapshot: SessionSnapshot,
        mode: ImportMode,
    ) -> Result<(), StoreError> {
        self.backend.import_sessions(snapshot, mode).await
    }

    pub async fn save_prompt(&self, prompt: PromptConfig) -> Result<(), StoreError> {
        self.backend.save_prompt(prompt).await
    }

    pub async fn get_prompt(
        &self,
        template_id: &str,
        visit_type: &str,
        kind: PromptKind,
    ) -> Result<Option<PromptConfig>, StoreError> {
        self.backend.get_prompt(template_id, visit_type, kind).await
    }

    pub async fn list_prompts(&self) -> Result<Vec<PromptConfig>, StoreError> {
        self.backend.list_prompts().await
    }

    pub async fn delete_prompts(
        &self,
        template_id: &str,
        visit_type: &str,
    ) -> Result<(), StoreError> {
        self.backend.delete_prompts(template_id, visit_type).await
    }

    pub async fn save_app_settings(&self, settings: AppSettings) -> Result<(), StoreError> {
        self.backend.save_app_settings(settings).await
    }

    pub async fn get_app_settings(&self) -> Result<Option<AppSettings>, StoreError> {
        self.backend.get_app_settings().await
    }

    pub async fn save_llm_settings(&self, settings: LlmSettings) -> Result<(), StoreError> {
        self.backend.save_llm_settings(settings).await
    }

    pub async fn get_llm_settings(&self) -> Result<Option<LlmSettings>, StoreError> {
        self.backend.get_llm_settings().await
    }

    pub async fn upsert_user(&self, user: UserRecord) -> Result<(), StoreError> {
        self.backend.upsert_user(user).await
    }

    pub async fn get_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        self.backend.get_user(username).await
    }

    pub async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.backend.list_users().await
    }

    pub async fn delete_user(&self, username: &str) -> Result<(), StoreError> {
        self.backend.delete_user(username).await
    }

    pub async fn append_audit(
        &self,
        kind: &str,
        username: &str,
        note: &str,
    ) -> Result<(), StoreError> {
        self.backend.append_audit(kind, username, note).await
    }

    pub async fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        self.backend.list_audit(limit).await
    }

    pub async fn export_questionnaire_settings(
        &self,
    ) -> Result<QuestionnaireSnapshot, StoreError> {
        self.backend.export_questionnaire_settings().await
    }

    pub async fn import_questionnaire_settings(
        &self,
        snapshot: QuestionnaireSnapshot,
        mode: ImportMode,
    ) -> Result<(), StoreError> {
        self.backend
            .import_questionnaire_settings(snapshot, mode)
            .await
    }
}
