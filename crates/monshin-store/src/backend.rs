//! The Adapter Interface: the full method surface every persistence backend
//! implements.

use async_trait::async_trait;

use monshin_core::models::audit::AuditEntry;
use monshin_core::models::prompt::{PromptConfig, PromptKind};
use monshin_core::models::session::Session;
use monshin_core::models::settings::{AppSettings, LlmSettings};
use monshin_core::models::snapshot::{ImportMode, QuestionnaireSnapshot, SessionSnapshot};
use monshin_core::models::template::Template;
use monshin_core::models::user::UserRecord;

use crate::error::StoreError;

/// Session search filters.
///
/// All fields are optional and combined with AND. The struct implements
/// `Default` so the facade can forward options uniformly and new filters can
/// be added without breaking adapters — adapters ignore fields they don't
/// support.
#[derive(Debug, Clone, Default)]
pub struct SessionQuery {
    /// Approximate patient-name match: a candidate matches if either the raw
    /// text or the whitespace-stripped, width-folded form contains the
    /// (correspondingly treated) query.
    pub name: Option<String>,
    /// Exact date of birth, `YYYY-MM-DD`.
    pub birthdate: Option<String>,
    /// Inclusive lower bound on the session's start timestamp
    /// (`started_at`, falling back to `finalized_at`).
    pub from: Option<jiff::Timestamp>,
    /// Inclusive upper bound, same timestamp rule.
    pub to: Option<jiff::Timestamp>,
}

impl SessionQuery {
    /// Whether `session` passes every filter. Shared by adapters so both
    /// backends match identically.
    pub fn matches(&self, session: &Session) -> bool {
        if let Some(name) = &self.name
            && !monshin_core::normalize::name_matches(&session.patient_name, name)
        {
            return false;
        }
        if let Some(birthdate) = &self.birthdate
            && session.birthdate.as_deref() != Some(birthdate.as_str())
        {
            return false;
        }
        if self.from.is_some() || self.to.is_some() {
            let Some(start) = session.effective_start() else {
                return false;
            };
            if let Some(from) = self.from
                && start < from
            {
                return false;
            }
            if let Some(to) = self.to
                && start > to
            {
                return false;
            }
        }
        true
    }

    /// Ordering contract for results: start timestamp descending,
    /// finalize timestamp descending as tiebreak.
    pub fn sort(sessions: &mut [Session]) {
        sessions.sort_by(|a, b| {
            b.effective_start()
                .cmp(&a.effective_start())
                .then(b.finalized_at.cmp(&a.finalized_at))
        });
    }
}

/// Capability contract for a persistence backend.
///
/// Semantics every adapter must honor:
///
/// - Upserts are idempotent; repeating a call leaves stored state unchanged.
/// - Reads of absent records return `None` / empty, never an error.
/// - `rename_template` is all-or-nothing within the adapter's primary store.
/// - `save_session` re-derives the computed session fields (interrupted
///   flag, start-timestamp fallback, consolidated question texts) before
///   writing, and returns the session as persisted.
/// - Import honors [`ImportMode`]: `merge` overwrites matching keys and
///   preserves others, `replace` clears the category first.
/// - An adapter that has not built out a method raises
///   [`StoreError::NotImplemented`], never returns empty data for it.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Idempotently prepare storage: create anything missing, apply additive
    /// schema evolution, seed the default administrator, purge legacy
    /// insecure settings fields.
    async fn init(&self) -> Result<(), StoreError>;

    async fn shutdown(&self) -> Result<(), StoreError>;

    /// Cheap liveness probe against the underlying store.
    async fn health_check(&self) -> Result<(), StoreError>;

    // ── Templates ────────────────────────────────────────────────────────────

    async fn upsert_template(&self, template: Template) -> Result<(), StoreError>;

    async fn get_template(
        &self,
        template_id: &str,
        visit_type: &str,
    ) -> Result<Option<Template>, StoreError>;

    async fn list_templates(&self) -> Result<Vec<Template>, StoreError>;

    async fn delete_template(&self, template_id: &str, visit_type: &str)
    -> Result<(), StoreError>;

    /// Atomically rename a template id, cascading to prompts and session
    /// references. `NotFound` if `old_id` has no rows, `Conflict` if
    /// `new_id` is occupied.
    async fn rename_template(&self, old_id: &str, new_id: &str) -> Result<(), StoreError>;

    // ── Sessions ─────────────────────────────────────────────────────────────

    async fn save_session(&self, session: Session) -> Result<Session, StoreError>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    async fn list_sessions(&self, query: &SessionQuery) -> Result<Vec<Session>, StoreError>;

    async fn delete_session(&self, id: &str) -> Result<(), StoreError>;

    /// Bulk delete; returns how many existed and were removed.
    async fn delete_sessions(&self, ids: &[String]) -> Result<usize, StoreError>;

    async fn export_sessions(&self) -> Result<SessionSnapshot, StoreError>;

    async fn import_sessions(
        &self,
        snapshot: SessionSnapshot,
        mode: ImportMode,
    ) -> Result<(), StoreError>;

    // ── Prompts ──────────────────────────────────────────────────────────────

    async fn save_prompt(&self, prompt: PromptConfig) -> Result<(), StoreError>;

    async fn get_prompt(
        &self,
        template_id: &str,
        visit_type: &str,
        kind: PromptKind,
    ) -> Result<Option<PromptConfig>, StoreError>;

    async fn list_prompts(&self) -> Result<Vec<PromptConfig>, StoreError>;

    /// Delete both prompt kinds for one `(template_id, visit_type)`.
    async fn delete_prompts(&self, template_id: &str, visit_type: &str)
    -> Result<(), StoreError>;

    // ── Settings singletons ──────────────────────────────────────────────────

    async fn save_app_settings(&self, settings: AppSettings) -> Result<(), StoreError>;

    async fn get_app_settings(&self) -> Result<Option<AppSettings>, StoreError>;

    async fn save_llm_settings(&self, settings: LlmSettings) -> Result<(), StoreError>;

    async fn get_llm_settings(&self) -> Result<Option<LlmSettings>, StoreError>;

    // ── Users ────────────────────────────────────────────────────────────────

    async fn upsert_user(&self, user: UserRecord) -> Result<(), StoreError>;

    async fn get_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError>;

    async fn delete_user(&self, username: &str) -> Result<(), StoreError>;

    // ── Audit log ────────────────────────────────────────────────────────────

    /// Append-only; also emits a structured tracing record.
    async fn append_audit(&self, kind: &str, username: &str, note: &str)
    -> Result<(), StoreError>;

    /// Most recent entries first, up to `limit`.
    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError>;

    // ── Bulk snapshot ────────────────────────────────────────────────────────

    /// The complete questionnaire-settings snapshot: templates, prompts, app
    /// settings, and LLM settings.
    async fn export_questionnaire_settings(&self) -> Result<QuestionnaireSnapshot, StoreError>;

    async fn import_questionnaire_settings(
        &self,
        snapshot: QuestionnaireSnapshot,
        mode: ImportMode,
    ) -> Result<(), StoreError>;
}
