//! Primary adapter: local SQLite for every category, with an optional
//! write-through CouchDB mirror for session records.
//!
//! rusqlite is synchronous; the connection sits behind a `parking_lot`
//! mutex with a closure helper, and the lock is never held across an await.
//! WAL mode plus a busy timeout covers the web server's worker threads.

pub mod couch;
pub mod schema;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

use monshin_core::models::audit::AuditEntry;
use monshin_core::models::prompt::{PromptConfig, PromptKind};
use monshin_core::models::session::{CompletionStatus, Session};
use monshin_core::models::settings::{AppSettings, LlmSettings};
use monshin_core::models::snapshot::{ImportMode, QuestionnaireSnapshot, SessionSnapshot};
use monshin_core::models::template::Template;
use monshin_core::models::user::{TotpMode, UserRecord};

use crate::backend::{PersistenceBackend, SessionQuery};
use crate::config::StoreConfig;
use crate::error::StoreError;

use couch::CouchClient;

/// The default persistence backend.
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    couch: Option<CouchClient>,
    path: PathBuf,
}

impl SqliteBackend {
    /// Open (creating if necessary) the database file named in `config`,
    /// plus the CouchDB mirror client when one is configured.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let conn = open_connection(&config.sqlite_path)?;
        Ok(SqliteBackend {
            conn: Arc::new(Mutex::new(conn)),
            couch: config.couch.as_ref().map(CouchClient::new).transpose()?,
            path: config.sqlite_path.clone(),
        })
    }

    /// In-memory database, no mirror. Used by tests and the admin tool's
    /// dry runs.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        configure_pragmas(&conn)?;
        Ok(SqliteBackend {
            conn: Arc::new(Mutex::new(conn)),
            couch: None,
            path: PathBuf::from(":memory:"),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    fn with_conn_mut<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }
}

fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| StoreError::unavailable("sqlite", e.to_string()))?;
    }
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

// ── Row mapping ──────────────────────────────────────────────────────────────

fn ts_to_sql(ts: Option<jiff::Timestamp>) -> Option<String> {
    ts.map(|t| t.to_string())
}

fn ts_from_sql(raw: Option<String>) -> Result<Option<jiff::Timestamp>, StoreError> {
    match raw {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|e| StoreError::Validation(format!("stored timestamp {s:?}: {e}"))),
    }
}

fn read_template(
    conn: &Connection,
    template_id: &str,
    visit_type: &str,
) -> Result<Option<Template>, StoreError> {
    let row: Option<(String, bool, u32)> = conn
        .query_row(
            "SELECT items, followup_enabled, max_followups
             FROM templates WHERE id = ?1 AND visit_type = ?2",
            params![template_id, visit_type],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let Some((items_json, followup_enabled, max_followups)) = row else {
        return Ok(None);
    };
    Ok(Some(
        Template {
            template_id: template_id.to_string(),
            visit_type: visit_type.to_string(),
            items: serde_json::from_str(&items_json)?,
            followup_enabled,
            max_followups,
        }
        .normalized(),
    ))
}

fn write_template(conn: &Connection, template: &Template) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO templates (id, visit_type, items, followup_enabled, max_followups)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            template.template_id,
            template.visit_type,
            serde_json::to_string(&template.items)?,
            template.followup_enabled,
            template.max_followups,
        ],
    )?;
    Ok(())
}

fn read_session(conn: &Connection, id: &str) -> Result<Option<Session>, StoreError> {
    #[allow(clippy::type_complexity)]
    let row: Option<(
        String,
        Option<String>,
        Option<String>,
        String,
        String,
        Option<String>,
        String,
        String,
        u32,
        u32,
        String,
        String,
        Option<String>,
        Option<String>,
        bool,
    )> = conn
        .query_row(
            "SELECT patient_name, patient_kana, birthdate, visit_type, template_id,
                    summary, status, attempt_counts, followups_used, followups_allowed,
                    llm_question_texts, question_texts, started_at, finalized_at, interrupted
             FROM sessions WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                    row.get(10)?,
                    row.get(11)?,
                    row.get(12)?,
                    row.get(13)?,
                    row.get(14)?,
                ))
            },
        )
        .optional()?;
    let Some((
        patient_name,
        patient_kana,
        birthdate,
        visit_type,
        template_id,
        summary,
        status,
        attempt_counts,
        followups_used,
        followups_allowed,
        llm_question_texts,
        question_texts,
        started_at,
        finalized_at,
        interrupted,
    )) = row
    else {
        return Ok(None);
    };

    let mut answers: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    let mut stmt =
        conn.prepare("SELECT item_id, value FROM session_answers WHERE session_id = ?1")?;
    let mut rows = stmt.query(params![id])?;
    while let Some(row) = rows.next()? {
        let item_id: String = row.get(0)?;
        let value: String = row.get(1)?;
        answers.insert(item_id, serde_json::from_str(&value)?);
    }

    Ok(Some(Session {
        id: id.to_string(),
        patient_name,
        patient_kana,
        birthdate,
        visit_type,
        template_id,
        answers,
        summary,
        status: CompletionStatus::parse(&status)?,
        attempt_counts: serde_json::from_str(&attempt_counts)?,
        followups_used,
        followups_allowed,
        llm_question_texts: serde_json::from_str(&llm_question_texts)?,
        question_texts: serde_json::from_str(&question_texts)?,
        started_at: ts_from_sql(started_at)?,
        finalized_at: ts_from_sql(finalized_at)?,
        interrupted,
    }))
}

fn session_ids(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT id FROM sessions")?;
    let mut rows = stmt.query([])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get(0)?);
    }
    Ok(ids)
}

/// Write the parent row and delete-then-reinsert the answer rows. The
/// caller wraps this in a transaction so a reader never observes a
/// half-updated session.
fn write_session(conn: &Connection, session: &Session) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO sessions
            (id, patient_name, patient_kana, birthdate, visit_type, template_id,
             summary, status, attempt_counts, followups_used, followups_allowed,
             llm_question_texts, question_texts, started_at, finalized_at, interrupted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            session.id,
            session.patient_name,
            session.patient_kana,
            session.birthdate,
            session.visit_type,
            session.template_id,
            session.summary,
            session.status.as_str(),
            serde_json::to_string(&session.attempt_counts)?,
            session.followups_used,
            session.followups_allowed,
            serde_json::to_string(&session.llm_question_texts)?,
            serde_json::to_string(&session.question_texts)?,
            ts_to_sql(session.started_at),
            ts_to_sql(session.finalized_at),
            session.interrupted,
        ],
    )?;
    conn.execute(
        "DELETE FROM session_answers WHERE session_id = ?1",
        params![session.id],
    )?;
    for (item_id, value) in &session.answers {
        conn.execute(
            "INSERT INTO session_answers (session_id, item_id, value) VALUES (?1, ?2, ?3)",
            params![session.id, item_id, serde_json::to_string(value)?],
        )?;
    }
    Ok(())
}

fn prompt_table(kind: PromptKind) -> &'static str {
    match kind {
        PromptKind::Summary => "summary_prompts",
        PromptKind::Followup => "followup_prompts",
    }
}

fn read_prompts_from(
    conn: &Connection,
    kind: PromptKind,
) -> Result<Vec<PromptConfig>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, visit_type, text, enabled FROM {} ORDER BY id, visit_type",
        prompt_table(kind)
    ))?;
    let mut rows = stmt.query([])?;
    let mut prompts = Vec::new();
    while let Some(row) = rows.next()? {
        prompts.push(PromptConfig {
            template_id: row.get(0)?,
            visit_type: row.get(1)?,
            kind,
            text: row.get(2)?,
            enabled: row.get(3)?,
        });
    }
    Ok(prompts)
}

fn read_user(conn: &Connection, username: &str) -> Result<Option<UserRecord>, StoreError> {
    #[allow(clippy::type_complexity)]
    let row: Option<(String, Option<String>, String, bool, String, String)> = conn
        .query_row(
            "SELECT password_hash, totp_secret_enc, totp_mode, initial_password,
                    created_at, updated_at
             FROM users WHERE username = ?1",
            params![username],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .optional()?;
    let Some((password_hash, totp_secret_enc, totp_mode, initial_password, created_at, updated_at)) =
        row
    else {
        return Ok(None);
    };
    Ok(Some(UserRecord {
        username: username.to_string(),
        password_hash,
        totp_secret_enc,
        totp_mode: TotpMode::parse(&totp_mode)?,
        initial_password,
        created_at: created_at
            .parse()
            .map_err(|e| StoreError::Validation(format!("stored timestamp: {e}")))?,
        updated_at: updated_at
            .parse()
            .map_err(|e| StoreError::Validation(format!("stored timestamp: {e}")))?,
    }))
}

// ── Trait implementation ─────────────────────────────────────────────────────

#[async_trait]
impl PersistenceBackend for SqliteBackend {
    async fn init(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            schema::apply_migrations(conn)?;
            schema::seed_default_admin(conn)?;
            schema::purge_legacy_settings(conn)?;
            Ok(())
        })?;
        if let Some(couch) = &self.couch {
            couch.ensure_database().await?;
        }
        info!(path = %self.path.display(), mirror = self.couch.is_some(), "sqlite backend initialized");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        // The connection closes on drop; WAL checkpoints on close.
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
    }

    async fn upsert_template(&self, template: Template) -> Result<(), StoreError> {
        let template = template.normalized();
        self.with_conn(|conn| write_template(conn, &template))
    }

    async fn get_template(
        &self,
        template_id: &str,
        visit_type: &str,
    ) -> Result<Option<Template>, StoreError> {
        self.with_conn(|conn| read_template(conn, template_id, visit_type))
    }

    async fn list_templates(&self) -> Result<Vec<Template>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, visit_type, items, followup_enabled, max_followups
                 FROM templates ORDER BY id, visit_type",
            )?;
            let mut rows = stmt.query([])?;
            let mut templates = Vec::new();
            while let Some(row) = rows.next()? {
                let items_json: String = row.get(2)?;
                templates.push(
                    Template {
                        template_id: row.get(0)?,
                        visit_type: row.get(1)?,
                        items: serde_json::from_str(&items_json)?,
                        followup_enabled: row.get(3)?,
                        max_followups: row.get(4)?,
                    }
                    .normalized(),
                );
            }
            Ok(templates)
        })
    }

    async fn delete_template(
        &self,
        template_id: &str,
        visit_type: &str,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM templates WHERE id = ?1 AND visit_type = ?2",
                params![template_id, visit_type],
            )?;
            Ok(())
        })
    }

    async fn rename_template(&self, old_id: &str, new_id: &str) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let source: i64 = tx.query_row(
                "SELECT COUNT(*) FROM templates WHERE id = ?1",
                params![old_id],
                |row| row.get(0),
            )?;
            if source == 0 {
                return Err(StoreError::not_found(format!("template {old_id:?}")));
            }
            let taken: i64 = tx.query_row(
                "SELECT COUNT(*) FROM templates WHERE id = ?1",
                params![new_id],
                |row| row.get(0),
            )?;
            if taken > 0 {
                return Err(StoreError::conflict(format!(
                    "template id {new_id:?} already in use"
                )));
            }

            tx.execute(
                "UPDATE templates SET id = ?1 WHERE id = ?2",
                params![new_id, old_id],
            )?;
            tx.execute(
                "UPDATE summary_prompts SET id = ?1 WHERE id = ?2",
                params![new_id, old_id],
            )?;
            tx.execute(
                "UPDATE followup_prompts SET id = ?1 WHERE id = ?2",
                params![new_id, old_id],
            )?;
            tx.execute(
                "UPDATE sessions SET template_id = ?1 WHERE template_id = ?2",
                params![new_id, old_id],
            )?;
            tx.commit()?;
            Ok(())
        })?;

        // Post-commit, best-effort propagation: default-template setting
        // and the CouchDB session mirror.
        let propagated = self.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM app_settings WHERE key = 'global'",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(raw) = raw {
                let mut settings: AppSettings = serde_json::from_str(&raw)?;
                if settings.default_template_id.as_deref() == Some(old_id) {
                    settings.default_template_id = Some(new_id.to_string());
                    conn.execute(
                        "UPDATE app_settings SET value = ?1 WHERE key = 'global'",
                        [serde_json::to_string(&settings)?],
                    )?;
                }
            }
            Ok(())
        });
        if let Err(e) = propagated {
            warn!(error = %e, old_id, new_id, "default-template setting not updated after rename");
        }

        if let Some(couch) = &self.couch
            && let Err(e) = couch.update_template_refs(old_id, new_id).await
        {
            warn!(error = %e, old_id, new_id, "session mirror not updated after rename");
        }

        Ok(())
    }

    async fn save_session(&self, mut session: Session) -> Result<Session, StoreError> {
        let items = self
            .with_conn(|conn| read_template(conn, &session.template_id, &session.visit_type))?
            .map(|t| t.items)
            .unwrap_or_default();
        session.derive_computed(&items);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            write_session(&tx, &session)?;
            tx.commit()?;
            Ok(())
        })?;

        // The mirror is a user-visible commitment: when configured, a failed
        // mirror write fails the save instead of quietly leaving the mirror
        // stale.
        if let Some(couch) = &self.couch {
            couch.put_session(&session).await?;
        }

        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        self.with_conn(|conn| read_session(conn, id))
    }

    async fn list_sessions(&self, query: &SessionQuery) -> Result<Vec<Session>, StoreError> {
        let mut sessions = self.with_conn(|conn| {
            let ids = session_ids(conn)?;
            let mut sessions = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(session) = read_session(conn, &id)? {
                    sessions.push(session);
                }
            }
            Ok(sessions)
        })?;
        sessions.retain(|s| query.matches(s));
        SessionQuery::sort(&mut sessions);
        Ok(sessions)
    }

    async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
            Ok(())
        })?;
        if let Some(couch) = &self.couch
            && let Err(e) = couch.delete_session(id).await
        {
            warn!(error = %e, id, "session mirror delete failed");
        }
        Ok(())
    }

    async fn delete_sessions(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for id in ids {
            let existed = self.with_conn(|conn| {
                Ok(conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])? > 0)
            })?;
            if existed {
                deleted += 1;
                if let Some(couch) = &self.couch
                    && let Err(e) = couch.delete_session(id).await
                {
                    warn!(error = %e, id, "session mirror delete failed");
                }
            }
        }
        Ok(deleted)
    }

    async fn export_sessions(&self) -> Result<SessionSnapshot, StoreError> {
        let sessions = self.list_sessions(&SessionQuery::default()).await?;
        Ok(SessionSnapshot { sessions })
    }

    async fn import_sessions(
        &self,
        snapshot: SessionSnapshot,
        mode: ImportMode,
    ) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if mode == ImportMode::Replace {
                tx.execute("DELETE FROM sessions", [])?;
            }
            for session in &snapshot.sessions {
                let items = read_template(&tx, &session.template_id, &session.visit_type)?
                    .map(|t| t.items)
                    .unwrap_or_default();
                let mut session = session.clone();
                session.derive_computed(&items);
                write_session(&tx, &session)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    async fn save_prompt(&self, prompt: PromptConfig) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO {} (id, visit_type, text, enabled)
                     VALUES (?1, ?2, ?3, ?4)",
                    prompt_table(prompt.kind)
                ),
                params![
                    prompt.template_id,
                    prompt.visit_type,
                    prompt.text,
                    prompt.enabled
                ],
            )?;
            Ok(())
        })
    }

    async fn get_prompt(
        &self,
        template_id: &str,
        visit_type: &str,
        kind: PromptKind,
    ) -> Result<Option<PromptConfig>, StoreError> {
        self.with_conn(|conn| {
            let row: Option<(String, bool)> = conn
                .query_row(
                    &format!(
                        "SELECT text, enabled FROM {} WHERE id = ?1 AND visit_type = ?2",
                        prompt_table(kind)
                    ),
                    params![template_id, visit_type],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(row.map(|(text, enabled)| PromptConfig {
                template_id: template_id.to_string(),
                visit_type: visit_type.to_string(),
                kind,
                text,
                enabled,
            }))
        })
    }

    async fn list_prompts(&self) -> Result<Vec<PromptConfig>, StoreError> {
        self.with_conn(|conn| {
            let mut prompts = read_prompts_from(conn, PromptKind::Summary)?;
            prompts.extend(read_prompts_from(conn, PromptKind::Followup)?);
            Ok(prompts)
        })
    }

    async fn delete_prompts(
        &self,
        template_id: &str,
        visit_type: &str,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            for kind in [PromptKind::Summary, PromptKind::Followup] {
                conn.execute(
                    &format!(
                        "DELETE FROM {} WHERE id = ?1 AND visit_type = ?2",
                        prompt_table(kind)
                    ),
                    params![template_id, visit_type],
                )?;
            }
            Ok(())
        })
    }

    async fn save_app_settings(&self, settings: AppSettings) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO app_settings (key, value) VALUES ('global', ?1)",
                [serde_json::to_string(&settings)?],
            )?;
            Ok(())
        })
    }

    async fn get_app_settings(&self) -> Result<Option<AppSettings>, StoreError> {
        self.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM app_settings WHERE key = 'global'",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            raw.map(|r| serde_json::from_str(&r).map_err(StoreError::from))
                .transpose()
        })
    }

    async fn save_llm_settings(&self, settings: LlmSettings) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO llm_settings (key, value) VALUES ('global', ?1)",
                [serde_json::to_string(&settings)?],
            )?;
            Ok(())
        })
    }

    async fn get_llm_settings(&self) -> Result<Option<LlmSettings>, StoreError> {
        self.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM llm_settings WHERE key = 'global'",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            raw.map(|r| serde_json::from_str(&r).map_err(StoreError::from))
                .transpose()
        })
    }

    async fn upsert_user(&self, user: UserRecord) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO users
                    (username, password_hash, totp_secret_enc, totp_mode,
                     initial_password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.username,
                    user.password_hash,
                    user.totp_secret_enc,
                    user.totp_mode.as_str(),
                    user.initial_password,
                    user.created_at.to_string(),
                    user.updated_at.to_string(),
                ],
            )?;
            Ok(())
        })
    }

    async fn get_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        self.with_conn(|conn| read_user(conn, username))
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT username FROM users ORDER BY username")?;
            let mut rows = stmt.query([])?;
            let mut usernames: Vec<String> = Vec::new();
            while let Some(row) = rows.next()? {
                usernames.push(row.get(0)?);
            }
            let mut users = Vec::with_capacity(usernames.len());
            for username in usernames {
                if let Some(user) = read_user(conn, &username)? {
                    users.push(user);
                }
            }
            Ok(users)
        })
    }

    async fn delete_user(&self, username: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM users WHERE username = ?1", params![username])?;
            Ok(())
        })
    }

    async fn append_audit(
        &self,
        kind: &str,
        username: &str,
        note: &str,
    ) -> Result<(), StoreError> {
        let at = jiff::Timestamp::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO audit_log (at, kind, username, note) VALUES (?1, ?2, ?3, ?4)",
                params![at.to_string(), kind, username, note],
            )?;
            Ok(())
        })?;
        info!(
            audit.kind = %kind,
            audit.username = %username,
            audit.note = %note,
            "audit event"
        );
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, at, kind, username, note FROM audit_log
                 ORDER BY id DESC LIMIT ?1",
            )?;
            let mut rows = stmt.query(params![limit as i64])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                let at: String = row.get(1)?;
                entries.push(AuditEntry {
                    id: row.get(0)?,
                    at: at
                        .parse()
                        .map_err(|e| StoreError::Validation(format!("stored timestamp: {e}")))?,
                    kind: row.get(2)?,
                    username: row.get(3)?,
                    note: row.get(4)?,
                });
            }
            Ok(entries)
        })
    }

    async fn export_questionnaire_settings(&self) -> Result<QuestionnaireSnapshot, StoreError> {
        Ok(QuestionnaireSnapshot {
            templates: self.list_templates().await?,
            prompts: self.list_prompts().await?,
            app_settings: self.get_app_settings().await?,
            llm_settings: self.get_llm_settings().await?,
        })
    }

    async fn import_questionnaire_settings(
        &self,
        snapshot: QuestionnaireSnapshot,
        mode: ImportMode,
    ) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if mode == ImportMode::Replace {
                tx.execute("DELETE FROM templates", [])?;
                tx.execute("DELETE FROM summary_prompts", [])?;
                tx.execute("DELETE FROM followup_prompts", [])?;
            }
            for template in &snapshot.templates {
                write_template(&tx, &template.clone().normalized())?;
            }
            for prompt in &snapshot.prompts {
                tx.execute(
                    &format!(
                        "INSERT OR REPLACE INTO {} (id, visit_type, text, enabled)
                         VALUES (?1, ?2, ?3, ?4)",
                        prompt_table(prompt.kind)
                    ),
                    params![
                        prompt.template_id,
                        prompt.visit_type,
                        prompt.text,
                        prompt.enabled
                    ],
                )?;
            }
            if let Some(app) = &snapshot.app_settings {
                tx.execute(
                    "INSERT OR REPLACE INTO app_settings (key, value) VALUES ('global', ?1)",
                    [serde_json::to_string(app)?],
                )?;
            }
            if let Some(llm) = &snapshot.llm_settings {
                tx.execute(
                    "INSERT OR REPLACE INTO llm_settings (key, value) VALUES ('global', ?1)",
                    [serde_json::to_string(llm)?],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }
}
