//! Schema setup for the relational store.
//!
//! Evolution is additive only: tables are created if missing and columns
//! added after the initial release are appended via `ALTER TABLE ADD
//! COLUMN`. Nothing is ever dropped, so `init` is safe to run against any
//! older database file.

use rusqlite::Connection;
use tracing::{debug, info};

use monshin_core::models::settings;

use crate::error::StoreError;

/// Username of the seeded administrator account.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

/// Deterministic password hash for the seeded account (PBKDF2 of the
/// documented initial credential). `initial_password` stays set until the
/// operator changes it.
pub const DEFAULT_ADMIN_PASSWORD_HASH: &str =
    "pbkdf2-sha256$600000$bW9uc2hpbi1pbml0$QmkXo0uY0m0FQXW0uJ9w0vX9oVfLO4nYx0t3b9bH0V4=";

/// Tables as of the initial release.
const BASE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS templates (
    id                TEXT NOT NULL,
    visit_type        TEXT NOT NULL,
    items             TEXT NOT NULL DEFAULT '[]',
    followup_enabled  INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (id, visit_type)
);

CREATE TABLE IF NOT EXISTS summary_prompts (
    id          TEXT NOT NULL,
    visit_type  TEXT NOT NULL,
    text        TEXT NOT NULL DEFAULT '',
    enabled     INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (id, visit_type)
);

CREATE TABLE IF NOT EXISTS followup_prompts (
    id          TEXT NOT NULL,
    visit_type  TEXT NOT NULL,
    text        TEXT NOT NULL DEFAULT '',
    enabled     INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (id, visit_type)
);

CREATE TABLE IF NOT EXISTS sessions (
    id                 TEXT PRIMARY KEY,
    patient_name       TEXT NOT NULL,
    birthdate          TEXT,
    visit_type         TEXT NOT NULL,
    template_id        TEXT NOT NULL,
    summary            TEXT,
    status             TEXT NOT NULL,
    followups_used     INTEGER NOT NULL DEFAULT 0,
    followups_allowed  INTEGER NOT NULL DEFAULT 0,
    started_at         TEXT,
    finalized_at       TEXT,
    interrupted        INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS session_answers (
    session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    item_id     TEXT NOT NULL,
    value       TEXT NOT NULL,
    PRIMARY KEY (session_id, item_id)
);

CREATE TABLE IF NOT EXISTS app_settings (
    key    TEXT PRIMARY KEY,
    value  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS llm_settings (
    key    TEXT PRIMARY KEY,
    value  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    username          TEXT PRIMARY KEY,
    password_hash     TEXT NOT NULL,
    initial_password  INTEGER NOT NULL DEFAULT 0,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    at        TEXT NOT NULL,
    kind      TEXT NOT NULL,
    username  TEXT NOT NULL,
    note      TEXT NOT NULL DEFAULT ''
);
";

/// Columns added after the initial release, applied additively.
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    ("templates", "max_followups", "INTEGER NOT NULL DEFAULT 0"),
    ("sessions", "patient_kana", "TEXT"),
    ("sessions", "attempt_counts", "TEXT NOT NULL DEFAULT '{}'"),
    ("sessions", "llm_question_texts", "TEXT NOT NULL DEFAULT '{}'"),
    ("sessions", "question_texts", "TEXT NOT NULL DEFAULT '{}'"),
    ("users", "totp_secret_enc", "TEXT"),
    ("users", "totp_mode", "TEXT NOT NULL DEFAULT 'off'"),
];

/// Bring the schema up to date. Safe to call on every startup.
pub fn apply_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(BASE_SCHEMA)?;
    for (table, column, ddl) in ADDED_COLUMNS {
        ensure_column(conn, table, column, ddl)?;
    }
    Ok(())
}

/// Add `column` to `table` if it is not already present.
fn ensure_column(
    conn: &Connection,
    table: &str,
    column: &str,
    ddl: &str,
) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(());
        }
    }
    debug!(table, column, "adding missing column");
    conn.execute(
        &format!("ALTER TABLE {table} ADD COLUMN {column} {ddl}"),
        [],
    )?;
    Ok(())
}

/// Seed the default administrator when no user exists yet.
pub fn seed_default_admin(conn: &Connection) -> Result<(), StoreError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    if count > 0 {
        return Ok(());
    }
    let now = jiff::Timestamp::now().to_string();
    conn.execute(
        "INSERT INTO users (username, password_hash, initial_password, totp_mode, created_at, updated_at)
         VALUES (?1, ?2, 1, 'off', ?3, ?3)",
        rusqlite::params![DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD_HASH, now],
    )?;
    info!(username = DEFAULT_ADMIN_USERNAME, "seeded default administrator");
    Ok(())
}

/// Remove legacy plain-text credential fields from persisted LLM settings.
pub fn purge_legacy_settings(conn: &Connection) -> Result<(), StoreError> {
    let row: Option<String> = {
        use rusqlite::OptionalExtension;
        conn.query_row(
            "SELECT value FROM llm_settings WHERE key = 'global'",
            [],
            |row| row.get(0),
        )
        .optional()?
    };
    let Some(raw) = row else {
        return Ok(());
    };
    let mut value: serde_json::Value = serde_json::from_str(&raw)?;
    if settings::purge_legacy_fields(&mut value) {
        info!("purged legacy insecure fields from persisted LLM settings");
        conn.execute(
            "UPDATE llm_settings SET value = ?1 WHERE key = 'global'",
            [serde_json::to_string(&value)?],
        )?;
    }
    Ok(())
}
