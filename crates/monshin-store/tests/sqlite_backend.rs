//! Integration tests for the SQLite adapter, run against in-memory or
//! temp-file databases.

use std::collections::BTreeMap;

use monshin_core::models::prompt::{PromptConfig, PromptKind};
use monshin_core::models::session::{CompletionStatus, Session};
use monshin_core::models::settings::{AppSettings, LlmSettings};
use monshin_core::models::snapshot::{ImportMode, QuestionnaireSnapshot, SessionSnapshot};
use monshin_core::models::template::{ItemType, QuestionItem, Template};
use monshin_store::backend::{PersistenceBackend, SessionQuery};
use monshin_store::config::StoreConfig;
use monshin_store::error::StoreError;
use monshin_store::sqlite::SqliteBackend;

fn item(id: &str, label: &str, input_type: ItemType) -> QuestionItem {
    QuestionItem {
        id: id.to_string(),
        label: label.to_string(),
        input_type,
        required: false,
        options: vec![],
        allow_free_text: false,
        show_when: None,
    }
}

fn template(id: &str, visit_type: &str) -> Template {
    Template {
        template_id: id.to_string(),
        visit_type: visit_type.to_string(),
        items: vec![
            item("q1", "主訴", ItemType::Text),
            item("q2", "発症時期", ItemType::Date),
        ],
        followup_enabled: true,
        max_followups: 3,
    }
}

fn session(id: &str, name: &str, template_id: &str) -> Session {
    let mut s = Session::new(name, "first", template_id);
    s.id = id.to_string();
    s
}

async fn backend() -> SqliteBackend {
    let backend = SqliteBackend::in_memory().unwrap();
    backend.init().await.unwrap();
    backend
}

#[tokio::test]
async fn init_seeds_default_admin_once() {
    let backend = backend().await;
    let users = backend.list_users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "admin");
    assert!(users[0].initial_password);

    // Re-running init is a no-op, not a second seed.
    backend.init().await.unwrap();
    assert_eq!(backend.list_users().await.unwrap().len(), 1);
}

#[tokio::test]
async fn template_upsert_is_idempotent() {
    let backend = backend().await;
    let t = template("general", "first");
    backend.upsert_template(t.clone()).await.unwrap();
    backend.upsert_template(t.clone()).await.unwrap();

    let stored = backend.get_template("general", "first").await.unwrap().unwrap();
    assert_eq!(stored, t);
    assert_eq!(backend.list_templates().await.unwrap().len(), 1);
}

#[tokio::test]
async fn legacy_single_items_never_survive_a_round_trip() {
    let backend = backend().await;
    let mut t = template("general", "first");
    t.items[0].input_type = ItemType::Single;
    backend.upsert_template(t).await.unwrap();

    let stored = backend.get_template("general", "first").await.unwrap().unwrap();
    assert_eq!(stored.items[0].input_type, ItemType::Multi);
}

#[tokio::test]
async fn absent_reads_return_none_not_errors() {
    let backend = backend().await;
    assert!(backend.get_template("nope", "first").await.unwrap().is_none());
    assert!(backend.get_session("nope").await.unwrap().is_none());
    assert!(backend
        .get_prompt("nope", "first", PromptKind::Summary)
        .await
        .unwrap()
        .is_none());
    assert!(backend.get_user("nope").await.unwrap().is_none());
    assert!(backend.get_app_settings().await.unwrap().is_none());
}

#[tokio::test]
async fn save_session_derives_computed_fields() {
    let backend = backend().await;
    backend.upsert_template(template("general", "first")).await.unwrap();

    let mut s = session("s1", "山田 太郎", "general");
    s.interrupted = false; // stale value, must be recomputed
    s.llm_question_texts
        .insert("fu1".to_string(), "他に気になる症状は?".to_string());
    s.llm_question_texts
        .insert("q2".to_string(), "いつ頃から続いていますか?".to_string());

    let saved = backend.save_session(s).await.unwrap();
    assert!(saved.interrupted);
    assert_eq!(saved.question_texts["q1"], "主訴");
    // LLM-origin text wins over the template label.
    assert_eq!(saved.question_texts["q2"], "いつ頃から続いていますか?");
    assert_eq!(saved.question_texts["fu1"], "他に気になる症状は?");

    let stored = backend.get_session("s1").await.unwrap().unwrap();
    assert_eq!(stored, saved);
}

#[tokio::test]
async fn finalized_sessions_are_not_interrupted() {
    let backend = backend().await;
    let mut s = session("s1", "山田 太郎", "general");
    s.status = CompletionStatus::Finalized;
    s.finalized_at = Some("2026-02-01T09:30:00Z".parse().unwrap());
    let saved = backend.save_session(s).await.unwrap();
    assert!(!saved.interrupted);
}

#[tokio::test]
async fn started_at_falls_back_to_finalized_at_on_save() {
    let backend = backend().await;
    let mut s = session("s1", "山田 太郎", "general");
    s.started_at = None;
    s.status = CompletionStatus::Finalized;
    s.finalized_at = Some("2026-02-01T09:30:00Z".parse().unwrap());
    let saved = backend.save_session(s).await.unwrap();
    assert_eq!(saved.started_at, saved.finalized_at);
}

#[tokio::test]
async fn answers_round_trip_with_mixed_value_types() {
    let backend = backend().await;
    let mut s = session("s1", "山田 太郎", "general");
    s.answers.insert("q1".to_string(), serde_json::json!("頭痛"));
    s.answers
        .insert("q2".to_string(), serde_json::json!(["発熱", "咳"]));
    s.answers.insert("q3".to_string(), serde_json::json!(38.5));
    backend.save_session(s.clone()).await.unwrap();

    let stored = backend.get_session("s1").await.unwrap().unwrap();
    assert_eq!(stored.answers, s.answers);
}

#[tokio::test]
async fn name_search_ignores_whitespace_and_width() {
    let backend = backend().await;
    backend
        .save_session(session("s1", "山田 太郎", "general"))
        .await
        .unwrap();
    backend
        .save_session(session("s2", "佐藤 花子", "general"))
        .await
        .unwrap();

    // Ideographic space in the stored name, none in the query.
    let query = SessionQuery {
        name: Some("山田太郎".to_string()),
        ..Default::default()
    };
    let hits = backend.list_sessions(&query).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "s1");

    // Full-width romaji query against half-width stored text.
    backend
        .save_session(session("s3", "John Smith", "general"))
        .await
        .unwrap();
    let query = SessionQuery {
        name: Some("Ｓｍｉｔｈ".to_string()),
        ..Default::default()
    };
    let hits = backend.list_sessions(&query).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "s3");
}

#[tokio::test]
async fn sessions_list_newest_first_with_date_filters() {
    let backend = backend().await;
    for (id, start) in [
        ("s1", "2026-02-01T09:00:00Z"),
        ("s2", "2026-02-03T09:00:00Z"),
        ("s3", "2026-02-02T09:00:00Z"),
    ] {
        let mut s = session(id, "山田 太郎", "general");
        s.started_at = Some(start.parse().unwrap());
        backend.save_session(s).await.unwrap();
    }

    let all = backend.list_sessions(&SessionQuery::default()).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["s2", "s3", "s1"]);

    let query = SessionQuery {
        from: Some("2026-02-02T00:00:00Z".parse().unwrap()),
        to: Some("2026-02-02T23:59:59Z".parse().unwrap()),
        ..Default::default()
    };
    let hits = backend.list_sessions(&query).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "s3");
}

#[tokio::test]
async fn birthdate_filter_is_exact() {
    let backend = backend().await;
    let mut s = session("s1", "山田 太郎", "general");
    s.birthdate = Some("1980-04-12".to_string());
    backend.save_session(s).await.unwrap();

    let query = SessionQuery {
        birthdate: Some("1980-04-12".to_string()),
        ..Default::default()
    };
    assert_eq!(backend.list_sessions(&query).await.unwrap().len(), 1);

    let query = SessionQuery {
        birthdate: Some("1980-04-13".to_string()),
        ..Default::default()
    };
    assert!(backend.list_sessions(&query).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_sessions_reports_how_many_existed() {
    let backend = backend().await;
    backend.save_session(session("s1", "a", "t")).await.unwrap();
    backend.save_session(session("s2", "b", "t")).await.unwrap();

    let deleted = backend
        .delete_sessions(&["s1".to_string(), "ghost".to_string(), "s2".to_string()])
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    assert!(backend.list_sessions(&SessionQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn rename_template_cascades_everywhere() {
    let backend = backend().await;
    backend.upsert_template(template("old", "first")).await.unwrap();
    backend.upsert_template(template("old", "return")).await.unwrap();
    backend
        .save_prompt(PromptConfig {
            template_id: "old".to_string(),
            visit_type: "first".to_string(),
            kind: PromptKind::Summary,
            text: "まとめてください".to_string(),
            enabled: true,
        })
        .await
        .unwrap();
    backend.save_session(session("s1", "山田 太郎", "old")).await.unwrap();
    let mut settings = AppSettings::default();
    settings.default_template_id = Some("old".to_string());
    backend.save_app_settings(settings).await.unwrap();

    backend.rename_template("old", "new").await.unwrap();

    assert!(backend.get_template("old", "first").await.unwrap().is_none());
    assert!(backend.get_template("new", "first").await.unwrap().is_some());
    assert!(backend.get_template("new", "return").await.unwrap().is_some());
    assert!(backend
        .get_prompt("new", "first", PromptKind::Summary)
        .await
        .unwrap()
        .is_some());
    assert_eq!(
        backend.get_session("s1").await.unwrap().unwrap().template_id,
        "new"
    );
    assert_eq!(
        backend
            .get_app_settings()
            .await
            .unwrap()
            .unwrap()
            .default_template_id
            .as_deref(),
        Some("new")
    );
}

#[tokio::test]
async fn rename_template_rejects_missing_source_and_occupied_target() {
    let backend = backend().await;
    backend.upsert_template(template("a", "first")).await.unwrap();
    backend.upsert_template(template("b", "first")).await.unwrap();

    assert!(matches!(
        backend.rename_template("ghost", "c").await,
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        backend.rename_template("a", "b").await,
        Err(StoreError::Conflict { .. })
    ));
    // Nothing moved.
    assert!(backend.get_template("a", "first").await.unwrap().is_some());
    assert!(backend.get_template("b", "first").await.unwrap().is_some());
}

#[tokio::test]
async fn rename_template_rolls_back_on_mid_transaction_failure() {
    // File-backed database so a second connection can install a persistent
    // trigger that aborts the session cascade mid-transaction.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monshin.db");
    let config = StoreConfig {
        sqlite_path: path.clone(),
        ..Default::default()
    };
    let backend = SqliteBackend::open(&config).unwrap();
    backend.init().await.unwrap();

    backend.upsert_template(template("old", "first")).await.unwrap();
    backend
        .save_prompt(PromptConfig {
            template_id: "old".to_string(),
            visit_type: "first".to_string(),
            kind: PromptKind::Followup,
            text: "追加質問".to_string(),
            enabled: true,
        })
        .await
        .unwrap();
    backend.save_session(session("s1", "山田 太郎", "old")).await.unwrap();

    {
        let saboteur = rusqlite::Connection::open(&path).unwrap();
        saboteur
            .execute_batch(
                "CREATE TRIGGER abort_session_rename BEFORE UPDATE OF template_id ON sessions
                 BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
            )
            .unwrap();
    }

    assert!(backend.rename_template("old", "new").await.is_err());

    // The earlier steps of the cascade were rolled back with the failure.
    assert!(backend.get_template("old", "first").await.unwrap().is_some());
    assert!(backend.get_template("new", "first").await.unwrap().is_none());
    assert!(backend
        .get_prompt("old", "first", PromptKind::Followup)
        .await
        .unwrap()
        .is_some());
    assert_eq!(
        backend.get_session("s1").await.unwrap().unwrap().template_id,
        "old"
    );
}

#[tokio::test]
async fn prompts_are_stored_per_kind() {
    let backend = backend().await;
    for kind in [PromptKind::Summary, PromptKind::Followup] {
        backend
            .save_prompt(PromptConfig {
                template_id: "general".to_string(),
                visit_type: "first".to_string(),
                kind,
                text: format!("{} prompt", kind.as_str()),
                enabled: true,
            })
            .await
            .unwrap();
    }

    let summary = backend
        .get_prompt("general", "first", PromptKind::Summary)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.text, "summary prompt");
    assert_eq!(backend.list_prompts().await.unwrap().len(), 2);

    backend.delete_prompts("general", "first").await.unwrap();
    assert!(backend.list_prompts().await.unwrap().is_empty());
}

#[tokio::test]
async fn questionnaire_import_merge_preserves_unrelated_keys() {
    let backend = backend().await;
    backend.upsert_template(template("keep", "first")).await.unwrap();
    backend.upsert_template(template("overwrite", "first")).await.unwrap();

    let mut incoming = template("overwrite", "first");
    incoming.max_followups = 9;
    let snapshot = QuestionnaireSnapshot {
        templates: vec![incoming, template("added", "first")],
        prompts: vec![],
        app_settings: None,
        llm_settings: None,
    };
    backend
        .import_questionnaire_settings(snapshot.clone(), ImportMode::Merge)
        .await
        .unwrap();

    assert!(backend.get_template("keep", "first").await.unwrap().is_some());
    assert!(backend.get_template("added", "first").await.unwrap().is_some());
    assert_eq!(
        backend
            .get_template("overwrite", "first")
            .await
            .unwrap()
            .unwrap()
            .max_followups,
        9
    );

    // Merging the same snapshot again changes nothing.
    let before = backend.export_questionnaire_settings().await.unwrap();
    backend
        .import_questionnaire_settings(snapshot, ImportMode::Merge)
        .await
        .unwrap();
    let after = backend.export_questionnaire_settings().await.unwrap();
    assert_eq!(before.templates, after.templates);
}

#[tokio::test]
async fn questionnaire_import_replace_clears_first() {
    let backend = backend().await;
    backend.upsert_template(template("stale", "first")).await.unwrap();
    backend
        .save_prompt(PromptConfig {
            template_id: "stale".to_string(),
            visit_type: "first".to_string(),
            kind: PromptKind::Summary,
            text: "x".to_string(),
            enabled: false,
        })
        .await
        .unwrap();

    let snapshot = QuestionnaireSnapshot {
        templates: vec![template("fresh", "first")],
        prompts: vec![],
        app_settings: Some(AppSettings::default()),
        llm_settings: Some(LlmSettings::default()),
    };
    backend
        .import_questionnaire_settings(snapshot, ImportMode::Replace)
        .await
        .unwrap();

    assert!(backend.get_template("stale", "first").await.unwrap().is_none());
    assert!(backend.get_template("fresh", "first").await.unwrap().is_some());
    assert!(backend.list_prompts().await.unwrap().is_empty());
    assert!(backend.get_app_settings().await.unwrap().is_some());
}

#[tokio::test]
async fn session_import_replace_drops_existing_sessions() {
    let backend = backend().await;
    backend.save_session(session("old", "a", "t")).await.unwrap();

    let snapshot = SessionSnapshot {
        sessions: vec![session("new", "b", "t")],
    };
    backend
        .import_sessions(snapshot, ImportMode::Replace)
        .await
        .unwrap();

    assert!(backend.get_session("old").await.unwrap().is_none());
    assert!(backend.get_session("new").await.unwrap().is_some());
}

#[tokio::test]
async fn session_import_recomputes_derived_fields() {
    let backend = backend().await;
    backend.upsert_template(template("general", "first")).await.unwrap();

    let mut incoming = session("s1", "山田 太郎", "general");
    incoming.status = CompletionStatus::Finalized;
    incoming.interrupted = true; // wrong in the snapshot, recomputed on import
    incoming.finalized_at = Some("2026-02-01T09:00:00Z".parse().unwrap());
    backend
        .import_sessions(
            SessionSnapshot {
                sessions: vec![incoming],
            },
            ImportMode::Merge,
        )
        .await
        .unwrap();

    let stored = backend.get_session("s1").await.unwrap().unwrap();
    assert!(!stored.interrupted);
    assert_eq!(stored.question_texts["q1"], "主訴");
}

#[tokio::test]
async fn audit_log_is_append_only_newest_first() {
    let backend = backend().await;
    backend.append_audit("login", "admin", "").await.unwrap();
    backend.append_audit("template_update", "admin", "general").await.unwrap();
    backend.append_audit("logout", "admin", "").await.unwrap();

    let entries = backend.list_audit(2).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, "logout");
    assert_eq!(entries[1].kind, "template_update");
}

#[tokio::test]
async fn init_purges_legacy_insecure_settings_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monshin.db");
    let config = StoreConfig {
        sqlite_path: path.clone(),
        ..Default::default()
    };
    let backend = SqliteBackend::open(&config).unwrap();
    backend.init().await.unwrap();

    // Plant a settings row the way an older deployment persisted it, with
    // plain credentials inline.
    {
        let mut raw = serde_json::to_value(LlmSettings::default()).unwrap();
        let map = raw.as_object_mut().unwrap();
        map.insert("plain_api_key".to_string(), serde_json::json!("sk-secret"));
        map.insert("proxy_password".to_string(), serde_json::json!("hunter2"));
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO llm_settings (key, value) VALUES ('global', ?1)",
            [serde_json::to_string(&raw).unwrap()],
        )
        .unwrap();
    }

    backend.init().await.unwrap();

    let conn = rusqlite::Connection::open(&path).unwrap();
    let stored: String = conn
        .query_row(
            "SELECT value FROM llm_settings WHERE key = 'global'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    let as_json: serde_json::Value = serde_json::from_str(&stored).unwrap();
    assert!(as_json.get("plain_api_key").is_none());
    assert!(as_json.get("proxy_password").is_none());
    assert_eq!(as_json["provider"], "ollama");
}

#[tokio::test]
async fn user_crud_round_trips() {
    let backend = backend().await;
    let now = jiff::Timestamp::now();
    let user = monshin_core::models::user::UserRecord {
        username: "reception".to_string(),
        password_hash: "pbkdf2-sha256$600000$c2FsdA$aGFzaA".to_string(),
        totp_secret_enc: Some("enc:abcd".to_string()),
        totp_mode: monshin_core::models::user::TotpMode::ResetOnly,
        initial_password: false,
        created_at: now,
        updated_at: now,
    };
    backend.upsert_user(user.clone()).await.unwrap();

    let stored = backend.get_user("reception").await.unwrap().unwrap();
    assert_eq!(stored, user);
    assert_eq!(backend.list_users().await.unwrap().len(), 2); // plus seeded admin

    backend.delete_user("reception").await.unwrap();
    assert!(backend.get_user("reception").await.unwrap().is_none());
}

#[tokio::test]
async fn deleting_a_session_cascades_to_answers() {
    let backend = backend().await;
    let mut s = session("s1", "山田 太郎", "general");
    s.answers.insert("q1".to_string(), serde_json::json!("x"));
    backend.save_session(s).await.unwrap();
    backend.delete_session("s1").await.unwrap();

    // Re-saving under the same id starts from a clean slate.
    let resaved = backend.save_session(session("s1", "山田 太郎", "general")).await.unwrap();
    assert!(resaved.answers.is_empty());
    assert!(backend.get_session("s1").await.unwrap().unwrap().answers.is_empty());
}
