//! Secondary adapter: Firestore over its REST API.
//!
//! Document hierarchy: a `templates/{id}` parent document with
//! `variants/{visit_type}` children holding the item list and both prompt
//! configurations together; flat `sessions`, `users`, `settings`, and
//! `audit` collections. Collection names carry an optional deployment
//! prefix. Firestore's own `updateTime` is the server-assigned write
//! timestamp for session documents; it is metadata, distinct from the
//! logical `started_at` / `finalized_at` fields.
//!
//! Bulk session export/import is deliberately not built out here and raises
//! [`StoreError::NotImplemented`], so callers can tell "unsupported" from
//! "no data".

pub mod value;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use monshin_core::models::audit::AuditEntry;
use monshin_core::models::prompt::{PromptConfig, PromptKind};
use monshin_core::models::session::Session;
use monshin_core::models::settings::{AppSettings, LlmSettings, purge_legacy_fields};
use monshin_core::models::snapshot::{ImportMode, QuestionnaireSnapshot, SessionSnapshot};
use monshin_core::models::template::{QuestionItem, Template};
use monshin_core::models::user::UserRecord;

use crate::backend::{PersistenceBackend, SessionQuery};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::plugin::BackendPlugin;
use crate::sqlite::schema::{DEFAULT_ADMIN_PASSWORD_HASH, DEFAULT_ADMIN_USERNAME};

const BACKEND_NAME: &str = "firestore";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const PAGE_SIZE: usize = 300;

/// Plugin wrapper registered under the `"firestore"` key.
pub struct FirestorePlugin;

#[async_trait]
impl BackendPlugin for FirestorePlugin {
    fn key(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn connect(
        &self,
        config: &StoreConfig,
    ) -> Result<Box<dyn PersistenceBackend>, StoreError> {
        Ok(Box::new(FirestoreBackend::connect(config)?))
    }
}

pub struct FirestoreBackend {
    http: reqwest::Client,
    /// `{host}/v1/projects/{project}/databases/(default)/documents`
    base: String,
    prefix: String,
    token: Option<String>,
    /// Either an emulator host or a real project id was supplied. Checked
    /// fatally in `init`.
    configured: bool,
}

impl FirestoreBackend {
    /// Build the client. Configuration completeness is checked in `init`,
    /// where it is a fatal error, not deferred to the first call.
    pub fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let fs = &config.firestore;
        let host = match &fs.emulator_host {
            Some(host) => format!("http://{}", host.trim_end_matches('/')),
            None => "https://firestore.googleapis.com".to_string(),
        };
        let project = if fs.project_id.is_empty() {
            // Emulator accepts any project id; init rejects the non-emulator
            // empty case.
            "monshin-emulator".to_string()
        } else {
            fs.project_id.clone()
        };
        let token = match (&fs.emulator_host, &fs.credentials_path) {
            (Some(_), _) => None,
            (None, Some(path)) => Some(
                std::fs::read_to_string(path)
                    .map(|t| t.trim().to_string())
                    .map_err(|e| {
                        StoreError::Validation(format!(
                            "cannot read firestore credentials at {}: {e}",
                            path.display()
                        ))
                    })?,
            ),
            (None, None) => None,
        };
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::unavailable(BACKEND_NAME, e.to_string()))?;
        Ok(FirestoreBackend {
            http,
            base: format!("{host}/v1/projects/{project}/databases/(default)/documents"),
            prefix: fs.prefix.clone(),
            token,
            configured: fs.emulator_host.is_some() || !fs.project_id.is_empty(),
        })
    }

    fn collection(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        self.authorized(builder)
            .send()
            .await
            .map_err(|e| StoreError::unavailable(BACKEND_NAME, e.to_string()))
    }

    /// GET a document's decoded fields, `None` when absent.
    async fn get_doc(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let resp = self.send(self.http.get(format!("{}/{path}", self.base))).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(StoreError::Http(format!(
                "firestore get {path} returned {}",
                resp.status()
            )));
        }
        let doc: Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?;
        let fields = doc
            .get("fields")
            .and_then(|f| f.as_object())
            .cloned()
            .unwrap_or_default();
        Ok(Some(value::decode_fields(&fields)?))
    }

    /// PATCH (set) a whole document from plain JSON fields.
    async fn set_doc(&self, path: &str, fields: &Value) -> Result<(), StoreError> {
        let Some(map) = fields.as_object() else {
            return Err(StoreError::Validation(
                "document body must be a JSON object".to_string(),
            ));
        };
        let body = json!({ "fields": value::encode_fields(map) });
        let resp = self
            .send(self.http.patch(format!("{}/{path}", self.base)).json(&body))
            .await?;
        if !resp.status().is_success() {
            return Err(StoreError::Http(format!(
                "firestore set {path} returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// POST a new document with a server-assigned id.
    async fn create_doc(&self, collection: &str, fields: &Value) -> Result<(), StoreError> {
        let Some(map) = fields.as_object() else {
            return Err(StoreError::Validation(
                "document body must be a JSON object".to_string(),
            ));
        };
        let body = json!({ "fields": value::encode_fields(map) });
        let resp = self
            .send(self.http.post(format!("{}/{collection}", self.base)).json(&body))
            .await?;
        if !resp.status().is_success() {
            return Err(StoreError::Http(format!(
                "firestore create in {collection} returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn delete_doc(&self, path: &str) -> Result<(), StoreError> {
        let resp = self
            .send(self.http.delete(format!("{}/{path}", self.base)))
            .await?;
        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(StoreError::Http(format!(
                "firestore delete {path} returned {}",
                resp.status()
            )))
        }
    }

    /// List a collection's documents as `(doc_id, decoded_fields)` pairs,
    /// following pagination.
    async fn list_docs(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.list_docs_in(collection, None).await
    }

    /// [`list_docs`](Self::list_docs) with the reads joined to a running
    /// transaction, so a commit under that transaction fails if an
    /// interleaved write invalidates what was read.
    async fn list_docs_in(
        &self,
        collection: &str,
        txn: Option<&str>,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self
                .http
                .get(format!("{}/{collection}", self.base))
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(txn) = txn {
                req = req.query(&[("transaction", txn)]);
            }
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }
            let resp = self.send(req).await?;
            if resp.status() == StatusCode::NOT_FOUND {
                return Ok(out);
            }
            if !resp.status().is_success() {
                return Err(StoreError::Http(format!(
                    "firestore list {collection} returned {}",
                    resp.status()
                )));
            }
            let body: Value = resp
                .json()
                .await
                .map_err(|e| StoreError::Http(e.to_string()))?;
            for doc in body
                .get("documents")
                .and_then(|d| d.as_array())
                .cloned()
                .unwrap_or_default()
            {
                let name = doc.get("name").and_then(|n| n.as_str()).unwrap_or_default();
                let id = name.rsplit('/').next().unwrap_or_default().to_string();
                let fields = doc
                    .get("fields")
                    .and_then(|f| f.as_object())
                    .cloned()
                    .unwrap_or_default();
                out.push((id, value::decode_fields(&fields)?));
            }
            page_token = body
                .get("nextPageToken")
                .and_then(|t| t.as_str())
                .map(String::from);
            if page_token.is_none() {
                break;
            }
        }
        Ok(out)
    }

    async fn begin_transaction(&self) -> Result<String, StoreError> {
        let resp = self
            .send(
                self.http
                    .post(format!("{}:beginTransaction", self.base))
                    .json(&json!({})),
            )
            .await?;
        if !resp.status().is_success() {
            return Err(StoreError::Http(format!(
                "firestore beginTransaction returned {}",
                resp.status()
            )));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?;
        body.get("transaction")
            .and_then(|t| t.as_str())
            .map(String::from)
            .ok_or_else(|| StoreError::Http("beginTransaction returned no id".to_string()))
    }

    /// Abandon a transaction that will not be committed. Best-effort: an
    /// unrolled-back transaction only holds its locks until the server
    /// expires it.
    async fn rollback(&self, txn: String) {
        let body = json!({ "transaction": txn });
        if let Err(e) = self
            .send(self.http.post(format!("{}:rollback", self.base)).json(&body))
            .await
        {
            warn!(error = %e, "firestore rollback failed");
        }
    }

    /// Commit a set of writes, optionally under a transaction.
    async fn commit(&self, writes: Vec<Value>, transaction: Option<String>) -> Result<(), StoreError> {
        let mut body = json!({ "writes": writes });
        if let Some(txn) = transaction
            && let Some(map) = body.as_object_mut()
        {
            map.insert("transaction".to_string(), json!(txn));
        }
        let resp = self
            .send(self.http.post(format!("{}:commit", self.base)).json(&body))
            .await?;
        if !resp.status().is_success() {
            return Err(StoreError::Http(format!(
                "firestore commit returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    fn doc_name(&self, path: &str) -> String {
        // Full resource name, as required inside write operations.
        let root = self
            .base
            .splitn(2, "/v1/")
            .nth(1)
            .unwrap_or_default()
            .to_string();
        format!("{root}/{path}")
    }

    fn delete_write(&self, path: &str) -> Value {
        json!({ "delete": self.doc_name(path) })
    }

    fn update_write(&self, path: &str, fields: &Map<String, Value>) -> Value {
        json!({
            "update": {
                "name": self.doc_name(path),
                "fields": value::encode_fields(fields),
            }
        })
    }

    fn variant_path(&self, template_id: &str, visit_type: &str) -> String {
        format!(
            "{}/{template_id}/variants/{visit_type}",
            self.collection("templates")
        )
    }

    async fn read_variant(
        &self,
        template_id: &str,
        visit_type: &str,
    ) -> Result<Option<Value>, StoreError> {
        self.get_doc(&self.variant_path(template_id, visit_type)).await
    }

    /// Write a variant document from its parts, creating the parent marker
    /// document alongside it.
    async fn write_variant(
        &self,
        template_id: &str,
        visit_type: &str,
        fields: Value,
    ) -> Result<(), StoreError> {
        self.set_doc(
            &format!("{}/{template_id}", self.collection("templates")),
            &json!({ "template_id": template_id }),
        )
        .await?;
        self.set_doc(&self.variant_path(template_id, visit_type), &fields)
            .await
    }
}

fn variant_to_template(
    template_id: &str,
    visit_type: &str,
    variant: &Value,
) -> Result<Template, StoreError> {
    let items: Vec<QuestionItem> = match variant.get("items") {
        Some(items) => serde_json::from_value(items.clone())?,
        None => Vec::new(),
    };
    Ok(Template {
        template_id: template_id.to_string(),
        visit_type: visit_type.to_string(),
        items,
        followup_enabled: variant
            .get("followup_enabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        max_followups: variant
            .get("max_followups")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32,
    }
    .normalized())
}

fn template_into_variant(template: &Template, existing: Option<&Value>) -> Result<Value, StoreError> {
    let mut fields = Map::new();
    fields.insert("items".to_string(), serde_json::to_value(&template.items)?);
    fields.insert(
        "followup_enabled".to_string(),
        json!(template.followup_enabled),
    );
    fields.insert("max_followups".to_string(), json!(template.max_followups));
    // Prompts live in the same variant document; carry them through.
    for key in ["summary_prompt", "followup_prompt"] {
        if let Some(prompt) = existing.and_then(|e| e.get(key)) {
            fields.insert(key.to_string(), prompt.clone());
        }
    }
    Ok(Value::Object(fields))
}

fn prompt_field(kind: PromptKind) -> &'static str {
    match kind {
        PromptKind::Summary => "summary_prompt",
        PromptKind::Followup => "followup_prompt",
    }
}

fn session_from_doc(id: &str, mut doc: Value) -> Result<Session, StoreError> {
    if let Some(map) = doc.as_object_mut() {
        map.insert("id".to_string(), json!(id));
        // Server bookkeeping fields are not part of the model.
        map.remove("type");
    }
    Ok(serde_json::from_value(doc)?)
}

#[async_trait]
impl PersistenceBackend for FirestoreBackend {
    async fn init(&self) -> Result<(), StoreError> {
        if !self.configured {
            return Err(StoreError::Validation(
                "firestore backend requires MONSHIN_FIRESTORE_EMULATOR_HOST or a non-empty \
                 MONSHIN_FIRESTORE_PROJECT"
                    .to_string(),
            ));
        }

        // Same startup duties as the primary adapter: seed the first
        // administrator and purge legacy insecure settings fields.
        let users = self.list_docs(&self.collection("users")).await?;
        if users.is_empty() {
            let now = jiff::Timestamp::now();
            let admin = UserRecord {
                username: DEFAULT_ADMIN_USERNAME.to_string(),
                password_hash: DEFAULT_ADMIN_PASSWORD_HASH.to_string(),
                totp_secret_enc: None,
                totp_mode: monshin_core::models::user::TotpMode::Off,
                initial_password: true,
                created_at: now,
                updated_at: now,
            };
            self.upsert_user(admin).await?;
            info!(username = DEFAULT_ADMIN_USERNAME, "seeded default administrator");
        }

        let llm_path = format!("{}/llm", self.collection("settings"));
        if let Some(mut settings) = self.get_doc(&llm_path).await?
            && purge_legacy_fields(&mut settings)
        {
            info!("purged legacy insecure fields from persisted LLM settings");
            self.set_doc(&llm_path, &settings).await?;
        }

        info!(base = %self.base, "firestore backend initialized");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        // A one-document list is the cheapest authenticated round trip.
        let resp = self
            .send(
                self.http
                    .get(format!("{}/{}", self.base, self.collection("templates")))
                    .query(&[("pageSize", "1")]),
            )
            .await?;
        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(StoreError::Http(format!(
                "firestore health probe returned {}",
                resp.status()
            )))
        }
    }

    async fn upsert_template(&self, template: Template) -> Result<(), StoreError> {
        let template = template.normalized();
        let existing = self
            .read_variant(&template.template_id, &template.visit_type)
            .await?;
        let fields = template_into_variant(&template, existing.as_ref())?;
        self.write_variant(&template.template_id, &template.visit_type, fields)
            .await
    }

    async fn get_template(
        &self,
        template_id: &str,
        visit_type: &str,
    ) -> Result<Option<Template>, StoreError> {
        let Some(variant) = self.read_variant(template_id, visit_type).await? else {
            return Ok(None);
        };
        Ok(Some(variant_to_template(template_id, visit_type, &variant)?))
    }

    async fn list_templates(&self) -> Result<Vec<Template>, StoreError> {
        let parents = self.list_docs(&self.collection("templates")).await?;
        let mut templates = Vec::new();
        for (template_id, _) in parents {
            let variants = self
                .list_docs(&format!("{}/{template_id}/variants", self.collection("templates")))
                .await?;
            for (visit_type, variant) in variants {
                templates.push(variant_to_template(&template_id, &visit_type, &variant)?);
            }
        }
        templates.sort_by(|a, b| {
            (&a.template_id, &a.visit_type).cmp(&(&b.template_id, &b.visit_type))
        });
        Ok(templates)
    }

    async fn delete_template(
        &self,
        template_id: &str,
        visit_type: &str,
    ) -> Result<(), StoreError> {
        // Transactional read-modify-write: drop the variant, and when no
        // sibling variant remains, drop the parent document too. The sibling
        // read joins the transaction, so a concurrent upsert adding a
        // variant fails this commit instead of being orphaned.
        let txn = self.begin_transaction().await?;
        let variants = match self
            .list_docs_in(
                &format!("{}/{template_id}/variants", self.collection("templates")),
                Some(&txn),
            )
            .await
        {
            Ok(variants) => variants,
            Err(e) => {
                self.rollback(txn).await;
                return Err(e);
            }
        };
        let mut writes = vec![self.delete_write(&self.variant_path(template_id, visit_type))];
        let only_this = variants.iter().all(|(vt, _)| vt.as_str() == visit_type);
        if only_this {
            writes.push(self.delete_write(&format!("{}/{template_id}", self.collection("templates"))));
        }
        self.commit(writes, Some(txn)).await
    }

    async fn rename_template(&self, old_id: &str, new_id: &str) -> Result<(), StoreError> {
        // The existence checks and the move are one transaction: the reads
        // join it, so renaming over an id created in between fails the
        // commit rather than clobbering it.
        let txn = self.begin_transaction().await?;
        let old_variants = match self
            .list_docs_in(
                &format!("{}/{old_id}/variants", self.collection("templates")),
                Some(&txn),
            )
            .await
        {
            Ok(variants) => variants,
            Err(e) => {
                self.rollback(txn).await;
                return Err(e);
            }
        };
        if old_variants.is_empty() {
            self.rollback(txn).await;
            return Err(StoreError::not_found(format!("template {old_id:?}")));
        }
        let new_variants = match self
            .list_docs_in(
                &format!("{}/{new_id}/variants", self.collection("templates")),
                Some(&txn),
            )
            .await
        {
            Ok(variants) => variants,
            Err(e) => {
                self.rollback(txn).await;
                return Err(e);
            }
        };
        if !new_variants.is_empty() {
            self.rollback(txn).await;
            return Err(StoreError::conflict(format!(
                "template id {new_id:?} already in use"
            )));
        }

        let mut writes = Vec::new();
        let mut parent = Map::new();
        parent.insert("template_id".to_string(), json!(new_id));
        writes.push(self.update_write(&format!("{}/{new_id}", self.collection("templates")), &parent));
        for (visit_type, variant) in &old_variants {
            let Some(fields) = variant.as_object() else {
                continue;
            };
            writes.push(self.update_write(&self.variant_path(new_id, visit_type), fields));
            writes.push(self.delete_write(&self.variant_path(old_id, visit_type)));
        }
        writes.push(self.delete_write(&format!("{}/{old_id}", self.collection("templates"))));
        self.commit(writes, Some(txn)).await?;

        // Best-effort propagation to session references and the default
        // template setting.
        match self.list_docs(&self.collection("sessions")).await {
            Ok(sessions) => {
                for (id, mut doc) in sessions {
                    if doc.get("template_id").and_then(|v| v.as_str()) != Some(old_id) {
                        continue;
                    }
                    if let Some(map) = doc.as_object_mut() {
                        map.insert("template_id".to_string(), json!(new_id));
                    }
                    let path = format!("{}/{id}", self.collection("sessions"));
                    if let Err(e) = self.set_doc(&path, &doc).await {
                        warn!(error = %e, id, "session reference not updated after rename");
                    }
                }
            }
            Err(e) => warn!(error = %e, "session references not updated after rename"),
        }
        let app_path = format!("{}/app", self.collection("settings"));
        if let Ok(Some(mut settings)) = self.get_doc(&app_path).await {
            if settings.get("default_template_id").and_then(|v| v.as_str()) == Some(old_id) {
                if let Some(map) = settings.as_object_mut() {
                    map.insert("default_template_id".to_string(), json!(new_id));
                }
                if let Err(e) = self.set_doc(&app_path, &settings).await {
                    warn!(error = %e, "default-template setting not updated after rename");
                }
            }
        }
        Ok(())
    }

    async fn save_session(&self, mut session: Session) -> Result<Session, StoreError> {
        let items = self
            .get_template(&session.template_id, &session.visit_type)
            .await?
            .map(|t| t.items)
            .unwrap_or_default();
        session.derive_computed(&items);

        let mut doc = serde_json::to_value(&session)?;
        if let Some(map) = doc.as_object_mut() {
            map.remove("id");
            map.insert("type".to_string(), json!("session"));
        }
        self.set_doc(&format!("{}/{}", self.collection("sessions"), session.id), &doc)
            .await?;
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let Some(doc) = self
            .get_doc(&format!("{}/{id}", self.collection("sessions")))
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(session_from_doc(id, doc)?))
    }

    async fn list_sessions(&self, query: &SessionQuery) -> Result<Vec<Session>, StoreError> {
        let docs = self.list_docs(&self.collection("sessions")).await?;
        let mut sessions = Vec::with_capacity(docs.len());
        for (id, doc) in docs {
            sessions.push(session_from_doc(&id, doc)?);
        }
        sessions.retain(|s| query.matches(s));
        SessionQuery::sort(&mut sessions);
        Ok(sessions)
    }

    async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        self.delete_doc(&format!("{}/{id}", self.collection("sessions")))
            .await
    }

    async fn delete_sessions(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for id in ids {
            if self.get_session(id).await?.is_some() {
                self.delete_session(id).await?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn export_sessions(&self) -> Result<SessionSnapshot, StoreError> {
        Err(StoreError::NotImplemented {
            backend: BACKEND_NAME,
            operation: "export_sessions",
        })
    }

    async fn import_sessions(
        &self,
        _snapshot: SessionSnapshot,
        _mode: ImportMode,
    ) -> Result<(), StoreError> {
        Err(StoreError::NotImplemented {
            backend: BACKEND_NAME,
            operation: "import_sessions",
        })
    }

    async fn save_prompt(&self, prompt: PromptConfig) -> Result<(), StoreError> {
        let mut variant = self
            .read_variant(&prompt.template_id, &prompt.visit_type)
            .await?
            .unwrap_or_else(|| json!({}));
        if let Some(map) = variant.as_object_mut() {
            map.insert(
                prompt_field(prompt.kind).to_string(),
                json!({ "text": prompt.text, "enabled": prompt.enabled }),
            );
        }
        self.write_variant(&prompt.template_id, &prompt.visit_type, variant)
            .await
    }

    async fn get_prompt(
        &self,
        template_id: &str,
        visit_type: &str,
        kind: PromptKind,
    ) -> Result<Option<PromptConfig>, StoreError> {
        let Some(variant) = self.read_variant(template_id, visit_type).await? else {
            return Ok(None);
        };
        let Some(prompt) = variant.get(prompt_field(kind)) else {
            return Ok(None);
        };
        Ok(Some(PromptConfig {
            template_id: template_id.to_string(),
            visit_type: visit_type.to_string(),
            kind,
            text: prompt
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string(),
            enabled: prompt
                .get("enabled")
                .and_then(|e| e.as_bool())
                .unwrap_or(false),
        }))
    }

    async fn list_prompts(&self) -> Result<Vec<PromptConfig>, StoreError> {
        let parents = self.list_docs(&self.collection("templates")).await?;
        let mut prompts = Vec::new();
        for (template_id, _) in parents {
            let variants = self
                .list_docs(&format!("{}/{template_id}/variants", self.collection("templates")))
                .await?;
            for (visit_type, variant) in variants {
                for kind in [PromptKind::Summary, PromptKind::Followup] {
                    if let Some(prompt) = variant.get(prompt_field(kind)) {
                        prompts.push(PromptConfig {
                            template_id: template_id.clone(),
                            visit_type: visit_type.clone(),
                            kind,
                            text: prompt
                                .get("text")
                                .and_then(|t| t.as_str())
                                .unwrap_or_default()
                                .to_string(),
                            enabled: prompt
                                .get("enabled")
                                .and_then(|e| e.as_bool())
                                .unwrap_or(false),
                        });
                    }
                }
            }
        }
        Ok(prompts)
    }

    async fn delete_prompts(
        &self,
        template_id: &str,
        visit_type: &str,
    ) -> Result<(), StoreError> {
        let Some(mut variant) = self.read_variant(template_id, visit_type).await? else {
            return Ok(());
        };
        if let Some(map) = variant.as_object_mut() {
            map.remove("summary_prompt");
            map.remove("followup_prompt");
        }
        self.set_doc(&self.variant_path(template_id, visit_type), &variant)
            .await
    }

    async fn save_app_settings(&self, settings: AppSettings) -> Result<(), StoreError> {
        let doc = serde_json::to_value(&settings)?;
        self.set_doc(&format!("{}/app", self.collection("settings")), &doc)
            .await
    }

    async fn get_app_settings(&self) -> Result<Option<AppSettings>, StoreError> {
        let Some(doc) = self
            .get_doc(&format!("{}/app", self.collection("settings")))
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(doc)?))
    }

    async fn save_llm_settings(&self, settings: LlmSettings) -> Result<(), StoreError> {
        let doc = serde_json::to_value(&settings)?;
        self.set_doc(&format!("{}/llm", self.collection("settings")), &doc)
            .await
    }

    async fn get_llm_settings(&self) -> Result<Option<LlmSettings>, StoreError> {
        let Some(doc) = self
            .get_doc(&format!("{}/llm", self.collection("settings")))
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(doc)?))
    }

    async fn upsert_user(&self, user: UserRecord) -> Result<(), StoreError> {
        let mut doc = serde_json::to_value(&user)?;
        if let Some(map) = doc.as_object_mut() {
            map.remove("username");
        }
        self.set_doc(
            &format!("{}/{}", self.collection("users"), user.username),
            &doc,
        )
        .await
    }

    async fn get_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let Some(mut doc) = self
            .get_doc(&format!("{}/{username}", self.collection("users")))
            .await?
        else {
            return Ok(None);
        };
        if let Some(map) = doc.as_object_mut() {
            map.insert("username".to_string(), json!(username));
        }
        Ok(Some(serde_json::from_value(doc)?))
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let docs = self.list_docs(&self.collection("users")).await?;
        let mut users = Vec::with_capacity(docs.len());
        for (username, mut doc) in docs {
            if let Some(map) = doc.as_object_mut() {
                map.insert("username".to_string(), json!(username));
            }
            users.push(serde_json::from_value(doc)?);
        }
        Ok(users)
    }

    async fn delete_user(&self, username: &str) -> Result<(), StoreError> {
        self.delete_doc(&format!("{}/{username}", self.collection("users")))
            .await
    }

    async fn append_audit(
        &self,
        kind: &str,
        username: &str,
        note: &str,
    ) -> Result<(), StoreError> {
        let at = jiff::Timestamp::now();
        self.create_doc(
            &self.collection("audit"),
            &json!({
                "at": at.to_string(),
                "kind": kind,
                "username": username,
                "note": note,
            }),
        )
        .await?;
        info!(
            audit.kind = %kind,
            audit.username = %username,
            audit.note = %note,
            "audit event"
        );
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        let docs = self.list_docs(&self.collection("audit")).await?;
        let mut entries = Vec::with_capacity(docs.len());
        for (i, (_, doc)) in docs.into_iter().enumerate() {
            let at: jiff::Timestamp = doc
                .get("at")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .parse()
                .map_err(|e| StoreError::Validation(format!("stored timestamp: {e}")))?;
            entries.push(AuditEntry {
                // Firestore audit ids are server-assigned names; expose a
                // positional surrogate so the shape matches the contract.
                id: i as i64,
                at,
                kind: doc
                    .get("kind")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                username: doc
                    .get("username")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                note: doc
                    .get("note")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        entries.sort_by(|a, b| b.at.cmp(&a.at));
        entries.truncate(limit);
        Ok(entries)
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
        if mode == ImportMode::Replace {
            let parents = self.list_docs(&self.collection("templates")).await?;
            for (template_id, _) in parents {
                let variants = self
                    .list_docs(&format!(
                        "{}/{template_id}/variants",
                        self.collection("templates")
                    ))
                    .await?;
                for (visit_type, _) in variants {
                    self.delete_doc(&self.variant_path(&template_id, &visit_type))
                        .await?;
                }
                self.delete_doc(&format!("{}/{template_id}", self.collection("templates")))
                    .await?;
            }
        }
        for template in &snapshot.templates {
            self.upsert_template(template.clone()).await?;
        }
        for prompt in &snapshot.prompts {
            self.save_prompt(prompt.clone()).await?;
        }
        if let Some(app) = &snapshot.app_settings {
            self.save_app_settings(app.clone()).await?;
        }
        if let Some(llm) = &snapshot.llm_settings {
            self.save_llm_settings(llm.clone()).await?;
        }
        Ok(())
    }
}
