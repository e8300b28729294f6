//! Write-through CouchDB mirror for session records.
//!
//! The relational store stays authoritative for reads; when a mirror is
//! configured, every session save is also written to CouchDB with
//! `_rev`-based optimistic concurrency (refetch and retry on conflict,
//! bounded attempts). A configured-but-unreachable mirror fails the save
//! loudly — the operator's backend choice is a correctness commitment, not
//! something to hide on failure.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use tracing::debug;

use monshin_core::models::session::Session;

use crate::config::CouchConfig;
use crate::error::StoreError;

/// Attempts per document write before giving up on update conflicts.
const CONFLICT_RETRY_BUDGET: usize = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CouchClient {
    http: reqwest::Client,
    base: String,
    database: String,
    auth: Option<(String, String)>,
}

impl CouchClient {
    pub fn new(config: &CouchConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::unavailable("couchdb", e.to_string()))?;
        Ok(CouchClient {
            http,
            base: config.url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            auth: config.username.clone().map(|user| {
                (user, config.password.clone().unwrap_or_default())
            }),
        })
    }

    fn doc_url(&self, id: &str) -> String {
        format!("{}/{}/{}", self.base, self.database, id)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }

    /// Create the database if it does not exist yet.
    pub async fn ensure_database(&self) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.base, self.database);
        let resp = self
            .request(self.http.put(&url))
            .send()
            .await
            .map_err(|e| StoreError::unavailable("couchdb", e.to_string()))?;
        match resp.status() {
            StatusCode::CREATED | StatusCode::PRECONDITION_FAILED => Ok(()),
            status => Err(StoreError::Http(format!(
                "couchdb database creation returned {status}"
            ))),
        }
    }

    /// Fetch the current `_rev` of a document, `None` if absent.
    async fn current_rev(&self, id: &str) -> Result<Option<String>, StoreError> {
        let resp = self
            .request(self.http.get(self.doc_url(id)))
            .send()
            .await
            .map_err(|e| StoreError::unavailable("couchdb", e.to_string()))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(StoreError::Http(format!(
                "couchdb get returned {}",
                resp.status()
            )));
        }
        let doc: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?;
        Ok(doc.get("_rev").and_then(|r| r.as_str()).map(String::from))
    }

    /// Upsert a session document with bounded conflict retry.
    pub async fn put_session(&self, session: &Session) -> Result<(), StoreError> {
        for attempt in 1..=CONFLICT_RETRY_BUDGET {
            let mut doc = serde_json::to_value(session)?;
            if let Some(map) = doc.as_object_mut() {
                map.insert("_id".to_string(), json!(session.id));
                map.insert("type".to_string(), json!("session"));
                if let Some(rev) = self.current_rev(&session.id).await? {
                    map.insert("_rev".to_string(), json!(rev));
                }
            }
            let resp = self
                .request(self.http.put(self.doc_url(&session.id)).json(&doc))
                .send()
                .await
                .map_err(|e| StoreError::unavailable("couchdb", e.to_string()))?;
            match resp.status() {
                StatusCode::CREATED | StatusCode::ACCEPTED => return Ok(()),
                StatusCode::CONFLICT => {
                    debug!(id = %session.id, attempt, "couchdb update conflict, retrying");
                    continue;
                }
                status => {
                    return Err(StoreError::Http(format!("couchdb put returned {status}")));
                }
            }
        }
        Err(StoreError::conflict(format!(
            "couchdb session {} still conflicting after {CONFLICT_RETRY_BUDGET} attempts",
            session.id
        )))
    }

    /// Delete a session document if present.
    pub async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        let Some(rev) = self.current_rev(id).await? else {
            return Ok(());
        };
        let resp = self
            .request(
                self.http
                    .delete(self.doc_url(id))
                    .query(&[("rev", rev.as_str())]),
            )
            .send()
            .await
            .map_err(|e| StoreError::unavailable("couchdb", e.to_string()))?;
        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(StoreError::Http(format!(
                "couchdb delete returned {}",
                resp.status()
            )))
        }
    }

    /// Point every mirrored session at a renamed template. Best-effort: the
    /// caller logs and continues on failure.
    pub async fn update_template_refs(&self, old_id: &str, new_id: &str) -> Result<(), StoreError> {
        let url = format!("{}/{}/_all_docs", self.base, self.database);
        let resp = self
            .request(self.http.get(&url).query(&[("include_docs", "true")]))
            .send()
            .await
            .map_err(|e| StoreError::unavailable("couchdb", e.to_string()))?;
        if !resp.status().is_success() {
            return Err(StoreError::Http(format!(
                "couchdb _all_docs returned {}",
                resp.status()
            )));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?;
        let rows = body
            .get("rows")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        for row in rows {
            let Some(mut doc) = row.get("doc").cloned() else {
                continue;
            };
            if doc.get("template_id").and_then(|v| v.as_str()) != Some(old_id) {
                continue;
            }
            if let Some(map) = doc.as_object_mut() {
                map.insert("template_id".to_string(), json!(new_id));
            }
            let Some(id) = doc.get("_id").and_then(|v| v.as_str()).map(String::from) else {
                continue;
            };
            let resp = self
                .request(self.http.put(self.doc_url(&id)).json(&doc))
                .send()
                .await
                .map_err(|e| StoreError::unavailable("couchdb", e.to_string()))?;
            if !resp.status().is_success() && resp.status() != StatusCode::CONFLICT {
                return Err(StoreError::Http(format!(
                    "couchdb rename propagation returned {}",
                    resp.status()
                )));
            }
        }
        Ok(())
    }
}
