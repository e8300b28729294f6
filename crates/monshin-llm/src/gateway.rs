//! The LLM gateway: per-session serialization of remote generation calls,
//! the shared connectivity-status record, and the stub fallback policy.
//!
//! Generation failures never reach the patient: the failure is logged,
//! recorded in the status, and answered with deterministic stub output. The
//! explicit connectivity test is the one operation that surfaces failure
//! detail verbatim.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use monshin_core::models::session::Session;
use monshin_core::models::settings::{ConnectionProfile, LlmSettings};
use monshin_core::models::template::QuestionItem;

use crate::error::LlmError;
use crate::provider::{ChatParams, LlmProvider};
use crate::registry::active_provider;
use crate::stub;

/// Last-known provider reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityVerdict {
    Ok,
    Ng,
    Pending,
}

/// The shared status record read by health surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityStatus {
    pub verdict: ConnectivityVerdict,
    pub detail: String,
    pub checked_at: Option<jiff::Timestamp>,
}

impl ConnectivityStatus {
    fn initial() -> Self {
        ConnectivityStatus {
            verdict: ConnectivityVerdict::Pending,
            detail: "not yet checked".to_string(),
            checked_at: None,
        }
    }
}

pub struct LlmGateway {
    /// Per-session generation locks, created lazily. The outer lock guards
    /// only map entry creation; the inner async mutex is held across the
    /// remote call.
    session_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    status: Mutex<ConnectivityStatus>,
}

impl LlmGateway {
    pub fn new() -> Self {
        LlmGateway {
            session_locks: Mutex::new(HashMap::new()),
            status: Mutex::new(ConnectivityStatus::initial()),
        }
    }

    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.session_locks.lock();
        // Entries nobody holds are finished sessions; evict them so the map
        // tracks only in-flight generation, not every id ever seen.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn connectivity_status(&self) -> ConnectivityStatus {
        self.status.lock().clone()
    }

    /// Record the outcome of an actual network attempt.
    fn record_verdict(&self, verdict: ConnectivityVerdict, detail: impl Into<String>) {
        let mut status = self.status.lock();
        status.verdict = verdict;
        status.detail = detail.into();
        status.checked_at = Some(jiff::Timestamp::now());
    }

    /// Note a settings change without a network attempt. A known `Ok`/`Ng`
    /// verdict is kept; only an unknown state becomes `Pending`.
    pub fn note_settings_sync(&self) {
        let mut status = self.status.lock();
        if status.verdict == ConnectivityVerdict::Pending {
            status.detail = "settings changed, not yet checked".to_string();
        }
    }

    fn resolve(
        &self,
        settings: &LlmSettings,
    ) -> Result<(Arc<dyn LlmProvider>, ConnectionProfile, ChatParams), LlmError> {
        let provider = active_provider(&settings.provider)?;
        let profile = settings
            .profiles
            .get(&settings.provider)
            .cloned()
            .unwrap_or_default();
        let params = ChatParams {
            model: profile.model.clone().unwrap_or_else(|| settings.model.clone()),
            temperature: settings.temperature,
        };
        Ok((provider, profile, params))
    }

    /// Generate follow-up questions for a session, serialized per session id
    /// so two concurrent requests for the same session never issue
    /// overlapping remote calls.
    pub async fn generate_followups(
        &self,
        settings: &LlmSettings,
        session_id: &str,
        unanswered: &[QuestionItem],
        max: u32,
    ) -> Vec<String> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let attempt = match self.resolve(settings) {
            Ok((provider, profile, params)) => {
                provider
                    .generate_followups(&profile, &params, &settings.system_prompt, unanswered, max)
                    .await
            }
            Err(e) => Err(e),
        };
        match attempt {
            Ok(questions) => {
                self.record_verdict(ConnectivityVerdict::Ok, "generation succeeded");
                debug!(session_id, count = questions.len(), "follow-ups generated");
                questions
            }
            Err(e) => {
                warn!(session_id, error = %e, "follow-up generation failed, using stub output");
                self.record_verdict(ConnectivityVerdict::Ng, e.to_string());
                stub::fallback_followups(unanswered, max)
            }
        }
    }

    /// Generate one follow-up question for a single underspecified item.
    pub async fn generate_question(
        &self,
        settings: &LlmSettings,
        session_id: &str,
        item: &QuestionItem,
        answer: &str,
    ) -> String {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let attempt = match self.resolve(settings) {
            Ok((provider, profile, params)) => {
                provider
                    .generate_question(&profile, &params, &settings.system_prompt, item, answer)
                    .await
            }
            Err(e) => Err(e),
        };
        match attempt {
            Ok(question) => {
                self.record_verdict(ConnectivityVerdict::Ok, "generation succeeded");
                question
            }
            Err(e) => {
                warn!(session_id, error = %e, "question generation failed, using stub output");
                self.record_verdict(ConnectivityVerdict::Ng, e.to_string());
                stub::fallback_question(item)
            }
        }
    }

    /// Summarize a session's answers with the given instruction prompt.
    pub async fn summarize(
        &self,
        settings: &LlmSettings,
        session: &Session,
        prompt: &str,
    ) -> String {
        let lock = self.session_lock(&session.id);
        let _guard = lock.lock().await;

        let attempt = match self.resolve(settings) {
            Ok((provider, profile, params)) => {
                provider
                    .summarize(
                        &profile,
                        &params,
                        prompt,
                        &session.question_texts,
                        &session.answers,
                    )
                    .await
            }
            Err(e) => Err(e),
        };
        match attempt {
            Ok(summary) => {
                self.record_verdict(ConnectivityVerdict::Ok, "generation succeeded");
                summary
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "summary generation failed, using stub output");
                self.record_verdict(ConnectivityVerdict::Ng, e.to_string());
                stub::fallback_summary(&session.question_texts, &session.answers)
            }
        }
    }

    /// Explicit connectivity test: failure detail is surfaced verbatim, not
    /// replaced by stub output.
    pub async fn test_connectivity(&self, settings: &LlmSettings) -> Result<(), LlmError> {
        let result = match self.resolve(settings) {
            Ok((provider, profile, _)) => provider.check_connectivity(&profile).await,
            Err(e) => Err(e),
        };
        match &result {
            Ok(()) => {
                info!(provider = %settings.provider, "connectivity check ok");
                self.record_verdict(ConnectivityVerdict::Ok, "connectivity check ok");
            }
            Err(e) => {
                self.record_verdict(ConnectivityVerdict::Ng, e.to_string());
            }
        }
        result
    }
}

impl Default for LlmGateway {
    fn default() -> Self {
        Self::new()
    }
}
