use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::template::QuestionItem;

/// Completion status of a questionnaire session.
///
/// `Finalized` is terminal: further writes happen only as explicit re-saves,
/// never as implicit re-finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    InProgress,
    Complete,
    Finalized,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::InProgress => "in_progress",
            CompletionStatus::Complete => "complete",
            CompletionStatus::Finalized => "finalized",
        }
    }

    pub fn parse(s: &str) -> Result<Self, crate::error::CoreError> {
        match s {
            "in_progress" => Ok(CompletionStatus::InProgress),
            "complete" => Ok(CompletionStatus::Complete),
            "finalized" => Ok(CompletionStatus::Finalized),
            other => Err(crate::error::CoreError::InvalidCompletionStatus(
                other.to_string(),
            )),
        }
    }
}

/// One patient's answering session for a questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque id, generated at creation.
    pub id: String,
    pub patient_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_kana: Option<String>,
    /// Date of birth as `YYYY-MM-DD` text; matched exactly in search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    pub visit_type: String,
    pub template_id: String,
    /// item_id → answer value (string, array of strings, or number).
    #[serde(default)]
    pub answers: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub status: CompletionStatus,
    /// item_id → number of retry attempts made for that item.
    #[serde(default)]
    pub attempt_counts: BTreeMap<String, u32>,
    #[serde(default)]
    pub followups_used: u32,
    #[serde(default)]
    pub followups_allowed: u32,
    /// follow-up item_id → question text as displayed to the patient.
    #[serde(default)]
    pub llm_question_texts: BTreeMap<String, String>,
    /// Consolidated item_id → displayed question text. Computed on every
    /// save: template labels merged with `llm_question_texts`, LLM-origin
    /// texts winning on collision.
    #[serde(default)]
    pub question_texts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<jiff::Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<jiff::Timestamp>,
    /// Computed on every save: `true` unless `status` is `Finalized`.
    #[serde(default)]
    pub interrupted: bool,
}

impl Session {
    /// Create a fresh in-progress session with a generated id.
    pub fn new(
        patient_name: impl Into<String>,
        visit_type: impl Into<String>,
        template_id: impl Into<String>,
    ) -> Self {
        Session {
            id: Uuid::new_v4().to_string(),
            patient_name: patient_name.into(),
            patient_kana: None,
            birthdate: None,
            visit_type: visit_type.into(),
            template_id: template_id.into(),
            answers: BTreeMap::new(),
            summary: None,
            status: CompletionStatus::InProgress,
            attempt_counts: BTreeMap::new(),
            followups_used: 0,
            followups_allowed: 0,
            llm_question_texts: BTreeMap::new(),
            question_texts: BTreeMap::new(),
            started_at: Some(jiff::Timestamp::now()),
            finalized_at: None,
            interrupted: true,
        }
    }

    /// Re-derive the computed fields before persisting.
    ///
    /// - `interrupted` is `true` unless the status is exactly `Finalized`.
    /// - `started_at` falls back to `finalized_at` when absent.
    /// - `question_texts` merges the template's item labels with
    ///   `llm_question_texts`; LLM-origin texts take precedence.
    ///
    /// `template_items` is empty when the referenced template no longer
    /// exists; the LLM texts still apply in that case.
    pub fn derive_computed(&mut self, template_items: &[QuestionItem]) {
        self.interrupted = self.status != CompletionStatus::Finalized;

        if self.started_at.is_none() {
            self.started_at = self.finalized_at;
        }

        let mut texts: BTreeMap<String, String> = template_items
            .iter()
            .map(|item| (item.id.clone(), item.label.clone()))
            .collect();
        for (item_id, text) in &self.llm_question_texts {
            texts.insert(item_id.clone(), text.clone());
        }
        self.question_texts = texts;
    }

    /// Timestamp used for range filtering and ordering: `started_at`,
    /// falling back to `finalized_at`.
    pub fn effective_start(&self) -> Option<jiff::Timestamp> {
        self.started_at.or(self.finalized_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::template::ItemType;

    fn template_item(id: &str, label: &str) -> QuestionItem {
        QuestionItem {
            id: id.to_string(),
            label: label.to_string(),
            input_type: ItemType::Text,
            required: true,
            options: vec![],
            allow_free_text: false,
            show_when: None,
        }
    }

    #[test]
    fn interrupted_tracks_status() {
        let mut session = Session::new("山田 太郎", "first", "general");
        session.derive_computed(&[]);
        assert!(session.interrupted);

        session.status = CompletionStatus::Complete;
        session.derive_computed(&[]);
        assert!(session.interrupted);

        session.status = CompletionStatus::Finalized;
        session.derive_computed(&[]);
        assert!(!session.interrupted);
    }

    #[test]
    fn started_at_falls_back_to_finalized_at() {
        let mut session = Session::new("山田 太郎", "first", "general");
        session.started_at = None;
        let finalized: jiff::Timestamp = "2026-02-01T09:00:00Z".parse().unwrap();
        session.finalized_at = Some(finalized);
        session.derive_computed(&[]);
        assert_eq!(session.started_at, Some(finalized));
    }

    #[test]
    fn llm_texts_win_over_template_labels() {
        let mut session = Session::new("山田 太郎", "first", "general");
        session
            .llm_question_texts
            .insert("q1".to_string(), "generated".to_string());
        session.derive_computed(&[
            template_item("q1", "declared"),
            template_item("q2", "other"),
        ]);
        assert_eq!(session.question_texts["q1"], "generated");
        assert_eq!(session.question_texts["q2"], "other");
    }
}
