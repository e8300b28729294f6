//! The LLM provider capability contract.
//!
//! A provider wraps one HTTP backend. The generation operations have default
//! implementations built on `chat`, so a provider normally implements only
//! model listing, the chat call, connectivity, and its metadata; the gateway
//! owns fallback policy and never lets a provider failure reach the patient.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use monshin_core::models::settings::ConnectionProfile;
use monshin_core::models::template::QuestionItem;

use crate::error::LlmError;
use crate::meta::ProviderMeta;

/// Timeout for connectivity probes.
pub const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for generation calls.
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Generation knobs shared by every call.
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub model: String,
    pub temperature: f32,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Raw metadata as declared by the implementation. Coerced through
    /// [`ProviderMeta::from_value`] at discovery; see
    /// [`crate::registry::provider_meta_list`].
    fn metadata(&self) -> serde_json::Value;

    /// Available model identifiers at the configured endpoint.
    async fn list_models(&self, profile: &ConnectionProfile) -> Result<Vec<String>, LlmError>;

    /// Send a conversation and return the assistant's reply text.
    async fn chat(
        &self,
        profile: &ConnectionProfile,
        params: &ChatParams,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, LlmError>;

    /// Cheap reachability probe, bounded by [`CONNECTIVITY_TIMEOUT`].
    async fn check_connectivity(&self, profile: &ConnectionProfile) -> Result<(), LlmError>;

    /// Generate one follow-up question for a single underspecified item.
    async fn generate_question(
        &self,
        profile: &ConnectionProfile,
        params: &ChatParams,
        system: &str,
        item: &QuestionItem,
        answer: &str,
    ) -> Result<String, LlmError> {
        let prompt = format!(
            "問診項目「{}」への回答「{}」について、診察前に確認しておきたい追加質問を\
             1つだけ、患者に直接尋ねる形で出力してください。質問文のみを出力してください。",
            item.label, answer
        );
        let reply = self
            .chat(
                profile,
                params,
                system,
                &[ChatMessage {
                    role: ChatRole::User,
                    content: prompt,
                }],
            )
            .await?;
        let line = first_nonempty_line(&reply)
            .ok_or_else(|| LlmError::ResponseParse("empty generation result".to_string()))?;
        Ok(line.to_string())
    }

    /// Generate up to `max` follow-up questions for the unanswered items.
    async fn generate_followups(
        &self,
        profile: &ConnectionProfile,
        params: &ChatParams,
        system: &str,
        unanswered: &[QuestionItem],
        max: u32,
    ) -> Result<Vec<String>, LlmError> {
        if unanswered.is_empty() || max == 0 {
            return Ok(Vec::new());
        }
        let labels: Vec<&str> = unanswered.iter().map(|i| i.label.as_str()).collect();
        let prompt = format!(
            "次の問診項目について回答が不足しています: {}。\
             それぞれ患者に直接尋ねる追加質問を最大{max}件、1行に1問ずつ、\
             番号や記号を付けずに出力してください。",
            labels.join("、")
        );
        let reply = self
            .chat(
                profile,
                params,
                system,
                &[ChatMessage {
                    role: ChatRole::User,
                    content: prompt,
                }],
            )
            .await?;
        let questions: Vec<String> = reply
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(max as usize)
            .map(String::from)
            .collect();
        if questions.is_empty() {
            return Err(LlmError::ResponseParse("empty generation result".to_string()));
        }
        Ok(questions)
    }

    /// Produce a clinician-facing summary of the answers using `prompt` as
    /// the instruction.
    async fn summarize(
        &self,
        profile: &ConnectionProfile,
        params: &ChatParams,
        prompt: &str,
        question_texts: &BTreeMap<String, String>,
        answers: &BTreeMap<String, serde_json::Value>,
    ) -> Result<String, LlmError> {
        let mut lines = Vec::with_capacity(answers.len());
        for (item_id, value) in answers {
            let question = question_texts
                .get(item_id)
                .map(String::as_str)
                .unwrap_or(item_id.as_str());
            lines.push(format!("{question}: {}", render_answer(value)));
        }
        self.chat(
            profile,
            params,
            prompt,
            &[ChatMessage {
                role: ChatRole::User,
                content: lines.join("\n"),
            }],
        )
        .await
    }
}

/// Coerced metadata for a provider, `None` if it does not coerce.
pub(crate) fn coerced_meta(provider: &dyn LlmProvider) -> Option<ProviderMeta> {
    ProviderMeta::from_value(&provider.metadata()).ok()
}

fn first_nonempty_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Flatten an answer value for inclusion in a prompt.
pub fn render_answer(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(render_answer)
            .collect::<Vec<_>>()
            .join("、"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_render_flat() {
        assert_eq!(render_answer(&serde_json::json!("頭痛")), "頭痛");
        assert_eq!(render_answer(&serde_json::json!(["発熱", "咳"])), "発熱、咳");
        assert_eq!(render_answer(&serde_json::json!(38.5)), "38.5");
    }
}
