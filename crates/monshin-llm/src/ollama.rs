//! Built-in provider for a local Ollama endpoint.

use async_trait::async_trait;
use serde_json::json;

use monshin_core::models::settings::ConnectionProfile;

use crate::error::LlmError;
use crate::provider::{
    CONNECTIVITY_TIMEOUT, ChatMessage, ChatParams, GENERATION_TIMEOUT, LlmProvider,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    http: reqwest::Client,
}

impl OllamaProvider {
    pub fn new() -> Self {
        OllamaProvider {
            http: reqwest::Client::new(),
        }
    }

    fn base_url(profile: &ConnectionProfile) -> String {
        profile
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn metadata(&self) -> serde_json::Value {
        json!({
            "key": "ollama",
            "label": "Ollama",
            "description": "ローカルまたは院内サーバーの Ollama エンドポイント",
            "uses_base_url": true,
            "uses_api_key": false,
            "default_profile": { "base_url": DEFAULT_BASE_URL },
        })
    }

    async fn list_models(&self, profile: &ConnectionProfile) -> Result<Vec<String>, LlmError> {
        let resp = self
            .http
            .get(format!("{}/api/tags", Self::base_url(profile)))
            .timeout(CONNECTIVITY_TIMEOUT)
            .send()
            .await
            .map_err(|e| LlmError::Remote(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(LlmError::Remote(format!(
                "ollama /api/tags returned {}",
                resp.status()
            )));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| LlmError::ResponseParse(e.to_string()))?;
        Ok(body
            .get("models")
            .and_then(|m| m.as_array())
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn chat(
        &self,
        profile: &ConnectionProfile,
        params: &ChatParams,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, LlmError> {
        let mut wire: Vec<serde_json::Value> = Vec::with_capacity(messages.len() + 1);
        if !system.is_empty() {
            wire.push(json!({ "role": "system", "content": system }));
        }
        for msg in messages {
            wire.push(json!({ "role": msg.role.as_str(), "content": msg.content }));
        }

        let resp = self
            .http
            .post(format!("{}/api/chat", Self::base_url(profile)))
            .timeout(GENERATION_TIMEOUT)
            .json(&json!({
                "model": params.model,
                "messages": wire,
                "stream": false,
                "options": { "temperature": params.temperature },
            }))
            .send()
            .await
            .map_err(|e| LlmError::Remote(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(LlmError::Remote(format!(
                "ollama /api/chat returned {}",
                resp.status()
            )));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| LlmError::ResponseParse(e.to_string()))?;
        body.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(String::from)
            .ok_or_else(|| LlmError::ResponseParse("no message content in response".to_string()))
    }

    async fn check_connectivity(&self, profile: &ConnectionProfile) -> Result<(), LlmError> {
        self.list_models(profile).await.map(|_| ())
    }
}
