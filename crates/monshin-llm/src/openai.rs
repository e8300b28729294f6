//! Built-in provider for OpenAI-compatible chat-completions endpoints.
//!
//! Covers the hosted API and any compatible gateway; the profile's base URL
//! replaces the default host for self-hosted deployments.

use async_trait::async_trait;
use serde_json::json;

use monshin_core::models::settings::ConnectionProfile;

use crate::error::LlmError;
use crate::provider::{
    CONNECTIVITY_TIMEOUT, ChatMessage, ChatParams, GENERATION_TIMEOUT, LlmProvider,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiProvider {
    http: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new() -> Self {
        OpenAiProvider {
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

    fn authorized(
        profile: &ConnectionProfile,
        builder: reqwest::RequestBuilder,
    ) -> reqwest::RequestBuilder {
        match profile.api_key.as_deref() {
            Some(key) if !key.is_empty() => builder.bearer_auth(key),
            _ => builder,
        }
    }
}

impl Default for OpenAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn metadata(&self) -> serde_json::Value {
        json!({
            "key": "openai",
            "label": "OpenAI 互換",
            "description": "OpenAI または互換の chat-completions エンドポイント",
            "uses_base_url": true,
            "uses_api_key": true,
            "default_profile": { "base_url": DEFAULT_BASE_URL },
        })
    }

    async fn list_models(&self, profile: &ConnectionProfile) -> Result<Vec<String>, LlmError> {
        let resp = Self::authorized(
            profile,
            self.http
                .get(format!("{}/v1/models", Self::base_url(profile)))
                .timeout(CONNECTIVITY_TIMEOUT),
        )
        .send()
        .await
        .map_err(|e| LlmError::Remote(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(LlmError::Remote(format!(
                "openai /v1/models returned {}",
                resp.status()
            )));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| LlmError::ResponseParse(e.to_string()))?;
        Ok(body
            .get("data")
            .and_then(|d| d.as_array())
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
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

        let resp = Self::authorized(
            profile,
            self.http
                .post(format!("{}/v1/chat/completions", Self::base_url(profile)))
                .timeout(GENERATION_TIMEOUT)
                .json(&json!({
                    "model": params.model,
                    "temperature": params.temperature,
                    "messages": wire,
                })),
        )
        .send()
        .await
        .map_err(|e| LlmError::Remote(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(LlmError::Remote(format!(
                "openai /v1/chat/completions returned {}",
                resp.status()
            )));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| LlmError::ResponseParse(e.to_string()))?;
        body.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(String::from)
            .ok_or_else(|| LlmError::ResponseParse("no choices in response".to_string()))
    }

    async fn check_connectivity(&self, profile: &ConnectionProfile) -> Result<(), LlmError> {
        self.list_models(profile).await.map(|_| ())
    }
}
