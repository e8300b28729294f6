use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Application-wide display settings. One row per deployment, keyed
/// `"global"` in storage and overwritten wholesale on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    pub display_name: String,
    pub theme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_template_id: Option<String>,
    #[serde(default)]
    pub show_kana: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_retention_days: Option<u32>,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            display_name: "問診システム".to_string(),
            theme: "light".to_string(),
            default_template_id: None,
            show_kana: true,
            session_retention_days: None,
        }
    }
}

/// LLM generation settings. Singleton, overwritten wholesale on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Active provider key, e.g. `"ollama"`.
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    #[serde(default)]
    pub system_prompt: String,
    /// Per-provider connection profiles, keyed by provider key.
    #[serde(default)]
    pub profiles: BTreeMap<String, ConnectionProfile>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        LlmSettings {
            provider: "ollama".to_string(),
            model: "qwen2.5:7b".to_string(),
            temperature: 0.2,
            system_prompt: String::new(),
            profiles: BTreeMap::new(),
        }
    }
}

/// Connection details for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Provider-specific extra fields declared by the provider's metadata.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// Top-level keys that older releases persisted in plain text inside the
/// LLM settings JSON. `init` removes them from stored rows.
pub const LEGACY_INSECURE_SETTINGS_FIELDS: &[&str] = &["plain_api_key", "proxy_password"];

/// Strip legacy insecure fields from a raw persisted settings value.
/// Returns `true` if anything was removed.
pub fn purge_legacy_fields(value: &mut serde_json::Value) -> bool {
    let Some(map) = value.as_object_mut() else {
        return false;
    };
    let mut purged = false;
    for field in LEGACY_INSECURE_SETTINGS_FIELDS {
        purged |= map.remove(*field).is_some();
    }
    purged
}
