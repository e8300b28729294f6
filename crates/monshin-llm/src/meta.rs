//! Canonical provider metadata and the single coercion point for the
//! duck-typed metadata external plugins declare.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;

/// Presentation and capability metadata for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMeta {
    pub key: String,
    pub label: String,
    pub description: String,
    /// Whether the provider's connection profile carries a base URL.
    #[serde(default)]
    pub uses_base_url: bool,
    /// Whether the provider's connection profile carries an API key.
    #[serde(default)]
    pub uses_api_key: bool,
    /// Suggested starting profile values, shown in the settings form.
    #[serde(default)]
    pub default_profile: BTreeMap<String, String>,
    /// Provider-specific extra configuration fields.
    #[serde(default)]
    pub extra_fields: Vec<ProviderFieldMeta>,
}

/// One extra configuration field a provider declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFieldMeta {
    pub name: String,
    pub label: String,
    /// Secret fields are write-only in the settings surface.
    #[serde(default)]
    pub secret: bool,
}

impl ProviderMeta {
    /// Coerce a raw metadata value into the canonical shape.
    ///
    /// `key`, `label`, and `description` must be non-empty strings; the
    /// capability flags and profile default to their empty forms. A value
    /// that does not coerce is rejected here, at discovery time, so a
    /// malformed plugin never reaches first use.
    pub fn from_value(raw: &Value) -> Result<Self, LlmError> {
        let meta: ProviderMeta = serde_json::from_value(raw.clone())
            .map_err(|e| LlmError::InvalidMetadata(e.to_string()))?;
        for (field, value) in [
            ("key", &meta.key),
            ("label", &meta.label),
            ("description", &meta.description),
        ] {
            if value.trim().is_empty() {
                return Err(LlmError::InvalidMetadata(format!("{field} must be non-empty")));
            }
        }
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_metadata_coerces_with_defaults() {
        let meta = ProviderMeta::from_value(&json!({
            "key": "ollama",
            "label": "Ollama",
            "description": "Local models over the Ollama API",
        }))
        .unwrap();
        assert_eq!(meta.key, "ollama");
        assert!(!meta.uses_api_key);
        assert!(meta.default_profile.is_empty());
        assert!(meta.extra_fields.is_empty());
    }

    #[test]
    fn full_metadata_round_trips() {
        let raw = json!({
            "key": "vendor-x",
            "label": "Vendor X",
            "description": "Managed endpoint",
            "uses_base_url": true,
            "uses_api_key": true,
            "default_profile": { "base_url": "https://llm.example.jp" },
            "extra_fields": [
                { "name": "tenant", "label": "Tenant ID" },
                { "name": "token", "label": "Access token", "secret": true },
            ],
        });
        let meta = ProviderMeta::from_value(&raw).unwrap();
        assert!(meta.uses_base_url);
        assert_eq!(meta.extra_fields.len(), 2);
        assert!(meta.extra_fields[1].secret);
    }

    #[test]
    fn malformed_metadata_is_rejected() {
        assert!(ProviderMeta::from_value(&json!({ "key": "x" })).is_err());
        assert!(ProviderMeta::from_value(&json!("not an object")).is_err());
        assert!(
            ProviderMeta::from_value(&json!({
                "key": "  ",
                "label": "Blank",
                "description": "key is whitespace",
            }))
            .is_err()
        );
    }
}
