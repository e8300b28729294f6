use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::prompt::PromptConfig;
use crate::models::session::Session;
use crate::models::settings::{AppSettings, LlmSettings};
use crate::models::template::Template;

/// Full questionnaire-settings snapshot: templates, prompts, and both
/// settings singletons. This is the complete export — app and LLM settings
/// are always included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionnaireSnapshot {
    #[serde(default)]
    pub templates: Vec<Template>,
    #[serde(default)]
    pub prompts: Vec<PromptConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_settings: Option<AppSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_settings: Option<LlmSettings>,
}

/// Bulk session export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub sessions: Vec<Session>,
}

/// How a bulk import treats existing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Overwrite matching keys, preserve everything else.
    Merge,
    /// Delete all existing entries of the category first.
    Replace,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::Merge => "merge",
            ImportMode::Replace => "replace",
        }
    }

    /// Parse a mode argument. Malformed input is an error, never a silent
    /// default.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "merge" => Ok(ImportMode::Merge),
            "replace" => Ok(ImportMode::Replace),
            other => Err(CoreError::InvalidImportMode(other.to_string())),
        }
    }
}
