use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Which generation step a prompt configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Summary,
    Followup,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::Summary => "summary",
            PromptKind::Followup => "followup",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "summary" => Ok(PromptKind::Summary),
            "followup" => Ok(PromptKind::Followup),
            other => Err(CoreError::InvalidPromptKind(other.to_string())),
        }
    }
}

/// A custom prompt for one `(template_id, visit_type, kind)`.
///
/// When `enabled` is false the system default prompt is used instead;
/// the stored text is kept so re-enabling restores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    pub template_id: String,
    pub visit_type: String,
    pub kind: PromptKind,
    pub text: String,
    #[serde(default)]
    pub enabled: bool,
}
