use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// When the second factor is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotpMode {
    Off,
    ResetOnly,
    LoginAndReset,
}

impl TotpMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TotpMode::Off => "off",
            TotpMode::ResetOnly => "reset_only",
            TotpMode::LoginAndReset => "login_and_reset",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "off" => Ok(TotpMode::Off),
            "reset_only" => Ok(TotpMode::ResetOnly),
            "login_and_reset" => Ok(TotpMode::LoginAndReset),
            other => Err(CoreError::InvalidTotpMode(other.to_string())),
        }
    }
}

/// An administrator account. The hash and the encrypted TOTP secret are
/// opaque to this layer; producing and verifying them is the auth layer's
/// concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totp_secret_enc: Option<String>,
    #[serde(default = "default_totp_mode")]
    pub totp_mode: TotpMode,
    /// Still on the seeded default credential.
    #[serde(default)]
    pub initial_password: bool,
    pub created_at: jiff::Timestamp,
    pub updated_at: jiff::Timestamp,
}

fn default_totp_mode() -> TotpMode {
    TotpMode::Off
}
