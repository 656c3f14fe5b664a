use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "NuPal Chat";

pub const DEFAULT_TITLE: &str = "New Chat";
pub const NEW_CONVERSATION_PREVIEW: &str = "Start a conversation...";
pub const TITLE_MAX_CHARS: usize = 30;
pub const TITLE_TRUNCATION_MARKER: &str = "...";

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5009/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const ENV_CONFIG_PATH: &str = "NUPAL_CONFIG";
const ENV_BASE_URL: &str = "NUPAL_API_BASE_URL";
const ENV_AUTH_TOKEN: &str = "NUPAL_AUTH_TOKEN";
const ENV_USER_ID: &str = "NUPAL_USER_ID";
const ENV_TIMEOUT: &str = "NUPAL_TIMEOUT_SECS";

/// Connection settings for the conversation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub user_id: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            auth_token: None,
            user_id: None,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ServiceConfig {
    /// Read settings from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: ServiceConfig = serde_json::from_str(&json)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Start from the file named by `NUPAL_CONFIG` (if any), then apply the
    /// individual environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(ENV_CONFIG_PATH) {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        if let Ok(token) = std::env::var(ENV_AUTH_TOKEN) {
            config.auth_token = Some(token).filter(|t| !t.trim().is_empty());
        }
        if let Ok(user_id) = std::env::var(ENV_USER_ID) {
            config.user_id = Some(user_id).filter(|u| !u.trim().is_empty());
        }
        if let Ok(timeout) = std::env::var(ENV_TIMEOUT) {
            config.request_timeout_secs = timeout
                .parse()
                .with_context(|| format!("{} must be a number of seconds", ENV_TIMEOUT))?;
        }

        Ok(config)
    }

    /// The configured user id, or the one carried by the auth token.
    pub fn resolve_user_id(&self) -> Option<String> {
        self.user_id
            .clone()
            .or_else(|| self.auth_token.as_deref().and_then(user_id_from_token))
    }
}

#[derive(Deserialize)]
struct TokenClaims {
    nameid: Option<String>,
    sub: Option<String>,
}

/// Extract the user id from a JWT payload (`nameid`, else `sub`). The
/// signature is not checked; the service does that.
pub fn user_id_from_token(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: TokenClaims = serde_json::from_slice(&bytes).ok()?;
    claims.nameid.or(claims.sub)
}
