//! Runtime configuration.
//!
//! One explicit [`AppConfig`] value is loaded at startup and handed to the
//! components that need it; nothing reads configuration ambiently.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder values shipped in config templates; treated as unconfigured.
const PLACEHOLDER_BOT_TOKEN: &str = "your_bot_token";
const PLACEHOLDER_CHAT_ID: &str = "your_chat_id";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] io::Error),
    #[error("config file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// The closed set of challenge-solving strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverProvider {
    #[serde(rename = "twocaptcha")]
    TwoCaptcha,
    #[serde(rename = "anticaptcha")]
    AntiCaptcha,
    #[default]
    #[serde(rename = "manual")]
    Manual,
}

/// Messaging-channel credentials for human-in-the-loop solving.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramSettings {
    /// Credentials are present and do not look like template placeholders.
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty()
            && !self.chat_id.is_empty()
            && self.bot_token != PLACEHOLDER_BOT_TOKEN
            && self.chat_id != PLACEHOLDER_CHAT_ID
    }
}

/// Solver strategy selection plus the credentials each strategy needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolverSettings {
    pub provider: SolverProvider,
    pub two_captcha_keys: Vec<String>,
    pub anti_captcha_keys: Vec<String>,
    pub telegram: TelegramSettings,
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub solver: SolverSettings,
    /// Optional reward-service base URL override.
    pub service_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from a JSON file; an absent file yields defaults
    /// (manual solving, no overrides).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::info!(
                    "no config file at {}, using defaults (manual solving)",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_manual_solving() {
        let config = AppConfig::default();
        assert_eq!(config.solver.provider, SolverProvider::Manual);
        assert!(config.solver.two_captcha_keys.is_empty());
        assert!(config.service_url.is_none());
    }

    #[test]
    fn placeholder_telegram_credentials_are_unconfigured() {
        let mut telegram = TelegramSettings::default();
        assert!(!telegram.is_configured());

        telegram.bot_token = PLACEHOLDER_BOT_TOKEN.into();
        telegram.chat_id = PLACEHOLDER_CHAT_ID.into();
        assert!(!telegram.is_configured());

        telegram.bot_token = "123456:real-token".into();
        telegram.chat_id = "987654".into();
        assert!(telegram.is_configured());
    }

    #[test]
    fn parses_camel_case_document() {
        let raw = r#"{
            "solver": {
                "provider": "twocaptcha",
                "twoCaptchaKeys": ["k1", "k2"],
                "telegram": {"botToken": "t", "chatId": "c"}
            }
        }"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.solver.provider, SolverProvider::TwoCaptcha);
        assert_eq!(config.solver.two_captcha_keys, vec!["k1", "k2"]);
        assert!(config.solver.telegram.is_configured());
    }
}
