use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::BriefError;

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";
pub const PEOPLE_API: &str = "https://people.googleapis.com/v1";
pub const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1";

/// Hard upper bound on unread messages summarised per briefing.
pub const MAX_UNREAD: u32 = 10;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub google: GoogleConfig,
    pub ai_model: AiModelConfig,
    #[serde(default)]
    pub briefing: BriefingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default = "default_calendar_api")]
    pub calendar_api: String,
    #[serde(default = "default_people_api")]
    pub people_api: String,
    #[serde(default = "default_gmail_api")]
    pub gmail_api: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DecisionProvider {
    Ollama,
    Openai,
    Rules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AiModelConfig {
    pub provider: DecisionProvider,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    pub api_key: Option<String>,
}

/// What to report for a contact whose birthday matches but who has no name.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissingNamePolicy {
    Skip,
    #[default]
    Unknown,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BriefingConfig {
    pub max_steps: Option<usize>,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_max_unread")]
    pub max_unread: u32,
    #[serde(default = "default_contacts_page_size")]
    pub contacts_page_size: u32,
    #[serde(default)]
    pub missing_name: MissingNamePolicy,
}

impl Default for BriefingConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            tool_timeout_secs: default_tool_timeout_secs(),
            max_unread: default_max_unread(),
            contacts_page_size: default_contacts_page_size(),
            missing_name: MissingNamePolicy::default(),
        }
    }
}

impl BriefingConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn unread_cap(&self) -> u32 {
        self.max_unread.clamp(1, MAX_UNREAD)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

fn default_calendar_api() -> String {
    CALENDAR_API.to_string()
}

fn default_people_api() -> String {
    PEOPLE_API.to_string()
}

fn default_gmail_api() -> String {
    GMAIL_API.to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_tool_timeout_secs() -> u64 {
    20
}

fn default_max_unread() -> u32 {
    MAX_UNREAD
}

fn default_contacts_page_size() -> u32 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context("Failed to read config file. Make sure config.toml exists.")?;

        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Override secrets with environment variables if set
    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("TELOXIDE_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Ok(secret) = std::env::var("GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = secret;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.ai_model.api_key = Some(key);
        }
    }

    /// Check that every secret the configured services need is present.
    pub fn validate(&self) -> Result<(), BriefError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(BriefError::Configuration(
                "missing Telegram bot token".to_string(),
            ));
        }
        if self.google.client_id.trim().is_empty() || self.google.client_secret.trim().is_empty()
        {
            return Err(BriefError::Configuration(
                "missing Google client id or secret".to_string(),
            ));
        }
        match self.ai_model.provider {
            DecisionProvider::Openai => {
                let has_key = self
                    .ai_model
                    .api_key
                    .as_deref()
                    .is_some_and(|k| !k.trim().is_empty());
                if !has_key {
                    return Err(BriefError::Configuration(
                        "missing OpenAI API key".to_string(),
                    ));
                }
            }
            DecisionProvider::Ollama => {
                if self.ai_model.endpoint.trim().is_empty() || self.ai_model.model.trim().is_empty()
                {
                    return Err(BriefError::Configuration(
                        "Ollama needs both endpoint and model".to_string(),
                    ));
                }
            }
            DecisionProvider::Rules => {}
        }
        if self.briefing.tool_timeout_secs == 0 {
            return Err(BriefError::Configuration(
                "tool_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
