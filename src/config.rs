use crate::error::ConfigError;
use crate::mail::DEFAULT_QUERY;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const SETTINGS_FILE: &str = "settings.toml";

pub const ENV_CLIENT_SECRET_PATH: &str = "GOOGLE_CLIENT_SECRET_PATH";
pub const ENV_NOTION_TOKEN: &str = "NOTION_TOKEN";
pub const ENV_NOTION_DATABASE_ID: &str = "NOTION_DATABASE_ID";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const ENV_POLL_INTERVAL: &str = "POLL_INTERVAL_SECS";

/// Non-secret settings, read from `settings.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mail: MailConfig,
    pub classifier: ClassifierConfig,
    pub archive: ArchiveConfig,
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub query: String,
    pub client_secret_path: PathBuf,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            query: DEFAULT_QUERY.to_string(),
            client_secret_path: PathBuf::from("credentials.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub endpoint: String,
    pub notion_version: String,
    pub fallback_category: String,
    pub properties: PropertyNames,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.notion.com/v1/pages".to_string(),
            notion_version: "2022-06-28".to_string(),
            fallback_category: "Other".to_string(),
            properties: PropertyNames::default(),
        }
    }
}

/// Column names of the target database. They must match its schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyNames {
    pub title: String,
    pub sender: String,
    pub summary: String,
    pub category: String,
    pub sentiment: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            title: "Title".to_string(),
            sender: "Sender".to_string(),
            summary: "Summary".to_string(),
            category: "Category".to_string(),
            sentiment: "Sentiment".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        use std::fs;
        if let Ok(content) = fs::read_to_string(SETTINGS_FILE) {
            match toml::from_str(&content) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("Ignoring invalid {}: {}", SETTINGS_FILE, e),
            }
        }
        Self::default()
    }
}

/// Everything the process reads at start: file settings plus credentials.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: Config,
    pub notion_token: Option<SecretString>,
    pub notion_database_id: Option<String>,
    pub openai_api_key: Option<SecretString>,
}

/// Credentials the archive sink cannot run without.
#[derive(Debug, Clone)]
pub struct ArchiveTarget {
    pub token: SecretString,
    pub database_id: String,
}

impl Settings {
    /// Loads `settings.toml` and `.env`, then applies environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(Config::load(), |name| std::env::var(name).ok())
    }

    /// Applies variables from `lookup` on top of `config`. Blank values count
    /// as unset.
    pub fn from_lookup<F>(mut config: Config, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(path) = var(ENV_CLIENT_SECRET_PATH) {
            config.mail.client_secret_path = PathBuf::from(path);
        }
        if let Some(model) = var(ENV_OPENAI_MODEL) {
            config.classifier.model = model;
        }
        if let Some(raw) = var(ENV_POLL_INTERVAL) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: ENV_POLL_INTERVAL.to_string(),
                    message: e.to_string(),
                })?;
            config.poll_interval_secs = Some(secs);
        }

        Ok(Self {
            config,
            notion_token: var(ENV_NOTION_TOKEN).map(SecretString::from),
            notion_database_id: var(ENV_NOTION_DATABASE_ID),
            openai_api_key: var(ENV_OPENAI_API_KEY).map(SecretString::from),
        })
    }

    pub fn archive_target(&self) -> Result<ArchiveTarget, ConfigError> {
        let database_id = self
            .notion_database_id
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar(ENV_NOTION_DATABASE_ID.to_string()))?;
        let token = self
            .notion_token
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar(ENV_NOTION_TOKEN.to_string()))?;
        Ok(ArchiveTarget { token, database_id })
    }

    /// Zero disables polling.
    pub fn poll_interval(&self) -> Option<Duration> {
        self.config
            .poll_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
