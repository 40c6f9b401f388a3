//! Application settings: secrets from the environment, everything else from an
//! optional YAML file.
//!
//! Secrets are never read from YAML. A missing secret is not an error until the
//! action that needs it asks for it through one of the `require_*` accessors.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::error::{CoreError, Result};
use crate::generator::{GeminiSettings, DEFAULT_MODEL, DEFAULT_TEMPERATURE, GEMINI_API_BASE};
use crate::github::GITHUB_API_BASE;
use crate::gmail::GMAIL_API_BASE;
use crate::mail_log::DEFAULT_LOG_DIR;
use crate::synchronise::DEFAULT_BRANCH;

pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_GITHUB_USERNAME: &str = "GITHUB_USERNAME";
pub const ENV_GEMMA_API_KEY: &str = "GEMMA_API_KEY";
pub const ENV_GMAIL_ADDRESS: &str = "GMAIL_ADDRESS";
pub const ENV_LOG_DIR: &str = "APP_LOG_DIR";

#[derive(Debug, Clone, PartialEq)]
pub struct GitHubSettings {
    pub api_base: String,
    pub default_branch: String,
    pub token: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiConfig {
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GmailSettings {
    pub api_base: String,
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub github: GitHubSettings,
    pub gemini: GeminiConfig,
    pub gmail: GmailSettings,
    pub log_dir: PathBuf,
}

/// YAML-side shape. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    github: FileGitHub,
    #[serde(default)]
    gemini: FileGemini,
    #[serde(default)]
    gmail: FileGmail,
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileGitHub {
    api_base: Option<String>,
    default_branch: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileGemini {
    api_base: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileGmail {
    api_base: Option<String>,
    credentials_path: Option<PathBuf>,
    token_path: Option<PathBuf>,
}

/// Non-empty value of an environment variable.
fn env_secret(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn missing(name: &str) -> CoreError {
    CoreError::Config(format!("{name} is not set. Add it to your environment or .env file."))
}

impl AppConfig {
    /// Built-in defaults plus whatever the environment provides.
    pub fn from_env() -> Self {
        let config = Self {
            github: GitHubSettings {
                api_base: GITHUB_API_BASE.to_string(),
                default_branch: DEFAULT_BRANCH.to_string(),
                token: env_secret(ENV_GITHUB_TOKEN),
                username: env_secret(ENV_GITHUB_USERNAME),
            },
            gemini: GeminiConfig {
                api_base: GEMINI_API_BASE.to_string(),
                model: DEFAULT_MODEL.to_string(),
                temperature: DEFAULT_TEMPERATURE,
                api_key: env_secret(ENV_GEMMA_API_KEY),
            },
            gmail: GmailSettings {
                api_base: GMAIL_API_BASE.to_string(),
                credentials_path: PathBuf::from("credentials.json"),
                token_path: PathBuf::from("token.json"),
                address: env_secret(ENV_GMAIL_ADDRESS),
            },
            log_dir: env_secret(ENV_LOG_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
        };
        if config.github.token.is_none() {
            warn!("{ENV_GITHUB_TOKEN} not set; GitHub actions will fail until it is provided");
        }
        config
    }

    fn overlay(mut self, file: FileConfig) -> Self {
        if let Some(v) = file.github.api_base {
            self.github.api_base = v;
        }
        if let Some(v) = file.github.default_branch {
            self.github.default_branch = v;
        }
        if let Some(v) = file.gemini.api_base {
            self.gemini.api_base = v;
        }
        if let Some(v) = file.gemini.model {
            self.gemini.model = v;
        }
        if let Some(v) = file.gemini.temperature {
            self.gemini.temperature = v;
        }
        if let Some(v) = file.gmail.api_base {
            self.gmail.api_base = v;
        }
        if let Some(v) = file.gmail.credentials_path {
            self.gmail.credentials_path = v;
        }
        if let Some(v) = file.gmail.token_path {
            self.gmail.token_path = v;
        }
        // The environment wins over the file for the log directory.
        if env_secret(ENV_LOG_DIR).is_none() {
            if let Some(v) = file.log_dir {
                self.log_dir = v;
            }
        }
        self
    }

    pub fn require_github_token(&self) -> Result<&str> {
        self.github
            .token
            .as_deref()
            .ok_or_else(|| missing(ENV_GITHUB_TOKEN))
    }

    pub fn require_github_username(&self) -> Result<&str> {
        self.github
            .username
            .as_deref()
            .ok_or_else(|| missing(ENV_GITHUB_USERNAME))
    }

    /// Generator settings, failing when the API key is missing.
    pub fn gemini_settings(&self) -> Result<GeminiSettings> {
        let api_key = self
            .gemini
            .api_key
            .clone()
            .ok_or_else(|| missing(ENV_GEMMA_API_KEY))?;
        Ok(GeminiSettings {
            api_base: self.gemini.api_base.clone(),
            model: self.gemini.model.clone(),
            temperature: self.gemini.temperature,
            api_key,
        })
    }

    /// Sender address: the explicit one if given, otherwise `GMAIL_ADDRESS`.
    pub fn sender_address(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .map(str::to_string)
            .or_else(|| self.gmail.address.clone())
            .ok_or_else(|| missing(ENV_GMAIL_ADDRESS))
    }
}

/// Environment settings overlaid with the YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        CoreError::Config(format!("Failed to read config file {}: {e}", path_ref.display()))
    })?;

    let file: FileConfig = if content.trim().is_empty() {
        FileConfig::default()
    } else {
        serde_yaml::from_str(&content).map_err(|e| {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            CoreError::Config(format!("Failed to parse config YAML: {e}"))
        })?
    };
    debug!(?file, "Config file parsed");

    Ok(AppConfig::from_env().overlay(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in [
            ENV_GITHUB_TOKEN,
            ENV_GITHUB_USERNAME,
            ENV_GEMMA_API_KEY,
            ENV_GMAIL_ADDRESS,
            ENV_LOG_DIR,
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn defaults_without_environment() {
        clear_env();
        let config = AppConfig::from_env();
        assert_eq!(config.github.api_base, GITHUB_API_BASE);
        assert_eq!(config.github.default_branch, "main");
        assert_eq!(config.gemini.model, "gemini-1.5-flash");
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.gmail.token_path, PathBuf::from("token.json"));
    }

    #[test]
    #[serial]
    fn missing_secrets_fail_only_on_demand() {
        clear_env();
        env::set_var(ENV_GITHUB_TOKEN, "ghp_x");
        let config = AppConfig::from_env();
        assert_eq!(config.require_github_token().unwrap(), "ghp_x");

        let err = config.gemini_settings().unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
        assert!(err.to_string().contains(ENV_GEMMA_API_KEY));
        assert!(config.sender_address(None).is_err());
        assert_eq!(config.sender_address(Some("me@x.test")).unwrap(), "me@x.test");
        clear_env();
    }

    #[test]
    #[serial]
    fn blank_variables_count_as_missing() {
        clear_env();
        env::set_var(ENV_GITHUB_USERNAME, "   ");
        let config = AppConfig::from_env();
        assert!(config.require_github_username().is_err());
        clear_env();
    }
}
