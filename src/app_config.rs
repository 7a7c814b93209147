use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, File, FileFormat};
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "config.yaml";
const DEFAULT_DATADOG_HOST: &str = "https://api.datadoghq.eu";
const DEFAULT_PORT: i64 = 8080;
const DEFAULT_READ_TIMEOUT_SECS: i64 = 5;
const DEFAULT_WRITE_TIMEOUT_SECS: i64 = 10;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: i64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub metadata: Metadata,
    pub slack_config: SlackConfig,
    pub endpoints: Endpoints,
    pub modal: ModalConfig,
    pub local: LocalConfig,
    pub datadog: DatadogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    pub service: String,
    pub environment: String,
    pub team: String,
}

#[derive(Clone, Deserialize)]
pub struct SlackConfig {
    pub slack_token: String,
    pub slack_signing_secret: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default = "default_message_format")]
    pub message_format: String,
}

impl SlackConfig {
    /// Channel that receives the rendered incident message, if one is configured.
    pub fn channel_id(&self) -> Option<&str> {
        self.channel_id.as_deref().filter(|channel| !channel.is_empty())
    }
}

// keep tokens out of debug logs
impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("slack_token", &"[REDACTED]")
            .field("slack_signing_secret", &"[REDACTED]")
            .field("channel_id", &self.channel_id)
            .field("message_format", &self.message_format)
            .finish()
    }
}

fn default_message_format() -> String {
    "*Severity:* {{severity}}\n*Domains affected:* {{domains_affected}}\n*Description:* {{description}}\n*Reported by:* {{username}}".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Endpoints {
    pub slack_command: String,
    pub slack_modal_parser: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModalConfig {
    pub title: String,
    #[serde(default)]
    pub inputs: Vec<InputDefinition>,
}

/// One field of the incident dialog.
#[derive(Debug, Clone, Deserialize)]
pub struct InputDefinition {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "type")]
    pub kind: InputKind,
    #[serde(default)]
    pub options: Vec<InputOption>,
}

/// Dialog input type. Types other than `text` and `select` load as
/// `Unsupported` and are left out of the dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum InputKind {
    Text,
    Select,
    Unsupported,
}

impl From<String> for InputKind {
    fn from(kind: String) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "text" => InputKind::Text,
            "select" => InputKind::Select,
            _ => InputKind::Unsupported,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputOption {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    pub enabled: bool,
    pub port: u16,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
}

impl LocalConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Clone, Deserialize)]
pub struct DatadogConfig {
    pub host: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub app_key: Option<String>,
}

impl std::fmt::Debug for DatadogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatadogConfig")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// Values taken from the process environment that win over the config file.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    pub slack_token: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub slack_channel_id: Option<String>,
    pub local_enabled: Option<bool>,
    pub port: Option<u16>,
    pub shutdown_timeout_secs: Option<u64>,
    pub datadog_api_key: Option<String>,
    pub datadog_app_key: Option<String>,
    pub datadog_host: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Result<Self> {
        let port = match env::var("PORT") {
            Ok(port) => Some(port.parse().with_context(|| format!("PORT is not a valid port: {port}"))?),
            Err(_) => None,
        };
        let shutdown_timeout_secs = match env::var("SHUTDOWN_TIMEOUT") {
            Ok(secs) => Some(secs.parse().with_context(|| format!("SHUTDOWN_TIMEOUT is not a number of seconds: {secs}"))?),
            Err(_) => None,
        };
        let overrides = Self {
            slack_token: env::var("SLACK_TOKEN").ok(),
            slack_signing_secret: env::var("SLACK_SIGNING_SECRET").ok(),
            slack_channel_id: env::var("SLACK_CHANNEL_ID").ok(),
            local_enabled: env::var("LOCAL").ok().map(|v| v == "true"),
            port,
            shutdown_timeout_secs,
            datadog_api_key: env::var("DD_API_KEY").ok(),
            datadog_app_key: env::var("DD_APP_KEY").ok(),
            datadog_host: env::var("DD_HOST").ok(),
        };
        Ok(overrides)
    }
}

impl AppConfig {
    /// Reads `CONFIG_FILE` (default `config.yaml`) and applies environment overrides.
    pub fn load() -> Result<Self> {
        let path = env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let overrides = EnvOverrides::from_env()?;
        let builder = Config::builder().add_source(File::new(&path, FileFormat::Yaml).required(true));
        Self::build(builder, &overrides).with_context(|| format!("failed to load configuration from {path}"))
    }

    #[cfg(test)]
    pub fn from_yaml(yaml: &str, overrides: &EnvOverrides) -> Result<Self> {
        let builder = Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml));
        Self::build(builder, overrides)
    }

    fn build(builder: ConfigBuilder<DefaultState>, overrides: &EnvOverrides) -> Result<Self> {
        let config: Self = builder
            .set_default("slack_config.slack_token", "")?
            .set_default("slack_config.slack_signing_secret", "")?
            .set_default("local.enabled", false)?
            .set_default("local.port", DEFAULT_PORT)?
            .set_default("local.read_timeout_secs", DEFAULT_READ_TIMEOUT_SECS)?
            .set_default("local.write_timeout_secs", DEFAULT_WRITE_TIMEOUT_SECS)?
            .set_default("local.shutdown_timeout_secs", DEFAULT_SHUTDOWN_TIMEOUT_SECS)?
            .set_default("datadog.host", DEFAULT_DATADOG_HOST)?
            .set_override_option("slack_config.slack_token", overrides.slack_token.clone())?
            .set_override_option("slack_config.slack_signing_secret", overrides.slack_signing_secret.clone())?
            .set_override_option("slack_config.channel_id", overrides.slack_channel_id.clone())?
            .set_override_option("local.enabled", overrides.local_enabled)?
            .set_override_option("local.port", overrides.port.map(i64::from))?
            .set_override_option("local.shutdown_timeout_secs", overrides.shutdown_timeout_secs.map(|s| s as i64))?
            .set_override_option("datadog.api_key", overrides.datadog_api_key.clone())?
            .set_override_option("datadog.app_key", overrides.datadog_app_key.clone())?
            .set_override_option("datadog.host", overrides.datadog_host.clone())?
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.slack_config.slack_signing_secret.is_empty() {
            bail!("slack signing secret is required, please set SLACK_SIGNING_SECRET environment variable");
        }
        if self.slack_config.slack_token.is_empty() {
            bail!("slack token is required, please set SLACK_TOKEN environment variable");
        }
        let endpoints = [
            ("slack_command", &self.endpoints.slack_command),
            ("slack_modal_parser", &self.endpoints.slack_modal_parser),
        ];
        for (name, path) in endpoints {
            if !path.starts_with('/') {
                bail!("endpoint {name} must be an absolute path, got {path:?}");
            }
        }
        if self.endpoints.slack_command == self.endpoints.slack_modal_parser {
            bail!("endpoints slack_command and slack_modal_parser must differ");
        }
        Ok(())
    }
}
