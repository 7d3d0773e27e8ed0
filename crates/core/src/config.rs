use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub okta: OktaConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    /// Window during which a repeated event fingerprint is dropped.
    pub dedup_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct OktaConfig {
    pub org_url: Option<String>,
    pub api_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub slack_bot_token: Option<String>,
    pub dedup_ttl_secs: Option<u64>,
    pub okta_org_url: Option<String>,
    pub okta_api_token: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig { bot_token: String::new().into(), dedup_ttl_secs: 300 },
            okta: OktaConfig { org_url: None, api_token: None },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o".to_string(),
                max_tokens: 1024,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 3000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    okta: Option<OktaPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    dedup_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OktaPatch {
    org_url: Option<String>,
    api_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("deskbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.normalize();
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(bot_token_value) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token_value);
            }
            if let Some(dedup_ttl_secs) = slack.dedup_ttl_secs {
                self.slack.dedup_ttl_secs = dedup_ttl_secs;
            }
        }

        if let Some(okta) = patch.okta {
            if let Some(org_url) = okta.org_url {
                self.okta.org_url = Some(org_url);
            }
            if let Some(api_token_value) = okta.api_token {
                self.okta.api_token = Some(secret_value(api_token_value));
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DESKBOT_SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("DESKBOT_DEDUP_TTL_SECS") {
            self.slack.dedup_ttl_secs = parse_u64("DESKBOT_DEDUP_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("DESKBOT_OKTA_ORG_URL") {
            self.okta.org_url = Some(value);
        }
        if let Some(value) = read_env("DESKBOT_OKTA_API_TOKEN") {
            self.okta.api_token = Some(secret_value(value));
        }

        if let Some(value) = read_env("DESKBOT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DESKBOT_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("DESKBOT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("DESKBOT_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("DESKBOT_LLM_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("DESKBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DESKBOT_SERVER_PORT") {
            self.server.port = parse_u16("DESKBOT_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env("DESKBOT_LOGGING_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("DESKBOT_LOGGING_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(bot_token);
        }
        if let Some(dedup_ttl_secs) = overrides.dedup_ttl_secs {
            self.slack.dedup_ttl_secs = dedup_ttl_secs;
        }
        if let Some(org_url) = overrides.okta_org_url {
            self.okta.org_url = Some(org_url);
        }
        if let Some(api_token) = overrides.okta_api_token {
            self.okta.api_token = Some(secret_value(api_token));
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(api_key));
        }
        if let Some(base_url) = overrides.llm_base_url {
            self.llm.base_url = base_url;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    fn normalize(&mut self) {
        if let Some(org_url) = self.okta.org_url.as_mut() {
            while org_url.ends_with('/') {
                org_url.pop();
            }
        }
        while self.llm.base_url.ends_with('/') {
            self.llm.base_url.pop();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_okta(&self.okta)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("deskbot.toml"), PathBuf::from("config/deskbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        return Err(ConfigError::Validation(
            "slack.bot_token must start with `xoxb-`. Get it from https://api.slack.com/apps"
                .to_string(),
        ));
    }

    if slack.dedup_ttl_secs == 0 || slack.dedup_ttl_secs > 86_400 {
        return Err(ConfigError::Validation(
            "slack.dedup_ttl_secs must be in range 1..=86400".to_string(),
        ));
    }

    Ok(())
}

// Okta credentials are optional at startup: a missing tenant surfaces as a
// failed tool call at runtime, not a boot failure.
fn validate_okta(okta: &OktaConfig) -> Result<(), ConfigError> {
    if let Some(org_url) = okta.org_url.as_deref() {
        if !org_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "okta.org_url must be an https URL (e.g. `https://your-org.okta.com`)".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.base_url.trim().is_empty() {
        return Err(ConfigError::Validation("llm.base_url must not be empty".to_string()));
    }
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }
    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    if !LEVELS.contains(&logging.level.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::Validation(format!(
            "logging.level must be one of trace|debug|info|warn|error, got `{}`",
            logging.level
        )));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}
