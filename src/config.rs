use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";

/// Paths served by the handler set; the metrics endpoint must not shadow any of them.
const HANDLER_PATHS: &[&str] = &[
    "/",
    "/test",
    "/user",
    "/user/auth",
    "/users",
    "/persist/",
    "/persist/return",
    "/api/content",
];

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub credentials: CredentialConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CredentialConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_upload_max_bytes")]
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_true")]
    pub to_stdout: bool,
    #[serde(default)]
    pub file: Option<LogFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogFileConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_log_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    MissingEnvVar(String),
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            credentials: CredentialConfig::default(),
            upload: UploadConfig::default(),
            observability: None,
        }
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            username: "username".to_string(),
            password: "password".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_upload_max_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            to_stdout: true,
            file: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(yaml)?;
        let config: Self = serde_yaml::from_str(&interpolated).map_err(ConfigError::Yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "`listen` must not be empty".to_string(),
            ));
        }

        if self.credentials.username.is_empty() {
            return Err(ConfigError::Validation(
                "`credentials.username` must not be empty".to_string(),
            ));
        }

        // Basic auth splits on the first colon, so a colon here could never match.
        if self.credentials.username.contains(':') {
            return Err(ConfigError::Validation(
                "`credentials.username` must not contain `:`".to_string(),
            ));
        }

        if self.upload.max_bytes == 0 {
            return Err(ConfigError::Validation(
                "`upload.max_bytes` must be > 0".to_string(),
            ));
        }

        if let Some(observability) = &self.observability {
            let metrics = &observability.metrics;
            if metrics.enabled {
                if !metrics.path.starts_with('/') {
                    return Err(ConfigError::Validation(
                        "`observability.metrics.path` must start with `/`".to_string(),
                    ));
                }
                // Captures and wildcards would make the router reject the path.
                if metrics
                    .path
                    .chars()
                    .any(|ch| matches!(ch, '{' | '}' | '*' | ':'))
                {
                    return Err(ConfigError::Validation(format!(
                        "`observability.metrics.path` `{}` must be a literal path",
                        metrics.path
                    )));
                }
                if HANDLER_PATHS.contains(&metrics.path.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "`observability.metrics.path` `{}` collides with a handler route",
                        metrics.path
                    )));
                }
            }

            if let Some(file) = &observability.logging.file
                && file.enabled
                && (file.dir.trim().is_empty() || file.prefix.trim().is_empty())
            {
                return Err(ConfigError::Validation(
                    "`observability.logging.file.dir` and `prefix` must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Yaml(err) => write!(f, "yaml parse error: {err}"),
            Self::MissingEnvVar(name) => write!(f, "missing environment variable `{name}`"),
            Self::Validation(msg) => write!(f, "config validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;

    while let Some(rel_start) = input[cursor..].find("${") {
        let start = cursor + rel_start;
        out.push_str(&input[cursor..start]);

        let key_start = start + 2;
        let rel_end = input[key_start..].find('}').ok_or_else(|| {
            ConfigError::Validation("unterminated `${...}` expression".to_string())
        })?;
        let end = key_start + rel_end;
        let key = &input[key_start..end];

        if key.is_empty() {
            return Err(ConfigError::Validation(
                "empty environment variable name in `${}`".to_string(),
            ));
        }

        let value = env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))?;
        out.push_str(&value);
        cursor = end + 1;
    }

    out.push_str(&input[cursor..]);
    Ok(out)
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_upload_max_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_prefix() -> String {
    "routes-demo.log".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_true() -> bool {
    true
}
