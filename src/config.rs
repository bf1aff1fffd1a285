//! Process-wide configuration for the enhancement layer.
//!
//! Configuration is read once at startup and handed to
//! [`EnhanceTemplate`](crate::EnhanceTemplate) and
//! [`DestinationResolver`](crate::DestinationResolver) by value. Nothing in
//! this crate mutates it afterwards.
//!
//! Both structs implement `serde::Deserialize` with camelCase field names and
//! defaults for every field, so they can be nested in an application's own
//! configuration file. [`EnhanceConfig::from_env`] is provided for processes
//! that configure themselves through environment variables.

use std::time::Duration;

use serde::Deserialize;
use tracing_error::SpanTrace;

/// Environment variable enabling topic isolation.
pub const ENV_ENABLED_ISOLATION: &str = "MQ_ENHANCE_ENABLED_ISOLATION";
/// Environment variable holding the isolation suffix.
pub const ENV_ENVIRONMENT: &str = "MQ_ENHANCE_ENVIRONMENT";
/// Environment variable overriding the delayed-send timeout, in milliseconds.
pub const ENV_SEND_TIMEOUT_MILLIS: &str = "MQ_ENHANCE_SEND_TIMEOUT_MILLIS";

/// Client-side timeout applied to delayed sends unless configured otherwise.
pub const DEFAULT_SEND_TIMEOUT_MILLIS: u64 = 3000;

/// Topic isolation settings.
///
/// When isolation is enabled and `environment` holds some non-whitespace
/// text, every topic is suffixed with `_<environment>`. Enabling isolation
/// with a blank environment is not an error: isolation is simply inactive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IsolationConfig {
    pub enabled_isolation: bool,
    pub environment: Option<String>,
}

impl IsolationConfig {
    /// Isolation turned off.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Isolation turned on for the given environment.
    pub fn isolated(environment: impl Into<String>) -> Self {
        Self {
            enabled_isolation: true,
            environment: Some(environment.into()),
        }
    }

    /// The suffix appended to topics, if isolation is in effect.
    ///
    /// The environment is returned verbatim; only its blankness is checked,
    /// see [`is_blank_char`].
    pub fn suffix(&self) -> Option<&str> {
        if !self.enabled_isolation {
            return None;
        }
        self.environment
            .as_deref()
            .filter(|env| env.chars().any(|c| !is_blank_char(c)))
    }
}

/// Characters that do not count as text in an environment name.
///
/// Space, line and paragraph separators plus the ASCII controls `\t`..`\r`
/// and `U+001C`..`U+001F`. The no-break spaces (`U+00A0`, `U+2007`, `U+202F`)
/// and `U+0085` count as text.
pub fn is_blank_char(c: char) -> bool {
    match c {
        '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\u{0085}' => false,
        '\u{001C}'..='\u{001F}' => true,
        c => c.is_whitespace(),
    }
}

/// Full configuration of the enhancement layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnhanceConfig {
    #[serde(flatten)]
    pub isolation: IsolationConfig,
    /// Timeout handed to the broker client on delayed sends.
    pub send_timeout_millis: u64,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            isolation: IsolationConfig::default(),
            send_timeout_millis: DEFAULT_SEND_TIMEOUT_MILLIS,
        }
    }
}

impl EnhanceConfig {
    /// Build a configuration around the given isolation settings, keeping the
    /// default send timeout.
    pub fn new(isolation: IsolationConfig) -> Self {
        Self {
            isolation,
            ..Self::default()
        }
    }

    /// Override the delayed-send timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout_millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Delayed-send timeout as a [`Duration`].
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_millis)
    }

    /// Read the configuration from the process environment.
    ///
    /// Unset variables fall back to their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_ENABLED_ISOLATION) {
            config.isolation.enabled_isolation = parse_bool(ENV_ENABLED_ISOLATION, &raw)?;
        }

        config.isolation.environment = lookup(ENV_ENVIRONMENT);

        if let Some(raw) = lookup(ENV_SEND_TIMEOUT_MILLIS) {
            config.send_timeout_millis = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid_integer(ENV_SEND_TIMEOUT_MILLIS, &raw))?;
        }

        tracing::debug!(
            enabled_isolation = config.isolation.enabled_isolation,
            environment = ?config.isolation.environment,
            send_timeout_millis = config.send_timeout_millis,
            "Loaded enhance configuration",
        );

        Ok(config)
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::invalid_bool(key, raw)),
    }
}

/// Error returned when configuration values cannot be parsed.
#[derive(Debug)]
pub struct ConfigError {
    context: SpanTrace,
    kind: ConfigErrorKind,
}

/// Configuration error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// A boolean option held something other than a boolean.
    InvalidBool { key: &'static str, value: String },
    /// An integer option held something other than a non-negative integer.
    InvalidInteger { key: &'static str, value: String },
}

impl ConfigError {
    fn invalid_bool(key: &'static str, value: &str) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: ConfigErrorKind::InvalidBool {
                key,
                value: value.to_owned(),
            },
        }
    }

    fn invalid_integer(key: &'static str, value: &str) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: ConfigErrorKind::InvalidInteger {
                key,
                value: value.to_owned(),
            },
        }
    }

    /// The kind of configuration error.
    pub fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ConfigErrorKind::InvalidBool { key, value } => {
                writeln!(f, "Invalid boolean for {key}: {value:?}")
            }
            ConfigErrorKind::InvalidInteger { key, value } => {
                writeln!(f, "Invalid integer for {key}: {value:?}")
            }
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for ConfigError {}
