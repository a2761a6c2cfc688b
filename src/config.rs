//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Environment variable holding the destination chat id.
pub const DESTINATION_ENV: &str = "SURVEY_DESTINATION_CHAT_ID";
/// Environment variable holding the Telegram bot token.
pub const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
const IDLE_TIMEOUT_ENV: &str = "SURVEY_SESSION_IDLE_TIMEOUT_SECS";
const RETRIES_ENV: &str = "SURVEY_DISPATCH_RETRIES";
const RETRY_DELAY_ENV: &str = "SURVEY_DISPATCH_RETRY_DELAY_MS";

/// Survey bot configuration.
#[derive(Debug, Clone)]
pub struct SurveyConfig {
    /// Chat that receives every finished report and forwarded attachment.
    pub destination_chat_id: String,
    /// Bot token; `None` runs the local CLI channel instead of Telegram.
    pub telegram_bot_token: Option<SecretString>,
    /// Drop sessions with no input for this long. `None` keeps them forever.
    pub session_idle_timeout: Option<Duration>,
    /// Extra attempts for each terminal send before giving up.
    pub dispatch_retries: u32,
    /// Base delay between dispatch attempts (multiplied by the attempt number).
    pub dispatch_retry_delay: Duration,
}

impl SurveyConfig {
    /// Build a config with defaults for everything except the destination.
    pub fn new(destination_chat_id: impl Into<String>) -> Self {
        Self {
            destination_chat_id: destination_chat_id.into(),
            telegram_bot_token: None,
            session_idle_timeout: None,
            dispatch_retries: 2,
            dispatch_retry_delay: Duration::from_millis(500),
        }
    }

    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let destination = lookup(DESTINATION_ENV)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(DESTINATION_ENV.to_string()))?;

        let mut config = Self::new(destination);

        config.telegram_bot_token = lookup(TELEGRAM_TOKEN_ENV)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        if let Some(secs) = parse_number::<u64>(&lookup, IDLE_TIMEOUT_ENV)? {
            config.session_idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(retries) = parse_number::<u32>(&lookup, RETRIES_ENV)? {
            config.dispatch_retries = retries;
        }
        if let Some(ms) = parse_number::<u64>(&lookup, RETRY_DELAY_ENV)? {
            config.dispatch_retry_delay = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse_number<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        })
}
