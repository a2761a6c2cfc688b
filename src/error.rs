//! Error types for the kitchen survey bot.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Rate limited on channel {name}")]
    RateLimited { name: String },
}

/// Failures of the terminal fan-out to the destination channel.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Attachment {file_id} could not be forwarded: {source}")]
    Attachment {
        file_id: String,
        #[source]
        source: ChannelError,
    },

    #[error("Report could not be delivered: {source}")]
    Report {
        #[source]
        source: ChannelError,
    },
}
