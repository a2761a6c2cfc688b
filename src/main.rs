use std::sync::Arc;

use kitchen_survey::agent::SurveyAgent;
use kitchen_survey::channels::{Channel, CliChannel, TelegramChannel};
use kitchen_survey::config::{DESTINATION_ENV, SurveyConfig, TELEGRAM_TOKEN_ENV};
use kitchen_survey::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut config = SurveyConfig::from_env().map_err(|e| {
        eprintln!("  export {DESTINATION_ENV}=-1001234567890");
        Error::from(e)
    })?;

    let channel: Arc<dyn Channel> = match config.telegram_bot_token.take() {
        Some(token) => Arc::new(TelegramChannel::new(token)),
        None => Arc::new(CliChannel::new()),
    };

    eprintln!("🍳 Kitchen Survey v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Channel: {}", channel.name());
    eprintln!("   Destination: {}", config.destination_chat_id);
    match config.session_idle_timeout {
        Some(idle) => eprintln!("   Idle sessions expire after {}s", idle.as_secs()),
        None => eprintln!("   Idle sessions: kept until completed"),
    }
    if channel.name() == "cli" {
        eprintln!("   {TELEGRAM_TOKEN_ENV} not set, running locally.");
        eprintln!("   Type /start to begin. /photo <id>, /file <id>, /contact <phone> simulate uploads.\n");
    }

    SurveyAgent::new(&config, channel).run().await?;

    Ok(())
}
