//! Main agent loop.
//!
//! Pulls events off the channel stream and hands each one to the session
//! manager. Stops on Ctrl+C or when the stream ends, then drains every
//! session queue before shutting the channel down.

use std::sync::Arc;

use futures::StreamExt;

use crate::agent::session_manager::SessionManager;
use crate::channels::Channel;
use crate::config::SurveyConfig;
use crate::error::Error;
use crate::survey::dispatch::Dispatcher;

/// The survey bot: one channel, one destination, many sessions.
pub struct SurveyAgent {
    channel: Arc<dyn Channel>,
    sessions: SessionManager,
}

impl SurveyAgent {
    pub fn new(config: &SurveyConfig, channel: Arc<dyn Channel>) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&channel), config);
        let sessions =
            SessionManager::new(Arc::clone(&channel), dispatcher, config.session_idle_timeout);
        Self { channel, sessions }
    }

    pub async fn run(self) -> Result<(), Error> {
        self.channel.health_check().await?;
        let mut events = self.channel.start().await?;

        tracing::info!(channel = %self.channel.name(), "Survey agent ready and listening");

        loop {
            let event = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                event = events.next() => {
                    match event {
                        Some(e) => e,
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            self.sessions.route(event).await;
        }

        // Cleanup
        self.sessions.shutdown().await;
        self.channel.shutdown().await?;
        Ok(())
    }
}
