//! Terminal submission: forward attachments, then the report, to the destination.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::channels::Channel;
use crate::config::SurveyConfig;
use crate::error::{ChannelError, DispatchError};

use super::model::Answers;
use super::prompts::{self, THANK_YOU};

/// What already reached the destination during earlier submit attempts.
///
/// A failed submission is retried when the user resends their number; the
/// progress makes the retry pick up where the last attempt stopped instead
/// of forwarding the same files twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchProgress {
    /// Indices into [`Answers::attachments`] already forwarded.
    pub forwarded: BTreeSet<usize>,
    pub report_sent: bool,
    pub separator_sent: bool,
}

/// Sends finished surveys to the destination chat.
pub struct Dispatcher {
    channel: Arc<dyn Channel>,
    destination: String,
    retries: u32,
    retry_delay: Duration,
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn Channel>, config: &SurveyConfig) -> Self {
        Self {
            channel,
            destination: config.destination_chat_id.clone(),
            retries: config.dispatch_retries,
            retry_delay: config.dispatch_retry_delay,
        }
    }

    /// Destination chat id.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Submit a finished survey.
    ///
    /// Pending attachments are forwarded concurrently and must all succeed
    /// before the report and separator go out. Every delivered piece is
    /// recorded in `progress`, so a later call skips it. The user
    /// confirmation is sent last and its failure is only logged.
    pub async fn submit(
        &self,
        reply_to: &str,
        answers: &Answers,
        progress: &mut DispatchProgress,
    ) -> Result<(), DispatchError> {
        let pending: Vec<_> = answers
            .attachments
            .iter()
            .enumerate()
            .filter(|(i, _)| !progress.forwarded.contains(i))
            .collect();

        let sends = pending.into_iter().map(|(i, file)| async move {
            let result = self
                .with_retry("attachment", || {
                    self.channel.send_document(&self.destination, file)
                })
                .await
                .map_err(|source| DispatchError::Attachment {
                    file_id: file.file_id.clone(),
                    source,
                });
            (i, result)
        });

        let mut failure = None;
        let mut forwarded = 0;
        for (i, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    progress.forwarded.insert(i);
                    forwarded += 1;
                }
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }
        tracing::debug!(
            destination = %self.destination,
            count = forwarded,
            "Forwarded survey attachments"
        );

        if !progress.report_sent {
            let report = answers.to_report();
            self.with_retry("report", || self.channel.send_text(&self.destination, &report))
                .await
                .map_err(|source| DispatchError::Report { source })?;
            progress.report_sent = true;
        }

        if !progress.separator_sent {
            let separator = prompts::separator();
            self.with_retry("separator", || {
                self.channel.send_text(&self.destination, &separator)
            })
            .await
            .map_err(|source| DispatchError::Report { source })?;
            progress.separator_sent = true;
        }

        tracing::info!(
            destination = %self.destination,
            attachments = answers.attachments.len(),
            "Survey report delivered"
        );

        // Sent as a prompt without choices so the transport clears any keyboard.
        if let Err(e) = self.channel.send_prompt(reply_to, THANK_YOU, None).await {
            tracing::warn!(reply_to = %reply_to, "Failed to confirm submission: {}", e);
        }
        Ok(())
    }

    /// Run `op` until it succeeds or the retry budget is spent.
    async fn with_retry<F, Fut>(&self, what: &str, mut op: F) -> Result<(), ChannelError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), ChannelError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= self.retries => return Err(e),
                Err(e) => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max = self.retries,
                        "Dispatch of {} failed, retrying: {}",
                        what,
                        e
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::channels::{AttachmentRef, EventStream, IncomingEvent};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Sent {
        Document(String, String),
        Text(String, String),
        Prompt(String, String),
    }

    /// Records sends; `failures[file_id]` makes that many document sends fail first.
    #[derive(Default)]
    struct FlakyChannel {
        sent: Mutex<Vec<Sent>>,
        failures: Mutex<HashMap<String, u32>>,
        fail_text: AtomicBool,
    }

    impl FlakyChannel {
        fn failing(file_id: &str, times: u32) -> Self {
            let ch = Self::default();
            ch.failures.lock().unwrap().insert(file_id.to_string(), times);
            ch
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn documents(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Document(_, id) => Some(id),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl Channel for FlakyChannel {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn start(&self) -> Result<EventStream, ChannelError> {
            Ok(Box::pin(futures::stream::empty::<IncomingEvent>()))
        }

        async fn send_prompt(
            &self,
            chat: &str,
            text: &str,
            _choices: Option<&[Vec<String>]>,
        ) -> Result<(), ChannelError> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Prompt(chat.into(), text.into()));
            Ok(())
        }

        async fn send_contact_request(
            &self,
            chat: &str,
            text: &str,
            _label: &str,
        ) -> Result<(), ChannelError> {
            self.send_prompt(chat, text, None).await
        }

        async fn send_document(
            &self,
            chat: &str,
            file: &AttachmentRef,
        ) -> Result<(), ChannelError> {
            {
                let mut failures = self.failures.lock().unwrap();
                if let Some(left) = failures.get_mut(&file.file_id)
                    && *left > 0
                {
                    *left -= 1;
                    return Err(ChannelError::SendFailed {
                        name: "flaky".into(),
                        reason: "connection reset".into(),
                    });
                }
            }
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Document(chat.into(), file.file_id.clone()));
            Ok(())
        }

        async fn send_text(&self, chat: &str, text: &str) -> Result<(), ChannelError> {
            if self.fail_text.load(Ordering::SeqCst) {
                return Err(ChannelError::RateLimited {
                    name: "flaky".into(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Text(chat.into(), text.into()));
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn config(retries: u32) -> SurveyConfig {
        let mut config = SurveyConfig::new("-100");
        config.dispatch_retries = retries;
        config.dispatch_retry_delay = Duration::from_millis(1);
        config
    }

    fn answers_with(files: &[&str]) -> Answers {
        Answers {
            full_name: Some("Іван Іванов".into()),
            attachments: files.iter().map(|f| AttachmentRef::document(*f)).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn attachments_precede_report_separator_and_confirmation() {
        let channel = Arc::new(FlakyChannel::default());
        let dispatcher = Dispatcher::new(channel.clone(), &config(0));
        let answers = answers_with(&["a", "b", "c"]);
        let mut progress = DispatchProgress::default();

        dispatcher
            .submit("42", &answers, &mut progress)
            .await
            .unwrap();

        let sent = channel.sent();
        assert_eq!(sent.len(), 6);
        let mut docs: Vec<String> = sent[..3]
            .iter()
            .map(|s| match s {
                Sent::Document(chat, id) => {
                    assert_eq!(chat, "-100");
                    id.clone()
                }
                other => panic!("expected document, got {other:?}"),
            })
            .collect();
        docs.sort();
        assert_eq!(docs, ["a", "b", "c"]);
        assert_eq!(sent[3], Sent::Text("-100".into(), answers.to_report()));
        assert_eq!(sent[4], Sent::Text("-100".into(), prompts::separator()));
        // Confirmation goes out as a prompt so the user's keyboard is cleared.
        assert_eq!(sent[5], Sent::Prompt("42".into(), THANK_YOU.into()));
        assert_eq!(progress.forwarded.len(), 3);
        assert!(progress.report_sent && progress.separator_sent);
    }

    #[tokio::test]
    async fn transient_attachment_failure_is_retried() {
        let channel = Arc::new(FlakyChannel::failing("b", 2));
        let dispatcher = Dispatcher::new(channel.clone(), &config(2));

        dispatcher
            .submit("42", &answers_with(&["a", "b"]), &mut DispatchProgress::default())
            .await
            .unwrap();

        assert_eq!(channel.documents().len(), 2);
    }

    #[tokio::test]
    async fn exhausted_attachment_blocks_report() {
        let channel = Arc::new(FlakyChannel::failing("b", 5));
        let dispatcher = Dispatcher::new(channel.clone(), &config(1));
        let mut progress = DispatchProgress::default();

        let err = dispatcher
            .submit("42", &answers_with(&["a", "b"]), &mut progress)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Attachment { ref file_id, .. } if file_id == "b"));
        assert!(
            channel.sent().iter().all(|s| matches!(s, Sent::Document(..))),
            "no report may be sent after a failed attachment"
        );
        assert_eq!(progress.forwarded, BTreeSet::from([0]));
        assert!(!progress.report_sent);
    }

    #[tokio::test]
    async fn report_failure_is_surfaced() {
        let channel = Arc::new(FlakyChannel::default());
        channel.fail_text.store(true, Ordering::SeqCst);
        let dispatcher = Dispatcher::new(channel.clone(), &config(1));

        let err = dispatcher
            .submit("42", &answers_with(&[]), &mut DispatchProgress::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Report { .. }));
    }

    #[tokio::test]
    async fn resubmit_skips_what_already_arrived() {
        let channel = Arc::new(FlakyChannel::default());
        channel.fail_text.store(true, Ordering::SeqCst);
        let dispatcher = Dispatcher::new(channel.clone(), &config(0));
        let answers = answers_with(&["d1", "d2"]);
        let mut progress = DispatchProgress::default();

        dispatcher
            .submit("42", &answers, &mut progress)
            .await
            .unwrap_err();
        assert_eq!(channel.documents().len(), 2);

        channel.fail_text.store(false, Ordering::SeqCst);
        dispatcher
            .submit("42", &answers, &mut progress)
            .await
            .unwrap();

        let mut docs = channel.documents();
        docs.sort();
        assert_eq!(docs, ["d1", "d2"]);
        let reports = channel
            .sent()
            .iter()
            .filter(|s| matches!(s, Sent::Text(_, t) if *t == answers.to_report()))
            .count();
        assert_eq!(reports, 1);
    }

    #[tokio::test]
    async fn duplicate_file_ids_are_each_forwarded_once() {
        let channel = Arc::new(FlakyChannel::default());
        let dispatcher = Dispatcher::new(channel.clone(), &config(0));

        dispatcher
            .submit("42", &answers_with(&["same", "same"]), &mut DispatchProgress::default())
            .await
            .unwrap();

        assert_eq!(channel.documents(), ["same", "same"]);
    }
}
