//! Session manager — one serial event queue per conversation.
//!
//! Every session id gets its own task that owns the survey record and
//! drains an mpsc queue, so events of one conversation are handled strictly
//! one after another while different conversations run in parallel. A task
//! retires as soon as it holds no survey and its queue is empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::channels::{Channel, IncomingEvent};
use crate::error::ChannelError;
use crate::survey::command::Command;
use crate::survey::dispatch::Dispatcher;
use crate::survey::machine::{self, Input};
use crate::survey::prompts::{self, Keyboard, Prompt, SUBMIT_FAILED};
use crate::survey::session::{Applied, Session};
use crate::survey::state::SurveyState;

/// Send a prompt through the channel operation its keyboard calls for.
pub async fn deliver(
    channel: &dyn Channel,
    chat: &str,
    prompt: &Prompt,
) -> Result<(), ChannelError> {
    match &prompt.keyboard {
        Keyboard::None => channel.send_prompt(chat, &prompt.text, None).await,
        Keyboard::Choices(rows) => {
            channel
                .send_prompt(chat, &prompt.text, Some(rows.as_slice()))
                .await
        }
        Keyboard::ContactRequest { label } => {
            channel.send_contact_request(chat, &prompt.text, label).await
        }
    }
}

struct SessionHandle {
    tx: mpsc::UnboundedSender<IncomingEvent>,
    task: JoinHandle<()>,
}

/// State shared by the manager and every session task.
struct SessionContext {
    channel: Arc<dyn Channel>,
    dispatcher: Dispatcher,
    idle_timeout: Option<Duration>,
    /// Live tasks by session id. `route` sends while holding this lock and a
    /// task only removes itself while holding it, so no event is lost.
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

/// Routes events to per-session tasks.
pub struct SessionManager {
    ctx: Arc<SessionContext>,
}

impl SessionManager {
    pub fn new(
        channel: Arc<dyn Channel>,
        dispatcher: Dispatcher,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            ctx: Arc::new(SessionContext {
                channel,
                dispatcher,
                idle_timeout,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Queue an event on its session's task, starting the task if needed.
    pub async fn route(&self, event: IncomingEvent) {
        let mut sessions = self.ctx.sessions.lock().await;

        let event = match sessions.get(&event.session_id) {
            Some(handle) => match handle.tx.send(event) {
                Ok(()) => return,
                // Task already gone; start a fresh one below.
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let key = event.session_id.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(event).is_err() {
            return;
        }
        let task = tokio::spawn(run_session(key.clone(), rx, Arc::clone(&self.ctx)));
        tracing::debug!(session_id = %key, "Session task started");
        sessions.insert(key, SessionHandle { tx, task });
    }

    /// Number of session tasks still accepting events.
    pub async fn active_count(&self) -> usize {
        let sessions = self.ctx.sessions.lock().await;
        sessions.values().filter(|h| !h.tx.is_closed()).count()
    }

    /// Close every queue and wait until all queued events are handled.
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = {
            let mut sessions = self.ctx.sessions.lock().await;
            sessions.drain().map(|(_, h)| h).collect()
        };
        let count = handles.len();
        for SessionHandle { tx, task } in handles {
            drop(tx);
            if let Err(e) = task.await {
                tracing::error!("Session task panicked: {}", e);
            }
        }
        tracing::info!(sessions = count, "All session tasks stopped");
    }
}

async fn run_session(
    key: String,
    mut rx: mpsc::UnboundedReceiver<IncomingEvent>,
    ctx: Arc<SessionContext>,
) {
    let mut session: Option<Session> = None;

    loop {
        let next = match ctx.idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, rx.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    if retire(&ctx, &key, &rx).await {
                        tracing::info!(
                            session_id = %key,
                            state = ?session.as_ref().map(|s| s.state),
                            "Evicted idle session"
                        );
                        break;
                    }
                    continue;
                }
            },
            None => rx.recv().await,
        };

        // Closed by shutdown.
        let Some(event) = next else {
            break;
        };
        handle_event(&ctx, &mut session, event).await;

        if session.is_none() && retire(&ctx, &key, &rx).await {
            break;
        }
    }

    tracing::debug!(session_id = %key, "Session task finished");
}

/// Unregister the task if nothing is queued for it.
///
/// Returns `false` when an event slipped in, in which case the task must
/// keep running to handle it.
async fn retire(
    ctx: &SessionContext,
    key: &str,
    rx: &mpsc::UnboundedReceiver<IncomingEvent>,
) -> bool {
    let mut sessions = ctx.sessions.lock().await;
    if !rx.is_empty() {
        return false;
    }
    sessions.remove(key);
    true
}

async fn handle_event(ctx: &SessionContext, slot: &mut Option<Session>, event: IncomingEvent) {
    let input = Input::from_event(&event);
    tracing::debug!(
        session_id = %event.session_id,
        event_id = %event.id,
        kind = ?event.kind(),
        "Handling survey event"
    );

    let Some(session) = slot.as_mut() else {
        let prompt = if input.command == Some(Command::Start) {
            let session = slot.insert(Session::new(&event.session_id, &event.reply_to));
            tracing::info!(
                session_id = %session.session_id,
                survey_id = %session.id,
                "Survey started"
            );
            prompts::question_for(SurveyState::TypeFacade)
        } else {
            Prompt::text(prompts::NEED_START)
        };
        send(ctx, &event.reply_to, &prompt).await;
        return;
    };

    session.reply_to = event.reply_to.clone();
    let before = session.state;
    let transition = machine::step(session, &input);

    match session.apply(transition) {
        Applied::Reply(prompt) => {
            if session.state != before {
                tracing::info!(
                    session_id = %session.session_id,
                    from = %before,
                    to = %session.state,
                    "Survey advanced"
                );
            }
            send(ctx, &session.reply_to, &prompt).await;
        }
        Applied::Submit(answers) => {
            let submitted = ctx
                .dispatcher
                .submit(&session.reply_to, &answers, &mut session.dispatch)
                .await;
            match submitted {
                Ok(()) => {
                    if let Some(contact) = answers.contact {
                        session.complete(contact);
                    }
                    tracing::info!(
                        session_id = %session.session_id,
                        survey_id = %session.id,
                        attachments = answers.attachments.len(),
                        "Survey submitted"
                    );
                    *slot = None;
                }
                Err(e) => {
                    tracing::error!(
                        session_id = %session.session_id,
                        destination = %ctx.dispatcher.destination(),
                        "Survey submission failed: {}",
                        e
                    );
                    let prompt = prompts::retry(SurveyState::ContactInfo, SUBMIT_FAILED);
                    send(ctx, &session.reply_to, &prompt).await;
                }
            }
        }
    }
}

async fn send(ctx: &SessionContext, chat: &str, prompt: &Prompt) {
    if let Err(e) = deliver(ctx.channel.as_ref(), chat, prompt).await {
        tracing::warn!(chat = %chat, "Failed to send prompt: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::channels::{AttachmentRef, EventStream, Sender};
    use crate::config::SurveyConfig;
    use crate::survey::prompts::{CHOOSE_OPTION, NEED_START, THANK_YOU};

    const DESTINATION: &str = "-100";

    /// Records every send as `(chat, text)`; files are recorded as `file:<id>`.
    /// `fail_destination` makes text sends to the destination fail, files still pass.
    #[derive(Default)]
    struct RecordingChannel {
        sent: StdMutex<Vec<(String, String)>>,
        fail_destination: AtomicBool,
    }

    impl RecordingChannel {
        fn sent_to(&self, chat: &str) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| c == chat)
                .map(|(_, t)| t.clone())
                .collect()
        }

        fn record(&self, chat: &str, text: String) -> Result<(), ChannelError> {
            if chat == DESTINATION
                && !text.starts_with("file:")
                && self.fail_destination.load(Ordering::SeqCst)
            {
                return Err(ChannelError::SendFailed {
                    name: "recording".into(),
                    reason: "destination unavailable".into(),
                });
            }
            self.sent.lock().unwrap().push((chat.to_string(), text));
            Ok(())
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
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
            self.record(chat, text.to_string())
        }

        async fn send_contact_request(
            &self,
            chat: &str,
            text: &str,
            _label: &str,
        ) -> Result<(), ChannelError> {
            self.record(chat, text.to_string())
        }

        async fn send_document(
            &self,
            chat: &str,
            file: &AttachmentRef,
        ) -> Result<(), ChannelError> {
            self.record(chat, format!("file:{}", file.file_id))
        }

        async fn send_text(&self, chat: &str, text: &str) -> Result<(), ChannelError> {
            self.record(chat, text.to_string())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn manager(channel: &Arc<RecordingChannel>, idle: Option<Duration>) -> SessionManager {
        let mut config = SurveyConfig::new(DESTINATION);
        config.dispatch_retries = 0;
        config.dispatch_retry_delay = Duration::from_millis(1);
        let channel: Arc<dyn Channel> = channel.clone();
        let dispatcher = Dispatcher::new(Arc::clone(&channel), &config);
        SessionManager::new(channel, dispatcher, idle)
    }

    fn text(chat: &str, body: &str) -> IncomingEvent {
        IncomingEvent::new("test", format!("{chat}:7"), chat)
            .with_sender(Sender {
                handle: Some("ivan".into()),
                display_name: "Іван".into(),
            })
            .with_text(body)
    }

    const ANSWERS: [&str; 9] = [
        "/start",
        "Фарбований МДФ",
        "Термопласт",
        "15",
        "Стандарт",
        "В цьому місяці",
        "Знижка 20%",
        "/done",
        "Іван Іванов",
    ];

    #[tokio::test]
    async fn event_without_session_asks_for_start() {
        let channel = Arc::new(RecordingChannel::default());
        let mgr = manager(&channel, None);

        mgr.route(text("1", "Стандарт")).await;
        mgr.shutdown().await;

        assert_eq!(channel.sent_to("1"), [NEED_START]);
    }

    #[tokio::test]
    async fn events_of_one_session_are_handled_in_order() {
        let channel = Arc::new(RecordingChannel::default());
        let mgr = manager(&channel, None);

        for answer in ANSWERS {
            mgr.route(text("1", answer)).await;
        }
        mgr.route(text("1", "0971234567")).await;
        mgr.shutdown().await;

        let mut expected: Vec<String> = SurveyState::ALL[..SurveyState::ALL.len() - 1]
            .iter()
            .map(|s| prompts::question_for(*s).text)
            .collect();
        expected.push(THANK_YOU.to_string());
        assert_eq!(channel.sent_to("1"), expected);

        let destination = channel.sent_to(DESTINATION);
        assert_eq!(destination.len(), 2);
        assert!(destination[0].contains("0971234567"));
        assert_eq!(destination[1], prompts::separator());
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let channel = Arc::new(RecordingChannel::default());
        let mgr = manager(&channel, None);

        mgr.route(text("1", "/start")).await;
        mgr.route(text("2", "/start")).await;
        mgr.route(text("1", "Акриловий МДФ")).await;
        mgr.route(text("2", "Термопласт")).await;
        mgr.route(text("2", "Ламіноване ДСП")).await;
        assert_eq!(mgr.active_count().await, 2);
        mgr.shutdown().await;

        let facade = prompts::question_for(SurveyState::TypeFacade).text;
        let countertop = prompts::question_for(SurveyState::TypeCountertop).text;
        assert_eq!(channel.sent_to("1"), [facade.clone(), countertop.clone()]);
        assert_eq!(
            channel.sent_to("2"),
            [facade, CHOOSE_OPTION.to_string(), countertop]
        );
    }

    #[tokio::test]
    async fn failed_dispatch_keeps_answers_for_retry() {
        let channel = Arc::new(RecordingChannel::default());
        channel.fail_destination.store(true, Ordering::SeqCst);
        let mgr = manager(&channel, None);

        for answer in ANSWERS {
            mgr.route(text("1", answer)).await;
        }
        mgr.route(text("1", "0971234567")).await;

        // Wait for the failed submission to be reported before healing the destination.
        let mut waited = 0;
        while !channel.sent_to("1").iter().any(|t| t == SUBMIT_FAILED) {
            tokio::time::sleep(Duration::from_millis(5)).await;
            waited += 1;
            assert!(waited < 400, "submission failure was never reported");
        }
        channel.fail_destination.store(false, Ordering::SeqCst);

        mgr.route(text("1", "0971234567")).await;
        mgr.shutdown().await;

        let user = channel.sent_to("1");
        assert_eq!(user.last().map(String::as_str), Some(THANK_YOU));
        let destination = channel.sent_to(DESTINATION);
        assert_eq!(destination.len(), 2);
        assert!(destination[0].contains("Іван Іванов"));
    }

    async fn wait_until_idle(mgr: &SessionManager) {
        let mut waited = 0;
        while mgr.active_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            waited += 1;
            assert!(waited < 400, "session tasks never retired");
        }
    }

    #[tokio::test]
    async fn finished_and_stray_sessions_release_their_tasks() {
        let channel = Arc::new(RecordingChannel::default());
        let mgr = manager(&channel, None);

        for answer in ANSWERS {
            mgr.route(text("1", answer)).await;
        }
        mgr.route(text("1", "0971234567")).await;
        for chat in 100..150 {
            mgr.route(text(&chat.to_string(), "hello")).await;
        }

        wait_until_idle(&mgr).await;
        assert_eq!(channel.sent_to("1").last().map(String::as_str), Some(THANK_YOU));
        assert_eq!(channel.sent_to("120"), [NEED_START]);

        // A returning user gets a fresh task.
        mgr.route(text("1", "/start")).await;
        assert_eq!(mgr.active_count().await, 1);
        mgr.shutdown().await;
    }

    #[tokio::test]
    async fn resent_number_does_not_forward_files_twice() {
        let channel = Arc::new(RecordingChannel::default());
        channel.fail_destination.store(true, Ordering::SeqCst);
        let mgr = manager(&channel, None);

        for answer in &ANSWERS[..7] {
            mgr.route(text("1", answer)).await;
        }
        mgr.route(
            IncomingEvent::new("test", "1:7", "1").with_attachment(AttachmentRef::document("d1")),
        )
        .await;
        for answer in &ANSWERS[7..] {
            mgr.route(text("1", answer)).await;
        }
        mgr.route(text("1", "0971234567")).await;

        let mut waited = 0;
        while !channel.sent_to("1").iter().any(|t| t == SUBMIT_FAILED) {
            tokio::time::sleep(Duration::from_millis(5)).await;
            waited += 1;
            assert!(waited < 400, "submission failure was never reported");
        }
        channel.fail_destination.store(false, Ordering::SeqCst);

        mgr.route(text("1", "0971234567")).await;
        mgr.shutdown().await;

        let destination = channel.sent_to(DESTINATION);
        let files: Vec<&String> = destination.iter().filter(|t| t.starts_with("file:")).collect();
        assert_eq!(files, ["file:d1"]);
        assert_eq!(destination.len(), 3);
        assert_eq!(channel.sent_to("1").last().map(String::as_str), Some(THANK_YOU));
    }

    #[tokio::test]
    async fn idle_session_is_evicted() {
        let channel = Arc::new(RecordingChannel::default());
        let mgr = manager(&channel, Some(Duration::from_millis(20)));

        mgr.route(text("1", "/start")).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(mgr.active_count().await, 0);

        mgr.route(text("1", "Фарбований МДФ")).await;
        mgr.shutdown().await;

        assert_eq!(
            channel.sent_to("1"),
            [
                prompts::question_for(SurveyState::TypeFacade).text,
                NEED_START.to_string()
            ]
        );
    }
}
