//! CLI channel — stdin/stdout REPL for local testing.
//!
//! Every line belongs to one local session. A few slash forms stand in for
//! what a messenger would deliver natively:
//!
//! - `/photo <id> [text]` and `/file <id> [text]` attach a file reference
//! - `/contact <phone>` shares a phone contact

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{AttachmentRef, Channel, EventStream, IncomingEvent, Sender, SharedContact};
use crate::error::ChannelError;

/// Session id and reply address of the single local conversation.
const CLI_SESSION: &str = "cli:local";
const CLI_CHAT: &str = "local";

/// A simple CLI channel that reads from stdin and writes to stdout.
pub struct CliChannel {
    sender: Sender,
}

impl CliChannel {
    pub fn new() -> Self {
        let user = std::env::var("USER").unwrap_or_else(|_| "local-user".to_string());
        Self {
            sender: Sender {
                handle: Some(user.clone()),
                display_name: user,
            },
        }
    }

    fn print(&self, chat: &str, text: &str) {
        if chat == CLI_CHAT {
            println!("\n{text}\n");
        } else {
            println!("\n[destination {chat}]\n{text}\n");
        }
        eprint!("> ");
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn one input line into an event. Blank lines yield `None`.
fn parse_line(line: &str, sender: &Sender) -> Option<IncomingEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let event = IncomingEvent::new("cli", CLI_SESSION, CLI_CHAT).with_sender(sender.clone());

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let (arg, tail) = match rest.split_once(char::is_whitespace) {
        Some((arg, tail)) => (arg, tail.trim()),
        None => (rest, ""),
    };

    let event = match head {
        "/photo" if !arg.is_empty() => event.with_attachment(AttachmentRef::photo(arg)),
        "/file" if !arg.is_empty() => event.with_attachment(AttachmentRef::document(arg)),
        "/contact" if !rest.is_empty() => {
            return Some(event.with_contact(SharedContact {
                phone: rest.to_string(),
                first_name: Some(sender.display_name.clone()),
            }));
        }
        _ => return Some(event.with_text(line)),
    };

    Some(if tail.is_empty() {
        event
    } else {
        event.with_text(tail)
    })
}

/// Render choice rows as `[a] [b] [c]`, one line per row.
fn render_choices(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|choice| format!("[{choice}]"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let sender = self.sender.clone();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(event) = parse_line(&line, &sender) else {
                            eprint!("> ");
                            continue;
                        };
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_prompt(
        &self,
        chat: &str,
        text: &str,
        choices: Option<&[Vec<String>]>,
    ) -> Result<(), ChannelError> {
        match choices {
            Some(rows) => self.print(chat, &format!("{text}\n{}", render_choices(rows))),
            None => self.print(chat, text),
        }
        Ok(())
    }

    async fn send_contact_request(
        &self,
        chat: &str,
        text: &str,
        label: &str,
    ) -> Result<(), ChannelError> {
        self.print(chat, &format!("{text}\n[{label}: /contact <phone>]"));
        Ok(())
    }

    async fn send_document(&self, chat: &str, file: &AttachmentRef) -> Result<(), ChannelError> {
        self.print(chat, &format!("📎 {:?} {}", file.kind, file.file_id));
        Ok(())
    }

    async fn send_text(&self, chat: &str, text: &str) -> Result<(), ChannelError> {
        self.print(chat, text);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
