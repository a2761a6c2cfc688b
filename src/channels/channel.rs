//! Channel trait and the inbound event shape shared by every transport.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;
use crate::survey::command::Command;

/// Stream of inbound events produced by a started channel.
pub type EventStream = Pin<Box<dyn Stream<Item = IncomingEvent> + Send>>;

/// Kind of file the user attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Photo,
    Document,
}

/// Opaque reference to a file the transport already holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub kind: AttachmentKind,
    pub file_id: String,
}

impl AttachmentRef {
    pub fn photo(file_id: impl Into<String>) -> Self {
        Self {
            kind: AttachmentKind::Photo,
            file_id: file_id.into(),
        }
    }

    pub fn document(file_id: impl Into<String>) -> Self {
        Self {
            kind: AttachmentKind::Document,
            file_id: file_id.into(),
        }
    }
}

/// A phone contact the user shared through the transport's contact button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedContact {
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
}

/// Who sent an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Public handle (e.g. Telegram username), without the `@`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub display_name: String,
}

/// Coarse classification of an event, mirroring what a transport can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Text,
    Command,
    Contact,
    Photo,
    Document,
    Empty,
}

/// One inbound event from a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingEvent {
    pub id: Uuid,
    /// Name of the channel that produced the event.
    pub channel: String,
    /// Routing key: all events with the same id belong to one conversation.
    pub session_id: String,
    /// Address prompts for this conversation are sent to.
    pub reply_to: String,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<SharedContact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentRef>,
    pub received_at: DateTime<Utc>,
}

impl IncomingEvent {
    /// Create an empty event for a session; payload is added with the `with_*` builders.
    pub fn new(
        channel: impl Into<String>,
        session_id: impl Into<String>,
        reply_to: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            session_id: session_id.into(),
            reply_to: reply_to.into(),
            sender: Sender::default(),
            text: None,
            contact: None,
            attachment: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_sender(mut self, sender: Sender) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_contact(mut self, contact: SharedContact) -> Self {
        self.contact = Some(contact);
        self
    }

    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Classify the event. Commands win over attachments, attachments over contacts.
    pub fn kind(&self) -> EventKind {
        if self.text.as_deref().and_then(Command::parse).is_some() {
            return EventKind::Command;
        }
        match (&self.attachment, &self.contact, &self.text) {
            (Some(a), _, _) => match a.kind {
                AttachmentKind::Photo => EventKind::Photo,
                AttachmentKind::Document => EventKind::Document,
            },
            (None, Some(_), _) => EventKind::Contact,
            (None, None, Some(_)) => EventKind::Text,
            (None, None, None) => EventKind::Empty,
        }
    }
}

/// A bidirectional messaging transport.
///
/// `chat` arguments are transport addresses: either an event's `reply_to`
/// or the configured destination.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name for logs.
    fn name(&self) -> &str;

    /// Start receiving events.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Send a prompt, optionally with rows of one-shot choice buttons.
    async fn send_prompt(
        &self,
        chat: &str,
        text: &str,
        choices: Option<&[Vec<String>]>,
    ) -> Result<(), ChannelError>;

    /// Send a prompt with a single one-shot button that shares the user's contact.
    async fn send_contact_request(
        &self,
        chat: &str,
        text: &str,
        label: &str,
    ) -> Result<(), ChannelError>;

    /// Forward a previously received file by reference.
    async fn send_document(&self, chat: &str, file: &AttachmentRef) -> Result<(), ChannelError>;

    /// Send plain text.
    async fn send_text(&self, chat: &str, text: &str) -> Result<(), ChannelError>;

    /// Check that the transport is reachable.
    async fn health_check(&self) -> Result<(), ChannelError>;

    /// Gracefully stop the channel.
    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
