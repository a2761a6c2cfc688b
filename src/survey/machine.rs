//! Transition table: how each state judges an input and where it leads.
//!
//! `step` is pure. It reads the session and the input and returns a
//! [`Transition`]; committing it is [`Session::apply`](super::session::Session::apply)'s job.

use std::num::IntErrorKind;
use std::sync::LazyLock;

use regex::Regex;

use crate::channels::{AttachmentRef, IncomingEvent, Sender, SharedContact};

use super::command::Command;
use super::model::{Contact, Effect};
use super::prompts::{
    self, ASK_FULL_NAME, CHOOSE_OPTION, COUNTERTOP_CHOICES, DELIVERY_CHOICES, FACADE_CHOICES,
    FILE_ADDED, INFO_ADDED, INFO_UNSUPPORTED, INVALID_PHONE, LENGTH_NOT_A_NUMBER,
    LENGTH_OUT_OF_RANGE, MAX_KITCHEN_LENGTH, MIN_KITCHEN_LENGTH, Prompt, QUALITY_CHOICES,
};
use super::session::Session;
use super::state::SurveyState;

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[0-9]{10}|\+?[0-9]{12})$").expect("phone pattern is valid")
});

/// The parts of an inbound event the survey looks at.
#[derive(Debug, Clone, Copy)]
pub struct Input<'a> {
    pub command: Option<Command>,
    /// Message text, `None` when the text was a command.
    pub text: Option<&'a str>,
    pub contact: Option<&'a SharedContact>,
    pub attachment: Option<&'a AttachmentRef>,
    pub sender: &'a Sender,
}

impl<'a> Input<'a> {
    pub fn from_event(event: &'a IncomingEvent) -> Self {
        let command = event.text.as_deref().and_then(Command::parse);
        Self {
            command,
            text: if command.is_some() {
                None
            } else {
                event.text.as_deref()
            },
            contact: event.contact.as_ref(),
            attachment: event.attachment.as_ref(),
            sender: &event.sender,
        }
    }
}

/// What an input does to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `/start`: discard the answers and ask the first question again.
    Restart { prompt: Prompt },
    /// Input not accepted; nothing changes.
    Reject { prompt: Prompt },
    /// Accepted without leaving the state (additional info loop).
    Stay { effects: Vec<Effect>, prompt: Prompt },
    /// Accepted; move to `next` and ask its question.
    Advance {
        effects: Vec<Effect>,
        next: SurveyState,
        prompt: Prompt,
    },
    /// Last answer accepted; the survey can be submitted.
    Complete { contact: Contact },
}

/// A state's judgement of one input.
#[derive(Debug)]
enum Verdict {
    Accept(Vec<Effect>),
    Stay(Vec<Effect>, &'static str),
    Reject(&'static str),
    Complete(Contact),
}

type Rule = fn(&Input<'_>) -> Verdict;

const TRANSITION_TABLE: [(SurveyState, Rule); 9] = [
    (SurveyState::TypeFacade, facade_rule),
    (SurveyState::TypeCountertop, countertop_rule),
    (SurveyState::KitchenLength, kitchen_length_rule),
    (SurveyState::FurnitureQuality, quality_rule),
    (SurveyState::DeliveryTime, delivery_rule),
    (SurveyState::GiftSelection, gift_rule),
    (SurveyState::AdditionalInfo, additional_info_rule),
    (SurveyState::FullName, full_name_rule),
    (SurveyState::ContactInfo, contact_rule),
];

fn rule_for(state: SurveyState) -> Option<Rule> {
    TRANSITION_TABLE
        .iter()
        .find(|(s, _)| *s == state)
        .map(|(_, rule)| *rule)
}

/// Decide what `input` does to `session`.
pub fn step(session: &Session, input: &Input<'_>) -> Transition {
    if input.command == Some(Command::Start) {
        return Transition::Restart {
            prompt: prompts::question_for(SurveyState::TypeFacade),
        };
    }

    let state = session.state;
    let Some(rule) = rule_for(state) else {
        return Transition::Reject {
            prompt: prompts::Prompt::text(prompts::NEED_START),
        };
    };

    match rule(input) {
        Verdict::Accept(effects) => match state.next() {
            Some(next) => Transition::Advance {
                effects,
                next,
                prompt: prompts::question_for(next),
            },
            None => Transition::Reject {
                prompt: prompts::Prompt::text(prompts::NEED_START),
            },
        },
        Verdict::Stay(effects, ack) => Transition::Stay {
            effects,
            prompt: Prompt::text(ack),
        },
        Verdict::Reject(message) => Transition::Reject {
            prompt: prompts::retry(state, message),
        },
        Verdict::Complete(contact) => Transition::Complete { contact },
    }
}

fn choice(input: &Input<'_>, options: &[&str], effect: fn(String) -> Effect) -> Verdict {
    match input.text {
        Some(text) if options.contains(&text) => Verdict::Accept(vec![effect(text.to_string())]),
        _ => Verdict::Reject(CHOOSE_OPTION),
    }
}

fn facade_rule(input: &Input<'_>) -> Verdict {
    choice(input, &FACADE_CHOICES, Effect::FacadeType)
}

fn countertop_rule(input: &Input<'_>) -> Verdict {
    choice(input, &COUNTERTOP_CHOICES, Effect::CountertopType)
}

fn quality_rule(input: &Input<'_>) -> Verdict {
    choice(input, &QUALITY_CHOICES, Effect::FurnitureQuality)
}

fn delivery_rule(input: &Input<'_>) -> Verdict {
    choice(input, &DELIVERY_CHOICES, Effect::DeliveryTime)
}

fn kitchen_length_rule(input: &Input<'_>) -> Verdict {
    let Some(text) = input.text else {
        return Verdict::Reject(LENGTH_NOT_A_NUMBER);
    };
    match text.trim().parse::<i64>() {
        Ok(n) if (i64::from(MIN_KITCHEN_LENGTH)..=i64::from(MAX_KITCHEN_LENGTH)).contains(&n) => {
            Verdict::Accept(vec![Effect::KitchenLength(n as u8)])
        }
        Ok(_) => Verdict::Reject(LENGTH_OUT_OF_RANGE),
        // Too many digits is still a number, just not a plausible length.
        Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
            Verdict::Reject(LENGTH_OUT_OF_RANGE)
        }
        Err(_) => Verdict::Reject(LENGTH_NOT_A_NUMBER),
    }
}

fn gift_rule(input: &Input<'_>) -> Verdict {
    match input.text {
        Some(text) => Verdict::Accept(vec![Effect::GiftSelection(text.to_string())]),
        None => Verdict::Reject(CHOOSE_OPTION),
    }
}

/// A file sent together with `/done` is kept before the state advances.
fn additional_info_rule(input: &Input<'_>) -> Verdict {
    let mut effects = Vec::new();
    if let Some(file) = input.attachment {
        effects.push(Effect::AppendAttachment(file.clone()));
    }

    if input.command == Some(Command::Done) {
        return Verdict::Accept(effects);
    }

    if let Some(text) = input.text {
        effects.push(Effect::AppendInfo(text.to_string()));
    }

    if effects.is_empty() {
        Verdict::Reject(INFO_UNSUPPORTED)
    } else if input.attachment.is_some() {
        Verdict::Stay(effects, FILE_ADDED)
    } else {
        Verdict::Stay(effects, INFO_ADDED)
    }
}

fn full_name_rule(input: &Input<'_>) -> Verdict {
    match input.text.map(str::trim) {
        Some(name) if !name.is_empty() => Verdict::Accept(vec![Effect::FullName(name.to_string())]),
        _ => Verdict::Reject(ASK_FULL_NAME),
    }
}

fn contact_rule(input: &Input<'_>) -> Verdict {
    let raw = match (input.contact, input.text) {
        (Some(contact), _) => contact.phone.as_str(),
        (None, Some(text)) => text,
        (None, None) => return Verdict::Reject(INVALID_PHONE),
    };
    match normalize_phone(raw) {
        Some(phone) => Verdict::Complete(Contact {
            handle: display_handle(input.sender, input.contact),
            phone,
        }),
        None => Verdict::Reject(INVALID_PHONE),
    }
}

/// Validate a phone number: exactly 10 digits, or 12 digits with an
/// optional leading `+`. Bare 12-digit numbers gain the `+`.
pub fn normalize_phone(phone: &str) -> Option<String> {
    if !PHONE_RE.is_match(phone) {
        return None;
    }
    if phone.len() == 12 && !phone.starts_with('+') {
        Some(format!("+{phone}"))
    } else {
        Some(phone.to_string())
    }
}

/// Public handle if the sender has one, else the shared contact's first
/// name, else the sender's display name.
pub fn display_handle(sender: &Sender, contact: Option<&SharedContact>) -> String {
    let non_empty = |s: &&str| !s.trim().is_empty();
    sender
        .handle
        .as_deref()
        .filter(non_empty)
        .or_else(|| contact.and_then(|c| c.first_name.as_deref()).filter(non_empty))
        .unwrap_or(sender.display_name.as_str())
        .to_string()
}
