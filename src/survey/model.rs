//! Survey answers and the report built from them.

use serde::{Deserialize, Serialize};

use crate::channels::AttachmentRef;

use super::prompts::{NO_ADDITIONAL_INFO, NO_GIFT, NOT_SPECIFIED};

/// The user's contact as it appears in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Public handle or display name, without the `@`.
    pub handle: String,
    /// Normalized phone: 10 digits, or `+` followed by 12 digits.
    pub phone: String,
}

impl std::fmt::Display for Contact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{} {}", self.handle, self.phone)
    }
}

/// Answers collected so far. Fields stay `None` until their question is answered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facade_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countertop_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kitchen_length: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub furniture_quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gift_selection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
}

/// A single mutation of [`Answers`] produced by an accepted input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FacadeType(String),
    CountertopType(String),
    KitchenLength(u8),
    FurnitureQuality(String),
    DeliveryTime(String),
    GiftSelection(String),
    AppendInfo(String),
    AppendAttachment(AttachmentRef),
    FullName(String),
    Contact(Contact),
}

impl Answers {
    /// Apply one effect. Additional info and attachments are appended, never replaced.
    pub fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::FacadeType(v) => self.facade_type = Some(v),
            Effect::CountertopType(v) => self.countertop_type = Some(v),
            Effect::KitchenLength(v) => self.kitchen_length = Some(v),
            Effect::FurnitureQuality(v) => self.furniture_quality = Some(v),
            Effect::DeliveryTime(v) => self.delivery_time = Some(v),
            Effect::GiftSelection(v) => self.gift_selection = Some(v),
            Effect::AppendInfo(text) => match self.additional_info {
                Some(ref mut info) => {
                    info.push('\n');
                    info.push_str(&text);
                }
                None => self.additional_info = Some(text),
            },
            Effect::AppendAttachment(file) => self.attachments.push(file),
            Effect::FullName(v) => self.full_name = Some(v),
            Effect::Contact(c) => self.contact = Some(c),
        }
    }

    /// Render the report sent to the destination chat.
    pub fn to_report(&self) -> String {
        fn or<'a>(value: Option<&'a str>, placeholder: &'a str) -> &'a str {
            value.unwrap_or(placeholder)
        }

        let contact = self
            .contact
            .as_ref()
            .map_or_else(|| NOT_SPECIFIED.to_string(), Contact::to_string);
        let length = self
            .kitchen_length
            .map_or_else(|| NOT_SPECIFIED.to_string(), |n| format!("{n} м"));

        let lines = [
            "Результати анкети:".to_string(),
            String::new(),
            format!(
                "Ім'я та прізвище: {}",
                or(self.full_name.as_deref(), NOT_SPECIFIED)
            ),
            format!("Контакт: {contact}"),
            format!(
                "Тип фасаду: {}",
                or(self.facade_type.as_deref(), NOT_SPECIFIED)
            ),
            format!(
                "Тип стільниці: {}",
                or(self.countertop_type.as_deref(), NOT_SPECIFIED)
            ),
            format!("Довжина кухні: {length}"),
            format!(
                "Якість фурнітури: {}",
                or(self.furniture_quality.as_deref(), NOT_SPECIFIED)
            ),
            format!(
                "Час доставки: {}",
                or(self.delivery_time.as_deref(), NOT_SPECIFIED)
            ),
            format!(
                "Обраний подарунок: {}",
                or(self.gift_selection.as_deref(), NO_GIFT)
            ),
            format!(
                "Додаткова інформація: {}",
                or(self.additional_info.as_deref(), NO_ADDITIONAL_INFO)
            ),
        ];
        lines.join("\n")
    }
}
