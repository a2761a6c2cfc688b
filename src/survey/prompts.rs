//! Fixed prompt texts, choice sets and rejection messages.

use super::state::SurveyState;

pub const FACADE_CHOICES: [&str; 3] = ["Фарбований МДФ", "Ламіноване ДСП", "Акриловий МДФ"];
pub const COUNTERTOP_CHOICES: [&str; 3] = ["Термопласт", "Акрилова", "Кварцова"];
pub const QUALITY_CHOICES: [&str; 3] = ["Економ", "Стандарт", "Преміум"];
pub const DELIVERY_CHOICES: [&str; 3] = ["Поки цікавлюсь", "Наступного місяця", "В цьому місяці"];
pub const GIFT_CHOICES: [[&str; 3]; 2] = [
    ["Знижка 20%", "Витяжка", "Стінова панель"],
    ["Мийка", "Техніка за спеціальною ціною", "Стільниця"],
];

pub const MIN_KITCHEN_LENGTH: u8 = 2;
pub const MAX_KITCHEN_LENGTH: u8 = 20;

pub const CONTACT_BUTTON_LABEL: &str = "Поділитися номером";

pub const ASK_FULL_NAME: &str = "Будь ласка, напишіть своє ім'я та прізвище:";

pub const CHOOSE_OPTION: &str = "Будь ласка, оберіть один із варіантів.";
pub const LENGTH_NOT_A_NUMBER: &str = "Будь ласка, введіть числове значення.";
pub const LENGTH_OUT_OF_RANGE: &str = "Будь ласка, введіть значення від 2 до 20.";
pub const INFO_ADDED: &str = "Додана інформація. Можете надіслати ще або напишіть '/done'.";
pub const FILE_ADDED: &str = "Файл додано. Можете надіслати ще або напишіть '/done'.";
pub const INFO_UNSUPPORTED: &str =
    "Надішліть текст, фото або файл. Коли завершите, напишіть '/done'.";
pub const INVALID_PHONE: &str = "Невірний формат номера телефону. Будь ласка, введіть номер з 10 цифр або 12 цифр із символом '+'.";
pub const SUBMIT_FAILED: &str =
    "Не вдалося надіслати відповіді. Будь ласка, надішліть свій номер ще раз.";
pub const NEED_START: &str = "Щоб заповнити анкету, напишіть /start";
pub const THANK_YOU: &str = "Дякуємо! Ваші відповіді надіслані. Для нової заявки напишіть /start";

/// Placeholder for a report field that was never answered.
pub const NOT_SPECIFIED: &str = "Не вказано";
pub const NO_GIFT: &str = "Не обрано";
pub const NO_ADDITIONAL_INFO: &str = "Немає";

/// Width of the dashed line sent after every report.
pub const SEPARATOR_WIDTH: usize = 92;

/// How a prompt asks for its answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Free text.
    None,
    /// Rows of one-shot choice buttons.
    Choices(Vec<Vec<String>>),
    /// A single button that shares the user's phone contact.
    ContactRequest { label: String },
}

/// An outbound message to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub keyboard: Keyboard,
}

impl Prompt {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Keyboard::None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self {
            text: text.into(),
            keyboard,
        }
    }
}

fn row(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The choice keyboard offered while in `state`, if it has one.
pub fn choices_for(state: SurveyState) -> Option<Vec<Vec<String>>> {
    match state {
        SurveyState::TypeFacade => Some(vec![row(&FACADE_CHOICES)]),
        SurveyState::TypeCountertop => Some(vec![row(&COUNTERTOP_CHOICES)]),
        SurveyState::FurnitureQuality => Some(vec![row(&QUALITY_CHOICES)]),
        SurveyState::DeliveryTime => Some(vec![row(&DELIVERY_CHOICES)]),
        SurveyState::GiftSelection => Some(GIFT_CHOICES.iter().map(|r| row(r)).collect()),
        _ => None,
    }
}

fn keyboard_for(state: SurveyState) -> Keyboard {
    match state {
        SurveyState::ContactInfo => Keyboard::ContactRequest {
            label: CONTACT_BUTTON_LABEL.to_string(),
        },
        _ => choices_for(state).map_or(Keyboard::None, Keyboard::Choices),
    }
}

/// The question asked on entering `state`.
pub fn question_for(state: SurveyState) -> Prompt {
    let text = match state {
        SurveyState::TypeFacade => "Оберіть тип фасаду:",
        SurveyState::TypeCountertop => "Оберіть тип стільниці:",
        SurveyState::KitchenLength => "Введіть кількість погонних метрів кухні (2-20):",
        SurveyState::FurnitureQuality => "Оберіть якість фурнітури:",
        SurveyState::DeliveryTime => "Коли потрібна кухня:",
        SurveyState::GiftSelection => "Оберіть подарунок:",
        SurveyState::AdditionalInfo => {
            "Напишіть додаткову інформацію або надішліть фото/файл, якщо потрібно. \
             Коли завершите або, якщо не потрібна додаткова інформація, напишіть '/done'."
        }
        SurveyState::FullName => ASK_FULL_NAME,
        SurveyState::ContactInfo => "Надішліть свій номер:",
        SurveyState::End => THANK_YOU,
    };
    Prompt::with_keyboard(text, keyboard_for(state))
}

/// A rejection message that keeps the state's keyboard available.
pub fn retry(state: SurveyState, message: &str) -> Prompt {
    Prompt::with_keyboard(message, keyboard_for(state))
}

/// The dashed line that separates consecutive reports in the destination chat.
pub fn separator() -> String {
    "-".repeat(SEPARATOR_WIDTH)
}
