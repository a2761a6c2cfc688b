//! Survey state machine — which question the user is answering.

use serde::{Deserialize, Serialize};

/// The questions of the survey, in the order they are asked.
///
/// Progresses linearly: TypeFacade → TypeCountertop → KitchenLength →
/// FurnitureQuality → DeliveryTime → GiftSelection → AdditionalInfo →
/// FullName → ContactInfo → End. AdditionalInfo may loop on itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyState {
    #[default]
    TypeFacade,
    TypeCountertop,
    KitchenLength,
    FurnitureQuality,
    DeliveryTime,
    GiftSelection,
    AdditionalInfo,
    FullName,
    ContactInfo,
    End,
}

impl SurveyState {
    /// Every state in survey order.
    pub const ALL: [SurveyState; 10] = [
        Self::TypeFacade,
        Self::TypeCountertop,
        Self::KitchenLength,
        Self::FurnitureQuality,
        Self::DeliveryTime,
        Self::GiftSelection,
        Self::AdditionalInfo,
        Self::FullName,
        Self::ContactInfo,
        Self::End,
    ];

    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: SurveyState) -> bool {
        use SurveyState::*;
        matches!(
            (self, target),
            (TypeFacade, TypeCountertop)
                | (TypeCountertop, KitchenLength)
                | (KitchenLength, FurnitureQuality)
                | (FurnitureQuality, DeliveryTime)
                | (DeliveryTime, GiftSelection)
                | (GiftSelection, AdditionalInfo)
                | (AdditionalInfo, AdditionalInfo)
                | (AdditionalInfo, FullName)
                | (FullName, ContactInfo)
                | (ContactInfo, End)
        )
    }

    /// Whether this state ends the survey.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Get the next state in the linear progression, if any.
    pub fn next(&self) -> Option<SurveyState> {
        use SurveyState::*;
        match self {
            TypeFacade => Some(TypeCountertop),
            TypeCountertop => Some(KitchenLength),
            KitchenLength => Some(FurnitureQuality),
            FurnitureQuality => Some(DeliveryTime),
            DeliveryTime => Some(GiftSelection),
            GiftSelection => Some(AdditionalInfo),
            AdditionalInfo => Some(FullName),
            FullName => Some(ContactInfo),
            ContactInfo => Some(End),
            End => None,
        }
    }

    /// Position in the survey order.
    pub fn ordinal(&self) -> usize {
        Self::ALL
            .iter()
            .position(|s| s == self)
            .unwrap_or(Self::ALL.len())
    }
}

impl std::fmt::Display for SurveyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TypeFacade => "type_facade",
            Self::TypeCountertop => "type_countertop",
            Self::KitchenLength => "kitchen_length",
            Self::FurnitureQuality => "furniture_quality",
            Self::DeliveryTime => "delivery_time",
            Self::GiftSelection => "gift_selection",
            Self::AdditionalInfo => "additional_info",
            Self::FullName => "full_name",
            Self::ContactInfo => "contact_info",
            Self::End => "end",
        };
        write!(f, "{s}")
    }
}
