//! Kitchen Survey — a messenger bot that walks users through a fixed
//! kitchen-furniture questionnaire and forwards the answers to a
//! destination chat.

pub mod agent;
pub mod channels;
pub mod config;
pub mod error;
pub mod survey;
