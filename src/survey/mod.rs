//! Kitchen survey — states, transition table, answers and submission.

pub mod command;
pub mod dispatch;
pub mod machine;
pub mod model;
pub mod prompts;
pub mod session;
pub mod state;

pub use command::Command;
pub use dispatch::{DispatchProgress, Dispatcher};
pub use machine::{Input, Transition, step};
pub use model::{Answers, Contact, Effect};
pub use prompts::{Keyboard, Prompt};
pub use session::{Applied, Session};
pub use state::SurveyState;
