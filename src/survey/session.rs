//! Per-conversation survey record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dispatch::DispatchProgress;
use super::machine::Transition;
use super::model::{Answers, Contact, Effect};
use super::prompts::{self, Prompt};
use super::state::SurveyState;

/// Result of applying a transition to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Send this prompt back to the user.
    Reply(Prompt),
    /// The survey is ready to submit with these answers. The session
    /// itself is untouched until [`Session::complete`] is called.
    Submit(Answers),
}

/// One user's in-progress survey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique id of this survey run, for logs.
    pub id: Uuid,
    /// Routing key the session is stored under.
    pub session_id: String,
    /// Address prompts are sent to.
    pub reply_to: String,
    pub state: SurveyState,
    pub answers: Answers,
    /// Destination sends that already succeeded for this survey.
    #[serde(default)]
    pub dispatch: DispatchProgress,
    pub started_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    /// Start a survey at its first question.
    pub fn new(session_id: impl Into<String>, reply_to: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            reply_to: reply_to.into(),
            state: SurveyState::default(),
            answers: Answers::default(),
            dispatch: DispatchProgress::default(),
            started_at: now,
            last_active_at: now,
        }
    }

    /// Commit a transition. This is the only way a session's state and answers change.
    pub fn apply(&mut self, transition: Transition) -> Applied {
        self.last_active_at = Utc::now();
        match transition {
            Transition::Restart { prompt } => {
                self.id = Uuid::new_v4();
                self.state = SurveyState::default();
                self.answers = Answers::default();
                self.dispatch = DispatchProgress::default();
                self.started_at = self.last_active_at;
                Applied::Reply(prompt)
            }
            Transition::Reject { prompt } => Applied::Reply(prompt),
            Transition::Stay { effects, prompt } => {
                if !self.state.can_transition_to(self.state) {
                    return self.refuse(self.state);
                }
                self.commit(effects);
                Applied::Reply(prompt)
            }
            Transition::Advance {
                effects,
                next,
                prompt,
            } => {
                if !self.state.can_transition_to(next) {
                    return self.refuse(next);
                }
                self.commit(effects);
                self.state = next;
                Applied::Reply(prompt)
            }
            Transition::Complete { contact } => {
                if !self.state.can_transition_to(SurveyState::End) {
                    return self.refuse(SurveyState::End);
                }
                let mut answers = self.answers.clone();
                answers.apply(Effect::Contact(contact));
                Applied::Submit(answers)
            }
        }
    }

    /// Record the contact and mark the survey finished after a successful submit.
    pub fn complete(&mut self, contact: Contact) {
        self.answers.apply(Effect::Contact(contact));
        self.state = SurveyState::End;
        self.last_active_at = Utc::now();
    }

    fn commit(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.answers.apply(effect);
        }
    }

    fn refuse(&self, target: SurveyState) -> Applied {
        tracing::warn!(
            session_id = %self.session_id,
            from = %self.state,
            to = %target,
            "Refusing invalid survey transition"
        );
        Applied::Reply(prompts::question_for(self.state))
    }
}
