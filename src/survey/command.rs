//! Slash-command grammar recognised by the survey.

/// A command the survey reacts to regardless of the question being asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `/start` — begin a new survey, discarding any in-progress one.
    Start,
    /// `/done` — finish the additional information step.
    Done,
}

impl Command {
    /// Parse a whole message as a command. Matching is case-insensitive
    /// and ignores surrounding whitespace; anything else is not a command.
    pub fn parse(text: &str) -> Option<Command> {
        match text.trim().to_lowercase().as_str() {
            "/start" => Some(Command::Start),
            "/done" => Some(Command::Done),
            _ => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "/start"),
            Self::Done => write!(f, "/done"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/done"), Some(Command::Done));
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(Command::parse("  /DONE\n"), Some(Command::Done));
        assert_eq!(Command::parse("/Start"), Some(Command::Start));
    }

    #[test]
    fn requires_whole_message() {
        assert_eq!(Command::parse("/done please"), None);
        assert_eq!(Command::parse("I am /done"), None);
        assert_eq!(Command::parse("/start@kitchen_bot now"), None);
    }

    #[test]
    fn unknown_commands_are_not_commands() {
        assert_eq!(Command::parse("/help"), None);
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("done"), None);
    }

    #[test]
    fn display_round_trips() {
        for cmd in [Command::Start, Command::Done] {
            assert_eq!(Command::parse(&cmd.to_string()), Some(cmd));
        }
    }
}
