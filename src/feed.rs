//! Line-oriented event feed
//!
//! `narrator run` reads game events from stdin, one per line. Plain lines are
//! phrases; lines starting with `/` are control commands.

use crate::error::{Error, Result};
use crate::telemetry::SessionState;

/// One parsed feed line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCommand {
    /// Pool a phrase
    Phrase { text: String, priority: i32 },
    /// Start a new session
    Reset,
    /// Change where the player is
    Session(SessionState),
    /// Replace the colony setting description
    Setting(String),
    /// Replace the colony roster
    Roster(Vec<String>),
    /// Let a persona move on without waiting for its queued speech
    Release(String),
    /// Blank line or comment
    Skip,
}

/// Parse one line of input.
///
/// Phrases may carry a priority prefix: `5|A raid has started`.
pub fn parse_line(line: &str) -> Result<FeedCommand> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(FeedCommand::Skip);
    }

    let Some(command) = line.strip_prefix('/') else {
        return Ok(parse_phrase(line));
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match name {
        "reset" => Ok(FeedCommand::Reset),
        "release" if !arg.is_empty() => Ok(FeedCommand::Release(arg.to_string())),
        "session" => parse_session(arg).map(FeedCommand::Session),
        "setting" if !arg.is_empty() => Ok(FeedCommand::Setting(arg.to_string())),
        "roster" => Ok(FeedCommand::Roster(
            arg.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )),
        _ => Err(Error::NotSupported(format!("feed command '/{}'", name))),
    }
}

fn parse_phrase(line: &str) -> FeedCommand {
    if let Some((prefix, rest)) = line.split_once('|') {
        if let Ok(priority) = prefix.trim().parse::<i32>() {
            return FeedCommand::Phrase {
                text: rest.trim().to_string(),
                priority,
            };
        }
    }
    FeedCommand::Phrase {
        text: line.to_string(),
        priority: 0,
    }
}

fn parse_session(arg: &str) -> Result<SessionState> {
    let (kind, rest) = match arg.split_once(char::is_whitespace) {
        Some((kind, rest)) => (kind, rest.trim()),
        None => (arg, ""),
    };
    match kind {
        "game" => Ok(SessionState::InGame),
        "start" => Ok(SessionState::StartScreen),
        "site" => Ok(SessionState::SelectingStartSite),
        "dialog" if !rest.is_empty() => Ok(SessionState::Dialog(rest.to_string())),
        _ => Err(Error::NotSupported(format!("session state '{}'", arg))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_prioritized_phrases() {
        assert_eq!(
            parse_line("A raid has started").unwrap(),
            FeedCommand::Phrase {
                text: "A raid has started".into(),
                priority: 0
            }
        );
        assert_eq!(
            parse_line(" 5 | Mechanoids landed ").unwrap(),
            FeedCommand::Phrase {
                text: "Mechanoids landed".into(),
                priority: 5
            }
        );
        assert_eq!(
            parse_line("a|b").unwrap(),
            FeedCommand::Phrase {
                text: "a|b".into(),
                priority: 0
            }
        );
    }

    #[test]
    fn test_commands() {
        assert_eq!(parse_line("/reset").unwrap(), FeedCommand::Reset);
        assert_eq!(
            parse_line("/session start").unwrap(),
            FeedCommand::Session(SessionState::StartScreen)
        );
        assert_eq!(
            parse_line("/session dialog Choose storyteller").unwrap(),
            FeedCommand::Session(SessionState::Dialog("Choose storyteller".into()))
        );
        assert_eq!(
            parse_line("/setting Boreal forest, hilly").unwrap(),
            FeedCommand::Setting("Boreal forest, hilly".into())
        );
        assert_eq!(
            parse_line("/roster Dorian, Bo ,").unwrap(),
            FeedCommand::Roster(vec!["Dorian".into(), "Bo".into()])
        );
        assert_eq!(
            parse_line("/release  Ava ").unwrap(),
            FeedCommand::Release("Ava".into())
        );
    }

    #[test]
    fn test_skips_and_errors() {
        assert_eq!(parse_line("   ").unwrap(), FeedCommand::Skip);
        assert_eq!(parse_line("# note").unwrap(), FeedCommand::Skip);
        assert!(parse_line("/unknown").is_err());
        assert!(parse_line("/session dialog").is_err());
        assert!(parse_line("/setting").is_err());
        assert!(parse_line("/release").is_err());
    }
}
