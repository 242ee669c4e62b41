//! Slash-command grammar.
//!
//! Case-insensitive leading verb:
//! - `today`
//! - `add "<title>" <N>m [today|tomorrow] [<H[:MM][am|pm]>]`
//! - `move "<title>" <today|tomorrow> <H[:MM][am|pm]> [<N>m]`
//! - `undo` / `help`

use std::sync::LazyLock;

use chrono::NaiveTime;
use regex::Regex;

/// Which day a command refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayRef {
    Today,
    Tomorrow,
}

/// A parsed command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// List today's managed blocks.
    Today,
    /// Create a block.
    Add {
        title: String,
        minutes: i64,
        day: DayRef,
        time: Option<NaiveTime>,
    },
    /// Move (and optionally resize) a block matched by title.
    Move {
        title: String,
        day: DayRef,
        time: NaiveTime,
        minutes: Option<i64>,
    },
    /// Revert the last applied create/move.
    Undo,
    /// Show the command reference.
    Help,
}

/// Why a command failed to parse.
///
/// The distinction matters to the caller: an unknown leading verb is free
/// text worth handing to the edit-intent parser, while a malformed known
/// command gets its grammar error echoed back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    /// The leading verb is not part of the grammar.
    #[error("unknown command {0:?}; try `help`")]
    UnknownVerb(String),
    /// A known verb with arguments that do not fit the grammar. The message
    /// is user-facing.
    #[error("{0}")]
    Malformed(String),
}

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("valid title regex"));
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,4})m$").expect("valid duration regex"));
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(\d{1,2})(?::(\d{2}))?(am|pm)?$").expect("valid time regex")
});

/// The `help` reply text.
pub fn help_text() -> String {
    [
        "Commands:",
        "  today — list today's planned blocks",
        "  add \"<title>\" <N>m [today|tomorrow] [<time>] — add a block (default 7pm today)",
        "  move \"<title>\" <today|tomorrow> <time> [<N>m] — move a block",
        "  undo — revert the last add/move",
        "  help — this message",
    ]
    .join("\n")
}

/// Parse one command line.
///
/// # Errors
///
/// Returns a [`CommandParseError`] with a user-facing message when the text
/// does not match the grammar.
pub fn parse(text: &str) -> Result<Command, CommandParseError> {
    let trimmed = text.trim();
    let verb = trimmed
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_start_matches('/')
        .to_lowercase();

    match verb.as_str() {
        "today" => Ok(Command::Today),
        "undo" => Ok(Command::Undo),
        "help" => Ok(Command::Help),
        "add" => parse_add(trimmed),
        "move" => parse_move(trimmed),
        "" => Err(CommandParseError::Malformed("empty command; try `help`".to_owned())),
        other => Err(CommandParseError::UnknownVerb(other.to_owned())),
    }
}

fn quoted_title(text: &str) -> Result<(String, String), CommandParseError> {
    let caps = TITLE_RE.captures(text).ok_or_else(|| {
        CommandParseError::Malformed("missing quoted title, e.g. add \"Homework\" 60m".to_owned())
    })?;
    let full = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
    let title = caps
        .get(1)
        .map(|m| m.as_str().trim().to_owned())
        .unwrap_or_default();
    if title.is_empty() {
        return Err(CommandParseError::Malformed("title must be non-empty".to_owned()));
    }
    let rest = match text.split_once(full) {
        Some((_, after)) => after.to_owned(),
        None => String::new(),
    };
    Ok((title, rest))
}

fn parse_add(text: &str) -> Result<Command, CommandParseError> {
    let (title, rest) = quoted_title(text)?;

    let mut minutes: Option<i64> = None;
    let mut day = DayRef::Today;
    let mut time: Option<NaiveTime> = None;

    for token in rest.split_whitespace() {
        let lower = token.to_lowercase();
        if let Some(caps) = DURATION_RE.captures(&lower) {
            minutes = caps.get(1).and_then(|m| m.as_str().parse().ok());
            continue;
        }
        match lower.as_str() {
            "today" => day = DayRef::Today,
            "tomorrow" => day = DayRef::Tomorrow,
            _ => {
                if let Some(parsed) = parse_time_token(token) {
                    time = Some(parsed);
                } else {
                    return Err(CommandParseError::Malformed(format!(
                        "unrecognized token {token:?} in add command"
                    )));
                }
            }
        }
    }

    let minutes = minutes.ok_or_else(|| {
        CommandParseError::Malformed("missing duration, e.g. add \"Homework\" 60m".to_owned())
    })?;
    if minutes == 0 {
        return Err(CommandParseError::Malformed("duration must be positive".to_owned()));
    }

    Ok(Command::Add {
        title,
        minutes,
        day,
        time,
    })
}

fn parse_move(text: &str) -> Result<Command, CommandParseError> {
    let (title, rest) = quoted_title(text)?;

    let mut day: Option<DayRef> = None;
    let mut time: Option<NaiveTime> = None;
    let mut minutes: Option<i64> = None;

    for token in rest.split_whitespace() {
        let lower = token.to_lowercase();
        if let Some(caps) = DURATION_RE.captures(&lower) {
            minutes = caps.get(1).and_then(|m| m.as_str().parse().ok());
            continue;
        }
        match lower.as_str() {
            "today" => day = Some(DayRef::Today),
            "tomorrow" => day = Some(DayRef::Tomorrow),
            _ => {
                if let Some(parsed) = parse_time_token(token) {
                    time = Some(parsed);
                } else {
                    return Err(CommandParseError::Malformed(format!(
                        "unrecognized token {token:?} in move command"
                    )));
                }
            }
        }
    }

    let day = day.ok_or_else(|| {
        CommandParseError::Malformed("move needs a day: today or tomorrow".to_owned())
    })?;
    let time = time.ok_or_else(|| {
        CommandParseError::Malformed("move needs a time, e.g. 7:00pm".to_owned())
    })?;

    Ok(Command::Move {
        title,
        day,
        time,
        minutes,
    })
}

/// Parse `H`, `H:MM`, `Hpm`, or `H:MMpm` into a time of day.
pub fn parse_time_token(token: &str) -> Option<NaiveTime> {
    let caps = TIME_RE.captures(token)?;
    let raw_hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    let hour = match caps.get(3).map(|m| m.as_str().to_lowercase()) {
        Some(ref meridiem) if meridiem == "pm" && raw_hour < 12 => raw_hour.checked_add(12)?,
        Some(ref meridiem) if meridiem == "am" && raw_hour == 12 => 0,
        _ => raw_hour,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_verbs() {
        assert_eq!(parse("today").expect("ok"), Command::Today);
        assert_eq!(parse("UNDO").expect("ok"), Command::Undo);
        assert_eq!(parse("/help").expect("ok"), Command::Help);
    }

    #[test]
    fn add_with_defaults() {
        let cmd = parse("add \"Homework 3\" 60m").expect("ok");
        assert_eq!(
            cmd,
            Command::Add {
                title: "Homework 3".to_owned(),
                minutes: 60,
                day: DayRef::Today,
                time: None,
            }
        );
    }

    #[test]
    fn add_with_day_and_time() {
        let cmd = parse("add \"Review notes\" 45m tomorrow 7:30pm").expect("ok");
        assert_eq!(
            cmd,
            Command::Add {
                title: "Review notes".to_owned(),
                minutes: 45,
                day: DayRef::Tomorrow,
                time: NaiveTime::from_hms_opt(19, 30, 0),
            }
        );
    }

    #[test]
    fn move_requires_day_and_time() {
        let cmd = parse("move \"Homework\" tomorrow 7:00pm").expect("ok");
        assert_eq!(
            cmd,
            Command::Move {
                title: "Homework".to_owned(),
                day: DayRef::Tomorrow,
                time: NaiveTime::from_hms_opt(19, 0, 0).expect("valid"),
                minutes: None,
            }
        );
        assert!(parse("move \"Homework\" 7:00pm").is_err());
        assert!(parse("move \"Homework\" tomorrow").is_err());
    }

    #[test]
    fn move_with_duration_override() {
        let cmd = parse("move \"Homework\" today 9am 90m").expect("ok");
        assert_eq!(
            cmd,
            Command::Move {
                title: "Homework".to_owned(),
                day: DayRef::Today,
                time: NaiveTime::from_hms_opt(9, 0, 0).expect("valid"),
                minutes: Some(90),
            }
        );
    }

    #[test]
    fn add_rejects_missing_pieces() {
        assert!(parse("add Homework 60m").is_err());
        assert!(parse("add \"Homework\"").is_err());
        assert!(parse("add \"Homework\" 0m").is_err());
        assert!(parse("add \"Homework\" 60m someday").is_err());
    }

    #[test]
    fn time_tokens() {
        assert_eq!(parse_time_token("19:00"), NaiveTime::from_hms_opt(19, 0, 0));
        assert_eq!(parse_time_token("7pm"), NaiveTime::from_hms_opt(19, 0, 0));
        assert_eq!(parse_time_token("12am"), NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(parse_time_token("12pm"), NaiveTime::from_hms_opt(12, 0, 0));
        assert_eq!(parse_time_token("9:45am"), NaiveTime::from_hms_opt(9, 45, 0));
        assert!(parse_time_token("25:00").is_none());
        assert!(parse_time_token("noonish").is_none());
    }

    #[test]
    fn unknown_verbs_are_distinguished_from_malformed_commands() {
        assert!(matches!(
            parse("banana"),
            Err(CommandParseError::UnknownVerb(verb)) if verb == "banana"
        ));
        assert!(matches!(
            parse("mark cse312 homework as done"),
            Err(CommandParseError::UnknownVerb(_))
        ));
        assert!(matches!(
            parse("add Homework 60m"),
            Err(CommandParseError::Malformed(_))
        ));
        let err = parse("banana").expect_err("should fail");
        assert!(err.to_string().contains("help"));
    }
}
