//! Due-date phrase parsing: turns the raw extracted phrase into a local
//! wall-clock deadline.
//!
//! The raw phrase stays on the update card as evidence; this parsed value
//! only feeds task drafts.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;

static PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:due|by)\s+(?:on\s+)?([a-z]{3,9})\s+(\d{1,2})(?:,\s*(\d{4}))?(?:\s+at\s+(\d{1,2}):?(\d{0,2})\s*(am|pm)?)?",
    )
    .expect("valid phrase regex")
});

/// Deadline hour used when the phrase carries no time of day.
const DEFAULT_HOUR: u32 = 23;
const DEFAULT_MINUTE: u32 = 59;

/// Parse a due-date phrase into a local deadline.
///
/// `reference` anchors year inference: a month/day with no year resolves to
/// its next occurrence on or after the reference date.
pub fn parse_due_phrase(phrase: &str, reference: NaiveDate) -> Option<NaiveDateTime> {
    let caps = PHRASE_RE.captures(phrase)?;
    let month = month_number(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;

    let (hour, minute) = match caps.get(4) {
        Some(h) => {
            let raw_hour: u32 = h.as_str().parse().ok()?;
            let minute: u32 = match caps.get(5).map(|m| m.as_str()) {
                Some("") | None => 0,
                Some(m) => m.parse().ok()?,
            };
            let hour = match caps.get(6).map(|m| m.as_str().to_lowercase()) {
                Some(ref meridiem) if meridiem == "pm" && raw_hour < 12 => raw_hour.checked_add(12)?,
                Some(ref meridiem) if meridiem == "am" && raw_hour == 12 => 0,
                _ => raw_hour,
            };
            (hour, minute)
        }
        None => (DEFAULT_HOUR, DEFAULT_MINUTE),
    };

    let year = match caps.get(3) {
        Some(y) => y.as_str().parse().ok()?,
        None => infer_year(month, day, reference)?,
    };

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
}

/// Next occurrence of `month/day` on or after the reference date.
fn infer_year(month: u32, day: u32, reference: NaiveDate) -> Option<i32> {
    let this_year = reference.year();
    match NaiveDate::from_ymd_opt(this_year, month, day) {
        Some(candidate) if candidate >= reference => Some(this_year),
        _ => {
            let next = this_year.checked_add(1)?;
            NaiveDate::from_ymd_opt(next, month, day).map(|_| next)
        }
    }
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let months = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    months
        .iter()
        .position(|m| lower.starts_with(m))
        .and_then(|idx| u32::try_from(idx.saturating_add(1)).ok())
}
