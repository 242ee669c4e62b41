//! Tag and due-date-phrase extraction over subject and body text.

use std::sync::LazyLock;

use regex::Regex;

/// Course codes like `cse 312` / `CSE312`.
static COURSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z]{3}\s?\d{3}\b").expect("valid course regex"));

/// Due-date phrases like `due on March 2 at 11:59pm` / `by Friday ...` — the
/// month-name form only; the raw phrase is kept as evidence.
static DUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)((due|by)\s+(on\s+)?[a-z]{3,9}\s+\d{1,2}(,\s*\d{4})?(\s+at\s+\d{1,2}:?\d{0,2}\s*(am|pm)?)?)",
    )
    .expect("valid due-date regex")
});

/// Extract `course:<CODE>` tags, uppercased with spaces stripped, in order of
/// first appearance without duplicates.
pub fn course_tags(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut tags = Vec::new();
    for m in COURSE_RE.find_iter(&lower) {
        let code: String = m
            .as_str()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();
        let tag = format!("course:{code}");
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Choose at most one `type:` tag by keyword precedence:
/// assignment > quiz > response_required > announcement.
pub fn type_tag(subject: &str, body: &str) -> Option<String> {
    let haystack = format!("{} {}", subject.to_lowercase(), body.to_lowercase());
    if haystack.contains("assignment") || haystack.contains("homework") || haystack.contains("problem set")
    {
        return Some("type:assignment".to_owned());
    }
    if haystack.contains("quiz") || haystack.contains("exam") || haystack.contains("midterm") {
        return Some("type:quiz".to_owned());
    }
    if haystack.contains("reply") || haystack.contains("respond") || haystack.contains("rsvp") {
        return Some("type:response_required".to_owned());
    }
    if haystack.contains("announcement") || haystack.contains("reminder") {
        return Some("type:announcement".to_owned());
    }
    None
}

/// The first due-date phrase found in subject or body, raw.
pub fn due_phrase(subject: &str, body: &str) -> Option<String> {
    DUE_RE
        .find(subject)
        .or_else(|| DUE_RE.find(body))
        .map(|m| m.as_str().to_owned())
}
