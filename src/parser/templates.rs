//! Deterministic template classification over sender and subject.
//!
//! String matching only — no network, no model. Priority order within a
//! family: first match wins.

/// Known message templates, as stable string names.
pub const PIAZZA_DIGEST: &str = "piazza_digest";
pub const PIAZZA_REALTIME: &str = "piazza_realtime";
pub const PIAZZA_GENERIC: &str = "piazza_generic";
pub const UBLEARNS_ASSIGNMENT: &str = "ublearns_assignment";
pub const UBLEARNS_QUIZ: &str = "ublearns_quiz";
pub const UBLEARNS_ANNOUNCEMENT: &str = "ublearns_announcement";
pub const UBLEARNS_GENERIC: &str = "ublearns_generic";
pub const UNKNOWN: &str = "unknown";

/// Classify a message into a template by sender and subject.
pub fn classify(sender: &str, subject: &str) -> &'static str {
    let sender = sender.to_lowercase();
    let subject = subject.to_lowercase();

    if sender.contains("piazza") {
        if subject.contains("digest") {
            return PIAZZA_DIGEST;
        }
        if subject.contains("new post")
            || subject.contains("new follow")
            || subject.contains("instructor")
            || subject.contains("response")
        {
            return PIAZZA_REALTIME;
        }
        return PIAZZA_GENERIC;
    }

    if sender.contains("buffalo.edu") || sender.contains("ublearns") || sender.contains("brightspace")
    {
        if subject.contains("assignment") {
            return UBLEARNS_ASSIGNMENT;
        }
        if subject.contains("quiz") || subject.contains("test") || subject.contains("exam") {
            return UBLEARNS_QUIZ;
        }
        if subject.contains("announcement") {
            return UBLEARNS_ANNOUNCEMENT;
        }
        return UBLEARNS_GENERIC;
    }

    UNKNOWN
}
