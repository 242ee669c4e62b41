//! Digest splitting: fan a bulleted digest body out into one update per
//! bullet, with synthetic per-bullet message ids.

/// True when the subject marks a digest-style message.
pub fn is_digest_subject(subject: &str) -> bool {
    let lower = subject.to_lowercase();
    lower.contains("digest") || lower.contains("summary")
}

/// Extract bullet lines from a digest body.
///
/// A bullet line starts (after leading whitespace) with `-`, `*`, `•`, or a
/// number followed by `.` or `)`. Returns the bullet text with the marker
/// stripped. Fewer than two bullets means the body is not a real digest and
/// the caller should keep it whole.
pub fn split_bullets(body: &str) -> Vec<String> {
    body.lines().filter_map(bullet_text).collect()
}

fn bullet_text(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    for marker in ["-", "*", "\u{2022}"] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            let text = rest.trim();
            if !text.is_empty() {
                return Some(text.to_owned());
            }
            return None;
        }
    }
    // Numbered bullets: "1." or "1)".
    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let rest = trimmed.get(digits.len()..)?;
    let rest = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')'))?;
    let text = rest.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_owned())
    }
}

/// Synthetic message id for bullet `n` (1-based) of a digest.
///
/// Keeps per-update idempotency under the `(source, message_id)` unique
/// index across re-ingests of the same digest.
pub fn synthetic_message_id(message_id: &str, n: usize) -> String {
    format!("{message_id}-{n}")
}
