//! Deterministic parser pipeline: trusted-sender filtering, digest
//! splitting, template classification, rule-based field extraction, and
//! confidence scoring.
//!
//! A pure function over one [`InboundMessage`] — no network, no model, no
//! store access. The output is always non-empty.

pub mod dates;
pub mod digest;
pub mod tags;
pub mod templates;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::types::{InboundMessage, ParserMethod, Source, UpdateCard};

/// Base confidence before signal bonuses.
const BASE_CONFIDENCE: f64 = 0.50;
/// Bonus when a due-date phrase was found.
const DUE_BONUS: f64 = 0.25;
/// Bonus when a course tag was found.
const COURSE_BONUS: f64 = 0.20;
/// Bonus when the template classifier recognised the message.
const TEMPLATE_BONUS: f64 = 0.10;
/// Penalty when the card needs explicit confirmation.
const CONFIRMATION_PENALTY: f64 = 0.25;
/// Fixed confidence assigned to untrusted senders.
const UNTRUSTED_CONFIDENCE: f64 = 0.20;
/// Confidence ceiling; rule extraction never claims certainty.
const CONFIDENCE_CAP: f64 = 0.99;

/// One parsed update: the card plus the detected template and the raw
/// due-date phrase, when one was found.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUpdate {
    /// The normalized card. `account_id` is stamped by the ingestion service.
    pub card: UpdateCard,
    /// Detected template name (`piazza_digest`, `unknown`, ...).
    pub template: String,
    /// Raw due-date phrase, e.g. `due on March 2 at 11:59pm`.
    pub due_phrase: Option<String>,
}

/// The deterministic parser pipeline.
#[derive(Debug, Clone)]
pub struct ParserPipeline {
    trusted_senders: Vec<String>,
}

impl ParserPipeline {
    /// Build a pipeline with the configured trusted sender/domain substrings.
    pub fn new(trusted_senders: Vec<String>) -> Self {
        Self {
            trusted_senders: trusted_senders
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect(),
        }
    }

    /// True when the sender matches a trusted substring.
    pub fn is_trusted(&self, sender: &str) -> bool {
        let sender = sender.to_lowercase();
        self.trusted_senders.iter().any(|t| sender.contains(t))
    }

    /// Parse one message into a non-empty sequence of updates.
    ///
    /// Untrusted senders yield exactly one low-confidence card. Trusted
    /// digests with two or more bullets fan out into one card per bullet
    /// with synthetic `-N` message-id suffixes.
    pub fn parse(&self, source: Source, message: &InboundMessage) -> Vec<ParsedUpdate> {
        if !self.is_trusted(&message.from_address) {
            return vec![self.untrusted_card(source, message)];
        }

        let template = templates::classify(&message.from_address, &message.subject);

        if digest::is_digest_subject(&message.subject) {
            let bullets = digest::split_bullets(&message.body_text);
            if bullets.len() >= 2 {
                return bullets
                    .iter()
                    .enumerate()
                    .map(|(idx, bullet)| {
                        let n = idx.saturating_add(1);
                        self.scored_card(
                            source,
                            message,
                            template,
                            digest::synthetic_message_id(&message.message_id, n),
                            bullet,
                        )
                    })
                    .collect();
            }
        }

        vec![self.scored_card(
            source,
            message,
            template,
            message.message_id.clone(),
            &message.body_text,
        )]
    }

    /// Build the single low-confidence card for an untrusted sender.
    fn untrusted_card(&self, source: Source, message: &InboundMessage) -> ParsedUpdate {
        let card = UpdateCard {
            update_id: Uuid::new_v4().to_string(),
            account_id: String::new(),
            source,
            provider_message_id: message.message_id.clone(),
            provider_thread_id: message.thread_id.clone(),
            received_at_utc: message.received_at_utc,
            sender: message.from_address.clone(),
            subject: message.subject.clone(),
            body_text: message.body_text.clone(),
            links: message.links.clone(),
            tags: vec!["type:untrusted_source".to_owned()],
            parser_method: ParserMethod::RuleBased,
            parse_confidence: UNTRUSTED_CONFIDENCE,
            evidence: vec![format!("sender {:?} not in trusted list", message.from_address)],
            requires_confirmation: true,
            content_hash: content_hash(&message.body_text),
        };
        ParsedUpdate {
            card,
            template: templates::UNKNOWN.to_owned(),
            due_phrase: None,
        }
    }

    /// Extract, gate, and score one card over the given body slice.
    fn scored_card(
        &self,
        source: Source,
        message: &InboundMessage,
        template: &str,
        provider_message_id: String,
        body: &str,
    ) -> ParsedUpdate {
        let mut card_tags = tags::course_tags(&format!("{} {}", message.subject, body));
        let type_tag = tags::type_tag(&message.subject, body);
        if let Some(ref tag) = type_tag {
            card_tags.push(tag.clone());
        }
        let due_phrase = tags::due_phrase(&message.subject, body);

        let requires_confirmation = due_phrase.is_none()
            && (type_tag.as_deref() == Some("type:assignment")
                || template.contains("digest")
                || template == templates::UNKNOWN);

        let has_course = card_tags.iter().any(|t| t.starts_with("course:"));
        let mut confidence = BASE_CONFIDENCE;
        if due_phrase.is_some() {
            confidence += DUE_BONUS;
        }
        if has_course {
            confidence += COURSE_BONUS;
        }
        if template != templates::UNKNOWN {
            confidence += TEMPLATE_BONUS;
        }
        if requires_confirmation {
            confidence -= CONFIRMATION_PENALTY;
        }
        let confidence = confidence.clamp(0.0, CONFIDENCE_CAP);

        let mut evidence = vec![format!("template:{template}")];
        if let Some(ref phrase) = due_phrase {
            evidence.push(format!("due_phrase:{phrase}"));
        }
        for tag in &card_tags {
            evidence.push(format!("tag:{tag}"));
        }

        let card = UpdateCard {
            update_id: Uuid::new_v4().to_string(),
            account_id: String::new(),
            source,
            provider_message_id,
            provider_thread_id: message.thread_id.clone(),
            received_at_utc: message.received_at_utc,
            sender: message.from_address.clone(),
            subject: message.subject.clone(),
            body_text: body.to_owned(),
            links: message.links.clone(),
            tags: card_tags,
            parser_method: ParserMethod::RuleBased,
            parse_confidence: confidence,
            evidence,
            requires_confirmation,
            content_hash: content_hash(body),
        };
        ParsedUpdate {
            card,
            template: template.to_owned(),
            due_phrase,
        }
    }
}

/// SHA-256 of the body text, hex-encoded. Stable across processes and runs
/// for identical bytes.
pub fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
