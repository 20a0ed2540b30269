//! PII detector and redactor (spec §4.6). Runs after the arbiter's
//! pre-PII verdict, never before — a BLOCKED request is never redacted,
//! only reported.

pub mod checksums;
pub mod patterns;

use std::sync::Arc;

use crate::config::PiiConfig;
use crate::types::PiiEntity;

use self::patterns::NlpEntityProvider;

pub struct PiiDetector {
    nlp: Arc<dyn NlpEntityProvider>,
    config: PiiConfig,
}

/// Outcome of a redaction pass: the entities found (post overlap
/// resolution) and the text with each span replaced by its token.
pub struct RedactionResult {
    pub entities: Vec<PiiEntity>,
    pub redacted_text: String,
    /// Set when the NLP entity service was unreachable and detection fell
    /// back to regex + checksum only (spec §4.6: detector degrades without
    /// degrading the overall verdict).
    pub degraded: bool,
}

impl PiiDetector {
    pub fn new(nlp: Arc<dyn NlpEntityProvider>, config: PiiConfig) -> Self {
        Self { nlp, config }
    }

    pub async fn detect_and_redact(&self, text: &str) -> RedactionResult {
        let mut entities = patterns::scan_patterns(text);

        let mut degraded = false;
        match self.nlp.extract_entities(text, &self.config.language).await {
            Ok(nlp_entities) => entities.extend(nlp_entities),
            Err(_) => degraded = true,
        }

        apply_label_keyword_boost(&mut entities, text, &self.config);

        let resolved = resolve_overlaps(entities);
        let redacted_text = redact(text, &resolved);

        RedactionResult {
            entities: resolved,
            redacted_text,
            degraded,
        }
    }
}

/// Entities whose span sits within `label_keyword_window_chars` of their own
/// label word (e.g. "email:", "phone:") get a confidence boost — the label
/// disambiguates an otherwise-ambiguous numeric span (spec §4.6).
fn apply_label_keyword_boost(entities: &mut [PiiEntity], text: &str, config: &PiiConfig) {
    let chars: Vec<char> = text.chars().collect();
    let lower: Vec<char> = chars.iter().flat_map(|c| c.to_lowercase()).collect();
    let lower_str: String = lower.iter().collect();

    for entity in entities.iter_mut() {
        let keyword = match entity.entity_type.label().to_lowercase().as_str() {
            "email" => "email",
            "phone" => "phone",
            "iban" => "iban",
            "credit_card" => "card",
            "pl_nip" => "nip",
            "pl_pesel" => "pesel",
            "pl_regon9" | "pl_regon14" => "regon",
            _ => continue,
        };
        let window = config.label_keyword_window_chars;
        let start = entity.start.saturating_sub(window);
        let end = (entity.end + window).min(lower.len());
        if start >= lower.len() {
            continue;
        }
        let context: String = lower[start..end.max(start)].iter().collect();
        if context.contains(keyword) {
            entity.score = (entity.score + config.label_keyword_boost).min(1.0);
        }
    }
    let _ = lower_str;
}

/// Greedy overlap resolution: sort by score desc, span length desc, start
/// asc; accept an entity only if it doesn't overlap an already-accepted
/// span (spec §4.6).
fn resolve_overlaps(mut entities: Vec<PiiEntity>) -> Vec<PiiEntity> {
    entities.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap()
            .then_with(|| b.span_len().cmp(&a.span_len()))
            .then_with(|| a.start.cmp(&b.start))
    });

    let mut accepted: Vec<PiiEntity> = Vec::new();
    for candidate in entities {
        let overlaps = accepted
            .iter()
            .any(|a| candidate.start < a.end && a.start < candidate.end);
        if !overlaps {
            accepted.push(candidate);
        }
    }
    accepted.sort_by_key(|e| e.start);
    accepted
}

/// Replace each accepted span with its redaction token, right-to-left so
/// earlier spans' byte offsets stay valid as later ones are rewritten.
fn redact(text: &str, entities: &[PiiEntity]) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    for entity in entities.iter().rev() {
        let token: Vec<char> = entity.entity_type.token().chars().collect();
        chars.splice(entity.start..entity.end, token);
    }
    chars.into_iter().collect()
}
