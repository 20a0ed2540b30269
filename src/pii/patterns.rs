//! Lexical PII detectors: regex patterns for structured entities, plus an
//! NLP entity provider for free-text PERSON/LOCATION/ORGANIZATION spans
//! (spec §4.6).

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::config::PiiConfig;
use crate::error::PiiError;
use crate::types::{PiiEntity, PiiEntityType};

use super::checksums;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b[a-z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)+\b").unwrap());

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\+?\d{1,3}[\s.-]?)?(?:\(\d{2,4}\)[\s.-]?)?\d{3}[\s.-]?\d{3}[\s.-]?\d{3,4}\b").unwrap());

static IBAN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b").unwrap());

static CREDIT_CARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]?){12,19}\b").unwrap());

static IP_ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|[01]?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d?\d)\b").unwrap()
});

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bhttps?://[^\s<>\x22]+").unwrap());

static PL_NIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{3}[- ]?\d{3}[- ]?\d{2}[- ]?\d{2}\b").unwrap());
static PL_PESEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{11}\b").unwrap());
static PL_REGON9_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{9}\b").unwrap());
static PL_REGON14_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{14}\b").unwrap());

fn only_digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Run the full family of regex + checksum detectors over `text`, returning
/// entities with code-point spans. Checksum-backed categories (IBAN, credit
/// card, Polish IDs) are emitted only when the checksum passes.
pub fn scan_patterns(text: &str) -> Vec<PiiEntity> {
    let mut entities = Vec::new();
    let char_indices: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let byte_to_char = |byte_pos: usize| -> usize {
        char_indices.partition_point(|&b| b < byte_pos)
    };

    let mut push = |m: regex::Match, entity_type: PiiEntityType, score: f64, validated: bool| {
        entities.push(PiiEntity {
            entity_type,
            start: byte_to_char(m.start()),
            end: byte_to_char(m.end()),
            score,
            validated,
        });
    };

    for m in EMAIL_RE.find_iter(text) {
        push(m, PiiEntityType::Email, 0.95, true);
    }
    for m in URL_RE.find_iter(text) {
        push(m, PiiEntityType::Url, 0.9, true);
    }
    for m in IP_ADDRESS_RE.find_iter(text) {
        push(m, PiiEntityType::IpAddress, 0.85, true);
    }
    for m in IBAN_RE.find_iter(text) {
        if checksums::iban_valid(m.as_str()) {
            push(m, PiiEntityType::Iban, 0.97, true);
        }
    }
    for m in CREDIT_CARD_RE.find_iter(text) {
        if checksums::luhn_valid(&only_digits(m.as_str())) {
            push(m, PiiEntityType::CreditCard, 0.97, true);
        }
    }
    for m in PHONE_RE.find_iter(text) {
        let digits = only_digits(m.as_str());
        if digits.len() >= 7 && digits.len() <= 15 {
            push(m, PiiEntityType::Phone, 0.7, false);
        }
    }
    for m in PL_NIP_RE.find_iter(text) {
        if checksums::pl_nip_valid(&only_digits(m.as_str())) {
            push(m, PiiEntityType::PlNip, 0.95, true);
        }
    }
    for m in PL_PESEL_RE.find_iter(text) {
        if checksums::pl_pesel_valid(m.as_str()) {
            push(m, PiiEntityType::PlPesel, 0.95, true);
        }
    }
    for m in PL_REGON14_RE.find_iter(text) {
        if checksums::pl_regon14_valid(m.as_str()) {
            push(m, PiiEntityType::PlRegon14, 0.95, true);
        }
    }
    for m in PL_REGON9_RE.find_iter(text) {
        if checksums::pl_regon9_valid(m.as_str()) {
            push(m, PiiEntityType::PlRegon9, 0.95, true);
        }
    }

    entities
}

/// Free-text named-entity recognition (PERSON / LOCATION / ORGANIZATION),
/// the only category that cannot be resolved by regex + checksum. When
/// unreachable the caller falls back to regex-only detection without
/// degrading the overall verdict (spec §4.6).
#[async_trait]
pub trait NlpEntityProvider: Send + Sync {
    async fn extract_entities(&self, text: &str, language: &str) -> Result<Vec<PiiEntity>, PiiError>;
}

pub struct HttpNlpEntityProvider {
    client: reqwest::Client,
    config: PiiConfig,
}

impl HttpNlpEntityProvider {
    pub fn new(config: PiiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(serde::Serialize)]
struct EntitiesRequest<'a> {
    text: &'a str,
    language: &'a str,
}

#[derive(serde::Deserialize)]
struct EntityRow {
    #[serde(rename = "type")]
    kind: String,
    start: usize,
    end: usize,
    score: f64,
}

#[derive(serde::Deserialize)]
struct EntitiesResponse {
    entities: Vec<EntityRow>,
}

#[async_trait]
impl NlpEntityProvider for HttpNlpEntityProvider {
    async fn extract_entities(&self, text: &str, language: &str) -> Result<Vec<PiiEntity>, PiiError> {
        let resp = self
            .client
            .post(&self.config.nlp_endpoint)
            .timeout(std::time::Duration::from_millis(self.config.nlp_timeout_ms))
            .json(&EntitiesRequest { text, language })
            .send()
            .await
            .map_err(|e| PiiError::NlpServiceUnreachable(e.to_string()))?;

        let body: EntitiesResponse = resp
            .json()
            .await
            .map_err(|e| PiiError::NlpServiceUnreachable(e.to_string()))?;

        let entities = body
            .entities
            .into_iter()
            .filter_map(|row| {
                let entity_type = match row.kind.as_str() {
                    "PERSON" => PiiEntityType::Person,
                    "LOCATION" => PiiEntityType::Location,
                    "ORGANIZATION" => PiiEntityType::Organization,
                    _ => return None,
                };
                Some(PiiEntity {
                    entity_type,
                    start: row.start,
                    end: row.end,
                    score: row.score,
                    validated: false,
                })
            })
            .collect();
        Ok(entities)
    }
}

/// Deterministic mock for tests: a fixed gazetteer of first names, city
/// names, and org suffixes matched as whole words.
pub struct MockNlpEntityProvider {
    pub persons: Vec<&'static str>,
    pub locations: Vec<&'static str>,
    pub organizations: Vec<&'static str>,
    pub unreachable: bool,
}

impl Default for MockNlpEntityProvider {
    fn default() -> Self {
        Self {
            persons: vec!["John Smith", "Anna Kowalska"],
            locations: vec!["Warsaw", "New York"],
            organizations: vec!["Acme Corp", "Globex"],
            unreachable: false,
        }
    }
}

#[async_trait]
impl NlpEntityProvider for MockNlpEntityProvider {
    async fn extract_entities(&self, text: &str, _language: &str) -> Result<Vec<PiiEntity>, PiiError> {
        if self.unreachable {
            return Err(PiiError::NlpServiceUnreachable("request failed".to_string()));
        }
        let mut entities = Vec::new();
        let scan = |needles: &[&'static str], entity_type: PiiEntityType, entities: &mut Vec<PiiEntity>| {
            for needle in needles {
                if let Some(byte_pos) = text.find(needle) {
                    let start = text[..byte_pos].chars().count();
                    let end = start + needle.chars().count();
                    entities.push(PiiEntity {
                        entity_type,
                        start,
                        end,
                        score: 0.9,
                        validated: false,
                    });
                }
            }
        };
        scan(&self.persons, PiiEntityType::Person, &mut entities);
        scan(&self.locations, PiiEntityType::Location, &mut entities);
        scan(&self.organizations, PiiEntityType::Organization, &mut entities);
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_email() {
        let entities = scan_patterns("contact me at jane.doe@example.com please");
        assert!(entities.iter().any(|e| e.entity_type == PiiEntityType::Email));
    }

    #[test]
    fn detects_url() {
        let entities = scan_patterns("see https://example.com/path?q=1 for details");
        assert!(entities.iter().any(|e| e.entity_type == PiiEntityType::Url));
    }

    #[test]
    fn detects_ip_address() {
        let entities = scan_patterns("server at 192.168.1.100 is down");
        assert!(entities.iter().any(|e| e.entity_type == PiiEntityType::IpAddress));
    }

    #[test]
    fn rejects_credit_card_with_bad_checksum() {
        let entities = scan_patterns("card 4532015112830367 is invalid");
        assert!(!entities.iter().any(|e| e.entity_type == PiiEntityType::CreditCard));
    }

    #[test]
    fn accepts_credit_card_with_valid_checksum() {
        let entities = scan_patterns("card 4532015112830366 on file");
        assert!(entities.iter().any(|e| e.entity_type == PiiEntityType::CreditCard));
    }

    #[test]
    fn accepts_valid_iban() {
        let entities = scan_patterns("transfer to GB29NWBK60161331926819 now");
        assert!(entities.iter().any(|e| e.entity_type == PiiEntityType::Iban));
    }

    #[test]
    fn rejects_invalid_pesel() {
        let entities = scan_patterns("pesel 44051401459 on record");
        assert!(!entities.iter().any(|e| e.entity_type == PiiEntityType::PlPesel));
    }

    #[test]
    fn accepts_valid_pesel() {
        let entities = scan_patterns("pesel 44051401458 on record");
        assert!(entities.iter().any(|e| e.entity_type == PiiEntityType::PlPesel));
    }

    #[test]
    fn spans_are_char_positions_not_byte_positions() {
        // "Zażółć" has multi-byte UTF-8 chars preceding the email.
        let text = "Zażółć gęślą jaźń: test@example.com";
        let entities = scan_patterns(text);
        let email = entities.iter().find(|e| e.entity_type == PiiEntityType::Email).unwrap();
        let chars: Vec<char> = text.chars().collect();
        let extracted: String = chars[email.start..email.end].iter().collect();
        assert_eq!(extracted, "test@example.com");
    }

    #[tokio::test]
    async fn mock_nlp_provider_detects_person() {
        let provider = MockNlpEntityProvider::default();
        let entities = provider.extract_entities("My name is John Smith.", "en").await.unwrap();
        assert!(entities.iter().any(|e| e.entity_type == PiiEntityType::Person));
    }

    #[tokio::test]
    async fn mock_nlp_provider_unreachable_errors() {
        let provider = MockNlpEntityProvider {
            unreachable: true,
            ..MockNlpEntityProvider::default()
        };
        assert!(provider.extract_entities("anything", "en").await.is_err());
    }
}
