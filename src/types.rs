//! Core data model shared across the detection pipeline: the normalized
//! input, the uniform per-branch result contract, the semantic two-phase
//! outcome, the arbiter's verdict, PII entities, and the event record
//! written to the analytical store. See spec §3.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Two-letter language code inferred by the normalizer or supplied by the
/// caller. The pipeline only distinguishes Polish and English; anything
/// else collapses to `En` at the edges (ingress extraction, normalizer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lang {
    Pl,
    En,
}

impl Lang {
    pub fn as_str(self) -> &'static str {
        match self {
            Lang::Pl => "pl",
            Lang::En => "en",
        }
    }
}

impl std::str::FromStr for Lang {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pl" => Ok(Lang::Pl),
            "en" => Ok(Lang::En),
            _ => Err(()),
        }
    }
}

/// One recovered hidden layer (comment block or decoded base64/hex run)
/// surfaced by the normalizer so downstream branches see it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLayer {
    pub encoding: DecodedEncoding,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedEncoding {
    Comment,
    Base64,
    Hex,
}

impl DecodedEncoding {
    pub fn tag(self) -> &'static str {
        match self {
            DecodedEncoding::Comment => "comment",
            DecodedEncoding::Base64 => "base64",
            DecodedEncoding::Hex => "hex",
        }
    }
}

/// Output of the Normalizer. Immutable once produced; the superset of the
/// attacker-visible text (original plus recovered hidden layers).
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedInput {
    pub raw: String,
    pub normalized: String,
    pub decoded_layers: Vec<DecodedLayer>,
    pub lang: Lang,
}

/// Stable branch identity. Used as a map key in `branch_scores` and as a
/// discriminant in `BranchResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchId {
    A,
    B,
    C,
}

impl BranchId {
    pub fn as_str(self) -> &'static str {
        match self {
            BranchId::A => "A",
            BranchId::B => "B",
            BranchId::C => "C",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
}

impl ThreatLevel {
    /// Derive the threat level from a score per spec §3's invariant:
    /// `score>=70 => HIGH`, `40<=score<70 => MEDIUM`, `score<40 => LOW`.
    pub fn from_score(score: u8) -> Self {
        if score >= 70 {
            ThreatLevel::High
        } else if score >= 40 {
            ThreatLevel::Medium
        } else {
            ThreatLevel::Low
        }
    }
}

/// Named, branch-specific booleans the arbiter is contractually allowed to
/// inspect. Never read the `features` blob for decisioning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CriticalSignals {
    /// Branch A: a category crossed its critical sub-threshold.
    pub pattern_hit_high: bool,
    /// Branch B: `attack_max >= high_similarity_threshold`.
    pub high_similarity: bool,
    /// Branch C: `risk >= 0.90`.
    pub model_high_risk: bool,
}

/// Uniform per-branch output (spec §3). Every orchestrator invocation
/// produces exactly three of these, one per `BranchId`.
#[derive(Debug, Clone)]
pub struct BranchResult {
    pub branch_id: BranchId,
    pub score: u8,
    pub threat_level: ThreatLevel,
    pub confidence: f64,
    pub critical_signals: CriticalSignals,
    /// Opaque diagnostics, ignored by the arbiter; only used by the event
    /// sink and tests.
    pub features: HashMap<String, serde_json::Value>,
    pub timing_ms: u64,
    pub degraded: bool,
}

impl BranchResult {
    /// Build a well-formed, non-degraded result, deriving `threat_level`
    /// from `score` so the two can never drift apart.
    pub fn new(
        branch_id: BranchId,
        score: u8,
        confidence: f64,
        critical_signals: CriticalSignals,
        features: HashMap<String, serde_json::Value>,
        timing_ms: u64,
    ) -> Self {
        Self {
            branch_id,
            score,
            threat_level: ThreatLevel::from_score(score),
            confidence,
            critical_signals,
            features,
            timing_ms,
            degraded: false,
        }
    }

    /// A branch that failed or timed out: `score=0`, `threat_level=LOW`,
    /// no critical signals, per spec §3.
    pub fn degraded(branch_id: BranchId, timing_ms: u64) -> Self {
        Self {
            branch_id,
            score: 0,
            threat_level: ThreatLevel::Low,
            confidence: 0.0,
            critical_signals: CriticalSignals::default(),
            features: HashMap::new(),
            timing_ms,
            degraded: true,
        }
    }
}

/// One vector-store hit, from either the attack or safe corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticMatch {
    pub pattern_id: String,
    pub category: String,
    pub subcategory: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoPhaseClassification {
    Safe,
    Attack,
    Unknown,
}

/// Full result of Branch B's two-phase classifier, embedded into the
/// branch's `features` for diagnostics (spec §3).
#[derive(Debug, Clone)]
pub struct TwoPhaseOutcome {
    pub classification: TwoPhaseClassification,
    pub attack_max_sim: f64,
    pub safe_max_sim: f64,
    pub delta: f64,
    pub adjusted_delta: f64,
    pub safe_is_instruction_type: bool,
    pub safe_is_security_education: bool,
    pub attack_matches: Vec<SemanticMatch>,
    pub safe_matches: Vec<SemanticMatch>,
    pub confidence: f64,
    /// Which classification rule (S1..B2, or "default") produced the
    /// result. Diagnostic only; never read by the arbiter.
    pub matched_rule: &'static str,
    /// Set when the safe-side HNSW query failed and we fell back to
    /// single-side scoring against the attack corpus only (spec §4.3).
    pub single_side_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalStatus {
    Allowed,
    Sanitized,
    Blocked,
}

impl FinalStatus {
    pub fn as_action(self) -> &'static str {
        match self {
            FinalStatus::Allowed => "allow",
            FinalStatus::Sanitized => "sanitize",
            FinalStatus::Blocked => "block",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Arbiter,
    CriticalOverride,
    UnanimousLow,
    DegradationFloor,
}

impl DecisionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionSource::Arbiter => "arbiter",
            DecisionSource::CriticalOverride => "critical_override",
            DecisionSource::UnanimousLow => "unanimous_low",
            DecisionSource::DegradationFloor => "degradation_floor",
        }
    }
}

/// Named priority boost IDs from spec §4.5, recorded on the verdict so
/// the event record shows exactly which rules fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoostId {
    ConservativeOverride,
    HighSimilarity,
    LlmGuardVeto,
    PatternHitHigh,
    UnanimousLow,
}

impl BoostId {
    pub fn as_str(self) -> &'static str {
        match self {
            BoostId::ConservativeOverride => "CONSERVATIVE_OVERRIDE",
            BoostId::HighSimilarity => "HIGH_SIMILARITY",
            BoostId::LlmGuardVeto => "LLM_GUARD_VETO",
            BoostId::PatternHitHigh => "PATTERN_HIT_HIGH",
            BoostId::UnanimousLow => "UNANIMOUS_LOW",
        }
    }
}

/// The arbiter's fused decision (spec §3).
#[derive(Debug, Clone)]
pub struct ArbiterVerdict {
    pub final_status: FinalStatus,
    pub combined_score: u8,
    pub boosts_applied: Vec<BoostId>,
    pub branch_scores: HashMap<BranchId, u8>,
    pub decision_source: DecisionSource,
    /// Pre-PII status: what the arbiter decided before the PII detector
    /// ran. Drives whether the orchestrator invokes the PII detector at
    /// all (only on a non-BLOCKED pre-PII verdict, spec §4.6).
    pub pre_pii_status: FinalStatus,
    /// False when the degradation floor fired: the spec forbids SANITIZED
    /// "without a working signal source", so the orchestrator skips PII
    /// detection entirely rather than risk sanitizing on a guess.
    pub pii_eligible: bool,
}

/// One redacted entity (spec §3). Spans are UTF-8 code-point positions,
/// not byte offsets, so they remain stable across encodings.
#[derive(Debug, Clone, PartialEq)]
pub struct PiiEntity {
    pub entity_type: PiiEntityType,
    pub start: usize,
    pub end: usize,
    pub score: f64,
    pub validated: bool,
}

impl PiiEntity {
    pub fn span_len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PiiEntityType {
    Email,
    Phone,
    Iban,
    CreditCard,
    IpAddress,
    Url,
    Person,
    Location,
    Organization,
    PlNip,
    PlRegon9,
    PlRegon14,
    PlPesel,
}

impl PiiEntityType {
    /// Replacement token, e.g. `[EMAIL]`.
    pub fn token(self) -> &'static str {
        match self {
            PiiEntityType::Email => "[EMAIL]",
            PiiEntityType::Phone => "[PHONE]",
            PiiEntityType::Iban => "[IBAN]",
            PiiEntityType::CreditCard => "[CREDIT_CARD]",
            PiiEntityType::IpAddress => "[IP_ADDRESS]",
            PiiEntityType::Url => "[URL]",
            PiiEntityType::Person => "[PERSON]",
            PiiEntityType::Location => "[LOCATION]",
            PiiEntityType::Organization => "[ORGANIZATION]",
            PiiEntityType::PlNip => "[PL_NIP]",
            PiiEntityType::PlRegon9 => "[PL_REGON]",
            PiiEntityType::PlRegon14 => "[PL_REGON]",
            PiiEntityType::PlPesel => "[PL_PESEL]",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PiiEntityType::Email => "EMAIL",
            PiiEntityType::Phone => "PHONE",
            PiiEntityType::Iban => "IBAN",
            PiiEntityType::CreditCard => "CREDIT_CARD",
            PiiEntityType::IpAddress => "IP_ADDRESS",
            PiiEntityType::Url => "URL",
            PiiEntityType::Person => "PERSON",
            PiiEntityType::Location => "LOCATION",
            PiiEntityType::Organization => "ORGANIZATION",
            PiiEntityType::PlNip => "PL_NIP",
            PiiEntityType::PlRegon9 => "PL_REGON9",
            PiiEntityType::PlRegon14 => "PL_REGON14",
            PiiEntityType::PlPesel => "PL_PESEL",
        }
    }
}

/// One row written to the analytical store, once, never mutated.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub request_id: String,
    pub client_id: String,
    /// Truncated to 500 chars for storage; hashed in full separately.
    pub normalized_truncated: String,
    pub normalized_full_len: usize,
    pub branch_results: Vec<BranchResult>,
    pub verdict: ArbiterVerdict,
    pub pii_entity_types: Vec<PiiEntityType>,
    pub pii_entity_count: usize,
    pub pipeline_version: String,
    pub total_timing: Duration,
    pub degraded_branch_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threat_level_boundaries() {
        assert_eq!(ThreatLevel::from_score(0), ThreatLevel::Low);
        assert_eq!(ThreatLevel::from_score(39), ThreatLevel::Low);
        assert_eq!(ThreatLevel::from_score(40), ThreatLevel::Medium);
        assert_eq!(ThreatLevel::from_score(69), ThreatLevel::Medium);
        assert_eq!(ThreatLevel::from_score(70), ThreatLevel::High);
        assert_eq!(ThreatLevel::from_score(100), ThreatLevel::High);
    }

    #[test]
    fn degraded_result_has_zero_score_and_low_threat() {
        let r = BranchResult::degraded(BranchId::B, 25);
        assert_eq!(r.score, 0);
        assert_eq!(r.threat_level, ThreatLevel::Low);
        assert!(r.degraded);
        assert_eq!(r.timing_ms, 25);
        assert!(!r.critical_signals.high_similarity);
    }

    #[test]
    fn branch_result_new_derives_threat_level() {
        let r = BranchResult::new(
            BranchId::A,
            85,
            0.9,
            CriticalSignals {
                pattern_hit_high: true,
                ..Default::default()
            },
            HashMap::new(),
            3,
        );
        assert_eq!(r.threat_level, ThreatLevel::High);
        assert!(!r.degraded);
    }

    #[test]
    fn lang_round_trips_through_str() {
        assert_eq!("pl".parse::<Lang>().unwrap(), Lang::Pl);
        assert_eq!("en".parse::<Lang>().unwrap(), Lang::En);
        assert!("de".parse::<Lang>().is_err());
        assert_eq!(Lang::Pl.as_str(), "pl");
    }

    #[test]
    fn final_status_action_strings_are_lowercase() {
        assert_eq!(FinalStatus::Allowed.as_action(), "allow");
        assert_eq!(FinalStatus::Sanitized.as_action(), "sanitize");
        assert_eq!(FinalStatus::Blocked.as_action(), "block");
    }

    #[test]
    fn pii_entity_span_len() {
        let e = PiiEntity {
            entity_type: PiiEntityType::Email,
            start: 10,
            end: 25,
            score: 0.9,
            validated: true,
        };
        assert_eq!(e.span_len(), 15);
        assert_eq!(e.entity_type.token(), "[EMAIL]");
    }

    #[test]
    fn boost_id_strings_match_spec_names() {
        assert_eq!(BoostId::ConservativeOverride.as_str(), "CONSERVATIVE_OVERRIDE");
        assert_eq!(BoostId::LlmGuardVeto.as_str(), "LLM_GUARD_VETO");
        assert_eq!(BoostId::UnanimousLow.as_str(), "UNANIMOUS_LOW");
    }
}
