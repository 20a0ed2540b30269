//! The twelve-rule classification ladder (spec §4.3, v2.3 generation —
//! see DESIGN.md "Open Questions" for why v2.3 over the five-tier v2.0).
//!
//! Rules are evaluated in declaration order; the first match wins. A
//! single threshold on `delta` alone misclassifies either Polish
//! jailbreaks (lexical overlap with Polish instruction corpora) or narrow
//! educational queries (lexical overlap with extraction attacks); each
//! tier pins one named failure mode instead.

use crate::config::SemanticThresholds;
use crate::types::{SemanticMatch, TwoPhaseClassification, TwoPhaseOutcome};

const INSTRUCTION_SUBCATEGORIES: &[&str] = &["programming", "instruction", "alpaca", "code", "general"];

fn is_instruction_type(subcategory: &str) -> bool {
    INSTRUCTION_SUBCATEGORIES.contains(&subcategory)
}

fn is_security_education(subcategory: &str) -> bool {
    subcategory.contains("security_education")
}

/// Run the two-phase classifier given the raw top-K matches from both
/// sides of the dual HNSW query.
pub fn classify(
    attack_matches: &[SemanticMatch],
    safe_matches: &[SemanticMatch],
    thresholds: &SemanticThresholds,
    single_side_fallback: bool,
) -> TwoPhaseOutcome {
    let attack_max = attack_matches.iter().map(|m| m.similarity).fold(0.0_f64, f64::max);
    let safe_max = safe_matches.iter().map(|m| m.similarity).fold(0.0_f64, f64::max);
    let delta = attack_max - safe_max;

    let top_safe_subcategory = safe_matches.first().map(|m| m.subcategory.as_str()).unwrap_or("");
    let instruction_type = is_instruction_type(top_safe_subcategory);
    let security_education = is_security_education(top_safe_subcategory);

    let adjusted_delta = if instruction_type && !security_education {
        delta + thresholds.adjusted_delta_bonus
    } else {
        delta
    };

    let tau_s1 = if security_education {
        thresholds.tau_s1_security_ed
    } else if instruction_type {
        thresholds.tau_s1_instruction
    } else {
        thresholds.tau_s1_other
    };

    let a1_safe_override =
        safe_max >= thresholds.a1_safe_override_safe_max_min && delta < thresholds.a1_safe_override_delta_max;
    let s2_safe_override = security_education && safe_max >= thresholds.s2_safe_max_min && delta < thresholds.s2_delta_max;

    let (classification, matched_rule) = if safe_max >= attack_max + tau_s1 && attack_max < thresholds.s1_attack_max_limit {
        (TwoPhaseClassification::Safe, "S1")
    } else if security_education && safe_max >= thresholds.s2_safe_max_min && delta < thresholds.s2_delta_max {
        (TwoPhaseClassification::Safe, "S2")
    } else if instruction_type && delta < thresholds.s3_delta_max && attack_max < thresholds.s3_attack_max_limit {
        (TwoPhaseClassification::Safe, "S3")
    } else if !instruction_type
        && safe_max >= thresholds.s4_safe_max_min
        && delta < thresholds.s4_delta_max
        && attack_max < thresholds.s4_attack_max_limit
    {
        (TwoPhaseClassification::Safe, "S4")
    } else if attack_max >= thresholds.a1_attack_max_min && !a1_safe_override {
        (TwoPhaseClassification::Attack, "A1")
    } else if attack_max >= thresholds.a2_attack_max_min && instruction_type && !(a1_safe_override || s2_safe_override) {
        (TwoPhaseClassification::Attack, "A2")
    } else if attack_max >= thresholds.a3_attack_max_min && instruction_type && delta > thresholds.a3_delta_min {
        (TwoPhaseClassification::Attack, "A3")
    } else if attack_max >= thresholds.a4a_attack_max_min && delta > thresholds.a4a_delta_min {
        (TwoPhaseClassification::Attack, "A4a")
    } else if attack_max >= thresholds.a4b_attack_max_min && instruction_type && delta > thresholds.a4b_delta_min {
        (TwoPhaseClassification::Attack, "A4b")
    } else if attack_max >= thresholds.a5_attack_max_min && delta > thresholds.a5_delta_min {
        (TwoPhaseClassification::Attack, "A5")
    } else if attack_max >= thresholds.a6_attack_max_min && delta > thresholds.a6_delta_min {
        (TwoPhaseClassification::Attack, "A6")
    } else if security_education && safe_max < thresholds.b1_safe_max_max && attack_max >= thresholds.b1_attack_max_min {
        (TwoPhaseClassification::Attack, "B1")
    } else if (thresholds.b2_attack_max_min..thresholds.b2_attack_max_max).contains(&attack_max)
        && instruction_type
        && delta > thresholds.b2_delta_min
    {
        (TwoPhaseClassification::Attack, "B2")
    } else {
        (TwoPhaseClassification::Safe, "default")
    };

    let confidence = (delta.abs() * 10.0).min(1.0);

    let score_top3 = |matches: &[SemanticMatch]| matches.iter().take(3).cloned().collect::<Vec<_>>();

    TwoPhaseOutcome {
        classification,
        attack_max_sim: attack_max,
        safe_max_sim: safe_max,
        delta,
        adjusted_delta,
        safe_is_instruction_type: instruction_type,
        safe_is_security_education: security_education,
        attack_matches: score_top3(attack_matches),
        safe_matches: score_top3(safe_matches),
        confidence,
        matched_rule,
        single_side_fallback,
    }
}
