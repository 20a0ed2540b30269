//! The Arbiter (spec §4.5): weighted fusion of three BranchResults,
//! ordered priority boosts, status mapping, and the degradation floor. A
//! pure function of its inputs — no I/O, no mutable state, fully
//! deterministic for a fixed config.

use std::collections::HashMap;

use crate::config::{ArbiterThresholds, BoostConfig, BranchWeights};
use crate::types::{BoostId, BranchId, BranchResult, DecisionSource, FinalStatus, ArbiterVerdict};

/// Run the fusion + boost ladder + status mapping + degradation floor over
/// exactly three branch results (one per [`BranchId`]).
pub fn decide(
    results: &[BranchResult; 3],
    weights: &BranchWeights,
    boosts: &BoostConfig,
    thresholds: &ArbiterThresholds,
) -> ArbiterVerdict {
    let by_id: HashMap<BranchId, &BranchResult> = results.iter().map(|r| (r.branch_id, r)).collect();
    let branch_scores: HashMap<BranchId, u8> = results.iter().map(|r| (r.branch_id, r.score)).collect();

    let degraded_count = results.iter().filter(|r| r.degraded).count();

    if degraded_count >= 2 {
        return degradation_floor_verdict(results, branch_scores, thresholds);
    }

    let weighted = weights.a * score_of(&by_id, BranchId::A) as f64
        + weights.b * score_of(&by_id, BranchId::B) as f64
        + weights.c * score_of(&by_id, BranchId::C) as f64;

    let mut combined = weighted.round().clamp(0.0, 100.0) as i32;
    let mut boosts_applied = Vec::new();

    // 1. Critical override: any non-degraded branch at or above the
    // configured minimum raises the floor.
    if boosts.conservative_override_enabled {
        let any_high = results
            .iter()
            .any(|r| !r.degraded && r.score >= boosts.conservative_override_branch_min);
        if any_high {
            combined = combined.max(boosts.conservative_override_floor as i32);
            boosts_applied.push(BoostId::ConservativeOverride);
        }
    }

    // 2. High similarity boost (Branch B signal).
    if boosts.high_similarity_boost_enabled {
        if let Some(b) = by_id.get(&BranchId::B) {
            if b.critical_signals.high_similarity {
                combined += boosts.high_similarity_boost_amount as i32;
                boosts_applied.push(BoostId::HighSimilarity);
            }
        }
    }

    // 3. Model high-risk veto (Branch C signal, only if C is alive).
    if boosts.llm_guard_veto_enabled {
        if let Some(c) = by_id.get(&BranchId::C) {
            if c.critical_signals.model_high_risk && !c.degraded {
                combined = combined.max(boosts.llm_guard_veto_floor as i32);
                boosts_applied.push(BoostId::LlmGuardVeto);
            }
        }
    }

    // 4. Pattern-hit-high (Branch A signal).
    if boosts.pattern_hit_high_enabled {
        if let Some(a) = by_id.get(&BranchId::A) {
            if a.critical_signals.pattern_hit_high {
                combined += boosts.pattern_hit_high_amount as i32;
                boosts_applied.push(BoostId::PatternHitHigh);
            }
        }
    }

    // 5. Unanimous low: clamp down when every branch agrees it's quiet and
    // nothing else raised a critical flag.
    if boosts.unanimous_low_enabled {
        let all_low = results.iter().all(|r| r.score <= boosts.unanimous_low_branch_max);
        let any_critical = results.iter().any(|r| {
            r.critical_signals.pattern_hit_high || r.critical_signals.high_similarity || r.critical_signals.model_high_risk
        });
        if all_low && !any_critical {
            combined = combined.min(boosts.unanimous_low_clamp as i32);
            boosts_applied.push(BoostId::UnanimousLow);
        }
    }

    let combined_score = combined.clamp(0, 100) as u8;

    let pre_pii_status = if combined_score >= thresholds.block_score {
        FinalStatus::Blocked
    } else {
        FinalStatus::Allowed
    };

    let decision_source = if boosts_applied
        .iter()
        .any(|b| matches!(b, BoostId::ConservativeOverride | BoostId::LlmGuardVeto))
    {
        DecisionSource::CriticalOverride
    } else if boosts_applied.contains(&BoostId::UnanimousLow) {
        DecisionSource::UnanimousLow
    } else {
        DecisionSource::Arbiter
    };

    ArbiterVerdict {
        final_status: pre_pii_status,
        combined_score,
        boosts_applied,
        branch_scores,
        decision_source,
        pre_pii_status,
        pii_eligible: true,
    }
}

fn score_of(by_id: &HashMap<BranchId, &BranchResult>, id: BranchId) -> u8 {
    by_id.get(&id).map(|r| r.score).unwrap_or(0)
}

fn degradation_floor_verdict(
    results: &[BranchResult; 3],
    branch_scores: HashMap<BranchId, u8>,
    thresholds: &ArbiterThresholds,
) -> ArbiterVerdict {
    let any_strong_signal = results.iter().any(|r| !r.degraded && r.score >= thresholds.block_score);
    let status = if any_strong_signal {
        FinalStatus::Blocked
    } else {
        FinalStatus::Allowed
    };
    let combined_score = results.iter().map(|r| r.score).max().unwrap_or(0);

    ArbiterVerdict {
        final_status: status,
        combined_score,
        boosts_applied: Vec::new(),
        branch_scores,
        decision_source: DecisionSource::DegradationFloor,
        pre_pii_status: status,
        pii_eligible: false,
    }
}

/// Apply the PII detector's outcome to a pre-PII verdict: SANITIZED iff the
/// verdict was PII-eligible, pre-PII status was ALLOWED, and at least one
/// validated entity was found (spec §4.6).
pub fn apply_pii_result(mut verdict: ArbiterVerdict, any_validated_entity: bool) -> ArbiterVerdict {
    if verdict.pii_eligible && verdict.pre_pii_status == FinalStatus::Allowed && any_validated_entity {
        verdict.final_status = FinalStatus::Sanitized;
    }
    verdict
}
