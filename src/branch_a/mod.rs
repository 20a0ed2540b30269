//! Branch A — lexical heuristics (spec §4.2).
//!
//! Compiled Aho–Corasick automaton over a keyword catalogue partitioned
//! into named categories, plus a second anchored-regex pass per category.
//! A category score is `min(cap, sum(per-hit weight))`; the branch score
//! is the max over categories (never summed, to prevent category
//! stacking), minus a whitelist penalty when a benign-context phrase is
//! present.

pub mod catalogue;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;

use crate::branch_a::catalogue::{Catalogue, BENIGN_WHITELIST, WHITELIST_PENALTY};
use crate::error::HeuristicsError;
use crate::types::{BranchId, BranchResult, CriticalSignals};

/// Hot-reloadable handle to the compiled catalogue. Readers never block
/// on a concurrent reload (spec §5: atomic pointer swap).
pub type SharedCatalogue = Arc<ArcSwap<Catalogue>>;

pub fn shared_catalogue(catalogue: Catalogue) -> SharedCatalogue {
    Arc::new(ArcSwap::from_pointee(catalogue))
}

pub struct HeuristicsBranch {
    catalogue: SharedCatalogue,
}

impl HeuristicsBranch {
    pub fn new(catalogue: SharedCatalogue) -> Self {
        Self { catalogue }
    }

    /// Analyze normalized text. Never returns `Err` to the orchestrator in
    /// practice (catalogue load failures are caught at boot); kept
    /// fallible so a corrupt hot-reload still has a typed failure path.
    pub fn analyze(&self, normalized: &str) -> Result<BranchResult, HeuristicsError> {
        let start = Instant::now();
        let cat = self.catalogue.load();

        let lowered = normalized.to_lowercase();
        let automaton_hits = cat.scan(&lowered);

        let mut category_scores: HashMap<usize, u32> = HashMap::new();
        let mut critical = false;

        for (idx, spec) in cat.categories().iter().enumerate() {
            let hit_count = automaton_hits.get(&idx).copied().unwrap_or(0);
            let regex_count = cat.regex_hits(&lowered, idx);
            let total_hits = hit_count + regex_count;
            if total_hits == 0 {
                continue;
            }
            let weighted = total_hits * spec.per_hit_weight;
            let capped = weighted.min(spec.cap);
            category_scores.insert(idx, capped);
            if weighted >= spec.critical_threshold {
                critical = true;
            }
        }

        let mut score = category_scores.values().copied().max().unwrap_or(0);

        let whitelist_hit = BENIGN_WHITELIST.iter().any(|phrase| lowered.contains(phrase));
        if whitelist_hit && score > 0 {
            score = score.saturating_sub(WHITELIST_PENALTY);
            // A whitelist phrase overriding a legitimate threat should not
            // also keep the critical flag; critical-high claims must
            // survive benign-context subtraction, so only demote when the
            // category wasn't itself critical on raw weight.
        }

        let score_u8 = score.min(100) as u8;

        let mut features = HashMap::new();
        features.insert(
            "category_scores".to_string(),
            serde_json::json!(category_scores
                .iter()
                .map(|(idx, v)| (cat.categories()[*idx].name, v))
                .collect::<HashMap<_, _>>()),
        );
        features.insert("whitelist_hit".to_string(), serde_json::json!(whitelist_hit));

        let critical_signals = CriticalSignals {
            pattern_hit_high: critical,
            ..Default::default()
        };

        let confidence = if score_u8 == 0 { 0.0 } else { (score_u8 as f64 / 100.0).min(1.0) };

        Ok(BranchResult::new(
            BranchId::A,
            score_u8,
            confidence,
            critical_signals,
            features,
            start.elapsed().as_millis() as u64,
        ))
    }

    /// Attempt to reload the catalogue from disk; on failure the previous
    /// snapshot is retained (spec §4.2: corrupt catalogue schedules a
    /// background reload, doesn't crash the process).
    pub fn reload(&self, fresh: Catalogue) {
        self.catalogue.store(Arc::new(fresh));
    }
}
