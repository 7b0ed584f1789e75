//! Result post-processing: ranking policies and page sizing.
//!
//! Two policies are selectable per request:
//!
//! - **Pass-through** keeps the engine score and enforces a minimum page
//!   size (`search.min_results`, 50 by default): a client asking for 25
//!   results gets 50 when at least 50 candidates exist.
//! - **Feature boost** multiplies the engine score when scraped feature
//!   values occur literally in the query:
//!
//! | Feature group | Multiplier | Applied |
//! |---------------|------------|---------|
//! | brand | `ranking.brand_boost` (1.25) | once |
//! | designation / name | `ranking.designation_boost` (1.35) | once |
//! | dimensional (color, country, weight, ...) | `ranking.dimension_boost` (1.25) | once, first match |
//!
//! Matching is a case-sensitive substring test against the raw query.
//! Empty feature values never match.
//!
//! Both policies sort by score descending; ties keep id order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{RankingConfig, SearchConfig};
use crate::models::{RankedCandidate, SearchCandidate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingKind {
    #[default]
    Passthrough,
    FeatureBoost,
}

impl RankingKind {
    /// Absent, blank or unrecognized names resolve to `default`.
    pub fn resolve(raw: Option<&str>, default: RankingKind) -> RankingKind {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("passthrough") | Some("pass_through") | Some("plain") => RankingKind::Passthrough,
            Some("feature_boost") | Some("boost") | Some("heuristic") => RankingKind::FeatureBoost,
            _ => default,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RankingKind::Passthrough => "passthrough",
            RankingKind::FeatureBoost => "feature_boost",
        }
    }
}

/// Multipliers and the feature keys each group looks at.
#[derive(Debug, Clone)]
pub struct FeatureBoost {
    pub brand_boost: f64,
    pub designation_boost: f64,
    pub dimension_boost: f64,
    pub brand_keys: Vec<String>,
    pub designation_keys: Vec<String>,
    pub dimension_keys: Vec<String>,
}

impl From<&RankingConfig> for FeatureBoost {
    fn from(config: &RankingConfig) -> Self {
        Self {
            brand_boost: config.brand_boost,
            designation_boost: config.designation_boost,
            dimension_boost: config.dimension_boost,
            brand_keys: config.brand_keys.clone(),
            designation_keys: config.designation_keys.clone(),
            dimension_keys: config.dimension_keys.clone(),
        }
    }
}

impl FeatureBoost {
    pub fn score(&self, query: &str, base: f64, features: &BTreeMap<String, String>) -> f64 {
        let hit = |keys: &[String]| {
            keys.iter().any(|k| {
                features
                    .get(k)
                    .is_some_and(|v| !v.is_empty() && query.contains(v.as_str()))
            })
        };

        let mut score = base;
        if hit(&self.brand_keys) {
            score *= self.brand_boost;
        }
        if hit(&self.designation_keys) {
            score *= self.designation_boost;
        }
        if hit(&self.dimension_keys) {
            score *= self.dimension_boost;
        }
        score
    }
}

#[derive(Debug, Clone)]
pub enum RankingPolicy {
    PassThrough { min_results: usize },
    FeatureBoost(FeatureBoost),
}

impl RankingPolicy {
    pub fn from_config(kind: RankingKind, search: &SearchConfig, ranking: &RankingConfig) -> Self {
        match kind {
            RankingKind::Passthrough => RankingPolicy::PassThrough {
                min_results: search.min_results,
            },
            RankingKind::FeatureBoost => RankingPolicy::FeatureBoost(ranking.into()),
        }
    }

    pub fn kind(&self) -> RankingKind {
        match self {
            RankingPolicy::PassThrough { .. } => RankingKind::Passthrough,
            RankingPolicy::FeatureBoost(_) => RankingKind::FeatureBoost,
        }
    }

    /// Score and sort candidates.
    pub fn rank(&self, query: &str, candidates: Vec<SearchCandidate>) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let score = match self {
                    RankingPolicy::PassThrough { .. } => candidate.base_score,
                    RankingPolicy::FeatureBoost(boost) => {
                        boost.score(query, candidate.base_score, &candidate.features())
                    }
                };
                RankedCandidate { candidate, score }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.candidate.id.cmp(&b.candidate.id))
        });
        ranked
    }

    /// Number of results to return given the client's limit and the number
    /// of ranked candidates left after the offset.
    pub fn page_size(&self, requested: usize, available: usize) -> usize {
        match self {
            RankingPolicy::PassThrough { min_results } => {
                requested.min(available).max(*min_results).min(available)
            }
            RankingPolicy::FeatureBoost(_) => requested.min(available),
        }
    }

    /// Largest page this policy can produce for a client limit; sizes the
    /// engine request.
    pub fn max_page(&self, requested: usize) -> usize {
        match self {
            RankingPolicy::PassThrough { min_results } => requested.max(*min_results),
            RankingPolicy::FeatureBoost(_) => requested,
        }
    }
}
