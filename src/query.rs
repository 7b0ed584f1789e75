//! Hybrid query construction.
//!
//! Turns a strategy, a pair of query embeddings, and scalar filters into an
//! engine-neutral [`HybridQuery`]. The vector backends translate it into
//! their own wire format (Qdrant's `points/query` body) or evaluate it
//! directly (the in-memory index).
//!
//! # Strategies
//!
//! | Strategy | Prefetch branches | Final stage |
//! |----------|-------------------|-------------|
//! | `dense` | none | nearest by dense vector |
//! | `sparse` | none | nearest by sparse vector |
//! | `rrf` | dense + sparse | reciprocal-rank fusion |
//! | `dbsf` | dense + sparse | distribution-based score fusion |
//! | `prefetch` | dense + sparse | dense re-score of the prefetched pool |
//!
//! Parsing is total: any unrecognized strategy name falls back to
//! `prefetch`.

use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::embedding::{Embeddings, SparseVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Dense,
    Sparse,
    Rrf,
    Dbsf,
    #[default]
    Prefetch,
}

impl SearchStrategy {
    /// Resolve a client-supplied name. Absent or blank → `default`;
    /// unrecognized → [`SearchStrategy::Prefetch`].
    pub fn resolve(raw: Option<&str>, default: SearchStrategy) -> SearchStrategy {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return default;
        };
        match raw.to_ascii_lowercase().as_str() {
            "dense" => SearchStrategy::Dense,
            "sparse" => SearchStrategy::Sparse,
            "rrf" => SearchStrategy::Rrf,
            "dbsf" => SearchStrategy::Dbsf,
            _ => SearchStrategy::Prefetch,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchStrategy::Dense => "dense",
            SearchStrategy::Sparse => "sparse",
            SearchStrategy::Rrf => "rrf",
            SearchStrategy::Dbsf => "dbsf",
            SearchStrategy::Prefetch => "prefetch",
        }
    }
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMethod {
    Rrf,
    Dbsf,
}

// ============ Filters ============

/// One payload condition. All conditions of a [`Filter`] must hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Exact string match on a payload key.
    Match { key: String, value: String },
    /// Inclusive numeric range on a payload key.
    Range {
        key: String,
        gte: Option<f64>,
        lte: Option<f64>,
    },
}

impl Condition {
    pub fn matches(&self, payload: &serde_json::Value) -> bool {
        match self {
            Condition::Match { key, value } => {
                payload.get(key).and_then(|v| v.as_str()) == Some(value.as_str())
            }
            Condition::Range { key, gte, lte } => {
                let Some(x) = payload.get(key).and_then(|v| v.as_f64()) else {
                    return false;
                };
                gte.map_or(true, |g| x >= g) && lte.map_or(true, |l| x <= l)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub must: Vec<Condition>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    pub fn matches(&self, payload: &serde_json::Value) -> bool {
        self.must.iter().all(|c| c.matches(payload))
    }
}

/// Scalar product filters accepted by the search endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_discount: Option<f64>,
    pub organization_id: Option<String>,
}

impl ProductFilter {
    /// Conjunctive condition list. Blank categories are ignored.
    pub fn to_filter(&self) -> Filter {
        let mut must = Vec::new();

        if let Some(org) = &self.organization_id {
            must.push(Condition::Match {
                key: "organization_id".to_string(),
                value: org.clone(),
            });
        }
        if let Some(category) = self.category.as_deref().filter(|c| !c.trim().is_empty()) {
            must.push(Condition::Match {
                key: "category".to_string(),
                value: category.to_string(),
            });
        }
        if self.min_price.is_some() || self.max_price.is_some() {
            must.push(Condition::Range {
                key: "price".to_string(),
                gte: self.min_price,
                lte: self.max_price,
            });
        }
        if let Some(min) = self.min_discount {
            must.push(Condition::Range {
                key: "discount_percentage".to_string(),
                gte: Some(min),
                lte: None,
            });
        }

        Filter { must }
    }
}

// ============ Query ============

#[derive(Debug, Clone, PartialEq)]
pub enum QueryVector {
    Dense(Vec<f32>),
    Sparse(SparseVector),
}

/// A candidate-retrieval sub-query.
#[derive(Debug, Clone, PartialEq)]
pub struct Prefetch {
    pub vector: QueryVector,
    pub limit: usize,
    pub score_threshold: Option<f32>,
    pub filter: Filter,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryStage {
    /// Score by similarity to a vector (over the prefetched pool, if any).
    Nearest(QueryVector),
    /// Combine the prefetch branches.
    Fusion(FusionMethod),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HybridQuery {
    pub prefetch: Vec<Prefetch>,
    pub stage: QueryStage,
    pub filter: Filter,
    pub limit: usize,
    pub score_threshold: Option<f32>,
}

/// Build the engine query for `strategy`.
///
/// `limit` is the number of candidates requested from the engine, not the
/// page size shown to the client.
pub fn build_query(
    config: &SearchConfig,
    strategy: SearchStrategy,
    embeddings: &Embeddings,
    filter: Filter,
    limit: usize,
) -> HybridQuery {
    let branches = || {
        vec![
            Prefetch {
                vector: QueryVector::Dense(embeddings.dense.clone()),
                limit: config.prefetch_limit,
                score_threshold: config.prefetch_score_threshold,
                filter: filter.clone(),
            },
            Prefetch {
                vector: QueryVector::Sparse(embeddings.sparse.clone()),
                limit: config.prefetch_limit,
                score_threshold: config.prefetch_score_threshold,
                filter: filter.clone(),
            },
        ]
    };

    let (prefetch, stage) = match strategy {
        SearchStrategy::Dense => (
            Vec::new(),
            QueryStage::Nearest(QueryVector::Dense(embeddings.dense.clone())),
        ),
        SearchStrategy::Sparse => (
            Vec::new(),
            QueryStage::Nearest(QueryVector::Sparse(embeddings.sparse.clone())),
        ),
        SearchStrategy::Rrf => (branches(), QueryStage::Fusion(FusionMethod::Rrf)),
        SearchStrategy::Dbsf => (branches(), QueryStage::Fusion(FusionMethod::Dbsf)),
        SearchStrategy::Prefetch => (
            branches(),
            QueryStage::Nearest(QueryVector::Dense(embeddings.dense.clone())),
        ),
    };

    HybridQuery {
        prefetch,
        stage,
        filter,
        limit,
        score_threshold: config.score_threshold,
    }
}
