//! In-process [`VectorIndex`] for local runs and tests.
//!
//! Brute force over every stored point. Dense similarity is cosine; sparse
//! similarity is a dot product weighted by a BM25-style IDF computed over the
//! stored points, so the results track what the remote engine does with the
//! IDF modifier enabled. Sparse branches only return points sharing at least
//! one term with the query.
//!
//! Fusion:
//! - RRF: `Σ 1 / (60 + rank)` over branches, rank starting at 1.
//! - DBSF: each branch's scores are mapped from `[μ − 3σ, μ + 3σ]` onto
//!   `[0, 1]` (clamped) and summed.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{CollectionInfo, ProductPoint, VectorIndex};
use crate::embedding::SparseVector;
use crate::error::{ServiceError, ServiceResult};
use crate::models::SearchCandidate;
use crate::query::{FusionMethod, HybridQuery, QueryStage, QueryVector};

const RRF_K: f32 = 60.0;

pub struct MemoryIndex {
    name: String,
    dims: RwLock<Option<usize>>,
    points: RwLock<BTreeMap<String, ProductPoint>>,
}

impl MemoryIndex {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dims: RwLock::new(None),
            points: RwLock::new(BTreeMap::new()),
        }
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

/// Inverse document frequency per sparse index over the stored points.
struct Idf {
    n: f32,
    df: HashMap<u32, usize>,
}

impl Idf {
    fn build<'a>(points: impl Iterator<Item = &'a ProductPoint>) -> Self {
        let mut df = HashMap::new();
        let mut n = 0usize;
        for p in points {
            n += 1;
            for idx in &p.sparse.indices {
                *df.entry(*idx).or_insert(0) += 1;
            }
        }
        Self { n: n as f32, df }
    }

    fn weight(&self, idx: u32) -> f32 {
        let df = self.df.get(&idx).copied().unwrap_or(0) as f32;
        (1.0 + (self.n - df + 0.5) / (df + 0.5)).ln()
    }

    /// IDF-weighted dot product; `None` when nothing overlaps.
    fn score(&self, query: &SparseVector, doc: &SparseVector) -> Option<f32> {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0f32;
        let mut overlap = false;
        while i < query.indices.len() && j < doc.indices.len() {
            match query.indices[i].cmp(&doc.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    overlap = true;
                    sum += query.values[i] * doc.values[j] * self.weight(query.indices[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        overlap.then_some(sum)
    }
}

fn similarity(idf: &Idf, vector: &QueryVector, point: &ProductPoint) -> Option<f32> {
    match vector {
        QueryVector::Dense(v) => Some(cosine_sim(v, &point.dense)),
        QueryVector::Sparse(v) => idf.score(v, &point.sparse),
    }
}

type Scored<'a> = Vec<(&'a ProductPoint, f32)>;

fn sort_desc(scored: &mut Scored<'_>) {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
}

fn dbsf_normalize(scored: &Scored<'_>) -> Vec<f32> {
    if scored.is_empty() {
        return Vec::new();
    }
    let n = scored.len() as f32;
    let mean = scored.iter().map(|(_, s)| s).sum::<f32>() / n;
    let var = scored.iter().map(|(_, s)| (s - mean).powi(2)).sum::<f32>() / n;
    let std = var.sqrt();
    if std < f32::EPSILON {
        return vec![0.5; scored.len()];
    }
    let low = mean - 3.0 * std;
    let high = mean + 3.0 * std;
    scored
        .iter()
        .map(|(_, s)| ((s - low) / (high - low)).clamp(0.0, 1.0))
        .collect()
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_collection(&self, dims: usize) -> ServiceResult<()> {
        let mut current = self.dims.write().await;
        let existing = *current;
        match existing {
            Some(existing) if existing != dims => Err(ServiceError::upstream(
                "memory",
                format!(
                    "collection '{}' has dimension {}, requested {}",
                    self.name, existing, dims
                ),
            )),
            _ => {
                *current = Some(dims);
                Ok(())
            }
        }
    }

    async fn upsert(&self, points: &[ProductPoint]) -> ServiceResult<()> {
        let dims = *self.dims.read().await;
        if let Some(dims) = dims {
            if let Some(bad) = points.iter().find(|p| p.dense.len() != dims) {
                return Err(ServiceError::upstream(
                    "memory",
                    format!(
                        "point {} has dimension {}, collection expects {}",
                        bad.id,
                        bad.dense.len(),
                        dims
                    ),
                ));
            }
        }

        let mut stored = self.points.write().await;
        for p in points {
            stored.insert(p.id.clone(), p.clone());
        }
        Ok(())
    }

    async fn query(&self, query: &HybridQuery) -> ServiceResult<Vec<SearchCandidate>> {
        let points = self.points.read().await;
        let idf = Idf::build(points.values());

        let branches: Vec<Scored<'_>> = query
            .prefetch
            .iter()
            .map(|pf| {
                let mut scored: Scored<'_> = points
                    .values()
                    .filter(|p| pf.filter.matches(&p.payload))
                    .filter_map(|p| similarity(&idf, &pf.vector, p).map(|s| (p, s)))
                    .filter(|(_, s)| pf.score_threshold.map_or(true, |t| *s >= t))
                    .collect();
                sort_desc(&mut scored);
                scored.truncate(pf.limit);
                scored
            })
            .collect();

        let mut results: Scored<'_> = match &query.stage {
            QueryStage::Nearest(vector) => {
                let pool: Vec<&ProductPoint> = if query.prefetch.is_empty() {
                    points.values().collect()
                } else {
                    let mut seen: BTreeMap<&str, &ProductPoint> = BTreeMap::new();
                    for (p, _) in branches.iter().flatten() {
                        seen.insert(p.id.as_str(), *p);
                    }
                    seen.into_values().collect()
                };
                pool.into_iter()
                    .filter(|p| query.filter.matches(&p.payload))
                    .filter_map(|p| similarity(&idf, vector, p).map(|s| (p, s)))
                    .collect()
            }
            QueryStage::Fusion(method) => {
                let mut fused: BTreeMap<&str, (&ProductPoint, f32)> = BTreeMap::new();
                for branch in &branches {
                    let contributions: Vec<f32> = match method {
                        FusionMethod::Rrf => (0..branch.len())
                            .map(|rank| 1.0 / (RRF_K + rank as f32 + 1.0))
                            .collect(),
                        FusionMethod::Dbsf => dbsf_normalize(branch),
                    };
                    for ((p, _), c) in branch.iter().zip(contributions) {
                        fused.entry(p.id.as_str()).or_insert((*p, 0.0)).1 += c;
                    }
                }
                fused
                    .into_values()
                    .filter(|(p, _)| query.filter.matches(&p.payload))
                    .collect()
            }
        };

        if let Some(threshold) = query.score_threshold {
            results.retain(|(_, s)| *s >= threshold);
        }
        sort_desc(&mut results);
        results.truncate(query.limit);

        Ok(results
            .into_iter()
            .map(|(p, s)| SearchCandidate {
                id: p.id.clone(),
                base_score: s as f64,
                payload: p.payload.clone(),
            })
            .collect())
    }

    async fn collection_info(&self) -> ServiceResult<CollectionInfo> {
        let dims = *self.dims.read().await;
        let count = self.points.read().await.len() as u64;
        Ok(CollectionInfo {
            name: self.name.clone(),
            status: "green".to_string(),
            points_count: count,
            dense_dims: dims,
            details: serde_json::json!({ "backend": "memory" }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Condition, Filter, Prefetch};
    use serde_json::json;

    fn sparse(pairs: &[(u32, f32)]) -> SparseVector {
        SparseVector {
            indices: pairs.iter().map(|(i, _)| *i).collect(),
            values: pairs.iter().map(|(_, v)| *v).collect(),
        }
    }

    fn point(id: &str, dense: Vec<f32>, terms: &[(u32, f32)], category: &str) -> ProductPoint {
        ProductPoint {
            id: id.to_string(),
            dense,
            sparse: sparse(terms),
            payload: json!({ "name": id, "category": category }),
        }
    }

    async fn index() -> MemoryIndex {
        let idx = MemoryIndex::new("products");
        idx.ensure_collection(2).await.unwrap();
        idx.upsert(&[
            point("a", vec![1.0, 0.0], &[(1, 1.0)], "fans"),
            point("b", vec![0.7, 0.7], &[(1, 1.0), (2, 1.0)], "fans"),
            point("c", vec![0.0, 1.0], &[(3, 1.0)], "heaters"),
        ])
        .await
        .unwrap();
        idx
    }

    fn nearest(vector: QueryVector, limit: usize) -> HybridQuery {
        HybridQuery {
            prefetch: Vec::new(),
            stage: QueryStage::Nearest(vector),
            filter: Filter::default(),
            limit,
            score_threshold: None,
        }
    }

    fn ids(c: &[SearchCandidate]) -> Vec<&str> {
        c.iter().map(|c| c.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_dense_nearest_order() {
        let idx = index().await;
        let res = idx
            .query(&nearest(QueryVector::Dense(vec![1.0, 0.0]), 10))
            .await
            .unwrap();
        assert_eq!(ids(&res), vec!["a", "b", "c"]);
        assert!((res[0].base_score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_sparse_requires_overlap() {
        let idx = index().await;
        let res = idx
            .query(&nearest(QueryVector::Sparse(sparse(&[(2, 1.0)])), 10))
            .await
            .unwrap();
        assert_eq!(ids(&res), vec!["b"]);
    }

    #[tokio::test]
    async fn test_filter_and_threshold() {
        let idx = index().await;
        let mut q = nearest(QueryVector::Dense(vec![1.0, 0.0]), 10);
        q.filter = Filter {
            must: vec![Condition::Match {
                key: "category".into(),
                value: "fans".into(),
            }],
        };
        q.score_threshold = Some(0.9);
        let res = idx.query(&q).await.unwrap();
        assert_eq!(ids(&res), vec!["a"]);
    }

    #[tokio::test]
    async fn test_rrf_prefers_agreement() {
        let idx = index().await;
        let q = HybridQuery {
            prefetch: vec![
                Prefetch {
                    vector: QueryVector::Dense(vec![0.6, 0.8]),
                    limit: 3,
                    score_threshold: None,
                    filter: Filter::default(),
                },
                Prefetch {
                    vector: QueryVector::Sparse(sparse(&[(2, 1.0)])),
                    limit: 3,
                    score_threshold: None,
                    filter: Filter::default(),
                },
            ],
            stage: QueryStage::Fusion(FusionMethod::Rrf),
            filter: Filter::default(),
            limit: 10,
            score_threshold: None,
        };
        let res = idx.query(&q).await.unwrap();
        assert_eq!(res[0].id, "b");
        assert_eq!(res.len(), 3);
    }

    #[tokio::test]
    async fn test_prefetch_limits_pool() {
        let idx = index().await;
        let q = HybridQuery {
            prefetch: vec![Prefetch {
                vector: QueryVector::Sparse(sparse(&[(3, 1.0)])),
                limit: 1,
                score_threshold: None,
                filter: Filter::default(),
            }],
            stage: QueryStage::Nearest(QueryVector::Dense(vec![1.0, 0.0])),
            filter: Filter::default(),
            limit: 10,
            score_threshold: None,
        };
        let res = idx.query(&q).await.unwrap();
        assert_eq!(ids(&res), vec!["c"]);
    }

    #[tokio::test]
    async fn test_dbsf_scores_bounded() {
        let idx = index().await;
        let branch = |v| Prefetch {
            vector: v,
            limit: 3,
            score_threshold: None,
            filter: Filter::default(),
        };
        let q = HybridQuery {
            prefetch: vec![
                branch(QueryVector::Dense(vec![1.0, 0.0])),
                branch(QueryVector::Dense(vec![0.0, 1.0])),
            ],
            stage: QueryStage::Fusion(FusionMethod::Dbsf),
            filter: Filter::default(),
            limit: 2,
            score_threshold: None,
        };
        let res = idx.query(&q).await.unwrap();
        assert_eq!(res.len(), 2);
        assert!(res.iter().all(|c| c.base_score >= 0.0 && c.base_score <= 2.0));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let idx = index().await;
        let err = idx
            .upsert(&[point("d", vec![1.0, 0.0, 0.0], &[], "x")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Upstream);
    }

    #[tokio::test]
    async fn test_collection_info_counts() {
        let idx = index().await;
        let info = idx.collection_info().await.unwrap();
        assert_eq!(info.points_count, 3);
        assert_eq!(info.dense_dims, Some(2));
    }
}
