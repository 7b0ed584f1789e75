//! Qdrant [`VectorIndex`] over the REST API.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | `ensure_collection` | `GET /collections/{c}`, then `PUT /collections/{c}` + payload indexes if absent |
//! | `upsert` | `PUT /collections/{c}/points?wait=true` |
//! | `query` | `POST /collections/{c}/points/query` |
//! | `collection_info` | `GET /collections/{c}` |
//!
//! The dense vector uses cosine distance; the sparse vector is created with
//! the `idf` modifier so the engine supplies the inverse document frequency
//! that the local BM25 encoder leaves out. `QDRANT_API_KEY`, when set, is
//! sent as the `api-key` header.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{CollectionInfo, ProductPoint, VectorIndex};
use crate::config::VectorConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::models::SearchCandidate;
use crate::query::{Condition, Filter, FusionMethod, HybridQuery, Prefetch, QueryStage, QueryVector};

const SERVICE: &str = "qdrant";

/// Payload fields indexed at collection creation.
const PAYLOAD_INDEXES: &[(&str, &str)] = &[
    ("organization_id", "keyword"),
    ("category", "keyword"),
    ("price", "float"),
    ("discount_percentage", "float"),
];

pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    dense_name: String,
    sparse_name: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl QdrantIndex {
    pub fn new(config: &VectorConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            dense_name: config.dense_vector_name.clone(),
            sparse_name: config.sparse_vector_name.clone(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let req = self.client.request(method, url);
        match &self.api_key {
            Some(key) => req.header("api-key", key),
            None => req,
        }
    }

    /// Send, classify failures, and return the `result` field.
    async fn send(&self, req: reqwest::RequestBuilder) -> ServiceResult<Value> {
        let response = req
            .send()
            .await
            .map_err(|e| ServiceError::from_transport(SERVICE, self.timeout_secs, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(SERVICE, status.as_u16(), &body));
        }
        let json: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::upstream(SERVICE, format!("invalid JSON: {}", e)))?;
        Ok(json.get("result").cloned().unwrap_or(Value::Null))
    }

    fn vector_json(&self, vector: &QueryVector) -> (Value, &str) {
        match vector {
            QueryVector::Dense(v) => (json!(v), self.dense_name.as_str()),
            QueryVector::Sparse(s) => (
                json!({ "indices": s.indices, "values": s.values }),
                self.sparse_name.as_str(),
            ),
        }
    }

    fn prefetch_json(&self, prefetch: &Prefetch) -> Value {
        let (query, using) = self.vector_json(&prefetch.vector);
        let mut body = json!({
            "query": query,
            "using": using,
            "limit": prefetch.limit,
        });
        if let Some(t) = prefetch.score_threshold {
            body["score_threshold"] = json!(t);
        }
        if !prefetch.filter.is_empty() {
            body["filter"] = filter_json(&prefetch.filter);
        }
        body
    }

    pub(crate) fn query_body(&self, query: &HybridQuery) -> Value {
        let mut body = json!({
            "limit": query.limit,
            "with_payload": true,
        });

        if !query.prefetch.is_empty() {
            body["prefetch"] = Value::Array(
                query.prefetch.iter().map(|p| self.prefetch_json(p)).collect(),
            );
        }

        match &query.stage {
            QueryStage::Nearest(vector) => {
                let (q, using) = self.vector_json(vector);
                body["query"] = q;
                body["using"] = json!(using);
            }
            QueryStage::Fusion(method) => {
                let name = match method {
                    FusionMethod::Rrf => "rrf",
                    FusionMethod::Dbsf => "dbsf",
                };
                body["query"] = json!({ "fusion": name });
            }
        }

        if !query.filter.is_empty() {
            body["filter"] = filter_json(&query.filter);
        }
        if let Some(t) = query.score_threshold {
            body["score_threshold"] = json!(t);
        }
        body
    }

    async fn create_collection(&self, dims: usize) -> ServiceResult<()> {
        let mut vectors = serde_json::Map::new();
        vectors.insert(
            self.dense_name.clone(),
            json!({ "size": dims, "distance": "Cosine" }),
        );
        let mut sparse = serde_json::Map::new();
        sparse.insert(self.sparse_name.clone(), json!({ "modifier": "idf" }));

        let body = json!({ "vectors": vectors, "sparse_vectors": sparse });
        self.send(self.request(reqwest::Method::PUT, self.url("")).json(&body))
            .await?;

        for (field, schema) in PAYLOAD_INDEXES {
            let body = json!({ "field_name": field, "field_schema": schema });
            self.send(
                self.request(reqwest::Method::PUT, self.url("/index?wait=true"))
                    .json(&body),
            )
            .await?;
        }

        tracing::info!(collection = %self.collection, dims, "created collection");
        Ok(())
    }
}

fn filter_json(filter: &Filter) -> Value {
    let must: Vec<Value> = filter
        .must
        .iter()
        .map(|c| match c {
            Condition::Match { key, value } => json!({ "key": key, "match": { "value": value } }),
            Condition::Range { key, gte, lte } => {
                let mut range = serde_json::Map::new();
                if let Some(g) = gte {
                    range.insert("gte".to_string(), json!(g));
                }
                if let Some(l) = lte {
                    range.insert("lte".to_string(), json!(l));
                }
                json!({ "key": key, "range": range })
            }
        })
        .collect();
    json!({ "must": must })
}

/// Point ids come back as UUID strings or unsigned integers.
fn point_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_points(result: &Value) -> ServiceResult<Vec<SearchCandidate>> {
    let points = result
        .get("points")
        .or(Some(result))
        .and_then(|p| p.as_array())
        .ok_or_else(|| ServiceError::upstream(SERVICE, "query response has no points"))?;

    points
        .iter()
        .map(|p| {
            let id = p
                .get("id")
                .and_then(point_id)
                .ok_or_else(|| ServiceError::upstream(SERVICE, "point without id"))?;
            let score = p.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0);
            let payload = p.get("payload").cloned().unwrap_or_else(|| json!({}));
            Ok(SearchCandidate {
                id,
                base_score: score,
                payload,
            })
        })
        .collect()
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self, dims: usize) -> ServiceResult<()> {
        let response = self
            .request(reqwest::Method::GET, self.url(""))
            .send()
            .await
            .map_err(|e| ServiceError::from_transport(SERVICE, self.timeout_secs, e))?;

        match response.status().as_u16() {
            200 => Ok(()),
            404 => self.create_collection(dims).await,
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ServiceError::from_status(SERVICE, status, &body))
            }
        }
    }

    async fn upsert(&self, points: &[ProductPoint]) -> ServiceResult<()> {
        let points: Vec<Value> = points
            .iter()
            .map(|p| {
                let mut vector = serde_json::Map::new();
                vector.insert(self.dense_name.clone(), json!(p.dense));
                vector.insert(
                    self.sparse_name.clone(),
                    json!({ "indices": p.sparse.indices, "values": p.sparse.values }),
                );
                json!({ "id": p.id, "vector": vector, "payload": p.payload })
            })
            .collect();

        self.send(
            self.request(reqwest::Method::PUT, self.url("/points?wait=true"))
                .json(&json!({ "points": points })),
        )
        .await?;
        Ok(())
    }

    async fn query(&self, query: &HybridQuery) -> ServiceResult<Vec<SearchCandidate>> {
        let body = self.query_body(query);
        let result = self
            .send(
                self.request(reqwest::Method::POST, self.url("/points/query"))
                    .json(&body),
            )
            .await?;
        parse_points(&result)
    }

    async fn collection_info(&self) -> ServiceResult<CollectionInfo> {
        let result = self
            .send(self.request(reqwest::Method::GET, self.url("")))
            .await?;

        let dense_dims = result
            .pointer(&format!("/config/params/vectors/{}/size", self.dense_name))
            .and_then(|v| v.as_u64())
            .map(|v| v as usize);

        Ok(CollectionInfo {
            name: self.collection.clone(),
            status: result
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("unknown")
                .to_string(),
            points_count: result
                .get("points_count")
                .and_then(|c| c.as_u64())
                .unwrap_or(0),
            dense_dims,
            details: result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::embedding::{Embeddings, SparseVector};
    use crate::query::{build_query, ProductFilter, SearchStrategy};

    fn index() -> QdrantIndex {
        QdrantIndex::new(&VectorConfig::default()).unwrap()
    }

    fn embeddings() -> Embeddings {
        Embeddings {
            dense: vec![0.5, 0.5],
            sparse: SparseVector {
                indices: vec![7],
                values: vec![1.0],
            },
        }
    }

    #[test]
    fn test_rrf_body() {
        let filter = ProductFilter {
            category: Some("fans".into()),
            ..Default::default()
        }
        .to_filter();
        let q = build_query(
            &SearchConfig::default(),
            SearchStrategy::Rrf,
            &embeddings(),
            filter,
            200,
        );
        let body = index().query_body(&q);
        assert_eq!(body["query"], json!({"fusion": "rrf"}));
        assert_eq!(body["prefetch"][0]["using"], "dense");
        assert_eq!(body["prefetch"][1]["using"], "sparse");
        assert_eq!(body["prefetch"][1]["query"]["indices"], json!([7]));
        assert_eq!(body["prefetch"][0]["limit"], 20);
        assert_eq!(
            body["filter"]["must"][0],
            json!({"key": "category", "match": {"value": "fans"}})
        );
        assert_eq!(body["prefetch"][0]["filter"], body["filter"]);
        assert_eq!(body["limit"], 200);
        assert!(body.get("score_threshold").is_none());
    }

    #[test]
    fn test_dense_body_with_threshold() {
        let config = SearchConfig {
            score_threshold: Some(0.49),
            ..Default::default()
        };
        let q = build_query(
            &config,
            SearchStrategy::Dense,
            &embeddings(),
            Filter::default(),
            50,
        );
        let body = index().query_body(&q);
        assert_eq!(body["using"], "dense");
        assert!(body.get("prefetch").is_none());
        assert!(body.get("filter").is_none());
        assert!((body["score_threshold"].as_f64().unwrap() - 0.49).abs() < 1e-6);
    }

    #[test]
    fn test_range_filter_json() {
        let filter = ProductFilter {
            min_price: Some(10.0),
            ..Default::default()
        }
        .to_filter();
        let value = filter_json(&filter);
        assert_eq!(value["must"][0]["range"], json!({"gte": 10.0}));
    }

    #[test]
    fn test_parse_points() {
        let result = json!({"points": [
            {"id": "7b0c", "score": 0.9, "payload": {"name": "Fan"}},
            {"id": 42, "score": 0.5}
        ]});
        let c = parse_points(&result).unwrap();
        assert_eq!(c[0].id, "7b0c");
        assert_eq!(c[1].id, "42");
        assert_eq!(c[1].payload, json!({}));
    }
}
