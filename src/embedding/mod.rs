//! Dense + sparse embedding generation.
//!
//! A product or query is represented by two vectors:
//! - a **dense** vector from a [`DenseEmbedder`] (usually a remote API), and
//! - a **sparse** BM25 vector from the local [`Bm25Encoder`].
//!
//! [`EmbeddingGenerator`] pairs the two and enforces a deadline on the dense
//! call, so a hung provider surfaces as [`ServiceError::Timeout`] rather than
//! a stuck request.
//!
//! # Providers
//!
//! | Config value | Implementation | Credential |
//! |--------------|----------------|------------|
//! | `"voyage"` | [`VoyageProvider`] | `VOYAGE_API_KEY` |
//! | `"openai"` | [`OpenAIProvider`] | `OPENAI_API_KEY` |
//! | `"local"` | `LocalProvider` (fastembed, feature-gated) | none |
//! | `"disabled"` | [`DisabledProvider`] | none |
//!
//! # Retry Strategy
//!
//! `embedding.max_retries` defaults to `0`. When raised, HTTP 429 and 5xx
//! responses and transport errors are retried with exponential backoff
//! (1s, 2s, 4s, ... capped at 32s); other 4xx responses fail immediately.

pub mod sparse;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use sparse::{Bm25Encoder, SparseVector};

use crate::config::{EmbeddingConfig, SparseConfig};
use crate::error::{ServiceError, ServiceResult};

/// Whether text is being embedded for storage or for lookup.
///
/// Some providers (Voyage) embed queries and documents asymmetrically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Query,
    Document,
}

impl InputKind {
    fn as_str(self) -> &'static str {
        match self {
            InputKind::Query => "query",
            InputKind::Document => "document",
        }
    }
}

/// A dense embedding backend.
#[async_trait]
pub trait DenseEmbedder: Send + Sync {
    /// Returns the model identifier (e.g. `"voyage-multilingual-2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1024`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String], kind: InputKind) -> ServiceResult<Vec<Vec<f32>>>;
}

/// Both representations of one piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Embeddings {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
}

// ============ Generator ============

/// Pairs a dense provider with the BM25 encoder.
pub struct EmbeddingGenerator {
    dense: Arc<dyn DenseEmbedder>,
    sparse: Bm25Encoder,
    timeout: Duration,
}

impl EmbeddingGenerator {
    pub fn new(dense: Arc<dyn DenseEmbedder>, sparse: Bm25Encoder, timeout: Duration) -> Self {
        Self {
            dense,
            sparse,
            timeout,
        }
    }

    /// Build the generator described by `[embedding]` and `[sparse]`.
    pub fn from_config(embedding: &EmbeddingConfig, sparse: &SparseConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            create_provider(embedding)?,
            Bm25Encoder::new(sparse),
            Duration::from_secs(embedding.timeout_secs),
        ))
    }

    pub fn dense_model(&self) -> &str {
        self.dense.model_name()
    }

    pub fn dims(&self) -> usize {
        self.dense.dims()
    }

    /// Embeddings for a search query.
    pub async fn embed_query(&self, text: &str) -> ServiceResult<Embeddings> {
        let dense = self.dense_one(text, InputKind::Query).await?;
        Ok(Embeddings {
            dense,
            sparse: self.sparse.encode_query(text),
        })
    }

    /// Embeddings for a product description at ingestion time.
    pub async fn embed_document(&self, text: &str) -> ServiceResult<Embeddings> {
        let dense = self.dense_one(text, InputKind::Document).await?;
        Ok(Embeddings {
            dense,
            sparse: self.sparse.encode_document(text),
        })
    }

    async fn dense_one(&self, text: &str, kind: InputKind) -> ServiceResult<Vec<f32>> {
        let texts = [text.to_string()];
        let call = self.dense.embed(&texts, kind);
        let vectors = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ServiceError::Timeout {
                service: "embedding",
                secs: self.timeout.as_secs(),
            })??;

        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::upstream("embedding", "empty embedding response"))?;

        let expected = self.dense.dims();
        if expected > 0 && vector.len() != expected {
            return Err(ServiceError::upstream(
                "embedding",
                format!(
                    "dimension mismatch: expected {}, got {}",
                    expected,
                    vector.len()
                ),
            ));
        }
        Ok(vector)
    }
}

// ============ Disabled Provider ============

/// A provider that refuses every call.
///
/// Used when `embedding.provider = "disabled"`; the server still starts and
/// organization routes work, but ingestion and search fail with a 400.
pub struct DisabledProvider;

#[async_trait]
impl DenseEmbedder for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String], _kind: InputKind) -> ServiceResult<Vec<Vec<f32>>> {
        Err(ServiceError::BadRequest(
            "Embedding provider is disabled".to_string(),
        ))
    }
}

// ============ HTTP Providers ============

/// Shared request loop for OpenAI-style `POST /v1/embeddings` APIs.
struct EmbeddingsApi {
    service: &'static str,
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl EmbeddingsApi {
    fn new(
        service: &'static str,
        config: &EmbeddingConfig,
        default_base: &str,
        key_var: &str,
    ) -> anyhow::Result<Self> {
        let api_key = std::env::var(key_var)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", key_var))?;
        let base = config.url.as_deref().unwrap_or(default_base);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            service,
            client,
            endpoint: format!("{}/v1/embeddings", base.trim_end_matches('/')),
            api_key,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    async fn post(&self, body: &serde_json::Value) -> ServiceResult<Vec<Vec<f32>>> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| ServiceError::upstream(self.service, e.to_string()))?;
                        return parse_embeddings_response(self.service, &json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = ServiceError::from_status(self.service, status.as_u16(), &body_text);
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(ServiceError::from_transport(
                        self.service,
                        self.timeout_secs,
                        e,
                    ));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| ServiceError::upstream(self.service, "embedding failed")))
    }
}

/// Parse `{"data": [{"embedding": [...], "index": n}, ...]}`, restoring input order.
fn parse_embeddings_response(
    service: &'static str,
    json: &serde_json::Value,
) -> ServiceResult<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ServiceError::upstream(service, "invalid response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| ServiceError::upstream(service, "invalid response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Voyage AI embeddings (`voyage-multilingual-2` by default).
pub struct VoyageProvider {
    model: String,
    dims: usize,
    api: EmbeddingsApi,
}

impl VoyageProvider {
    /// # Errors
    ///
    /// Fails if `VOYAGE_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            api: EmbeddingsApi::new("voyage", config, "https://api.voyageai.com", "VOYAGE_API_KEY")?,
        })
    }
}

#[async_trait]
impl DenseEmbedder for VoyageProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String], kind: InputKind) -> ServiceResult<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "input_type": kind.as_str(),
        });
        self.api.post(&body).await
    }
}

/// OpenAI embeddings.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api: EmbeddingsApi,
}

impl OpenAIProvider {
    /// # Errors
    ///
    /// Fails if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            api: EmbeddingsApi::new("openai", config, "https://api.openai.com", "OPENAI_API_KEY")?,
        })
    }
}

#[async_trait]
impl DenseEmbedder for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String], _kind: InputKind) -> ServiceResult<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "dimensions": self.dims,
        });
        self.api.post(&body).await
    }
}

// ============ Local Provider (fastembed) ============

/// Local ONNX inference through fastembed. No network calls after the
/// model is downloaded and cached.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let (kind, dims) = local_model(&config.model)?;
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(kind).with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;
        Ok(Self {
            model_name: config.model.clone(),
            dims,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn local_model(name: &str) -> anyhow::Result<(fastembed::EmbeddingModel, usize)> {
    match name {
        "multilingual-e5-small" => Ok((fastembed::EmbeddingModel::MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((fastembed::EmbeddingModel::MultilingualE5Base, 768)),
        "multilingual-e5-large" => Ok((fastembed::EmbeddingModel::MultilingualE5Large, 1024)),
        "bge-small-en-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallENV15, 384)),
        "all-minilm-l6-v2" => Ok((fastembed::EmbeddingModel::AllMiniLML6V2, 384)),
        other => anyhow::bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large, \
             bge-small-en-v1.5, all-minilm-l6-v2",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl DenseEmbedder for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String], _kind: InputKind) -> ServiceResult<Vec<Vec<f32>>> {
        let model = self.model.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
            model
                .embed(texts, None)
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await
        .map_err(|e| ServiceError::Internal(e.into()))?
        .map_err(ServiceError::Internal)
    }
}

/// Create the dense provider named by `embedding.provider`.
///
/// # Errors
///
/// Unknown provider names, missing credentials, or `"local"` without the
/// `local-embeddings-fastembed` feature.
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn DenseEmbedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "voyage" => Ok(Arc::new(VoyageProvider::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => anyhow::bail!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedEmbedder {
        dims: usize,
        delay: Duration,
    }

    #[async_trait]
    impl DenseEmbedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, texts: &[String], _kind: InputKind) -> ServiceResult<Vec<Vec<f32>>> {
            tokio::time::sleep(self.delay).await;
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn generator(dims: usize, delay: Duration, timeout: Duration) -> EmbeddingGenerator {
        EmbeddingGenerator::new(
            Arc::new(FixedEmbedder { dims, delay }),
            Bm25Encoder::default(),
            timeout,
        )
    }

    #[test]
    fn test_parse_response_restores_order() {
        let json = json!({
            "data": [
                {"embedding": [2.0, 2.0], "index": 1},
                {"embedding": [1.0, 1.0], "index": 0}
            ]
        });
        let out = parse_embeddings_response("voyage", &json).unwrap();
        assert_eq!(out, vec![vec![1.0, 1.0], vec![2.0, 2.0]]);
    }

    #[test]
    fn test_parse_response_missing_data() {
        let err = parse_embeddings_response("voyage", &json!({"oops": true})).unwrap_err();
        assert!(err.to_string().contains("missing data"));
    }

    #[tokio::test]
    async fn test_query_embeddings() {
        let gen = generator(2, Duration::ZERO, Duration::from_secs(1));
        let emb = gen.embed_query("red fan").await.unwrap();
        assert_eq!(emb.dense, vec![7.0, 1.0]);
        assert_eq!(emb.sparse.len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_error() {
        let gen = generator(2, Duration::from_millis(200), Duration::from_millis(10));
        let err = gen.embed_query("slow").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let gen = generator(3, Duration::ZERO, Duration::from_secs(1));
        let err = gen.embed_document("anything").await.unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[tokio::test]
    async fn test_disabled_provider_is_bad_request() {
        let err = DisabledProvider
            .embed(&["x".to_string()], InputKind::Query)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadRequest);
    }
}
