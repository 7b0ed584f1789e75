//! Vector engine adapters.
//!
//! Products live in a single collection with a named dense vector and a
//! named sparse vector per point. [`VectorIndex`] is the seam between the
//! search pipeline and the engine:
//!
//! | `vector.backend` | Type |
//! |------------------|------|
//! | `qdrant` | [`QdrantIndex`] (REST) |
//! | `memory` | [`MemoryIndex`] (brute force, process-local) |

pub mod memory;
pub mod qdrant;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::VectorConfig;
use crate::embedding::SparseVector;
use crate::error::ServiceResult;
use crate::models::SearchCandidate;
use crate::query::HybridQuery;

pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;

/// A product point ready for upsert.
#[derive(Debug, Clone)]
pub struct ProductPoint {
    pub id: String,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub payload: serde_json::Value,
}

/// Engine-reported collection statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub status: String,
    pub points_count: u64,
    pub dense_dims: Option<usize>,
    /// Full engine response, for diagnostics.
    pub details: serde_json::Value,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if it does not exist. Idempotent.
    async fn ensure_collection(&self, dims: usize) -> ServiceResult<()>;

    async fn upsert(&self, points: &[ProductPoint]) -> ServiceResult<()>;

    /// Run a hybrid query, returning candidates best-first.
    async fn query(&self, query: &HybridQuery) -> ServiceResult<Vec<SearchCandidate>>;

    async fn collection_info(&self) -> ServiceResult<CollectionInfo>;
}

pub fn create_index(config: &VectorConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.backend.as_str() {
        "qdrant" => Ok(Arc::new(QdrantIndex::new(config)?)),
        "memory" => Ok(Arc::new(MemoryIndex::new(&config.collection))),
        other => bail!("Unknown vector backend: {}", other),
    }
}
