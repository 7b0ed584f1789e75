//! Shared fixtures: a deterministic embedder and in-memory services.

#![allow(dead_code)]

use async_trait::async_trait;
use product_search::config::Config;
use product_search::embedding::{Bm25Encoder, DenseEmbedder, EmbeddingGenerator, InputKind};
use product_search::error::{ServiceError, ServiceResult};
use product_search::models::{NewOrganization, NewProduct, Organization};
use product_search::services::Services;
use product_search::store::{InMemoryOrgStore, OrganizationStore};
use product_search::vector::{MemoryIndex, VectorIndex};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const DIMS: usize = 16;

/// Bag-of-words hashing embedder: same text, same vector.
pub struct HashEmbedder;

#[async_trait]
impl DenseEmbedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String], _kind: InputKind) -> ServiceResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }
}

pub fn hash_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    v[DIMS - 1] = 0.5;
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let bucket = token
            .to_lowercase()
            .bytes()
            .fold(7u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32)) as usize
            % (DIMS - 1);
        v[bucket] += 1.0;
    }
    v
}

/// Always fails like an upstream outage.
pub struct FailingEmbedder;

#[async_trait]
impl DenseEmbedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, _texts: &[String], _kind: InputKind) -> ServiceResult<Vec<Vec<f32>>> {
        Err(ServiceError::upstream(
            "voyage",
            "HTTP 500: secret internal stack trace",
        ))
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.store.backend = "memory".to_string();
    config.vector.backend = "memory".to_string();
    config.embedding.dims = DIMS;
    config
}

pub async fn services_with(config: Config, dense: Arc<dyn DenseEmbedder>) -> Services {
    let index = Arc::new(MemoryIndex::new(&config.vector.collection));
    index.ensure_collection(DIMS).await.unwrap();
    let embeddings = EmbeddingGenerator::new(
        dense,
        Bm25Encoder::new(&config.sparse),
        Duration::from_secs(5),
    );
    Services::new(config, Arc::new(InMemoryOrgStore::new()), index, embeddings)
}

pub async fn services() -> Services {
    services_with(test_config(), Arc::new(HashEmbedder)).await
}

pub async fn create_org(services: &Services, name: &str) -> Organization {
    services
        .organizations
        .create(NewOrganization {
            name: name.to_string(),
            description: None,
        })
        .await
        .unwrap()
}

pub fn product(name: &str, description: &str, price: f64, category: &str) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        description: description.to_string(),
        price,
        category: category.to_string(),
        ..Default::default()
    }
}

pub fn with_features(mut p: NewProduct, features: &[(&str, &str)]) -> NewProduct {
    p.features = features
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>();
    p
}
