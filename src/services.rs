//! The long-lived dependencies shared by the HTTP handlers and the CLI.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::EmbeddingGenerator;
use crate::store::{create_store, OrganizationStore};
use crate::vector::{create_index, VectorIndex};

#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub organizations: Arc<dyn OrganizationStore>,
    pub index: Arc<dyn VectorIndex>,
    pub embeddings: Arc<EmbeddingGenerator>,
}

impl Services {
    pub fn new(
        config: Config,
        organizations: Arc<dyn OrganizationStore>,
        index: Arc<dyn VectorIndex>,
        embeddings: EmbeddingGenerator,
    ) -> Self {
        Self {
            config: Arc::new(config),
            organizations,
            index,
            embeddings: Arc::new(embeddings),
        }
    }

    /// Wire up the backends named in the configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let organizations = create_store(&config.store).await?;
        let index = create_index(&config.vector)?;
        let embeddings = EmbeddingGenerator::from_config(&config.embedding, &config.sparse)?;
        Ok(Self::new(config.clone(), organizations, index, embeddings))
    }

    /// Create the vector collection if the embedding provider is active.
    ///
    /// Failures are logged, not fatal: the engine may come up after us.
    pub async fn prepare_collection(&self) {
        if !self.config.embedding.is_enabled() {
            return;
        }
        let dims = self.embeddings.dims();
        match self.index.ensure_collection(dims).await {
            Ok(()) => tracing::info!(
                collection = %self.config.vector.collection,
                dims,
                "vector collection ready"
            ),
            Err(e) => tracing::warn!(
                collection = %self.config.vector.collection,
                error = %e,
                "could not prepare vector collection"
            ),
        }
    }
}
