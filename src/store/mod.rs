//! Organization persistence.
//!
//! [`OrganizationStore`] is the seam between the HTTP layer and wherever
//! organization records live. Three backends ship:
//!
//! | `store.backend` | Type | Durability |
//! |-----------------|------|------------|
//! | `json` | [`JsonFileStore`] | single JSON file, rewritten atomically |
//! | `sqlite` | [`SqliteOrgStore`] | `organizations` table |
//! | `memory` | [`InMemoryOrgStore`] | none (tests, throwaway runs) |
//!
//! Identifiers are `org_` plus eight lowercase hex characters taken from a
//! random UUID. Creation retries on the (unlikely) collision.

pub mod json_file;
pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::models::{NewOrganization, Organization};

pub use json_file::JsonFileStore;
pub use memory::InMemoryOrgStore;
pub use sqlite::SqliteOrgStore;

const MAX_ID_ATTEMPTS: usize = 8;

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Insert a record unless its id is taken. Returns `false` on collision.
    async fn insert(&self, org: &Organization) -> Result<bool>;

    async fn get(&self, id: &str) -> Result<Option<Organization>>;

    /// All organizations, oldest first.
    async fn list(&self) -> Result<Vec<Organization>>;

    /// Assign a fresh id and timestamp, then persist.
    async fn create(&self, new: NewOrganization) -> Result<Organization> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let org = Organization {
                id: generate_org_id(),
                name: new.name.clone(),
                description: new.description.clone(),
                created_at: Utc::now(),
            };
            if self.insert(&org).await? {
                return Ok(org);
            }
            tracing::warn!(id = %org.id, "organization id collision, regenerating");
        }
        bail!(
            "could not allocate a unique organization id after {} attempts",
            MAX_ID_ATTEMPTS
        )
    }
}

pub fn generate_org_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("org_{}", &hex[..8])
}

/// Open the backend named by `[store]`.
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn OrganizationStore>> {
    match config.backend.as_str() {
        "json" => Ok(Arc::new(JsonFileStore::open(&config.path)?)),
        "sqlite" => Ok(Arc::new(SqliteOrgStore::open(&config.path).await?)),
        "memory" => Ok(Arc::new(InMemoryOrgStore::new())),
        other => bail!("Unknown store backend: {}", other),
    }
}
