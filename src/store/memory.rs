//! In-memory [`OrganizationStore`] for tests and throwaway servers.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::OrganizationStore;
use crate::models::Organization;

#[derive(Default)]
pub struct InMemoryOrgStore {
    orgs: RwLock<HashMap<String, Organization>>,
}

impl InMemoryOrgStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrganizationStore for InMemoryOrgStore {
    async fn insert(&self, org: &Organization) -> Result<bool> {
        let mut orgs = self.orgs.write().await;
        if orgs.contains_key(&org.id) {
            return Ok(false);
        }
        orgs.insert(org.id.clone(), org.clone());
        Ok(true)
    }

    async fn get(&self, id: &str) -> Result<Option<Organization>> {
        Ok(self.orgs.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Organization>> {
        let mut all: Vec<Organization> = self.orgs.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}
