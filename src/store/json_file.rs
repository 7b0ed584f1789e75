//! JSON-file [`OrganizationStore`].
//!
//! The file holds a single object keyed by organization id:
//!
//! ```json
//! { "org_1a2b3c4d": { "id": "org_1a2b3c4d", "name": "Gorgia", "description": null,
//!                     "created_at": "2024-11-20T14:03:11.582941Z" } }
//! ```
//!
//! The whole map is loaded at open and rewritten on every insert via a
//! temporary file and rename, so a crash mid-write leaves the previous
//! version intact. Writers are serialized by a single async mutex.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::OrganizationStore;
use crate::models::Organization;

pub struct JsonFileStore {
    path: PathBuf,
    orgs: Mutex<BTreeMap<String, Organization>>,
}

impl JsonFileStore {
    /// Load `path`, or start empty when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Unreadable or malformed files are an error; they are never
    /// silently replaced.
    pub fn open(path: &Path) -> Result<Self> {
        let orgs = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read organizations file: {}", path.display()))?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).with_context(|| {
                    format!("Failed to parse organizations file: {}", path.display())
                })?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), count = orgs.len(), "loaded organizations");
        Ok(Self {
            path: path.to_path_buf(),
            orgs: Mutex::new(orgs),
        })
    }

    async fn persist(&self, orgs: &BTreeMap<String, Organization>) -> Result<()> {
        let data = serde_json::to_string_pretty(orgs)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, data)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl OrganizationStore for JsonFileStore {
    async fn insert(&self, org: &Organization) -> Result<bool> {
        let mut orgs = self.orgs.lock().await;
        if orgs.contains_key(&org.id) {
            return Ok(false);
        }
        orgs.insert(org.id.clone(), org.clone());
        if let Err(e) = self.persist(&orgs).await {
            orgs.remove(&org.id);
            return Err(e);
        }
        Ok(true)
    }

    async fn get(&self, id: &str) -> Result<Option<Organization>> {
        Ok(self.orgs.lock().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Organization>> {
        let mut all: Vec<Organization> = self.orgs.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewOrganization;

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("organizations.json");

        let store = JsonFileStore::open(&path).unwrap();
        let org = store
            .create(NewOrganization {
                name: "Gorgia".into(),
                description: Some("home goods".into()),
            })
            .await
            .unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get(&org.id).await.unwrap(), Some(org));
        assert!(!dir.path().join("organizations.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_reads_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("organizations.json");
        std::fs::write(
            &path,
            r#"{"org_1a2b3c4d": {"id": "org_1a2b3c4d", "name": "Gorgia",
                "description": null, "created_at": "2024-11-20 14:03:11.582941"}}"#,
        )
        .unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        let org = store.get("org_1a2b3c4d").await.unwrap().unwrap();
        assert_eq!(org.name, "Gorgia");
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("organizations.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
    }

    #[tokio::test]
    async fn test_missing_parent_dir_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/nested/organizations.json");
        let store = JsonFileStore::open(&path).unwrap();
        store
            .create(NewOrganization {
                name: "A".into(),
                description: None,
            })
            .await
            .unwrap();
        assert!(path.exists());
    }
}
