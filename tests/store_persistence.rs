//! Organization store durability under concurrent writers.

use product_search::config::StoreConfig;
use product_search::models::NewOrganization;
use product_search::store::{create_store, JsonFileStore, OrganizationStore};
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn test_concurrent_creates_all_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("organizations.json");
    let store = Arc::new(JsonFileStore::open(&path).unwrap());

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .create(NewOrganization {
                    name: format!("Org {}", i),
                    description: None,
                })
                .await
                .unwrap()
        }));
    }
    let mut ids = HashSet::new();
    for h in handles {
        ids.insert(h.await.unwrap().id);
    }
    assert_eq!(ids.len(), 20);

    let reopened = JsonFileStore::open(&path).unwrap();
    let persisted: HashSet<String> = reopened
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(persisted, ids);
}

#[tokio::test]
async fn test_create_store_backends() {
    let dir = tempfile::tempdir().unwrap();
    for (backend, file) in [("json", "orgs.json"), ("sqlite", "orgs.db"), ("memory", "unused")] {
        let store = create_store(&StoreConfig {
            backend: backend.to_string(),
            path: dir.path().join(file),
        })
        .await
        .unwrap();
        let org = store
            .create(NewOrganization {
                name: "Acme".to_string(),
                description: Some("tools".to_string()),
            })
            .await
            .unwrap();
        let fetched = store.get(&org.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Acme", "backend {}", backend);
        assert!(store.get("org_missing").await.unwrap().is_none());
    }
}
