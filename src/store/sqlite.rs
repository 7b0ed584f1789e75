//! SQLite-backed [`OrganizationStore`].

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use super::OrganizationStore;
use crate::models::{parse_timestamp, Organization};

pub struct SqliteOrgStore {
    pool: SqlitePool,
}

impl SqliteOrgStore {
    /// Connect and ensure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = crate::db::connect(path).await?;
        crate::migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }
}

fn row_to_org(row: &sqlx::sqlite::SqliteRow) -> Result<Organization> {
    let created_at: String = row.get("created_at");
    let created_at = parse_timestamp(&created_at)
        .ok_or_else(|| anyhow::anyhow!("unrecognized timestamp in organizations: {}", created_at))?;
    Ok(Organization {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        created_at,
    })
}

#[async_trait]
impl OrganizationStore for SqliteOrgStore {
    async fn insert(&self, org: &Organization) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO organizations (id, name, description, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&org.id)
        .bind(&org.name)
        .bind(&org.description)
        .bind(org.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, id: &str) -> Result<Option<Organization>> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at FROM organizations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_org).transpose()
    }

    async fn list(&self) -> Result<Vec<Organization>> {
        let rows = sqlx::query(
            "SELECT id, name, description, created_at FROM organizations ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_org).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewOrganization;

    #[tokio::test]
    async fn test_sqlite_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orgs.db");

        let store = SqliteOrgStore::open(&path).await.unwrap();
        let org = store
            .create(NewOrganization {
                name: "Gorgia".into(),
                description: None,
            })
            .await
            .unwrap();
        assert!(!store.insert(&org).await.unwrap());

        let reopened = SqliteOrgStore::open(&path).await.unwrap();
        let fetched = reopened.get(&org.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Gorgia");
        assert_eq!(reopened.list().await.unwrap().len(), 1);
    }
}
