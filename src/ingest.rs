//! Product ingestion.
//!
//! A product is embedded from its description (or its name, when the
//! description is blank), given a fresh UUID point id, stamped with
//! `created_at`, and upserted into the vector engine together with its
//! payload. Nothing is written unless every step succeeds.
//!
//! `psearch import` feeds a scraped catalog CSV through the same path,
//! one row at a time; a failing row is reported and skipped.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{NewProduct, ProductPayload, StoredProduct};
use crate::services::Services;
use crate::vector::ProductPoint;

/// Payload keys assigned by ingestion; client-supplied values are dropped.
const RESERVED_KEYS: &[&str] = &["id", "organization_id", "created_at", "score", "base_score"];

/// Embed and store one product under `org_id`.
pub async fn create_product(
    services: &Services,
    org_id: &str,
    mut product: NewProduct,
) -> ServiceResult<StoredProduct> {
    if product.name.trim().is_empty() {
        return Err(ServiceError::BadRequest(
            "product name must not be empty".to_string(),
        ));
    }
    if !product.price.is_finite() || product.price < 0.0 {
        return Err(ServiceError::BadRequest(
            "price must be a non-negative number".to_string(),
        ));
    }

    for key in RESERVED_KEYS {
        product.extra.remove(*key);
    }

    services
        .organizations
        .get(org_id)
        .await?
        .ok_or_else(ServiceError::organization_not_found)?;

    let embeddings = services
        .embeddings
        .embed_document(product.embedding_text())
        .await?;

    let stored = StoredProduct {
        id: Uuid::new_v4().to_string(),
        payload: ProductPayload {
            product,
            organization_id: org_id.to_string(),
            created_at: Utc::now(),
        },
    };

    let payload = serde_json::to_value(&stored.payload)
        .map_err(|e| ServiceError::Internal(e.into()))?;
    services
        .index
        .upsert(&[ProductPoint {
            id: stored.id.clone(),
            dense: embeddings.dense,
            sparse: embeddings.sparse,
            payload,
        }])
        .await?;

    tracing::info!(
        org_id,
        product_id = %stored.id,
        name = %stored.payload.product.name,
        "product ingested"
    );
    Ok(stored)
}

// ============ Catalog import ============

/// Build a product from one CSV row. Header names are matched
/// case-insensitively; unknown non-empty columns go to `extra`.
pub(crate) fn product_from_row(
    headers: &csv::StringRecord,
    record: &csv::StringRecord,
) -> Result<NewProduct> {
    let mut product = NewProduct::default();

    for (header, value) in headers.iter().zip(record.iter()) {
        let value = value.trim();
        match header.trim().to_lowercase().as_str() {
            "name" => product.name = value.to_string(),
            "description" => product.description = value.to_string(),
            "category" => product.category = value.to_string(),
            "price" => product.price = parse_number("price", value)?.unwrap_or(0.0),
            "old_price" => product.old_price = parse_number("old_price", value)?,
            "discount_percentage" => {
                product.discount_percentage = parse_number("discount_percentage", value)?
            }
            "code" => product.code = Some(value.to_string()).filter(|v| !v.is_empty()),
            "product_url" => {
                product.product_url = Some(value.to_string()).filter(|v| !v.is_empty())
            }
            "image_url" => product.image_url = Some(value.to_string()).filter(|v| !v.is_empty()),
            "features" => product.features = parse_features(value)?,
            other => {
                if !value.is_empty() {
                    product
                        .extra
                        .insert(other.to_string(), serde_json::Value::String(value.to_string()));
                }
            }
        }
    }

    if product.name.is_empty() {
        bail!("row has no name");
    }
    Ok(product)
}

fn parse_number(field: &str, value: &str) -> Result<Option<f64>> {
    if value.is_empty() {
        return Ok(None);
    }
    // "49,90" is a decimal comma; "1,299.00" has a thousands separator.
    let normalized = if value.contains('.') {
        value.replace(',', "")
    } else {
        value.replace(',', ".")
    };
    let n: f64 = normalized
        .trim_end_matches(|c: char| !c.is_ascii_digit())
        .trim()
        .parse()
        .with_context(|| format!("invalid {}: '{}'", field, value))?;
    Ok(Some(n))
}

fn parse_features(value: &str) -> Result<BTreeMap<String, String>> {
    if value.is_empty() {
        return Ok(BTreeMap::new());
    }
    let parsed: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(value).context("features is not a JSON object")?;
    Ok(parsed
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

/// CLI entry point for `psearch import`.
pub async fn import_catalog(
    config: &Config,
    org_id: &str,
    path: &Path,
    dry_run: bool,
    limit: Option<usize>,
) -> Result<()> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open catalog: {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut products = Vec::new();
    let mut invalid = 0usize;
    for (line, record) in reader.records().enumerate() {
        if limit.is_some_and(|l| products.len() >= l) {
            break;
        }
        let record = record?;
        match product_from_row(&headers, &record) {
            Ok(p) => products.push(p),
            Err(e) => {
                invalid += 1;
                eprintln!("  row {}: skipped ({})", line + 2, e);
            }
        }
    }

    if dry_run {
        println!("import {} (dry-run)", path.display());
        println!("  valid rows: {}", products.len());
        println!("  invalid rows: {}", invalid);
        return Ok(());
    }

    let services = Services::from_config(config).await?;
    services
        .organizations
        .get(org_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Organization not found: {}", org_id))?;
    services.prepare_collection().await;

    let total = products.len();
    let mut imported = 0usize;
    let mut failed = 0usize;
    for (i, product) in products.into_iter().enumerate() {
        let name = product.name.clone();
        match create_product(&services, org_id, product).await {
            Ok(_) => imported += 1,
            Err(e) => {
                failed += 1;
                tracing::warn!(name = %name, error = %e, "import failed");
                eprintln!("  [{}/{}] {}: {}", i + 1, total, name, e);
            }
        }
    }

    println!("import {}", path.display());
    println!("  imported: {}", imported);
    println!("  failed: {}", failed);
    println!("  invalid rows: {}", invalid);
    println!("ok");
    Ok(())
}
