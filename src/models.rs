//! Core data models: organizations, products, and search candidates.
//!
//! Product records are owned by the vector engine; this crate only builds
//! their payloads and reads them back. Organization records are owned by an
//! [`OrganizationStore`](crate::store::OrganizationStore).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

// ============ Organizations ============

/// Request body for creating an organization.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A persisted organization record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    /// `org_` followed by 8 hex characters.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Accepts RFC 3339 and the space-separated naive form
/// (`2024-11-20 14:03:11.582941`) found in older organization files.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("unrecognized timestamp: {}", raw))
    })
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

// ============ Products ============

/// A product as submitted for ingestion.
///
/// The named fields are the ones search and filtering rely on. Anything
/// else in the request body is kept verbatim in `extra` and stored with the
/// payload.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_percentage: Option<f64>,
    /// Storefront product code, filled in by the scraper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Scraped attribute-name → value map.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl NewProduct {
    /// Text the embeddings are computed from.
    ///
    /// The description, or the name when the description is blank.
    pub fn embedding_text(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.name
        } else {
            &self.description
        }
    }
}

/// The payload stored alongside a product's vectors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductPayload {
    #[serde(flatten)]
    pub product: NewProduct,
    pub organization_id: String,
    pub created_at: DateTime<Utc>,
}

/// A product record as returned after ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProduct {
    pub id: String,
    #[serde(flatten)]
    pub payload: ProductPayload,
}

// ============ Search ============

/// A fused candidate from the vector engine, before post-processing.
#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub id: String,
    /// Similarity score reported by the engine.
    pub base_score: f64,
    /// Raw payload as stored; decoded lazily so foreign fields survive.
    pub payload: serde_json::Value,
}

impl SearchCandidate {
    /// Feature map from the payload. Missing or malformed → empty.
    pub fn features(&self) -> BTreeMap<String, String> {
        self.payload
            .get("features")
            .and_then(|f| f.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| feature_value(v).map(|v| (k.clone(), v)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Feature values are strings in scraped data, but numbers show up in
/// hand-entered products.
fn feature_value(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A candidate after the ranking policy ran.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub candidate: SearchCandidate,
    pub score: f64,
}

/// Keys `ProductHit` writes itself; stored payloads must not repeat them.
const HIT_KEYS: &[&str] = &["id", "score", "base_score"];

/// One entry of a search response.
#[derive(Debug, Clone, Serialize)]
pub struct ProductHit {
    pub id: String,
    pub score: f64,
    /// Engine score before feature boosts; omitted when unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_score: Option<f64>,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

impl From<RankedCandidate> for ProductHit {
    fn from(ranked: RankedCandidate) -> Self {
        let base = ranked.candidate.base_score;
        let payload = match ranked.candidate.payload {
            serde_json::Value::Object(mut map) => {
                for key in HIT_KEYS {
                    map.remove(*key);
                }
                serde_json::Value::Object(map)
            }
            other => serde_json::json!({ "payload": other }),
        };
        ProductHit {
            id: ranked.candidate.id,
            score: ranked.score,
            base_score: if (ranked.score - base).abs() > f64::EPSILON {
                Some(base)
            } else {
                None
            },
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_timestamp_accepted() {
        let org: Organization = serde_json::from_value(json!({
            "id": "org_1a2b3c4d",
            "name": "Gorgia",
            "description": null,
            "created_at": "2024-11-20 14:03:11.582941"
        }))
        .unwrap();
        assert_eq!(org.created_at.format("%Y-%m-%d").to_string(), "2024-11-20");
    }

    #[test]
    fn test_rfc3339_timestamp_roundtrip() {
        let org = Organization {
            id: "org_00000000".into(),
            name: "Acme".into(),
            description: Some("tools".into()),
            created_at: Utc::now(),
        };
        let text = serde_json::to_string(&org).unwrap();
        let back: Organization = serde_json::from_str(&text).unwrap();
        assert_eq!(org, back);
    }

    #[test]
    fn test_garbage_timestamp_rejected() {
        let res: Result<Organization, _> = serde_json::from_value(json!({
            "id": "org_x", "name": "x", "created_at": "yesterday"
        }));
        assert!(res.is_err());
    }

    #[test]
    fn test_product_extra_fields_preserved() {
        let product: NewProduct = serde_json::from_value(json!({
            "name": "Fan",
            "description": "Desk fan",
            "price": 49.9,
            "category": "cooling",
            "warranty_months": 24
        }))
        .unwrap();
        assert_eq!(product.extra["warranty_months"], 24);

        let payload = ProductPayload {
            product,
            organization_id: "org_1".into(),
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["warranty_months"], 24);
        assert_eq!(value["organization_id"], "org_1");
        assert_eq!(value["name"], "Fan");
    }

    #[test]
    fn test_embedding_text_falls_back_to_name() {
        let product = NewProduct {
            name: "Cooling fan".into(),
            description: "   ".into(),
            ..Default::default()
        };
        assert_eq!(product.embedding_text(), "Cooling fan");
    }

    #[test]
    fn test_candidate_features_tolerate_numbers() {
        let cand = SearchCandidate {
            id: "p1".into(),
            base_score: 0.5,
            payload: json!({"features": {"წონა": 2, "ფერი": "red", "x": null}}),
        };
        let features = cand.features();
        assert_eq!(features["წონა"], "2");
        assert_eq!(features["ფერი"], "red");
        assert!(!features.contains_key("x"));
    }

    #[test]
    fn test_hit_omits_unchanged_base_score() {
        let ranked = RankedCandidate {
            candidate: SearchCandidate {
                id: "p1".into(),
                base_score: 0.5,
                payload: json!({"name": "Fan"}),
            },
            score: 0.5,
        };
        let hit: ProductHit = ranked.into();
        let value = serde_json::to_value(&hit).unwrap();
        assert!(value.get("base_score").is_none());
        assert_eq!(value["name"], "Fan");
    }

    #[test]
    fn test_hit_drops_colliding_payload_keys() {
        let ranked = RankedCandidate {
            candidate: SearchCandidate {
                id: "p1".into(),
                base_score: 0.4,
                payload: json!({"id": "other", "score": 9.0, "base_score": 1.0, "name": "Fan"}),
            },
            score: 0.5,
        };
        let hit: ProductHit = ranked.into();
        assert!(hit.payload.get("id").is_none());
        assert!(hit.payload.get("score").is_none());

        let text = serde_json::to_string(&hit).unwrap();
        assert_eq!(text.matches("\"id\"").count(), 1);
        assert_eq!(text.matches("\"score\"").count(), 1);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["id"], "p1");
        assert_eq!(value["score"], 0.5);
        assert_eq!(value["base_score"], 0.4);
        assert_eq!(value["name"], "Fan");
    }
}
