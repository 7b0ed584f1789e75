//! Product search pipeline.
//!
//! ```text
//! params ──► validate ──► embed query ──► build HybridQuery ──► engine
//!                                                                 │
//!   response ◄── slice [offset, offset+page) ◄── rank (policy) ◄──┘
//! ```
//!
//! The engine is asked for `max(search.candidate_limit, offset + max_page)`
//! candidates. `total` counts the ranked candidates, so
//! `offset + results.len() <= total` always holds.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::Config;
use crate::error::{ServiceError, ServiceResult};
use crate::models::ProductHit;
use crate::query::{build_query, ProductFilter, SearchStrategy};
use crate::rerank::{RankingKind, RankingPolicy};
use crate::services::Services;

/// Query-string parameters of the search endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_discount: Option<f64>,
    pub search_strategy: Option<String>,
    pub ranking: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub strategy: SearchStrategy,
    pub ranking: RankingKind,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub results: Vec<ProductHit>,
}

/// Run a search, optionally scoped to one organization.
///
/// # Errors
///
/// `BadRequest` for an empty query, a zero limit, or an inverted price
/// range; `NotFound` for an unknown organization; remote failures keep the
/// kind assigned by the embedding or engine adapter.
pub async fn search_products(
    services: &Services,
    org_id: Option<&str>,
    params: &SearchParams,
) -> ServiceResult<SearchResponse> {
    let config = &services.config.search;
    let started = Instant::now();

    let query = params.query.trim();
    if query.is_empty() {
        return Err(ServiceError::BadRequest(
            "query must not be empty".to_string(),
        ));
    }
    let limit = params.limit.unwrap_or(config.default_limit);
    if limit == 0 {
        return Err(ServiceError::BadRequest("limit must be >= 1".to_string()));
    }
    let limit = limit.min(config.max_limit);
    if let (Some(lo), Some(hi)) = (params.min_price, params.max_price) {
        if lo > hi {
            return Err(ServiceError::BadRequest(
                "min_price must not exceed max_price".to_string(),
            ));
        }
    }

    if let Some(id) = org_id {
        services
            .organizations
            .get(id)
            .await?
            .ok_or_else(ServiceError::organization_not_found)?;
    }

    let strategy = SearchStrategy::resolve(params.search_strategy.as_deref(), config.default_strategy);
    let ranking = RankingKind::resolve(params.ranking.as_deref(), config.default_ranking);
    let policy = RankingPolicy::from_config(ranking, config, &services.config.ranking);

    let filter = ProductFilter {
        category: params.category.clone(),
        min_price: params.min_price,
        max_price: params.max_price,
        min_discount: params.min_discount,
        organization_id: org_id
            .filter(|_| config.scope_to_organization)
            .map(str::to_string),
    }
    .to_filter();

    let embeddings = services.embeddings.embed_query(query).await?;
    let engine_limit = config
        .candidate_limit
        .max(params.offset.saturating_add(policy.max_page(limit)));
    let hybrid = build_query(config, strategy, &embeddings, filter, engine_limit);
    let candidates = services.index.query(&hybrid).await?;

    let ranked = policy.rank(query, candidates);
    let total = ranked.len();
    let start = params.offset.min(total);
    let page = policy.page_size(limit, total - start);

    let results: Vec<ProductHit> = ranked
        .into_iter()
        .skip(start)
        .take(page)
        .map(ProductHit::from)
        .collect();

    tracing::info!(
        org_id = org_id.unwrap_or("*"),
        strategy = %strategy,
        ranking = ranking.as_str(),
        total,
        returned = results.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "search"
    );

    Ok(SearchResponse {
        query: query.to_string(),
        strategy,
        ranking,
        total,
        offset: params.offset,
        limit,
        results,
    })
}

/// CLI entry point for `psearch search`.
pub async fn run_search(config: &Config, org_id: Option<&str>, params: SearchParams, json: bool) -> Result<()> {
    let services = Services::from_config(config).await?;
    let response = search_products(&services, org_id, &params).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!(
        "{} of {} results (strategy: {}, ranking: {})",
        response.results.len(),
        response.total,
        response.strategy,
        response.ranking.as_str()
    );
    for (i, hit) in response.results.iter().enumerate() {
        let name = hit.payload.get("name").and_then(|v| v.as_str()).unwrap_or("-");
        let price = hit
            .payload
            .get("price")
            .and_then(|v| v.as_f64())
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>3}. [{:.4}] {}  ({})",
            response.offset + i + 1,
            hit.score,
            name,
            price
        );
        println!("     id: {}", hit.id);
    }
    Ok(())
}
