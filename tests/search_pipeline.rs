//! End-to-end search pipeline over the in-memory engine.

mod common;

use common::*;
use product_search::error::ErrorKind;
use product_search::ingest::create_product;
use product_search::query::SearchStrategy;
use product_search::rerank::RankingKind;
use product_search::search::{search_products, SearchParams};

fn params(query: &str) -> SearchParams {
    SearchParams {
        query: query.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_ingest_then_search_finds_product() {
    let services = services().await;
    let org = create_org(&services, "Gorgia").await;

    let fan = create_product(
        &services,
        &org.id,
        product("Desk fan", "quiet red cooling fan", 49.0, "cooling"),
    )
    .await
    .unwrap();
    create_product(
        &services,
        &org.id,
        product("Heater", "oil radiator heater", 120.0, "heating"),
    )
    .await
    .unwrap();

    let resp = search_products(&services, Some(&org.id), &params("cooling fan"))
        .await
        .unwrap();
    assert_eq!(resp.results[0].id, fan.id);
    assert_eq!(resp.results[0].payload["name"], "Desk fan");
    assert_eq!(resp.results[0].payload["organization_id"], org.id.as_str());
}

#[tokio::test]
async fn test_unknown_organization() {
    let services = services().await;
    let err = search_products(&services, Some("org_deadbeef"), &params("fan"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = create_product(&services, "org_deadbeef", product("Fan", "fan", 1.0, "x"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_minimum_fifty_results() {
    let services = services().await;
    let org = create_org(&services, "Bulk").await;
    for i in 0..60 {
        create_product(
            &services,
            &org.id,
            product(&format!("Fan {}", i), &format!("fan model {}", i), 10.0, "cooling"),
        )
        .await
        .unwrap();
    }

    let mut p = params("fan");
    p.limit = Some(25);
    p.search_strategy = Some("dense".to_string());
    let resp = search_products(&services, Some(&org.id), &p).await.unwrap();
    assert_eq!(resp.total, 60);
    assert_eq!(resp.results.len(), 50);
}

#[tokio::test]
async fn test_feature_boost_multiplies_brand() {
    let services = services().await;
    let org = create_org(&services, "Brands").await;
    create_product(
        &services,
        &org.id,
        with_features(
            product("Fan", "desk fan", 30.0, "cooling"),
            &[("brand", "Acme")],
        ),
    )
    .await
    .unwrap();

    let mut p = params("Acme fan");
    p.ranking = Some("feature_boost".to_string());
    p.search_strategy = Some("dense".to_string());
    let resp = search_products(&services, Some(&org.id), &p).await.unwrap();
    assert_eq!(resp.ranking, RankingKind::FeatureBoost);
    let hit = &resp.results[0];
    let base = hit.base_score.expect("boosted hit reports its base score");
    assert!((hit.score - base * 1.25).abs() < 1e-9);
}

#[tokio::test]
async fn test_unmatched_features_keep_base_score() {
    let services = services().await;
    let org = create_org(&services, "Plain").await;
    create_product(
        &services,
        &org.id,
        with_features(
            product("Fan", "red cooling fan", 30.0, "cooling"),
            &[("brand", "Fan Corp"), ("წონა", "2")],
        ),
    )
    .await
    .unwrap();

    let mut p = params("red cooling fan");
    p.ranking = Some("feature_boost".to_string());
    let resp = search_products(&services, Some(&org.id), &p).await.unwrap();
    assert!(resp.results[0].base_score.is_none());
}

#[tokio::test]
async fn test_unknown_strategy_falls_back_to_prefetch() {
    let services = services().await;
    let org = create_org(&services, "S").await;
    create_product(&services, &org.id, product("Fan", "fan", 1.0, "c"))
        .await
        .unwrap();

    let mut p = params("fan");
    p.search_strategy = Some("telepathy".to_string());
    let resp = search_products(&services, Some(&org.id), &p).await.unwrap();
    assert_eq!(resp.strategy, SearchStrategy::Prefetch);
    assert_eq!(resp.results.len(), 1);
}

#[tokio::test]
async fn test_every_strategy_returns_results() {
    let services = services().await;
    let org = create_org(&services, "All").await;
    create_product(&services, &org.id, product("Fan", "blue fan", 1.0, "c"))
        .await
        .unwrap();

    for strategy in ["dense", "sparse", "rrf", "dbsf", "prefetch"] {
        let mut p = params("blue fan");
        p.search_strategy = Some(strategy.to_string());
        let resp = search_products(&services, Some(&org.id), &p).await.unwrap();
        assert_eq!(resp.strategy.as_str(), strategy);
        assert_eq!(resp.results.len(), 1, "strategy {}", strategy);
    }
}

#[tokio::test]
async fn test_pagination_bounded_by_total() {
    let services = services().await;
    let org = create_org(&services, "Pages").await;
    for i in 0..12 {
        create_product(
            &services,
            &org.id,
            product(&format!("Lamp {}", i), "desk lamp", 5.0, "lighting"),
        )
        .await
        .unwrap();
    }

    for offset in [0, 5, 10, 12, 40] {
        let mut p = params("lamp");
        p.limit = Some(5);
        p.offset = offset;
        p.search_strategy = Some("dense".to_string());
        let resp = search_products(&services, Some(&org.id), &p).await.unwrap();
        assert!(offset.min(resp.total) + resp.results.len() <= resp.total);
    }
}

#[tokio::test]
async fn test_huge_offset_returns_empty_page() {
    let services = services().await;
    let org = create_org(&services, "Far").await;
    create_product(&services, &org.id, product("Fan", "desk fan", 20.0, "cooling"))
        .await
        .unwrap();

    let mut p = params("fan");
    p.offset = usize::MAX;
    let resp = search_products(&services, Some(&org.id), &p).await.unwrap();
    assert_eq!(resp.total, 1);
    assert!(resp.results.is_empty());
    assert_eq!(resp.offset, usize::MAX);
}

#[tokio::test]
async fn test_organization_scoping_and_filters() {
    let services = services().await;
    let a = create_org(&services, "A").await;
    let b = create_org(&services, "B").await;
    create_product(&services, &a.id, product("Fan A", "fan", 20.0, "cooling"))
        .await
        .unwrap();
    create_product(&services, &b.id, product("Fan B", "fan", 80.0, "cooling"))
        .await
        .unwrap();

    let resp = search_products(&services, Some(&a.id), &params("fan"))
        .await
        .unwrap();
    assert_eq!(resp.total, 1);
    assert_eq!(resp.results[0].payload["name"], "Fan A");

    let mut p = params("fan");
    p.min_price = Some(50.0);
    let resp = search_products(&services, None, &p).await.unwrap();
    assert_eq!(resp.total, 1);
    assert_eq!(resp.results[0].payload["name"], "Fan B");

    let mut p = params("fan");
    p.category = Some("heating".to_string());
    let resp = search_products(&services, None, &p).await.unwrap();
    assert_eq!(resp.total, 0);
}

#[tokio::test]
async fn test_bad_requests() {
    let services = services().await;
    let err = search_products(&services, None, &params("   "))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let mut p = params("fan");
    p.min_price = Some(10.0);
    p.max_price = Some(5.0);
    let err = search_products(&services, None, &p).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_document_embeddings_are_deterministic() {
    let services = services().await;
    let a = services
        .embeddings
        .embed_document("quiet red cooling fan")
        .await
        .unwrap();
    let b = services
        .embeddings
        .embed_document("quiet red cooling fan")
        .await
        .unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_blank_description_embeds_name() {
    let services = services().await;
    let org = create_org(&services, "Names").await;
    let stored = create_product(&services, &org.id, product("Cooling fan", "", 9.0, "c"))
        .await
        .unwrap();

    let mut p = params("Cooling fan");
    p.search_strategy = Some("sparse".to_string());
    let resp = search_products(&services, Some(&org.id), &p).await.unwrap();
    assert_eq!(resp.results[0].id, stored.id);
}
