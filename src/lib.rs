//! # Product Search
//!
//! Hybrid dense + sparse product search for multi-tenant catalogs.
//!
//! Organizations own products. Each product is embedded twice (a dense
//! semantic vector from an embedding API and a local BM25 sparse vector)
//! and stored in a vector engine with its payload. Searches combine both
//! vectors with a selectable strategy, filter on scalar fields, and run the
//! candidates through a ranking policy before paging.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌───────────────┐
//! │  scraper  │──▶│    import    │──▶│ vector engine │
//! │ CSV+HTML  │   │ embed+upsert │   │ dense+sparse  │
//! └───────────┘   └──────────────┘   └───────┬───────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                   ┌──────────┐       ┌──────────┐
//!                   │   CLI    │       │   HTTP   │
//!                   │(psearch) │       │  (axum)  │
//!                   └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! psearch init                                  # write config, create collection
//! psearch org create "Gorgia"
//! psearch scrape listing.csv details.csv
//! psearch clean details.csv catalog.csv
//! psearch import org_1a2b3c4d catalog.csv
//! psearch search "red cooling fan" --org org_1a2b3c4d
//! psearch serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Service error taxonomy |
//! | [`models`] | Organizations, products, candidates |
//! | [`embedding`] | Dense providers and BM25 sparse encoder |
//! | [`store`] | Organization persistence |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | SQLite schema |
//! | [`vector`] | Vector engine adapters |
//! | [`query`] | Hybrid query construction |
//! | [`rerank`] | Ranking policies and page sizing |
//! | [`search`] | Search pipeline |
//! | [`ingest`] | Product ingestion and catalog import |
//! | [`services`] | Shared dependencies |
//! | [`server`] | HTTP API |
//! | [`scraper`] | Catalog scraping and cleanup |

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod query;
pub mod rerank;
pub mod scraper;
pub mod search;
pub mod server;
pub mod services;
pub mod store;
pub mod vector;
