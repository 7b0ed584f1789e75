//! TOML configuration parsing and validation.
//!
//! Every section has serde defaults so a near-empty file is a valid
//! configuration. Credentials are never read from the file; they come from
//! the environment (`QDRANT_API_KEY`, `VOYAGE_API_KEY`, `OPENAI_API_KEY`).
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8000"
//!
//! [store]
//! backend = "json"
//! path = "data/organizations.json"
//!
//! [vector]
//! url = "http://localhost:6333"
//! collection = "products"
//!
//! [embedding]
//! provider = "voyage"
//! model = "voyage-multilingual-2"
//! dims = 1024
//!
//! [search]
//! default_strategy = "dbsf"
//! prefetch_limit = 150
//! prefetch_score_threshold = 0.47
//! score_threshold = 0.49
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::query::SearchStrategy;
use crate::rerank::RankingKind;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sparse: SparseConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
}

// ============ [server] ============

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    /// Include raw upstream error text in 5xx response bodies.
    #[serde(default)]
    pub expose_error_details: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
            expose_error_details: false,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

// ============ [store] ============

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// `json`, `sqlite`, or `memory`.
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
        }
    }
}

fn default_store_backend() -> String {
    "json".to_string()
}
fn default_store_path() -> PathBuf {
    PathBuf::from("organizations.json")
}

// ============ [vector] ============

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    /// `qdrant` or `memory`.
    #[serde(default = "default_vector_backend")]
    pub backend: String,
    #[serde(default = "default_vector_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_dense_name")]
    pub dense_vector_name: String,
    #[serde(default = "default_sparse_name")]
    pub sparse_vector_name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Populated from `QDRANT_API_KEY`; never deserialized.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            url: default_vector_url(),
            collection: default_collection(),
            dense_vector_name: default_dense_name(),
            sparse_vector_name: default_sparse_name(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

fn default_vector_backend() -> String {
    "qdrant".to_string()
}
fn default_vector_url() -> String {
    "http://localhost:6333".to_string()
}
fn default_collection() -> String {
    "products".to_string()
}
fn default_dense_name() -> String {
    "dense".to_string()
}
fn default_sparse_name() -> String {
    "sparse".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

// ============ [embedding] ============

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `voyage`, `openai`, `local`, or `disabled`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL override (proxies, self-hosted gateways).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "voyage".to_string()
}
fn default_model() -> String {
    "voyage-multilingual-2".to_string()
}
fn default_dims() -> usize {
    1024
}

// ============ [sparse] ============

#[derive(Debug, Deserialize, Clone)]
pub struct SparseConfig {
    #[serde(default = "default_k1")]
    pub k1: f32,
    #[serde(default = "default_b")]
    pub b: f32,
    #[serde(default = "default_avg_doc_len")]
    pub avg_doc_len: f32,
    #[serde(default = "default_true")]
    pub stopwords: bool,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
            avg_doc_len: default_avg_doc_len(),
            stopwords: true,
        }
    }
}

fn default_k1() -> f32 {
    1.2
}
fn default_b() -> f32 {
    0.75
}
fn default_avg_doc_len() -> f32 {
    256.0
}
fn default_true() -> bool {
    true
}

// ============ [search] ============

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default)]
    pub default_strategy: SearchStrategy,
    #[serde(default)]
    pub default_ranking: RankingKind,
    /// Per-branch result cap for prefetch sub-queries.
    #[serde(default = "default_prefetch_limit")]
    pub prefetch_limit: usize,
    #[serde(default)]
    pub prefetch_score_threshold: Option<f32>,
    /// Final acceptance threshold applied by the engine.
    #[serde(default)]
    pub score_threshold: Option<f32>,
    /// Minimum number of candidates requested from the engine.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Pass-through ranking never returns fewer results than this when
    /// enough candidates exist. `0` disables the clamp.
    #[serde(default = "default_min_results")]
    pub min_results: usize,
    #[serde(default = "default_true")]
    pub scope_to_organization: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_strategy: SearchStrategy::default(),
            default_ranking: RankingKind::default(),
            prefetch_limit: default_prefetch_limit(),
            prefetch_score_threshold: None,
            score_threshold: None,
            candidate_limit: default_candidate_limit(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            min_results: default_min_results(),
            scope_to_organization: true,
        }
    }
}

fn default_prefetch_limit() -> usize {
    20
}
fn default_candidate_limit() -> usize {
    200
}
fn default_limit() -> usize {
    50
}
fn default_max_limit() -> usize {
    100
}
fn default_min_results() -> usize {
    50
}

// ============ [ranking] ============

#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    #[serde(default = "default_brand_boost")]
    pub brand_boost: f64,
    #[serde(default = "default_designation_boost")]
    pub designation_boost: f64,
    #[serde(default = "default_dimension_boost")]
    pub dimension_boost: f64,
    #[serde(default = "default_brand_keys")]
    pub brand_keys: Vec<String>,
    #[serde(default = "default_designation_keys")]
    pub designation_keys: Vec<String>,
    #[serde(default = "default_dimension_keys")]
    pub dimension_keys: Vec<String>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            brand_boost: default_brand_boost(),
            designation_boost: default_designation_boost(),
            dimension_boost: default_dimension_boost(),
            brand_keys: default_brand_keys(),
            designation_keys: default_designation_keys(),
            dimension_keys: default_dimension_keys(),
        }
    }
}

fn default_brand_boost() -> f64 {
    1.25
}
fn default_designation_boost() -> f64 {
    1.35
}
fn default_dimension_boost() -> f64 {
    1.25
}
fn default_brand_keys() -> Vec<String> {
    vec!["ბრენდი".to_string(), "brand".to_string()]
}
fn default_designation_keys() -> Vec<String> {
    vec![
        "დანიშნულება".to_string(),
        "დასახელება".to_string(),
        "designation".to_string(),
        "name".to_string(),
    ]
}
fn default_dimension_keys() -> Vec<String> {
    [
        "ფერი",
        "ქვეყანა",
        "წონა",
        "მოცულობა",
        "სიგრძე",
        "სიგანე",
        "color",
        "country",
        "weight",
        "volume",
        "length",
        "width",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ============ [scraper] ============

#[derive(Debug, Deserialize, Clone)]
pub struct ScraperConfig {
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Link text the storefront appends to feature values ("find similar").
    #[serde(default = "default_similar_marker")]
    pub similar_marker: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            similar_marker: default_similar_marker(),
        }
    }
}

fn default_delay_ms() -> u64 {
    1000
}
fn default_user_agent() -> String {
    concat!("psearch-scraper/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_similar_marker() -> String {
    "იპოვე მსგავსი".to_string()
}

// ============ Loading ============

/// Read, parse, apply environment overrides, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    apply_env_overrides(&mut config)?;
    validate(&config)?;
    Ok(config)
}

/// Defaults plus environment overrides, for commands that can run without
/// a config file (`scrape`, `clean`).
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        return load_config(path);
    }
    let mut config = Config::default();
    apply_env_overrides(&mut config)?;
    validate(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Ok(url) = std::env::var("QDRANT_URL") {
        config.vector.url = url;
    }
    config.vector.api_key = std::env::var("QDRANT_API_KEY").ok();

    if let Ok(port) = std::env::var("PORT") {
        let port: u16 = port
            .parse()
            .with_context(|| format!("PORT must be a valid port number, got '{}'", port))?;
        config.server.bind = replace_port(&config.server.bind, port);
    }
    Ok(())
}

/// Swap the port of a `host:port` bind address, keeping the host.
fn replace_port(bind: &str, port: u16) -> String {
    let host = match bind.rsplit_once(':') {
        Some((host, _)) => host,
        None => bind,
    };
    format!("{}:{}", host, port)
}

fn validate(config: &Config) -> Result<()> {
    match config.store.backend.as_str() {
        "json" | "sqlite" | "memory" => {}
        other => bail!(
            "Unknown store backend: '{}'. Must be json, sqlite, or memory.",
            other
        ),
    }

    match config.vector.backend.as_str() {
        "qdrant" | "memory" => {}
        other => bail!(
            "Unknown vector backend: '{}'. Must be qdrant or memory.",
            other
        ),
    }
    if config.vector.collection.trim().is_empty() {
        bail!("vector.collection must not be empty");
    }
    if config.vector.dense_vector_name == config.vector.sparse_vector_name {
        bail!("vector.dense_vector_name and vector.sparse_vector_name must differ");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "voyage" | "openai" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be voyage, openai, local, or disabled.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }

    if config.sparse.k1 <= 0.0 {
        bail!("sparse.k1 must be > 0");
    }
    if !(0.0..=1.0).contains(&config.sparse.b) {
        bail!("sparse.b must be in [0.0, 1.0]");
    }
    if config.sparse.avg_doc_len <= 0.0 {
        bail!("sparse.avg_doc_len must be > 0");
    }

    let search = &config.search;
    if search.prefetch_limit == 0 {
        bail!("search.prefetch_limit must be >= 1");
    }
    if search.max_limit == 0 {
        bail!("search.max_limit must be >= 1");
    }
    if search.default_limit == 0 || search.default_limit > search.max_limit {
        bail!("search.default_limit must be in [1, search.max_limit]");
    }
    if search.candidate_limit == 0 {
        bail!("search.candidate_limit must be >= 1");
    }

    for (name, value) in [
        ("ranking.brand_boost", config.ranking.brand_boost),
        ("ranking.designation_boost", config.ranking.designation_boost),
        ("ranking.dimension_boost", config.ranking.dimension_boost),
    ] {
        if value <= 0.0 {
            bail!("{} must be > 0", name);
        }
    }

    Ok(())
}
