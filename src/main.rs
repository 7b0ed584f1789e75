//! # Product Search CLI (`psearch`)
//!
//! ## Usage
//!
//! ```bash
//! psearch --config ./config/search.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `psearch init` | Write a default config if missing, open the store, create the collection |
//! | `psearch serve` | Start the HTTP API |
//! | `psearch org create\|get\|list` | Manage organizations |
//! | `psearch search "<query>"` | Search products |
//! | `psearch import <org> <csv>` | Embed and store a catalog CSV |
//! | `psearch scrape <in> <out>` | Add product codes and features to a listing CSV |
//! | `psearch clean <in> <out>` | Drop catalog rows without code or features |
//! | `psearch info` | Show vector collection statistics |
//! | `psearch completions <shell>` | Print shell completions |

use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use product_search::config::{self, Config};
use product_search::models::NewOrganization;
use product_search::scraper::{clean_catalog, scrape_catalog, HttpFetcher};
use product_search::search::{run_search, SearchParams};
use product_search::services::Services;
use product_search::store::create_store;
use product_search::{ingest, server};

/// Hybrid dense + sparse product search.
#[derive(Parser)]
#[command(name = "psearch", version, about = "Hybrid dense + sparse product search")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/search.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config (if missing), open the organization store and
    /// create the vector collection. Idempotent.
    Init,

    /// Start the HTTP API on `server.bind`.
    Serve,

    /// Manage organizations.
    Org {
        #[command(subcommand)]
        action: OrgAction,
    },

    /// Search products.
    Search {
        query: String,

        /// Restrict to one organization.
        #[arg(long)]
        org: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        min_price: Option<f64>,

        #[arg(long)]
        max_price: Option<f64>,

        #[arg(long)]
        min_discount: Option<f64>,

        /// `dense`, `sparse`, `rrf`, `dbsf` or `prefetch`.
        #[arg(long)]
        strategy: Option<String>,

        /// `passthrough` or `feature_boost`.
        #[arg(long)]
        ranking: Option<String>,

        /// Print the raw JSON response.
        #[arg(long)]
        json: bool,
    },

    /// Embed and store every row of a catalog CSV under an organization.
    Import {
        org_id: String,
        path: PathBuf,

        /// Validate rows without embedding or writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of rows to import.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Fetch each `Product_URL` and add `code` and `features` columns.
    Scrape {
        input: PathBuf,
        output: PathBuf,

        /// Override `scraper.delay_ms`.
        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Keep only rows with a product code and a non-empty features object.
    Clean { input: PathBuf, output: PathBuf },

    /// Show vector collection statistics.
    Info,

    /// Print shell completions.
    Completions { shell: clap_complete::Shell },
}

#[derive(Subcommand)]
enum OrgAction {
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Get {
        id: String,
    },
    List,
}

const DEFAULT_CONFIG: &str = r#"[server]
bind = "0.0.0.0:8000"
cors_origins = ["http://localhost:3000"]

[store]
backend = "json"
path = "data/organizations.json"

[vector]
backend = "qdrant"
url = "http://localhost:6333"
collection = "products"

[embedding]
provider = "voyage"
model = "voyage-multilingual-2"
dims = 1024

[search]
default_strategy = "prefetch"
default_ranking = "passthrough"
prefetch_limit = 20
min_results = 50
"#;

fn write_default_config(path: &Path) -> anyhow::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, DEFAULT_CONFIG)?;
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that run without a config file
    match &cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "psearch", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Scrape {
            input,
            output,
            delay_ms,
        } => {
            let cfg = config::load_or_default(&cli.config)?;
            let mut scraper_cfg = cfg.scraper.clone();
            if let Some(ms) = delay_ms {
                scraper_cfg.delay_ms = *ms;
            }
            let fetcher = HttpFetcher::new(&scraper_cfg)?;
            let report = scrape_catalog(&scraper_cfg, &fetcher, input, output).await?;
            println!("scrape {}", input.display());
            println!("  rows: {}", report.rows);
            println!("  scraped: {}", report.scraped);
            println!("  failed: {}", report.failed);
            println!("  written: {}", output.display());
            return Ok(());
        }
        Commands::Clean { input, output } => {
            let report = clean_catalog(input, output)?;
            println!("clean {}", input.display());
            println!("  initial rows: {}", report.initial);
            println!(
                "  removed (empty code): {}",
                report.initial - report.with_code
            );
            println!(
                "  removed (invalid features): {}",
                report.with_code - report.kept
            );
            println!("  kept: {} ({:.2}%)", report.kept, report.percent_kept());
            println!("  written: {}", output.display());
            return Ok(());
        }
        Commands::Init => {
            if write_default_config(&cli.config)? {
                println!("Wrote default config to {}", cli.config.display());
            }
        }
        _ => {}
    }

    let cfg: Config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            create_store(&cfg.store).await?;
            match Services::from_config(&cfg).await {
                Ok(services) => services.prepare_collection().await,
                Err(e) => eprintln!("Skipping collection setup: {}", e),
            }
            println!("Initialized ({} store, {} vector backend).", cfg.store.backend, cfg.vector.backend);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Org { action } => {
            let store = create_store(&cfg.store).await?;
            match action {
                OrgAction::Create { name, description } => {
                    let org = store.create(NewOrganization { name, description }).await?;
                    println!("{}", serde_json::to_string_pretty(&org)?);
                }
                OrgAction::Get { id } => match store.get(&id).await? {
                    Some(org) => println!("{}", serde_json::to_string_pretty(&org)?),
                    None => anyhow::bail!("Organization not found: {}", id),
                },
                OrgAction::List => {
                    let orgs = store.list().await?;
                    if orgs.is_empty() {
                        println!("No organizations.");
                    }
                    for org in orgs {
                        println!(
                            "{}  {}  {}",
                            org.id,
                            org.created_at.format("%Y-%m-%d %H:%M:%S"),
                            org.name
                        );
                    }
                }
            }
        }
        Commands::Search {
            query,
            org,
            limit,
            offset,
            category,
            min_price,
            max_price,
            min_discount,
            strategy,
            ranking,
            json,
        } => {
            let params = SearchParams {
                query,
                limit,
                offset,
                category,
                min_price,
                max_price,
                min_discount,
                search_strategy: strategy,
                ranking,
            };
            run_search(&cfg, org.as_deref(), params, json).await?;
        }
        Commands::Import {
            org_id,
            path,
            dry_run,
            limit,
        } => {
            ingest::import_catalog(&cfg, &org_id, &path, dry_run, limit).await?;
        }
        Commands::Info => {
            let services = Services::from_config(&cfg).await?;
            let info = services.index.collection_info().await?;
            println!("collection: {}", info.name);
            println!("  status: {}", info.status);
            println!("  points: {}", info.points_count);
            match info.dense_dims {
                Some(d) => println!("  dense dims: {}", d),
                None => println!("  dense dims: unknown"),
            }
        }
        Commands::Scrape { .. } | Commands::Clean { .. } | Commands::Completions { .. } => {
            unreachable!("handled before config load")
        }
    }

    Ok(())
}
