//! Sequential catalog scraping.
//!
//! Reads a listing CSV (must have a `Product_URL` column), fetches each page
//! in order with `scraper.delay_ms` between requests, and writes every input
//! column plus `code` and `features`. A failed fetch or a non-200 response
//! leaves both new columns empty for that row. There is no retry and no
//! checkpoint: rerun the whole file.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use super::parser::parse_product_page;
use crate::config::ScraperConfig;

const URL_COLUMN: &str = "Product_URL";
const NAME_COLUMN: &str = "Name";

/// Fetches a page body. `Ok(None)` means the server answered with a
/// non-success status.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Option<String>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<String>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status.as_u16() != 200 {
            tracing::warn!(url, status = status.as_u16(), "unexpected status");
            return Ok(None);
        }
        Ok(Some(response.text().await?))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeReport {
    pub rows: usize,
    pub scraped: usize,
    pub failed: usize,
}

/// Scrape every row of `input` into `output`.
pub async fn scrape_catalog(
    config: &ScraperConfig,
    fetcher: &dyn Fetcher,
    input: &Path,
    output: &Path,
) -> Result<ScrapeReport> {
    let mut reader = csv::Reader::from_path(input)
        .with_context(|| format!("Failed to open listing: {}", input.display()))?;
    let headers = reader.headers()?.clone();

    let Some(url_idx) = headers.iter().position(|h| h == URL_COLUMN) else {
        bail!("{} has no {} column", input.display(), URL_COLUMN);
    };
    let name_idx = headers.iter().position(|h| h == NAME_COLUMN);
    // Existing code/features columns are overwritten in place.
    let code_idx = headers.iter().position(|h| h == "code");
    let features_idx = headers.iter().position(|h| h == "features");

    let records: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;

    let mut out_headers: Vec<String> = headers.iter().map(str::to_string).collect();
    if code_idx.is_none() {
        out_headers.push("code".to_string());
    }
    if features_idx.is_none() {
        out_headers.push("features".to_string());
    }

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(&out_headers)?;

    let delay = Duration::from_millis(config.delay_ms);
    let mut report = ScrapeReport {
        rows: records.len(),
        ..Default::default()
    };

    for (i, record) in records.iter().enumerate() {
        let url = record.get(url_idx).unwrap_or("").trim();
        let name = name_idx.and_then(|n| record.get(n)).unwrap_or("");
        eprintln!("[{}/{}] {}", i + 1, records.len(), name);

        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let details = if url.is_empty() {
            None
        } else {
            match fetcher.fetch(url).await {
                Ok(Some(html)) => match parse_product_page(&html, &config.similar_marker) {
                    Ok(d) => Some(d),
                    Err(e) => {
                        tracing::warn!(url, error = %e, "parse failed");
                        None
                    }
                },
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(url, error = %e, "fetch failed");
                    None
                }
            }
        };

        let (code, features) = match details {
            Some(d) => {
                report.scraped += 1;
                eprintln!("  code: {}  features: {}", d.code, d.features.len());
                (d.code, serde_json::to_string(&d.features)?)
            }
            None => {
                report.failed += 1;
                eprintln!("  failed");
                (String::new(), String::new())
            }
        };

        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(headers.len(), String::new());
        match code_idx {
            Some(idx) => row[idx] = code,
            None => row.push(code),
        }
        match features_idx {
            Some(idx) => row[idx] = features,
            None => row.push(features),
        }
        writer.write_record(&row)?;
    }

    writer.flush()?;
    tracing::info!(
        rows = report.rows,
        scraped = report.scraped,
        failed = report.failed,
        output = %output.display(),
        "scrape complete"
    );
    Ok(report)
}
