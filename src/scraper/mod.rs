//! Offline catalog tooling.
//!
//! Builds the product catalog that `psearch import` loads:
//!
//! 1. [`catalog::scrape_catalog`] visits every `Product_URL` in a listing CSV
//!    and adds the storefront product `code` and a `features` JSON column.
//! 2. [`clean::clean_catalog`] drops rows without a code or without features.
//!
//! Page parsing lives in [`parser`] and is independent of the network.

pub mod catalog;
pub mod clean;
pub mod parser;

pub use catalog::{scrape_catalog, Fetcher, HttpFetcher, ScrapeReport};
pub use clean::{clean_catalog, CleanReport};
pub use parser::{parse_product_page, ProductDetails};
