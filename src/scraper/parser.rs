//! Product page parsing.
//!
//! Extracts from a storefront product page:
//! - the product code: text of the first `span` whose id starts with
//!   `product_code_`;
//! - feature pairs: each `div.ty-product-feature` with a
//!   `div.ty-product-feature__label` and `div.ty-product-feature__value`.
//!
//! Labels lose their colons. Values lose the "find similar" link text and
//! have whitespace collapsed; empty values are dropped.

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductDetails {
    pub code: String,
    pub features: BTreeMap<String, String>,
}

struct Selectors {
    code: Selector,
    feature: Selector,
    label: Selector,
    value: Selector,
}

impl Selectors {
    fn new() -> Result<Self> {
        let parse = |s: &str| Selector::parse(s).map_err(|e| anyhow!("invalid selector {}: {:?}", s, e));
        Ok(Self {
            code: parse(r#"span[id^="product_code_"]"#)?,
            feature: parse("div.ty-product-feature")?,
            label: parse("div.ty-product-feature__label")?,
            value: parse("div.ty-product-feature__value")?,
        })
    }
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

pub fn clean_label(raw: &str) -> String {
    raw.trim().replace(':', "")
}

pub fn clean_value(raw: &str, similar_marker: &str) -> String {
    let stripped = if similar_marker.is_empty() {
        raw.to_string()
    } else {
        raw.replace(similar_marker, "")
    };
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn parse_product_page(html: &str, similar_marker: &str) -> Result<ProductDetails> {
    let selectors = Selectors::new()?;
    let document = Html::parse_document(html);

    let code = document
        .select(&selectors.code)
        .next()
        .map(|e| text_of(e).trim().to_string())
        .unwrap_or_default();

    let mut features = BTreeMap::new();
    for feature in document.select(&selectors.feature) {
        let label = feature.select(&selectors.label).next();
        let value = feature.select(&selectors.value).next();
        if let (Some(label), Some(value)) = (label, value) {
            let label = clean_label(&text_of(label));
            let value = clean_value(&text_of(value), similar_marker);
            if !value.is_empty() {
                features.insert(label, value);
            }
        }
    }

    Ok(ProductDetails { code, features })
}
