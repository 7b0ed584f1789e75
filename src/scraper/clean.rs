//! Catalog cleanup: keep only rows with a product code and a non-empty
//! features object.

use anyhow::{Context, Result};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanReport {
    pub initial: usize,
    pub with_code: usize,
    pub kept: usize,
}

impl CleanReport {
    pub fn percent_kept(&self) -> f64 {
        if self.initial == 0 {
            0.0
        } else {
            self.kept as f64 / self.initial as f64 * 100.0
        }
    }
}

fn has_features(raw: &str) -> bool {
    matches!(
        serde_json::from_str::<serde_json::Value>(raw),
        Ok(serde_json::Value::Object(map)) if !map.is_empty()
    )
}

pub fn clean_catalog(input: &Path, output: &Path) -> Result<CleanReport> {
    let mut reader = csv::Reader::from_path(input)
        .with_context(|| format!("Failed to open catalog: {}", input.display()))?;
    let headers = reader.headers()?.clone();
    let code_idx = headers.iter().position(|h| h == "code");
    let features_idx = headers.iter().position(|h| h == "features");

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(&headers)?;

    let mut report = CleanReport::default();
    for record in reader.records() {
        let record = record?;
        report.initial += 1;

        let code = code_idx.and_then(|i| record.get(i)).unwrap_or("");
        if code.trim().is_empty() {
            continue;
        }
        report.with_code += 1;

        let features = features_idx.and_then(|i| record.get(i)).unwrap_or("");
        if !has_features(features) {
            continue;
        }
        report.kept += 1;
        writer.write_record(&record)?;
    }
    writer.flush()?;

    Ok(report)
}
