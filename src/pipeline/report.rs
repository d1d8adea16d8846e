//! Review report output.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::region::ReviewItem;

#[derive(Debug, Serialize)]
struct ReviewRow<'a> {
    record_id: &'a str,
    city: &'a str,
    lat: f64,
    lon: f64,
    province: String,
    county: String,
    reason: &'static str,
    detail: String,
}

impl<'a> From<&'a ReviewItem> for ReviewRow<'a> {
    fn from(item: &'a ReviewItem) -> Self {
        Self {
            record_id: &item.record_id,
            city: &item.city,
            lat: item.coordinates.lat,
            lon: item.coordinates.lon,
            province: item.province.to_string(),
            county: item.county.to_string(),
            reason: item.reason.code(),
            detail: item.reason.detail(),
        }
    }
}

/// Write review items as CSV with a header row.
pub fn write_review_csv(path: &Path, items: &[ReviewItem]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create review report: {}", path.display()))?;
    for item in items {
        writer
            .serialize(ReviewRow::from(item))
            .context("Failed to write review row")?;
    }
    writer.flush().context("Failed to flush review report")?;
    Ok(())
}
