//! Record file discovery and JSON I/O.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// One input file and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Plan the file jobs for `input`.
///
/// A file maps to `output` as given. A directory is scanned recursively for `*.json` files
/// and mirrored under `output`, which is then treated as a directory.
pub fn plan_jobs(input: &Path, output: &Path) -> Result<Vec<FileJob>> {
    if input.is_file() {
        return Ok(vec![FileJob {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
        }]);
    }

    if !input.is_dir() {
        anyhow::bail!("Input path not found: {}", input.display());
    }

    info!("Scanning {} for record files", input.display());

    let mut jobs = Vec::new();
    for entry in WalkDir::new(input).follow_links(true).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to scan {}", input.display()))?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let relative = path.strip_prefix(input).unwrap_or(path);
        jobs.push(FileJob {
            input: path.to_path_buf(),
            output: output.join(relative),
        });
    }

    info!("Found {} record files", jobs.len());
    Ok(jobs)
}

pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read record file: {}", path.display()))?;
    let records: Vec<T> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse record file: {}", path.display()))?;
    debug!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Write `records` as a pretty JSON array, creating parent directories.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(records).context("Failed to serialize records")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}
