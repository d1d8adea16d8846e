//! Resolve pass: raw records in, enriched records out.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::records::{plan_jobs, read_records, write_records};
use super::{with_flushed_cache, Pipeline};
use crate::geocode::GeocodingProvider;
use crate::models::{EnrichedRecord, RawRecord, Tier};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveSummary {
    pub files: usize,
    pub records: usize,
    pub by_tier: BTreeMap<Tier, usize>,
}

impl ResolveSummary {
    fn count(&mut self, records: &[EnrichedRecord]) {
        self.records += records.len();
        for tier in records.iter().filter_map(|r| r.tier) {
            *self.by_tier.entry(tier).or_default() += 1;
        }
    }

    pub fn tier_count(&self, tier: Tier) -> usize {
        self.by_tier.get(&tier).copied().unwrap_or(0)
    }

    pub fn log(&self) {
        info!("Resolved {} records from {} files", self.records, self.files);
        for tier in Tier::all() {
            info!("  {}: {}", tier, self.tier_count(*tier));
        }
    }
}

pub(super) fn progress_bar(len: u64, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

impl<P: GeocodingProvider> Pipeline<P> {
    /// Resolve `records` with bounded concurrency, preserving input order.
    ///
    /// The cache is flushed every `flush_every` records; the final flush is the caller's job
    /// (see [`with_flushed_cache`]).
    pub async fn resolve_records(&self, records: Vec<RawRecord>) -> Result<Vec<EnrichedRecord>> {
        let progress = progress_bar(records.len() as u64, self.settings.show_progress);
        let resolver = self.resolver.as_ref();

        let mut resolved = stream::iter(records)
            .map(|raw| async move {
                let location = resolver.resolve(&raw.to_query()).await;
                raw.enrich(location)
            })
            .buffered(self.settings.concurrency.max(1));

        // `buffered` yields in input order
        let mut enriched = Vec::new();
        let mut since_flush = 0;

        while let Some(record) = resolved.next().await {
            enriched.push(record);
            progress.inc(1);

            since_flush += 1;
            if since_flush >= self.settings.flush_every {
                self.cache
                    .flush_if_dirty()
                    .context("Periodic cache flush failed")?;
                since_flush = 0;
            }
        }

        progress.finish_and_clear();
        Ok(enriched)
    }

    /// Resolve every record file under `input` into `output`. The cache is flushed at the
    /// end whether or not the pass succeeds.
    pub async fn resolve_path(&self, input: &Path, output: &Path) -> Result<ResolveSummary> {
        with_flushed_cache(&self.cache, || async move {
            let mut summary = ResolveSummary::default();

            // One output file per input file
            for job in plan_jobs(input, output)? {
                let raw: Vec<RawRecord> = read_records(&job.input)?;
                info!("Resolving {} records from {}", raw.len(), job.input.display());

                let enriched = self.resolve_records(raw).await?;
                write_records(&job.output, &enriched)?;

                summary.files += 1;
                summary.count(&enriched);
            }

            Ok(summary)
        })
        .await
    }
}
