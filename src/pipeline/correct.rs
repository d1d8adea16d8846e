//! Correction and audit passes over enriched records.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use super::records::{plan_jobs, read_records, write_records};
use super::report::write_review_csv;
use super::resolve::progress_bar;
use super::{with_flushed_cache, Pipeline};
use crate::geocode::GeocodingProvider;
use crate::models::EnrichedRecord;
use crate::region::{tier_order, AuditReport, Change, CorrectionOutcome, ReviewItem};

#[derive(Debug, Clone, Default)]
pub struct CorrectionSummary {
    pub files: usize,
    pub records: usize,
    /// Records with at least one change
    pub changed: usize,
    pub province_from_county: usize,
    pub province_from_point: usize,
    pub county_cleared: usize,
    pub relocated: usize,
    pub review: Vec<ReviewItem>,
}

impl CorrectionSummary {
    fn count(&mut self, outcome: &CorrectionOutcome) {
        self.records += 1;
        if outcome.is_changed() {
            self.changed += 1;
        }
        for change in &outcome.changes {
            match change {
                Change::ProvinceFromCounty { .. } => self.province_from_county += 1,
                Change::ProvinceFromPoint { .. } => self.province_from_point += 1,
                Change::CountyCleared { .. } => self.county_cleared += 1,
                Change::Relocated { .. } => self.relocated += 1,
            }
        }
        if let Some(item) = &outcome.review {
            self.review.push(item.clone());
        }
    }

    pub fn log(&self) {
        info!(
            "Corrected {} of {} records from {} files",
            self.changed, self.records, self.files
        );
        info!("  province from county: {}", self.province_from_county);
        info!("  province from point: {}", self.province_from_point);
        info!("  county cleared: {}", self.county_cleared);
        info!("  re-geocoded in province: {}", self.relocated);
        info!("  flagged for review: {}", self.review.len());
    }
}

pub fn log_audit(report: &AuditReport) {
    info!(
        "Audited {} records, {} with a recognized province, {} outside their province",
        report.total,
        report.checked,
        report.violation_count()
    );
    for tier in tier_order() {
        if let Some(count) = report.by_tier.get(tier) {
            info!("  {}: {}", tier, count);
        }
    }
    for (province, violations) in &report.violations {
        info!("  {}: {} outside", province, violations.len());
    }
}

impl<P: GeocodingProvider> Pipeline<P> {
    /// Correct `records` in order. With `reresolve`, records that fail validation and came
    /// from a name match are re-geocoded inside their province first.
    pub async fn correct_records(
        &self,
        records: Vec<EnrichedRecord>,
        reresolve: bool,
    ) -> (Vec<EnrichedRecord>, CorrectionSummary) {
        let progress = progress_bar(records.len() as u64, self.settings.show_progress);
        let mut summary = CorrectionSummary::default();
        let mut corrected = Vec::with_capacity(records.len());

        for record in records {
            let outcome = if reresolve {
                self.corrector
                    .correct_with_resolver(record, self.resolver.as_ref())
                    .await
            } else {
                self.corrector.correct(record)
            };
            summary.count(&outcome);
            corrected.push(outcome.record);
            progress.inc(1);
        }

        progress.finish_and_clear();
        (corrected, summary)
    }

    /// Correct every enriched record file under `input` into `output`, writing the review
    /// items to `review` as CSV when given.
    pub async fn correct_path(
        &self,
        input: &Path,
        output: &Path,
        reresolve: bool,
        review: Option<&Path>,
    ) -> Result<CorrectionSummary> {
        let summary = with_flushed_cache(&self.cache, || async move {
            let mut summary = CorrectionSummary::default();

            for job in plan_jobs(input, output)? {
                let records: Vec<EnrichedRecord> = read_records(&job.input)?;
                info!("Correcting {} records from {}", records.len(), job.input.display());

                let (corrected, file_summary) = self.correct_records(records, reresolve).await;
                write_records(&job.output, &corrected)?;

                summary.files += 1;
                summary.records += file_summary.records;
                summary.changed += file_summary.changed;
                summary.province_from_county += file_summary.province_from_county;
                summary.province_from_point += file_summary.province_from_point;
                summary.county_cleared += file_summary.county_cleared;
                summary.relocated += file_summary.relocated;
                summary.review.extend(file_summary.review);
            }

            Ok(summary)
        })
        .await?;

        if let Some(path) = review {
            write_review_csv(path, &summary.review)?;
            info!(
                "Wrote {} review items to {}",
                summary.review.len(),
                path.display()
            );
        }

        Ok(summary)
    }

    /// Validate every enriched record under `input` without changing anything.
    pub fn audit_path(&self, input: &Path) -> Result<AuditReport> {
        let mut records: Vec<EnrichedRecord> = Vec::new();
        for job in plan_jobs(input, input)? {
            records.extend(read_records::<EnrichedRecord>(&job.input)?);
        }
        Ok(self.validator.audit(&records))
    }
}
