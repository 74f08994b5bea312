use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::core::processing::cover::{CoverTable, Failure};
use crate::error::Result;
use crate::types::CoverStatus;

/// Counts and failure causes of one run, written as a JSON sidecar
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub dates: usize,
    pub plots: usize,
    pub rows: usize,
    pub measured: usize,
    pub no_coverage: usize,
    pub no_valid_pixels: usize,
    pub raster_failed: usize,
    pub plot_failed: usize,
    pub skipped_dates: Vec<Failure>,
    pub failed_plots: Vec<Failure>,
}

impl RunSummary {
    pub fn from_table(table: &CoverTable) -> Self {
        let dates: BTreeSet<_> = table.records.iter().map(|r| r.date).collect();
        let plots: BTreeSet<_> = table.records.iter().map(|r| r.plot_id.as_str()).collect();
        Self {
            dates: dates.len(),
            plots: plots.len(),
            rows: table.len(),
            measured: table.count_status(CoverStatus::Measured),
            no_coverage: table.count_status(CoverStatus::NoCoverage),
            no_valid_pixels: table.count_status(CoverStatus::NoValidPixels),
            raster_failed: table.count_status(CoverStatus::RasterFailed),
            plot_failed: table.count_status(CoverStatus::PlotFailed),
            skipped_dates: table.skipped_dates.clone(),
            failed_plots: table.failed_plots.clone(),
        }
    }

    /// Log the summary; individual failures were already warned as they happened.
    pub fn log(&self) {
        info!(
            "{} rows for {} dates x {} plots: measured={} no_coverage={} no_valid_pixels={} raster_failed={} plot_failed={}",
            self.rows,
            self.dates,
            self.plots,
            self.measured,
            self.no_coverage,
            self.no_valid_pixels,
            self.raster_failed,
            self.plot_failed
        );
        for f in &self.skipped_dates {
            debug!("Skipped date {}: {}", f.date, f.cause);
        }
        for f in &self.failed_plots {
            debug!(
                "Failed plot {} on {}: {}",
                f.plot_id.as_deref().unwrap_or("?"),
                f.date,
                f.cause
            );
        }
    }
}

/// `<stem>.summary.json` next to the CSV
pub fn summary_path(csv_path: &Path) -> PathBuf {
    csv_path.with_extension("summary.json")
}

pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let json_string = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json_string)?;
    info!("Created run summary: {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processing::cover::CoverRecord;
    use chrono::NaiveDate;

    #[test]
    fn summary_counts_statuses_and_failures() {
        let d = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        let table = CoverTable {
            records: vec![
                CoverRecord::no_data(d, "P1", CoverStatus::RasterFailed),
                CoverRecord::no_data(d, "P2", CoverStatus::RasterFailed),
            ],
            skipped_dates: vec![Failure {
                date: d,
                plot_id: None,
                cause: "Raster error: corrupt".into(),
            }],
            failed_plots: Vec::new(),
        };
        let summary = RunSummary::from_table(&table);
        assert_eq!((summary.dates, summary.plots, summary.rows), (1, 2, 2));
        assert_eq!(summary.raster_failed, 2);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["skipped_dates"][0]["date"], "2022-01-03");
        assert!(json["skipped_dates"][0].get("plot_id").is_none());
    }

    #[test]
    fn sidecar_sits_next_to_the_csv() {
        assert_eq!(
            summary_path(Path::new("/out/cover.csv")),
            PathBuf::from("/out/cover.summary.json")
        );
    }
}
