//! High-level library API: run a full canopy-cover measurement from
//! validated settings, or measure an already-loaded plot set over a list of
//! scan dates. Prefer these entrypoints over the low-level processing
//! modules when embedding the crate.
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use tracing::warn;

use crate::core::params::{CoverParams, RunSettings};
use crate::core::processing::cover::CoverTable;
use crate::core::processing::normalize::GdalRasterLoader;
use crate::core::processing::pipeline::Pipeline;
use crate::error::{Error, Result};
use crate::io::geometry::{PlotSet, load_plots};
use crate::io::scan::{ScanDate, discover_scan_dates};
use crate::io::writers::summary::{RunSummary, summary_path, write_summary};
use crate::io::writers::table::{partial_path, write_table};

/// What a completed run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub table: CoverTable,
    pub summary: RunSummary,
    pub csv_path: PathBuf,
    pub summary_path: PathBuf,
}

/// Measure `plots` over `scans` with the GDAL-backed loader.
pub fn measure_plots(
    plots: &PlotSet,
    scans: &[ScanDate],
    params: &CoverParams,
    plots_dir_name: Option<&str>,
    cancel: &AtomicBool,
) -> Result<CoverTable> {
    Pipeline::new(GdalRasterLoader, plots, params)
        .with_plot_export(plots_dir_name.map(str::to_string))
        .run_with_cancel(scans, cancel)
}

/// Load plots, discover scan dates, measure, and write the CSV table plus
/// its JSON summary.
pub fn measure_canopy_cover(settings: &RunSettings) -> Result<RunReport> {
    measure_canopy_cover_with_cancel(settings, &AtomicBool::new(false))
}

/// As [`measure_canopy_cover`]; a strict-mode abort still writes the rows
/// finished so far to `<stem>.partial.csv` before returning the error.
pub fn measure_canopy_cover_with_cancel(
    settings: &RunSettings,
    cancel: &AtomicBool,
) -> Result<RunReport> {
    let params = &settings.params;
    let plots = load_plots(
        &settings.geojson_path,
        &settings.id_field,
        settings.geometry_crs.as_deref(),
        &params.common_crs,
    )?;

    let scans = discover_scan_dates(&settings.dates_dir)?;
    if scans.is_empty() {
        warn!("No YYYY-MM-DD scan directories in {:?}", settings.dates_dir);
    }

    let table = match measure_plots(
        &plots,
        &scans,
        params,
        settings.plots_dir_name.as_deref(),
        cancel,
    ) {
        Ok(table) => table,
        Err(Error::StrictAbort { cause, partial }) => {
            write_partial(&settings.output_csv, &partial);
            return Err(Error::StrictAbort { cause, partial });
        }
        Err(e) => return Err(e),
    };

    write_table(&settings.output_csv, &table)?;
    let summary = RunSummary::from_table(&table);
    let sidecar = summary_path(&settings.output_csv);
    write_summary(&sidecar, &summary)?;

    Ok(RunReport {
        table,
        summary,
        csv_path: settings.output_csv.clone(),
        summary_path: sidecar,
    })
}

fn write_partial(csv_path: &Path, partial: &CoverTable) {
    let path = partial_path(csv_path);
    match write_table(&path, partial) {
        Ok(()) => warn!("Strict abort: partial table written to {:?}", path),
        Err(e) => warn!("Strict abort: cannot write partial table {:?}: {}", path, e),
    }
}
