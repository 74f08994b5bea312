#![doc = r#"
canopy-cover — per-plot canopy cover from multi-date RGB drone orthomosaics.

Given a directory of dated scans (`YYYY-MM-DD/ortho.tif`) and a GeoJSON file of
plot polygons, the crate clips every plot out of every scan, classifies its
pixels as vegetation with an HSV color band, and reports the vegetated fraction
of valid pixels as one row per (date, plot). It powers the `canopy-cover` CLI
and can be embedded in your own Rust applications.

Requirements
------------
- GDAL development headers and runtime available on your system; `gdalwarp` on
  `PATH` when scans need reprojection.
- Rust 2024 edition toolchain.

Quick start: run from settings
------------------------------
```rust,no_run
use std::path::Path;
use canopy_cover::RunConfig;

fn main() -> canopy_cover::Result<()> {
    let settings = RunConfig::from_json_file(Path::new("field_2022.json"))?.validate()?;
    let report = canopy_cover::measure_canopy_cover(&settings)?;
    println!(
        "{} rows, {} measured -> {:?}",
        report.summary.rows, report.summary.measured, report.csv_path
    );
    Ok(())
}
```

Measure an in-memory plot set
-----------------------------
```rust,no_run
use std::path::Path;
use std::sync::atomic::AtomicBool;
use canopy_cover::{
    discover_scan_dates, load_plots, measure_plots, CoverParams, HsvThreshold,
};

fn main() -> canopy_cover::Result<()> {
    let threshold = HsvThreshold::new([36, 25, 25], [86, 255, 255])?;
    let params = CoverParams::new("EPSG:32612", threshold);
    let plots = load_plots(Path::new("plots.geojson"), "id", None, &params.common_crs)?;
    let scans = discover_scan_dates(Path::new("/data/scans"))?;

    let table = measure_plots(&plots, &scans, &params, None, &AtomicBool::new(false))?;
    for row in &table.records {
        println!("{} {} {}", row.date, row.plot_id, row.value);
    }
    Ok(())
}
```

Error handling
--------------
All public functions return `canopy_cover::Result<T>`. A run that stops early
(strict mode or cancellation) still hands back the rows it finished:

```rust,no_run
use std::path::Path;
use canopy_cover::{measure_canopy_cover, Error, RunConfig};

fn main() {
    let Ok(settings) = RunConfig::from_json_file(Path::new("run.json")).and_then(RunConfig::validate)
    else {
        return;
    };
    match measure_canopy_cover(&settings) {
        Ok(report) => println!("{} rows", report.table.len()),
        Err(Error::StrictAbort { cause, partial }) => {
            eprintln!("aborted after {} rows: {cause}", partial.len())
        }
        Err(Error::GeometryLoad(e)) => eprintln!("bad plot file: {e}"),
        Err(other) => eprintln!("error: {other}"),
    }
}
```

Useful modules
--------------
- [`api`] — high-level entry points.
- [`core`] — parameters, raster model, and the processing stages.
- [`io`] — GDAL reader, reprojection, GeoJSON plots, scan discovery, writers.
- [`types`] — shared enums (`CoverValue`, `CoverStatus`, `OrientationStrategy`).
- [`error`] — crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use core::params::{ConfigError, CoverParams, RunConfig, RunSettings};
pub use core::processing::classify::{HsvThreshold, VegetationMask, classify, rgb_to_hsv};
pub use core::processing::clip::{ClipOutcome, ClippedSubraster, clip_plot};
pub use core::processing::cover::{CoverMeasurement, CoverRecord, CoverTable, aggregate};
pub use core::processing::normalize::GdalRasterLoader;
pub use core::processing::orientation::{NorthUpResampler, OrientationCorrection};
pub use core::processing::pipeline::{Pipeline, RasterLoader};
pub use core::raster::{GeoTransform, RasterImage};
pub use error::{Error, Result};
pub use types::{CoverStatus, CoverValue, OrientationStrategy, Resampling};

// Readers
pub use io::gdal::{GdalMetadata, GdalRasterReader, RasterLoadError};
pub use io::geometry::{GeometryLoadError, PlotGeometry, PlotSet, load_plots};
pub use io::scan::{ScanDate, discover_scan_dates};

// High-level API re-exports
pub use api::{RunReport, measure_canopy_cover, measure_canopy_cover_with_cancel, measure_plots};
