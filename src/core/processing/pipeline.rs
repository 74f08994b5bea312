//! Per-date, per-plot orchestration.
//!
//! Dates run one at a time in ascending order; each date's raster is loaded
//! and normalized once, then every plot is clipped, classified and
//! aggregated in parallel against it. The raster is dropped before the next
//! date starts, so at most one orthomosaic is resident.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::core::params::CoverParams;
use crate::core::processing::classify::classify;
use crate::core::processing::clip::{ClipOutcome, clip_plot};
use crate::core::processing::cover::{CoverRecord, CoverTable, Failure, aggregate};
use crate::core::raster::RasterImage;
use crate::error::{Error, Result};
use crate::io::geometry::{PlotGeometry, PlotSet};
use crate::io::scan::ScanDate;
use crate::io::writers::tiff::write_rgba_geotiff;
use crate::types::CoverStatus;

/// Produces the normalized raster for one scan date.
///
/// Implementations must return an image already in `params.common_crs`.
pub trait RasterLoader: Sync {
    fn load(&self, scan: &ScanDate, params: &CoverParams) -> Result<RasterImage>;
}

pub struct Pipeline<'a, L> {
    loader: L,
    plots: &'a PlotSet,
    params: &'a CoverParams,
    plots_dir_name: Option<String>,
}

impl<'a, L: RasterLoader> Pipeline<'a, L> {
    pub fn new(loader: L, plots: &'a PlotSet, params: &'a CoverParams) -> Self {
        Self {
            loader,
            plots,
            params,
            plots_dir_name: None,
        }
    }

    /// Also write each clipped plot to `<date dir>/<dir_name>/plot_<id>.tif`.
    pub fn with_plot_export(mut self, dir_name: Option<String>) -> Self {
        self.plots_dir_name = dir_name;
        self
    }

    pub fn run(&self, scans: &[ScanDate]) -> Result<CoverTable> {
        self.run_with_cancel(scans, &AtomicBool::new(false))
    }

    /// Like [`Pipeline::run`], checking `cancel` before each date.
    pub fn run_with_cancel(&self, scans: &[ScanDate], cancel: &AtomicBool) -> Result<CoverTable> {
        let pool = match self.params.workers {
            Some(n) => Some(rayon::ThreadPoolBuilder::new().num_threads(n).build()?),
            None => None,
        };

        let mut ordered: Vec<&ScanDate> = scans.iter().collect();
        ordered.sort_by_key(|s| s.date);

        let mut table = CoverTable::default();
        let total = ordered.len();
        for (i, scan) in ordered.into_iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                warn!("Cancelled before {} with {} rows done", scan.date, table.len());
                return Err(Error::Cancelled {
                    partial: Box::new(table),
                });
            }
            info!("Processing {} ({}/{})", scan.date, i + 1, total);

            let image = match self.loader.load(scan, self.params) {
                Ok(image) => image,
                Err(e) => {
                    warn!("{}: raster failed, all plots NoData: {}", scan.date, e);
                    if self.params.strict {
                        return Err(strict_abort(e, table));
                    }
                    table.skipped_dates.push(Failure {
                        date: scan.date,
                        plot_id: None,
                        cause: e.to_string(),
                    });
                    for plot in self.plots.iter() {
                        table.records.push(CoverRecord::no_data(
                            scan.date,
                            &plot.id,
                            CoverStatus::RasterFailed,
                        ));
                    }
                    continue;
                }
            };

            let export_dir = self.export_dir(scan);
            let measure = || -> Vec<Result<CoverRecord>> {
                self.plots
                    .as_slice()
                    .par_iter()
                    .map(|plot| self.measure_plot(&image, plot, export_dir.as_deref()))
                    .collect()
            };
            let results = match &pool {
                Some(pool) => pool.install(measure),
                None => measure(),
            };

            for (plot, result) in self.plots.iter().zip(results) {
                match result {
                    Ok(record) => table.records.push(record),
                    Err(e) => {
                        warn!("{}: plot {} failed: {}", scan.date, plot.id, e);
                        if self.params.strict {
                            return Err(strict_abort(e, table));
                        }
                        table.failed_plots.push(Failure {
                            date: scan.date,
                            plot_id: Some(plot.id.clone()),
                            cause: e.to_string(),
                        });
                        table.records.push(CoverRecord::no_data(
                            scan.date,
                            &plot.id,
                            CoverStatus::PlotFailed,
                        ));
                    }
                }
            }
            debug!("{}: {} plots processed", scan.date, self.plots.len());
        }
        Ok(table)
    }

    fn export_dir(&self, scan: &ScanDate) -> Option<PathBuf> {
        let dir = scan.dir.join(self.plots_dir_name.as_deref()?);
        match std::fs::create_dir_all(&dir) {
            Ok(()) => Some(dir),
            Err(e) => {
                warn!("{}: cannot create plot directory {:?}: {}", scan.date, dir, e);
                None
            }
        }
    }

    fn measure_plot(
        &self,
        image: &RasterImage,
        plot: &PlotGeometry,
        export_dir: Option<&Path>,
    ) -> Result<CoverRecord> {
        let clip = match clip_plot(image, plot)? {
            ClipOutcome::Clipped(clip) if clip.inside_count() > 0 => clip,
            _ => {
                debug!("{}: plot {} outside raster", image.date, plot.id);
                return Ok(CoverRecord::no_data(
                    image.date,
                    &plot.id,
                    CoverStatus::NoCoverage,
                ));
            }
        };

        let mask = classify(&clip, &self.params.threshold)?;
        let measurement = aggregate(&mask, &clip)?;

        if let Some(dir) = export_dir {
            let path = dir.join(format!("plot_{}.tif", sanitize_id(&plot.id)));
            let date = image.date.to_string();
            let tags = [("PLOT_ID", plot.id.as_str()), ("ACQUISITION_DATE", date.as_str())];
            if let Err(e) = write_rgba_geotiff(
                &path,
                &clip.pixels,
                &clip.valid,
                clip.transform,
                &image.crs,
                &tags,
            ) {
                warn!("{}: cannot export plot {} to {:?}: {}", image.date, plot.id, path, e);
            }
        }

        Ok(CoverRecord::measured(image.date, &plot.id, measurement))
    }
}

fn strict_abort(cause: Error, partial: CoverTable) -> Error {
    Error::StrictAbort {
        cause: Box::new(cause),
        partial: Box::new(partial),
    }
}

/// Keep plot ids usable as file names.
fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processing::classify::HsvThreshold;
    use crate::core::params::{DEFAULT_LOWER, DEFAULT_UPPER};
    use crate::core::raster::GeoTransform;
    use crate::io::gdal::RasterLoadError;
    use crate::types::CoverValue;
    use chrono::NaiveDate;
    use geo::{LineString, Polygon};
    use ndarray::{Array2, Array3};
    use std::collections::HashMap;

    const GREEN: [u8; 3] = [0, 200, 0];
    const GREY: [u8; 3] = [128, 128, 128];

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, d).unwrap()
    }

    fn square(id: &str, x0: f64, y0: f64, size: f64) -> PlotGeometry {
        PlotGeometry {
            id: id.into(),
            polygon: Polygon::new(
                LineString::from(vec![
                    (x0, y0),
                    (x0 + size, y0),
                    (x0 + size, y0 + size),
                    (x0, y0 + size),
                    (x0, y0),
                ]),
                vec![],
            ),
        }
    }

    /// P1 covers the lower-left 2x2 pixels of a 4x4 raster; P2 is far away.
    fn plots() -> PlotSet {
        PlotSet::new(
            vec![square("P1", 0.0, 0.0, 2.0), square("P2", 100.0, 100.0, 2.0)],
            "EPSG:32612",
        )
        .unwrap()
    }

    /// 4x4 raster, 1 m pixels, origin (0, 4); column 0 painted `left`, the rest `rest`.
    fn raster(d: NaiveDate, left: [u8; 3], rest: [u8; 3]) -> RasterImage {
        let mut pixels = Array3::<u8>::zeros((4, 4, 3));
        for r in 0..4 {
            for c in 0..4 {
                let px = if c == 0 { left } else { rest };
                for ch in 0..3 {
                    pixels[[r, c, ch]] = px[ch];
                }
            }
        }
        RasterImage {
            date: d,
            source: PathBuf::from(format!("{}.tif", d)),
            pixels,
            valid: Array2::from_elem((4, 4), true),
            transform: GeoTransform::new([0.0, 1.0, 0.0, 4.0, 0.0, -1.0]),
            crs: "EPSG:32612".into(),
        }
    }

    struct MemoryLoader {
        images: HashMap<NaiveDate, RasterImage>,
        cancel_after_load: Option<&'static AtomicBool>,
    }

    impl RasterLoader for MemoryLoader {
        fn load(&self, scan: &ScanDate, _params: &CoverParams) -> Result<RasterImage> {
            if let Some(flag) = self.cancel_after_load {
                flag.store(true, Ordering::Relaxed);
            }
            self.images
                .get(&scan.date)
                .cloned()
                .ok_or_else(|| RasterLoadError::NoRaster(scan.dir.clone()).into())
        }
    }

    fn scan(d: NaiveDate) -> ScanDate {
        ScanDate {
            date: d,
            dir: PathBuf::from(format!("/scans/{}", d)),
            raster: Some(PathBuf::from(format!("/scans/{}/ortho.tif", d))),
            extra: Vec::new(),
        }
    }

    fn loader() -> MemoryLoader {
        let mut images = HashMap::new();
        images.insert(date(1), raster(date(1), GREEN, GREEN));
        images.insert(date(2), raster(date(2), GREEN, GREY));
        MemoryLoader {
            images,
            cancel_after_load: None,
        }
    }

    fn params() -> CoverParams {
        CoverParams::new(
            "EPSG:32612",
            HsvThreshold::new(DEFAULT_LOWER, DEFAULT_UPPER).unwrap(),
        )
    }

    #[test]
    fn two_dates_two_plots() {
        let plots = plots();
        let params = params();
        // given out of order; rows must come back date-ascending
        let table = Pipeline::new(loader(), &plots, &params)
            .run(&[scan(date(2)), scan(date(1))])
            .unwrap();

        let rows: Vec<(NaiveDate, &str, CoverValue)> = table
            .records
            .iter()
            .map(|r| (r.date, r.plot_id.as_str(), r.value))
            .collect();
        assert_eq!(
            rows,
            vec![
                (date(1), "P1", CoverValue::Fraction(1.0)),
                (date(1), "P2", CoverValue::NoData),
                (date(2), "P1", CoverValue::Fraction(0.5)),
                (date(2), "P2", CoverValue::NoData),
            ]
        );
        assert_eq!(table.records[1].status, CoverStatus::NoCoverage);
        assert_eq!(table.records[2].valid_pixels, Some(4));
        assert!(table.skipped_dates.is_empty());
    }

    #[test]
    fn failed_raster_gives_no_data_for_every_plot() {
        let plots = plots();
        let params = params();
        let table = Pipeline::new(loader(), &plots, &params)
            .run(&[scan(date(1)), scan(date(3))])
            .unwrap();
        assert_eq!(table.len(), 4);
        assert!(table.records[2..]
            .iter()
            .all(|r| r.value.is_no_data() && r.status == CoverStatus::RasterFailed));
        assert_eq!(table.skipped_dates.len(), 1);
        assert_eq!(table.skipped_dates[0].date, date(3));
    }

    #[test]
    fn strict_mode_keeps_rows_before_the_failure() {
        let plots = plots();
        let mut params = params();
        params.strict = true;
        let err = Pipeline::new(loader(), &plots, &params)
            .run(&[scan(date(3)), scan(date(1))])
            .unwrap_err();
        match err {
            Error::StrictAbort { cause, partial } => {
                assert!(matches!(*cause, Error::RasterLoad(_)));
                assert_eq!(partial.len(), 2);
                assert!(partial.records.iter().all(|r| r.date == date(1)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cancellation_returns_finished_dates() {
        static FLAG: AtomicBool = AtomicBool::new(false);
        let plots = plots();
        let params = params();
        let mut loader = loader();
        loader.cancel_after_load = Some(&FLAG);
        let err = Pipeline::new(loader, &plots, &params)
            .run_with_cancel(&[scan(date(1)), scan(date(2))], &FLAG)
            .unwrap_err();
        let partial = err.partial().unwrap();
        assert!(matches!(err, Error::Cancelled { .. }));
        assert_eq!(partial.len(), 2);
    }

    #[test]
    fn fixed_worker_count_matches_default_pool() {
        let plots = plots();
        let mut params = params();
        let scans = [scan(date(1)), scan(date(2))];
        let default = Pipeline::new(loader(), &plots, &params).run(&scans).unwrap();
        params.workers = Some(1);
        let single = Pipeline::new(loader(), &plots, &params).run(&scans).unwrap();
        assert_eq!(default.records, single.records);
    }

    #[test]
    fn plot_ids_become_safe_file_names() {
        assert_eq!(sanitize_id("A/1 b"), "A_1_b");
        assert_eq!(sanitize_id("plot-7_x"), "plot-7_x");
    }
}
