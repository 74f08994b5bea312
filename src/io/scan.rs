//! Discovery of dated scan directories.
//!
//! Each scan lives in a `YYYY-MM-DD` subdirectory of the dates directory
//! and holds one RGB GeoTIFF orthomosaic.
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, warn};

pub const DATE_DIR_FORMAT: &str = "%Y-%m-%d";

/// One acquisition date and the raster found for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanDate {
    pub date: NaiveDate,
    pub dir: PathBuf,
    /// First `.tif`/`.tiff` in lexical order; `None` when the directory has no raster
    pub raster: Option<PathBuf>,
    /// Other rasters in the directory, ignored
    pub extra: Vec<PathBuf>,
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

/// List scan dates under `dates_dir`, ascending.
pub fn discover_scan_dates(dates_dir: &Path) -> std::io::Result<Vec<ScanDate>> {
    let mut scans = Vec::new();
    for entry in fs::read_dir(dates_dir)? {
        let entry = entry?;
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(date) = name
            .to_str()
            .and_then(|n| NaiveDate::parse_from_str(n, DATE_DIR_FORMAT).ok())
        else {
            debug!("Ignoring non-date directory {:?}", dir);
            continue;
        };

        let mut rasters: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_tiff(p))
            .collect();
        rasters.sort();
        let mut rasters = rasters.into_iter();
        let raster = rasters.next();
        let extra: Vec<PathBuf> = rasters.collect();
        if let Some(first) = &raster {
            if !extra.is_empty() {
                warn!(
                    "{} holds {} rasters; using {:?}",
                    date,
                    extra.len() + 1,
                    first.file_name().unwrap_or_default()
                );
            }
        }
        scans.push(ScanDate {
            date,
            dir,
            raster,
            extra,
        });
    }
    scans.sort_by_key(|s| s.date);
    debug!("Found {} scan dates in {:?}", scans.len(), dates_dir);
    Ok(scans)
}
