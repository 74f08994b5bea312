//! Load one scan's orthomosaic and bring it into the common CRS.
//!
//! Order: read → orientation correction (when the imagery is flagged as
//! rotated) → reprojection. Unrotated rasters in a foreign CRS are warped
//! straight from the source file, skipping the in-memory staging copy.
use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::core::params::CoverParams;
use crate::core::processing::orientation::strategy_for;
use crate::core::processing::pipeline::RasterLoader;
use crate::core::raster::RasterImage;
use crate::error::Result;
use crate::io::gdal::{GdalRasterReader, RasterLoadError};
use crate::io::reproject::{
    ReprojectionError, check_transform, crs_equivalent, reproject_image, warp_file,
};
use crate::io::scan::ScanDate;

/// Loader backed by GDAL and `gdalwarp`
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalRasterLoader;

impl RasterLoader for GdalRasterLoader {
    fn load(&self, scan: &ScanDate, params: &CoverParams) -> Result<RasterImage> {
        let path = scan
            .raster
            .as_deref()
            .ok_or_else(|| RasterLoadError::NoRaster(scan.dir.clone()))?;
        load_normalized(path, scan.date, params)
    }
}

pub fn load_normalized(path: &Path, date: NaiveDate, params: &CoverParams) -> Result<RasterImage> {
    let reader = GdalRasterReader::open(path)?;
    let source_crs = reader.metadata.projection.clone();
    let same_crs = crs_equivalent(&source_crs, &params.common_crs).map_err(|e| {
        ReprojectionError::InvalidCrs {
            crs: format!("{} / {}", source_crs, params.common_crs),
            message: e.to_string(),
        }
    })?;

    let mut image = if !params.image_rotated && !same_crs {
        check_transform(&source_crs, &params.common_crs)?;
        let warped = warp_file(
            path,
            &params.common_crs,
            params.resampling,
            reader.metadata.has_alpha,
        )?;
        let mut image = GdalRasterReader::open(warped.path())?.read_image(date)?;
        image.source = path.to_path_buf();
        image
    } else {
        let mut image = reader.read_image(date)?;
        drop(reader);
        if params.image_rotated {
            let correction = strategy_for(params.orientation);
            debug!("{}: orientation correction {}", date, correction.name());
            image = correction.correct(image)?;
        }
        reproject_image(image, &params.common_crs, params.resampling)?
    };

    image.crs = params.common_crs.clone();
    info!(
        "{}: raster ready {}x{} from {:?}",
        date,
        image.cols(),
        image.rows(),
        path.file_name().unwrap_or_default()
    );
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::{DEFAULT_LOWER, DEFAULT_UPPER};
    use crate::core::processing::classify::HsvThreshold;
    use crate::error::Error;

    fn params() -> CoverParams {
        CoverParams::new(
            "EPSG:32612",
            HsvThreshold::new(DEFAULT_LOWER, DEFAULT_UPPER).unwrap(),
        )
    }

    #[test]
    fn scan_without_raster_is_a_raster_failure() {
        let scan = ScanDate {
            date: NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(),
            dir: "/data/2022-01-03".into(),
            raster: None,
            extra: Vec::new(),
        };
        assert!(matches!(
            GdalRasterLoader.load(&scan, &params()),
            Err(Error::RasterLoad(RasterLoadError::NoRaster(_)))
        ));
    }

    #[test]
    fn unreadable_file_is_a_raster_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ortho.tif");
        std::fs::write(&path, b"not a tiff").unwrap();
        let date = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        assert!(matches!(
            load_normalized(&path, date, &params()),
            Err(Error::RasterLoad(_))
        ));
    }
}
