//! CRS comparison and raster reprojection.
//!
//! Rasters are warped with `gdalwarp` into a temporary GeoTIFF and read back,
//! so datum shifts and grid handling follow GDAL/PROJ exactly.
use std::path::Path;
use std::process::Command;

use gdal::errors::GdalError as GdalCrateError;
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::raster::RasterImage;
use crate::io::gdal::GdalRasterReader;
use crate::io::writers::tiff::write_rgba_geotiff;
use crate::types::Resampling;

#[derive(Debug, Error)]
pub enum ReprojectionError {
    #[error("Unknown CRS {crs}: {message}")]
    InvalidCrs { crs: String, message: String },
    #[error("No transform from {from} to {to}: {message}")]
    NoTransform {
        from: String,
        to: String,
        message: String,
    },
    #[error("gdalwarp failed: {0}")]
    Warp(String),
    #[error("Cannot read warped raster: {0}")]
    Read(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse a CRS definition with traditional GIS axis order (x = easting or
/// longitude, y = northing or latitude) whatever the authority says.
pub fn spatial_ref(definition: &str) -> Result<SpatialRef, GdalCrateError> {
    let mut srs = SpatialRef::from_definition(definition.trim())?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

/// EPSG code of the root CRS element, ignoring authorities on nested parts.
pub(crate) fn epsg_code(srs: &SpatialRef) -> Option<i32> {
    let name = srs.auth_name().ok()?;
    if !name.eq_ignore_ascii_case("EPSG") {
        return None;
    }
    srs.auth_code().ok()
}

/// Whether two CRS definitions name the same reference system.
///
/// Compares EPSG codes when both sides have one, else asks GDAL.
pub fn crs_equivalent(a: &str, b: &str) -> Result<bool, GdalCrateError> {
    if a.trim().eq_ignore_ascii_case(b.trim()) {
        return Ok(true);
    }
    let sa = spatial_ref(a)?;
    let sb = spatial_ref(b)?;
    Ok(match (epsg_code(&sa), epsg_code(&sb)) {
        (Some(x), Some(y)) => x == y,
        _ => sa == sb,
    })
}

/// Fail early unless both CRSs parse and PROJ can relate them.
pub fn check_transform(from: &str, to: &str) -> Result<(), ReprojectionError> {
    let source = spatial_ref(from).map_err(|e| ReprojectionError::InvalidCrs {
        crs: from.to_string(),
        message: e.to_string(),
    })?;
    let target = spatial_ref(to).map_err(|e| ReprojectionError::InvalidCrs {
        crs: to.to_string(),
        message: e.to_string(),
    })?;
    CoordTransform::new(&source, &target).map_err(|e| ReprojectionError::NoTransform {
        from: from.to_string(),
        to: to.to_string(),
        message: e.to_string(),
    })?;
    Ok(())
}

/// Warp `src` into `target_crs`; the result lives as long as the returned file.
pub fn warp_file(
    src: &Path,
    target_crs: &str,
    resampling: Resampling,
    src_has_alpha: bool,
) -> Result<NamedTempFile, ReprojectionError> {
    let stem = src
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("raster");
    let tmp = tempfile::Builder::new()
        .prefix(&format!("{}_", stem))
        .suffix("_warped.tif")
        .tempfile()?;

    let mut args: Vec<String> = vec![
        "-q".into(),
        "-of".into(),
        "GTiff".into(),
        "-overwrite".into(),
        "-r".into(),
        resampling.gdalwarp_name().into(),
        "-t_srs".into(),
        target_crs.to_string(),
        "-dstalpha".into(),
    ];
    if src_has_alpha {
        args.push("-srcalpha".into());
    }

    info!("Warping {:?} to {} ({})", src, target_crs, resampling);
    let output = Command::new("gdalwarp")
        .args(&args)
        .arg(src)
        .arg(tmp.path())
        .output()
        .map_err(|e| ReprojectionError::Warp(format!("cannot run gdalwarp: {}", e)))?;
    if !output.status.success() {
        return Err(ReprojectionError::Warp(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(tmp)
}

/// Bring an in-memory image into `target_crs`. Images already in that CRS
/// are returned unchanged.
pub fn reproject_image(
    image: RasterImage,
    target_crs: &str,
    resampling: Resampling,
) -> Result<RasterImage, ReprojectionError> {
    let same = crs_equivalent(&image.crs, target_crs).map_err(|e| ReprojectionError::InvalidCrs {
        crs: format!("{} / {}", image.crs, target_crs),
        message: e.to_string(),
    })?;
    if same {
        debug!("{:?} already in {}; no reprojection", image.source, target_crs);
        return Ok(image);
    }
    check_transform(&image.crs, target_crs)?;

    let spill = tempfile::Builder::new()
        .prefix("canopy_")
        .suffix("_spill.tif")
        .tempfile()?;
    write_rgba_geotiff(
        spill.path(),
        &image.pixels,
        &image.valid,
        image.transform,
        &image.crs,
        &[],
    )
    .map_err(|e| ReprojectionError::Warp(format!("cannot stage raster: {}", e)))?;

    let warped = warp_file(spill.path(), target_crs, resampling, true)?;
    read_warped(warped.path(), &image, target_crs)
}

/// Read a warped file back, keeping the caller's date and source path.
pub fn read_warped(
    path: &Path,
    original: &RasterImage,
    target_crs: &str,
) -> Result<RasterImage, ReprojectionError> {
    let reader = GdalRasterReader::open(path).map_err(|e| ReprojectionError::Read(e.to_string()))?;
    let mut image = reader
        .read_image(original.date)
        .map_err(|e| ReprojectionError::Read(e.to_string()))?;
    image.source = original.source.clone();
    image.crs = target_crs.to_string();
    Ok(image)
}
