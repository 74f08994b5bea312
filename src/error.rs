//! Crate-level error type and `Result` alias.
//! Wraps the per-stage errors (geometry, raster, reprojection, orientation,
//! clipping, classification, config) and carries the partial table when a
//! run stops early.
use thiserror::Error;

use crate::core::processing::cover::CoverTable;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Geometry error: {0}")]
    GeometryLoad(#[from] crate::io::geometry::GeometryLoadError),

    #[error("Raster error: {0}")]
    RasterLoad(#[from] crate::io::gdal::RasterLoadError),

    #[error("Reprojection error: {0}")]
    Reprojection(#[from] crate::io::reproject::ReprojectionError),

    #[error("Orientation error: {0}")]
    Orientation(#[from] crate::core::processing::orientation::OrientationError),

    #[error("Clip error: {0}")]
    Clip(#[from] crate::core::processing::clip::ClipError),

    #[error("Classification error: {0}")]
    Classification(#[from] crate::core::processing::classify::ClassificationError),

    #[error("Config error: {0}")]
    Config(#[from] crate::core::params::ConfigError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Cannot build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Run cancelled after {} rows", .partial.len())]
    Cancelled { partial: Box<CoverTable> },

    #[error("Strict mode abort: {cause}")]
    StrictAbort {
        cause: Box<Error>,
        partial: Box<CoverTable>,
    },
}

impl Error {
    /// Rows aggregated before a cancelled or aborted run stopped
    pub fn partial(&self) -> Option<&CoverTable> {
        match self {
            Error::Cancelled { partial } | Error::StrictAbort { partial, .. } => Some(partial.as_ref()),
            _ => None,
        }
    }
}
