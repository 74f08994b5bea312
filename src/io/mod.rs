//! I/O layer: GDAL raster reading, plot geometry loading, reprojection,
//! scan-date discovery, and the CSV/JSON/GeoTIFF `writers`.
pub mod gdal;
pub use gdal::{GdalMetadata, GdalRasterReader, RasterLoadError};

pub mod geometry;
pub use geometry::{GeometryLoadError, PlotGeometry, PlotSet, load_plots};

pub mod reproject;
pub use reproject::ReprojectionError;

pub mod scan;
pub use scan::{ScanDate, discover_scan_dates};

pub mod writers;
