//! Polygon-to-raster clipping.
//!
//! The plot polygon is mapped into pixel space through the inverse
//! geotransform, its bounding box is snapped outward to whole pixels and
//! clamped to the raster, and each pixel in that window is kept when its
//! centre lies inside or on the polygon boundary.
use geo::{BoundingRect, Intersects, MapCoords, Point, Polygon, coord};
use ndarray::{Array2, Array3, Zip, s};
use thiserror::Error;

use crate::core::raster::{GeoTransform, PixelWindow, RasterImage};
use crate::io::geometry::PlotGeometry;

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("Raster geotransform is not invertible: {0:?}")]
    SingularTransform([f64; 6]),
    #[error("Plot {0} has non-finite coordinates in pixel space")]
    NonFinite(String),
}

/// Pixel window of a raster plus its per-pixel polygon masks
#[derive(Debug, Clone)]
pub struct ClippedSubraster {
    pub window: PixelWindow,
    /// Geotransform of the window's top-left pixel
    pub transform: GeoTransform,
    /// `(height, width, 3)` copy of the window's RGB values
    pub pixels: Array3<u8>,
    /// Pixel centre falls inside the plot polygon
    pub inside: Array2<bool>,
    /// `inside` and the source pixel carried data
    pub valid: Array2<bool>,
}

impl ClippedSubraster {
    pub fn valid_count(&self) -> u64 {
        self.valid.iter().filter(|&&v| v).count() as u64
    }

    pub fn inside_count(&self) -> u64 {
        self.inside.iter().filter(|&&v| v).count() as u64
    }
}

#[derive(Debug, Clone)]
pub enum ClipOutcome {
    Clipped(ClippedSubraster),
    /// The polygon does not overlap the raster extent
    Empty,
}

/// Plot polygon expressed in fractional `(col, row)` coordinates.
fn polygon_in_pixel_space(
    raster: &RasterImage,
    plot: &PlotGeometry,
) -> Result<Polygon<f64>, ClipError> {
    let inverse = raster
        .transform
        .inverse()
        .ok_or(ClipError::SingularTransform(raster.transform.coefficients()))?;
    Ok(plot.polygon.map_coords(|c| {
        let (col, row) = inverse.world_to_pixel(c.x, c.y);
        coord! { x: col, y: row }
    }))
}

/// Compute the pixel window and inside mask of `plot` over `raster`.
///
/// When the polygon straddles the raster edge the window is clamped to the
/// raster, so only the overlapping part is measured.
pub fn clip_plot(raster: &RasterImage, plot: &PlotGeometry) -> Result<ClipOutcome, ClipError> {
    let pixel_polygon = polygon_in_pixel_space(raster, plot)?;
    let Some(bbox) = pixel_polygon.bounding_rect() else {
        return Ok(ClipOutcome::Empty);
    };
    let (min, max) = (bbox.min(), bbox.max());
    if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
        return Err(ClipError::NonFinite(plot.id.clone()));
    }

    let (rows, cols) = (raster.rows() as f64, raster.cols() as f64);
    let col0 = min.x.floor().clamp(0.0, cols) as usize;
    let col1 = max.x.ceil().clamp(0.0, cols) as usize;
    let row0 = min.y.floor().clamp(0.0, rows) as usize;
    let row1 = max.y.ceil().clamp(0.0, rows) as usize;

    let window = PixelWindow {
        col_off: col0,
        row_off: row0,
        width: col1.saturating_sub(col0),
        height: row1.saturating_sub(row0),
    };
    if window.is_empty() {
        return Ok(ClipOutcome::Empty);
    }

    let mut inside = Array2::from_elem((window.height, window.width), false);
    Zip::indexed(&mut inside).for_each(|(r, c), out| {
        let centre = Point::new(
            (col0 + c) as f64 + 0.5,
            (row0 + r) as f64 + 0.5,
        );
        *out = pixel_polygon.intersects(&centre);
    });

    let source_valid = raster.valid.slice(s![row0..row1, col0..col1]);
    let mut valid = inside.clone();
    Zip::from(&mut valid)
        .and(&source_valid)
        .for_each(|v, &src| *v = *v && src);

    Ok(ClipOutcome::Clipped(ClippedSubraster {
        window,
        transform: raster.transform.offset(col0, row0),
        pixels: raster.pixels.slice(s![row0..row1, col0..col1, ..]).to_owned(),
        inside,
        valid,
    }))
}
