//! In-memory raster model shared by the loader, orientation correction and
//! the plot clipper.
use std::path::PathBuf;

use chrono::NaiveDate;
use ndarray::{Array2, Array3};

/// Affine pixel-to-world transform in GDAL order:
/// `[origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    pub fn new(coefficients: [f64; 6]) -> Self {
        Self(coefficients)
    }

    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    /// World coordinate of a (fractional) pixel position.
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let gt = self.0;
        (
            gt[0] + col * gt[1] + row * gt[2],
            gt[3] + col * gt[4] + row * gt[5],
        )
    }

    /// Inverse mapping; `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<InverseGeoTransform> {
        let gt = self.0;
        let det = gt[1] * gt[5] - gt[2] * gt[4];
        if det.abs() < f64::EPSILON * (gt[1].abs() + gt[5].abs()).max(f64::MIN_POSITIVE) {
            return None;
        }
        Some(InverseGeoTransform {
            origin: (gt[0], gt[3]),
            a: gt[5] / det,
            b: -gt[2] / det,
            c: -gt[4] / det,
            d: gt[1] / det,
        })
    }

    /// True when rows run north→south and columns west→east with no rotation.
    pub fn is_north_up(&self) -> bool {
        let gt = self.0;
        gt[2] == 0.0 && gt[4] == 0.0 && gt[1] > 0.0 && gt[5] < 0.0
    }

    /// Ground size of one column step and one row step.
    pub fn resolution(&self) -> (f64, f64) {
        let gt = self.0;
        (gt[1].hypot(gt[4]), gt[2].hypot(gt[5]))
    }

    /// Transform of a sub-window whose top-left pixel is `(col_off, row_off)`.
    pub fn offset(&self, col_off: usize, row_off: usize) -> Self {
        let (x, y) = self.pixel_to_world(col_off as f64, row_off as f64);
        let gt = self.0;
        Self([x, gt[1], gt[2], y, gt[4], gt[5]])
    }
}

/// Precomputed world-to-pixel mapping
#[derive(Debug, Clone, Copy)]
pub struct InverseGeoTransform {
    origin: (f64, f64),
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

impl InverseGeoTransform {
    /// Fractional `(col, row)` of a world coordinate.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.origin.0;
        let dy = y - self.origin.1;
        (self.a * dx + self.b * dy, self.c * dx + self.d * dy)
    }
}

/// Rectangular pixel window inside a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

/// A date-stamped RGB orthomosaic held fully in memory.
///
/// `pixels` has shape `(rows, cols, 3)`; `valid` has shape `(rows, cols)` and
/// is false where the source carried no data (alpha 0, nodata value, or
/// outside the footprint after resampling).
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub date: NaiveDate,
    pub source: PathBuf,
    pub pixels: Array3<u8>,
    pub valid: Array2<bool>,
    pub transform: GeoTransform,
    pub crs: String,
}

impl RasterImage {
    pub fn rows(&self) -> usize {
        self.valid.nrows()
    }

    pub fn cols(&self) -> usize {
        self.valid.ncols()
    }

    pub fn rgb(&self, row: usize, col: usize) -> [u8; 3] {
        [
            self.pixels[[row, col, 0]],
            self.pixels[[row, col, 1]],
            self.pixels[[row, col, 2]],
        ]
    }

    /// World-space bounding box `(min_x, min_y, max_x, max_y)` of the grid.
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        let (w, h) = (self.cols() as f64, self.rows() as f64);
        let corners = [
            self.transform.pixel_to_world(0.0, 0.0),
            self.transform.pixel_to_world(w, 0.0),
            self.transform.pixel_to_world(0.0, h),
            self.transform.pixel_to_world(w, h),
        ];
        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_round_trips_rotated_transform() {
        let gt = GeoTransform::new([500_000.0, 0.8, 0.6, 4_000_000.0, 0.6, -0.8]);
        let inv = gt.inverse().unwrap();
        let (x, y) = gt.pixel_to_world(12.5, 7.25);
        let (c, r) = inv.world_to_pixel(x, y);
        assert!((c - 12.5).abs() < 1e-9);
        assert!((r - 7.25).abs() < 1e-9);
    }

    #[test]
    fn singular_transform_has_no_inverse() {
        let gt = GeoTransform::new([0.0, 1.0, 1.0, 0.0, 1.0, 1.0]);
        assert!(gt.inverse().is_none());
    }

    #[test]
    fn window_offset_moves_origin() {
        let gt = GeoTransform::new([100.0, 2.0, 0.0, 200.0, 0.0, -2.0]);
        let sub = gt.offset(3, 4);
        assert_eq!(sub.coefficients(), [106.0, 2.0, 0.0, 192.0, 0.0, -2.0]);
        assert!(sub.is_north_up());
    }
}
