//! Orientation correction for orthomosaics whose grid is not aligned with
//! north/east.
//!
//! A correction resamples the image onto a north-up grid that covers the
//! source footprint. The output pixel size equals the source's ground
//! resolution along its column and row axes, so every output pixel centre
//! maps back into the source pixel it was sampled from and geocoding stays
//! within one source pixel. Output pixels outside the footprint are invalid.
use ndarray::{Array2, Array3};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::raster::{GeoTransform, InverseGeoTransform, RasterImage};
use crate::types::OrientationStrategy;

/// Output grids beyond this multiple of the source pixel count are refused.
const MAX_GROWTH: usize = 16;

#[derive(Debug, Error)]
pub enum OrientationError {
    #[error("Geotransform is not invertible: {0:?}")]
    SingularTransform([f64; 6]),
    #[error("North-up grid of {width}x{height} is too large for a {src_width}x{src_height} source")]
    TooLarge {
        width: usize,
        height: usize,
        src_width: usize,
        src_height: usize,
    },
}

/// Pluggable orientation correction
pub trait OrientationCorrection: Send + Sync {
    fn name(&self) -> &'static str;

    fn correct(&self, image: RasterImage) -> Result<RasterImage, OrientationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Nearest,
    Bilinear,
}

/// Resamples any affine grid (rotated, sheared, or flipped) onto a north-up grid.
#[derive(Debug, Clone, Copy)]
pub struct NorthUpResampler {
    pub interpolation: Interpolation,
}

pub fn strategy_for(strategy: OrientationStrategy) -> Box<dyn OrientationCorrection> {
    match strategy {
        OrientationStrategy::NorthUpNearest => Box::new(NorthUpResampler {
            interpolation: Interpolation::Nearest,
        }),
        OrientationStrategy::NorthUpBilinear => Box::new(NorthUpResampler {
            interpolation: Interpolation::Bilinear,
        }),
    }
}

impl OrientationCorrection for NorthUpResampler {
    fn name(&self) -> &'static str {
        match self.interpolation {
            Interpolation::Nearest => "north-up-nearest",
            Interpolation::Bilinear => "north-up-bilinear",
        }
    }

    fn correct(&self, image: RasterImage) -> Result<RasterImage, OrientationError> {
        if image.transform.is_north_up() {
            debug!("{:?} already north-up; orientation unchanged", image.source);
            return Ok(image);
        }
        let inverse = image
            .transform
            .inverse()
            .ok_or(OrientationError::SingularTransform(image.transform.coefficients()))?;

        let (res_x, res_y) = image.transform.resolution();
        let (min_x, min_y, max_x, max_y) = image.extent();
        // Small tolerance keeps exact multiples from gaining a column
        let width = (((max_x - min_x) / res_x) - 1e-9).ceil().max(1.0) as usize;
        let height = (((max_y - min_y) / res_y) - 1e-9).ceil().max(1.0) as usize;
        let (src_width, src_height) = (image.cols(), image.rows());
        if width.saturating_mul(height) > MAX_GROWTH * src_width.max(1) * src_height.max(1) {
            return Err(OrientationError::TooLarge {
                width,
                height,
                src_width,
                src_height,
            });
        }

        let target = GeoTransform::new([min_x, res_x, 0.0, max_y, 0.0, -res_y]);
        info!(
            "Resampling {:?} onto north-up grid {}x{} ({})",
            image.source,
            width,
            height,
            self.name()
        );

        let rows: Vec<Vec<Option<[u8; 3]>>> = (0..height)
            .into_par_iter()
            .map(|r| {
                (0..width)
                    .map(|c| {
                        let (x, y) = target.pixel_to_world(c as f64 + 0.5, r as f64 + 0.5);
                        self.sample(&image, &inverse, x, y)
                    })
                    .collect()
            })
            .collect();

        let mut pixels = Array3::<u8>::zeros((height, width, 3));
        let mut valid = Array2::from_elem((height, width), false);
        for (r, row) in rows.into_iter().enumerate() {
            for (c, px) in row.into_iter().enumerate() {
                if let Some(rgb) = px {
                    pixels[[r, c, 0]] = rgb[0];
                    pixels[[r, c, 1]] = rgb[1];
                    pixels[[r, c, 2]] = rgb[2];
                    valid[[r, c]] = true;
                }
            }
        }

        Ok(RasterImage {
            pixels,
            valid,
            transform: target,
            ..image
        })
    }
}

impl NorthUpResampler {
    fn sample(
        &self,
        image: &RasterImage,
        inverse: &InverseGeoTransform,
        x: f64,
        y: f64,
    ) -> Option<[u8; 3]> {
        let (col, row) = inverse.world_to_pixel(x, y);
        match self.interpolation {
            Interpolation::Nearest => nearest(image, col, row),
            Interpolation::Bilinear => bilinear(image, col, row).or_else(|| nearest(image, col, row)),
        }
    }
}

fn valid_at(image: &RasterImage, col: isize, row: isize) -> Option<(usize, usize)> {
    if col < 0 || row < 0 {
        return None;
    }
    let (c, r) = (col as usize, row as usize);
    if c >= image.cols() || r >= image.rows() || !image.valid[[r, c]] {
        return None;
    }
    Some((r, c))
}

fn nearest(image: &RasterImage, col: f64, row: f64) -> Option<[u8; 3]> {
    let (r, c) = valid_at(image, col.floor() as isize, row.floor() as isize)?;
    Some(image.rgb(r, c))
}

/// Weighted mean of the four surrounding pixel centres; `None` unless all four are valid.
fn bilinear(image: &RasterImage, col: f64, row: f64) -> Option<[u8; 3]> {
    let (fc, fr) = (col - 0.5, row - 0.5);
    let (c0, r0) = (fc.floor(), fr.floor());
    let (tx, ty) = (fc - c0, fr - r0);
    let (c0, r0) = (c0 as isize, r0 as isize);

    let p00 = valid_at(image, c0, r0)?;
    let p01 = valid_at(image, c0 + 1, r0)?;
    let p10 = valid_at(image, c0, r0 + 1)?;
    let p11 = valid_at(image, c0 + 1, r0 + 1)?;

    let mut out = [0u8; 3];
    for (ch, slot) in out.iter_mut().enumerate() {
        let v = |(r, c): (usize, usize)| image.pixels[[r, c, ch]] as f64;
        let top = v(p00) * (1.0 - tx) + v(p01) * tx;
        let bottom = v(p10) * (1.0 - tx) + v(p11) * tx;
        *slot = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }
    Some(out)
}
