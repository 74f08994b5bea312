//! Reduction of a vegetation mask to a cover fraction, and the per-row
//! record type collected by the pipeline.
use chrono::NaiveDate;
use serde::Serialize;

use crate::core::processing::classify::{ClassificationError, VegetationMask};
use crate::core::processing::clip::ClippedSubraster;
use crate::types::{CoverStatus, CoverValue};

/// Pixel counts behind one cover value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverMeasurement {
    pub vegetation_pixels: u64,
    pub valid_pixels: u64,
    pub value: CoverValue,
}

impl CoverMeasurement {
    pub fn status(&self) -> CoverStatus {
        if self.value.is_no_data() {
            CoverStatus::NoValidPixels
        } else {
            CoverStatus::Measured
        }
    }
}

/// `vegetation / valid` over the clip's valid pixels; no-data when none are valid.
pub fn aggregate(
    mask: &VegetationMask,
    clip: &ClippedSubraster,
) -> Result<CoverMeasurement, ClassificationError> {
    if mask.dim() != clip.valid.dim() {
        return Err(ClassificationError::ShapeMismatch {
            expected: clip.valid.dim(),
            got: mask.dim(),
        });
    }

    let mut vegetation = 0u64;
    let mut valid = 0u64;
    for (&veg, &ok) in mask.mask.iter().zip(clip.valid.iter()) {
        if ok {
            valid += 1;
            if veg {
                vegetation += 1;
            }
        }
    }

    Ok(CoverMeasurement {
        vegetation_pixels: vegetation,
        valid_pixels: valid,
        value: CoverValue::from_counts(vegetation, valid),
    })
}

/// One output row: a (date, plot) pair and what was measured for it.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverRecord {
    pub date: NaiveDate,
    pub plot_id: String,
    pub value: CoverValue,
    /// Denominator of the fraction; `None` when no pixel window existed
    pub valid_pixels: Option<u64>,
    pub vegetation_pixels: Option<u64>,
    pub status: CoverStatus,
}

impl CoverRecord {
    pub fn measured(date: NaiveDate, plot_id: &str, m: CoverMeasurement) -> Self {
        Self {
            date,
            plot_id: plot_id.to_string(),
            value: m.value,
            valid_pixels: Some(m.valid_pixels),
            vegetation_pixels: Some(m.vegetation_pixels),
            status: m.status(),
        }
    }

    pub fn no_data(date: NaiveDate, plot_id: &str, status: CoverStatus) -> Self {
        Self {
            date,
            plot_id: plot_id.to_string(),
            value: CoverValue::NoData,
            valid_pixels: None,
            vegetation_pixels: None,
            status,
        }
    }
}

/// A skipped date or failed plot, kept for the run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot_id: Option<String>,
    pub cause: String,
}

/// Rows in date-then-plot order plus the failures behind no-data rows
#[derive(Debug, Clone, Default)]
pub struct CoverTable {
    pub records: Vec<CoverRecord>,
    pub skipped_dates: Vec<Failure>,
    pub failed_plots: Vec<Failure>,
}

impl CoverTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count_status(&self, status: CoverStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::{GeoTransform, PixelWindow};
    use ndarray::{Array2, Array3};

    fn clip(valid: Array2<bool>) -> ClippedSubraster {
        let (h, w) = valid.dim();
        ClippedSubraster {
            window: PixelWindow { col_off: 0, row_off: 0, width: w, height: h },
            transform: GeoTransform::new([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]),
            pixels: Array3::zeros((h, w, 3)),
            inside: valid.clone(),
            valid,
        }
    }

    #[test]
    fn fully_vegetated_clip_is_one() {
        let c = clip(Array2::from_elem((3, 3), true));
        let m = VegetationMask { mask: Array2::from_elem((3, 3), true) };
        let out = aggregate(&m, &c).unwrap();
        assert_eq!(out.value, CoverValue::Fraction(1.0));
        assert_eq!(out.status(), CoverStatus::Measured);
    }

    #[test]
    fn bare_clip_is_zero_not_no_data() {
        let c = clip(Array2::from_elem((3, 3), true));
        let m = VegetationMask { mask: Array2::from_elem((3, 3), false) };
        assert_eq!(aggregate(&m, &c).unwrap().value, CoverValue::Fraction(0.0));
    }

    #[test]
    fn invalid_pixels_leave_the_denominator() {
        let mut valid = Array2::from_elem((2, 2), true);
        valid[[1, 1]] = false;
        valid[[1, 0]] = false;
        let mut veg = Array2::from_elem((2, 2), false);
        veg[[0, 0]] = true;
        // vegetation outside the valid set must not count
        veg[[1, 1]] = true;
        let out = aggregate(&VegetationMask { mask: veg }, &clip(valid)).unwrap();
        assert_eq!(out.valid_pixels, 2);
        assert_eq!(out.vegetation_pixels, 1);
        assert_eq!(out.value, CoverValue::Fraction(0.5));
    }

    #[test]
    fn no_valid_pixels_is_no_data() {
        let c = clip(Array2::from_elem((2, 2), false));
        let m = VegetationMask { mask: Array2::from_elem((2, 2), false) };
        let out = aggregate(&m, &c).unwrap();
        assert!(out.value.is_no_data());
        assert_eq!(out.status(), CoverStatus::NoValidPixels);
    }

    #[test]
    fn mismatched_mask_is_rejected() {
        let c = clip(Array2::from_elem((2, 2), true));
        let m = VegetationMask { mask: Array2::from_elem((3, 2), true) };
        assert!(aggregate(&m, &c).is_err());
    }
}
