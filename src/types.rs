//! Shared types and enums used across the crate.
//! Includes `OrientationStrategy`, `Resampling`, the per-row `CoverStatus`
//! and the `CoverValue` that distinguishes a measurement from no-data.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Marker written in place of a fraction when nothing could be measured.
pub const NO_DATA: &str = "NoData";

/// How a rotated orthomosaic is brought onto a north-up grid
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrientationStrategy {
    NorthUpNearest,
    NorthUpBilinear,
}

impl std::fmt::Display for OrientationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrientationStrategy::NorthUpNearest => write!(f, "north-up-nearest"),
            OrientationStrategy::NorthUpBilinear => write!(f, "north-up-bilinear"),
        }
    }
}

/// Resampling used when warping to the common CRS
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resampling {
    Nearest,
    Bilinear,
    Cubic,
}

impl Resampling {
    /// Name understood by `gdalwarp -r`
    pub fn gdalwarp_name(self) -> &'static str {
        match self {
            Resampling::Nearest => "near",
            Resampling::Bilinear => "bilinear",
            Resampling::Cubic => "cubic",
        }
    }
}

impl std::fmt::Display for Resampling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resampling::Nearest => write!(f, "nearest"),
            Resampling::Bilinear => write!(f, "bilinear"),
            Resampling::Cubic => write!(f, "cubic"),
        }
    }
}

/// Outcome class of one (date, plot) row
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverStatus {
    /// Cover fraction computed from at least one valid pixel
    Measured,
    /// Plot polygon does not intersect the raster extent
    NoCoverage,
    /// Plot intersects the raster but no in-polygon pixel is valid
    NoValidPixels,
    /// The date's raster could not be loaded or normalized
    RasterFailed,
    /// Clipping or classification failed for this plot
    PlotFailed,
}

impl CoverStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CoverStatus::Measured => "measured",
            CoverStatus::NoCoverage => "no_coverage",
            CoverStatus::NoValidPixels => "no_valid_pixels",
            CoverStatus::RasterFailed => "raster_failed",
            CoverStatus::PlotFailed => "plot_failed",
        }
    }
}

impl std::fmt::Display for CoverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canopy cover fraction in `[0, 1]`, or explicit no-data.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum CoverValue {
    Fraction(f64),
    NoData,
}

impl CoverValue {
    /// Build a fraction from pixel counts; a zero denominator is no-data.
    pub fn from_counts(vegetation: u64, valid: u64) -> Self {
        if valid == 0 {
            return CoverValue::NoData;
        }
        let fraction = vegetation.min(valid) as f64 / valid as f64;
        CoverValue::Fraction(fraction.clamp(0.0, 1.0))
    }

    pub fn fraction(&self) -> Option<f64> {
        match self {
            CoverValue::Fraction(v) => Some(*v),
            CoverValue::NoData => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, CoverValue::NoData)
    }
}

impl std::fmt::Display for CoverValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Plain decimal, never exponent notation; whole numbers keep ".0"
            CoverValue::Fraction(v) if v.fract() == 0.0 => write!(f, "{}.0", v),
            CoverValue::Fraction(v) => write!(f, "{}", v),
            CoverValue::NoData => f.write_str(NO_DATA),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_valid_pixels_is_no_data() {
        assert_eq!(CoverValue::from_counts(0, 0), CoverValue::NoData);
        assert_eq!(CoverValue::from_counts(0, 0).to_string(), "NoData");
    }

    #[test]
    fn fractions_render_as_plain_decimal() {
        assert_eq!(CoverValue::from_counts(4, 4).to_string(), "1.0");
        assert_eq!(CoverValue::from_counts(2, 4).to_string(), "0.5");
        assert_eq!(CoverValue::from_counts(0, 4).to_string(), "0.0");
    }

    #[test]
    fn tiny_fractions_stay_in_plain_decimal() {
        assert_eq!(CoverValue::from_counts(1, 20_000_000).to_string(), "0.00000005");
    }

    #[test]
    fn fraction_never_exceeds_one() {
        let v = CoverValue::from_counts(9, 3).fraction().unwrap();
        assert!((0.0..=1.0).contains(&v));
    }
}
