//! RGB → HSV conversion and inclusive band thresholding.
//!
//! HSV follows the OpenCV 8-bit convention so bounds authored against
//! `cv2.cvtColor(.., COLOR_RGB2HSV)` + `cv2.inRange` behave the same here:
//!
//! * H ∈ [0, 179]: hue in degrees halved, rounded half up
//! * S ∈ [0, 255]: `round(255 * (max - min) / max)`, 0 when max is 0
//! * V ∈ [0, 255]: `max(R, G, B)`
//!
//! A pixel is vegetation when `lower[i] <= hsv[i] <= upper[i]` for all three
//! channels.
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::processing::clip::ClippedSubraster;

/// Largest hue value in the 8-bit convention
pub const HUE_MAX: u8 = 179;

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("Lower bound {lower} exceeds upper bound {upper} on channel {channel}")]
    InvertedBounds {
        channel: &'static str,
        lower: u8,
        upper: u8,
    },
    #[error("Hue bound {0} outside 0..=179")]
    HueOutOfRange(u8),
    #[error("Mask shape {got:?} does not match clip shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
}

/// Inclusive lower/upper HSV triples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawThreshold", into = "RawThreshold")]
pub struct HsvThreshold {
    lower: [u8; 3],
    upper: [u8; 3],
}

#[derive(Serialize, Deserialize)]
struct RawThreshold {
    lower: [u8; 3],
    upper: [u8; 3],
}

impl TryFrom<RawThreshold> for HsvThreshold {
    type Error = ClassificationError;

    fn try_from(raw: RawThreshold) -> Result<Self, Self::Error> {
        HsvThreshold::new(raw.lower, raw.upper)
    }
}

impl From<HsvThreshold> for RawThreshold {
    fn from(t: HsvThreshold) -> Self {
        RawThreshold {
            lower: t.lower,
            upper: t.upper,
        }
    }
}

impl HsvThreshold {
    pub fn new(lower: [u8; 3], upper: [u8; 3]) -> Result<Self, ClassificationError> {
        const CHANNELS: [&str; 3] = ["hue", "saturation", "value"];
        for i in 0..3 {
            if lower[i] > upper[i] {
                return Err(ClassificationError::InvertedBounds {
                    channel: CHANNELS[i],
                    lower: lower[i],
                    upper: upper[i],
                });
            }
        }
        for hue in [lower[0], upper[0]] {
            if hue > HUE_MAX {
                return Err(ClassificationError::HueOutOfRange(hue));
            }
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> [u8; 3] {
        self.lower
    }

    pub fn upper(&self) -> [u8; 3] {
        self.upper
    }

    #[inline]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| self.lower[i] <= hsv[i] && hsv[i] <= self.upper[i])
    }
}

/// Convert one 8-bit RGB pixel to 8-bit HSV.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (rgb[0] as i32, rgb[1] as i32, rgb[2] as i32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v == 0 {
        0
    } else {
        (diff * 255 * 2 + v) / (2 * v)
    };

    let h = if diff == 0 {
        0
    } else {
        // Sextant offset in units of diff; red wins ties, then green
        let sextant = if v == r {
            g - b
        } else if v == g {
            b - r + 2 * diff
        } else {
            r - g + 4 * diff
        };
        // floor(sextant * 30 / diff + 0.5)
        let h = (sextant * 60 + diff).div_euclid(2 * diff);
        if h < 0 { h + 180 } else { h % 180 }
    };

    [h as u8, s as u8, v as u8]
}

/// Boolean grid, same shape as its clip, true on vegetation pixels
#[derive(Debug, Clone)]
pub struct VegetationMask {
    pub mask: Array2<bool>,
}

impl VegetationMask {
    pub fn count(&self) -> u64 {
        self.mask.iter().filter(|&&v| v).count() as u64
    }

    pub fn dim(&self) -> (usize, usize) {
        self.mask.dim()
    }
}

/// Classify every valid in-polygon pixel of a clip.
pub fn classify(
    clip: &ClippedSubraster,
    threshold: &HsvThreshold,
) -> Result<VegetationMask, ClassificationError> {
    let (rows, cols) = clip.valid.dim();
    let pixel_dim = clip.pixels.dim();
    if (pixel_dim.0, pixel_dim.1) != (rows, cols) || pixel_dim.2 != 3 {
        return Err(ClassificationError::ShapeMismatch {
            expected: (rows, cols),
            got: (pixel_dim.0, pixel_dim.1),
        });
    }

    let mut mask = Array2::from_elem((rows, cols), false);
    Zip::indexed(&mut mask)
        .and(&clip.valid)
        .for_each(|(r, c), out, &valid| {
            if valid {
                let rgb = [
                    clip.pixels[[r, c, 0]],
                    clip.pixels[[r, c, 1]],
                    clip.pixels[[r, c, 2]],
                ];
                *out = threshold.contains(rgb_to_hsv(rgb));
            }
        });

    Ok(VegetationMask { mask })
}
