use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::processing::classify::HsvThreshold;
use crate::types::{OrientationStrategy, Resampling};

/// Errors raised while loading or validating a run configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Algorithm parameters threaded immutably through every stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverParams {
    /// Common CRS every raster and plot is harmonized to (e.g. "EPSG:32612")
    pub common_crs: String,
    /// Apply orientation correction to each raster before reprojection
    pub image_rotated: bool,
    pub orientation: OrientationStrategy,
    pub threshold: HsvThreshold,
    /// Resampling used by the CRS warp
    pub resampling: Resampling,
    /// Abort on the first per-date or per-plot failure
    pub strict: bool,
    /// Worker threads for per-plot processing; None means rayon's default
    pub workers: Option<usize>,
}

impl CoverParams {
    pub fn new(common_crs: impl Into<String>, threshold: HsvThreshold) -> Self {
        Self {
            common_crs: common_crs.into(),
            image_rotated: false,
            orientation: OrientationStrategy::NorthUpNearest,
            threshold,
            resampling: Resampling::Nearest,
            strict: false,
            workers: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesSection {
    pub dates_dir: Option<PathBuf>,
    pub geojson_path: Option<PathBuf>,
    pub id_field: Option<String>,
    /// CRS of the plot coordinates when the GeoJSON does not declare one
    pub geometry_crs: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub csv_name: Option<String>,
    /// Subdirectory (inside each date directory) for clipped plot GeoTIFFs
    pub plots_dir_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TiffInfoSection {
    #[serde(alias = "common_espg")]
    pub common_crs: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageCorrectionSection {
    pub image_rotated: Option<bool>,
    pub strategy: Option<OrientationStrategy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorSection {
    pub lower: Option<[u8; 3]>,
    pub upper: Option<[u8; 3]>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub strict: Option<bool>,
    pub workers: Option<usize>,
    pub resampling: Option<Resampling>,
}

/// Raw, partially-filled configuration as read from JSON or the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub files: FilesSection,
    pub tiff_info: TiffInfoSection,
    pub image_correction: ImageCorrectionSection,
    pub color: ColorSection,
    pub run: RunSection,
}

/// Fully validated run settings
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub dates_dir: PathBuf,
    pub geojson_path: PathBuf,
    pub id_field: String,
    pub geometry_crs: Option<String>,
    pub output_csv: PathBuf,
    pub plots_dir_name: Option<String>,
    pub params: CoverParams,
}

pub const DEFAULT_ID_FIELD: &str = "id";
pub const DEFAULT_CSV_NAME: &str = "canopy_cover.csv";
/// Green band in OpenCV 8-bit HSV
pub const DEFAULT_LOWER: [u8; 3] = [36, 25, 25];
pub const DEFAULT_UPPER: [u8; 3] = [86, 255, 255];

impl RunConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `other` on top of `self`; set values in `other` win.
    pub fn merge(mut self, other: RunConfig) -> Self {
        macro_rules! take {
            ($($section:ident . $field:ident),* $(,)?) => {
                $(if other.$section.$field.is_some() {
                    self.$section.$field = other.$section.$field;
                })*
            };
        }
        take!(
            files.dates_dir,
            files.geojson_path,
            files.id_field,
            files.geometry_crs,
            files.output_dir,
            files.csv_name,
            files.plots_dir_name,
            tiff_info.common_crs,
            image_correction.image_rotated,
            image_correction.strategy,
            color.lower,
            color.upper,
            run.strict,
            run.workers,
            run.resampling,
        );
        self
    }

    pub fn validate(self) -> Result<RunSettings, ConfigError> {
        let dates_dir = self.files.dates_dir.ok_or(ConfigError::Missing("files.dates_dir"))?;
        let geojson_path = self
            .files
            .geojson_path
            .ok_or(ConfigError::Missing("files.geojson_path"))?;
        let common_crs = self
            .tiff_info
            .common_crs
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("tiff_info.common_crs"))?;

        let lower = self.color.lower.unwrap_or(DEFAULT_LOWER);
        let upper = self.color.upper.unwrap_or(DEFAULT_UPPER);
        let threshold = HsvThreshold::new(lower, upper).map_err(|e| ConfigError::Invalid {
            key: "color",
            reason: e.to_string(),
        })?;

        if self.run.workers == Some(0) {
            return Err(ConfigError::Invalid {
                key: "run.workers",
                reason: "must be greater than 0".into(),
            });
        }

        let csv_name = self
            .files
            .csv_name
            .unwrap_or_else(|| DEFAULT_CSV_NAME.to_string());
        if csv_name.trim().is_empty() || csv_name.contains(['/', '\\']) {
            return Err(ConfigError::Invalid {
                key: "files.csv_name",
                reason: format!("expected a plain file name, got {:?}", csv_name),
            });
        }
        let output_dir = self.files.output_dir.unwrap_or_else(|| dates_dir.clone());

        let params = CoverParams {
            common_crs,
            image_rotated: self.image_correction.image_rotated.unwrap_or(false),
            orientation: self
                .image_correction
                .strategy
                .unwrap_or(OrientationStrategy::NorthUpNearest),
            threshold,
            resampling: self.run.resampling.unwrap_or(Resampling::Nearest),
            strict: self.run.strict.unwrap_or(false),
            workers: self.run.workers,
        };

        Ok(RunSettings {
            dates_dir,
            geojson_path,
            id_field: self
                .files
                .id_field
                .unwrap_or_else(|| DEFAULT_ID_FIELD.to_string()),
            geometry_crs: self.files.geometry_crs,
            output_csv: output_dir.join(csv_name),
            plots_dir_name: self.files.plots_dir_name,
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "files": { "dates_dir": "/data/scans", "geojson_path": "/data/plots.geojson" },
        "tiff_info": { "common_crs": "EPSG:32612" },
        "image_correction": { "image_rotated": true },
        "color": { "lower": [30, 40, 40], "upper": [90, 255, 255] }
    }"#;

    #[test]
    fn parses_sectioned_json() {
        let cfg: RunConfig = serde_json::from_str(SAMPLE).unwrap();
        let settings = cfg.validate().unwrap();
        assert_eq!(settings.params.common_crs, "EPSG:32612");
        assert!(settings.params.image_rotated);
        assert_eq!(settings.params.threshold.lower(), [30, 40, 40]);
        assert_eq!(settings.id_field, "id");
        assert_eq!(
            settings.output_csv,
            PathBuf::from("/data/scans").join(DEFAULT_CSV_NAME)
        );
    }

    #[test]
    fn cli_values_override_file_values() {
        let file: RunConfig = serde_json::from_str(SAMPLE).unwrap();
        let mut cli = RunConfig::default();
        cli.tiff_info.common_crs = Some("EPSG:4326".into());
        cli.run.strict = Some(true);
        let settings = file.merge(cli).validate().unwrap();
        assert_eq!(settings.params.common_crs, "EPSG:4326");
        assert!(settings.params.strict);
        assert!(settings.params.image_rotated);
    }

    #[test]
    fn legacy_crs_key_is_accepted() {
        let cfg: RunConfig = serde_json::from_str(
            r#"{
                "files": { "dates_dir": "/data/scans", "geojson_path": "/data/plots.geojson" },
                "tiff_info": { "common_espg": "EPSG:32612" }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.validate().unwrap().params.common_crs, "EPSG:32612");
    }

    #[test]
    fn missing_crs_is_rejected() {
        let mut cfg: RunConfig = serde_json::from_str(SAMPLE).unwrap();
        cfg.tiff_info.common_crs = None;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Missing("tiff_info.common_crs"))
        ));
    }

    #[test]
    fn inverted_color_band_is_rejected() {
        let mut cfg: RunConfig = serde_json::from_str(SAMPLE).unwrap();
        cfg.color.lower = Some([100, 0, 0]);
        cfg.color.upper = Some([50, 255, 255]);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "color", .. })
        ));
    }
}
