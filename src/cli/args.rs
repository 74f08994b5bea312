use clap::Parser;
use std::path::PathBuf;

use canopy_cover::{OrientationStrategy, Resampling, RunConfig};

use super::errors::AppError;

#[derive(Parser)]
#[command(name = "canopy-cover", version, about = "Per-plot canopy cover from RGB orthomosaics")]
pub struct CliArgs {
    /// JSON run configuration; command-line flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding one YYYY-MM-DD subdirectory per scan
    #[arg(long)]
    pub dates_dir: Option<PathBuf>,

    /// GeoJSON FeatureCollection of plot polygons
    #[arg(short, long)]
    pub geometry: Option<PathBuf>,

    /// Feature property holding the plot identifier (default: id)
    #[arg(long)]
    pub id_field: Option<String>,

    /// CRS of the plot coordinates when the GeoJSON does not declare one
    #[arg(long)]
    pub geometry_crs: Option<String>,

    /// Common CRS for rasters and plots (e.g., EPSG:32612)
    #[arg(long)]
    pub common_crs: Option<String>,

    /// Correct rotated orthomosaics onto a north-up grid before measuring
    #[arg(long, default_value_t = false)]
    pub rotated: bool,

    /// Orientation correction strategy (north-up-nearest, north-up-bilinear)
    #[arg(long, value_enum)]
    pub orientation: Option<OrientationStrategy>,

    /// Lower HSV bound as H,S,V (OpenCV scale: H 0-179, S/V 0-255)
    #[arg(long, value_parser = parse_hsv)]
    pub lower: Option<[u8; 3]>,

    /// Upper HSV bound as H,S,V
    #[arg(long, value_parser = parse_hsv)]
    pub upper: Option<[u8; 3]>,

    /// Output directory for the CSV and summary (default: dates dir)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Output CSV file name (default: canopy_cover.csv)
    #[arg(long)]
    pub csv_name: Option<String>,

    /// Also write clipped plot GeoTIFFs to <date dir>/<name>/
    #[arg(long)]
    pub plots_dir_name: Option<String>,

    /// Abort on the first date or plot failure
    #[arg(long, default_value_t = false)]
    pub strict: bool,

    /// Worker threads for per-plot processing (default: all cores)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Resampling used when reprojecting rasters (nearest, bilinear, cubic)
    #[arg(long, value_enum)]
    pub resampling: Option<Resampling>,

    /// Print the run summary when done
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    pub log: bool,
}

fn parse_hsv(value: &str) -> Result<[u8; 3], AppError> {
    let invalid = || AppError::InvalidTriple {
        value: value.to_string(),
    };
    let parts: Vec<u8> = value
        .split(',')
        .map(|p| p.trim().parse::<u8>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid())?;
    parts.try_into().map_err(|_| invalid())
}

impl CliArgs {
    /// Flags as a config overlay; unset flags leave the file's values alone.
    pub fn to_overrides(&self) -> RunConfig {
        let mut cfg = RunConfig::default();
        cfg.files.dates_dir = self.dates_dir.clone();
        cfg.files.geojson_path = self.geometry.clone();
        cfg.files.id_field = self.id_field.clone();
        cfg.files.geometry_crs = self.geometry_crs.clone();
        cfg.files.output_dir = self.output_dir.clone();
        cfg.files.csv_name = self.csv_name.clone();
        cfg.files.plots_dir_name = self.plots_dir_name.clone();
        cfg.tiff_info.common_crs = self.common_crs.clone();
        cfg.image_correction.image_rotated = self.rotated.then_some(true);
        cfg.image_correction.strategy = self.orientation;
        cfg.color.lower = self.lower;
        cfg.color.upper = self.upper;
        cfg.run.strict = self.strict.then_some(true);
        cfg.run.workers = self.workers;
        cfg.run.resampling = self.resampling;
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsv_triples_parse() {
        assert_eq!(parse_hsv("36, 25,25").unwrap(), [36, 25, 25]);
        assert!(parse_hsv("36,25").is_err());
        assert!(parse_hsv("36,25,256").is_err());
        assert!(parse_hsv("a,b,c").is_err());
    }

    #[test]
    fn flags_override_only_what_is_set() {
        let args = CliArgs::parse_from([
            "canopy-cover",
            "--common-crs",
            "EPSG:32612",
            "--lower",
            "30,40,40",
            "--strict",
        ]);
        let cfg = args.to_overrides();
        assert_eq!(cfg.tiff_info.common_crs.as_deref(), Some("EPSG:32612"));
        assert_eq!(cfg.color.lower, Some([30, 40, 40]));
        assert_eq!(cfg.run.strict, Some(true));
        assert_eq!(cfg.image_correction.image_rotated, None);
        assert!(cfg.files.dates_dir.is_none());
    }
}
