use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use canopy_cover::io::writers::summary::RunSummary;
use canopy_cover::{Error, RunConfig, measure_canopy_cover};

use super::args::CliArgs;
use super::errors::AppError;

fn init_logging(args: &CliArgs) {
    let default_level = if args.log {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A second init (e.g. from tests) is harmless
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn print_summary(summary: &RunSummary) {
    println!(
        "dates={} plots={} rows={} measured={} no_coverage={} no_valid_pixels={} raster_failed={} plot_failed={}",
        summary.dates,
        summary.plots,
        summary.rows,
        summary.measured,
        summary.no_coverage,
        summary.no_valid_pixels,
        summary.raster_failed,
        summary.plot_failed
    );
    for f in &summary.skipped_dates {
        println!("skipped {}: {}", f.date, f.cause);
    }
    for f in &summary.failed_plots {
        println!(
            "failed {} {}: {}",
            f.date,
            f.plot_id.as_deref().unwrap_or("?"),
            f.cause
        );
    }
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&args);

    if args.config.is_none() && (args.dates_dir.is_none() || args.geometry.is_none()) {
        return Err(AppError::MissingArgument {
            arg: "--config or --dates-dir with --geometry".to_string(),
        }
        .into());
    }

    let base = match &args.config {
        Some(path) => {
            info!("Loading config {:?}", path);
            RunConfig::from_json_file(path).map_err(AppError::from)?
        }
        None => RunConfig::default(),
    };
    let settings = base
        .merge(args.to_overrides())
        .validate()
        .map_err(AppError::from)?;

    info!("Dates directory: {:?}", settings.dates_dir);
    info!("Plots: {:?}", settings.geojson_path);
    info!("Output: {:?}", settings.output_csv);

    match measure_canopy_cover(&settings) {
        Ok(report) => {
            report.summary.log();
            if args.verbose {
                print_summary(&report.summary);
            }
            info!("Canopy cover complete: {:?}", report.csv_path);
            Ok(())
        }
        Err(Error::StrictAbort { cause, partial }) => {
            warn!("Strict mode: stopped after {} rows", partial.len());
            if args.verbose {
                print_summary(&RunSummary::from_table(&partial));
            }
            Err(Box::new(Error::StrictAbort { cause, partial }))
        }
        Err(e) => Err(e.into()),
    }
}
