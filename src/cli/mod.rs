//! Command Line Interface (CLI) layer for canopy-cover.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`): merge the JSON config with the
//! command-line overrides, run the measurement, and report.
//!
//! If you are embedding the measurement into another application, prefer
//! the high-level `canopy_cover::api` module instead of the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
