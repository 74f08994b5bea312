use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid HSV triple: {value}. Expected H,S,V with values 0-255")]
    InvalidTriple { value: String },

    #[error("Missing required argument: {arg}")]
    MissingArgument { arg: String },

    #[error("Config error: {0}")]
    Config(#[from] canopy_cover::ConfigError),
}
