//! Core building blocks: run parameters, the in-memory raster model, and
//! the processing stages (orientation, clip, classify, cover, pipeline).
//! These are consumed by the high-level `api` module.
pub mod params;
pub mod processing;
pub mod raster;
