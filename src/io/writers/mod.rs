//! Output writers: the cover table (CSV), the JSON run summary, and
//! clipped-plot GeoTIFFs.
pub mod summary;
pub mod table;
pub mod tiff;
