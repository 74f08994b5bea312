use gdal::DriverManager;
use gdal::Metadata;
use gdal::errors::GdalError as GdalCrateError;
use gdal::raster::{Buffer, ColorInterpretation};
use ndarray::{Array2, Array3, Axis};
use std::path::Path;

use crate::core::raster::GeoTransform;
use crate::io::reproject::spatial_ref;

/// Write an RGBA GeoTIFF; alpha is 255 where `valid`, else 0.
pub fn write_rgba_geotiff(
    output: &Path,
    pixels: &Array3<u8>,
    valid: &Array2<bool>,
    transform: GeoTransform,
    crs: &str,
    metadata: &[(&str, &str)],
) -> Result<(), GdalCrateError> {
    let (rows, cols) = valid.dim();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut ds = driver.create_with_band_type::<u8, _>(output, cols, rows, 4)?;
    ds.set_geo_transform(&transform.coefficients())?;
    ds.set_spatial_ref(&spatial_ref(crs)?)?;

    let interpretations = [
        ColorInterpretation::RedBand,
        ColorInterpretation::GreenBand,
        ColorInterpretation::BlueBand,
    ];
    for (ch, interp) in interpretations.into_iter().enumerate() {
        let mut band = ds.rasterband(ch + 1)?;
        band.set_color_interpretation(interp)?;
        let data: Vec<u8> = pixels.index_axis(Axis(2), ch).iter().copied().collect();
        let mut buf = Buffer::new((cols, rows), data);
        band.write((0, 0), (cols, rows), &mut buf)?;
    }

    {
        let mut alpha = ds.rasterband(4)?;
        alpha.set_color_interpretation(ColorInterpretation::AlphaBand)?;
        let data: Vec<u8> = valid.iter().map(|&v| if v { 255 } else { 0 }).collect();
        let mut buf = Buffer::new((cols, rows), data);
        alpha.write((0, 0), (cols, rows), &mut buf)?;
    }

    for (key, value) in metadata {
        ds.set_metadata_item(key, value, "")?;
    }
    Ok(())
}
