use chrono::NaiveDate;
use gdal::raster::{ColorInterpretation, ResampleAlg};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, errors::GdalError as GdalCrateError};
use ndarray::{Array2, Array3};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::core::raster::{GeoTransform, RasterImage};
use crate::io::reproject::epsg_code;

/// Errors encountered when opening or decoding an orthomosaic
#[derive(Debug, Error)]
pub enum RasterLoadError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Cannot open raster {path:?}: {message}")]
    Open { path: PathBuf, message: String },
    #[error("Raster {path:?} has {bands} band(s); RGB needs at least 3")]
    TooFewBands { path: PathBuf, bands: usize },
    #[error("Raster {0:?} has no geotransform")]
    MissingGeoTransform(PathBuf),
    #[error("Raster {0:?} has no coordinate reference system")]
    MissingCrs(PathBuf),
    #[error("Dimension mismatch: expected {0}x{1}, got {2} values")]
    DimensionMismatch(usize, usize, usize),
    #[error("No raster file in scan directory {0:?}")]
    NoRaster(PathBuf),
}

/// Metadata extracted from a GDAL-supported orthomosaic
#[derive(Debug, Clone)]
pub struct GdalMetadata {
    /// Width (pixels) of the raster
    pub size_x: usize,
    /// Height (lines) of the raster
    pub size_y: usize,
    /// Affine geotransform coefficients ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height])
    pub geotransform: [f64; 6],
    /// `EPSG:XXXX` when the root CRS carries an EPSG authority, else WKT
    pub projection: String,
    /// Band 4 is flagged as alpha
    pub has_alpha: bool,
    /// No-data value of band 1, if any
    pub nodata: Option<f64>,
}

/// Reader for RGB(A) orthomosaics via GDAL
pub struct GdalRasterReader {
    pub path: PathBuf,
    pub dataset: Dataset,
    pub metadata: GdalMetadata,
}

/// `EPSG:XXXX` for a WKT whose root CRS has an EPSG authority, else the WKT.
///
/// Authorities on nested elements (datum, unit, base GEOGCS) do not name
/// the CRS itself and are ignored.
pub(crate) fn crs_label(wkt: &str) -> String {
    SpatialRef::from_wkt(wkt)
        .ok()
        .and_then(|srs| epsg_code(&srs))
        .map(|code| format!("EPSG:{}", code))
        .unwrap_or_else(|| wkt.to_string())
}

impl GdalRasterReader {
    /// Open an orthomosaic and validate that it is georeferenced RGB.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RasterLoadError> {
        let path = path.as_ref().to_path_buf();
        let dataset = Dataset::open(&path).map_err(|e| RasterLoadError::Open {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let (size_x, size_y) = dataset.raster_size();
        let bands = dataset.raster_count() as usize;
        if bands < 3 {
            return Err(RasterLoadError::TooFewBands { path, bands });
        }
        let geotransform = dataset
            .geo_transform()
            .map_err(|_| RasterLoadError::MissingGeoTransform(path.clone()))?;

        let proj = dataset.projection();
        if proj.trim().is_empty() {
            return Err(RasterLoadError::MissingCrs(path));
        }
        let projection = if proj.starts_with("EPSG:") {
            proj
        } else {
            crs_label(&proj)
        };

        let has_alpha = bands >= 4
            && dataset.rasterband(4)?.color_interpretation() == ColorInterpretation::AlphaBand;
        let nodata = dataset.rasterband(1)?.no_data_value();

        debug!(
            "Opened {:?}: {}x{}, {} bands, alpha={}, nodata={:?}, crs={}",
            path, size_x, size_y, bands, has_alpha, nodata, projection
        );

        Ok(GdalRasterReader {
            path,
            dataset,
            metadata: GdalMetadata {
                size_x: size_x as usize,
                size_y: size_y as usize,
                geotransform,
                projection,
                has_alpha,
                nodata,
            },
        })
    }

    /// Read a single band (1-based index) as a u8 ndarray of shape (height, width)
    pub fn read_band(&self, index: usize) -> Result<Array2<u8>, RasterLoadError> {
        let band = self.dataset.rasterband(index)?;
        let window = (self.metadata.size_x, self.metadata.size_y);
        let buf = band.read_as::<u8>((0, 0), window, window, Some(ResampleAlg::NearestNeighbour))?;
        let data_vec = buf.data().to_vec();
        let len = data_vec.len();
        Array2::from_shape_vec((self.metadata.size_y, self.metadata.size_x), data_vec).map_err(
            |_| RasterLoadError::DimensionMismatch(self.metadata.size_x, self.metadata.size_y, len),
        )
    }

    /// Read bands 1-3 as RGB plus a validity mask.
    ///
    /// Validity comes from the alpha band when present, else from the
    /// no-data value (a pixel is invalid when all three channels equal it).
    pub fn read_image(&self, date: NaiveDate) -> Result<RasterImage, RasterLoadError> {
        let (rows, cols) = (self.metadata.size_y, self.metadata.size_x);
        let mut pixels = Array3::<u8>::zeros((rows, cols, 3));
        for ch in 0..3 {
            let band = self.read_band(ch + 1)?;
            pixels
                .index_axis_mut(ndarray::Axis(2), ch)
                .assign(&band);
        }

        let valid = if self.metadata.has_alpha {
            self.read_band(4)?.mapv(|a| a != 0)
        } else if let Some(nd) = self.metadata.nodata {
            let mut valid = Array2::from_elem((rows, cols), true);
            if (0.0..=255.0).contains(&nd) && nd.fract() == 0.0 {
                let nd = nd as u8;
                for ((r, c), v) in valid.indexed_iter_mut() {
                    *v = !(0..3).all(|ch| pixels[[r, c, ch]] == nd);
                }
            }
            valid
        } else {
            Array2::from_elem((rows, cols), true)
        };

        Ok(RasterImage {
            date,
            source: self.path.clone(),
            pixels,
            valid,
            transform: GeoTransform::new(self.metadata.geotransform),
            crs: self.metadata.projection.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsg_comes_from_the_root_authority() {
        let wkt = SpatialRef::from_epsg(32612).unwrap().to_wkt().unwrap();
        assert_eq!(crs_label(&wkt), "EPSG:32612");
    }

    #[test]
    fn custom_projection_keeps_its_wkt() {
        // Only the base GEOGCS and the unit carry authorities
        let wkt = concat!(
            r#"PROJCS["Field TM",GEOGCS["WGS 84",DATUM["WGS_1984","#,
            r#"SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],"#,
            r#"AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0],"#,
            r#"UNIT["degree",0.0174532925199433],AUTHORITY["EPSG","4326"]],"#,
            r#"PROJECTION["Transverse_Mercator"],PARAMETER["latitude_of_origin",0],"#,
            r#"PARAMETER["central_meridian",-111.5],PARAMETER["scale_factor",1],"#,
            r#"PARAMETER["false_easting",1000],PARAMETER["false_northing",0],"#,
            r#"UNIT["metre",1,AUTHORITY["EPSG","9001"]]]"#
        );
        assert_eq!(crs_label(wkt), wkt);
    }

    #[test]
    fn unparsable_projection_is_kept_verbatim() {
        assert_eq!(crs_label("LOCAL_CS[\"x\""), "LOCAL_CS[\"x\"");
    }

    #[test]
    fn rgba_file_reads_alpha_as_validity() {
        use crate::io::writers::tiff::write_rgba_geotiff;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ortho.tif");
        let pixels = Array3::<u8>::from_elem((2, 3, 3), 90);
        let mut valid = Array2::from_elem((2, 3), true);
        valid[[1, 2]] = false;
        let gt = [500000.0, 0.5, 0.0, 4000000.0, 0.0, -0.5];
        write_rgba_geotiff(&path, &pixels, &valid, GeoTransform::new(gt), "EPSG:32612", &[])
            .unwrap();

        let reader = GdalRasterReader::open(&path).unwrap();
        assert_eq!((reader.metadata.size_x, reader.metadata.size_y), (3, 2));
        assert_eq!(reader.metadata.projection, "EPSG:32612");
        assert!(reader.metadata.has_alpha);
        let image = reader
            .read_image(NaiveDate::from_ymd_opt(2022, 1, 1).unwrap())
            .unwrap();
        assert_eq!(image.valid, valid);
        assert_eq!(image.transform.coefficients(), gt);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = GdalRasterReader::open("/nonexistent/ortho.tif").err().unwrap();
        assert!(matches!(err, RasterLoadError::Open { .. }));
    }
}
