//! Plot boundary loader for GeoJSON feature collections.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use gdal::spatial_ref::CoordTransform;
use geo::{Area, Coord, LineString, Polygon};
use geojson::{GeoJson, JsonObject, JsonValue, feature::Id};
use thiserror::Error;
use tracing::{debug, info};

use crate::io::reproject::{crs_equivalent, spatial_ref};

/// CRS assumed for GeoJSON without a legacy `crs` member (RFC 7946 lon/lat)
pub const GEOJSON_DEFAULT_CRS: &str = "OGC:CRS84";

#[derive(Debug, Error)]
pub enum GeometryLoadError {
    #[error("Cannot read geometry source {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid GeoJSON: {0}")]
    Parse(#[from] geojson::Error),
    #[error("Expected a FeatureCollection or Feature, found a bare geometry")]
    NotFeatures,
    #[error("No plot geometries in {0:?}")]
    Empty(PathBuf),
    #[error("Feature #{index} has no `{field}` identifier")]
    MissingId { index: usize, field: String },
    #[error("Duplicate plot identifier: {0}")]
    DuplicateId(String),
    #[error("Plot {id}: unsupported geometry {kind} (single polygons only)")]
    UnsupportedGeometry { id: String, kind: String },
    #[error("Plot {id}: invalid polygon ({reason})")]
    InvalidPolygon { id: String, reason: String },
    #[error("Cannot reproject plots from {from} to {to}: {message}")]
    Reprojection {
        from: String,
        to: String,
        message: String,
    },
}

/// One field plot: identifier plus boundary polygon
#[derive(Debug, Clone, PartialEq)]
pub struct PlotGeometry {
    pub id: String,
    pub polygon: Polygon<f64>,
}

/// Immutable, ordered set of plots sharing one CRS
#[derive(Debug, Clone)]
pub struct PlotSet {
    plots: Vec<PlotGeometry>,
    crs: String,
}

impl PlotSet {
    /// Build a set, enforcing non-emptiness and unique identifiers.
    pub fn new(plots: Vec<PlotGeometry>, crs: impl Into<String>) -> Result<Self, GeometryLoadError> {
        if plots.is_empty() {
            return Err(GeometryLoadError::Empty(PathBuf::new()));
        }
        let mut seen = HashSet::with_capacity(plots.len());
        for plot in &plots {
            if !seen.insert(plot.id.as_str()) {
                return Err(GeometryLoadError::DuplicateId(plot.id.clone()));
            }
        }
        Ok(Self {
            plots,
            crs: crs.into(),
        })
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn len(&self) -> usize {
        self.plots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlotGeometry> {
        self.plots.iter()
    }

    pub fn as_slice(&self) -> &[PlotGeometry] {
        &self.plots
    }
}

/// Plots as parsed, still in their source CRS
#[derive(Debug, Clone)]
pub struct ParsedPlots {
    pub plots: Vec<PlotGeometry>,
    /// CRS named by a legacy `crs` member, if any
    pub declared_crs: Option<String>,
}

/// Read plots from `path` and bring them into `common_crs`.
///
/// The source CRS is `source_crs` when given, else the file's `crs` member,
/// else [`GEOJSON_DEFAULT_CRS`].
pub fn load_plots(
    path: &Path,
    id_field: &str,
    source_crs: Option<&str>,
    common_crs: &str,
) -> Result<PlotSet, GeometryLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| GeometryLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = parse_plots(&text, id_field).map_err(|e| match e {
        GeometryLoadError::Empty(_) => GeometryLoadError::Empty(path.to_path_buf()),
        other => other,
    })?;

    let from = source_crs
        .map(str::to_string)
        .or(parsed.declared_crs)
        .unwrap_or_else(|| GEOJSON_DEFAULT_CRS.to_string());
    info!(
        "Loaded {} plots from {:?} (CRS {})",
        parsed.plots.len(),
        path,
        from
    );

    let plots = reproject_plots(parsed.plots, &from, common_crs)?;
    PlotSet::new(plots, common_crs)
}

/// Parse a GeoJSON document into plots without touching CRS.
pub fn parse_plots(text: &str, id_field: &str) -> Result<ParsedPlots, GeometryLoadError> {
    let (features, foreign) = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => (fc.features, fc.foreign_members),
        GeoJson::Feature(f) => {
            let foreign = f.foreign_members.clone();
            (vec![f], foreign)
        }
        GeoJson::Geometry(_) => return Err(GeometryLoadError::NotFeatures),
    };
    if features.is_empty() {
        return Err(GeometryLoadError::Empty(PathBuf::new()));
    }

    let mut plots = Vec::with_capacity(features.len());
    let mut seen = HashSet::with_capacity(features.len());
    for (index, feature) in features.into_iter().enumerate() {
        let id = feature_id(&feature, id_field).ok_or_else(|| GeometryLoadError::MissingId {
            index,
            field: id_field.to_string(),
        })?;
        if !seen.insert(id.clone()) {
            return Err(GeometryLoadError::DuplicateId(id));
        }
        let Some(geometry) = feature.geometry else {
            return Err(GeometryLoadError::UnsupportedGeometry {
                id,
                kind: "null".into(),
            });
        };
        let polygon = polygon_from_value(&id, geometry.value)?;
        plots.push(PlotGeometry { id, polygon });
    }

    Ok(ParsedPlots {
        plots,
        declared_crs: foreign.as_ref().and_then(declared_crs),
    })
}

fn feature_id(feature: &geojson::Feature, id_field: &str) -> Option<String> {
    let from_property = feature.property(id_field).and_then(|v| match v {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    });
    from_property.or_else(|| match &feature.id {
        Some(Id::String(s)) => Some(s.clone()),
        Some(Id::Number(n)) => Some(n.to_string()),
        None => None,
    })
}

/// `{"crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32612"}}}`
fn declared_crs(foreign: &JsonObject) -> Option<String> {
    let name = foreign
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;
    Some(normalize_crs_name(name))
}

/// Turn OGC URNs into `AUTH:CODE` strings GDAL accepts everywhere.
pub fn normalize_crs_name(name: &str) -> String {
    let trimmed = name.trim();
    if let Some(rest) = trimmed.strip_prefix("urn:ogc:def:crs:") {
        let parts: Vec<&str> = rest.split(':').filter(|p| !p.is_empty()).collect();
        if let (Some(auth), Some(code)) = (parts.first(), parts.last()) {
            return format!("{}:{}", auth.to_ascii_uppercase(), code);
        }
    }
    trimmed.to_string()
}

fn polygon_from_value(id: &str, value: geojson::Value) -> Result<Polygon<f64>, GeometryLoadError> {
    let rings = match value {
        geojson::Value::Polygon(rings) => rings,
        geojson::Value::MultiPolygon(mut polys) if polys.len() == 1 => polys.remove(0),
        other => {
            return Err(GeometryLoadError::UnsupportedGeometry {
                id: id.to_string(),
                kind: value_kind(&other).to_string(),
            });
        }
    };

    let invalid = |reason: String| GeometryLoadError::InvalidPolygon {
        id: id.to_string(),
        reason,
    };
    let mut rings = rings.into_iter().map(|ring| {
        if ring.len() < 4 {
            return Err(invalid(format!("ring has {} positions, need 4", ring.len())));
        }
        let coords: Vec<Coord<f64>> = ring
            .iter()
            .map(|p| match p.as_slice() {
                [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
                _ => Err(invalid(format!("bad position {:?}", p))),
            })
            .collect::<Result<_, _>>()?;
        if coords.first() != coords.last() {
            return Err(invalid("ring is not closed".into()));
        }
        Ok(LineString::from(coords))
    });

    let exterior = rings
        .next()
        .ok_or_else(|| invalid("no exterior ring".into()))??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    let polygon = Polygon::new(exterior, interiors);
    if polygon.unsigned_area() <= 0.0 {
        return Err(invalid("zero area".into()));
    }
    Ok(polygon)
}

fn value_kind(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Transform every vertex from `from` to `to` with GDAL/PROJ.
pub fn reproject_plots(
    plots: Vec<PlotGeometry>,
    from: &str,
    to: &str,
) -> Result<Vec<PlotGeometry>, GeometryLoadError> {
    let error = |message: String| GeometryLoadError::Reprojection {
        from: from.to_string(),
        to: to.to_string(),
        message,
    };
    if crs_equivalent(from, to).map_err(|e| error(e.to_string()))? {
        debug!("Plots already in {}; no reprojection", to);
        return Ok(plots);
    }

    let source = spatial_ref(from).map_err(|e| error(e.to_string()))?;
    let target = spatial_ref(to).map_err(|e| error(e.to_string()))?;
    let transform = CoordTransform::new(&source, &target).map_err(|e| error(e.to_string()))?;

    let transform_ring = |ring: &LineString<f64>| -> Result<LineString<f64>, GeometryLoadError> {
        let mut xs: Vec<f64> = ring.coords().map(|c| c.x).collect();
        let mut ys: Vec<f64> = ring.coords().map(|c| c.y).collect();
        let mut zs = vec![0.0; xs.len()];
        transform
            .transform_coords(&mut xs, &mut ys, &mut zs)
            .map_err(|e| error(e.to_string()))?;
        Ok(xs
            .into_iter()
            .zip(ys)
            .map(|(x, y)| Coord { x, y })
            .collect::<Vec<_>>()
            .into())
    };

    plots
        .into_iter()
        .map(|plot| {
            let exterior = transform_ring(plot.polygon.exterior())?;
            let interiors = plot
                .polygon
                .interiors()
                .iter()
                .map(&transform_ring)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(PlotGeometry {
                id: plot.id,
                polygon: Polygon::new(exterior, interiors),
            })
        })
        .collect()
}
