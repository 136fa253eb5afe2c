//! GeoJSON geometry model
//!
//! Only the six simple-feature kinds are accepted. Anything else
//! (GeometryCollection, unknown `type` strings) is a `GeometryError`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while reading or interpreting a geometry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeometryError {
    #[error("unsupported geometry type: {0}")]
    Unsupported(String),

    #[error("malformed geometry: {0}")]
    Malformed(String),
}

/// A WGS84 position. Serializes as a GeoJSON `[lng, lat]` pair; extra
/// ordinates (altitude) are accepted on input and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 2]")]
pub struct Position {
    pub lng: f64,
    pub lat: f64,
}

impl Position {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    fn is_finite(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite()
    }
}

impl TryFrom<Vec<f64>> for Position {
    type Error = String;

    fn try_from(coords: Vec<f64>) -> Result<Self, Self::Error> {
        match coords.as_slice() {
            [lng, lat, ..] => Ok(Self::new(*lng, *lat)),
            _ => Err(format!("position needs two ordinates, got {}", coords.len())),
        }
    }
}

impl From<Position> for [f64; 2] {
    fn from(p: Position) -> Self {
        [p.lng, p.lat]
    }
}

impl From<Position> for geo::Coord<f64> {
    fn from(p: Position) -> Self {
        geo::Coord { x: p.lng, y: p.lat }
    }
}

/// The geometry kinds a record may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
}

impl GeometryKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Point" => Some(Self::Point),
            "LineString" => Some(Self::LineString),
            "Polygon" => Some(Self::Polygon),
            "MultiPoint" => Some(Self::MultiPoint),
            "MultiLineString" => Some(Self::MultiLineString),
            "MultiPolygon" => Some(Self::MultiPolygon),
            _ => None,
        }
    }

    pub fn is_multi(self) -> bool {
        matches!(
            self,
            Self::MultiPoint | Self::MultiLineString | Self::MultiPolygon
        )
    }
}

/// A GeoJSON geometry in WGS84.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
    Polygon(Vec<Vec<Position>>),
    MultiPoint(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    /// Read a GeoJSON geometry object.
    pub fn from_value(value: &Value) -> Result<Self, GeometryError> {
        let name = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| GeometryError::Malformed("missing geometry type".to_string()))?;
        if GeometryKind::parse(name).is_none() {
            return Err(GeometryError::Unsupported(name.to_string()));
        }
        let geometry: Geometry = serde_json::from_value(value.clone())
            .map_err(|e| GeometryError::Malformed(e.to_string()))?;
        geometry.validate()?;
        Ok(geometry)
    }

    /// Serialize back to a GeoJSON value.
    pub fn to_value(&self) -> Value {
        // A closed enum of numeric arrays always serializes.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn to_geojson_string(&self) -> String {
        self.to_value().to_string()
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            Self::Point(_) => GeometryKind::Point,
            Self::LineString(_) => GeometryKind::LineString,
            Self::Polygon(_) => GeometryKind::Polygon,
            Self::MultiPoint(_) => GeometryKind::MultiPoint,
            Self::MultiLineString(_) => GeometryKind::MultiLineString,
            Self::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }

    /// Check structural invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), GeometryError> {
        match self {
            Self::Point(p) => check_positions(std::slice::from_ref(p)),
            Self::LineString(line) => check_line(line),
            Self::Polygon(rings) => check_polygon(rings),
            Self::MultiPoint(points) => {
                non_empty(points, "MultiPoint")?;
                check_positions(points)
            }
            Self::MultiLineString(lines) => {
                non_empty(lines, "MultiLineString")?;
                lines.iter().try_for_each(|l| check_line(l))
            }
            Self::MultiPolygon(polygons) => {
                non_empty(polygons, "MultiPolygon")?;
                polygons.iter().try_for_each(|p| check_polygon(p))
            }
        }
    }

    /// Apply `f` to every position, keeping the structure.
    pub fn map_positions<T>(&self, f: impl Fn(Position) -> T) -> geo::Geometry<f64>
    where
        T: Into<geo::Coord<f64>>,
    {
        let line = |ps: &[Position]| -> geo::LineString<f64> {
            ps.iter().map(|p| f(*p).into()).collect::<Vec<geo::Coord<f64>>>().into()
        };
        let polygon = |rings: &[Vec<Position>]| -> geo::Polygon<f64> {
            let mut rings = rings.iter().map(|r| line(r));
            let exterior = rings.next().unwrap_or_else(|| geo::LineString::new(Vec::new()));
            geo::Polygon::new(exterior, rings.collect())
        };
        match self {
            Self::Point(p) => geo::Geometry::Point(geo::Point(f(*p).into())),
            Self::LineString(ps) => geo::Geometry::LineString(line(ps)),
            Self::Polygon(rings) => geo::Geometry::Polygon(polygon(rings)),
            Self::MultiPoint(ps) => geo::Geometry::MultiPoint(geo::MultiPoint(
                ps.iter().map(|p| geo::Point(f(*p).into())).collect(),
            )),
            Self::MultiLineString(lines) => geo::Geometry::MultiLineString(
                geo::MultiLineString(lines.iter().map(|l| line(l)).collect()),
            ),
            Self::MultiPolygon(polys) => geo::Geometry::MultiPolygon(geo::MultiPolygon(
                polys.iter().map(|p| polygon(p)).collect(),
            )),
        }
    }

    /// The geometry as `geo` types, still in longitude/latitude.
    pub fn to_geo(&self) -> geo::Geometry<f64> {
        self.map_positions(|p| p)
    }
}

fn non_empty<T>(items: &[T], kind: &str) -> Result<(), GeometryError> {
    if items.is_empty() {
        Err(GeometryError::Malformed(format!("{} has no members", kind)))
    } else {
        Ok(())
    }
}

fn check_positions(positions: &[Position]) -> Result<(), GeometryError> {
    match positions.iter().find(|p| !p.is_finite()) {
        Some(p) => Err(GeometryError::Malformed(format!(
            "non-finite coordinate [{}, {}]",
            p.lng, p.lat
        ))),
        None => Ok(()),
    }
}

fn check_line(line: &[Position]) -> Result<(), GeometryError> {
    if line.len() < 2 {
        return Err(GeometryError::Malformed(format!(
            "LineString needs at least 2 positions, got {}",
            line.len()
        )));
    }
    check_positions(line)
}

fn check_polygon(rings: &[Vec<Position>]) -> Result<(), GeometryError> {
    non_empty(rings, "Polygon")?;
    for ring in rings {
        if ring.len() < 3 {
            return Err(GeometryError::Malformed(format!(
                "Polygon ring needs at least 3 positions, got {}",
                ring.len()
            )));
        }
        check_positions(ring)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_point_and_drops_altitude() {
        let g = Geometry::from_value(&json!({"type": "Point", "coordinates": [2.35, 48.85, 35.0]}))
            .unwrap();
        assert_eq!(g, Geometry::Point(Position::new(2.35, 48.85)));
        assert_eq!(g.to_value(), json!({"type": "Point", "coordinates": [2.35, 48.85]}));
    }

    #[test]
    fn ignores_foreign_members() {
        let g = Geometry::from_value(&json!({
            "type": "LineString",
            "coordinates": [[2.0, 48.0], [2.1, 48.1]],
            "bbox": [2.0, 48.0, 2.1, 48.1]
        }))
        .unwrap();
        assert_eq!(g.kind(), GeometryKind::LineString);
    }

    #[test]
    fn geometry_collection_is_unsupported() {
        let err = Geometry::from_value(&json!({"type": "GeometryCollection", "geometries": []}))
            .unwrap_err();
        assert_eq!(err, GeometryError::Unsupported("GeometryCollection".to_string()));
    }

    #[test]
    fn missing_type_is_malformed() {
        let err = Geometry::from_value(&json!({"coordinates": [1.0, 2.0]})).unwrap_err();
        assert!(matches!(err, GeometryError::Malformed(_)));
    }

    #[test]
    fn single_vertex_line_is_malformed() {
        let err = Geometry::from_value(&json!({"type": "LineString", "coordinates": [[2.0, 48.0]]}))
            .unwrap_err();
        assert!(matches!(err, GeometryError::Malformed(_)));
    }

    #[test]
    fn empty_multipoint_is_malformed() {
        let err = Geometry::from_value(&json!({"type": "MultiPoint", "coordinates": []}))
            .unwrap_err();
        assert!(matches!(err, GeometryError::Malformed(_)));
    }

    #[test]
    fn short_position_is_malformed() {
        let err = Geometry::from_value(&json!({"type": "Point", "coordinates": [2.0]}))
            .unwrap_err();
        assert!(matches!(err, GeometryError::Malformed(_)));
    }

    #[test]
    fn kind_reports_multi() {
        assert!(GeometryKind::MultiPolygon.is_multi());
        assert!(!GeometryKind::Polygon.is_multi());
    }
}
