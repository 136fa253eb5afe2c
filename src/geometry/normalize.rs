//! Multi-geometry decomposition and representative points

use super::shape::{Geometry, GeometryError, Position};
use crate::record::NormalizedRecord;
use geo::{Centroid, LineInterpolatePoint};

/// One single-geometry piece of a record.
///
/// `shape` is what gets buffered for dedup and stored as the report's
/// GeoJSON; `position` is what gets stored as the report's lat/lng.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPart {
    pub record_id: String,
    /// Index of this part within its record (0 for single geometries)
    pub index: usize,
    pub shape: Geometry,
    pub position: Position,
}

/// Split a Multi* geometry into its members. Single geometries come back
/// as a one-element list.
pub fn decompose(geometry: &Geometry) -> Vec<Geometry> {
    match geometry {
        Geometry::MultiPoint(points) => points.iter().copied().map(Geometry::Point).collect(),
        Geometry::MultiLineString(lines) => {
            lines.iter().cloned().map(Geometry::LineString).collect()
        }
        Geometry::MultiPolygon(polygons) => {
            polygons.iter().cloned().map(Geometry::Polygon).collect()
        }
        single => vec![single.clone()],
    }
}

/// The point that stands for a geometry in dedup and storage.
///
/// - Point: itself
/// - LineString: the point halfway along its length
/// - Polygon: its centroid
/// - Multi*: centroid of the whole collection
pub fn representative_point(geometry: &Geometry) -> Result<Position, GeometryError> {
    let point = match geometry {
        Geometry::Point(p) => return Ok(*p),
        Geometry::LineString(_) => match geometry.to_geo() {
            // Zero-length lines have no fraction to interpolate along.
            geo::Geometry::LineString(line) => line
                .line_interpolate_point(0.5)
                .or_else(|| line.points().next()),
            _ => None,
        },
        _ => geometry.to_geo().centroid(),
    };
    point
        .map(|p| Position::new(p.x(), p.y()))
        .ok_or_else(|| {
            GeometryError::Malformed(format!(
                "no representative point for {:?}",
                geometry.kind()
            ))
        })
}

/// Decompose a record's authoritative shape into report parts.
pub fn normalize_geometry(record: &NormalizedRecord) -> Result<Vec<ReportPart>, GeometryError> {
    let shape = record.shape()?;
    decompose(&shape)
        .into_iter()
        .enumerate()
        .map(|(index, shape)| {
            let position = representative_point(&shape)?;
            Ok(ReportPart {
                record_id: record.record_id.clone(),
                index,
                shape,
                position,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pos(lng: f64, lat: f64) -> Position {
        Position::new(lng, lat)
    }

    #[test]
    fn line_midpoint_is_by_length_not_vertex_count() {
        // Three vertices, but the first segment is 9x longer than the second.
        let line = Geometry::LineString(vec![pos(0.0, 0.0), pos(9.0, 0.0), pos(10.0, 0.0)]);
        let mid = representative_point(&line).unwrap();
        assert!((mid.lng - 5.0).abs() < 1e-9);
        assert!(mid.lat.abs() < 1e-9);
    }

    #[test]
    fn zero_length_line_is_represented_by_its_vertex() {
        let line = Geometry::LineString(vec![pos(2.35, 48.85), pos(2.35, 48.85)]);
        assert_eq!(representative_point(&line).unwrap(), pos(2.35, 48.85));

        let record = NormalizedRecord::new("stub", "test", line);
        let parts = normalize_geometry(&record).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].position, pos(2.35, 48.85));
    }

    #[test]
    fn polygon_uses_centroid() {
        let square = Geometry::Polygon(vec![vec![
            pos(0.0, 0.0),
            pos(2.0, 0.0),
            pos(2.0, 2.0),
            pos(0.0, 2.0),
            pos(0.0, 0.0),
        ]]);
        let c = representative_point(&square).unwrap();
        assert!((c.lng - 1.0).abs() < 1e-9);
        assert!((c.lat - 1.0).abs() < 1e-9);
    }

    #[test]
    fn point_is_its_own_representative() {
        let p = Geometry::Point(pos(2.3, 48.8));
        assert_eq!(representative_point(&p).unwrap(), pos(2.3, 48.8));
    }

    #[test]
    fn multipoint_splits_into_points() {
        let multi = Geometry::MultiPoint(vec![pos(1.0, 1.0), pos(2.0, 2.0), pos(3.0, 3.0)]);
        let parts = decompose(&multi);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1], Geometry::Point(pos(2.0, 2.0)));
    }

    #[test]
    fn multilinestring_parts_get_their_own_midpoints() {
        let multi = Geometry::MultiLineString(vec![
            vec![pos(0.0, 0.0), pos(2.0, 0.0)],
            vec![pos(10.0, 10.0), pos(10.0, 14.0)],
        ]);
        let points: Vec<Position> = decompose(&multi)
            .iter()
            .map(|g| representative_point(g).unwrap())
            .collect();
        assert_eq!(points, vec![pos(1.0, 0.0), pos(10.0, 12.0)]);
    }

    #[test]
    fn normalize_prefers_geo_shape_field() {
        let record = NormalizedRecord::new("r1", "test", Geometry::Point(pos(5.0, 5.0)))
            .with_field(
                "geo_shape",
                json!({"type": "MultiPoint", "coordinates": [[1.0, 1.0], [2.0, 2.0]]}),
            );
        let parts = normalize_geometry(&record).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].position, pos(1.0, 1.0));
        assert_eq!(parts[1].index, 1);
        assert_eq!(parts[1].record_id, "r1");
    }

    #[test]
    fn normalize_falls_back_to_record_geometry() {
        let record = NormalizedRecord::new("r2", "test", Geometry::Point(pos(5.0, 5.0)));
        let parts = normalize_geometry(&record).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].shape, Geometry::Point(pos(5.0, 5.0)));
    }

    #[test]
    fn bad_geo_shape_is_a_geometry_error() {
        let record = NormalizedRecord::new("r3", "test", Geometry::Point(pos(5.0, 5.0)))
            .with_field("geo_shape", json!({"type": "GeometryCollection", "geometries": []}));
        assert!(matches!(
            normalize_geometry(&record),
            Err(GeometryError::Unsupported(_))
        ));
    }
}
