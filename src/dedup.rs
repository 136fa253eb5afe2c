//! Spatial deduplication against a snapshot of active reports
//!
//! Feeds republish the same incident on every poll with slightly different
//! coordinates or shapes. A candidate part is a duplicate when its
//! representative point coincides with an active report, or when any
//! active report of the same type lies within a fixed buffer around the
//! part's shape. Both checks run in the metric CRS.

use crate::geometry::{MetricProjection, Position, ReportPart};
use crate::storage::{ActiveReport, ActiveReportQuery, StorageResult};
use chrono::{DateTime, Utc};
use geo::EuclideanDistance;

/// Default overlap distance, in meters.
pub const DEFAULT_BUFFER_METERS: f64 = 40.0;

/// One active report, projected for distance math.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub report_type: String,
    pub point: geo::Point<f64>,
    pub downvotes: i64,
    pub expiration_time: Option<DateTime<Utc>>,
}

/// Read-only view of the active reports of one type, taken once per batch.
#[derive(Debug, Clone)]
pub struct ActiveReportSnapshot {
    report_type: String,
    entries: Vec<SnapshotEntry>,
}

impl ActiveReportSnapshot {
    pub fn empty(report_type: impl Into<String>) -> Self {
        Self {
            report_type: report_type.into(),
            entries: Vec::new(),
        }
    }

    /// Project a list of active reports.
    pub fn from_reports(
        report_type: impl Into<String>,
        reports: &[ActiveReport],
        projection: &MetricProjection,
    ) -> Self {
        let report_type = report_type.into();
        let entries = reports
            .iter()
            .map(|r| SnapshotEntry {
                report_type: report_type.clone(),
                point: projection.project(Position::new(r.lng, r.lat)).into(),
                downvotes: r.downvotes,
                expiration_time: r.expiration_time,
            })
            .collect();
        Self {
            report_type,
            entries,
        }
    }

    /// Query the store for the active reports of `report_type`.
    pub fn load(
        query: &dyn ActiveReportQuery,
        report_type: &str,
        now: DateTime<Utc>,
        projection: &MetricProjection,
    ) -> StorageResult<Self> {
        let reports = query.query_active(report_type, now)?;
        Ok(Self::from_reports(report_type, &reports, projection))
    }

    /// Add a freshly committed report so later candidates see it.
    pub fn insert(
        &mut self,
        position: Position,
        expiration_time: Option<DateTime<Utc>>,
        projection: &MetricProjection,
    ) {
        self.entries.push(SnapshotEntry {
            report_type: self.report_type.clone(),
            point: projection.project(position).into(),
            downvotes: 0,
            expiration_time,
        });
    }

    pub fn report_type(&self) -> &str {
        &self.report_type
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Why a part was judged a duplicate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DuplicateReason {
    /// The representative point is exactly an existing report's point
    SamePosition,
    /// An existing report lies inside the buffered shape
    WithinBuffer { distance: f64 },
}

/// The proximity rule. Linear in the snapshot size; there is no spatial index.
#[derive(Debug, Clone, Copy)]
pub struct DedupEngine {
    projection: MetricProjection,
    buffer_meters: f64,
}

impl DedupEngine {
    pub fn new(projection: MetricProjection, buffer_meters: f64) -> Self {
        Self {
            projection,
            buffer_meters,
        }
    }

    pub fn projection(&self) -> &MetricProjection {
        &self.projection
    }

    pub fn buffer_meters(&self) -> f64 {
        self.buffer_meters
    }

    /// Check a part against the snapshot, returning the first hit.
    pub fn check(&self, part: &ReportPart, snapshot: &ActiveReportSnapshot) -> Option<DuplicateReason> {
        let candidates = || {
            snapshot
                .entries()
                .iter()
                .filter(|e| e.report_type == snapshot.report_type())
        };

        let position: geo::Point<f64> = self.projection.project(part.position).into();
        if candidates().any(|e| e.point == position) {
            return Some(DuplicateReason::SamePosition);
        }

        let shape = self.projection.project_geometry(&part.shape);
        candidates()
            .map(|e| distance_to(&e.point, &shape))
            .find(|d| *d <= self.buffer_meters)
            .map(|distance| DuplicateReason::WithinBuffer { distance })
    }

    pub fn is_duplicate(&self, part: &ReportPart, snapshot: &ActiveReportSnapshot) -> bool {
        self.check(part, snapshot).is_some()
    }
}

impl Default for DedupEngine {
    fn default() -> Self {
        Self::new(MetricProjection::lambert93(), DEFAULT_BUFFER_METERS)
    }
}

/// Distance from a point to a shape; zero inside polygons.
///
/// A point lies in the shape buffered by `d` exactly when this is `<= d`.
fn distance_to(point: &geo::Point<f64>, shape: &geo::Geometry<f64>) -> f64 {
    match shape {
        geo::Geometry::Point(p) => point.euclidean_distance(p),
        geo::Geometry::LineString(l) => point.euclidean_distance(l),
        geo::Geometry::Polygon(p) => point.euclidean_distance(p),
        geo::Geometry::MultiPoint(mp) => point.euclidean_distance(mp),
        geo::Geometry::MultiLineString(ml) => point.euclidean_distance(ml),
        geo::Geometry::MultiPolygon(mp) => point.euclidean_distance(mp),
        _ => f64::INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const METERS_PER_DEGREE_LAT: f64 = 111_200.0;

    fn active(lng: f64, lat: f64) -> ActiveReport {
        ActiveReport {
            lat,
            lng,
            downvotes: 0,
            expiration_time: None,
        }
    }

    fn point_part(lng: f64, lat: f64) -> ReportPart {
        let position = Position::new(lng, lat);
        ReportPart {
            record_id: "candidate".to_string(),
            index: 0,
            shape: Geometry::Point(position),
            position,
        }
    }

    fn snapshot_at(lng: f64, lat: f64) -> ActiveReportSnapshot {
        ActiveReportSnapshot::from_reports("traffic", &[active(lng, lat)], &MetricProjection::lambert93())
    }

    #[test]
    fn exact_position_is_duplicate() {
        let engine = DedupEngine::default();
        let snapshot = snapshot_at(2.35, 48.85);
        assert_eq!(
            engine.check(&point_part(2.35, 48.85), &snapshot),
            Some(DuplicateReason::SamePosition)
        );
    }

    #[test]
    fn eight_meters_away_is_duplicate() {
        let engine = DedupEngine::default();
        let snapshot = snapshot_at(2.35, 48.85);
        let part = point_part(2.35, 48.85 + 8.0 / METERS_PER_DEGREE_LAT);
        match engine.check(&part, &snapshot) {
            Some(DuplicateReason::WithinBuffer { distance }) => {
                assert!((distance - 8.0).abs() < 0.1, "distance = {}", distance)
            }
            other => panic!("expected buffer hit, got {:?}", other),
        }
    }

    #[test]
    fn six_kilometers_away_is_accepted() {
        let engine = DedupEngine::default();
        let snapshot = snapshot_at(2.35, 48.85);
        let part = point_part(2.35, 48.85 + 6_000.0 / METERS_PER_DEGREE_LAT);
        assert!(!engine.is_duplicate(&part, &snapshot));
    }

    #[test]
    fn long_line_catches_report_near_its_end() {
        // The midpoint is ~550m from the report, but the line passes within 20m.
        let engine = DedupEngine::default();
        let snapshot = snapshot_at(2.35, 48.85);
        let start = Position::new(2.35, 48.85 + 20.0 / METERS_PER_DEGREE_LAT);
        let end = Position::new(2.365, 48.85 + 20.0 / METERS_PER_DEGREE_LAT);
        let part = ReportPart {
            record_id: "line".to_string(),
            index: 0,
            shape: Geometry::LineString(vec![start, end]),
            position: Position::new(2.3575, start.lat),
        };
        assert!(matches!(
            engine.check(&part, &snapshot),
            Some(DuplicateReason::WithinBuffer { .. })
        ));
    }

    #[test]
    fn report_inside_polygon_is_duplicate() {
        let engine = DedupEngine::default();
        let snapshot = snapshot_at(2.35, 48.85);
        let ring = vec![
            Position::new(2.34, 48.84),
            Position::new(2.36, 48.84),
            Position::new(2.36, 48.86),
            Position::new(2.34, 48.86),
            Position::new(2.34, 48.84),
        ];
        let part = ReportPart {
            record_id: "zone".to_string(),
            index: 0,
            shape: Geometry::Polygon(vec![ring]),
            position: Position::new(2.351, 48.851),
        };
        assert_eq!(
            engine.check(&part, &snapshot),
            Some(DuplicateReason::WithinBuffer { distance: 0.0 })
        );
    }

    #[test]
    fn empty_snapshot_accepts_everything() {
        let engine = DedupEngine::default();
        let snapshot = ActiveReportSnapshot::empty("traffic");
        assert!(!engine.is_duplicate(&point_part(2.35, 48.85), &snapshot));
    }

    #[test]
    fn inserted_points_are_seen() {
        let engine = DedupEngine::default();
        let mut snapshot = ActiveReportSnapshot::empty("interrupt");
        snapshot.insert(Position::new(4.83, 45.76), None, engine.projection());
        assert_eq!(snapshot.len(), 1);
        assert!(engine.is_duplicate(&point_part(4.83, 45.76), &snapshot));
    }

    #[test]
    fn buffer_threshold_holds_for_random_offsets() {
        let engine = DedupEngine::default();
        let projection = MetricProjection::lambert93();
        let origin = Position::new(1.44, 43.60);
        let snapshot = ActiveReportSnapshot::from_reports("interrupt", &[active(origin.lng, origin.lat)], &projection);
        let origin_m: geo::Point<f64> = projection.project(origin).into();

        let mut rng = StdRng::seed_from_u64(2154);
        for _ in 0..500 {
            let dlng = rng.gen_range(-0.002..0.002);
            let dlat = rng.gen_range(-0.002..0.002);
            let part = point_part(origin.lng + dlng, origin.lat + dlat);
            let d = origin_m.euclidean_distance(&geo::Point::from(projection.project(part.position)));
            // Skip the numerically ambiguous rim.
            if (d - DEFAULT_BUFFER_METERS).abs() < 1e-6 {
                continue;
            }
            assert_eq!(engine.is_duplicate(&part, &snapshot), d <= DEFAULT_BUFFER_METERS, "d = {}", d);
        }
    }
}
