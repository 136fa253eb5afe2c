//! Report geometry
//!
//! Stored coordinates are always WGS84 longitude/latitude. Distance and
//! buffer math happens in a metric planar CRS, reprojected on demand.

mod normalize;
mod projection;
mod shape;

pub use normalize::{decompose, normalize_geometry, representative_point, ReportPart};
pub use projection::{LambertConic, MetricProjection};
pub use shape::{Geometry, GeometryError, GeometryKind, Position};
