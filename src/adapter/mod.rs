//! Provider adapters
//!
//! An adapter turns one provider's raw payload into `NormalizedRecord`s.
//! Adapters are grouped into families by wire format and configured per
//! provider; the registry maps a source's `adapter` id to its instance.

mod arcgis;
mod geojson;
mod kml;
mod mapping;
mod providers;
mod records;
mod registry;
mod traits;
mod wfs;

pub use arcgis::ArcGisAdapter;
pub use geojson::GeoJsonAdapter;
pub use kml::{ExtendedField, FieldTransform, KmlAdapter};
pub use mapping::{DateMapping, DateSource};
pub use providers::builtin_adapters;
pub use records::{PointSource, RecordsAdapter, ShapeSource};
pub use registry::AdapterRegistry;
pub use traits::{AdapterError, AdapterInput, ItemError, Normalized, SourceAdapter};
pub use wfs::{AxisOrder, WfsAdapter};
