//! ArcGIS REST `query` responses
//!
//! Features carry `attributes` and an Esri geometry, either `{x, y}` or
//! `{paths: [[[x, y], ...], ...]}`. Every path becomes its own record
//! sharing the feature's attributes and identifier: a one-vertex path is a
//! Point, anything longer a LineString. A bare `{x, y}` is a one-vertex path.

use super::geojson::features;
use super::mapping::{require_id, require_object, DateMapping};
use super::traits::{AdapterError, AdapterInput, ItemError, Normalized, SourceAdapter};
use crate::geometry::{Geometry, GeometryError, Position};
use crate::record::{NormalizedRecord, RecordError, FIELD_SHAPE, UNKNOWN_RECORD_ID};
use chrono::DateTime;
use chrono_tz::Tz;
use serde_json::Value;

pub struct ArcGisAdapter {
    id: String,
    source_label: String,
    id_key: String,
    dates: DateMapping,
}

impl ArcGisAdapter {
    pub fn new(id: impl Into<String>, source_label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_label: source_label.into(),
            id_key: "OBJECTID".to_string(),
            dates: DateMapping::native(),
        }
    }

    pub fn with_id_key(mut self, id_key: impl Into<String>) -> Self {
        self.id_key = id_key.into();
        self
    }

    pub fn with_dates(mut self, dates: DateMapping) -> Self {
        self.dates = dates;
        self
    }

    fn normalize_feature(&self, feature: &Value, now: DateTime<Tz>) -> Result<Vec<NormalizedRecord>, ItemError> {
        let obj = feature
            .as_object()
            .ok_or_else(|| RecordError::invalid(UNKNOWN_RECORD_ID, "feature", "expected an object"))?;
        let mut fields = require_object(obj, "attributes", UNKNOWN_RECORD_ID)?.clone();
        let record_id = require_id(&fields, &self.id_key, UNKNOWN_RECORD_ID)?;
        self.dates.apply(&record_id, &mut fields, now)?;

        let paths = esri_paths(obj.get("geometry")).map_err(|e| ItemError::geometry(&record_id, e))?;
        paths
            .into_iter()
            .map(|path| {
                let shape = path_geometry(path).map_err(|e| ItemError::geometry(&record_id, e))?;
                let mut fields = fields.clone();
                fields.insert(FIELD_SHAPE.to_string(), shape.to_value());
                Ok(NormalizedRecord::new(&record_id, &self.source_label, shape).with_fields(fields))
            })
            .collect()
    }
}

fn esri_paths(geometry: Option<&Value>) -> Result<Vec<Vec<Position>>, GeometryError> {
    let geometry = geometry
        .filter(|g| !g.is_null())
        .ok_or_else(|| GeometryError::Malformed("feature without geometry".to_string()))?;

    if let Some(paths) = geometry.get("paths") {
        return serde_json::from_value(paths.clone())
            .map_err(|e| GeometryError::Malformed(format!("paths: {}", e)));
    }

    let ordinate = |key: &str| {
        geometry
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| GeometryError::Malformed(format!("missing {} ordinate", key)))
    };
    Ok(vec![vec![Position::new(ordinate("x")?, ordinate("y")?)]])
}

fn path_geometry(path: Vec<Position>) -> Result<Geometry, GeometryError> {
    let geometry = match path.as_slice() {
        [] => return Err(GeometryError::Malformed("empty path".to_string())),
        [single] => Geometry::Point(*single),
        _ => Geometry::LineString(path),
    };
    geometry.validate()?;
    Ok(geometry)
}

impl SourceAdapter for ArcGisAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn normalize(&self, input: &AdapterInput<'_>) -> Result<Normalized, AdapterError> {
        let json = input.payload.as_json().ok_or(AdapterError::InvalidInput("JSON"))?;
        if let Some(error) = json.get("error") {
            return Err(AdapterError::Payload(format!("provider returned an error: {}", error)));
        }

        let mut out = Normalized::new();
        for feature in features(json)? {
            out.absorb(input, self.normalize_feature(feature, input.now))?;
        }
        Ok(out)
    }
}
