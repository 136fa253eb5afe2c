//! OpenDataSoft "records" exports
//!
//! The payload is a JSON array of `{recordid, fields, geometry}` objects.
//! Providers disagree on where the point and the shape live and on how the
//! dates are spelled; `RecordsAdapter` is configured with those choices.

use super::mapping::{require, require_object, DateMapping};
use super::traits::{AdapterError, AdapterInput, ItemError, Normalized, SourceAdapter};
use crate::geometry::{Geometry, Position};
use crate::record::{field_str, NormalizedRecord, RecordError, FIELD_SHAPE, UNKNOWN_RECORD_ID};
use chrono::DateTime;
use chrono_tz::Tz;
use serde_json::Value;

/// Where the record geometry comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum PointSource {
    /// The record's own `geometry` member
    Geometry,
    /// A `[lat, lng]` attribute
    LatLngField(String),
}

/// What ends up in `geo_shape`.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeSource {
    /// Whatever the provider already put there, if anything
    Native,
    /// The record geometry
    Geometry,
    /// Another attribute holding a GeoJSON geometry
    Field(String),
}

pub struct RecordsAdapter {
    id: String,
    source_label: String,
    point: PointSource,
    shape: ShapeSource,
    dates: DateMapping,
}

impl RecordsAdapter {
    pub fn new(id: impl Into<String>, source_label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_label: source_label.into(),
            point: PointSource::Geometry,
            shape: ShapeSource::Native,
            dates: DateMapping::native(),
        }
    }

    pub fn with_point(mut self, point: PointSource) -> Self {
        self.point = point;
        self
    }

    pub fn with_shape(mut self, shape: ShapeSource) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_dates(mut self, dates: DateMapping) -> Self {
        self.dates = dates;
        self
    }

    fn normalize_item(&self, item: &Value, now: DateTime<Tz>) -> Result<NormalizedRecord, ItemError> {
        let obj = item
            .as_object()
            .ok_or_else(|| RecordError::invalid(UNKNOWN_RECORD_ID, "record", "expected an object"))?;
        let record_id = obj
            .get("recordid")
            .and_then(field_str)
            .ok_or_else(|| RecordError::missing(UNKNOWN_RECORD_ID, "recordid"))?;
        let mut fields = require_object(obj, "fields", &record_id)?.clone();

        let geometry = match &self.point {
            PointSource::Geometry => Geometry::from_value(require(obj, "geometry", &record_id)?)
                .map_err(|e| ItemError::geometry(&record_id, e))?,
            PointSource::LatLngField(key) => {
                lat_lng_point(require(&fields, key, &record_id)?, key, &record_id)?
            }
        };

        match &self.shape {
            ShapeSource::Native => {}
            ShapeSource::Geometry => {
                fields.insert(FIELD_SHAPE.to_string(), geometry.to_value());
            }
            ShapeSource::Field(key) => {
                let shape = require(&fields, key, &record_id)?.clone();
                fields.insert(FIELD_SHAPE.to_string(), shape);
            }
        }

        self.dates.apply(&record_id, &mut fields, now)?;
        Ok(NormalizedRecord::new(record_id, &self.source_label, geometry).with_fields(fields))
    }
}

/// `[lat, lng]` to a GeoJSON point.
fn lat_lng_point(value: &Value, key: &str, record_id: &str) -> Result<Geometry, RecordError> {
    let pair: Vec<f64> = serde_json::from_value(value.clone())
        .map_err(|e| RecordError::invalid(record_id, key, e.to_string()))?;
    match pair.as_slice() {
        [lat, lng] => Ok(Geometry::Point(Position::new(*lng, *lat))),
        _ => Err(RecordError::invalid(record_id, key, "expected [lat, lng]")),
    }
}

impl SourceAdapter for RecordsAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn normalize(&self, input: &AdapterInput<'_>) -> Result<Normalized, AdapterError> {
        let json = input.payload.as_json().ok_or(AdapterError::InvalidInput("JSON"))?;
        let items = match json {
            Value::Array(items) => items,
            Value::Object(obj) => {
                return Err(AdapterError::Payload(match obj.get("error") {
                    Some(error) => format!("provider returned an error: {}", error),
                    None => "expected an array of records".to_string(),
                }))
            }
            _ => return Err(AdapterError::Payload("expected an array of records".to_string())),
        };

        let mut out = Normalized::new();
        for item in items {
            out.absorb(input, self.normalize_item(item, input.now).map(|r| vec![r]))?;
        }
        Ok(out)
    }
}
