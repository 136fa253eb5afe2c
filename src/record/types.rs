//! The common record shape every source adapter produces

use crate::geometry::{Geometry, GeometryError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Start of the event, in any supported date encoding.
pub const FIELD_START: &str = "date_debut";
/// End of the event, in any supported date encoding.
pub const FIELD_END: &str = "date_fin";
/// Authoritative GeoJSON shape, preferred over the record geometry.
pub const FIELD_SHAPE: &str = "geo_shape";

/// Placeholder id used in logs when a raw item has no usable identifier.
pub const UNKNOWN_RECORD_ID: &str = "?";

/// Provider attributes, keyed by (renamed) attribute name.
pub type Fields = serde_json::Map<String, Value>;

/// A missing or unusable required attribute, scoped to one record.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecordError {
    #[error("record {record_id}: missing key {key}")]
    MissingField { record_id: String, key: String },

    #[error("record {record_id}: invalid {key}: {message}")]
    InvalidField {
        record_id: String,
        key: String,
        message: String,
    },
}

impl RecordError {
    pub fn missing(record_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingField {
            record_id: record_id.into(),
            key: key.into(),
        }
    }

    pub fn invalid(
        record_id: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            record_id: record_id.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn record_id(&self) -> &str {
        match self {
            Self::MissingField { record_id, .. } | Self::InvalidField { record_id, .. } => {
                record_id
            }
        }
    }
}

/// A provider item after schema adaptation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub record_id: String,
    pub source: String,
    pub geometry: Geometry,
    pub fields: Fields,
}

impl NormalizedRecord {
    pub fn new(record_id: impl Into<String>, source: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            record_id: record_id.into(),
            source: source.into(),
            geometry,
            fields: Fields::new(),
        }
    }

    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// A field value, treating JSON null and empty strings as absent.
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self.fields.get(key)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            v => Some(v),
        }
    }

    /// The geometry used for decomposition and buffering: `geo_shape` when
    /// the provider supplies one, the record geometry otherwise.
    pub fn shape(&self) -> Result<Geometry, GeometryError> {
        match self.field(FIELD_SHAPE) {
            Some(value) => Geometry::from_value(value),
            None => Ok(self.geometry.clone()),
        }
    }
}

/// Render a scalar JSON value as an identifier string.
pub fn field_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Position;
    use serde_json::json;

    #[test]
    fn empty_and_null_fields_read_as_absent() {
        let record = NormalizedRecord::new("r", "s", Geometry::Point(Position::new(0.0, 0.0)))
            .with_field("a", Value::Null)
            .with_field("b", json!("  "))
            .with_field("c", json!("2018-01-01"));
        assert!(record.field("a").is_none());
        assert!(record.field("b").is_none());
        assert!(record.field("c").is_some());
        assert!(record.field("missing").is_none());
    }

    #[test]
    fn numeric_ids_render_without_quotes() {
        assert_eq!(field_str(&json!(42)), Some("42".to_string()));
        assert_eq!(field_str(&json!("abc")), Some("abc".to_string()));
        assert_eq!(field_str(&json!(null)), None);
    }

    #[test]
    fn record_error_names_record_and_key() {
        let err = RecordError::missing("17", "date_demarrage");
        assert_eq!(err.to_string(), "record 17: missing key date_demarrage");
        assert_eq!(err.record_id(), "17");
    }
}
