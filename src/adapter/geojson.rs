//! GeoJSON FeatureCollection feeds

use super::mapping::{require_id, require_object, DateMapping};
use super::traits::{AdapterError, AdapterInput, ItemError, Normalized, SourceAdapter};
use crate::geometry::{Geometry, GeometryError};
use crate::record::{NormalizedRecord, RecordError, FIELD_SHAPE, UNKNOWN_RECORD_ID};
use chrono::DateTime;
use chrono_tz::Tz;
use serde_json::Value;

/// Reads `features[*].properties` and `features[*].geometry`. The feature
/// geometry is also the record's `geo_shape`.
pub struct GeoJsonAdapter {
    id: String,
    source_label: String,
    id_key: String,
    dates: DateMapping,
}

impl GeoJsonAdapter {
    pub fn new(id: impl Into<String>, source_label: impl Into<String>, id_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_label: source_label.into(),
            id_key: id_key.into(),
            dates: DateMapping::native(),
        }
    }

    pub fn with_dates(mut self, dates: DateMapping) -> Self {
        self.dates = dates;
        self
    }

    fn normalize_feature(&self, feature: &Value, now: DateTime<Tz>) -> Result<NormalizedRecord, ItemError> {
        let obj = feature
            .as_object()
            .ok_or_else(|| RecordError::invalid(UNKNOWN_RECORD_ID, "feature", "expected an object"))?;
        let mut fields = require_object(obj, "properties", UNKNOWN_RECORD_ID)?.clone();
        let record_id = require_id(&fields, &self.id_key, UNKNOWN_RECORD_ID)?;

        let geometry = match obj.get("geometry") {
            Some(value) if !value.is_null() => Geometry::from_value(value),
            _ => Err(GeometryError::Malformed("feature without geometry".to_string())),
        }
        .map_err(|e| ItemError::geometry(&record_id, e))?;

        fields.insert(FIELD_SHAPE.to_string(), geometry.to_value());
        self.dates.apply(&record_id, &mut fields, now)?;
        Ok(NormalizedRecord::new(record_id, &self.source_label, geometry).with_fields(fields))
    }
}

impl SourceAdapter for GeoJsonAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn normalize(&self, input: &AdapterInput<'_>) -> Result<Normalized, AdapterError> {
        let json = input.payload.as_json().ok_or(AdapterError::InvalidInput("JSON"))?;
        let features = features(json)?;

        let mut out = Normalized::new();
        for feature in features {
            out.absorb(input, self.normalize_feature(feature, input.now).map(|r| vec![r]))?;
        }
        Ok(out)
    }
}

/// The `features` array of a FeatureCollection or ArcGIS response.
pub(crate) fn features(json: &Value) -> Result<&Vec<Value>, AdapterError> {
    json.get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| AdapterError::Payload("no features array".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mapping::DateSource;
    use crate::feed::RawPayload;
    use crate::record::{FIELD_END, FIELD_START};
    use chrono::TimeZone;
    use chrono_tz::Europe::Paris;
    use serde_json::json;

    fn run(adapter: &GeoJsonAdapter, payload: Value) -> Result<Normalized, AdapterError> {
        let now = Paris.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap();
        let payload = RawPayload::Json(payload);
        adapter.normalize(&AdapterInput::new("test", &payload, now))
    }

    fn lyon() -> GeoJsonAdapter {
        GeoJsonAdapter::new("lyon", "opendata-lyon", "identifiant")
            .with_dates(DateMapping::fields("debutchantier", "finchantier"))
    }

    #[test]
    fn reads_features() {
        let out = run(
            &lyon(),
            json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "properties": {
                        "identifiant": 1234,
                        "debutchantier": "2026-09-01",
                        "finchantier": "2026-12-01"
                    },
                    "geometry": {"type": "MultiPolygon", "coordinates": [
                        [[[4.83, 45.76], [4.84, 45.76], [4.84, 45.77], [4.83, 45.76]]]
                    ]}
                }]
            }),
        )
        .unwrap();

        let record = &out.records[0];
        assert_eq!(record.record_id, "1234");
        assert_eq!(record.fields[FIELD_START], json!("2026-09-01"));
        assert_eq!(record.fields[FIELD_END], json!("2026-12-01"));
        assert_eq!(record.fields[FIELD_SHAPE]["type"], json!("MultiPolygon"));
    }

    #[test]
    fn missing_features_is_a_payload_error() {
        let err = run(&lyon(), json!({"type": "FeatureCollection"})).unwrap_err();
        assert!(matches!(err, AdapterError::Payload(_)));
    }

    #[test]
    fn missing_id_is_rejected() {
        let out = run(
            &lyon(),
            json!({"features": [{
                "properties": {"debutchantier": null, "finchantier": null},
                "geometry": {"type": "Point", "coordinates": [4.83, 45.76]}
            }]}),
        )
        .unwrap();
        assert!(out.records.is_empty());
        assert_eq!(
            out.rejected,
            vec![ItemError::Record(RecordError::missing(UNKNOWN_RECORD_ID, "identifiant"))]
        );
    }

    #[test]
    fn null_geometry_is_a_geometry_error() {
        let out = run(
            &lyon(),
            json!({"features": [{
                "properties": {"identifiant": "x", "debutchantier": null, "finchantier": null},
                "geometry": null
            }]}),
        )
        .unwrap();
        assert!(matches!(out.rejected[0], ItemError::Geometry { .. }));
    }

    #[test]
    fn rennes_only_renames_the_start() {
        let rennes = GeoJsonAdapter::new("rennes", "opendata-rennes", "id")
            .with_dates(DateMapping::native().with_start(DateSource::Field("date_deb".to_string())));
        let out = run(
            &rennes,
            json!({"features": [{
                "properties": {"id": "r1", "date_deb": "2026-10-01", "date_fin": "2026-10-20"},
                "geometry": {"type": "LineString", "coordinates": [[-1.68, 48.11], [-1.67, 48.11]]}
            }]}),
        )
        .unwrap();
        let record = &out.records[0];
        assert_eq!(record.fields[FIELD_START], json!("2026-10-01"));
        assert_eq!(record.fields[FIELD_END], json!("2026-10-20"));
    }
}
