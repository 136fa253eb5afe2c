//! KML placemark feeds
//!
//! Attributes come from `ExtendedData` (`SimpleData` or `Data/value`),
//! renamed and transformed per provider. Geometry comes from the
//! placemark's Point, LineString, Polygon or MultiGeometry.

use super::mapping::{local_iso, DateMapping};
use super::traits::{AdapterError, AdapterInput, ItemError, Normalized, SourceAdapter};
use crate::geometry::{Geometry, GeometryError, Position};
use crate::record::{parse_compact_local, Fields, NormalizedRecord, RecordError, UNKNOWN_RECORD_ID};
use chrono::DateTime;
use chrono_tz::Tz;
use roxmltree::{Document, Node};
use serde_json::Value;

/// How an extended-data value is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTransform {
    Text,
    /// `YYYYMMDDHHmmss` local time, stored as ISO-8601
    CompactLocalTime,
}

/// One extended-data attribute to keep.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedField {
    pub name: String,
    pub key: String,
    pub transform: FieldTransform,
}

impl ExtendedField {
    pub fn new(name: &str, key: &str, transform: FieldTransform) -> Self {
        Self {
            name: name.to_string(),
            key: key.to_string(),
            transform,
        }
    }
}

pub struct KmlAdapter {
    id: String,
    source_label: String,
    id_key: String,
    fields: Vec<ExtendedField>,
    dates: DateMapping,
    /// (key, values): placemarks whose `key` is one of `values` are dropped
    exclusions: Vec<(String, Vec<String>)>,
}

impl KmlAdapter {
    pub fn new(id: impl Into<String>, source_label: impl Into<String>, id_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_label: source_label.into(),
            id_key: id_key.into(),
            fields: Vec::new(),
            dates: DateMapping::native(),
            exclusions: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: ExtendedField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_dates(mut self, dates: DateMapping) -> Self {
        self.dates = dates;
        self
    }

    pub fn excluding(mut self, key: &str, values: &[&str]) -> Self {
        self.exclusions
            .push((key.to_string(), values.iter().map(|v| v.to_string()).collect()));
        self
    }

    fn is_excluded(&self, fields: &Fields) -> bool {
        self.exclusions.iter().any(|(key, values)| {
            fields
                .get(key)
                .and_then(Value::as_str)
                .map_or(false, |v| values.iter().any(|x| x == v))
        })
    }

    /// `Ok(None)` for placemarks dropped by an exclusion.
    fn normalize_placemark(
        &self,
        placemark: Node<'_, '_>,
        now: DateTime<Tz>,
    ) -> Result<Option<NormalizedRecord>, ItemError> {
        let raw = extended_data(placemark);
        let tz = now.timezone();

        let record_id = raw
            .iter()
            .find(|(name, _)| self.fields.iter().any(|f| &f.name == name && f.key == self.id_key))
            .map(|(_, value)| value.clone())
            .or_else(|| placemark.attribute("id").map(str::to_string))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RecordError::missing(UNKNOWN_RECORD_ID, self.id_key.as_str()))?;

        let mut fields = Fields::new();
        for field in &self.fields {
            let Some((_, text)) = raw.iter().find(|(name, _)| *name == field.name) else {
                continue;
            };
            let value = match field.transform {
                FieldTransform::Text => Value::String(text.clone()),
                FieldTransform::CompactLocalTime => parse_compact_local(text, tz)
                    .map(|dt| local_iso(dt, tz))
                    .map_err(|message| RecordError::invalid(&record_id, field.key.as_str(), message))?,
            };
            fields.insert(field.key.clone(), value);
        }

        if self.is_excluded(&fields) {
            return Ok(None);
        }

        let geometry = placemark_geometry(placemark).map_err(|e| ItemError::geometry(&record_id, e))?;
        self.dates.apply(&record_id, &mut fields, now)?;
        Ok(Some(
            NormalizedRecord::new(record_id, &self.source_label, geometry).with_fields(fields),
        ))
    }
}

impl SourceAdapter for KmlAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn normalize(&self, input: &AdapterInput<'_>) -> Result<Normalized, AdapterError> {
        let text = input.payload.as_text().ok_or(AdapterError::InvalidInput("KML"))?;
        let doc = Document::parse(text).map_err(|e| AdapterError::Payload(format!("invalid KML: {}", e)))?;

        let mut out = Normalized::new();
        for placemark in doc.descendants().filter(|n| is(n, "Placemark")) {
            match self.normalize_placemark(placemark, input.now) {
                Ok(None) => out.filtered += 1,
                Ok(Some(record)) => out.absorb(input, Ok(vec![record]))?,
                Err(e) => out.absorb(input, Err(e))?,
            }
        }
        tracing::debug!(source = %input.source, filtered = out.filtered, "Placemarks filtered out");
        Ok(out)
    }
}

fn is(node: &Node<'_, '_>, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| is(n, name))
}

fn text_of(node: Node<'_, '_>) -> String {
    node.text().unwrap_or_default().trim().to_string()
}

/// (name, text) pairs from `SimpleData` and `Data/value`, in document order.
fn extended_data(placemark: Node<'_, '_>) -> Vec<(String, String)> {
    let Some(data) = child(placemark, "ExtendedData") else {
        return Vec::new();
    };
    data.descendants()
        .filter_map(|n| {
            let name = n.attribute("name")?;
            if is(&n, "SimpleData") {
                Some((name.to_string(), text_of(n)))
            } else if is(&n, "Data") {
                Some((name.to_string(), child(n, "value").map(text_of).unwrap_or_default()))
            } else {
                None
            }
        })
        .collect()
}

fn placemark_geometry(placemark: Node<'_, '_>) -> Result<Geometry, GeometryError> {
    let geometry = if let Some(multi) = placemark.descendants().find(|n| is(n, "MultiGeometry")) {
        let members = multi
            .children()
            .filter(Node::is_element)
            .map(single_geometry)
            .collect::<Result<Vec<_>, _>>()?;
        combine(members)?
    } else {
        let node = placemark
            .descendants()
            .find(|n| is(n, "Point") || is(n, "LineString") || is(n, "Polygon"))
            .ok_or_else(|| GeometryError::Malformed("placemark without geometry".to_string()))?;
        single_geometry(node)?
    };
    geometry.validate()?;
    Ok(geometry)
}

fn single_geometry(node: Node<'_, '_>) -> Result<Geometry, GeometryError> {
    match node.tag_name().name() {
        "Point" => match coordinates(node)?.as_slice() {
            [p] => Ok(Geometry::Point(*p)),
            other => Err(GeometryError::Malformed(format!(
                "Point with {} positions",
                other.len()
            ))),
        },
        "LineString" => Ok(Geometry::LineString(coordinates(node)?)),
        "Polygon" => {
            let outer = child(node, "outerBoundaryIs")
                .ok_or_else(|| GeometryError::Malformed("Polygon without outer boundary".to_string()))?;
            let mut rings = vec![ring(outer)?];
            for inner in node.children().filter(|n| is(n, "innerBoundaryIs")) {
                rings.push(ring(inner)?);
            }
            Ok(Geometry::Polygon(rings))
        }
        other => Err(GeometryError::Unsupported(other.to_string())),
    }
}

fn ring(boundary: Node<'_, '_>) -> Result<Vec<Position>, GeometryError> {
    child(boundary, "LinearRing")
        .ok_or_else(|| GeometryError::Malformed("boundary without LinearRing".to_string()))
        .and_then(coordinates)
}

/// Merge MultiGeometry members of one kind into the matching Multi* type.
fn combine(members: Vec<Geometry>) -> Result<Geometry, GeometryError> {
    let mut points = Vec::new();
    let mut lines = Vec::new();
    let mut polygons = Vec::new();
    for member in members {
        match member {
            Geometry::Point(p) => points.push(p),
            Geometry::LineString(l) => lines.push(l),
            Geometry::Polygon(p) => polygons.push(p),
            other => return Err(GeometryError::Unsupported(format!("nested {:?}", other.kind()))),
        }
    }
    match (points.is_empty(), lines.is_empty(), polygons.is_empty()) {
        (false, true, true) => Ok(Geometry::MultiPoint(points)),
        (true, false, true) => Ok(Geometry::MultiLineString(lines)),
        (true, true, false) => Ok(Geometry::MultiPolygon(polygons)),
        (true, true, true) => Err(GeometryError::Malformed("empty MultiGeometry".to_string())),
        _ => Err(GeometryError::Unsupported("mixed MultiGeometry".to_string())),
    }
}

/// `lng,lat[,alt]` tuples separated by whitespace.
fn coordinates(node: Node<'_, '_>) -> Result<Vec<Position>, GeometryError> {
    let text = child(node, "coordinates")
        .and_then(|c| c.text())
        .ok_or_else(|| GeometryError::Malformed("missing coordinates".to_string()))?;
    text.split_whitespace()
        .map(|tuple| {
            let ordinates = tuple
                .split(',')
                .map(str::parse::<f64>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| GeometryError::Malformed(format!("{}: {}", tuple, e)))?;
            Position::try_from(ordinates).map_err(GeometryError::Malformed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::RawPayload;
    use crate::record::FIELD_START;
    use chrono::TimeZone;
    use chrono_tz::Europe::Paris;
    use serde_json::json;

    const KML: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Folder>
      <Placemark>
        <ExtendedData><SchemaData schemaUrl="#CI_TRAFI_L">
          <SimpleData name="GID">101</SimpleData>
          <SimpleData name="HEURE">20261015113000</SimpleData>
          <SimpleData name="TYPEVOIE">ROCADE</SimpleData>
          <SimpleData name="ETAT">DENSE</SimpleData>
        </SchemaData></ExtendedData>
        <LineString><coordinates>-0.58,44.84,0 -0.57,44.85,0</coordinates></LineString>
      </Placemark>
      <Placemark>
        <ExtendedData><SchemaData>
          <SimpleData name="GID">102</SimpleData>
          <SimpleData name="HEURE">20261015113000</SimpleData>
          <SimpleData name="ETAT">FLUIDE</SimpleData>
        </SchemaData></ExtendedData>
        <LineString><coordinates>-0.60,44.80,0 -0.61,44.81,0</coordinates></LineString>
      </Placemark>
      <Placemark>
        <ExtendedData><SchemaData>
          <SimpleData name="GID">103</SimpleData>
          <SimpleData name="HEURE">yesterday</SimpleData>
          <SimpleData name="ETAT">BOUCHE</SimpleData>
        </SchemaData></ExtendedData>
        <LineString><coordinates>-0.62,44.80,0 -0.63,44.81,0</coordinates></LineString>
      </Placemark>
    </Folder>
  </Document>
</kml>"##;

    fn bordeaux() -> KmlAdapter {
        KmlAdapter::new("bordeaux", "opendata-bordeaux", "id")
            .with_field(ExtendedField::new("GID", "id", FieldTransform::Text))
            .with_field(ExtendedField::new("HEURE", "datetime", FieldTransform::CompactLocalTime))
            .with_field(ExtendedField::new("TYPEVOIE", "way", FieldTransform::Text))
            .with_field(ExtendedField::new("ETAT", "state", FieldTransform::Text))
            .with_dates(DateMapping::native().with_start(
                crate::adapter::mapping::DateSource::Field("datetime".to_string()),
            ))
            .excluding("state", &["FLUIDE", "INCONNU"])
    }

    fn run(adapter: &KmlAdapter, kml: &str) -> Result<Normalized, AdapterError> {
        let now = Paris.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap();
        let payload = RawPayload::Text(kml.to_string());
        adapter.normalize(&AdapterInput::new("bordeaux", &payload, now))
    }

    #[test]
    fn maps_extended_data_and_drops_free_flowing_roads() {
        let out = run(&bordeaux(), KML).unwrap();

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.filtered, 1);
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].record_id(), "103");

        let record = &out.records[0];
        assert_eq!(record.record_id, "101");
        assert_eq!(record.source, "opendata-bordeaux");
        assert_eq!(record.fields["datetime"], json!("2026-10-15T11:30:00+02:00"));
        assert_eq!(record.fields[FIELD_START], record.fields["datetime"]);
        assert_eq!(record.fields["way"], json!("ROCADE"));
        assert_eq!(
            record.geometry,
            Geometry::LineString(vec![Position::new(-0.58, 44.84), Position::new(-0.57, 44.85)])
        );
    }

    #[test]
    fn multi_geometry_of_points_is_a_multipoint() {
        let kml = r#"<kml><Placemark id="p1">
            <MultiGeometry>
              <Point><coordinates>1,2</coordinates></Point>
              <Point><coordinates>3,4</coordinates></Point>
            </MultiGeometry>
        </Placemark></kml>"#;
        let out = run(&KmlAdapter::new("k", "kml", "id"), kml).unwrap();
        assert_eq!(out.records[0].record_id, "p1");
        assert_eq!(
            out.records[0].geometry,
            Geometry::MultiPoint(vec![Position::new(1.0, 2.0), Position::new(3.0, 4.0)])
        );
    }

    #[test]
    fn polygon_rings_are_read() {
        let kml = r#"<kml><Placemark id="z"><Polygon>
            <outerBoundaryIs><LinearRing><coordinates>0,0 1,0 1,1 0,0</coordinates></LinearRing></outerBoundaryIs>
        </Polygon></Placemark></kml>"#;
        let out = run(&KmlAdapter::new("k", "kml", "id"), kml).unwrap();
        assert!(matches!(out.records[0].geometry, Geometry::Polygon(ref rings) if rings[0].len() == 4));
    }

    #[test]
    fn placemark_without_geometry_is_rejected() {
        let kml = r#"<kml><Placemark id="empty"><name>nothing</name></Placemark></kml>"#;
        let out = run(&KmlAdapter::new("k", "kml", "id"), kml).unwrap();
        assert!(matches!(out.rejected[0], ItemError::Geometry { ref record_id, .. } if record_id == "empty"));
    }

    #[test]
    fn broken_xml_is_a_payload_error() {
        assert!(matches!(
            run(&bordeaux(), "<kml><Placemark>"),
            Err(AdapterError::Payload(_))
        ));
    }
}
