//! WFS GetFeature responses in GML
//!
//! Features sit under `wfs:member` (WFS 2.0) or `gml:featureMember(s)`
//! (WFS 1.x). A feature's simple child elements become attributes; the one
//! holding a GML geometry becomes the record geometry and `geo_shape`.

use super::mapping::DateMapping;
use super::traits::{AdapterError, AdapterInput, ItemError, Normalized, SourceAdapter};
use crate::geometry::{Geometry, GeometryError, Position};
use crate::record::{Fields, NormalizedRecord, RecordError, FIELD_SHAPE, UNKNOWN_RECORD_ID};
use chrono::DateTime;
use chrono_tz::Tz;
use roxmltree::{Document, Node};
use serde_json::Value;

const GML_GEOMETRIES: &[&str] = &[
    "Point",
    "LineString",
    "Polygon",
    "MultiPoint",
    "MultiCurve",
    "MultiLineString",
    "MultiSurface",
    "MultiPolygon",
];

/// Ordinate order of `gml:pos` / `gml:posList`.
///
/// `urn:ogc:def:crs:EPSG::4326`-style CRS names are latitude first;
/// `EPSG:4326` and most GML 2 output are longitude first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOrder {
    LngLat,
    LatLng,
}

impl AxisOrder {
    fn position(self, a: f64, b: f64) -> Position {
        match self {
            Self::LngLat => Position::new(a, b),
            Self::LatLng => Position::new(b, a),
        }
    }
}

pub struct WfsAdapter {
    id: String,
    source_label: String,
    /// Attribute holding the identifier; `gml:id` when unset
    id_key: Option<String>,
    dates: DateMapping,
    axis_order: AxisOrder,
}

impl WfsAdapter {
    pub fn new(id: impl Into<String>, source_label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_label: source_label.into(),
            id_key: None,
            dates: DateMapping::native(),
            axis_order: AxisOrder::LatLng,
        }
    }

    pub fn with_id_key(mut self, id_key: impl Into<String>) -> Self {
        self.id_key = Some(id_key.into());
        self
    }

    pub fn with_dates(mut self, dates: DateMapping) -> Self {
        self.dates = dates;
        self
    }

    pub fn with_axis_order(mut self, axis_order: AxisOrder) -> Self {
        self.axis_order = axis_order;
        self
    }

    fn normalize_feature(&self, feature: Node<'_, '_>, now: DateTime<Tz>) -> Result<NormalizedRecord, ItemError> {
        let mut fields = Fields::new();
        let mut geometry = None;
        for property in feature.children().filter(Node::is_element) {
            match property.descendants().find(is_gml_geometry) {
                Some(node) if geometry.is_none() => geometry = Some(node),
                Some(_) => {}
                None if property.children().any(|n| n.is_element()) => {}
                None => {
                    let text = property.text().unwrap_or_default().trim();
                    let value = if text.is_empty() {
                        Value::Null
                    } else {
                        Value::String(text.to_string())
                    };
                    fields.insert(property.tag_name().name().to_string(), value);
                }
            }
        }

        let record_id = match &self.id_key {
            Some(key) => fields
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| RecordError::missing(UNKNOWN_RECORD_ID, key.as_str()))?,
            None => gml_id(feature).ok_or_else(|| RecordError::missing(UNKNOWN_RECORD_ID, "gml:id"))?,
        };

        let geometry = geometry
            .ok_or_else(|| GeometryError::Malformed("feature without geometry".to_string()))
            .and_then(|node| parse_geometry(node, self.axis_order))
            .map_err(|e| ItemError::geometry(&record_id, e))?;

        fields.insert(FIELD_SHAPE.to_string(), geometry.to_value());
        self.dates.apply(&record_id, &mut fields, now)?;
        Ok(NormalizedRecord::new(record_id, &self.source_label, geometry).with_fields(fields))
    }
}

impl SourceAdapter for WfsAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn normalize(&self, input: &AdapterInput<'_>) -> Result<Normalized, AdapterError> {
        let text = input.payload.as_text().ok_or(AdapterError::InvalidInput("GML"))?;
        let doc = Document::parse(text).map_err(|e| AdapterError::Payload(format!("invalid GML: {}", e)))?;
        let root = doc.root_element();
        if root.tag_name().name() == "ExceptionReport" {
            let message = root
                .descendants()
                .find(|n| is(n, "ExceptionText"))
                .and_then(|n| n.text())
                .unwrap_or("unknown exception");
            return Err(AdapterError::Payload(format!("WFS exception: {}", message.trim())));
        }

        let mut out = Normalized::new();
        let members = root
            .descendants()
            .filter(|n| is(n, "member") || is(n, "featureMember") || is(n, "featureMembers"));
        for member in members {
            for feature in member.children().filter(Node::is_element) {
                out.absorb(input, self.normalize_feature(feature, input.now).map(|r| vec![r]))?;
            }
        }
        Ok(out)
    }
}

fn is(node: &Node<'_, '_>, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

fn is_gml(node: &Node<'_, '_>) -> bool {
    node.is_element()
        && node
            .tag_name()
            .namespace()
            .map_or(false, |ns| ns.starts_with("http://www.opengis.net/gml"))
}

fn is_gml_geometry(node: &Node<'_, '_>) -> bool {
    is_gml(node) && GML_GEOMETRIES.contains(&node.tag_name().name())
}

fn gml_id(feature: Node<'_, '_>) -> Option<String> {
    feature
        .attributes()
        .find(|a| a.name() == "id" || a.name() == "fid")
        .map(|a| a.value().to_string())
}

fn parse_geometry(node: Node<'_, '_>, axis: AxisOrder) -> Result<Geometry, GeometryError> {
    let geometry = match node.tag_name().name() {
        "Point" => match positions(node, axis)?.as_slice() {
            [p] => Geometry::Point(*p),
            other => {
                return Err(GeometryError::Malformed(format!(
                    "Point with {} positions",
                    other.len()
                )))
            }
        },
        "LineString" => Geometry::LineString(positions(node, axis)?),
        "Polygon" => Geometry::Polygon(polygon_rings(node, axis)?),
        "MultiPoint" => Geometry::MultiPoint(
            members(node, &["Point"])?
                .into_iter()
                .map(|p| positions(p, axis).and_then(single))
                .collect::<Result<_, _>>()?,
        ),
        "MultiCurve" | "MultiLineString" => Geometry::MultiLineString(
            members(node, &["LineString"])?
                .into_iter()
                .map(|l| positions(l, axis))
                .collect::<Result<_, _>>()?,
        ),
        "MultiSurface" | "MultiPolygon" => Geometry::MultiPolygon(
            members(node, &["Polygon"])?
                .into_iter()
                .map(|p| polygon_rings(p, axis))
                .collect::<Result<_, _>>()?,
        ),
        other => return Err(GeometryError::Unsupported(other.to_string())),
    };
    geometry.validate()?;
    Ok(geometry)
}

/// GML geometry elements named `names` below a Multi* node.
fn members<'a, 'input>(node: Node<'a, 'input>, names: &[&str]) -> Result<Vec<Node<'a, 'input>>, GeometryError> {
    let found: Vec<_> = node
        .descendants()
        .skip(1)
        .filter(|n| is_gml(n) && names.contains(&n.tag_name().name()))
        .collect();
    if found.is_empty() {
        Err(GeometryError::Malformed(format!("empty {}", node.tag_name().name())))
    } else {
        Ok(found)
    }
}

fn single(positions: Vec<Position>) -> Result<Position, GeometryError> {
    match positions.as_slice() {
        [p] => Ok(*p),
        other => Err(GeometryError::Malformed(format!("Point with {} positions", other.len()))),
    }
}

/// Exterior ring first, then interiors. GML 3 spells the boundaries
/// `exterior`/`interior`, GML 2 `outerBoundaryIs`/`innerBoundaryIs`.
fn polygon_rings(polygon: Node<'_, '_>, axis: AxisOrder) -> Result<Vec<Vec<Position>>, GeometryError> {
    let exterior = polygon
        .children()
        .find(|n| is(n, "exterior") || is(n, "outerBoundaryIs"))
        .ok_or_else(|| GeometryError::Malformed("Polygon without exterior".to_string()))?;
    let mut rings = vec![ring(exterior, axis)?];
    for interior in polygon
        .children()
        .filter(|n| is(n, "interior") || is(n, "innerBoundaryIs"))
    {
        rings.push(ring(interior, axis)?);
    }
    Ok(rings)
}

fn ring(boundary: Node<'_, '_>, axis: AxisOrder) -> Result<Vec<Position>, GeometryError> {
    boundary
        .children()
        .find(|n| is(n, "LinearRing"))
        .ok_or_else(|| GeometryError::Malformed("boundary without LinearRing".to_string()))
        .and_then(|r| positions(r, axis))
}

/// Positions of a Point, LineString or LinearRing, from `posList`, a run
/// of `pos`, or GML 2 `coordinates`.
fn positions(node: Node<'_, '_>, axis: AxisOrder) -> Result<Vec<Position>, GeometryError> {
    let children: Vec<Node<'_, '_>> = node.children().filter(Node::is_element).collect();

    if let Some(list) = children.iter().find(|n| is(n, "posList")) {
        let dimension = list
            .attribute("srsDimension")
            .or_else(|| node.attribute("srsDimension"))
            .and_then(|d| d.parse::<usize>().ok())
            .unwrap_or(2)
            .max(2);
        let numbers = numbers(list.text().unwrap_or_default())?;
        if numbers.len() % dimension != 0 {
            return Err(GeometryError::Malformed(format!(
                "posList of {} numbers is not a multiple of {}",
                numbers.len(),
                dimension
            )));
        }
        return Ok(numbers
            .chunks(dimension)
            .map(|c| axis.position(c[0], c[1]))
            .collect());
    }

    let pos: Vec<_> = children.iter().filter(|n| is(n, "pos")).collect();
    if !pos.is_empty() {
        return pos
            .into_iter()
            .map(|p| match numbers(p.text().unwrap_or_default())?.as_slice() {
                [a, b, ..] => Ok(axis.position(*a, *b)),
                _ => Err(GeometryError::Malformed("pos needs two ordinates".to_string())),
            })
            .collect();
    }

    if let Some(coords) = children.iter().find(|n| is(n, "coordinates")) {
        return coords
            .text()
            .unwrap_or_default()
            .split_whitespace()
            .map(|tuple| match numbers(&tuple.replace(',', " "))?.as_slice() {
                [a, b, ..] => Ok(axis.position(*a, *b)),
                _ => Err(GeometryError::Malformed(format!("bad coordinate tuple {}", tuple))),
            })
            .collect();
    }

    Err(GeometryError::Malformed(format!(
        "{} without coordinates",
        node.tag_name().name()
    )))
}

fn numbers(text: &str) -> Result<Vec<f64>, GeometryError> {
    text.split_whitespace()
        .map(|n| {
            n.parse::<f64>()
                .map_err(|e| GeometryError::Malformed(format!("{}: {}", n, e)))
        })
        .collect()
}
