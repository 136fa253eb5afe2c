//! Raw payload model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Cursor, Read};
use thiserror::Error;

/// Errors that make a whole feed unusable
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Fetch(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("malformed payload: {0}")]
    Parse(String),
}

impl FeedError {
    /// True when the bytes arrived but could not be decoded.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

/// Wire format of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    /// OpenDataSoft records export (JSON array)
    Json,
    /// GeoJSON FeatureCollection
    GeoJson,
    /// ArcGIS REST `query` response
    ArcGis,
    Kml,
    /// Zipped KML; the archive must contain `doc.kml`
    Kmz,
    /// WFS GetFeature response in GML
    Wfs,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::GeoJson => "geojson",
            Self::ArcGis => "arcgis",
            Self::Kml => "kml",
            Self::Kmz => "kmz",
            Self::Wfs => "wfs",
        }
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded but not yet interpreted feed body.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Json(Value),
    /// XML documents (KML, GML); KMZ archives arrive already unpacked
    Text(String),
}

impl RawPayload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Json(_) => None,
        }
    }
}

/// Decode a response body according to the feed's wire format.
pub fn decode_payload(kind: PayloadKind, body: &[u8]) -> Result<RawPayload, FeedError> {
    match kind {
        PayloadKind::Json | PayloadKind::GeoJson | PayloadKind::ArcGis => serde_json::from_slice(body)
            .map(RawPayload::Json)
            .map_err(|e| FeedError::Parse(format!("invalid JSON: {}", e))),
        PayloadKind::Kml | PayloadKind::Wfs => String::from_utf8(body.to_vec())
            .map(RawPayload::Text)
            .map_err(|e| FeedError::Parse(format!("invalid UTF-8: {}", e))),
        PayloadKind::Kmz => unzip_kml(body).map(RawPayload::Text),
    }
}

fn unzip_kml(body: &[u8]) -> Result<String, FeedError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(body))
        .map_err(|e| FeedError::Parse(format!("invalid KMZ archive: {}", e)))?;
    let mut entry = archive
        .by_name("doc.kml")
        .map_err(|e| FeedError::Parse(format!("KMZ without doc.kml: {}", e)))?;
    let mut kml = String::new();
    entry
        .read_to_string(&mut kml)
        .map_err(|e| FeedError::Parse(format!("unreadable doc.kml: {}", e)))?;
    Ok(kml)
}
