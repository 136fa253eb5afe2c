//! Built-in provider adapters
//!
//! Each provider is one of the adapter families configured with that
//! provider's attribute names. Source labels end up in `reports.source`.

use super::arcgis::ArcGisAdapter;
use super::geojson::GeoJsonAdapter;
use super::kml::{ExtendedField, FieldTransform, KmlAdapter};
use super::mapping::{DateMapping, DateSource};
use super::records::{PointSource, RecordsAdapter, ShapeSource};
use super::traits::SourceAdapter;
use super::wfs::{AxisOrder, WfsAdapter};
use std::sync::Arc;

pub fn builtin_adapters() -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        // ---- OpenDataSoft records ----
        Arc::new(RecordsAdapter::new("paris", "opendata-paris")),
        Arc::new(
            RecordsAdapter::new("toulouse", "opendata-toulouse")
                .with_shape(ShapeSource::Geometry)
                .with_dates(DateMapping::fields("datedebut", "datefin")),
        ),
        Arc::new(
            RecordsAdapter::new("sicoval", "opendata-sicoval")
                .with_shape(ShapeSource::Field("geoshape2".to_string()))
                .with_dates(DateMapping::fields("startdate", "enddate")),
        ),
        Arc::new(
            RecordsAdapter::new("lille", "opendata-lille")
                .with_point(PointSource::LatLngField("geo_point_2d".to_string()))
                .with_shape(ShapeSource::Geometry)
                .with_dates(
                    DateMapping::native().with_start(DateSource::Field("date_demarrage".to_string())),
                ),
        ),
        Arc::new(
            RecordsAdapter::new("hauts-de-seine", "opendata-hauts-de-seine")
                .with_point(PointSource::LatLngField("geo_point_2d".to_string()))
                .with_dates(DateMapping::current_quarter()),
        ),
        // ---- GeoJSON ----
        Arc::new(
            GeoJsonAdapter::new("lyon", "opendata-lyon", "identifiant")
                .with_dates(DateMapping::fields("debutchantier", "finchantier")),
        ),
        Arc::new(
            GeoJsonAdapter::new("montpellier", "opendata-montpellier", "numero")
                .with_dates(DateMapping::fields("datedebut", "datefin")),
        ),
        Arc::new(
            GeoJsonAdapter::new("rennes", "opendata-rennes", "id")
                .with_dates(DateMapping::native().with_start(DateSource::Field("date_deb".to_string()))),
        ),
        Arc::new(GeoJsonAdapter::new(
            "seine-saint-denis",
            "opendata-seine_saint_denis",
            "id",
        )),
        // ---- ArcGIS ----
        Arc::new(
            ArcGisAdapter::new("loiret", "opendata-loiret")
                .with_dates(DateMapping::epoch_millis("STARTDATE", "ENDDATE")),
        ),
        Arc::new(
            ArcGisAdapter::new("versailles", "opendata-versailles")
                .with_dates(DateMapping::epoch_millis("STARTDATE", "ENDDATE")),
        ),
        Arc::new(
            ArcGisAdapter::new("nancy", "opendata-nancy")
                .with_dates(DateMapping::epoch_millis("DATE_DEBUT", "DATE_FIN")),
        ),
        // ---- KML / WFS ----
        Arc::new(
            KmlAdapter::new("bordeaux", "opendata-bordeaux", "id")
                .with_field(ExtendedField::new("GID", "id", FieldTransform::Text))
                .with_field(ExtendedField::new("HEURE", "datetime", FieldTransform::CompactLocalTime))
                .with_field(ExtendedField::new("TYPEVOIE", "way", FieldTransform::Text))
                .with_field(ExtendedField::new("ETAT", "state", FieldTransform::Text))
                .with_dates(DateMapping::native().with_start(DateSource::Field("datetime".to_string())))
                .excluding("state", &["FLUIDE", "INCONNU"]),
        ),
        Arc::new(
            WfsAdapter::new("lyon-wfs", "opendata-lyon")
                .with_id_key("identifiant")
                .with_dates(DateMapping::fields("debutchantier", "finchantier"))
                .with_axis_order(AxisOrder::LatLng),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn ids_are_unique() {
        let adapters = builtin_adapters();
        let ids: BTreeSet<&str> = adapters.iter().map(|a| a.id()).collect();
        assert_eq!(ids.len(), adapters.len());
    }
}
