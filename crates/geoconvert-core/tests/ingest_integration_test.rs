//! Ingestion integration tests: detection, component validation, warning
//! reporting and key normalization through the public entry point.

use geoconvert_core::{archive, ingest, Coord, FormatError, Geometry};
use serde_json::Value;

#[test]
fn test_csv_wkt_point_with_name() {
    let csv = "wkt,name\n\"POINT(77.5946 12.9716)\",Bengaluru\n";
    let outcome = ingest(csv.as_bytes(), Some("cities.csv")).unwrap();

    assert_eq!(outcome.parsed, 1);
    assert_eq!(outcome.total, 1);
    let feature = &outcome.collection.features[0];
    assert!(feature
        .geometry
        .approx_eq(&Geometry::Point(Coord::new(77.5946, 12.9716)), 1e-9));
    assert_eq!(feature.properties.get("name"), Some(&Value::String("Bengaluru".into())));
    // No hierarchical synonyms present, so no canonical keys either
    for canonical in ["state", "district", "taluk", "village", "survey_number"] {
        assert!(feature.properties.get(canonical).is_none());
    }
}

#[test]
fn test_normalization_adds_canonical_keys_alongside_originals() {
    let geojson = r#"{
        "type": "Feature",
        "geometry": {"type": "Point", "coordinates": [77.0, 13.0]},
        "properties": {"District_Name": "Tumakuru", "Block_Name": "Gubbi"}
    }"#;
    let outcome = ingest(geojson.as_bytes(), Some("plots.geojson")).unwrap();
    let bag = &outcome.collection.features[0].properties;

    assert_eq!(bag.get("district"), Some(&Value::String("Tumakuru".into())));
    assert_eq!(bag.get("taluk"), Some(&Value::String("Gubbi".into())));
    // Originals retained unchanged
    assert_eq!(bag.get("District_Name"), Some(&Value::String("Tumakuru".into())));
    assert_eq!(bag.get("Block_Name"), Some(&Value::String("Gubbi".into())));
}

#[test]
fn test_shapefile_zip_missing_shx() {
    let zip = archive::build(&[
        ("parcels.shp".to_string(), vec![0u8; 16]),
        ("parcels.dbf".to_string(), vec![0u8; 16]),
    ])
    .unwrap();
    let result = ingest(&zip, Some("parcels.zip"));
    assert!(matches!(
        result,
        Err(FormatError::MissingComponent { ref component }) if component == ".shx"
    ));
}

#[test]
fn test_partial_parse_reports_counts() {
    let geojson = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}, "properties": {}},
            {"type": "Feature", "geometry": null, "properties": {}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [3.0, 4.0]}, "properties": {}}
        ]
    }"#;
    let outcome = ingest(geojson.as_bytes(), Some("mixed.geojson")).unwrap();
    assert_eq!(outcome.parsed, 2);
    assert_eq!(outcome.total, 3);
    assert_eq!(outcome.warnings.len(), 1);
}

#[test]
fn test_zero_usable_features_is_typed_error() {
    let geojson = r#"{"type": "FeatureCollection", "features": []}"#;
    assert!(matches!(
        ingest(geojson.as_bytes(), Some("empty.geojson")),
        Err(FormatError::EmptyFeatureCollection { .. })
    ));
}

#[test]
fn test_unresolvable_input() {
    assert!(matches!(
        ingest(b"...", Some("mystery.xyz")),
        Err(FormatError::UnsupportedFormat { .. })
    ));
    assert!(matches!(
        ingest(b"plain text, nothing to see", None),
        Err(FormatError::UnsupportedFormat { .. })
    ));
}

#[test]
fn test_kmz_detected_from_bare_zip() {
    let kml = r#"<?xml version="1.0"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Placemark><name>pt</name><Point><coordinates>77.1,12.4</coordinates></Point></Placemark>
  </Document>
</kml>"#;
    let zip = archive::build(&[("doc.kml".to_string(), kml.as_bytes().to_vec())]).unwrap();
    let outcome = ingest(&zip, Some("download.zip")).unwrap();
    assert_eq!(outcome.parsed, 1);
}

#[test]
fn test_out_of_bounds_coordinates_dropped() {
    // UTM-style coordinates must not be mislabeled as WGS84
    let geojson = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [712345.0, 1450000.0]}, "properties": {}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [77.0, 12.0]}, "properties": {}}
        ]
    }"#;
    let outcome = ingest(geojson.as_bytes(), Some("utm.geojson")).unwrap();
    assert_eq!(outcome.parsed, 1);
    assert_eq!(outcome.total, 2);
    assert!(outcome.warnings[0].dropped);
}
