//! GeoJSON parser and encoder.

use geojson::GeoJson;
use serde_json::Value;

use crate::codec;
use crate::error::{FormatError, Result};
use crate::formats::Warning;
use crate::models::{Feature, FeatureCollection, PropertyBag, SourceFormat};

/// Parse a GeoJSON document: a FeatureCollection, a single Feature, or a
/// bare Geometry, unwrapped accordingly.
pub fn parse(bytes: &[u8], source_name: &str) -> Result<(FeatureCollection, Vec<Warning>)> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| FormatError::malformed("GeoJSON", format!("not UTF-8: {e}")))?;
    let geojson: GeoJson = text
        .parse()
        .map_err(|e| FormatError::malformed("GeoJSON", format!("failed to parse: {e}")))?;

    let mut features = Vec::new();
    let mut warnings = Vec::new();

    match geojson {
        GeoJson::FeatureCollection(fc) => {
            check_crs(fc.foreign_members.as_ref())?;
            for (idx, feature) in fc.features.iter().enumerate() {
                match convert_feature(feature, idx, source_name) {
                    Ok(converted) => features.push(converted),
                    Err(reason) => {
                        warnings.push(Warning::dropped(format!("feature {idx}"), reason));
                    }
                }
            }
        }
        GeoJson::Feature(feature) => match convert_feature(&feature, 0, source_name) {
            Ok(converted) => features.push(converted),
            Err(reason) => warnings.push(Warning::dropped("feature 0", reason)),
        },
        GeoJson::Geometry(geometry) => match codec::geojson::decode(&geometry) {
            Ok(decoded) => {
                features.push(Feature::new(decoded).with_name(source_name));
            }
            Err(e) => warnings.push(Warning::dropped("geometry", e.to_string())),
        },
    }

    Ok((
        FeatureCollection::new(source_name, SourceFormat::GeoJson, features),
        warnings,
    ))
}

/// Reject documents that declare a CRS other than WGS84 via the legacy
/// `crs` member. Silence means WGS84 per the GeoJSON spec.
fn check_crs(foreign: Option<&PropertyBag>) -> Result<()> {
    let Some(name) = foreign
        .and_then(|fm| fm.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|props| props.get("name"))
        .and_then(Value::as_str)
    else {
        return Ok(());
    };
    let code = name.rsplit(':').next().unwrap_or_default();
    if code == "4326" || name.contains("CRS84") {
        Ok(())
    } else {
        Err(FormatError::CrsNotWgs84 { declared: name.to_string() })
    }
}

fn convert_feature(
    feature: &geojson::Feature,
    idx: usize,
    source_name: &str,
) -> std::result::Result<Feature, String> {
    let geometry = feature.geometry.as_ref().ok_or("missing geometry")?;
    let decoded = codec::geojson::decode(geometry).map_err(|e| e.to_string())?;

    // Property bag copied verbatim; missing `properties` is an empty bag.
    let properties = feature.properties.clone().unwrap_or_default();
    let name = properties
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{source_name}_{idx}"));

    Ok(Feature::new(decoded).with_name(name).with_properties(properties))
}

/// Encode a collection as one GeoJSON FeatureCollection object.
pub fn encode(collection: &FeatureCollection) -> Result<Vec<u8>> {
    let features = collection
        .features
        .iter()
        .map(|feature| {
            let mut properties = feature.properties.clone();
            if let Some(name) = &feature.name {
                properties
                    .entry("name".to_string())
                    .or_insert_with(|| Value::String(name.clone()));
            }
            geojson::Feature {
                bbox: None,
                geometry: Some(codec::geojson::encode(&feature.geometry)),
                id: Some(geojson::feature::Id::String(feature.id.clone())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let fc = geojson::FeatureCollection { bbox: None, features, foreign_members: None };
    Ok(GeoJson::FeatureCollection(fc).to_string().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Geometry;

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [77.5946, 12.9716]},
                "properties": {"name": "Bengaluru", "District_Name": "Bengaluru Urban"}
            },
            {
                "type": "Feature",
                "geometry": null,
                "properties": {"name": "ghost"}
            }
        ]
    }"#;

    #[test]
    fn test_parse_collection_drops_null_geometry() {
        let (fc, warnings) = parse(COLLECTION.as_bytes(), "test").unwrap();
        assert_eq!(fc.len(), 1);
        assert_eq!(fc.features[0].name.as_deref(), Some("Bengaluru"));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].dropped);
    }

    #[test]
    fn test_parse_single_feature() {
        let single = r#"{
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}
        }"#;
        let (fc, warnings) = parse(single.as_bytes(), "solo").unwrap();
        assert_eq!(fc.len(), 1);
        assert!(warnings.is_empty());
        // Missing properties object becomes an empty bag, name falls back
        assert!(fc.features[0].properties.is_empty());
        assert_eq!(fc.features[0].name.as_deref(), Some("solo_0"));
    }

    #[test]
    fn test_parse_bare_geometry() {
        let bare = r#"{"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]}"#;
        let (fc, _) = parse(bare.as_bytes(), "track").unwrap();
        assert_eq!(fc.len(), 1);
        assert_eq!(fc.features[0].name.as_deref(), Some("track"));
    }

    #[test]
    fn test_non_wgs84_crs_rejected() {
        let projected = r#"{
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32643"}},
            "features": []
        }"#;
        assert!(matches!(
            parse(projected.as_bytes(), "utm"),
            Err(FormatError::CrsNotWgs84 { .. })
        ));
    }

    #[test]
    fn test_round_trip() {
        let (fc, _) = parse(COLLECTION.as_bytes(), "test").unwrap();
        let encoded = encode(&fc).unwrap();
        let (back, _) = parse(&encoded, "test").unwrap();
        assert_eq!(back.len(), fc.len());
        assert!(back.features[0]
            .geometry
            .approx_eq(&Geometry::Point(crate::models::Coord::new(77.5946, 12.9716)), 1e-9));
        assert_eq!(
            back.features[0].properties.get("District_Name"),
            fc.features[0].properties.get("District_Name")
        );
    }

    #[test]
    fn test_malformed_json_is_fatal() {
        assert!(matches!(
            parse(b"{not json", "bad"),
            Err(FormatError::MalformedFile { .. })
        ));
    }
}
