//! CSV parser and encoder.
//!
//! Geometry comes from a `wkt`/`geometry` column when one exists, else
//! from a latitude/longitude column pair found by synonym lookup. All
//! other cells become string properties, with no implicit type coercion.

use serde_json::Value;

use crate::codec;
use crate::error::{FormatError, Result};
use crate::formats::Warning;
use crate::models::{Coord, Feature, FeatureCollection, Geometry, PropertyBag, SourceFormat};

const WKT_COLUMNS: [&str; 3] = ["wkt", "geometry", "geom"];
const LAT_COLUMNS: [&str; 4] = ["lat", "latitude", "y", "ycoord"];
const LON_COLUMNS: [&str; 5] = ["lon", "lng", "longitude", "x", "xcoord"];

/// How geometry is carried in a CSV file.
enum GeometrySource {
    Wkt(usize),
    LatLon { lat: usize, lon: usize },
}

impl GeometrySource {
    fn detect(headers: &csv::StringRecord) -> Result<GeometrySource> {
        let position = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.contains(&h.trim().to_ascii_lowercase().as_str()))
        };
        if let Some(idx) = position(&WKT_COLUMNS) {
            return Ok(GeometrySource::Wkt(idx));
        }
        match (position(&LAT_COLUMNS), position(&LON_COLUMNS)) {
            (Some(lat), Some(lon)) => Ok(GeometrySource::LatLon { lat, lon }),
            _ => Err(FormatError::malformed(
                "CSV",
                "no geometry column: expected a wkt/geometry column or a lat/lon pair",
            )),
        }
    }

    fn columns(&self) -> Vec<usize> {
        match self {
            GeometrySource::Wkt(idx) => vec![*idx],
            GeometrySource::LatLon { lat, lon } => vec![*lat, *lon],
        }
    }

    fn geometry(&self, row: &csv::StringRecord) -> std::result::Result<Geometry, String> {
        match self {
            GeometrySource::Wkt(idx) => {
                let cell = row.get(*idx).unwrap_or_default().trim();
                if cell.is_empty() {
                    return Err("empty geometry cell".to_string());
                }
                codec::wkt::decode(cell).map_err(|e| e.to_string())
            }
            GeometrySource::LatLon { lat, lon } => {
                let parse = |idx: usize, what: &str| {
                    row.get(idx)
                        .unwrap_or_default()
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| format!("unparsable {what} value"))
                };
                let geometry =
                    Geometry::Point(Coord::new(parse(*lon, "longitude")?, parse(*lat, "latitude")?));
                geometry.validate().map_err(|e| e.to_string())?;
                Ok(geometry)
            }
        }
    }
}

/// Parse a CSV file. The header row is required.
pub fn parse(bytes: &[u8], source_name: &str) -> Result<(FeatureCollection, Vec<Warning>)> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| FormatError::malformed("CSV", format!("cannot read header row: {e}")))?
        .clone();
    let source = GeometrySource::detect(&headers)?;
    let geometry_columns = source.columns();

    let mut features = Vec::new();
    let mut warnings = Vec::new();

    for (idx, row) in reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warnings.push(Warning::dropped(format!("row {}", idx + 1), e.to_string()));
                continue;
            }
        };
        let geometry = match source.geometry(&row) {
            Ok(geometry) => geometry,
            Err(reason) => {
                warnings.push(Warning::dropped(format!("row {}", idx + 1), reason));
                continue;
            }
        };

        let mut properties = PropertyBag::new();
        for (col, header) in headers.iter().enumerate() {
            if geometry_columns.contains(&col) {
                continue;
            }
            let cell = row.get(col).unwrap_or_default();
            properties.insert(header.to_string(), Value::String(cell.to_string()));
        }
        let name = properties
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{source_name}_{idx}"));

        features.push(Feature::new(geometry).with_name(name).with_properties(properties));
    }

    Ok((
        FeatureCollection::new(source_name, SourceFormat::Csv, features),
        warnings,
    ))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Encode a collection as CSV: a `wkt` column plus one column per property
/// key observed across the whole collection, missing values left empty.
pub fn encode(collection: &FeatureCollection) -> Result<Vec<u8>> {
    let keys: Vec<String> = collection
        .property_keys()
        .into_iter()
        .filter(|k| !WKT_COLUMNS.contains(&k.to_ascii_lowercase().as_str()))
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec!["wkt".to_string()];
    header.extend(keys.iter().cloned());
    writer
        .write_record(&header)
        .map_err(|e| FormatError::malformed("CSV", e.to_string()))?;

    for feature in &collection.features {
        let mut row = vec![codec::wkt::encode(&feature.geometry)];
        for key in &keys {
            row.push(feature.properties.get(key).map(stringify).unwrap_or_default());
        }
        writer
            .write_record(&row)
            .map_err(|e| FormatError::malformed("CSV", e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| FormatError::malformed("CSV", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wkt_column() {
        let csv = "wkt,name\n\"POINT(77.5946 12.9716)\",Bengaluru\n";
        let (fc, warnings) = parse(csv.as_bytes(), "cities").unwrap();
        assert!(warnings.is_empty());
        assert_eq!(fc.len(), 1);
        assert!(fc.features[0]
            .geometry
            .approx_eq(&Geometry::Point(Coord::new(77.5946, 12.9716)), 1e-9));
        assert_eq!(
            fc.features[0].properties.get("name"),
            Some(&Value::String("Bengaluru".into()))
        );
    }

    #[test]
    fn test_lat_lon_synonyms() {
        let csv = "Latitude,LNG,label\n12.9716,77.5946,center\n";
        let (fc, _) = parse(csv.as_bytes(), "pts").unwrap();
        assert_eq!(fc.len(), 1);
        assert!(fc.features[0]
            .geometry
            .approx_eq(&Geometry::Point(Coord::new(77.5946, 12.9716)), 1e-9));
        // Geometry columns are consumed, other cells become string properties
        assert_eq!(fc.features[0].properties.get("label"), Some(&Value::String("center".into())));
        assert!(fc.features[0].properties.get("Latitude").is_none());
    }

    #[test]
    fn test_bad_rows_dropped_not_fatal() {
        let csv = "lat,lon\n12.9,77.5\nnot-a-number,77.6\n,\n13.0,77.7\n";
        let (fc, warnings) = parse(csv.as_bytes(), "pts").unwrap();
        assert_eq!(fc.len(), 2);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.dropped));
    }

    #[test]
    fn test_no_geometry_column_is_fatal() {
        let csv = "a,b\n1,2\n";
        assert!(matches!(
            parse(csv.as_bytes(), "bad"),
            Err(FormatError::MalformedFile { .. })
        ));
    }

    #[test]
    fn test_values_stay_strings() {
        let csv = "wkt,count\n\"POINT(1 2)\",42\n";
        let (fc, _) = parse(csv.as_bytes(), "t").unwrap();
        assert_eq!(fc.features[0].properties.get("count"), Some(&Value::String("42".into())));
    }

    #[test]
    fn test_encode_key_union_with_empty_cells() {
        use crate::models::Feature;
        let mut first = PropertyBag::new();
        first.insert("name".into(), Value::String("a".into()));
        let mut second = PropertyBag::new();
        second.insert("district".into(), Value::String("d".into()));

        let fc = FeatureCollection::new(
            "out",
            SourceFormat::GeoJson,
            vec![
                Feature::new(Geometry::Point(Coord::new(1.0, 2.0))).with_properties(first),
                Feature::new(Geometry::Point(Coord::new(3.0, 4.0))).with_properties(second),
            ],
        );
        let bytes = encode(&fc).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("wkt,name,district"));
        let first_row = lines.next().unwrap();
        assert!(first_row.starts_with("POINT"));
        assert!(first_row.ends_with("a,"));
    }

    #[test]
    fn test_round_trip() {
        let csv = "wkt,name,District_Name\n\"LINESTRING(0 0,1 1)\",road,Tumakuru\n";
        let (fc, _) = parse(csv.as_bytes(), "t").unwrap();
        let encoded = encode(&fc).unwrap();
        let (back, _) = parse(&encoded, "t").unwrap();
        assert_eq!(back.len(), 1);
        assert!(back.features[0].geometry.approx_eq(&fc.features[0].geometry, 1e-9));
        assert_eq!(
            back.features[0].properties.get("District_Name"),
            Some(&Value::String("Tumakuru".into()))
        );
    }
}
