//! Format detection and dispatch.
//!
//! The supported format set is fixed and finite, so dispatch is a closed
//! enum plus `match` arms rather than open-ended dynamic dispatch. This
//! module exposes the two entry points external collaborators use:
//! [`ingest`] (bytes in, canonical features out) and [`export`] (canonical
//! features in, encoded bytes out).

pub mod csv;
pub mod geojson;
pub mod gpx;
pub mod kml;
pub mod shp;

use std::path::Path;

use serde::Serialize;

use crate::archive;
use crate::error::{FormatError, Result};
use crate::models::{FeatureCollection, SourceFormat};
use crate::normalize;

/// The closed set of supported formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    GeoJson,
    Kml,
    Kmz,
    Shapefile,
    Gpx,
    Csv,
}

impl Format {
    pub const ALL: [Format; 6] = [
        Format::GeoJson,
        Format::Kml,
        Format::Kmz,
        Format::Shapefile,
        Format::Gpx,
        Format::Csv,
    ];

    /// Human-readable format name.
    pub fn name(&self) -> &'static str {
        match self {
            Format::GeoJson => "GeoJSON",
            Format::Kml => "KML",
            Format::Kmz => "KMZ",
            Format::Shapefile => "Shapefile",
            Format::Gpx => "GPX",
            Format::Csv => "CSV",
        }
    }

    /// File extension used for encoder output. Shapefile output is always
    /// a zip of its four components.
    pub fn extension(&self) -> &'static str {
        match self {
            Format::GeoJson => "geojson",
            Format::Kml => "kml",
            Format::Kmz => "kmz",
            Format::Shapefile => "zip",
            Format::Gpx => "gpx",
            Format::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Format::GeoJson => "application/geo+json",
            Format::Kml => "application/vnd.google-earth.kml+xml",
            Format::Kmz | Format::Shapefile => "application/zip",
            Format::Gpx => "application/gpx+xml",
            Format::Csv => "text/csv",
        }
    }

    pub fn as_source(&self) -> SourceFormat {
        match self {
            Format::GeoJson => SourceFormat::GeoJson,
            Format::Kml => SourceFormat::Kml,
            Format::Kmz => SourceFormat::Kmz,
            Format::Shapefile => SourceFormat::Shapefile,
            Format::Gpx => SourceFormat::Gpx,
            Format::Csv => SourceFormat::Csv,
        }
    }

    /// Resolve a target-format token (`geojson`, `shp`, `.kmz`, ...).
    pub fn from_target(token: &str) -> Result<Format> {
        match token.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "geojson" | "json" => Ok(Format::GeoJson),
            "kml" => Ok(Format::Kml),
            "kmz" => Ok(Format::Kmz),
            "shapefile" | "shp" | "zip" => Ok(Format::Shapefile),
            "gpx" => Ok(Format::Gpx),
            "csv" => Ok(Format::Csv),
            other => Err(FormatError::unsupported(format!("unknown target format '{other}'"))),
        }
    }
}

/// A recoverable problem with one feature, row or component of a file.
/// Serializable so callers can pass parse reports across their own
/// boundaries unchanged.
#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    /// What the warning is about (feature index, row number, component).
    pub context: String,
    pub message: String,
    /// True when a feature was dropped because of this warning.
    pub dropped: bool,
}

impl Warning {
    pub fn dropped(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self { context: context.into(), message: message.into(), dropped: true }
    }

    pub fn advisory(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self { context: context.into(), message: message.into(), dropped: false }
    }
}

/// Result of one ingestion call: the normalized collection plus the
/// "K of N features parsed" report.
#[derive(Debug)]
pub struct IngestOutcome {
    pub collection: FeatureCollection,
    pub warnings: Vec<Warning>,
    /// Features retained.
    pub parsed: usize,
    /// Features seen in the source, including dropped ones.
    pub total: usize,
}

/// Result of one export call.
#[derive(Debug)]
pub struct ExportOutput {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: &'static str,
    /// Features encoded.
    pub encoded: usize,
    /// Lossy-encoding notices (e.g. polygons flattened to GPX tracks).
    pub warnings: Vec<Warning>,
}

fn stem_of(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("upload")
        .to_string()
}

fn sniff_geojson(bytes: &[u8]) -> Result<Format> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| FormatError::malformed("JSON", e.to_string()))?;
    let kind = value.get("type").and_then(|t| t.as_str()).unwrap_or_default();
    const GEOJSON_TYPES: [&str; 9] = [
        "Feature",
        "FeatureCollection",
        "Point",
        "LineString",
        "Polygon",
        "MultiPoint",
        "MultiLineString",
        "MultiPolygon",
        "GeometryCollection",
    ];
    if GEOJSON_TYPES.contains(&kind) {
        Ok(Format::GeoJson)
    } else {
        Err(FormatError::unsupported("JSON document has no GeoJSON type member"))
    }
}

fn sniff_zip(bytes: &[u8]) -> Result<Format> {
    let names = archive::entry_names(bytes)?;
    if names.iter().any(|n| n.to_ascii_lowercase().ends_with(".shp")) {
        Ok(Format::Shapefile)
    } else if names.iter().any(|n| n.to_ascii_lowercase().ends_with(".kml")) {
        Ok(Format::Kmz)
    } else {
        Err(FormatError::unsupported("zip archive holds neither shapefile components nor a KML document"))
    }
}

fn sniff_content(bytes: &[u8]) -> Result<Format> {
    if archive::looks_like_zip(bytes) {
        return sniff_zip(bytes);
    }
    let head: &[u8] = &bytes[..bytes.len().min(4096)];
    let text = String::from_utf8_lossy(head);
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') {
        return sniff_geojson(bytes);
    }
    if trimmed.starts_with('<') {
        if text.contains("<kml") {
            return Ok(Format::Kml);
        }
        if text.contains("<gpx") {
            return Ok(Format::Gpx);
        }
    }
    Err(FormatError::unsupported("content signature not recognized"))
}

/// Select the format of raw input from its filename extension, falling back
/// to content sniffing when the extension is absent or ambiguous.
pub fn detect(bytes: &[u8], declared_name: Option<&str>) -> Result<Format> {
    let extension = declared_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("geojson") => Ok(Format::GeoJson),
        Some("json") => sniff_geojson(bytes),
        Some("kml") => Ok(Format::Kml),
        Some("kmz") => Ok(Format::Kmz),
        Some("shp") => Ok(Format::Shapefile),
        Some("zip") => sniff_zip(bytes),
        Some("gpx") => Ok(Format::Gpx),
        Some("csv") => Ok(Format::Csv),
        Some(other) => Err(FormatError::unsupported(format!("unknown extension '.{other}'"))),
        None => sniff_content(bytes),
    }
}

/// Parse raw bytes with the parser for `format`.
pub fn parse_with(
    format: Format,
    bytes: &[u8],
    source_name: &str,
) -> Result<(FeatureCollection, Vec<Warning>)> {
    let (collection, warnings) = match format {
        Format::GeoJson => geojson::parse(bytes, source_name)?,
        Format::Kml => kml::parse(bytes, source_name)?,
        Format::Kmz => kml::parse_kmz(bytes, source_name)?,
        Format::Shapefile => shp::parse(bytes, source_name)?,
        Format::Gpx => gpx::parse(bytes, source_name)?,
        Format::Csv => csv::parse(bytes, source_name)?,
    };
    if collection.is_empty() {
        return Err(FormatError::EmptyFeatureCollection { source_name: source_name.to_string() });
    }
    Ok((collection, warnings))
}

/// Ingestion entry point: raw bytes + declared filename (if any) to a
/// normalized canonical collection.
pub fn ingest(bytes: &[u8], declared_name: Option<&str>) -> Result<IngestOutcome> {
    let format = detect(bytes, declared_name)?;
    let stem = declared_name.map(stem_of).unwrap_or_else(|| "upload".to_string());
    tracing::debug!(format = format.name(), source = %stem, "ingesting");

    let (parsed_collection, warnings) = parse_with(format, bytes, &stem)?;

    // Normalization happens once per ingest, after parsing; originals are
    // retained and canonical keys added alongside.
    let features = parsed_collection
        .features
        .into_iter()
        .map(|mut f| {
            f.properties = normalize::normalize(&f.properties);
            f
        })
        .collect();
    let collection = FeatureCollection::new(parsed_collection.name, parsed_collection.source, features);

    let parsed = collection.len();
    let total = parsed + warnings.iter().filter(|w| w.dropped).count();
    tracing::debug!(parsed, total, "ingest complete");
    Ok(IngestOutcome { collection, warnings, parsed, total })
}

/// Export entry point: canonical collection to encoded bytes plus the
/// suggested filename and content type.
pub fn export(collection: &FeatureCollection, format: Format) -> Result<ExportOutput> {
    if collection.is_empty() {
        return Err(FormatError::EmptyFeatureCollection { source_name: collection.name.clone() });
    }
    let (bytes, warnings) = match format {
        Format::GeoJson => (geojson::encode(collection)?, Vec::new()),
        Format::Kml => (kml::encode(collection)?, Vec::new()),
        Format::Kmz => (kml::encode_kmz(collection)?, Vec::new()),
        Format::Shapefile => (shp::encode(collection)?, Vec::new()),
        Format::Gpx => gpx::encode(collection)?,
        Format::Csv => (csv::encode(collection)?, Vec::new()),
    };
    Ok(ExportOutput {
        bytes,
        filename: format!("{}.{}", collection.name, format.extension()),
        content_type: format.content_type(),
        encoded: collection.len(),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(detect(b"", Some("parcels.geojson")).unwrap(), Format::GeoJson);
        assert_eq!(detect(b"", Some("route.gpx")).unwrap(), Format::Gpx);
        assert_eq!(detect(b"", Some("places.KML")).unwrap(), Format::Kml);
        assert_eq!(detect(b"", Some("table.csv")).unwrap(), Format::Csv);
    }

    #[test]
    fn test_json_extension_requires_geojson_type() {
        let geojson = br#"{"type": "FeatureCollection", "features": []}"#;
        assert_eq!(detect(geojson, Some("data.json")).unwrap(), Format::GeoJson);

        let plain = br#"{"rows": [1, 2, 3]}"#;
        assert!(matches!(
            detect(plain, Some("data.json")),
            Err(FormatError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_zip_sniffing() {
        let shapefile_zip = crate::archive::build(&[
            ("parcels.shp".to_string(), vec![0u8; 4]),
            ("parcels.dbf".to_string(), vec![0u8; 4]),
        ])
        .unwrap();
        assert_eq!(detect(&shapefile_zip, Some("parcels.zip")).unwrap(), Format::Shapefile);

        let kmz = crate::archive::build(&[("doc.kml".to_string(), b"<kml/>".to_vec())]).unwrap();
        assert_eq!(detect(&kmz, Some("places.zip")).unwrap(), Format::Kmz);
    }

    #[test]
    fn test_extensionless_content_sniffing() {
        let geojson = br#"{"type": "Point", "coordinates": [1.0, 2.0]}"#;
        assert_eq!(detect(geojson, None).unwrap(), Format::GeoJson);

        let kml = br#"<?xml version="1.0"?><kml xmlns="http://www.opengis.net/kml/2.2"></kml>"#;
        assert_eq!(detect(kml, None).unwrap(), Format::Kml);

        assert!(detect(b"no signature here", None).is_err());
    }

    #[test]
    fn test_target_tokens() {
        assert_eq!(Format::from_target("geojson").unwrap(), Format::GeoJson);
        assert_eq!(Format::from_target(".shp").unwrap(), Format::Shapefile);
        assert_eq!(Format::from_target("KMZ").unwrap(), Format::Kmz);
        assert!(Format::from_target("dwg").is_err());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(Format::GeoJson.content_type(), "application/geo+json");
        assert_eq!(Format::Shapefile.content_type(), "application/zip");
        assert_eq!(Format::Kml.content_type(), "application/vnd.google-earth.kml+xml");
        assert_eq!(Format::Gpx.content_type(), "application/gpx+xml");
        assert_eq!(Format::Csv.content_type(), "text/csv");
    }
}
