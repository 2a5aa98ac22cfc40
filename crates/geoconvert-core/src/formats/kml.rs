//! KML and KMZ parser and encoder.
//!
//! KMZ is a zip archive whose payload is a KML document; the parser picks
//! the `doc.kml` entry by convention, else the first `*.kml` found.

use std::collections::HashMap;

use kml::types::Element;
use kml::{Kml, KmlWriter};
use serde_json::Value;

use crate::archive;
use crate::error::{FormatError, GeometryError, Result};
use crate::formats::Warning;
use crate::models::geometry::close_ring;
use crate::models::{Coord, Feature, FeatureCollection, PropertyBag, SourceFormat};

/// Parse a KML document.
pub fn parse(bytes: &[u8], source_name: &str) -> Result<(FeatureCollection, Vec<Warning>)> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| FormatError::malformed("KML", format!("not UTF-8: {e}")))?;
    let kml: Kml = text
        .parse()
        .map_err(|e| FormatError::malformed("KML", format!("failed to parse: {e}")))?;

    let mut features = Vec::new();
    let mut warnings = Vec::new();
    let mut counter = 0usize;
    walk(&kml, source_name, &Vec::new(), &mut features, &mut warnings, &mut counter);

    Ok((
        FeatureCollection::new(source_name, SourceFormat::Kml, features),
        warnings,
    ))
}

/// Parse a KMZ archive by locating and parsing its KML payload.
pub fn parse_kmz(bytes: &[u8], source_name: &str) -> Result<(FeatureCollection, Vec<Warning>)> {
    let entries = archive::extract_all(bytes)?;
    let entry = entries
        .iter()
        .find(|e| e.name.eq_ignore_ascii_case("doc.kml"))
        .or_else(|| entries.iter().find(|e| e.name.to_ascii_lowercase().ends_with(".kml")))
        .ok_or_else(|| FormatError::malformed("KMZ", "no .kml entry in archive"))?;
    let (collection, warnings) = parse(&entry.contents, source_name)?;
    let mut collection = collection;
    collection.source = SourceFormat::Kmz;
    Ok((collection, warnings))
}

/// Recursively extract placemarks, carrying the folder path down.
fn walk(
    node: &Kml,
    source_name: &str,
    folder_path: &[String],
    features: &mut Vec<Feature>,
    warnings: &mut Vec<Warning>,
    counter: &mut usize,
) {
    match node {
        Kml::KmlDocument(doc) => {
            for element in doc.elements.iter() {
                walk(element, source_name, folder_path, features, warnings, counter);
            }
        }
        Kml::Document { elements, .. } => {
            for element in elements {
                walk(element, source_name, folder_path, features, warnings, counter);
            }
        }
        Kml::Folder { attrs, elements } => {
            let mut path = folder_path.to_vec();
            if let Some(name) = folder_name(attrs, elements) {
                path.push(name);
            }
            for element in elements {
                walk(element, source_name, &path, features, warnings, counter);
            }
        }
        Kml::Placemark(placemark) => {
            let idx = *counter;
            *counter += 1;
            match placemark_to_feature(placemark, idx, source_name, folder_path) {
                Ok(feature) => features.push(feature),
                Err(reason) => {
                    warnings.push(Warning::dropped(format!("placemark {idx}"), reason));
                }
            }
        }
        // NetworkLink, GroundOverlay, styles and the rest carry no features
        _ => {}
    }
}

/// A folder's display name is its `<name>` child element.
fn folder_name(attrs: &HashMap<String, String>, elements: &[Kml]) -> Option<String> {
    for element in elements {
        if let Kml::Element(e) = element {
            if e.name == "name" {
                return e.content.clone();
            }
        }
    }
    attrs.get("name").cloned()
}

fn placemark_to_feature(
    placemark: &kml::types::Placemark,
    idx: usize,
    source_name: &str,
    folder_path: &[String],
) -> std::result::Result<Feature, String> {
    let native = placemark.geometry.as_ref().ok_or("placemark has no geometry")?;
    let geometry = decode_geometry(native).map_err(|e| e.to_string())?;

    let mut properties = PropertyBag::new();
    let name = placemark
        .name
        .clone()
        .unwrap_or_else(|| format!("{source_name}_{idx}"));
    properties.insert("name".to_string(), Value::String(name.clone()));
    if let Some(description) = &placemark.description {
        properties.insert("description".to_string(), Value::String(description.clone()));
    }
    if !folder_path.is_empty() {
        properties.insert("folder_path".to_string(), Value::String(folder_path.join("/")));
    }
    for (key, value) in extended_data(&placemark.children) {
        properties.entry(key).or_insert(Value::String(value));
    }

    Ok(Feature::new(geometry).with_name(name).with_properties(properties))
}

/// Collect `<ExtendedData>` pairs: `<Data name=..><value>` and
/// `<SimpleData name=..>` (the latter nested under `<SchemaData>`).
fn extended_data(children: &[Element]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for child in children {
        if child.name == "ExtendedData" {
            collect_data_pairs(&child.children, &mut pairs);
        }
    }
    pairs
}

fn collect_data_pairs(elements: &[Element], pairs: &mut Vec<(String, String)>) {
    for element in elements {
        match element.name.as_str() {
            "Data" => {
                if let Some(key) = element.attrs.get("name") {
                    let value = element
                        .children
                        .iter()
                        .find(|c| c.name == "value")
                        .and_then(|c| c.content.clone())
                        .unwrap_or_default();
                    pairs.push((key.clone(), value));
                }
            }
            "SimpleData" => {
                if let Some(key) = element.attrs.get("name") {
                    pairs.push((key.clone(), element.content.clone().unwrap_or_default()));
                }
            }
            _ => collect_data_pairs(&element.children, pairs),
        }
    }
}

fn decode_coord(c: &kml::types::Coord) -> Coord {
    Coord { lon: c.x, lat: c.y, ele: c.z }
}

fn decode_coords(coords: &[kml::types::Coord]) -> Vec<Coord> {
    coords.iter().map(decode_coord).collect()
}

/// Decode a KML geometry into the canonical model, validating invariants.
fn decode_geometry(
    geometry: &kml::types::Geometry,
) -> std::result::Result<crate::models::Geometry, GeometryError> {
    use crate::models::Geometry as G;
    let decoded = match geometry {
        kml::types::Geometry::Point(point) => G::Point(decode_coord(&point.coord)),
        kml::types::Geometry::LineString(line) => G::LineString(decode_coords(&line.coords)),
        kml::types::Geometry::LinearRing(ring) => G::LineString(decode_coords(&ring.coords)),
        kml::types::Geometry::Polygon(polygon) => {
            let mut rings = Vec::with_capacity(1 + polygon.inner.len());
            let mut outer = decode_coords(&polygon.outer.coords);
            close_ring(&mut outer);
            rings.push(outer);
            for inner in &polygon.inner {
                let mut ring = decode_coords(&inner.coords);
                close_ring(&mut ring);
                rings.push(ring);
            }
            G::Polygon(rings)
        }
        kml::types::Geometry::MultiGeometry(multi) => G::GeometryCollection(
            multi
                .geometries
                .iter()
                .map(decode_geometry)
                .collect::<std::result::Result<_, _>>()?,
        ),
        _ => return Err(GeometryError::malformed("unsupported KML geometry")),
    };
    decoded.validate()?;
    Ok(decoded)
}

fn encode_coord(c: &Coord) -> kml::types::Coord {
    kml::types::Coord { x: c.lon, y: c.lat, z: c.ele }
}

fn encode_coords(coords: &[Coord]) -> Vec<kml::types::Coord> {
    coords.iter().map(encode_coord).collect()
}

fn encode_ring(coords: &[Coord]) -> kml::types::LinearRing {
    kml::types::LinearRing { coords: encode_coords(coords), ..Default::default() }
}

fn encode_geometry(geometry: &crate::models::Geometry) -> kml::types::Geometry {
    use crate::models::Geometry as G;
    match geometry {
        G::Point(c) => kml::types::Geometry::Point(kml::types::Point {
            coord: encode_coord(c),
            ..Default::default()
        }),
        G::LineString(cs) => kml::types::Geometry::LineString(kml::types::LineString {
            coords: encode_coords(cs),
            ..Default::default()
        }),
        G::Polygon(rings) => kml::types::Geometry::Polygon(kml::types::Polygon {
            outer: encode_ring(&rings[0]),
            inner: rings[1..].iter().map(|r| encode_ring(r)).collect(),
            ..Default::default()
        }),
        G::MultiPoint(cs) => multi(cs.iter().map(|c| G::Point(*c)).collect::<Vec<_>>().iter()),
        G::MultiLineString(ls) => {
            multi(ls.iter().map(|l| G::LineString(l.clone())).collect::<Vec<_>>().iter())
        }
        G::MultiPolygon(polys) => {
            multi(polys.iter().map(|p| G::Polygon(p.clone())).collect::<Vec<_>>().iter())
        }
        G::GeometryCollection(members) => multi(members.iter()),
    }
}

fn multi<'a>(members: impl Iterator<Item = &'a crate::models::Geometry>) -> kml::types::Geometry {
    kml::types::Geometry::MultiGeometry(kml::types::MultiGeometry {
        geometries: members.map(encode_geometry).collect(),
        ..Default::default()
    })
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn extended_data_element(properties: &PropertyBag) -> Option<Element> {
    let entries: Vec<Element> = properties
        .iter()
        .filter(|(key, _)| key.as_str() != "name" && key.as_str() != "description")
        .map(|(key, value)| Element {
            name: "Data".to_string(),
            attrs: HashMap::from([("name".to_string(), key.clone())]),
            content: None,
            children: vec![Element {
                name: "value".to_string(),
                attrs: HashMap::new(),
                content: Some(stringify(value)),
                children: Vec::new(),
            }],
        })
        .collect();
    if entries.is_empty() {
        return None;
    }
    Some(Element {
        name: "ExtendedData".to_string(),
        attrs: HashMap::new(),
        content: None,
        children: entries,
    })
}

/// Encode a collection as a KML `<Document>` of `<Placemark>`s.
pub fn encode(collection: &FeatureCollection) -> Result<Vec<u8>> {
    let placemarks: Vec<Kml> = collection
        .features
        .iter()
        .enumerate()
        .map(|(idx, feature)| {
            let name = feature.name.clone().unwrap_or_else(|| format!("Feature_{idx}"));
            let description = feature
                .properties
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string);
            Kml::Placemark(kml::types::Placemark {
                name: Some(name),
                description,
                geometry: Some(encode_geometry(&feature.geometry)),
                children: extended_data_element(&feature.properties).into_iter().collect(),
                ..Default::default()
            })
        })
        .collect();

    let document = Kml::Document { attrs: HashMap::new(), elements: placemarks };
    let root = Kml::KmlDocument(kml::types::KmlDocument {
        version: kml::types::KmlVersion::V22,
        attrs: HashMap::from([(
            "xmlns".to_string(),
            "http://www.opengis.net/kml/2.2".to_string(),
        )]),
        elements: vec![document],
        ..Default::default()
    });

    let mut buf = Vec::new();
    let mut writer = KmlWriter::from_writer(&mut buf);
    writer
        .write(&root)
        .map_err(|e| FormatError::malformed("KML", format!("failed to write: {e}")))?;
    Ok(buf)
}

/// Encode a collection as a KMZ archive holding `doc.kml`.
pub fn encode_kmz(collection: &FeatureCollection) -> Result<Vec<u8>> {
    let kml_bytes = encode(collection)?;
    archive::build(&[("doc.kml".to_string(), kml_bytes)])
}
