//! Canonical feature model produced by every parser and consumed by every
//! encoder and the merge engine.

use serde_json::Value;

use crate::models::geometry::Geometry;

/// Ordered, case-preserving mapping from attribute key to JSON-like value.
///
/// Holds both the original source keys and any canonical keys the
/// normalizer adds alongside them.
pub type PropertyBag = serde_json::Map<String, Value>;

/// The format a collection was parsed from, or a synthetic tag for merged
/// collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    GeoJson,
    Kml,
    Kmz,
    Shapefile,
    Gpx,
    Csv,
    Merged,
}

/// One geographic entity.
///
/// Every feature has exactly one geometry; parsers drop entities with
/// absent or invalid geometry and report them, never retaining a feature
/// with a null geometry.
#[derive(Debug, Clone)]
pub struct Feature {
    /// Opaque token assigned at parse time, not necessarily source-provided.
    pub id: String,
    pub name: Option<String>,
    pub geometry: Geometry,
    pub properties: PropertyBag,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: fresh_id(),
            name: None,
            geometry,
            properties: PropertyBag::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_properties(mut self, properties: PropertyBag) -> Self {
        self.properties = properties;
        self
    }
}

/// Mint a new opaque feature identifier.
pub fn fresh_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// An ordered sequence of features plus source metadata.
///
/// Created fresh per parse call and treated as immutable afterwards;
/// transformations (normalization, merge) produce new collections.
#[derive(Debug, Clone)]
pub struct FeatureCollection {
    /// Base name of the source, used for output naming.
    pub name: String,
    pub source: SourceFormat,
    pub features: Vec<Feature>,
    /// `[min_lon, min_lat, max_lon, max_lat]` over all member geometries.
    pub bbox: Option<[f64; 4]>,
}

impl FeatureCollection {
    pub fn new(name: impl Into<String>, source: SourceFormat, features: Vec<Feature>) -> Self {
        let bbox = compute_bbox(&features);
        Self { name: name.into(), source, features, bbox }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Union of property keys across all features, in first-appearance
    /// order. This is the effective schema for CSV and shapefile output.
    pub fn property_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for feature in &self.features {
            for key in feature.properties.keys() {
                if !keys.iter().any(|k| k == key) {
                    keys.push(key.clone());
                }
            }
        }
        keys
    }
}

fn compute_bbox(features: &[Feature]) -> Option<[f64; 4]> {
    let mut iter = features.iter().filter_map(|f| f.geometry.bbox());
    let mut bbox = iter.next()?;
    for b in iter {
        bbox[0] = bbox[0].min(b[0]);
        bbox[1] = bbox[1].min(b[1]);
        bbox[2] = bbox[2].max(b[2]);
        bbox[3] = bbox[3].max(b[3]);
    }
    Some(bbox)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::geometry::Coord;

    #[test]
    fn test_fresh_ids_are_distinct() {
        let a = Feature::new(Geometry::Point(Coord::new(0.0, 0.0)));
        let b = Feature::new(Geometry::Point(Coord::new(0.0, 0.0)));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_collection_bbox_spans_features() {
        let features = vec![
            Feature::new(Geometry::Point(Coord::new(-10.0, 5.0))),
            Feature::new(Geometry::Point(Coord::new(20.0, -15.0))),
        ];
        let fc = FeatureCollection::new("test", SourceFormat::GeoJson, features);
        assert_eq!(fc.bbox, Some([-10.0, -15.0, 20.0, 5.0]));
    }

    #[test]
    fn test_property_keys_union_preserves_order() {
        let mut first = PropertyBag::new();
        first.insert("alpha".into(), Value::from(1));
        first.insert("beta".into(), Value::from(2));
        let mut second = PropertyBag::new();
        second.insert("beta".into(), Value::from(3));
        second.insert("gamma".into(), Value::from(4));

        let fc = FeatureCollection::new(
            "test",
            SourceFormat::Csv,
            vec![
                Feature::new(Geometry::Point(Coord::new(0.0, 0.0))).with_properties(first),
                Feature::new(Geometry::Point(Coord::new(1.0, 1.0))).with_properties(second),
            ],
        );
        assert_eq!(fc.property_keys(), vec!["alpha", "beta", "gamma"]);
    }
}
