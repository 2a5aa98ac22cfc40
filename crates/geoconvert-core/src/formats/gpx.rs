//! GPX parser and encoder.
//!
//! Waypoints map to Point features and tracks/routes to LineStrings.
//! The reverse direction is total but lossy for polygons: their boundary
//! rings are emitted as closed track segments, which is reported per
//! feature.

use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use serde_json::Value;

use crate::error::{FormatError, Result};
use crate::formats::Warning;
use crate::models::{Coord, Feature, FeatureCollection, Geometry, PropertyBag, SourceFormat};

/// Parse a GPX document.
pub fn parse(bytes: &[u8], source_name: &str) -> Result<(FeatureCollection, Vec<Warning>)> {
    let gpx: Gpx = gpx::read(bytes)
        .map_err(|e| FormatError::malformed("GPX", format!("failed to parse: {e}")))?;

    let mut features = Vec::new();
    let mut warnings = Vec::new();

    for (idx, waypoint) in gpx.waypoints.iter().enumerate() {
        let coord = waypoint_coord(waypoint);
        let geometry = Geometry::Point(coord);
        if let Err(e) = geometry.validate() {
            warnings.push(Warning::dropped(format!("waypoint {idx}"), e.to_string()));
            continue;
        }
        let name = waypoint
            .name
            .clone()
            .unwrap_or_else(|| format!("{source_name}_waypoint_{idx}"));
        let mut properties = PropertyBag::new();
        properties.insert("name".to_string(), Value::String(name.clone()));
        if let Some(description) = &waypoint.description {
            properties.insert("description".to_string(), Value::String(description.clone()));
        }
        if let Some(elevation) = waypoint.elevation {
            properties.insert("elevation".to_string(), Value::from(elevation));
        }
        if let Some(time) = waypoint.time {
            if let Ok(formatted) = time.format() {
                properties.insert("time".to_string(), Value::String(formatted));
            }
        }
        features.push(Feature::new(geometry).with_name(name).with_properties(properties));
    }

    for (idx, track) in gpx.tracks.iter().enumerate() {
        // All segment points concatenated in file order
        let coords: Vec<Coord> = track
            .segments
            .iter()
            .flat_map(|segment| segment.points.iter().map(waypoint_coord))
            .collect();
        let geometry = Geometry::LineString(coords);
        if let Err(e) = geometry.validate() {
            warnings.push(Warning::dropped(format!("track {idx}"), e.to_string()));
            continue;
        }
        let name = track.name.clone().unwrap_or_else(|| format!("{source_name}_track_{idx}"));
        let mut properties = PropertyBag::new();
        properties.insert("name".to_string(), Value::String(name.clone()));
        if let Some(track_name) = &track.name {
            properties.insert("track_name".to_string(), Value::String(track_name.clone()));
        }
        if let Some(description) = &track.description {
            properties.insert("description".to_string(), Value::String(description.clone()));
        }
        features.push(Feature::new(geometry).with_name(name).with_properties(properties));
    }

    for (idx, route) in gpx.routes.iter().enumerate() {
        let coords: Vec<Coord> = route.points.iter().map(waypoint_coord).collect();
        let geometry = Geometry::LineString(coords);
        if let Err(e) = geometry.validate() {
            warnings.push(Warning::dropped(format!("route {idx}"), e.to_string()));
            continue;
        }
        let name = route.name.clone().unwrap_or_else(|| format!("{source_name}_route_{idx}"));
        let mut properties = PropertyBag::new();
        properties.insert("name".to_string(), Value::String(name.clone()));
        if let Some(route_name) = &route.name {
            properties.insert("route_name".to_string(), Value::String(route_name.clone()));
        }
        if let Some(description) = &route.description {
            properties.insert("description".to_string(), Value::String(description.clone()));
        }
        features.push(Feature::new(geometry).with_name(name).with_properties(properties));
    }

    Ok((
        FeatureCollection::new(source_name, SourceFormat::Gpx, features),
        warnings,
    ))
}

fn waypoint_coord(waypoint: &Waypoint) -> Coord {
    let point = waypoint.point();
    Coord { lon: point.x(), lat: point.y(), ele: waypoint.elevation }
}

fn coord_waypoint(coord: &Coord) -> Waypoint {
    let mut waypoint = Waypoint::new(geo_types::Point::new(coord.lon, coord.lat));
    waypoint.elevation = coord.ele;
    waypoint
}

/// Encode a collection as GPX: waypoints for points, tracks for
/// everything line- or polygon-shaped.
pub fn encode(collection: &FeatureCollection) -> Result<(Vec<u8>, Vec<Warning>)> {
    let mut gpx = Gpx { version: GpxVersion::Gpx11, ..Default::default() };
    gpx.creator = Some("geoconvert".to_string());
    let mut warnings = Vec::new();

    for (idx, feature) in collection.features.iter().enumerate() {
        let name = feature.name.clone().unwrap_or_else(|| format!("Feature_{idx}"));
        let description = feature
            .properties
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        encode_geometry(&mut gpx, &feature.geometry, &name, &description, idx, &mut warnings);
    }

    let mut buf = Vec::new();
    gpx::write(&gpx, &mut buf)
        .map_err(|e| FormatError::malformed("GPX", format!("failed to write: {e}")))?;
    Ok((buf, warnings))
}

fn encode_geometry(
    gpx: &mut Gpx,
    geometry: &Geometry,
    name: &str,
    description: &Option<String>,
    idx: usize,
    warnings: &mut Vec<Warning>,
) {
    match geometry {
        Geometry::Point(c) => {
            let mut waypoint = coord_waypoint(c);
            waypoint.name = Some(name.to_string());
            waypoint.description = description.clone();
            gpx.waypoints.push(waypoint);
        }
        Geometry::MultiPoint(cs) => {
            for c in cs {
                let mut waypoint = coord_waypoint(c);
                waypoint.name = Some(name.to_string());
                waypoint.description = description.clone();
                gpx.waypoints.push(waypoint);
            }
        }
        Geometry::LineString(cs) => {
            gpx.tracks.push(track(name, description, std::slice::from_ref(cs)));
        }
        Geometry::MultiLineString(lines) => {
            gpx.tracks.push(track(name, description, lines));
        }
        Geometry::Polygon(rings) => {
            tracing::warn!(feature = name, "polygon flattened to closed GPX track");
            warnings.push(Warning::advisory(
                format!("feature {idx}"),
                "polygon encoded as closed track; ring structure is not recoverable",
            ));
            gpx.tracks.push(track(name, description, rings));
        }
        Geometry::MultiPolygon(polygons) => {
            tracing::warn!(feature = name, "multipolygon flattened to closed GPX tracks");
            warnings.push(Warning::advisory(
                format!("feature {idx}"),
                "multipolygon encoded as closed tracks; ring structure is not recoverable",
            ));
            let rings: Vec<Vec<Coord>> = polygons.iter().flatten().cloned().collect();
            gpx.tracks.push(track(name, description, &rings));
        }
        Geometry::GeometryCollection(members) => {
            for member in members {
                encode_geometry(gpx, member, name, description, idx, warnings);
            }
        }
    }
}

/// Build one track with a segment per coordinate run.
fn track(name: &str, description: &Option<String>, parts: &[Vec<Coord>]) -> Track {
    let mut track = Track::default();
    track.name = Some(name.to_string());
    track.description = description.clone();
    for part in parts {
        let mut segment = TrackSegment::default();
        segment.points = part.iter().map(coord_waypoint).collect();
        track.segments.push(segment);
    }
    track
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Feature;

    const GPX_DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="12.9716" lon="77.5946">
    <ele>912.0</ele>
    <name>Bengaluru</name>
    <desc>city center</desc>
  </wpt>
  <trk>
    <name>morning run</name>
    <trkseg>
      <trkpt lat="12.97" lon="77.59"></trkpt>
      <trkpt lat="12.98" lon="77.60"></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="12.99" lon="77.61"></trkpt>
    </trkseg>
  </trk>
  <rte>
    <name>commute</name>
    <rtept lat="12.90" lon="77.50"></rtept>
    <rtept lat="12.91" lon="77.51"></rtept>
  </rte>
</gpx>"#;

    #[test]
    fn test_parse_waypoints_tracks_routes() {
        let (fc, warnings) = parse(GPX_DOC.as_bytes(), "test").unwrap();
        assert!(warnings.is_empty());
        assert_eq!(fc.len(), 3);

        match &fc.features[0].geometry {
            Geometry::Point(c) => {
                assert!((c.lon - 77.5946).abs() < 1e-9);
                assert_eq!(c.ele, Some(912.0));
            }
            other => panic!("expected Point, got {}", other.type_name()),
        }
        assert_eq!(
            fc.features[0].properties.get("description"),
            Some(&Value::String("city center".into()))
        );

        // Track segments concatenate in file order
        match &fc.features[1].geometry {
            Geometry::LineString(coords) => assert_eq!(coords.len(), 3),
            other => panic!("expected LineString, got {}", other.type_name()),
        }
        assert_eq!(fc.features[2].name.as_deref(), Some("commute"));
    }

    #[test]
    fn test_round_trip_points_and_lines() {
        let (fc, _) = parse(GPX_DOC.as_bytes(), "test").unwrap();
        let (bytes, warnings) = encode(&fc).unwrap();
        assert!(warnings.is_empty());
        let (back, _) = parse(&bytes, "test").unwrap();

        // Waypoint survives with elevation; track and route come back as tracks
        let waypoint = back
            .features
            .iter()
            .find(|f| matches!(f.geometry, Geometry::Point(_)))
            .unwrap();
        assert!(waypoint
            .geometry
            .approx_eq(&Geometry::Point(Coord::new(77.5946, 12.9716)), 1e-9));
        assert_eq!(
            back.features
                .iter()
                .filter(|f| matches!(f.geometry, Geometry::LineString(_)))
                .count(),
            2
        );
    }

    #[test]
    fn test_polygon_becomes_closed_track() {
        let square = vec![
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(1.0, 1.0),
            Coord::new(0.0, 0.0),
        ];
        let fc = FeatureCollection::new(
            "area",
            SourceFormat::GeoJson,
            vec![Feature::new(Geometry::Polygon(vec![square.clone()])).with_name("plot")],
        );
        let (bytes, warnings) = encode(&fc).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(!warnings[0].dropped);

        let (back, _) = parse(&bytes, "area").unwrap();
        match &back.features[0].geometry {
            Geometry::LineString(coords) => {
                assert_eq!(coords.len(), square.len());
                // Track is closed: endpoints coincide
                assert!(coords[0].approx_eq(&coords[coords.len() - 1], 1e-9));
            }
            other => panic!("expected LineString, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_single_point_track_is_dropped() {
        let gpx = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="t" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><trkseg><trkpt lat="1.0" lon="2.0"></trkpt></trkseg></trk>
  <wpt lat="3.0" lon="4.0"><name>ok</name></wpt>
</gpx>"#;
        let (fc, warnings) = parse(gpx.as_bytes(), "test").unwrap();
        assert_eq!(fc.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].dropped);
    }

    #[test]
    fn test_invalid_xml_is_fatal() {
        assert!(parse(b"definitely not gpx", "bad").is_err());
    }
}
