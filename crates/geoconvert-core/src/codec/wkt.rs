//! Canonical geometry ⇄ Well-Known Text.
//!
//! Parsing accepts the standard grammar with case-insensitive keywords;
//! production emits canonical uppercase keywords. The third coordinate is
//! carried through both directions when present.

use std::str::FromStr;

use wkt::types as wkt_types;
use wkt::Wkt;

use crate::error::GeometryError;
use crate::models::geometry::{Coord, Geometry};

fn from_wkt_coord(c: &wkt_types::Coord<f64>) -> Coord {
    Coord { lon: c.x, lat: c.y, ele: c.z }
}

fn to_wkt_coord(c: &Coord) -> wkt_types::Coord<f64> {
    wkt_types::Coord { x: c.lon, y: c.lat, z: c.ele, m: None }
}

fn from_wkt_line(line: &wkt_types::LineString<f64>) -> Vec<Coord> {
    line.0.iter().map(from_wkt_coord).collect()
}

fn from_wkt_polygon(polygon: &wkt_types::Polygon<f64>) -> Vec<Vec<Coord>> {
    polygon.0.iter().map(from_wkt_line).collect()
}

fn convert(item: &wkt::Geometry<f64>) -> Result<Geometry, GeometryError> {
    let geometry = match item {
        wkt::Geometry::Point(point) => match &point.0 {
            Some(c) => Geometry::Point(from_wkt_coord(c)),
            None => return Err(GeometryError::malformed("POINT EMPTY")),
        },
        wkt::Geometry::LineString(line) => Geometry::LineString(from_wkt_line(line)),
        wkt::Geometry::Polygon(polygon) => Geometry::Polygon(from_wkt_polygon(polygon)),
        wkt::Geometry::MultiPoint(points) => Geometry::MultiPoint(
            points
                .0
                .iter()
                .map(|p| {
                    p.0.as_ref()
                        .map(from_wkt_coord)
                        .ok_or_else(|| GeometryError::malformed("empty point in MULTIPOINT"))
                })
                .collect::<Result<_, _>>()?,
        ),
        wkt::Geometry::MultiLineString(lines) => {
            Geometry::MultiLineString(lines.0.iter().map(from_wkt_line).collect())
        }
        wkt::Geometry::MultiPolygon(polygons) => {
            Geometry::MultiPolygon(polygons.0.iter().map(from_wkt_polygon).collect())
        }
        wkt::Geometry::GeometryCollection(members) => Geometry::GeometryCollection(
            members.0.iter().map(convert).collect::<Result<_, _>>()?,
        ),
    };
    geometry.validate()?;
    Ok(geometry)
}

/// Parse a WKT string into the canonical model.
pub fn decode(text: &str) -> Result<Geometry, GeometryError> {
    let parsed: Wkt<f64> = Wkt::from_str(text.trim())
        .map_err(|e| GeometryError::malformed(format!("invalid WKT: {e}")))?;
    convert(&parsed.item)
}

fn to_wkt_line(coords: &[Coord]) -> wkt_types::LineString<f64> {
    wkt_types::LineString(coords.iter().map(to_wkt_coord).collect())
}

fn to_wkt_polygon(rings: &[Vec<Coord>]) -> wkt_types::Polygon<f64> {
    wkt_types::Polygon(rings.iter().map(|r| to_wkt_line(r)).collect())
}

fn to_wkt_geometry(geometry: &Geometry) -> wkt::Geometry<f64> {
    match geometry {
        Geometry::Point(c) => wkt::Geometry::Point(wkt_types::Point(Some(to_wkt_coord(c)))),
        Geometry::LineString(cs) => wkt::Geometry::LineString(to_wkt_line(cs)),
        Geometry::Polygon(rs) => wkt::Geometry::Polygon(to_wkt_polygon(rs)),
        Geometry::MultiPoint(cs) => wkt::Geometry::MultiPoint(wkt_types::MultiPoint(
            cs.iter().map(|c| wkt_types::Point(Some(to_wkt_coord(c)))).collect(),
        )),
        Geometry::MultiLineString(ls) => wkt::Geometry::MultiLineString(
            wkt_types::MultiLineString(ls.iter().map(|l| to_wkt_line(l)).collect()),
        ),
        Geometry::MultiPolygon(polys) => wkt::Geometry::MultiPolygon(wkt_types::MultiPolygon(
            polys.iter().map(|p| to_wkt_polygon(p)).collect(),
        )),
        Geometry::GeometryCollection(members) => wkt::Geometry::GeometryCollection(
            wkt_types::GeometryCollection(members.iter().map(to_wkt_geometry).collect()),
        ),
    }
}

/// Produce the WKT representation of a canonical geometry.
pub fn encode(geometry: &Geometry) -> String {
    Wkt { item: to_wkt_geometry(geometry) }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_point() {
        let g = decode("POINT(77.5946 12.9716)").unwrap();
        assert_eq!(g, Geometry::Point(Coord::new(77.5946, 12.9716)));
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let g = decode("point(1 2)").unwrap();
        assert_eq!(g, Geometry::Point(Coord::new(1.0, 2.0)));
    }

    #[test]
    fn test_round_trip_all_types() {
        let square = vec![
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(1.0, 1.0),
            Coord::new(0.0, 0.0),
        ];
        let geometries = [
            Geometry::Point(Coord::new(10.0, 20.0)),
            Geometry::LineString(vec![Coord::new(0.0, 0.0), Coord::new(5.0, 5.0)]),
            Geometry::Polygon(vec![square.clone()]),
            Geometry::MultiPoint(vec![Coord::new(1.0, 1.0), Coord::new(2.0, 2.0)]),
            Geometry::MultiLineString(vec![
                vec![Coord::new(0.0, 0.0), Coord::new(1.0, 1.0)],
                vec![Coord::new(2.0, 2.0), Coord::new(3.0, 3.0)],
            ]),
            Geometry::MultiPolygon(vec![vec![square.clone()]]),
            Geometry::GeometryCollection(vec![Geometry::Point(Coord::new(4.0, 4.0))]),
        ];
        for original in geometries {
            let round_tripped = decode(&encode(&original)).unwrap();
            assert!(
                round_tripped.approx_eq(&original, 1e-9),
                "round trip diverged for {}",
                original.type_name()
            );
        }
    }

    #[test]
    fn test_empty_point_rejected() {
        assert!(decode("POINT EMPTY").is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(decode("POINT(77.5946)").is_err());
        assert!(decode("not wkt at all").is_err());
    }
}
