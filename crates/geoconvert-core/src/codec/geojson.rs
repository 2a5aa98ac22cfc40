//! Canonical geometry ⇄ GeoJSON geometry objects.

use geojson::Value as GjValue;

use crate::error::GeometryError;
use crate::models::geometry::{Coord, Geometry};

fn position(coord: &Coord) -> Vec<f64> {
    match coord.ele {
        Some(ele) => vec![coord.lon, coord.lat, ele],
        None => vec![coord.lon, coord.lat],
    }
}

fn coord(position: &[f64]) -> Result<Coord, GeometryError> {
    match position {
        [lon, lat] => Ok(Coord::new(*lon, *lat)),
        [lon, lat, ele, ..] => Ok(Coord::with_ele(*lon, *lat, *ele)),
        _ => Err(GeometryError::malformed(format!(
            "position needs at least 2 numbers, found {}",
            position.len()
        ))),
    }
}

fn line(positions: &[Vec<f64>]) -> Result<Vec<Coord>, GeometryError> {
    positions.iter().map(|p| coord(p)).collect()
}

fn rings(rings: &[Vec<Vec<f64>>]) -> Result<Vec<Vec<Coord>>, GeometryError> {
    rings.iter().map(|r| line(r)).collect()
}

/// Decode a GeoJSON geometry object into the canonical model.
///
/// Structural invariants are checked: degenerate geometries fail with
/// [`GeometryError::Malformed`] and the calling parser decides whether to
/// drop the feature or abort the file.
pub fn decode(geometry: &geojson::Geometry) -> Result<Geometry, GeometryError> {
    let decoded = match &geometry.value {
        GjValue::Point(p) => Geometry::Point(coord(p)?),
        GjValue::LineString(ps) => Geometry::LineString(line(ps)?),
        GjValue::Polygon(rs) => Geometry::Polygon(rings(rs)?),
        GjValue::MultiPoint(ps) => Geometry::MultiPoint(line(ps)?),
        GjValue::MultiLineString(ls) => Geometry::MultiLineString(rings(ls)?),
        GjValue::MultiPolygon(polys) => Geometry::MultiPolygon(
            polys.iter().map(|p| rings(p)).collect::<Result<_, _>>()?,
        ),
        GjValue::GeometryCollection(members) => Geometry::GeometryCollection(
            members.iter().map(decode).collect::<Result<_, _>>()?,
        ),
    };
    decoded.validate()?;
    Ok(decoded)
}

/// Encode a canonical geometry as a GeoJSON geometry object.
pub fn encode(geometry: &Geometry) -> geojson::Geometry {
    let value = match geometry {
        Geometry::Point(c) => GjValue::Point(position(c)),
        Geometry::LineString(cs) => GjValue::LineString(cs.iter().map(position).collect()),
        Geometry::Polygon(rs) => {
            GjValue::Polygon(rs.iter().map(|r| r.iter().map(position).collect()).collect())
        }
        Geometry::MultiPoint(cs) => GjValue::MultiPoint(cs.iter().map(position).collect()),
        Geometry::MultiLineString(ls) => GjValue::MultiLineString(
            ls.iter().map(|l| l.iter().map(position).collect()).collect(),
        ),
        Geometry::MultiPolygon(polys) => GjValue::MultiPolygon(
            polys
                .iter()
                .map(|p| p.iter().map(|r| r.iter().map(position).collect()).collect())
                .collect(),
        ),
        Geometry::GeometryCollection(members) => {
            GjValue::GeometryCollection(members.iter().map(encode).collect())
        }
    };
    geojson::Geometry::new(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_round_trip_with_elevation() {
        let original = Geometry::Point(Coord::with_ele(77.5946, 12.9716, 912.0));
        let decoded = decode(&encode(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_polygon_round_trip() {
        let original = Geometry::Polygon(vec![vec![
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(1.0, 1.0),
            Coord::new(0.0, 0.0),
        ]]);
        assert_eq!(decode(&encode(&original)).unwrap(), original);
    }

    #[test]
    fn test_degenerate_polygon_rejected() {
        let native = geojson::Geometry::new(GjValue::Polygon(vec![vec![
            vec![0.0, 0.0],
            vec![1.0, 1.0],
        ]]));
        assert!(decode(&native).is_err());
    }

    #[test]
    fn test_geometry_collection_round_trip() {
        let original = Geometry::GeometryCollection(vec![
            Geometry::Point(Coord::new(1.0, 2.0)),
            Geometry::LineString(vec![Coord::new(0.0, 0.0), Coord::new(2.0, 2.0)]),
        ]);
        assert_eq!(decode(&encode(&original)).unwrap(), original);
    }
}
