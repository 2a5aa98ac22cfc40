//! Canonical geometry types shared by every parser and encoder.
//!
//! Coordinates are always (longitude, latitude[, elevation]) in WGS84
//! degrees; formats whose native order differs are translated at the
//! boundary, never downstream.

use crate::error::GeometryError;

/// One position: longitude, latitude, optional elevation in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lon: f64,
    pub lat: f64,
    pub ele: Option<f64>,
}

impl Coord {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat, ele: None }
    }

    pub fn with_ele(lon: f64, lat: f64, ele: f64) -> Self {
        Self { lon, lat, ele: Some(ele) }
    }

    /// Longitude/latitude equality within floating-point tolerance.
    pub fn approx_eq(&self, other: &Coord, tol: f64) -> bool {
        (self.lon - other.lon).abs() <= tol && (self.lat - other.lat).abs() <= tol
    }

    fn validate(&self) -> Result<(), GeometryError> {
        if !self.lon.is_finite() || !self.lat.is_finite() {
            return Err(GeometryError::malformed(format!(
                "coordinates must be finite, found ({}, {})",
                self.lon, self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lon) || !(-90.0..=90.0).contains(&self.lat) {
            return Err(GeometryError::malformed(format!(
                "coordinates out of WGS84 bounds: ({}, {})",
                self.lon, self.lat
            )));
        }
        Ok(())
    }
}

/// Canonical geometry, a tagged variant over the seven GeoJSON types.
///
/// Invariants, enforced by [`Geometry::validate`]: line strings have at
/// least 2 points; polygon rings are closed (first == last) with at least
/// 4 points; exterior ring first, holes after.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coord),
    LineString(Vec<Coord>),
    Polygon(Vec<Vec<Coord>>),
    MultiPoint(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    /// Human-readable type name ("Point", "MultiPolygon", ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::MultiPolygon(_) => "MultiPolygon",
            Geometry::GeometryCollection(_) => "GeometryCollection",
        }
    }

    /// Check the structural invariants of this geometry.
    ///
    /// Degenerate shapes (empty sequences, short or unclosed rings,
    /// non-finite or out-of-bounds coordinates) fail with
    /// [`GeometryError::Malformed`]. The caller decides whether to drop
    /// the feature or abort the file.
    pub fn validate(&self) -> Result<(), GeometryError> {
        match self {
            Geometry::Point(c) => c.validate(),
            Geometry::LineString(coords) => validate_line(coords),
            Geometry::Polygon(rings) => validate_rings(rings),
            Geometry::MultiPoint(coords) => {
                if coords.is_empty() {
                    return Err(GeometryError::malformed("empty MultiPoint"));
                }
                coords.iter().try_for_each(Coord::validate)
            }
            Geometry::MultiLineString(lines) => {
                if lines.is_empty() {
                    return Err(GeometryError::malformed("empty MultiLineString"));
                }
                lines.iter().try_for_each(|l| validate_line(l))
            }
            Geometry::MultiPolygon(polygons) => {
                if polygons.is_empty() {
                    return Err(GeometryError::malformed("empty MultiPolygon"));
                }
                polygons.iter().try_for_each(|p| validate_rings(p))
            }
            Geometry::GeometryCollection(members) => {
                if members.is_empty() {
                    return Err(GeometryError::malformed("empty GeometryCollection"));
                }
                members.iter().try_for_each(Geometry::validate)
            }
        }
    }

    /// Every coordinate of the geometry, depth-first.
    pub fn coords(&self) -> Vec<Coord> {
        let mut out = Vec::new();
        self.collect_coords(&mut out);
        out
    }

    fn collect_coords(&self, out: &mut Vec<Coord>) {
        match self {
            Geometry::Point(c) => out.push(*c),
            Geometry::LineString(cs) | Geometry::MultiPoint(cs) => out.extend_from_slice(cs),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                rings.iter().for_each(|r| out.extend_from_slice(r));
            }
            Geometry::MultiPolygon(polygons) => {
                polygons
                    .iter()
                    .for_each(|p| p.iter().for_each(|r| out.extend_from_slice(r)));
            }
            Geometry::GeometryCollection(members) => {
                members.iter().for_each(|g| g.collect_coords(out));
            }
        }
    }

    /// Bounding box as `[min_lon, min_lat, max_lon, max_lat]`.
    pub fn bbox(&self) -> Option<[f64; 4]> {
        let coords = self.coords();
        let first = coords.first()?;
        let mut bbox = [first.lon, first.lat, first.lon, first.lat];
        for c in &coords[1..] {
            bbox[0] = bbox[0].min(c.lon);
            bbox[1] = bbox[1].min(c.lat);
            bbox[2] = bbox[2].max(c.lon);
            bbox[3] = bbox[3].max(c.lat);
        }
        Some(bbox)
    }

    /// Geometry equality within floating-point tolerance, elevation ignored.
    pub fn approx_eq(&self, other: &Geometry, tol: f64) -> bool {
        if std::mem::discriminant(self) != std::mem::discriminant(other) {
            return false;
        }
        let (a, b) = (self.coords(), other.coords());
        a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| x.approx_eq(y, tol))
    }
}

fn validate_line(coords: &[Coord]) -> Result<(), GeometryError> {
    if coords.len() < 2 {
        return Err(GeometryError::malformed(format!(
            "LineString must have at least 2 points, found {}",
            coords.len()
        )));
    }
    coords.iter().try_for_each(Coord::validate)
}

fn validate_rings(rings: &[Vec<Coord>]) -> Result<(), GeometryError> {
    if rings.is_empty() {
        return Err(GeometryError::malformed("polygon has no rings"));
    }
    for ring in rings {
        if ring.len() < 4 {
            return Err(GeometryError::malformed(format!(
                "polygon ring must have at least 4 points, found {}",
                ring.len()
            )));
        }
        let (first, last) = (ring[0], ring[ring.len() - 1]);
        if first.lon != last.lon || first.lat != last.lat {
            return Err(GeometryError::malformed(
                "polygon ring is not closed (first point != last point)",
            ));
        }
        ring.iter().try_for_each(Coord::validate)?;
    }
    Ok(())
}

/// Close a ring in place if its endpoints differ.
pub fn close_ring(ring: &mut Vec<Coord>) {
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last()) {
        if first.lon != last.lon || first.lat != last.lat {
            ring.push(first);
        }
    }
}
