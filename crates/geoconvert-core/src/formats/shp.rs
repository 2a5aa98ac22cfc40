//! Shapefile parser and encoder.
//!
//! Input and output are zip archives: a shapefile is only usable as the
//! `.shp` + `.shx` + `.dbf` component set, so single loose files are not
//! accepted. Extraction uses a scoped temporary directory that is released
//! on every exit path.

use std::path::Path;

use serde_json::Value;
use shapefile::dbase::{self, FieldValue};
use shapefile::{PolygonRing, Shape, NO_DATA};

use crate::archive::{self, ArchiveEntry};
use crate::error::{FormatError, Result};
use crate::formats::Warning;
use crate::models::{Coord, Feature, FeatureCollection, Geometry, PropertyBag, SourceFormat};

/// ESRI WKT for geographic WGS84, written as the `.prj` component.
const WGS84_PRJ: &str = "GEOGCS[\"GCS_WGS_1984\",DATUM[\"D_WGS_1984\",\
SPHEROID[\"WGS_1984\",6378137.0,298.257223563]],PRIMEM[\"Greenwich\",0.0],\
UNIT[\"Degree\",0.0174532925199433]]";

/// dBase III field-name limit.
const DBF_NAME_LIMIT: usize = 10;
const DBF_FIELD_WIDTH: u8 = 254;

/// Parse a zipped shapefile archive.
pub fn parse(bytes: &[u8], source_name: &str) -> Result<(FeatureCollection, Vec<Warning>)> {
    let entries = archive::extract_all(bytes)?;
    let mut warnings = Vec::new();

    let shp = find_component(&entries, None, "shp")
        .ok_or(FormatError::MissingComponent { component: ".shp".to_string() })?;
    let base = shp.name[..shp.name.len() - 4].to_string();
    let shx = find_component(&entries, Some(&base), "shx")
        .ok_or(FormatError::MissingComponent { component: ".shx".to_string() })?;
    let dbf = find_component(&entries, Some(&base), "dbf")
        .ok_or(FormatError::MissingComponent { component: ".dbf".to_string() })?;

    match find_component(&entries, Some(&base), "prj") {
        Some(prj) => confirm_wgs84(&String::from_utf8_lossy(&prj.contents))?,
        None => warnings.push(Warning::advisory(
            ".prj",
            "no projection file in archive, WGS84 assumed",
        )),
    }

    let dir = tempfile::tempdir()?;
    let shp_path = write_component(dir.path(), "layer.shp", &shp.contents)?;
    write_component(dir.path(), "layer.shx", &shx.contents)?;
    let dbf_path = write_component(dir.path(), "layer.dbf", &dbf.contents)?;

    let shapes = shapefile::read_shapes(&shp_path)
        .map_err(|e| FormatError::malformed("Shapefile", format!("cannot read shapes: {e}")))?;
    let records = dbase::Reader::from_path(&dbf_path)
        .and_then(|mut reader| reader.read())
        .map_err(|e| FormatError::malformed("Shapefile", format!("cannot read attributes: {e}")))?;

    if shapes.len() != records.len() {
        return Err(FormatError::RecordCountMismatch {
            shapes: shapes.len(),
            records: records.len(),
        });
    }

    let mut features = Vec::new();
    for (idx, (shape, record)) in shapes.into_iter().zip(records).enumerate() {
        match decode_shape(shape) {
            Ok(geometry) => {
                let properties = decode_record(record);
                let name = properties
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{source_name}_{idx}"));
                features.push(Feature::new(geometry).with_name(name).with_properties(properties));
            }
            Err(reason) => warnings.push(Warning::dropped(format!("record {idx}"), reason)),
        }
    }

    Ok((
        FeatureCollection::new(source_name, SourceFormat::Shapefile, features),
        warnings,
    ))
}

/// Find an archive entry by extension, optionally constrained to a base
/// name. Matching is case-insensitive.
fn find_component<'a>(
    entries: &'a [ArchiveEntry],
    base: Option<&str>,
    extension: &str,
) -> Option<&'a ArchiveEntry> {
    entries.iter().find(|e| {
        let lower = e.name.to_ascii_lowercase();
        let suffix = format!(".{extension}");
        lower.ends_with(&suffix)
            && base
                .map(|b| lower[..lower.len() - suffix.len()].eq_ignore_ascii_case(b))
                .unwrap_or(true)
    })
}

/// Reject `.prj` declarations of any CRS other than geographic WGS84.
fn confirm_wgs84(prj: &str) -> Result<()> {
    if let Some(code) = epsg_code(prj) {
        return if code == 4326 {
            Ok(())
        } else {
            Err(FormatError::CrsNotWgs84 { declared: format!("EPSG:{code}") })
        };
    }
    let upper = prj.to_ascii_uppercase();
    if upper.starts_with("GEOGCS") && (upper.contains("WGS_1984") || upper.contains("WGS 84")) {
        Ok(())
    } else {
        Err(FormatError::CrsNotWgs84 {
            declared: prj.chars().take(80).collect(),
        })
    }
}

/// Extract an EPSG code from `AUTHORITY["EPSG","..."]` or an `EPSG:` prefix.
fn epsg_code(wkt: &str) -> Option<u32> {
    if let Some(start) = wkt.rfind("AUTHORITY[\"EPSG\",\"") {
        let rest = &wkt[start + 18..];
        if let Some(end) = rest.find('"') {
            return rest[..end].parse().ok();
        }
    }
    if let Some(start) = wkt.find("EPSG:") {
        let digits: String =
            wkt[start + 5..].chars().take_while(|c| c.is_ascii_digit()).collect();
        return digits.parse().ok();
    }
    None
}

fn write_component(dir: &Path, name: &str, contents: &[u8]) -> Result<std::path::PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, contents)?;
    Ok(path)
}

fn point_coord(p: &shapefile::Point) -> Coord {
    Coord::new(p.x, p.y)
}

fn point_z_coord(p: &shapefile::PointZ) -> Coord {
    Coord::with_ele(p.x, p.y, p.z)
}

fn point_m_coord(p: &shapefile::PointM) -> Coord {
    Coord::new(p.x, p.y)
}

fn decode_shape(shape: Shape) -> std::result::Result<Geometry, String> {
    let geometry = match shape {
        Shape::Point(p) => Geometry::Point(point_coord(&p)),
        Shape::PointZ(p) => Geometry::Point(point_z_coord(&p)),
        Shape::PointM(p) => Geometry::Point(point_m_coord(&p)),
        Shape::Multipoint(mp) => {
            Geometry::MultiPoint(mp.points().iter().map(point_coord).collect())
        }
        Shape::MultipointZ(mp) => {
            Geometry::MultiPoint(mp.points().iter().map(point_z_coord).collect())
        }
        Shape::MultipointM(mp) => {
            Geometry::MultiPoint(mp.points().iter().map(point_m_coord).collect())
        }
        Shape::Polyline(line) => {
            lines_to_geometry(line.parts().iter().map(|p| p.iter().map(point_coord).collect()))
        }
        Shape::PolylineZ(line) => {
            lines_to_geometry(line.parts().iter().map(|p| p.iter().map(point_z_coord).collect()))
        }
        Shape::PolylineM(line) => {
            lines_to_geometry(line.parts().iter().map(|p| p.iter().map(point_m_coord).collect()))
        }
        Shape::Polygon(polygon) => rings_to_geometry(
            polygon
                .rings()
                .iter()
                .map(|ring| (is_outer(ring), ring.points().iter().map(point_coord).collect())),
        )?,
        Shape::PolygonZ(polygon) => rings_to_geometry(
            polygon
                .rings()
                .iter()
                .map(|ring| (is_outer(ring), ring.points().iter().map(point_z_coord).collect())),
        )?,
        Shape::PolygonM(polygon) => rings_to_geometry(
            polygon
                .rings()
                .iter()
                .map(|ring| (is_outer(ring), ring.points().iter().map(point_m_coord).collect())),
        )?,
        Shape::Multipatch(_) => return Err("multipatch shapes are not supported".to_string()),
        Shape::NullShape => return Err("null shape".to_string()),
    };
    geometry.validate().map_err(|e| e.to_string())?;
    Ok(geometry)
}

fn is_outer<P>(ring: &PolygonRing<P>) -> bool {
    matches!(ring, PolygonRing::Outer(_))
}

fn lines_to_geometry(parts: impl Iterator<Item = Vec<Coord>>) -> Geometry {
    let mut parts: Vec<Vec<Coord>> = parts.collect();
    if parts.len() == 1 {
        Geometry::LineString(parts.remove(0))
    } else {
        Geometry::MultiLineString(parts)
    }
}

/// Regroup a shapefile's flat ring list into polygons: each outer ring
/// starts a polygon, inner rings attach to the preceding outer.
fn rings_to_geometry(
    rings: impl Iterator<Item = (bool, Vec<Coord>)>,
) -> std::result::Result<Geometry, String> {
    let mut polygons: Vec<Vec<Vec<Coord>>> = Vec::new();
    for (outer, ring) in rings {
        if outer || polygons.is_empty() {
            polygons.push(vec![ring]);
        } else {
            polygons.last_mut().expect("non-empty").push(ring);
        }
    }
    match polygons.len() {
        0 => Err("polygon record has no rings".to_string()),
        1 => Ok(Geometry::Polygon(polygons.remove(0))),
        _ => Ok(Geometry::MultiPolygon(polygons)),
    }
}

fn decode_record(record: dbase::Record) -> PropertyBag {
    let mut properties = PropertyBag::new();
    for (name, value) in record {
        properties.insert(name, decode_field(value));
    }
    properties
}

fn decode_field(value: FieldValue) -> Value {
    match value {
        FieldValue::Character(Some(s)) => Value::String(s),
        FieldValue::Character(None) => Value::Null,
        FieldValue::Numeric(Some(n)) => number(n),
        FieldValue::Numeric(None) => Value::Null,
        FieldValue::Logical(Some(b)) => Value::Bool(b),
        FieldValue::Logical(None) => Value::Null,
        FieldValue::Date(Some(d)) => {
            Value::String(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        }
        FieldValue::Date(None) => Value::Null,
        FieldValue::Float(Some(f)) => number(f as f64),
        FieldValue::Float(None) => Value::Null,
        FieldValue::Integer(i) => Value::from(i),
        FieldValue::Currency(c) => number(c),
        FieldValue::DateTime(dt) => Value::String(format!(
            "{:04}-{:02}-{:02}",
            dt.date().year(),
            dt.date().month(),
            dt.date().day()
        )),
        FieldValue::Double(d) => number(d),
        FieldValue::Memo(s) => Value::String(s),
    }
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// Which of the four writable ESRI shape classes a geometry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeClass {
    Point,
    Multipoint,
    Polyline,
    Polygon,
}

impl ShapeClass {
    fn of(geometry: &Geometry) -> std::result::Result<ShapeClass, String> {
        match geometry {
            Geometry::Point(_) => Ok(ShapeClass::Point),
            Geometry::MultiPoint(_) => Ok(ShapeClass::Multipoint),
            Geometry::LineString(_) | Geometry::MultiLineString(_) => Ok(ShapeClass::Polyline),
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => Ok(ShapeClass::Polygon),
            Geometry::GeometryCollection(_) => Err("GeometryCollection".to_string()),
        }
    }
}

/// Encode a collection as a zipped four-component shapefile archive
/// (`.shp`, `.shx`, `.dbf`, `.prj` fixed to WGS84).
///
/// Shapefiles hold exactly one shape type; a collection mixing point-,
/// line- and polygon-class geometries fails with
/// [`FormatError::MixedGeometry`].
pub fn encode(collection: &FeatureCollection) -> Result<Vec<u8>> {
    let mut classes: Vec<ShapeClass> = Vec::new();
    for feature in &collection.features {
        let class = ShapeClass::of(&feature.geometry)
            .map_err(|found| FormatError::MixedGeometry { found })?;
        if !classes.contains(&class) {
            classes.push(class);
        }
    }
    let class = match classes.as_slice() {
        [single] => *single,
        _ => {
            return Err(FormatError::MixedGeometry {
                found: classes.iter().map(|c| format!("{c:?}")).collect::<Vec<_>>().join(", "),
            })
        }
    };

    let keys = collection.property_keys();
    let field_names = dbf_field_names(&keys);
    let mut table = dbase::TableWriterBuilder::new();
    for field in &field_names {
        let name = dbase::FieldName::try_from(field.as_str())
            .map_err(|e| FormatError::malformed("Shapefile", format!("bad field name: {e:?}")))?;
        table = table.add_character_field(name, DBF_FIELD_WIDTH);
    }

    let dir = tempfile::tempdir()?;
    let shp_path = dir.path().join("layer.shp");
    let mut writer = shapefile::Writer::from_path(&shp_path, table)
        .map_err(|e| FormatError::malformed("Shapefile", format!("cannot create writer: {e}")))?;

    for feature in &collection.features {
        let record = encode_record(&keys, &field_names, &feature.properties);
        write_shape(&mut writer, class, &feature.geometry, &record)?;
    }
    drop(writer);

    std::fs::write(dir.path().join("layer.prj"), WGS84_PRJ)?;

    let stem = file_stem(&collection.name);
    let mut entries = Vec::new();
    for extension in ["shp", "shx", "dbf", "prj"] {
        let contents = std::fs::read(dir.path().join(format!("layer.{extension}")))?;
        entries.push((format!("{stem}.{extension}"), contents));
    }
    archive::build(&entries)
}

fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "layer".to_string()
    } else {
        stem
    }
}

/// Sanitize property keys into the 10-character dBase namespace,
/// disambiguating collisions with a deterministic numeric suffix.
fn dbf_field_names(keys: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        let mut base: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .take(DBF_NAME_LIMIT)
            .collect();
        if base.is_empty() {
            base = "FIELD".to_string();
        }
        let mut candidate = base.clone();
        let mut suffix = 1u32;
        while names.contains(&candidate) {
            let digits = suffix.to_string();
            let keep = DBF_NAME_LIMIT.saturating_sub(digits.len());
            candidate = format!("{}{}", &base[..base.len().min(keep)], digits);
            suffix += 1;
        }
        names.push(candidate);
    }
    names
}

fn encode_record(keys: &[String], field_names: &[String], bag: &PropertyBag) -> dbase::Record {
    let mut record = dbase::Record::default();
    for (key, field) in keys.iter().zip(field_names) {
        let value = match bag.get(key) {
            None | Some(Value::Null) => FieldValue::Character(None),
            Some(Value::String(s)) => FieldValue::Character(Some(truncate(s))),
            Some(other) => FieldValue::Character(Some(truncate(&other.to_string()))),
        };
        record.insert(field.clone(), value);
    }
    record
}

fn truncate(s: &str) -> String {
    s.chars().take(DBF_FIELD_WIDTH as usize).collect()
}

fn has_elevation(coords: &[Coord]) -> bool {
    coords.iter().any(|c| c.ele.is_some())
}

fn to_point(c: &Coord) -> shapefile::Point {
    shapefile::Point::new(c.lon, c.lat)
}

fn to_point_z(c: &Coord) -> shapefile::PointZ {
    shapefile::PointZ::new(c.lon, c.lat, c.ele.unwrap_or(0.0), NO_DATA)
}

/// Trapezoid-form shoelace sum in the lon/lat plane; positive is clockwise.
fn signed_area(ring: &[Coord]) -> f64 {
    let mut sum = 0.0;
    for pair in ring.windows(2) {
        sum += (pair[1].lon - pair[0].lon) * (pair[1].lat + pair[0].lat);
    }
    sum / 2.0
}

/// ESRI rings wind clockwise for exteriors, counterclockwise for holes.
fn wound(ring: &[Coord], clockwise: bool) -> Vec<shapefile::Point> {
    let is_clockwise = signed_area(ring) > 0.0;
    let points: Vec<shapefile::Point> = ring.iter().map(to_point).collect();
    if is_clockwise == clockwise {
        points
    } else {
        points.into_iter().rev().collect()
    }
}

fn polygon_rings(polygons: &[Vec<Vec<Coord>>]) -> Vec<PolygonRing<shapefile::Point>> {
    let mut rings = Vec::new();
    for polygon in polygons {
        for (idx, ring) in polygon.iter().enumerate() {
            if idx == 0 {
                rings.push(PolygonRing::Outer(wound(ring, true)));
            } else {
                rings.push(PolygonRing::Inner(wound(ring, false)));
            }
        }
    }
    rings
}

fn write_shape<W: std::io::Write + std::io::Seek>(
    writer: &mut shapefile::Writer<W>,
    class: ShapeClass,
    geometry: &Geometry,
    record: &dbase::Record,
) -> Result<()> {
    let io_err =
        |e: shapefile::Error| FormatError::malformed("Shapefile", format!("write failed: {e}"));
    match (class, geometry) {
        (ShapeClass::Point, Geometry::Point(c)) => {
            if c.ele.is_some() {
                writer.write_shape_and_record(&to_point_z(c), record).map_err(io_err)?;
            } else {
                writer.write_shape_and_record(&to_point(c), record).map_err(io_err)?;
            }
        }
        (ShapeClass::Multipoint, Geometry::MultiPoint(cs)) => {
            if has_elevation(cs) {
                let shape = shapefile::MultipointZ::new(cs.iter().map(to_point_z).collect());
                writer.write_shape_and_record(&shape, record).map_err(io_err)?;
            } else {
                let shape = shapefile::Multipoint::new(cs.iter().map(to_point).collect());
                writer.write_shape_and_record(&shape, record).map_err(io_err)?;
            }
        }
        (ShapeClass::Polyline, geometry) => {
            let parts: Vec<&[Coord]> = match geometry {
                Geometry::LineString(cs) => vec![cs.as_slice()],
                Geometry::MultiLineString(ls) => ls.iter().map(Vec::as_slice).collect(),
                _ => unreachable!("class checked above"),
            };
            if parts.iter().any(|p| has_elevation(p)) {
                let shape = shapefile::PolylineZ::with_parts(
                    parts.iter().map(|p| p.iter().map(to_point_z).collect()).collect(),
                );
                writer.write_shape_and_record(&shape, record).map_err(io_err)?;
            } else {
                let shape = shapefile::Polyline::with_parts(
                    parts.iter().map(|p| p.iter().map(to_point).collect()).collect(),
                );
                writer.write_shape_and_record(&shape, record).map_err(io_err)?;
            }
        }
        (ShapeClass::Polygon, geometry) => {
            let rings = match geometry {
                Geometry::Polygon(rings) => polygon_rings(std::slice::from_ref(rings)),
                Geometry::MultiPolygon(polygons) => polygon_rings(polygons),
                _ => unreachable!("class checked above"),
            };
            let shape = shapefile::Polygon::with_rings(rings);
            writer.write_shape_and_record(&shape, record).map_err(io_err)?;
        }
        _ => unreachable!("class checked above"),
    }
    Ok(())
}
