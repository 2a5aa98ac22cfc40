//! Geometry codec: converters between the canonical [`crate::models::Geometry`]
//! and each format's native geometry encoding.
//!
//! GeoJSON and WKT conversions live here because several formats share them
//! (CSV rows carry WKT, shapefile `.prj` files carry CRS WKT); KML, GPX and
//! shapefile shape conversions sit beside their format modules.

pub mod geojson;
pub mod wkt;
