//! GeoConvert Core - canonical feature model and format conversion engine
//!
//! This crate ingests geographic data in heterogeneous formats (GeoJSON,
//! KML/KMZ, zipped Shapefiles, GPX, CSV), normalizes it into one canonical
//! representation, and re-emits it in any supported format, singly or as a
//! merged/batched export.

pub mod archive;
pub mod batch;
pub mod codec;
pub mod error;
pub mod formats;
pub mod models;
pub mod normalize;

pub use batch::{export_batch, merge_collections, BatchOutput};
pub use error::{BatchError, FormatError, GeometryError, Result, SourceFailure};
pub use formats::{detect, export, ingest, ExportOutput, Format, IngestOutcome, Warning};
pub use models::{Coord, Feature, FeatureCollection, Geometry, PropertyBag, SourceFormat};
