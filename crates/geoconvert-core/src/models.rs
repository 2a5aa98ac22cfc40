pub mod feature;
pub mod geometry;

pub use feature::{Feature, FeatureCollection, PropertyBag, SourceFormat};
pub use geometry::{Coord, Geometry};
