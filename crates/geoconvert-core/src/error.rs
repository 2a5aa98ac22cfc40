//! Error types for GeoConvert

use thiserror::Error;

/// Geometry-level failures, produced by the codec layer.
#[derive(Debug, Clone, Error)]
pub enum GeometryError {
    #[error("Malformed geometry: {reason}")]
    Malformed { reason: String },
}

impl GeometryError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        GeometryError::Malformed { reason: reason.into() }
    }
}

/// File-level failures, produced by parsers, encoders and the detector.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Unsupported format: {detail}")]
    UnsupportedFormat { detail: String },

    #[error("Malformed {format} file: {reason}")]
    MalformedFile { format: String, reason: String },

    #[error("Shapefile archive is missing required component: {component}")]
    MissingComponent { component: String },

    #[error("Shapefile record count mismatch: {shapes} geometry records vs {records} attribute rows")]
    RecordCountMismatch { shapes: usize, records: usize },

    #[error("Declared CRS is not WGS84: {declared}")]
    CrsNotWgs84 { declared: String },

    #[error("No usable features in {source_name}")]
    EmptyFeatureCollection { source_name: String },

    #[error("Shapefile output requires a single shape class, found {found}")]
    MixedGeometry { found: String },

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FormatError {
    pub fn unsupported(detail: impl Into<String>) -> Self {
        FormatError::UnsupportedFormat { detail: detail.into() }
    }

    pub fn malformed(format: impl Into<String>, reason: impl Into<String>) -> Self {
        FormatError::MalformedFile { format: format.into(), reason: reason.into() }
    }
}

/// A failure tied to one source of a batch operation.
#[derive(Debug)]
pub struct SourceFailure {
    pub source: String,
    pub error: FormatError,
}

/// Batch-level failures. Individual source failures are reported alongside
/// successes in [`crate::batch::BatchOutput`]; the batch as a whole only
/// fails when no source succeeds.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("All {} batch sources failed", .failures.len())]
    AllSourcesFailed { failures: Vec<SourceFailure> },

    #[error(transparent)]
    Format(#[from] FormatError),
}

pub type Result<T, E = FormatError> = std::result::Result<T, E>;
