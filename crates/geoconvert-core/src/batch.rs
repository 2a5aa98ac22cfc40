//! Merge and batch export engine.
//!
//! Merging concatenates collections in input order under fresh feature
//! ids; batch export encodes each source independently on a bounded
//! worker pool and packages the outputs into one archive, isolating
//! per-source failures.

use rayon::prelude::*;

use crate::archive;
use crate::error::{BatchError, SourceFailure};
use crate::formats::{export, Format, Warning};
use crate::models::feature::fresh_id;
use crate::models::{FeatureCollection, SourceFormat};

/// Result of a batch export call.
#[derive(Debug)]
pub struct BatchOutput {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: &'static str,
    /// Sources encoded successfully.
    pub succeeded: usize,
    /// Per-source failures; non-empty means partial failure, which never
    /// aborts the batch on its own.
    pub failures: Vec<SourceFailure>,
    pub warnings: Vec<Warning>,
}

/// Concatenate collections in input order into one collection.
///
/// Feature identifiers are re-minted so they are unique across sources;
/// the property-key union across all sources becomes the effective schema
/// for subsequent CSV/shapefile encoding.
pub fn merge_collections(sources: Vec<(String, FeatureCollection)>) -> FeatureCollection {
    let label = match sources.len() {
        0 => "merged".to_string(),
        1 => sources[0].0.clone(),
        n => format!("merged_{n}_files"),
    };
    let features = sources
        .into_iter()
        .flat_map(|(_, collection)| collection.features)
        .map(|mut feature| {
            feature.id = fresh_id();
            feature
        })
        .collect();
    FeatureCollection::new(label, SourceFormat::Merged, features)
}

/// Encode multiple sources into one output.
///
/// With `merge` set, all features are combined into a single
/// `<label>_merged.<ext>` file. Otherwise each source is encoded
/// independently — in parallel, with output order following input order —
/// and packaged into `<label>_<N>_files.zip`, one entry per source named
/// from its base name.
///
/// Per-source failures are collected into the output; the call only
/// fails wholesale when zero sources succeed. Wall-clock timeouts are the
/// caller's to impose: wrap this call and report a timed-out batch source
/// as its own failure.
pub fn export_batch(
    sources: Vec<(String, FeatureCollection)>,
    format: Format,
    merge: bool,
    label: &str,
) -> Result<BatchOutput, BatchError> {
    if merge {
        let merged = merge_collections(sources);
        let output = export(&merged, format)?;
        return Ok(BatchOutput {
            bytes: output.bytes,
            filename: format!("{label}_merged.{}", format.extension()),
            content_type: format.content_type(),
            succeeded: 1,
            failures: Vec::new(),
            warnings: output.warnings,
        });
    }

    let total = sources.len();
    let results: Vec<_> = sources
        .into_par_iter()
        .map(|(source_name, collection)| {
            let result = export(&collection, format);
            (source_name, result)
        })
        .collect();

    let mut entries = Vec::new();
    let mut failures = Vec::new();
    let mut warnings = Vec::new();
    for (source_name, result) in results {
        match result {
            Ok(output) => {
                entries.push((format!("{source_name}.{}", format.extension()), output.bytes));
                warnings.extend(output.warnings);
            }
            Err(error) => {
                tracing::warn!(source = %source_name, %error, "batch source failed");
                failures.push(SourceFailure { source: source_name, error });
            }
        }
    }

    if entries.is_empty() {
        return Err(BatchError::AllSourcesFailed { failures });
    }
    tracing::debug!(succeeded = entries.len(), failed = failures.len(), total, "batch encoded");

    let bytes = archive::build(&entries).map_err(BatchError::Format)?;
    Ok(BatchOutput {
        bytes,
        filename: format!("{label}_{total}_files.zip"),
        content_type: "application/zip",
        succeeded: entries.len(),
        failures,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coord, Feature, Geometry};

    fn collection(name: &str, count: usize) -> FeatureCollection {
        let features = (0..count)
            .map(|i| Feature::new(Geometry::Point(Coord::new(i as f64, i as f64))))
            .collect();
        FeatureCollection::new(name, SourceFormat::GeoJson, features)
    }

    #[test]
    fn test_merge_concatenates_and_remints_ids() {
        let merged = merge_collections(vec![
            ("a".to_string(), collection("a", 2)),
            ("b".to_string(), collection("b", 3)),
        ]);
        assert_eq!(merged.len(), 5);
        assert_eq!(merged.source, SourceFormat::Merged);
        let mut ids: Vec<&String> = merged.features.iter().map(|f| &f.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_merged_export_naming() {
        let output = export_batch(
            vec![
                ("a".to_string(), collection("a", 1)),
                ("b".to_string(), collection("b", 1)),
            ],
            Format::GeoJson,
            true,
            "survey",
        )
        .unwrap();
        assert_eq!(output.filename, "survey_merged.geojson");
        assert_eq!(output.content_type, "application/geo+json");
        assert!(output.failures.is_empty());
    }

    #[test]
    fn test_batch_isolates_failures() {
        // The middle source is empty and fails to encode; the other two
        // must still land in the archive.
        let output = export_batch(
            vec![
                ("a".to_string(), collection("a", 1)),
                ("broken".to_string(), collection("broken", 0)),
                ("c".to_string(), collection("c", 1)),
            ],
            Format::GeoJson,
            false,
            "survey",
        )
        .unwrap();
        assert_eq!(output.succeeded, 2);
        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].source, "broken");
        assert_eq!(output.filename, "survey_3_files.zip");

        let names = archive::entry_names(&output.bytes).unwrap();
        assert_eq!(names, vec!["a.geojson", "c.geojson"]);
    }

    #[test]
    fn test_batch_fails_only_when_all_fail() {
        let result = export_batch(
            vec![
                ("a".to_string(), collection("a", 0)),
                ("b".to_string(), collection("b", 0)),
            ],
            Format::GeoJson,
            false,
            "survey",
        );
        assert!(matches!(
            result,
            Err(BatchError::AllSourcesFailed { ref failures }) if failures.len() == 2
        ));
    }

    #[test]
    fn test_archive_order_follows_input_order() {
        let sources: Vec<_> = (0..8)
            .map(|i| (format!("s{i}"), collection(&format!("s{i}"), 1)))
            .collect();
        let output = export_batch(sources, Format::GeoJson, false, "ordered").unwrap();
        let names = archive::entry_names(&output.bytes).unwrap();
        let expected: Vec<String> = (0..8).map(|i| format!("s{i}.geojson")).collect();
        assert_eq!(names, expected);
    }
}
