//! In-memory ZIP handling shared by the KMZ, shapefile and batch paths.

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::{FormatError, Result};

/// Per-entry uncompressed size guard. Entries larger than this are refused
/// rather than inflated into memory.
pub const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// One file extracted from an archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Entry name as stored in the archive, directories stripped.
    pub name: String,
    pub contents: Vec<u8>,
}

fn open(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| FormatError::malformed("zip", format!("unreadable archive: {e}")))
}

/// List entry names without extracting contents.
pub fn entry_names(bytes: &[u8]) -> Result<Vec<String>> {
    let archive = open(bytes)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

/// True when the bytes start with a ZIP local-file signature.
pub fn looks_like_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06")
}

/// Extract every regular file from the archive into memory.
pub fn extract_all(bytes: &[u8]) -> Result<Vec<ArchiveEntry>> {
    let mut archive = open(bytes)?;
    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| FormatError::malformed("zip", format!("bad entry {index}: {e}")))?;
        if file.is_dir() {
            continue;
        }
        if file.size() > MAX_ENTRY_BYTES {
            return Err(FormatError::malformed(
                "zip",
                format!("entry {} exceeds {} bytes", file.name(), MAX_ENTRY_BYTES),
            ));
        }
        // Keep only the base name; shapefile components and doc.kml are
        // matched by name regardless of folder nesting.
        let name = file
            .name()
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .to_string();
        let mut contents = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut contents)?;
        entries.push(ArchiveEntry { name, contents });
    }
    Ok(entries)
}

/// Build a deflated ZIP archive from `(entry name, contents)` pairs.
pub fn build(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, contents) in entries {
        writer
            .start_file(name.clone(), options)
            .map_err(|e| FormatError::malformed("zip", format!("cannot add {name}: {e}")))?;
        writer.write_all(contents)?;
    }
    let cursor = writer
        .finish()
        .map_err(|e| FormatError::malformed("zip", format!("cannot finalize archive: {e}")))?;
    Ok(cursor.into_inner())
}
