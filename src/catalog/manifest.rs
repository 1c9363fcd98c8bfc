//! Iceberg manifest list and manifest readers (Avro).
//!
//! Only the fields needed to enumerate live data files are decoded; the
//! rest of each Avro record is ignored.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use apache_avro::{from_value, Reader};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{CatalogError, Result};

/// Manifest content: data files.
pub(crate) const CONTENT_DATA: i32 = 0;

/// Manifest entry status: file removed by this snapshot.
pub(crate) const STATUS_DELETED: i32 = 2;

/// One entry of a snapshot's manifest list.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ManifestFile {
    pub manifest_path: String,
    /// Absent in format v1, where every manifest holds data files.
    #[serde(default)]
    pub content: i32,
}

/// One entry of a manifest.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ManifestEntry {
    pub status: i32,
    pub data_file: DataFile,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DataFile {
    /// Absent in format v1, where every file holds data rows.
    #[serde(default)]
    pub content: i32,
    pub file_path: String,
    pub file_format: String,
}

pub(crate) fn read_manifest_list(path: &Path) -> Result<Vec<ManifestFile>> {
    read_avro(path)
}

/// Live data files of a manifest.
///
/// Delete files are rejected: positional and equality deletes are not applied.
pub(crate) fn read_live_data_files(path: &Path) -> Result<Vec<DataFile>> {
    let entries: Vec<ManifestEntry> = read_avro(path)?;

    let mut files = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.status == STATUS_DELETED {
            continue;
        }
        if entry.data_file.content != CONTENT_DATA {
            return Err(CatalogError::Unsupported(format!(
                "row-level delete file {}",
                entry.data_file.file_path
            )));
        }
        if !entry.data_file.file_format.eq_ignore_ascii_case("parquet") {
            return Err(CatalogError::Unsupported(format!(
                "{} data file {}",
                entry.data_file.file_format, entry.data_file.file_path
            )));
        }
        files.push(entry.data_file);
    }

    Ok(files)
}

fn read_avro<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let reader = Reader::new(BufReader::new(file))?;
    reader
        .map(|value| -> Result<T> { Ok(from_value::<T>(&value?)?) })
        .collect()
}
