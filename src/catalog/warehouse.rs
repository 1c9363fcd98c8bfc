//! Iceberg hadoop-style warehouse catalog.
//!
//! Tables live at `<warehouse>/<namespace...>/<table>`. The current metadata
//! file is `metadata/v<N>.metadata.json`, where `N` comes from
//! `metadata/version-hint.text` (or the highest version present when the
//! hint is missing). Snapshots point at an Avro manifest list; manifests
//! point at Parquet data files.
//!
//! File URIs recorded in metadata are absolute (`file:/...`, `hdfs://...`).
//! Any URI under the table's recorded `location` is re-rooted onto the local
//! table directory, so a warehouse copied or mounted elsewhere stays readable.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::data_file::read_data_file;
use super::manifest::{read_live_data_files, read_manifest_list, CONTENT_DATA};
use super::{Catalog, CatalogError, Result, SourceTable, TableIdent};
use crate::record::{Column, ColumnType, SourceBatch, SourceSchema, TransformColumns};

const METADATA_DIR: &str = "metadata";
const VERSION_HINT_FILE: &str = "version-hint.text";

/// Catalog over a local warehouse directory.
#[derive(Debug, Clone)]
pub struct WarehouseCatalog {
    root: PathBuf,
}

impl WarehouseCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create from a warehouse location such as `/data/iceberg` or
    /// `file:///data/iceberg`. Remote file systems are rejected.
    pub fn from_location(location: &str) -> Result<Self> {
        Ok(Self::new(local_path(location)?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_dir(&self, ident: &TableIdent) -> PathBuf {
        let mut dir = self.root.clone();
        for part in &ident.namespace {
            dir.push(part);
        }
        dir.push(&ident.name);
        dir
    }
}

#[async_trait]
impl Catalog for WarehouseCatalog {
    async fn load_table(
        &self,
        ident: &TableIdent,
        columns: &TransformColumns,
    ) -> Result<Box<dyn SourceTable>> {
        let dir = self.table_dir(ident);
        let ident = ident.clone();
        let columns = columns.clone();

        let state = tokio::task::spawn_blocking(move || TableState::open(ident, dir, &columns))
            .await
            .map_err(|e| CatalogError::Task(e.to_string()))??;

        info!(
            table = %state.ident,
            metadata = %state.metadata_path.display(),
            columns = state.schema.columns().len(),
            "Source table resolved"
        );

        Ok(Box::new(WarehouseTable {
            state: Arc::new(state),
        }))
    }
}

/// A table resolved from its current metadata file.
struct WarehouseTable {
    state: Arc<TableState>,
}

#[async_trait]
impl SourceTable for WarehouseTable {
    fn ident(&self) -> &TableIdent {
        &self.state.ident
    }

    fn schema(&self) -> &Arc<SourceSchema> {
        &self.state.schema
    }

    async fn scan(&self) -> Result<SourceBatch> {
        let state = self.state.clone();
        tokio::task::spawn_blocking(move || state.scan())
            .await
            .map_err(|e| CatalogError::Task(e.to_string()))?
    }
}

struct TableState {
    ident: TableIdent,
    dir: PathBuf,
    metadata_path: PathBuf,
    location: String,
    schema: Arc<SourceSchema>,
    snapshot: Option<Snapshot>,
}

impl TableState {
    fn open(ident: TableIdent, dir: PathBuf, names: &TransformColumns) -> Result<Self> {
        if !dir.is_dir() {
            return Err(CatalogError::TableNotFound(ident));
        }

        let Some(metadata_path) = current_metadata_file(&dir.join(METADATA_DIR))? else {
            return Err(CatalogError::TableNotFound(ident));
        };

        let metadata = TableMetadata::read(&metadata_path)?;
        let columns = metadata.current_schema(&metadata_path)?.columns();
        let schema = Arc::new(SourceSchema::resolve(columns, names)?);
        let snapshot = metadata.current_snapshot(&metadata_path)?.cloned();

        Ok(Self {
            ident,
            dir,
            metadata_path,
            location: metadata.location,
            schema,
            snapshot,
        })
    }

    fn scan(&self) -> Result<SourceBatch> {
        let files = self.data_files()?;

        let mut records = Vec::new();
        for file in &files {
            records.extend(read_data_file(file, &self.schema)?);
        }

        info!(
            table = %self.ident,
            files = files.len(),
            rows = records.len(),
            "Source table scanned"
        );

        Ok(SourceBatch {
            schema: self.schema.clone(),
            records,
        })
    }

    /// Live data files of the current snapshot.
    fn data_files(&self) -> Result<Vec<PathBuf>> {
        let Some(snapshot) = &self.snapshot else {
            debug!(table = %self.ident, "Table has no current snapshot");
            return Ok(Vec::new());
        };

        let manifests = match &snapshot.manifest_list {
            Some(list) => {
                let mut paths = Vec::new();
                for manifest in read_manifest_list(&self.resolve(list)?)? {
                    if manifest.content != CONTENT_DATA {
                        return Err(CatalogError::Unsupported(format!(
                            "row-level delete manifest {}",
                            manifest.manifest_path
                        )));
                    }
                    paths.push(manifest.manifest_path);
                }
                paths
            }
            // Format v1 may list manifests inline.
            None => snapshot.manifests.clone(),
        };

        let mut files = Vec::new();
        for manifest in &manifests {
            for data_file in read_live_data_files(&self.resolve(manifest)?)? {
                files.push(self.resolve(&data_file.file_path)?);
            }
        }

        debug!(
            table = %self.ident,
            snapshot_id = snapshot.snapshot_id,
            manifests = manifests.len(),
            files = files.len(),
            "Data files planned"
        );
        Ok(files)
    }

    /// Map a URI recorded in metadata to a local path.
    fn resolve(&self, uri: &str) -> Result<PathBuf> {
        let location = self.location.trim_end_matches('/');
        if let Some(rest) = uri.strip_prefix(location) {
            if rest.is_empty() || rest.starts_with('/') {
                return Ok(self.dir.join(rest.trim_start_matches('/')));
            }
        }
        local_path(uri)
    }
}

/// Strip a `file:` scheme; reject any other scheme.
fn local_path(uri: &str) -> Result<PathBuf> {
    if let Some(rest) = uri.strip_prefix("file://") {
        return Ok(PathBuf::from(rest));
    }
    if let Some(rest) = uri.strip_prefix("file:") {
        return Ok(PathBuf::from(rest));
    }
    if uri.contains("://") {
        return Err(CatalogError::Unsupported(format!(
            "non-local file system for '{}'",
            uri
        )));
    }
    Ok(PathBuf::from(uri))
}

fn current_metadata_file(metadata_dir: &Path) -> Result<Option<PathBuf>> {
    let hint_path = metadata_dir.join(VERSION_HINT_FILE);
    if let Ok(hint) = fs::read_to_string(&hint_path) {
        match hint.trim().parse::<u64>() {
            Ok(version) => {
                let path = metadata_dir.join(format!("v{}.metadata.json", version));
                if path.is_file() {
                    return Ok(Some(path));
                }
                warn!(path = %path.display(), "Version hint points at a missing metadata file");
            }
            Err(_) => warn!(path = %hint_path.display(), "Unreadable version hint"),
        }
    }

    let entries = match fs::read_dir(metadata_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CatalogError::Io {
                path: metadata_dir.to_path_buf(),
                source,
            })
        }
    };

    let mut latest: Option<(u64, PathBuf)> = None;
    for entry in entries {
        let entry = entry.map_err(|source| CatalogError::Io {
            path: metadata_dir.to_path_buf(),
            source,
        })?;
        let Some(version) = entry.file_name().to_str().and_then(metadata_version) else {
            continue;
        };
        if latest.as_ref().map_or(true, |(v, _)| version > *v) {
            latest = Some((version, entry.path()));
        }
    }

    Ok(latest.map(|(_, path)| path))
}

/// `v12.metadata.json` -> 12
fn metadata_version(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix('v')?
        .strip_suffix(".metadata.json")?
        .parse()
        .ok()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TableMetadata {
    format_version: u8,
    location: String,
    current_schema_id: Option<i32>,
    #[serde(default)]
    schemas: Vec<IcebergSchema>,
    /// Format v1 single schema.
    schema: Option<IcebergSchema>,
    current_snapshot_id: Option<i64>,
    #[serde(default)]
    snapshots: Vec<Snapshot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct IcebergSchema {
    #[serde(default)]
    schema_id: i32,
    fields: Vec<SchemaField>,
}

#[derive(Debug, Deserialize)]
struct SchemaField {
    id: i32,
    name: String,
    required: bool,
    #[serde(rename = "type")]
    field_type: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Snapshot {
    snapshot_id: i64,
    manifest_list: Option<String>,
    #[serde(default)]
    manifests: Vec<String>,
}

impl TableMetadata {
    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self> {
        let metadata: TableMetadata =
            serde_json::from_str(content).map_err(|e| CatalogError::Metadata {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        if !(1..=2).contains(&metadata.format_version) {
            return Err(CatalogError::Unsupported(format!(
                "table format version {}",
                metadata.format_version
            )));
        }
        Ok(metadata)
    }

    fn current_schema(&self, path: &Path) -> Result<&IcebergSchema> {
        let schema = match self.current_schema_id {
            Some(id) => self.schemas.iter().find(|s| s.schema_id == id),
            None => self.schema.as_ref().or(self.schemas.last()),
        };
        schema.ok_or_else(|| CatalogError::Metadata {
            path: path.to_path_buf(),
            message: "current schema not found".to_string(),
        })
    }

    fn current_snapshot(&self, path: &Path) -> Result<Option<&Snapshot>> {
        let id = match self.current_snapshot_id {
            None | Some(-1) => return Ok(None),
            Some(id) => id,
        };
        self.snapshots
            .iter()
            .find(|s| s.snapshot_id == id)
            .map(Some)
            .ok_or_else(|| CatalogError::Metadata {
                path: path.to_path_buf(),
                message: format!("current snapshot {} not found", id),
            })
    }
}

impl IcebergSchema {
    /// Columns with a primitive type this stage can carry.
    fn columns(&self) -> Vec<Column> {
        self.fields
            .iter()
            .filter_map(|field| match column_type(&field.field_type) {
                Some(column_type) => Some(Column {
                    name: field.name.clone(),
                    column_type,
                    nullable: !field.required,
                    field_id: Some(field.id),
                }),
                None => {
                    warn!(
                        column = %field.name,
                        field_type = %field.field_type,
                        "Skipping column of unsupported type"
                    );
                    None
                }
            })
            .collect()
    }
}

fn column_type(field_type: &serde_json::Value) -> Option<ColumnType> {
    let name = field_type.as_str()?;
    let column_type = match name {
        "boolean" => ColumnType::Boolean,
        "int" | "long" => ColumnType::Int,
        "float" | "double" => ColumnType::Float,
        "string" => ColumnType::Text,
        "date" => ColumnType::Date,
        "timestamp" | "timestamptz" | "timestamp_ns" | "timestamptz_ns" => ColumnType::Timestamp,
        _ if name.starts_with("decimal(") => ColumnType::Decimal,
        _ => return None,
    };
    Some(column_type)
}
