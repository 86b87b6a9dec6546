// src/table/mod.rs

use arrow::json::{writer::JsonArray, WriterBuilder};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Component, Path, PathBuf},
};
use tracing::{info, instrument};
use walkdir::WalkDir;

use crate::error::{Error, Result};

pub mod clean;
pub mod read;

pub use clean::drop_null_rows;

/// File formats the reader understands, keyed by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Csv,
    Tsv,
    Spreadsheet,
    Json,
    JsonLines,
    Parquet,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Format::Csv),
            "tsv" => Some(Format::Tsv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(Format::Spreadsheet),
            "json" => Some(Format::Json),
            "jsonl" | "ndjson" => Some(Format::JsonLines),
            "parquet" => Some(Format::Parquet),
            _ => None,
        }
    }
}

/// A parsed file: one record batch plus where it came from.
#[derive(Debug, Clone)]
pub struct Table {
    pub filename: String,
    pub format: Format,
    pub batch: RecordBatch,
}

impl Table {
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// First `limit` rows as JSON objects, nulls kept explicit.
    pub fn preview(&self, limit: usize) -> Result<Preview> {
        let head = self.batch.slice(0, limit.min(self.num_rows()));
        Ok(Preview {
            filename: self.filename.clone(),
            format: self.format,
            columns: self.column_names(),
            total_rows: self.num_rows(),
            rows: to_records(&head)?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct Preview {
    pub filename: String,
    pub format: Format,
    pub columns: Vec<String>,
    pub total_rows: usize,
    pub rows: Vec<Map<String, Value>>,
}

/// Serialize every row of `batch` into a JSON object.
pub fn to_records(batch: &RecordBatch) -> Result<Vec<Map<String, Value>>> {
    if batch.num_rows() == 0 {
        return Ok(Vec::new());
    }

    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());
    writer
        .write(batch)
        .map_err(|e| Error::Internal(format!("encoding rows as JSON: {e}")))?;
    writer
        .finish()
        .map_err(|e| Error::Internal(format!("encoding rows as JSON: {e}")))?;
    let buf = writer.into_inner();

    serde_json::from_slice(&buf).map_err(|e| Error::Internal(format!("decoding row JSON: {e}")))
}

/// Map a request file name onto an existing regular file under `base_dir`.
///
/// Only plain relative paths are accepted: no root, no `..`, no `.`.
pub fn resolve(base_dir: &Path, filename: &str) -> Result<PathBuf> {
    let rel = Path::new(filename);
    if filename.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(Error::InvalidInput(format!("invalid file name '{filename}'")));
    }

    let path = base_dir.join(rel);
    match fs::metadata(&path) {
        Ok(meta) if meta.is_file() => Ok(path),
        _ => Err(Error::FileNotFound(filename.to_string())),
    }
}

/// Locate `filename` under `base_dir`, detect its format and parse it.
#[instrument(level = "info", skip(base_dir), fields(dir = %base_dir.display()))]
pub fn read_table(base_dir: &Path, filename: &str) -> Result<Table> {
    // extension is checked before existence
    let format = Format::from_path(Path::new(filename))
        .ok_or_else(|| Error::UnsupportedFormat(filename.to_string()))?;
    let path = resolve(base_dir, filename)?;

    let batch = read::read_batch(&path, filename, format)?;
    info!(
        format = ?format,
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        "parsed table"
    );

    Ok(Table {
        filename: filename.to_string(),
        format,
        batch,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub size_bytes: u64,
    pub format: Option<Format>,
}

/// Regular files under `base_dir` (recursively), sorted by relative name.
/// A missing directory lists as empty.
pub fn list_files(base_dir: &Path) -> Result<Vec<FileEntry>> {
    if !base_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(base_dir).min_depth(1) {
        let entry =
            entry.map_err(|e| Error::Internal(format!("listing {}: {e}", base_dir.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(base_dir).unwrap_or(entry.path());
        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        entries.push(FileEntry {
            name: rel.to_string_lossy().replace('\\', "/"),
            size_bytes,
            format: Format::from_path(rel),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
