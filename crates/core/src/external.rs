//! Collaborators for data the engine references but does not interpret:
//! tabular databases and GIS layers.

use crate::source::SourceProvider;
use serde::Serialize;
use std::io;
use std::path::Path;

// ──────────────────────────────────────────────
// Tabular databases
// ──────────────────────────────────────────────

/// A loaded tabular database: the first row is the header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        if rows.is_empty() {
            return Table::default();
        }
        let header = rows.remove(0);
        Table { header, rows }
    }
}

/// Reads a database file referenced by a statement.
pub trait TabularDatabase {
    fn rows(&self, path: &Path, provider: &dyn SourceProvider) -> io::Result<Vec<Vec<String>>>;
}

/// CSV databases (`bc_dbase.csv`, `materials.csv`, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvDatabase;

impl TabularDatabase for CsvDatabase {
    fn rows(&self, path: &Path, provider: &dyn SourceProvider) -> io::Result<Vec<Vec<String>>> {
        let text = provider.read_source(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'!'))
            .from_reader(text.as_bytes());
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{}: {}", path.display(), e),
                )
            })?;
            rows.push(record.iter().map(|f| f.trim().to_owned()).collect());
        }
        Ok(rows)
    }
}

// ──────────────────────────────────────────────
// GIS layers
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GeometryTag {
    Point,
    Line,
    Region,
    Unknown,
}

impl GeometryTag {
    pub fn suffix(self) -> &'static str {
        match self {
            GeometryTag::Point => "_P",
            GeometryTag::Line => "_L",
            GeometryTag::Region => "_R",
            GeometryTag::Unknown => "",
        }
    }
}

/// Answers questions about GIS inputs without the engine reading them.
pub trait GeometryLayerSource {
    /// Geometry types present in a layer.
    fn enumerate_geometry_types(&self, path: &Path) -> io::Result<Vec<GeometryTag>>;

    /// Split a GIS reference into `(database, layer)`.
    fn resolve_database_path(&self, value: &str) -> (String, String);
}

/// Infers geometry from the conventional `_P` / `_L` / `_R` name suffix and
/// splits `db.gpkg >> layer` references. Never touches the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuffixGeometrySource;

impl GeometryLayerSource for SuffixGeometrySource {
    fn enumerate_geometry_types(&self, path: &Path) -> io::Result<Vec<GeometryTag>> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_ascii_uppercase())
            .unwrap_or_default();
        let tag = [GeometryTag::Point, GeometryTag::Line, GeometryTag::Region]
            .into_iter()
            .find(|t| stem.ends_with(t.suffix()))
            .unwrap_or(GeometryTag::Unknown);
        Ok(vec![tag])
    }

    fn resolve_database_path(&self, value: &str) -> (String, String) {
        match value.split_once(">>") {
            Some((db, layer)) => (db.trim().to_owned(), layer.trim().to_owned()),
            None => {
                let db = value.trim().to_owned();
                let layer = Path::new(&db.replace('\\', "/"))
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (db, layer)
            }
        }
    }
}
