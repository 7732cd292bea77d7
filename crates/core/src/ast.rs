//! Statement model shared by the loader, the writer and the resolver.
//!
//! One [`Statement`] per source line (block headers excluded: those live on
//! as the statements' scopes). Every statement carries a content-addressed
//! [`StatementId`] that survives reordering and rewriting.

use crate::external::Table;
use crate::lexer::{DefaultLineParser, LineParser, RunningConfig};
use crate::scope::ScopeList;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

// ──────────────────────────────────────────────
// Provenance
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub file: String,
    pub line: u32,
}

// ──────────────────────────────────────────────
// Classification
// ──────────────────────────────────────────────

/// The closed set of control-file kinds a model tree is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ControlFileKind {
    /// Root control file (`.tcf`).
    Tcf,
    /// Geometry control file (`.tgc`).
    Tgc,
    /// Boundary-condition control file (`.tbc`).
    Tbc,
    /// 1D (ESTRY) control file (`.ecf`).
    Ecf,
    /// Event file (`.tef`): the event database.
    Tef,
    /// Read file (`.trd`): inlined into its parent.
    Trd,
    /// Operating controls (`.toc`).
    Toc,
    /// Rainfall control file (`.trfc`).
    Trfc,
    /// Quadtree control file (`.qcf`).
    Qcf,
    /// Advection-dispersion control file (`.adcf`).
    Adcf,
    Other,
}

impl ControlFileKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "tcf" => ControlFileKind::Tcf,
            "tgc" => ControlFileKind::Tgc,
            "tbc" => ControlFileKind::Tbc,
            "ecf" => ControlFileKind::Ecf,
            "tef" => ControlFileKind::Tef,
            "trd" => ControlFileKind::Trd,
            "toc" => ControlFileKind::Toc,
            "trfc" => ControlFileKind::Trfc,
            "qcf" => ControlFileKind::Qcf,
            "adcf" => ControlFileKind::Adcf,
            _ => ControlFileKind::Other,
        }
    }

    /// Kind implied by the referencing command, if the command names one.
    pub fn from_command(command: &str) -> Option<Self> {
        let c = command.to_ascii_lowercase();
        let kind = if c.starts_with("geometry control file") {
            ControlFileKind::Tgc
        } else if c.starts_with("bc control file") {
            ControlFileKind::Tbc
        } else if c.starts_with("estry control file") {
            ControlFileKind::Ecf
        } else if c == "event file" {
            ControlFileKind::Tef
        } else if c == "read operating controls file" {
            ControlFileKind::Toc
        } else if c.starts_with("rainfall control file") {
            ControlFileKind::Trfc
        } else if c.starts_with("quadtree control file") {
            ControlFileKind::Qcf
        } else if c.starts_with("ad control file") {
            ControlFileKind::Adcf
        } else if c == "read file" {
            ControlFileKind::Trd
        } else {
            return None;
        };
        Some(kind)
    }
}

/// What a statement does, decided once at classification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatementKind {
    Setting,
    GisReference,
    GridReference,
    DatabaseReference,
    ControlFileReference(ControlFileKind),
    FolderReference,
    Comment,
    /// An empty line, kept so re-serialization reproduces it.
    Blank,
    /// Zero-content entry standing in for an empty block branch.
    Placeholder,
}

impl StatementKind {
    /// The value names one or more files.
    pub fn references_file(self) -> bool {
        matches!(
            self,
            StatementKind::GisReference
                | StatementKind::GridReference
                | StatementKind::DatabaseReference
                | StatementKind::ControlFileReference(_)
        )
    }

    /// The value names a file whose content is loaded as a child.
    pub fn has_child(self) -> bool {
        matches!(
            self,
            StatementKind::DatabaseReference | StatementKind::ControlFileReference(_)
        )
    }
}

/// Coarse classification of a statement value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ValueKind {
    Number(f64),
    NumberTuple(Vec<f64>),
    File,
    Folder,
    Text,
}

const FILE_EXTENSIONS: &[&str] = &[
    "tcf", "tgc", "tbc", "ecf", "tef", "trd", "toc", "trfc", "qcf", "adcf", "csv", "shp", "mif",
    "gpkg", "asc", "flt", "tif", "tiff", "nc", "txt", "dat", "tmf", "tsoilf",
];

impl ValueKind {
    pub fn classify(value: &str, statement: StatementKind) -> ValueKind {
        let v = value.trim();
        if let Ok(n) = v.parse::<f64>() {
            return ValueKind::Number(n);
        }
        let parts: Vec<&str> = v
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() > 1 {
            let nums: Result<Vec<f64>, _> = parts.iter().map(|p| p.parse::<f64>()).collect();
            if let Ok(nums) = nums {
                return ValueKind::NumberTuple(nums);
            }
        }
        if statement == StatementKind::FolderReference {
            return ValueKind::Folder;
        }
        if statement.references_file() {
            return ValueKind::File;
        }
        let first = v.split('|').next().unwrap_or(v);
        let first = first.split(">>").next().unwrap_or(first).trim();
        let ext = Path::new(first)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        match ext {
            Some(ext) if FILE_EXTENSIONS.contains(&ext.as_str()) => ValueKind::File,
            _ if v.ends_with('\\') || v.ends_with('/') => ValueKind::Folder,
            _ => ValueKind::Text,
        }
    }
}

// ──────────────────────────────────────────────
// Identity
// ──────────────────────────────────────────────

/// Content-addressed identity of a statement: a digest of the file name, the
/// statement text, and its ordinal among identical lines of that file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StatementId(String);

impl StatementId {
    pub fn compute(file: &str, text: &str, ordinal: usize) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(file.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.trim().as_bytes());
        hasher.update([0u8]);
        hasher.update(ordinal.to_le_bytes());
        let digest = hasher.finalize();
        let hex: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
        StatementId(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StatementId {
    fn from(s: &str) -> Self {
        StatementId(s.to_owned())
    }
}

// ──────────────────────────────────────────────
// Statements
// ──────────────────────────────────────────────

/// One loaded child of a referencing statement.
#[derive(Debug, Clone, Serialize)]
pub struct ChildRef {
    pub path: PathBuf,
    /// Scopes discovered for this particular match of a wildcard reference.
    pub scope: ScopeList,
    pub content: ChildContent,
}

#[derive(Debug, Clone, Serialize)]
pub enum ChildContent {
    ControlFile(Box<crate::BuildState>),
    Database(Table),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Statement {
    pub id: StatementId,
    /// Line text without indentation or trailing whitespace.
    pub raw: String,
    pub command: Option<String>,
    pub value: Option<String>,
    pub comment: Option<String>,
    pub kind: StatementKind,
    pub scope: ScopeList,
    pub prov: Provenance,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChildRef>,
}

impl Statement {
    /// A zero-content statement holding only a scope.
    pub fn placeholder(id_file: &str, scope: ScopeList, prov: Provenance, ordinal: usize) -> Self {
        Statement {
            id: StatementId::compute(id_file, &format!("\u{0}placeholder {}", scope), ordinal),
            raw: String::new(),
            command: None,
            value: None,
            comment: None,
            kind: StatementKind::Placeholder,
            scope,
            prov,
            children: Vec::new(),
        }
    }

    /// Re-classify `raw` into a new statement carrying `id`.
    pub fn reparse(id: StatementId, raw: &str, scope: ScopeList, prov: Provenance) -> Self {
        let line = DefaultLineParser.classify(raw, &RunningConfig::default());
        Statement {
            id,
            raw: raw.trim().to_owned(),
            command: line.command.clone(),
            value: line.value.clone(),
            comment: line.comment.clone(),
            kind: line.statement_kind(),
            scope,
            prov,
            children: Vec::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == StatementKind::Placeholder
    }

    pub fn is_content(&self) -> bool {
        !matches!(
            self.kind,
            StatementKind::Placeholder | StatementKind::Blank | StatementKind::Comment
        )
    }

    fn command_lower(&self) -> String {
        self.command
            .as_deref()
            .map(|c| c.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// `Set Variable NAME == value` → `(NAME, value)`.
    pub fn variable(&self) -> Option<(String, String)> {
        let command = self.command.as_deref()?;
        let words: Vec<&str> = command.split_whitespace().collect();
        if words.len() == 3
            && words[0].eq_ignore_ascii_case("set")
            && words[1].eq_ignore_ascii_case("variable")
        {
            return Some((words[2].to_owned(), self.value.clone().unwrap_or_default()));
        }
        None
    }

    pub fn is_pause(&self) -> bool {
        self.command_lower() == "pause"
    }

    /// Names from `Model Scenarios == A | B`.
    pub fn scenario_declaration(&self) -> Option<Vec<String>> {
        (self.command_lower() == "model scenarios").then(|| self.value_list())
    }

    /// Names from `Model Events == A | B`.
    pub fn event_declaration(&self) -> Option<Vec<String>> {
        (self.command_lower() == "model events").then(|| self.value_list())
    }

    /// The value split on `|`.
    pub fn value_list(&self) -> Vec<String> {
        self.value
            .as_deref()
            .unwrap_or("")
            .split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub fn value_kind(&self) -> Option<ValueKind> {
        self.value
            .as_deref()
            .map(|v| ValueKind::classify(v, self.kind))
    }

    /// The same statement with new text, keeping identity, scope and position.
    pub fn rewritten(&self, raw: &str) -> Statement {
        Statement::reparse(self.id.clone(), raw, self.scope.clone(), self.prov.clone())
    }

    /// `Command == value ! comment` rebuilt from the parts.
    pub fn compose(command: &str, value: Option<&str>, comment: Option<&str>) -> String {
        let mut text = command.trim().to_owned();
        if let Some(v) = value {
            text.push_str(" == ");
            text.push_str(v.trim());
        }
        if let Some(c) = comment {
            text.push_str(" ! ");
            text.push_str(c.trim());
        }
        text
    }
}
