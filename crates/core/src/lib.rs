//! hydroctl-core: reader for hydraulic-model control files.
//!
//! Turns a tree of `Command == Value` control files with nested `If` /
//! `Define` blocks into a [`BuildState`]: every statement of every variant,
//! each tagged with the [`ScopeList`] it is in force under. Edits, undo and
//! re-serialization back to block syntax live here too; resolving a build
//! state against one concrete run is the job of `hydroctl-eval`.
//!
//! # Public API
//!
//! - [`load_build_state()`] -- read a root file and everything it references
//! - [`BuildState`] -- the loaded tree; [`BuildState::apply_edit`],
//!   [`BuildState::undo`], [`BuildState::to_text`], [`BuildState::write_versioned`]
//! - [`Scope`], [`ScopeList`] -- scope algebra
//! - [`expand`] -- variable and wildcard substitution
//! - [`SourceProvider`] -- file I/O seam, with [`FileSystemProvider`] and
//!   [`InMemoryProvider`]
//! - [`ControlError`], [`Diagnostic`] -- fatal and recoverable failures

pub mod ast;
pub mod build_state;
pub mod edit;
pub mod error;
pub mod expand;
pub mod external;
pub mod lexer;
pub mod pass1_load;
pub mod pass2_file_scopes;
pub mod scope;
pub mod source;
pub mod tracker;
pub mod writer;

// ── Convenience re-exports: key types ────────────────────────────────

pub use ast::{
    ChildContent, ChildRef, ControlFileKind, Provenance, Statement, StatementId, StatementKind,
    ValueKind,
};
pub use build_state::BuildState;
pub use edit::{Edit, UndoRecord};
pub use error::{ControlError, Diagnostic, ErrorKind};
pub use expand::VariableMap;
pub use external::{
    CsvDatabase, GeometryLayerSource, GeometryTag, SuffixGeometrySource, Table, TabularDatabase,
};
pub use lexer::{DefaultLineParser, Line, LineParser, RunningConfig};
pub use scope::{BlockSource, Scope, ScopeKind, ScopeList};
pub use source::{FileSystemProvider, InMemoryProvider, SourceProvider};

// ── Convenience re-exports: entry points ─────────────────────────────

pub use pass1_load::{load_build_state, parse_build_state, LoaderConfig};
pub use writer::write_statements;
