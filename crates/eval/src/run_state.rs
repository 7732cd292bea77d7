//! The resolved configuration: one concrete run, no scopes left.

use hydroctl_core::lexer::command_key;
use hydroctl_core::{
    ControlFileKind, Diagnostic, GeometryTag, Provenance, Statement, StatementId, StatementKind,
    Table, ValueKind,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// One GIS layer named by a `Read GIS` statement, split per geometry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GisLayer {
    pub database: PathBuf,
    pub layer: String,
    pub geometry: Vec<GeometryTag>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RunChild {
    ControlFile(RunState),
    Database(Table),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatement {
    pub id: StatementId,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub kind: StatementKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_kind: Option<ValueKind>,
    pub prov: Provenance,
    /// Files the value names, resolved against the referencing file.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<GisLayer>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RunChild>,
}

impl RunStatement {
    pub(crate) fn from_statement(statement: &Statement, command: String, value: Option<String>) -> Self {
        let value_kind = value
            .as_deref()
            .map(|v| ValueKind::classify(v, statement.kind));
        RunStatement {
            id: statement.id.clone(),
            command,
            value,
            kind: statement.kind,
            value_kind,
            prov: statement.prov.clone(),
            files: Vec::new(),
            layers: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text(&self) -> String {
        Statement::compose(&self.command, self.value.as_deref(), None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunState {
    pub path: PathBuf,
    pub kind: ControlFileKind,
    /// The context this file was resolved under, `-s1 D01 -e1 Q100` form.
    pub context: String,
    pub statements: Vec<RunStatement>,
}

impl RunState {
    /// Every file the run reads, children included.
    pub fn files(&self) -> BTreeSet<PathBuf> {
        let mut out = BTreeSet::new();
        self.collect_files(&mut out);
        out
    }

    fn collect_files(&self, out: &mut BTreeSet<PathBuf>) {
        for statement in &self.statements {
            out.extend(statement.files.iter().cloned());
            for child in &statement.children {
                if let RunChild::ControlFile(state) = child {
                    out.insert(state.path.clone());
                    state.collect_files(out);
                }
            }
        }
    }

    /// Resolved statements as plain `Command == Value` lines. Child control
    /// files follow, each under a `! path` comment line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for statement in &self.statements {
            out.push_str(&statement.text());
            out.push('\n');
        }
        for child in self.child_states() {
            out.push_str(&format!("\n! {}\n", child.path.display()));
            out.push_str(&child.to_text());
        }
        out
    }

    /// Resolved control-file children in reference order.
    pub fn child_states(&self) -> impl Iterator<Item = &RunState> {
        self.statements
            .iter()
            .flat_map(|s| s.children.iter())
            .filter_map(|c| match c {
                RunChild::ControlFile(state) => Some(state),
                RunChild::Database(_) => None,
            })
    }

    /// Value of the last statement with this command in this file.
    pub fn value_of(&self, command: &str) -> Option<&str> {
        let key = command_key(command);
        self.statements
            .iter()
            .rev()
            .find(|s| command_key(&s.command) == key)
            .and_then(|s| s.value.as_deref())
    }
}

/// A run state plus the recoverable failures met while producing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub run_state: RunState,
    pub diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}
