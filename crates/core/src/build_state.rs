//! The build state: one loaded control file with every variant present.

use crate::ast::{ChildContent, ControlFileKind, Statement, StatementId};
use crate::edit::{self, Edit, EditLog, UndoRecord};
use crate::error::{ControlError, Diagnostic};
use crate::source::SourceProvider;
use crate::writer;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct BuildState {
    pub path: PathBuf,
    pub kind: ControlFileKind,
    pub statements: Vec<Statement>,
    /// Recoverable failures met while loading this file (children excluded).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(skip)]
    log: EditLog,
}

impl BuildState {
    pub fn new(
        path: PathBuf,
        kind: ControlFileKind,
        statements: Vec<Statement>,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        BuildState {
            path,
            kind,
            statements,
            diagnostics,
            log: EditLog::default(),
        }
    }

    /// Name used in provenance and error messages.
    pub fn file_name(&self) -> String {
        self.path.display().to_string()
    }

    pub fn find(&self, id: &StatementId) -> Option<&Statement> {
        self.statements.iter().find(|s| &s.id == id)
    }

    /// Loaded child control files, depth first.
    pub fn children(&self) -> impl Iterator<Item = &BuildState> {
        self.statements
            .iter()
            .flat_map(|s| s.children.iter())
            .filter_map(|c| match &c.content {
                ChildContent::ControlFile(bs) => Some(bs.as_ref()),
                _ => None,
            })
    }

    /// Diagnostics of this file and every loaded child.
    pub fn all_diagnostics(&self) -> Vec<Diagnostic> {
        let mut out = self.diagnostics.clone();
        for child in self.children() {
            out.extend(child.all_diagnostics());
        }
        out
    }

    /// Applied edits, oldest first.
    pub fn edits(&self) -> impl Iterator<Item = &Edit> {
        self.log.edits()
    }

    /// A new build state with `edit` applied, plus the record that undoes it.
    /// The original is left untouched.
    pub fn apply_edit(&self, edit: Edit) -> Result<(BuildState, UndoRecord), ControlError> {
        let mut next = self.clone();
        let file = self
            .path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let undo = edit::apply(&mut next.statements, &file, &edit)?;
        tracing::debug!(file = %self.file_name(), ?edit, "edit applied");
        next.log.push(edit, undo.clone());
        Ok((next, undo))
    }

    /// A new build state with the most recent edit reverted.
    pub fn undo(&self) -> Result<BuildState, ControlError> {
        let mut next = self.clone();
        let Some((edit, undo)) = next.log.pop() else {
            return Err(ControlError::edit("nothing to undo"));
        };
        edit::revert(&mut next.statements, undo)?;
        tracing::debug!(file = %self.file_name(), ?edit, "edit undone");
        Ok(next)
    }

    /// Re-serialize the statements into control-file text.
    pub fn to_text(&self) -> Result<String, ControlError> {
        writer::write_statements(&self.statements, &self.file_name())
    }

    /// Write the re-serialized text next to the source under the next free
    /// versioned name (`model_002.tcf` after `model_001.tcf`, `model_001.tcf`
    /// after `model.tcf`). Returns the path written.
    pub fn write_versioned(&self, provider: &dyn SourceProvider) -> Result<PathBuf, ControlError> {
        let text = self.to_text()?;
        let mut target = versioned_path(&self.path);
        while provider.exists(&target) {
            target = versioned_path(&target);
        }
        provider
            .write_source(&target, &text)
            .map_err(|e| ControlError::io(&target.display().to_string(), e.to_string()))?;
        tracing::debug!(from = %self.file_name(), to = %target.display(), "written");
        Ok(target)
    }
}

/// `name_007.ext` → `name_008.ext`; `name.ext` → `name_001.ext`. The digit
/// width of an existing suffix is kept.
pub fn versioned_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

    let name = match stem.rsplit_once('_') {
        Some((base, digits))
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) =>
        {
            let next = digits.parse::<u64>().unwrap_or(0) + 1;
            format!("{}_{:0width$}", base, next, width = digits.len())
        }
        _ => format!("{}_001", stem),
    };
    let file = match ext {
        Some(ext) => format!("{}.{}", name, ext),
        None => name,
    };
    path.with_file_name(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versioned_path_increments_keeping_width() {
        assert_eq!(
            versioned_path(Path::new("/m/model_009.tcf")),
            PathBuf::from("/m/model_010.tcf")
        );
        assert_eq!(
            versioned_path(Path::new("/m/model_99.tcf")),
            PathBuf::from("/m/model_100.tcf")
        );
        assert_eq!(
            versioned_path(Path::new("/m/model.tcf")),
            PathBuf::from("/m/model_001.tcf")
        );
        assert_eq!(
            versioned_path(Path::new("/m/M01_5m_HPC.tgc")),
            PathBuf::from("/m/M01_5m_HPC_001.tgc")
        );
    }
}
