use serde::{Deserialize, Serialize};

/// Which stage of reading a control file rejected it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The file (or a directory it lives in) could not be read.
    Io,
    /// Block structure is malformed: unmatched `End If`, unclosed block, ...
    Syntax,
    /// `Else` / `Else If` attempted on a block kind that cannot branch.
    Branch,
    /// A scoped statement sequence cannot be turned back into block syntax.
    Reserialize,
    /// An edit referenced a statement that does not exist, or is not applicable.
    Edit,
}

/// A located control-file error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{file}:{line}: {message}")]
pub struct ControlError {
    pub kind: ErrorKind,
    pub file: String,
    pub line: u32,
    pub message: String,
}

impl ControlError {
    pub fn new(kind: ErrorKind, file: &str, line: u32, message: impl Into<String>) -> Self {
        ControlError {
            kind,
            file: file.to_owned(),
            line,
            message: message.into(),
        }
    }

    pub fn io(file: &str, message: impl Into<String>) -> Self {
        ControlError::new(ErrorKind::Io, file, 0, message)
    }

    pub fn syntax(file: &str, line: u32, message: impl Into<String>) -> Self {
        ControlError::new(ErrorKind::Syntax, file, line, message)
    }

    pub fn branch(file: &str, line: u32, message: impl Into<String>) -> Self {
        ControlError::new(ErrorKind::Branch, file, line, message)
    }

    pub fn reserialize(file: &str, line: u32, message: impl Into<String>) -> Self {
        ControlError::new(ErrorKind::Reserialize, file, line, message)
    }

    pub fn edit(message: impl Into<String>) -> Self {
        ControlError::new(ErrorKind::Edit, "", 0, message)
    }

    /// Serialize for CLI `--output json`. All fields are always present.
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "file":    self.file,
            "kind":    self.kind,
            "line":    self.line,
            "message": self.message,
        })
    }
}

/// A recoverable, statement-scoped failure.
///
/// Loading and resolution keep going after one of these; the caller gets the
/// best-effort result plus the accumulated list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Context the failure happened under, e.g. `-s1 D01 -e1 Q100`.
    /// Empty while loading the build state.
    pub context: String,
    pub file: String,
    pub line: u32,
    /// Raw text of the offending statement, if there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    pub reason: String,
}

impl Diagnostic {
    pub fn new(file: &str, line: u32, statement: Option<&str>, reason: impl Into<String>) -> Self {
        Diagnostic {
            context: String::new(),
            file: file.to_owned(),
            line,
            statement: statement.map(str::to_owned),
            reason: reason.into(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.reason)?;
        if let Some(stmt) = &self.statement {
            write!(f, " [{}]", stmt)?;
        }
        if !self.context.is_empty() {
            write!(f, " ({})", self.context)?;
        }
        Ok(())
    }
}
