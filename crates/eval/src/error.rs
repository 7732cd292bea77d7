//! Errors that abort a resolution.
//!
//! Anything recoverable is a [`Diagnostic`](hydroctl_core::Diagnostic) on the
//! [`Resolution`](crate::Resolution) instead.

use hydroctl_core::ControlError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    /// The build state could not be loaded.
    #[error(transparent)]
    Load(#[from] ControlError),

    /// A `Pause` statement was reached under the chosen context.
    #[error("{file}:{line}: paused: {message}")]
    Paused {
        file: String,
        line: u32,
        message: String,
    },

    /// A `<<NAME>>` token survived translation.
    #[error("{file}:{line}: unresolved {token} in `{statement}`")]
    UnresolvedWildcard {
        file: String,
        line: u32,
        statement: String,
        token: String,
    },

    /// A negated scope on a kind that has no `Else` reached resolution.
    #[error("{file}:{line}: {message}")]
    Branch {
        file: String,
        line: u32,
        message: String,
    },

    /// Context arguments could not be parsed.
    #[error("invalid context: {0}")]
    InvalidContext(String),
}

impl ResolveError {
    /// Short machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::Load(_) => "load",
            ResolveError::Paused { .. } => "paused",
            ResolveError::UnresolvedWildcard { .. } => "unresolved_wildcard",
            ResolveError::Branch { .. } => "branch",
            ResolveError::InvalidContext(_) => "invalid_context",
        }
    }

    /// Serialize for CLI `--output json`.
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            ResolveError::Load(e) => e.to_json_value(),
            ResolveError::Paused { file, line, .. }
            | ResolveError::UnresolvedWildcard { file, line, .. }
            | ResolveError::Branch { file, line, .. } => serde_json::json!({
                "file":    file,
                "kind":    self.kind(),
                "line":    line,
                "message": self.to_string(),
            }),
            ResolveError::InvalidContext(_) => serde_json::json!({
                "file":    "",
                "kind":    self.kind(),
                "line":    0,
                "message": self.to_string(),
            }),
        }
    }
}
