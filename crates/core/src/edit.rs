//! Edits to a loaded control file, addressed by statement identity.
//!
//! Every applied edit yields an [`UndoRecord`] describing its inverse, also
//! by identity, so undoing never depends on positions that earlier edits may
//! have shifted.

use crate::ast::{Provenance, Statement, StatementId, StatementKind};
use crate::error::ControlError;
use crate::lexer::{DefaultLineParser, LineParser, RunningConfig};
use crate::scope::ScopeList;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub enum Edit {
    /// Turn a statement into a comment line (`! <text>`).
    CommentOut(StatementId),
    /// Turn a commented-out statement back into a live one.
    Uncomment(StatementId),
    /// Insert a new line after `after` (at the top when `None`). The scope
    /// defaults to that of `after`.
    Insert {
        after: Option<StatementId>,
        text: String,
        scope: Option<ScopeList>,
    },
    Remove(StatementId),
    ChangeScope { id: StatementId, scope: ScopeList },
    UpdateValue { id: StatementId, value: String },
}

/// The inverse of one applied edit.
#[derive(Debug, Clone, Serialize)]
pub enum UndoRecord {
    /// Put `previous` back in place of the statement with the same id.
    Restore { previous: Statement },
    /// Re-insert a removed statement after `after` (at the top when `None`).
    Reinsert {
        after: Option<StatementId>,
        previous: Statement,
    },
    /// Delete an inserted statement.
    Delete { id: StatementId },
}

/// Append-only history of applied edits.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EditLog {
    entries: Vec<(Edit, UndoRecord)>,
}

impl EditLog {
    pub fn push(&mut self, edit: Edit, undo: UndoRecord) {
        self.entries.push((edit, undo));
    }

    pub fn pop(&mut self) -> Option<(Edit, UndoRecord)> {
        self.entries.pop()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn edits(&self) -> impl Iterator<Item = &Edit> {
        self.entries.iter().map(|(e, _)| e)
    }
}

fn position(statements: &[Statement], id: &StatementId) -> Result<usize, ControlError> {
    statements
        .iter()
        .position(|s| &s.id == id)
        .ok_or_else(|| ControlError::edit(format!("no statement with id {}", id)))
}

fn insert_index(statements: &[Statement], after: Option<&StatementId>) -> Result<usize, ControlError> {
    match after {
        Some(id) => Ok(position(statements, id)? + 1),
        None => Ok(0),
    }
}

/// An id for new text that no existing statement carries.
fn fresh_id(statements: &[Statement], file: &str, text: &str) -> StatementId {
    let mut ordinal = statements.iter().filter(|s| s.raw == text.trim()).count();
    loop {
        let id = StatementId::compute(file, text, ordinal);
        if statements.iter().all(|s| s.id != id) {
            return id;
        }
        ordinal += 1;
    }
}

fn reject_header(text: &str) -> Result<(), ControlError> {
    let line = DefaultLineParser.classify(text, &RunningConfig::default());
    if line.is_header() {
        return Err(ControlError::edit(format!(
            "'{}' is block structure; change a statement's scope instead",
            text.trim()
        )));
    }
    Ok(())
}

/// Apply `edit` in place; return its inverse.
pub fn apply(
    statements: &mut Vec<Statement>,
    file: &str,
    edit: &Edit,
) -> Result<UndoRecord, ControlError> {
    match edit {
        Edit::CommentOut(id) => {
            let i = position(statements, id)?;
            let previous = statements[i].clone();
            if previous.kind == StatementKind::Comment {
                return Err(ControlError::edit(format!("statement {} is already a comment", id)));
            }
            if !previous.is_content() {
                return Err(ControlError::edit(format!("statement {} has no text to comment out", id)));
            }
            statements[i] = previous.rewritten(&format!("! {}", previous.raw));
            Ok(UndoRecord::Restore { previous })
        }
        Edit::Uncomment(id) => {
            let i = position(statements, id)?;
            let previous = statements[i].clone();
            if previous.kind != StatementKind::Comment {
                return Err(ControlError::edit(format!("statement {} is not a comment", id)));
            }
            let text = previous.raw.trim_start_matches(['!', '#']).trim();
            reject_header(text)?;
            statements[i] = previous.rewritten(text);
            Ok(UndoRecord::Restore { previous })
        }
        Edit::Insert { after, text, scope } => {
            reject_header(text)?;
            let index = insert_index(statements, after.as_ref())?;
            let scope = match (scope, index) {
                (Some(s), _) => s.with_global(),
                (None, 0) => ScopeList::global(),
                (None, i) => statements[i - 1].scope.clone(),
            };
            let line = match index {
                0 => 0,
                i => statements[i - 1].prov.line,
            };
            let id = fresh_id(statements, file, text);
            let prov = Provenance {
                file: file.to_owned(),
                line,
            };
            statements.insert(index, Statement::reparse(id.clone(), text, scope, prov));
            Ok(UndoRecord::Delete { id })
        }
        Edit::Remove(id) => {
            let i = position(statements, id)?;
            let after = i.checked_sub(1).map(|p| statements[p].id.clone());
            let previous = statements.remove(i);
            Ok(UndoRecord::Reinsert { after, previous })
        }
        Edit::ChangeScope { id, scope } => {
            let i = position(statements, id)?;
            let previous = statements[i].clone();
            statements[i].scope = scope.with_global();
            Ok(UndoRecord::Restore { previous })
        }
        Edit::UpdateValue { id, value } => {
            let i = position(statements, id)?;
            let previous = statements[i].clone();
            let Some(command) = previous.command.as_deref() else {
                return Err(ControlError::edit(format!("statement {} has no command", id)));
            };
            let text = Statement::compose(command, Some(value), previous.comment.as_deref());
            statements[i] = previous.rewritten(&text);
            Ok(UndoRecord::Restore { previous })
        }
    }
}

/// Apply the inverse recorded by [`apply`].
pub fn revert(statements: &mut Vec<Statement>, undo: UndoRecord) -> Result<(), ControlError> {
    match undo {
        UndoRecord::Restore { previous } => {
            let i = position(statements, &previous.id)?;
            statements[i] = previous;
        }
        UndoRecord::Reinsert { after, previous } => {
            let index = insert_index(statements, after.as_ref())?;
            statements.insert(index, previous);
        }
        UndoRecord::Delete { id } => {
            let i = position(statements, &id)?;
            statements.remove(i);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{Scope, ScopeKind};

    fn stmts(lines: &[&str]) -> Vec<Statement> {
        lines
            .iter()
            .enumerate()
            .map(|(i, l)| {
                Statement::reparse(
                    StatementId::compute("t.tcf", l, 0),
                    l,
                    ScopeList::global(),
                    Provenance {
                        file: "t.tcf".into(),
                        line: i as u32 + 1,
                    },
                )
            })
            .collect()
    }

    fn raws(s: &[Statement]) -> Vec<&str> {
        s.iter().map(|s| s.raw.as_str()).collect()
    }

    #[test]
    fn comment_out_keeps_identity_and_undoes() {
        let mut s = stmts(&["Cell Size == 5", "Timestep == 2"]);
        let id = s[0].id.clone();
        let undo = apply(&mut s, "t.tcf", &Edit::CommentOut(id.clone())).unwrap();
        assert_eq!(s[0].raw, "! Cell Size == 5");
        assert_eq!(s[0].kind, StatementKind::Comment);
        assert_eq!(s[0].id, id);

        let again = apply(&mut s, "t.tcf", &Edit::Uncomment(id.clone())).unwrap();
        assert_eq!(s[0].raw, "Cell Size == 5");
        revert(&mut s, again).unwrap();
        revert(&mut s, undo).unwrap();
        assert_eq!(raws(&s), vec!["Cell Size == 5", "Timestep == 2"]);
    }

    #[test]
    fn insert_inherits_scope_of_predecessor() {
        let mut s = stmts(&["A == 1", "B == 2"]);
        s[0].scope = ScopeList::new(vec![Scope::global(), Scope::new(ScopeKind::Scenario, ["D01"])]);
        let first = s[0].id.clone();
        let undo = apply(
            &mut s,
            "t.tcf",
            &Edit::Insert {
                after: Some(first),
                text: "C == 3".into(),
                scope: None,
            },
        )
        .unwrap();
        assert_eq!(raws(&s), vec!["A == 1", "C == 3", "B == 2"]);
        assert_eq!(s[1].scope.to_string(), "Global & Scenario(D01)");
        revert(&mut s, undo).unwrap();
        assert_eq!(raws(&s), vec!["A == 1", "B == 2"]);
    }

    #[test]
    fn insert_duplicate_text_gets_distinct_id() {
        let mut s = stmts(&["A == 1"]);
        apply(
            &mut s,
            "t.tcf",
            &Edit::Insert {
                after: None,
                text: "A == 1".into(),
                scope: None,
            },
        )
        .unwrap();
        assert_ne!(s[0].id, s[1].id);
    }

    #[test]
    fn remove_then_undo_restores_position() {
        let mut s = stmts(&["A == 1", "B == 2", "C == 3"]);
        let second = s[1].id.clone();
        let undo = apply(&mut s, "t.tcf", &Edit::Remove(second)).unwrap();
        assert_eq!(raws(&s), vec!["A == 1", "C == 3"]);
        revert(&mut s, undo).unwrap();
        assert_eq!(raws(&s), vec!["A == 1", "B == 2", "C == 3"]);
    }

    #[test]
    fn update_value_keeps_command_and_comment() {
        let mut s = stmts(&["Cell Size == 5 ! metres"]);
        let id = s[0].id.clone();
        apply(
            &mut s,
            "t.tcf",
            &Edit::UpdateValue {
                id,
                value: "2.5".into(),
            },
        )
        .unwrap();
        assert_eq!(s[0].raw, "Cell Size == 2.5 ! metres");
    }

    #[test]
    fn change_scope_adds_global() {
        let mut s = stmts(&["A == 1"]);
        let id = s[0].id.clone();
        apply(
            &mut s,
            "t.tcf",
            &Edit::ChangeScope {
                id,
                scope: ScopeList::new(vec![Scope::new(ScopeKind::Event, ["Q100"])]),
            },
        )
        .unwrap();
        assert_eq!(s[0].scope.to_string(), "Global & Event(Q100)");
    }

    #[test]
    fn bad_edits_are_rejected() {
        let mut s = stmts(&["A == 1"]);
        let missing = StatementId::from("0000000000000000");
        assert!(apply(&mut s, "t.tcf", &Edit::Remove(missing)).is_err());
        let id = s[0].id.clone();
        assert!(apply(&mut s, "t.tcf", &Edit::Uncomment(id)).is_err());
        let header = Edit::Insert {
            after: None,
            text: "If Scenario == D01".into(),
            scope: None,
        };
        assert!(apply(&mut s, "t.tcf", &header).is_err());
    }
}
