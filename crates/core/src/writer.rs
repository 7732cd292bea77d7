//! Scope writer: turns scoped statements back into block syntax.
//!
//! The writer keeps the stack of blocks it has opened. For each statement it
//! finds the longest run of levels the statement shares with that stack,
//! closes what lies beyond, and opens what is missing. When the first
//! differing level is a later branch of the same block, `Else If` / `Else`
//! is written instead of a close and a reopen.
//!
//! Scopes read from a file carry their block identity and header lines as
//! written. Those lines are reproduced unchanged, comments and case included,
//! and a level only continues an open block read from the same source block.
//! Scopes created by edits get generated headers.

use crate::ast::{Statement, StatementKind};
use crate::error::ControlError;
use crate::lexer::CloseKind;
use crate::scope::{BlockSource, Scope, ScopeKind, ScopeList};

const INDENT: &str = "    ";

/// One block level as written: a plain branch, or an `Else If` branch that
/// carries the negation of every earlier name as its guard.
#[derive(Debug, Clone)]
struct Level {
    guard: Option<Scope>,
    leaf: Scope,
}

impl Level {
    fn kind(&self) -> ScopeKind {
        self.leaf.kind()
    }

    fn is_else(&self) -> bool {
        self.guard.is_none() && self.leaf.is_negated()
    }

    fn is_else_if(&self) -> bool {
        self.guard.is_some()
    }

    fn is_identical(&self, other: &Level) -> bool {
        let guards = match (&self.guard, &other.guard) {
            (None, None) => true,
            (Some(a), Some(b)) => a.is_identical(b),
            _ => false,
        };
        guards
            && self.leaf.is_identical(&other.leaf)
            && same_source(self.leaf.source(), other.leaf.source())
    }

    fn same_block(&self, other: &Level) -> bool {
        same_block(&self.leaf, &other.leaf)
    }
}

/// Same kind and qualifier: the two could be branches of one block.
fn same_block(a: &Scope, b: &Scope) -> bool {
    a.kind() == b.kind()
        && match (a.qualifier(), b.qualifier()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
}

fn same_source(a: Option<&BlockSource>, b: Option<&BlockSource>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_branch(b),
        _ => false,
    }
}

/// Header line of a branch: as read, or generated from the scope.
fn header_text(scope: &Scope, generated: impl FnOnce() -> String) -> String {
    match scope.source() {
        Some(source) => source.header.clone(),
        None => generated(),
    }
}

/// Alternatives of a scope as written in a header.
fn alternatives(scope: &Scope) -> Vec<String> {
    if scope.names().is_empty() {
        return scope.variable_token().map(str::to_owned).into_iter().collect();
    }
    scope.names().to_vec()
}

fn same_set(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.eq_ignore_ascii_case(y)))
}

/// Group a scope list into levels, dropping `Global`.
fn levels(scope: &ScopeList, file: &str, line: u32) -> Result<Vec<Level>, ControlError> {
    let mut out = Vec::new();
    let mut guard: Option<Scope> = None;
    for s in scope.without_global() {
        if s.is_negated() && !s.kind().supports_branching() {
            return Err(ControlError::reserialize(
                file,
                line,
                format!("{} cannot be negated", s),
            ));
        }
        if let Some(g) = guard.take() {
            if !s.is_negated() && same_block(&g, s) {
                out.push(Level {
                    guard: Some(g),
                    leaf: s.clone(),
                });
                continue;
            }
            // A lone negation is written as an `Else` branch.
            out.push(Level {
                guard: None,
                leaf: g,
            });
        }
        if s.is_negated() && !s.is_else_branch() {
            guard = Some(s.clone());
        } else {
            out.push(Level {
                guard: None,
                leaf: s.clone(),
            });
        }
    }
    if let Some(g) = guard {
        out.push(Level {
            guard: None,
            leaf: g,
        });
    }
    Ok(out)
}

fn open_text(kind: ScopeKind, scope: &Scope) -> String {
    let names = scope.names_text();
    match kind {
        ScopeKind::Scenario | ScopeKind::Event => format!("If {} == {}", kind, names),
        ScopeKind::Variable => format!(
            "If Variable {} == {}",
            scope.qualifier().unwrap_or_default(),
            names
        ),
        ScopeKind::EventVariable => format!("Define Event == {}", names),
        ScopeKind::OutputZone => format!("Define Output Zone == {}", names),
        ScopeKind::ControlBlock => format!(
            "Define {} == {}",
            scope.qualifier().unwrap_or_default(),
            names
        ),
        ScopeKind::OneDimDomain => "Start 1D Domain".to_owned(),
        ScopeKind::Global => String::new(),
    }
}

/// An open block and every name its branches have used so far.
#[derive(Debug)]
struct OpenLevel {
    level: Level,
    seen: Vec<String>,
}

/// Incremental writer over a sequence of scoped statements.
#[derive(Debug)]
pub struct ScopeWriter {
    file: String,
    stack: Vec<OpenLevel>,
    out: Vec<String>,
}

impl ScopeWriter {
    pub fn new(file: &str) -> Self {
        ScopeWriter {
            file: file.to_owned(),
            stack: Vec::new(),
            out: Vec::new(),
        }
    }

    fn emit(&mut self, depth: usize, text: &str) {
        if text.is_empty() {
            self.out.push(String::new());
        } else {
            self.out.push(format!("{}{}", INDENT.repeat(depth), text));
        }
    }

    fn close_to(&mut self, depth: usize) {
        while self.stack.len() > depth {
            if let Some(open) = self.stack.pop() {
                if let Some(close) = CloseKind::for_kind(open.level.kind()) {
                    let text = open
                        .level
                        .leaf
                        .source()
                        .and_then(|s| s.close.clone())
                        .unwrap_or_else(|| close.text().to_owned());
                    let d = self.stack.len();
                    self.emit(d, &text);
                }
            }
        }
    }

    /// Open `level` at the current depth, writing a leading `If` for branch
    /// levels that have no earlier sibling on the stack.
    fn open(&mut self, level: Level) {
        let depth = self.stack.len();
        let kind = level.kind();
        let mut seen = Vec::new();
        if let Some(guard) = &level.guard {
            let text = open_text(kind, guard);
            self.emit(depth, &text);
            seen.extend(alternatives(guard));
            let text = header_text(&level.leaf, || format!("Else {}", open_text(kind, &level.leaf)));
            self.emit(depth, &text);
            seen.extend(alternatives(&level.leaf));
        } else if level.is_else() {
            let text = open_text(kind, &level.leaf);
            self.emit(depth, &text);
            let text = header_text(&level.leaf, || "Else".to_owned());
            self.emit(depth, &text);
            seen.extend(alternatives(&level.leaf));
        } else {
            let text = header_text(&level.leaf, || open_text(kind, &level.leaf));
            self.emit(depth, &text);
            seen.extend(alternatives(&level.leaf));
        }
        self.stack.push(OpenLevel { level, seen });
    }

    /// Whether `next` can follow the open level at `index` as its next branch.
    fn continues(&self, index: usize, next: &Level) -> bool {
        let Some(open) = self.stack.get(index) else {
            return false;
        };
        if !open.level.same_block(next) || !next.kind().supports_branching() || open.level.is_else()
        {
            return false;
        }
        if let (Some(a), Some(b)) = (open.level.leaf.source(), next.leaf.source()) {
            return a.block == b.block;
        }
        if let Some(guard) = &next.guard {
            return same_set(&alternatives(guard), &open.seen);
        }
        next.is_else() && same_set(&alternatives(&next.leaf), &open.seen)
    }

    /// Move the open stack to `scope`.
    fn transition(&mut self, scope: &ScopeList, line: u32) -> Result<(), ControlError> {
        let target = levels(scope, &self.file, line)?;
        let common = self
            .stack
            .iter()
            .zip(&target)
            .take_while(|(open, lvl)| open.level.is_identical(lvl))
            .count();
        if common == self.stack.len() && common == target.len() {
            return Ok(());
        }

        let mut rest = target.into_iter().skip(common);
        if let Some(next) = rest.next() {
            if self.continues(common, &next) {
                self.close_to(common + 1);
                let depth = common;
                if let Some(open) = self.stack.last_mut() {
                    if next.is_else_if() {
                        open.seen.extend(alternatives(&next.leaf));
                    }
                    open.level = next.clone();
                }
                let text = header_text(&next.leaf, || {
                    if next.is_else_if() {
                        format!("Else {}", open_text(next.kind(), &next.leaf))
                    } else {
                        "Else".to_owned()
                    }
                });
                self.emit(depth, &text);
            } else {
                self.close_to(common);
                self.open(next);
            }
        } else {
            self.close_to(common);
        }
        for level in rest {
            self.open(level);
        }
        Ok(())
    }

    pub fn write(&mut self, statement: &Statement) -> Result<(), ControlError> {
        self.transition(&statement.scope.with_global(), statement.prov.line)?;
        match statement.kind {
            StatementKind::Placeholder => {}
            StatementKind::Blank => self.out.push(String::new()),
            _ => {
                let depth = self.stack.len();
                self.emit(depth, &statement.raw);
            }
        }
        Ok(())
    }

    /// Close everything still open and return the text, one line per entry,
    /// each terminated by a newline.
    pub fn finish(mut self) -> String {
        self.close_to(0);
        let mut text = self.out.join("\n");
        if !self.out.is_empty() {
            text.push('\n');
        }
        text
    }
}

/// Write a whole statement sequence.
pub fn write_statements(statements: &[Statement], file: &str) -> Result<String, ControlError> {
    let mut writer = ScopeWriter::new(file);
    for statement in statements {
        writer.write(statement)?;
    }
    Ok(writer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Provenance, StatementId};

    fn stmt(raw: &str, scopes: Vec<Scope>) -> Statement {
        let mut list = ScopeList::global();
        for s in scopes {
            list.push(s);
        }
        Statement::reparse(
            StatementId::compute("t.tcf", raw, 0),
            raw,
            list,
            Provenance {
                file: "t.tcf".into(),
                line: 1,
            },
        )
    }

    fn scenario(names: &[&str]) -> Scope {
        Scope::new(ScopeKind::Scenario, names.iter().copied())
    }

    #[test]
    fn opens_and_closes_nested_blocks() {
        let text = write_statements(
            &[
                stmt("A == 1", vec![]),
                stmt(
                    "B == 2",
                    vec![scenario(&["D01"]), Scope::new(ScopeKind::Event, ["Q100"])],
                ),
                stmt("C == 3", vec![scenario(&["D01"])]),
                stmt("D == 4", vec![]),
            ],
            "t.tcf",
        )
        .unwrap();
        assert_eq!(
            text,
            "A == 1\nIf Scenario == D01\n    If Event == Q100\n        B == 2\n    End If\n    C == 3\nEnd If\nD == 4\n"
        );
    }

    #[test]
    fn else_if_and_else_branches() {
        let names = |n: &[&str]| n.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let text = write_statements(
            &[
                stmt("A", vec![scenario(&["D01"])]),
                stmt(
                    "B",
                    vec![
                        Scope::negation_of(ScopeKind::Scenario, &names(&["D01"]), false, None),
                        scenario(&["D02"]),
                    ],
                ),
                stmt(
                    "C",
                    vec![Scope::negation_of(
                        ScopeKind::Scenario,
                        &names(&["D01", "D02"]),
                        true,
                        None,
                    )],
                ),
            ],
            "t.tcf",
        )
        .unwrap();
        assert_eq!(
            text,
            "If Scenario == D01\n    A\nElse If Scenario == D02\n    B\nElse\n    C\nEnd If\n"
        );
    }

    #[test]
    fn lone_else_reopens_with_if() {
        let names = vec!["D01".to_string()];
        let text = write_statements(
            &[stmt(
                "C",
                vec![Scope::negation_of(ScopeKind::Scenario, &names, true, None)],
            )],
            "t.tcf",
        )
        .unwrap();
        assert_eq!(text, "If Scenario == D01\nElse\n    C\nEnd If\n");
    }

    #[test]
    fn separate_blocks_of_same_kind_are_not_merged_into_branches() {
        let text = write_statements(
            &[
                stmt("A", vec![scenario(&["D01"])]),
                stmt("B", vec![scenario(&["D02"])]),
            ],
            "t.tcf",
        )
        .unwrap();
        assert_eq!(
            text,
            "If Scenario == D01\n    A\nEnd If\nIf Scenario == D02\n    B\nEnd If\n"
        );
    }

    #[test]
    fn placeholders_keep_empty_blocks() {
        let mut p = stmt("", vec![Scope::new(ScopeKind::Event, ["Q100"])]);
        p.kind = StatementKind::Placeholder;
        let text = write_statements(&[p, stmt("X", vec![])], "t.tcf").unwrap();
        assert_eq!(text, "If Event == Q100\nEnd If\nX\n");
    }

    #[test]
    fn structural_blocks_use_define_syntax() {
        let zone = Scope::new(ScopeKind::OutputZone, ["Z1"]);
        let pipes = Scope::new(ScopeKind::ControlBlock, ["Main"]).with_qualifier(Some("Pipe Network"));
        let domain = Scope::new(ScopeKind::OneDimDomain, Vec::<String>::new());
        let text = write_statements(
            &[
                stmt("A", vec![zone]),
                stmt("B", vec![pipes]),
                stmt("C", vec![domain]),
            ],
            "t.tcf",
        )
        .unwrap();
        assert_eq!(
            text,
            "Define Output Zone == Z1\n    A\nEnd Define\nDefine Pipe Network == Main\n    B\nEnd Define\nStart 1D Domain\n    C\nEnd 1D Domain\n"
        );
    }

    #[test]
    fn negated_structural_scope_cannot_be_written() {
        let zone = Scope::new(ScopeKind::OutputZone, ["Z1"]).negated();
        let err = write_statements(&[stmt("A", vec![zone])], "t.tcf").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Reserialize);
    }
}
