//! Conditional block tracker.
//!
//! A stack machine fed one classified line at a time. For content lines it
//! returns the scope list in force; for header lines it updates the stack and,
//! when the branch being left never held a line, returns the scope list an
//! empty placeholder statement must carry so the block survives a rewrite.
//!
//! Every block scope carries a [`BlockSource`] naming its block and branch
//! with the header text as written, so separate blocks with equal headers
//! stay apart and headers are written back unchanged.

use crate::error::ControlError;
use crate::lexer::{CloseKind, Directive, Line};
use crate::scope::{BlockSource, Scope, ScopeKind, ScopeList};

/// What the tracker decided for one line.
#[derive(Debug, Clone)]
pub enum Tracked {
    /// A statement line, in force under this scope list.
    Content(ScopeList),
    /// A block header or close.
    Structural { placeholder: Option<ScopeList> },
}

/// One open block awaiting its close.
#[derive(Debug, Clone)]
struct DefineBlock {
    kind: ScopeKind,
    qualifier: Option<String>,
    close: CloseKind,
    /// Every name used by a branch of this block so far.
    seen: Vec<String>,
    /// Scopes of the branch currently being read: one for `If`/`Else`, two for
    /// `Else If` (negation of earlier names, then the new names).
    branch: Vec<Scope>,
    has_else: bool,
    branch_has_content: bool,
    line: u32,
}

#[derive(Debug)]
pub struct BlockTracker {
    file: String,
    stack: Vec<DefineBlock>,
    /// `(opening line, close text)` for every block closed so far.
    closes: Vec<(u32, String)>,
}

fn split_names(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn same_qualifier(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

impl BlockTracker {
    pub fn new(file: &str) -> Self {
        BlockTracker {
            file: file.to_owned(),
            stack: Vec::new(),
            closes: Vec::new(),
        }
    }

    /// `Global` followed by the branch scopes of every open block.
    pub fn current(&self) -> ScopeList {
        let mut list = ScopeList::global();
        for block in &self.stack {
            for scope in &block.branch {
                list.push(scope.clone());
            }
        }
        list
    }

    fn mark_content(&mut self) {
        for block in &mut self.stack {
            block.branch_has_content = true;
        }
    }

    /// Placeholder scope for the innermost branch, if it is still empty.
    fn placeholder(&self) -> Option<ScopeList> {
        match self.stack.last() {
            Some(block) if !block.branch_has_content => Some(self.current()),
            _ => None,
        }
    }

    pub fn process(&mut self, line: &Line, lineno: u32) -> Result<Tracked, ControlError> {
        match line.directive() {
            Directive::None => {
                self.mark_content();
                Ok(Tracked::Content(self.current()))
            }
            Directive::Malformed(msg) => Err(ControlError::syntax(&self.file, lineno, msg.clone())),
            Directive::Open {
                kind,
                names,
                qualifier,
            } => {
                self.open(*kind, names, qualifier.as_deref(), &line.text, lineno)?;
                Ok(Tracked::Structural { placeholder: None })
            }
            Directive::ElseIf {
                kind,
                names,
                qualifier,
            } => self.else_if(*kind, names, qualifier.as_deref(), &line.text, lineno),
            Directive::Else => self.else_branch(&line.text, lineno),
            Directive::Close(close) => self.close(*close, &line.text, lineno),
        }
    }

    fn open(
        &mut self,
        kind: ScopeKind,
        names: &str,
        qualifier: Option<&str>,
        header: &str,
        lineno: u32,
    ) -> Result<(), ControlError> {
        let close = CloseKind::for_kind(kind).ok_or_else(|| {
            ControlError::syntax(&self.file, lineno, format!("cannot open a {} block", kind))
        })?;
        let seen = split_names(names);
        let scope = if kind.is_anonymous() {
            Scope::new(kind, Vec::<String>::new())
        } else {
            Scope::from_text(kind, names).with_qualifier(qualifier)
        };
        let scope = scope.with_source(source(lineno, lineno, header));
        // The header itself belongs to the enclosing branch.
        self.mark_content();
        self.stack.push(DefineBlock {
            kind,
            qualifier: qualifier.map(str::to_owned),
            close,
            seen,
            branch: vec![scope],
            has_else: false,
            branch_has_content: false,
            line: lineno,
        });
        Ok(())
    }

    /// Checks shared by `Else If` and `Else`; returns the placeholder for the
    /// branch being left.
    fn enter_branch(&mut self, what: &str, lineno: u32) -> Result<Option<ScopeList>, ControlError> {
        let Some(block) = self.stack.last() else {
            return Err(ControlError::syntax(
                &self.file,
                lineno,
                format!("'{}' without an open block", what),
            ));
        };
        if !block.kind.supports_branching() {
            return Err(ControlError::branch(
                &self.file,
                lineno,
                format!(
                    "'{}' is not allowed in a {} block (opened at line {})",
                    what, block.kind, block.line
                ),
            ));
        }
        if block.has_else {
            return Err(ControlError::syntax(
                &self.file,
                lineno,
                format!("'{}' after 'Else' (block opened at line {})", what, block.line),
            ));
        }
        Ok(self.placeholder())
    }

    fn else_if(
        &mut self,
        kind: ScopeKind,
        names: &str,
        qualifier: Option<&str>,
        header: &str,
        lineno: u32,
    ) -> Result<Tracked, ControlError> {
        let placeholder = self.enter_branch("Else If", lineno)?;
        let file = self.file.clone();
        let Some(block) = self.stack.last_mut() else {
            return Err(ControlError::syntax(&file, lineno, "'Else If' without an open block"));
        };
        if block.kind != kind || !same_qualifier(block.qualifier.as_deref(), qualifier) {
            return Err(ControlError::syntax(
                &file,
                lineno,
                format!(
                    "'Else If {}' does not match the {} block opened at line {}",
                    kind, block.kind, block.line
                ),
            ));
        }
        let new_names = split_names(names);
        if let Some(dup) = new_names
            .iter()
            .find(|n| block.seen.iter().any(|s| s.eq_ignore_ascii_case(n)))
        {
            return Err(ControlError::syntax(
                &file,
                lineno,
                format!("'{}' already used by an earlier branch of this block", dup),
            ));
        }
        let src = source(block.line, lineno, header);
        block.branch = vec![
            Scope::negation_of(kind, &block.seen, false, qualifier).with_source(src.clone()),
            Scope::from_text(kind, names)
                .with_qualifier(qualifier)
                .with_source(src),
        ];
        block.seen.extend(new_names);
        block.branch_has_content = false;
        Ok(Tracked::Structural { placeholder })
    }

    fn else_branch(&mut self, header: &str, lineno: u32) -> Result<Tracked, ControlError> {
        let placeholder = self.enter_branch("Else", lineno)?;
        let file = self.file.clone();
        let Some(block) = self.stack.last_mut() else {
            return Err(ControlError::syntax(&file, lineno, "'Else' without an open block"));
        };
        block.branch = vec![Scope::negation_of(
            block.kind,
            &block.seen,
            true,
            block.qualifier.as_deref(),
        )
        .with_source(source(block.line, lineno, header))];
        block.has_else = true;
        block.branch_has_content = false;
        Ok(Tracked::Structural { placeholder })
    }

    fn close(&mut self, close: CloseKind, text: &str, lineno: u32) -> Result<Tracked, ControlError> {
        let placeholder = self.placeholder();
        let Some(block) = self.stack.pop() else {
            return Err(ControlError::syntax(
                &self.file,
                lineno,
                format!("'{}' without an open block", close.text()),
            ));
        };
        if block.close != close {
            return Err(ControlError::syntax(
                &self.file,
                lineno,
                format!(
                    "'{}' closes a {} block opened at line {} (expected '{}')",
                    close.text(),
                    block.kind,
                    block.line,
                    block.close.text()
                ),
            ));
        }
        tracing::trace!(
            file = %self.file,
            line = lineno,
            kind = %block.kind,
            opened = block.line,
            "block closed"
        );
        self.closes.push((block.line, text.to_owned()));
        Ok(Tracked::Structural { placeholder })
    }

    /// Close lines as written, by the opening line of their block.
    pub fn closes(&self) -> &[(u32, String)] {
        &self.closes
    }

    /// Every block must be closed at end of file.
    pub fn finish(&self) -> Result<(), ControlError> {
        match self.stack.last() {
            Some(block) => Err(ControlError::syntax(
                &self.file,
                block.line,
                format!(
                    "{} block is never closed (expected '{}')",
                    block.kind,
                    block.close.text()
                ),
            )),
            None => Ok(()),
        }
    }
}

fn source(block: u32, branch: u32, header: &str) -> BlockSource {
    BlockSource {
        block,
        branch,
        header: header.to_owned(),
        close: None,
    }
}

/// Record `text` as the close line on every scope of `list` opened at `block`.
pub(crate) fn attach_close(list: &mut ScopeList, block: u32, text: &str) {
    for scope in list.iter_mut() {
        scope.attach_close(block, text);
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
