//! Scope model: the build variants a statement belongs to.
//!
//! A [`Scope`] is one conditional axis (`Scenario`, `Event`, ...) with an
//! OR-list of names; a [`ScopeList`] is the AND of every scope enclosing a
//! statement, outermost first.
//!
//! Scope equality is deliberately loose: two scopes of the same kind are equal
//! when their name lists intersect (case-insensitively). That makes `==` a
//! "could both hold at once" test rather than an equivalence relation, so
//! `Scope` implements `PartialEq` only. Use [`Scope::is_identical`] when exact
//! structural equality is needed.

use crate::expand;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ScopeKind {
    Global,
    Scenario,
    Event,
    EventVariable,
    OneDimDomain,
    OutputZone,
    ControlBlock,
    Variable,
}

impl ScopeKind {
    /// Conditional-compilation axes. Structural kinds only mark nesting.
    pub fn is_resolvable(self) -> bool {
        !matches!(
            self,
            ScopeKind::OneDimDomain | ScopeKind::OutputZone | ScopeKind::ControlBlock
        )
    }

    /// Kinds that accept `Else` / `Else If` inside their block.
    pub fn supports_branching(self) -> bool {
        matches!(
            self,
            ScopeKind::Scenario | ScopeKind::Event | ScopeKind::Variable
        )
    }

    /// Kinds whose header carries no name list (`Start 1D Domain`).
    pub fn is_anonymous(self) -> bool {
        matches!(self, ScopeKind::Global | ScopeKind::OneDimDomain)
    }

    pub fn label(self) -> &'static str {
        match self {
            ScopeKind::Global => "Global",
            ScopeKind::Scenario => "Scenario",
            ScopeKind::Event => "Event",
            ScopeKind::EventVariable => "Event Variable",
            ScopeKind::OneDimDomain => "1D Domain",
            ScopeKind::OutputZone => "Output Zone",
            ScopeKind::ControlBlock => "Control Block",
            ScopeKind::Variable => "Variable",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a block scope was read from: the block's opening line, the header
/// line of its branch, and both header texts as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSource {
    pub block: u32,
    pub branch: u32,
    pub header: String,
    pub close: Option<String>,
}

impl BlockSource {
    /// Same block and same branch of it.
    pub fn same_branch(&self, other: &BlockSource) -> bool {
        self.block == other.block && self.branch == other.branch
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Scope {
    kind: ScopeKind,
    names: Vec<String>,
    negated: bool,
    from_else_branch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    variable_token: Option<String>,
    /// Header label for `ControlBlock` (`Define <label> == name`) and the
    /// variable name for `Variable` (`If Variable <name> == ...`).
    #[serde(skip_serializing_if = "Option::is_none")]
    qualifier: Option<String>,
    /// Set for scopes read from a file; scopes built by edits have none.
    #[serde(skip)]
    source: Option<BlockSource>,
}

impl Scope {
    pub fn global() -> Self {
        Scope {
            kind: ScopeKind::Global,
            names: Vec::new(),
            negated: false,
            from_else_branch: false,
            variable_token: None,
            qualifier: None,
            source: None,
        }
    }

    /// A scope with concrete names only.
    pub fn new<I, S>(kind: ScopeKind, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Scope {
            kind,
            names: names.into_iter().map(Into::into).collect(),
            ..Scope::global()
        }
    }

    /// Parse a header value such as `D01 | D02` or `<<~s1~>>`.
    ///
    /// Alternatives are split on `|`. An alternative containing a wildcard
    /// token is not a concrete name: the first such token is kept as the
    /// scope's `variable_token` so it can be re-resolved later. Repeated
    /// names collapse to one.
    pub fn from_text(kind: ScopeKind, raw_name: &str) -> Self {
        let mut scope = Scope {
            kind,
            ..Scope::global()
        };
        for alt in raw_name.split('|').map(str::trim).filter(|s| !s.is_empty()) {
            if expand::has_wildcards(alt) {
                if scope.variable_token.is_none() {
                    scope.variable_token = Some(expand::normalise_wildcards(alt));
                }
            } else if !scope.matches_name(alt) {
                scope.names.push(alt.to_owned());
            }
        }
        scope
    }

    /// The negation of `names` at one block level, as produced by the
    /// `Else` (`from_else_branch = true`) or `Else If` branches.
    pub fn negation_of(
        kind: ScopeKind,
        names: &[String],
        from_else_branch: bool,
        qualifier: Option<&str>,
    ) -> Self {
        let mut scope = Scope::from_text(kind, &names.join(" | "));
        scope.negated = true;
        scope.from_else_branch = from_else_branch;
        scope.qualifier = qualifier.map(str::to_owned);
        scope
    }

    pub fn with_qualifier(mut self, qualifier: Option<&str>) -> Self {
        self.qualifier = qualifier.map(str::to_owned);
        self
    }

    pub fn with_source(mut self, source: BlockSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Record the close line of the block this scope was read from.
    pub(crate) fn attach_close(&mut self, block: u32, text: &str) {
        if let Some(source) = self.source.as_mut().filter(|s| s.block == block) {
            source.close = Some(text.to_owned());
        }
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn is_else_branch(&self) -> bool {
        self.from_else_branch
    }

    pub fn variable_token(&self) -> Option<&str> {
        self.variable_token.as_deref()
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn source(&self) -> Option<&BlockSource> {
        self.source.as_ref()
    }

    /// No concrete name is known yet, only a wildcard token.
    pub fn is_unresolved(&self) -> bool {
        self.names.is_empty() && self.variable_token.is_some()
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    /// Same scope with the negation flag flipped.
    pub fn negated(&self) -> Scope {
        let mut scope = self.clone();
        scope.negated = !scope.negated;
        scope
    }

    /// One single-name scope per OR-alternative. A scope with no concrete
    /// names explodes to itself.
    pub fn explode(&self, keep_negation: bool) -> Vec<Scope> {
        if self.names.len() <= 1 {
            let mut scope = self.clone();
            if !keep_negation {
                scope.negated = false;
            }
            return vec![scope];
        }
        self.names
            .iter()
            .map(|name| Scope {
                kind: self.kind,
                names: vec![name.clone()],
                negated: keep_negation && self.negated,
                from_else_branch: self.from_else_branch,
                variable_token: None,
                qualifier: self.qualifier.clone(),
                source: self.source.clone(),
            })
            .collect()
    }

    /// Record concrete names discovered for a previously unresolved token.
    pub fn assign_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.matches_name(&name) {
                self.names.push(name);
            }
        }
    }

    /// Value equality with intersection semantics. `neg` decides whether the
    /// negation flags must agree too.
    pub fn same_value(&self, other: &Scope, neg: bool) -> bool {
        if self.kind != other.kind {
            return false;
        }
        if neg && self.negated != other.negated {
            return false;
        }
        if !eq_opt_ignore_case(self.qualifier(), other.qualifier()) {
            return false;
        }
        if self.kind.is_anonymous() {
            return true;
        }
        if self.names.is_empty() || other.names.is_empty() {
            return match (self.variable_token(), other.variable_token()) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                _ => false,
            };
        }
        self.names.iter().any(|n| other.matches_name(n))
    }

    /// Exact structural equality, name order included (case-insensitive).
    /// Where the scope was read from is not compared.
    pub fn is_identical(&self, other: &Scope) -> bool {
        self.kind == other.kind
            && self.negated == other.negated
            && self.from_else_branch == other.from_else_branch
            && eq_opt_ignore_case(self.qualifier(), other.qualifier())
            && eq_opt_ignore_case(self.variable_token(), other.variable_token())
            && self.names.len() == other.names.len()
            && self
                .names
                .iter()
                .zip(&other.names)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// Header text of the name list: `D01 | D02`, or the wildcard token.
    pub fn names_text(&self) -> String {
        let mut parts: Vec<&str> = self.names.iter().map(String::as_str).collect();
        if self.names.is_empty() {
            if let Some(token) = self.variable_token() {
                parts.push(token);
            }
        }
        parts.join(" | ")
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Scope) -> bool {
        self.same_value(other, true)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == ScopeKind::Global {
            return f.write_str("Global");
        }
        if self.negated {
            f.write_str("!")?;
        }
        match self.qualifier() {
            Some(q) => write!(f, "{}[{}]({})", self.kind, q, self.names_text()),
            None => write!(f, "{}({})", self.kind, self.names_text()),
        }
    }
}

fn eq_opt_ignore_case(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// The AND of every scope enclosing a statement, outermost first.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ScopeList(Vec<Scope>);

impl ScopeList {
    pub fn new(scopes: Vec<Scope>) -> Self {
        ScopeList(scopes)
    }

    /// `[Global]`: the scope of a statement outside every block.
    pub fn global() -> Self {
        ScopeList(vec![Scope::global()])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Scope> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Scope> {
        self.0.iter_mut()
    }

    pub fn as_slice(&self) -> &[Scope] {
        &self.0
    }

    pub fn push(&mut self, scope: Scope) {
        self.0.push(scope);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when nothing but `Global` applies.
    pub fn is_global(&self) -> bool {
        self.0.iter().all(|s| s.kind() == ScopeKind::Global)
    }

    /// The same list with a leading `Global` added if it was missing.
    pub fn with_global(&self) -> ScopeList {
        match self.0.first() {
            Some(s) if s.kind() == ScopeKind::Global => self.clone(),
            _ => {
                let mut scopes = Vec::with_capacity(self.0.len() + 1);
                scopes.push(Scope::global());
                scopes.extend(self.0.iter().cloned());
                ScopeList(scopes)
            }
        }
    }

    /// Scopes other than `Global`.
    pub fn without_global(&self) -> impl Iterator<Item = &Scope> {
        self.0.iter().filter(|s| s.kind() != ScopeKind::Global)
    }

    /// Cross-product containment: true if any (exploded) scope in this list
    /// shares a name with any (exploded) alternative of `scope`. With
    /// `neg = true` the negation flags must agree as well.
    pub fn contains(&self, scope: &Scope, explode: bool, neg: bool) -> bool {
        let theirs = if explode {
            scope.explode(true)
        } else {
            vec![scope.clone()]
        };
        self.0.iter().any(|mine| {
            let mine = if explode {
                mine.explode(true)
            } else {
                vec![mine.clone()]
            };
            mine.iter()
                .any(|a| theirs.iter().any(|b| a.same_value(b, neg)))
        })
    }
}

impl FromIterator<Scope> for ScopeList {
    fn from_iter<T: IntoIterator<Item = Scope>>(iter: T) -> Self {
        ScopeList(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ScopeList {
    type Item = &'a Scope;
    type IntoIter = std::slice::Iter<'a, Scope>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ScopeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(Scope::to_string).collect();
        f.write_str(&parts.join(" & "))
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
