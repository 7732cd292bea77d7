//! Variable and wildcard expansion.
//!
//! | Token        | Meaning                                         |
//! |--------------|-------------------------------------------------|
//! | `<<NAME>>`   | user variable `NAME` (case-insensitive)         |
//! | `<<~s1~>>`   | first scenario name; `<<~s~>>` is the same      |
//! | `<<~sN~>>`   | N-th scenario name                              |
//! | `<<~e1~>>`   | first event name; `<<~e~>>` is the same         |
//! | `<<~eN~>>`   | N-th event name                                 |
//!
//! Unknown tokens are always left in place; the caller decides whether a
//! surviving token is an error.

use crate::scope::Scope;
use crate::source::{normalize_path, SourceProvider};
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<<([^<>]+)>>").expect("token regex"));

static BARE_AXIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<<~([se])~>>").expect("axis regex"));

static AXIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^~([se])(\d+)~$").expect("indexed axis regex"));

// ──────────────────────────────────────────────
// Variable map
// ──────────────────────────────────────────────

/// Case-insensitive name → value store used for substitution.
///
/// Keys are stored upper-cased so lookups ignore case; iteration order is
/// sorted, which keeps every output built from the map deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VariableMap {
    vars: BTreeMap<String, String>,
}

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) a variable.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.vars.insert(name.trim().to_ascii_uppercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(&name.trim().to_ascii_uppercase())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

// ──────────────────────────────────────────────
// Tokens
// ──────────────────────────────────────────────

/// Which axis a `<<~sN~>>` / `<<~eN~>>` token selects from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    Scenario,
    Event,
}

/// Rewrite `<<~s~>>` / `<<~e~>>` as `<<~s1~>>` / `<<~e1~>>`.
///
/// Applied once on the way in, so later distinct-token logic never sees both
/// spellings of the same token.
pub fn normalise_wildcards(text: &str) -> String {
    BARE_AXIS_RE
        .replace_all(text, |caps: &Captures| {
            format!("<<~{}1~>>", caps[1].to_ascii_lowercase())
        })
        .into_owned()
}

pub fn has_wildcards(text: &str) -> bool {
    TOKEN_RE.is_match(text)
}

/// Distinct wildcard tokens (normalised), in order of first appearance.
pub fn wildcard_tokens(text: &str) -> Vec<String> {
    let normalised = normalise_wildcards(text);
    let mut seen: Vec<String> = Vec::new();
    for m in TOKEN_RE.find_iter(&normalised) {
        let token = m.as_str();
        if !seen.iter().any(|t| t.eq_ignore_ascii_case(token)) {
            seen.push(token.to_owned());
        }
    }
    seen
}

/// The name inside a token: `<<CELL>>` → `CELL`.
pub fn token_name(token: &str) -> &str {
    token
        .strip_prefix("<<")
        .and_then(|t| t.strip_suffix(">>"))
        .unwrap_or(token)
}

/// `<<~s2~>>` → `(Scenario, 2)`. Plain variables give `None`.
pub fn axis_token(token: &str) -> Option<(Axis, usize)> {
    let caps = AXIS_RE.captures(token_name(token))?;
    let axis = if caps[1].eq_ignore_ascii_case("s") {
        Axis::Scenario
    } else {
        Axis::Event
    };
    let index = caps[2].parse().ok()?;
    Some((axis, index))
}

/// Key under which an axis token's value is stored in a [`VariableMap`].
pub fn axis_key(axis: Axis, index: usize) -> String {
    match axis {
        Axis::Scenario => format!("~S{}~", index),
        Axis::Event => format!("~E{}~", index),
    }
}

// ──────────────────────────────────────────────
// Expansion
// ──────────────────────────────────────────────

/// Substitute every `<<NAME>>` whose name is in `vars`. Unknown tokens stay.
pub fn expand_text(text: &str, vars: &VariableMap) -> String {
    let normalised = normalise_wildcards(text);
    TOKEN_RE
        .replace_all(&normalised, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.trim().to_owned(),
            None => caps[0].to_owned(),
        })
        .into_owned()
}

/// Like [`expand_text`], but the result is a glob pattern: literal text and
/// substituted values are escaped, and unknown tokens become `*`.
pub fn expand_for_glob(text: &str, vars: &VariableMap) -> String {
    let normalised = normalise_wildcards(text);
    let mut out = String::with_capacity(normalised.len());
    let mut last = 0;
    for caps in TOKEN_RE.captures_iter(&normalised) {
        let Some(m) = caps.get(0) else { continue };
        out.push_str(&glob::Pattern::escape(&normalised[last..m.start()]));
        match vars.get(&caps[1]) {
            Some(value) => out.push_str(&glob::Pattern::escape(value.trim())),
            None => out.push('*'),
        }
        last = m.end();
    }
    out.push_str(&glob::Pattern::escape(&normalised[last..]));
    out
}

/// Normalise path text for comparison: forward slashes, no `.` segments,
/// `..` folded lexically, lower case.
pub fn normalise_path_text(text: &str) -> String {
    let unified = text.trim().replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(p) if *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    let joined = if absolute { format!("/{}", joined) } else { joined };
    joined.to_lowercase()
}

/// Ordered `k`-permutations of `items`.
fn permutations<'a>(items: &[&'a str], k: usize) -> Vec<Vec<&'a str>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let mut rest: Vec<&str> = items.to_vec();
        rest.remove(i);
        for mut tail in permutations(&rest, k - 1) {
            tail.insert(0, item);
            out.push(tail);
        }
    }
    out
}

/// Work out which candidate names reproduce `concrete` from `template`, and
/// write them back into the matching unresolved scopes.
///
/// Every ordered permutation of `candidates` taken `n` at a time (`n` = number
/// of distinct tokens in `template`) is substituted and compared with
/// `concrete` after path normalisation; the first match wins. The search is
/// `P(c, n)`, exponential in the token count; templates carry at most a
/// handful of tokens, so no cap is applied.
///
/// Returns the token → name assignment that matched.
pub fn resolve_scope(
    unresolved: &mut [&mut Scope],
    template: &str,
    concrete: &str,
    candidates: &[String],
) -> Option<BTreeMap<String, String>> {
    let tokens = wildcard_tokens(template);
    if tokens.is_empty() || tokens.len() > candidates.len() {
        return None;
    }
    let target = normalise_path_text(concrete);
    let names: Vec<&str> = candidates.iter().map(String::as_str).collect();
    for perm in permutations(&names, tokens.len()) {
        let mut vars = VariableMap::new();
        for (token, name) in tokens.iter().zip(&perm) {
            vars.set(token_name(token), *name);
        }
        if normalise_path_text(&expand_text(template, &vars)) != target {
            continue;
        }
        let assignment: BTreeMap<String, String> = tokens
            .iter()
            .zip(&perm)
            .map(|(t, n)| (t.clone(), (*n).to_owned()))
            .collect();
        for scope in unresolved.iter_mut() {
            let Some(token) = scope.variable_token().map(str::to_owned) else {
                continue;
            };
            if let Some((_, name)) = assignment
                .iter()
                .find(|(t, _)| t.eq_ignore_ascii_case(&token))
            {
                scope.assign_names([name.clone()]);
            }
        }
        return Some(assignment);
    }
    None
}

/// Glob patterns for a file reference template.
///
/// Axis tokens take their names from `scenarios` / `events`. When an axis
/// has at least as many names as tokens, names are assigned by position.
/// When it has fewer, the file does not say which token position a name
/// belongs to, so every injective assignment of the known names to token
/// positions is produced, with `*` for the positions left over.
pub fn file_patterns(
    template: &str,
    vars: &VariableMap,
    scenarios: &[String],
    events: &[String],
) -> Vec<String> {
    let tokens = wildcard_tokens(template);
    let mut by_axis: BTreeMap<Axis, Vec<String>> = BTreeMap::new();
    for token in &tokens {
        if let Some((axis, _)) = axis_token(token) {
            by_axis.entry(axis).or_default().push(token.clone());
        }
    }

    let mut variants: Vec<VariableMap> = vec![vars.clone()];
    for (axis, axis_tokens) in &by_axis {
        let known = match axis {
            Axis::Scenario => scenarios,
            Axis::Event => events,
        };
        let mut next = Vec::new();
        for base in &variants {
            if known.len() >= axis_tokens.len() {
                let mut v = base.clone();
                for token in axis_tokens {
                    if let Some((_, index)) = axis_token(token) {
                        if let Some(name) = known.get(index.saturating_sub(1)) {
                            v.set(token_name(token), name.clone());
                        }
                    }
                }
                next.push(v);
                continue;
            }
            let slots: Vec<&str> = axis_tokens.iter().map(String::as_str).collect();
            for chosen in permutations(&slots, known.len()) {
                let mut v = base.clone();
                for (token, name) in chosen.iter().zip(known) {
                    v.set(token_name(token), name.clone());
                }
                next.push(v);
            }
        }
        variants = next;
    }

    let mut patterns: Vec<String> = Vec::new();
    for v in &variants {
        let p = expand_for_glob(template, v);
        if !patterns.contains(&p) {
            patterns.push(p);
        }
    }
    patterns
}

/// Resolve a (possibly wildcarded) relative file reference against
/// `base_dir`. Matches across every pattern are de-duplicated and sorted.
pub fn resolve_file_reference(
    base_dir: &Path,
    template: &str,
    vars: &VariableMap,
    scenarios: &[String],
    events: &[String],
    provider: &dyn SourceProvider,
) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut found: BTreeSet<PathBuf> = BTreeSet::new();
    let base = glob::Pattern::escape(&base_dir.to_string_lossy());
    for pattern in file_patterns(template, vars, scenarios, events) {
        let joined = format!("{}/{}", base, pattern.trim().replace('\\', "/"));
        let full = normalize_path(Path::new(&joined));
        found.extend(provider.glob(&full.to_string_lossy())?);
    }
    Ok(found.into_iter().collect())
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
