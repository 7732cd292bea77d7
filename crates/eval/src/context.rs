//! One concrete run: chosen scenario/event names and variable values.

use crate::error::ResolveError;
use crate::event_db::EventDatabase;
use hydroctl_core::expand::{self, Axis, VariableMap};
use hydroctl_core::{Scope, ScopeKind, ScopeList};
use serde::Serialize;
use std::collections::BTreeMap;

/// Scenario and event names are positional: the first scenario fills
/// `<<~s1~>>`, the second `<<~s2~>>`, and so on.
///
/// Construction fixes the names. Variables and event substitutions are
/// filled in afterwards by the resolver, before anything is translated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Context {
    scenario_names: Vec<String>,
    event_names: Vec<String>,
    variables: VariableMap,
    /// `(token, value)` pairs taken from the event database for the chosen
    /// events, replaced literally in translated text.
    event_variable_map: Vec<(String, String)>,
}

impl Context {
    pub fn new<S, E>(scenarios: S, events: E) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Context {
            scenario_names: scenarios.into_iter().map(Into::into).collect(),
            event_names: events.into_iter().map(Into::into).collect(),
            ..Context::default()
        }
    }

    /// Parse run arguments: `-s1 D01 -s2 5m -e1 Q100`.
    ///
    /// A bare `-s` / `-e` takes the next free position. Positions must run
    /// from 1 without gaps; an unknown flag, a missing value or a repeated
    /// position is an error.
    pub fn from_args<I, S>(args: I) -> Result<Context, ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let mut scenarios: BTreeMap<usize, String> = BTreeMap::new();
        let mut events: BTreeMap<usize, String> = BTreeMap::new();

        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            let (axis, index) = parse_flag(flag)?;
            let Some(value) = iter.next() else {
                return Err(ResolveError::InvalidContext(format!(
                    "{} needs a value",
                    flag
                )));
            };
            let target = match axis {
                Axis::Scenario => &mut scenarios,
                Axis::Event => &mut events,
            };
            let index = index.unwrap_or_else(|| target.len() + 1);
            if target.insert(index, value.trim().to_owned()).is_some() {
                return Err(ResolveError::InvalidContext(format!(
                    "{} given more than once",
                    flag_name(axis, index)
                )));
            }
        }

        Ok(Context::new(
            contiguous(scenarios, Axis::Scenario)?,
            contiguous(events, Axis::Event)?,
        ))
    }

    pub fn scenario_names(&self) -> &[String] {
        &self.scenario_names
    }

    pub fn event_names(&self) -> &[String] {
        &self.event_names
    }

    pub fn variables(&self) -> &VariableMap {
        &self.variables
    }

    pub fn event_variables(&self) -> &[(String, String)] {
        &self.event_variable_map
    }

    /// The caller chose at least one scenario or event.
    pub fn has_selection(&self) -> bool {
        !self.scenario_names.is_empty() || !self.event_names.is_empty()
    }

    pub(crate) fn seed_scenarios(&mut self, names: Vec<String>) {
        self.scenario_names = names;
    }

    pub(crate) fn seed_events(&mut self, names: Vec<String>) {
        self.event_names = names;
    }

    pub fn set_variable(&mut self, name: &str, value: impl Into<String>) {
        self.variables.set(name, value);
    }

    /// Fold the substitutions of every chosen event into the context.
    pub fn populate_event_variables(&mut self, db: &EventDatabase) {
        self.event_variable_map.clear();
        for event in &self.event_names {
            let Some(entry) = db.get(event) else {
                continue;
            };
            for (token, value) in &entry.substitutions {
                match self
                    .event_variable_map
                    .iter_mut()
                    .find(|(t, _)| t.eq_ignore_ascii_case(token))
                {
                    Some(existing) => existing.1 = value.clone(),
                    None => self
                        .event_variable_map
                        .push((token.clone(), value.clone())),
                }
            }
        }
    }

    /// User variables plus `~S1~`, `~E1~`, ... for the positional names.
    fn substitutions(&self) -> VariableMap {
        let mut vars = self.user_substitutions();
        for (i, name) in self.scenario_names.iter().enumerate() {
            vars.set(&expand::axis_key(Axis::Scenario, i + 1), name.clone());
        }
        for (i, name) in self.event_names.iter().enumerate() {
            vars.set(&expand::axis_key(Axis::Event, i + 1), name.clone());
        }
        vars
    }

    fn user_substitutions(&self) -> VariableMap {
        self.variables.clone()
    }

    fn replace_event_tokens(&self, text: &str) -> String {
        let mut out = text.to_owned();
        for (token, value) in &self.event_variable_map {
            out = replace_ignore_case(&out, token, value);
        }
        out
    }

    /// Substitute event tokens, then every `<<NAME>>` the context knows.
    /// Unknown tokens are left in place.
    pub fn translate(&self, text: &str) -> String {
        expand::expand_text(&self.replace_event_tokens(text), &self.substitutions())
    }

    /// Like [`translate`](Self::translate) but scenario/event tokens are
    /// left for file globbing.
    pub fn translate_user(&self, text: &str) -> String {
        expand::expand_text(&self.replace_event_tokens(text), &self.user_substitutions())
    }

    /// Whether every resolvable scope in `scopes` holds under this context.
    pub fn is_active(&self, scopes: &ScopeList) -> bool {
        scopes.iter().all(|scope| self.scope_holds(scope))
    }

    fn scope_holds(&self, scope: &Scope) -> bool {
        let kind = scope.kind();
        if kind == ScopeKind::Global || !kind.is_resolvable() {
            return true;
        }

        let mut alternatives: Vec<String> = scope.names().to_vec();
        if let Some(token) = scope.variable_token() {
            let translated = self.translate(token);
            if expand::has_wildcards(&translated) {
                if alternatives.is_empty() {
                    tracing::trace!(%scope, "unresolved scope never holds");
                    return false;
                }
            } else {
                alternatives.extend(translated.split('|').map(|s| s.trim().to_owned()));
            }
        }

        let selected: Vec<&str> = match kind {
            ScopeKind::Scenario => self.scenario_names.iter().map(String::as_str).collect(),
            ScopeKind::Event | ScopeKind::EventVariable => {
                self.event_names.iter().map(String::as_str).collect()
            }
            ScopeKind::Variable => {
                let Some(value) = scope.qualifier().and_then(|q| self.variables.get(q)) else {
                    tracing::trace!(%scope, "undefined variable never holds");
                    return false;
                };
                vec![value.trim()]
            }
            _ => return true,
        };

        let matched = alternatives
            .iter()
            .any(|alt| selected.iter().any(|name| name.eq_ignore_ascii_case(alt)));
        matched != scope.is_negated()
    }

    /// Command-line form of the context: `-s1 D01 -e1 Q100`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        for (i, name) in self.scenario_names.iter().enumerate() {
            parts.push(format!("-s{} {}", i + 1, name));
        }
        for (i, name) in self.event_names.iter().enumerate() {
            parts.push(format!("-e{} {}", i + 1, name));
        }
        parts.join(" ")
    }
}

/// `-s`, `-s2`, `-e1` → axis and optional position.
fn parse_flag(flag: &str) -> Result<(Axis, Option<usize>), ResolveError> {
    let invalid = || ResolveError::InvalidContext(format!("unknown argument `{}`", flag));
    let rest = flag.strip_prefix('-').ok_or_else(invalid)?;
    let mut chars = rest.chars();
    let axis = match chars.next() {
        Some('s') | Some('S') => Axis::Scenario,
        Some('e') | Some('E') => Axis::Event,
        _ => return Err(invalid()),
    };
    let digits = chars.as_str();
    if digits.is_empty() {
        return Ok((axis, None));
    }
    match digits.parse::<usize>() {
        Ok(0) | Err(_) => Err(invalid()),
        Ok(n) => Ok((axis, Some(n))),
    }
}

fn flag_name(axis: Axis, index: usize) -> String {
    match axis {
        Axis::Scenario => format!("-s{}", index),
        Axis::Event => format!("-e{}", index),
    }
}

fn contiguous(map: BTreeMap<usize, String>, axis: Axis) -> Result<Vec<String>, ResolveError> {
    let mut out = Vec::with_capacity(map.len());
    for (expected, (index, name)) in (1..).zip(map) {
        if index != expected {
            return Err(ResolveError::InvalidContext(format!(
                "{} given without {}",
                flag_name(axis, index),
                flag_name(axis, expected)
            )));
        }
        out.push(name);
    }
    Ok(out)
}

fn replace_ignore_case(text: &str, needle: &str, with: &str) -> String {
    if needle.is_empty() {
        return text.to_owned();
    }
    let lower = text.to_ascii_lowercase();
    let needle_lower = needle.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, _) in lower.match_indices(&needle_lower) {
        out.push_str(&text[last..start]);
        out.push_str(with);
        last = start + needle.len();
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(scopes: Vec<Scope>) -> ScopeList {
        ScopeList::new(scopes).with_global()
    }

    #[test]
    fn from_args_positions_and_bare_flags() {
        let ctx = Context::from_args(["-s1", "D01", "-s2", "5m", "-e", "Q100"]).unwrap();
        assert_eq!(ctx.scenario_names(), ["D01", "5m"]);
        assert_eq!(ctx.event_names(), ["Q100"]);
        assert_eq!(ctx.describe(), "-s1 D01 -s2 5m -e1 Q100");

        let ctx = Context::from_args(["-s", "A", "-s", "B"]).unwrap();
        assert_eq!(ctx.scenario_names(), ["A", "B"]);
    }

    #[test]
    fn from_args_rejects_gaps_duplicates_and_unknown_flags() {
        assert!(matches!(
            Context::from_args(["-s2", "D01"]),
            Err(ResolveError::InvalidContext(m)) if m.contains("without -s1")
        ));
        assert!(Context::from_args(["-s1", "A", "-s1", "B"]).is_err());
        assert!(Context::from_args(["-x", "A"]).is_err());
        assert!(Context::from_args(["-s0", "A"]).is_err());
        assert!(Context::from_args(["-e1"]).is_err());
    }

    #[test]
    fn positive_and_negated_scenarios() {
        let ctx = Context::new(["D01"], Vec::<String>::new());
        let d01 = Scope::new(ScopeKind::Scenario, ["d01"]);
        let d02 = Scope::new(ScopeKind::Scenario, ["D02"]);
        assert!(ctx.is_active(&list(vec![d01.clone()])));
        assert!(!ctx.is_active(&list(vec![d01.negated()])));
        assert!(!ctx.is_active(&list(vec![d02.clone()])));
        assert!(ctx.is_active(&list(vec![d02.negated()])));
    }

    #[test]
    fn structural_scopes_are_ignored() {
        let ctx = Context::default();
        let scopes = list(vec![
            Scope::new(ScopeKind::OneDimDomain, Vec::<String>::new()),
            Scope::new(ScopeKind::OutputZone, ["Z1"]),
        ]);
        assert!(ctx.is_active(&scopes));
    }

    #[test]
    fn unresolved_token_fails_both_ways() {
        let ctx = Context::default();
        let scope = Scope::from_text(ScopeKind::Scenario, "<<~s1~>>");
        assert!(!ctx.is_active(&list(vec![scope.clone()])));
        assert!(!ctx.is_active(&list(vec![scope.negated()])));

        let ctx = Context::new(["EXG"], Vec::<String>::new());
        assert!(ctx.is_active(&list(vec![scope])));
    }

    #[test]
    fn variable_scopes_compare_the_variable_value() {
        let mut ctx = Context::default();
        let scope = Scope::new(ScopeKind::Variable, ["5", "10"]).with_qualifier(Some("CELL"));
        assert!(!ctx.is_active(&list(vec![scope.clone()])));
        ctx.set_variable("cell", "10");
        assert!(ctx.is_active(&list(vec![scope.clone()])));
        assert!(!ctx.is_active(&list(vec![scope.negated()])));
    }

    #[test]
    fn translate_substitutes_axes_variables_and_event_tokens() {
        let mut ctx = Context::new(["EXG", "5m"], ["Q100"]);
        ctx.set_variable("cell", "2.5");
        ctx.event_variable_map.push(("~ARI~".into(), "100yr".into()));
        assert_eq!(
            ctx.translate("m_<<~s~>>_<<~s2~>>_<<CELL>>_<<~e1~>>_~ari~.tgc"),
            "m_EXG_5m_2.5_Q100_100yr.tgc"
        );
        assert_eq!(ctx.translate("<<UNKNOWN>>"), "<<UNKNOWN>>");
        assert_eq!(ctx.translate_user("m_<<~s1~>>_<<CELL>>"), "m_<<~s1~>>_2.5");
    }

    #[test]
    fn event_variables_follow_chosen_events() {
        let bs = hydroctl_core::parse_build_state(
            std::path::Path::new("e.tef"),
            "Define Event == Q100\nBC Event Source == ~ARI~ | 100yr\nEnd Define\n\
             Define Event == Q010\nBC Event Source == ~ARI~ | 10yr\nEnd Define\n",
        )
        .unwrap();
        let db = EventDatabase::from_build_state(&bs);
        let mut ctx = Context::new(Vec::<String>::new(), ["Q010"]);
        ctx.populate_event_variables(&db);
        assert_eq!(ctx.translate("bc_~ARI~.csv"), "bc_10yr.csv");
    }
}
