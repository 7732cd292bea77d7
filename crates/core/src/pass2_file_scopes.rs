//! Pass 2: work out which scenario/event names select each child file that a
//! wildcard reference matched.
//!
//! `Geometry Control File == m_<<~s1~>>.tgc` loads every `m_*.tgc` at build
//! time. Matching each file name back against the template with the
//! scenario names the tree mentions tells which scenario a file belongs to;
//! that scope is stored on the child.

use crate::ast::ChildContent;
use crate::build_state::BuildState;
use crate::expand::{self, Axis};
use crate::scope::{Scope, ScopeKind};

/// Scenario and event names mentioned anywhere in the tree: in block
/// headers and in `Model Scenarios` / `Model Events` declarations.
pub fn candidate_names(state: &BuildState) -> (Vec<String>, Vec<String>) {
    let mut scenarios = Vec::new();
    let mut events = Vec::new();
    collect(state, &mut scenarios, &mut events);
    (scenarios, events)
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n.eq_ignore_ascii_case(name)) {
        list.push(name.to_owned());
    }
}

fn collect(state: &BuildState, scenarios: &mut Vec<String>, events: &mut Vec<String>) {
    for statement in &state.statements {
        for scope in &statement.scope {
            let target = match scope.kind() {
                ScopeKind::Scenario => &mut *scenarios,
                ScopeKind::Event | ScopeKind::EventVariable => &mut *events,
                _ => continue,
            };
            for name in scope.names() {
                push_unique(target, name);
            }
        }
        for name in statement.scenario_declaration().unwrap_or_default() {
            push_unique(scenarios, &name);
        }
        for name in statement.event_declaration().unwrap_or_default() {
            push_unique(events, &name);
        }
    }
    for child in state.children() {
        collect(child, scenarios, events);
    }
}

/// The last path component of a reference as written.
fn file_part(reference: &str) -> &str {
    reference
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(reference)
}

pub fn figure_out_file_scopes(state: &mut BuildState) {
    let (scenarios, events) = candidate_names(state);
    assign(state, &scenarios, &events);
}

fn assign(state: &mut BuildState, scenarios: &[String], events: &[String]) {
    for statement in &mut state.statements {
        let template = statement.value.clone().unwrap_or_default();
        let tokens = expand::wildcard_tokens(&template);
        let axes: Vec<(&String, Axis)> = tokens
            .iter()
            .filter_map(|t| expand::axis_token(t).map(|(axis, _)| (t, axis)))
            .collect();

        for child in &mut statement.children {
            if let ChildContent::ControlFile(inner) = &mut child.content {
                assign(inner, scenarios, events);
            }
            let mut file_scopes: Vec<Scope> = axes
                .iter()
                .map(|(token, axis)| {
                    let kind = match axis {
                        Axis::Scenario => ScopeKind::Scenario,
                        Axis::Event => ScopeKind::Event,
                    };
                    Scope::from_text(kind, token)
                })
                .collect();

            // User variables in the template cannot be matched against names.
            if !tokens.is_empty() && axes.len() == tokens.len() {
                let candidates: Vec<String> = if axes.iter().all(|(_, a)| *a == Axis::Scenario) {
                    scenarios.to_vec()
                } else if axes.iter().all(|(_, a)| *a == Axis::Event) {
                    events.to_vec()
                } else {
                    scenarios.iter().chain(events).cloned().collect()
                };
                let concrete = child
                    .path
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let mut unresolved: Vec<&mut Scope> = file_scopes.iter_mut().collect();
                match expand::resolve_scope(
                    &mut unresolved,
                    file_part(&template),
                    &concrete,
                    &candidates,
                ) {
                    Some(found) => tracing::trace!(file = %concrete, ?found, "file scope resolved"),
                    None => tracing::trace!(file = %concrete, "file scope left unresolved"),
                }
            }

            let mut scope = statement.scope.clone();
            for s in file_scopes {
                scope.push(s);
            }
            child.scope = scope;
        }
    }
}
