//! Event database: what each `Define Event` block substitutes.
//!
//! ```text
//! BC Event Text == ~ARI~
//! Define Event == Q100
//!     BC Event Source == ~DUR~ | 2h
//!     BC Event Name == 100yr
//! End Define
//! ```
//!
//! gives `Q100 → [(~DUR~, 2h), (~ARI~, 100yr)]`. `BC Event Text` sets the
//! token that later `BC Event Name` lines fill in.

use hydroctl_core::lexer::command_key;
use hydroctl_core::{BuildState, ScopeKind, Statement};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventEntry {
    pub name: String,
    /// `(token, value)` pairs in source order.
    pub substitutions: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventDatabase {
    events: Vec<EventEntry>,
}

impl EventDatabase {
    /// Collect every `Define Event` block of the tree, children included in
    /// the order they are referenced.
    pub fn from_build_state(state: &BuildState) -> Self {
        let mut db = EventDatabase::default();
        let mut event_text = None;
        db.collect(state, &mut event_text);
        tracing::debug!(events = db.events.len(), "event database built");
        db
    }

    fn collect(&mut self, state: &BuildState, event_text: &mut Option<String>) {
        for statement in &state.statements {
            self.take(statement, event_text);
            for child in &statement.children {
                if let hydroctl_core::ChildContent::ControlFile(inner) = &child.content {
                    self.collect(inner, event_text);
                }
            }
        }
    }

    fn take(&mut self, statement: &Statement, event_text: &mut Option<String>) {
        let Some(command) = statement.command.as_deref() else {
            return;
        };
        let value = statement.value.as_deref().unwrap_or("").trim();
        let key = command_key(command);
        let names: Vec<String> = statement
            .scope
            .iter()
            .filter(|s| s.kind() == ScopeKind::EventVariable && !s.is_negated())
            .flat_map(|s| s.names().to_vec())
            .collect();

        match key.as_str() {
            "bc event text" => *event_text = Some(value.to_owned()),
            "bc event source" => {
                let Some((token, replacement)) = value.split_once('|') else {
                    return;
                };
                for name in &names {
                    self.add(name, token.trim(), replacement.trim());
                }
            }
            "bc event name" => {
                let Some(token) = event_text.clone() else {
                    tracing::trace!(line = statement.prov.line, "BC Event Name without BC Event Text");
                    return;
                };
                for name in &names {
                    self.add(name, &token, value);
                }
            }
            _ => {}
        }
    }

    fn add(&mut self, event: &str, token: &str, value: &str) {
        if token.is_empty() {
            return;
        }
        let pos = match self
            .events
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(event))
        {
            Some(pos) => pos,
            None => {
                self.events.push(EventEntry {
                    name: event.to_owned(),
                    substitutions: Vec::new(),
                });
                self.events.len() - 1
            }
        };
        let subs = &mut self.events[pos].substitutions;
        match subs.iter_mut().find(|(t, _)| t.eq_ignore_ascii_case(token)) {
            Some(existing) => existing.1 = value.to_owned(),
            None => subs.push((token.to_owned(), value.to_owned())),
        }
    }

    pub fn get(&self, event: &str) -> Option<&EventEntry> {
        self.events
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(event))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.events.iter().map(|e| e.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
