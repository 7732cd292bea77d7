//! hydroctl-eval: resolve a build state against one concrete run.
//!
//! A [`BuildState`](hydroctl_core::BuildState) holds every variant of a
//! model. Given a [`Context`] (chosen scenarios, events and variables),
//! [`Resolve::resolve`] keeps the statements in force, substitutes every
//! token, and returns a scope-free [`RunState`] together with the
//! recoverable diagnostics met on the way.

pub mod context;
pub mod error;
pub mod event_db;
pub mod resolve;
pub mod run_state;

pub use context::Context;
pub use error::ResolveError;
pub use event_db::{EventDatabase, EventEntry};
pub use resolve::{resolve, Resolve, Resolver};
pub use run_state::{GisLayer, Resolution, RunChild, RunState, RunStatement};
