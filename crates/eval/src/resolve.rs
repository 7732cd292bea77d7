//! Build state → run state.
//!
//! Resolution runs per file in two passes. The variable pass folds every
//! active `Set Variable` into the context, in source order, descending into
//! a `.trd` child only when it is the file the reference names under the
//! context so far. The statement pass then keeps the active
//! statements, translates them and recurses into referenced control files
//! and databases, each with its own copy of the context.
//!
//! Before either pass, and only when the caller chose no scenario or event,
//! the context is seeded from the last Global `Model Scenarios` /
//! `Model Events` declaration of the root file.

use crate::context::Context;
use crate::error::ResolveError;
use crate::event_db::EventDatabase;
use crate::run_state::{GisLayer, Resolution, RunChild, RunState, RunStatement};
use hydroctl_core::expand::{self, normalise_path_text};
use hydroctl_core::{
    BuildState, ChildContent, ControlError, ControlFileKind, Diagnostic, FileSystemProvider,
    GeometryLayerSource, SourceProvider, Statement, StatementKind, SuffixGeometrySource, Table,
    ValueKind,
};
use std::path::{Path, PathBuf};

/// Collaborators used while resolving.
pub struct Resolver<'a> {
    /// Globs wildcard file references and resolves relative paths.
    pub provider: &'a dyn SourceProvider,
    pub geometry: &'a dyn GeometryLayerSource,
}

impl Default for Resolver<'static> {
    fn default() -> Self {
        Resolver {
            provider: &FileSystemProvider,
            geometry: &SuffixGeometrySource,
        }
    }
}

impl<'a> Resolver<'a> {
    pub fn new(provider: &'a dyn SourceProvider, geometry: &'a dyn GeometryLayerSource) -> Self {
        Resolver { provider, geometry }
    }

    /// Suffix-based geometry, files read through `provider`.
    pub fn with_provider(provider: &'a dyn SourceProvider) -> Self {
        Resolver {
            provider,
            geometry: &SuffixGeometrySource,
        }
    }
}

/// Collapse a build state into the run state for one context.
pub trait Resolve {
    fn resolve(&self, ctx: &Context) -> Result<Resolution, ResolveError> {
        self.resolve_with(ctx, &Resolver::default())
    }

    fn resolve_with(&self, ctx: &Context, resolver: &Resolver<'_>) -> Result<Resolution, ResolveError>;
}

impl Resolve for BuildState {
    fn resolve_with(&self, ctx: &Context, resolver: &Resolver<'_>) -> Result<Resolution, ResolveError> {
        resolve(self, ctx, resolver)
    }
}

pub fn resolve(
    state: &BuildState,
    ctx: &Context,
    resolver: &Resolver<'_>,
) -> Result<Resolution, ResolveError> {
    let mut ctx = ctx.clone();
    if !ctx.has_selection() {
        infer_context(state, &mut ctx);
    }
    let events = EventDatabase::from_build_state(state);
    ctx.populate_event_variables(&events);
    tracing::debug!(file = %state.file_name(), context = %ctx.describe(), "resolving");

    let mut pass = StatementPass {
        resolver,
        diagnostics: Vec::new(),
    };
    let run_state = pass.file(state, ctx)?;
    Ok(Resolution {
        run_state,
        diagnostics: pass.diagnostics,
    })
}

/// Seed scenario/event names from the last Global declarations.
fn infer_context(state: &BuildState, ctx: &mut Context) {
    let global = state.statements.iter().filter(|s| s.scope.is_global());
    let mut scenarios = None;
    let mut events = None;
    for statement in global {
        if let Some(names) = statement.scenario_declaration() {
            scenarios = Some(names);
        }
        if let Some(names) = statement.event_declaration() {
            events = Some(names);
        }
    }
    if let Some(names) = scenarios {
        tracing::debug!(?names, "scenarios inferred");
        ctx.seed_scenarios(names);
    }
    if let Some(names) = events {
        tracing::debug!(?names, "events inferred");
        ctx.seed_events(names);
    }
}

/// Parts of a value naming files. Children are always a single path; GIS
/// and other file lists split on `|`, with any `>> layer` suffix kept aside.
fn segments(kind: StatementKind, value: &str) -> Vec<(String, String)> {
    if kind.has_child() {
        return vec![(value.trim().to_owned(), String::new())];
    }
    value
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|seg| match seg.find(">>") {
            Some(i) => (seg[..i].trim().to_owned(), format!(" {}", &seg[i..])),
            None => (seg.to_owned(), String::new()),
        })
        .collect()
}

fn base_dir(state: &BuildState) -> PathBuf {
    state.path.parent().unwrap_or(Path::new(".")).to_owned()
}

/// The loaded child a resolved path refers to.
fn find_child<'s>(statement: &'s Statement, path: &Path) -> Option<&'s ChildContent> {
    let wanted = normalise_path_text(&path.to_string_lossy());
    statement
        .children
        .iter()
        .find(|c| normalise_path_text(&c.path.to_string_lossy()) == wanted)
        .map(|c| &c.content)
}

fn names_files(statement: &Statement) -> bool {
    statement.kind.references_file() || matches!(statement.value_kind(), Some(ValueKind::File))
}

fn unresolved(statement: &Statement, tokens: &[String]) -> ResolveError {
    let token = tokens
        .iter()
        .find(|t| expand::axis_token(t).is_none())
        .or_else(|| tokens.first())
        .cloned()
        .unwrap_or_default();
    ResolveError::UnresolvedWildcard {
        file: statement.prov.file.clone(),
        line: statement.prov.line,
        statement: statement.raw.clone(),
        token,
    }
}

fn check_branch(statement: &Statement) -> Result<(), ResolveError> {
    match statement
        .scope
        .iter()
        .find(|s| s.is_negated() && !s.kind().supports_branching())
    {
        Some(scope) => Err(ResolveError::Branch {
            file: statement.prov.file.clone(),
            line: statement.prov.line,
            message: format!("{} blocks cannot be negated ({})", scope.kind().label(), scope),
        }),
        None => Ok(()),
    }
}

struct StatementPass<'r, 'a> {
    resolver: &'r Resolver<'a>,
    diagnostics: Vec<Diagnostic>,
}

impl StatementPass<'_, '_> {
    fn report(&mut self, statement: &Statement, ctx: &Context, reason: String) {
        tracing::warn!(file = %statement.prov.file, line = statement.prov.line, "{}", reason);
        self.diagnostics.push(
            Diagnostic::new(
                &statement.prov.file,
                statement.prov.line,
                Some(&statement.raw),
                reason,
            )
            .with_context(ctx.describe()),
        );
    }

    fn variables(&mut self, state: &BuildState, ctx: &mut Context) {
        let base_dir = base_dir(state);
        for statement in &state.statements {
            if !ctx.is_active(&statement.scope) {
                continue;
            }
            if let Some((name, value)) = statement.variable() {
                let value = ctx.translate(&value);
                tracing::trace!(%name, %value, "variable set");
                ctx.set_variable(&name, value);
            }
            if statement.kind != StatementKind::ControlFileReference(ControlFileKind::Trd) {
                continue;
            }
            // Left for the statement pass to report.
            let files = match self.value(statement, ctx, &base_dir) {
                Ok((_, files)) => files,
                Err(e) => {
                    tracing::debug!(
                        file = %statement.prov.file,
                        line = statement.prov.line,
                        error = %e,
                        "variable file not read"
                    );
                    continue;
                }
            };
            for path in &files {
                if let Some(ChildContent::ControlFile(inner)) = find_child(statement, path) {
                    self.variables(inner, ctx);
                }
            }
        }
    }

    fn file(&mut self, state: &BuildState, mut ctx: Context) -> Result<RunState, ResolveError> {
        self.variables(state, &mut ctx);
        let base_dir = base_dir(state);

        let mut statements = Vec::new();
        for statement in &state.statements {
            check_branch(statement)?;
            if !statement.is_content() || !ctx.is_active(&statement.scope) {
                continue;
            }
            if statement.is_pause() {
                return Err(ResolveError::Paused {
                    file: statement.prov.file.clone(),
                    line: statement.prov.line,
                    message: statement.value.clone().unwrap_or_default(),
                });
            }

            let command = ctx.translate(statement.command.as_deref().unwrap_or(""));
            let left = expand::wildcard_tokens(&command);
            if !left.is_empty() {
                return Err(unresolved(statement, &left));
            }

            let (value, files) = self.value(statement, &ctx, &base_dir)?;
            let mut run = RunStatement::from_statement(statement, command, value);
            run.files = files;
            if statement.kind == StatementKind::GisReference {
                if let Some(value) = run.value.clone() {
                    run.layers = self.layers(statement, &ctx, &base_dir, &value);
                }
            }
            if statement.kind.has_child() {
                run.children = self.children(statement, &ctx, &run.files)?;
            }
            statements.push(run);
        }

        tracing::debug!(file = %state.file_name(), statements = statements.len(), "resolved");
        Ok(RunState {
            path: state.path.clone(),
            kind: state.kind,
            context: ctx.describe(),
            statements,
        })
    }

    /// Translated value and the files it names.
    fn value(
        &mut self,
        statement: &Statement,
        ctx: &Context,
        base_dir: &Path,
    ) -> Result<(Option<String>, Vec<PathBuf>), ResolveError> {
        let Some(raw) = statement.value.as_deref() else {
            return Ok((None, Vec::new()));
        };
        let provider = self.resolver.provider;
        let is_file = names_files(statement);

        let full = ctx.translate(raw);
        let left = expand::wildcard_tokens(&full);
        if left.is_empty() {
            let files = if is_file {
                segments(statement.kind, &full)
                    .iter()
                    .map(|(path, _)| provider.resolve_reference(base_dir, path))
                    .collect()
            } else {
                Vec::new()
            };
            return Ok((Some(full), files));
        }

        // Scenario/event tokens beyond the chosen names: find the file on disk.
        let only_axes = left.iter().all(|t| expand::axis_token(t).is_some());
        if !is_file || !only_axes {
            return Err(unresolved(statement, &left));
        }

        let template = ctx.translate_user(raw);
        let mut files = Vec::new();
        let mut parts = Vec::new();
        for (path, suffix) in segments(statement.kind, &template) {
            if !expand::has_wildcards(&path) {
                files.push(provider.resolve_reference(base_dir, &path));
                parts.push(format!("{}{}", path, suffix));
                continue;
            }
            let matches = expand::resolve_file_reference(
                base_dir,
                &path,
                ctx.variables(),
                ctx.scenario_names(),
                ctx.event_names(),
                provider,
            )
            .map_err(|e| ControlError::io(&statement.prov.file, e.to_string()))?;
            let [found] = matches.as_slice() else {
                tracing::warn!(
                    file = %statement.prov.file,
                    line = statement.prov.line,
                    matches = matches.len(),
                    "wildcard reference does not name exactly one file"
                );
                return Err(unresolved(statement, &expand::wildcard_tokens(&path)));
            };
            let shown = found
                .strip_prefix(base_dir)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| found.display().to_string());
            parts.push(format!("{}{}", shown, suffix));
            files.push(found.clone());
        }
        Ok((Some(parts.join(" | ")), files))
    }

    fn layers(
        &mut self,
        statement: &Statement,
        ctx: &Context,
        base_dir: &Path,
        value: &str,
    ) -> Vec<GisLayer> {
        let geometry = self.resolver.geometry;
        let mut layers = Vec::new();
        for part in value.split('|').map(str::trim).filter(|s| !s.is_empty()) {
            let (database, layer) = geometry.resolve_database_path(part);
            let database = self.resolver.provider.resolve_reference(base_dir, &database);
            let probe = if part.contains(">>") {
                database.join(&layer)
            } else {
                database.clone()
            };
            match geometry.enumerate_geometry_types(&probe) {
                Ok(tags) => layers.push(GisLayer {
                    database,
                    layer,
                    geometry: tags,
                }),
                Err(e) => {
                    let reason = format!("cannot read geometry of '{}': {}", probe.display(), e);
                    self.report(statement, ctx, reason);
                }
            }
        }
        layers
    }

    fn children(
        &mut self,
        statement: &Statement,
        ctx: &Context,
        files: &[PathBuf],
    ) -> Result<Vec<RunChild>, ResolveError> {
        let mut out = Vec::new();
        for path in files {
            match find_child(statement, path) {
                Some(ChildContent::ControlFile(inner)) => {
                    out.push(RunChild::ControlFile(self.file(inner, ctx.clone())?));
                }
                Some(ChildContent::Database(table)) => {
                    out.push(RunChild::Database(translate_table(table, ctx)));
                }
                Some(ChildContent::Failed(reason)) => {
                    self.report(statement, ctx, reason.clone());
                }
                None => {
                    let reason = format!("'{}' was not loaded", path.display());
                    self.report(statement, ctx, reason);
                }
            }
        }
        Ok(out)
    }
}

/// Event and variable tokens inside database cells (`~ARI~` in a boundary
/// database) are substituted; unknown tokens stay.
fn translate_table(table: &Table, ctx: &Context) -> Table {
    Table {
        header: table.header.iter().map(|h| ctx.translate(h)).collect(),
        rows: table
            .rows
            .iter()
            .map(|row| row.iter().map(|cell| ctx.translate(cell)).collect())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydroctl_core::{load_build_state, parse_build_state, InMemoryProvider, LoaderConfig};

    fn parsed(text: &str) -> BuildState {
        parse_build_state(Path::new("/m/m.tcf"), text).unwrap()
    }

    fn values(resolution: &Resolution) -> Vec<String> {
        resolution
            .run_state
            .statements
            .iter()
            .map(|s| s.text())
            .collect()
    }

    #[test]
    fn inactive_statements_are_dropped() {
        let bs = parsed("If Scenario == D01\nA == 1\nElse\nA == 2\nEnd If\nB == 3\n");
        let ctx = Context::new(["D02"], Vec::<String>::new());
        let res = bs.resolve(&ctx).unwrap();
        assert_eq!(values(&res), vec!["A == 2", "B == 3"]);
        assert!(res.is_clean());
    }

    #[test]
    fn context_is_inferred_only_without_selection() {
        let bs = parsed(
            "Model Scenarios == EXG\nModel Scenarios == DEV\nIf Scenario == DEV\nX == dev\nEnd If\n\
             If Scenario == EXG\nX == exg\nEnd If\n",
        );
        let res = bs.resolve(&Context::default()).unwrap();
        assert_eq!(res.run_state.value_of("x"), Some("dev"));
        assert_eq!(res.run_state.context, "-s1 DEV");

        let res = bs
            .resolve(&Context::new(["EXG"], Vec::<String>::new()))
            .unwrap();
        assert_eq!(res.run_state.value_of("X"), Some("exg"));
    }

    #[test]
    fn later_variable_overrides_and_inactive_is_skipped() {
        let bs = parsed(
            "Set Variable CELL == 5\nIf Scenario == FINE\nSet Variable CELL == 1\nEnd If\n\
             Set Variable CELL == 2\nCell Size == <<CELL>>\n",
        );
        let res = bs.resolve(&Context::new(["COARSE"], Vec::<String>::new())).unwrap();
        assert_eq!(res.run_state.value_of("Cell Size"), Some("2"));

        let bs = parsed(
            "Set Variable CELL == 5\nIf Scenario == FINE\nSet Variable CELL == 1\nEnd If\n\
             Cell Size == <<CELL>>\n",
        );
        let res = bs.resolve(&Context::new(["COARSE"], Vec::<String>::new())).unwrap();
        assert_eq!(res.run_state.value_of("Cell Size"), Some("5"));
    }

    #[test]
    fn pause_is_fatal_only_when_active() {
        let bs = parsed("If Scenario == OLD\nPause == retired scenario\nEnd If\nA == 1\n");
        assert!(bs
            .resolve(&Context::new(["NEW"], Vec::<String>::new()))
            .is_ok());
        let err = bs
            .resolve(&Context::new(["OLD"], Vec::<String>::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Paused { line: 2, ref message, .. } if message == "retired scenario"
        ));
    }

    #[test]
    fn unresolved_token_in_setting_is_fatal() {
        let bs = parsed("Timestep == <<DT>>\n");
        let err = bs.resolve(&Context::default()).unwrap_err();
        match err {
            ResolveError::UnresolvedWildcard { token, statement, .. } => {
                assert_eq!(token, "<<DT>>");
                assert_eq!(statement, "Timestep == <<DT>>");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn wildcard_file_reference_is_found_by_glob() {
        let provider = InMemoryProvider::new([
            (
                "/m/m.tcf",
                "Geometry Control File == geo_<<~s1~>>_<<~s2~>>.tgc\n",
            ),
            ("/m/geo_EXG_5m.tgc", "Cell Size == 5\n"),
            ("/m/geo_EXG_2m.tgc", "Cell Size == 2\n"),
        ]);
        let bs = load_build_state(Path::new("/m/m.tcf"), &LoaderConfig::with_provider(&provider))
            .unwrap();
        let resolver = Resolver::with_provider(&provider);

        // Only one scenario given: the second token is globbed.
        let ctx = Context::new(["5m"], Vec::<String>::new());
        let res = bs.resolve_with(&ctx, &resolver).unwrap();
        let statement = &res.run_state.statements[0];
        assert_eq!(statement.value.as_deref(), Some("geo_EXG_5m.tgc"));
        match &statement.children[..] {
            [RunChild::ControlFile(child)] => {
                assert_eq!(child.value_of("Cell Size"), Some("5"));
            }
            other => panic!("unexpected children {:?}", other),
        }

        // Nothing given: two candidates, ambiguous.
        let err = bs.resolve_with(&Context::default(), &resolver).unwrap_err();
        assert!(matches!(err, ResolveError::UnresolvedWildcard { .. }));
    }

    #[test]
    fn gis_layers_are_split_per_geometry() {
        let bs = parsed("Read GIS Z Shape == gis\\2d_zsh_L.shp | gis\\2d_zsh_P.shp\n");
        let res = bs.resolve(&Context::default()).unwrap();
        let layers = &res.run_state.statements[0].layers;
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].layer, "2d_zsh_L");
        assert_eq!(layers[0].geometry, vec![hydroctl_core::GeometryTag::Line]);
        assert_eq!(layers[1].geometry, vec![hydroctl_core::GeometryTag::Point]);
        assert_eq!(
            res.run_state.statements[0].files,
            vec![
                PathBuf::from("/m/gis/2d_zsh_L.shp"),
                PathBuf::from("/m/gis/2d_zsh_P.shp")
            ]
        );
    }

    #[test]
    fn missing_child_is_a_diagnostic() {
        let provider = InMemoryProvider::new([(
            "/m/m.tcf",
            "Geometry Control File == missing.tgc\nA == 1\n",
        )]);
        let bs = load_build_state(Path::new("/m/m.tcf"), &LoaderConfig::with_provider(&provider))
            .unwrap();
        let res = bs
            .resolve_with(&Context::default(), &Resolver::with_provider(&provider))
            .unwrap();
        assert_eq!(res.run_state.statements.len(), 2);
        assert_eq!(res.diagnostics.len(), 1);
        assert_eq!(res.diagnostics[0].line, 1);
    }

    #[test]
    fn database_cells_get_event_values() {
        let provider = InMemoryProvider::new([
            (
                "/m/m.tcf",
                "Event File == e.tef\nBC Database == bc.csv\n",
            ),
            (
                "/m/e.tef",
                "Define Event == Q100\nBC Event Source == ~ARI~ | 100yr\nEnd Define\n",
            ),
            ("/m/bc.csv", "Name,Source\nIN,flow_~ARI~.csv\n"),
        ]);
        let bs = load_build_state(Path::new("/m/m.tcf"), &LoaderConfig::with_provider(&provider))
            .unwrap();
        let ctx = Context::new(Vec::<String>::new(), ["Q100"]);
        let res = bs
            .resolve_with(&ctx, &Resolver::with_provider(&provider))
            .unwrap();
        let db = res.run_state.statements[1]
            .children
            .iter()
            .find_map(|c| match c {
                RunChild::Database(t) => Some(t),
                _ => None,
            })
            .unwrap();
        assert_eq!(db.rows[0], vec!["IN", "flow_100yr.csv"]);
    }
}
