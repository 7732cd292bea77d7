//! Pass 1: read a root control file and every file it references, producing
//! the scoped statement tree.

use crate::ast::{ChildContent, ChildRef, ControlFileKind, Provenance, Statement, StatementId, StatementKind};
use crate::build_state::BuildState;
use crate::error::{ControlError, Diagnostic};
use crate::expand::{self, VariableMap};
use crate::external::{CsvDatabase, Table, TabularDatabase};
use crate::lexer::{DefaultLineParser, LineParser, RunningConfig};
use crate::pass2_file_scopes::figure_out_file_scopes;
use crate::scope::ScopeList;
use crate::source::{FileSystemProvider, SourceProvider};
use crate::tracker::{attach_close, BlockTracker, Tracked};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Collaborators and limits for loading.
pub struct LoaderConfig<'a> {
    pub provider: &'a dyn SourceProvider,
    pub parser: &'a dyn LineParser,
    pub running: RunningConfig,
    /// Reader for database references; `None` leaves them unloaded.
    pub tabular: Option<&'a dyn TabularDatabase>,
    /// Load referenced control files and databases.
    pub load_children: bool,
    /// Deepest chain of nested control files followed.
    pub max_depth: usize,
}

impl Default for LoaderConfig<'static> {
    fn default() -> Self {
        LoaderConfig {
            provider: &FileSystemProvider,
            parser: &DefaultLineParser,
            running: RunningConfig::default(),
            tabular: Some(&CsvDatabase),
            load_children: true,
            max_depth: 32,
        }
    }
}

impl<'a> LoaderConfig<'a> {
    /// Default settings reading through `provider`.
    pub fn with_provider(provider: &'a dyn SourceProvider) -> Self {
        LoaderConfig {
            provider,
            ..LoaderConfig::default()
        }
    }
}

/// Load `root` and, unless disabled, every control file and database it
/// references, recursively.
///
/// Only a failure of the root file itself is an error. A child that cannot
/// be read or parsed is recorded as a [`Diagnostic`] on its parent and loading
/// carries on.
pub fn load_build_state(root: &Path, config: &LoaderConfig<'_>) -> Result<BuildState, ControlError> {
    let mut loader = Loader {
        config,
        stack: Vec::new(),
        stack_set: HashSet::new(),
    };
    let kind = ControlFileKind::from_path(root);
    let mut state = loader.load_file(root, kind, 0)?;
    figure_out_file_scopes(&mut state);
    Ok(state)
}

/// Parse one file's text without touching any provider. References are
/// left unloaded.
pub fn parse_build_state(path: &Path, text: &str) -> Result<BuildState, ControlError> {
    let statements = parse_statements(
        text,
        &path.display().to_string(),
        &display_name(path),
        &DefaultLineParser,
        &RunningConfig::default(),
    )?;
    Ok(BuildState::new(
        path.to_owned(),
        ControlFileKind::from_path(path),
        statements,
        Vec::new(),
    ))
}

struct Loader<'c, 'a> {
    config: &'c LoaderConfig<'a>,
    stack: Vec<PathBuf>,
    stack_set: HashSet<PathBuf>,
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

/// Turn file text into statements.
pub fn parse_statements(
    src: &str,
    file: &str,
    id_file: &str,
    parser: &dyn LineParser,
    running: &RunningConfig,
) -> Result<Vec<Statement>, ControlError> {
    let mut tracker = BlockTracker::new(file);
    let mut ordinals: HashMap<String, usize> = HashMap::new();
    let mut statements = Vec::new();

    for (i, raw) in src.lines().enumerate() {
        let lineno = i as u32 + 1;
        let line = parser.classify(raw, running);
        let prov = Provenance {
            file: file.to_owned(),
            line: lineno,
        };
        match tracker.process(&line, lineno)? {
            Tracked::Content(scope) => {
                let ordinal = ordinals.entry(line.text.clone()).or_insert(0);
                let id = StatementId::compute(id_file, &line.text, *ordinal);
                *ordinal += 1;
                statements.push(Statement {
                    id,
                    raw: line.text.clone(),
                    command: line.command.clone(),
                    value: line.value.clone(),
                    comment: line.comment.clone(),
                    kind: line.statement_kind(),
                    scope,
                    prov,
                    children: Vec::new(),
                });
            }
            Tracked::Structural {
                placeholder: Some(scope),
            } => {
                let ordinal = ordinals.entry(String::new()).or_insert(0);
                statements.push(Statement::placeholder(id_file, scope, prov, *ordinal));
                *ordinal += 1;
            }
            Tracked::Structural { placeholder: None } => {}
        }
    }
    tracker.finish()?;
    for statement in &mut statements {
        for (block, text) in tracker.closes() {
            attach_close(&mut statement.scope, *block, text);
        }
    }
    Ok(statements)
}

impl Loader<'_, '_> {
    fn load_file(
        &mut self,
        path: &Path,
        kind: ControlFileKind,
        depth: usize,
    ) -> Result<BuildState, ControlError> {
        let provider = self.config.provider;
        let file = path.display().to_string();
        let canon = provider
            .canonicalize(path)
            .map_err(|e| ControlError::io(&file, format!("cannot open file: {}", e)))?;

        if self.stack_set.contains(&canon) {
            let mut chain: Vec<String> = self.stack.iter().map(|p| display_name(p)).collect();
            chain.push(display_name(path));
            return Err(ControlError::io(
                &file,
                format!("control file cycle: {}", chain.join(" \u{2192} ")),
            ));
        }

        let src = provider
            .read_source(path)
            .map_err(|e| ControlError::io(&file, format!("cannot read file: {}", e)))?;
        tracing::debug!(file = %file, ?kind, depth, "loading control file");

        let id_file = display_name(path);
        let mut statements =
            parse_statements(&src, &file, &id_file, self.config.parser, &self.config.running)?;

        let mut diagnostics = Vec::new();
        if self.config.load_children {
            self.stack_set.insert(canon.clone());
            self.stack.push(canon.clone());
            let base_dir = path.parent().unwrap_or(Path::new(".")).to_owned();
            for statement in &mut statements {
                if statement.kind.has_child() {
                    self.load_children(statement, &base_dir, depth, &mut diagnostics);
                }
            }
            self.stack.pop();
            self.stack_set.remove(&canon);
        }

        Ok(BuildState::new(path.to_owned(), kind, statements, diagnostics))
    }

    /// Every file a reference names. Wildcard tokens match anything at build
    /// time; every variant is loaded.
    fn matches(&self, base_dir: &Path, template: &str) -> Result<Vec<PathBuf>, std::io::Error> {
        let provider = self.config.provider;
        if expand::has_wildcards(template) {
            return expand::resolve_file_reference(
                base_dir,
                template,
                &VariableMap::new(),
                &[],
                &[],
                provider,
            );
        }
        Ok(vec![provider.resolve_reference(base_dir, template)])
    }

    fn load_children(
        &mut self,
        statement: &mut Statement,
        base_dir: &Path,
        depth: usize,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        let Some(template) = statement.value.clone() else {
            return;
        };
        let mut fail = |reason: String| {
            tracing::warn!(file = %statement.prov.file, line = statement.prov.line, "{}", reason);
            diagnostics.push(Diagnostic::new(
                &statement.prov.file,
                statement.prov.line,
                Some(&statement.raw),
                reason,
            ));
        };

        let paths = match self.matches(base_dir, &template) {
            Ok(paths) if paths.is_empty() => {
                fail(format!("no file matches '{}'", template));
                return;
            }
            Ok(paths) => paths,
            Err(e) => {
                fail(format!("cannot search for '{}': {}", template, e));
                return;
            }
        };

        let mut children = Vec::new();
        for path in paths {
            let content = match statement.kind {
                StatementKind::ControlFileReference(kind) => {
                    if depth + 1 > self.config.max_depth {
                        let reason = format!(
                            "'{}' exceeds the maximum nesting depth of {}",
                            path.display(),
                            self.config.max_depth
                        );
                        fail(reason.clone());
                        ChildContent::Failed(reason)
                    } else {
                        match self.load_file(&path, kind, depth + 1) {
                            Ok(child) => ChildContent::ControlFile(Box::new(child)),
                            Err(e) => {
                                fail(e.to_string());
                                ChildContent::Failed(e.message)
                            }
                        }
                    }
                }
                StatementKind::DatabaseReference => match self.config.tabular {
                    Some(db) => match db.rows(&path, self.config.provider) {
                        Ok(rows) => ChildContent::Database(Table::from_rows(rows)),
                        Err(e) => {
                            let reason = format!("cannot read database '{}': {}", path.display(), e);
                            fail(reason.clone());
                            ChildContent::Failed(reason)
                        }
                    },
                    None => continue,
                },
                _ => continue,
            };
            children.push(ChildRef {
                path,
                scope: ScopeList::default(),
                content,
            });
        }
        statement.children = children;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryProvider;

    fn load(provider: &InMemoryProvider, root: &str) -> Result<BuildState, ControlError> {
        load_build_state(Path::new(root), &LoaderConfig::with_provider(provider))
    }

    #[test]
    fn statements_get_scopes_and_stable_ids() {
        let provider = InMemoryProvider::new([(
            "/m/a.tcf",
            "Cell Size == 5\nIf Scenario == D01\n    Cell Size == 5\nEnd If\n",
        )]);
        let bs = load(&provider, "/m/a.tcf").unwrap();
        assert_eq!(bs.statements.len(), 2);
        assert_eq!(bs.statements[1].scope.to_string(), "Global & Scenario(D01)");
        assert_ne!(bs.statements[0].id, bs.statements[1].id);
        let again = load(&provider, "/m/a.tcf").unwrap();
        assert_eq!(again.statements[1].id, bs.statements[1].id);
    }

    #[test]
    fn missing_root_is_fatal() {
        let provider = InMemoryProvider::default();
        let err = load(&provider, "/m/none.tcf").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Io);
    }

    #[test]
    fn missing_child_is_a_diagnostic() {
        let provider = InMemoryProvider::new([(
            "/m/a.tcf",
            "Geometry Control File == geo.tgc\nTimestep == 1\n",
        )]);
        let bs = load(&provider, "/m/a.tcf").unwrap();
        assert_eq!(bs.statements.len(), 2);
        assert_eq!(bs.diagnostics.len(), 1);
        assert_eq!(bs.diagnostics[0].line, 1);
        assert!(matches!(
            bs.statements[0].children[0].content,
            ChildContent::Failed(_)
        ));
    }

    #[test]
    fn cycles_are_diagnostics() {
        let provider = InMemoryProvider::new([
            ("/m/a.tcf", "Geometry Control File == b.tgc\n"),
            ("/m/b.tgc", "Read File == a.trd\n"),
            ("/m/a.trd", "Read File == a.trd\n"),
        ]);
        let bs = load(&provider, "/m/a.tcf").unwrap();
        let diags = bs.all_diagnostics();
        assert_eq!(diags.len(), 1);
        assert!(diags[0].reason.contains("cycle"));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let provider = InMemoryProvider::new([
            ("/m/a.tcf", "Read File == b.trd\n"),
            ("/m/b.trd", "Read File == c.trd\n"),
            ("/m/c.trd", "X == 1\n"),
        ]);
        let config = LoaderConfig {
            max_depth: 1,
            ..LoaderConfig::with_provider(&provider)
        };
        let bs = load_build_state(Path::new("/m/a.tcf"), &config).unwrap();
        let diags = bs.all_diagnostics();
        assert_eq!(diags.len(), 1);
        assert!(diags[0].reason.contains("maximum nesting depth"));
    }

    #[test]
    fn databases_are_read_as_tables() {
        let provider = InMemoryProvider::new([
            ("/m/a.tbc", "BC Database == bc_dbase.csv\n"),
            ("/m/bc_dbase.csv", "Name,Source\nFC01,fc01.csv\n"),
        ]);
        let bs = load(&provider, "/m/a.tbc").unwrap();
        match &bs.statements[0].children[0].content {
            ChildContent::Database(t) => assert_eq!(t.rows, vec![vec!["FC01", "fc01.csv"]]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn load_children_switch() {
        let provider = InMemoryProvider::new([("/m/a.tcf", "Geometry Control File == geo.tgc\n")]);
        let config = LoaderConfig {
            load_children: false,
            ..LoaderConfig::with_provider(&provider)
        };
        let bs = load_build_state(Path::new("/m/a.tcf"), &config).unwrap();
        assert!(bs.statements[0].children.is_empty());
        assert!(bs.diagnostics.is_empty());
    }

    #[test]
    fn block_errors_carry_location() {
        let provider = InMemoryProvider::new([("/m/a.tcf", "X == 1\nEnd If\n")]);
        let err = load(&provider, "/m/a.tcf").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.file, "/m/a.tcf");
    }
}
