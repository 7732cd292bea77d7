//! Source provider abstraction for filesystem-independent loading.
//!
//! The [`SourceProvider`] trait abstracts file I/O so a control-file tree can
//! be loaded from disk or from memory (tests, embedding).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Trait that abstracts file I/O for loading and writing control files.
pub trait SourceProvider {
    /// Read the source text for a given path.
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error>;

    /// Resolve a file reference (as written in a control file, possibly with
    /// `\` separators) against the directory of the referencing file.
    fn resolve_reference(&self, base: &Path, reference: &str) -> PathBuf {
        normalize_path(&base.join(reference.trim().replace('\\', "/")))
    }

    /// Canonicalize a path for cycle detection.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error>;

    /// Every existing file matching a glob pattern, sorted.
    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>, std::io::Error>;

    /// Write source text, replacing any existing content.
    fn write_source(&self, path: &Path, text: &str) -> Result<(), std::io::Error>;

    fn exists(&self, path: &Path) -> bool {
        self.canonicalize(path).is_ok()
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            other => components.push(other),
        }
    }
    components.iter().collect()
}

/// Default filesystem-backed source provider.
pub struct FileSystemProvider;

impl SourceProvider for FileSystemProvider {
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error> {
        std::fs::read_to_string(path)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error> {
        path.canonicalize()
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>, std::io::Error> {
        let paths = glob::glob(pattern)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
        let mut found = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| e.into_error())?;
            if path.is_file() {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }

    fn write_source(&self, path: &Path, text: &str) -> Result<(), std::io::Error> {
        std::fs::write(path, text)
    }
}

/// In-memory source provider for tests and embedding.
///
/// Maps normalized paths to source text. Writes go to the same map.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    files: RefCell<BTreeMap<PathBuf, String>>,
}

impl InMemoryProvider {
    pub fn new<I, P, S>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, S)>,
        P: AsRef<Path>,
        S: Into<String>,
    {
        let files = files
            .into_iter()
            .map(|(p, s)| (normalize_path(p.as_ref()), s.into()))
            .collect();
        Self {
            files: RefCell::new(files),
        }
    }

    /// Current content of a file, including anything written since creation.
    pub fn get(&self, path: &Path) -> Option<String> {
        self.files.borrow().get(&normalize_path(path)).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.borrow().keys().cloned().collect()
    }
}

impl SourceProvider for InMemoryProvider {
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error> {
        let normalized = normalize_path(path);
        self.files.borrow().get(&normalized).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found in memory: {}", normalized.display()),
            )
        })
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error> {
        let normalized = normalize_path(path);
        let files = self.files.borrow();
        if files.contains_key(&normalized) || files.keys().any(|k| k.starts_with(&normalized)) {
            Ok(normalized)
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "path not found in memory provider: {}",
                    normalized.display()
                ),
            ))
        }
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>, std::io::Error> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
        let options = glob::MatchOptions {
            case_sensitive: false,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        Ok(self
            .files
            .borrow()
            .keys()
            .filter(|p| pattern.matches_path_with(p, options))
            .cloned()
            .collect())
    }

    fn write_source(&self, path: &Path, text: &str) -> Result<(), std::io::Error> {
        self.files
            .borrow_mut()
            .insert(normalize_path(path), text.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_resolves_dot_and_dotdot() {
        let p = Path::new("/a/b/../c/./d");
        assert_eq!(normalize_path(p), PathBuf::from("/a/c/d"));
        assert_eq!(normalize_path(Path::new("../x/./y")), PathBuf::from("../x/y"));
    }

    #[test]
    fn resolve_reference_accepts_backslashes() {
        let provider = InMemoryProvider::default();
        let resolved = provider.resolve_reference(Path::new("/m/runs"), r"..\model\geo.tgc");
        assert_eq!(resolved, PathBuf::from("/m/model/geo.tgc"));
    }

    #[test]
    fn in_memory_read_source_found() {
        let provider = InMemoryProvider::new([("/test.tcf", "Cell Size == 5")]);
        let content = provider.read_source(Path::new("/test.tcf")).unwrap();
        assert_eq!(content, "Cell Size == 5");
    }

    #[test]
    fn in_memory_read_source_not_found() {
        let provider = InMemoryProvider::default();
        let err = provider.read_source(Path::new("/missing.tcf")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn in_memory_canonicalize_directory_prefix() {
        let provider = InMemoryProvider::new([("/root/test.tcf", "")]);
        assert_eq!(
            provider.canonicalize(Path::new("/root")).unwrap(),
            PathBuf::from("/root")
        );
        assert!(provider.canonicalize(Path::new("/nonexistent")).is_err());
    }

    #[test]
    fn in_memory_glob_is_case_insensitive_and_stays_in_directory() {
        let provider = InMemoryProvider::new([
            ("/m/geo_EXG.tgc", ""),
            ("/m/geo_DEV.TGC", ""),
            ("/m/sub/geo_X.tgc", ""),
        ]);
        let found = provider.glob("/m/geo_*.tgc").unwrap();
        assert_eq!(
            found,
            vec![PathBuf::from("/m/geo_DEV.TGC"), PathBuf::from("/m/geo_EXG.tgc")]
        );
    }

    #[test]
    fn in_memory_write_then_read() {
        let provider = InMemoryProvider::default();
        provider.write_source(Path::new("/out/a.tcf"), "x").unwrap();
        assert_eq!(provider.get(Path::new("/out/./a.tcf")).as_deref(), Some("x"));
    }
}
