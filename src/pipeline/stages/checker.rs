//! Checker stage - one pattern file, one path at a time
//!
//! Wraps the `ignore` crate's gitignore matcher. Each checker owns one parsed
//! pattern file and is shared read-only across all dispatch workers.
//!
//! Candidates are resolved against a base directory (the working directory
//! by default), then matched relative to the directory holding the pattern
//! file. Candidates outside that directory never conflict.

use crate::pipeline::types::{CheckError, CheckResult, Conflict};
use ignore::Match;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Default pattern file name.
pub const IGNORE_FILE: &str = ".ilignore";

/// Maps a candidate path to an optional conflict.
///
/// Implementations must be safe to call from any number of workers at once.
pub trait FileChecker: Send + Sync {
    /// Check one path. `Ok(None)` means the path does not conflict.
    fn check_file(&self, path: &str) -> CheckResult<Option<Conflict>>;

    /// Pattern file this checker reports in its conflicts.
    fn ignore_file(&self) -> &Path;
}

/// A pattern line accepted by the matcher.
#[derive(Debug, Clone)]
struct PatternLine {
    line: usize,
    text: String,
}

/// Checker backed by one gitignore-syntax pattern file.
#[derive(Debug)]
pub struct PatternChecker {
    /// Pattern file as configured
    path: PathBuf,
    /// Directory holding the pattern file, absolute
    root: PathBuf,
    /// Directory relative candidates are resolved against, absolute
    base: PathBuf,
    matcher: Gitignore,
    patterns: Vec<PatternLine>,
    invalid_lines: Vec<usize>,
}

impl PatternChecker {
    /// Parse `path` eagerly, resolving candidates against the working
    /// directory.
    pub fn from_file(path: impl Into<PathBuf>) -> CheckResult<Self> {
        let path = path.into();
        let base = std::env::current_dir().map_err(|e| CheckError::PatternFile {
            path: path.clone(),
            source: e,
        })?;
        Self::from_file_in(path, base)
    }

    /// Parse `path` eagerly. Relative pattern file and candidate paths are
    /// resolved against `base`.
    ///
    /// Fails if the file cannot be resolved, read, or compiled. Lines with bad
    /// glob syntax are logged and skipped; the remaining lines stay active.
    pub fn from_file_in(path: impl Into<PathBuf>, base: impl AsRef<Path>) -> CheckResult<Self> {
        let path = path.into();
        let base = base.as_ref();
        let base = fs::canonicalize(base).unwrap_or_else(|_| normalize(base));
        let absolute = fs::canonicalize(base.join(&path)).map_err(|e| CheckError::PatternFile {
            path: path.clone(),
            source: e,
        })?;
        let content = fs::read_to_string(&absolute).map_err(|e| CheckError::PatternFile {
            path: path.clone(),
            source: e,
        })?;
        let root = absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));

        let mut builder = GitignoreBuilder::new(&root);
        let mut patterns = Vec::new();
        let mut invalid_lines = Vec::new();

        for (index, raw) in content.lines().enumerate() {
            let line = index + 1;
            let raw = if index == 0 {
                raw.trim_start_matches('\u{feff}')
            } else {
                raw
            };

            match builder.add_line(Some(path.clone()), raw) {
                Ok(_) => {
                    if let Some(text) = pattern_text(raw) {
                        patterns.push(PatternLine {
                            line,
                            text: text.to_string(),
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "[checker] {}:{line}: invalid pattern {raw:?}: {e}",
                        path.display()
                    );
                    invalid_lines.push(line);
                }
            }
        }

        let matcher = builder.build().map_err(|e| CheckError::PatternBuild {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        tracing::debug!(
            "[checker] loaded {}: {} patterns, {} invalid lines, root {}",
            path.display(),
            patterns.len(),
            invalid_lines.len(),
            root.display()
        );

        Ok(Self {
            path,
            root,
            base,
            matcher,
            patterns,
            invalid_lines,
        })
    }

    /// Pattern file as configured.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the pattern file. Patterns are matched relative to it.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory relative candidates are resolved against.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Number of active patterns.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// 1-based line numbers rejected as invalid patterns.
    pub fn invalid_lines(&self) -> &[usize] {
        &self.invalid_lines
    }

    /// Line of the winning pattern. Later lines take precedence, so the last
    /// line with the same text is the one the matcher picked.
    fn line_of(&self, original: &str) -> Option<usize> {
        self.patterns
            .iter()
            .rev()
            .find(|p| p.text == original)
            .map(|p| p.line)
    }
}

impl FileChecker for PatternChecker {
    fn check_file(&self, path: &str) -> CheckResult<Option<Conflict>> {
        let absolute = normalize(&self.base.join(path));
        let relative = match absolute.strip_prefix(&self.root) {
            Ok(relative) if !relative.as_os_str().is_empty() => relative,
            _ => {
                tracing::trace!("[checker] {path} is outside of {}", self.root.display());
                return Ok(None);
            }
        };

        // Missing paths (e.g. deleted files in a diff) are matched as files
        let is_dir = match fs::metadata(&absolute) {
            Ok(metadata) => metadata.is_dir(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                return Err(CheckError::Stat {
                    path: path.to_string(),
                    source: e,
                });
            }
        };

        match self.matcher.matched_path_or_any_parents(relative, is_dir) {
            Match::None => Ok(None),
            Match::Whitelist(glob) => {
                tracing::info!(
                    "[checker] {path} included by negated pattern {:?} in {}",
                    glob.original(),
                    self.path.display()
                );
                Ok(None)
            }
            Match::Ignore(glob) => {
                let mut conflict = Conflict::new(path, self.path.clone(), glob.original());
                if let Some(line) = self.line_of(glob.original()) {
                    conflict = conflict.with_line(line);
                }
                tracing::debug!("[checker] conflict: {conflict:?}");
                Ok(Some(conflict))
            }
        }
    }

    fn ignore_file(&self) -> &Path {
        &self.path
    }
}

/// Text the matcher keeps for a pattern line, or `None` for blanks and comments.
fn pattern_text(raw: &str) -> Option<&str> {
    if raw.starts_with('#') {
        return None;
    }
    let text = if raw.ends_with("\\ ") {
        raw
    } else {
        raw.trim_end()
    };
    (!text.is_empty()).then_some(text)
}

/// Lexically fold `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Load every configured pattern file, resolving relative paths against
/// `base`. The first failure aborts.
pub fn load_checkers<P: AsRef<Path>>(
    paths: &[P],
    base: &Path,
) -> CheckResult<Vec<PatternChecker>> {
    if paths.is_empty() {
        return Err(CheckError::NoCheckers);
    }
    paths
        .iter()
        .map(|p| PatternChecker::from_file_in(p.as_ref(), base))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_patterns(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_provenance_line_and_pattern() {
        let temp = TempDir::new().unwrap();
        let path = write_patterns(&temp, ".ilignore", "# generated\n*.log\nfoo.txt\n");

        let checker = PatternChecker::from_file_in(&path, temp.path()).unwrap();
        let conflict = checker.check_file("foo.txt").unwrap().unwrap();

        assert_eq!(
            conflict,
            Conflict::new("foo.txt", path.clone(), "foo.txt").with_line(3)
        );
    }

    #[test]
    fn test_negation_law() {
        let temp = TempDir::new().unwrap();
        let path = write_patterns(&temp, ".ilignore", "*.txt\n!keep.txt\n");
        let checker = PatternChecker::from_file_in(&path, temp.path()).unwrap();

        assert!(checker.check_file("keep.txt").unwrap().is_none());

        let conflict = checker.check_file("other.txt").unwrap().unwrap();
        assert_eq!(conflict.pattern, "*.txt");
        assert_eq!(conflict.line, Some(1));
    }

    #[test]
    fn test_no_match() {
        let temp = TempDir::new().unwrap();
        let path = write_patterns(&temp, ".ilignore", "*.log\n");
        let checker = PatternChecker::from_file_in(&path, temp.path()).unwrap();

        assert!(checker.check_file("src/main.rs").unwrap().is_none());
    }

    #[test]
    fn test_directory_pattern_matches_children() {
        let temp = TempDir::new().unwrap();
        let path = write_patterns(&temp, ".ilignore", "build/\n");
        let checker = PatternChecker::from_file_in(&path, temp.path()).unwrap();

        let conflict = checker.check_file("build/out/app.o").unwrap().unwrap();
        assert_eq!(conflict.pattern, "build/");
        assert_eq!(conflict.file, "build/out/app.o");
    }

    #[test]
    fn test_later_duplicate_pattern_wins() {
        let temp = TempDir::new().unwrap();
        let path = write_patterns(&temp, ".ilignore", "*.env\n!prod.env\n*.env\n");
        let checker = PatternChecker::from_file_in(&path, temp.path()).unwrap();

        let conflict = checker.check_file("prod.env").unwrap().unwrap();
        assert_eq!(conflict.line, Some(3));
    }

    #[test]
    fn test_invalid_lines_are_tolerated() {
        let temp = TempDir::new().unwrap();
        let path = write_patterns(&temp, ".ilignore", "[unclosed\n*.log\n");
        let checker = PatternChecker::from_file_in(&path, temp.path()).unwrap();

        assert_eq!(checker.invalid_lines(), &[1]);
        assert_eq!(checker.pattern_count(), 1);

        let conflict = checker.check_file("debug.log").unwrap().unwrap();
        assert_eq!(conflict.line, Some(2));
    }

    #[test]
    fn test_leading_bom_is_ignored() {
        let temp = TempDir::new().unwrap();
        let path = write_patterns(&temp, ".ilignore", "\u{feff}*.tmp\n");
        let checker = PatternChecker::from_file_in(&path, temp.path()).unwrap();

        let conflict = checker.check_file("a.tmp").unwrap().unwrap();
        assert_eq!(conflict.pattern, "*.tmp");
        assert_eq!(conflict.line, Some(1));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let temp = TempDir::new().unwrap();
        let result = PatternChecker::from_file(temp.path().join("missing"));

        assert!(matches!(result, Err(CheckError::PatternFile { .. })));
    }

    #[test]
    fn test_paths_outside_pattern_directory_never_conflict() {
        let temp = TempDir::new().unwrap();
        let path = write_patterns(&temp, ".ilignore", "*\n");
        let checker = PatternChecker::from_file_in(&path, temp.path()).unwrap();

        let outside = if cfg!(windows) {
            "C:\\elsewhere\\x.txt"
        } else {
            "/elsewhere/x.txt"
        };
        assert!(checker.check_file(outside).unwrap().is_none());
        assert!(checker.check_file("../sibling/x.txt").unwrap().is_none());
    }

    #[test]
    fn test_nested_pattern_file_matches_relative_to_its_directory() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        let path = temp.path().join("sub").join("p.ignore");
        fs::write(&path, "/a.env\n*.tmp\n").unwrap();

        let checker = PatternChecker::from_file_in("sub/p.ignore", temp.path()).unwrap();
        assert_eq!(checker.ignore_file(), Path::new("sub/p.ignore"));

        let anchored = checker.check_file("sub/a.env").unwrap().unwrap();
        assert_eq!(anchored.pattern, "/a.env");
        assert_eq!(anchored.line, Some(1));

        let inside = checker.check_file("sub/deep/x.tmp").unwrap().unwrap();
        assert_eq!(inside.line, Some(2));

        // Only the pattern file's directory is covered
        assert!(checker.check_file("other/x.tmp").unwrap().is_none());
        assert!(checker.check_file("a.env").unwrap().is_none());
        assert!(checker.check_file("sub/deep/a.env").unwrap().is_none());
    }

    #[test]
    fn test_directory_candidate_matches_directory_pattern() {
        let temp = TempDir::new().unwrap();
        let path = write_patterns(&temp, ".ilignore", ".vscode/\n");
        fs::create_dir(temp.path().join(".vscode")).unwrap();
        let checker = PatternChecker::from_file_in(&path, temp.path()).unwrap();

        let conflict = checker.check_file(".vscode").unwrap().unwrap();
        assert_eq!(conflict.pattern, ".vscode/");
        assert_eq!(conflict.file, ".vscode");

        let absolute = checker.root().join(".vscode");
        let conflict = checker.check_file(absolute.to_str().unwrap()).unwrap();
        assert!(conflict.is_some());

        // A missing path is matched as a file
        fs::write(temp.path().join("notes"), "x").unwrap();
        assert!(checker.check_file("notes").unwrap().is_none());
        assert!(checker.check_file("gone").unwrap().is_none());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/a/b/../../..")), PathBuf::from("/.."));
    }

    #[test]
    fn test_absolute_path_under_root() {
        let temp = TempDir::new().unwrap();
        let path = write_patterns(&temp, ".ilignore", "*.bin\n");
        let checker = PatternChecker::from_file_in(&path, temp.path()).unwrap();

        let candidate = checker.root().join("assets").join("blob.bin");
        let conflict = checker
            .check_file(candidate.to_str().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(conflict.pattern, "*.bin");
    }

    #[test]
    fn test_load_checkers() {
        let temp = TempDir::new().unwrap();
        let a = write_patterns(&temp, "a.ignore", "*.a\n");
        write_patterns(&temp, "b.ignore", "*.b\n");

        let checkers = load_checkers(&[a, PathBuf::from("b.ignore")], temp.path()).unwrap();
        assert_eq!(checkers.len(), 2);
        assert_eq!(checkers[1].path(), Path::new("b.ignore"));

        let none: [PathBuf; 0] = [];
        assert!(matches!(
            load_checkers(&none, temp.path()),
            Err(CheckError::NoCheckers)
        ));
    }

    #[test]
    fn test_pattern_text() {
        assert_eq!(pattern_text("# comment"), None);
        assert_eq!(pattern_text("   "), None);
        assert_eq!(pattern_text("*.log  "), Some("*.log"));
        assert_eq!(pattern_text("trailing\\ "), Some("trailing\\ "));
    }
}
