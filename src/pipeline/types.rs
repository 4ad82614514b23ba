//! Core types for the check pipeline
//!
//! This module defines the data structures that flow through pipeline stages.
//! Paths flow from SOURCE into DISPATCH as plain strings, DISPATCH pairs them
//! with checkers as `CheckJob`s, and `Conflict`s flow out to CONSUME.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use super::stages::checker::FileChecker;

// ═══════════════════════════════════════════════════════════════════════════
// DISPATCH stage output
// ═══════════════════════════════════════════════════════════════════════════

/// A path matched by an ignore pattern that no later pattern negated.
///
/// Created by a checker, consumed exactly once by the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Conflict {
    /// Offending file, as it was produced by the path source
    pub file: String,
    /// Pattern file (gitignore syntax) that matched
    pub ignore_file: PathBuf,
    /// 1-based line in `ignore_file` holding the matching pattern, if known
    pub line: Option<usize>,
    /// Raw text of the matching pattern
    pub pattern: String,
}

impl Conflict {
    pub fn new(
        file: impl Into<String>,
        ignore_file: impl Into<PathBuf>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            ignore_file: ignore_file.into(),
            line: None,
            pattern: pattern.into(),
        }
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Line number as displayed: `-1` when the matcher did not report one.
    pub fn display_line(&self) -> String {
        match self.line {
            Some(line) => line.to_string(),
            None => "-1".to_string(),
        }
    }
}

/// One (path, checker) pair. Claimed by exactly one worker.
#[derive(Clone)]
pub struct CheckJob {
    pub path: Arc<str>,
    pub checker: Arc<dyn FileChecker>,
}

impl CheckJob {
    pub fn new(path: Arc<str>, checker: Arc<dyn FileChecker>) -> Self {
        Self { path, checker }
    }

    pub fn run(&self) -> CheckResult<Option<Conflict>> {
        self.checker.check_file(&self.path)
    }
}

impl fmt::Debug for CheckJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckJob")
            .field("path", &self.path)
            .field("ignore_file", &self.checker.ignore_file())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONSUME stage configuration
// ═══════════════════════════════════════════════════════════════════════════

/// A conflict field that can be selected for output.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictField {
    File,
    IgnoreFile,
    Line,
    Pattern,
}

type FieldAccessor = fn(&Conflict) -> Cow<'_, str>;

/// Output order and accessor for every field.
const FIELD_TABLE: [(ConflictField, FieldAccessor); 4] = [
    (ConflictField::File, file_value),
    (ConflictField::IgnoreFile, ignore_file_value),
    (ConflictField::Line, line_value),
    (ConflictField::Pattern, pattern_value),
];

fn file_value(c: &Conflict) -> Cow<'_, str> {
    Cow::Borrowed(c.file.as_str())
}

fn ignore_file_value(c: &Conflict) -> Cow<'_, str> {
    c.ignore_file.to_string_lossy()
}

fn line_value(c: &Conflict) -> Cow<'_, str> {
    Cow::Owned(c.display_line())
}

fn pattern_value(c: &Conflict) -> Cow<'_, str> {
    Cow::Borrowed(c.pattern.as_str())
}

impl ConflictField {
    pub const ALL: [ConflictField; 4] = [
        ConflictField::File,
        ConflictField::IgnoreFile,
        ConflictField::Line,
        ConflictField::Pattern,
    ];

    /// Render this field of `conflict` as text.
    pub fn value<'a>(&self, conflict: &'a Conflict) -> Cow<'a, str> {
        FIELD_TABLE
            .iter()
            .find(|(field, _)| field == self)
            .map(|(_, accessor)| accessor(conflict))
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictField::File => "file",
            ConflictField::IgnoreFile => "ignore-file",
            ConflictField::Line => "line",
            ConflictField::Pattern => "pattern",
        }
    }
}

impl fmt::Display for ConflictField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        ConflictField::ALL
            .into_iter()
            .find(|field| {
                field.as_str() == normalized || field.as_str().replace('-', "") == normalized
            })
            .ok_or_else(|| format!("unknown conflict field '{s}'"))
    }
}

/// Non-empty set of fields, always iterated in the fixed output order
/// File, IgnoreFile, Line, Pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelection {
    fields: Vec<ConflictField>,
}

impl FieldSelection {
    /// Every field.
    pub fn all() -> Self {
        Self {
            fields: ConflictField::ALL.to_vec(),
        }
    }

    /// Only the offending file name.
    pub fn name_only() -> Self {
        Self {
            fields: vec![ConflictField::File],
        }
    }

    /// Select a subset. An empty selection means every field.
    pub fn new(fields: impl IntoIterator<Item = ConflictField>) -> Self {
        let mut fields: Vec<_> = fields.into_iter().collect();
        fields.sort();
        fields.dedup();
        if fields.is_empty() {
            return Self::all();
        }
        Self { fields }
    }

    pub fn fields(&self) -> &[ConflictField] {
        &self.fields
    }

    pub fn contains(&self, field: ConflictField) -> bool {
        self.fields.contains(&field)
    }
}

impl Default for FieldSelection {
    fn default() -> Self {
        Self::all()
    }
}

/// How conflicts are written to the sink.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Selected fields joined by ", "
    #[default]
    Text,
    /// One JSON object per line with the selected fields
    Json,
}

// ═══════════════════════════════════════════════════════════════════════════
// Error types
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("Cannot open pattern file {path}: {source}")]
    PatternFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot build matcher for pattern file {path}: {reason}")]
    PatternBuild { path: PathBuf, reason: String },

    #[error("No pattern files configured")]
    NoCheckers,

    #[error("Cannot stat {path}: {source}")]
    Stat {
        path: String,
        source: std::io::Error,
    },
}

/// Result type for pipeline operations.
pub type CheckResult<T> = Result<T, CheckError>;

/// Failures while rendering or writing a conflict. Reported on the
/// consumer's error channel, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Error formatting conflict for {file}: {reason}")]
    Format { file: String, reason: String },

    #[error("Error writing conflict for {file}: {source}")]
    Write {
        file: String,
        source: std::io::Error,
    },

    #[error("Error flushing output: {0}")]
    Flush(std::io::Error),
}
