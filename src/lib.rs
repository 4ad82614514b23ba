//! ilignore: flag files that match gitignore-syntax patterns.
//!
//! A path conflicts when a pattern in one of the configured pattern files
//! matches it and no later negated pattern re-includes it. Typical use is a
//! pre-commit check of staged files that must never be committed.

pub mod cli;
pub mod config;
pub mod logging;
pub mod pipeline;

pub use config::Settings;
pub use pipeline::{
    CheckError, CheckPipeline, Concurrency, Conflict, ConflictConsumer, ConflictField,
    FieldSelection, FileChecker, OutputError, OutputFormat, PathSource, PatternChecker,
    PipelineConfig, RunSummary,
};
