//! Conflict check pipeline
//!
//! [PIPELINE API] Checks candidate paths against gitignore-syntax pattern
//! files and reports every path an active pattern matches.
//!
//! ## Architecture
//!
//! ```text
//! SOURCE → DISPATCH → CONSUME
//!    │         │          │
//!    ▼         ▼          ▼
//! [paths]  [conflicts]  sink + [errors]
//! ```
//!
//! ### Stage Overview
//!
//! - **SOURCE**: Explicit paths, a shell command, `git diff` or stdin
//! - **DISPATCH**: Every path × every checker, on a bounded worker pool
//! - **CONSUME**: One output line per conflict; write failures go to an error channel
//!
//! All channels are bounded. A slow consumer stalls the workers, which stall
//! the source. The consumer's error channel closes when everything upstream
//! has finished.
//!
//! ## Usage
//!
//! ```ignore
//! use ilignore::pipeline::{CheckPipeline, ConflictConsumer, PathSource, PipelineConfig};
//!
//! let pipeline = CheckPipeline::from_pattern_files(&[".ilignore"], PipelineConfig::default())?;
//! let run = pipeline.run(PathSource::command("git ls-files"), ConflictConsumer::console());
//! let summary = run.wait();
//! ```

pub mod config;
pub mod stages;
pub mod types;

pub use config::{Concurrency, PipelineConfig};
pub use stages::{
    ConflictConsumer, Dispatch, DispatchCounters, DispatchStats, Dispatcher, FileChecker,
    IGNORE_FILE, PathSource, PatternChecker, SourceStage, load_checkers,
};
pub use types::{
    CheckError, CheckJob, CheckResult, Conflict, ConflictField, FieldSelection, OutputError,
    OutputFormat,
};

use crossbeam_channel::{Receiver, bounded};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// The conflict check pipeline.
///
/// Holds the loaded checkers; each `run` wires a fresh set of stages.
pub struct CheckPipeline {
    config: PipelineConfig,
    dispatcher: Dispatcher,
}

impl CheckPipeline {
    /// Create a pipeline over already built checkers.
    pub fn new(checkers: Vec<Arc<dyn FileChecker>>, config: PipelineConfig) -> CheckResult<Self> {
        let dispatcher = Dispatcher::new(checkers, &config)?;
        Ok(Self { config, dispatcher })
    }

    /// Load every pattern file and create a pipeline over them. Relative
    /// paths, of pattern files and candidates alike, are resolved against the
    /// working directory.
    ///
    /// Any unreadable pattern file is fatal.
    pub fn from_pattern_files<P: AsRef<Path>>(
        files: &[P],
        config: PipelineConfig,
    ) -> CheckResult<Self> {
        let base = std::env::current_dir().map_err(|e| CheckError::PatternFile {
            path: PathBuf::from("."),
            source: e,
        })?;
        Self::from_pattern_files_in(files, &base, config)
    }

    /// Same as `from_pattern_files`, resolving relative paths against `base`.
    pub fn from_pattern_files_in<P: AsRef<Path>>(
        files: &[P],
        base: &Path,
        config: PipelineConfig,
    ) -> CheckResult<Self> {
        let checkers = load_checkers(files, base)?;
        for checker in &checkers {
            tracing::debug!(
                "[pipeline] loaded {} patterns from {}",
                checker.pattern_count(),
                checker.path().display()
            );
            if !checker.invalid_lines().is_empty() {
                tracing::warn!(
                    "[pipeline] {} skipped invalid lines {:?}",
                    checker.path().display(),
                    checker.invalid_lines()
                );
            }
        }
        let checkers = checkers
            .into_iter()
            .map(|checker| Arc::new(checker) as Arc<dyn FileChecker>)
            .collect();
        Self::new(checkers, config)
    }

    /// Get the pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn checker_count(&self) -> usize {
        self.dispatcher.checker_count()
    }

    /// Start SOURCE and DISPATCH. The caller pulls conflicts from the
    /// returned stream.
    ///
    /// With a worker pool the source runs on its own thread behind the path
    /// channel. Inline, the source is read on the pulling thread.
    pub fn check(&self, source: PathSource) -> Dispatch {
        match self.config.concurrency {
            Concurrency::Inline => self.dispatcher.dispatch(source.into_paths()),
            Concurrency::Workers(_) => {
                let (path_tx, path_rx) = bounded(self.config.path_channel_size.max(1));
                thread::spawn(move || {
                    let sent = SourceStage::new(source).run(path_tx);
                    tracing::debug!("[source] sent {sent} paths");
                });
                self.dispatcher.dispatch(path_rx)
            }
        }
    }

    /// Run every stage, with `consumer` writing on its own thread.
    pub fn run(&self, source: PathSource, consumer: ConflictConsumer) -> PipelineRun {
        let start = Instant::now();
        tracing::info!(
            "[pipeline] checking against {} pattern files ({})",
            self.checker_count(),
            self.config.concurrency
        );

        let dispatch = self.check(source);
        let counters = dispatch.counters();
        let errors = consumer
            .with_error_channel_size(self.config.error_channel_size)
            .consume(dispatch);

        PipelineRun {
            errors,
            counters,
            start,
        }
    }
}

/// A running pipeline.
///
/// The error channel is the completion signal: it disconnects once every
/// conflict has been written.
pub struct PipelineRun {
    errors: Receiver<OutputError>,
    counters: Arc<DispatchCounters>,
    start: Instant,
}

impl PipelineRun {
    /// Block until the pipeline is done, logging every output error.
    pub fn wait(self) -> RunSummary {
        let mut output_errors = 0;
        for error in self.errors.iter() {
            tracing::error!("[consume] {error}");
            output_errors += 1;
        }

        let summary = RunSummary {
            stats: self.counters.snapshot(),
            output_errors,
            elapsed: self.start.elapsed(),
        };
        tracing::info!(
            "[pipeline] done: paths={}, jobs={}, conflicts={}, job_errors={}, output_errors={} in {:?}",
            summary.stats.paths,
            summary.stats.jobs,
            summary.stats.conflicts,
            summary.stats.job_errors,
            summary.output_errors,
            summary.elapsed
        );
        summary
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub stats: DispatchStats,
    pub output_errors: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn has_conflicts(&self) -> bool {
        self.stats.conflicts > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap().clone();
            let mut lines: Vec<String> = String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect();
            lines.sort();
            lines
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn pipeline(dir: &TempDir, concurrency: Concurrency) -> CheckPipeline {
        let patterns = dir.path().join(IGNORE_FILE);
        std::fs::write(&patterns, "*.log\n!keep.log\nsecrets/\n").unwrap();
        let config = PipelineConfig::default().with_concurrency(concurrency);
        CheckPipeline::from_pattern_files_in(&[patterns], dir.path(), config).unwrap()
    }

    fn source() -> PathSource {
        PathSource::fixed(["app.log", "keep.log", "src/main.rs", "secrets/key.pem"])
    }

    #[test]
    fn test_run_writes_conflicts() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, Concurrency::workers(2));

        let buffer = SharedBuffer::default();
        let consumer =
            ConflictConsumer::new(buffer.clone()).with_fields(FieldSelection::name_only());
        let summary = pipeline.run(source(), consumer).wait();

        assert_eq!(buffer.lines(), vec!["app.log", "secrets/key.pem"]);
        assert_eq!(summary.stats.paths, 4);
        assert_eq!(summary.stats.conflicts, 2);
        assert_eq!(summary.output_errors, 0);
        assert!(summary.has_conflicts());
    }

    #[test]
    fn test_inline_matches_pooled() {
        let dir = TempDir::new().unwrap();

        let inline: Vec<Conflict> = pipeline(&dir, Concurrency::Inline).check(source()).collect();
        let mut pooled: Vec<Conflict> = pipeline(&dir, Concurrency::workers(4))
            .check(source())
            .collect();
        pooled.sort();

        let mut sorted_inline = inline.clone();
        sorted_inline.sort();
        assert_eq!(sorted_inline, pooled);

        // Inline keeps source order
        let files: Vec<_> = inline.iter().map(|c| c.file.as_str()).collect();
        assert_eq!(files, vec!["app.log", "secrets/key.pem"]);
        println!("conflicts: {inline:?}");
    }

    #[test]
    fn test_conflict_provenance() {
        let dir = TempDir::new().unwrap();
        let conflicts: Vec<Conflict> = pipeline(&dir, Concurrency::Inline)
            .check(PathSource::fixed(["debug.log"]))
            .collect();

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].pattern, "*.log");
        assert_eq!(conflicts[0].line, Some(1));
        assert_eq!(conflicts[0].ignore_file, dir.path().join(IGNORE_FILE));
    }

    #[test]
    fn test_empty_source_finishes() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, Concurrency::workers(3));

        let summary = pipeline
            .run(PathSource::fixed(Vec::<String>::new()), ConflictConsumer::new(io::sink()))
            .wait();

        assert_eq!(summary.stats, DispatchStats::default());
        assert!(!summary.has_conflicts());
    }

    #[test]
    fn test_missing_pattern_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.ignore");
        let result = CheckPipeline::from_pattern_files(&[missing], PipelineConfig::default());
        assert!(matches!(result, Err(CheckError::PatternFile { .. })));
    }
}
