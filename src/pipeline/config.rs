//! Pipeline configuration
//!
//! Controls the worker pool and channel sizes for the check pipeline.
//! Reads from Settings (.ilignorerc.toml).

use crate::Settings;
use std::fmt;
use std::num::NonZeroUsize;

/// How jobs are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// Every stage runs in lockstep on the consuming thread
    Inline,
    /// A fixed pool of worker threads
    Workers(NonZeroUsize),
}

impl Concurrency {
    /// Resolve a signed level: `0` runs inline, a positive value is the
    /// worker count, a negative value uses every available CPU.
    pub fn from_level(level: i64) -> Self {
        match level {
            0 => Concurrency::Inline,
            n if n > 0 => Concurrency::workers(usize::try_from(n).unwrap_or(usize::MAX)),
            _ => Concurrency::available(),
        }
    }

    /// One worker per available CPU.
    pub fn available() -> Self {
        Concurrency::workers(num_cpus::get())
    }

    pub fn workers(count: usize) -> Self {
        Concurrency::Workers(NonZeroUsize::new(count).unwrap_or(NonZeroUsize::MIN))
    }

    /// Number of worker threads; zero when running inline.
    pub fn worker_count(&self) -> usize {
        match self {
            Concurrency::Inline => 0,
            Concurrency::Workers(n) => n.get(),
        }
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Concurrency::available()
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concurrency::Inline => write!(f, "inline"),
            Concurrency::Workers(n) => write!(f, "{n} workers"),
        }
    }
}

/// Configuration for the check pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Worker pool size (default: CPU count)
    pub concurrency: Concurrency,

    /// Channel capacity for paths (SOURCE → DISPATCH)
    pub path_channel_size: usize,

    /// Channel capacity for jobs (job builder → workers)
    pub job_channel_size: usize,

    /// Channel capacity for conflicts (workers → CONSUME). Kept small: this
    /// is where a slow consumer pushes back on the workers.
    pub conflict_channel_size: usize,

    /// Channel capacity for output errors (CONSUME → caller)
    pub error_channel_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: Concurrency::default(),
            path_channel_size: 256,
            job_channel_size: 256,
            conflict_channel_size: 16,
            error_channel_size: 16,
        }
    }
}

impl PipelineConfig {
    /// Create config from Settings.
    ///
    /// Reads from .ilignorerc.toml:
    /// - `check.concurrency` -> concurrency
    /// - `pipeline.path_channel_size` -> path_channel_size
    /// - `pipeline.job_channel_size` -> job_channel_size
    /// - `pipeline.conflict_channel_size` -> conflict_channel_size
    /// - `pipeline.error_channel_size` -> error_channel_size
    pub fn from_settings(settings: &Settings) -> Self {
        let pipeline = &settings.pipeline;
        Self {
            concurrency: Concurrency::from_level(settings.check.concurrency),
            path_channel_size: pipeline.path_channel_size.max(1),
            job_channel_size: pipeline.job_channel_size.max(1),
            conflict_channel_size: pipeline.conflict_channel_size.max(1),
            error_channel_size: pipeline.error_channel_size.max(1),
        }
    }

    /// Set the concurrency
    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the conflict channel capacity
    pub fn with_conflict_channel_size(mut self, size: usize) -> Self {
        self.conflict_channel_size = size.max(1);
        self
    }

    /// Set the job channel capacity
    pub fn with_job_channel_size(mut self, size: usize) -> Self {
        self.job_channel_size = size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_levels() {
        assert_eq!(Concurrency::from_level(0), Concurrency::Inline);
        assert_eq!(Concurrency::from_level(3).worker_count(), 3);
        assert_eq!(Concurrency::from_level(-1).worker_count(), num_cpus::get());
        assert_eq!(Concurrency::from_level(-42), Concurrency::available());
    }

    #[test]
    fn test_workers_never_zero() {
        assert_eq!(Concurrency::workers(0).worker_count(), 1);
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!(config.concurrency.worker_count() >= 1);
        assert_eq!(config.conflict_channel_size, 16);
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::default()
            .with_concurrency(Concurrency::Inline)
            .with_conflict_channel_size(0)
            .with_job_channel_size(8);

        assert_eq!(config.concurrency, Concurrency::Inline);
        assert_eq!(config.conflict_channel_size, 1);
        assert_eq!(config.job_channel_size, 8);
    }

    #[test]
    fn test_from_settings() {
        let mut settings = Settings::default();
        settings.check.concurrency = 0;
        settings.pipeline.conflict_channel_size = 4;

        let config = PipelineConfig::from_settings(&settings);
        assert_eq!(config.concurrency, Concurrency::Inline);
        assert_eq!(config.conflict_channel_size, 4);
        assert_eq!(config.job_channel_size, settings.pipeline.job_channel_size);
    }
}
