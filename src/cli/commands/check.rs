//! Check command - run the conflict pipeline.

use anyhow::Context;
use std::process::ExitCode;

use crate::cli::args::CheckArgs;
use crate::config::Settings;
use crate::pipeline::{CheckPipeline, ConflictConsumer, PipelineConfig};

/// Process outcome of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// No conflicts, or conflicts are not treated as failure
    Clean,
    /// Conflicts found and `fail_on_conflict` is set
    Conflicts,
    /// Invalid configuration or unreadable pattern file
    Error,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::Conflicts => 1,
            ExitStatus::Error => 2,
        }
    }

    fn from_run(has_conflicts: bool, fail_on_conflict: bool) -> Self {
        if has_conflicts && fail_on_conflict {
            ExitStatus::Conflicts
        } else {
            ExitStatus::Clean
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

/// Run check command.
///
/// Conflicts go to stdout, one per line. Output errors are logged and do not
/// change the exit status.
pub fn run_check(args: &CheckArgs, settings: &Settings) -> anyhow::Result<ExitStatus> {
    let mut settings = settings.clone();
    args.apply_to(&mut settings);

    let config = PipelineConfig::from_settings(&settings);
    let pipeline = CheckPipeline::from_pattern_files(&settings.check.ignore_files, config)
        .context("Cannot load pattern files")?;

    let source = args.path_source(&settings);
    if let Some(command) = source.command_line() {
        tracing::info!("[check] reading paths from `{command}`");
    }

    let consumer = ConflictConsumer::console()
        .with_fields(settings.check.field_selection())
        .with_format(settings.check.format);

    let summary = pipeline.run(source, consumer).wait();
    if summary.output_errors > 0 {
        tracing::warn!(
            "[check] {} conflicts could not be written",
            summary.output_errors
        );
    }

    Ok(ExitStatus::from_run(
        summary.has_conflicts(),
        settings.check.fail_on_conflict,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_codes() {
        assert_eq!(ExitStatus::Clean.code(), 0);
        assert_eq!(ExitStatus::Conflicts.code(), 1);
        assert_eq!(ExitStatus::Error.code(), 2);
    }

    #[test]
    fn test_conflicts_fail_only_when_asked() {
        assert_eq!(ExitStatus::from_run(true, false), ExitStatus::Clean);
        assert_eq!(ExitStatus::from_run(true, true), ExitStatus::Conflicts);
        assert_eq!(ExitStatus::from_run(false, true), ExitStatus::Clean);
    }
}
