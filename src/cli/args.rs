//! CLI argument parsing using clap.
//!
//! Contains the Cli struct, Commands enum, and the `check` arguments.

use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::config::Settings;
use crate::pipeline::{ConflictField, OutputFormat, PathSource};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const QUICK_START: &str = "Quick Start:
  $ ilignore init                          # Write .ilignorerc.toml and .ilignore
  $ ilignore check --staged                # Check files staged for commit
  $ ilignore check -i \"git ls-files\"       # Check every tracked file
  $ git ls-files | ilignore check -c 0     # Read paths from stdin, no workers
  $ ilignore check -g .ilignore -g .secrets --name-only a.env b.rs";

/// Gitignore-syntax conflict checker
#[derive(Parser)]
#[command(
    name = "ilignore",
    version = env!("CARGO_PKG_VERSION"),
    about = "CLI tools to work with .gitignore files",
    long_about = "Report files matched by gitignore-syntax pattern files, e.g. files that must never be committed.",
    styles = clap_cargo_style(),
    after_help = QUICK_START
)]
pub struct Cli {
    /// Path to custom .ilignorerc.toml file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose output (same as --log info)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level: error, warn, info, debug or trace (default: warn)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Check files against ignore files
    #[command(
        about = "Report files matched by ignore patterns",
        after_help = "Paths come from, in order of precedence:\n  1. PATHS arguments\n  2. --input command output, one path per line\n  3. --staged: git diff --name-only\n  4. stdin, one path per line (stops at the first blank line)\n\nExit codes:\n  0  no conflicts (or --fail-on-conflict not set)\n  1  conflicts found with --fail-on-conflict\n  2  startup error"
    )]
    Check(CheckArgs),

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,

    /// Initialize project
    #[command(about = "Write a default .ilignorerc.toml and .ilignore")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Arguments of `ilignore check`. Every flag overrides its settings key.
#[derive(Args, Debug, Default, Clone)]
pub struct CheckArgs {
    /// Files to check
    #[arg(value_name = "PATHS")]
    pub paths: Vec<String>,

    /// Command whose output lists the files to check, one per line
    #[arg(short, long, value_name = "COMMAND")]
    pub input: Option<String>,

    /// Ignore file in .gitignore format (repeatable, default: .ilignore)
    #[arg(short = 'g', long = "ignore", value_name = "FILE", value_delimiter = ',')]
    pub ignore_files: Vec<PathBuf>,

    /// Check changed files from git diff (index by default)
    #[arg(long)]
    pub staged: bool,

    /// Diff the work tree instead of the index (with --staged)
    #[arg(long, requires = "staged")]
    pub unstaged: bool,

    /// Value passed to git diff --diff-filter (default: ACMD)
    #[arg(long, value_name = "FILTER")]
    pub diff_filter: Option<String>,

    /// Worker count: 0 = no concurrency, < 0 = one worker per CPU (default)
    #[arg(short, long, allow_negative_numbers = true, value_name = "N")]
    pub concurrency: Option<i64>,

    /// Output only the names of conflicting files
    #[arg(long, conflicts_with = "fields")]
    pub name_only: bool,

    /// Conflict fields to output, comma separated (default: all)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub fields: Vec<ConflictField>,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Exit with code 1 when conflicts are found
    #[arg(long)]
    pub fail_on_conflict: bool,

    /// Stop at the first blank line of PATHS or --input output
    #[arg(long)]
    pub stop_on_empty: bool,
}

impl CheckArgs {
    /// Overlay the flags that were given onto `settings`.
    pub fn apply_to(&self, settings: &mut Settings) {
        let check = &mut settings.check;
        if !self.ignore_files.is_empty() {
            check.ignore_files = self.ignore_files.clone();
        }
        if let Some(concurrency) = self.concurrency {
            check.concurrency = concurrency;
        }
        if let Some(input) = &self.input {
            check.input = Some(input.clone());
        }
        if self.name_only {
            check.name_only = true;
        } else if !self.fields.is_empty() {
            check.name_only = false;
            check.fields = self.fields.clone();
        }
        if let Some(format) = self.format {
            check.format = format;
        }
        if self.fail_on_conflict {
            check.fail_on_conflict = true;
        }
        if self.stop_on_empty {
            check.continue_on_empty = false;
        }

        let git = &mut settings.git;
        if self.staged {
            git.staged = true;
            git.cached = !self.unstaged;
        }
        if let Some(filter) = &self.diff_filter {
            git.diff_filter = filter.clone();
        }
    }

    /// Where paths come from, given the merged settings.
    pub fn path_source(&self, settings: &Settings) -> PathSource {
        let staged = settings
            .git
            .staged
            .then_some((settings.git.cached, settings.git.diff_filter.as_str()));
        PathSource::select(self.paths.clone(), settings.check.input.as_deref(), staged)
            .with_continue_on_empty(settings.check.continue_on_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_check_flags() {
        let cli = parse(&[
            "ilignore", "--verbose", "check", "-g", "a.ignore", "-g", "b.ignore", "-c", "-1",
            "--fields", "file,line", "--format", "json", "x.rs",
        ]);
        assert!(cli.verbose);
        let Commands::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.ignore_files, vec![PathBuf::from("a.ignore"), PathBuf::from("b.ignore")]);
        assert_eq!(args.concurrency, Some(-1));
        assert_eq!(args.fields, vec![ConflictField::File, ConflictField::Line]);
        assert_eq!(args.format, Some(OutputFormat::Json));
        assert_eq!(args.paths, vec!["x.rs"]);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["ilignore", "check", "--log", "debug", "--config", "rc.toml"]);
        assert_eq!(cli.log.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("rc.toml")));
    }

    #[test]
    fn test_name_only_conflicts_with_fields() {
        let result = Cli::try_parse_from(["ilignore", "check", "--name-only", "--fields", "file"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_to_settings() {
        let mut settings = Settings::default();
        let args = CheckArgs {
            ignore_files: vec![PathBuf::from("other.ignore")],
            concurrency: Some(0),
            name_only: true,
            staged: true,
            diff_filter: Some("AM".to_string()),
            fail_on_conflict: true,
            ..CheckArgs::default()
        };
        args.apply_to(&mut settings);

        assert_eq!(settings.check.ignore_files, vec![PathBuf::from("other.ignore")]);
        assert_eq!(settings.check.concurrency, 0);
        assert!(settings.check.name_only);
        assert!(settings.check.fail_on_conflict);
        assert!(settings.git.staged);
        assert!(settings.git.cached);
        assert_eq!(settings.git.diff_filter, "AM");
    }

    #[test]
    fn test_unset_flags_keep_settings() {
        let mut settings = Settings::default();
        settings.check.concurrency = 7;
        settings.check.input = Some("git ls-files".to_string());

        CheckArgs::default().apply_to(&mut settings);

        assert_eq!(settings.check.concurrency, 7);
        assert_eq!(settings.check.input.as_deref(), Some("git ls-files"));
    }

    #[test]
    fn test_path_source_precedence() {
        let mut settings = Settings::default();
        settings.check.input = Some("git ls-files".to_string());
        settings.git.staged = true;

        let args = CheckArgs {
            paths: vec!["a.rs".to_string()],
            ..CheckArgs::default()
        };
        assert!(matches!(args.path_source(&settings), PathSource::Fixed { .. }));

        let args = CheckArgs::default();
        assert_eq!(
            args.path_source(&settings).command_line().as_deref(),
            Some("git ls-files")
        );

        settings.check.input = None;
        assert!(matches!(
            args.path_source(&settings),
            PathSource::GitDiff { cached: true, .. }
        ));

        settings.git.staged = false;
        assert!(matches!(args.path_source(&settings), PathSource::Stdin));
    }
}
