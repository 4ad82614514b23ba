use clap::Parser;
use std::process::ExitCode;

use ilignore::Settings;
use ilignore::cli::commands::{ExitStatus, run_check, run_config, run_init};
use ilignore::cli::{Cli, Commands};
use ilignore::logging;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load_with(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitStatus::Error.into();
        }
    };

    let (logging_config, rejected_level) =
        logging::apply_cli_level(settings.logging.clone(), cli.verbose, cli.log.as_deref());
    logging::init_with_config(&logging_config);
    if let Some(level) = rejected_level {
        tracing::warn!("[cli] unknown log level {level:?}, keeping {}", logging_config.default);
    }

    let result = match &cli.command {
        Commands::Check(args) => run_check(args, &settings),
        Commands::Config => run_config(&settings)
            .map(|()| ExitStatus::Clean)
            .map_err(Into::into),
        Commands::Init { force } => std::env::current_dir()
            .map_err(anyhow::Error::from)
            .and_then(|dir| run_init(&dir, *force).map_err(Into::into))
            .map(|()| ExitStatus::Clean),
    };

    match result {
        Ok(status) => status.into(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitStatus::Error.into()
        }
    }
}
