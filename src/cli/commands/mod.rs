//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod check;
pub mod init;

pub use check::{ExitStatus, run_check};
pub use init::{run_config, run_init};
