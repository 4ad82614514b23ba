//! CLI module for ilignore.
//!
//! Provides command-line interface parsing and command dispatch.

pub mod args;
pub mod commands;

pub use args::{CheckArgs, Cli, Commands};
