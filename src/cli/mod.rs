//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing, enums, and subcommand handlers.

mod args;
mod commands;
mod enums;

pub use args::{Args, Command, ConfigAction, GenerateArgs};
pub use commands::{
    handle_config_action, init_config_file, resolve_builder, run_check, run_generate,
    run_interactive,
};
pub use enums::{AspectArg, ResolutionArg, TierArg};
