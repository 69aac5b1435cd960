//! CLI module for the Stackform provisioning engine.
//!
//! This module provides the command-line interface for planning and
//! applying stack documents.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
