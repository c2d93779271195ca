//! CLI interface for Waypoint
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for driving the agent engine.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Waypoint autonomous agent engine
///
/// Drives a goal to completion one step at a time, combining browser
/// automation with a catalogue of local tools.
#[derive(Parser, Debug)]
#[command(name = "waypoint")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive a goal to a terminal status
    Run {
        /// The goal to pursue
        goal: String,

        /// Browser session id (generated when omitted)
        #[arg(long, value_name = "ID")]
        session: Option<String>,

        /// Comma-separated tools to enable (default: config, else all)
        #[arg(long, value_delimiter = ',', value_name = "NAMES")]
        tools: Vec<String>,
    },

    /// List the tool catalogue
    Tools,

    /// Dispatch a single tool call
    Dispatch {
        /// Tool name
        tool: String,

        /// Parameters as a JSON object
        #[arg(default_value = "{}")]
        params: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
}
