//! Command line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// seclabel - query and set SELinux security contexts
#[derive(Parser)]
#[command(name = "seclabel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query and set SELinux security contexts")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Write debug logs to the state directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Blocking worker threads for async lookups
    #[arg(long, global = true, value_name = "N")]
    pub workers: Option<usize>,

    /// Policy type to read file_contexts from (e.g. targeted, mls)
    #[arg(long, global = true, value_name = "TYPE")]
    pub policy_type: Option<String>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show the context of this process
    Con {
        /// Print the kernel form, without translation
        #[arg(long)]
        raw: bool,
    },

    /// Show the context stored on a file
    File {
        path: String,

        /// Report a symlink's own context instead of its target's
        #[arg(long)]
        no_dereference: bool,
    },

    /// Show the context the policy assigns to paths
    Match {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Connect to a unix socket and show the server's context
    Peer {
        socket: PathBuf,
    },

    /// Run a command in another context
    Exec {
        /// Context for the new program
        #[arg(long)]
        context: String,

        /// Command and arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

impl Commands {
    /// Get command name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Con { .. } => "con",
            Self::File { .. } => "file",
            Self::Match { .. } => "match",
            Self::Peer { .. } => "peer",
            Self::Exec { .. } => "exec",
        }
    }
}
