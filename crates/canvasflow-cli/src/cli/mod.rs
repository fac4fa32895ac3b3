//! CLI command definitions for the `cflow` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod graph;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run and inspect canvasflow workflow graphs.
#[derive(Parser)]
#[command(name = "cflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also export spans to stdout via OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    /// Directory holding `config.toml` (default: ~/.canvasflow).
    #[arg(long, global = true, env = "CANVASFLOW_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a workflow graph with the placeholder research agents.
    Run {
        /// Graph id to run.
        #[arg(default_value = "research_canvas")]
        graph: String,

        /// Research query, stored as `query` in the run input.
        #[arg(long, short)]
        query: Option<String>,

        /// Extra run input as a JSON object.
        #[arg(long)]
        input: Option<String>,

        /// Register an additional graph from a JSON file before running.
        #[arg(long)]
        graph_file: Option<PathBuf>,
    },

    /// List registered graphs.
    #[command(alias = "ls")]
    Graphs {
        /// Register an additional graph from a JSON file first.
        #[arg(long)]
        graph_file: Option<PathBuf>,
    },

    /// Show a graph's nodes grouped into execution stages.
    Describe {
        /// Graph id to describe.
        #[arg(default_value = "research_canvas")]
        graph: String,

        /// Register an additional graph from a JSON file first.
        #[arg(long)]
        graph_file: Option<PathBuf>,
    },

    /// List available agents.
    Agents,

    /// Print the effective engine configuration.
    Config,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}
