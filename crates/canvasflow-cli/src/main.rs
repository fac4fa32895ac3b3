//! Canvasflow CLI entry point.
//!
//! Binary name: `cflow`
//!
//! Parses CLI arguments, loads the engine config, then dispatches to the
//! appropriate command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use tracing_subscriber::EnvFilter;

use canvasflow_observe::tracing_setup::{env_filter_or, init_tracing, shutdown_tracing};
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity; RUST_LOG only applies at the default level
    let filter = match cli.verbose {
        0 if cli.quiet => EnvFilter::new("error"),
        0 => env_filter_or("warn"),
        1 => EnvFilter::new("info,canvasflow_core=debug"),
        _ => EnvFilter::new("trace"),
    };
    if let Err(e) = init_tracing(filter, cli.otel) {
        eprintln!("Warning: tracing init failed: {e}");
    }

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "cflow", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.data_dir.clone()).await?;
    let result = dispatch(cli, &state).await;

    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli, state: &AppState) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run {
            graph,
            query,
            input,
            graph_file,
        } => {
            cli::run::run_workflow(
                state,
                &graph,
                query.as_deref(),
                input.as_deref(),
                graph_file.as_deref(),
                cli.json,
                cli.quiet,
            )
            .await?;
        }

        Commands::Graphs { graph_file } => {
            state.register_optional(graph_file.as_deref()).await?;
            cli::graph::list_graphs(state, cli.json)?;
        }

        Commands::Describe { graph, graph_file } => {
            state.register_optional(graph_file.as_deref()).await?;
            cli::graph::describe_graph(state, &graph, cli.json)?;
        }

        Commands::Agents => cli::graph::list_agents(state, cli.json)?,

        Commands::Config => cli::graph::show_config(state, cli.json)?,

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}
