//! `cflow run`: start a workflow, follow its progress, print the result.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Instrument;
use tracing::field::{Empty, display};

use canvasflow_observe::attrs;
use canvasflow_types::agent::StateBag;
use canvasflow_types::state::{NodeStatus, WorkflowState, WorkflowStatus};

use crate::state::AppState;

/// Build the run input from `--query` and `--input`. `--query` wins over a
/// `query` key in the JSON.
pub fn build_input(query: Option<&str>, input: Option<&str>) -> Result<StateBag> {
    let mut bag = match input {
        Some(raw) => serde_json::from_str::<StateBag>(raw)
            .context("--input must be a JSON object")?,
        None => StateBag::new(),
    };
    if let Some(query) = query {
        bag.insert("query".to_string(), serde_json::Value::from(query));
    }
    Ok(bag)
}

pub async fn run_workflow(
    state: &AppState,
    graph_id: &str,
    query: Option<&str>,
    input: Option<&str>,
    graph_file: Option<&Path>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    state.register_optional(graph_file).await?;
    let input = build_input(query, input)?;

    let span = tracing::info_span!(
        "cflow.run",
        workflow.graph_id = %graph_id,
        workflow.run_id = Empty,
        workflow.status = Empty,
        workflow.nodes_completed = Empty,
    );

    async {
        let graph = state
            .engine
            .get_graph(graph_id)
            .with_context(|| format!("Graph '{graph_id}' not found"))?;

        let run_id = state.engine.start_workflow(graph_id, input)?;
        tracing::Span::current().record(attrs::WORKFLOW_RUN_ID, display(run_id));

        let pb = if json || quiet {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new(graph.nodes.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {spinner:.cyan} [{bar:30.cyan/dim}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb.enable_steady_tick(std::time::Duration::from_millis(80));
            pb
        };

        let progress = pb.clone();
        let subscription = state.engine.subscribe(run_id, move |run: &WorkflowState| {
            progress.set_position(run.completed_nodes.len() as u64);
            if let Some(node) = &run.current_node {
                progress.set_message(node.clone());
            }
        })?;

        let result = state.engine.wait_until_settled(run_id).await;
        subscription.unsubscribe();
        pb.finish_and_clear();
        let final_state = result?;

        let span = tracing::Span::current();
        span.record(attrs::WORKFLOW_STATUS, final_state.status.as_str());
        span.record(
            attrs::WORKFLOW_NODES_COMPLETED,
            final_state.completed_nodes.len() as u64,
        );

        if json {
            println!("{}", serde_json::to_string_pretty(&final_state)?);
        } else {
            display_run(&final_state, graph.node_ids());
        }

        match final_state.status {
            WorkflowStatus::Completed => Ok(()),
            status => match &final_state.error {
                Some(err) => bail!("Workflow {status}: {err}"),
                None => bail!("Workflow {status}"),
            },
        }
    }
    .instrument(span)
    .await
}

fn display_run<'a>(run: &WorkflowState, order: impl IntoIterator<Item = &'a str>) {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Node").fg(Color::Cyan),
            Cell::new("Agent"),
            Cell::new("Status"),
            Cell::new("Attempts"),
            Cell::new("Duration"),
            Cell::new("Error"),
        ]);

    for id in order {
        let Some(node) = run.node_states.get(id) else {
            continue;
        };
        let duration = match (node.start_time, node.end_time) {
            (Some(start), Some(end)) => format!("{}ms", (end - start).num_milliseconds()),
            _ => "-".to_string(),
        };
        table.add_row(vec![
            Cell::new(&node.id),
            Cell::new(&node.agent_name),
            format_node_status(node.status),
            Cell::new(node.attempts),
            Cell::new(duration),
            Cell::new(node.error.as_deref().unwrap_or("")),
        ]);
    }

    println!();
    println!(
        "  {} Run {} of '{}'",
        format_run_status(run.status),
        style(run.id.to_string().chars().take(8).collect::<String>()).cyan(),
        style(&run.graph_id).cyan()
    );
    println!();
    println!("{table}");
    if let Some(ref err) = run.error {
        println!("  Error: {}", style(err).red());
    }
    if !run.global_state.is_empty() {
        let mut keys: Vec<_> = run.global_state.keys().map(String::as_str).collect();
        keys.sort_unstable();
        println!("  State keys: {}", style(keys.join(", ")).dim());
    }
    println!();
}

fn format_run_status(status: WorkflowStatus) -> console::StyledObject<&'static str> {
    let label = status.as_str();
    match status {
        WorkflowStatus::Completed => style(label).green().bold(),
        WorkflowStatus::Paused => style(label).magenta().bold(),
        WorkflowStatus::Error => style(label).red().bold(),
        WorkflowStatus::Pending | WorkflowStatus::Running => style(label).yellow().bold(),
    }
}

fn format_node_status(status: NodeStatus) -> Cell {
    match status {
        NodeStatus::Pending => Cell::new("pending").fg(Color::Yellow),
        NodeStatus::Running => Cell::new("running").fg(Color::Blue),
        NodeStatus::Completed => Cell::new("completed").fg(Color::Green),
        NodeStatus::Error => Cell::new("error").fg(Color::Red),
        NodeStatus::WaitingForInput => Cell::new("waiting").fg(Color::Magenta),
    }
}
