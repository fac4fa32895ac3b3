//! Graph and agent inspection commands: `graphs`, `describe`, `agents`,
//! `config`.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use canvasflow_core::workflow::dag::execution_stages;

use crate::state::AppState;

fn table(header: Vec<Cell>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

// ---------------------------------------------------------------------------
// Graphs
// ---------------------------------------------------------------------------

pub fn list_graphs(state: &AppState, json: bool) -> Result<()> {
    let graphs: Vec<_> = state
        .engine
        .graph_ids()
        .iter()
        .filter_map(|id| state.engine.get_graph(id))
        .collect();

    if json {
        let out: Vec<_> = graphs
            .iter()
            .map(|g| {
                serde_json::json!({
                    "id": g.id,
                    "name": g.name,
                    "description": g.description,
                    "entryNode": g.entry_node,
                    "nodes": g.nodes.len(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut t = table(vec![
        Cell::new("Id").fg(Color::Cyan),
        Cell::new("Name"),
        Cell::new("Entry"),
        Cell::new("Nodes"),
        Cell::new("Description"),
    ]);
    for g in &graphs {
        t.add_row(vec![
            Cell::new(&g.id),
            Cell::new(&g.name),
            Cell::new(&g.entry_node),
            Cell::new(g.nodes.len()),
            Cell::new(&g.description),
        ]);
    }
    println!("{t}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Describe
// ---------------------------------------------------------------------------

pub fn describe_graph(state: &AppState, graph_id: &str, json: bool) -> Result<()> {
    let graph = state
        .engine
        .get_graph(graph_id)
        .with_context(|| format!("Graph '{graph_id}' not found"))?;
    let stages = execution_stages(&graph)?;

    if json {
        let out: Vec<Vec<&str>> = stages
            .iter()
            .map(|stage| stage.iter().map(|n| n.id.as_str()).collect())
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "graph": &*graph,
                "stages": out,
            }))?
        );
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style(&graph.name).cyan().bold(),
        style(format!("({})", graph.id)).dim()
    );
    if !graph.description.is_empty() {
        println!("  {}", graph.description);
    }
    println!();

    let mut t = table(vec![
        Cell::new("Stage").fg(Color::Cyan),
        Cell::new("Node"),
        Cell::new("Agent"),
        Cell::new("Timeout"),
        Cell::new("Retry"),
        Cell::new("Depends on"),
    ]);
    for (i, stage) in stages.iter().enumerate() {
        for node in stage {
            let timeout = node
                .timeout_seconds
                .map(|s| format!("{s}s"))
                .unwrap_or_else(|| "default".to_string());
            let retry = node
                .retry_policy
                .map(|r| format!("{}x / {}s", r.max_attempts, r.delay_seconds))
                .unwrap_or_else(|| "-".to_string());
            let deps = if node.dependencies.is_empty() {
                "-".to_string()
            } else {
                node.dependencies.join(", ")
            };
            t.add_row(vec![
                Cell::new(i + 1),
                Cell::new(&node.id),
                Cell::new(&node.agent_name),
                Cell::new(timeout),
                Cell::new(retry),
                Cell::new(deps),
            ]);
        }
    }
    println!("{t}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Agents / config
// ---------------------------------------------------------------------------

pub fn list_agents(state: &AppState, json: bool) -> Result<()> {
    let names = state.engine.agents().agent_names();
    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        println!();
        for name in &names {
            println!("  {} {}", style("*").green(), name);
        }
        println!();
    }
    Ok(())
}

pub fn show_config(state: &AppState, json: bool) -> Result<()> {
    let config = state.config();
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!();
    println!(
        "  Config file: {}",
        style(state.data_dir.join("config.toml").display()).dim()
    );
    println!("  failure_policy: {:?}", config.failure_policy);
    println!(
        "  default_node_timeout_secs: {}",
        config.default_node_timeout_secs
    );
    println!("  parallel_ready_nodes: {}", config.parallel_ready_nodes);
    println!("  event_bus_capacity: {}", config.event_bus_capacity);
    match config.default_retry {
        Some(r) => println!(
            "  default_retry: {} attempts, {}s apart",
            r.max_attempts, r.delay_seconds
        ),
        None => println!("  default_retry: none"),
    }
    println!();
    Ok(())
}
