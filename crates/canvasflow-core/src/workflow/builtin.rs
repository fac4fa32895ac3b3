//! Built-in `research_canvas` graph and deterministic placeholder agents.
//!
//! The placeholder agents need no language model or network access. They
//! derive everything from the query and the shared state, so a full run of
//! the research pipeline is reproducible and useful for demos and tests.

use canvasflow_types::agent::{AgentContext, AgentError, StateBag};
use canvasflow_types::graph::{WorkflowGraph, WorkflowNode};
use serde_json::{Value, json};

use super::agent::Agent;
use super::registry::AgentRegistry;

/// Id of the built-in research graph.
pub const RESEARCH_CANVAS: &str = "research_canvas";

/// Node ids of `research_canvas`, in execution order. Each node runs the
/// agent of the same name.
pub const RESEARCH_NODES: [&str; 6] = [
    "query_analyzer",
    "web_searcher",
    "source_validator",
    "content_analyzer",
    "article_writer",
    "quality_reviewer",
];

/// Sources at or below this relevance are dropped by `source_validator`.
pub const QUALITY_THRESHOLD: f64 = 0.6;

/// The six-step linear research pipeline.
pub fn research_canvas_graph() -> WorkflowGraph {
    let steps = [
        ("Query Analysis", "Understand and decompose the research query", 30),
        ("Web Search", "Search for relevant sources and information", 60),
        ("Source Validation", "Validate and rank found sources", 45),
        ("Content Analysis", "Extract insights and key information", 90),
        ("Article Generation", "Generate comprehensive article", 120),
        ("Quality Review", "Review and suggest improvements", 60),
    ];

    let nodes = RESEARCH_NODES
        .iter()
        .zip(steps)
        .enumerate()
        .map(|(i, (id, (name, description, timeout)))| {
            let node = WorkflowNode::new(*id, name, *id)
                .with_description(description)
                .with_timeout(timeout);
            match i.checked_sub(1) {
                Some(prev) => node.depends_on([RESEARCH_NODES[prev]]),
                None => node,
            }
        })
        .collect();

    WorkflowGraph::new(
        RESEARCH_CANVAS,
        "Research Canvas Workflow",
        RESEARCH_NODES[0],
        nodes,
    )
    .with_description("Multi-agent research and article generation")
    .with_derived_edges()
}

/// Register the six placeholder research agents under their node names.
pub fn placeholder_research_agents() -> AgentRegistry {
    let registry = AgentRegistry::new();
    register_placeholder_research_agents(&registry);
    registry
}

pub fn register_placeholder_research_agents(registry: &AgentRegistry) {
    registry.register("query_analyzer", QueryAnalyzer);
    registry.register("web_searcher", WebSearcher);
    registry.register("source_validator", SourceValidator);
    registry.register("content_analyzer", ContentAnalyzer);
    registry.register("article_writer", ArticleWriter);
    registry.register("quality_reviewer", QualityReviewer);
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn bag(value: Value) -> StateBag {
    match value {
        Value::Object(map) => map,
        _ => StateBag::new(),
    }
}

fn strings(ctx: &AgentContext, key: &str) -> Vec<String> {
    ctx.lookup(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn objects(ctx: &AgentContext, key: &str) -> Vec<Value> {
    ctx.lookup(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter(|v| v.is_object()).cloned().collect())
        .unwrap_or_default()
}

fn slug(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Lowercased words longer than two characters, at most five.
pub fn extract_search_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|term| term.chars().count() > 2)
        .take(5)
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// Splits the query into a topic and search terms.
pub struct QueryAnalyzer;

impl Agent for QueryAnalyzer {
    async fn execute(&self, ctx: AgentContext) -> Result<StateBag, AgentError> {
        let query = ctx
            .input
            .get("query")
            .or_else(|| ctx.input.get("currentTopic"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        if query.is_empty() {
            return Err(AgentError::failed("no research query provided"));
        }

        Ok(bag(json!({
            "analyzed_query": query,
            "main_topic": query,
            "search_terms": extract_search_terms(&query),
            "research_areas": [query],
        })))
    }
}

/// Lists one source per search term with decreasing relevance.
pub struct WebSearcher;

impl Agent for WebSearcher {
    async fn execute(&self, ctx: AgentContext) -> Result<StateBag, AgentError> {
        let topic = ctx.lookup_str("main_topic").unwrap_or_default().to_string();
        let terms = strings(&ctx, "search_terms");

        let mut sources = vec![json!({
            "title": format!("Research on {topic}"),
            "url": format!("https://example.com/research/{}", slug(&topic)),
            "type": "academic",
            "relevance_score": 0.9,
            "description": format!("Academic research paper on {topic}"),
        })];
        for (i, term) in terms.iter().enumerate() {
            // 0.85, 0.75, 0.65, ...
            let relevance = (85 - 10 * i as i64).max(10) as f64 / 100.0;
            sources.push(json!({
                "title": format!("Overview of {term}"),
                "url": format!("https://example.com/topics/{}", slug(term)),
                "type": "blog",
                "relevance_score": relevance,
                "description": format!("Background reading on {term} in the context of {topic}"),
            }));
        }

        Ok(bag(json!({
            "search_summary": format!("Found {} relevant sources for research", sources.len()),
            "search_terms_used": terms,
            "sources": sources,
        })))
    }
}

/// Keeps sources whose relevance exceeds [`QUALITY_THRESHOLD`].
pub struct SourceValidator;

impl Agent for SourceValidator {
    async fn execute(&self, ctx: AgentContext) -> Result<StateBag, AgentError> {
        let sources = objects(&ctx, "sources");
        let validated: Vec<Value> = sources
            .iter()
            .filter(|s| {
                s.get("relevance_score")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0)
                    > QUALITY_THRESHOLD
            })
            .cloned()
            .collect();

        Ok(bag(json!({
            "validation_summary": format!(
                "Validated {} out of {} sources",
                validated.len(),
                sources.len()
            ),
            "quality_threshold": QUALITY_THRESHOLD,
            "validated_sources": validated,
        })))
    }
}

/// Turns validated source titles into insights.
pub struct ContentAnalyzer;

impl Agent for ContentAnalyzer {
    async fn execute(&self, ctx: AgentContext) -> Result<StateBag, AgentError> {
        let topic = ctx.lookup_str("main_topic").unwrap_or_default().to_string();
        let sources = objects(&ctx, "validated_sources");

        let mut insights: Vec<String> = sources
            .iter()
            .filter_map(|s| s.get("title").and_then(Value::as_str))
            .map(|title| format!("{title} is relevant to {topic}"))
            .collect();
        if insights.is_empty() {
            insights.push(format!(
                "Key insights about {topic} from {} sources",
                sources.len()
            ));
        }

        Ok(bag(json!({
            "insights": insights,
            "themes": [topic],
            "synthesis": format!("Analysis of {topic} based on {} validated sources", sources.len()),
        })))
    }
}

/// Assembles a markdown article from the analysis.
pub struct ArticleWriter;

impl Agent for ArticleWriter {
    async fn execute(&self, ctx: AgentContext) -> Result<StateBag, AgentError> {
        let topic = ctx.lookup_str("main_topic").unwrap_or_default().to_string();
        let insights = strings(&ctx, "insights");
        let themes = strings(&ctx, "themes");
        let synthesis = ctx.lookup_str("synthesis").unwrap_or_default().to_string();

        let mut sections = vec![format!("# {topic}"), synthesis];
        sections.extend(
            insights
                .iter()
                .enumerate()
                .map(|(i, insight)| format!("## Finding {}\n\n{insight}.", i + 1)),
        );
        let article = sections.join("\n\n");
        let section_titles: Vec<String> = (1..=insights.len().min(5))
            .map(|i| format!("Section {i}"))
            .collect();

        Ok(bag(json!({
            "article_structure": {
                "word_count": article.split_whitespace().count(),
                "sections": section_titles,
                "main_topic": topic,
            },
            "writing_notes": format!(
                "Article generated based on {} insights and {} themes",
                insights.len(),
                themes.len()
            ),
            "article": article,
        })))
    }
}

/// Scores the article; an empty article scores zero.
pub struct QualityReviewer;

impl Agent for QualityReviewer {
    async fn execute(&self, ctx: AgentContext) -> Result<StateBag, AgentError> {
        let article = ctx.lookup_str("article").unwrap_or_default();
        let score = if article.trim().is_empty() { 0.0 } else { 7.5 };
        let summary = if score > 0.0 {
            "Article meets quality standards".to_string()
        } else {
            "No article to review".to_string()
        };

        Ok(bag(json!({
            "overall_score": score,
            "review_summary": summary,
            "recommendations": ["Review for clarity", "Check citations"],
        })))
    }
}
