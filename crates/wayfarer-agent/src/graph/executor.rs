use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{debug, info};

use wayfarer_core::error::{Result, WayfarerError};

use super::edge::Edge;
use super::state::StateRecord;

/// Terminal marker. Not a node; an edge pointing here ends the run.
pub const END: &str = "__end__";

/// A node in the workflow graph.
///
/// Stages are infallible at the graph level: failures inside a stage are
/// expressed in the returned record, never as an error.
pub trait Stage: Send + Sync + 'static {
    /// Unique node id.
    fn name(&self) -> &str;

    fn run(&self, state: StateRecord) -> BoxFuture<'_, StateRecord>;
}

/// Result of one graph invocation.
#[derive(Debug, Clone)]
pub struct GraphRun {
    /// Record returned by the last node that ran.
    pub state: StateRecord,
    /// Node ids in execution order.
    pub path: Vec<String>,
    pub elapsed_ms: u64,
}

/// A fixed, acyclic workflow: nodes, a transition table and an entry point.
pub struct WorkflowGraph {
    nodes: HashMap<String, Arc<dyn Stage>>,
    edges: Vec<Edge>,
    entry: String,
}

impl std::fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut nodes: Vec<_> = self.nodes.keys().collect();
        nodes.sort();
        f.debug_struct("WorkflowGraph")
            .field("nodes", &nodes)
            .field("edges", &self.edges)
            .field("entry", &self.entry)
            .finish()
    }
}

impl WorkflowGraph {
    pub fn builder() -> WorkflowGraphBuilder {
        WorkflowGraphBuilder::default()
    }

    /// Look up the transition out of `node` for the record it just produced.
    ///
    /// Edges are checked in insertion order and the first match wins. A node
    /// with no matching edge ends the run.
    pub fn next_node(&self, node: &str, output: &StateRecord) -> &str {
        self.edges
            .iter()
            .filter(|e| e.from == node)
            .find(|e| e.condition.matches(output))
            .map(|e| e.to.as_str())
            .unwrap_or(END)
    }

    /// Run the graph once from the entry node.
    pub async fn invoke(&self, initial: StateRecord) -> Result<GraphRun> {
        let start = Instant::now();
        let mut state = initial;
        let mut path: Vec<String> = Vec::new();
        let mut current = self.entry.clone();

        loop {
            if path.contains(&current) {
                return Err(WayfarerError::Config(format!(
                    "Workflow re-entered node '{}'",
                    current
                )));
            }
            let node = self.nodes.get(&current).ok_or_else(|| {
                WayfarerError::Config(format!("Node '{}' not found in workflow", current))
            })?;

            info!(node = %current, "Executing workflow node");
            let node_start = Instant::now();
            state = node.run(state).await;
            debug!(
                node = %current,
                is_valid = state.is_valid(),
                elapsed_ms = node_start.elapsed().as_millis() as u64,
                "Workflow node complete"
            );

            let next = self.next_node(&current, &state).to_string();
            path.push(current);

            if next == END {
                break;
            }
            current = next;
        }

        Ok(GraphRun {
            state,
            path,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Collects nodes and edges, then validates the topology in [`build`](Self::build).
#[derive(Default)]
pub struct WorkflowGraphBuilder {
    nodes: Vec<Arc<dyn Stage>>,
    edges: Vec<Edge>,
    entry: Option<String>,
}

impl WorkflowGraphBuilder {
    pub fn node(mut self, stage: Arc<dyn Stage>) -> Self {
        self.nodes.push(stage);
        self
    }

    pub fn edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn entry(mut self, node: impl Into<String>) -> Self {
        self.entry = Some(node.into());
        self
    }

    /// Validate and freeze the graph.
    ///
    /// Rejects duplicate or reserved node ids, a missing or unknown entry,
    /// edges that reference unknown nodes, and cycles.
    pub fn build(self) -> Result<WorkflowGraph> {
        let mut nodes: HashMap<String, Arc<dyn Stage>> = HashMap::new();
        for stage in self.nodes {
            let id = stage.name().to_string();
            if id == END {
                return Err(WayfarerError::Config(format!("'{}' is a reserved node id", END)));
            }
            if nodes.insert(id.clone(), stage).is_some() {
                return Err(WayfarerError::Config(format!("Duplicate workflow node '{}'", id)));
            }
        }

        let entry = self
            .entry
            .ok_or_else(|| WayfarerError::Config("Workflow has no entry point".into()))?;
        if !nodes.contains_key(&entry) {
            return Err(WayfarerError::Config(format!("Unknown entry node '{}'", entry)));
        }

        for edge in &self.edges {
            if !nodes.contains_key(&edge.from) {
                return Err(WayfarerError::Config(format!(
                    "Edge from unknown node '{}'",
                    edge.from
                )));
            }
            if edge.to != END && !nodes.contains_key(&edge.to) {
                return Err(WayfarerError::Config(format!(
                    "Edge to unknown node '{}'",
                    edge.to
                )));
            }
        }

        if let Some(node) = find_cycle(&nodes, &self.edges) {
            return Err(WayfarerError::Config(format!(
                "Workflow has a cycle through '{}'",
                node
            )));
        }

        Ok(WorkflowGraph {
            nodes,
            edges: self.edges,
            entry,
        })
    }
}

/// Depth-first search over all edges regardless of condition.
fn find_cycle(nodes: &HashMap<String, Arc<dyn Stage>>, edges: &[Edge]) -> Option<String> {
    fn visit<'a>(
        node: &'a str,
        edges: &'a [Edge],
        on_stack: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Option<String> {
        if on_stack.contains(node) {
            return Some(node.to_string());
        }
        if !done.insert(node) {
            return None;
        }
        on_stack.insert(node);
        for edge in edges.iter().filter(|e| e.from == node && e.to != END) {
            if let Some(found) = visit(&edge.to, edges, on_stack, done) {
                return Some(found);
            }
        }
        on_stack.remove(node);
        None
    }

    let mut done = HashSet::new();
    for id in nodes.keys() {
        let mut on_stack = HashSet::new();
        if let Some(found) = visit(id, edges, &mut on_stack, &mut done) {
            return Some(found);
        }
    }
    None
}
