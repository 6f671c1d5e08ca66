//! Graph preprocessing: load a serialized node list and order it so every
//! node comes after everything it depends on.
//!
//! ## Input
//!
//! A JSON array of [`RawNode`] records. The list must be internally
//! consistent:
//! - `index` is unique and dense over `[0, N)`
//! - `dependencies_count == dependencies.len()`
//! - every dependency names an existing index
//!
//! ## Algorithm
//!
//! Kahn's algorithm. In-degrees start from `dependencies_count`, a reverse
//! adjacency list maps each node to the nodes that depend on it, and a FIFO
//! queue is seeded with the zero in-degree nodes in input order. Ties are
//! therefore broken by input order, which makes the output deterministic.
//! If fewer than `N` nodes come out, the rest sit on or behind a cycle and
//! the load fails.
//!
//! ## Lifecycle
//!
//! [`Preprocessor`] moves `Unloaded → Loading → Sorted | Failed`. Both
//! terminal states are sticky: a second `load` returns the same graph or the
//! same error without touching the file again.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::{ContextProvider, DependencyContext};
use crate::error::{GraphError, GraphResult};

// ============================================================================
// Serialized Form
// ============================================================================

/// One node of the persisted raw graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawNode {
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub code_content: String,
    #[serde(default)]
    pub dependencies: Vec<usize>,
    #[serde(default)]
    pub dependencies_count: usize,
}

impl RawNode {
    fn info(&self) -> NodeInfo {
        NodeInfo {
            kind: self.kind.clone(),
            name: self.name.clone(),
            uri: self.uri.clone(),
            code_content: self.code_content.clone(),
        }
    }
}

/// Descriptive payload of a node, without graph structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub uri: String,
    pub code_content: String,
}

/// A node in processing order, with its dependencies resolved to entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub index: usize,
    pub node: NodeInfo,
    pub dependencies: Vec<NodeInfo>,
    pub dependency_indices: Vec<usize>,
    #[serde(default)]
    pub context: Option<String>,
}

// ============================================================================
// Preprocessed Graph
// ============================================================================

/// Nodes in topological order plus an index → position lookup.
#[derive(Debug, Clone, Default)]
pub struct PreprocessedGraph {
    nodes: Vec<NodeState>,
    node_map: HashMap<usize, usize>,
}

impl PreprocessedGraph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in processing order.
    pub fn nodes(&self) -> &[NodeState] {
        &self.nodes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeState> {
        self.nodes.iter()
    }

    pub fn get(&self, index: usize) -> Option<&NodeState> {
        self.node_map.get(&index).map(|&pos| &self.nodes[pos])
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut NodeState> {
        self.node_map.get(&index).map(|&pos| &mut self.nodes[pos])
    }

    /// Position of a node in processing order.
    pub fn position(&self, index: usize) -> Option<usize> {
        self.node_map.get(&index).copied()
    }

    pub fn set_context(&mut self, index: usize, context: impl Into<String>) -> GraphResult<()> {
        let state = self
            .get_mut(index)
            .ok_or(GraphError::UnknownNode { index })?;
        state.context = Some(context.into());
        Ok(())
    }

    /// Generate the context of every node that does not have one yet, in
    /// processing order.
    ///
    /// Dependencies are always visited first, so the provider sees their
    /// contexts. Nodes that already carry a context are left alone, which
    /// lets an interrupted run resume.
    pub fn fill_contexts<P: ContextProvider>(&mut self, provider: &mut P) -> GraphResult<usize> {
        let mut generated = 0usize;

        for pos in 0..self.nodes.len() {
            if self.nodes[pos].context.is_some() {
                continue;
            }

            let context = {
                let state = &self.nodes[pos];
                let deps: Vec<DependencyContext<'_>> = state
                    .dependency_indices
                    .iter()
                    .filter_map(|idx| self.get(*idx))
                    .map(|dep| DependencyContext {
                        index: dep.index,
                        node: &dep.node,
                        context: dep.context.as_deref(),
                    })
                    .collect();

                provider
                    .generate(&state.node, &deps)
                    .map_err(|e| GraphError::Context {
                        index: state.index,
                        name: state.node.name.clone(),
                        message: e.to_string(),
                    })?
            };

            tracing::debug!(index = self.nodes[pos].index, "context generated");
            self.nodes[pos].context = Some(context);
            generated += 1;
        }

        Ok(generated)
    }

    /// Pretty JSON of the ordered node states.
    pub fn to_json(&self) -> GraphResult<String> {
        Ok(serde_json::to_string_pretty(&self.nodes)?)
    }

    /// Write the ordered node states to `path`.
    pub fn save(&self, path: &Path) -> GraphResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

// ============================================================================
// Parsing and Sorting
// ============================================================================

/// Parse the JSON form of a raw graph. `null` and blank input are an empty
/// graph.
pub fn parse_raw_graph(json: &str) -> GraphResult<Vec<RawNode>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let nodes: Option<Vec<RawNode>> = serde_json::from_str(json)?;
    Ok(nodes.unwrap_or_default())
}

/// Check the structural invariants of a raw graph.
pub fn validate(raw: &[RawNode]) -> GraphResult<()> {
    let total = raw.len();
    let mut seen = vec![false; total];

    for node in raw {
        if node.index >= total {
            return Err(GraphError::IndexOutOfRange {
                index: node.index,
                total,
            });
        }
        if seen[node.index] {
            return Err(GraphError::DuplicateIndex { index: node.index });
        }
        seen[node.index] = true;

        if node.dependencies_count != node.dependencies.len() {
            return Err(GraphError::CountMismatch {
                index: node.index,
                declared: node.dependencies_count,
                actual: node.dependencies.len(),
            });
        }
        if let Some(&missing) = node.dependencies.iter().find(|&&d| d >= total) {
            return Err(GraphError::DanglingDependency {
                index: node.index,
                dependency: missing,
            });
        }
    }

    Ok(())
}

/// Order `raw` topologically and resolve each node's dependencies.
pub fn topological_sort(raw: &[RawNode]) -> GraphResult<PreprocessedGraph> {
    validate(raw)?;

    let total = raw.len();
    if total == 0 {
        return Ok(PreprocessedGraph::default());
    }

    // index -> position in `raw`
    let mut by_index = vec![0usize; total];
    for (pos, node) in raw.iter().enumerate() {
        by_index[node.index] = pos;
    }

    let mut in_degree = vec![0usize; total];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); total];
    for node in raw {
        in_degree[node.index] = node.dependencies_count;
        for &dep in &node.dependencies {
            successors[dep].push(node.index);
        }
    }

    let mut queue: VecDeque<usize> = raw
        .iter()
        .filter(|n| n.dependencies_count == 0)
        .map(|n| n.index)
        .collect();

    let mut sorted = Vec::with_capacity(total);
    while let Some(u) = queue.pop_front() {
        sorted.push(u);
        for &v in &successors[u] {
            in_degree[v] -= 1;
            if in_degree[v] == 0 {
                queue.push_back(v);
            }
        }
    }

    if sorted.len() != total {
        let stuck: Vec<String> = (0..total)
            .filter(|&i| in_degree[i] > 0)
            .map(|i| format!("{} ({})", i, raw[by_index[i]].name))
            .collect();
        return Err(GraphError::CycleDetected {
            remaining: total - sorted.len(),
            nodes: stuck.join(", "),
        });
    }

    let mut nodes = Vec::with_capacity(total);
    let mut node_map = HashMap::with_capacity(total);
    for index in sorted {
        let data = &raw[by_index[index]];
        let dependencies = data
            .dependencies
            .iter()
            .map(|&d| raw[by_index[d]].info())
            .collect();
        node_map.insert(index, nodes.len());
        nodes.push(NodeState {
            index,
            node: data.info(),
            dependencies,
            dependency_indices: data.dependencies.clone(),
            context: None,
        });
    }

    Ok(PreprocessedGraph { nodes, node_map })
}

/// Parse and sort in one step.
pub fn preprocess_str(json: &str) -> GraphResult<PreprocessedGraph> {
    topological_sort(&parse_raw_graph(json)?)
}

/// Counts describing a serialized node list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawSummary {
    pub nodes: usize,
    pub dependencies: usize,
    pub average_dependencies: f64,
    /// Nodes with no dependencies; the first to be processed.
    pub leaves: usize,
    /// Nodes nothing depends on.
    pub roots: usize,
    /// Up to ten `(name, dependency count)` pairs, most dependencies first.
    pub top_nodes: Vec<(String, usize)>,
}

/// Summarize a node list without validating it.
pub fn summarize(raw: &[RawNode]) -> RawSummary {
    let dependencies: usize = raw.iter().map(|n| n.dependencies.len()).sum();
    let depended_on: std::collections::HashSet<usize> =
        raw.iter().flat_map(|n| n.dependencies.iter().copied()).collect();

    let mut top: Vec<(String, usize)> = raw
        .iter()
        .map(|n| (n.name.clone(), n.dependencies.len()))
        .collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(10);

    RawSummary {
        nodes: raw.len(),
        dependencies,
        average_dependencies: if raw.is_empty() {
            0.0
        } else {
            dependencies as f64 / raw.len() as f64
        },
        leaves: raw.iter().filter(|n| n.dependencies.is_empty()).count(),
        roots: raw.iter().filter(|n| !depended_on.contains(&n.index)).count(),
        top_nodes: top,
    }
}

// ============================================================================
// Loader State Machine
// ============================================================================

/// Where a [`Preprocessor`] is in its lifecycle.
#[derive(Debug, Clone)]
pub enum LoadState {
    Unloaded,
    Loading,
    Sorted(PreprocessedGraph),
    Failed(GraphError),
}

/// Loads a raw graph file once and keeps the outcome.
#[derive(Debug)]
pub struct Preprocessor {
    path: PathBuf,
    state: LoadState,
}

impl Preprocessor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Preprocessor {
            path: path.into(),
            state: LoadState::Unloaded,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    /// Load, validate and sort the graph file.
    pub fn load(&mut self) -> GraphResult<&PreprocessedGraph> {
        if let LoadState::Unloaded = self.state {
            self.state = LoadState::Loading;
            let outcome = fs::read_to_string(&self.path)
                .map_err(GraphError::from)
                .and_then(|json| preprocess_str(&json));

            self.state = match outcome {
                Ok(graph) => {
                    tracing::info!(
                        path = %self.path.display(),
                        nodes = graph.len(),
                        "graph loaded and sorted"
                    );
                    LoadState::Sorted(graph)
                }
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), error = %err, "graph load failed");
                    LoadState::Failed(err)
                }
            };
        }

        match &self.state {
            LoadState::Sorted(graph) => Ok(graph),
            LoadState::Failed(err) => Err(err.clone()),
            LoadState::Unloaded | LoadState::Loading => Err(GraphError::Io(format!(
                "graph at {} is not loaded",
                self.path.display()
            ))),
        }
    }

    pub fn graph(&self) -> Option<&PreprocessedGraph> {
        match &self.state {
            LoadState::Sorted(graph) => Some(graph),
            _ => None,
        }
    }

    pub fn graph_mut(&mut self) -> Option<&mut PreprocessedGraph> {
        match &mut self.state {
            LoadState::Sorted(graph) => Some(graph),
            _ => None,
        }
    }

    pub fn into_graph(self) -> Option<PreprocessedGraph> {
        match self.state {
            LoadState::Sorted(graph) => Some(graph),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
