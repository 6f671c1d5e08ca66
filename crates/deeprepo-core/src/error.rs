//! Error types for the graph model and the preprocessing step.
//!
//! Every variant here is fatal for the operation that produced it: a load
//! that fails integrity checks returns no partial graph.

use thiserror::Error;

/// Errors raised while loading, validating, ordering, or persisting a graph.
///
/// I/O and JSON failures are stored as messages so the error stays `Clone`;
/// a failed [`Preprocessor`](crate::preprocess::Preprocessor) keeps its error
/// as a terminal state and hands out copies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Kahn's algorithm could not order every node.
    #[error("A cycle was detected in the dependency graph. Cannot perform topological sort. {remaining} node(s) left unordered: {nodes}")]
    CycleDetected { remaining: usize, nodes: String },

    /// `dependencies_count` disagrees with the dependency list.
    #[error("node {index}: dependencies_count is {declared} but {actual} dependencies are listed")]
    CountMismatch {
        index: usize,
        declared: usize,
        actual: usize,
    },

    /// The same node index appears twice.
    #[error("duplicate node index {index}")]
    DuplicateIndex { index: usize },

    /// A node index falls outside `[0, N)`.
    #[error("node index {index} out of range for {total} node(s)")]
    IndexOutOfRange { index: usize, total: usize },

    /// A dependency points at a node that does not exist.
    #[error("node {index} depends on missing node {dependency}")]
    DanglingDependency { index: usize, dependency: usize },

    /// A lookup by node index failed.
    #[error("unknown node index {index}")]
    UnknownNode { index: usize },

    /// The context provider rejected a node.
    #[error("context generation failed for node {index} ({name}): {message}")]
    Context {
        index: usize,
        name: String,
        message: String,
    },

    /// Reading or writing a graph file failed.
    #[error("IO error: {0}")]
    Io(String),

    /// The graph file is not valid JSON for the expected shape.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<std::io::Error> for GraphError {
    fn from(err: std::io::Error) -> Self {
        GraphError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Json(err.to_string())
    }
}

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
