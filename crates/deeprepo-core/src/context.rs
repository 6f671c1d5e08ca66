//! Seam for the downstream consumer that generates per-node context.
//!
//! The consumer walks a [`PreprocessedGraph`](crate::preprocess::PreprocessedGraph)
//! in processing order, so by the time a node is handed over, every node it
//! depends on already has its context.

use std::fmt;

use crate::preprocess::NodeInfo;

/// A dependency of the node being processed, with its generated context.
#[derive(Debug, Clone, Copy)]
pub struct DependencyContext<'a> {
    pub index: usize,
    pub node: &'a NodeInfo,
    pub context: Option<&'a str>,
}

/// Produces the context text for one node.
pub trait ContextProvider {
    /// The provider's failure type. Reported as
    /// [`GraphError::Context`](crate::error::GraphError::Context).
    type Error: fmt::Display;

    fn generate(
        &mut self,
        node: &NodeInfo,
        dependencies: &[DependencyContext<'_>],
    ) -> Result<String, Self::Error>;
}
