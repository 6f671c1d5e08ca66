//! Core data model for deeprepo.
//!
//! This crate is language-agnostic and never talks to a process:
//! - Positions, locations, and declaration keys
//! - Symbol kinds and per-file documents
//! - The knowledge graph arena and its export forms
//! - Topological preprocessing of a serialized graph
//! - The context-provider seam for downstream consumers
//! - Text utilities (tabs, UTF-16 columns, file URIs, line ranges)

pub mod context;
pub mod document;
pub mod error;
pub mod graph;
pub mod preprocess;
pub mod symbol;
pub mod text;
pub mod types;
