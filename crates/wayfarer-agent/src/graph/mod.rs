//! Workflow engine for the listing pipeline.
//!
//! A workflow is a small directed graph of [`Stage`]s connected by [`Edge`]s.
//! Each stage takes a [`StateRecord`] by value and returns a new one; after a
//! stage returns, its outgoing edges are checked in order against that output
//! and the first match picks the next stage, or [`END`].

pub mod edge;
pub mod executor;
pub mod state;

pub use edge::{Edge, EdgeCondition};
pub use executor::{GraphRun, Stage, WorkflowGraph, WorkflowGraphBuilder, END};
pub use state::{StateRecord, StateUpdate};
