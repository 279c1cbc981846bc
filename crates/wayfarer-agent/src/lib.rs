pub mod agent_loop;
pub mod controller;
pub mod graph;
pub mod lifecycle;
pub mod stages;

pub use agent_loop::McpAgent;
pub use controller::{is_quit, render, Collaborators, RunController, RunEnvironment, RunOutcome};
pub use graph::{Edge, EdgeCondition, GraphRun, Stage, StateRecord, StateUpdate, WorkflowGraph, END};
pub use lifecycle::{release_session, CloseOutcome, SessionLifecycle};
pub use stages::{listing_workflow, GenerateStage, SummarizeStage, FALLBACK_RESPONSE};
