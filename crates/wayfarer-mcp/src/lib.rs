mod bridge;
mod client;
mod handler;
mod session;

pub use bridge::{BridgedTool, ToolIndex};
pub use client::McpClientManager;
pub use handler::WayfarerClientHandler;
pub use session::McpSession;
