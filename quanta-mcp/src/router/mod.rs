//! Tool name normalization and dispatch tables

pub mod capabilities;
pub mod catalog;
pub mod error;

pub use capabilities::CapabilityRegistry;
pub use catalog::{StandaloneTool, ToolCatalog, ToolFamily, ToolInvocation};
pub use error::RoutingError;
