//! Control-flow graph extraction and rendering.
//!
//! Builds per-method CFGs from the PE tree, with explicit enter/exit
//! sets, branch-labeled control edges, and jump edges for break/continue.
//!
//! # Modules
//!
//! - [`types`]: nodes, edges, the node factory, and the graph
//! - [`builder`]: per-method construction from PE statements
//! - [`render`]: output formats (DOT, JSON)

pub mod builder;
pub mod render;
pub mod types;

pub use builder::CfgBuilder;
pub use render::{to_dot, to_json};
pub use types::{Cfg, CfgEdge, CfgEdgeKind, CfgNode, CfgNodeFactory, CfgNodeId, CfgNodeKind};
