//! Program dependence graph construction and rendering.
//!
//! Layers control, data, and execution dependences over the CFG of a
//! method, each independently switchable via [`PdgOptions`].
//!
//! # Modules
//!
//! - [`types`]: nodes, edges, the node factory, options, and the graph
//! - [`builder`]: construction over a freshly built CFG
//! - [`render`]: output formats (DOT, JSON)

pub mod builder;
pub mod render;
pub mod types;

pub use builder::PdgBuilder;
pub use render::{to_dot, to_json};
pub use types::{Pdg, PdgEdge, PdgEdgeKind, PdgNode, PdgNodeFactory, PdgNodeId, PdgNodeKind, PdgOptions};
