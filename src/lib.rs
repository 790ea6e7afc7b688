//! propgraph - property-graph extraction for Java-style sources.
//!
//! Builds three intra-procedural views of every method in a compilation
//! unit, parsed with tree-sitter:
//!
//! - **PE tree** ([`pe`]): a normalized, category-tagged tree of program
//!   elements with stable ids, lexical scopes, and per-element def/use
//!   facts.
//! - **CFG** ([`cfg`]): a per-method control-flow graph with explicit
//!   enter/exit sets, branch-labeled control edges, and jump edges.
//! - **PDG** ([`pdg`]): a per-method program dependence graph layering
//!   control, data, and execution dependences over the CFG.
//!
//! # Quick start
//!
//! ```no_run
//! use propgraph::{analyze_source, CfgBuilder, PdgBuilder, PdgOptions};
//!
//! let source = "class A { int f(int x) { int y = x + 1; return y; } }";
//! let mut tree = analyze_source(source)?;
//! let method = tree.require_method("f")?;
//!
//! let cfg = CfgBuilder::new(&tree.store, method).build();
//! println!("{}", propgraph::cfg::to_dot(&cfg, &tree.store));
//!
//! let pdg = PdgBuilder::new(&mut tree, method, PdgOptions::default()).build();
//! println!("{}", propgraph::pdg::to_dot(&pdg, &tree.store));
//! # Ok::<(), propgraph::PropgraphError>(())
//! ```
//!
//! The pipeline is synchronous and single-threaded: per compilation unit,
//! build the PE tree, then per method build the CFG and the PDG. All
//! analyses are pure over their inputs; def/use facts are memoized per
//! element on first request.

pub mod cfg;
pub mod error;
pub mod lang;
pub mod pdg;
pub mod pe;

use std::path::Path;

use tracing::trace;

pub use crate::cfg::{Cfg, CfgBuilder, CfgEdge, CfgEdgeKind, CfgNodeId, CfgNodeKind};
pub use crate::error::{PropgraphError, Result};
pub use crate::pdg::{Pdg, PdgBuilder, PdgEdge, PdgEdgeKind, PdgNodeId, PdgNodeKind, PdgOptions};
pub use crate::pe::{
    DefKind, DefUse, ExprCategory, PeBuilder, PeId, PeStore, PeTree, StmtCategory, UseKind,
};

/// Parse source text and build its PE tree.
pub fn analyze_source(source: &str) -> Result<PeTree> {
    let tree = lang::parse(source, "<string>")?;
    trace!(bytes = source.len(), "parsed compilation unit");
    Ok(PeBuilder::build(source, &tree))
}

/// Read a file, parse it, and build its PE tree.
pub fn analyze_file(path: impl AsRef<Path>) -> Result<PeTree> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .map_err(|e| PropgraphError::io_with_path(e, path))?;
    let tree = lang::parse(&source, &path.display().to_string())?;
    Ok(PeBuilder::build(&source, &tree))
}

/// Build the CFG of a named method from source text.
///
/// Convenience wrapper returning the PE tree alongside the graph (node
/// texts and spans live in the tree's store).
pub fn extract_cfg(source: &str, method: &str) -> Result<(PeTree, Cfg)> {
    let tree = analyze_source(source)?;
    let m = tree.require_method(method)?;
    let cfg = CfgBuilder::new(&tree.store, m).build();
    Ok((tree, cfg))
}

/// Build the PDG of a named method from source text with the given
/// options.
pub fn extract_pdg(source: &str, method: &str, opts: PdgOptions) -> Result<(PeTree, Pdg)> {
    let mut tree = analyze_source(source)?;
    let m = tree.require_method(method)?;
    let pdg = PdgBuilder::new(&mut tree, m, opts).build();
    Ok((tree, pdg))
}

/// Build CFGs for every method of a compilation unit, in source order.
pub fn extract_all_cfgs(tree: &PeTree) -> Vec<Cfg> {
    tree.methods
        .iter()
        .map(|m| CfgBuilder::new(&tree.store, *m).build())
        .collect()
}

/// Build PDGs for every method of a compilation unit, in source order.
pub fn extract_all_pdgs(tree: &mut PeTree, opts: PdgOptions) -> Vec<Pdg> {
    let methods = tree.methods.clone();
    methods
        .into_iter()
        .map(|m| PdgBuilder::new(tree, m, opts).build())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_source_and_lookup() {
        let tree = analyze_source("class A { void f() {} void g() {} }").unwrap();
        assert!(tree.method_by_name("f").is_some());
        assert!(tree.method_by_name("missing").is_none());
        assert!(matches!(
            tree.require_method("missing"),
            Err(PropgraphError::MethodNotFound(_))
        ));
    }

    #[test]
    fn test_extract_cfg_convenience() {
        let (tree, cfg) =
            extract_cfg("class A { void f() { g(); h(); } }", "f").unwrap();
        assert_eq!(cfg.nodes.len(), 2);
        assert_eq!(tree.store.text(cfg.node(cfg.enter).pe.unwrap()), "g();");
    }

    #[test]
    fn test_extract_all_pdgs() {
        let mut tree =
            analyze_source("class A { void f() { g(); } void g() { h(); } }").unwrap();
        let pdgs = extract_all_pdgs(&mut tree, PdgOptions::default());
        assert_eq!(pdgs.len(), 2);
    }

    #[test]
    fn test_analyze_file_io_error_has_path() {
        let err = analyze_file("/no/such/file.java").unwrap_err();
        match err {
            PropgraphError::IoWithPath { path, .. } => {
                assert!(path.to_string_lossy().contains("file.java"));
            }
            other => panic!("expected IoWithPath, got {other:?}"),
        }
    }
}
