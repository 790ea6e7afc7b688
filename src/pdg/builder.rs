//! PDG construction.
//!
//! Layers control, data, and execution dependences over a freshly built
//! CFG. Data dependences come from a per-variable reachability walk with
//! def-kill short-circuiting; control dependences follow each predicate's
//! owning conditional block into its statements; execution dependences
//! mirror the CFG's forward edges. Nodes unreachable from the CFG enter
//! are processed with the same per-node logic afterwards.

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::cfg::builder::CfgBuilder;
use crate::cfg::types::{Cfg, CfgNodeId, CfgNodeKind};
use crate::pdg::types::{Pdg, PdgEdgeKind, PdgNodeFactory, PdgNodeId, PdgOptions};
use crate::pe::defuse::DefUse;
use crate::pe::types::{PeId, PeStore, StmtCategory};
use crate::pe::PeTree;

/// Builds the program dependence graph of one method.
///
/// `build` consumes the builder, so a graph is constructed exactly once
/// per instance; re-analysis means constructing a new builder.
pub struct PdgBuilder<'a> {
    store: &'a PeStore,
    defuse: DefUse<'a>,
    opts: PdgOptions,
    method: PeId,
    factory: PdgNodeFactory,
    enter: PdgNodeId,
    /// Parameter nodes paired with their variable elements.
    parameters: Vec<(PdgNodeId, PeId)>,
    exits: BTreeSet<PdgNodeId>,
}

impl<'a> PdgBuilder<'a> {
    /// Prepare a builder over a PE tree. The synthetic method-enter
    /// element is allocated here, before the analyses freeze the tree.
    pub fn new(tree: &'a mut PeTree, method: PeId, opts: PdgOptions) -> Self {
        let enter_pe = tree.store.synthesize_method_enter(method);
        let store: &'a PeStore = &tree.store;
        let defuse = DefUse::new(store, &tree.scopes);

        let mut factory = PdgNodeFactory::new();
        let enter = factory.make_enter_node(enter_pe);
        let parameters: Vec<(PdgNodeId, PeId)> = store
            .method(method)
            .map(|m| m.parameters.clone())
            .unwrap_or_default()
            .into_iter()
            .map(|p| (factory.make_normal_node(store, p), p))
            .collect();

        PdgBuilder {
            store,
            defuse,
            opts,
            method,
            factory,
            enter,
            parameters,
            exits: BTreeSet::new(),
        }
    }

    /// Build the PDG, constructing the underlying CFG first.
    pub fn build(mut self) -> Pdg {
        let cfg = CfgBuilder::new(self.store, self.method).build();
        trace!(nodes = cfg.nodes.len(), "building PDG over CFG");

        if self.opts.build_control_dependence {
            if self.opts.control_dependence_from_enter_to_all_nodes {
                self.build_control_dependence_into_block(&cfg, self.enter, self.method);
            }
            if self.opts.control_dependence_from_enter_to_parameter_nodes {
                for (node, _) in self.parameters.clone() {
                    self.factory
                        .add_edge(self.enter, node, PdgEdgeKind::Control(true));
                }
            }
        }

        if self.opts.build_execution_dependence && !cfg.is_empty() {
            let first = self.make_node(&cfg, cfg.enter);
            self.factory
                .add_edge(self.enter, first, PdgEdgeKind::Execution);
        }

        if self.opts.build_data_dependence {
            // Parameters flow into their first uses, and the enter node
            // feeds each parameter.
            for (node, pe) in self.parameters.clone() {
                let name = match self.store.variable(pe) {
                    Some(v) => v.name.clone(),
                    None => continue,
                };
                if !cfg.is_empty() {
                    let mut visited = FxHashSet::default();
                    self.build_data_dependence(&cfg, cfg.enter, node, &name, &mut visited);
                }
                self.factory
                    .add_edge(self.enter, node, PdgEdgeKind::Data(name));
            }
        }

        let mut checked = FxHashSet::default();
        if !cfg.is_empty() {
            self.build_dependence(&cfg, cfg.enter, &mut checked);
        }

        for &exit in &cfg.exits {
            let node = self.make_node(&cfg, exit);
            self.exits.insert(node);
        }

        if !cfg.is_empty() {
            // Unreachable nodes get the same per-node treatment.
            let unreachable: Vec<CfgNodeId> = cfg
                .nodes
                .difference(cfg.reachable_nodes())
                .copied()
                .collect();
            for node in unreachable {
                self.build_dependence(&cfg, node, &mut checked);
            }
        }

        Pdg {
            method: self.method,
            enter: self.enter,
            exits: self.exits,
            parameters: self.parameters.iter().map(|(n, _)| *n).collect(),
            cfg,
            factory: self.factory,
        }
    }

    // ------------------------------------------------------------------
    // Node projection
    // ------------------------------------------------------------------

    /// PDG image of a CFG node, preserving its role.
    fn make_node(&mut self, cfg: &Cfg, id: CfgNodeId) -> PdgNodeId {
        let node = cfg.node(id);
        let Some(pe) = node.pe else {
            debug_assert!(false, "pseudo CFG nodes have no PDG image");
            return self.enter;
        };
        match node.kind {
            CfgNodeKind::Control => self.factory.make_control_node(pe),
            _ => self.factory.make_normal_node(self.store, pe),
        }
    }

    // ------------------------------------------------------------------
    // Per-node dependence construction
    // ------------------------------------------------------------------

    /// Depth-first walk over the CFG adding data, control, and execution
    /// edges for each node.
    fn build_dependence(
        &mut self,
        cfg: &Cfg,
        cfg_node: CfgNodeId,
        checked: &mut FxHashSet<CfgNodeId>,
    ) {
        if !checked.insert(cfg_node) {
            return;
        }
        let pdg_node = self.make_node(cfg, cfg_node);

        if self.opts.build_data_dependence {
            if let Some(core) = cfg.node(cfg_node).pe {
                let assigned = self.defuse.assigned_variables(core);
                for variable in assigned {
                    let targets: Vec<CfgNodeId> =
                        cfg.node(cfg_node).forward.iter().map(|e| e.to).collect();
                    for to in targets {
                        let mut visited = FxHashSet::default();
                        self.build_data_dependence(cfg, to, pdg_node, &variable, &mut visited);
                    }
                }
            }
        }

        if self.opts.build_control_dependence
            && self.factory.node(pdg_node).kind.is_control()
        {
            if let Some(core) = cfg.node(cfg_node).pe {
                if let Some(block) = self.store.get(core).owner_conditional_block {
                    self.build_control_dependence_into_block(cfg, pdg_node, block);
                }
            }
        }

        if self.opts.build_execution_dependence {
            let successors: Vec<CfgNodeId> = cfg.forward_nodes(cfg_node).into_iter().collect();
            for to in successors {
                let to_pdg = self.make_node(cfg, to);
                self.factory
                    .add_edge(pdg_node, to_pdg, PdgEdgeKind::Execution);
            }
        }

        let successors: Vec<CfgNodeId> = cfg.forward_nodes(cfg_node).into_iter().collect();
        for to in successors {
            self.build_dependence(cfg, to, checked);
        }
    }

    /// Visit-marked DFS along CFG forward edges: add a data edge wherever
    /// the variable is referenced, and (optionally) stop propagating past
    /// a redefinition.
    fn build_data_dependence(
        &mut self,
        cfg: &Cfg,
        cfg_node: CfgNodeId,
        from: PdgNodeId,
        variable: &str,
        visited: &mut FxHashSet<CfgNodeId>,
    ) {
        if !visited.insert(cfg_node) {
            return;
        }
        if let Some(core) = cfg.node(cfg_node).pe {
            if self.defuse.referenced_variables(core).contains(variable) {
                let to = self.make_node(cfg, cfg_node);
                self.factory
                    .add_edge(from, to, PdgEdgeKind::Data(variable.to_string()));
            }
            if self.opts.avoid_def_propagation
                && self.defuse.assigned_variables(core).contains(variable)
            {
                return;
            }
        }
        let successors: Vec<CfgNodeId> = cfg.forward_nodes(cfg_node).into_iter().collect();
        for to in successors {
            self.build_data_dependence(cfg, to, from, variable, visited);
        }
    }

    // ------------------------------------------------------------------
    // Control dependence
    // ------------------------------------------------------------------

    /// Add control edges from a source node into a block's statements:
    /// main body with the true label, else branch with false, updaters
    /// with true.
    fn build_control_dependence_into_block(
        &mut self,
        cfg: &Cfg,
        from: PdgNodeId,
        block: PeId,
    ) {
        let statements: Vec<PeId> = self.store.block_statements(block).to_vec();
        for stmt in statements {
            self.build_control_dependence_to_statement(cfg, from, stmt, true);
        }
        if let Some(info) = self.store.stmt(block).cloned() {
            for stmt in info.else_statements {
                self.build_control_dependence_to_statement(cfg, from, stmt, false);
            }
            for updater in info.updaters {
                let to = self.factory.make_normal_node(self.store, updater);
                self.factory
                    .add_edge(from, to, PdgEdgeKind::Control(true));
            }
        }
    }

    /// Control-edge dispatch by target statement category.
    fn build_control_dependence_to_statement(
        &mut self,
        cfg: &Cfg,
        from: PdgNodeId,
        stmt: PeId,
        branch: bool,
    ) {
        let Some(info) = self.store.stmt(stmt).cloned() else {
            return;
        };
        match info.category {
            // Branching statements: depend through their predicate, or
            // transparently through their body when there is none.
            StmtCategory::Catch
            | StmtCategory::Do
            | StmtCategory::For
            | StmtCategory::Foreach
            | StmtCategory::If
            | StmtCategory::SimpleBlock
            | StmtCategory::Synchronized
            | StmtCategory::Switch
            | StmtCategory::Try
            | StmtCategory::While => {
                match info.condition {
                    Some(condition) => {
                        let to = self.factory.make_control_node(condition);
                        self.factory
                            .add_edge(from, to, PdgEdgeKind::Control(branch));
                    }
                    None => self.build_control_dependence_into_block(cfg, from, stmt),
                }
                for initializer in info.initializers {
                    let to = self.factory.make_normal_node(self.store, initializer);
                    self.factory
                        .add_edge(from, to, PdgEdgeKind::Control(branch));
                }
            }
            // Leaf executables: depend directly, but only when the CFG
            // actually materialized them in this graph.
            StmtCategory::Assert
            | StmtCategory::Break
            | StmtCategory::Case
            | StmtCategory::Continue
            | StmtCategory::Expression
            | StmtCategory::Return
            | StmtCategory::Throw
            | StmtCategory::VariableDeclaration => {
                if let Some(cfg_node) = cfg.factory().get_node(stmt) {
                    if cfg.nodes.contains(&cfg_node) {
                        let to = self.factory.make_normal_node(self.store, stmt);
                        self.factory
                            .add_edge(from, to, PdgEdgeKind::Control(branch));
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang;
    use crate::pdg::types::PdgNodeKind;
    use crate::pe::PeBuilder;

    fn build(source: &str, method: &str, opts: PdgOptions) -> (PeTree, Pdg) {
        let tree = lang::parse(source, "<test>").unwrap();
        let mut pe_tree = PeBuilder::build(source, &tree);
        let m = pe_tree.require_method(method).unwrap();
        let pdg = PdgBuilder::new(&mut pe_tree, m, opts).build();
        (pe_tree, pdg)
    }

    fn node_text(tree: &PeTree, pdg: &Pdg, id: PdgNodeId) -> String {
        tree.store.text(pdg.node(id).pe).to_string()
    }

    fn find_node(tree: &PeTree, pdg: &Pdg, needle: &str) -> PdgNodeId {
        pdg.nodes()
            .map(|n| n.id)
            .find(|id| node_text(tree, pdg, *id).contains(needle))
            .unwrap_or_else(|| panic!("no PDG node containing {needle:?}"))
    }

    fn has_data_edge(pdg: &Pdg, from: PdgNodeId, to: PdgNodeId, var: &str) -> bool {
        pdg.node(from).forward.iter().any(|e| {
            e.to == to && e.kind == PdgEdgeKind::Data(var.to_string())
        })
    }

    #[test]
    fn test_enter_node_text_and_kind() {
        let (tree, pdg) = build(
            "class A { void f() { g(); } }",
            "f",
            PdgOptions::default(),
        );
        assert_eq!(node_text(&tree, &pdg, pdg.enter), "Enter");
        assert_eq!(pdg.node(pdg.enter).kind, PdgNodeKind::MethodEnter);
    }

    #[test]
    fn test_empty_method_has_only_enter_and_parameters() {
        let (_, pdg) = build(
            "class A { void f(int x) {} }",
            "f",
            PdgOptions::default(),
        );
        assert!(pdg.cfg.is_empty());
        assert_eq!(pdg.parameters.len(), 1);
        assert_eq!(pdg.factory().len(), 2);
        assert!(pdg.exits.is_empty());
        // The parameter still receives its enter data edge.
        let param = pdg.parameters[0];
        assert!(has_data_edge(&pdg, pdg.enter, param, "x"));
    }

    #[test]
    fn test_simple_assignment_and_use() {
        // Scenario: parameter flows into the declaration, execution
        // chains enter -> s1 -> s2.
        let (tree, pdg) = build(
            "class A { void f(int x) { int y = x + 1; return; } }",
            "f",
            PdgOptions::default(),
        );
        let s1 = find_node(&tree, &pdg, "int y = ( x + 1 )");
        let s2 = find_node(&tree, &pdg, "return;");
        let param = pdg.parameters[0];

        assert!(has_data_edge(&pdg, param, s1, "x"));
        assert!(pdg
            .node(pdg.enter)
            .forward
            .iter()
            .any(|e| e.to == s1 && e.kind == PdgEdgeKind::Execution));
        assert!(pdg
            .node(s1)
            .forward
            .iter()
            .any(|e| e.to == s2 && e.kind == PdgEdgeKind::Execution));
        assert!(pdg.exits.contains(&s2));
    }

    #[test]
    fn test_def_kill_short_circuit() {
        let source = "class A { void f() { int a = 1; a = 2; use(a); } }";
        let (tree, pdg) = build(source, "f", PdgOptions::default());
        let first = find_node(&tree, &pdg, "int a = 1");
        let second = find_node(&tree, &pdg, "a = 2");
        let use_node = find_node(&tree, &pdg, "use(a)");

        // The killed definition does not reach the use.
        assert!(!has_data_edge(&pdg, first, use_node, "a"));
        assert!(has_data_edge(&pdg, second, use_node, "a"));

        // With propagation allowed, both definitions reach it.
        let opts = PdgOptions {
            avoid_def_propagation: false,
            ..PdgOptions::default()
        };
        let (tree, pdg) = build(source, "f", opts);
        let first = find_node(&tree, &pdg, "int a = 1");
        let second = find_node(&tree, &pdg, "a = 2");
        let use_node = find_node(&tree, &pdg, "use(a)");
        assert!(has_data_edge(&pdg, first, use_node, "a"));
        assert!(has_data_edge(&pdg, second, use_node, "a"));
    }

    #[test]
    fn test_if_else_control_and_merged_data() {
        let (tree, pdg) = build(
            "class A { void f(boolean c, int a) { if (c) { a = 1; } else { a = 2; } use(a); } }",
            "f",
            PdgOptions::default(),
        );
        let cond = find_node(&tree, &pdg, "if c");
        let then_node = find_node(&tree, &pdg, "a = 1");
        let else_node = find_node(&tree, &pdg, "a = 2");
        let use_node = find_node(&tree, &pdg, "use(a)");

        assert_eq!(pdg.node(cond).kind, PdgNodeKind::Control);
        assert!(pdg.node(cond).forward.iter().any(|e| {
            e.to == then_node && e.kind == PdgEdgeKind::Control(true)
        }));
        assert!(pdg.node(cond).forward.iter().any(|e| {
            e.to == else_node && e.kind == PdgEdgeKind::Control(false)
        }));
        // Both definitions reach the merged use.
        assert!(has_data_edge(&pdg, then_node, use_node, "a"));
        assert!(has_data_edge(&pdg, else_node, use_node, "a"));
    }

    #[test]
    fn test_loop_body_control_dependence() {
        let (tree, pdg) = build(
            "class A { void f(int n) { while (n > 0) { n = n - 1; } } }",
            "f",
            PdgOptions::default(),
        );
        let cond = find_node(&tree, &pdg, "while ");
        let body = find_node(&tree, &pdg, "n = ( n - 1 )");
        assert!(pdg
            .node(cond)
            .forward
            .iter()
            .any(|e| e.to == body && e.kind == PdgEdgeKind::Control(true)));
        // Loop-carried data dependence: the body feeds the condition and
        // itself.
        assert!(has_data_edge(&pdg, body, cond, "n"));
        assert!(has_data_edge(&pdg, body, body, "n"));
    }

    #[test]
    fn test_execution_edges_one_per_successor() {
        let (tree, pdg) = build(
            "class A { void f(boolean c) { if (c) { g(); } h(); } }",
            "f",
            PdgOptions::default(),
        );
        let cond = find_node(&tree, &pdg, "if c");
        let execution_targets: Vec<PdgNodeId> = pdg
            .node(cond)
            .forward
            .iter()
            .filter(|e| e.kind == PdgEdgeKind::Execution)
            .map(|e| e.to)
            .collect();
        // Two CFG successors, exactly one execution edge each.
        assert_eq!(execution_targets.len(), 2);
    }

    #[test]
    fn test_disabled_layers_produce_no_edges() {
        let opts = PdgOptions {
            build_control_dependence: false,
            build_data_dependence: false,
            build_execution_dependence: true,
            ..PdgOptions::default()
        };
        let (_, pdg) = build(
            "class A { void f(int x) { if (x > 0) { x = 1; } use(x); } }",
            "f",
            opts,
        );
        assert!(pdg
            .all_edges()
            .iter()
            .all(|e| e.kind == PdgEdgeKind::Execution));
    }

    #[test]
    fn test_enter_to_parameter_control_seed() {
        let opts = PdgOptions {
            control_dependence_from_enter_to_parameter_nodes: true,
            ..PdgOptions::default()
        };
        let (_, pdg) = build("class A { void f(int x) { use(x); } }", "f", opts);
        let param = pdg.parameters[0];
        assert!(pdg
            .node(pdg.enter)
            .forward
            .iter()
            .any(|e| e.to == param && e.kind == PdgEdgeKind::Control(true)));
    }

    #[test]
    fn test_enter_to_all_nodes_control_seed() {
        let opts = PdgOptions {
            control_dependence_from_enter_to_all_nodes: true,
            ..PdgOptions::default()
        };
        let (tree, pdg) = build(
            "class A { void f(boolean c) { g(); if (c) { h(); } } }",
            "f",
            opts,
        );
        let g = find_node(&tree, &pdg, "g()");
        let cond = find_node(&tree, &pdg, "if c");
        assert!(pdg
            .node(pdg.enter)
            .forward
            .iter()
            .any(|e| e.to == g && e.kind == PdgEdgeKind::Control(true)));
        // Branching statements are seeded through their predicate.
        assert!(pdg
            .node(pdg.enter)
            .forward
            .iter()
            .any(|e| e.to == cond && e.kind == PdgEdgeKind::Control(true)));
    }

    #[test]
    fn test_unreachable_nodes_are_analyzed() {
        let (tree, pdg) = build(
            "class A { int f(int a) { return a; int b = a + 1; use(b); } }",
            "f",
            PdgOptions::default(),
        );
        // `int b = a + 1` is unreachable but still feeds `use(b)`.
        let decl = find_node(&tree, &pdg, "int b = ( a + 1 )");
        let use_node = find_node(&tree, &pdg, "use(b)");
        assert!(has_data_edge(&pdg, decl, use_node, "b"));
    }

    #[test]
    fn test_every_edge_endpoint_exists() {
        let (_, pdg) = build(
            "class A { int f(int n) { int s = 0; for (int i = 0; i < n; i++) { s += i; } return s; } }",
            "f",
            PdgOptions::default(),
        );
        let count = pdg.factory().len() as u32;
        for edge in pdg.all_edges() {
            assert!(edge.from.0 < count);
            assert!(edge.to.0 < count);
        }
    }

    #[test]
    fn test_structural_equality_across_builds() {
        let source =
            "class A { int f(int x) { int y = x + 1; if (y > 0) { y = y - 1; } return y; } }";
        let shape = |pdg: &Pdg, tree: &PeTree| -> Vec<(String, String, String)> {
            pdg.all_edges()
                .iter()
                .map(|e| {
                    (
                        tree.store.text(pdg.node(e.from).pe).to_string(),
                        tree.store.text(pdg.node(e.to).pe).to_string(),
                        format!("{}:{}", e.dependence_type(), e.dependence_string()),
                    )
                })
                .collect()
        };
        let (tree1, pdg1) = build(source, "f", PdgOptions::default());
        let (tree2, pdg2) = build(source, "f", PdgOptions::default());
        assert_eq!(shape(&pdg1, &tree1), shape(&pdg2, &tree2));
    }
}
