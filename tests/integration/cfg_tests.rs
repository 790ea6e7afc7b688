//! CFG boundary behaviors and invariants over parsed sources.

use propgraph::pe::PeTree;
use propgraph::{extract_cfg, Cfg, CfgEdgeKind, CfgNodeId, CfgNodeKind};

fn build(source: &str, method: &str) -> (PeTree, Cfg) {
    extract_cfg(source, method).expect("source parses and method exists")
}

fn find_node(tree: &PeTree, cfg: &Cfg, needle: &str) -> CfgNodeId {
    cfg.nodes
        .iter()
        .copied()
        .find(|id| {
            cfg.node(*id)
                .pe
                .map(|pe| tree.store.text(pe).contains(needle))
                .unwrap_or(false)
        })
        .unwrap_or_else(|| panic!("no node containing {needle:?}"))
}

#[test]
fn test_empty_method_boundary() {
    let (_, cfg) = build("class A { void f() {} }", "f");
    assert!(cfg.is_empty());
    assert_eq!(cfg.node(cfg.enter).kind, CfgNodeKind::Pseudo);
    assert!(cfg.exits.is_empty());
    assert!(cfg.all_edges().is_empty());
}

#[test]
fn test_endless_for_boundary() {
    // for (;;) has no false-branch exit; only break/return/throw leave.
    let (_, cfg) = build("class A { void f() { for (;;) { tick(); } } }", "f");
    assert!(cfg.exits.is_empty());

    let (tree, cfg) = build(
        "class A { void f() { for (;;) { if (done()) { break; } } } }",
        "f",
    );
    let brk = find_node(&tree, &cfg, "break;");
    assert!(cfg.exits.contains(&brk));
}

#[test]
fn test_switch_fall_through_boundary() {
    let (tree, cfg) = build(
        "class A { void f(int x) { switch (x) { case 1: one(); case 2: two(); } } }",
        "f",
    );
    let one = find_node(&tree, &cfg, "one()");
    let case2 = find_node(&tree, &cfg, "case 2:");
    // The tail of one case chains into the head of the next.
    assert!(cfg.node(one).forward.iter().any(|e| e.to == case2));
}

#[test]
fn test_all_edges_have_endpoints_in_node_set() {
    let source = r#"
class A {
    int mix(int n, int[] data) {
        int total = 0;
        outer: for (int i = 0; i < n; i++) {
            switch (data[i]) {
                case 0: continue;
                case 1: break outer;
                default: total += data[i];
            }
        }
        try {
            check(total);
        } catch (Exception e) {
            return -1;
        }
        return total;
    }
}
"#;
    let (_, cfg) = build(source, "mix");
    for edge in cfg.all_edges() {
        assert!(cfg.nodes.contains(&edge.from));
        assert!(cfg.nodes.contains(&edge.to));
    }
    // Reachability never escapes the node set either.
    for id in cfg.reachable_nodes() {
        assert!(cfg.nodes.contains(id));
    }
}

#[test]
fn test_labeled_continue_targets_outer_loop() {
    let (tree, cfg) = build(
        "class A { void f() { outer: while (a()) { while (b()) { continue outer; } } } }",
        "f",
    );
    let cont = find_node(&tree, &cfg, "continue outer");
    let outer_cond = find_node(&tree, &cfg, "while a()");
    let edge = cfg.node(cont).forward.iter().next().unwrap();
    assert_eq!(edge.to, outer_cond);
    assert_eq!(edge.kind, CfgEdgeKind::Jump);
}

#[test]
fn test_remove_switch_cases_preserves_flow() {
    let (tree, mut cfg) = build(
        "class A { void f(int x) { switch (x) { case 1: one(); break; default: two(); } done(); } }",
        "f",
    );
    let one = find_node(&tree, &cfg, "one()");
    let two = find_node(&tree, &cfg, "two()");

    cfg.remove_switch_cases();
    assert!(cfg
        .nodes
        .iter()
        .all(|id| cfg.node(*id).kind != CfgNodeKind::SwitchCase));
    // The predicate now feeds the case bodies directly.
    let control = cfg
        .nodes
        .iter()
        .copied()
        .find(|id| cfg.node(*id).kind == CfgNodeKind::Control)
        .unwrap();
    assert!(cfg.node(control).forward.iter().any(|e| e.to == one));
    assert!(cfg.node(control).forward.iter().any(|e| e.to == two));
    for edge in cfg.all_edges() {
        assert!(cfg.nodes.contains(&edge.from));
        assert!(cfg.nodes.contains(&edge.to));
    }
}

#[test]
fn test_remove_jump_statements_preserves_flow() {
    let (tree, mut cfg) = build(
        "class A { void f() { while (c()) { break; } after(); } }",
        "f",
    );
    let cond = find_node(&tree, &cfg, "while c()");
    let after = find_node(&tree, &cfg, "after()");

    cfg.remove_jump_statements();
    assert!(cfg
        .nodes
        .iter()
        .all(|id| !matches!(cfg.node(*id).kind, CfgNodeKind::Break | CfgNodeKind::Continue)));
    // The loop predicate's true branch now reaches past the loop.
    assert!(cfg.node(cond).forward.iter().any(|e| e.to == after));
}

#[test]
fn test_canonical_edge_order_is_stable() {
    let source = "class A { void f(int x) { if (x > 0) { g(); } else { h(); } k(); } }";
    let (tree1, cfg1) = build(source, "f");
    let (tree2, cfg2) = build(source, "f");

    let shape = |tree: &PeTree, cfg: &Cfg| -> Vec<(String, String, &'static str)> {
        cfg.all_edges()
            .iter()
            .map(|e| {
                let text = |id: CfgNodeId| {
                    cfg.node(id)
                        .pe
                        .map(|pe| tree.store.text(pe).to_string())
                        .unwrap_or_default()
                };
                (text(e.from), text(e.to), e.dependence_string())
            })
            .collect()
    };
    assert_eq!(shape(&tree1, &cfg1), shape(&tree2, &cfg2));
}

#[test]
fn test_do_while_has_body_entry() {
    let (tree, cfg) = build(
        "class A { void f(int n) { do { work(); } while (n > 0); } }",
        "f",
    );
    let body = find_node(&tree, &cfg, "work()");
    assert_eq!(cfg.enter, body);
    // The predicate's false branch is the only normal exit.
    let cond = find_node(&tree, &cfg, "( n > 0 )");
    assert!(cfg.exits.contains(&cond));
}

#[test]
fn test_throw_is_exit() {
    let (tree, cfg) = build(
        "class A { void f(boolean bad) { if (bad) { throw new IllegalStateException(); } ok(); } }",
        "f",
    );
    let throw_node = find_node(&tree, &cfg, "throw ");
    assert!(cfg.exits.contains(&throw_node));
    assert!(cfg.node(throw_node).forward.is_empty());
}
