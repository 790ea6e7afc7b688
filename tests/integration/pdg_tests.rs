//! End-to-end PDG scenarios.

use std::collections::BTreeSet;

use propgraph::pe::PeTree;
use propgraph::{extract_pdg, Pdg, PdgEdgeKind, PdgNodeId, PdgNodeKind, PdgOptions};

fn build(source: &str, method: &str, opts: PdgOptions) -> (PeTree, Pdg) {
    extract_pdg(source, method, opts).expect("source parses and method exists")
}

fn find_node(tree: &PeTree, pdg: &Pdg, needle: &str) -> PdgNodeId {
    pdg.nodes()
        .find(|n| tree.store.text(n.pe).contains(needle))
        .map(|n| n.id)
        .unwrap_or_else(|| panic!("no PDG node containing {needle:?}"))
}

fn has_data_edge(pdg: &Pdg, from: PdgNodeId, to: PdgNodeId, var: &str) -> bool {
    pdg.node(from)
        .forward
        .iter()
        .any(|e| e.to == to && e.kind == PdgEdgeKind::Data(var.to_string()))
}

#[test]
fn test_scenario_simple_assignment_and_use() {
    // void f(int x) { int y = x + 1; return; }
    let (tree, pdg) = build(
        "class A { void f(int x) { int y = x + 1; return; } }",
        "f",
        PdgOptions::default(),
    );
    let s1 = find_node(&tree, &pdg, "int y = ( x + 1 )");
    let s2 = find_node(&tree, &pdg, "return;");
    let x = pdg.parameters[0];
    assert_eq!(pdg.node(x).kind, PdgNodeKind::Parameter);

    // Data: x -> s1 labeled x; enter -> x labeled x.
    assert!(has_data_edge(&pdg, x, s1, "x"));
    assert!(has_data_edge(&pdg, pdg.enter, x, "x"));
    // Execution: enter -> s1 -> s2.
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
    // The return neither defines nor uses anything, so it receives no
    // data edges.
    assert!(pdg
        .node(s2)
        .backward
        .iter()
        .all(|e| !matches!(e.kind, PdgEdgeKind::Data(_))));
}

#[test]
fn test_scenario_def_kill_short_circuit() {
    let source = "class A { void f() { int a = 1; a = 2; use(a); } }";

    let (tree, pdg) = build(source, "f", PdgOptions::default());
    let first = find_node(&tree, &pdg, "int a = 1");
    let second = find_node(&tree, &pdg, "a = 2");
    let use_node = find_node(&tree, &pdg, "use(a)");
    assert!(!has_data_edge(&pdg, first, use_node, "a"));
    assert!(has_data_edge(&pdg, second, use_node, "a"));

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
fn test_scenario_labeled_break() {
    let (tree, pdg) = build(
        "class A { void f() { outer: while (a()) { while (b()) { break outer; } } done(); } }",
        "f",
        PdgOptions::default(),
    );
    let brk = find_node(&tree, &pdg, "break outer");
    let done = find_node(&tree, &pdg, "done()");
    // The jump lands past the outer loop, so the only execution successor
    // of the break is the statement after it.
    let exec_targets: BTreeSet<PdgNodeId> = pdg
        .node(brk)
        .forward
        .iter()
        .filter(|e| e.kind == PdgEdgeKind::Execution)
        .map(|e| e.to)
        .collect();
    assert_eq!(exec_targets.len(), 1);
    assert!(exec_targets.contains(&done));
}

#[test]
fn test_scenario_if_else_control_dependence() {
    let (tree, pdg) = build(
        "class A { void f(boolean c, int a) { if (c) { a = 1; } else { a = 2; } use(a); } }",
        "f",
        PdgOptions::default(),
    );
    let cond = find_node(&tree, &pdg, "if c");
    let then_node = find_node(&tree, &pdg, "a = 1");
    let else_node = find_node(&tree, &pdg, "a = 2");
    let use_node = find_node(&tree, &pdg, "use(a)");

    assert!(pdg
        .node(cond)
        .forward
        .iter()
        .any(|e| e.to == then_node && e.kind == PdgEdgeKind::Control(true)));
    assert!(pdg
        .node(cond)
        .forward
        .iter()
        .any(|e| e.to == else_node && e.kind == PdgEdgeKind::Control(false)));
    // The merged use receives one data edge per branch definition.
    assert!(has_data_edge(&pdg, then_node, use_node, "a"));
    assert!(has_data_edge(&pdg, else_node, use_node, "a"));
}

#[test]
fn test_nested_control_dependence_goes_through_predicates() {
    let (tree, pdg) = build(
        "class A { void f(boolean c, boolean d) { if (c) { if (d) { g(); } } } }",
        "f",
        PdgOptions::default(),
    );
    let outer = find_node(&tree, &pdg, "if c");
    let inner = find_node(&tree, &pdg, "if d");
    let g = find_node(&tree, &pdg, "g()");

    // Outer predicate controls the inner predicate, which controls g().
    assert!(pdg
        .node(outer)
        .forward
        .iter()
        .any(|e| e.to == inner && e.kind == PdgEdgeKind::Control(true)));
    assert!(pdg
        .node(inner)
        .forward
        .iter()
        .any(|e| e.to == g && e.kind == PdgEdgeKind::Control(true)));
    assert!(pdg.node(outer).forward.iter().all(|e| e.to != g
        || !matches!(e.kind, PdgEdgeKind::Control(_))));
}

#[test]
fn test_for_loop_updater_control_dependence() {
    let (tree, pdg) = build(
        "class A { void f(int n) { for (int i = 0; i < n; i++) { use(i); } } }",
        "f",
        PdgOptions::default(),
    );
    let cond = find_node(&tree, &pdg, "( i < n )");
    let updater = find_node(&tree, &pdg, "i++");
    // Updaters hang off the loop predicate with a true label.
    assert!(pdg
        .node(cond)
        .forward
        .iter()
        .any(|e| e.to == updater && e.kind == PdgEdgeKind::Control(true)));
    // Loop-carried: the updater feeds the predicate.
    assert!(has_data_edge(&pdg, updater, cond, "i"));
}

#[test]
fn test_parameter_first_use_walk_stops_at_redefinition() {
    let (tree, pdg) = build(
        "class A { void f(int x) { use(x); x = 0; use(x); } }",
        "f",
        PdgOptions::default(),
    );
    let param = pdg.parameters[0];
    let first = find_node(&tree, &pdg, "use(x);");
    let redef = find_node(&tree, &pdg, "x = 0");
    let second = pdg
        .nodes()
        .filter(|n| tree.store.text(n.pe).contains("use(x)"))
        .map(|n| n.id)
        .max()
        .unwrap();

    assert!(has_data_edge(&pdg, param, first, "x"));
    // The walk stops at the redefinition: the second use reads the new
    // value, not the parameter.
    assert!(!has_data_edge(&pdg, param, second, "x"));
    assert!(has_data_edge(&pdg, redef, second, "x"));
}

#[test]
fn test_foreach_loop_variable_flows_into_body() {
    let (tree, pdg) = build(
        "class A { void f(int[] xs) { for (int x : xs) { use(x); } } }",
        "f",
        PdgOptions::default(),
    );
    let predicate = pdg
        .nodes()
        .find(|n| n.kind == PdgNodeKind::Control)
        .map(|n| n.id)
        .expect("foreach predicate");
    let body = find_node(&tree, &pdg, "use(x)");
    // The synthetic predicate defines the loop variable on each
    // iteration and controls the body.
    assert!(has_data_edge(&pdg, predicate, body, "x"));
    assert!(pdg
        .node(predicate)
        .forward
        .iter()
        .any(|e| e.to == body && e.kind == PdgEdgeKind::Control(true)));
}

#[test]
fn test_exit_projection() {
    let (tree, pdg) = build(
        "class A { int f(boolean c) { if (c) { return 1; } return 0; } }",
        "f",
        PdgOptions::default(),
    );
    let r1 = find_node(&tree, &pdg, "return 1");
    let r0 = find_node(&tree, &pdg, "return 0");
    assert_eq!(pdg.exits, BTreeSet::from([r1, r0]));
}

#[test]
fn test_structural_idempotence_across_runs() {
    // Two independent analyses of the same source produce structurally
    // equal graphs (ids differ per arena, shapes do not).
    let source = r#"
class A {
    int sum(int n) {
        int total = 0;
        for (int i = 0; i < n; i++) {
            if (i % 2 == 0) {
                total += i;
            }
        }
        return total;
    }
}
"#;
    let shape = |tree: &PeTree, pdg: &Pdg| -> Vec<(String, String, String)> {
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
    let (tree1, pdg1) = build(source, "sum", PdgOptions::default());
    let (tree2, pdg2) = build(source, "sum", PdgOptions::default());
    assert_eq!(shape(&tree1, &pdg1), shape(&tree2, &pdg2));
}

#[test]
fn test_empty_method_boundary() {
    let (tree, pdg) = build("class A { void f(int x) {} }", "f", PdgOptions::default());
    assert!(pdg.cfg.is_empty());
    assert_eq!(pdg.factory().len(), 2, "only enter and parameter nodes");
    assert!(pdg.exits.is_empty());
    assert_eq!(tree.store.text(pdg.node(pdg.enter).pe), "Enter");
}

#[test]
fn test_try_catch_dependences() {
    let (tree, pdg) = build(
        r#"
class A {
    int f(Reader r) {
        int value = 0;
        try {
            value = r.read();
        } catch (Exception e) {
            report(e);
        }
        return value;
    }
}
"#,
        "f",
        PdgOptions::default(),
    );
    let catch_cond = find_node(&tree, &pdg, "catch ( Exception e )");
    let report = find_node(&tree, &pdg, "report(e)");
    // The handler body is control-dependent on the catch predicate.
    assert!(pdg
        .node(catch_cond)
        .forward
        .iter()
        .any(|e| e.to == report && e.kind == PdgEdgeKind::Control(true)));
    // The exception variable flows from its predicate into the handler.
    assert!(has_data_edge(&pdg, catch_cond, report, "e"));
    // The try assignment reaches the return; the initial definition is
    // killed by it on every path the walk explores.
    let ret = find_node(&tree, &pdg, "return value");
    let init = find_node(&tree, &pdg, "int value = 0");
    let assign = find_node(&tree, &pdg, "value = r.read()");
    assert!(has_data_edge(&pdg, assign, ret, "value"));
    assert!(!has_data_edge(&pdg, init, ret, "value"));
}
