//! Def/Use extraction over parsed sources.

use propgraph::pe::{DefKind, DefUse, PeId, PeTree, UseKind};
use propgraph::analyze_source;

fn build(source: &str) -> PeTree {
    analyze_source(source).expect("source parses")
}

/// First statement of the named method's body.
fn stmt_at(tree: &PeTree, method: &str, index: usize) -> PeId {
    let m = tree.require_method(method).unwrap();
    tree.store.block_statements(m)[index]
}

fn def_kind(analyzer: &mut DefUse, pe: PeId, name: &str) -> Option<DefKind> {
    analyzer
        .defs(pe)
        .iter()
        .find(|d| d.main_name == name)
        .map(|d| d.kind)
}

#[test]
fn test_no_def_receiver_exact_name() {
    // m.size(): defs contain (m, NO_DEF) and nothing stronger.
    let tree = build("class A { void f(List m) { m.size(); } }");
    let stmt = stmt_at(&tree, "f", 0);
    let mut analyzer = DefUse::new(&tree.store, &tree.scopes);
    assert_eq!(def_kind(&mut analyzer, stmt, "m"), Some(DefKind::NoDef));
    assert!(!analyzer.assigned_variables(stmt).contains("m"));
}

#[test]
fn test_def_receiver_prefix() {
    let tree = build("class A { void f(List m, int x) { m.add(x); } }");
    let stmt = stmt_at(&tree, "f", 0);
    let mut analyzer = DefUse::new(&tree.store, &tree.scopes);
    assert_eq!(def_kind(&mut analyzer, stmt, "m"), Some(DefKind::Def));
    // The argument is used, never defined.
    assert!(analyzer.referenced_variables(stmt).contains("x"));
    assert!(!analyzer.assigned_variables(stmt).contains("x"));
}

#[test]
fn test_may_def_receiver_unknown_name() {
    let tree = build("class A { void f(List m, int x) { m.frobnicate(x); } }");
    let stmt = stmt_at(&tree, "f", 0);
    let mut analyzer = DefUse::new(&tree.store, &tree.scopes);
    assert_eq!(def_kind(&mut analyzer, stmt, "m"), Some(DefKind::MayDef));
}

#[test]
fn test_chained_mutating_call() {
    // a.getX().set(1): the chain base is promoted to at least MAY_DEF.
    let tree = build("class A { void f(Box a) { a.getX().set(1); } }");
    let stmt = stmt_at(&tree, "f", 0);
    let mut analyzer = DefUse::new(&tree.store, &tree.scopes);
    let kind = def_kind(&mut analyzer, stmt, "a").unwrap();
    assert!(kind >= DefKind::MayDef);
}

#[test]
fn test_assignment_target_is_sure_def() {
    let tree = build("class A { void f(int x, int y) { x = y + 1; } }");
    let stmt = stmt_at(&tree, "f", 0);
    let mut analyzer = DefUse::new(&tree.store, &tree.scopes);
    let strong: Vec<_> = analyzer
        .defs_at_least_may_def(stmt)
        .into_iter()
        .filter(|d| d.main_name == "x")
        .collect();
    assert_eq!(strong.len(), 1);
    assert_eq!(strong[0].kind, DefKind::Def);

    // The RHS read is a sure use.
    let uses = analyzer.uses(stmt);
    let y = uses.iter().find(|u| u.main_name == "y").unwrap();
    assert_eq!(y.kind, UseKind::Use);
    assert_eq!(y.owner, Some(stmt));
}

#[test]
fn test_declaration_fragment_def() {
    let tree = build("class A { void f(int x) { int y = x + 1; } }");
    let stmt = stmt_at(&tree, "f", 0);
    let mut analyzer = DefUse::new(&tree.store, &tree.scopes);
    assert_eq!(def_kind(&mut analyzer, stmt, "y"), Some(DefKind::Def));
    assert!(analyzer.referenced_variables(stmt).contains("x"));
}

#[test]
fn test_bare_declaration_has_no_def() {
    // `int y;` has a single-child fragment, which contributes nothing.
    let tree = build("class A { void f() { int y; } }");
    let stmt = stmt_at(&tree, "f", 0);
    let mut analyzer = DefUse::new(&tree.store, &tree.scopes);
    assert_eq!(def_kind(&mut analyzer, stmt, "y"), None);
}

#[test]
fn test_array_index_is_dropped_from_target_name() {
    let tree = build("class A { void f(int[] a, int i) { a[i] = 0; } }");
    let stmt = stmt_at(&tree, "f", 0);
    let mut analyzer = DefUse::new(&tree.store, &tree.scopes);
    assert_eq!(def_kind(&mut analyzer, stmt, "a"), Some(DefKind::Def));
    assert!(!analyzer.assigned_variables(stmt).contains("a[i]"));
}

#[test]
fn test_update_expressions_define_and_use() {
    let tree = build("class A { void f(int i) { i++; } }");
    let stmt = stmt_at(&tree, "f", 0);
    let mut analyzer = DefUse::new(&tree.store, &tree.scopes);
    assert_eq!(def_kind(&mut analyzer, stmt, "i"), Some(DefKind::Def));
    assert!(analyzer.referenced_variables(stmt).contains("i"));
}

#[test]
fn test_foreach_variable_counts_as_assigned() {
    // The loop variable is written on every iteration; its Declare record
    // projects into the observable assigned set.
    let tree = build("class A { void f(int[] xs) { for (int x : xs) { use(x); } } }");
    let stmt = stmt_at(&tree, "f", 0);
    let mut analyzer = DefUse::new(&tree.store, &tree.scopes);
    assert!(analyzer.assigned_variables(stmt).contains("x"));
    assert!(analyzer.referenced_variables(stmt).contains("xs"));
}

#[test]
fn test_local_use_binds_scope_field_does_not() {
    let tree = build(
        "class A { int field; void f() { int local = 1; use(local); use(this.field); } }",
    );
    let use_local = stmt_at(&tree, "f", 1);
    let use_field = stmt_at(&tree, "f", 2);
    let mut analyzer = DefUse::new(&tree.store, &tree.scopes);

    let uses = analyzer.uses(use_local);
    let local = uses.iter().find(|u| u.main_name == "local").unwrap();
    assert!(local.scope.is_some(), "declared locals bind their scope");

    let uses = analyzer.uses(use_field);
    // `use(this.field)` decomposes into `this` (not a name) and `field`.
    let field = uses.iter().find(|u| u.main_name == "field").unwrap();
    assert!(field.scope.is_none(), "field-like references bind no scope");
}

#[test]
fn test_condition_uses_flow_into_statement() {
    let tree = build("class A { void f(int n) { while (n > 0) { n--; } } }");
    let stmt = stmt_at(&tree, "f", 0);
    let mut analyzer = DefUse::new(&tree.store, &tree.scopes);
    assert!(analyzer.referenced_variables(stmt).contains("n"));
    assert!(analyzer.assigned_variables(stmt).contains("n"));
}

#[test]
fn test_nested_statement_defs_bubble_up() {
    let tree = build(
        "class A { void f(boolean c) { if (c) { int a = 1; } else { int b = 2; } } }",
    );
    let stmt = stmt_at(&tree, "f", 0);
    let mut analyzer = DefUse::new(&tree.store, &tree.scopes);
    let assigned = analyzer.assigned_variables(stmt);
    assert!(assigned.contains("a"));
    assert!(assigned.contains("b"));
}

#[test]
fn test_logging_calls_do_not_mutate_receiver() {
    let tree = build("class A { void f(Logger log, int x) { log.debug(x); } }");
    let stmt = stmt_at(&tree, "f", 0);
    let mut analyzer = DefUse::new(&tree.store, &tree.scopes);
    assert_eq!(def_kind(&mut analyzer, stmt, "log"), Some(DefKind::NoDef));
    assert!(analyzer.assigned_variables(stmt).is_empty());
}
