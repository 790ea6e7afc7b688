//! Def/Use extraction.
//!
//! For every program element the analyzer computes two memoized sets: the
//! variables the element *defines* and the variables it *uses*, each tagged
//! with a confidence level from a linearly ordered lattice. The PDG builder
//! consumes the observable projections ([`DefUse::assigned_variables`],
//! [`DefUse::referenced_variables`]).
//!
//! Method calls get a receiver-mutation heuristic: the callee name is
//! classified against fixed name/prefix tables (`size` never mutates its
//! receiver, `add` always does, unknown names may).

use std::collections::BTreeSet;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::pe::scope::{ScopeId, ScopeManager};
use crate::pe::types::{ExprCategory, PeId, PeKind, PeStore, StatementInfo};

/// Def confidence lattice. Promotion never demotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DefKind {
    Unknown,
    NoDef,
    MayDef,
    Def,
    Declare,
    DeclareAndDef,
}

impl DefKind {
    /// Observable defs: everything from `MayDef` upward.
    pub fn is_at_least_may_def(self) -> bool {
        self >= DefKind::MayDef
    }

    pub fn is_at_least_declare(self) -> bool {
        self >= DefKind::Declare
    }
}

/// Use confidence lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum UseKind {
    Unknown,
    NoUse,
    MayUse,
    Use,
}

impl UseKind {
    /// Observable uses: everything from `MayUse` upward.
    pub fn is_at_least_may_use(self) -> bool {
        self >= UseKind::MayUse
    }
}

/// A variable definition record: variable identity plus def kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct VarDef {
    pub main_name: String,
    pub aliases: BTreeSet<String>,
    pub scope: Option<ScopeId>,
    pub kind: DefKind,
}

impl VarDef {
    pub fn new(name: impl Into<String>, kind: DefKind) -> Self {
        let main_name = name.into();
        let mut aliases = BTreeSet::new();
        aliases.insert(main_name.clone());
        VarDef {
            main_name,
            aliases,
            scope: None,
            kind,
        }
    }

    pub fn with_aliases(
        name: impl Into<String>,
        aliases: impl IntoIterator<Item = String>,
        kind: DefKind,
    ) -> Self {
        let mut def = VarDef::new(name, kind);
        def.aliases.extend(aliases);
        def
    }

    /// Clone with the kind raised to at least `kind`.
    pub fn promote(&self, kind: DefKind) -> Self {
        let mut out = self.clone();
        if out.kind < kind {
            out.kind = kind;
        }
        out
    }
}

/// A variable use record: variable identity, use kind, and (once a
/// statement has bound it) the owning statement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct VarUse {
    pub main_name: String,
    pub aliases: BTreeSet<String>,
    pub scope: Option<ScopeId>,
    pub kind: UseKind,
    pub owner: Option<PeId>,
}

impl VarUse {
    pub fn new(name: impl Into<String>, kind: UseKind) -> Self {
        let main_name = name.into();
        let mut aliases = BTreeSet::new();
        aliases.insert(main_name.clone());
        VarUse {
            main_name,
            aliases,
            scope: None,
            kind,
            owner: None,
        }
    }

    /// Clone with the kind raised to at least `kind`.
    pub fn promote(&self, kind: UseKind) -> Self {
        let mut out = self.clone();
        if out.kind < kind {
            out.kind = kind;
        }
        out
    }
}

// ---------------------------------------------------------------------
// Method-name classification for call-receiver mutation
// ---------------------------------------------------------------------

const NO_DEF_METHOD_NAMES: &[&str] = &[
    "equals", "hashCode", "toString", // Object
    "isEmpty", "size", "length", "stream", // Collection
];
const DEF_METHOD_NAMES: &[&str] = &[
    "push", "pop", "offer", "poll", // Collection
];
const NO_DEF_METHOD_PREFIXES: &[&str] = &[
    "get", "print", "debug", "trace", "info", "warn", "error", // accessors and logs
];
const DEF_METHOD_PREFIXES: &[&str] = &[
    "set", "add", "remove", "put", "insert", "contains", // Collection
];

/// Judge whether a call may define its receiver, from the method name
/// alone. Exact names win over prefixes; unknown names are `MayDef`.
pub fn classify_method_name(name: &str) -> DefKind {
    if NO_DEF_METHOD_NAMES.contains(&name) {
        return DefKind::NoDef;
    }
    if DEF_METHOD_NAMES.contains(&name) {
        return DefKind::Def;
    }
    if NO_DEF_METHOD_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return DefKind::NoDef;
    }
    if DEF_METHOD_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return DefKind::Def;
    }
    DefKind::MayDef
}

/// Judge whether an element is a pure variable reference and return its
/// name. Array indices are dropped; field paths are kept whole.
///
/// `a[0]` -> `a`; `a.x` -> `a.x`; `foo().bar` -> None.
pub fn name_of(store: &PeStore, pe: PeId) -> Option<String> {
    name_and_aliases(store, pe).map(|(name, _)| name)
}

/// Like [`name_of`], also returning the alias set (`this.x` aliases `x`).
pub fn name_and_aliases(store: &PeStore, pe: PeId) -> Option<(String, BTreeSet<String>)> {
    let expr = store.expr(pe)?;
    let single = |name: String| {
        let mut aliases = BTreeSet::new();
        aliases.insert(name.clone());
        Some((name, aliases))
    };
    match expr.category {
        ExprCategory::SimpleName => single(store.text(pe).to_string()),
        ExprCategory::ArrayAccess => {
            let base = *expr.expressions.first()?;
            if store.expr_category(base) == Some(ExprCategory::SimpleName) {
                single(store.text(base).to_string())
            } else {
                None
            }
        }
        ExprCategory::FieldAccess => {
            if expr.expressions.len() != 2 {
                return None;
            }
            let base = expr.expressions[0];
            match store.expr_category(base) {
                Some(ExprCategory::SimpleName) => single(store.text(pe).to_string()),
                Some(ExprCategory::This) => {
                    let name = store.text(pe).to_string();
                    let mut aliases = BTreeSet::new();
                    aliases.insert(name.clone());
                    aliases.insert(store.text(expr.expressions[1]).to_string());
                    Some((name, aliases))
                }
                _ => None,
            }
        }
        ExprCategory::QualifiedName => {
            if expr.expressions.is_empty() {
                return None;
            }
            let qualifier = expr.qualifier?;
            if store.expr_category(qualifier) == Some(ExprCategory::SimpleName) {
                single(store.text(pe).to_string())
            } else {
                None
            }
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------
// The analyzer
// ---------------------------------------------------------------------

/// Memoizing def/use analyzer over one PE tree.
///
/// Sets are computed on first request per element and frozen; the PE tree
/// must be fully constructed before the first query.
pub struct DefUse<'a> {
    store: &'a PeStore,
    scopes: &'a ScopeManager,
    defs: FxHashMap<PeId, Rc<BTreeSet<VarDef>>>,
    uses: FxHashMap<PeId, Rc<BTreeSet<VarUse>>>,
}

impl<'a> DefUse<'a> {
    pub fn new(store: &'a PeStore, scopes: &'a ScopeManager) -> Self {
        DefUse {
            store,
            scopes,
            defs: FxHashMap::default(),
            uses: FxHashMap::default(),
        }
    }

    /// All def records of an element, including `NoDef` ones.
    pub fn defs(&mut self, pe: PeId) -> Rc<BTreeSet<VarDef>> {
        if let Some(cached) = self.defs.get(&pe) {
            return cached.clone();
        }
        let computed = Rc::new(self.compute_defs(pe));
        self.defs.insert(pe, computed.clone());
        computed
    }

    /// All use records of an element, including `NoUse` ones.
    pub fn uses(&mut self, pe: PeId) -> Rc<BTreeSet<VarUse>> {
        if let Some(cached) = self.uses.get(&pe) {
            return cached.clone();
        }
        let computed = Rc::new(self.compute_uses(pe));
        self.uses.insert(pe, computed.clone());
        computed
    }

    /// Observable defs (at least `MayDef`).
    pub fn defs_at_least_may_def(&mut self, pe: PeId) -> Vec<VarDef> {
        self.defs(pe)
            .iter()
            .filter(|d| d.kind.is_at_least_may_def())
            .cloned()
            .collect()
    }

    /// Observable uses (at least `MayUse`).
    pub fn uses_at_least_may_use(&mut self, pe: PeId) -> Vec<VarUse> {
        self.uses(pe)
            .iter()
            .filter(|u| u.kind.is_at_least_may_use())
            .cloned()
            .collect()
    }

    /// Main names of the variables an element observably assigns.
    pub fn assigned_variables(&mut self, pe: PeId) -> BTreeSet<String> {
        self.defs(pe)
            .iter()
            .filter(|d| d.kind.is_at_least_may_def())
            .map(|d| d.main_name.clone())
            .collect()
    }

    /// Main names of the variables an element observably reads.
    pub fn referenced_variables(&mut self, pe: PeId) -> BTreeSet<String> {
        self.uses(pe)
            .iter()
            .filter(|u| u.kind.is_at_least_may_use())
            .map(|u| u.main_name.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Defs
    // ------------------------------------------------------------------

    fn compute_defs(&mut self, pe: PeId) -> BTreeSet<VarDef> {
        let mut out = BTreeSet::new();
        match &self.store.get(pe).kind {
            PeKind::Expression(_) => self.expression_defs(pe, &mut out),
            PeKind::Statement(_) => self.statement_defs(pe, &mut out),
            PeKind::Method(m) => {
                let children: Vec<PeId> = m
                    .statements
                    .iter()
                    .copied()
                    .chain(m.lambda_expression)
                    .collect();
                for child in children {
                    out.extend(self.defs(child).iter().cloned());
                }
            }
            PeKind::Variable(v) => {
                out.insert(VarDef::new(v.name.clone(), DefKind::Declare));
            }
            _ => {}
        }
        out
    }

    fn expression_defs(&mut self, pe: PeId, out: &mut BTreeSet<VarDef>) {
        let Some(expr) = self.store.expr(pe).cloned() else {
            return;
        };
        match expr.category {
            ExprCategory::Assignment => {
                // LHS is surely defined; defs inside the RHS are kept.
                if expr.expressions.len() == 3 {
                    let left = expr.expressions[0];
                    if let Some((name, aliases)) = name_and_aliases(self.store, left) {
                        out.insert(VarDef::with_aliases(name, aliases, DefKind::Def));
                    } else {
                        out.extend(self.defs(left).iter().cloned());
                    }
                    let right = expr.expressions[2];
                    out.extend(self.defs(right).iter().cloned());
                }
            }
            ExprCategory::VariableDeclarationFragment => {
                if expr.expressions.len() == 2 {
                    let left = expr.expressions[0];
                    if let Some((name, aliases)) = name_and_aliases(self.store, left) {
                        out.insert(VarDef::with_aliases(name, aliases, DefKind::Def));
                    } else {
                        out.extend(self.defs(left).iter().cloned());
                    }
                    let right = expr.expressions[1];
                    out.extend(self.defs(right).iter().cloned());
                }
            }
            ExprCategory::Postfix => {
                // Postfix is only ++ and --, a sure def.
                if expr.expressions.len() == 2 {
                    let operand = expr.expressions[0];
                    if let Some((name, aliases)) = name_and_aliases(self.store, operand) {
                        out.insert(VarDef::with_aliases(name, aliases, DefKind::Def));
                    } else {
                        out.extend(self.defs(operand).iter().cloned());
                    }
                }
            }
            ExprCategory::Prefix => {
                // Prefix covers ++ -- + - ~ !; only ++ and -- define.
                if expr.expressions.len() == 2 {
                    if let Some(op) = self.store.operator(expr.expressions[0]).cloned() {
                        let operand = expr.expressions[1];
                        let named = name_and_aliases(self.store, operand);
                        match named {
                            Some((name, aliases))
                                if op.token == "++" || op.token == "--" =>
                            {
                                out.insert(VarDef::with_aliases(
                                    name,
                                    aliases,
                                    DefKind::Def,
                                ));
                            }
                            _ => out.extend(self.defs(operand).iter().cloned()),
                        }
                    }
                }
            }
            ExprCategory::MethodInvocation => {
                // The receiver may be mutated; arguments are left alone on
                // purpose (treating them as MAY_DEF floods the graph with
                // false positives).
                if let (Some(qualifier), Some(name_child)) =
                    (expr.qualifier, expr.expressions.first().copied())
                {
                    let call_def_kind =
                        classify_method_name(self.store.text(name_child));
                    if let Some((name, aliases)) = name_and_aliases(self.store, qualifier) {
                        out.insert(VarDef::with_aliases(name, aliases, call_def_kind));
                    } else if call_def_kind.is_at_least_may_def() {
                        // Chained call such as `a.getX().set(1)`: whatever
                        // the chain's base defines is at least MAY_DEF.
                        for def in self.defs(qualifier).iter() {
                            out.insert(def.promote(DefKind::MayDef));
                        }
                    } else {
                        out.extend(self.defs(qualifier).iter().cloned());
                    }
                }
            }
            _ => {
                for child in expr.expressions {
                    out.extend(self.defs(child).iter().cloned());
                }
                if let Some(class) = expr.anonymous_class {
                    let methods = self
                        .store
                        .class(class)
                        .map(|c| c.methods.clone())
                        .unwrap_or_default();
                    for method in methods {
                        out.extend(self.defs(method).iter().cloned());
                    }
                }
            }
        }
    }

    fn statement_defs(&mut self, pe: PeId, out: &mut BTreeSet<VarDef>) {
        let Some(stmt) = self.store.stmt(pe).cloned() else {
            return;
        };
        for child in statement_parts(&stmt) {
            for def in self.defs(child).iter() {
                out.insert(self.bind_def(&stmt, def));
            }
        }
    }

    /// Bind a def record's scope at the statement that records it.
    fn bind_def(&self, stmt: &StatementInfo, def: &VarDef) -> VarDef {
        let mut bound = def.clone();
        let block_scope = stmt
            .owner_block
            .and_then(|b| self.scopes.nearest_scope(self.store, b));
        if def.kind.is_at_least_declare() {
            if bound.scope.is_none() {
                bound.scope = block_scope;
            }
        } else {
            bound.scope = block_scope
                .and_then(|s| self.scopes.search_variable(s, &def.main_name));
        }
        bound
    }

    // ------------------------------------------------------------------
    // Uses
    // ------------------------------------------------------------------

    fn compute_uses(&mut self, pe: PeId) -> BTreeSet<VarUse> {
        let mut out = BTreeSet::new();
        match &self.store.get(pe).kind {
            PeKind::Expression(_) => self.expression_uses(pe, &mut out),
            PeKind::Statement(_) => self.statement_uses(pe, &mut out),
            PeKind::Method(m) => {
                let children: Vec<PeId> = m
                    .statements
                    .iter()
                    .copied()
                    .chain(m.lambda_expression)
                    .collect();
                for child in children {
                    out.extend(self.uses(child).iter().cloned());
                }
            }
            _ => {}
        }
        out
    }

    fn expression_uses(&mut self, pe: PeId, out: &mut BTreeSet<VarUse>) {
        let Some(expr) = self.store.expr(pe).cloned() else {
            return;
        };
        match expr.category {
            ExprCategory::Assignment => {
                // The RHS is read for sure.
                if expr.expressions.len() == 3 {
                    let right = expr.expressions[2];
                    for u in self.uses(right).iter() {
                        out.insert(u.promote(UseKind::Use));
                    }
                }
            }
            ExprCategory::VariableDeclarationFragment => {
                if expr.expressions.len() == 2 {
                    let right = expr.expressions[1];
                    for u in self.uses(right).iter() {
                        out.insert(u.promote(UseKind::Use));
                    }
                }
            }
            ExprCategory::Postfix | ExprCategory::Prefix => {
                for child in expr.expressions {
                    for u in self.uses(child).iter() {
                        out.insert(u.promote(UseKind::Use));
                    }
                }
            }
            ExprCategory::SimpleName => {
                out.insert(VarUse::new(self.store.text(pe).to_string(), UseKind::MayUse));
            }
            ExprCategory::MethodInvocation => {
                // Receiver uses pass through; arguments (children after the
                // method name) pass through.
                if let Some(qualifier) = expr.qualifier {
                    out.extend(self.uses(qualifier).iter().cloned());
                }
                for child in expr.expressions.iter().skip(1).copied() {
                    out.extend(self.uses(child).iter().cloned());
                }
            }
            _ => {
                for child in expr.expressions {
                    out.extend(self.uses(child).iter().cloned());
                }
                if let Some(class) = expr.anonymous_class {
                    let methods = self
                        .store
                        .class(class)
                        .map(|c| c.methods.clone())
                        .unwrap_or_default();
                    for method in methods {
                        out.extend(self.uses(method).iter().cloned());
                    }
                }
            }
        }
    }

    fn statement_uses(&mut self, pe: PeId, out: &mut BTreeSet<VarUse>) {
        let Some(stmt) = self.store.stmt(pe).cloned() else {
            return;
        };
        for child in statement_parts(&stmt) {
            for u in self.uses(child).iter() {
                out.insert(self.bind_use(pe, &stmt, u));
            }
        }
    }

    /// Bind a use record's scope and owner at the statement that records it.
    fn bind_use(&self, stmt_id: PeId, stmt: &StatementInfo, us: &VarUse) -> VarUse {
        let mut bound = us.clone();
        bound.owner = Some(stmt_id);
        bound.scope = stmt
            .owner_block
            .and_then(|b| self.scopes.nearest_scope(self.store, b))
            .and_then(|s| self.scopes.search_variable(s, &us.main_name));
        bound
    }
}

/// Every child element a statement forwards def/use records from, in
/// source order.
fn statement_parts(stmt: &StatementInfo) -> Vec<PeId> {
    stmt.expressions
        .iter()
        .chain(stmt.initializers.iter())
        .chain(stmt.condition.iter())
        .chain(stmt.updaters.iter())
        .chain(stmt.statements.iter())
        .chain(stmt.else_statements.iter())
        .chain(stmt.catch_statements.iter())
        .chain(stmt.finally_statement.iter())
        .copied()
        .collect()
}
