//! Lexical scopes and variable identities.
//!
//! Each block element (a statement or a method) can own a [`Scope`]; scopes
//! form a tree along the owner-block chain. A [`Var`] is a variable identity
//! with a main name and an alias set (e.g. `this.source` and `source`).
//!
//! Scopes are created and populated while the PE tree is built; the
//! analyses only read them afterwards.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::pe::types::{PeId, PeKind, PeStore};

/// Identifier of a scope within one [`ScopeManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ScopeId(pub u32);

impl ScopeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A variable identity. The alias set always contains the main name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Var {
    pub main_name: String,
    pub aliases: BTreeSet<String>,
}

impl Var {
    pub fn new(name: impl Into<String>) -> Self {
        let main_name = name.into();
        let mut aliases = BTreeSet::new();
        aliases.insert(main_name.clone());
        Var { main_name, aliases }
    }

    pub fn with_aliases(
        name: impl Into<String>,
        aliases: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut var = Var::new(name);
        var.aliases.extend(aliases);
        var
    }

    /// Whether `name` names this variable under any alias.
    pub fn answers_to(&self, name: &str) -> bool {
        self.aliases.contains(name)
    }
}

/// A lexical scope: the block that owns it, its parent, and its variables
/// (unique by main name).
#[derive(Debug, Serialize)]
pub struct Scope {
    pub block: PeId,
    pub parent: Option<ScopeId>,
    variables: Vec<Var>,
}

impl Scope {
    pub fn variables(&self) -> &[Var] {
        &self.variables
    }
}

/// Arena of scopes, indexed by owning block.
#[derive(Debug, Default, Serialize)]
pub struct ScopeManager {
    scopes: Vec<Scope>,
    #[serde(skip)]
    by_block: FxHashMap<PeId, ScopeId>,
}

impl ScopeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope of a block, creating it (and its ancestors) on demand by
    /// walking the owner chain. Only used during PE construction.
    pub fn scope_of(&mut self, store: &PeStore, block: PeId) -> ScopeId {
        if let Some(id) = self.by_block.get(&block) {
            return *id;
        }
        let parent = owner_of(store, block).map(|owner| self.scope_of(store, owner));
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            block,
            parent,
            variables: Vec::new(),
        });
        self.by_block.insert(block, id);
        id
    }

    /// Register a variable in a block's scope. Returns false (and changes
    /// nothing) when the main name is already present in that scope.
    pub fn declare(&mut self, store: &PeStore, block: PeId, var: Var) -> bool {
        let id = self.scope_of(store, block);
        let scope = &mut self.scopes[id.index()];
        if scope.variables.iter().any(|v| v.main_name == var.main_name) {
            return false;
        }
        scope.variables.push(var);
        true
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    /// The scope materialized for exactly this block, if any.
    pub fn lookup_block(&self, block: PeId) -> Option<ScopeId> {
        self.by_block.get(&block).copied()
    }

    /// Nearest materialized scope on the owner chain starting at `block`.
    pub fn nearest_scope(&self, store: &PeStore, mut block: PeId) -> Option<ScopeId> {
        loop {
            if let Some(id) = self.by_block.get(&block) {
                return Some(*id);
            }
            block = owner_of(store, block)?;
        }
    }

    /// Innermost scope (starting at `scope`, walking parents) whose alias
    /// sets contain `name`.
    pub fn search_variable(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if self.has_variable_directly(id, name) {
                return Some(id);
            }
            current = self.get(id).parent;
        }
        None
    }

    /// Whether this scope directly contains a variable answering to `name`.
    pub fn has_variable_directly(&self, scope: ScopeId, name: &str) -> bool {
        self.get(scope).variables.iter().any(|v| v.answers_to(name))
    }

    /// Whether this scope or an ancestor contains a variable answering to
    /// `name`.
    pub fn has_variable(&self, scope: ScopeId, name: &str) -> bool {
        self.search_variable(scope, name).is_some()
    }
}

/// Owner block of an element: statements record theirs, methods are roots.
fn owner_of(store: &PeStore, id: PeId) -> Option<PeId> {
    match &store.get(id).kind {
        PeKind::Statement(s) => s.owner_block,
        _ => None,
    }
}
