//! Program-element layer: the normalized tree, scopes, and def/use facts.
//!
//! # Modules
//!
//! - [`types`]: the PE arena and element variants
//! - [`scope`]: lexical scopes and variable identities
//! - [`defuse`]: per-element def/use extraction with confidence lattices
//! - [`builder`]: AST -> PE construction over tree-sitter trees

pub mod builder;
pub mod defuse;
pub mod scope;
pub mod types;

pub use builder::PeBuilder;
pub use defuse::{classify_method_name, name_of, DefKind, DefUse, UseKind, VarDef, VarUse};
pub use scope::{Scope, ScopeId, ScopeManager, Var};
pub use types::{
    ExprCategory, PeId, PeKind, PeStore, ProgramElement, StmtCategory, VarCategory,
};

use crate::error::{PropgraphError, Result};

/// The program-element tree of one compilation unit: the arena, the scope
/// forest, and the methods and classes found during construction.
#[derive(Debug)]
pub struct PeTree {
    pub store: PeStore,
    pub scopes: ScopeManager,
    /// Methods in source order (including constructors; excluding methods of
    /// anonymous classes, which hang off their creating expression).
    pub methods: Vec<PeId>,
    /// Top-level and nested named classes in visit order.
    pub classes: Vec<PeId>,
}

impl PeTree {
    /// Find a method by name. Returns the first match in source order.
    pub fn method_by_name(&self, name: &str) -> Option<PeId> {
        self.methods.iter().copied().find(|m| {
            self.store
                .method(*m)
                .and_then(|info| info.name.as_deref())
                .map(|n| n == name)
                .unwrap_or(false)
        })
    }

    /// Like [`PeTree::method_by_name`] but failing with a library error.
    pub fn require_method(&self, name: &str) -> Result<PeId> {
        self.method_by_name(name)
            .ok_or_else(|| PropgraphError::MethodNotFound(name.to_string()))
    }
}
