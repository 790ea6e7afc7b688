//! Program-element (PE) tree definitions.
//!
//! Every syntactic construct the analyses care about is normalized into a
//! [`ProgramElement`] stored in a [`PeStore`] arena and addressed by
//! [`PeId`]. Ids are allocation order: unique and strictly monotonic within
//! one store, which is the ordering every downstream graph inherits.

use serde::{Deserialize, Serialize};

/// Unique identifier of a program element within one [`PeStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeId(pub u32);

impl PeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Category of an expression element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExprCategory {
    ArrayAccess,
    ArrayCreation,
    ArrayInitializer,
    Assignment,
    Boolean,
    Cast,
    Character,
    ClassInstanceCreation,
    ConstructorInvocation,
    FieldAccess,
    Infix,
    Instanceof,
    MethodInvocation,
    Null,
    Number,
    Parenthesized,
    Postfix,
    Prefix,
    QualifiedName,
    SimpleName,
    String,
    SuperConstructorInvocation,
    SuperFieldAccess,
    SuperMethodInvocation,
    This,
    /// Ternary `c ? a : b`.
    Trinomial,
    TypeLiteral,
    VariableDeclarationExpression,
    VariableDeclarationFragment,
    /// Synthetic expression standing for a method's entry (PDG enter node).
    MethodEnter,
}

/// Category of a statement element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StmtCategory {
    Assert,
    Break,
    Case,
    Catch,
    Continue,
    Do,
    Empty,
    Expression,
    If,
    For,
    Foreach,
    Return,
    SimpleBlock,
    Synchronized,
    Switch,
    Throw,
    Try,
    TypeDeclaration,
    VariableDeclaration,
    While,
}

/// Declaration category of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VarCategory {
    Field,
    Local,
    Parameter,
}

/// A type expression (name plus array dimensions, rendered into the name).
#[derive(Debug, Clone, Serialize)]
pub struct TypeInfo {
    pub name: String,
}

/// A fixed operator token (`++`, `=`, `==`, `instanceof`, ...).
#[derive(Debug, Clone, Serialize)]
pub struct OperatorInfo {
    pub token: String,
}

/// Declaration of a named variable.
#[derive(Debug, Clone, Serialize)]
pub struct VariableInfo {
    pub category: VarCategory,
    pub type_name: String,
    pub name: String,
}

/// An expression element.
///
/// Children layout follows the source construct:
/// assignment `[lhs, operator, rhs]`; method invocation
/// `[name, arg1, arg2, ...]` with the receiver in `qualifier`.
#[derive(Debug, Clone, Serialize)]
pub struct ExpressionInfo {
    pub category: ExprCategory,
    /// Receiver/qualifier, e.g. `a` in `a.foo()` or `a.x`.
    pub qualifier: Option<PeId>,
    /// Ordered child elements.
    pub expressions: Vec<PeId>,
    /// Anonymous class body attached to a `ClassInstanceCreation`.
    pub anonymous_class: Option<PeId>,
    /// Best-effort resolved API name for `MethodInvocation`.
    pub api_name: Option<String>,
}

/// A statement element. Statements double as blocks: any statement can own
/// child statements (main body, else branch, catch clauses, finally).
#[derive(Debug, Clone, Serialize)]
pub struct StatementInfo {
    pub category: StmtCategory,
    /// The block this statement belongs to (a statement or method PE).
    pub owner_block: Option<PeId>,
    /// Predicate of a conditional block (`if`, `while`, `switch`, catch
    /// parameter, ...).
    pub condition: Option<PeId>,
    /// Ordered child expressions.
    pub expressions: Vec<PeId>,
    /// `for`/`foreach` initializers (foreach: `[parameter, iterable]`).
    pub initializers: Vec<PeId>,
    /// `for` updaters.
    pub updaters: Vec<PeId>,
    /// Main body statements.
    pub statements: Vec<PeId>,
    /// `if` else-branch statements.
    pub else_statements: Vec<PeId>,
    /// `try` catch clauses.
    pub catch_statements: Vec<PeId>,
    /// `try` finally block.
    pub finally_statement: Option<PeId>,
    /// Label of a labeled statement (`outer: while ...`).
    pub label: Option<String>,
}

/// A method (or lambda) element.
#[derive(Debug, Clone, Serialize)]
pub struct MethodInfo {
    /// True for lambda expressions.
    pub lambda: bool,
    /// Method name; lambdas have none.
    pub name: Option<String>,
    /// Parameter variable elements.
    pub parameters: Vec<PeId>,
    /// Body statements.
    pub statements: Vec<PeId>,
    /// Single-expression lambda body.
    pub lambda_expression: Option<PeId>,
}

/// A class declaration; anonymous classes have no name.
#[derive(Debug, Clone, Serialize)]
pub struct ClassInfo {
    pub name: Option<String>,
    pub methods: Vec<PeId>,
}

/// The tagged payload of a program element.
#[derive(Debug, Clone, Serialize)]
pub enum PeKind {
    Type(TypeInfo),
    Operator(OperatorInfo),
    Variable(VariableInfo),
    Expression(ExpressionInfo),
    Statement(StatementInfo),
    Method(MethodInfo),
    Class(ClassInfo),
}

/// One node of the normalized program-element tree.
#[derive(Debug, Clone, Serialize)]
pub struct ProgramElement {
    pub id: PeId,
    /// Opaque back-pointer to the originating AST node (tree-sitter node id).
    pub ast_node: usize,
    /// 1-based source start line.
    pub start_line: usize,
    /// 1-based source end line.
    pub end_line: usize,
    /// Canonical surface rendering, for presentation and name heuristics.
    pub text: String,
    pub modifiers: Vec<String>,
    /// Set on a predicate element: the conditional block it is the
    /// condition of.
    pub owner_conditional_block: Option<PeId>,
    pub kind: PeKind,
}

// Element identity is the id alone.
impl PartialEq for ProgramElement {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ProgramElement {}

impl PartialOrd for ProgramElement {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProgramElement {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

/// Arena owning every program element of one compilation unit.
///
/// Ids are the allocation order, so iteration over any id-sorted collection
/// is deterministic given a deterministic parse.
#[derive(Debug, Default, Serialize)]
pub struct PeStore {
    elements: Vec<ProgramElement>,
}

impl PeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Allocate a new element and return its id.
    pub fn alloc(
        &mut self,
        ast_node: usize,
        start_line: usize,
        end_line: usize,
        kind: PeKind,
    ) -> PeId {
        let id = PeId(self.elements.len() as u32);
        self.elements.push(ProgramElement {
            id,
            ast_node,
            start_line,
            end_line,
            text: String::new(),
            modifiers: Vec::new(),
            owner_conditional_block: None,
            kind,
        });
        id
    }

    #[inline]
    pub fn get(&self, id: PeId) -> &ProgramElement {
        &self.elements[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: PeId) -> &mut ProgramElement {
        &mut self.elements[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProgramElement> {
        self.elements.iter()
    }

    #[inline]
    pub fn text(&self, id: PeId) -> &str {
        &self.get(id).text
    }

    pub fn set_text(&mut self, id: PeId, text: impl Into<String>) {
        self.get_mut(id).text = text.into();
    }

    pub fn set_owner_conditional_block(&mut self, id: PeId, block: PeId) {
        self.get_mut(id).owner_conditional_block = Some(block);
    }

    // ------------------------------------------------------------------
    // Kind accessors
    // ------------------------------------------------------------------

    pub fn expr(&self, id: PeId) -> Option<&ExpressionInfo> {
        match &self.get(id).kind {
            PeKind::Expression(e) => Some(e),
            _ => None,
        }
    }

    pub fn expr_mut(&mut self, id: PeId) -> Option<&mut ExpressionInfo> {
        match &mut self.get_mut(id).kind {
            PeKind::Expression(e) => Some(e),
            _ => None,
        }
    }

    pub fn stmt(&self, id: PeId) -> Option<&StatementInfo> {
        match &self.get(id).kind {
            PeKind::Statement(s) => Some(s),
            _ => None,
        }
    }

    pub fn stmt_mut(&mut self, id: PeId) -> Option<&mut StatementInfo> {
        match &mut self.get_mut(id).kind {
            PeKind::Statement(s) => Some(s),
            _ => None,
        }
    }

    pub fn method(&self, id: PeId) -> Option<&MethodInfo> {
        match &self.get(id).kind {
            PeKind::Method(m) => Some(m),
            _ => None,
        }
    }

    pub fn method_mut(&mut self, id: PeId) -> Option<&mut MethodInfo> {
        match &mut self.get_mut(id).kind {
            PeKind::Method(m) => Some(m),
            _ => None,
        }
    }

    pub fn variable(&self, id: PeId) -> Option<&VariableInfo> {
        match &self.get(id).kind {
            PeKind::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn variable_mut(&mut self, id: PeId) -> Option<&mut VariableInfo> {
        match &mut self.get_mut(id).kind {
            PeKind::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn class(&self, id: PeId) -> Option<&ClassInfo> {
        match &self.get(id).kind {
            PeKind::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn class_mut(&mut self, id: PeId) -> Option<&mut ClassInfo> {
        match &mut self.get_mut(id).kind {
            PeKind::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn operator(&self, id: PeId) -> Option<&OperatorInfo> {
        match &self.get(id).kind {
            PeKind::Operator(o) => Some(o),
            _ => None,
        }
    }

    pub fn expr_category(&self, id: PeId) -> Option<ExprCategory> {
        self.expr(id).map(|e| e.category)
    }

    pub fn stmt_category(&self, id: PeId) -> Option<StmtCategory> {
        self.stmt(id).map(|s| s.category)
    }

    /// Whether the element can own child statements (statement or method).
    pub fn is_block(&self, id: PeId) -> bool {
        matches!(
            self.get(id).kind,
            PeKind::Statement(_) | PeKind::Method(_)
        )
    }

    // ------------------------------------------------------------------
    // Block operations
    // ------------------------------------------------------------------

    /// Ordered child statements of a block (statement main body or method
    /// body). Empty for non-blocks.
    pub fn block_statements(&self, id: PeId) -> &[PeId] {
        match &self.get(id).kind {
            PeKind::Statement(s) => &s.statements,
            PeKind::Method(m) => &m.statements,
            _ => &[],
        }
    }

    /// Set a block's body to a single statement, collapsing a `SimpleBlock`
    /// child into its statements. An *empty* `SimpleBlock` child is kept
    /// as-is on statements and dropped on methods.
    pub fn set_statement(&mut self, block: PeId, statement: PeId) {
        let inner = match self.stmt(statement) {
            Some(s) if s.category == StmtCategory::SimpleBlock => Some(s.statements.clone()),
            _ => None,
        };
        match &mut self.get_mut(block).kind {
            PeKind::Statement(s) => {
                s.statements.clear();
                match inner {
                    Some(stmts) if stmts.is_empty() => s.statements.push(statement),
                    Some(stmts) => s.statements.extend(stmts),
                    None => s.statements.push(statement),
                }
            }
            PeKind::Method(m) => {
                m.statements.clear();
                match inner {
                    Some(stmts) => m.statements.extend(stmts),
                    None => m.statements.push(statement),
                }
            }
            _ => debug_assert!(false, "set_statement on a non-block element"),
        }
    }

    /// Append a statement to a block's body.
    pub fn add_statement(&mut self, block: PeId, statement: PeId) {
        match &mut self.get_mut(block).kind {
            PeKind::Statement(s) => s.statements.push(statement),
            PeKind::Method(m) => m.statements.push(statement),
            _ => debug_assert!(false, "add_statement on a non-block element"),
        }
    }

    /// Set an `if` statement's else branch, collapsing a `SimpleBlock`.
    pub fn set_else_statement(&mut self, block: PeId, else_body: PeId) {
        let inner = match self.stmt(else_body) {
            Some(s) if s.category == StmtCategory::SimpleBlock => Some(s.statements.clone()),
            _ => None,
        };
        if let Some(s) = self.stmt_mut(block) {
            s.else_statements.clear();
            match inner {
                Some(stmts) => s.else_statements.extend(stmts),
                None => s.else_statements.push(else_body),
            }
        }
    }

    /// Jump label of a `break`/`continue` statement, if any.
    pub fn jump_label(&self, id: PeId) -> Option<&str> {
        let s = self.stmt(id)?;
        if s.category != StmtCategory::Break && s.category != StmtCategory::Continue {
            return None;
        }
        s.expressions.first().map(|e| self.text(*e))
    }

    /// Allocate the synthetic `MethodEnter` expression for a method, with
    /// text `"Enter"` and the method's source span.
    pub fn synthesize_method_enter(&mut self, method: PeId) -> PeId {
        let (ast_node, start, end) = {
            let m = self.get(method);
            (m.ast_node, m.start_line, m.end_line)
        };
        let enter = self.alloc(
            ast_node,
            start,
            end,
            PeKind::Expression(ExpressionInfo {
                category: ExprCategory::MethodEnter,
                qualifier: None,
                expressions: Vec::new(),
                anonymous_class: None,
                api_name: None,
            }),
        );
        self.set_text(enter, "Enter");
        enter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr_kind(category: ExprCategory) -> PeKind {
        PeKind::Expression(ExpressionInfo {
            category,
            qualifier: None,
            expressions: Vec::new(),
            anonymous_class: None,
            api_name: None,
        })
    }

    fn stmt_kind(category: StmtCategory) -> PeKind {
        PeKind::Statement(StatementInfo {
            category,
            owner_block: None,
            condition: None,
            expressions: Vec::new(),
            initializers: Vec::new(),
            updaters: Vec::new(),
            statements: Vec::new(),
            else_statements: Vec::new(),
            catch_statements: Vec::new(),
            finally_statement: None,
            label: None,
        })
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut store = PeStore::new();
        let a = store.alloc(0, 1, 1, expr_kind(ExprCategory::SimpleName));
        let b = store.alloc(0, 1, 1, expr_kind(ExprCategory::Number));
        let c = store.alloc(0, 2, 2, stmt_kind(StmtCategory::Expression));
        assert!(a < b && b < c);
        assert_eq!(a.index(), 0);
        assert_eq!(c.index(), 2);
    }

    #[test]
    fn test_set_statement_flattens_simple_block() {
        let mut store = PeStore::new();
        let outer = store.alloc(0, 1, 3, stmt_kind(StmtCategory::While));
        let block = store.alloc(0, 1, 3, stmt_kind(StmtCategory::SimpleBlock));
        let s1 = store.alloc(0, 2, 2, stmt_kind(StmtCategory::Expression));
        let s2 = store.alloc(0, 3, 3, stmt_kind(StmtCategory::Expression));
        store.add_statement(block, s1);
        store.add_statement(block, s2);

        store.set_statement(outer, block);
        assert_eq!(store.block_statements(outer), &[s1, s2]);
    }

    #[test]
    fn test_set_statement_keeps_empty_block_on_statements() {
        let mut store = PeStore::new();
        let outer = store.alloc(0, 1, 2, stmt_kind(StmtCategory::If));
        let block = store.alloc(0, 1, 2, stmt_kind(StmtCategory::SimpleBlock));
        store.set_statement(outer, block);
        assert_eq!(store.block_statements(outer), &[block]);
    }

    #[test]
    fn test_set_statement_single_statement() {
        let mut store = PeStore::new();
        let outer = store.alloc(0, 1, 2, stmt_kind(StmtCategory::While));
        let single = store.alloc(0, 2, 2, stmt_kind(StmtCategory::Return));
        store.set_statement(outer, single);
        assert_eq!(store.block_statements(outer), &[single]);
    }

    #[test]
    fn test_method_enter_synthesis() {
        let mut store = PeStore::new();
        let method = store.alloc(
            7,
            10,
            20,
            PeKind::Method(MethodInfo {
                lambda: false,
                name: Some("f".to_string()),
                parameters: Vec::new(),
                statements: Vec::new(),
                lambda_expression: None,
            }),
        );
        let enter = store.synthesize_method_enter(method);
        assert_eq!(store.text(enter), "Enter");
        assert_eq!(store.get(enter).start_line, 10);
        assert_eq!(store.get(enter).end_line, 20);
        assert_eq!(
            store.expr_category(enter),
            Some(ExprCategory::MethodEnter)
        );
    }

    #[test]
    fn test_jump_label() {
        let mut store = PeStore::new();
        let brk = store.alloc(0, 1, 1, stmt_kind(StmtCategory::Break));
        assert_eq!(store.jump_label(brk), None);

        let label = store.alloc(0, 1, 1, expr_kind(ExprCategory::SimpleName));
        store.set_text(label, "outer");
        store.stmt_mut(brk).unwrap().expressions.push(label);
        assert_eq!(store.jump_label(brk), Some("outer"));
    }
}
