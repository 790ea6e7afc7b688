//! AST -> PE construction.
//!
//! Walks the tree-sitter syntax tree and builds the normalized program
//! element tree, collecting methods and classes along the way. The walk is
//! guarded by a bounded-pop stack discipline: before recursing into a
//! child the visitor records the stack height, afterwards it pops
//! everything above that mark and accepts the result only when exactly one
//! element of the expected shape was produced. Grammar productions this
//! crate does not recognize therefore cannot corrupt the stack; they are
//! skipped and logged.

use tracing::debug;
use tree_sitter::{Node, Tree};

use crate::pe::scope::{ScopeManager, Var};
use crate::pe::types::{
    ClassInfo, ExprCategory, ExpressionInfo, MethodInfo, OperatorInfo, PeId, PeKind, PeStore,
    StatementInfo, StmtCategory, TypeInfo, VarCategory, VariableInfo,
};
use crate::pe::PeTree;

/// Shape filter for a bounded pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Any,
    Statement,
    Variable,
    Method,
}

/// Builds the PE tree for one compilation unit.
pub struct PeBuilder<'a> {
    source: &'a [u8],
    store: PeStore,
    scopes: ScopeManager,
    stack: Vec<PeId>,
    methods: Vec<PeId>,
    classes: Vec<PeId>,
}

impl<'a> PeBuilder<'a> {
    /// Build the PE tree from a parsed source.
    pub fn build(source: &'a str, tree: &Tree) -> PeTree {
        let mut builder = PeBuilder {
            source: source.as_bytes(),
            store: PeStore::new(),
            scopes: ScopeManager::new(),
            stack: Vec::new(),
            methods: Vec::new(),
            classes: Vec::new(),
        };
        builder.visit_compilation_unit(tree.root_node());
        PeTree {
            store: builder.store,
            scopes: builder.scopes,
            methods: builder.methods,
            classes: builder.classes,
        }
    }

    // ------------------------------------------------------------------
    // Stack discipline
    // ------------------------------------------------------------------

    #[inline]
    fn mark(&self) -> usize {
        self.stack.len()
    }

    /// Pop back to `mark`, accepting the result only when exactly one
    /// element of the expected shape was pushed.
    fn pop_one(&mut self, mark: usize, expect: Expect) -> Option<PeId> {
        let mut popped = None;
        let mut count = 0usize;
        while self.stack.len() > mark {
            popped = self.stack.pop();
            count += 1;
        }
        if count != 1 {
            if count > 1 {
                debug!(count, "discarding unexpected stack growth");
            }
            return None;
        }
        let id = popped?;
        let ok = match expect {
            Expect::Any => true,
            Expect::Statement => matches!(self.store.get(id).kind, PeKind::Statement(_)),
            Expect::Variable => matches!(self.store.get(id).kind, PeKind::Variable(_)),
            Expect::Method => matches!(self.store.get(id).kind, PeKind::Method(_)),
        };
        if ok {
            Some(id)
        } else {
            debug!(?expect, "discarding element of unexpected shape");
            None
        }
    }

    fn top_is_block(&self) -> bool {
        self.stack
            .last()
            .map(|id| self.store.is_block(*id))
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Small helpers
    // ------------------------------------------------------------------

    fn text_of(&self, node: Node) -> &'a str {
        node.utf8_text(self.source).unwrap_or("")
    }

    fn start_line(node: Node) -> usize {
        node.start_position().row + 1
    }

    fn end_line(node: Node) -> usize {
        node.end_position().row + 1
    }

    /// End line of a branching statement: an `if` with an else ends where
    /// the else branch starts; a `try` ends where its first catch or
    /// finally starts.
    fn branch_end_line(node: Node) -> usize {
        match node.kind() {
            "if_statement" => match node.child_by_field_name("alternative") {
                Some(alt) => alt.start_position().row + 1,
                None => Self::end_line(node),
            },
            "try_statement" | "try_with_resources_statement" => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if child.kind() == "catch_clause" || child.kind() == "finally_clause" {
                        return child.start_position().row + 1;
                    }
                }
                Self::end_line(node)
            }
            _ => Self::end_line(node),
        }
    }

    fn alloc_expr(&mut self, node: Node, category: ExprCategory) -> PeId {
        self.store.alloc(
            node.id(),
            Self::start_line(node),
            Self::end_line(node),
            PeKind::Expression(ExpressionInfo {
                category,
                qualifier: None,
                expressions: Vec::new(),
                anonymous_class: None,
                api_name: None,
            }),
        )
    }

    fn alloc_stmt(&mut self, node: Node, category: StmtCategory, owner: Option<PeId>) -> PeId {
        self.store.alloc(
            node.id(),
            Self::start_line(node),
            Self::branch_end_line(node),
            PeKind::Statement(StatementInfo {
                category,
                owner_block: owner,
                condition: None,
                expressions: Vec::new(),
                initializers: Vec::new(),
                updaters: Vec::new(),
                statements: Vec::new(),
                else_statements: Vec::new(),
                catch_statements: Vec::new(),
                finally_statement: None,
                label: None,
            }),
        )
    }

    fn alloc_type(&mut self, node: Node) -> PeId {
        let id = self.store.alloc(
            node.id(),
            Self::start_line(node),
            Self::end_line(node),
            PeKind::Type(TypeInfo {
                name: self.text_of(node).to_string(),
            }),
        );
        let text = self.text_of(node).to_string();
        self.store.set_text(id, text);
        id
    }

    fn alloc_operator(&mut self, node: Node, token: &str) -> PeId {
        let id = self.store.alloc(
            node.id(),
            Self::start_line(node),
            Self::end_line(node),
            PeKind::Operator(OperatorInfo {
                token: token.to_string(),
            }),
        );
        self.store.set_text(id, token);
        id
    }

    fn add_expr_child(&mut self, parent: PeId, child: PeId) {
        if let Some(e) = self.store.expr_mut(parent) {
            e.expressions.push(child);
        } else if let Some(s) = self.store.stmt_mut(parent) {
            s.expressions.push(child);
        }
    }

    /// Visit a child node and pop the single element it should have
    /// produced.
    fn visit_one(&mut self, node: Node, expect: Expect) -> Option<PeId> {
        let mark = self.mark();
        self.visit(node);
        self.pop_one(mark, expect)
    }

    /// Strip the parenthesized wrapper tree-sitter puts around `if`/`while`
    /// conditions so the condition PE is the bare expression.
    fn strip_parens(node: Node) -> Node {
        if node.kind() == "parenthesized_expression" {
            if let Some(inner) = node.named_child(0) {
                return inner;
            }
        }
        node
    }

    // ------------------------------------------------------------------
    // Compilation unit, classes, methods
    // ------------------------------------------------------------------

    fn visit_compilation_unit(&mut self, root: Node) {
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            match child.kind() {
                "class_declaration" | "interface_declaration" | "enum_declaration" => {
                    let mark = self.mark();
                    self.visit_type_declaration(child);
                    self.pop_one(mark, Expect::Any);
                }
                _ => {}
            }
        }
    }

    fn visit_type_declaration(&mut self, node: Node) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text_of(n).to_string());
        let class = self.store.alloc(
            node.id(),
            Self::start_line(node),
            Self::end_line(node),
            PeKind::Class(ClassInfo {
                name: name.clone(),
                methods: Vec::new(),
            }),
        );
        self.stack.push(class);
        self.classes.push(class);

        let mut text = format!("class {}{{\n", name.as_deref().unwrap_or(""));
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.children(&mut cursor) {
                match member.kind() {
                    "method_declaration" | "constructor_declaration" => {
                        let mark = self.mark();
                        self.visit_method_declaration(member);
                        if let Some(method) = self.pop_one(mark, Expect::Method) {
                            self.methods.push(method);
                            self.store.class_mut(class).expect("class element").methods.push(method);
                            text.push_str(self.store.text(method));
                            text.push('\n');
                        }
                    }
                    "class_declaration" | "interface_declaration" | "enum_declaration" => {
                        let mark = self.mark();
                        self.visit_type_declaration(member);
                        self.pop_one(mark, Expect::Any);
                    }
                    _ => {}
                }
            }
        }
        text.push('}');
        self.store.set_text(class, text);
    }

    fn visit_method_declaration(&mut self, node: Node) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text_of(n).to_string())
            .unwrap_or_default();
        let method = self.store.alloc(
            node.id(),
            Self::start_line(node),
            Self::end_line(node),
            PeKind::Method(MethodInfo {
                lambda: false,
                name: Some(name.clone()),
                parameters: Vec::new(),
                statements: Vec::new(),
                lambda_expression: None,
            }),
        );
        self.stack.push(method);

        let mut text = String::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "modifiers" {
                let mut mcursor = child.walk();
                for m in child.children(&mut mcursor) {
                    let token = self.text_of(m).to_string();
                    self.store.get_mut(method).modifiers.push(token.clone());
                    text.push_str(&token);
                    text.push(' ');
                }
            }
        }
        if let Some(ty) = node.child_by_field_name("type") {
            text.push_str(self.text_of(ty));
            text.push(' ');
        }
        text.push_str(&name);
        text.push_str(" (");

        if let Some(params) = node.child_by_field_name("parameters") {
            let mut first = true;
            let mut pcursor = params.walk();
            for param in params.named_children(&mut pcursor) {
                match param.kind() {
                    "formal_parameter" | "spread_parameter" => {
                        if let Some(var) = self.visit_formal_parameter(param) {
                            if let Some(v) = self.store.variable_mut(var) {
                                v.category = VarCategory::Parameter;
                            }
                            let var_name =
                                self.store.variable(var).map(|v| v.name.clone());
                            self.store
                                .method_mut(method)
                                .expect("method element")
                                .parameters
                                .push(var);
                            if let Some(n) = var_name {
                                self.scopes.declare(&self.store, method, Var::new(n));
                            }
                            if !first {
                                text.push(',');
                            }
                            first = false;
                            text.push_str(self.store.text(var));
                        }
                    }
                    _ => {}
                }
            }
        }
        text.push_str(" ) ");

        if let Some(body) = node.child_by_field_name("body") {
            if let Some(block) = self.visit_one(body, Expect::Statement) {
                self.store.set_statement(method, block);
                text.push_str(self.store.text(block));
            }
        }
        self.store.set_text(method, text);
    }

    /// Build a `Variable` element from a formal parameter node.
    fn visit_formal_parameter(&mut self, node: Node) -> Option<PeId> {
        let type_name = node
            .child_by_field_name("type")
            .map(|t| self.text_of(t).to_string())
            .unwrap_or_default();
        let name = node
            .child_by_field_name("name")
            .or_else(|| {
                // Varargs parameters keep their name inside a declarator.
                let mut cursor = node.walk();
                let declarator = node
                    .named_children(&mut cursor)
                    .find(|c| c.kind() == "variable_declarator");
                declarator.and_then(|d| d.child_by_field_name("name"))
            })
            .map(|n| self.text_of(n).to_string())?;
        let var = self.store.alloc(
            node.id(),
            Self::start_line(node),
            Self::end_line(node),
            PeKind::Variable(VariableInfo {
                category: VarCategory::Local,
                type_name: type_name.clone(),
                name: name.clone(),
            }),
        );
        self.store.set_text(var, format!("{type_name} {name}"));
        Some(var)
    }

    // ------------------------------------------------------------------
    // Main dispatch
    // ------------------------------------------------------------------

    /// Visit one node, leaving the produced PE (if any) on the stack.
    fn visit(&mut self, node: Node) {
        match node.kind() {
            // ---- statements -------------------------------------------
            "block" => self.visit_block(node),
            "local_variable_declaration" => self.visit_local_variable_declaration(node),
            "expression_statement" => self.visit_expression_statement(node),
            "if_statement" => self.visit_if(node),
            "while_statement" => self.visit_while(node),
            "do_statement" => self.visit_do(node),
            "for_statement" => self.visit_for(node),
            "enhanced_for_statement" => self.visit_foreach(node),
            "switch_expression" | "switch_statement" => self.visit_switch(node),
            "try_statement" | "try_with_resources_statement" => self.visit_try(node),
            "synchronized_statement" => self.visit_synchronized(node),
            "return_statement" => self.visit_return(node),
            "throw_statement" => self.visit_throw(node),
            "break_statement" => self.visit_jump(node, StmtCategory::Break, "break"),
            "continue_statement" => self.visit_jump(node, StmtCategory::Continue, "continue"),
            "assert_statement" => self.visit_assert(node),
            "labeled_statement" => self.visit_labeled(node),
            "explicit_constructor_invocation" => self.visit_explicit_constructor(node),
            "class_declaration" => self.visit_local_class(node),

            // ---- expressions ------------------------------------------
            "assignment_expression" => self.visit_assignment(node),
            "binary_expression" => self.visit_infix(node),
            "update_expression" => self.visit_update(node),
            "unary_expression" => self.visit_unary(node),
            "ternary_expression" => self.visit_ternary(node),
            "cast_expression" => self.visit_cast(node),
            "instanceof_expression" => self.visit_instanceof(node),
            "lambda_expression" => self.visit_lambda(node),
            "method_invocation" => self.visit_method_invocation(node),
            "field_access" => self.visit_field_access(node),
            "array_access" => self.visit_array_access(node),
            "object_creation_expression" => self.visit_class_instance_creation(node),
            "array_creation_expression" => self.visit_array_creation(node),
            "array_initializer" => self.visit_array_initializer(node),
            "parenthesized_expression" => self.visit_parenthesized(node),
            "variable_declarator" => self.visit_variable_declarator(node),
            "scoped_identifier" => self.visit_scoped_identifier(node),

            "identifier" => {
                let text = self.text_of(node).to_string();
                let pe = self.alloc_expr(node, ExprCategory::SimpleName);
                self.store.set_text(pe, text);
                self.stack.push(pe);
            }
            "this" => {
                let pe = self.alloc_expr(node, ExprCategory::This);
                self.store.set_text(pe, "this");
                self.stack.push(pe);
            }
            "null_literal" => {
                let pe = self.alloc_expr(node, ExprCategory::Null);
                self.store.set_text(pe, "null");
                self.stack.push(pe);
            }
            "true" | "false" => {
                let text = self.text_of(node).to_string();
                let pe = self.alloc_expr(node, ExprCategory::Boolean);
                self.store.set_text(pe, text);
                self.stack.push(pe);
            }
            "decimal_integer_literal"
            | "hex_integer_literal"
            | "octal_integer_literal"
            | "binary_integer_literal"
            | "decimal_floating_point_literal"
            | "hex_floating_point_literal" => {
                let text = self.text_of(node).to_string();
                let pe = self.alloc_expr(node, ExprCategory::Number);
                self.store.set_text(pe, text);
                self.stack.push(pe);
            }
            "string_literal" => {
                let text = self.text_of(node).to_string();
                let pe = self.alloc_expr(node, ExprCategory::String);
                self.store.set_text(pe, text);
                self.stack.push(pe);
            }
            "character_literal" => {
                let text = self.text_of(node).to_string();
                let pe = self.alloc_expr(node, ExprCategory::Character);
                self.store.set_text(pe, text);
                self.stack.push(pe);
            }
            "class_literal" => {
                let text = self.text_of(node).to_string();
                let pe = self.alloc_expr(node, ExprCategory::TypeLiteral);
                self.store.set_text(pe, text);
                self.stack.push(pe);
            }

            // ---- types ------------------------------------------------
            "integral_type" | "floating_point_type" | "boolean_type" | "void_type"
            | "type_identifier" | "generic_type" | "array_type" | "scoped_type_identifier" => {
                let ty = self.alloc_type(node);
                self.stack.push(ty);
            }

            // ---- everything else: recurse, protected by bounded pops --
            other => {
                debug!(kind = other, "no PE production for node kind; descending");
                let mut cursor = node.walk();
                let children: Vec<Node> = node.named_children(&mut cursor).collect();
                for child in children {
                    self.visit(child);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn visit_block(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let block = self.alloc_stmt(node, StmtCategory::SimpleBlock, owner);
        self.stack.push(block);

        let mut text = String::from("{\n");
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "{" | "}" => {}
                ";" => {
                    let empty = self.alloc_stmt(child, StmtCategory::Empty, Some(block));
                    self.store.set_text(empty, ";");
                    self.store.add_statement(block, empty);
                    text.push_str(";\n");
                }
                _ => {
                    if let Some(stmt) = self.visit_one(child, Expect::Statement) {
                        self.store.add_statement(block, stmt);
                        text.push_str(self.store.text(stmt));
                        text.push('\n');
                    }
                }
            }
        }
        text.push('}');
        self.store.set_text(block, text);
    }

    fn visit_local_variable_declaration(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let stmt = self.alloc_stmt(node, StmtCategory::VariableDeclaration, owner);
        self.stack.push(stmt);

        let mut text = String::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "modifiers" {
                text.push_str(self.text_of(child));
                text.push(' ');
            }
        }

        if let Some(ty) = node.child_by_field_name("type") {
            let type_pe = self.alloc_type(ty);
            self.add_expr_child(stmt, type_pe);
            text.push_str(self.text_of(ty));
            text.push(' ');
        }

        let mut cursor = node.walk();
        let declarators: Vec<Node> = node
            .children_by_field_name("declarator", &mut cursor)
            .collect();
        let mut first = true;
        for decl in declarators {
            if let Some(fragment) = self.visit_one(decl, Expect::Any) {
                self.add_expr_child(stmt, fragment);
                if !first {
                    text.push(',');
                }
                first = false;
                text.push_str(self.store.text(fragment));
            }
            // The declared name becomes visible in the owning block.
            if let (Some(name_node), Some(owner)) = (decl.child_by_field_name("name"), owner) {
                let name = self.text_of(name_node).to_string();
                self.scopes.declare(&self.store, owner, Var::new(name));
            }
        }
        text.push(';');
        self.store.set_text(stmt, text);
    }

    fn visit_variable_declarator(&mut self, node: Node) {
        let fragment = self.alloc_expr(node, ExprCategory::VariableDeclarationFragment);
        self.stack.push(fragment);

        let mut text = String::new();
        if let Some(name) = node.child_by_field_name("name") {
            if let Some(name_pe) = self.visit_one(name, Expect::Any) {
                self.add_expr_child(fragment, name_pe);
                text.push_str(self.store.text(name_pe));
            }
        }
        if let Some(value) = node.child_by_field_name("value") {
            if let Some(value_pe) = self.visit_one(value, Expect::Any) {
                self.add_expr_child(fragment, value_pe);
                text.push_str(" = ");
                text.push_str(self.store.text(value_pe));
            }
        }
        self.store.set_text(fragment, text);
    }

    fn visit_expression_statement(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let stmt = self.alloc_stmt(node, StmtCategory::Expression, owner);
        self.stack.push(stmt);

        if let Some(inner) = node.named_child(0) {
            if let Some(expr) = self.visit_one(inner, Expect::Any) {
                self.add_expr_child(stmt, expr);
                let text = format!("{};", self.store.text(expr));
                self.store.set_text(stmt, text);
            }
        }
    }

    fn visit_if(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let stmt = self.alloc_stmt(node, StmtCategory::If, owner);
        self.stack.push(stmt);

        let mut text = String::new();
        if let Some(cond_node) = node.child_by_field_name("condition") {
            if let Some(cond) = self.visit_one(Self::strip_parens(cond_node), Expect::Any) {
                self.store.stmt_mut(stmt).expect("statement").condition = Some(cond);
                self.store.set_owner_conditional_block(cond, stmt);
                text = format!("if ({}) ", self.store.text(cond));
                let cond_text = format!("if {}", self.store.text(cond));
                self.store.set_text(cond, cond_text);
            }
        }
        if let Some(consequence) = node.child_by_field_name("consequence") {
            if let Some(body) = self.visit_one(consequence, Expect::Statement) {
                self.store.set_statement(stmt, body);
                text.push_str(self.store.text(body));
            }
        }
        if let Some(alternative) = node.child_by_field_name("alternative") {
            if let Some(else_body) = self.visit_one(alternative, Expect::Statement) {
                self.store.set_else_statement(stmt, else_body);
                text.push_str(self.store.text(else_body));
            }
        }
        self.store.set_text(stmt, text);
    }

    fn visit_while(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let stmt = self.alloc_stmt(node, StmtCategory::While, owner);
        self.stack.push(stmt);

        let mut text = String::new();
        if let Some(cond_node) = node.child_by_field_name("condition") {
            if let Some(cond) = self.visit_one(Self::strip_parens(cond_node), Expect::Any) {
                self.store.stmt_mut(stmt).expect("statement").condition = Some(cond);
                self.store.set_owner_conditional_block(cond, stmt);
                text = format!("while ({}) ", self.store.text(cond));
                let cond_text = format!("while {}", self.store.text(cond));
                self.store.set_text(cond, cond_text);
            }
        }
        if let Some(body_node) = node.child_by_field_name("body") {
            if let Some(body) = self.visit_one(body_node, Expect::Statement) {
                self.store.set_statement(stmt, body);
                text.push_str(self.store.text(body));
            }
        }
        self.store.set_text(stmt, text);
    }

    fn visit_do(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let stmt = self.alloc_stmt(node, StmtCategory::Do, owner);
        self.stack.push(stmt);

        let mut text = String::from("do ");
        if let Some(body_node) = node.child_by_field_name("body") {
            if let Some(body) = self.visit_one(body_node, Expect::Statement) {
                self.store.set_statement(stmt, body);
                text.push_str(self.store.text(body));
            }
        }
        if let Some(cond_node) = node.child_by_field_name("condition") {
            if let Some(cond) = self.visit_one(Self::strip_parens(cond_node), Expect::Any) {
                self.store.stmt_mut(stmt).expect("statement").condition = Some(cond);
                self.store.set_owner_conditional_block(cond, stmt);
                text.push_str(&format!("while ({});", self.store.text(cond)));
            }
        }
        self.store.set_text(stmt, text);
    }

    fn visit_for(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let stmt = self.alloc_stmt(node, StmtCategory::For, owner);
        self.stack.push(stmt);

        let mut text = String::from("for (");
        let mut cursor = node.walk();
        let inits: Vec<Node> = node.children_by_field_name("init", &mut cursor).collect();
        let mut first = true;
        for init in inits {
            let pe = if init.kind() == "local_variable_declaration" {
                self.visit_for_init_declaration(init, stmt)
            } else {
                self.visit_one(init, Expect::Any)
            };
            if let Some(pe) = pe {
                self.store
                    .stmt_mut(stmt)
                    .expect("statement")
                    .initializers
                    .push(pe);
                if !first {
                    text.push(',');
                }
                first = false;
                text.push_str(self.store.text(pe));
            }
        }
        text.push_str("; ");

        if let Some(cond_node) = node.child_by_field_name("condition") {
            if let Some(cond) = self.visit_one(Self::strip_parens(cond_node), Expect::Any) {
                self.store.stmt_mut(stmt).expect("statement").condition = Some(cond);
                self.store.set_owner_conditional_block(cond, stmt);
                text.push_str(self.store.text(cond));
            }
        }
        text.push_str("; ");

        let mut cursor = node.walk();
        let updates: Vec<Node> = node.children_by_field_name("update", &mut cursor).collect();
        let mut first = true;
        for update in updates {
            if let Some(pe) = self.visit_one(update, Expect::Any) {
                self.store
                    .stmt_mut(stmt)
                    .expect("statement")
                    .updaters
                    .push(pe);
                if !first {
                    text.push(',');
                }
                first = false;
                text.push_str(self.store.text(pe));
            }
        }
        text.push(')');

        if let Some(body_node) = node.child_by_field_name("body") {
            if let Some(body) = self.visit_one(body_node, Expect::Statement) {
                self.store.set_statement(stmt, body);
                text.push_str(self.store.text(body));
            }
        }
        self.store.set_text(stmt, text);
    }

    /// A declaration in a `for` initializer becomes a
    /// `VariableDeclarationExpression` (it is not a statement there).
    fn visit_for_init_declaration(&mut self, node: Node, for_stmt: PeId) -> Option<PeId> {
        let vde = self.alloc_expr(node, ExprCategory::VariableDeclarationExpression);
        self.stack.push(vde);

        let mut text = String::new();
        if let Some(ty) = node.child_by_field_name("type") {
            let type_pe = self.alloc_type(ty);
            self.add_expr_child(vde, type_pe);
            text.push_str(self.text_of(ty));
            text.push(' ');
        }
        let mut cursor = node.walk();
        let declarators: Vec<Node> = node
            .children_by_field_name("declarator", &mut cursor)
            .collect();
        for decl in declarators {
            if let Some(fragment) = self.visit_one(decl, Expect::Any) {
                self.add_expr_child(vde, fragment);
                text.push_str(self.store.text(fragment));
            }
            if let Some(name_node) = decl.child_by_field_name("name") {
                let name = self.text_of(name_node).to_string();
                self.scopes.declare(&self.store, for_stmt, Var::new(name));
            }
        }
        self.store.set_text(vde, text);
        let mark = self.mark() - 1;
        self.pop_one(mark, Expect::Any)
    }

    fn visit_foreach(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();

        let type_name = node
            .child_by_field_name("type")
            .map(|t| self.text_of(t).to_string())
            .unwrap_or_default();
        let param_name = node
            .child_by_field_name("name")
            .map(|n| self.text_of(n).to_string());

        let stmt = self.alloc_stmt(node, StmtCategory::Foreach, owner);

        let param = param_name.clone().map(|name| {
            let var = self.store.alloc(
                node.id(),
                Self::start_line(node),
                Self::end_line(node),
                PeKind::Variable(VariableInfo {
                    category: VarCategory::Local,
                    type_name: type_name.clone(),
                    name: name.clone(),
                }),
            );
            self.store.set_text(var, format!("{type_name} {name}"));
            var
        });

        self.stack.push(stmt);
        if let Some(param) = param {
            self.store
                .stmt_mut(stmt)
                .expect("statement")
                .initializers
                .push(param);
            // The loop variable doubles as the "more elements" predicate.
            self.store.stmt_mut(stmt).expect("statement").condition = Some(param);
            self.store.set_owner_conditional_block(param, stmt);
        }
        if let Some(name) = param_name {
            self.scopes.declare(&self.store, stmt, Var::new(name));
        }

        let mut iterable_text = String::new();
        if let Some(value) = node.child_by_field_name("value") {
            if let Some(iterable) = self.visit_one(value, Expect::Any) {
                iterable_text = self.store.text(iterable).to_string();
                self.store
                    .stmt_mut(stmt)
                    .expect("statement")
                    .initializers
                    .push(iterable);
            }
        }

        let mut text = format!(
            "for ({} : {})",
            self.store
                .stmt(stmt)
                .and_then(|s| s.initializers.first().copied())
                .map(|p| self.store.text(p).to_string())
                .unwrap_or_default(),
            iterable_text
        );
        if let Some(body_node) = node.child_by_field_name("body") {
            if let Some(body) = self.visit_one(body_node, Expect::Statement) {
                self.store.set_statement(stmt, body);
                text.push_str(self.store.text(body));
            }
        }
        self.store.set_text(stmt, text);
    }

    fn visit_switch(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let stmt = self.alloc_stmt(node, StmtCategory::Switch, owner);
        self.stack.push(stmt);

        let mut text = String::new();
        if let Some(cond_node) = node.child_by_field_name("condition") {
            if let Some(cond) = self.visit_one(Self::strip_parens(cond_node), Expect::Any) {
                self.store.stmt_mut(stmt).expect("statement").condition = Some(cond);
                self.store.set_owner_conditional_block(cond, stmt);
                text = format!("switch ({}) {{\n", self.store.text(cond));
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            let groups: Vec<Node> = body.named_children(&mut cursor).collect();
            for group in groups {
                match group.kind() {
                    "switch_block_statement_group" | "switch_rule" => {
                        let mut gcursor = group.walk();
                        let members: Vec<Node> = group.children(&mut gcursor).collect();
                        for member in members {
                            match member.kind() {
                                "switch_label" => {
                                    let case = self.visit_switch_label(member, stmt);
                                    self.store.add_statement(stmt, case);
                                    text.push_str(self.store.text(case));
                                    text.push('\n');
                                }
                                ":" | "->" => {}
                                _ => {
                                    if let Some(s) =
                                        self.visit_one(member, Expect::Statement)
                                    {
                                        self.store.add_statement(stmt, s);
                                        text.push_str(self.store.text(s));
                                        text.push('\n');
                                    }
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        text.push('}');
        self.store.set_text(stmt, text);
    }

    fn visit_switch_label(&mut self, node: Node, switch_stmt: PeId) -> PeId {
        let case = self.alloc_stmt(node, StmtCategory::Case, Some(switch_stmt));
        let is_default = self.text_of(node).trim_start().starts_with("default");
        let mut text = String::new();
        if is_default {
            text.push_str("default");
        } else {
            self.stack.push(case);
            if let Some(expr_node) = node.named_child(0) {
                if let Some(expr) = self.visit_one(expr_node, Expect::Any) {
                    self.store
                        .stmt_mut(case)
                        .expect("statement")
                        .expressions
                        .push(expr);
                    text.push_str("case ");
                    text.push_str(self.store.text(expr));
                }
            }
            self.stack.pop();
        }
        text.push(':');
        self.store.set_text(case, text);
        case
    }

    fn visit_try(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let stmt = self.alloc_stmt(node, StmtCategory::Try, owner);
        self.stack.push(stmt);

        let mut text = String::from("try ");
        if let Some(body) = node.child_by_field_name("body") {
            if let Some(block) = self.visit_one(body, Expect::Statement) {
                self.store.set_statement(stmt, block);
                text.push_str(self.store.text(block));
            }
        }

        let mut cursor = node.walk();
        let clauses: Vec<Node> = node.children(&mut cursor).collect();
        for clause in clauses {
            match clause.kind() {
                "catch_clause" => {
                    let mark = self.mark();
                    self.visit_catch(clause);
                    if let Some(catch) = self.pop_one(mark, Expect::Statement) {
                        self.store
                            .stmt_mut(stmt)
                            .expect("statement")
                            .catch_statements
                            .push(catch);
                        text.push_str(self.store.text(catch));
                    }
                }
                "finally_clause" => {
                    let mut fcursor = clause.walk();
                    let blocks: Vec<Node> = clause.named_children(&mut fcursor).collect();
                    for block_node in blocks {
                        if block_node.kind() == "block" {
                            if let Some(block) =
                                self.visit_one(block_node, Expect::Statement)
                            {
                                self.store
                                    .stmt_mut(stmt)
                                    .expect("statement")
                                    .finally_statement = Some(block);
                                text.push_str("finally ");
                                text.push_str(self.store.text(block));
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        self.store.set_text(stmt, text);
    }

    fn visit_catch(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let stmt = self.alloc_stmt(node, StmtCategory::Catch, owner);
        self.stack.push(stmt);

        let mut text = String::new();
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "catch_formal_parameter" => {
                    let mut ccursor = child.walk();
                    let type_name = child
                        .named_children(&mut ccursor)
                        .find(|c| c.kind() == "catch_type")
                        .map(|c| self.text_of(c).to_string())
                        .unwrap_or_default();
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text_of(n).to_string())
                        .unwrap_or_default();
                    let var = self.store.alloc(
                        child.id(),
                        Self::start_line(child),
                        Self::end_line(child),
                        PeKind::Variable(VariableInfo {
                            category: VarCategory::Local,
                            type_name: type_name.clone(),
                            name: name.clone(),
                        }),
                    );
                    self.store
                        .set_text(var, format!("catch ( {type_name} {name} )"));
                    self.store.stmt_mut(stmt).expect("statement").condition = Some(var);
                    self.store.set_owner_conditional_block(var, stmt);
                    if !name.is_empty() {
                        self.scopes.declare(&self.store, stmt, Var::new(name));
                    }
                    text.push_str(self.store.text(var));
                    text.push(' ');
                }
                "block" => {
                    if let Some(block) = self.visit_one(child, Expect::Statement) {
                        self.store.set_statement(stmt, block);
                        text.push_str(self.store.text(block));
                    }
                }
                _ => {}
            }
        }
        self.store.set_text(stmt, text);
    }

    fn visit_synchronized(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let stmt = self.alloc_stmt(node, StmtCategory::Synchronized, owner);
        self.stack.push(stmt);

        let mut text = String::from("synchronized (");
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "parenthesized_expression" => {
                    if let Some(cond) = self.visit_one(Self::strip_parens(child), Expect::Any) {
                        self.store.stmt_mut(stmt).expect("statement").condition = Some(cond);
                        self.store.set_owner_conditional_block(cond, stmt);
                        text.push_str(self.store.text(cond));
                        text.push_str(") ");
                    }
                }
                "block" => {
                    if let Some(block) = self.visit_one(child, Expect::Statement) {
                        self.store.set_statement(stmt, block);
                        text.push_str(self.store.text(block));
                    }
                }
                _ => {}
            }
        }
        self.store.set_text(stmt, text);
    }

    fn visit_return(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let stmt = self.alloc_stmt(node, StmtCategory::Return, owner);
        self.stack.push(stmt);

        let mut text = String::from("return");
        if let Some(value) = node.named_child(0) {
            if let Some(expr) = self.visit_one(value, Expect::Any) {
                self.add_expr_child(stmt, expr);
                text.push(' ');
                text.push_str(self.store.text(expr));
            }
        }
        text.push(';');
        self.store.set_text(stmt, text);
    }

    fn visit_throw(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let stmt = self.alloc_stmt(node, StmtCategory::Throw, owner);
        self.stack.push(stmt);

        let mut text = String::from("throw ");
        if let Some(value) = node.named_child(0) {
            if let Some(expr) = self.visit_one(value, Expect::Any) {
                self.add_expr_child(stmt, expr);
                text.push_str(self.store.text(expr));
            }
        }
        text.push(';');
        self.store.set_text(stmt, text);
    }

    fn visit_jump(&mut self, node: Node, category: StmtCategory, keyword: &str) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let stmt = self.alloc_stmt(node, category, owner);
        self.stack.push(stmt);

        let mut text = String::from(keyword);
        if let Some(label) = node.named_child(0) {
            if let Some(label_pe) = self.visit_one(label, Expect::Any) {
                self.add_expr_child(stmt, label_pe);
                text.push(' ');
                text.push_str(self.store.text(label_pe));
            }
        }
        text.push(';');
        self.store.set_text(stmt, text);
    }

    fn visit_assert(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let stmt = self.alloc_stmt(node, StmtCategory::Assert, owner);
        self.stack.push(stmt);

        let mut text = String::from("assert ");
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        let mut first = true;
        for child in children {
            if let Some(expr) = self.visit_one(child, Expect::Any) {
                self.add_expr_child(stmt, expr);
                if !first {
                    text.push_str(" : ");
                }
                first = false;
                text.push_str(self.store.text(expr));
            }
        }
        text.push(';');
        self.store.set_text(stmt, text);
    }

    fn visit_labeled(&mut self, node: Node) {
        let label = node
            .named_child(0)
            .filter(|n| n.kind() == "identifier")
            .map(|n| self.text_of(n).to_string());
        // The wrapped statement stays on the stack; the label attaches to it.
        let mark = self.mark();
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            if child.kind() != "identifier" {
                self.visit(child);
            }
        }
        if self.mark() != mark + 1 {
            return;
        }
        if let (Some(label), Some(top)) = (label, self.stack.last().copied()) {
            if let Some(s) = self.store.stmt_mut(top) {
                s.label = Some(label);
            }
        }
    }

    fn visit_explicit_constructor(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();

        let (category, keyword) = match node.child_by_field_name("constructor") {
            Some(c) if c.kind() == "super" => {
                (ExprCategory::SuperConstructorInvocation, "super")
            }
            _ => (ExprCategory::ConstructorInvocation, "this"),
        };
        let invocation = self.alloc_expr(node, category);
        self.stack.push(invocation);

        let mut text = format!("{keyword}(");
        if let Some(args) = node.child_by_field_name("arguments") {
            let mut cursor = args.walk();
            let arg_nodes: Vec<Node> = args.named_children(&mut cursor).collect();
            let mut first = true;
            for arg in arg_nodes {
                if let Some(pe) = self.visit_one(arg, Expect::Any) {
                    self.add_expr_child(invocation, pe);
                    if !first {
                        text.push(',');
                    }
                    first = false;
                    text.push_str(self.store.text(pe));
                }
            }
        }
        text.push(')');
        self.store.set_text(invocation, text.clone());
        self.stack.pop();

        // Materialize the synthetic expression statement around it.
        let stmt = self.alloc_stmt(node, StmtCategory::Expression, owner);
        self.add_expr_child(stmt, invocation);
        text.push(';');
        self.store.set_text(stmt, text);
        self.stack.push(stmt);
    }

    fn visit_local_class(&mut self, node: Node) {
        if !self.top_is_block() {
            return;
        }
        let owner = self.stack.last().copied();
        let stmt = self.alloc_stmt(node, StmtCategory::TypeDeclaration, owner);
        self.stack.push(stmt);

        let mark = self.mark();
        self.visit_type_declaration(node);
        if let Some(class) = self.pop_one(mark, Expect::Any) {
            self.add_expr_child(stmt, class);
            let text = self.store.text(class).to_string();
            self.store.set_text(stmt, text);
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn visit_assignment(&mut self, node: Node) {
        let assign = self.alloc_expr(node, ExprCategory::Assignment);
        self.stack.push(assign);

        let mut left_text = String::new();
        let mut right_text = String::new();
        if let Some(left) = node.child_by_field_name("left") {
            if let Some(pe) = self.visit_one(left, Expect::Any) {
                self.add_expr_child(assign, pe);
                left_text = self.store.text(pe).to_string();
            }
        }
        let op_token = node
            .child_by_field_name("operator")
            .or_else(|| node.child(1))
            .map(|n| self.text_of(n).to_string())
            .unwrap_or_else(|| "=".to_string());
        let op = self.alloc_operator(node, &op_token);
        self.add_expr_child(assign, op);

        if let Some(right) = node.child_by_field_name("right") {
            if let Some(pe) = self.visit_one(right, Expect::Any) {
                self.add_expr_child(assign, pe);
                right_text = self.store.text(pe).to_string();
            }
        }
        self.store
            .set_text(assign, format!("{left_text} {op_token} {right_text}"));
    }

    fn visit_infix(&mut self, node: Node) {
        let infix = self.alloc_expr(node, ExprCategory::Infix);
        self.stack.push(infix);

        let mut left_text = String::new();
        let mut right_text = String::new();
        if let Some(left) = node.child_by_field_name("left") {
            if let Some(pe) = self.visit_one(left, Expect::Any) {
                self.add_expr_child(infix, pe);
                left_text = self.store.text(pe).to_string();
            }
        }
        let op_token = node
            .child_by_field_name("operator")
            .map(|n| self.text_of(n).to_string())
            .unwrap_or_default();
        let op = self.alloc_operator(node, &op_token);
        self.add_expr_child(infix, op);

        if let Some(right) = node.child_by_field_name("right") {
            if let Some(pe) = self.visit_one(right, Expect::Any) {
                self.add_expr_child(infix, pe);
                right_text = self.store.text(pe).to_string();
            }
        }
        self.store
            .set_text(infix, format!("( {left_text} {op_token} {right_text} )"));
    }

    fn visit_update(&mut self, node: Node) {
        // `++x` / `--x` are prefix, `x++` / `x--` postfix; the grammar
        // folds both into one production.
        let prefix = node
            .child(0)
            .map(|c| c.kind() == "++" || c.kind() == "--")
            .unwrap_or(false);
        let op_token = if prefix {
            node.child(0)
        } else {
            node.child(1)
        }
        .map(|n| self.text_of(n).to_string())
        .unwrap_or_default();

        let category = if prefix {
            ExprCategory::Prefix
        } else {
            ExprCategory::Postfix
        };
        let expr = self.alloc_expr(node, category);
        self.stack.push(expr);

        let operand = node.named_child(0);
        if prefix {
            let op = self.alloc_operator(node, &op_token);
            self.add_expr_child(expr, op);
        }
        let mut operand_text = String::new();
        if let Some(operand) = operand {
            if let Some(pe) = self.visit_one(operand, Expect::Any) {
                self.add_expr_child(expr, pe);
                operand_text = self.store.text(pe).to_string();
            }
        }
        if !prefix {
            let op = self.alloc_operator(node, &op_token);
            self.add_expr_child(expr, op);
        }
        let text = if prefix {
            format!("{op_token}{operand_text}")
        } else {
            format!("{operand_text}{op_token}")
        };
        self.store.set_text(expr, text);
    }

    fn visit_unary(&mut self, node: Node) {
        let expr = self.alloc_expr(node, ExprCategory::Prefix);
        self.stack.push(expr);

        let op_token = node
            .child_by_field_name("operator")
            .or_else(|| node.child(0))
            .map(|n| self.text_of(n).to_string())
            .unwrap_or_default();
        let op = self.alloc_operator(node, &op_token);
        self.add_expr_child(expr, op);

        let mut operand_text = String::new();
        if let Some(operand) = node.child_by_field_name("operand").or_else(|| node.named_child(0))
        {
            if let Some(pe) = self.visit_one(operand, Expect::Any) {
                self.add_expr_child(expr, pe);
                operand_text = self.store.text(pe).to_string();
            }
        }
        self.store.set_text(expr, format!("{op_token}{operand_text}"));
    }

    fn visit_ternary(&mut self, node: Node) {
        let expr = self.alloc_expr(node, ExprCategory::Trinomial);
        self.stack.push(expr);

        let mut parts = [String::new(), String::new(), String::new()];
        for (i, field) in ["condition", "consequence", "alternative"].iter().enumerate() {
            if let Some(child) = node.child_by_field_name(field) {
                if let Some(pe) = self.visit_one(child, Expect::Any) {
                    self.add_expr_child(expr, pe);
                    parts[i] = self.store.text(pe).to_string();
                }
            }
        }
        self.store
            .set_text(expr, format!("{}? {}: {}", parts[0], parts[1], parts[2]));
    }

    fn visit_cast(&mut self, node: Node) {
        let expr = self.alloc_expr(node, ExprCategory::Cast);
        self.stack.push(expr);

        let mut type_text = String::new();
        if let Some(ty) = node.child_by_field_name("type") {
            let type_pe = self.alloc_type(ty);
            self.add_expr_child(expr, type_pe);
            type_text = self.text_of(ty).to_string();
        }
        let mut value_text = String::new();
        if let Some(value) = node.child_by_field_name("value") {
            if let Some(pe) = self.visit_one(value, Expect::Any) {
                self.add_expr_child(expr, pe);
                value_text = self.store.text(pe).to_string();
            }
        }
        self.store
            .set_text(expr, format!("({type_text}){value_text}"));
    }

    fn visit_instanceof(&mut self, node: Node) {
        let expr = self.alloc_expr(node, ExprCategory::Instanceof);
        self.stack.push(expr);

        let mut left_text = String::new();
        if let Some(left) = node.child_by_field_name("left") {
            if let Some(pe) = self.visit_one(left, Expect::Any) {
                self.add_expr_child(expr, pe);
                left_text = self.store.text(pe).to_string();
            }
        }
        let mut right_text = String::new();
        if let Some(right) = node.child_by_field_name("right") {
            let type_pe = self.alloc_type(right);
            self.add_expr_child(expr, type_pe);
            right_text = self.text_of(right).to_string();
        }
        self.store
            .set_text(expr, format!("{left_text} instanceof {right_text}"));
    }

    fn visit_lambda(&mut self, node: Node) {
        let lambda = self.store.alloc(
            node.id(),
            Self::start_line(node),
            Self::end_line(node),
            PeKind::Method(MethodInfo {
                lambda: true,
                name: None,
                parameters: Vec::new(),
                statements: Vec::new(),
                lambda_expression: None,
            }),
        );
        self.stack.push(lambda);

        let mut param_texts = Vec::new();
        if let Some(params) = node.child_by_field_name("parameters") {
            let mut param_nodes = Vec::new();
            match params.kind() {
                "identifier" => param_nodes.push(params),
                "inferred_parameters" | "formal_parameters" => {
                    let mut cursor = params.walk();
                    for p in params.named_children(&mut cursor) {
                        param_nodes.push(p);
                    }
                }
                _ => {}
            }
            for p in param_nodes {
                let var = if p.kind() == "formal_parameter" {
                    self.visit_formal_parameter(p)
                } else {
                    let name = self.text_of(p).to_string();
                    let var = self.store.alloc(
                        p.id(),
                        Self::start_line(p),
                        Self::end_line(p),
                        PeKind::Variable(VariableInfo {
                            category: VarCategory::Parameter,
                            type_name: String::new(),
                            name: name.clone(),
                        }),
                    );
                    self.store.set_text(var, name);
                    Some(var)
                };
                if let Some(var) = var {
                    if let Some(v) = self.store.variable_mut(var) {
                        v.category = VarCategory::Parameter;
                    }
                    let name = self.store.variable(var).map(|v| v.name.clone());
                    self.store
                        .method_mut(lambda)
                        .expect("method element")
                        .parameters
                        .push(var);
                    param_texts.push(self.store.text(var).to_string());
                    if let Some(name) = name {
                        self.scopes.declare(&self.store, lambda, Var::new(name));
                    }
                }
            }
        }

        let mut body_text = String::new();
        if let Some(body) = node.child_by_field_name("body") {
            if body.kind() == "block" {
                if let Some(block) = self.visit_one(body, Expect::Statement) {
                    self.store.set_statement(lambda, block);
                    body_text = self.store.text(block).to_string();
                }
            } else if let Some(expr) = self.visit_one(body, Expect::Any) {
                self.store
                    .method_mut(lambda)
                    .expect("method element")
                    .lambda_expression = Some(expr);
                body_text = self.store.text(expr).to_string();
            }
        }
        self.store.set_text(
            lambda,
            format!("({}) -> {}", param_texts.join(", "), body_text),
        );
    }

    fn visit_method_invocation(&mut self, node: Node) {
        let is_super = node
            .child_by_field_name("object")
            .map(|o| o.kind() == "super")
            .unwrap_or(false);
        let category = if is_super {
            ExprCategory::SuperMethodInvocation
        } else {
            ExprCategory::MethodInvocation
        };
        let call = self.alloc_expr(node, category);
        self.stack.push(call);

        let mut text = String::new();
        let mut qualifier_text = None;
        if is_super {
            text.push_str("super.");
        } else if let Some(object) = node.child_by_field_name("object") {
            if let Some(pe) = self.visit_one(object, Expect::Any) {
                self.store.expr_mut(call).expect("expression").qualifier = Some(pe);
                qualifier_text = Some(self.store.text(pe).to_string());
                text.push_str(self.store.text(pe));
                text.push('.');
            }
        }

        let mut name_text = String::new();
        if let Some(name) = node.child_by_field_name("name") {
            if let Some(pe) = self.visit_one(name, Expect::Any) {
                self.add_expr_child(call, pe);
                name_text = self.store.text(pe).to_string();
            }
        }
        text.push_str(&name_text);
        text.push('(');

        if let Some(args) = node.child_by_field_name("arguments") {
            let mut cursor = args.walk();
            let arg_nodes: Vec<Node> = args.named_children(&mut cursor).collect();
            let mut first = true;
            for arg in arg_nodes {
                if let Some(pe) = self.visit_one(arg, Expect::Any) {
                    self.add_expr_child(call, pe);
                    if !first {
                        text.push(',');
                    }
                    first = false;
                    text.push_str(self.store.text(pe));
                }
            }
        }
        text.push(')');
        self.store.set_text(call, text);

        // Best effort: no type bindings from tree-sitter, the qualifier's
        // surface text stands in for its type.
        if let Some(q) = qualifier_text {
            self.store.expr_mut(call).expect("expression").api_name =
                Some(format!("{q}.{name_text}()"));
        }
    }

    fn visit_field_access(&mut self, node: Node) {
        let object = node.child_by_field_name("object");
        let is_super = object.map(|o| o.kind() == "super").unwrap_or(false);
        let category = if is_super {
            ExprCategory::SuperFieldAccess
        } else {
            ExprCategory::FieldAccess
        };
        let access = self.alloc_expr(node, category);
        self.stack.push(access);

        let mut text = String::new();
        if is_super {
            text.push_str("super.");
        } else if let Some(object) = object {
            if let Some(pe) = self.visit_one(object, Expect::Any) {
                self.add_expr_child(access, pe);
                text.push_str(self.store.text(pe));
                text.push('.');
            }
        }
        if let Some(field) = node.child_by_field_name("field") {
            if let Some(pe) = self.visit_one(field, Expect::Any) {
                self.add_expr_child(access, pe);
                text.push_str(self.store.text(pe));
            }
        }
        self.store.set_text(access, text);
    }

    fn visit_array_access(&mut self, node: Node) {
        let access = self.alloc_expr(node, ExprCategory::ArrayAccess);
        self.stack.push(access);

        let mut array_text = String::new();
        let mut index_text = String::new();
        if let Some(array) = node.child_by_field_name("array") {
            if let Some(pe) = self.visit_one(array, Expect::Any) {
                self.add_expr_child(access, pe);
                array_text = self.store.text(pe).to_string();
            }
        }
        if let Some(index) = node.child_by_field_name("index") {
            if let Some(pe) = self.visit_one(index, Expect::Any) {
                self.add_expr_child(access, pe);
                index_text = self.store.text(pe).to_string();
            }
        }
        self.store
            .set_text(access, format!("{array_text}[{index_text}]"));
    }

    fn visit_class_instance_creation(&mut self, node: Node) {
        let creation = self.alloc_expr(node, ExprCategory::ClassInstanceCreation);
        self.stack.push(creation);

        let mut text = String::from("new ");
        if let Some(ty) = node.child_by_field_name("type") {
            let type_pe = self.alloc_type(ty);
            self.add_expr_child(creation, type_pe);
            text.push_str(self.text_of(ty));
        }
        text.push('(');
        if let Some(args) = node.child_by_field_name("arguments") {
            let mut cursor = args.walk();
            let arg_nodes: Vec<Node> = args.named_children(&mut cursor).collect();
            let mut first = true;
            for arg in arg_nodes {
                if let Some(pe) = self.visit_one(arg, Expect::Any) {
                    self.add_expr_child(creation, pe);
                    if !first {
                        text.push(',');
                    }
                    first = false;
                    text.push_str(self.store.text(pe));
                }
            }
        }
        text.push(')');

        // Anonymous class body, if present.
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            if child.kind() == "class_body" {
                let class = self.store.alloc(
                    child.id(),
                    Self::start_line(child),
                    Self::end_line(child),
                    PeKind::Class(ClassInfo {
                        name: None,
                        methods: Vec::new(),
                    }),
                );
                let mut class_text = String::from("{\n");
                let mut bcursor = child.walk();
                let members: Vec<Node> = child.named_children(&mut bcursor).collect();
                for member in members {
                    if member.kind() == "method_declaration" {
                        let mark = self.mark();
                        self.visit_method_declaration(member);
                        if let Some(method) = self.pop_one(mark, Expect::Method) {
                            self.store
                                .class_mut(class)
                                .expect("class element")
                                .methods
                                .push(method);
                            class_text.push_str(self.store.text(method));
                        }
                    }
                }
                class_text.push('}');
                self.store.set_text(class, class_text.clone());
                self.store
                    .expr_mut(creation)
                    .expect("expression")
                    .anonymous_class = Some(class);
                text.push_str(&class_text);
            }
        }
        self.store.set_text(creation, text);
    }

    fn visit_array_creation(&mut self, node: Node) {
        let creation = self.alloc_expr(node, ExprCategory::ArrayCreation);
        self.stack.push(creation);

        let mut text = String::from("new ");
        if let Some(ty) = node.child_by_field_name("type") {
            let type_pe = self.alloc_type(ty);
            self.add_expr_child(creation, type_pe);
            text.push_str(self.text_of(ty));
        }
        text.push_str("[]");
        if let Some(value) = node.child_by_field_name("value") {
            if let Some(pe) = self.visit_one(value, Expect::Any) {
                self.add_expr_child(creation, pe);
                text.push_str(self.store.text(pe));
            }
        }
        self.store.set_text(creation, text);
    }

    fn visit_array_initializer(&mut self, node: Node) {
        let initializer = self.alloc_expr(node, ExprCategory::ArrayInitializer);
        self.stack.push(initializer);

        let mut text = String::from("{");
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        let mut first = true;
        for child in children {
            if let Some(pe) = self.visit_one(child, Expect::Any) {
                self.add_expr_child(initializer, pe);
                if !first {
                    text.push(',');
                }
                first = false;
                text.push_str(self.store.text(pe));
            }
        }
        text.push('}');
        self.store.set_text(initializer, text);
    }

    fn visit_parenthesized(&mut self, node: Node) {
        let paren = self.alloc_expr(node, ExprCategory::Parenthesized);
        self.stack.push(paren);

        if let Some(inner) = node.named_child(0) {
            if let Some(pe) = self.visit_one(inner, Expect::Any) {
                self.add_expr_child(paren, pe);
                let text = format!("({})", self.store.text(pe));
                self.store.set_text(paren, text);
            }
        }
    }

    fn visit_scoped_identifier(&mut self, node: Node) {
        let qualified = self.alloc_expr(node, ExprCategory::QualifiedName);
        self.stack.push(qualified);

        let mut text = String::new();
        if let Some(scope) = node.child_by_field_name("scope") {
            if let Some(pe) = self.visit_one(scope, Expect::Any) {
                self.store.expr_mut(qualified).expect("expression").qualifier = Some(pe);
                text.push_str(self.store.text(pe));
                text.push('.');
            }
        }
        if let Some(name) = node.child_by_field_name("name") {
            if let Some(pe) = self.visit_one(name, Expect::Any) {
                self.add_expr_child(qualified, pe);
                text.push_str(self.store.text(pe));
            }
        }
        self.store.set_text(qualified, text);
    }
}
