//! CFG construction.
//!
//! Each statement produces a sub-graph with a single entry and a set of
//! open exits; sequences thread one statement's exits into the next
//! statement's entry. Jump statements travel upward as unresolved
//! break/continue records until a loop, switch, or labeled statement
//! claims them; whatever survives to the method level becomes a graph
//! exit.
//!
//! Edge kinds follow the origin node: a predicate flowing to its
//! fall-through successor gets a false-labeled control edge, a jump node
//! gets a jump edge, everything else a normal edge.

use std::collections::BTreeSet;

use tracing::{trace, warn};

use crate::cfg::types::{Cfg, CfgEdgeKind, CfgNodeFactory, CfgNodeId, CfgNodeKind};
use crate::pe::types::{PeId, PeStore, StatementInfo, StmtCategory};

/// An open exit of a sub-graph: the node control leaves from, and the
/// branch label to use when the node is a predicate.
#[derive(Debug, Clone, Copy)]
struct ExitPoint {
    node: CfgNodeId,
    branch: Option<bool>,
}

fn plain(node: CfgNodeId) -> ExitPoint {
    ExitPoint { node, branch: None }
}

/// An unresolved break/continue traveling up to its enclosing construct.
#[derive(Debug, Clone)]
struct Jump {
    node: CfgNodeId,
    label: Option<String>,
}

/// Sub-graph of one statement: entry node, open exits, escaping jumps.
#[derive(Debug, Default)]
struct SubCfg {
    enter: Option<CfgNodeId>,
    exits: Vec<ExitPoint>,
    breaks: Vec<Jump>,
    continues: Vec<Jump>,
}

impl SubCfg {
    fn absorb_jumps(&mut self, other: &mut SubCfg) {
        self.breaks.append(&mut other.breaks);
        self.continues.append(&mut other.continues);
    }
}

/// Split jumps into those claimed by a construct with the given label
/// (unlabeled jumps always match the innermost construct) and the rest.
fn claim_jumps(jumps: Vec<Jump>, label: Option<&str>) -> (Vec<Jump>, Vec<Jump>) {
    jumps
        .into_iter()
        .partition(|j| j.label.is_none() || j.label.as_deref() == label)
}

/// Builds the control-flow graph of one method.
pub struct CfgBuilder<'a> {
    store: &'a PeStore,
    factory: CfgNodeFactory,
    nodes: BTreeSet<CfgNodeId>,
    exits: BTreeSet<CfgNodeId>,
    method: PeId,
}

impl<'a> CfgBuilder<'a> {
    pub fn new(store: &'a PeStore, method: PeId) -> Self {
        CfgBuilder {
            store,
            factory: CfgNodeFactory::new(),
            nodes: BTreeSet::new(),
            exits: BTreeSet::new(),
            method,
        }
    }

    /// Build the graph. The enter node is the entry of the body sequence,
    /// or a fresh pseudo node for an empty method; exits are every node
    /// whose control flow leaves the method.
    pub fn build(mut self) -> Cfg {
        let statements: Vec<PeId> = self.store.block_statements(self.method).to_vec();
        trace!(statements = statements.len(), "building method CFG");

        let mut sub = if statements.is_empty() {
            match self
                .store
                .method(self.method)
                .and_then(|m| m.lambda_expression)
            {
                Some(expr) => {
                    let node = self.normal_node(expr);
                    SubCfg {
                        enter: Some(node),
                        exits: vec![plain(node)],
                        ..SubCfg::default()
                    }
                }
                None => SubCfg::default(),
            }
        } else {
            self.build_sequence(&statements)
        };

        for exit in &sub.exits {
            self.exits.insert(exit.node);
        }
        for jump in sub.breaks.drain(..).chain(sub.continues.drain(..)) {
            // No enclosing construct claimed the jump: no jump edge, the
            // node becomes a graph exit.
            warn!(label = jump.label.as_deref(), "unresolvable jump; treating as exit");
            self.exits.insert(jump.node);
        }

        let enter = sub
            .enter
            .unwrap_or_else(|| self.factory.make_normal_node(self.store, None));
        Cfg::new(self.method, enter, self.exits, self.nodes, self.factory)
    }

    // ------------------------------------------------------------------
    // Node and edge helpers
    // ------------------------------------------------------------------

    fn normal_node(&mut self, pe: PeId) -> CfgNodeId {
        let node = self.factory.make_normal_node(self.store, Some(pe));
        self.nodes.insert(node);
        node
    }

    fn control_node(&mut self, pe: PeId) -> CfgNodeId {
        let node = self.factory.make_control_node(Some(pe));
        self.nodes.insert(node);
        node
    }

    /// Connect an open exit to its successor. The edge kind follows the
    /// origin: predicates emit control edges (false unless labeled),
    /// jump nodes emit jump edges.
    fn connect(&mut self, from: ExitPoint, to: CfgNodeId) {
        let kind = match self.factory.node(from.node).kind {
            CfgNodeKind::Control => CfgEdgeKind::Control(from.branch.unwrap_or(false)),
            CfgNodeKind::Break | CfgNodeKind::Continue => CfgEdgeKind::Jump,
            _ => CfgEdgeKind::Normal,
        };
        self.factory.add_edge(from.node, to, kind);
    }

    fn connect_all(&mut self, exits: &[ExitPoint], to: CfgNodeId) {
        for exit in exits {
            self.connect(*exit, to);
        }
    }

    fn connect_control(&mut self, from: CfgNodeId, to: CfgNodeId, branch: bool) {
        self.factory
            .add_edge(from, to, CfgEdgeKind::Control(branch));
    }

    fn jump_edge(&mut self, from: CfgNodeId, to: CfgNodeId) {
        self.factory.add_edge(from, to, CfgEdgeKind::Jump);
    }

    // ------------------------------------------------------------------
    // Composition
    // ------------------------------------------------------------------

    fn build_sequence(&mut self, statements: &[PeId]) -> SubCfg {
        let mut seq = SubCfg::default();
        let mut open: Vec<ExitPoint> = Vec::new();
        for &stmt in statements {
            let mut sub = self.build_statement(stmt);
            seq.absorb_jumps(&mut sub);
            if let Some(enter) = sub.enter {
                self.connect_all(&open, enter);
                if seq.enter.is_none() {
                    seq.enter = Some(enter);
                }
                open = sub.exits;
            }
        }
        seq.exits = open;
        seq
    }

    /// Sequence of plain expression nodes (for-loop initializers and
    /// updaters).
    fn build_expression_sequence(&mut self, expressions: &[PeId]) -> SubCfg {
        let mut seq = SubCfg::default();
        let mut open: Vec<ExitPoint> = Vec::new();
        for &expr in expressions {
            let node = self.normal_node(expr);
            self.connect_all(&open, node);
            if seq.enter.is_none() {
                seq.enter = Some(node);
            }
            open = vec![plain(node)];
        }
        seq.exits = open;
        seq
    }

    fn build_statement(&mut self, stmt: PeId) -> SubCfg {
        let Some(info) = self.store.stmt(stmt).cloned() else {
            debug_assert!(false, "CFG over a non-statement element");
            return SubCfg::default();
        };
        let label = info.label.clone();

        let mut sub = match info.category {
            StmtCategory::Expression
            | StmtCategory::VariableDeclaration
            | StmtCategory::Assert
            | StmtCategory::Empty
            | StmtCategory::TypeDeclaration
            | StmtCategory::Case => {
                let node = self.normal_node(stmt);
                SubCfg {
                    enter: Some(node),
                    exits: vec![plain(node)],
                    ..SubCfg::default()
                }
            }
            StmtCategory::Return | StmtCategory::Throw => {
                let node = self.normal_node(stmt);
                self.exits.insert(node);
                SubCfg {
                    enter: Some(node),
                    ..SubCfg::default()
                }
            }
            StmtCategory::Break => {
                let node = self.normal_node(stmt);
                SubCfg {
                    enter: Some(node),
                    breaks: vec![Jump {
                        node,
                        label: self.store.jump_label(stmt).map(|s| s.to_string()),
                    }],
                    ..SubCfg::default()
                }
            }
            StmtCategory::Continue => {
                let node = self.normal_node(stmt);
                SubCfg {
                    enter: Some(node),
                    continues: vec![Jump {
                        node,
                        label: self.store.jump_label(stmt).map(|s| s.to_string()),
                    }],
                    ..SubCfg::default()
                }
            }
            StmtCategory::SimpleBlock => self.build_sequence(&info.statements),
            StmtCategory::If => self.build_if(&info),
            StmtCategory::While => self.build_while(&info, label.as_deref()),
            StmtCategory::Do => self.build_do(&info, label.as_deref()),
            StmtCategory::For => self.build_for(&info, label.as_deref()),
            StmtCategory::Foreach => self.build_foreach(&info, label.as_deref()),
            StmtCategory::Switch => self.build_switch(&info, label.as_deref()),
            StmtCategory::Try => self.build_try(&info),
            StmtCategory::Catch => self.build_catch(&info),
            StmtCategory::Synchronized => self.build_synchronized(&info),
        };

        // A labeled non-loop statement is a valid break target.
        if let Some(lbl) = label {
            let (claimed, rest) = claim_jumps_labeled_only(sub.breaks, &lbl);
            sub.breaks = rest;
            sub.exits.extend(claimed.into_iter().map(|j| plain(j.node)));
        }
        sub
    }

    fn build_if(&mut self, info: &StatementInfo) -> SubCfg {
        let Some(cond) = info.condition else {
            return self.build_sequence(&info.statements);
        };
        let control = self.control_node(cond);
        let mut sub = SubCfg {
            enter: Some(control),
            ..SubCfg::default()
        };

        let mut then = self.build_sequence(&info.statements);
        sub.absorb_jumps(&mut then);
        match then.enter {
            Some(enter) => self.connect_control(control, enter, true),
            None => sub.exits.push(ExitPoint {
                node: control,
                branch: Some(true),
            }),
        }
        sub.exits.extend(then.exits);

        if info.else_statements.is_empty() {
            sub.exits.push(ExitPoint {
                node: control,
                branch: Some(false),
            });
        } else {
            let mut els = self.build_sequence(&info.else_statements);
            sub.absorb_jumps(&mut els);
            match els.enter {
                Some(enter) => self.connect_control(control, enter, false),
                None => sub.exits.push(ExitPoint {
                    node: control,
                    branch: Some(false),
                }),
            }
            sub.exits.extend(els.exits);
        }
        sub
    }

    fn build_while(&mut self, info: &StatementInfo, label: Option<&str>) -> SubCfg {
        let Some(cond) = info.condition else {
            return self.build_sequence(&info.statements);
        };
        let control = self.control_node(cond);
        let mut body = self.build_sequence(&info.statements);

        match body.enter {
            Some(enter) => self.connect_control(control, enter, true),
            None => self.connect_control(control, control, true),
        }
        let body_exits = std::mem::take(&mut body.exits);
        self.connect_all(&body_exits, control);

        self.finish_loop(control, body, label, Some(control))
    }

    fn build_do(&mut self, info: &StatementInfo, label: Option<&str>) -> SubCfg {
        let Some(cond) = info.condition else {
            return self.build_sequence(&info.statements);
        };
        let mut body = self.build_sequence(&info.statements);
        let control = self.control_node(cond);

        let body_exits = std::mem::take(&mut body.exits);
        self.connect_all(&body_exits, control);
        match body.enter {
            Some(enter) => self.connect_control(control, enter, true),
            None => self.connect_control(control, control, true),
        }

        let enter = body.enter.unwrap_or(control);
        let mut sub = self.finish_loop(control, body, label, Some(control));
        sub.enter = Some(enter);
        sub
    }

    fn build_for(&mut self, info: &StatementInfo, label: Option<&str>) -> SubCfg {
        let init = self.build_expression_sequence(&info.initializers);
        let cond = info.condition.map(|c| self.control_node(c));
        let mut body = self.build_sequence(&info.statements);
        let updaters = self.build_expression_sequence(&info.updaters);

        // After the initializers control reaches the loop header.
        let header = cond.or(body.enter).or(updaters.enter);
        if let Some(header) = header {
            self.connect_all(&init.exits, header);
        }

        // Predicate true-branch enters the body (or, body-less, the
        // updater chain / itself).
        if let Some(cond) = cond {
            let target = body.enter.or(updaters.enter).unwrap_or(cond);
            self.connect_control(cond, target, true);
        }

        // Body falls through to the updaters, then back to the header.
        let after_body = updaters.enter.or(cond).or(body.enter);
        let body_exits = std::mem::take(&mut body.exits);
        if let Some(target) = after_body {
            self.connect_all(&body_exits, target);
        }
        let after_updaters = cond.or(body.enter).or(updaters.enter);
        if let Some(target) = after_updaters {
            self.connect_all(&updaters.exits, target);
        }

        // `continue` re-enters through the updaters when there are any.
        let continue_target = updaters.enter.or(cond).or(body.enter);
        let (claimed_continues, rest_continues) = claim_jumps(body.continues, label);
        body.continues = rest_continues;
        if let Some(target) = continue_target {
            for jump in claimed_continues {
                self.jump_edge(jump.node, target);
            }
        }

        let (claimed_breaks, rest_breaks) = claim_jumps(body.breaks, label);
        body.breaks = rest_breaks;

        let mut sub = SubCfg {
            enter: init.enter.or(cond).or(body.enter).or(updaters.enter),
            breaks: body.breaks,
            continues: body.continues,
            ..SubCfg::default()
        };
        if let Some(cond) = cond {
            // Without a condition there is no normal loop exit.
            sub.exits.push(ExitPoint {
                node: cond,
                branch: Some(false),
            });
        }
        sub.exits
            .extend(claimed_breaks.into_iter().map(|j| plain(j.node)));
        sub
    }

    fn build_foreach(&mut self, info: &StatementInfo, label: Option<&str>) -> SubCfg {
        // The "more elements" predicate has no syntactic condition; the
        // loop variable stands in, like a catch clause's parameter.
        let Some(param) = info.condition else {
            return self.build_sequence(&info.statements);
        };
        let control = self.control_node(param);
        let mut body = self.build_sequence(&info.statements);

        match body.enter {
            Some(enter) => self.connect_control(control, enter, true),
            None => self.connect_control(control, control, true),
        }
        let body_exits = std::mem::take(&mut body.exits);
        self.connect_all(&body_exits, control);

        self.finish_loop(control, body, label, Some(control))
    }

    /// Shared loop epilogue: claim jumps, wire continues to the header,
    /// surface breaks and the false-branch as the loop's exits.
    fn finish_loop(
        &mut self,
        control: CfgNodeId,
        mut body: SubCfg,
        label: Option<&str>,
        continue_target: Option<CfgNodeId>,
    ) -> SubCfg {
        let (claimed_continues, rest_continues) = claim_jumps(body.continues, label);
        if let Some(target) = continue_target {
            for jump in claimed_continues {
                self.jump_edge(jump.node, target);
            }
        }
        let (claimed_breaks, rest_breaks) = claim_jumps(body.breaks, label);

        let mut sub = SubCfg {
            enter: Some(control),
            exits: vec![ExitPoint {
                node: control,
                branch: Some(false),
            }],
            breaks: rest_breaks,
            continues: rest_continues,
        };
        sub.exits
            .extend(claimed_breaks.into_iter().map(|j| plain(j.node)));
        sub
    }

    fn build_switch(&mut self, info: &StatementInfo, label: Option<&str>) -> SubCfg {
        let Some(cond) = info.condition else {
            return self.build_sequence(&info.statements);
        };
        let control = self.control_node(cond);
        let mut sub = SubCfg {
            enter: Some(control),
            ..SubCfg::default()
        };

        let mut open: Vec<ExitPoint> = Vec::new();
        let mut has_default = false;
        for &child in &info.statements {
            let mut child_sub =
                if self.store.stmt_category(child) == Some(StmtCategory::Case) {
                    let is_default = self
                        .store
                        .stmt(child)
                        .map(|s| s.expressions.is_empty())
                        .unwrap_or(false);
                    has_default |= is_default;
                    let node = self.normal_node(child);
                    self.connect_control(control, node, true);
                    SubCfg {
                        enter: Some(node),
                        exits: vec![plain(node)],
                        ..SubCfg::default()
                    }
                } else {
                    self.build_statement(child)
                };
            sub.absorb_jumps(&mut child_sub);
            if let Some(enter) = child_sub.enter {
                // Fall-through: the previous chain continues into the next
                // case head or statement.
                self.connect_all(&open, enter);
                open = child_sub.exits;
            }
        }
        sub.exits = open;

        let (claimed_breaks, rest_breaks) = claim_jumps(sub.breaks, label);
        sub.breaks = rest_breaks;
        sub.exits
            .extend(claimed_breaks.into_iter().map(|j| plain(j.node)));
        if !has_default {
            // No default case: the predicate can fall past the switch.
            sub.exits.push(ExitPoint {
                node: control,
                branch: Some(false),
            });
        }
        sub
    }

    fn build_try(&mut self, info: &StatementInfo) -> SubCfg {
        // Body statements are built one by one so each entry can get its
        // conservative may-throw edge into the catch predicates.
        let mut sub = SubCfg::default();
        let mut entries: Vec<CfgNodeId> = Vec::new();
        let mut open: Vec<ExitPoint> = Vec::new();
        for &stmt in &info.statements {
            let mut stmt_sub = self.build_statement(stmt);
            sub.absorb_jumps(&mut stmt_sub);
            if let Some(enter) = stmt_sub.enter {
                entries.push(enter);
                self.connect_all(&open, enter);
                if sub.enter.is_none() {
                    sub.enter = Some(enter);
                }
                open = stmt_sub.exits;
            }
        }
        let body_exits = open;

        let mut catch_subs = Vec::new();
        for &catch in &info.catch_statements {
            let mut catch_sub = self.build_statement(catch);
            sub.absorb_jumps(&mut catch_sub);
            if let Some(catch_enter) = catch_sub.enter {
                // Any statement of the body may transfer here.
                for &entry in &entries {
                    self.connect(plain(entry), catch_enter);
                }
            }
            catch_subs.push(catch_sub);
        }

        let finally_sub = info
            .finally_statement
            .map(|f| self.build_statement(f))
            .filter(|f| f.enter.is_some());

        match finally_sub {
            Some(mut fin) => {
                sub.absorb_jumps(&mut fin);
                let fin_enter = fin.enter.expect("checked above");
                self.connect_all(&body_exits, fin_enter);
                for catch_sub in &catch_subs {
                    self.connect_all(&catch_sub.exits, fin_enter);
                }
                if sub.enter.is_none() {
                    sub.enter = Some(fin_enter);
                }
                sub.exits = fin.exits;
            }
            None => {
                sub.exits = body_exits;
                for catch_sub in catch_subs {
                    sub.exits.extend(catch_sub.exits);
                }
                if sub.enter.is_none() {
                    sub.enter = info
                        .catch_statements
                        .first()
                        .and_then(|c| self.store.stmt(*c).and_then(|s| s.condition))
                        .and_then(|cond| self.factory.get_node(cond));
                }
            }
        }
        sub
    }

    fn build_catch(&mut self, info: &StatementInfo) -> SubCfg {
        let Some(exception) = info.condition else {
            return self.build_sequence(&info.statements);
        };
        let control = self.control_node(exception);
        let mut body = self.build_sequence(&info.statements);

        let mut sub = SubCfg {
            enter: Some(control),
            breaks: std::mem::take(&mut body.breaks),
            continues: std::mem::take(&mut body.continues),
            ..SubCfg::default()
        };
        match body.enter {
            Some(enter) => {
                self.connect_control(control, enter, true);
                sub.exits = body.exits;
            }
            None => sub.exits.push(plain(control)),
        }
        sub
    }

    fn build_synchronized(&mut self, info: &StatementInfo) -> SubCfg {
        let Some(cond) = info.condition else {
            return self.build_sequence(&info.statements);
        };
        let control = self.control_node(cond);
        let mut body = self.build_sequence(&info.statements);

        let mut sub = SubCfg {
            enter: Some(control),
            breaks: std::mem::take(&mut body.breaks),
            continues: std::mem::take(&mut body.continues),
            ..SubCfg::default()
        };
        match body.enter {
            Some(enter) => {
                self.connect_control(control, enter, true);
                sub.exits = body.exits;
            }
            None => sub.exits.push(plain(control)),
        }
        sub
    }
}

/// Claim only jumps that carry exactly this label (for labeled non-loop
/// statements, which unlabeled breaks never target).
fn claim_jumps_labeled_only(jumps: Vec<Jump>, label: &str) -> (Vec<Jump>, Vec<Jump>) {
    jumps
        .into_iter()
        .partition(|j| j.label.as_deref() == Some(label))
}
