//! CFG type definitions.
//!
//! Nodes live in an arena owned by the graph ([`CfgNodeFactory`]); edges
//! are stored directly in the arena slots as sorted forward/backward sets,
//! so iteration over nodes and incident edges is deterministic.

use std::collections::BTreeSet;

use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::pe::types::{PeId, PeKind, PeStore, StmtCategory};

/// Unique identifier of a CFG node within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CfgNodeId(pub u32);

impl CfgNodeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Role of a CFG node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CfgNodeKind {
    /// A predicate (condition of `if`/`while`/`for`/`do`/`switch`/
    /// `synchronized`/`catch`, or a synthetic loop predicate).
    Control,
    /// An ordinary executable statement.
    Statement,
    /// An ordinary executable expression.
    Expression,
    /// A `break` jump origin.
    Break,
    /// A `continue` jump origin.
    Continue,
    /// A `case`/`default` label inside a switch body.
    SwitchCase,
    /// Placeholder where no program element exists.
    Pseudo,
}

/// Kind of a CFG edge. The derived order (`Normal < Jump < Control`) gives
/// control edges the highest kind tag, so sorted edge sets iterate normal
/// edges first for a given endpoint pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CfgEdgeKind {
    Normal,
    Jump,
    /// Boolean branch label of a control edge.
    Control(bool),
}

/// A CFG edge, ordered by `(from, to, kind)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CfgEdge {
    pub from: CfgNodeId,
    pub to: CfgNodeId,
    pub kind: CfgEdgeKind,
}

impl CfgEdge {
    /// Label rendered on the edge: the branch value for control edges, a
    /// kind token for jumps, empty otherwise.
    pub fn dependence_string(&self) -> &'static str {
        match self.kind {
            CfgEdgeKind::Normal => "",
            CfgEdgeKind::Jump => "jump",
            CfgEdgeKind::Control(true) => "true",
            CfgEdgeKind::Control(false) => "false",
        }
    }

    pub fn dependence_type(&self) -> &'static str {
        match self.kind {
            CfgEdgeKind::Normal => "normal",
            CfgEdgeKind::Jump => "jump",
            CfgEdgeKind::Control(_) => "control",
        }
    }
}

/// One CFG node: its role, the program element it stands for (none for
/// pseudo nodes), and its incident edges.
#[derive(Debug, Clone, Serialize)]
pub struct CfgNode {
    pub id: CfgNodeId,
    pub kind: CfgNodeKind,
    pub pe: Option<PeId>,
    pub forward: BTreeSet<CfgEdge>,
    pub backward: BTreeSet<CfgEdge>,
}

/// Node arena with identity coalescing: for any program element at most
/// one node exists, whatever role was requested first. Requesting the
/// other role returns the cached node (callers must not rely on role
/// exclusivity). Pseudo nodes are unique per allocation and never cached.
#[derive(Debug, Default, Serialize)]
pub struct CfgNodeFactory {
    nodes: Vec<CfgNode>,
    #[serde(skip)]
    by_pe: FxHashMap<PeId, CfgNodeId>,
}

impl CfgNodeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, id: CfgNodeId) -> &CfgNode {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn node_mut(&mut self, id: CfgNodeId) -> &mut CfgNode {
        &mut self.nodes[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &CfgNode> {
        self.nodes.iter()
    }

    fn push(&mut self, kind: CfgNodeKind, pe: Option<PeId>) -> CfgNodeId {
        let id = CfgNodeId(self.nodes.len() as u32);
        self.nodes.push(CfgNode {
            id,
            kind,
            pe,
            forward: BTreeSet::new(),
            backward: BTreeSet::new(),
        });
        id
    }

    /// Make (or fetch) the node for an element in its normal role. A nil
    /// element yields a fresh pseudo node.
    pub fn make_normal_node(&mut self, store: &PeStore, pe: Option<PeId>) -> CfgNodeId {
        let Some(pe) = pe else {
            return self.push(CfgNodeKind::Pseudo, None);
        };
        if let Some(id) = self.by_pe.get(&pe) {
            return *id;
        }
        let kind = match &store.get(pe).kind {
            PeKind::Statement(s) => match s.category {
                StmtCategory::Break => CfgNodeKind::Break,
                StmtCategory::Continue => CfgNodeKind::Continue,
                StmtCategory::Case => CfgNodeKind::SwitchCase,
                _ => CfgNodeKind::Statement,
            },
            PeKind::Expression(_) => CfgNodeKind::Expression,
            _ => {
                debug_assert!(false, "normal CFG node over a non-executable element");
                CfgNodeKind::Statement
            }
        };
        let id = self.push(kind, Some(pe));
        self.by_pe.insert(pe, id);
        id
    }

    /// Make (or fetch) the node for a predicate element. A nil element
    /// yields a fresh pseudo node.
    pub fn make_control_node(&mut self, pe: Option<PeId>) -> CfgNodeId {
        let Some(pe) = pe else {
            return self.push(CfgNodeKind::Pseudo, None);
        };
        if let Some(id) = self.by_pe.get(&pe) {
            return *id;
        }
        let id = self.push(CfgNodeKind::Control, Some(pe));
        self.by_pe.insert(pe, id);
        id
    }

    /// Cached node for an element, without creating one.
    pub fn get_node(&self, pe: PeId) -> Option<CfgNodeId> {
        self.by_pe.get(&pe).copied()
    }

    /// Drop the element -> node mapping. Edges referencing the node are
    /// left in place; callers are responsible for consistency.
    pub fn remove_node(&mut self, pe: PeId) -> bool {
        self.by_pe.remove(&pe).is_some()
    }

    /// Insert an edge into both incident sorted sets.
    pub fn add_edge(&mut self, from: CfgNodeId, to: CfgNodeId, kind: CfgEdgeKind) {
        let edge = CfgEdge { from, to, kind };
        self.node_mut(from).forward.insert(edge);
        self.node_mut(to).backward.insert(edge);
    }
}

/// Control-flow graph of one method.
#[derive(Debug, Serialize)]
pub struct Cfg {
    /// The method element this graph was built from.
    pub core: PeId,
    pub enter: CfgNodeId,
    /// Nodes whose control flow leaves the method, sorted.
    pub exits: BTreeSet<CfgNodeId>,
    /// The closed node set of the graph (pseudo enter excluded).
    pub nodes: BTreeSet<CfgNodeId>,
    pub(crate) factory: CfgNodeFactory,
    #[serde(skip)]
    reachable: OnceCell<BTreeSet<CfgNodeId>>,
}

impl Cfg {
    pub(crate) fn new(
        core: PeId,
        enter: CfgNodeId,
        exits: BTreeSet<CfgNodeId>,
        nodes: BTreeSet<CfgNodeId>,
        factory: CfgNodeFactory,
    ) -> Self {
        Cfg {
            core,
            enter,
            exits,
            nodes,
            factory,
            reachable: OnceCell::new(),
        }
    }

    #[inline]
    pub fn node(&self, id: CfgNodeId) -> &CfgNode {
        self.factory.node(id)
    }

    pub fn factory(&self) -> &CfgNodeFactory {
        &self.factory
    }

    /// A method with no executable statements has only the pseudo enter.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Distinct forward successors of a node, in id order.
    pub fn forward_nodes(&self, id: CfgNodeId) -> BTreeSet<CfgNodeId> {
        self.node(id).forward.iter().map(|e| e.to).collect()
    }

    /// Distinct backward predecessors of a node, in id order.
    pub fn backward_nodes(&self, id: CfgNodeId) -> BTreeSet<CfgNodeId> {
        self.node(id).backward.iter().map(|e| e.from).collect()
    }

    /// All edges of the graph in canonical `(from, to, kind)` order.
    pub fn all_edges(&self) -> BTreeSet<CfgEdge> {
        let mut edges = BTreeSet::new();
        for id in &self.nodes {
            edges.extend(self.node(*id).forward.iter().copied());
            edges.extend(self.node(*id).backward.iter().copied());
        }
        edges
    }

    /// Nodes reachable from the enter node (inclusive), cached lazily.
    pub fn reachable_nodes(&self) -> &BTreeSet<CfgNodeId> {
        self.reachable.get_or_init(|| self.reachable_from(self.enter))
    }

    /// Closure of a node under forward edges (inclusive).
    pub fn reachable_from(&self, start: CfgNodeId) -> BTreeSet<CfgNodeId> {
        let mut seen = BTreeSet::new();
        let mut work = vec![start];
        while let Some(id) = work.pop() {
            if seen.insert(id) {
                work.extend(self.node(id).forward.iter().map(|e| e.to));
            }
        }
        seen
    }

    /// Optional trimming pass: splice out switch-case label nodes,
    /// connecting each predecessor directly to each successor.
    pub fn remove_switch_cases(&mut self) {
        let targets: Vec<CfgNodeId> = self
            .nodes
            .iter()
            .copied()
            .filter(|id| self.node(*id).kind == CfgNodeKind::SwitchCase)
            .collect();
        for id in targets {
            self.splice_out(id);
        }
    }

    /// Optional trimming pass: splice out break/continue jump nodes.
    pub fn remove_jump_statements(&mut self) {
        let targets: Vec<CfgNodeId> = self
            .nodes
            .iter()
            .copied()
            .filter(|id| {
                matches!(
                    self.node(*id).kind,
                    CfgNodeKind::Break | CfgNodeKind::Continue
                )
            })
            .collect();
        for id in targets {
            self.splice_out(id);
        }
    }

    fn splice_out(&mut self, id: CfgNodeId) {
        let preds: Vec<CfgEdge> = self.node(id).backward.iter().copied().collect();
        let succs: Vec<CfgEdge> = self.node(id).forward.iter().copied().collect();

        for p in &preds {
            self.factory.node_mut(p.from).forward.remove(p);
        }
        for s in &succs {
            self.factory.node_mut(s.to).backward.remove(s);
        }
        self.factory.node_mut(id).forward.clear();
        self.factory.node_mut(id).backward.clear();

        for p in &preds {
            for s in &succs {
                if p.from != id && s.to != id {
                    // The predecessor's edge kind survives the splice, so
                    // branch labels stay intact.
                    self.factory.add_edge(p.from, s.to, p.kind);
                }
            }
        }

        self.nodes.remove(&id);
        if self.exits.remove(&id) {
            for p in &preds {
                if p.from != id {
                    self.exits.insert(p.from);
                }
            }
        }
        if self.enter == id {
            if let Some(s) = succs.first() {
                self.enter = s.to;
            }
        }
        if let Some(pe) = self.node(id).pe {
            self.factory.remove_node(pe);
        }
        self.reachable = OnceCell::new();
    }
}
