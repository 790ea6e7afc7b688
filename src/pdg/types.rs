//! PDG type definitions.
//!
//! PDG nodes are a one-to-one overlay of the CFG nodes plus a synthetic
//! method-enter node and one parameter node per formal parameter. Three
//! edge kinds layer over them: control (branch-labeled), data (variable
//! labeled), and execution (unlabeled).

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::cfg::types::Cfg;
use crate::pe::types::{PeId, PeKind, PeStore};

/// Unique identifier of a PDG node within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PdgNodeId(pub u32);

impl PdgNodeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Role of a PDG node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PdgNodeKind {
    /// The synthetic method entry (distinct from the CFG enter).
    MethodEnter,
    /// A formal parameter.
    Parameter,
    /// A predicate node.
    Control,
    /// An ordinary statement node.
    Statement,
    /// An ordinary expression node.
    Expression,
}

impl PdgNodeKind {
    /// Control-like nodes drive control dependences.
    pub fn is_control(self) -> bool {
        matches!(self, PdgNodeKind::MethodEnter | PdgNodeKind::Control)
    }
}

/// Kind (and label) of a PDG edge. The derived order keeps the canonical
/// edge sort stable: control, then data by variable name, then execution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PdgEdgeKind {
    /// Control dependence with its branch value.
    Control(bool),
    /// Data dependence labeled with the variable name.
    Data(String),
    /// Execution dependence (unlabeled).
    Execution,
}

/// A PDG edge, ordered by `(from, to, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PdgEdge {
    pub from: PdgNodeId,
    pub to: PdgNodeId,
    pub kind: PdgEdgeKind,
}

impl PdgEdge {
    /// Label rendered on the edge: branch value, variable name, or empty.
    pub fn dependence_string(&self) -> String {
        match &self.kind {
            PdgEdgeKind::Control(true) => "true".to_string(),
            PdgEdgeKind::Control(false) => "false".to_string(),
            PdgEdgeKind::Data(variable) => variable.clone(),
            PdgEdgeKind::Execution => String::new(),
        }
    }

    pub fn dependence_type(&self) -> &'static str {
        match self.kind {
            PdgEdgeKind::Control(_) => "control",
            PdgEdgeKind::Data(_) => "data",
            PdgEdgeKind::Execution => "execution",
        }
    }
}

/// One PDG node with its incident sorted edge sets.
#[derive(Debug, Clone, Serialize)]
pub struct PdgNode {
    pub id: PdgNodeId,
    pub kind: PdgNodeKind,
    pub pe: PeId,
    pub forward: BTreeSet<PdgEdge>,
    pub backward: BTreeSet<PdgEdge>,
}

/// Node arena with the same element-keyed coalescing as the CFG factory:
/// at most one node per program element, whatever role was requested
/// first.
#[derive(Debug, Default, Serialize)]
pub struct PdgNodeFactory {
    nodes: Vec<PdgNode>,
    #[serde(skip)]
    by_pe: FxHashMap<PeId, PdgNodeId>,
}

impl PdgNodeFactory {
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
    pub fn node(&self, id: PdgNodeId) -> &PdgNode {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn node_mut(&mut self, id: PdgNodeId) -> &mut PdgNode {
        &mut self.nodes[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &PdgNode> {
        self.nodes.iter()
    }

    fn push(&mut self, kind: PdgNodeKind, pe: PeId) -> PdgNodeId {
        let id = PdgNodeId(self.nodes.len() as u32);
        self.nodes.push(PdgNode {
            id,
            kind,
            pe,
            forward: BTreeSet::new(),
            backward: BTreeSet::new(),
        });
        id
    }

    /// Make (or fetch) the node for an element in its normal role.
    /// Variable elements become parameter nodes.
    pub fn make_normal_node(&mut self, store: &PeStore, pe: PeId) -> PdgNodeId {
        if let Some(id) = self.by_pe.get(&pe) {
            return *id;
        }
        let kind = match &store.get(pe).kind {
            PeKind::Variable(_) => PdgNodeKind::Parameter,
            PeKind::Statement(_) => PdgNodeKind::Statement,
            _ => PdgNodeKind::Expression,
        };
        let id = self.push(kind, pe);
        self.by_pe.insert(pe, id);
        id
    }

    /// Make (or fetch) the node for a predicate element.
    pub fn make_control_node(&mut self, pe: PeId) -> PdgNodeId {
        if let Some(id) = self.by_pe.get(&pe) {
            return *id;
        }
        let id = self.push(PdgNodeKind::Control, pe);
        self.by_pe.insert(pe, id);
        id
    }

    /// Make (or fetch) the method-enter node over the synthetic enter
    /// expression.
    pub fn make_enter_node(&mut self, pe: PeId) -> PdgNodeId {
        if let Some(id) = self.by_pe.get(&pe) {
            return *id;
        }
        let id = self.push(PdgNodeKind::MethodEnter, pe);
        self.by_pe.insert(pe, id);
        id
    }

    /// Cached node for an element, without creating one.
    pub fn get_node(&self, pe: PeId) -> Option<PdgNodeId> {
        self.by_pe.get(&pe).copied()
    }

    /// Drop the element -> node mapping; incident edges are untouched.
    pub fn remove_node(&mut self, pe: PeId) -> bool {
        self.by_pe.remove(&pe).is_some()
    }

    /// Insert an edge into both incident sorted sets.
    pub fn add_edge(&mut self, from: PdgNodeId, to: PdgNodeId, kind: PdgEdgeKind) {
        let edge = PdgEdge { from, to, kind };
        self.node_mut(from).forward.insert(edge.clone());
        self.node_mut(to).backward.insert(edge);
    }
}

/// Configuration surface of PDG construction.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PdgOptions {
    /// Include control dependence edges.
    pub build_control_dependence: bool,
    /// Include data dependence edges.
    pub build_data_dependence: bool,
    /// Include execution dependence edges.
    pub build_execution_dependence: bool,
    /// Seed structural control edges from the enter node to every
    /// statement of the method body.
    pub control_dependence_from_enter_to_all_nodes: bool,
    /// Seed true-labeled control edges from the enter node to each
    /// parameter node.
    pub control_dependence_from_enter_to_parameter_nodes: bool,
    /// Stop the per-variable data walk at a node that redefines the
    /// variable.
    pub avoid_def_propagation: bool,
}

impl Default for PdgOptions {
    fn default() -> Self {
        PdgOptions {
            build_control_dependence: true,
            build_data_dependence: true,
            build_execution_dependence: true,
            control_dependence_from_enter_to_all_nodes: false,
            control_dependence_from_enter_to_parameter_nodes: false,
            avoid_def_propagation: true,
        }
    }
}

/// Program dependence graph of one method. Owns its node overlay and the
/// CFG it was layered over.
#[derive(Debug, Serialize)]
pub struct Pdg {
    /// The method element this graph was built from.
    pub method: PeId,
    /// The synthetic method-enter node.
    pub enter: PdgNodeId,
    /// PDG images of the CFG exit nodes, sorted.
    pub exits: BTreeSet<PdgNodeId>,
    /// Parameter nodes in declaration order.
    pub parameters: Vec<PdgNodeId>,
    /// The underlying control-flow graph.
    pub cfg: Cfg,
    pub(crate) factory: PdgNodeFactory,
}

impl Pdg {
    #[inline]
    pub fn node(&self, id: PdgNodeId) -> &PdgNode {
        self.factory.node(id)
    }

    pub fn factory(&self) -> &PdgNodeFactory {
        &self.factory
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &PdgNode> {
        self.factory.iter()
    }

    /// PDG node of a program element, if one was created.
    pub fn node_of(&self, pe: PeId) -> Option<PdgNodeId> {
        self.factory.get_node(pe)
    }

    /// All edges in canonical `(from, to, kind)` order.
    pub fn all_edges(&self) -> BTreeSet<PdgEdge> {
        let mut edges = BTreeSet::new();
        for node in self.factory.iter() {
            edges.extend(node.forward.iter().cloned());
            edges.extend(node.backward.iter().cloned());
        }
        edges
    }

    /// Distinct forward successors of a node, in id order.
    pub fn forward_nodes(&self, id: PdgNodeId) -> BTreeSet<PdgNodeId> {
        self.node(id).forward.iter().map(|e| e.to).collect()
    }

    /// Distinct backward predecessors of a node, in id order.
    pub fn backward_nodes(&self, id: PdgNodeId) -> BTreeSet<PdgNodeId> {
        self.node(id).backward.iter().map(|e| e.from).collect()
    }
}
