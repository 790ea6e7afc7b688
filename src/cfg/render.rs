//! CFG output formats (DOT, JSON).

use serde_json::json;

use crate::cfg::types::{Cfg, CfgNodeId, CfgNodeKind};
use crate::pe::types::PeStore;

fn escape(text: &str) -> String {
    text.replace('"', "\\\"").replace('\n', "\\n")
}

/// Render a CFG as a GraphViz digraph.
///
/// Node labels are the element texts; predicates draw as diamonds, the
/// enter node fills aquamarine, exits deeppink.
pub fn to_dot(cfg: &Cfg, store: &PeStore) -> String {
    let mut out = String::from("digraph CFG {\n");

    let mut ids: Vec<CfgNodeId> = cfg.nodes.iter().copied().collect();
    if !cfg.nodes.contains(&cfg.enter) {
        ids.insert(0, cfg.enter);
    }

    for (index, id) in ids.iter().enumerate() {
        let node = cfg.node(*id);
        let label = node
            .pe
            .map(|pe| escape(store.text(pe)))
            .unwrap_or_default();
        out.push_str(&format!("{index} [style = filled, label = \"{label}\""));
        if *id == cfg.enter {
            out.push_str(", fillcolor = aquamarine");
        } else if cfg.exits.contains(id) {
            out.push_str(", fillcolor = deeppink");
        } else {
            out.push_str(", fillcolor = white");
        }
        if node.kind == CfgNodeKind::Control {
            out.push_str(", shape = diamond");
        } else {
            out.push_str(", shape = ellipse");
        }
        out.push_str("];\n");
    }

    let position = |id: CfgNodeId| ids.iter().position(|i| *i == id);
    for edge in cfg.all_edges() {
        let (Some(from), Some(to)) = (position(edge.from), position(edge.to)) else {
            continue;
        };
        out.push_str(&format!(
            "{from} -> {to} [style = solid, label=\"{}\"];\n",
            edge.dependence_string()
        ));
    }
    out.push_str("}\n");
    out
}

/// Render a CFG as JSON (nodes with kinds and spans, edges with labels).
pub fn to_json(cfg: &Cfg, store: &PeStore) -> serde_json::Value {
    let nodes: Vec<serde_json::Value> = {
        let mut ids: Vec<CfgNodeId> = cfg.nodes.iter().copied().collect();
        if !cfg.nodes.contains(&cfg.enter) {
            ids.insert(0, cfg.enter);
        }
        ids.iter()
            .map(|id| {
                let node = cfg.node(*id);
                let (text, start, end) = node
                    .pe
                    .map(|pe| {
                        let e = store.get(pe);
                        (e.text.clone(), e.start_line, e.end_line)
                    })
                    .unwrap_or_default();
                json!({
                    "id": id.0,
                    "kind": format!("{:?}", node.kind),
                    "text": text,
                    "start_line": start,
                    "end_line": end,
                    "is_enter": *id == cfg.enter,
                    "is_exit": cfg.exits.contains(id),
                })
            })
            .collect()
    };
    let edges: Vec<serde_json::Value> = cfg
        .all_edges()
        .iter()
        .map(|e| {
            json!({
                "from": e.from.0,
                "to": e.to.0,
                "type": e.dependence_type(),
                "label": e.dependence_string(),
            })
        })
        .collect();
    json!({ "nodes": nodes, "edges": edges })
}
