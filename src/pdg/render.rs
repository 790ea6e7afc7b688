//! PDG output formats (DOT, JSON).

use serde_json::json;

use crate::pdg::types::Pdg;
use crate::pe::types::PeStore;

fn escape(text: &str) -> String {
    text.replace('"', "\\\"").replace('\n', "\\n")
}

/// Render a PDG as a GraphViz digraph.
///
/// Control-like nodes (the method enter and predicates) draw as diamonds;
/// the enter node fills aquamarine, exits deeppink. Edge labels are the
/// dependence strings: branch values, variable names, or empty for
/// execution edges.
pub fn to_dot(pdg: &Pdg, store: &PeStore) -> String {
    let mut out = String::from("digraph PDG {\n");

    for node in pdg.nodes() {
        let label = escape(store.text(node.pe));
        out.push_str(&format!(
            "{} [style = filled, label = \"{label}\"",
            node.id.0
        ));
        if node.id == pdg.enter {
            out.push_str(", fillcolor = aquamarine");
        } else if pdg.exits.contains(&node.id) {
            out.push_str(", fillcolor = deeppink");
        } else {
            out.push_str(", fillcolor = white");
        }
        if node.kind.is_control() {
            out.push_str(", shape = diamond");
        } else {
            out.push_str(", shape = ellipse");
        }
        out.push_str("];\n");
    }

    for edge in pdg.all_edges() {
        out.push_str(&format!(
            "{} -> {} [style = solid, label=\"{}\"];\n",
            edge.from.0,
            edge.to.0,
            edge.dependence_string()
        ));
    }
    out.push_str("}\n");
    out
}

/// Render a PDG as JSON (nodes with kinds and spans, edges with labels).
pub fn to_json(pdg: &Pdg, store: &PeStore) -> serde_json::Value {
    let nodes: Vec<serde_json::Value> = pdg
        .nodes()
        .map(|node| {
            let element = store.get(node.pe);
            json!({
                "id": node.id.0,
                "kind": format!("{:?}", node.kind),
                "text": element.text,
                "start_line": element.start_line,
                "end_line": element.end_line,
                "is_enter": node.id == pdg.enter,
                "is_exit": pdg.exits.contains(&node.id),
            })
        })
        .collect();
    let edges: Vec<serde_json::Value> = pdg
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
