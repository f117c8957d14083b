//! Graphviz rendering of an operator graph.
//!
//! Nodes are labelled with the operator kind; operators whose own positions
//! are tracked by descendants are drawn dashed. Edges carry the parent index
//! and the context mappings `parent index/own index`. Dotted edges link join,
//! sort and group operators to the streams they key on. When counts are given,
//! each label also shows `# = n` outputs.

use crate::operator::{OperatorGraph, OperatorKind};
use crate::operator_id::OperatorId;
use indexmap::IndexMap;
use std::io::{Result, Write};

fn label(graph: &OperatorGraph, id: OperatorId) -> String {
    let node = graph.node(id);
    match &node.kind {
        OperatorKind::Task { factory, .. } => factory.id().to_string(),
        OperatorKind::OrderBy { order } => match node.keys.first() {
            Some(keys) => format!(
                "OrderBy ({})",
                keys.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            ),
            None => format!("OrderBy ({} contexts)", order.size()),
        },
        OperatorKind::Function { pointer } => format!("Function {pointer}"),
        kind => kind.name().to_string(),
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Write the graph reachable from `root` as a DOT digraph.
///
/// # Errors
///
/// Any I/O error from `out`.
pub fn write_dot(
    graph: &OperatorGraph,
    root: OperatorId,
    counts: Option<&IndexMap<OperatorId, usize>>,
    out: &mut impl Write,
) -> Result<()> {
    writeln!(out, "digraph G {{")?;
    for id in graph.reachable(root) {
        let node = graph.node(id);
        let mut text = format!("{} [{id}]", label(graph, id));
        let mut attributes = String::new();
        if node.tracks_self() {
            attributes.push_str(", style=\"dashed\"");
        }
        if let Some(count) = counts.and_then(|c| c.get(&id)) {
            text.push_str(&format!("\\n# = {count}"));
            attributes.push_str(", peripheries=2");
        }
        writeln!(
            out,
            "p{} [label=\"{}\"{attributes}];",
            id.raw(),
            escape(&text)
        )?;

        for (stream, parent) in node.parents.iter().enumerate() {
            let mut mappings: Vec<String> = Vec::new();
            for (index, sources) in node.layout.iter().enumerate() {
                for source in sources.iter().filter(|s| s.stream == stream) {
                    mappings.push(format!("{}/{index}", source.index));
                }
            }
            let edge_label = if mappings.is_empty() {
                stream.to_string()
            } else {
                format!("{stream};{}", mappings.join(","))
            };
            writeln!(
                out,
                "p{} -> p{} [label=\"{edge_label}\"];",
                parent.raw(),
                id.raw()
            )?;
        }

        for keyed in node.kind.requires() {
            writeln!(
                out,
                "p{} -> p{} [style=\"dotted\", weight=0];",
                keyed.raw(),
                id.raw()
            )?;
        }
    }
    writeln!(out, "}}")?;
    Ok(())
}
