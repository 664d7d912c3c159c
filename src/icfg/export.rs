// SPDX-License-Identifier: BSD-3-Clause
use std::fmt::Write;

use crate::arc::UArc;
use crate::ir::{InstructionName, InstructionRef, Module};

use super::graph::CallGraph;

/// DOT rendering: one node per vertex labeled with the function's escaped
/// name, one edge per graph edge labeled with the call site.
pub(crate) fn dot(graph: &CallGraph, module: &Module) -> String {
    let mut out = String::from("digraph CallGraph{\n");
    for (idx, name) in graph.vertices() {
        writeln!(out, "  {}[label=\"{}\"];", idx.index(), escaped(name.get())).unwrap();
        for (target, site) in graph.out_edges(idx) {
            writeln!(
                out,
                "  {}->{}[label=\"{}\"];",
                idx.index(),
                target.index(),
                escaped(&call_site_label(module, &site))
            )
            .unwrap();
        }
    }
    out.push_str("}\n");
    out
}

/// JSON rendering: `{ <id>: { caller: [callee, ...] } }`, duplicates kept
/// for parallel edges.
pub(crate) fn json(graph: &CallGraph, json_id: &str) -> serde_json::Value {
    let mut callers = serde_json::Map::new();
    for (idx, name) in graph.vertices() {
        let callees: Vec<serde_json::Value> = graph
            .out_edges(idx)
            .into_iter()
            .map(|(target, _)| {
                serde_json::Value::String(graph.function_at(target).get().to_string())
            })
            .collect();
        callers.insert(name.get().to_string(), serde_json::Value::Array(callees));
    }
    let mut root = serde_json::Map::new();
    root.insert(json_id.to_string(), serde_json::Value::Object(callers));
    serde_json::Value::Object(root)
}

/// A stable string rendering of a call site, usable as an edge label.
pub(crate) fn call_site_label(module: &Module, site: &UArc<InstructionName>) -> String {
    match module.instruction(site) {
        Some(r @ InstructionRef::Instruction(_)) => match r.call_site() {
            Some(call) => format!("{}: call {}", site, call.callee),
            None => format!("{}", site),
        },
        Some(r @ InstructionRef::Terminator(_)) => match r.call_site() {
            Some(call) => format!("{}: invoke {}", site, call.callee),
            None => format!("{}", site),
        },
        None => format!("{}", site),
    }
}

fn escaped(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping() {
        assert_eq!(escaped("plain"), "plain");
        assert_eq!(escaped("a\"b"), "a\\\"b");
        assert_eq!(escaped("a\\b"), "a\\\\b");
    }
}
