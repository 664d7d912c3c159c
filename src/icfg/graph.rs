// SPDX-License-Identifier: BSD-3-Clause
use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::arc::UArc;
use crate::ir::{FunctionName, InstructionName};

/// The call multigraph: vertices are functions, edges are (caller, callee)
/// pairs labeled with the call-site instruction. Parallel edges are kept --
/// one site resolving to several targets, or several sites reaching the same
/// target, each get their own edge. Vertex lookup by function identity is
/// O(1) through the side index.
#[derive(Debug, Default)]
pub struct CallGraph {
    graph: DiGraph<UArc<FunctionName>, UArc<InstructionName>>,
    vertex_index: HashMap<UArc<FunctionName>, NodeIndex>,
}

impl CallGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The vertex for `f`, adding it on first occurrence.
    pub(crate) fn ensure_vertex(&mut self, f: &UArc<FunctionName>) -> NodeIndex {
        if let Some(&idx) = self.vertex_index.get(f) {
            return idx;
        }
        let idx = self.graph.add_node(f.clone());
        self.vertex_index.insert(f.clone(), idx);
        idx
    }

    pub fn vertex(&self, f: &UArc<FunctionName>) -> Option<NodeIndex> {
        self.vertex_index.get(f).copied()
    }

    pub(crate) fn add_call_edge(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        site: UArc<InstructionName>,
    ) {
        self.graph.add_edge(from, to, site);
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn function_at(&self, idx: NodeIndex) -> &UArc<FunctionName> {
        &self.graph[idx]
    }

    pub fn functions(&self) -> impl Iterator<Item = &UArc<FunctionName>> {
        self.graph.node_weights()
    }

    pub fn vertices(&self) -> impl Iterator<Item = (NodeIndex, &UArc<FunctionName>)> {
        self.graph.node_indices().map(|i| (i, &self.graph[i]))
    }

    /// Out-edges of a vertex in insertion order.
    pub fn out_edges(&self, idx: NodeIndex) -> Vec<(NodeIndex, UArc<InstructionName>)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), e.weight().clone()))
            .collect();
        // petgraph iterates most-recently-added first.
        edges.reverse();
        edges
    }

    /// Targets already recorded on an edge for this particular call site.
    pub fn targets_recorded_at(
        &self,
        from: NodeIndex,
        site: &UArc<InstructionName>,
    ) -> Vec<UArc<FunctionName>> {
        self.graph
            .edges_directed(from, Direction::Outgoing)
            .filter(|e| e.weight() == site)
            .map(|e| self.graph[e.target()].clone())
            .collect()
    }

    /// The functions a given call site was resolved to.
    pub fn callees_of(&self, site: &UArc<InstructionName>) -> Vec<UArc<FunctionName>> {
        match self.vertex(site.function()) {
            Some(from) => {
                let mut callees = self.targets_recorded_at(from, site);
                callees.reverse();
                callees
            }
            None => Vec::new(),
        }
    }

    /// The call sites that may reach `f`.
    pub fn callers_of(&self, f: &UArc<FunctionName>) -> Vec<UArc<InstructionName>> {
        match self.vertex(f) {
            Some(to) => {
                let mut callers: Vec<_> = self
                    .graph
                    .edges_directed(to, Direction::Incoming)
                    .map(|e| e.weight().clone())
                    .collect();
                callers.reverse();
                callers
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_edges_are_kept() {
        let mut g = CallGraph::new();
        let caller = UArc::new(FunctionName::from("caller"));
        let callee = UArc::new(FunctionName::from("callee"));
        let block = UArc::new(crate::ir::BlockName::new(caller.clone(), "entry"));
        let s0 = UArc::new(InstructionName::new(caller.clone(), block.clone(), 0));
        let s1 = UArc::new(InstructionName::new(caller.clone(), block, 1));

        let u = g.ensure_vertex(&caller);
        let v = g.ensure_vertex(&callee);
        assert_eq!(g.ensure_vertex(&caller), u);
        g.add_call_edge(u, v, s0.clone());
        g.add_call_edge(u, v, s1.clone());

        assert_eq!(g.vertex_count(), 2);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.callees_of(&s0), vec![callee.clone()]);
        assert_eq!(g.callers_of(&callee), vec![s0, s1]);
    }
}
