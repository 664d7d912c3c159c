// SPDX-License-Identifier: BSD-3-Clause
//! The fixed-point driver. Phase 1 pops functions off a LIFO worklist and
//! walks their instructions, recording statically-resolvable edges and
//! remembering indirect sites. Phase 2 revisits every indirect site and asks
//! the resolver again; new targets extend the graph and reseed the worklist.
//! The outer loop repeats until both phases pass without change, which
//! terminates because target counts and the edge set only grow.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::arc::UArc;
use crate::hierarchy::TypeHierarchy;
use crate::ir::{AbstractCallSite, Callee, FunctionName, InstructionName, Module};
use crate::resolver::Resolver;

use super::graph::CallGraph;
use super::is_virtual_call_site;

pub(crate) struct Builder<'m> {
    module: &'m Module,
    hierarchy: &'m TypeHierarchy,
    resolver: Box<dyn Resolver + 'm>,
    visited: HashSet<UArc<FunctionName>>,
    worklist: Vec<UArc<FunctionName>>,
    /// Indirect call sites and the number of targets seen so far, in
    /// discovery order. The fixed point is not reached while any count still
    /// grows.
    indirect_calls: Vec<(UArc<InstructionName>, usize)>,
    graph: CallGraph,
}

pub(crate) struct BuildOutput<'m> {
    pub graph: CallGraph,
    pub unresolved: Vec<UArc<InstructionName>>,
    pub resolver: Box<dyn Resolver + 'm>,
}

impl<'m> Builder<'m> {
    pub(crate) fn new(
        module: &'m Module,
        hierarchy: &'m TypeHierarchy,
        resolver: Box<dyn Resolver + 'm>,
        seeds: Vec<UArc<FunctionName>>,
    ) -> Self {
        Builder {
            module,
            hierarchy,
            resolver,
            visited: HashSet::with_capacity(module.functions.len()),
            worklist: seeds,
            indirect_calls: Vec::new(),
            graph: CallGraph::new(),
        }
    }

    pub(crate) fn build(mut self) -> BuildOutput<'m> {
        info!(
            resolver = self.resolver.name(),
            soundness = %self.resolver.soundness(),
            "starting call-graph construction"
        );

        loop {
            let mut fixpoint = true;
            while let Some(f) = self.worklist.pop() {
                fixpoint &= self.process_function(&f);
            }
            // Cannot walk only the delta here: the resolver may be mutating
            // points-to information under our feet, so every indirect site
            // has to be revisited.
            for idx in 0..self.indirect_calls.len() {
                fixpoint &= !self.construct_dynamic_call(idx);
            }
            if fixpoint {
                break;
            }
        }

        let mut unresolved = Vec::new();
        for (site, targets) in &self.indirect_calls {
            if *targets == 0 {
                warn!(site = %site, "no callees found for call site");
                unresolved.push(site.clone());
            }
        }
        info!(
            vertices = self.graph.vertex_count(),
            edges = self.graph.edge_count(),
            "call graph constructed"
        );

        BuildOutput {
            graph: self.graph,
            unresolved,
            resolver: self.resolver,
        }
    }

    /// Returns whether this walk left the graph unchanged.
    fn process_function(&mut self, f: &UArc<FunctionName>) -> bool {
        debug!(function = %f, "walking function");
        if self.module.is_declaration(f) || !self.visited.insert(f.clone()) {
            debug!(function = %f, "function already visited or only declaration");
            return true;
        }
        let vertex = self.graph.ensure_vertex(f);

        let func = self
            .module
            .functions
            .get(f)
            .unwrap_or_else(|| panic!("internal invariant violated: no body for {}", f));

        let mut fixpoint = true;
        for block in &func.blocks {
            for inst in &block.instrs {
                match AbstractCallSite::from_instruction(inst) {
                    Some(call) => fixpoint &= self.process_call_site(vertex, call),
                    None => self.resolver.other_inst(inst),
                }
            }
            if let Some(call) = AbstractCallSite::from_terminator(&block.terminator) {
                fixpoint &= self.process_call_site(vertex, call);
            }
        }
        fixpoint
    }

    /// Phase-1 handling of one call site. Returns whether the site is done
    /// (statically resolved or skipped); indirect sites report `false` so
    /// the outer loop runs Phase 2.
    fn process_call_site(&mut self, vertex: petgraph::graph::NodeIndex, call: AbstractCallSite) -> bool {
        self.resolver.pre_call(&call);

        let targets = self.resolver.resolve_direct(&call);
        if targets.is_empty() {
            match &call.callee {
                // No callee to link for inline assembly.
                Callee::Asm => {
                    debug!(site = %call.site, "skipping inline-asm call site");
                    return true;
                }
                Callee::Operand(_) => {
                    debug!(site = %call.site, "found dynamic call site");
                    if !self.indirect_calls.iter().any(|(s, _)| s == &call.site) {
                        self.indirect_calls.push((call.site.clone(), 0));
                    }
                    return false;
                }
            }
        }

        debug!(site = %call.site, targets = targets.len(), "found static call site");
        self.resolver.handle_possible_targets(&call, &targets);
        for target in &targets {
            let target_vertex = self.graph.ensure_vertex(target);
            self.graph
                .add_call_edge(vertex, target_vertex, call.site.clone());
            self.worklist.push(target.clone());
        }
        self.resolver.post_call(&call);
        true
    }

    /// Phase-2 handling of one indirect site. Returns whether new targets
    /// were found.
    fn construct_dynamic_call(&mut self, idx: usize) -> bool {
        let (site, seen) = self.indirect_calls[idx].clone();

        let Some(vertex) = self.graph.vertex(site.function()) else {
            panic!(
                "internal invariant violated: no vertex for calling function {} at call site {}",
                site.function(),
                site
            );
        };
        let Some(call) = self.module.call_site_at(&site) else {
            panic!("internal invariant violated: indirect site {} is not a call", site);
        };

        self.resolver.pre_call(&call);
        debug!(site = %site, "looking into dynamic call site");

        let targets = if is_virtual_call_site(self.module, self.hierarchy, &call) {
            self.resolver.resolve_virtual_call(&call)
        } else {
            self.resolver.resolve_function_pointer(&call)
        };

        if targets.len() <= seen {
            return false;
        }
        debug!(site = %site, new = targets.len() - seen, "found new possible targets");
        self.indirect_calls[idx].1 = targets.len();

        // Throw out already recorded targets.
        let mut delta = targets;
        for known in self.graph.targets_recorded_at(vertex, &site) {
            delta.remove(&known);
        }
        self.resolver.handle_possible_targets(&call, &delta);
        for target in &delta {
            let target_vertex = self.graph.ensure_vertex(target);
            self.graph
                .add_call_edge(vertex, target_vertex, site.clone());
            self.worklist.push(target.clone());
        }
        self.resolver.post_call(&call);
        true
    }
}
