// SPDX-License-Identifier: BSD-3-Clause
//! Interprocedural control-flow graph: configuration, the fixed-point
//! construction entry point, and the read-only query surface exposed to
//! dataflow analyses afterwards.

use tracing::warn;

use crate::arc::UArc;
use crate::hierarchy::{self, TypeHierarchy};
use crate::ir::{
    AbstractCallSite, FunctionName, InstructionName, InstructionRef, Module, TerminatorOpcode,
};
use crate::pointer::PointsToGraph;
use crate::resolver::{self, ResolverKind, Soundness};

mod builder;
mod export;
mod globals;
mod graph;

pub use globals::{GLOBAL_FINI_MODEL, GLOBAL_INIT_MODEL};
pub use graph::CallGraph;

use builder::Builder;

/// Entry-point sentinel: analyze every defined function.
pub const ALL_ENTRY_POINTS: &str = "__ALL__";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no entry point resolves to a defined function")]
    NoEntryPoints,
    #[error("include-globals requires exactly one module, got {0}")]
    GlobalsRequireSingleModule(usize),
}

#[derive(Clone, Debug)]
pub struct IcfgConfig {
    /// Entry-point function names, or the [`ALL_ENTRY_POINTS`] sentinel.
    pub entry_points: Vec<String>,
    pub resolver: ResolverKind,
    pub soundness: Soundness,
    /// Seed the analysis with the synthetic global ctor/dtor model instead
    /// of the raw entry points.
    pub include_globals: bool,
    /// Top-level key of the JSON export.
    pub json_id: String,
}

impl Default for IcfgConfig {
    fn default() -> Self {
        IcfgConfig {
            entry_points: vec!["main".to_string()],
            resolver: ResolverKind::Otf,
            soundness: Soundness::default(),
            include_globals: false,
            json_id: "CallGraph".to_string(),
        }
    }
}

/// Reject configurations the whole-program assumption cannot support.
pub fn check_whole_program(n_modules: usize, config: &IcfgConfig) -> Result<(), ConfigError> {
    if config.include_globals && n_modules != 1 {
        return Err(ConfigError::GlobalsRequireSingleModule(n_modules));
    }
    Ok(())
}

/// A call site is virtual iff it has a receiver of a known vtable-carrying
/// type and reads its callee out of the vtable at a recoverable slot.
pub(crate) fn is_virtual_call_site(
    module: &Module,
    hierarchy: &TypeHierarchy,
    call: &AbstractCallSite,
) -> bool {
    let Some(receiver_ty) = hierarchy::receiver_struct_type(call) else {
        return false;
    };
    if !hierarchy.has_type(&receiver_ty) || !hierarchy.has_vtable(&receiver_ty) {
        return false;
    }
    let Some(caller) = module.function_of(&call.site) else {
        return false;
    };
    hierarchy::vft_index(caller, call).is_some()
}

/// The constructed ICFG. Owns the module, the type hierarchy, the call
/// graph, and (for the on-the-fly resolver) the points-to information that
/// was accumulated during construction; all of it is read-only from here on.
#[derive(Debug)]
pub struct Icfg {
    module: Module,
    hierarchy: TypeHierarchy,
    graph: CallGraph,
    points_to: Option<PointsToGraph>,
    unresolved: Vec<UArc<InstructionName>>,
    json_id: String,
}

impl Icfg {
    pub fn new(
        mut module: Module,
        hierarchy: TypeHierarchy,
        config: &IcfgConfig,
    ) -> Result<Self, ConfigError> {
        let user_entries = init_entry_points(&module, &config.entry_points);
        if user_entries.is_empty() {
            return Err(ConfigError::NoEntryPoints);
        }

        let seeds = if config.include_globals {
            vec![globals::synthesize_global_model(&mut module, &user_entries)]
        } else {
            user_entries
        };

        let (graph, unresolved, points_to) = {
            let resolver =
                resolver::create(config.resolver, &module, &hierarchy, config.soundness);
            let out = Builder::new(&module, &hierarchy, resolver, seeds).build();
            let mut resolver = out.resolver;
            (out.graph, out.unresolved, resolver.take_points_to())
        };

        Ok(Icfg {
            module,
            hierarchy,
            graph,
            points_to,
            unresolved,
            json_id: config.json_id.clone(),
        })
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    pub fn graph(&self) -> &CallGraph {
        &self.graph
    }

    /// Points-to information accumulated by the on-the-fly resolver, if that
    /// resolver was used.
    pub fn points_to(&self) -> Option<&PointsToGraph> {
        self.points_to.as_ref()
    }

    /// Indirect sites that finished construction with zero targets.
    pub fn unresolved_call_sites(&self) -> &[UArc<InstructionName>] {
        &self.unresolved
    }

    /// Every function that made it into the graph.
    pub fn all_functions(&self) -> Vec<UArc<FunctionName>> {
        self.graph.functions().cloned().collect()
    }

    pub fn callees_of_call_at(&self, site: &UArc<InstructionName>) -> Vec<UArc<FunctionName>> {
        self.graph.callees_of(site)
    }

    pub fn callers_of(&self, f: &UArc<FunctionName>) -> Vec<UArc<InstructionName>> {
        self.graph.callers_of(f)
    }

    /// Every call site textually inside `f`, in program order. Walks the
    /// body, not the graph.
    pub fn calls_from_within(&self, f: &UArc<FunctionName>) -> Vec<UArc<InstructionName>> {
        let Some(func) = self.module.functions.get(f) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for block in &func.blocks {
            for inst in &block.instrs {
                if inst.is_call() {
                    out.push(inst.name.clone());
                }
            }
            if matches!(block.terminator.opcode(), TerminatorOpcode::Invoke(_)) {
                out.push(block.terminator.name.clone());
            }
        }
        out
    }

    /// Intraprocedural successors of a call site: the next instruction (or
    /// the block terminator), or for an invoke the first instruction of its
    /// normal and unwind destinations.
    pub fn return_sites_of_call_at(
        &self,
        site: &UArc<InstructionName>,
    ) -> Vec<UArc<InstructionName>> {
        let Some(func) = self.module.function_of(site) else {
            return Vec::new();
        };
        match func.instruction(site) {
            Some(InstructionRef::Instruction(_)) => {
                let Some(block) = func.block(site.block()) else {
                    return Vec::new();
                };
                let next = site.index() + 1;
                match block.instrs.get(next) {
                    Some(inst) => vec![inst.name.clone()],
                    None => vec![block.terminator.name.clone()],
                }
            }
            Some(InstructionRef::Terminator(t)) => match t.opcode() {
                TerminatorOpcode::Invoke(iv) => [&iv.return_label, &iv.unwind_label]
                    .iter()
                    .filter_map(|label| func.block_by_label(label))
                    .map(|b| match b.instrs.first() {
                        Some(inst) => inst.name.clone(),
                        None => b.terminator.name.clone(),
                    })
                    .collect(),
                _ => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    /// True iff the callee operand at `site` is not a concrete function.
    pub fn is_indirect_call(&self, site: &UArc<InstructionName>) -> bool {
        self.module
            .call_site_at(site)
            .map(|c| c.is_indirect())
            .unwrap_or(false)
    }

    pub fn is_virtual_call(&self, site: &UArc<InstructionName>) -> bool {
        self.module
            .call_site_at(site)
            .map(|c| is_virtual_call_site(&self.module, &self.hierarchy, &c))
            .unwrap_or(false)
    }

    pub fn to_dot(&self) -> String {
        export::dot(&self.graph, &self.module)
    }

    pub fn to_json(&self) -> serde_json::Value {
        export::json(&self.graph, &self.json_id)
    }

    /// The stable rendering used for DOT edge labels.
    pub fn call_site_label(&self, site: &UArc<InstructionName>) -> String {
        export::call_site_label(&self.module, site)
    }
}

/// Resolve entry-point names to defined functions. Unknown names are
/// warnings, not errors; the sentinel selects every defined function.
fn init_entry_points(module: &Module, entry_points: &[String]) -> Vec<UArc<FunctionName>> {
    if entry_points.len() == 1 && entry_points[0] == ALL_ENTRY_POINTS {
        return module.defined_function_names();
    }
    let mut entries = Vec::with_capacity(entry_points.len());
    for name in entry_points {
        match module.definition_named(name) {
            Some(f) => entries.push(f),
            None => {
                warn!(entry = %name, "could not retrieve function for entry point");
            }
        }
    }
    entries
}
