// SPDX-License-Identifier: BSD-3-Clause
//! Call resolution strategies.
//!
//! The ICFG builder is parametric over a [`Resolver`]: given a call site it
//! cannot resolve statically, the resolver enumerates candidate targets.
//! Lifecycle hooks (`pre_call`, `post_call`, `other_inst`,
//! `handle_possible_targets`) let stateful variants update their internal
//! type or points-to information as the builder walks the program; the
//! on-the-fly variant exploits this to produce additional targets on a later
//! visit, which is what forces the builder's outer fixed-point loop.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;

use tracing::debug;

use crate::arc::{Arc, UArc};
use crate::hierarchy::{self, TypeHierarchy};
use crate::ir::instruction::{Instruction, Opcode};
use crate::ir::{AbstractCallSite, FunctionName, Module, Operand};
use crate::pointer::{AbstractObject, PointsToGraph, PointsToInfo};

pub type FunctionSet = BTreeSet<UArc<FunctionName>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolverKind {
    NoResolve,
    Cha,
    Rta,
    Dta,
    Vta,
    Otf,
}

impl Display for ResolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResolverKind::NoResolve => "no-resolve",
            ResolverKind::Cha => "cha",
            ResolverKind::Rta => "rta",
            ResolverKind::Dta => "dta",
            ResolverKind::Vta => "vta",
            ResolverKind::Otf => "otf",
        };
        write!(f, "{}", s)
    }
}

/// How much unsoundness the caller tolerates. The core forwards this to the
/// resolver as a hint; no variant currently weakens its answer based on it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Soundness {
    Sound,
    #[default]
    Soundy,
    Unsound,
}

impl Display for Soundness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Soundness::Sound => "sound",
            Soundness::Soundy => "soundy",
            Soundness::Unsound => "unsound",
        };
        write!(f, "{}", s)
    }
}

pub trait Resolver {
    fn name(&self) -> &'static str;

    fn soundness(&self) -> Soundness;

    fn module(&self) -> &Module;

    /// Called before a call site is handled.
    fn pre_call(&mut self, _call: &AbstractCallSite) {}

    /// Called after a call site is handled.
    fn post_call(&mut self, _call: &AbstractCallSite) {}

    /// Called on every non-call instruction in walked functions.
    fn other_inst(&mut self, _inst: &Instruction) {}

    /// Called with the (delta of) targets just recorded for a call site.
    fn handle_possible_targets(&mut self, _call: &AbstractCallSite, _targets: &FunctionSet) {}

    /// Targets derivable without pointer or type reasoning: a direct callee,
    /// or a pointer cast of a named, defined function.
    fn resolve_direct(&self, call: &AbstractCallSite) -> FunctionSet {
        let mut out = FunctionSet::new();
        if let Some(f) = &call.static_callee {
            out.insert(f.clone());
        } else if let Some(op) = call.callee_operand() {
            for f in op.stripped_functions() {
                if !self.module().is_declaration(&f) {
                    out.insert(f);
                }
            }
        }
        out
    }

    /// Targets of a virtual dispatch site.
    fn resolve_virtual_call(&mut self, call: &AbstractCallSite) -> FunctionSet;

    /// Targets of a non-virtual indirect call.
    fn resolve_function_pointer(&mut self, call: &AbstractCallSite) -> FunctionSet;

    /// Release the points-to state this resolver accumulated, if any. The
    /// ICFG exposes it read-only after construction.
    fn take_points_to(&mut self) -> Option<PointsToGraph> {
        None
    }
}

pub fn create<'m>(
    kind: ResolverKind,
    module: &'m Module,
    hierarchy: &'m TypeHierarchy,
    soundness: Soundness,
) -> Box<dyn Resolver + 'm> {
    match kind {
        ResolverKind::NoResolve => Box::new(NoResolve { module, soundness }),
        ResolverKind::Cha => Box::new(Cha {
            module,
            hierarchy,
            soundness,
        }),
        ResolverKind::Rta => Box::new(Rta::new(module, hierarchy, soundness)),
        ResolverKind::Dta => Box::new(Dta::new(module, hierarchy, soundness)),
        ResolverKind::Vta => Box::new(Vta::new(module, hierarchy, soundness)),
        ResolverKind::Otf => Box::new(Otf::new(module, hierarchy, soundness)),
    }
}

/// Every defined function an indirect call with `nargs` actuals could reach:
/// calling with surplus arguments is tolerated in practice, so the filter is
/// `nargs >= |formals|` rather than exact arity.
fn arity_compatible_targets(module: &Module, nargs: usize) -> FunctionSet {
    module
        .functions
        .iter()
        .filter(|(_, f)| nargs >= f.parameters.len())
        .map(|(name, _)| name.clone())
        .collect()
}

/// Receiver type and vtable slot of a virtual site, when both are known.
fn dispatch_site(module: &Module, call: &AbstractCallSite) -> Option<(String, usize)> {
    let caller = module.function_of(&call.site)?;
    let recv = hierarchy::receiver_struct_type(call)?;
    let slot = hierarchy::vft_index(caller, call)?;
    Some((recv, slot))
}

/// Class-hierarchy dispatch: the vtable entry at the call's slot for every
/// subtype of the receiver that passes `type_filter`.
fn dispatch_targets(
    module: &Module,
    th: &TypeHierarchy,
    call: &AbstractCallSite,
    type_filter: impl Fn(&str) -> bool,
) -> FunctionSet {
    let Some((recv, slot)) = dispatch_site(module, call) else {
        return FunctionSet::new();
    };
    th.subtypes_of(&recv)
        .iter()
        .filter(|t| type_filter(t))
        .filter_map(|t| th.vtable_entry(t, slot))
        .cloned()
        .collect()
}

/// Resolves nothing beyond what the builder already handles statically.
pub struct NoResolve<'m> {
    module: &'m Module,
    soundness: Soundness,
}

impl Resolver for NoResolve<'_> {
    fn name(&self) -> &'static str {
        "no-resolve"
    }

    fn soundness(&self) -> Soundness {
        self.soundness
    }

    fn module(&self) -> &Module {
        self.module
    }

    fn resolve_virtual_call(&mut self, _call: &AbstractCallSite) -> FunctionSet {
        FunctionSet::new()
    }

    fn resolve_function_pointer(&mut self, _call: &AbstractCallSite) -> FunctionSet {
        FunctionSet::new()
    }
}

/// Class-hierarchy analysis: every override in the receiver's subhierarchy.
pub struct Cha<'m> {
    module: &'m Module,
    hierarchy: &'m TypeHierarchy,
    soundness: Soundness,
}

impl Resolver for Cha<'_> {
    fn name(&self) -> &'static str {
        "cha"
    }

    fn soundness(&self) -> Soundness {
        self.soundness
    }

    fn module(&self) -> &Module {
        self.module
    }

    fn resolve_virtual_call(&mut self, call: &AbstractCallSite) -> FunctionSet {
        dispatch_targets(self.module, self.hierarchy, call, |_| true)
    }

    fn resolve_function_pointer(&mut self, call: &AbstractCallSite) -> FunctionSet {
        arity_compatible_targets(self.module, call.args.len())
    }
}

/// Rapid-type analysis: CHA restricted to types the program instantiates.
pub struct Rta<'m> {
    module: &'m Module,
    hierarchy: &'m TypeHierarchy,
    soundness: Soundness,
    instantiated: BTreeSet<String>,
}

impl<'m> Rta<'m> {
    fn new(module: &'m Module, hierarchy: &'m TypeHierarchy, soundness: Soundness) -> Self {
        let mut instantiated = BTreeSet::new();
        for f in module.functions.values() {
            for i in f.instructions() {
                match i.opcode() {
                    Opcode::Alloca(a) => {
                        if let Some(name) = a.allocated_type.struct_name() {
                            instantiated.insert(name.to_string());
                        }
                    }
                    // Heap allocations surface as casts of the raw allocation
                    // to the object type.
                    Opcode::BitCast(_) => {
                        if let Some(name) = i.ty.pointee_struct_name() {
                            instantiated.insert(name.to_string());
                        }
                    }
                    _ => (),
                }
            }
        }
        Rta {
            module,
            hierarchy,
            soundness,
            instantiated,
        }
    }
}

impl Resolver for Rta<'_> {
    fn name(&self) -> &'static str {
        "rta"
    }

    fn soundness(&self) -> Soundness {
        self.soundness
    }

    fn module(&self) -> &Module {
        self.module
    }

    fn resolve_virtual_call(&mut self, call: &AbstractCallSite) -> FunctionSet {
        dispatch_targets(self.module, self.hierarchy, call, |t| {
            self.instantiated.contains(t)
        })
    }

    fn resolve_function_pointer(&mut self, call: &AbstractCallSite) -> FunctionSet {
        arity_compatible_targets(self.module, call.args.len())
    }
}

/// Declared-type analysis: CHA restricted to types reachable from the
/// receiver's static type in a module-wide type-assignment graph (casts
/// between struct pointers, struct containment).
pub struct Dta<'m> {
    module: &'m Module,
    hierarchy: &'m TypeHierarchy,
    soundness: Soundness,
    type_flow: HashMap<String, BTreeSet<String>>,
}

impl<'m> Dta<'m> {
    fn new(module: &'m Module, hierarchy: &'m TypeHierarchy, soundness: Soundness) -> Self {
        let mut type_flow: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut link = |a: &str, b: &str| {
            if a != b {
                type_flow
                    .entry(a.to_string())
                    .or_default()
                    .insert(b.to_string());
                type_flow
                    .entry(b.to_string())
                    .or_default()
                    .insert(a.to_string());
            }
        };
        for f in module.functions.values() {
            for i in f.instructions() {
                if let Opcode::BitCast(b) = i.opcode() {
                    if let (Some(from), Some(to)) = (
                        b.pointer.ty.pointee_struct_name(),
                        i.ty.pointee_struct_name(),
                    ) {
                        link(from, to);
                    }
                }
            }
        }
        for (name, ty) in &module.struct_types {
            if let crate::ir::Type::Struct { fields, .. } = ty.as_ref() {
                for field in fields {
                    if let Some(inner) = field.struct_name() {
                        link(name, inner);
                    }
                }
            }
        }
        Dta {
            module,
            hierarchy,
            soundness,
            type_flow,
        }
    }

    fn reachable(&self, from: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut stack = vec![from.to_string()];
        while let Some(t) = stack.pop() {
            if !out.insert(t.clone()) {
                continue;
            }
            if let Some(next) = self.type_flow.get(&t) {
                stack.extend(next.iter().cloned());
            }
        }
        out
    }
}

impl Resolver for Dta<'_> {
    fn name(&self) -> &'static str {
        "dta"
    }

    fn soundness(&self) -> Soundness {
        self.soundness
    }

    fn module(&self) -> &Module {
        self.module
    }

    fn resolve_virtual_call(&mut self, call: &AbstractCallSite) -> FunctionSet {
        let Some((recv, _)) = dispatch_site(self.module, call) else {
            return FunctionSet::new();
        };
        let reach = self.reachable(&recv);
        dispatch_targets(self.module, self.hierarchy, call, |t| reach.contains(t))
    }

    fn resolve_function_pointer(&mut self, call: &AbstractCallSite) -> FunctionSet {
        arity_compatible_targets(self.module, call.args.len())
    }
}

/// Variable-type analysis: a per-value set of possible struct types,
/// grown on the fly as the builder walks instructions and binds arguments.
pub struct Vta<'m> {
    module: &'m Module,
    hierarchy: &'m TypeHierarchy,
    soundness: Soundness,
    var_types: HashMap<Arc<Operand>, BTreeSet<String>>,
}

impl<'m> Vta<'m> {
    fn new(module: &'m Module, hierarchy: &'m TypeHierarchy, soundness: Soundness) -> Self {
        Vta {
            module,
            hierarchy,
            soundness,
            var_types: HashMap::new(),
        }
    }

    fn types_of(&self, op: &Arc<Operand>) -> BTreeSet<String> {
        self.var_types.get(op).cloned().unwrap_or_default()
    }

    fn add_types(&mut self, op: &Arc<Operand>, tys: BTreeSet<String>) {
        if tys.is_empty() {
            return;
        }
        self.var_types.entry(op.clone()).or_default().extend(tys);
    }

    fn flow(&mut self, from: &Arc<Operand>, to: &Arc<Operand>) {
        let tys = self.types_of(from);
        self.add_types(to, tys);
    }
}

impl Resolver for Vta<'_> {
    fn name(&self) -> &'static str {
        "vta"
    }

    fn soundness(&self) -> Soundness {
        self.soundness
    }

    fn module(&self) -> &Module {
        self.module
    }

    fn other_inst(&mut self, inst: &Instruction) {
        match inst.opcode().clone() {
            Opcode::Alloca(a) => {
                if let Some(name) = a.allocated_type.struct_name() {
                    self.add_types(&inst.result, BTreeSet::from([name.to_string()]));
                }
            }
            Opcode::BitCast(b) => {
                self.flow(&b.pointer, &inst.result);
                if let Some(name) = inst.ty.pointee_struct_name() {
                    self.add_types(&inst.result, BTreeSet::from([name.to_string()]));
                }
            }
            Opcode::Phi(p) => {
                for v in &p.values {
                    self.flow(v, &inst.result);
                }
            }
            Opcode::Select(s) => {
                self.flow(&s.true_value, &inst.result);
                self.flow(&s.false_value, &inst.result);
            }
            Opcode::Load(l) => self.flow(&l.pointer, &inst.result),
            Opcode::Store(s) => self.flow(&s.value, &s.pointer),
            Opcode::Call(_) | Opcode::GetElementPtr(_) | Opcode::Other => (),
        }
    }

    fn handle_possible_targets(&mut self, call: &AbstractCallSite, targets: &FunctionSet) {
        for target in targets {
            let Some(f) = self.module.functions.get(target) else {
                continue;
            };
            let formals: Vec<_> = f.parameters.clone();
            for (idx, formal) in formals.iter().enumerate() {
                if let Some(actual) = call.args.get(idx) {
                    self.flow(actual, formal);
                }
            }
        }
    }

    fn resolve_virtual_call(&mut self, call: &AbstractCallSite) -> FunctionSet {
        let Some(receiver) = call.receiver() else {
            return FunctionSet::new();
        };
        let possible = self.types_of(receiver);
        dispatch_targets(self.module, self.hierarchy, call, |t| possible.contains(t))
    }

    fn resolve_function_pointer(&mut self, call: &AbstractCallSite) -> FunctionSet {
        arity_compatible_targets(self.module, call.args.len())
    }
}

/// On-the-fly resolution: feeds an inclusion-based points-to analysis while
/// the builder walks the program and resolves indirect sites by asking where
/// the callee operand may point. Argument binding in
/// `handle_possible_targets` mutates the oracle, so later visits may see
/// more targets; the builder's outer loop runs until that stops happening.
pub struct Otf<'m> {
    module: &'m Module,
    hierarchy: &'m TypeHierarchy,
    soundness: Soundness,
    points_to: PointsToGraph,
}

impl<'m> Otf<'m> {
    fn new(module: &'m Module, hierarchy: &'m TypeHierarchy, soundness: Soundness) -> Self {
        let mut points_to = PointsToGraph::new();
        points_to.seed_module(module);
        Otf {
            module,
            hierarchy,
            soundness,
            points_to,
        }
    }
}

impl Resolver for Otf<'_> {
    fn name(&self) -> &'static str {
        "otf"
    }

    fn soundness(&self) -> Soundness {
        self.soundness
    }

    fn module(&self) -> &Module {
        self.module
    }

    fn other_inst(&mut self, inst: &Instruction) {
        match inst.opcode().clone() {
            Opcode::Alloca(_) => {
                self.points_to.add_alloc(
                    inst.result.clone(),
                    AbstractObject::Stack(inst.name.clone()),
                );
            }
            Opcode::BitCast(b) => self.points_to.add_copy(inst.result.clone(), b.pointer),
            Opcode::GetElementPtr(g) => {
                // Field-insensitive: a GEP aliases its base.
                self.points_to.add_copy(inst.result.clone(), g.pointer);
            }
            Opcode::Load(l) => self.points_to.add_load(inst.result.clone(), l.pointer),
            Opcode::Store(s) => self.points_to.add_store(s.value, s.pointer),
            Opcode::Phi(p) => {
                for v in p.values {
                    self.points_to.add_copy(inst.result.clone(), v);
                }
            }
            Opcode::Select(s) => {
                self.points_to.add_copy(inst.result.clone(), s.true_value);
                self.points_to.add_copy(inst.result.clone(), s.false_value);
            }
            Opcode::Call(_) | Opcode::Other => (),
        }
    }

    fn handle_possible_targets(&mut self, call: &AbstractCallSite, targets: &FunctionSet) {
        for target in targets {
            let Some(f) = self.module.functions.get(target) else {
                continue;
            };
            for (idx, formal) in f.parameters.iter().enumerate() {
                if let Some(actual) = call.args.get(idx) {
                    self.points_to.add_copy(formal.clone(), actual.clone());
                }
            }
            for ret in f.returns() {
                if let crate::ir::TerminatorOpcode::Ret(r) = ret.opcode() {
                    if let Some(value) = &r.operand {
                        self.points_to.add_copy(call.result.clone(), value.clone());
                    }
                }
            }
        }
    }

    fn resolve_virtual_call(&mut self, call: &AbstractCallSite) -> FunctionSet {
        let Some(callee_op) = call.callee_operand() else {
            return FunctionSet::new();
        };
        let targets = self.points_to.function_targets(callee_op);
        if !targets.is_empty() {
            debug!(site = %call.site, n = targets.len(), "points-to resolved virtual site");
            return targets;
        }
        // Nothing known about the loaded function pointer yet; fall back on
        // the class hierarchy.
        dispatch_targets(self.module, self.hierarchy, call, |_| true)
    }

    fn resolve_function_pointer(&mut self, call: &AbstractCallSite) -> FunctionSet {
        match call.callee_operand() {
            Some(op) => self.points_to.function_targets(op),
            None => FunctionSet::new(),
        }
    }

    fn take_points_to(&mut self) -> Option<PointsToGraph> {
        Some(std::mem::take(&mut self.points_to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{types, Block, Function, Ret, Terminator, TerminatorOpcode};
    use crate::ir::{BlockName, InstructionName, ParameterName};

    fn leaf(module: &mut Module, name: &str, nparams: usize) {
        let f = module.intern_function_name(name);
        let parameters = (0..nparams)
            .map(|i| {
                let p = UArc::new(ParameterName::new(f.clone(), &format!("p{}", i)));
                Operand::parameter(p, types::int(32))
            })
            .collect();
        let block = UArc::new(BlockName::new(f.clone(), "entry"));
        let term = Terminator::new(
            UArc::new(InstructionName::new(f.clone(), block.clone(), 1)),
            TerminatorOpcode::Ret(Ret { operand: None }),
            types::void(),
        );
        module.add_function(
            f,
            Function {
                parameters,
                blocks: vec![Block {
                    name: block,
                    instrs: vec![],
                    terminator: Arc::new(term),
                }],
                return_type: types::void(),
                is_var_arg: false,
            },
        );
    }

    #[test]
    fn arity_filter_admits_surplus_actuals() {
        let mut module = Module::new();
        leaf(&mut module, "zero", 0);
        leaf(&mut module, "one", 1);
        leaf(&mut module, "three", 3);

        let targets = arity_compatible_targets(&module, 1);
        let names: Vec<_> = targets.iter().map(|f| f.get().to_string()).collect();
        assert!(names.contains(&"zero".to_string()));
        assert!(names.contains(&"one".to_string()));
        assert!(!names.contains(&"three".to_string()));
    }
}
