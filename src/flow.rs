// SPDX-License-Identifier: BSD-3-Clause
//! Flow-function primitives for IFDS/IDE solvers.
//!
//! A flow function is a pure transformer from one dataflow fact to the set
//! of facts holding after one edge of the exploded super-graph. Facts are
//! SSA values plus the distinguished [`Fact::Zero`], the tautological fact
//! that is unconditionally reachable; every variant propagates Zero to
//! `{Zero}` unless its documentation says otherwise.
//!
//! All state a variant needs is captured at construction time, so
//! evaluation is deterministic, side-effect-free, and safe to run from a
//! parallel solver.

use std::collections::BTreeSet;
use std::fmt::Display;

use crate::arc::{Arc, UArc};
use crate::ir::instruction::{Instruction, Opcode};
use crate::ir::{AbstractCallSite, Function, FunctionName, Module, Operand, Terminator, TerminatorOpcode};

/// A dataflow fact: an SSA value, or the tautological Zero value.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Fact {
    Zero,
    Value(Arc<Operand>),
}

impl Fact {
    pub fn is_zero(&self) -> bool {
        matches!(self, Fact::Zero)
    }

    pub fn value(op: Arc<Operand>) -> Self {
        Fact::Value(op)
    }
}

impl Display for Fact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fact::Zero => write!(f, "<zero>"),
            Fact::Value(op) => write!(f, "{}", op.as_ref()),
        }
    }
}

pub type FactSet = BTreeSet<Fact>;

pub trait FlowFunction {
    fn compute_targets(&self, source: &Fact) -> FactSet;
}

fn singleton(fact: Fact) -> FactSet {
    FactSet::from([fact])
}

/// The identity transformer.
pub struct Identity;

impl FlowFunction for Identity {
    fn compute_targets(&self, source: &Fact) -> FactSet {
        singleton(source.clone())
    }
}

/// Decorator that kills temporary loads once they have been consumed: after
/// the inner flow function runs, every value that occurs as a load-result
/// operand of the decorated instruction is removed from the target set.
pub struct AutoKillTemporaries {
    delegate: Box<dyn FlowFunction>,
    load_temporaries: Vec<Arc<Operand>>,
}

impl AutoKillTemporaries {
    pub fn new(delegate: Box<dyn FlowFunction>, caller: &Function, inst: &Instruction) -> Self {
        let load_temporaries = inst
            .opcode()
            .operands()
            .into_iter()
            .filter(|op| is_load_result(caller, op))
            .collect();
        AutoKillTemporaries {
            delegate,
            load_temporaries,
        }
    }
}

fn is_load_result(caller: &Function, op: &Arc<Operand>) -> bool {
    let Some(name) = op.instruction_name() else {
        return false;
    };
    match caller.instruction(name) {
        Some(crate::ir::InstructionRef::Instruction(i)) => {
            matches!(i.opcode(), Opcode::Load(_))
        }
        _ => false,
    }
}

impl FlowFunction for AutoKillTemporaries {
    fn compute_targets(&self, source: &Fact) -> FactSet {
        let mut targets = self.delegate.compute_targets(source);
        for tmp in &self.load_temporaries {
            targets.remove(&Fact::Value(tmp.clone()));
        }
        targets
    }
}

pub type CallSitePredicate = Box<dyn Fn(&AbstractCallSite, &Arc<Operand>) -> bool>;

/// Call-to-return edge: facts the callee may modify are killed here (their
/// flow is carried by the call and return edges instead); everything else
/// passes through unchanged.
pub struct MapFactsAlongsideCallSite {
    call: AbstractCallSite,
    predicate: CallSitePredicate,
}

impl MapFactsAlongsideCallSite {
    /// Default predicate: the value is passed to the call as a pointer-typed
    /// argument, i.e. the callee may modify what it points at.
    pub fn new(call: AbstractCallSite) -> Self {
        Self::with_predicate(
            call,
            Box::new(|call, v| call.args.iter().any(|a| a == v && a.is_pointer())),
        )
    }

    pub fn with_predicate(call: AbstractCallSite, predicate: CallSitePredicate) -> Self {
        MapFactsAlongsideCallSite { call, predicate }
    }
}

impl FlowFunction for MapFactsAlongsideCallSite {
    fn compute_targets(&self, source: &Fact) -> FactSet {
        match source {
            Fact::Zero => singleton(Fact::Zero),
            Fact::Value(v) => {
                if (self.predicate)(&self.call, v) {
                    FactSet::new()
                } else {
                    singleton(source.clone())
                }
            }
        }
    }
}

pub type ValuePredicate = Box<dyn Fn(&Arc<Operand>) -> bool>;

/// Call edge: maps actual arguments to the callee's formal parameters.
///
/// Calls into declarations kill every fact, Zero included; there is no body
/// to carry them. For variadic callees, actuals beyond the formals map to
/// the callee's `[N x %struct.__va_list_tag]` alloca; a variadic callee
/// without such an alloca generates nothing for the surplus actuals.
pub struct MapFactsToCallee {
    actuals: Vec<Arc<Operand>>,
    formals: Vec<Arc<Operand>>,
    callee_is_declaration: bool,
    callee_is_var_arg: bool,
    va_alloca: Option<Arc<Operand>>,
    predicate: ValuePredicate,
}

impl MapFactsToCallee {
    pub fn new(module: &Module, call: &AbstractCallSite, callee: &UArc<FunctionName>) -> Self {
        Self::with_predicate(module, call, callee, Box::new(|_| true))
    }

    pub fn with_predicate(
        module: &Module,
        call: &AbstractCallSite,
        callee: &UArc<FunctionName>,
        predicate: ValuePredicate,
    ) -> Self {
        let body = module.functions.get(callee);
        MapFactsToCallee {
            actuals: call.args.clone(),
            formals: body.map(|f| f.parameters.clone()).unwrap_or_default(),
            callee_is_declaration: body.is_none(),
            callee_is_var_arg: body.map(|f| f.is_var_arg).unwrap_or(false),
            va_alloca: body.and_then(|f| f.va_list_alloca()),
            predicate,
        }
    }
}

impl FlowFunction for MapFactsToCallee {
    fn compute_targets(&self, source: &Fact) -> FactSet {
        if self.callee_is_declaration {
            return FactSet::new();
        }
        let v = match source {
            Fact::Zero => return singleton(Fact::Zero),
            Fact::Value(v) => v,
        };
        let mut targets = FactSet::new();
        for (idx, actual) in self.actuals.iter().enumerate() {
            if actual != v || !(self.predicate)(actual) {
                continue;
            }
            if let Some(formal) = self.formals.get(idx) {
                targets.insert(Fact::Value(formal.clone()));
            } else if self.callee_is_var_arg {
                if let Some(va) = &self.va_alloca {
                    targets.insert(Fact::Value(va.clone()));
                }
            }
        }
        targets
    }
}

pub type FunctionPredicate = Box<dyn Fn(&UArc<FunctionName>) -> bool>;

/// Return edge: maps the callee's formals (and the va_list stand-in) back to
/// the caller's actuals, and the returned value to the call site's own SSA
/// value.
pub struct MapFactsToCaller {
    callee: UArc<FunctionName>,
    actuals: Vec<Arc<Operand>>,
    formals: Vec<Arc<Operand>>,
    call_result: Arc<Operand>,
    callee_is_var_arg: bool,
    va_alloca: Option<Arc<Operand>>,
    exit_value: Option<Arc<Operand>>,
    param_predicate: ValuePredicate,
    return_predicate: FunctionPredicate,
}

impl MapFactsToCaller {
    /// The callee must be defined and `exit` must be one of its `ret`
    /// terminators; both are preconditions of the return edge.
    pub fn new(
        module: &Module,
        call: &AbstractCallSite,
        callee: &UArc<FunctionName>,
        exit: &Terminator,
    ) -> Self {
        Self::with_predicates(
            module,
            call,
            callee,
            exit,
            Box::new(|_| true),
            Box::new(|_| true),
        )
    }

    pub fn with_predicates(
        module: &Module,
        call: &AbstractCallSite,
        callee: &UArc<FunctionName>,
        exit: &Terminator,
        param_predicate: ValuePredicate,
        return_predicate: FunctionPredicate,
    ) -> Self {
        let body = module
            .functions
            .get(callee)
            .unwrap_or_else(|| panic!("cannot map facts to caller of declaration {}", callee));
        let exit_value = match exit.opcode() {
            TerminatorOpcode::Ret(r) => r.operand.clone(),
            _ => panic!("exit of {} is not a return instruction", callee),
        };
        MapFactsToCaller {
            callee: callee.clone(),
            actuals: call.args.clone(),
            formals: body.parameters.clone(),
            call_result: call.result.clone(),
            callee_is_var_arg: body.is_var_arg,
            va_alloca: body.va_list_alloca(),
            exit_value,
            param_predicate,
            return_predicate,
        }
    }
}

impl FlowFunction for MapFactsToCaller {
    fn compute_targets(&self, source: &Fact) -> FactSet {
        let v = match source {
            Fact::Zero => return singleton(Fact::Zero),
            Fact::Value(v) => v,
        };
        let mut targets = FactSet::new();
        if self.callee_is_var_arg && self.va_alloca.as_ref() == Some(v) {
            for actual in self.actuals.iter().skip(self.formals.len()) {
                targets.insert(Fact::Value(actual.clone()));
            }
        }
        for (idx, formal) in self.formals.iter().enumerate() {
            if formal == v && (self.param_predicate)(formal) {
                if let Some(actual) = self.actuals.get(idx) {
                    targets.insert(Fact::Value(actual.clone()));
                }
            }
        }
        if self.exit_value.as_ref() == Some(v) && (self.return_predicate)(&self.callee) {
            targets.insert(Fact::Value(self.call_result.clone()));
        }
        targets
    }
}

/// For a load `x = *p`: the fact `p` additionally generates `x`.
pub struct PropagateLoad {
    pointer: Arc<Operand>,
    result: Arc<Operand>,
}

impl PropagateLoad {
    pub fn new(load: &Instruction) -> Self {
        match load.opcode() {
            Opcode::Load(l) => PropagateLoad {
                pointer: l.pointer.clone(),
                result: load.result.clone(),
            },
            _ => panic!("PropagateLoad over a non-load instruction"),
        }
    }
}

impl FlowFunction for PropagateLoad {
    fn compute_targets(&self, source: &Fact) -> FactSet {
        match source {
            Fact::Value(v) if v == &self.pointer => FactSet::from([
                source.clone(),
                Fact::Value(self.result.clone()),
            ]),
            _ => singleton(source.clone()),
        }
    }
}

/// For a store `*p <- v`: the fact `v` additionally generates `p`.
pub struct PropagateStore {
    value: Arc<Operand>,
    pointer: Arc<Operand>,
}

impl PropagateStore {
    pub fn new(store: &Instruction) -> Self {
        match store.opcode() {
            Opcode::Store(s) => PropagateStore {
                value: s.value.clone(),
                pointer: s.pointer.clone(),
            },
            _ => panic!("PropagateStore over a non-store instruction"),
        }
    }
}

impl FlowFunction for PropagateStore {
    fn compute_targets(&self, source: &Fact) -> FactSet {
        match source {
            Fact::Value(v) if v == &self.value => FactSet::from([
                source.clone(),
                Fact::Value(self.pointer.clone()),
            ]),
            _ => singleton(source.clone()),
        }
    }
}

pub type FactPredicate = Box<dyn Fn(&Fact) -> bool>;

/// For a store `*p <- v`: the fact `p` is killed (the old memory contents
/// are overwritten), facts matching the predicate additionally generate `p`,
/// everything else passes through.
pub struct StrongUpdateStore {
    pointer: Arc<Operand>,
    predicate: FactPredicate,
}

impl StrongUpdateStore {
    pub fn new(store: &Instruction, predicate: FactPredicate) -> Self {
        match store.opcode() {
            Opcode::Store(s) => StrongUpdateStore {
                pointer: s.pointer.clone(),
                predicate,
            },
            _ => panic!("StrongUpdateStore over a non-store instruction"),
        }
    }
}

impl FlowFunction for StrongUpdateStore {
    fn compute_targets(&self, source: &Fact) -> FactSet {
        match source {
            Fact::Value(v) if v == &self.pointer => FactSet::new(),
            _ if (self.predicate)(source) => FactSet::from([
                source.clone(),
                Fact::Value(self.pointer.clone()),
            ]),
            _ => singleton(source.clone()),
        }
    }
}
