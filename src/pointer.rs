// SPDX-License-Identifier: BSD-3-Clause
//! Points-to oracle.
//!
//! [`PointsToInfo`] is the interface the on-the-fly call resolver consults;
//! [`PointsToGraph`] is the in-crate implementation: an inclusion-based
//! analysis over alloc/copy/load/store constraints. Constraints accumulate
//! monotonically while the ICFG builder walks the program; queries solve the
//! accumulated system to its fixed point with a datalog program and cache the
//! solution until the next constraint arrives.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;

use ascent::ascent;

use crate::arc::{Arc, UArc};
use crate::ir::{FunctionName, GlobalName, InstructionName, Module, Operand, OperandKind};

/// An abstract memory object: a function's address, a stack allocation, or a
/// global.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum AbstractObject {
    Function(UArc<FunctionName>),
    Stack(UArc<InstructionName>),
    Global(Arc<GlobalName>),
}

impl Display for AbstractObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbstractObject::Function(name) => write!(f, "*{}", name),
            AbstractObject::Stack(name) => write!(f, "stack:{}", name),
            AbstractObject::Global(name) => write!(f, "{}", name.as_ref()),
        }
    }
}

/// Read-only interface: which abstract objects may a value point to?
pub trait PointsToInfo {
    fn points_to(&self, op: &Arc<Operand>) -> BTreeSet<AbstractObject>;

    /// The functions among the objects `op` may point to.
    fn function_targets(&self, op: &Arc<Operand>) -> BTreeSet<UArc<FunctionName>> {
        self.points_to(op)
            .into_iter()
            .filter_map(|o| match o {
                AbstractObject::Function(f) => Some(f),
                _ => None,
            })
            .collect()
    }
}

// Inclusion-based points-to over four constraint kinds plus global
// initializer seeds.
ascent! {
    struct Inclusion;

    relation alloc(Arc<Operand>, AbstractObject);
    relation copy(Arc<Operand>, Arc<Operand>);
    relation store(Arc<Operand>, Arc<Operand>);
    relation load(Arc<Operand>, Arc<Operand>);
    relation init(AbstractObject, AbstractObject);

    relation points_to(Arc<Operand>, AbstractObject);
    relation heap(AbstractObject, AbstractObject);

    points_to(v, o) <-- alloc(v, o);
    points_to(v, o) <-- copy(v, u), points_to(u, o);
    heap(p, o) <-- init(p, o);
    heap(p, o) <-- store(val, ptr), points_to(ptr, p), points_to(val, o);
    points_to(v, o) <-- load(v, ptr), points_to(ptr, p), heap(p, o);
}

type Solution = HashMap<Arc<Operand>, BTreeSet<AbstractObject>>;

#[derive(Debug, Default)]
pub struct PointsToGraph {
    allocs: Vec<(Arc<Operand>, AbstractObject)>,
    copies: Vec<(Arc<Operand>, Arc<Operand>)>,
    /// `(value, pointer)` of a store `*pointer <- value`.
    stores: Vec<(Arc<Operand>, Arc<Operand>)>,
    /// `(result, pointer)` of a load `result = *pointer`.
    loads: Vec<(Arc<Operand>, Arc<Operand>)>,
    inits: Vec<(AbstractObject, AbstractObject)>,
    solution: RefCell<Option<Solution>>,
}

impl PointsToGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed every global initializer: the memory of global `g` holds the
    /// functions and globals its initializer references. This is what makes
    /// function tables resolvable.
    pub fn seed_module(&mut self, module: &Module) {
        for (name, global) in &module.globals {
            let Some(init) = &global.initializer else {
                continue;
            };
            let obj = AbstractObject::Global(name.clone());
            for f in init.functions() {
                self.inits.push((obj.clone(), AbstractObject::Function(f)));
            }
            for g in init.globals() {
                self.inits.push((obj.clone(), AbstractObject::Global(g)));
            }
        }
        self.invalidate();
    }

    pub fn add_alloc(&mut self, value: Arc<Operand>, object: AbstractObject) {
        self.allocs.push((value, object));
        self.invalidate();
    }

    pub fn add_copy(&mut self, dst: Arc<Operand>, src: Arc<Operand>) {
        self.seed_constants(&src);
        self.copies.push((dst, src));
        self.invalidate();
    }

    pub fn add_store(&mut self, value: Arc<Operand>, pointer: Arc<Operand>) {
        self.seed_constants(&value);
        self.seed_constants(&pointer);
        self.stores.push((value, pointer));
        self.invalidate();
    }

    pub fn add_load(&mut self, result: Arc<Operand>, pointer: Arc<Operand>) {
        self.seed_constants(&pointer);
        self.loads.push((result, pointer));
        self.invalidate();
    }

    /// Constants point at what they name: `&f` points at function `f`, `@g`
    /// at the global `g`.
    fn seed_constants(&mut self, op: &Arc<Operand>) {
        if let OperandKind::Constant(c) = &op.kind {
            for f in c.functions() {
                self.allocs.push((op.clone(), AbstractObject::Function(f)));
            }
            if let Some(g) = c.global() {
                self.allocs
                    .push((op.clone(), AbstractObject::Global(g.clone())));
            }
        }
    }

    fn invalidate(&mut self) {
        *self.solution.borrow_mut() = None;
    }

    fn solve(&self) -> Solution {
        let mut prog = Inclusion::default();
        prog.alloc = self.allocs.clone();
        prog.copy = self.copies.clone();
        prog.store = self.stores.clone();
        prog.load = self.loads.clone();
        prog.init = self.inits.clone();
        prog.run();
        let mut out: Solution = HashMap::new();
        for (v, o) in prog.points_to {
            out.entry(v).or_default().insert(o);
        }
        out
    }
}

impl PointsToInfo for PointsToGraph {
    fn points_to(&self, op: &Arc<Operand>) -> BTreeSet<AbstractObject> {
        let mut cached = self.solution.borrow_mut();
        let solution = cached.get_or_insert_with(|| self.solve());
        solution.get(op).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::constant::Constant;
    use crate::ir::types;
    use crate::ir::BlockName;

    fn local(name: UArc<InstructionName>) -> Arc<Operand> {
        Operand::instruction_result(name, types::pointer_to(types::void()))
    }

    #[test]
    fn store_then_load_resolves_function() {
        let f = UArc::new(FunctionName::from("g"));
        let fn_op = Operand::function_ref(
            f.clone(),
            types::pointer_to(types::function_type(types::void(), vec![], false)),
        );

        let caller = UArc::new(FunctionName::from("caller"));
        let entry = UArc::new(BlockName::new(caller.clone(), "entry"));
        let slot_name = UArc::new(InstructionName::new(caller.clone(), entry.clone(), 0));
        let loaded_name = UArc::new(InstructionName::new(caller.clone(), entry.clone(), 2));
        let slot = local(slot_name.clone());
        let loaded = local(loaded_name);

        let mut pts = PointsToGraph::new();
        pts.add_alloc(slot.clone(), AbstractObject::Stack(slot_name));
        pts.add_store(fn_op, slot.clone());
        pts.add_load(loaded.clone(), slot);

        let targets = pts.function_targets(&loaded);
        assert_eq!(targets.len(), 1);
        assert!(targets.contains(&f));
    }

    #[test]
    fn global_initializer_seeds_memory() {
        let mut module = Module::new();
        let f = module.intern_function_name("handler");
        let g_name = Arc::new(GlobalName::new("table"));
        module.add_global(
            g_name.clone(),
            crate::ir::Global {
                initializer: Some(Arc::new(Constant::Array(vec![Arc::new(
                    Constant::Function(f.clone()),
                )]))),
                is_const: true,
                ty: types::pointer_to(types::void()),
            },
        );

        let mut pts = PointsToGraph::new();
        pts.seed_module(&module);

        let caller = UArc::new(FunctionName::from("caller"));
        let entry = UArc::new(BlockName::new(caller.clone(), "entry"));
        let loaded = local(UArc::new(InstructionName::new(caller, entry, 0)));
        let table_ref = Operand::constant(
            Arc::new(Constant::Global(g_name)),
            types::pointer_to(types::void()),
        );
        pts.add_load(loaded.clone(), table_ref);

        assert!(pts.function_targets(&loaded).contains(&f));
    }
}
