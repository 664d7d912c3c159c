// SPDX-License-Identifier: BSD-3-Clause
//! The LLIR View: a read-only facade over one loaded whole-program module.
//!
//! Names are interned once, behind [`UArc`], so pointer identity and name
//! identity coincide; this is the equality relation every analysis in this
//! crate uses for values. The module is assembled by a loader (or a test)
//! through the `intern_*`/`add_*` methods and is treated as immutable
//! afterwards, with one exception: the ICFG builder may append the synthetic
//! global ctor/dtor model before construction starts.

use std::collections::HashMap;

use crate::arc::{Arc, UArc};

pub mod constant;
mod error;
pub use error::*;
pub mod instruction;
mod name;
pub use name::*;
mod operand;
pub use operand::*;
pub mod terminator;
pub use terminator::{Invoke, Ret, Terminator, TerminatorOpcode};
pub mod types;
pub use types::{Type, TypeRef, VA_LIST_TAG};

use self::constant::Constant;
use self::instruction::{Instruction, Opcode};

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Block {
    pub name: UArc<BlockName>,
    pub instrs: Vec<Instruction>,
    pub terminator: Arc<Terminator>,
}

#[derive(Clone, Debug)]
pub struct Function {
    pub parameters: Vec<Arc<Operand>>,
    pub blocks: Vec<Block>,
    pub return_type: TypeRef,
    pub is_var_arg: bool,
}

impl Function {
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.instrs.iter())
    }

    pub fn block(&self, name: &UArc<BlockName>) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.name == name)
    }

    pub fn block_by_label(&self, label: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name.label() == label)
    }

    /// Find an instruction or terminator of this function by name.
    pub fn instruction(&self, name: &UArc<InstructionName>) -> Option<InstructionRef<'_>> {
        let block = self.block(name.block())?;
        if let Some(i) = block.instrs.get(name.index()) {
            debug_assert!(&i.name == name);
            Some(InstructionRef::Instruction(i))
        } else if &block.terminator.name == name {
            Some(InstructionRef::Terminator(&block.terminator))
        } else {
            None
        }
    }

    /// The `[N x %struct.__va_list_tag]` alloca standing in for a variadic
    /// function's unbound extra actuals, if the function has one.
    pub fn va_list_alloca(&self) -> Option<Arc<Operand>> {
        for i in self.instructions() {
            if let Opcode::Alloca(a) = i.opcode() {
                if a.allocated_type.is_va_list_array() {
                    return Some(i.result.clone());
                }
            }
        }
        None
    }

    /// All `ret` terminators of this function.
    pub fn returns(&self) -> impl Iterator<Item = &Terminator> {
        self.blocks
            .iter()
            .map(|b| b.terminator.as_ref())
            .filter(|t| t.is_return())
    }
}

/// A declaration-only function: signature, no body.
#[derive(Clone, Debug)]
pub struct Decl {
    pub parameters: Vec<TypeRef>,
    pub return_type: TypeRef,
    pub is_var_arg: bool,
}

#[derive(Clone, Debug)]
pub struct Global {
    pub initializer: Option<Arc<Constant>>,
    pub is_const: bool,
    pub ty: TypeRef,
}

/// One entry of the module's global constructor (or destructor) table.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct GlobalCtor {
    pub priority: u16,
    pub function: UArc<FunctionName>,
}

#[derive(Clone, Copy, Debug)]
pub enum InstructionRef<'a> {
    Instruction(&'a Instruction),
    Terminator(&'a Terminator),
}

impl<'a> InstructionRef<'a> {
    pub fn name(&self) -> &UArc<InstructionName> {
        match self {
            InstructionRef::Instruction(i) => &i.name,
            InstructionRef::Terminator(t) => &t.name,
        }
    }

    /// View this instruction as a call site, if it is one.
    pub fn call_site(&self) -> Option<AbstractCallSite> {
        match self {
            InstructionRef::Instruction(i) => AbstractCallSite::from_instruction(i),
            InstructionRef::Terminator(t) => AbstractCallSite::from_terminator(t),
        }
    }
}

/// A call-like site: the instruction, its ordered actual arguments, and the
/// statically-known callee when the callee operand directly names a function.
#[derive(Clone, Debug)]
pub struct AbstractCallSite {
    pub site: UArc<InstructionName>,
    pub callee: Callee,
    pub args: Vec<Arc<Operand>>,
    /// The caller-side SSA value produced by the call.
    pub result: Arc<Operand>,
    pub static_callee: Option<UArc<FunctionName>>,
}

impl AbstractCallSite {
    pub fn from_instruction(i: &Instruction) -> Option<Self> {
        match i.opcode() {
            Opcode::Call(c) => Some(Self::build(
                i.name.clone(),
                c.callee.clone(),
                c.args.clone(),
                i.result.clone(),
            )),
            _ => None,
        }
    }

    pub fn from_terminator(t: &Terminator) -> Option<Self> {
        match t.opcode() {
            TerminatorOpcode::Invoke(iv) => Some(Self::build(
                t.name.clone(),
                iv.callee.clone(),
                iv.args.clone(),
                t.result.clone(),
            )),
            _ => None,
        }
    }

    fn build(
        site: UArc<InstructionName>,
        callee: Callee,
        args: Vec<Arc<Operand>>,
        result: Arc<Operand>,
    ) -> Self {
        let static_callee = match &callee {
            Callee::Operand(op) => op.function(),
            Callee::Asm => None,
        };
        AbstractCallSite {
            site,
            callee,
            args,
            result,
            static_callee,
        }
    }

    /// True iff the callee operand is not directly a function constant.
    /// Sites calling through a cast of a named function are indirect by this
    /// definition even though the builder resolves them statically.
    pub fn is_indirect(&self) -> bool {
        match &self.callee {
            Callee::Operand(op) => op.function().is_none(),
            Callee::Asm => false,
        }
    }

    /// The receiver operand of a potential virtual dispatch (the first
    /// argument, pointing at an object of a known struct type).
    pub fn receiver(&self) -> Option<&Arc<Operand>> {
        self.args.first()
    }

    pub fn callee_operand(&self) -> Option<&Arc<Operand>> {
        match &self.callee {
            Callee::Operand(op) => Some(op),
            Callee::Asm => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Module {
    /// Interning table for function names; the single allocation site of
    /// every `UArc<FunctionName>` in the module.
    names: HashMap<String, UArc<FunctionName>>,
    pub functions: HashMap<UArc<FunctionName>, Function>,
    pub decls: HashMap<UArc<FunctionName>, Decl>,
    pub globals: HashMap<Arc<GlobalName>, Global>,
    pub ctors: Vec<GlobalCtor>,
    pub dtors: Vec<GlobalCtor>,
    /// Named struct types and their definitions, where known.
    pub struct_types: HashMap<String, TypeRef>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the unique `UArc` for a function name.
    pub fn intern_function_name(&mut self, s: &str) -> UArc<FunctionName> {
        if let Some(f) = self.names.get(s) {
            return f.clone();
        }
        let f = UArc::new(FunctionName::from(s));
        self.names.insert(s.to_string(), f.clone());
        f
    }

    /// The interned name, if this module has seen it.
    pub fn function_named(&self, s: &str) -> Option<&UArc<FunctionName>> {
        self.names.get(s)
    }

    /// The interned name of a *defined* function.
    pub fn definition_named(&self, s: &str) -> Option<UArc<FunctionName>> {
        let name = self.names.get(s)?;
        self.functions.contains_key(name).then(|| name.clone())
    }

    pub fn add_function(&mut self, name: UArc<FunctionName>, f: Function) {
        self.functions.insert(name, f);
    }

    pub fn add_decl(&mut self, name: UArc<FunctionName>, d: Decl) {
        self.decls.insert(name, d);
    }

    pub fn add_global(&mut self, name: Arc<GlobalName>, g: Global) {
        self.globals.insert(name, g);
    }

    /// Declaration-only from the perspective of the analyses: anything
    /// without a body in this module.
    pub fn is_declaration(&self, name: &UArc<FunctionName>) -> bool {
        !self.functions.contains_key(name)
    }

    /// Names of all defined functions, sorted for deterministic iteration.
    pub fn defined_function_names(&self) -> Vec<UArc<FunctionName>> {
        let mut names: Vec<_> = self.functions.keys().cloned().collect();
        names.sort_by(|a, b| a.get().cmp(b.get()));
        names
    }

    pub fn function_of(&self, inst: &UArc<InstructionName>) -> Option<&Function> {
        self.functions.get(inst.function())
    }

    pub fn instruction(&self, name: &UArc<InstructionName>) -> Option<InstructionRef<'_>> {
        self.function_of(name)?.instruction(name)
    }

    /// The call site at `name`, if `name` is a call or invoke.
    pub fn call_site_at(&self, name: &UArc<InstructionName>) -> Option<AbstractCallSite> {
        self.instruction(name)?.call_site()
    }
}
