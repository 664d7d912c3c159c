// SPDX-License-Identifier: BSD-3-Clause
use crate::arc::{Arc, UArc};
use crate::hash::PreHashed;

use super::name::InstructionName;
use super::operand::{Callee, Operand};
use super::types::TypeRef;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Alloca {
    pub allocated_type: TypeRef,
    pub num_elements: Arc<Operand>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct BitCast {
    pub pointer: Arc<Operand>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Call {
    pub callee: Callee,
    pub args: Vec<Arc<Operand>>,
}

impl Call {
    pub fn operands(&self) -> Vec<Arc<Operand>> {
        let mut os = match &self.callee {
            Callee::Asm => vec![],
            Callee::Operand(op) => vec![op.clone()],
        };
        os.extend(self.args.iter().cloned());
        os
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct GetElementPtr {
    pub pointer: Arc<Operand>,
    pub indices: Vec<Arc<Operand>>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Load {
    pub pointer: Arc<Operand>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Phi {
    pub values: Vec<Arc<Operand>>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Select {
    pub true_value: Arc<Operand>,
    pub false_value: Arc<Operand>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Store {
    pub value: Arc<Operand>,
    pub pointer: Arc<Operand>,
}

/// The instruction kinds the core distinguishes. Everything the call-graph
/// builder, the resolvers, and the flow functions do not inspect collapses
/// into `Other`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Opcode {
    Alloca(Alloca),
    BitCast(BitCast),
    Call(Call),
    GetElementPtr(GetElementPtr),
    Load(Load),
    Phi(Phi),
    Select(Select),
    Store(Store),
    //
    Other,
}

impl Opcode {
    pub fn operands(&self) -> Vec<Arc<Operand>> {
        match self {
            Opcode::Alloca(a) => vec![a.num_elements.clone()],
            Opcode::BitCast(BitCast { pointer }) => vec![pointer.clone()],
            Opcode::Call(c) => c.operands(),
            Opcode::GetElementPtr(GetElementPtr { pointer, indices }) => {
                let mut ops = indices.clone();
                ops.push(pointer.clone());
                ops
            }
            Opcode::Load(l) => vec![l.pointer.clone()],
            Opcode::Phi(p) => p.values.clone(),
            Opcode::Select(s) => vec![s.true_value.clone(), s.false_value.clone()],
            Opcode::Store(s) => vec![s.value.clone(), s.pointer.clone()],
            //
            Opcode::Other => vec![],
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Instruction {
    pub name: UArc<InstructionName>,
    pub opcode: PreHashed<Opcode>,
    pub ty: TypeRef,
    /// The SSA value this instruction defines. Present even for void
    /// instructions so call sites always have a caller-side value to bind
    /// return facts to.
    pub result: Arc<Operand>,
}

impl Instruction {
    pub fn new(name: UArc<InstructionName>, opcode: Opcode, ty: TypeRef) -> Self {
        let result = Operand::instruction_result(name.clone(), ty.clone());
        Instruction {
            name,
            opcode: PreHashed::new(opcode),
            ty,
            result,
        }
    }

    pub fn opcode(&self) -> &Opcode {
        self.opcode.as_ref()
    }

    pub fn is_call(&self) -> bool {
        matches!(self.opcode(), Opcode::Call(_))
    }
}
