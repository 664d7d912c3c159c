// SPDX-License-Identifier: BSD-3-Clause
use crate::arc::{Arc, UArc};
use crate::hash::PreHashed;

use super::name::InstructionName;
use super::operand::{Callee, Operand};
use super::types::TypeRef;

/// An invoke is a call with explicit intraprocedural successors: control
/// resumes at `return_label` or unwinds to `unwind_label`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Invoke {
    pub callee: Callee,
    pub args: Vec<Arc<Operand>>,
    pub return_label: String,
    pub unwind_label: String,
}

impl Invoke {
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
pub struct Ret {
    pub operand: Option<Arc<Operand>>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum TerminatorOpcode {
    Invoke(Invoke),
    Ret(Ret),
    Other,
}

impl TerminatorOpcode {
    pub fn operands(&self) -> Vec<Arc<Operand>> {
        match self {
            TerminatorOpcode::Invoke(t) => t.operands(),
            TerminatorOpcode::Ret(Ret { operand }) => {
                operand.iter().cloned().collect()
            }
            TerminatorOpcode::Other => Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Terminator {
    pub name: UArc<InstructionName>,
    pub opcode: PreHashed<TerminatorOpcode>,
    pub ty: TypeRef,
    /// The SSA value the terminator defines (invokes have results).
    pub result: Arc<Operand>,
}

impl Terminator {
    pub fn new(name: UArc<InstructionName>, opcode: TerminatorOpcode, ty: TypeRef) -> Self {
        let result = Operand::instruction_result(name.clone(), ty.clone());
        Terminator {
            name,
            opcode: PreHashed::new(opcode),
            ty,
            result,
        }
    }

    pub fn opcode(&self) -> &TerminatorOpcode {
        self.opcode.as_ref()
    }

    pub fn is_return(&self) -> bool {
        matches!(self.opcode(), TerminatorOpcode::Ret(_))
    }
}
