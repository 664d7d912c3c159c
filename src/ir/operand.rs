// SPDX-License-Identifier: BSD-3-Clause
use std::fmt::Display;

use crate::arc::{Arc, UArc};

use super::constant::Constant;
use super::name::{FunctionName, InstructionName, LocalName, ParameterName};
use super::types::TypeRef;

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum OperandKind {
    Constant(Arc<Constant>),
    Local(Arc<LocalName>),
    Metadata,
}

/// An SSA value: a constant, a local (parameter or instruction result), or
/// metadata. Every operand carries its static type; resolvers and flow
/// functions query it (receiver structs, pointer-typed arguments, va_list
/// allocas).
///
/// Operands are interned per module: each distinct local is allocated once
/// and shared by `Arc`, so structural equality and pointer identity agree.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Operand {
    pub kind: OperandKind,
    pub ty: TypeRef,
}

impl Operand {
    pub fn constant(c: Arc<Constant>, ty: TypeRef) -> Arc<Self> {
        Arc::new(Operand {
            kind: OperandKind::Constant(c),
            ty,
        })
    }

    /// An operand referring to a function by name.
    pub fn function_ref(f: UArc<FunctionName>, ty: TypeRef) -> Arc<Self> {
        Self::constant(Arc::new(Constant::Function(f)), ty)
    }

    pub fn parameter(p: UArc<ParameterName>, ty: TypeRef) -> Arc<Self> {
        Arc::new(Operand {
            kind: OperandKind::Local(Arc::new(LocalName::Parameter(p))),
            ty,
        })
    }

    pub fn instruction_result(i: UArc<InstructionName>, ty: TypeRef) -> Arc<Self> {
        Arc::new(Operand {
            kind: OperandKind::Local(Arc::new(LocalName::Instruction(i))),
            ty,
        })
    }

    pub fn constant_int(&self) -> Option<u64> {
        match &self.kind {
            OperandKind::Constant(c) => c.int_value(),
            _ => None,
        }
    }

    /// The function this operand names directly, without stripping casts.
    pub fn function(&self) -> Option<UArc<FunctionName>> {
        match &self.kind {
            OperandKind::Constant(c) => match c.as_ref() {
                Constant::Function(f) => Some(f.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Functions this operand may name after stripping pointer casts.
    pub fn stripped_functions(&self) -> Vec<UArc<FunctionName>> {
        match &self.kind {
            OperandKind::Constant(c) => c.functions(),
            _ => Vec::new(),
        }
    }

    pub fn local_name(&self) -> Option<&LocalName> {
        match &self.kind {
            OperandKind::Local(l) => Some(l),
            _ => None,
        }
    }

    /// The instruction that defines this operand, if it is an SSA result.
    pub fn instruction_name(&self) -> Option<&UArc<InstructionName>> {
        match self.local_name()? {
            LocalName::Instruction(i) => Some(i),
            LocalName::Parameter(_) => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        self.ty.is_pointer()
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            OperandKind::Constant(c) => write!(f, "{}", c.as_ref()),
            OperandKind::Local(l) => write!(f, "%{}", l.as_ref()),
            OperandKind::Metadata => write!(f, "<metadata>"),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Callee {
    Operand(Arc<Operand>),
    Asm,
}

impl Display for Callee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callee::Operand(op) => write!(f, "{}", op.as_ref()),
            Callee::Asm => write!(f, "<asm>"),
        }
    }
}
