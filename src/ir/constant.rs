// SPDX-License-Identifier: BSD-3-Clause
use std::fmt::Display;

use crate::arc::{Arc, UArc};

use super::name::{FunctionName, GlobalName};

/// Constant expressions, folded down to what call resolution and points-to
/// seeding care about: function references (possibly behind casts or GEPs),
/// globals, integers, and aggregate initializers (vtables, function tables).
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Constant {
    Function(UArc<FunctionName>),
    Global(Arc<GlobalName>),
    Int { bits: u32, value: u64 },
    Null,
    Undef,
    BitCast(Arc<Constant>),
    GetElementPtr(Arc<Constant>),
    Array(Vec<Arc<Constant>>),
    Struct(Vec<Arc<Constant>>),
    Other,
}

impl Constant {
    /// Every function a use of this constant could denote. Looks through
    /// casts, constant GEPs, and aggregate initializers, the same stripping
    /// the fixed-point builder applies to call-site callee operands.
    pub fn functions(&self) -> Vec<UArc<FunctionName>> {
        match self {
            Constant::Function(f) => vec![f.clone()],
            Constant::BitCast(c) => c.functions(),
            Constant::GetElementPtr(c) => c.functions(),
            Constant::Array(cs) | Constant::Struct(cs) => {
                cs.iter().flat_map(|c| c.functions()).collect()
            }
            // No `_` pattern to ensure this is updated if the type changes
            Constant::Global(_) => Vec::new(),
            Constant::Int { .. } => Vec::new(),
            Constant::Null => Vec::new(),
            Constant::Undef => Vec::new(),
            Constant::Other => Vec::new(),
        }
    }

    /// Every global a use of this constant could reference, through casts,
    /// GEPs, and aggregates.
    pub fn globals(&self) -> Vec<Arc<GlobalName>> {
        match self {
            Constant::Global(g) => vec![g.clone()],
            Constant::BitCast(c) => c.globals(),
            Constant::GetElementPtr(c) => c.globals(),
            Constant::Array(cs) | Constant::Struct(cs) => {
                cs.iter().flat_map(|c| c.globals()).collect()
            }
            Constant::Function(_)
            | Constant::Int { .. }
            | Constant::Null
            | Constant::Undef
            | Constant::Other => Vec::new(),
        }
    }

    pub fn int_value(&self) -> Option<u64> {
        match self {
            Constant::Int { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn global(&self) -> Option<&Arc<GlobalName>> {
        match self {
            Constant::Global(g) => Some(g),
            Constant::BitCast(c) | Constant::GetElementPtr(c) => c.global(),
            _ => None,
        }
    }
}

impl Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Function(name) => write!(f, "{}", name),
            Constant::Global(name) => write!(f, "{}", name.as_ref()),
            Constant::Int { value, .. } => write!(f, "{}", value),
            Constant::Null => write!(f, "null"),
            Constant::Undef => write!(f, "undef"),
            Constant::BitCast(c) => write!(f, "bitcast({})", c.as_ref()),
            Constant::GetElementPtr(c) => write!(f, "gep({})", c.as_ref()),
            Constant::Array(_) => write!(f, "<array>"),
            Constant::Struct(_) => write!(f, "<struct>"),
            Constant::Other => write!(f, "<const>"),
        }
    }
}
