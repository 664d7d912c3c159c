// SPDX-License-Identifier: BSD-3-Clause
//! Whole-program call-graph construction over a low-level SSA IR, with
//! pluggable call resolvers (class hierarchy, rapid/declared/variable type
//! analysis, and on-the-fly points-to), plus the IFDS/IDE flow-function
//! primitives dataflow solvers build on.

pub mod arc;
pub use arc::{Arc, UArc};

mod hash;
pub use hash::PreHashed;

pub mod ir;
pub use ir::{
    AbstractCallSite, Block, BlockName, Callee, Decl, Function, FunctionName, Global, GlobalCtor,
    GlobalName, InstructionName, InstructionRef, Invoke, LocalName, Module, Operand, OperandKind,
    ParameterName, Ret, Terminator, TerminatorOpcode, Type, TypeRef,
};

pub mod flow;

pub mod hierarchy;
pub use hierarchy::TypeHierarchy;

pub mod icfg;
pub use icfg::{
    check_whole_program, CallGraph, ConfigError, Icfg, IcfgConfig, ALL_ENTRY_POINTS,
};

pub mod pointer;
pub use pointer::{AbstractObject, PointsToGraph, PointsToInfo};

pub mod resolver;
pub use resolver::{Resolver, ResolverKind, Soundness};

#[cfg(feature = "bitcode")]
pub mod loader;
