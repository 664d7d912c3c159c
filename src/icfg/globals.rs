// SPDX-License-Identifier: BSD-3-Clause
//! Synthesis of the C-runtime startup model: one synthetic function that
//! runs global constructors, then the user entry points, then the global
//! destructor runner. Seeding the worklist with it makes initializer- and
//! finalizer-reachable code part of the analysis.

use crate::arc::{Arc, UArc};
use crate::ir::instruction::{Call, Instruction, Opcode};
use crate::ir::{
    types, Block, BlockName, Callee, Function, FunctionName, GlobalCtor, InstructionName, Module,
    Operand, Ret, Terminator, TerminatorOpcode,
};

pub const GLOBAL_INIT_MODEL: &str = "__global_init_model";
pub const GLOBAL_FINI_MODEL: &str = "__global_fini_model";

/// Append the ctor/dtor model to `module` and return the synthetic entry.
pub(crate) fn synthesize_global_model(
    module: &mut Module,
    user_entries: &[UArc<FunctionName>],
) -> UArc<FunctionName> {
    // Ascending priority, ties broken by name.
    let mut ctors = module.ctors.clone();
    ctors.sort_by(|a, b| {
        (a.priority, a.function.get()).cmp(&(b.priority, b.function.get()))
    });

    // Destructors run in reverse priority order.
    let mut dtors = module.dtors.clone();
    dtors.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.function.get().cmp(b.function.get()))
    });

    let fini = synthesize_runner(module, GLOBAL_FINI_MODEL, &callees_of(&dtors));

    let mut callees: Vec<UArc<FunctionName>> = callees_of(&ctors);
    callees.extend(user_entries.iter().cloned());
    callees.push(fini);
    synthesize_runner(module, GLOBAL_INIT_MODEL, &callees)
}

fn callees_of(ctors: &[GlobalCtor]) -> Vec<UArc<FunctionName>> {
    ctors.iter().map(|c| c.function.clone()).collect()
}

/// A function whose single block calls `callees` in order and returns.
fn synthesize_runner(
    module: &mut Module,
    name: &str,
    callees: &[UArc<FunctionName>],
) -> UArc<FunctionName> {
    let f_name = module.intern_function_name(name);
    let block_name = UArc::new(BlockName::new(f_name.clone(), "entry"));

    let fn_ptr_ty = types::pointer_to(types::function_type(types::void(), vec![], false));
    let mut instrs = Vec::with_capacity(callees.len());
    for (idx, callee) in callees.iter().enumerate() {
        let inst_name = UArc::new(InstructionName::new(
            f_name.clone(),
            block_name.clone(),
            idx,
        ));
        let opcode = Opcode::Call(Call {
            callee: Callee::Operand(Operand::function_ref(callee.clone(), fn_ptr_ty.clone())),
            args: vec![],
        });
        instrs.push(Instruction::new(inst_name, opcode, types::void()));
    }

    let terminator = Terminator::new(
        UArc::new(InstructionName::new(
            f_name.clone(),
            block_name.clone(),
            instrs.len() + 1,
        )),
        TerminatorOpcode::Ret(Ret { operand: None }),
        types::void(),
    );

    module.add_function(
        f_name.clone(),
        Function {
            parameters: vec![],
            blocks: vec![Block {
                name: block_name,
                instrs,
                terminator: Arc::new(terminator),
            }],
            return_type: types::void(),
            is_var_arg: false,
        },
    );
    f_name
}
