// Shared helpers for building small modules programmatically. Tests
// construct IR the way a loader would: intern the function name first, then
// lay out instructions in a single entry block.
#![allow(dead_code)]

use grapnel::ir::constant::Constant;
use grapnel::ir::instruction::{
    Alloca, BitCast, Call, GetElementPtr, Instruction, Load, Opcode, Store,
};
use grapnel::ir::types::{self, TypeRef};
use grapnel::{
    Arc, Block, BlockName, Callee, Function, FunctionName, InstructionName, Module, Operand,
    ParameterName, Ret, Terminator, TerminatorOpcode, UArc,
};

pub fn fn_ptr_ty() -> TypeRef {
    types::pointer_to(types::function_type(types::void(), vec![], false))
}

pub fn const_int(value: u64) -> Arc<Operand> {
    Operand::constant(Arc::new(Constant::Int { bits: 64, value }), types::int(64))
}

pub fn function_operand(f: &UArc<FunctionName>) -> Arc<Operand> {
    Operand::function_ref(f.clone(), fn_ptr_ty())
}

/// A cast-of-function constant operand, as front-ends emit for calls through
/// `(void (*)())target`.
pub fn bitcast_of_function(f: &UArc<FunctionName>) -> Arc<Operand> {
    Operand::constant(
        Arc::new(Constant::BitCast(Arc::new(Constant::Function(f.clone())))),
        fn_ptr_ty(),
    )
}

/// Builds one function with a single `entry` block.
pub struct FunctionBuilder {
    name: UArc<FunctionName>,
    block: UArc<BlockName>,
    parameters: Vec<Arc<Operand>>,
    instrs: Vec<Instruction>,
    return_type: TypeRef,
    is_var_arg: bool,
}

impl FunctionBuilder {
    pub fn new(module: &mut Module, name: &str) -> Self {
        let name = module.intern_function_name(name);
        let block = UArc::new(BlockName::new(name.clone(), "entry"));
        FunctionBuilder {
            name,
            block,
            parameters: Vec::new(),
            instrs: Vec::new(),
            return_type: types::void(),
            is_var_arg: false,
        }
    }

    pub fn name(&self) -> UArc<FunctionName> {
        self.name.clone()
    }

    pub fn var_arg(&mut self) -> &mut Self {
        self.is_var_arg = true;
        self
    }

    pub fn param(&mut self, name: &str, ty: TypeRef) -> Arc<Operand> {
        let p = Operand::parameter(UArc::new(ParameterName::new(self.name.clone(), name)), ty);
        self.parameters.push(p.clone());
        p
    }

    pub fn push(&mut self, opcode: Opcode, ty: TypeRef) -> Instruction {
        let inst_name = UArc::new(InstructionName::new(
            self.name.clone(),
            self.block.clone(),
            self.instrs.len(),
        ));
        let inst = Instruction::new(inst_name, opcode, ty);
        self.instrs.push(inst.clone());
        inst
    }

    /// A direct call to a named function.
    pub fn call(&mut self, callee: &UArc<FunctionName>, args: Vec<Arc<Operand>>) -> Instruction {
        self.call_through(function_operand(callee), args)
    }

    /// A call through an arbitrary callee operand.
    pub fn call_through(&mut self, callee: Arc<Operand>, args: Vec<Arc<Operand>>) -> Instruction {
        self.push(
            Opcode::Call(Call {
                callee: Callee::Operand(callee),
                args,
            }),
            types::void(),
        )
    }

    pub fn alloca(&mut self, allocated_type: TypeRef) -> Instruction {
        self.push(
            Opcode::Alloca(Alloca {
                allocated_type: allocated_type.clone(),
                num_elements: const_int(1),
            }),
            types::pointer_to(allocated_type),
        )
    }

    pub fn store(&mut self, value: Arc<Operand>, pointer: Arc<Operand>) -> Instruction {
        self.push(Opcode::Store(Store { value, pointer }), types::void())
    }

    pub fn load(&mut self, pointer: Arc<Operand>, ty: TypeRef) -> Instruction {
        self.push(Opcode::Load(Load { pointer }), ty)
    }

    pub fn gep(&mut self, pointer: Arc<Operand>, index: u64, ty: TypeRef) -> Instruction {
        self.push(
            Opcode::GetElementPtr(GetElementPtr {
                pointer,
                indices: vec![const_int(index)],
            }),
            ty,
        )
    }

    pub fn bitcast(&mut self, pointer: Arc<Operand>, ty: TypeRef) -> Instruction {
        self.push(Opcode::BitCast(BitCast { pointer }), ty)
    }

    /// Finish with `ret` and add the function to the module.
    pub fn ret(self, module: &mut Module, operand: Option<Arc<Operand>>) -> UArc<FunctionName> {
        let terminator = Terminator::new(
            UArc::new(InstructionName::new(
                self.name.clone(),
                self.block.clone(),
                self.instrs.len() + 1,
            )),
            TerminatorOpcode::Ret(Ret { operand }),
            types::void(),
        );
        module.add_function(
            self.name.clone(),
            Function {
                parameters: self.parameters,
                blocks: vec![Block {
                    name: self.block,
                    instrs: self.instrs,
                    terminator: Arc::new(terminator),
                }],
                return_type: self.return_type,
                is_var_arg: self.is_var_arg,
            },
        );
        self.name
    }
}

/// An empty defined function.
pub fn leaf(module: &mut Module, name: &str) -> UArc<FunctionName> {
    FunctionBuilder::new(module, name).ret(module, None)
}
