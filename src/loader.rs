// SPDX-License-Identifier: BSD-3-Clause
//! Conversion from a parsed `llvm_ir::Module` into the analysis-friendly
//! [`ir::Module`]. Names are interned up front so every later reference to a
//! function, block, or instruction shares one allocation; locals are
//! resolved through a per-function table built in a first pass, because the
//! IR references some values before their definitions.

use std::collections::HashMap;

use either::Either;
use llvm_ir::types::{NamedStructDef, Typed, Types};
use llvm_ir::Name;

use crate::arc::{Arc, UArc};
use crate::ir::constant::Constant;
use crate::ir::instruction::{
    Alloca, BitCast, Call, GetElementPtr, Instruction, Load, Opcode, Phi, Select, Store,
};
use crate::ir::types::{self, TypeRef};
use crate::ir::{
    Block, BlockName, Callee, Decl, Error, Function, Global, GlobalCtor, GlobalName,
    InstructionName, Module, Operand, OperandKind, ParameterName, Ret, Terminator,
    TerminatorOpcode,
};

fn name_string(n: &Name) -> String {
    match n {
        Name::Name(s) => (**s).clone(),
        Name::Number(i) => i.to_string(),
    }
}

fn convert_type(ty: &llvm_ir::Type) -> TypeRef {
    match ty {
        llvm_ir::Type::VoidType => types::void(),
        llvm_ir::Type::IntegerType { bits } => types::int(*bits),
        llvm_ir::Type::FPType(fp) => Arc::new(crate::ir::Type::Float {
            bits: match fp {
                llvm_ir::types::FPType::Half => 16,
                llvm_ir::types::FPType::Single => 32,
                llvm_ir::types::FPType::Double => 64,
                _ => 128,
            },
        }),
        llvm_ir::Type::PointerType { pointee_type, .. } => {
            types::pointer_to(convert_type(pointee_type))
        }
        llvm_ir::Type::ArrayType {
            element_type,
            num_elements,
        } => types::array_of(convert_type(element_type), *num_elements),
        llvm_ir::Type::StructType {
            element_types,
            is_packed,
        } => Arc::new(crate::ir::Type::Struct {
            fields: element_types.iter().map(|t| convert_type(t)).collect(),
            is_packed: *is_packed,
        }),
        // Named structs stay symbolic; their definitions are recorded once
        // in `Module::struct_types`.
        llvm_ir::Type::NamedStructType { name } => types::named_struct(name),
        llvm_ir::Type::FuncType {
            result_type,
            param_types,
            is_var_arg,
        } => types::function_type(
            convert_type(result_type),
            param_types.iter().map(|t| convert_type(t)).collect(),
            *is_var_arg,
        ),
        llvm_ir::Type::MetadataType => Arc::new(crate::ir::Type::Metadata),
        llvm_ir::Type::LabelType => Arc::new(crate::ir::Type::Label),
        _ => Arc::new(crate::ir::Type::Other),
    }
}

fn convert_constant(
    c: &llvm_ir::Constant,
    globals: &HashMap<String, Arc<Constant>>,
) -> Result<Arc<Constant>, Error> {
    Ok(match c {
        llvm_ir::Constant::Int { bits, value } => Arc::new(Constant::Int {
            bits: *bits,
            value: *value,
        }),
        llvm_ir::Constant::Null(_) | llvm_ir::Constant::AggregateZero(_) => {
            Arc::new(Constant::Null)
        }
        llvm_ir::Constant::Undef(_) => Arc::new(Constant::Undef),
        llvm_ir::Constant::GlobalReference { name, .. } => {
            let key = name_string(name);
            globals
                .get(&key)
                .cloned()
                .ok_or_else(|| Error(format!("Unknown global reference: {}", key)))?
        }
        llvm_ir::Constant::Struct { values, .. } => Arc::new(Constant::Struct(
            values
                .iter()
                .map(|v| convert_constant(v, globals))
                .collect::<Result<_, _>>()?,
        )),
        llvm_ir::Constant::Array { elements, .. } => Arc::new(Constant::Array(
            elements
                .iter()
                .map(|v| convert_constant(v, globals))
                .collect::<Result<_, _>>()?,
        )),
        llvm_ir::Constant::BitCast(bc) => {
            Arc::new(Constant::BitCast(convert_constant(&bc.operand, globals)?))
        }
        llvm_ir::Constant::GetElementPtr(gep) => Arc::new(Constant::GetElementPtr(
            convert_constant(&gep.address, globals)?,
        )),
        _ => Arc::new(Constant::Other),
    })
}

struct FunctionCx<'m> {
    types: &'m Types,
    globals: &'m HashMap<String, Arc<Constant>>,
    locals: HashMap<&'m Name, Arc<Operand>>,
}

impl<'m> FunctionCx<'m> {
    fn operand(&self, op: &llvm_ir::Operand) -> Result<Arc<Operand>, Error> {
        match op {
            llvm_ir::Operand::LocalOperand { name, .. } => self
                .locals
                .get(name)
                .cloned()
                .ok_or_else(|| Error(format!("Bad local: {}", name))),
            llvm_ir::Operand::ConstantOperand(cref) => Ok(Operand::constant(
                convert_constant(cref, self.globals)?,
                convert_type(&op.get_type(self.types)),
            )),
            llvm_ir::Operand::MetadataOperand => Ok(Arc::new(Operand {
                kind: OperandKind::Metadata,
                ty: Arc::new(crate::ir::Type::Metadata),
            })),
        }
    }

    fn operands<A>(&self, ops: &[(llvm_ir::Operand, A)]) -> Result<Vec<Arc<Operand>>, Error> {
        ops.iter().map(|(op, _)| self.operand(op)).collect()
    }

    fn callee<A>(&self, f: &Either<A, llvm_ir::Operand>) -> Result<Callee, Error> {
        Ok(match f {
            Either::Left(_asm) => Callee::Asm,
            Either::Right(op) => Callee::Operand(self.operand(op)?),
        })
    }

    fn opcode(&self, i: &llvm_ir::Instruction) -> Result<Opcode, Error> {
        Ok(match i {
            llvm_ir::Instruction::Alloca(a) => Opcode::Alloca(Alloca {
                allocated_type: convert_type(&a.allocated_type),
                num_elements: self.operand(&a.num_elements)?,
            }),
            llvm_ir::Instruction::BitCast(bc) => Opcode::BitCast(BitCast {
                pointer: self.operand(&bc.operand)?,
            }),
            llvm_ir::Instruction::Call(c) => Opcode::Call(Call {
                callee: self.callee(&c.function)?,
                args: self.operands(&c.arguments)?,
            }),
            llvm_ir::Instruction::GetElementPtr(g) => Opcode::GetElementPtr(GetElementPtr {
                pointer: self.operand(&g.address)?,
                indices: g
                    .indices
                    .iter()
                    .map(|ix| self.operand(ix))
                    .collect::<Result<_, _>>()?,
            }),
            llvm_ir::Instruction::Load(l) => Opcode::Load(Load {
                pointer: self.operand(&l.address)?,
            }),
            llvm_ir::Instruction::Phi(p) => Opcode::Phi(Phi {
                values: p
                    .incoming_values
                    .iter()
                    .map(|(v, _)| self.operand(v))
                    .collect::<Result<_, _>>()?,
            }),
            llvm_ir::Instruction::Select(s) => Opcode::Select(Select {
                true_value: self.operand(&s.true_value)?,
                false_value: self.operand(&s.false_value)?,
            }),
            llvm_ir::Instruction::Store(s) => Opcode::Store(Store {
                value: self.operand(&s.value)?,
                pointer: self.operand(&s.address)?,
            }),
            _ => Opcode::Other,
        })
    }

    fn terminator_opcode(&self, t: &llvm_ir::Terminator) -> Result<TerminatorOpcode, Error> {
        Ok(match t {
            llvm_ir::Terminator::Ret(r) => TerminatorOpcode::Ret(Ret {
                operand: match &r.return_operand {
                    Some(op) => Some(self.operand(op)?),
                    None => None,
                },
            }),
            llvm_ir::Terminator::Invoke(iv) => TerminatorOpcode::Invoke(crate::ir::Invoke {
                callee: self.callee(&iv.function)?,
                args: self.operands(&iv.arguments)?,
                return_label: name_string(&iv.return_label),
                unwind_label: name_string(&iv.exception_label),
            }),
            _ => TerminatorOpcode::Other,
        })
    }
}

fn convert_function(
    module: &mut Module,
    m: &llvm_ir::Module,
    globals: &HashMap<String, Arc<Constant>>,
    f: &llvm_ir::Function,
) -> Result<(), Error> {
    let f_name = module.intern_function_name(&f.name);

    let mut cx = FunctionCx {
        types: &m.types,
        globals,
        locals: HashMap::new(),
    };

    let mut parameters = Vec::with_capacity(f.parameters.len());
    for p in &f.parameters {
        let p_name = UArc::new(ParameterName::new(f_name.clone(), &name_string(&p.name)));
        let op = Operand::parameter(p_name, convert_type(&p.ty));
        parameters.push(op.clone());
        cx.locals.insert(&p.name, op);
    }

    // First pass: allocate names for every block, instruction, and
    // terminator, and register SSA results, because blocks may reference
    // values defined later.
    let mut block_names = Vec::with_capacity(f.basic_blocks.len());
    let mut inst_names: Vec<Vec<UArc<InstructionName>>> = Vec::with_capacity(f.basic_blocks.len());
    let mut term_names = Vec::with_capacity(f.basic_blocks.len());
    for b in &f.basic_blocks {
        let b_name = UArc::new(BlockName::new(f_name.clone(), &name_string(&b.name)));
        let mut names = Vec::with_capacity(b.instrs.len());
        for (idx, instr) in b.instrs.iter().enumerate() {
            let i_name = UArc::new(InstructionName::new(f_name.clone(), b_name.clone(), idx));
            if let Some(n) = instr.try_get_result() {
                cx.locals.insert(
                    n,
                    Operand::instruction_result(
                        i_name.clone(),
                        convert_type(&instr.get_type(&m.types)),
                    ),
                );
            }
            names.push(i_name);
        }
        let t_name = UArc::new(InstructionName::new(
            f_name.clone(),
            b_name.clone(),
            b.instrs.len() + 1,
        ));
        if let Some(n) = b.term.try_get_result() {
            cx.locals.insert(
                n,
                Operand::instruction_result(
                    t_name.clone(),
                    convert_type(&b.term.get_type(&m.types)),
                ),
            );
        }
        block_names.push(b_name);
        inst_names.push(names);
        term_names.push(t_name);
    }

    // Second pass: build the blocks.
    let mut blocks = Vec::with_capacity(f.basic_blocks.len());
    for (bi, b) in f.basic_blocks.iter().enumerate() {
        let mut instrs = Vec::with_capacity(b.instrs.len());
        for (idx, i) in b.instrs.iter().enumerate() {
            instrs.push(Instruction::new(
                inst_names[bi][idx].clone(),
                cx.opcode(i)?,
                convert_type(&i.get_type(&m.types)),
            ));
        }
        let terminator = Terminator::new(
            term_names[bi].clone(),
            cx.terminator_opcode(&b.term)?,
            convert_type(&b.term.get_type(&m.types)),
        );
        blocks.push(Block {
            name: block_names[bi].clone(),
            instrs,
            terminator: Arc::new(terminator),
        });
    }

    module.add_function(
        f_name,
        Function {
            parameters,
            blocks,
            return_type: convert_type(&f.return_type),
            is_var_arg: f.is_var_arg,
        },
    );
    Ok(())
}

/// Parse the `llvm.global_ctors` / `llvm.global_dtors` table layout:
/// an array of `{ i32 priority, void ()* fn, i8* data }` entries.
fn ctor_entries(init: &Constant) -> Vec<GlobalCtor> {
    let Constant::Array(entries) = init else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for entry in entries {
        let Constant::Struct(fields) = entry.as_ref() else {
            continue;
        };
        let priority = fields
            .first()
            .and_then(|c| c.int_value())
            .unwrap_or(u16::MAX as u64) as u16;
        if let Some(function) = fields.get(1).and_then(|c| c.functions().into_iter().next()) {
            out.push(GlobalCtor { priority, function });
        }
    }
    out
}

/// Convert a parsed bitcode module into the analysis representation.
pub fn module(m: &llvm_ir::Module) -> Result<Module, Error> {
    let mut module = Module::new();

    // Intern every global name first so constants can refer to functions and
    // globals in any order.
    let mut global_consts: HashMap<String, Arc<Constant>> = HashMap::with_capacity(
        m.functions.len() + m.func_declarations.len() + m.global_vars.len(),
    );
    for f in &m.functions {
        let name = module.intern_function_name(&f.name);
        global_consts.insert(f.name.clone(), Arc::new(Constant::Function(name)));
    }
    for d in &m.func_declarations {
        let name = module.intern_function_name(&d.name);
        global_consts.insert(d.name.clone(), Arc::new(Constant::Function(name)));
    }
    let mut global_names = Vec::with_capacity(m.global_vars.len());
    for g in &m.global_vars {
        let key = name_string(&g.name);
        let name = Arc::new(GlobalName::new(&key));
        global_consts.insert(key, Arc::new(Constant::Global(name.clone())));
        global_names.push(name);
    }

    for (g, name) in m.global_vars.iter().zip(global_names) {
        let initializer = match &g.initializer {
            Some(c) => Some(convert_constant(c, &global_consts)?),
            None => None,
        };
        match name.get() {
            "llvm.global_ctors" => {
                if let Some(init) = &initializer {
                    module.ctors = ctor_entries(init);
                }
            }
            "llvm.global_dtors" => {
                if let Some(init) = &initializer {
                    module.dtors = ctor_entries(init);
                }
            }
            _ => (),
        }
        module.add_global(
            name,
            Global {
                initializer,
                is_const: g.is_constant,
                ty: convert_type(&g.ty),
            },
        );
    }

    for d in &m.func_declarations {
        let name = module.intern_function_name(&d.name);
        module.add_decl(
            name,
            Decl {
                parameters: d.parameters.iter().map(|p| convert_type(&p.ty)).collect(),
                return_type: convert_type(&d.return_type),
                is_var_arg: d.is_var_arg,
            },
        );
    }

    for f in &m.functions {
        convert_function(&mut module, m, &global_consts, f)?;
    }

    for name in m.types.all_struct_names() {
        if let Some(NamedStructDef::Defined(def)) = m.types.named_struct_def(name) {
            module
                .struct_types
                .insert(name.to_string(), convert_type(def));
        }
    }

    Ok(module)
}
