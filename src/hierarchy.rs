// SPDX-License-Identifier: BSD-3-Clause
//! Type hierarchy: which named struct types extend which, and what their
//! virtual-function tables contain. Answers the two questions call
//! resolution needs: "does this type have a vtable?" and "which slot does
//! this call site read?".

use std::collections::{BTreeSet, HashMap};

use crate::arc::UArc;
use crate::ir::instruction::Opcode;
use crate::ir::{AbstractCallSite, Function, FunctionName, Module, Type};

#[derive(Debug, Default)]
pub struct TypeHierarchy {
    types: BTreeSet<String>,
    /// Direct subtypes, keyed by supertype name.
    subtypes: HashMap<String, BTreeSet<String>>,
    /// Vtable layout per type: slot index to function.
    vtables: HashMap<String, Vec<UArc<FunctionName>>>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&mut self, name: &str) {
        self.types.insert(name.to_string());
    }

    pub fn add_subtype(&mut self, supertype: &str, subtype: &str) {
        self.add_type(supertype);
        self.add_type(subtype);
        self.subtypes
            .entry(supertype.to_string())
            .or_default()
            .insert(subtype.to_string());
    }

    pub fn set_vtable(&mut self, name: &str, table: Vec<UArc<FunctionName>>) {
        self.add_type(name);
        self.vtables.insert(name.to_string(), table);
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains(name)
    }

    pub fn has_vtable(&self, name: &str) -> bool {
        self.vtables.contains_key(name)
    }

    /// All transitive subtypes of `name`, including `name` itself.
    pub fn subtypes_of(&self, name: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut stack = vec![name.to_string()];
        while let Some(t) = stack.pop() {
            if !out.insert(t.clone()) {
                continue;
            }
            if let Some(subs) = self.subtypes.get(&t) {
                stack.extend(subs.iter().cloned());
            }
        }
        out
    }

    pub fn vtable_entry(&self, name: &str, slot: usize) -> Option<&UArc<FunctionName>> {
        self.vtables.get(name)?.get(slot)
    }

    /// Minimal extraction from a module: first-member struct embedding is
    /// subtyping, `_ZTVnX`-named constant globals are vtables.
    pub fn of_module(m: &Module) -> Self {
        let mut th = TypeHierarchy::new();
        for (name, ty) in &m.struct_types {
            th.add_type(name);
            if let Type::Struct { fields, .. } = ty.as_ref() {
                if let Some(base) = fields.first().and_then(|f| f.struct_name()) {
                    th.add_subtype(base, name);
                }
            }
        }
        for (g_name, g) in &m.globals {
            let Some(ty_name) = vtable_type_name(g_name.get()) else {
                continue;
            };
            let Some(init) = &g.initializer else {
                continue;
            };
            let fns = init.functions();
            if !fns.is_empty() {
                th.set_vtable(&ty_name, fns);
            }
        }
        th
    }
}

/// `_ZTV7Derived` names the vtable of `struct.Derived` under the Itanium
/// ABI. Returns the struct type key, or `None` for non-vtable globals.
fn vtable_type_name(global: &str) -> Option<String> {
    let rest = global.strip_prefix("_ZTV")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let len: usize = digits.parse().ok()?;
    let name = &rest[digits.len()..];
    if name.len() < len {
        return None;
    }
    Some(format!("struct.{}", &name[..len]))
}

/// The static struct type of a call site's receiver, if the first argument
/// points at a named struct.
pub fn receiver_struct_type(call: &AbstractCallSite) -> Option<String> {
    call.receiver()?
        .ty
        .pointee_struct_name()
        .map(|s| s.to_string())
}

/// Recover the vtable slot a call site reads, from the SSA pattern
/// `call (load (gep (load vtable_ptr), slot))`. Returns `None` when the
/// callee operand does not match the pattern.
pub fn vft_index(caller: &Function, call: &AbstractCallSite) -> Option<usize> {
    let callee_def = call.callee_operand()?.instruction_name()?;
    let fn_ptr_load = match caller.instruction(callee_def)? {
        crate::ir::InstructionRef::Instruction(i) => match i.opcode() {
            Opcode::Load(l) => l.pointer.clone(),
            _ => return None,
        },
        _ => return None,
    };
    let slot_def = match fn_ptr_load.instruction_name() {
        Some(n) => n,
        // The function pointer is not itself loaded from a computed slot.
        None => return None,
    };
    match caller.instruction(slot_def)? {
        crate::ir::InstructionRef::Instruction(i) => match i.opcode() {
            Opcode::GetElementPtr(gep) => {
                // The base of the slot computation must be the loaded vtable
                // pointer.
                let base_is_load = gep
                    .pointer
                    .instruction_name()
                    .and_then(|n| caller.instruction(n))
                    .map(|r| {
                        matches!(
                            r,
                            crate::ir::InstructionRef::Instruction(i)
                                if matches!(i.opcode(), Opcode::Load(_))
                        )
                    })
                    .unwrap_or(false);
                if !base_is_load {
                    return None;
                }
                let slot = gep.indices.last()?.constant_int()?;
                usize::try_from(slot).ok()
            }
            // Slot zero reads through the vtable pointer directly.
            Opcode::Load(_) => Some(0),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::UArc;

    #[test]
    fn transitive_subtypes() {
        let mut th = TypeHierarchy::new();
        th.add_subtype("struct.B", "struct.D");
        th.add_subtype("struct.D", "struct.E");
        let subs = th.subtypes_of("struct.B");
        assert!(subs.contains("struct.B"));
        assert!(subs.contains("struct.D"));
        assert!(subs.contains("struct.E"));
        assert_eq!(subs.len(), 3);
    }

    #[test]
    fn vtable_slots() {
        let mut th = TypeHierarchy::new();
        let f = UArc::new(FunctionName::from("_ZN1B1fEv"));
        th.set_vtable("struct.B", vec![f.clone()]);
        assert!(th.has_vtable("struct.B"));
        assert_eq!(th.vtable_entry("struct.B", 0), Some(&f));
        assert_eq!(th.vtable_entry("struct.B", 1), None);
    }

    #[test]
    fn vtable_global_names() {
        assert_eq!(
            vtable_type_name("_ZTV7Derived"),
            Some("struct.Derived".to_string())
        );
        assert_eq!(vtable_type_name("_ZTV4Base"), Some("struct.Base".to_string()));
        assert_eq!(vtable_type_name("some_global"), None);
        assert_eq!(vtable_type_name("_ZTVoops"), None);
    }
}
