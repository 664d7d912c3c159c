// SPDX-License-Identifier: BSD-3-Clause
use std::fmt::Display;

use crate::arc::Arc;

pub type TypeRef = Arc<Type>;

/// The struct type that C front-ends emit for the target va_list ABI. The
/// flow-function library recognizes allocas of `[N x %struct.__va_list_tag]`
/// as the stand-in for a variadic callee's unbound extra actuals.
pub const VA_LIST_TAG: &str = "struct.__va_list_tag";

/// Structural types of the IR. Just enough structure for the analyses: the
/// core needs to see pointers (argument mapping), named structs (receiver
/// types, vtables), arrays of `va_list_tag` (variadics), and function types
/// (indirect-call compatibility).
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Type {
    Void,
    Integer {
        bits: u32,
    },
    Float {
        bits: u32,
    },
    Pointer {
        pointee: TypeRef,
    },
    Array {
        element: TypeRef,
        num_elements: usize,
    },
    Struct {
        fields: Vec<TypeRef>,
        is_packed: bool,
    },
    NamedStruct {
        name: String,
    },
    Function {
        result: TypeRef,
        params: Vec<TypeRef>,
        is_var_arg: bool,
    },
    Metadata,
    Label,
    Other,
}

impl Type {
    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer { .. })
    }

    pub fn pointee(&self) -> Option<&TypeRef> {
        match self {
            Type::Pointer { pointee } => Some(pointee),
            _ => None,
        }
    }

    pub fn struct_name(&self) -> Option<&str> {
        match self {
            Type::NamedStruct { name } => Some(name),
            _ => None,
        }
    }

    /// The struct type a pointer of this type points at, if any.
    pub fn pointee_struct_name(&self) -> Option<&str> {
        self.pointee().and_then(|p| p.struct_name())
    }

    /// `[N x %struct.__va_list_tag]` for some `N >= 1`.
    pub fn is_va_list_array(&self) -> bool {
        match self {
            Type::Array {
                element,
                num_elements,
            } => *num_elements >= 1 && element.struct_name() == Some(VA_LIST_TAG),
            _ => false,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Integer { bits } => write!(f, "i{}", bits),
            Type::Float { bits } => write!(f, "f{}", bits),
            Type::Pointer { pointee } => write!(f, "{}*", pointee.as_ref()),
            Type::Array {
                element,
                num_elements,
            } => write!(f, "[{} x {}]", num_elements, element.as_ref()),
            Type::Struct { fields, is_packed } => {
                if *is_packed {
                    write!(f, "<")?;
                }
                write!(f, "{{ ")?;
                for (i, t) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t.as_ref())?;
                }
                write!(f, " }}")?;
                if *is_packed {
                    write!(f, ">")?;
                }
                Ok(())
            }
            Type::NamedStruct { name } => write!(f, "%{}", name),
            Type::Function {
                result,
                params,
                is_var_arg,
            } => {
                write!(f, "{} (", result.as_ref())?;
                for (i, t) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t.as_ref())?;
                }
                if *is_var_arg {
                    if !params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
            Type::Metadata => write!(f, "metadata"),
            Type::Label => write!(f, "label"),
            Type::Other => write!(f, "<other>"),
        }
    }
}

/// Shorthand constructors, mostly for tests and the global-model synthesis.
pub fn void() -> TypeRef {
    Arc::new(Type::Void)
}

pub fn int(bits: u32) -> TypeRef {
    Arc::new(Type::Integer { bits })
}

pub fn pointer_to(pointee: TypeRef) -> TypeRef {
    Arc::new(Type::Pointer { pointee })
}

pub fn named_struct(name: &str) -> TypeRef {
    Arc::new(Type::NamedStruct {
        name: name.to_string(),
    })
}

pub fn array_of(element: TypeRef, num_elements: usize) -> TypeRef {
    Arc::new(Type::Array {
        element,
        num_elements,
    })
}

pub fn function_type(result: TypeRef, params: Vec<TypeRef>, is_var_arg: bool) -> TypeRef {
    Arc::new(Type::Function {
        result,
        params,
        is_var_arg,
    })
}
