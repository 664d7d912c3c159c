// SPDX-License-Identifier: BSD-3-Clause
use std::fmt::Display;

use crate::arc::UArc;

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct GlobalName(String);

impl GlobalName {
    pub fn new(s: &str) -> Self {
        GlobalName(s.to_string())
    }

    pub fn get(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GlobalName {
    fn from(s: &str) -> Self {
        GlobalName(s.to_string())
    }
}

impl Display for GlobalName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FunctionName(String);

impl From<&str> for FunctionName {
    fn from(s: &str) -> Self {
        FunctionName(s.to_string())
    }
}

impl From<String> for FunctionName {
    fn from(s: String) -> Self {
        FunctionName(s)
    }
}

impl<T> PartialEq<T> for FunctionName
where
    T: AsRef<str>,
{
    fn eq(&self, other: &T) -> bool {
        self.0.as_str().eq(other.as_ref())
    }
}

impl FunctionName {
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for FunctionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockName {
    parent_function: UArc<FunctionName>,
    label: String,
}

impl BlockName {
    pub fn new(parent_function: UArc<FunctionName>, label: &str) -> Self {
        Self {
            parent_function,
            label: label.to_string(),
        }
    }

    pub fn function(&self) -> &UArc<FunctionName> {
        &self.parent_function
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Display for BlockName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.parent_function.get(), self.label)
    }
}

/// Identity of one instruction (or terminator): function, block, and the
/// instruction's index within the block. Terminators use index `len + 1`, so
/// the numbering never collides with ordinary instructions.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstructionName {
    parent_function: UArc<FunctionName>,
    parent_block: UArc<BlockName>,
    idx: usize,
}

impl InstructionName {
    pub fn new(
        parent_function: UArc<FunctionName>,
        parent_block: UArc<BlockName>,
        idx: usize,
    ) -> Self {
        Self {
            parent_function,
            parent_block,
            idx,
        }
    }

    pub fn function(&self) -> &UArc<FunctionName> {
        &self.parent_function
    }

    pub fn block(&self) -> &UArc<BlockName> {
        &self.parent_block
    }

    pub fn index(&self) -> usize {
        self.idx
    }
}

impl Display for InstructionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.parent_block, self.idx)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ParameterName {
    parent_function: UArc<FunctionName>,
    name: String,
}

impl ParameterName {
    pub fn new(parent_function: UArc<FunctionName>, name: &str) -> Self {
        Self {
            parent_function,
            name: name.to_string(),
        }
    }

    pub fn function(&self) -> &UArc<FunctionName> {
        &self.parent_function
    }
}

impl Display for ParameterName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.parent_function.get(), self.name)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum LocalName {
    Parameter(UArc<ParameterName>),
    Instruction(UArc<InstructionName>),
}

impl Display for LocalName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocalName::Parameter(p) => write!(f, "{}", p),
            LocalName::Instruction(i) => write!(f, "{}", i),
        }
    }
}
