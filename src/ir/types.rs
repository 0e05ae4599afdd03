//! IR types
//!
//! Core data types for the Rill IR: value and block identifiers, the
//! module, functions, basic blocks, globals, and aliases.

use std::fmt;

use super::debug::DebugTable;
use super::instr::{Instruction, Terminator};

/// A virtual register holding the result of one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VReg(pub u32);

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%t{}", self.0)
    }
}

/// A basic block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// IR value types. Rill has one source-level type (signed 64-bit
/// integer); the rest exist for comparisons, slots, and the entry
/// function's return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    /// One-bit truth value (comparison results)
    I1,
    /// 32-bit signed integer (entry function return)
    I32,
    /// 64-bit signed integer (the native Rill integer)
    I64,
    /// Opaque pointer
    Ptr,
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Ty::I1 => "i1",
            Ty::I32 => "i32",
            Ty::I64 => "i64",
            Ty::Ptr => "ptr",
        };
        write!(f, "{}", s)
    }
}

/// A constant value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    Int(i64),
    Str(String),
}

/// Symbol visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Default,
    Hidden,
}

/// A module owns the functions, globals, and aliases produced by one
/// compilation, plus its target parameters and optional debug metadata.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub source_file: String,
    pub triple: String,
    pub data_layout: String,
    pub pic_level: Option<u32>,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
    pub aliases: Vec<Alias>,
    pub debug: Option<DebugTable>,
}

impl Module {
    /// Find a function (defined or declared) by name
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Find a global by name
    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }
}

/// A function definition or external declaration
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub ret: Ty,
    pub params: Vec<Ty>,
    pub is_vararg: bool,
    pub is_external: bool,
    pub visibility: Visibility,
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    /// External declaration with no body
    pub fn declaration(name: impl Into<String>, params: Vec<Ty>, ret: Ty, is_vararg: bool) -> Self {
        Self {
            name: name.into(),
            ret,
            params,
            is_vararg,
            is_external: true,
            visibility: Visibility::Default,
            blocks: Vec::new(),
        }
    }

    /// The entry block holds all storage slots
    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }
}

/// A basic block: a straight-line sequence of instructions ending in
/// exactly one terminator
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    pub fn new(id: BlockId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            instructions: Vec::new(),
            terminator: None,
        }
    }
}

/// A module-level global
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub init: Constant,
    pub is_const: bool,
}

/// An alias naming an existing function body under a second symbol
#[derive(Debug, Clone)]
pub struct Alias {
    pub name: String,
    pub aliasee: String,
}
