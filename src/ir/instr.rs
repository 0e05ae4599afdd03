//! IR instructions
//!
//! Instruction and terminator definitions. Every instruction and
//! terminator carries an optional source position; positions are present
//! on every operation exactly when debug info is enabled.

use crate::span::Position;
use std::fmt;

use super::types::{BlockId, Constant, Ty, VReg};

/// An instruction in the IR
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Result register (None for void instructions)
    pub result: Option<VReg>,
    /// The instruction kind
    pub kind: InstrKind,
    /// Source position of the construct that produced this instruction
    pub loc: Option<Position>,
}

impl Instruction {
    pub fn new(result: Option<VReg>, kind: InstrKind, loc: Option<Position>) -> Self {
        Self { result, kind, loc }
    }

    /// Instructions that must survive even when their result is unused
    pub fn has_side_effects(&self) -> bool {
        matches!(self.kind, InstrKind::Store { .. } | InstrKind::Call { .. })
    }

    /// Registers read by this instruction
    pub fn operands(&self) -> Vec<VReg> {
        match &self.kind {
            InstrKind::Const(_) | InstrKind::Alloca { .. } | InstrKind::GlobalAddr { .. } => {
                Vec::new()
            }
            InstrKind::Load { slot } => vec![*slot],
            InstrKind::Store { slot, value } => vec![*slot, *value],
            InstrKind::Add(a, b)
            | InstrKind::Sub(a, b)
            | InstrKind::Mul(a, b)
            | InstrKind::SDiv(a, b)
            | InstrKind::ICmp(_, a, b) => vec![*a, *b],
            InstrKind::SExt { value, .. } => vec![*value],
            InstrKind::Call { args, .. } => args.clone(),
        }
    }
}

/// Kinds of instructions
#[derive(Debug, Clone)]
pub enum InstrKind {
    /// A constant value; never materialized as an operation, only
    /// referenced from operand positions
    Const(Constant),

    /// An i64 storage slot in the entry block, one per variable
    Alloca { name: String },
    /// Load the current value of a slot
    Load { slot: VReg },
    /// Store a value into a slot
    Store { slot: VReg, value: VReg },

    // Arithmetic (i64, wrapping as the target wraps)
    Add(VReg, VReg),
    Sub(VReg, VReg),
    Mul(VReg, VReg),
    SDiv(VReg, VReg),

    /// Signed integer comparison producing an i1
    ICmp(CmpOp, VReg, VReg),
    /// Sign extension (widens comparison results back to i64)
    SExt { value: VReg, from: Ty, to: Ty },

    /// Address of a module global
    GlobalAddr { name: String },
    /// Call a declared function
    Call { func: String, args: Vec<VReg> },
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Signed less than
    Slt,
    /// Signed less than or equal
    Sle,
    /// Signed greater than
    Sgt,
    /// Signed greater than or equal
    Sge,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Slt => "slt",
            CmpOp::Sle => "sle",
            CmpOp::Sgt => "sgt",
            CmpOp::Sge => "sge",
        };
        write!(f, "{}", s)
    }
}

/// A block terminator with its source position
#[derive(Debug, Clone)]
pub struct Terminator {
    pub kind: TermKind,
    pub loc: Option<Position>,
}

/// Control-transfer instructions
#[derive(Debug, Clone)]
pub enum TermKind {
    /// Return from the function
    Ret { value: Option<Constant> },
    /// Unconditional branch
    Br { target: BlockId },
    /// Conditional branch on an i1
    CondBr {
        cond: VReg,
        then_block: BlockId,
        else_block: BlockId,
    },
}

impl Terminator {
    /// Register read by this terminator, if any
    pub fn operand(&self) -> Option<VReg> {
        match self.kind {
            TermKind::CondBr { cond, .. } => Some(cond),
            TermKind::Ret { .. } | TermKind::Br { .. } => None,
        }
    }

    /// Blocks this terminator can transfer control to
    pub fn successors(&self) -> Vec<BlockId> {
        match self.kind {
            TermKind::Ret { .. } => Vec::new(),
            TermKind::Br { target } => vec![target],
            TermKind::CondBr { then_block, else_block, .. } => vec![then_block, else_block],
        }
    }
}
