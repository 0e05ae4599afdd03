//! IR builder
//!
//! Helper for constructing a function's instructions and basic blocks.
//! The builder keeps a movable insertion cursor over the function's
//! blocks and stamps every emitted instruction with the current source
//! location. Storage slots are always inserted into the entry block,
//! before the first non-alloca instruction already present, no matter
//! where the cursor currently points.

use crate::span::Position;

use super::instr::{CmpOp, Instruction, InstrKind, Terminator, TermKind};
use super::types::{BasicBlock, BlockId, Constant, Function, Ty, Visibility, VReg};

/// Builder for a single function
pub struct FuncBuilder {
    func: Function,
    next_vreg: u32,
    next_block: u32,
    /// Index of the block the cursor points at
    cursor: usize,
    /// Location stamped on emitted instructions (None when debug info
    /// is disabled)
    loc: Option<Position>,
}

impl FuncBuilder {
    /// Start a function with an empty entry block; the cursor points at
    /// the entry block.
    pub fn new(name: impl Into<String>, ret: Ty, visibility: Visibility) -> Self {
        let mut builder = Self {
            func: Function {
                name: name.into(),
                ret,
                params: Vec::new(),
                is_vararg: false,
                is_external: false,
                visibility,
                blocks: Vec::new(),
            },
            next_vreg: 0,
            next_block: 0,
            cursor: 0,
            loc: None,
        };
        let entry = builder.push_block("entry");
        builder.cursor = entry.0 as usize;
        builder
    }

    /// Finish building and return the function
    pub fn finish(self) -> Function {
        self.func
    }

    fn fresh_vreg(&mut self) -> VReg {
        let vreg = VReg(self.next_vreg);
        self.next_vreg += 1;
        vreg
    }

    fn push_block(&mut self, label: &str) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        let label = if id.0 == 0 {
            label.to_string()
        } else {
            // Uniquify repeated labels across nested conditionals
            format!("{}{}", label, id.0)
        };
        self.func.blocks.push(BasicBlock::new(id, label));
        id
    }

    // ============ Cursor and locations ============

    /// Create a new block appended after the existing ones
    pub fn create_block(&mut self, label: &str) -> BlockId {
        self.push_block(label)
    }

    /// Move the insertion cursor to the end of a block
    pub fn position_at_end(&mut self, id: BlockId) {
        debug_assert!((id.0 as usize) < self.func.blocks.len());
        self.cursor = id.0 as usize;
    }

    /// The block the cursor points at
    pub fn current_block(&self) -> BlockId {
        self.func.blocks[self.cursor].id
    }

    /// Whether the current block already ends in a terminator
    pub fn has_terminator(&self) -> bool {
        self.func.blocks[self.cursor].terminator.is_some()
    }

    /// Set the source location attached to instructions emitted next
    pub fn set_loc(&mut self, pos: Position) {
        self.loc = Some(pos);
    }

    // ============ Instruction emission ============

    fn emit(&mut self, kind: InstrKind) -> VReg {
        let result = self.fresh_vreg();
        self.func.blocks[self.cursor]
            .instructions
            .push(Instruction::new(Some(result), kind, self.loc));
        result
    }

    fn emit_void(&mut self, kind: InstrKind) {
        self.func.blocks[self.cursor]
            .instructions
            .push(Instruction::new(None, kind, self.loc));
    }

    /// Allocate a storage slot in the entry block. The slot is inserted
    /// before the first non-alloca instruction already present, so slots
    /// stay hoisted regardless of where the cursor is.
    pub fn entry_alloca(&mut self, name: &str) -> VReg {
        let result = self.fresh_vreg();
        let entry = &mut self.func.blocks[0];
        let at = entry
            .instructions
            .iter()
            .position(|i| !matches!(i.kind, InstrKind::Alloca { .. }))
            .unwrap_or(entry.instructions.len());
        entry.instructions.insert(
            at,
            Instruction::new(Some(result), InstrKind::Alloca { name: name.to_string() }, self.loc),
        );
        result
    }

    pub fn const_int(&mut self, value: i64) -> VReg {
        self.emit(InstrKind::Const(Constant::Int(value)))
    }

    pub fn load(&mut self, slot: VReg) -> VReg {
        self.emit(InstrKind::Load { slot })
    }

    pub fn store(&mut self, slot: VReg, value: VReg) {
        self.emit_void(InstrKind::Store { slot, value });
    }

    pub fn add(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit(InstrKind::Add(a, b))
    }

    pub fn sub(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit(InstrKind::Sub(a, b))
    }

    pub fn mul(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit(InstrKind::Mul(a, b))
    }

    pub fn sdiv(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit(InstrKind::SDiv(a, b))
    }

    pub fn icmp(&mut self, op: CmpOp, a: VReg, b: VReg) -> VReg {
        self.emit(InstrKind::ICmp(op, a, b))
    }

    pub fn sext(&mut self, value: VReg, from: Ty, to: Ty) -> VReg {
        self.emit(InstrKind::SExt { value, from, to })
    }

    pub fn global_addr(&mut self, name: &str) -> VReg {
        self.emit(InstrKind::GlobalAddr { name: name.to_string() })
    }

    pub fn call(&mut self, func: impl Into<String>, args: Vec<VReg>) -> VReg {
        self.emit(InstrKind::Call { func: func.into(), args })
    }

    // ============ Terminators ============

    fn terminate(&mut self, kind: TermKind) {
        let block = &mut self.func.blocks[self.cursor];
        debug_assert!(block.terminator.is_none(), "block terminated twice");
        block.terminator = Some(Terminator { kind, loc: self.loc });
    }

    pub fn ret(&mut self, value: Option<Constant>) {
        self.terminate(TermKind::Ret { value });
    }

    pub fn br(&mut self, target: BlockId) {
        self.terminate(TermKind::Br { target });
    }

    pub fn cond_br(&mut self, cond: VReg, then_block: BlockId, else_block: BlockId) {
        self.terminate(TermKind::CondBr { cond, then_block, else_block });
    }
}
