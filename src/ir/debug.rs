//! Debug metadata
//!
//! A parallel structure associating source positions with the generated
//! module, rooted in a compile-unit and entry-function descriptor.
//! Instruction positions live on the instructions themselves; this table
//! holds the unit descriptor and the per-variable declaration records.
//! The whole table is absent when the profile disables debug info.

use crate::span::Position;

use super::types::VReg;

/// Debug metadata for one compilation unit
#[derive(Debug, Clone)]
pub struct DebugTable {
    /// Source file basename
    pub file: String,
    /// Directory containing the source file
    pub directory: String,
    /// Compiler identification string
    pub producer: String,
    /// Whether the unit was built with optimization enabled
    pub optimized: bool,
    /// Descriptor for the generated entry function
    pub entry: SubprogramRecord,
    /// One declaration record per distinct variable, at its
    /// first-assignment position
    pub variables: Vec<VariableRecord>,
}

/// Descriptor for a generated function
#[derive(Debug, Clone)]
pub struct SubprogramRecord {
    pub name: String,
    pub line: u32,
}

/// Declaration record tying a variable to its storage slot and the
/// position of its first assignment
#[derive(Debug, Clone)]
pub struct VariableRecord {
    pub name: String,
    pub slot: VReg,
    pub pos: Position,
}

impl DebugTable {
    pub fn new(
        file: impl Into<String>,
        directory: impl Into<String>,
        producer: impl Into<String>,
        optimized: bool,
        entry: SubprogramRecord,
    ) -> Self {
        Self {
            file: file.into(),
            directory: directory.into(),
            producer: producer.into(),
            optimized,
            entry,
            variables: Vec::new(),
        }
    }

    /// Register a variable declaration at its first assignment
    pub fn declare_variable(&mut self, name: impl Into<String>, slot: VReg, pos: Position) {
        self.variables.push(VariableRecord { name: name.into(), slot, pos });
    }

    /// Declaration record for a given storage slot
    pub fn variable_for_slot(&self, slot: VReg) -> Option<&VariableRecord> {
        self.variables.iter().find(|v| v.slot == slot)
    }
}
