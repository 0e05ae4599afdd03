//! Rill intermediate representation
//!
//! A control-flow-graph IR built once per compilation: a module owning
//! one entry function made of basic blocks, each ending in exactly one
//! terminator, with source positions attached to every operation when
//! debug info is enabled. The module is verified for structural
//! well-formedness, optionally rewritten by the optimization pipeline,
//! and serialized to a textual LLVM-compatible artifact.

mod instr;
mod types;
mod debug;
mod builder;
mod lower;
mod verify;
mod opt;
mod emit;

// Re-export in logical order
pub use instr::*;
pub use types::*;
pub use debug::*;
pub use builder::*;
pub use lower::*;
pub use verify::*;
pub use opt::*;
pub use emit::*;
