//! Rill compiler
//!
//! Compiler front end for Rill, a minimal imperative integer-only
//! language. The pipeline is a single directional pass:
//!
//! ```text
//! Source Code (.rill)
//!       │
//!       ▼
//! ┌─────────────┐
//! │    Lexer    │  → Tokens
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │   Parser    │  → AST
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │ IR Lowering │  → CFG IR (+ debug metadata, verified, optimized)
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Serializer │  → textual IR artifact for the native backend
//! └─────────────┘
//! ```
//!
//! Each compilation owns an isolated context (token list, AST, symbol
//! table, IR module); nothing is shared between runs.

pub mod span;
pub mod token;
pub mod lexer;
pub mod ast;
pub mod parser;
pub mod profile;
pub mod ir;

// Re-exports for convenience
pub use lexer::LexError;
pub use parser::ParseError;
pub use profile::{OptLevel, Profile, Target};

use thiserror::Error;

/// Compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File extension for Rill source files
pub const FILE_EXTENSION: &str = "rill";

/// The single terminal failure type handed to the driver. Every error
/// is fatal and aborts the whole compilation; there is no recovery and
/// no partial output.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] lexer::LexError),

    #[error(transparent)]
    Parse(#[from] parser::ParseError),

    #[error(transparent)]
    Codegen(#[from] ir::CodegenError),
}

/// Compile Rill source text into a verified, optimized IR module.
/// `source_path` names the compilation unit for diagnostics and debug
/// metadata; the file itself is read by the caller.
pub fn compile(
    source: &str,
    source_path: &str,
    profile: Profile,
) -> Result<ir::Module, CompileError> {
    let tokens = lexer::tokenize(source)?;
    tracing::debug!(tokens = tokens.len(), "lexed source");

    let program = parser::parse(tokens, source)?;
    tracing::debug!(statements = program.statements.len(), "parsed program");

    let module = ir::generate(&program, profile, source_path)?;
    Ok(module)
}
