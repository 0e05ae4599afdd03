//! AST to IR lowering
//!
//! Walks the program's statement list once and emits the entry function:
//! storage slots hoisted into the entry block, conditionals as
//! then/merge block pairs, output as calls to the formatted-print
//! primitive. The flat symbol table maps each variable name to its slot;
//! names enter the table at their first assignment in traversal order
//! and stay live for the rest of the program. After generation the
//! module is verified and the profile's optimization level is applied.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

use crate::ast::{BinOp, Expr, Program, Stmt};
use crate::profile::{OptLevel, Profile};
use crate::span::Position;

use super::builder::FuncBuilder;
use super::debug::{DebugTable, SubprogramRecord};
use super::instr::CmpOp;
use super::opt::optimize;
use super::types::{Alias, Constant, Function, Global, Module, Ty, Visibility, VReg};
use super::verify::{verify, VerifyError};

/// Name of the exported entry function
pub const ENTRY_FUNCTION: &str = "main";
/// The external formatted-print primitive
pub const PRINT_FUNCTION: &str = "printf";
/// The private format-string global passed to the print primitive
pub const FORMAT_GLOBAL: &str = ".fmt";
/// Format template for the one supported integer type
pub const FORMAT_TEMPLATE: &str = "%lld\n";

/// Code generation errors
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("{pos}: undefined variable '{name}'")]
    UndefinedVariable { name: String, pos: Position },

    /// A structural defect in the generated module. This is a compiler
    /// bug, not a user error.
    #[error("internal error: generated module failed verification\n{0}")]
    Verification(#[from] VerifyError),
}

/// A generated value and its type
#[derive(Clone, Copy)]
struct Value {
    reg: VReg,
    ty: Ty,
}

/// Generate an IR module for a parsed program under the given profile.
/// `source_path` is used for the module name and debug-info file
/// descriptor only; the source itself is already parsed.
pub fn generate(
    program: &Program,
    profile: Profile,
    source_path: &str,
) -> Result<Module, CodegenError> {
    let module = Lowerer::new(profile, source_path).run(program)?;
    tracing::debug!(
        blocks = module.functions.iter().map(|f| f.blocks.len()).sum::<usize>(),
        opt = ?profile.opt,
        target = ?profile.target,
        "generated IR module"
    );
    Ok(module)
}

struct Lowerer {
    profile: Profile,
    builder: FuncBuilder,
    /// Flat symbol table: variable name to storage slot. Populated in
    /// linear traversal order, never scoped.
    vars: HashMap<String, VReg>,
    debug: Option<DebugTable>,
    module_name: String,
    source_file: String,
}

impl Lowerer {
    fn new(profile: Profile, source_path: &str) -> Self {
        let path = Path::new(source_path);
        let source_file = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_path.to_string());
        let directory = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_string_lossy().into_owned(),
            _ => ".".to_string(),
        };
        let module_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "module".to_string());

        let visibility = if profile.target.entry_alias().is_some() {
            Visibility::Hidden
        } else {
            Visibility::Default
        };
        let builder = FuncBuilder::new(ENTRY_FUNCTION, Ty::I32, visibility);

        let debug = profile.debug_info.then(|| {
            DebugTable::new(
                source_file.clone(),
                directory,
                format!("rillc {}", crate::VERSION),
                profile.opt != OptLevel::None,
                SubprogramRecord { name: ENTRY_FUNCTION.to_string(), line: 1 },
            )
        });

        Self {
            profile,
            builder,
            vars: HashMap::new(),
            debug,
            module_name,
            source_file,
        }
    }

    fn run(mut self, program: &Program) -> Result<Module, CodegenError> {
        for stmt in &program.statements {
            self.lower_stmt(stmt)?;
        }

        // Implicit success return
        self.set_loc(Position::new(1, 1));
        self.builder.ret(Some(Constant::Int(0)));

        let target = self.profile.target;
        let mut aliases = Vec::new();
        if let Some(alias) = target.entry_alias() {
            aliases.push(Alias { name: alias.to_string(), aliasee: ENTRY_FUNCTION.to_string() });
        }

        let mut module = Module {
            name: self.module_name,
            source_file: self.source_file,
            triple: target.triple().to_string(),
            data_layout: target.data_layout().to_string(),
            pic_level: target.pic_level(),
            globals: vec![Global {
                name: FORMAT_GLOBAL.to_string(),
                init: Constant::Str(FORMAT_TEMPLATE.to_string()),
                is_const: true,
            }],
            functions: vec![
                Function::declaration(PRINT_FUNCTION, vec![Ty::Ptr], Ty::I32, true),
                self.builder.finish(),
            ],
            aliases,
            debug: self.debug,
        };

        verify(&module)?;
        optimize(&mut module, self.profile.opt);
        Ok(module)
    }

    /// Stamp subsequent instructions with a source location. Does
    /// nothing when the profile disables debug info, so generated
    /// operations then carry no positions at all.
    fn set_loc(&mut self, pos: Position) {
        if self.profile.debug_info {
            self.builder.set_loc(pos);
        }
    }

    // ============ Statements ============

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match stmt {
            Stmt::Assign { name, value, pos } => self.lower_assign(name, value, *pos),
            Stmt::If { condition, body, pos } => self.lower_if(condition, body, *pos),
            Stmt::Out { value, pos } => self.lower_out(value, *pos),
        }
    }

    fn lower_assign(&mut self, name: &str, value: &Expr, pos: Position) -> Result<(), CodegenError> {
        self.set_loc(pos);

        // First assignment allocates the slot (hoisted into the entry
        // block) and registers the declaration record, but the name only
        // becomes readable once the right-hand side has been evaluated:
        // a self-reference on first assignment is an undefined variable.
        let slot = match self.vars.get(name) {
            Some(&slot) => slot,
            None => {
                let slot = self.builder.entry_alloca(name);
                if let Some(debug) = self.debug.as_mut() {
                    debug.declare_variable(name, slot, pos);
                }
                slot
            }
        };

        let value = self.lower_expr(value)?;
        self.vars.insert(name.to_string(), slot);

        self.set_loc(pos);
        self.builder.store(slot, value.reg);
        Ok(())
    }

    fn lower_if(&mut self, condition: &Expr, body: &[Stmt], pos: Position) -> Result<(), CodegenError> {
        self.set_loc(pos);
        let cond = self.lower_expr(condition)?;

        // Arithmetic results are not truth values; synthesize the
        // nonzero test. Comparison results would already be one bit
        // wide, but every expression currently widens back to i64.
        let cond_reg = if cond.ty != Ty::I1 {
            self.set_loc(pos);
            let zero = self.builder.const_int(0);
            self.builder.icmp(CmpOp::Ne, cond.reg, zero)
        } else {
            cond.reg
        };

        let then_block = self.builder.create_block("then");
        let merge_block = self.builder.create_block("merge");
        self.builder.cond_br(cond_reg, then_block, merge_block);

        self.builder.position_at_end(then_block);
        for stmt in body {
            self.lower_stmt(stmt)?;
        }
        // The body cannot terminate its own block in this language, but
        // check anyway before falling through to the merge block.
        if !self.builder.has_terminator() {
            self.builder.br(merge_block);
        }

        self.builder.position_at_end(merge_block);
        Ok(())
    }

    fn lower_out(&mut self, value: &Expr, pos: Position) -> Result<(), CodegenError> {
        self.set_loc(pos);
        let value = self.lower_expr(value)?;

        self.set_loc(pos);
        let fmt = self.builder.global_addr(FORMAT_GLOBAL);
        self.builder.call(PRINT_FUNCTION, vec![fmt, value.reg]);
        Ok(())
    }

    // ============ Expressions ============

    fn lower_expr(&mut self, expr: &Expr) -> Result<Value, CodegenError> {
        match expr {
            Expr::IntLiteral { value, pos } => {
                self.set_loc(*pos);
                let reg = self.builder.const_int(*value);
                Ok(Value { reg, ty: Ty::I64 })
            }
            Expr::Variable { name, pos } => {
                let slot = *self.vars.get(name).ok_or_else(|| CodegenError::UndefinedVariable {
                    name: name.clone(),
                    pos: *pos,
                })?;
                self.set_loc(*pos);
                let reg = self.builder.load(slot);
                Ok(Value { reg, ty: Ty::I64 })
            }
            Expr::Binary { op, lhs, rhs, pos } => {
                let lhs = self.lower_expr(lhs)?;
                let rhs = self.lower_expr(rhs)?;
                // Stamp the operation that produces the value, after
                // both operands have been generated.
                self.set_loc(*pos);
                let reg = match op {
                    BinOp::Add => self.builder.add(lhs.reg, rhs.reg),
                    BinOp::Sub => self.builder.sub(lhs.reg, rhs.reg),
                    BinOp::Mul => self.builder.mul(lhs.reg, rhs.reg),
                    BinOp::Div => self.builder.sdiv(lhs.reg, rhs.reg),
                    BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                        let cmp = self.builder.icmp(cmp_op(*op), lhs.reg, rhs.reg);
                        // Widen the one-bit result back to the native
                        // integer type so it can feed further arithmetic
                        // or the next condition.
                        self.builder.sext(cmp, Ty::I1, Ty::I64)
                    }
                };
                Ok(Value { reg, ty: Ty::I64 })
            }
        }
    }
}

fn cmp_op(op: BinOp) -> CmpOp {
    match op {
        BinOp::Eq => CmpOp::Eq,
        BinOp::Ne => CmpOp::Ne,
        BinOp::Lt => CmpOp::Slt,
        BinOp::Gt => CmpOp::Sgt,
        BinOp::Le => CmpOp::Sle,
        BinOp::Ge => CmpOp::Sge,
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
            unreachable!("arithmetic operator has no comparison predicate")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::InstrKind;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::profile::Target;

    fn lower(source: &str, profile: Profile) -> Result<Module, CodegenError> {
        let program = parse(tokenize(source).expect("lexing failed"), source).expect("parsing failed");
        generate(&program, profile, "test.rill")
    }

    fn main_fn(module: &Module) -> &Function {
        module.function(ENTRY_FUNCTION).expect("entry function exists")
    }

    #[test]
    fn test_undefined_variable_read() {
        let err = lower("out x;", Profile::debug(Target::Native)).unwrap_err();
        match err {
            CodegenError::UndefinedVariable { name, pos } => {
                assert_eq!(name, "x");
                assert_eq!(pos, Position::new(1, 5));
            }
            other => panic!("expected undefined variable, got {:?}", other),
        }
    }

    #[test]
    fn test_order_is_traversal_not_scope() {
        // The later assignment does not make the earlier read valid.
        let err = lower("out x;\nx = 1;", Profile::debug(Target::Native)).unwrap_err();
        assert!(matches!(err, CodegenError::UndefinedVariable { .. }));
    }

    #[test]
    fn test_self_reference_on_first_assignment() {
        let err = lower("x = x + 1;", Profile::debug(Target::Native)).unwrap_err();
        assert!(matches!(err, CodegenError::UndefinedVariable { .. }));
    }

    #[test]
    fn test_self_reference_after_declaration() {
        let module = lower("x = 1; x = x + 1;", Profile::debug(Target::Native)).unwrap();
        // One slot, two stores
        let entry = main_fn(&module).entry_block().unwrap();
        let allocas = entry
            .instructions
            .iter()
            .filter(|i| matches!(i.kind, InstrKind::Alloca { .. }))
            .count();
        assert_eq!(allocas, 1);
    }

    #[test]
    fn test_variable_outlives_if_body() {
        // Declared inside the conditional, readable after it closes
        let module = lower("a = 1; if (a) { b = 5; } out b;", Profile::debug(Target::Native));
        assert!(module.is_ok());
    }

    #[test]
    fn test_alloca_hoisted_from_nested_body() {
        let module = lower(
            "a = 1; if (a) { if (a) { deep = 2; } }",
            Profile::debug(Target::Native),
        )
        .unwrap();
        let entry = main_fn(&module).entry_block().unwrap();
        let names: Vec<&str> = entry
            .instructions
            .iter()
            .filter_map(|i| match &i.kind {
                InstrKind::Alloca { name } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["a", "deep"]);
    }

    #[test]
    fn test_debug_records_one_per_variable() {
        let module = lower(
            "x = 1;\nx = 2;\nif (x) { y = 3; }",
            Profile::debug(Target::Native),
        )
        .unwrap();
        let debug = module.debug.as_ref().expect("debug table present");
        let mut names: Vec<(&str, u32)> = debug
            .variables
            .iter()
            .map(|v| (v.name.as_str(), v.pos.line))
            .collect();
        names.sort();
        // One record per distinct name, at the first assignment
        assert_eq!(names, vec![("x", 1), ("y", 3)]);
    }

    #[test]
    fn test_no_debug_info_means_no_records_or_positions() {
        let module = lower("x = 1; out x;", Profile::shipping(Target::Native)).unwrap();
        assert!(module.debug.is_none());
        for block in &main_fn(&module).blocks {
            for instr in &block.instructions {
                assert!(instr.loc.is_none());
            }
            assert!(block.terminator.as_ref().unwrap().loc.is_none());
        }
    }

    #[test]
    fn test_every_operation_has_position_under_debug() {
        let module = lower(
            "x = 1 + 2 * 3; if (x > 2) { out x; }",
            Profile::debug(Target::Native),
        )
        .unwrap();
        for block in &main_fn(&module).blocks {
            for instr in &block.instructions {
                assert!(instr.loc.is_some());
            }
            assert!(block.terminator.as_ref().unwrap().loc.is_some());
        }
    }

    #[test]
    fn test_sandboxed_target_gets_entry_alias() {
        let module = lower("out 1;", Profile::debug(Target::Sandboxed)).unwrap();
        assert_eq!(module.aliases.len(), 1);
        assert_eq!(module.aliases[0].name, "__main_void");
        assert_eq!(module.aliases[0].aliasee, ENTRY_FUNCTION);
        assert_eq!(main_fn(&module).visibility, Visibility::Hidden);
        assert!(module.triple.starts_with("wasm32"));
    }

    #[test]
    fn test_native_target_has_no_alias() {
        let module = lower("out 1;", Profile::debug(Target::Native)).unwrap();
        assert!(module.aliases.is_empty());
        assert_eq!(main_fn(&module).visibility, Visibility::Default);
    }
}
