//! End-to-end pipeline tests
//!
//! Compiles sources through the full pipeline and executes the
//! generated IR with a small reference evaluator that models storage
//! slots and the formatted-print primitive. Running the same programs
//! across every profile checks that the optimization levels preserve
//! observable behavior.

use std::collections::HashMap;

use rill::ir::{self, BasicBlock, CmpOp, Constant, InstrKind, Module, TermKind, Ty};
use rill::{compile, CompileError, Profile, Target};

fn build(source: &str, profile: Profile) -> Module {
    compile(source, "test.rill", profile).expect("compilation failed")
}

fn all_profiles() -> Vec<Profile> {
    let mut profiles = Vec::new();
    for target in [Target::Native, Target::Sandboxed] {
        profiles.push(Profile::debug(target));
        profiles.push(Profile::development(target));
        profiles.push(Profile::shipping(target));
    }
    profiles
}

/// Execute the module's entry function, returning the values passed to
/// the output primitive in order.
fn run(module: &Module) -> Vec<i64> {
    let main = module.function(ir::ENTRY_FUNCTION).expect("entry function exists");
    let blocks: HashMap<u32, &BasicBlock> = main.blocks.iter().map(|b| (b.id.0, b)).collect();
    let mut regs: HashMap<u32, i64> = HashMap::new();
    let mut slots: HashMap<u32, i64> = HashMap::new();
    let mut output = Vec::new();

    let mut current = main.blocks.first().expect("entry block exists").id.0;
    loop {
        let block = blocks[&current];
        for instr in &block.instructions {
            let result = instr.result.map(|r| r.0);
            match &instr.kind {
                InstrKind::Alloca { .. } => {
                    slots.insert(result.expect("alloca result"), 0);
                }
                InstrKind::Const(Constant::Int(v)) => {
                    regs.insert(result.expect("const result"), *v);
                }
                InstrKind::Const(Constant::Str(_)) | InstrKind::GlobalAddr { .. } => {
                    regs.insert(result.expect("address result"), 0);
                }
                InstrKind::Load { slot } => {
                    regs.insert(result.expect("load result"), slots[&slot.0]);
                }
                InstrKind::Store { slot, value } => {
                    slots.insert(slot.0, regs[&value.0]);
                }
                InstrKind::Add(a, b) => {
                    regs.insert(result.expect("add result"), regs[&a.0].wrapping_add(regs[&b.0]));
                }
                InstrKind::Sub(a, b) => {
                    regs.insert(result.expect("sub result"), regs[&a.0].wrapping_sub(regs[&b.0]));
                }
                InstrKind::Mul(a, b) => {
                    regs.insert(result.expect("mul result"), regs[&a.0].wrapping_mul(regs[&b.0]));
                }
                InstrKind::SDiv(a, b) => {
                    regs.insert(result.expect("div result"), regs[&a.0].wrapping_div(regs[&b.0]));
                }
                InstrKind::ICmp(op, a, b) => {
                    let (x, y) = (regs[&a.0], regs[&b.0]);
                    let bit = match op {
                        CmpOp::Eq => x == y,
                        CmpOp::Ne => x != y,
                        CmpOp::Slt => x < y,
                        CmpOp::Sle => x <= y,
                        CmpOp::Sgt => x > y,
                        CmpOp::Sge => x >= y,
                    };
                    regs.insert(result.expect("icmp result"), bit as i64);
                }
                InstrKind::SExt { value, from, .. } => {
                    let v = regs[&value.0];
                    let widened = if *from == Ty::I1 {
                        if v != 0 { -1 } else { 0 }
                    } else {
                        v
                    };
                    regs.insert(result.expect("sext result"), widened);
                }
                InstrKind::Call { func, args } => {
                    if func == ir::PRINT_FUNCTION {
                        output.push(regs[&args[1].0]);
                    }
                    if let Some(result) = result {
                        regs.insert(result, 0);
                    }
                }
            }
        }

        match &block.terminator.as_ref().expect("block has terminator").kind {
            TermKind::Ret { .. } => return output,
            TermKind::Br { target } => current = target.0,
            TermKind::CondBr { cond, then_block, else_block } => {
                current = if regs[&cond.0] != 0 { then_block.0 } else { else_block.0 };
            }
        }
    }
}

fn outputs(source: &str, profile: Profile) -> Vec<i64> {
    run(&build(source, profile))
}

// ============ End-to-end behavior ============

#[test]
fn prints_42_then_1_under_every_profile() {
    let source = "x=10;y=32;z=x+y;out z;if(z>40){out 1;}";
    for profile in all_profiles() {
        assert_eq!(outputs(source, profile), vec![42, 1], "profile {:?}", profile);
    }
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    assert_eq!(outputs("out 1 + 2 * 3;", Profile::debug(Target::Native)), vec![7]);
}

#[test]
fn parentheses_override_precedence() {
    assert_eq!(outputs("out (1 + 2) * 3;", Profile::debug(Target::Native)), vec![9]);
}

#[test]
fn division_is_signed_integer_division() {
    assert_eq!(outputs("out 10 / 3;", Profile::debug(Target::Native)), vec![3]);
}

#[test]
fn zero_condition_suppresses_body() {
    assert_eq!(outputs("if (0) { out 1; }", Profile::debug(Target::Native)), Vec::<i64>::new());
}

#[test]
fn nonzero_condition_runs_body() {
    assert_eq!(outputs("if (5) { out 1; }", Profile::debug(Target::Native)), vec![1]);
}

#[test]
fn variable_assigned_in_if_body_remains_live() {
    let source = "a = 1; if (a) { b = 7; } out b;";
    for profile in all_profiles() {
        assert_eq!(outputs(source, profile), vec![7], "profile {:?}", profile);
    }
}

#[test]
fn nested_conditionals() {
    let source = "a = 1; if (a) { if (a + 1) { out 5; } out 6; } out 7;";
    for profile in all_profiles() {
        assert_eq!(outputs(source, profile), vec![5, 6, 7], "profile {:?}", profile);
    }
}

#[test]
fn comparison_results_are_sign_extended() {
    // The one-bit result widens by sign extension, exactly as the
    // native backend widens it.
    assert_eq!(outputs("out 2 < 3;", Profile::debug(Target::Native)), vec![-1]);
    assert_eq!(outputs("out 3 < 2;", Profile::debug(Target::Native)), vec![0]);
}

#[test]
fn chained_comparison_evaluates_left_to_right() {
    // (1 == 1) == 1 compares the widened truth value against 1
    let expected = vec![0];
    for profile in all_profiles() {
        assert_eq!(outputs("out 1 == 1 == 1;", profile), expected, "profile {:?}", profile);
    }
}

#[test]
fn comparison_feeds_arithmetic() {
    // (2 > 1) is widened to -1 and participates in arithmetic
    assert_eq!(outputs("out (2 > 1) + 10;", Profile::debug(Target::Native)), vec![9]);
}

// ============ Structural properties ============

#[test]
fn generated_modules_always_verify() {
    let sources = [
        "",
        "x = 1;",
        "out 1 + 2 * 3 - 4 / 2;",
        "x = 1; if (x) { y = 2; if (y) { z = 3; out z; } } out x;",
        "a = 0; if (a == 0) { a = a + 1; } out a;",
    ];
    for source in sources {
        for profile in all_profiles() {
            let module = build(source, profile);
            ir::verify(&module).expect("generated module verifies");
        }
    }
}

#[test]
fn debug_axis_controls_metadata() {
    let source = "x = 1; if (x) { y = 2; } out x;";

    let module = build(source, Profile::debug(Target::Native));
    let debug = module.debug.as_ref().expect("debug table present");
    assert_eq!(debug.variables.len(), 2);

    let module = build(source, Profile::shipping(Target::Native));
    assert!(module.debug.is_none());
}

#[test]
fn constant_false_branch_is_removed_when_shipping() {
    let module = build("if (0) { out 1; }", Profile::shipping(Target::Native));
    let calls = module
        .function(ir::ENTRY_FUNCTION)
        .unwrap()
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|i| matches!(i.kind, InstrKind::Call { .. }))
        .count();
    assert_eq!(calls, 0);
}

#[test]
fn emitted_artifact_has_expected_shape() {
    let module = build("x=10;y=32;z=x+y;out z;if(z>40){out 1;}", Profile::debug(Target::Native));
    let text = ir::emit(&module);
    assert!(text.contains("define i32 @main()"));
    assert!(text.contains("@.fmt"));
    assert!(text.contains("call i32 (ptr, ...) @printf"));
    assert!(text.contains("!DILocalVariable(name: \"z\""));
}

// ============ Error paths ============

#[test]
fn undefined_variable_is_a_codegen_error() {
    let err = compile("out x;", "test.rill", Profile::debug(Target::Native)).unwrap_err();
    assert!(matches!(err, CompileError::Codegen(_)));
    assert!(err.to_string().contains("undefined variable 'x'"));
}

#[test]
fn syntax_error_is_a_parse_error() {
    let err = compile("x = ;", "test.rill", Profile::debug(Target::Native)).unwrap_err();
    assert!(matches!(err, CompileError::Parse(_)));
}

#[test]
fn bad_character_is_a_lex_error() {
    let err = compile("x = $1;", "test.rill", Profile::debug(Target::Native)).unwrap_err();
    assert!(matches!(err, CompileError::Lex(_)));
    assert!(err.to_string().contains('$'));
}
