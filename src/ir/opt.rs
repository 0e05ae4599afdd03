//! Optimization pipeline
//!
//! A small pass pipeline selected by the profile's optimization level.
//! `Moderate` runs the per-function passes to a fixpoint; `Aggressive`
//! additionally sweeps the whole module, dropping globals and external
//! declarations nothing references. `None` leaves the module untouched.

use std::collections::{HashMap, HashSet};

use crate::profile::OptLevel;

use super::instr::{CmpOp, InstrKind, TermKind};
use super::types::{Constant, Function, Module, Ty, VReg};
use super::verify::reachable_blocks;

/// Apply the selected optimization level to a verified module.
pub fn optimize(module: &mut Module, level: OptLevel) {
    match level {
        OptLevel::None => {}
        OptLevel::Moderate => {
            for func in &mut module.functions {
                if !func.is_external {
                    optimize_function(func);
                }
            }
        }
        OptLevel::Aggressive => {
            for func in &mut module.functions {
                if !func.is_external {
                    optimize_function(func);
                }
            }
            sweep_module(module);
        }
    }
}

/// Run the per-function passes until nothing changes.
fn optimize_function(func: &mut Function) {
    loop {
        let mut changed = false;
        changed |= fold_constants(func);
        changed |= simplify_branches(func);
        changed |= remove_unreachable_blocks(func);
        changed |= merge_straight_line_blocks(func);
        changed |= remove_dead_instructions(func);
        if !changed {
            break;
        }
    }
}

/// Registers with known constant values
type ConstMap = HashMap<VReg, i64>;

fn known_constants(func: &Function) -> ConstMap {
    let mut consts = ConstMap::new();
    for block in &func.blocks {
        for instr in &block.instructions {
            if let (Some(result), InstrKind::Const(Constant::Int(v))) = (instr.result, &instr.kind)
            {
                consts.insert(result, *v);
            }
        }
    }
    consts
}

/// Replace arithmetic, comparisons, and sign extensions whose operands
/// are all known constants with their computed value.
fn fold_constants(func: &mut Function) -> bool {
    let mut consts = ConstMap::new();
    let mut changed = false;

    for block in &mut func.blocks {
        for instr in &mut block.instructions {
            let Some(result) = instr.result else { continue };

            let folded: Option<i64> = match &instr.kind {
                InstrKind::Const(Constant::Int(v)) => {
                    consts.insert(result, *v);
                    None
                }
                InstrKind::Add(a, b) => binary(&consts, *a, *b, i64::wrapping_add),
                InstrKind::Sub(a, b) => binary(&consts, *a, *b, i64::wrapping_sub),
                InstrKind::Mul(a, b) => binary(&consts, *a, *b, i64::wrapping_mul),
                InstrKind::SDiv(a, b) => {
                    match (consts.get(a), consts.get(b)) {
                        // Division that would trap at run time is left alone
                        (Some(&x), Some(&y)) if y != 0 && !(x == i64::MIN && y == -1) => {
                            Some(x.wrapping_div(y))
                        }
                        _ => None,
                    }
                }
                InstrKind::ICmp(op, a, b) => match (consts.get(a), consts.get(b)) {
                    (Some(&x), Some(&y)) => {
                        let bit = match op {
                            CmpOp::Eq => x == y,
                            CmpOp::Ne => x != y,
                            CmpOp::Slt => x < y,
                            CmpOp::Sle => x <= y,
                            CmpOp::Sgt => x > y,
                            CmpOp::Sge => x >= y,
                        };
                        Some(bit as i64)
                    }
                    _ => None,
                },
                InstrKind::SExt { value, from: Ty::I1, .. } => {
                    consts.get(value).map(|&bit| if bit != 0 { -1 } else { 0 })
                }
                _ => None,
            };

            if let Some(v) = folded {
                instr.kind = InstrKind::Const(Constant::Int(v));
                consts.insert(result, v);
                changed = true;
            }
        }
    }
    changed
}

fn binary(consts: &ConstMap, a: VReg, b: VReg, f: fn(i64, i64) -> i64) -> Option<i64> {
    match (consts.get(&a), consts.get(&b)) {
        (Some(&x), Some(&y)) => Some(f(x, y)),
        _ => None,
    }
}

/// Rewrite conditional branches on known conditions into plain branches.
fn simplify_branches(func: &mut Function) -> bool {
    let consts = known_constants(func);
    let mut changed = false;

    for block in &mut func.blocks {
        let Some(term) = &mut block.terminator else { continue };
        if let TermKind::CondBr { cond, then_block, else_block } = term.kind {
            if let Some(&v) = consts.get(&cond) {
                let target = if v != 0 { then_block } else { else_block };
                term.kind = TermKind::Br { target };
                changed = true;
            }
        }
    }
    changed
}

/// Drop blocks no path from the entry block can reach.
fn remove_unreachable_blocks(func: &mut Function) -> bool {
    let reachable = reachable_blocks(func);
    let before = func.blocks.len();
    func.blocks.retain(|b| reachable.contains(&b.id));
    func.blocks.len() != before
}

/// Fold a block that ends in an unconditional branch into its target,
/// when the target has no other predecessors.
fn merge_straight_line_blocks(func: &mut Function) -> bool {
    let mut changed = false;

    loop {
        let mut pred_count: HashMap<super::types::BlockId, usize> = HashMap::new();
        for block in &func.blocks {
            if let Some(term) = &block.terminator {
                for succ in term.successors() {
                    *pred_count.entry(succ).or_insert(0) += 1;
                }
            }
        }

        let entry_id = match func.blocks.first() {
            Some(entry) => entry.id,
            None => break,
        };
        let merge = func.blocks.iter().enumerate().find_map(|(i, block)| {
            match &block.terminator {
                Some(term) => match term.kind {
                    TermKind::Br { target }
                        if target != block.id
                            && target != entry_id
                            && pred_count.get(&target) == Some(&1) =>
                    {
                        Some((i, target))
                    }
                    _ => None,
                },
                None => None,
            }
        });

        let Some((from, target)) = merge else { break };
        let at = func
            .blocks
            .iter()
            .position(|b| b.id == target)
            .expect("branch target exists in a verified function");
        let mut absorbed = func.blocks.remove(at);
        let from = if at < from { from - 1 } else { from };
        let block = &mut func.blocks[from];
        block.instructions.append(&mut absorbed.instructions);
        block.terminator = absorbed.terminator;
        changed = true;
    }
    changed
}

/// Drop instructions whose results are never read and which have no
/// side effects.
fn remove_dead_instructions(func: &mut Function) -> bool {
    let mut used: HashSet<VReg> = HashSet::new();
    for block in &func.blocks {
        for instr in &block.instructions {
            used.extend(instr.operands());
        }
        if let Some(term) = &block.terminator {
            if let Some(cond) = term.operand() {
                used.insert(cond);
            }
        }
    }

    let mut changed = false;
    for block in &mut func.blocks {
        let before = block.instructions.len();
        block.instructions.retain(|instr| {
            instr.has_side_effects()
                || match instr.result {
                    Some(result) => used.contains(&result),
                    None => true,
                }
        });
        changed |= block.instructions.len() != before;
    }
    changed
}

/// Whole-module sweep: remove globals and external declarations that no
/// surviving instruction references. The entry function and its aliases
/// are always kept.
fn sweep_module(module: &mut Module) {
    let mut used_globals: HashSet<String> = HashSet::new();
    let mut called: HashSet<String> = HashSet::new();

    for func in &module.functions {
        for block in &func.blocks {
            for instr in &block.instructions {
                match &instr.kind {
                    InstrKind::GlobalAddr { name } => {
                        used_globals.insert(name.clone());
                    }
                    InstrKind::Call { func: callee, .. } => {
                        called.insert(callee.clone());
                    }
                    _ => {}
                }
            }
        }
    }

    let aliased: HashSet<&str> = module.aliases.iter().map(|a| a.aliasee.as_str()).collect();
    module.globals.retain(|g| used_globals.contains(&g.name));
    module
        .functions
        .retain(|f| !f.is_external || called.contains(&f.name) || aliased.contains(f.name.as_str()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{generate, ENTRY_FUNCTION, PRINT_FUNCTION};
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::profile::{Profile, Target};

    fn build(source: &str, profile: Profile) -> Module {
        let program = parse(tokenize(source).expect("lexing failed"), source).expect("parsing failed");
        generate(&program, profile, "test.rill").expect("generation failed")
    }

    fn main_fn(module: &Module) -> &Function {
        module.function(ENTRY_FUNCTION).unwrap()
    }

    fn count_calls(module: &Module) -> usize {
        main_fn(module)
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .filter(|i| matches!(i.kind, InstrKind::Call { .. }))
            .count()
    }

    #[test]
    fn test_constant_expression_folds() {
        let module = build("out 1 + 2 * 3;", Profile::development(Target::Native));
        let main = main_fn(&module);
        // After folding, no arithmetic instructions remain
        let arith = main
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .filter(|i| {
                matches!(
                    i.kind,
                    InstrKind::Add(..) | InstrKind::Sub(..) | InstrKind::Mul(..) | InstrKind::SDiv(..)
                )
            })
            .count();
        assert_eq!(arith, 0);
        // The folded value 7 feeds the output call
        let seven = main
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .any(|i| matches!(i.kind, InstrKind::Const(Constant::Int(7))));
        assert!(seven);
    }

    #[test]
    fn test_division_by_zero_is_not_folded() {
        let module = build("out 1 / 0;", Profile::development(Target::Native));
        let divs = main_fn(&module)
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .filter(|i| matches!(i.kind, InstrKind::SDiv(..)))
            .count();
        assert_eq!(divs, 1);
    }

    #[test]
    fn test_false_branch_is_pruned() {
        let module = build("if (0) { out 1; }", Profile::shipping(Target::Native));
        assert_eq!(count_calls(&module), 0);
        // The then block is gone entirely
        assert_eq!(main_fn(&module).blocks.len(), 1);
    }

    #[test]
    fn test_true_branch_is_kept() {
        let module = build("if (5) { out 1; }", Profile::shipping(Target::Native));
        assert_eq!(count_calls(&module), 1);
    }

    #[test]
    fn test_unoptimized_module_is_untouched() {
        let module = build("if (0) { out 1; }", Profile::debug(Target::Native));
        assert_eq!(count_calls(&module), 1);
        assert_eq!(main_fn(&module).blocks.len(), 3);
    }

    #[test]
    fn test_sweep_drops_unused_print_machinery() {
        let module = build("x = 1;", Profile::shipping(Target::Native));
        assert!(module.function(PRINT_FUNCTION).is_none());
        assert!(module.globals.is_empty());
    }

    #[test]
    fn test_moderate_keeps_declarations() {
        let module = build("x = 1;", Profile::development(Target::Native));
        assert!(module.function(PRINT_FUNCTION).is_some());
        assert!(!module.globals.is_empty());
    }

    #[test]
    fn test_optimized_module_still_verifies() {
        let module = build(
            "x = 2 + 3; if (x == 5) { out x * 2; } out 1 < 2;",
            Profile::shipping(Target::Native),
        );
        assert!(crate::ir::verify(&module).is_ok());
    }
}
