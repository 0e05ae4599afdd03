//! Structural verification
//!
//! Checks that a generated module is well-formed before it is optimized
//! or serialized: every reachable block ends in exactly one terminator,
//! branch targets exist, registers are defined once and before use,
//! call and global references resolve, and the debug-info invariants
//! hold. A verification failure is a defect in the generator, so the
//! error carries every issue found.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::instr::InstrKind;
use super::types::{BlockId, Function, Module, VReg};

/// All structural issues found in a module
#[derive(Error, Debug)]
#[error("{}", issues.join("\n"))]
pub struct VerifyError {
    pub issues: Vec<String>,
}

/// Verify a module's structural well-formedness.
pub fn verify(module: &Module) -> Result<(), VerifyError> {
    let mut issues = Vec::new();

    for alias in &module.aliases {
        if module.function(&alias.aliasee).is_none() {
            issues.push(format!(
                "alias '{}' refers to unknown function '{}'",
                alias.name, alias.aliasee
            ));
        }
    }

    for func in &module.functions {
        if func.is_external {
            if !func.blocks.is_empty() {
                issues.push(format!("declaration '{}' has a body", func.name));
            }
            continue;
        }
        verify_function(module, func, &mut issues);
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(VerifyError { issues })
    }
}

fn verify_function(module: &Module, func: &Function, issues: &mut Vec<String>) {
    if func.blocks.is_empty() {
        issues.push(format!("function '{}' has no blocks", func.name));
        return;
    }

    let mut block_index: HashMap<BlockId, usize> = HashMap::new();
    for (i, block) in func.blocks.iter().enumerate() {
        if block_index.insert(block.id, i).is_some() {
            issues.push(format!("{}: duplicate block id {}", func.name, block.id));
        }
    }

    // Branch targets must exist, wherever the block sits
    for block in &func.blocks {
        if let Some(term) = &block.terminator {
            for succ in term.successors() {
                if !block_index.contains_key(&succ) {
                    issues.push(format!(
                        "{}: block '{}' branches to unknown block {}",
                        func.name, block.label, succ
                    ));
                }
            }
        }
    }

    // Single assignment per register
    let mut defs: HashMap<VReg, BlockId> = HashMap::new();
    for block in &func.blocks {
        for instr in &block.instructions {
            if let Some(result) = instr.result {
                if defs.insert(result, block.id).is_some() {
                    issues.push(format!(
                        "{}: register {} defined more than once",
                        func.name, result
                    ));
                }
            }
        }
    }

    let reachable = reachable_blocks(func);
    let entry_id = func.blocks[0].id;

    for block in &func.blocks {
        if !reachable.contains(&block.id) {
            continue;
        }

        if block.terminator.is_none() {
            issues.push(format!(
                "{}: reachable block '{}' has no terminator",
                func.name, block.label
            ));
        }

        // Uses must be dominated by their definitions. Expression
        // evaluation never spans blocks, so a use is legal when the
        // definition appears earlier in the same block or among the
        // entry block's storage slots.
        let mut seen: HashSet<VReg> = HashSet::new();
        for instr in &block.instructions {
            for operand in instr.operands() {
                let local = seen.contains(&operand);
                let from_entry = defs.get(&operand) == Some(&entry_id) && block.id != entry_id;
                if !local && !from_entry {
                    issues.push(format!(
                        "{}: block '{}' uses {} before definition",
                        func.name, block.label, operand
                    ));
                }
            }
            if let Some(result) = instr.result {
                seen.insert(result);
            }

            match &instr.kind {
                InstrKind::Call { func: callee, args } => match module.function(callee) {
                    None => issues.push(format!(
                        "{}: call to undeclared function '{}'",
                        func.name, callee
                    )),
                    Some(f) => {
                        let ok = if f.is_vararg {
                            args.len() >= f.params.len()
                        } else {
                            args.len() == f.params.len()
                        };
                        if !ok {
                            issues.push(format!(
                                "{}: call to '{}' passes {} arguments, expected {}{}",
                                func.name,
                                callee,
                                args.len(),
                                f.params.len(),
                                if f.is_vararg { " or more" } else { "" }
                            ));
                        }
                    }
                },
                InstrKind::GlobalAddr { name } => {
                    if module.global(name).is_none() {
                        issues.push(format!(
                            "{}: reference to unknown global '{}'",
                            func.name, name
                        ));
                    }
                }
                _ => {}
            }
        }

        if let Some(term) = &block.terminator {
            if let Some(cond) = term.operand() {
                let local = seen.contains(&cond);
                let from_entry = defs.get(&cond) == Some(&entry_id) && block.id != entry_id;
                if !local && !from_entry {
                    issues.push(format!(
                        "{}: block '{}' terminator uses {} before definition",
                        func.name, block.label, cond
                    ));
                }
            }
        }
    }

    verify_debug_info(module, func, &reachable, &defs, issues);
}

fn verify_debug_info(
    module: &Module,
    func: &Function,
    reachable: &HashSet<BlockId>,
    defs: &HashMap<VReg, BlockId>,
    issues: &mut Vec<String>,
) {
    let entry_id = func.blocks[0].id;

    match &module.debug {
        Some(debug) => {
            // Every reachable operation must carry a position
            for block in &func.blocks {
                if !reachable.contains(&block.id) {
                    continue;
                }
                for instr in &block.instructions {
                    if instr.loc.is_none() {
                        issues.push(format!(
                            "{}: instruction in block '{}' has no source position",
                            func.name, block.label
                        ));
                    }
                }
                if let Some(term) = &block.terminator {
                    if term.loc.is_none() {
                        issues.push(format!(
                            "{}: terminator of block '{}' has no source position",
                            func.name, block.label
                        ));
                    }
                }
            }

            // Exactly one declaration record per variable, tied to an
            // entry-block storage slot
            let mut names = HashSet::new();
            for var in &debug.variables {
                if !names.insert(var.name.as_str()) {
                    issues.push(format!(
                        "duplicate declaration record for variable '{}'",
                        var.name
                    ));
                }
                if defs.get(&var.slot) != Some(&entry_id) {
                    issues.push(format!(
                        "declaration record for '{}' does not refer to an entry-block slot",
                        var.name
                    ));
                }
            }
        }
        None => {
            // Debug info off: nothing may carry a position
            for block in &func.blocks {
                for instr in &block.instructions {
                    if instr.loc.is_some() {
                        issues.push(format!(
                            "{}: stray source position in block '{}' with debug info disabled",
                            func.name, block.label
                        ));
                    }
                }
                if let Some(term) = &block.terminator {
                    if term.loc.is_some() {
                        issues.push(format!(
                            "{}: stray terminator position in block '{}' with debug info disabled",
                            func.name, block.label
                        ));
                    }
                }
            }
        }
    }
}

/// Blocks reachable from the entry block
pub fn reachable_blocks(func: &Function) -> HashSet<BlockId> {
    let mut reachable = HashSet::new();
    let mut worklist = Vec::new();
    if let Some(entry) = func.blocks.first() {
        reachable.insert(entry.id);
        worklist.push(entry.id);
    }
    let by_id: HashMap<BlockId, &super::types::BasicBlock> =
        func.blocks.iter().map(|b| (b.id, b)).collect();

    while let Some(id) = worklist.pop() {
        let Some(block) = by_id.get(&id) else { continue };
        if let Some(term) = &block.terminator {
            for succ in term.successors() {
                if by_id.contains_key(&succ) && reachable.insert(succ) {
                    worklist.push(succ);
                }
            }
        }
    }
    reachable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{generate, TermKind};
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::profile::{Profile, Target};

    fn build(source: &str) -> Module {
        let program = parse(tokenize(source).expect("lexing failed"), source).expect("parsing failed");
        generate(&program, Profile::debug(Target::Native), "test.rill").expect("generation failed")
    }

    #[test]
    fn test_generated_modules_verify() {
        let module = build("x = 1; if (x) { out x; } out x + 2;");
        assert!(verify(&module).is_ok());
    }

    #[test]
    fn test_missing_terminator_is_reported() {
        let mut module = build("out 1;");
        let main = module
            .functions
            .iter_mut()
            .find(|f| !f.is_external)
            .unwrap();
        main.blocks[0].terminator = None;
        let err = verify(&module).unwrap_err();
        assert!(err.to_string().contains("no terminator"));
    }

    #[test]
    fn test_unknown_branch_target_is_reported() {
        let mut module = build("x = 1; if (x) { out x; }");
        let main = module
            .functions
            .iter_mut()
            .find(|f| !f.is_external)
            .unwrap();
        if let Some(term) = &mut main.blocks[0].terminator {
            if let TermKind::CondBr { then_block, .. } = &mut term.kind {
                *then_block = BlockId(99);
            }
        }
        let err = verify(&module).unwrap_err();
        assert!(err.to_string().contains("unknown block"));
    }

    #[test]
    fn test_missing_position_is_reported_under_debug() {
        let mut module = build("out 1;");
        let main = module
            .functions
            .iter_mut()
            .find(|f| !f.is_external)
            .unwrap();
        main.blocks[0].instructions[0].loc = None;
        let err = verify(&module).unwrap_err();
        assert!(err.to_string().contains("no source position"));
    }

    #[test]
    fn test_unknown_callee_is_reported() {
        let mut module = build("out 1;");
        module.functions.retain(|f| !f.is_external);
        let err = verify(&module).unwrap_err();
        assert!(err.to_string().contains("undeclared function"));
    }
}
