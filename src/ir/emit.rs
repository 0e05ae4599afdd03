//! Module serialization
//!
//! Renders a verified module as a textual LLVM IR artifact consumable by
//! a downstream native-code toolchain. Constants are inlined into
//! operand positions, storage slots keep their variable names
//! (`%x.addr`), and when debug info is present the DWARF metadata graph
//! (compile unit, subprogram, variable declarations, locations) is
//! emitted alongside the code.

use std::collections::HashMap;
use std::fmt::Write as _;

use super::instr::{Instruction, InstrKind, TermKind};
use super::types::{Constant, Function, Module, Ty, VReg};

/// Serialize a module to its textual form.
pub fn emit(module: &Module) -> String {
    Emitter::new(module).run()
}

struct Emitter<'m> {
    module: &'m Module,
    /// Metadata nodes; index is the node id
    md: Vec<String>,
    /// Flag node ids listed in !llvm.module.flags
    flag_ids: Vec<usize>,
    /// Compile unit node id
    cu_id: Option<usize>,
    /// Subprogram node id (scope of all locations)
    sp_id: Option<usize>,
    /// Variable record node ids keyed by slot register
    var_ids: HashMap<u32, usize>,
    /// Deduplicated location nodes keyed by (line, col)
    loc_ids: HashMap<(u32, u32), usize>,
}

impl<'m> Emitter<'m> {
    fn new(module: &'m Module) -> Self {
        Self {
            module,
            md: Vec::new(),
            flag_ids: Vec::new(),
            cu_id: None,
            sp_id: None,
            var_ids: HashMap::new(),
            loc_ids: HashMap::new(),
        }
    }

    fn node(&mut self, text: String) -> usize {
        self.md.push(text);
        self.md.len() - 1
    }

    fn run(mut self) -> String {
        self.build_flags();
        if self.module.debug.is_some() {
            self.build_debug_descriptors();
        }

        let mut out = String::new();
        let _ = writeln!(out, "; ModuleID = '{}'", self.module.name);
        let _ = writeln!(out, "source_filename = \"{}\"", self.module.source_file);
        let _ = writeln!(out, "target datalayout = \"{}\"", self.module.data_layout);
        let _ = writeln!(out, "target triple = \"{}\"", self.module.triple);
        out.push('\n');

        for global in &self.module.globals {
            match &global.init {
                Constant::Str(s) => {
                    let (escaped, len) = escape_c_string(s);
                    let _ = writeln!(
                        out,
                        "@{} = private unnamed_addr constant [{} x i8] c\"{}\", align 1",
                        global.name, len, escaped
                    );
                }
                Constant::Int(v) => {
                    let kind = if global.is_const { "constant" } else { "global" };
                    let _ = writeln!(out, "@{} = {} i64 {}", global.name, kind, v);
                }
            }
        }
        if !self.module.globals.is_empty() {
            out.push('\n');
        }

        for func in &self.module.functions {
            if !func.is_external {
                self.emit_function(&mut out, func);
                out.push('\n');
            }
        }

        for alias in &self.module.aliases {
            let ret = self
                .module
                .function(&alias.aliasee)
                .map(|f| f.ret)
                .unwrap_or(Ty::I32);
            let _ = writeln!(
                out,
                "@{} = hidden alias {} (), ptr @{}",
                alias.name, ret, alias.aliasee
            );
            out.push('\n');
        }

        for func in &self.module.functions {
            if func.is_external {
                let params: Vec<String> = func.params.iter().map(|t| t.to_string()).collect();
                let varargs = if func.is_vararg {
                    if params.is_empty() { "...".to_string() } else { ", ...".to_string() }
                } else {
                    String::new()
                };
                let _ = writeln!(
                    out,
                    "declare {} @{}({}{})",
                    func.ret,
                    func.name,
                    params.join(", "),
                    varargs
                );
            }
        }

        if self.module.debug.is_some() {
            let _ = writeln!(out, "\ndeclare void @llvm.dbg.declare(metadata, metadata, metadata)");
        }

        if !self.flag_ids.is_empty() || self.cu_id.is_some() {
            out.push('\n');
        }
        if !self.flag_ids.is_empty() {
            let refs: Vec<String> = self.flag_ids.iter().map(|i| format!("!{}", i)).collect();
            let _ = writeln!(out, "!llvm.module.flags = !{{{}}}", refs.join(", "));
        }
        if let Some(cu) = self.cu_id {
            let _ = writeln!(out, "!llvm.dbg.cu = !{{!{}}}", cu);
        }
        if !self.md.is_empty() {
            out.push('\n');
            for (i, node) in self.md.iter().enumerate() {
                let _ = writeln!(out, "!{} = {}", i, node);
            }
        }

        out
    }

    // ============ Metadata descriptors ============

    fn build_flags(&mut self) {
        if self.module.debug.is_some() {
            let id = self.node("!{i32 2, !\"Dwarf Version\", i32 5}".to_string());
            self.flag_ids.push(id);
            let id = self.node("!{i32 2, !\"Debug Info Version\", i32 3}".to_string());
            self.flag_ids.push(id);
        }
        if let Some(level) = self.module.pic_level {
            let id = self.node(format!("!{{i32 7, !\"PIC Level\", i32 {}}}", level));
            self.flag_ids.push(id);
        }
    }

    fn build_debug_descriptors(&mut self) {
        let debug = self.module.debug.as_ref().expect("debug table present");

        let file = self.node(format!(
            "!DIFile(filename: \"{}\", directory: \"{}\")",
            debug.file, debug.directory
        ));
        let cu = self.node(format!(
            "distinct !DICompileUnit(language: DW_LANG_C, file: !{}, producer: \"{}\", \
             isOptimized: {}, runtimeVersion: 0, emissionKind: FullDebug)",
            file, debug.producer, debug.optimized
        ));
        self.cu_id = Some(cu);

        let ret_ty = self.node(
            "!DIBasicType(name: \"int\", size: 32, encoding: DW_ATE_signed)".to_string(),
        );
        let ty_tuple = self.node(format!("!{{!{}}}", ret_ty));
        let sub_ty = self.node(format!("!DISubroutineType(types: !{})", ty_tuple));
        let sp = self.node(format!(
            "distinct !DISubprogram(name: \"{name}\", linkageName: \"{name}\", scope: !{file}, \
             file: !{file}, line: {line}, type: !{ty}, scopeLine: {line}, \
             flags: DIFlagPrototyped, spFlags: DISPFlagDefinition, unit: !{cu})",
            name = debug.entry.name,
            file = file,
            line = debug.entry.line,
            ty = sub_ty,
            cu = cu,
        ));
        self.sp_id = Some(sp);

        let int64 = self.node(
            "!DIBasicType(name: \"int64\", size: 64, encoding: DW_ATE_signed)".to_string(),
        );

        for var in &debug.variables {
            let id = self.node(format!(
                "!DILocalVariable(name: \"{}\", scope: !{}, file: !{}, line: {}, type: !{})",
                var.name, sp, file, var.pos.line, int64
            ));
            self.var_ids.insert(var.slot.0, id);
        }
    }

    fn loc_id(&mut self, line: u32, col: u32) -> usize {
        if let Some(&id) = self.loc_ids.get(&(line, col)) {
            return id;
        }
        let sp = self.sp_id.expect("subprogram exists when locations are emitted");
        let id = self.node(format!(
            "!DILocation(line: {}, column: {}, scope: !{})",
            line, col, sp
        ));
        self.loc_ids.insert((line, col), id);
        id
    }

    fn dbg_suffix(&mut self, loc: Option<crate::span::Position>) -> String {
        match (self.module.debug.is_some(), loc) {
            (true, Some(pos)) => format!(", !dbg !{}", self.loc_id(pos.line, pos.col)),
            _ => String::new(),
        }
    }

    // ============ Function bodies ============

    fn emit_function(&mut self, out: &mut String, func: &Function) {
        // Resolve register names and inline constants up front
        let mut names: HashMap<u32, String> = HashMap::new();
        let mut consts: HashMap<u32, i64> = HashMap::new();
        for block in &func.blocks {
            for instr in &block.instructions {
                let Some(result) = instr.result else { continue };
                match &instr.kind {
                    InstrKind::Alloca { name } => {
                        names.insert(result.0, format!("%{}.addr", name));
                    }
                    InstrKind::Const(Constant::Int(v)) => {
                        consts.insert(result.0, *v);
                    }
                    _ => {
                        names.insert(result.0, format!("%t{}", result.0));
                    }
                }
            }
        }
        let labels: HashMap<u32, &str> = func
            .blocks
            .iter()
            .map(|b| (b.id.0, b.label.as_str()))
            .collect();

        let visibility = match func.visibility {
            super::types::Visibility::Hidden => "hidden ",
            super::types::Visibility::Default => "",
        };
        let sp = match self.sp_id {
            Some(sp) if func.name == self.debug_entry_name() => format!(" !dbg !{}", sp),
            _ => String::new(),
        };
        let _ = writeln!(out, "define {}{} @{}(){} {{", visibility, func.ret, func.name, sp);

        for block in &func.blocks {
            let _ = writeln!(out, "{}:", block.label);
            for instr in &block.instructions {
                self.emit_instruction(out, instr, &names, &consts);
            }
            if let Some(term) = &block.terminator {
                let dbg = self.dbg_suffix(term.loc);
                match &term.kind {
                    TermKind::Ret { value } => match value {
                        Some(Constant::Int(v)) => {
                            let _ = writeln!(out, "  ret {} {}{}", func.ret, v, dbg);
                        }
                        Some(Constant::Str(_)) => unreachable!("string return value"),
                        None => {
                            let _ = writeln!(out, "  ret void{}", dbg);
                        }
                    },
                    TermKind::Br { target } => {
                        let _ = writeln!(out, "  br label %{}{}", labels[&target.0], dbg);
                    }
                    TermKind::CondBr { cond, then_block, else_block } => {
                        let cond = operand(&names, &consts, cond.0, Ty::I1);
                        let _ = writeln!(
                            out,
                            "  br i1 {}, label %{}, label %{}{}",
                            cond, labels[&then_block.0], labels[&else_block.0], dbg
                        );
                    }
                }
            }
        }

        let _ = writeln!(out, "}}");
    }

    fn debug_entry_name(&self) -> &str {
        self.module
            .debug
            .as_ref()
            .map(|d| d.entry.name.as_str())
            .unwrap_or("")
    }

    fn emit_instruction(
        &mut self,
        out: &mut String,
        instr: &Instruction,
        names: &HashMap<u32, String>,
        consts: &HashMap<u32, i64>,
    ) {
        let dbg = self.dbg_suffix(instr.loc);
        let result = instr.result.map(|r| r.0);
        let name = |r: u32| names.get(&r).cloned().unwrap_or_else(|| format!("%t{}", r));

        match &instr.kind {
            // Constants are inlined at their uses
            InstrKind::Const(_) => {}

            InstrKind::Alloca { .. } => {
                let slot = result.expect("alloca has a result");
                let _ = writeln!(out, "  {} = alloca i64, align 8{}", name(slot), dbg);
                self.emit_dbg_declare(out, slot, &name(slot));
            }
            InstrKind::Load { slot } => {
                let _ = writeln!(
                    out,
                    "  {} = load i64, ptr {}, align 8{}",
                    name(result.expect("load has a result")),
                    name(slot.0),
                    dbg
                );
            }
            InstrKind::Store { slot, value } => {
                let value = operand(names, consts, value.0, Ty::I64);
                let _ = writeln!(out, "  store i64 {}, ptr {}, align 8{}", value, name(slot.0), dbg);
            }
            InstrKind::Add(a, b) | InstrKind::Sub(a, b) | InstrKind::Mul(a, b)
            | InstrKind::SDiv(a, b) => {
                let op = match instr.kind {
                    InstrKind::Add(..) => "add",
                    InstrKind::Sub(..) => "sub",
                    InstrKind::Mul(..) => "mul",
                    _ => "sdiv",
                };
                let _ = writeln!(
                    out,
                    "  {} = {} i64 {}, {}{}",
                    name(result.expect("arithmetic has a result")),
                    op,
                    operand(names, consts, a.0, Ty::I64),
                    operand(names, consts, b.0, Ty::I64),
                    dbg
                );
            }
            InstrKind::ICmp(op, a, b) => {
                let _ = writeln!(
                    out,
                    "  {} = icmp {} i64 {}, {}{}",
                    name(result.expect("icmp has a result")),
                    op,
                    operand(names, consts, a.0, Ty::I64),
                    operand(names, consts, b.0, Ty::I64),
                    dbg
                );
            }
            InstrKind::SExt { value, from, to } => {
                let _ = writeln!(
                    out,
                    "  {} = sext {} {} to {}{}",
                    name(result.expect("sext has a result")),
                    from,
                    operand(names, consts, value.0, *from),
                    to,
                    dbg
                );
            }
            InstrKind::GlobalAddr { name: global } => {
                let len = match self.module.global(global).map(|g| &g.init) {
                    Some(Constant::Str(s)) => s.len() + 1,
                    _ => 0,
                };
                let _ = writeln!(
                    out,
                    "  {} = getelementptr inbounds [{} x i8], ptr @{}, i32 0, i32 0{}",
                    name(result.expect("global address has a result")),
                    len,
                    global,
                    dbg
                );
            }
            InstrKind::Call { func: callee, args } => {
                let decl = self.module.function(callee);
                let ret = decl.map(|f| f.ret).unwrap_or(Ty::I32);
                let params: Vec<Ty> = decl.map(|f| f.params.clone()).unwrap_or_default();
                let is_vararg = decl.map(|f| f.is_vararg).unwrap_or(false);

                let callee_ty = if is_vararg {
                    let params: Vec<String> = params.iter().map(|t| t.to_string()).collect();
                    format!("{} ({}, ...) ", ret, params.join(", "))
                } else {
                    format!("{} ", ret)
                };
                let rendered: Vec<String> = args
                    .iter()
                    .enumerate()
                    .map(|(i, arg)| {
                        let ty = params.get(i).copied().unwrap_or(Ty::I64);
                        format!("{} {}", ty, operand(names, consts, arg.0, ty))
                    })
                    .collect();
                let _ = writeln!(
                    out,
                    "  {} = call {}@{}({}){}",
                    name(result.expect("call has a result")),
                    callee_ty,
                    callee,
                    rendered.join(", "),
                    dbg
                );
            }
        }
    }

    /// Emit the declaration intrinsic for a storage slot, right after
    /// its alloca, when a debug record exists for it.
    fn emit_dbg_declare(&mut self, out: &mut String, slot: u32, slot_name: &str) {
        let Some(debug) = self.module.debug.as_ref() else { return };
        let Some(&var_id) = self.var_ids.get(&slot) else { return };
        let Some(var) = debug.variable_for_slot(VReg(slot)) else { return };
        let loc = self.loc_id(var.pos.line, var.pos.col);
        let _ = writeln!(
            out,
            "  call void @llvm.dbg.declare(metadata ptr {}, metadata !{}, metadata !DIExpression()), !dbg !{}",
            slot_name, var_id, loc
        );
    }
}

/// Render an operand: a named register or an inlined constant.
fn operand(names: &HashMap<u32, String>, consts: &HashMap<u32, i64>, reg: u32, ty: Ty) -> String {
    match consts.get(&reg) {
        Some(&v) => match ty {
            Ty::I1 => if v != 0 { "true".to_string() } else { "false".to_string() },
            _ => v.to_string(),
        },
        None => names.get(&reg).cloned().unwrap_or_else(|| format!("%t{}", reg)),
    }
}

/// Escape a string for a c"..." constant, appending the NUL terminator.
/// Returns the escaped text and the byte length including the NUL.
fn escape_c_string(s: &str) -> (String, usize) {
    let mut escaped = String::new();
    let bytes: Vec<u8> = s.bytes().chain(std::iter::once(0)).collect();
    for &b in &bytes {
        match b {
            0x20..=0x7e if b != b'"' && b != b'\\' => escaped.push(b as char),
            _ => {
                let _ = write!(escaped, "\\{:02X}", b);
            }
        }
    }
    (escaped, bytes.len())
}
