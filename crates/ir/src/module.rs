//! Module, function, and basic-block containers plus the builder API.
//!
//! A [`Function`] doubles as its own builder: `add_block` / `set_insert_point`
//! move a cursor and the typed helpers append instructions at it. This keeps
//! block bookkeeping (fresh labels, fresh temps, terminator checks) next to
//! the data it guards.

use crate::instr::{BinOp, CastOp, FPred, IPred, Inst, InstKind};
use crate::types::Type;
use crate::value::{Constant, Value};
use std::collections::HashSet;
use std::fmt;
use std::fmt::Write as _;

/// Handle to a basic block inside one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

#[derive(Debug, Clone)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
}

impl Block {
    pub fn is_terminated(&self) -> bool {
        self.insts.last().is_some_and(|i| i.kind.is_terminator())
    }
}

/// A named struct body registered at module level.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Type>,
}

/// A module-level global variable.
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    pub init: Constant,
    pub align: u32,
    /// String literals: `private unnamed_addr constant`
    pub private_const: bool,
}

/// Location of a `switch` instruction, for appending case arms after the
/// body has been walked.
#[derive(Debug, Clone, Copy)]
pub struct SwitchLoc {
    block: usize,
    index: usize,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub ret: Type,
    pub params: Vec<(String, Type)>,
    pub variadic: bool,
    /// Empty for declarations
    pub blocks: Vec<Block>,
    next_temp: u32,
    next_label: u32,
    local_names: HashSet<String>,
    cursor: usize,
}

impl Function {
    /// A declaration; `add_block` turns it into a definition.
    pub fn new(name: &str, ret: Type, params: Vec<(String, Type)>, variadic: bool) -> Self {
        let local_names = params.iter().map(|(n, _)| n.clone()).collect();
        Function {
            name: name.to_string(),
            ret,
            params,
            variadic,
            blocks: Vec::new(),
            next_temp: 0,
            next_label: 0,
            local_names,
            cursor: 0,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn param_types(&self) -> Vec<Type> {
        self.params.iter().map(|(_, t)| t.clone()).collect()
    }

    /// Create a block with a uniquified label. Does not move the cursor.
    pub fn add_block(&mut self, hint: &str) -> BlockId {
        let label = if self.blocks.is_empty() && hint == "entry" {
            "entry".to_string()
        } else {
            let l = format!("{}{}", hint, self.next_label);
            self.next_label += 1;
            l
        };
        self.blocks.push(Block {
            label,
            insts: Vec::new(),
        });
        BlockId(self.blocks.len() - 1)
    }

    pub fn set_insert_point(&mut self, block: BlockId) {
        assert!(block.0 < self.blocks.len());
        self.cursor = block.0;
    }

    /// The block instructions are currently appended to. Callers fetch this
    /// right before a merge so phis name the *actual* predecessor.
    pub fn current_block(&self) -> BlockId {
        BlockId(self.cursor)
    }

    pub fn label(&self, block: BlockId) -> &str {
        &self.blocks[block.0].label
    }

    pub fn is_terminated(&self, block: BlockId) -> bool {
        self.blocks[block.0].is_terminated()
    }

    pub fn current_terminated(&self) -> bool {
        self.blocks[self.cursor].is_terminated()
    }

    fn fresh_temp(&mut self) -> Value {
        let v = Value::Temp(self.next_temp);
        self.next_temp += 1;
        v
    }

    /// Uniquify a local name (shadowed C variables share a spelling).
    fn fresh_local(&mut self, hint: &str) -> String {
        let mut name = hint.to_string();
        let mut n = 0;
        while !self.local_names.insert(name.clone()) {
            n += 1;
            name = format!("{}{}", hint, n);
        }
        name
    }

    fn push(&mut self, inst: Inst) {
        let block = &mut self.blocks[self.cursor];
        assert!(
            !block.is_terminated(),
            "emitting into terminated block {} of {}",
            block.label,
            self.name
        );
        block.insts.push(inst);
    }

    fn push_valued(&mut self, kind: InstKind) -> Value {
        let result = self.fresh_temp();
        self.push(Inst {
            result: Some(result.clone()),
            kind,
        });
        result
    }

    /// Find the instruction that produced `value` in this function.
    pub fn definition_of(&self, value: &Value) -> Option<&Inst> {
        self.blocks
            .iter()
            .flat_map(|b| b.insts.iter())
            .find(|i| i.result.as_ref() == Some(value))
    }

    // ---- instruction helpers -------------------------------------------

    /// Stack slot, hoisted to the head of the entry block so the address
    /// dominates every use.
    pub fn alloca(&mut self, hint: &str, ty: Type, align: u32) -> Value {
        let name = self.fresh_local(&format!("{}.addr", hint));
        let result = Value::Local(name);
        let entry = &mut self.blocks[0];
        let at = entry
            .insts
            .iter()
            .position(|i| !matches!(i.kind, InstKind::Alloca { .. }))
            .unwrap_or(entry.insts.len());
        entry.insts.insert(
            at,
            Inst {
                result: Some(result.clone()),
                kind: InstKind::Alloca { ty, align },
            },
        );
        result
    }

    pub fn binary(&mut self, op: BinOp, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.push_valued(InstKind::Binary { op, ty, lhs, rhs })
    }

    pub fn neg(&mut self, ty: Type, operand: Value) -> Value {
        self.push_valued(InstKind::Neg { ty, operand })
    }

    pub fn fneg(&mut self, ty: Type, operand: Value) -> Value {
        self.push_valued(InstKind::FNeg { ty, operand })
    }

    pub fn icmp(&mut self, pred: IPred, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.push_valued(InstKind::ICmp { pred, ty, lhs, rhs })
    }

    pub fn fcmp(&mut self, pred: FPred, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.push_valued(InstKind::FCmp { pred, ty, lhs, rhs })
    }

    pub fn load(&mut self, ty: Type, addr: Value) -> Value {
        self.push_valued(InstKind::Load { ty, addr })
    }

    pub fn store(&mut self, ty: Type, value: Value, addr: Value) {
        self.push(Inst {
            result: None,
            kind: InstKind::Store { ty, value, addr },
        });
    }

    pub fn gep(&mut self, base_ty: Type, addr: Value, indices: Vec<(Type, Value)>) -> Value {
        self.push_valued(InstKind::Gep {
            base_ty,
            addr,
            indices,
        })
    }

    pub fn cast(&mut self, op: CastOp, from: Type, value: Value, to: Type) -> Value {
        self.push_valued(InstKind::Cast {
            op,
            from,
            value,
            to,
        })
    }

    pub fn call(
        &mut self,
        ret: Type,
        callee: Value,
        args: Vec<(Type, Value)>,
        param_tys: Vec<Type>,
        variadic: bool,
    ) -> Option<Value> {
        let kind = InstKind::Call {
            ret: ret.clone(),
            callee,
            args,
            param_tys,
            variadic,
        };
        if ret == Type::Void {
            self.push(Inst { result: None, kind });
            None
        } else {
            Some(self.push_valued(kind))
        }
    }

    pub fn phi(&mut self, ty: Type, incomings: Vec<(Value, BlockId)>) -> Value {
        let incomings = incomings
            .into_iter()
            .map(|(v, b)| (v, self.blocks[b.0].label.clone()))
            .collect();
        self.push_valued(InstKind::Phi { ty, incomings })
    }

    pub fn br(&mut self, dest: BlockId) {
        let dest = self.blocks[dest.0].label.clone();
        self.push(Inst {
            result: None,
            kind: InstKind::Br { dest },
        });
    }

    /// Branch to `dest` unless the current block already has a terminator.
    pub fn br_if_open(&mut self, dest: BlockId) {
        if !self.current_terminated() {
            self.br(dest);
        }
    }

    pub fn cond_br(&mut self, cond: Value, then_dest: BlockId, else_dest: BlockId) {
        let then_dest = self.blocks[then_dest.0].label.clone();
        let else_dest = self.blocks[else_dest.0].label.clone();
        self.push(Inst {
            result: None,
            kind: InstKind::CondBr {
                cond,
                then_dest,
                else_dest,
            },
        });
    }

    /// Emit a `switch` with no case arms yet; arms attach via
    /// [`Function::add_switch_case`] as the body is walked.
    pub fn switch_inst(&mut self, ty: Type, value: Value, default: BlockId) -> SwitchLoc {
        let default = self.blocks[default.0].label.clone();
        self.push(Inst {
            result: None,
            kind: InstKind::Switch {
                ty,
                value,
                default,
                cases: Vec::new(),
            },
        });
        SwitchLoc {
            block: self.cursor,
            index: self.blocks[self.cursor].insts.len() - 1,
        }
    }

    pub fn add_switch_case(&mut self, loc: SwitchLoc, value: i64, dest: BlockId) {
        let label = self.blocks[dest.0].label.clone();
        match &mut self.blocks[loc.block].insts[loc.index].kind {
            InstKind::Switch { cases, .. } => cases.push((value, label)),
            _ => unreachable!("SwitchLoc does not point at a switch"),
        }
    }

    pub fn ret(&mut self, ty: Type, value: Option<Value>) {
        self.push(Inst {
            result: None,
            kind: InstKind::Ret { ty, value },
        });
    }

    pub fn unreachable(&mut self) {
        self.push(Inst {
            result: None,
            kind: InstKind::Unreachable,
        });
    }
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Source file identifier
    pub name: String,
    pub triple: String,
    pub data_layout: String,
    pub structs: Vec<StructDef>,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: &str, triple: &str, data_layout: &str) -> Self {
        Module {
            name: name.to_string(),
            triple: triple.to_string(),
            data_layout: data_layout.to_string(),
            structs: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn add_struct(&mut self, def: StructDef) {
        if !self.structs.iter().any(|s| s.name == def.name) {
            self.structs.push(def);
        }
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn get_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn print_to_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        let _ = writeln!(out, "; ModuleID = '{}'", self.name);
        let _ = writeln!(out, "source_filename = \"{}\"", self.name);
        if !self.data_layout.is_empty() {
            let _ = writeln!(out, "target datalayout = \"{}\"", self.data_layout);
        }
        if !self.triple.is_empty() {
            let _ = writeln!(out, "target triple = \"{}\"", self.triple);
        }

        if !self.structs.is_empty() {
            let _ = writeln!(out);
            for s in &self.structs {
                let fields: Vec<String> = s.fields.iter().map(|t| t.to_string()).collect();
                let _ = writeln!(out, "%struct.{} = type {{ {} }}", s.name, fields.join(", "));
            }
        }

        if !self.globals.is_empty() {
            let _ = writeln!(out);
            for g in &self.globals {
                if g.private_const {
                    let _ = writeln!(
                        out,
                        "@{} = private unnamed_addr constant {} {}, align {}",
                        g.name, g.ty, g.init, g.align
                    );
                } else {
                    let _ = writeln!(
                        out,
                        "@{} = global {} {}, align {}",
                        g.name, g.ty, g.init, g.align
                    );
                }
            }
        }

        for func in &self.functions {
            let _ = writeln!(out);
            let params: Vec<String> = func
                .params
                .iter()
                .map(|(name, ty)| format!("{} %{}", ty, name))
                .collect();
            let mut sig = params.join(", ");
            if func.variadic {
                if sig.is_empty() {
                    sig = "...".to_string();
                } else {
                    sig.push_str(", ...");
                }
            }
            if func.is_declaration() {
                let _ = writeln!(out, "declare {} @{}({})", func.ret, func.name, sig);
            } else {
                let _ = writeln!(out, "define {} @{}({}) {{", func.ret, func.name, sig);
                for (i, block) in func.blocks.iter().enumerate() {
                    if i > 0 {
                        let _ = writeln!(out);
                    }
                    let _ = writeln!(out, "{}:", block.label);
                    for inst in &block.insts {
                        let _ = writeln!(out, "  {}", inst);
                    }
                }
                let _ = writeln!(out, "}}");
            }
        }

        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_function() -> Function {
        let mut func = Function::new("answer", Type::I32, vec![], false);
        let entry = func.add_block("entry");
        func.set_insert_point(entry);
        let slot = func.alloca("a", Type::I32, 4);
        func.store(Type::I32, Value::ConstInt(42), slot.clone());
        let val = func.load(Type::I32, slot);
        func.ret(Type::I32, Some(val));
        func
    }

    #[test]
    fn test_function_build_and_print() {
        let mut module = Module::new("t.c", "x86_64-unknown-linux-gnu", "");
        module.functions.push(sample_function());
        let text = module.print_to_string();
        assert!(text.contains("define i32 @answer() {"));
        assert!(text.contains("%a.addr = alloca i32, align 4"));
        assert!(text.contains("store i32 42, ptr %a.addr"));
        assert!(text.contains("ret i32 %t0"));
    }

    #[test]
    fn test_alloca_hoisted_to_entry_head() {
        let mut func = Function::new("f", Type::Void, vec![], false);
        let entry = func.add_block("entry");
        func.set_insert_point(entry);
        let a = func.alloca("a", Type::I32, 4);
        func.store(Type::I32, Value::ConstInt(1), a);
        // A second alloca lands before the store but after the first alloca.
        let b = func.alloca("b", Type::I32, 4);
        func.store(Type::I32, Value::ConstInt(2), b);
        let kinds: Vec<bool> = func.blocks[0]
            .insts
            .iter()
            .map(|i| matches!(i.kind, InstKind::Alloca { .. }))
            .collect();
        assert_eq!(kinds, vec![true, true, false, false]);
    }

    #[test]
    fn test_local_name_uniquing() {
        let mut func = Function::new("f", Type::Void, vec![], false);
        let entry = func.add_block("entry");
        func.set_insert_point(entry);
        let a0 = func.alloca("a", Type::I32, 4);
        let a1 = func.alloca("a", Type::I32, 4);
        assert_eq!(a0, Value::Local("a.addr".into()));
        assert_eq!(a1, Value::Local("a.addr1".into()));
    }

    #[test]
    fn test_switch_case_patching() {
        let mut func = Function::new("f", Type::I32, vec![], false);
        let entry = func.add_block("entry");
        let default = func.add_block("sw.default");
        let case0 = func.add_block("sw.case");
        func.set_insert_point(entry);
        let loc = func.switch_inst(Type::I32, Value::ConstInt(1), default);
        func.add_switch_case(loc, 10, case0);
        let printed = func.blocks[0].insts[0].to_string();
        assert_eq!(
            printed,
            "switch i32 1, label %sw.default0 [ i32 10, label %sw.case1 ]"
        );
    }

    #[test]
    fn test_current_block_tracks_cursor() {
        let mut func = Function::new("f", Type::Void, vec![], false);
        let entry = func.add_block("entry");
        let next = func.add_block("next");
        func.set_insert_point(entry);
        assert_eq!(func.current_block(), entry);
        func.br(next);
        assert!(func.current_terminated());
        func.set_insert_point(next);
        assert_eq!(func.current_block(), next);
        assert!(!func.current_terminated());
    }

    #[test]
    fn test_definition_lookup() {
        let func = sample_function();
        let def = func.definition_of(&Value::Temp(0)).unwrap();
        assert!(matches!(def.kind, InstKind::Load { .. }));
    }

    #[test]
    fn test_declaration_print() {
        let mut module = Module::new("t.c", "", "");
        module.functions.push(Function::new(
            "printf",
            Type::I32,
            vec![("fmt".into(), Type::Ptr)],
            true,
        ));
        let text = module.print_to_string();
        assert!(text.contains("declare i32 @printf(ptr %fmt, ...)"));
    }
}
