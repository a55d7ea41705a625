//! AST to SSA IR emission.
//!
//! A single post-order walk over the typed tree, populating a
//! [`minic_ir::Module`]. The emitter keeps a scope stack of name-to-slot
//! maps (locals are stack slots allocated in the entry block so their
//! addresses dominate all uses), two maps resolving `break`/`continue`
//! handles to basic blocks, and a stack of active switch frames that `case`
//! and `default` labels attach themselves to.
//!
//! Submodules: `expr` lowers expressions, `stmt` lowers statements and local
//! declarations, `globals` builds global initializer constants and interned
//! string literals.

mod expr;
mod globals;
mod stmt;

use crate::ast::{AstNode, LoopId, NodeKind, Program};
use crate::config::CompilerConfig;
use crate::diag::{Diag, DiagResult};
use crate::types::{TagKind, Type as CType};
use minic_ir::{
    BlockId, CastOp, Function, InstKind, Module, StructDef, SwitchLoc, Type, Value,
};
use std::collections::HashMap;

/// An IR value together with its IR type.
#[derive(Debug, Clone)]
pub struct TypedValue {
    pub ty: Type,
    pub val: Value,
}

impl TypedValue {
    fn new(ty: Type, val: Value) -> Self {
        TypedValue { ty, val }
    }
}

/// Where a named variable lives.
#[derive(Debug, Clone)]
struct VarSlot {
    addr: Value,
    ty: Type,
}

/// An active `switch` being filled in while its body is walked.
struct SwitchFrame {
    loc: SwitchLoc,
    default_block: BlockId,
    has_default: bool,
}

pub struct IrGen<'a> {
    config: &'a CompilerConfig,
    module: Module,
    func: Option<Function>,
    /// C return type of the function being emitted
    ret_cty: Option<CType>,
    locals: Vec<HashMap<String, VarSlot>>,
    globals: HashMap<String, VarSlot>,
    break_blocks: HashMap<LoopId, BlockId>,
    continue_blocks: HashMap<LoopId, BlockId>,
    switches: Vec<SwitchFrame>,
    string_globals: HashMap<Vec<u8>, String>,
    string_counter: usize,
}

impl<'a> IrGen<'a> {
    pub fn new(config: &'a CompilerConfig) -> Self {
        IrGen {
            config,
            module: Module::default(),
            func: None,
            ret_cty: None,
            locals: Vec::new(),
            globals: HashMap::new(),
            break_blocks: HashMap::new(),
            continue_blocks: HashMap::new(),
            switches: Vec::new(),
            string_globals: HashMap::new(),
            string_counter: 0,
        }
    }

    /// Walk the translation unit in declaration order and hand back the
    /// finished module.
    pub fn emit_program(mut self, program: &Program) -> DiagResult<Module> {
        self.module = Module::new(
            &program.file_name,
            &self.config.triple,
            &self.config.data_layout,
        );
        for decl in &program.ext_decls {
            match &decl.kind {
                NodeKind::FuncDecl { .. } => self.emit_func_decl(decl)?,
                NodeKind::Decl { items } => {
                    for item in items {
                        self.emit_global_var(item)?;
                    }
                }
                _ => {
                    return Err(Diag::internal(format!(
                        "unexpected external declaration at {}",
                        decl.tok.loc()
                    )));
                }
            }
        }
        Ok(self.module)
    }

    // ---- current function plumbing --------------------------------------

    fn func(&mut self) -> &mut Function {
        self.func.as_mut().expect("no function under construction")
    }

    fn func_ref(&self) -> &Function {
        self.func.as_ref().expect("no function under construction")
    }

    fn push_scope(&mut self) {
        self.locals.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.locals.pop();
    }

    fn bind_local(&mut self, name: &str, addr: Value, ty: Type) {
        self.locals
            .last_mut()
            .expect("no local scope")
            .insert(name.to_string(), VarSlot { addr, ty });
    }

    fn lookup_var(&self, name: &str) -> Option<VarSlot> {
        for scope in self.locals.iter().rev() {
            if let Some(slot) = scope.get(name) {
                return Some(slot.clone());
            }
        }
        self.globals.get(name).cloned()
    }

    // ---- type lowering --------------------------------------------------

    /// Lower a C type to its IR shape, registering record bodies in the
    /// module on first sight. A union lowers to a struct of its single
    /// dominant member.
    fn lower_type(&mut self, cty: &CType) -> Type {
        match cty {
            CType::Void => Type::Void,
            CType::Char | CType::UChar => Type::I8,
            CType::Short | CType::UShort => Type::I16,
            CType::Int | CType::UInt => Type::I32,
            CType::Long | CType::ULong | CType::LongLong | CType::ULongLong => Type::I64,
            CType::Float => Type::F32,
            CType::Double | CType::LongDouble => Type::F64,
            CType::Pointer(_) | CType::Func(_) => Type::Ptr,
            CType::Array(arr) => {
                let (elem, len) = {
                    let arr = arr.borrow();
                    (arr.elem.clone(), arr.len.max(0) as u64)
                };
                Type::array(self.lower_type(&elem), len)
            }
            CType::Record(rec) => {
                let (name, tag, member_tys, dominant) = {
                    let rec = rec.borrow();
                    (
                        rec.name.clone(),
                        rec.tag,
                        rec.members.iter().map(|m| m.ty.clone()).collect::<Vec<_>>(),
                        rec.dominant,
                    )
                };
                if self.module.structs.iter().all(|s| s.name != name) {
                    let fields = match tag {
                        TagKind::Struct => member_tys
                            .iter()
                            .map(|ty| self.lower_type(ty))
                            .collect::<Vec<_>>(),
                        TagKind::Union => member_tys
                            .get(dominant)
                            .map(|ty| vec![self.lower_type(ty)])
                            .unwrap_or_default(),
                    };
                    self.module.add_struct(StructDef {
                        name: name.clone(),
                        fields,
                    });
                }
                Type::Struct(name)
            }
        }
    }

    // ---- value plumbing -------------------------------------------------

    fn zero_of(ty: &Type) -> Value {
        match ty {
            Type::F32 | Type::F64 => Value::ConstFloat(0.0),
            Type::Ptr => Value::Null,
            _ => Value::ConstInt(0),
        }
    }

    /// Convert to a 1-bit truth value: compare against the zero of the
    /// operand's type (integer 0, null pointer, or 0.0).
    fn to_bool(&mut self, v: &TypedValue) -> Value {
        let zero = Self::zero_of(&v.ty);
        let func = self.func();
        match v.ty {
            Type::F32 | Type::F64 => func.fcmp(
                minic_ir::FPred::Une,
                v.ty.clone(),
                v.val.clone(),
                zero,
            ),
            _ => func.icmp(minic_ir::IPred::Ne, v.ty.clone(), v.val.clone(), zero),
        }
    }

    /// Recover the address behind a value: loads give up their pointer
    /// operand, globals and functions are their own address.
    fn addr_of(&mut self, v: &TypedValue, node: &AstNode) -> DiagResult<(Value, Type)> {
        if let Value::Global(_) = v.val {
            return Ok((v.val.clone(), v.ty.clone()));
        }
        if let Some(inst) = self.func_ref().definition_of(&v.val) {
            if let InstKind::Load { ty, addr } = &inst.kind {
                return Ok((addr.clone(), ty.clone()));
            }
        }
        Err(Diag::internal(format!(
            "expected an addressable value at {}",
            node.tok.loc()
        )))
    }

    /// Implicit conversion between C types, sign-aware: unsigned sources
    /// zero-extend and convert via uitofp, signed ones sign-extend.
    fn convert(&mut self, v: TypedValue, from: &CType, to: &CType) -> TypedValue {
        let to_ir = self.lower_type(to);
        if v.ty == to_ir {
            return v;
        }

        // Array-to-pointer decay: take the address the array was loaded from.
        if matches!(v.ty, Type::Array { .. }) && to_ir == Type::Ptr {
            if let Some(inst) = self.func_ref().definition_of(&v.val) {
                if let InstKind::Load { addr, .. } = &inst.kind {
                    return TypedValue::new(Type::Ptr, addr.clone());
                }
            }
            return v;
        }

        let func = self.func.as_mut().expect("no function under construction");
        let val = match (&v.ty, &to_ir) {
            (a, b) if a.is_integer() && b.is_integer() => {
                if a.bits() > b.bits() {
                    func.cast(CastOp::Trunc, v.ty.clone(), v.val, to_ir.clone())
                } else if a.bits() < b.bits() {
                    let op = if *a == Type::I1 || !from.is_signed() {
                        CastOp::ZExt
                    } else {
                        CastOp::SExt
                    };
                    func.cast(op, v.ty.clone(), v.val, to_ir.clone())
                } else {
                    v.val
                }
            }
            (a, b) if a.is_integer() && b.is_float() => {
                let op = if from.is_signed() {
                    CastOp::SiToFp
                } else {
                    CastOp::UiToFp
                };
                func.cast(op, v.ty.clone(), v.val, to_ir.clone())
            }
            (a, b) if a.is_float() && b.is_integer() => {
                let op = if to.is_signed() {
                    CastOp::FpToSi
                } else {
                    CastOp::FpToUi
                };
                func.cast(op, v.ty.clone(), v.val, to_ir.clone())
            }
            (Type::F32, Type::F64) => func.cast(CastOp::FpExt, Type::F32, v.val, Type::F64),
            (Type::F64, Type::F32) => func.cast(CastOp::FpTrunc, Type::F64, v.val, Type::F32),
            (a, Type::Ptr) if a.is_integer() => {
                func.cast(CastOp::IntToPtr, v.ty.clone(), v.val, Type::Ptr)
            }
            (Type::Ptr, b) if b.is_integer() => {
                func.cast(CastOp::PtrToInt, Type::Ptr, v.val, to_ir.clone())
            }
            _ => v.val,
        };
        TypedValue::new(to_ir, val)
    }

    // ---- functions ------------------------------------------------------

    fn emit_func_decl(&mut self, node: &AstNode) -> DiagResult<()> {
        let func_cty = node
            .ty
            .as_func()
            .ok_or_else(|| Diag::internal("function declaration without function type"))?;
        let name = &func_cty.name;
        let ret_ir = self.lower_type(&func_cty.ret);
        let params: Vec<(String, Type)> = func_cty
            .params
            .iter()
            .map(|p| (p.name.clone(), self.lower_type(&p.ty)))
            .collect();

        if self.module.get_function(name).is_none() {
            self.module.functions.push(Function::new(
                name,
                ret_ir.clone(),
                params.clone(),
                func_cty.variadic,
            ));
            self.globals.insert(
                name.clone(),
                VarSlot {
                    addr: Value::Global(name.clone()),
                    ty: Type::Ptr,
                },
            );
        }

        let body = match &node.kind {
            NodeKind::FuncDecl { body: Some(body) } => body,
            _ => return Ok(()),
        };

        // Build the definition in a fresh function object.
        let mut func = Function::new(name, ret_ir.clone(), params.clone(), func_cty.variadic);
        let entry = func.add_block("entry");
        func.set_insert_point(entry);
        self.func = Some(func);
        self.ret_cty = Some(func_cty.ret.clone());

        // Parameters get uniform stack slots so every name is addressable.
        self.locals.clear();
        self.push_scope();
        for (param, cparam) in params.iter().zip(func_cty.params.iter()) {
            let (pname, pty) = param;
            let align = cparam.ty.align().max(1) as u32;
            let slot = self.func().alloca(pname, pty.clone(), align);
            self.func()
                .store(pty.clone(), Value::Local(pname.clone()), slot.clone());
            self.bind_local(pname, slot, pty.clone());
        }

        self.emit_stmt(body)?;

        // Fall-off-the-end: terminate with a conventional default value.
        if !self.func_ref().current_terminated() {
            match &ret_ir {
                Type::Void => self.func().ret(Type::Void, None),
                ty => {
                    let zero = Self::zero_of(ty);
                    let ty = ty.clone();
                    self.func().ret(ty, Some(zero));
                }
            }
        }

        self.pop_scope();
        let built = self.func.take().expect("function under construction");
        self.ret_cty = None;

        match self.module.get_function_mut(name) {
            Some(slot) if slot.is_declaration() => *slot = built,
            Some(_) => {
                return Err(Diag::internal(format!("duplicate definition of '{}'", name)));
            }
            None => self.module.functions.push(built),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::sema::Sema;

    fn emit(src: &str) -> Module {
        let config = CompilerConfig::default();
        let lexer = Lexer::new(src, "test.c");
        let mut parser = Parser::new(lexer, Sema::new()).unwrap();
        let program = parser.parse_program().unwrap();
        let module = IrGen::new(&config).emit_program(&program).unwrap();
        minic_ir::verify(&module).unwrap();
        module
    }

    fn emit_text(src: &str) -> String {
        emit(src).print_to_string()
    }

    #[test]
    fn test_empty_function() {
        let text = emit_text("int main() { return 0; }");
        assert!(text.contains("define i32 @main() {"));
        assert!(text.contains("ret i32 0"));
    }

    #[test]
    fn test_fall_off_end_returns_zero() {
        let text = emit_text("int main() { }");
        assert!(text.contains("ret i32 0"));

        let text = emit_text("void f() { } int main() { f(); return 0; }");
        assert!(text.contains("ret void"));
    }

    #[test]
    fn test_params_get_stack_slots() {
        let text = emit_text("int id(int n) { return n; }");
        assert!(text.contains("%n.addr = alloca i32, align 4"));
        assert!(text.contains("store i32 %n, ptr %n.addr"));
        assert!(text.contains("load i32, ptr %n.addr"));
    }

    #[test]
    fn test_declaration_then_definition() {
        let text = emit_text("int f(int a); int main() { return f(1); } int f(int a) { return a; }");
        // The declaration is replaced by the definition.
        assert!(!text.contains("declare i32 @f"));
        assert!(text.contains("define i32 @f(i32 %a)"));
    }

    #[test]
    fn test_pure_declaration_prints_declare() {
        let text = emit_text("int putchar(int c); int main() { putchar(65); return 0; }");
        assert!(text.contains("declare i32 @putchar(i32 %c)"));
    }

    #[test]
    fn test_union_lowers_to_dominant_member() {
        let text = emit_text("union U { char c; double d; }; union U u; int main() { return 0; }");
        assert!(text.contains("%struct.U = type { double }"));
    }

    #[test]
    fn test_sign_aware_widening() {
        // Unsigned char widens with zext, signed char with sext.
        let text = emit_text(
            "int main() { unsigned char u; char s; u = 200; s = 1; return u + s; }",
        );
        assert!(text.contains("zext i8"), "got: {}", text);
        assert!(text.contains("sext i8"), "got: {}", text);
    }
}
