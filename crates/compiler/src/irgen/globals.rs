//! Global variables and interned string literals.
//!
//! A global's initializer must be a compile-time constant, so the flattened
//! init list is folded through the evaluator while a recursive walk over the
//! declared type assembles the aggregate. Index paths select which entry
//! feeds which scalar; gaps become zeros (null for pointers, recursive zero
//! constants for aggregates).

use super::{IrGen, VarSlot};
use crate::ast::{AstNode, InitValue, NodeKind};
use crate::diag::{Diag, DiagKind, DiagResult};
use crate::eval::{self, Constant as Folded};
use crate::types::{TagKind, Type as CType};
use minic_ir::{Constant, Global, Type, Value};

/// Clamp a folded integer to the width and sign of its destination scalar.
fn wrap_int(cty: &CType, v: i64) -> i64 {
    match cty {
        CType::Char => v as i8 as i64,
        CType::UChar => v as u8 as i64,
        CType::Short => v as i16 as i64,
        CType::UShort => v as u16 as i64,
        CType::Int => v as i32 as i64,
        CType::UInt => v as u32 as i64,
        _ => v,
    }
}

impl IrGen<'_> {
    /// Get or create the interned global for a string literal; returns its
    /// symbol name.
    pub(super) fn string_global(&mut self, bytes: &[u8]) -> String {
        if let Some(name) = self.string_globals.get(bytes) {
            return name.clone();
        }
        let name = format!(".str.{}", self.string_counter);
        self.string_counter += 1;

        let mut data = bytes.to_vec();
        data.push(0);
        self.module.globals.push(Global {
            name: name.clone(),
            ty: Type::array(Type::I8, data.len() as u64),
            init: Constant::Str(data),
            align: 1,
            private_const: true,
        });
        self.string_globals.insert(bytes.to_vec(), name.clone());
        name
    }

    pub(super) fn emit_global_var(&mut self, node: &AstNode) -> DiagResult<()> {
        let NodeKind::VariableDecl { init, .. } = &node.kind else {
            return Err(Diag::internal(format!(
                "expected a variable declaration at {}",
                node.tok.loc()
            )));
        };

        let ir_ty = self.lower_type(&node.ty);
        let mut path = vec![0i64];
        let constant = self.build_global_init(&node.ty, init, &mut path)?;

        let name = node.name().to_string();
        self.module.globals.push(Global {
            name: name.clone(),
            ty: ir_ty.clone(),
            init: constant,
            align: node.ty.align().max(1) as u32,
            private_const: false,
        });
        self.globals.insert(
            name.clone(),
            VarSlot {
                addr: Value::Global(name),
                ty: ir_ty,
            },
        );
        Ok(())
    }

    fn find_init<'b>(inits: &'b [InitValue], path: &[i64]) -> Option<&'b InitValue> {
        inits.iter().find(|iv| iv.path == path)
    }

    /// Recursive constant construction over the declared type, consulting
    /// the flattened init list by index path.
    fn build_global_init(
        &mut self,
        cty: &CType,
        inits: &[InitValue],
        path: &mut Vec<i64>,
    ) -> DiagResult<Constant> {
        let ir_ty = self.lower_type(cty);

        // A subtree no entry reaches is all zero.
        if !inits.iter().any(|iv| iv.path.starts_with(path)) {
            return Ok(match cty {
                CType::Pointer(_) => Constant::NullPtr,
                _ if cty.is_float() => Constant::Float(ir_ty, 0.0),
                _ if cty.is_integer() => Constant::Int(ir_ty, 0),
                _ => Constant::Zero(ir_ty),
            });
        }

        match cty {
            _ if cty.is_integer() => {
                let iv = Self::find_init(inits, path)
                    .ok_or_else(|| Diag::internal("missing scalar initializer entry"))?;
                match eval::eval(&iv.value)? {
                    Folded::Int(v) => Ok(Constant::Int(ir_ty, wrap_int(cty, v))),
                    Folded::Float(v) => Ok(Constant::Int(ir_ty, wrap_int(cty, v as i64))),
                }
            }
            _ if cty.is_float() => {
                let iv = Self::find_init(inits, path)
                    .ok_or_else(|| Diag::internal("missing scalar initializer entry"))?;
                match eval::eval(&iv.value)? {
                    Folded::Int(v) => Ok(Constant::Float(ir_ty, v as f64)),
                    Folded::Float(v) => Ok(Constant::Float(ir_ty, v)),
                }
            }
            CType::Pointer(_) => {
                let iv = Self::find_init(inits, path)
                    .ok_or_else(|| Diag::internal("missing scalar initializer entry"))?;
                // Pointers take a string literal or a null-valued constant.
                if let NodeKind::StringLiteral(bytes) = &iv.value.kind {
                    let name = self.string_global(bytes);
                    return Ok(Constant::Global(name));
                }
                match eval::eval(&iv.value)? {
                    Folded::Int(0) => Ok(Constant::NullPtr),
                    _ => Err(Diag::at(DiagKind::ConstantExpr, &iv.value.tok, "")),
                }
            }
            CType::Array(arr) => {
                let (elem, len) = {
                    let arr = arr.borrow();
                    (arr.elem.clone(), arr.len.max(0))
                };
                let mut elems = Vec::with_capacity(len as usize);
                for i in 0..len {
                    path.push(i);
                    elems.push(self.build_global_init(&elem, inits, path)?);
                    path.pop();
                }
                Ok(Constant::Array(ir_ty, elems))
            }
            CType::Record(rec) => {
                let (tag, member_tys, dominant) = {
                    let rec = rec.borrow();
                    (
                        rec.tag,
                        rec.members.iter().map(|m| m.ty.clone()).collect::<Vec<_>>(),
                        rec.dominant,
                    )
                };
                let fields = match tag {
                    TagKind::Struct => {
                        let mut fields = Vec::with_capacity(member_tys.len());
                        for (i, mty) in member_tys.iter().enumerate() {
                            path.push(i as i64);
                            fields.push(self.build_global_init(mty, inits, path)?);
                            path.pop();
                        }
                        fields
                    }
                    TagKind::Union => {
                        // The lowering has one field: the dominant member.
                        // An initializer reaches it only when the first
                        // member *is* the dominant one; otherwise the bits
                        // are not representable as a typed constant.
                        let Some(dom_ty) = member_tys.get(dominant) else {
                            return Ok(Constant::Zero(ir_ty));
                        };
                        if dominant == 0 {
                            path.push(0);
                            let field = self.build_global_init(dom_ty, inits, path)?;
                            path.pop();
                            vec![field]
                        } else {
                            vec![Constant::Zero(self.lower_type(dom_ty))]
                        }
                    }
                };
                Ok(Constant::Struct(ir_ty, fields))
            }
            _ => Err(Diag::internal(format!("global of unsupported type {}", cty))),
        }
    }
}
