//! Expression lowering.

use super::{IrGen, TypedValue};
use crate::ast::{AstNode, BinaryOp, NodeKind, UnaryOp};
use crate::diag::{Diag, DiagResult};
use crate::types::{TagKind, Type as CType};
use minic_ir::{BinOp, CastOp, FPred, IPred, Type, Value};

fn icmp_pred(op: BinaryOp, signed: bool) -> IPred {
    match op {
        BinaryOp::Equal => IPred::Eq,
        BinaryOp::NotEqual => IPred::Ne,
        BinaryOp::Less => {
            if signed {
                IPred::Slt
            } else {
                IPred::Ult
            }
        }
        BinaryOp::LessEqual => {
            if signed {
                IPred::Sle
            } else {
                IPred::Ule
            }
        }
        BinaryOp::Greater => {
            if signed {
                IPred::Sgt
            } else {
                IPred::Ugt
            }
        }
        BinaryOp::GreaterEqual => {
            if signed {
                IPred::Sge
            } else {
                IPred::Uge
            }
        }
        _ => unreachable!("not a comparison operator"),
    }
}

fn fcmp_pred(op: BinaryOp) -> FPred {
    match op {
        BinaryOp::Equal => FPred::Oeq,
        BinaryOp::NotEqual => FPred::One,
        BinaryOp::Less => FPred::Olt,
        BinaryOp::LessEqual => FPred::Ole,
        BinaryOp::Greater => FPred::Ogt,
        BinaryOp::GreaterEqual => FPred::Oge,
        _ => unreachable!("not a comparison operator"),
    }
}

/// Select the opcode for an arithmetic/bitwise operation in `ty`.
fn arith_op(op: BinaryOp, ty: &CType) -> BinOp {
    if ty.is_float() {
        return match op {
            BinaryOp::Add => BinOp::FAdd,
            BinaryOp::Sub => BinOp::FSub,
            BinaryOp::Mul => BinOp::FMul,
            BinaryOp::Div => BinOp::FDiv,
            _ => unreachable!("float operand on an integer-only operator"),
        };
    }
    let signed = ty.is_signed();
    match op {
        BinaryOp::Add => BinOp::Add,
        BinaryOp::Sub => BinOp::Sub,
        BinaryOp::Mul => BinOp::Mul,
        BinaryOp::Div => {
            if signed {
                BinOp::SDiv
            } else {
                BinOp::UDiv
            }
        }
        BinaryOp::Mod => {
            if signed {
                BinOp::SRem
            } else {
                BinOp::URem
            }
        }
        BinaryOp::BitwiseAnd => BinOp::And,
        BinaryOp::BitwiseOr => BinOp::Or,
        BinaryOp::BitwiseXor => BinOp::Xor,
        BinaryOp::LeftShift => BinOp::Shl,
        BinaryOp::RightShift => {
            if signed {
                BinOp::AShr
            } else {
                BinOp::LShr
            }
        }
        _ => unreachable!("not an arithmetic operator"),
    }
}

impl IrGen<'_> {
    pub(super) fn expect_value(
        &self,
        v: Option<TypedValue>,
        node: &AstNode,
    ) -> DiagResult<TypedValue> {
        v.ok_or_else(|| Diag::internal(format!("void value used at {}", node.tok.loc())))
    }

    /// Lower one expression. `None` means the expression had type `void`.
    pub(super) fn emit_expr(&mut self, node: &AstNode) -> DiagResult<Option<TypedValue>> {
        match &node.kind {
            NodeKind::IntLiteral(v) => {
                let ty = self.lower_type(&node.ty);
                Ok(Some(TypedValue::new(ty, Value::ConstInt(*v))))
            }
            NodeKind::FloatLiteral(v) => {
                let ty = self.lower_type(&node.ty);
                // A float-typed literal carries the value at f32 precision.
                let v = if ty == Type::F32 { *v as f32 as f64 } else { *v };
                Ok(Some(TypedValue::new(ty, Value::ConstFloat(v))))
            }
            NodeKind::StringLiteral(bytes) => {
                let name = self.string_global(bytes);
                Ok(Some(TypedValue::new(Type::Ptr, Value::Global(name))))
            }
            NodeKind::VariableAccess => self.emit_variable_access(node).map(Some),
            NodeKind::Binary { op, lhs, rhs } => self.emit_binary(node, *op, lhs, rhs),
            NodeKind::Unary { op, operand } => self.emit_unary(node, *op, operand).map(Some),
            NodeKind::Cast { operand } => self.emit_cast(node, operand),
            NodeKind::Ternary { cond, then, els } => self.emit_ternary(node, cond, then, els),
            NodeKind::SizeOf { operand, query } => {
                let cty = match (query, operand) {
                    (Some(ty), _) => ty.clone(),
                    (None, Some(operand)) => operand.ty.clone(),
                    (None, None) => {
                        return Err(Diag::internal("sizeof without operand or type"));
                    }
                };
                Ok(Some(TypedValue::new(
                    Type::I32,
                    Value::ConstInt(cty.size() as i64),
                )))
            }
            NodeKind::PostInc { operand } => self.emit_incdec(operand, 1, true).map(Some),
            NodeKind::PostDec { operand } => self.emit_incdec(operand, -1, true).map(Some),
            NodeKind::Subscript { base, index } => self.emit_subscript(node, base, index).map(Some),
            NodeKind::MemberDot { base, member } => {
                let base_val = self.emit_expr(base)?;
                let base_val = self.expect_value(base_val, base)?;
                let (base_addr, _) = self.addr_of(&base_val, base)?;
                self.emit_member_load(node, &base.ty, base_addr, member.index)
                    .map(Some)
            }
            NodeKind::MemberArrow { base, member } => {
                let base_val = self.emit_expr(base)?;
                let base_val = self.expect_value(base_val, base)?;
                let pointee = base
                    .ty
                    .pointee()
                    .ok_or_else(|| Diag::internal("arrow through a non-pointer"))?;
                self.emit_member_load(node, &pointee, base_val.val, member.index)
                    .map(Some)
            }
            NodeKind::Call { callee, args } => self.emit_call(callee, args),
            _ => Err(Diag::internal(format!(
                "statement node in expression position at {}",
                node.tok.loc()
            ))),
        }
    }

    fn emit_variable_access(&mut self, node: &AstNode) -> DiagResult<TypedValue> {
        let name = node.name();
        // Function designators are their own address; no load.
        if node.ty.is_func() {
            return Ok(TypedValue::new(Type::Ptr, Value::Global(name.to_string())));
        }
        let slot = self
            .lookup_var(name)
            .ok_or_else(|| Diag::internal(format!("unbound variable '{}'", name)))?;
        let val = self.func().load(slot.ty.clone(), slot.addr);
        Ok(TypedValue::new(slot.ty, val))
    }

    fn emit_cast(&mut self, node: &AstNode, operand: &AstNode) -> DiagResult<Option<TypedValue>> {
        let v = self.emit_expr(operand)?;
        if node.ty.is_void() {
            return Ok(None);
        }
        let v = self.expect_value(v, operand)?;
        Ok(Some(self.convert(v, &operand.ty, &node.ty)))
    }

    fn emit_binary(
        &mut self,
        node: &AstNode,
        op: BinaryOp,
        lhs: &AstNode,
        rhs: &AstNode,
    ) -> DiagResult<Option<TypedValue>> {
        match op {
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                self.emit_short_circuit(op, lhs, rhs).map(Some)
            }
            BinaryOp::Comma => {
                self.emit_expr(lhs)?;
                self.emit_expr(rhs)
            }
            BinaryOp::Assign => self.emit_assign(lhs, rhs).map(Some),
            _ if op.is_assign() => self.emit_compound_assign(op, lhs, rhs).map(Some),
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::Less
            | BinaryOp::LessEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual => self.emit_comparison(op, lhs, rhs).map(Some),
            _ => self.emit_arith_binary(node, op, lhs, rhs).map(Some),
        }
    }

    /// `+`, `-`, `*`, `/`, `%`, bitwise, shifts — including the pointer
    /// forms of `+` and `-` (Sema already put the pointer on the left).
    fn emit_arith_binary(
        &mut self,
        node: &AstNode,
        op: BinaryOp,
        lhs: &AstNode,
        rhs: &AstNode,
    ) -> DiagResult<TypedValue> {
        let l = self.emit_expr(lhs)?;
        let l = self.expect_value(l, lhs)?;
        let r = self.emit_expr(rhs)?;
        let r = self.expect_value(r, rhs)?;

        if lhs.ty.is_pointer() {
            let elem = self.lower_type(&lhs.ty.pointee().expect("pointer without pointee"));
            return match op {
                BinaryOp::Add => {
                    let addr = self.func().gep(elem, l.val, vec![(r.ty, r.val)]);
                    Ok(TypedValue::new(Type::Ptr, addr))
                }
                BinaryOp::Sub if rhs.ty.is_pointer() => {
                    // ptr - ptr: raw difference as long.
                    let li = self.func().cast(CastOp::PtrToInt, Type::Ptr, l.val, Type::I64);
                    let ri = self.func().cast(CastOp::PtrToInt, Type::Ptr, r.val, Type::I64);
                    let diff = self.func().binary(BinOp::Sub, Type::I64, li, ri);
                    Ok(TypedValue::new(Type::I64, diff))
                }
                BinaryOp::Sub => {
                    let neg = self.func().neg(r.ty.clone(), r.val);
                    let addr = self.func().gep(elem, l.val, vec![(r.ty, neg)]);
                    Ok(TypedValue::new(Type::Ptr, addr))
                }
                _ => Err(Diag::internal("pointer operand on a non-additive operator")),
            };
        }

        // Usual arithmetic conversions were committed by Sema: node.ty is
        // the common type. Widen both operands to it, then pick the opcode.
        let l = self.convert(l, &lhs.ty, &node.ty);
        let r = self.convert(r, &rhs.ty, &node.ty);
        let ir_op = arith_op(op, &node.ty);
        let ty = l.ty.clone();
        let val = self.func().binary(ir_op, ty.clone(), l.val, r.val);
        Ok(TypedValue::new(ty, val))
    }

    /// Comparisons produce a 1-bit predicate, zero-extended to a 32-bit 0/1.
    fn emit_comparison(
        &mut self,
        op: BinaryOp,
        lhs: &AstNode,
        rhs: &AstNode,
    ) -> DiagResult<TypedValue> {
        let l = self.emit_expr(lhs)?;
        let mut l = self.expect_value(l, lhs)?;
        let r = self.emit_expr(rhs)?;
        let mut r = self.expect_value(r, rhs)?;

        let cmp = if l.ty == Type::Ptr || r.ty == Type::Ptr {
            // Pointer comparison; an integer side (e.g. a literal 0) is
            // brought over to the pointer domain first.
            if l.ty != Type::Ptr {
                let val = self.func().cast(CastOp::IntToPtr, l.ty.clone(), l.val, Type::Ptr);
                l = TypedValue::new(Type::Ptr, val);
            }
            if r.ty != Type::Ptr {
                let val = self.func().cast(CastOp::IntToPtr, r.ty.clone(), r.val, Type::Ptr);
                r = TypedValue::new(Type::Ptr, val);
            }
            self.func()
                .icmp(icmp_pred(op, false), Type::Ptr, l.val, r.val)
        } else {
            let common = CType::usual_arith(&lhs.ty, &rhs.ty);
            let l = self.convert(l, &lhs.ty, &common);
            let r = self.convert(r, &rhs.ty, &common);
            if common.is_float() {
                self.func().fcmp(fcmp_pred(op), l.ty.clone(), l.val, r.val)
            } else {
                self.func()
                    .icmp(icmp_pred(op, common.is_signed()), l.ty.clone(), l.val, r.val)
            }
        };
        let val = self.func().cast(CastOp::ZExt, Type::I1, cmp, Type::I32);
        Ok(TypedValue::new(Type::I32, val))
    }

    /// `&&` / `||` lower to a diamond: the right operand only runs when the
    /// left does not decide the result, and a phi merges the two edges. The
    /// phi's right-edge predecessor is fetched *after* emitting the right
    /// operand — its evaluation may have opened new blocks.
    fn emit_short_circuit(
        &mut self,
        op: BinaryOp,
        lhs: &AstNode,
        rhs: &AstNode,
    ) -> DiagResult<TypedValue> {
        let (rhs_hint, const_hint, merge_hint, const_val) = match op {
            BinaryOp::LogicalAnd => ("land.rhs", "land.false", "land.merge", 0),
            BinaryOp::LogicalOr => ("lor.rhs", "lor.true", "lor.merge", 1),
            _ => unreachable!("not a short-circuit operator"),
        };

        let l = self.emit_expr(lhs)?;
        let l = self.expect_value(l, lhs)?;
        let lb = self.to_bool(&l);

        let rhs_block = self.func().add_block(rhs_hint);
        let const_block = self.func().add_block(const_hint);
        let merge_block = self.func().add_block(merge_hint);

        match op {
            BinaryOp::LogicalAnd => self.func().cond_br(lb, rhs_block, const_block),
            _ => self.func().cond_br(lb, const_block, rhs_block),
        }

        self.func().set_insert_point(rhs_block);
        let r = self.emit_expr(rhs)?;
        let r = self.expect_value(r, rhs)?;
        let rb = self.to_bool(&r);
        let rz = self.func().cast(CastOp::ZExt, Type::I1, rb, Type::I32);
        let rhs_pred = self.func().current_block();
        self.func().br(merge_block);

        self.func().set_insert_point(const_block);
        self.func().br(merge_block);

        self.func().set_insert_point(merge_block);
        let val = self.func().phi(
            Type::I32,
            vec![
                (rz, rhs_pred),
                (Value::ConstInt(const_val), const_block),
            ],
        );
        Ok(TypedValue::new(Type::I32, val))
    }

    fn emit_ternary(
        &mut self,
        node: &AstNode,
        cond: &AstNode,
        then: &AstNode,
        els: &AstNode,
    ) -> DiagResult<Option<TypedValue>> {
        let c = self.emit_expr(cond)?;
        let c = self.expect_value(c, cond)?;
        let cb = self.to_bool(&c);

        let then_block = self.func().add_block("cond.then");
        let else_block = self.func().add_block("cond.else");
        let merge_block = self.func().add_block("cond.merge");
        self.func().cond_br(cb, then_block, else_block);

        self.func().set_insert_point(then_block);
        let tv = self.emit_expr(then)?;
        let tv = tv.map(|v| self.convert(v, &then.ty, &node.ty));
        let then_pred = self.func().current_block();
        self.func().br(merge_block);

        self.func().set_insert_point(else_block);
        let ev = self.emit_expr(els)?;
        let ev = ev.map(|v| self.convert(v, &els.ty, &node.ty));
        let else_pred = self.func().current_block();
        self.func().br(merge_block);

        self.func().set_insert_point(merge_block);
        match (tv, ev) {
            (Some(tv), Some(ev)) => {
                let ty = tv.ty.clone();
                let val = self
                    .func()
                    .phi(ty.clone(), vec![(tv.val, then_pred), (ev.val, else_pred)]);
                Ok(Some(TypedValue::new(ty, val)))
            }
            _ => Ok(None),
        }
    }

    /// The LHS was emitted as a load; recover its address and store the
    /// converted RHS. The assignment's value is the converted RHS.
    fn emit_assign(&mut self, lhs: &AstNode, rhs: &AstNode) -> DiagResult<TypedValue> {
        let l = self.emit_expr(lhs)?;
        let l = self.expect_value(l, lhs)?;
        let r = self.emit_expr(rhs)?;
        let r = self.expect_value(r, rhs)?;
        let (addr, _) = self.addr_of(&l, lhs)?;
        let r = self.convert(r, &rhs.ty, &lhs.ty);
        self.func().store(r.ty.clone(), r.val.clone(), addr);
        Ok(r)
    }

    fn emit_compound_assign(
        &mut self,
        op: BinaryOp,
        lhs: &AstNode,
        rhs: &AstNode,
    ) -> DiagResult<TypedValue> {
        let base_op = op.compound_base().expect("compound assignment operator");
        let l = self.emit_expr(lhs)?;
        let l = self.expect_value(l, lhs)?;
        let r = self.emit_expr(rhs)?;
        let r = self.expect_value(r, rhs)?;
        let (addr, _) = self.addr_of(&l, lhs)?;

        // ptr += n / ptr -= n use pointer arithmetic.
        if lhs.ty.is_pointer() {
            let elem = self.lower_type(&lhs.ty.pointee().expect("pointer without pointee"));
            let idx = match base_op {
                BinaryOp::Add => r.val,
                BinaryOp::Sub => self.func().neg(r.ty.clone(), r.val),
                _ => return Err(Diag::internal("pointer compound assignment operator")),
            };
            let new_val = self.func().gep(elem, l.val, vec![(r.ty, idx)]);
            self.func().store(Type::Ptr, new_val.clone(), addr);
            return Ok(TypedValue::new(Type::Ptr, new_val));
        }

        // a op= b  ==>  a = a op b, computed in the usual common type and
        // narrowed back to a's type for the store.
        let common = CType::usual_arith(&lhs.ty, &rhs.ty);
        let lc = self.convert(l, &lhs.ty, &common);
        let rc = self.convert(r, &rhs.ty, &common);
        let ir_op = arith_op(base_op, &common);
        let ty = lc.ty.clone();
        let res = self.func().binary(ir_op, ty.clone(), lc.val, rc.val);
        let back = self.convert(TypedValue::new(ty, res), &common, &lhs.ty);
        self.func().store(back.ty.clone(), back.val.clone(), addr);
        Ok(back)
    }

    fn emit_unary(&mut self, node: &AstNode, op: UnaryOp, operand: &AstNode) -> DiagResult<TypedValue> {
        match op {
            UnaryOp::Inc => return self.emit_incdec(operand, 1, false),
            UnaryOp::Dec => return self.emit_incdec(operand, -1, false),
            _ => {}
        }

        let v = self.emit_expr(operand)?;
        let v = self.expect_value(v, operand)?;
        match op {
            UnaryOp::Positive => Ok(v),
            UnaryOp::Negative => {
                let ty = v.ty.clone();
                let val = if ty.is_float() {
                    self.func().fneg(ty.clone(), v.val)
                } else {
                    self.func().neg(ty.clone(), v.val)
                };
                Ok(TypedValue::new(ty, val))
            }
            UnaryOp::LogicalNot => {
                let b = self.to_bool(&v);
                let inverted = self
                    .func()
                    .binary(BinOp::Xor, Type::I1, b, Value::ConstInt(1));
                let val = self.func().cast(CastOp::ZExt, Type::I1, inverted, Type::I32);
                Ok(TypedValue::new(Type::I32, val))
            }
            UnaryOp::BitwiseNot => {
                let ty = v.ty.clone();
                let val = self
                    .func()
                    .binary(BinOp::Xor, ty.clone(), v.val, Value::ConstInt(-1));
                Ok(TypedValue::new(ty, val))
            }
            UnaryOp::Addr => {
                let (addr, _) = self.addr_of(&v, operand)?;
                Ok(TypedValue::new(Type::Ptr, addr))
            }
            UnaryOp::Deref => {
                let ty = self.lower_type(&node.ty);
                let val = self.func().load(ty.clone(), v.val);
                Ok(TypedValue::new(ty, val))
            }
            UnaryOp::Inc | UnaryOp::Dec => unreachable!("handled above"),
        }
    }

    /// Shared pre/post increment and decrement: compute the new value, store
    /// it, and hand back either the old value (post) or the new one (pre).
    fn emit_incdec(&mut self, operand: &AstNode, delta: i64, is_post: bool) -> DiagResult<TypedValue> {
        let v = self.emit_expr(operand)?;
        let v = self.expect_value(v, operand)?;
        let (addr, _) = self.addr_of(&v, operand)?;

        let new_val = if operand.ty.is_pointer() {
            let elem = self.lower_type(&operand.ty.pointee().expect("pointer without pointee"));
            self.func()
                .gep(elem, v.val.clone(), vec![(Type::I32, Value::ConstInt(delta))])
        } else if v.ty.is_float() {
            self.func().binary(
                BinOp::FAdd,
                v.ty.clone(),
                v.val.clone(),
                Value::ConstFloat(delta as f64),
            )
        } else {
            self.func().binary(
                BinOp::Add,
                v.ty.clone(),
                v.val.clone(),
                Value::ConstInt(delta),
            )
        };
        self.func().store(v.ty.clone(), new_val.clone(), addr);

        Ok(if is_post {
            v
        } else {
            TypedValue::new(v.ty, new_val)
        })
    }

    /// `e[i]`: indexed address off the base, scaled by the element size,
    /// then a load. Arrays contribute the address they were loaded from.
    fn emit_subscript(
        &mut self,
        node: &AstNode,
        base: &AstNode,
        index: &AstNode,
    ) -> DiagResult<TypedValue> {
        let elem_ty = self.lower_type(&node.ty);
        let b = self.emit_expr(base)?;
        let b = self.expect_value(b, base)?;
        let idx = self.emit_expr(index)?;
        let idx = self.expect_value(idx, index)?;

        let base_addr = if b.ty == Type::Ptr {
            b.val
        } else {
            let (addr, _) = self.addr_of(&b, base)?;
            addr
        };
        let addr = self
            .func()
            .gep(elem_ty.clone(), base_addr, vec![(idx.ty, idx.val)]);
        let val = self.func().load(elem_ty.clone(), addr);
        Ok(TypedValue::new(elem_ty, val))
    }

    /// Struct members address as gep {0, index}; union members all live at
    /// offset zero of the single-field lowering.
    fn emit_member_load(
        &mut self,
        node: &AstNode,
        record_cty: &CType,
        base_addr: Value,
        member_index: usize,
    ) -> DiagResult<TypedValue> {
        let rec = record_cty
            .as_record()
            .ok_or_else(|| Diag::internal("member access on a non-record"))?;
        let tag = rec.borrow().tag;
        let record_ir = self.lower_type(record_cty);
        let member_ir = self.lower_type(&node.ty);

        let field = match tag {
            TagKind::Struct => member_index as i64,
            TagKind::Union => 0,
        };
        let addr = self.func().gep(
            record_ir,
            base_addr,
            vec![
                (Type::I32, Value::ConstInt(0)),
                (Type::I32, Value::ConstInt(field)),
            ],
        );
        let val = self.func().load(member_ir.clone(), addr);
        Ok(TypedValue::new(member_ir, val))
    }

    fn emit_call(&mut self, callee: &AstNode, args: &[AstNode]) -> DiagResult<Option<TypedValue>> {
        let func_cty = callee
            .ty
            .callable()
            .ok_or_else(|| Diag::internal("call through a non-function"))?;

        let callee_val = self.emit_expr(callee)?;
        let callee_val = self.expect_value(callee_val, callee)?;

        let mut lowered_args = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let v = self.emit_expr(arg)?;
            let v = self.expect_value(v, arg)?;
            let v = match func_cty.params.get(i) {
                // Positional arguments convert to the declared parameter type.
                Some(param) => self.convert(v, &arg.ty, &param.ty),
                // Variadic extras pass through, arrays decaying to pointers.
                None if arg.ty.is_array() => self.convert(v, &arg.ty, &arg.ty.decayed()),
                None => v,
            };
            lowered_args.push((v.ty, v.val));
        }

        let ret_ir = self.lower_type(&func_cty.ret);
        let param_tys: Vec<Type> = func_cty
            .params
            .iter()
            .map(|p| self.lower_type(&p.ty))
            .collect();
        let result = self.func().call(
            ret_ir.clone(),
            callee_val.val,
            lowered_args,
            param_tys,
            func_cty.variadic,
        );
        Ok(result.map(|val| TypedValue::new(ret_ir, val)))
    }
}
