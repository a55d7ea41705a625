//! Statement and local-declaration lowering.
//!
//! Control flow becomes explicit block structure here. Statements following
//! a jump in the same block are unreachable and are skipped rather than
//! emitted after a terminator; `case`/`default` labels are exempt since they
//! open blocks of their own, and blocks recurse so labels nested past a jump
//! are still found.

use super::{IrGen, SwitchFrame};
use crate::ast::{AstNode, NodeKind};
use crate::diag::{Diag, DiagResult};
use minic_ir::{Type, Value};

impl IrGen<'_> {
    pub(super) fn emit_stmt(&mut self, node: &AstNode) -> DiagResult<()> {
        if self.func_ref().current_terminated()
            && !matches!(
                node.kind,
                NodeKind::Case { .. } | NodeKind::Default { .. } | NodeKind::Block { .. }
            )
        {
            return Ok(());
        }

        match &node.kind {
            NodeKind::Block { items } => {
                self.push_scope();
                for item in items {
                    self.emit_stmt(item)?;
                }
                self.pop_scope();
                Ok(())
            }
            NodeKind::Decl { items } => {
                for item in items {
                    self.emit_local_var(item)?;
                }
                Ok(())
            }
            NodeKind::VariableDecl { .. } => self.emit_local_var(node),
            NodeKind::If { cond, then, els } => self.emit_if(cond, then.as_deref(), els.as_deref()),
            NodeKind::For {
                id,
                init,
                cond,
                inc,
                body,
            } => self.emit_for(*id, init.as_deref(), cond.as_deref(), inc.as_deref(), body.as_deref()),
            NodeKind::DoWhile { id, cond, body } => self.emit_do_while(*id, cond, body),
            NodeKind::Switch { id, cond, body, .. } => self.emit_switch(*id, cond, body),
            NodeKind::Case { value, body, .. } => self.emit_case(node, *value, body),
            NodeKind::Default { body } => self.emit_default(node, body),
            NodeKind::Break { target } => {
                let dest = *self.break_blocks.get(target).ok_or_else(|| {
                    Diag::internal(format!("unresolved break target at {}", node.tok.loc()))
                })?;
                self.func().br(dest);
                Ok(())
            }
            NodeKind::Continue { target } => {
                let dest = *self.continue_blocks.get(target).ok_or_else(|| {
                    Diag::internal(format!("unresolved continue target at {}", node.tok.loc()))
                })?;
                self.func().br(dest);
                Ok(())
            }
            NodeKind::Return { value } => self.emit_return(value.as_deref()),
            // Everything else is an expression statement.
            _ => {
                self.emit_expr(node)?;
                Ok(())
            }
        }
    }

    fn emit_condition(&mut self, cond: &AstNode) -> DiagResult<Value> {
        let c = self.emit_expr(cond)?;
        let c = self.expect_value(c, cond)?;
        Ok(self.to_bool(&c))
    }

    fn emit_if(
        &mut self,
        cond: &AstNode,
        then: Option<&AstNode>,
        els: Option<&AstNode>,
    ) -> DiagResult<()> {
        let cb = self.emit_condition(cond)?;

        let then_block = self.func().add_block("if.then");
        let else_block = els.map(|_| self.func().add_block("if.else"));
        let last_block = self.func().add_block("if.end");

        self.func()
            .cond_br(cb, then_block, else_block.unwrap_or(last_block));

        self.func().set_insert_point(then_block);
        if let Some(then) = then {
            self.emit_stmt(then)?;
        }
        self.func().br_if_open(last_block);

        if let (Some(els), Some(else_block)) = (els, else_block) {
            self.func().set_insert_point(else_block);
            self.emit_stmt(els)?;
            self.func().br_if_open(last_block);
        }

        self.func().set_insert_point(last_block);
        Ok(())
    }

    /// `for` (and `while`, which is a `for` with no init/inc): four blocks.
    /// A missing condition falls straight into the body.
    fn emit_for(
        &mut self,
        id: crate::ast::LoopId,
        init: Option<&AstNode>,
        cond: Option<&AstNode>,
        inc: Option<&AstNode>,
        body: Option<&AstNode>,
    ) -> DiagResult<()> {
        self.push_scope();

        let cond_block = self.func().add_block("for.cond");
        let body_block = self.func().add_block("for.body");
        let inc_block = self.func().add_block("for.inc");
        let last_block = self.func().add_block("for.end");

        self.break_blocks.insert(id, last_block);
        self.continue_blocks.insert(id, inc_block);

        // The initializer runs once, in the enclosing block.
        if let Some(init) = init {
            self.emit_stmt(init)?;
        }
        self.func().br(cond_block);

        self.func().set_insert_point(cond_block);
        match cond {
            Some(cond) => {
                let cb = self.emit_condition(cond)?;
                self.func().cond_br(cb, body_block, last_block);
            }
            None => self.func().br(body_block),
        }

        self.func().set_insert_point(body_block);
        if let Some(body) = body {
            self.emit_stmt(body)?;
        }
        self.func().br_if_open(inc_block);

        self.func().set_insert_point(inc_block);
        if let Some(inc) = inc {
            self.emit_expr(inc)?;
        }
        self.func().br(cond_block);

        self.break_blocks.remove(&id);
        self.continue_blocks.remove(&id);

        self.func().set_insert_point(last_block);
        self.pop_scope();
        Ok(())
    }

    fn emit_do_while(
        &mut self,
        id: crate::ast::LoopId,
        cond: &AstNode,
        body: &AstNode,
    ) -> DiagResult<()> {
        let body_block = self.func().add_block("do.body");
        let cond_block = self.func().add_block("do.cond");
        let last_block = self.func().add_block("do.end");

        self.break_blocks.insert(id, last_block);
        self.continue_blocks.insert(id, cond_block);

        self.func().br(body_block);
        self.func().set_insert_point(body_block);
        self.emit_stmt(body)?;
        self.func().br_if_open(cond_block);

        self.func().set_insert_point(cond_block);
        let cb = self.emit_condition(cond)?;
        self.func().cond_br(cb, body_block, last_block);

        self.break_blocks.remove(&id);
        self.continue_blocks.remove(&id);

        self.func().set_insert_point(last_block);
        Ok(())
    }

    /// Evaluate the scrutinee, emit a `switch` whose arms are attached as
    /// the body's `case` labels are visited, and give `break` the join
    /// block. Fall-through between labels is an ordinary branch inserted
    /// when the previous label's block is still open.
    fn emit_switch(
        &mut self,
        id: crate::ast::LoopId,
        cond: &AstNode,
        body: &AstNode,
    ) -> DiagResult<()> {
        let c = self.emit_expr(cond)?;
        let c = self.expect_value(c, cond)?;

        let default_block = self.func().add_block("sw.default");
        let join_block = self.func().add_block("sw.epilog");
        let loc = self.func().switch_inst(c.ty.clone(), c.val, default_block);

        self.break_blocks.insert(id, join_block);
        self.switches.push(SwitchFrame {
            loc,
            default_block,
            has_default: false,
        });

        // Statements before the first label are unreachable; give them a
        // block of their own so the switch terminator stays intact.
        let preamble = self.func().add_block("sw.body");
        self.func().set_insert_point(preamble);

        self.emit_stmt(body)?;
        // The last label's block falls out of the switch.
        self.func().br_if_open(join_block);

        let frame = self.switches.pop().expect("switch frame underflow");
        if !frame.has_default {
            // No `default`: the default target goes straight to the join.
            self.func().set_insert_point(frame.default_block);
            self.func().br(join_block);
        }

        self.break_blocks.remove(&id);
        self.func().set_insert_point(join_block);
        Ok(())
    }

    fn emit_case(&mut self, node: &AstNode, value: i64, body: &AstNode) -> DiagResult<()> {
        let loc = self
            .switches
            .last()
            .ok_or_else(|| Diag::internal(format!("case outside switch at {}", node.tok.loc())))?
            .loc;

        let case_block = self.func().add_block("sw.bb");
        // Fall-through: the previous label's block is still open.
        self.func().br_if_open(case_block);
        self.func().add_switch_case(loc, value, case_block);
        self.func().set_insert_point(case_block);
        self.emit_stmt(body)
    }

    fn emit_default(&mut self, node: &AstNode, body: &AstNode) -> DiagResult<()> {
        let default_block = {
            let frame = self.switches.last_mut().ok_or_else(|| {
                Diag::internal(format!("default outside switch at {}", node.tok.loc()))
            })?;
            frame.has_default = true;
            frame.default_block
        };
        self.func().br_if_open(default_block);
        self.func().set_insert_point(default_block);
        self.emit_stmt(body)
    }

    fn emit_return(&mut self, value: Option<&AstNode>) -> DiagResult<()> {
        let ret_cty = self
            .ret_cty
            .clone()
            .ok_or_else(|| Diag::internal("return outside a function"))?;
        match value {
            // `return expr;` in a void function evaluates the expression
            // for effect and returns nothing.
            Some(value) if !ret_cty.is_void() => {
                let v = self.emit_expr(value)?;
                let v = self.expect_value(v, value)?;
                let v = self.convert(v, &value.ty, &ret_cty);
                self.func().ret(v.ty, Some(v.val));
            }
            Some(value) => {
                self.emit_expr(value)?;
                self.func().ret(Type::Void, None);
            }
            None => self.func().ret(Type::Void, None),
        }
        Ok(())
    }

    /// Local variable: stack slot in the entry block, then either a single
    /// scalar store or one indexed store per flattened initializer entry.
    /// Elements the initializer does not mention stay undefined.
    fn emit_local_var(&mut self, node: &AstNode) -> DiagResult<()> {
        let NodeKind::VariableDecl { init, .. } = &node.kind else {
            return Err(Diag::internal(format!(
                "expected a variable declaration at {}",
                node.tok.loc()
            )));
        };

        let ir_ty = self.lower_type(&node.ty);
        let align = node.ty.align().max(1) as u32;
        let slot = self.func().alloca(node.name(), ir_ty.clone(), align);
        self.bind_local(node.name(), slot.clone(), ir_ty.clone());

        if init.is_empty() {
            return Ok(());
        }

        // Plain scalar initializer: store straight into the slot.
        if init.len() == 1 && init[0].path == [0] {
            let iv = &init[0];
            let v = self.emit_expr(&iv.value)?;
            let v = self.expect_value(v, &iv.value)?;
            let v = self.convert(v, &iv.value.ty, &iv.ty);
            self.func().store(v.ty, v.val, slot);
            return Ok(());
        }

        // Aggregate: indexed address per entry, convert, store.
        for iv in init {
            let indices: Vec<(Type, Value)> = iv
                .path
                .iter()
                .map(|&i| (Type::I32, Value::ConstInt(i)))
                .collect();
            let addr = self.func().gep(ir_ty.clone(), slot.clone(), indices);
            let v = self.emit_expr(&iv.value)?;
            let v = self.expect_value(v, &iv.value)?;
            let v = if iv.ty.is_scalar() {
                self.convert(v, &iv.value.ty, &iv.ty)
            } else {
                v
            };
            self.func().store(v.ty, v.val, addr);
        }
        Ok(())
    }
}
