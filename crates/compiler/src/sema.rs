//! Semantic analysis, threaded inline through the parser.
//!
//! One builder per AST node kind: validate operand types, commit the result
//! type and lvalue-ness, and hand back the finished node. There is no
//! separate checking pass — a node that exists has already been judged.
//!
//! The mode stack mirrors the lexer's checkpoint stack. While the parser
//! speculates (declarator peeks, function-vs-variable disambiguation), Sema
//! runs in skip mode: name-resolution and redefinition diagnostics are
//! silenced and nothing is written to the symbol table, so a rewound parse
//! leaves no trace.

use crate::ast::{AstNode, BinaryOp, InitValue, NodeKind, UnaryOp};
use crate::diag::{Diag, DiagKind, DiagResult};
use crate::lexer::Token;
use crate::scope::{Scope, SymbolKind};
use crate::types::{Member, RecordType, TagKind, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Skip,
}

pub struct Sema {
    scope: Scope,
    modes: Vec<Mode>,
    anon_counter: u32,
}

impl Sema {
    pub fn new() -> Self {
        Sema {
            scope: Scope::new(),
            modes: Vec::new(),
            anon_counter: 0,
        }
    }

    pub fn enter_scope(&mut self) {
        self.scope.enter();
    }

    pub fn exit_scope(&mut self) {
        self.scope.exit();
    }

    pub fn push_mode(&mut self, mode: Mode) {
        self.modes.push(mode);
    }

    pub fn pop_mode(&mut self) {
        self.modes.pop().expect("unbalanced sema mode pop");
    }

    fn normal(&self) -> bool {
        self.modes.last().copied().unwrap_or(Mode::Normal) == Mode::Normal
    }

    /// Placeholder node used on silenced lookup failures so speculative
    /// parsing can keep going with *some* type.
    fn placeholder(tok: &Token) -> AstNode {
        AstNode::new(NodeKind::VariableAccess, Type::Int, tok.clone())
    }

    // ---- declarations ---------------------------------------------------

    pub fn variable_decl(&mut self, tok: &Token, ty: Type, is_global: bool) -> DiagResult<AstNode> {
        let name = &tok.text;
        if self.normal() {
            if self.scope.find_name_current(name).is_some() {
                return Err(Diag::at(DiagKind::Redefined, tok, format!("'{}'", name)));
            }
            self.scope.add_ordinary(ty.clone(), name);
        }
        let node = AstNode::new(
            NodeKind::VariableDecl {
                init: Vec::new(),
                is_global,
            },
            ty,
            tok.clone(),
        );
        Ok(node.lvalue())
    }

    pub fn func_decl(
        &mut self,
        tok: &Token,
        ty: Type,
        body: Option<AstNode>,
    ) -> DiagResult<AstNode> {
        let func = ty
            .as_func()
            .ok_or_else(|| Diag::at(DiagKind::ExpectedType, tok, "function type"))?;
        func.has_body.set(body.is_some());

        let name = &tok.text;
        let existing = self.scope.find_name_current(name);
        if let Some(sym) = &existing {
            if self.normal() {
                match sym.ty.as_func() {
                    None => {
                        return Err(Diag::at(DiagKind::Redefined, tok, format!("'{}'", name)));
                    }
                    Some(prev) => {
                        if prev.has_body.get() && body.is_some() {
                            return Err(Diag::at(DiagKind::Redefined, tok, format!("'{}'", name)));
                        }
                    }
                }
            }
        }
        // A definition replaces a prior body-less declaration.
        if (existing.is_none() || body.is_some()) && self.normal() {
            self.scope.add_ordinary(ty.clone(), name);
        }

        Ok(AstNode::new(
            NodeKind::FuncDecl {
                body: body.map(Box::new),
            },
            ty,
            tok.clone(),
        ))
    }

    pub fn typedef_decl(&mut self, ty: Type, tok: &Token) -> DiagResult<()> {
        let name = &tok.text;
        if self.normal() {
            if self.scope.find_name_current(name).is_some() {
                return Err(Diag::at(DiagKind::Redefined, tok, format!("'{}'", name)));
            }
            self.scope.add_typedef(ty, name);
        }
        Ok(())
    }

    /// Is this identifier a typedef alias in scope? Undefined identifiers
    /// are an error outside skip mode; non-typedef symbols answer `None`.
    pub fn typedef_access(&self, tok: &Token) -> DiagResult<Option<Type>> {
        match self.scope.find_name(&tok.text) {
            Some(sym) if sym.kind == SymbolKind::Typedef => Ok(Some(sym.ty)),
            Some(_) => Ok(None),
            None if self.normal() => {
                Err(Diag::at(DiagKind::Undefined, tok, format!("'{}'", tok.text)))
            }
            None => Ok(None),
        }
    }

    // ---- tags -----------------------------------------------------------

    pub fn tag_access(&self, tok: &Token) -> Option<Type> {
        self.scope.find_tag(&tok.text).map(|sym| sym.ty)
    }

    /// Reference without a body: `struct S;` or `struct S x;`. Resolves an
    /// existing tag or forward-declares an incomplete one.
    pub fn tag_ref(&mut self, tok: &Token, tag: TagKind) -> Type {
        if let Some(sym) = self.scope.find_tag(&tok.text) {
            return sym.ty;
        }
        let ty = Type::record(RecordType::incomplete(&tok.text, tag));
        if self.normal() {
            self.scope.add_tag(ty.clone(), &tok.text);
        }
        ty
    }

    /// Definition with a body. Completes an incomplete tag in the current
    /// environment exactly once; a second body is a redefinition.
    pub fn tag_decl(
        &mut self,
        tok: &Token,
        tag: TagKind,
        members: Vec<(Type, String)>,
    ) -> DiagResult<Type> {
        // Speculative parses build a detached record: no table writes, and
        // no mutation of a shared definition the real parse will complete.
        if !self.normal() {
            let mut rec = RecordType::incomplete(&tok.text, tag);
            rec.set_members(members);
            return Ok(Type::record(rec));
        }
        if let Some(sym) = self.scope.find_tag_current(&tok.text) {
            if let Some(rec) = sym.ty.as_record() {
                if rec.borrow().complete {
                    return Err(Diag::at(
                        DiagKind::Redefined,
                        tok,
                        format!("'{} {}'", tag, tok.text),
                    ));
                }
                rec.borrow_mut().set_members(members);
                return Ok(sym.ty);
            }
        }
        let mut rec = RecordType::incomplete(&tok.text, tag);
        rec.set_members(members);
        let ty = Type::record(rec);
        self.scope.add_tag(ty.clone(), &tok.text);
        Ok(ty)
    }

    /// Anonymous record definition with a synthesized unique name.
    pub fn anony_tag_decl(&mut self, tag: TagKind, members: Vec<(Type, String)>) -> Type {
        let name = self.anony_record_name(tag);
        let mut rec = RecordType::incomplete(&name, tag);
        rec.set_members(members);
        let ty = Type::record(rec);
        if self.normal() {
            self.scope.add_tag(ty.clone(), &name);
        }
        ty
    }

    /// Counter advances only on real parses so speculation does not skew
    /// the per-translation-unit numbering.
    fn anony_record_name(&mut self, tag: TagKind) -> String {
        let n = self.anon_counter;
        if self.normal() {
            self.anon_counter += 1;
        }
        match tag {
            TagKind::Struct => format!("__anony_struct_{}_", n),
            TagKind::Union => format!("__anony_union_{}_", n),
        }
    }

    // ---- primaries ------------------------------------------------------

    pub fn variable_access(&mut self, tok: &Token) -> DiagResult<AstNode> {
        match self.scope.find_name(&tok.text) {
            Some(sym) => {
                Ok(AstNode::new(NodeKind::VariableAccess, sym.ty, tok.clone()).lvalue())
            }
            None if self.normal() => {
                Err(Diag::at(DiagKind::Undefined, tok, format!("'{}'", tok.text)))
            }
            None => Ok(Self::placeholder(tok)),
        }
    }

    /// Numeric literal; the lexer already committed the type.
    pub fn number_expr(&self, tok: &Token, ty: Type) -> AstNode {
        let kind = if ty.is_integer() {
            NodeKind::IntLiteral(tok.ival)
        } else {
            NodeKind::FloatLiteral(tok.fval)
        };
        AstNode::new(kind, ty, tok.clone())
    }

    /// Synthesized integer literal (string-initializer expansion).
    pub fn number_from(&self, tok: &Token, value: i64, ty: Type) -> AstNode {
        AstNode::new(NodeKind::IntLiteral(value), ty, tok.clone())
    }

    pub fn string_expr(&self, tok: &Token, ty: Type) -> AstNode {
        AstNode::new(NodeKind::StringLiteral(tok.bytes.clone()), ty, tok.clone())
    }

    // ---- operators ------------------------------------------------------

    pub fn binary_expr(
        &mut self,
        lhs: AstNode,
        rhs: AstNode,
        op: BinaryOp,
        tok: &Token,
    ) -> DiagResult<AstNode> {
        let err = || Diag::at(DiagKind::BinaryExprType, tok, "");
        let lt = lhs.ty.clone();
        let rt = rhs.ty.clone();

        let mut lhs = lhs;
        let mut rhs = rhs;
        let ty;

        match op {
            BinaryOp::Add => {
                if !lt.is_arith() && !lt.is_pointer() {
                    return Err(err());
                }
                if !rt.is_arith() && !rt.is_pointer() {
                    return Err(err());
                }
                if lt.is_pointer() && rt.is_pointer() {
                    return Err(err());
                }
                if lt.is_pointer() {
                    if !rt.is_integer() {
                        return Err(err());
                    }
                    ty = lt;
                } else if rt.is_pointer() {
                    if !lt.is_integer() {
                        return Err(err());
                    }
                    // Canonicalize: the pointer operand goes left.
                    std::mem::swap(&mut lhs, &mut rhs);
                    ty = rt;
                } else {
                    ty = Type::usual_arith(&lt, &rt);
                }
            }
            BinaryOp::Sub => {
                if !lt.is_arith() && !lt.is_pointer() {
                    return Err(err());
                }
                if !rt.is_arith() && !rt.is_pointer() {
                    return Err(err());
                }
                if lt.is_pointer() && rt.is_pointer() {
                    ty = Type::Long;
                } else if lt.is_pointer() {
                    if !rt.is_integer() {
                        return Err(err());
                    }
                    ty = lt;
                } else if rt.is_pointer() {
                    return Err(err());
                } else {
                    ty = Type::usual_arith(&lt, &rt);
                }
            }
            BinaryOp::Mul | BinaryOp::Div => {
                if !lt.is_arith() || !rt.is_arith() {
                    return Err(err());
                }
                ty = Type::usual_arith(&lt, &rt);
            }
            BinaryOp::Mod
            | BinaryOp::BitwiseOr
            | BinaryOp::BitwiseAnd
            | BinaryOp::BitwiseXor
            | BinaryOp::LeftShift
            | BinaryOp::RightShift => {
                if !lt.is_integer() || !rt.is_integer() {
                    return Err(err());
                }
                ty = Type::usual_arith(&lt, &rt);
            }
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::Less
            | BinaryOp::LessEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual
            | BinaryOp::LogicalOr
            | BinaryOp::LogicalAnd => {
                if !lt.is_scalar() || !rt.is_scalar() {
                    return Err(err());
                }
                ty = Type::Int;
            }
            BinaryOp::Comma => {
                ty = rt;
            }
            BinaryOp::Assign => {
                if !lhs.is_lvalue && self.normal() {
                    return Err(Diag::at(DiagKind::ExpectedLValue, tok, ""));
                }
                ty = lt;
            }
            BinaryOp::AddAssign | BinaryOp::SubAssign => {
                if !lhs.is_lvalue && self.normal() {
                    return Err(Diag::at(DiagKind::ExpectedLValue, tok, ""));
                }
                if !lt.is_arith() && !lt.is_pointer() {
                    return Err(err());
                }
                if !rt.is_arith() {
                    return Err(err());
                }
                if lt.is_pointer() && !rt.is_integer() {
                    return Err(err());
                }
                ty = lt;
            }
            BinaryOp::MulAssign | BinaryOp::DivAssign => {
                if !lhs.is_lvalue && self.normal() {
                    return Err(Diag::at(DiagKind::ExpectedLValue, tok, ""));
                }
                if !lt.is_arith() || !rt.is_arith() {
                    return Err(err());
                }
                ty = lt;
            }
            BinaryOp::ModAssign
            | BinaryOp::BitwiseOrAssign
            | BinaryOp::BitwiseAndAssign
            | BinaryOp::BitwiseXorAssign
            | BinaryOp::LeftShiftAssign
            | BinaryOp::RightShiftAssign => {
                if !lhs.is_lvalue && self.normal() {
                    return Err(Diag::at(DiagKind::ExpectedLValue, tok, ""));
                }
                if !lt.is_integer() || !rt.is_integer() {
                    return Err(err());
                }
                ty = lt;
            }
        }

        Ok(AstNode::new(
            NodeKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
            tok.clone(),
        ))
    }

    pub fn unary_expr(&mut self, operand: AstNode, op: UnaryOp, tok: &Token) -> DiagResult<AstNode> {
        let ot = operand.ty.clone();
        let mut is_lvalue = false;
        let ty = match op {
            UnaryOp::Positive | UnaryOp::Negative => {
                if !ot.is_arith() && self.normal() {
                    return Err(Diag::at(DiagKind::ExpectedType, tok, "arithmetic type"));
                }
                ot
            }
            UnaryOp::LogicalNot => {
                if !ot.is_scalar() && self.normal() {
                    return Err(Diag::at(DiagKind::ExpectedType, tok, "scalar type"));
                }
                Type::Int
            }
            UnaryOp::BitwiseNot => {
                if !ot.is_integer() && self.normal() {
                    return Err(Diag::at(DiagKind::ExpectedType, tok, "integer type"));
                }
                ot
            }
            UnaryOp::Addr => {
                if !operand.is_lvalue && self.normal() {
                    return Err(Diag::at(DiagKind::ExpectedLValue, tok, ""));
                }
                Type::pointer_to(ot)
            }
            UnaryOp::Deref => match ot.pointee() {
                Some(base) => {
                    is_lvalue = true;
                    base
                }
                None => {
                    if self.normal() {
                        return Err(Diag::at(DiagKind::ExpectedType, tok, "pointer type"));
                    }
                    Type::Int
                }
            },
            UnaryOp::Inc | UnaryOp::Dec => {
                if !operand.is_lvalue && self.normal() {
                    return Err(Diag::at(DiagKind::ExpectedLValue, tok, ""));
                }
                if !ot.is_arith() && !ot.is_pointer() && self.normal() {
                    return Err(Diag::at(DiagKind::ExpectedType, tok, "arithmetic or pointer"));
                }
                ot
            }
        };

        let node = AstNode::new(
            NodeKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
            tok.clone(),
        );
        Ok(if is_lvalue { node.lvalue() } else { node })
    }

    pub fn cast_expr(&self, target: Type, operand: AstNode, tok: &Token) -> AstNode {
        AstNode::new(
            NodeKind::Cast {
                operand: Box::new(operand),
            },
            target,
            tok.clone(),
        )
    }

    pub fn ternary_expr(
        &mut self,
        cond: AstNode,
        then: AstNode,
        els: AstNode,
        tok: &Token,
    ) -> DiagResult<AstNode> {
        if !cond.ty.is_scalar() && self.normal() {
            return Err(Diag::at(DiagKind::ExpectedType, tok, "scalar type"));
        }
        if then.ty != els.ty && self.normal() {
            return Err(Diag::at(DiagKind::ExpectedType, tok, "matching branch types"));
        }
        let ty = then.ty.clone();
        Ok(AstNode::new(
            NodeKind::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                els: Box::new(els),
            },
            ty,
            tok.clone(),
        ))
    }

    pub fn sizeof_expr(
        &self,
        operand: Option<AstNode>,
        query: Option<Type>,
        tok: &Token,
    ) -> AstNode {
        AstNode::new(
            NodeKind::SizeOf {
                operand: operand.map(Box::new),
                query,
            },
            Type::Int,
            tok.clone(),
        )
    }

    pub fn post_inc(&mut self, operand: AstNode, tok: &Token) -> DiagResult<AstNode> {
        if !operand.is_lvalue && self.normal() {
            return Err(Diag::at(DiagKind::ExpectedLValue, tok, ""));
        }
        let ty = operand.ty.clone();
        Ok(AstNode::new(
            NodeKind::PostInc {
                operand: Box::new(operand),
            },
            ty,
            tok.clone(),
        ))
    }

    pub fn post_dec(&mut self, operand: AstNode, tok: &Token) -> DiagResult<AstNode> {
        if !operand.is_lvalue && self.normal() {
            return Err(Diag::at(DiagKind::ExpectedLValue, tok, ""));
        }
        let ty = operand.ty.clone();
        Ok(AstNode::new(
            NodeKind::PostDec {
                operand: Box::new(operand),
            },
            ty,
            tok.clone(),
        ))
    }

    pub fn subscript(&mut self, base: AstNode, index: AstNode, tok: &Token) -> DiagResult<AstNode> {
        let ty = match (&base.ty).array_elem().or_else(|| base.ty.pointee()) {
            Some(elem) => elem,
            None => {
                if self.normal() {
                    return Err(Diag::at(DiagKind::ExpectedType, tok, "array or pointer"));
                }
                Type::Int
            }
        };
        Ok(AstNode::new(
            NodeKind::Subscript {
                base: Box::new(base),
                index: Box::new(index),
            },
            ty,
            tok.clone(),
        )
        .lvalue())
    }

    fn find_member(&self, ty: &Type, iden: &Token) -> DiagResult<Member> {
        let rec = ty
            .as_record()
            .ok_or_else(|| Diag::at(DiagKind::ExpectedType, iden, "struct or union type"))?;
        let found = rec.borrow().find_member(&iden.text);
        found.ok_or_else(|| {
            Diag::at(
                DiagKind::Miss,
                iden,
                format!("no member named '{}'", iden.text),
            )
        })
    }

    pub fn member_dot(&mut self, base: AstNode, iden: &Token, dot: &Token) -> DiagResult<AstNode> {
        if !base.ty.is_record() && !self.normal() {
            return Ok(Self::placeholder(dot));
        }
        let member = self.find_member(&base.ty, iden)?;
        let ty = member.ty.clone();
        Ok(AstNode::new(
            NodeKind::MemberDot {
                base: Box::new(base),
                member,
            },
            ty,
            dot.clone(),
        )
        .lvalue())
    }

    pub fn member_arrow(
        &mut self,
        base: AstNode,
        iden: &Token,
        arrow: &Token,
    ) -> DiagResult<AstNode> {
        let pointee = match base.ty.pointee() {
            Some(p) => p,
            None => {
                if self.normal() {
                    return Err(Diag::at(DiagKind::ExpectedType, arrow, "pointer type"));
                }
                return Ok(Self::placeholder(arrow));
            }
        };
        if !pointee.is_record() {
            if self.normal() {
                return Err(Diag::at(
                    DiagKind::ExpectedType,
                    arrow,
                    "pointer to struct or union type",
                ));
            }
            return Ok(Self::placeholder(arrow));
        }
        let member = self.find_member(&pointee, iden)?;
        let ty = member.ty.clone();
        Ok(AstNode::new(
            NodeKind::MemberArrow {
                base: Box::new(base),
                member,
            },
            ty,
            arrow.clone(),
        )
        .lvalue())
    }

    pub fn func_call(&mut self, callee: AstNode, args: Vec<AstNode>) -> DiagResult<AstNode> {
        let tok = callee.tok.clone();
        let func = match callee.ty.callable() {
            Some(f) => f,
            None => {
                if self.normal() {
                    return Err(Diag::at(DiagKind::ExpectedType, &tok, "function type"));
                }
                return Ok(Self::placeholder(&tok));
            }
        };
        if func.params.len() != args.len() && !func.variadic && self.normal() {
            return Err(Diag::at(
                DiagKind::Miss,
                &tok,
                format!(
                    "'{}' expects {} argument(s), got {}",
                    func.name,
                    func.params.len(),
                    args.len()
                ),
            ));
        }
        if func.variadic && args.len() < func.params.len() && self.normal() {
            return Err(Diag::at(
                DiagKind::Miss,
                &tok,
                format!(
                    "'{}' expects at least {} argument(s), got {}",
                    func.name,
                    func.params.len(),
                    args.len()
                ),
            ));
        }
        let ty = func.ret.clone();
        Ok(AstNode::new(
            NodeKind::Call {
                callee: Box::new(callee),
                args,
            },
            ty,
            tok,
        ))
    }

    // ---- statements and initializers -----------------------------------

    pub fn decl_init_value(&self, ty: Type, value: AstNode, path: &[i64]) -> InitValue {
        InitValue {
            ty,
            value,
            path: path.to_vec(),
        }
    }

    pub fn if_stmt(
        &self,
        cond: AstNode,
        then: Option<AstNode>,
        els: Option<AstNode>,
        tok: &Token,
    ) -> AstNode {
        AstNode::new(
            NodeKind::If {
                cond: Box::new(cond),
                then: then.map(Box::new),
                els: els.map(Box::new),
            },
            Type::Void,
            tok.clone(),
        )
    }
}

impl Default for Sema {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::TokenKind;

    fn ident(name: &str) -> Token {
        let mut tok = Token::default();
        tok.kind = TokenKind::Identifier;
        tok.text = name.to_string();
        tok
    }

    fn num(sema: &Sema, v: i64) -> AstNode {
        let mut tok = Token::default();
        tok.kind = TokenKind::Number;
        tok.ival = v;
        sema.number_expr(&tok, Type::Int)
    }

    #[test]
    fn test_redefinition_detected() {
        let mut sema = Sema::new();
        sema.variable_decl(&ident("a"), Type::Int, false).unwrap();
        let err = sema
            .variable_decl(&ident("a"), Type::Int, false)
            .unwrap_err();
        assert_eq!(err.kind, DiagKind::Redefined);
    }

    #[test]
    fn test_skip_mode_suppresses_lookup_errors() {
        let mut sema = Sema::new();
        sema.push_mode(Mode::Skip);
        // Undefined access and double declaration both pass silently.
        assert!(sema.variable_access(&ident("nope")).is_ok());
        sema.variable_decl(&ident("a"), Type::Int, false).unwrap();
        assert!(sema.variable_decl(&ident("a"), Type::Int, false).is_ok());
        sema.pop_mode();
        // And nothing leaked into the symbol table.
        assert!(sema.variable_access(&ident("a")).is_err());
    }

    #[test]
    fn test_undefined_access() {
        let mut sema = Sema::new();
        let err = sema.variable_access(&ident("ghost")).unwrap_err();
        assert_eq!(err.kind, DiagKind::Undefined);
    }

    #[test]
    fn test_pointer_operand_swap() {
        let mut sema = Sema::new();
        sema.variable_decl(&ident("p"), Type::pointer_to(Type::Int), false)
            .unwrap();
        let ptr = sema.variable_access(&ident("p")).unwrap();
        let idx = num(&sema, 2);
        // int + ptr: the pointer ends up on the left.
        let node = sema
            .binary_expr(idx, ptr, BinaryOp::Add, &ident("+"))
            .unwrap();
        assert_eq!(node.ty, Type::pointer_to(Type::Int));
        match &node.kind {
            NodeKind::Binary { lhs, .. } => assert!(lhs.ty.is_pointer()),
            other => panic!("expected binary node, got {:?}", other),
        }
    }

    #[test]
    fn test_ptr_minus_ptr_is_long() {
        let mut sema = Sema::new();
        sema.variable_decl(&ident("p"), Type::pointer_to(Type::Int), false)
            .unwrap();
        let a = sema.variable_access(&ident("p")).unwrap();
        let b = sema.variable_access(&ident("p")).unwrap();
        let node = sema.binary_expr(a, b, BinaryOp::Sub, &ident("-")).unwrap();
        assert_eq!(node.ty, Type::Long);
    }

    #[test]
    fn test_usual_conversion_committed() {
        let mut sema = Sema::new();
        sema.variable_decl(&ident("c"), Type::Char, false).unwrap();
        sema.variable_decl(&ident("l"), Type::Long, false).unwrap();
        let c = sema.variable_access(&ident("c")).unwrap();
        let l = sema.variable_access(&ident("l")).unwrap();
        let node = sema.binary_expr(c, l, BinaryOp::Add, &ident("+")).unwrap();
        assert_eq!(node.ty, Type::Long);
    }

    #[test]
    fn test_assign_requires_lvalue() {
        let mut sema = Sema::new();
        let lhs = num(&sema, 1);
        let rhs = num(&sema, 2);
        let err = sema
            .binary_expr(lhs, rhs, BinaryOp::Assign, &ident("="))
            .unwrap_err();
        assert_eq!(err.kind, DiagKind::ExpectedLValue);
    }

    #[test]
    fn test_mod_requires_integers() {
        let mut sema = Sema::new();
        let mut tok = Token::default();
        tok.kind = TokenKind::Number;
        tok.fval = 1.5;
        let f = sema.number_expr(&tok, Type::Double);
        let i = num(&sema, 2);
        let err = sema
            .binary_expr(f, i, BinaryOp::Mod, &ident("%"))
            .unwrap_err();
        assert_eq!(err.kind, DiagKind::BinaryExprType);
    }

    #[test]
    fn test_deref_requires_pointer() {
        let mut sema = Sema::new();
        let i = num(&sema, 1);
        let err = sema
            .unary_expr(i, UnaryOp::Deref, &ident("*"))
            .unwrap_err();
        assert_eq!(err.kind, DiagKind::ExpectedType);
    }

    #[test]
    fn test_deref_yields_lvalue() {
        let mut sema = Sema::new();
        sema.variable_decl(&ident("p"), Type::pointer_to(Type::Char), false)
            .unwrap();
        let p = sema.variable_access(&ident("p")).unwrap();
        let node = sema.unary_expr(p, UnaryOp::Deref, &ident("*")).unwrap();
        assert!(node.is_lvalue);
        assert_eq!(node.ty, Type::Char);
    }

    #[test]
    fn test_member_lookup() {
        let mut sema = Sema::new();
        let ty = sema
            .tag_decl(
                &ident("S"),
                TagKind::Struct,
                vec![(Type::Int, "x".into()), (Type::Int, "y".into())],
            )
            .unwrap();
        sema.variable_decl(&ident("s"), ty, false).unwrap();
        let s = sema.variable_access(&ident("s")).unwrap();
        let node = sema.member_dot(s, &ident("y"), &ident(".")).unwrap();
        assert_eq!(node.ty, Type::Int);
        assert!(node.is_lvalue);

        let s2 = sema.variable_access(&ident("s")).unwrap();
        let err = sema.member_dot(s2, &ident("z"), &ident(".")).unwrap_err();
        assert_eq!(err.kind, DiagKind::Miss);
    }

    #[test]
    fn test_tag_completion_once() {
        let mut sema = Sema::new();
        // struct S; — forward declaration
        let fwd = sema.tag_ref(&ident("S"), TagKind::Struct);
        assert!(!fwd.as_record().unwrap().borrow().complete);
        // struct S { int x; }; — completion
        let ty = sema
            .tag_decl(&ident("S"), TagKind::Struct, vec![(Type::Int, "x".into())])
            .unwrap();
        assert!(ty.as_record().unwrap().borrow().complete);
        assert_eq!(fwd, ty);
        // A second body is rejected.
        let err = sema
            .tag_decl(&ident("S"), TagKind::Struct, vec![(Type::Int, "y".into())])
            .unwrap_err();
        assert_eq!(err.kind, DiagKind::Redefined);
    }

    #[test]
    fn test_anonymous_record_names() {
        let mut sema = Sema::new();
        let a = sema.anony_tag_decl(TagKind::Struct, vec![(Type::Int, "x".into())]);
        let b = sema.anony_tag_decl(TagKind::Union, vec![(Type::Int, "x".into())]);
        assert_eq!(a.as_record().unwrap().borrow().name, "__anony_struct_0_");
        assert_eq!(b.as_record().unwrap().borrow().name, "__anony_union_1_");
    }

    #[test]
    fn test_function_redeclaration() {
        let mut sema = Sema::new();
        let fty = Type::func(Type::Int, vec![], "f", false);
        // Two declarations without bodies are fine.
        sema.func_decl(&ident("f"), fty.clone(), None).unwrap();
        sema.func_decl(&ident("f"), fty.clone(), None).unwrap();
        // One definition is fine.
        let body = AstNode::new(NodeKind::Block { items: vec![] }, Type::Void, Token::default());
        sema.func_decl(&ident("f"), fty.clone(), Some(body.clone()))
            .unwrap();
        // A second definition is a redefinition.
        let fty2 = Type::func(Type::Int, vec![], "f", false);
        let err = sema.func_decl(&ident("f"), fty2, Some(body)).unwrap_err();
        assert_eq!(err.kind, DiagKind::Redefined);
    }

    #[test]
    fn test_call_arity() {
        let mut sema = Sema::new();
        let fty = Type::func(
            Type::Int,
            vec![crate::types::Param {
                ty: Type::Int,
                name: "n".into(),
            }],
            "f",
            false,
        );
        sema.func_decl(&ident("f"), fty, None).unwrap();
        let callee = sema.variable_access(&ident("f")).unwrap();
        let err = sema.func_call(callee, vec![]).unwrap_err();
        assert_eq!(err.kind, DiagKind::Miss);

        let callee = sema.variable_access(&ident("f")).unwrap();
        let arg = num(&sema, 1);
        let node = sema.func_call(callee, vec![arg]).unwrap();
        assert_eq!(node.ty, Type::Int);
    }

    #[test]
    fn test_ternary_condition_must_be_scalar() {
        let mut sema = Sema::new();
        let ty = sema
            .tag_decl(&ident("S"), TagKind::Struct, vec![(Type::Int, "x".into())])
            .unwrap();
        sema.variable_decl(&ident("s"), ty, false).unwrap();
        let cond = sema.variable_access(&ident("s")).unwrap();
        let then = num(&sema, 1);
        let els = num(&sema, 2);
        let err = sema
            .ternary_expr(cond, then, els, &ident("?"))
            .unwrap_err();
        assert_eq!(err.kind, DiagKind::ExpectedType);

        // Pointer conditions are scalar and pass.
        sema.variable_decl(&ident("p"), Type::pointer_to(Type::Int), false)
            .unwrap();
        let cond = sema.variable_access(&ident("p")).unwrap();
        let then = num(&sema, 1);
        let els = num(&sema, 2);
        assert!(sema.ternary_expr(cond, then, els, &ident("?")).is_ok());
    }

    #[test]
    fn test_typedef_roundtrip() {
        let mut sema = Sema::new();
        sema.typedef_decl(Type::Long, &ident("myint")).unwrap();
        let found = sema.typedef_access(&ident("myint")).unwrap();
        assert_eq!(found, Some(Type::Long));
        // Ordinary symbols are not typedefs.
        sema.variable_decl(&ident("v"), Type::Int, false).unwrap();
        assert_eq!(sema.typedef_access(&ident("v")).unwrap(), None);
    }
}
