//! Compile-time constant evaluation.
//!
//! A pure recursive folder over the `i64`/`f64` domain, used for array
//! extents and case labels. Only expression shapes that can be constant are
//! accepted; everything else is `err_constant_expr`. Integer-only operators
//! (`%`, bitwise, shifts) reject float operands outright.

use crate::ast::{AstNode, BinaryOp, NodeKind, UnaryOp};
use crate::diag::{Diag, DiagKind, DiagResult};
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
}

impl Constant {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Constant::Int(v) => Some(*v),
            Constant::Float(_) => None,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Constant::Int(v) => *v != 0,
            Constant::Float(v) => *v != 0.0,
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Constant::Int(v) => *v as f64,
            Constant::Float(v) => *v,
        }
    }
}

fn not_constant(node: &AstNode) -> Diag {
    Diag::at(DiagKind::ConstantExpr, &node.tok, "")
}

pub fn eval(node: &AstNode) -> DiagResult<Constant> {
    match &node.kind {
        NodeKind::IntLiteral(v) => Ok(Constant::Int(*v)),
        NodeKind::FloatLiteral(v) => Ok(Constant::Float(*v)),
        NodeKind::Binary { op, lhs, rhs } => eval_binary(node, *op, lhs, rhs),
        NodeKind::Unary { op, operand } => eval_unary(node, *op, operand),
        NodeKind::Ternary { cond, then, els } => {
            let cond = eval(cond)?;
            let then = eval(then)?;
            let els = eval(els)?;
            Ok(if cond.truthy() { then } else { els })
        }
        NodeKind::Cast { operand } => eval_cast(node, operand),
        NodeKind::SizeOf { operand, query } => {
            let ty = match (query, operand) {
                (Some(ty), _) => ty.clone(),
                (None, Some(operand)) => operand.ty.clone(),
                (None, None) => return Err(not_constant(node)),
            };
            Ok(Constant::Int(ty.size() as i64))
        }
        _ => Err(not_constant(node)),
    }
}

/// Both operands integer, or the operator is rejected.
fn int_pair(node: &AstNode, lhs: Constant, rhs: Constant) -> DiagResult<(i64, i64)> {
    match (lhs, rhs) {
        (Constant::Int(l), Constant::Int(r)) => Ok((l, r)),
        _ => Err(not_constant(node)),
    }
}

fn eval_binary(node: &AstNode, op: BinaryOp, lhs: &AstNode, rhs: &AstNode) -> DiagResult<Constant> {
    let l = eval(lhs)?;
    let r = eval(rhs)?;

    let arith = |int_op: fn(i64, i64) -> Option<i64>, float_op: fn(f64, f64) -> f64| match (l, r) {
        (Constant::Int(a), Constant::Int(b)) => int_op(a, b)
            .map(Constant::Int)
            .ok_or_else(|| not_constant(node)),
        _ => Ok(Constant::Float(float_op(l.as_f64(), r.as_f64()))),
    };
    let compare = |int_cmp: fn(&i64, &i64) -> bool, float_cmp: fn(&f64, &f64) -> bool| {
        let v = match (l, r) {
            (Constant::Int(a), Constant::Int(b)) => int_cmp(&a, &b),
            _ => float_cmp(&l.as_f64(), &r.as_f64()),
        };
        Ok(Constant::Int(v as i64))
    };

    match op {
        BinaryOp::Add => arith(|a, b| a.checked_add(b), |a, b| a + b),
        BinaryOp::Sub => arith(|a, b| a.checked_sub(b), |a, b| a - b),
        BinaryOp::Mul => arith(|a, b| a.checked_mul(b), |a, b| a * b),
        BinaryOp::Div => arith(|a, b| a.checked_div(b), |a, b| a / b),
        BinaryOp::Mod => {
            let (a, b) = int_pair(node, l, r)?;
            a.checked_rem(b)
                .map(Constant::Int)
                .ok_or_else(|| not_constant(node))
        }
        BinaryOp::BitwiseOr => {
            let (a, b) = int_pair(node, l, r)?;
            Ok(Constant::Int(a | b))
        }
        BinaryOp::BitwiseAnd => {
            let (a, b) = int_pair(node, l, r)?;
            Ok(Constant::Int(a & b))
        }
        BinaryOp::BitwiseXor => {
            let (a, b) = int_pair(node, l, r)?;
            Ok(Constant::Int(a ^ b))
        }
        BinaryOp::LeftShift => {
            let (a, b) = int_pair(node, l, r)?;
            Ok(Constant::Int(a.wrapping_shl(b as u32)))
        }
        BinaryOp::RightShift => {
            let (a, b) = int_pair(node, l, r)?;
            Ok(Constant::Int(a.wrapping_shr(b as u32)))
        }
        BinaryOp::Equal => compare(|a, b| a == b, |a, b| a == b),
        BinaryOp::NotEqual => compare(|a, b| a != b, |a, b| a != b),
        BinaryOp::Less => compare(|a, b| a < b, |a, b| a < b),
        BinaryOp::LessEqual => compare(|a, b| a <= b, |a, b| a <= b),
        BinaryOp::Greater => compare(|a, b| a > b, |a, b| a > b),
        BinaryOp::GreaterEqual => compare(|a, b| a >= b, |a, b| a >= b),
        BinaryOp::LogicalOr => Ok(Constant::Int((l.truthy() || r.truthy()) as i64)),
        BinaryOp::LogicalAnd => Ok(Constant::Int((l.truthy() && r.truthy()) as i64)),
        BinaryOp::Comma => Ok(r),
        _ => Err(not_constant(node)),
    }
}

fn eval_unary(node: &AstNode, op: UnaryOp, operand: &AstNode) -> DiagResult<Constant> {
    let val = eval(operand)?;
    match op {
        UnaryOp::Positive => Ok(val),
        UnaryOp::Negative => Ok(match val {
            Constant::Int(v) => Constant::Int(v.wrapping_neg()),
            Constant::Float(v) => Constant::Float(-v),
        }),
        UnaryOp::LogicalNot => Ok(Constant::Int(!val.truthy() as i64)),
        UnaryOp::BitwiseNot => match val {
            Constant::Int(v) => Ok(Constant::Int(!v)),
            Constant::Float(_) => Err(not_constant(node)),
        },
        _ => Err(not_constant(node)),
    }
}

/// Casts between arithmetic types: truncation for narrowing, sign
/// preservation for signed targets, raw bit pattern for unsigned ones.
fn eval_cast(node: &AstNode, operand: &AstNode) -> DiagResult<Constant> {
    let val = eval(operand)?;
    let target = &node.ty;
    if !target.is_arith() {
        return Err(not_constant(node));
    }

    let to_int = |wrap: fn(i64) -> i64, f_wrap: fn(f64) -> i64| match val {
        Constant::Int(v) => Constant::Int(wrap(v)),
        Constant::Float(v) => Constant::Int(f_wrap(v)),
    };

    Ok(match target {
        Type::Char => to_int(|v| v as i8 as i64, |v| v as i8 as i64),
        Type::UChar => to_int(|v| v as u8 as i64, |v| v as u8 as i64),
        Type::Short => to_int(|v| v as i16 as i64, |v| v as i16 as i64),
        Type::UShort => to_int(|v| v as u16 as i64, |v| v as u16 as i64),
        Type::Int => to_int(|v| v as i32 as i64, |v| v as i32 as i64),
        Type::UInt => to_int(|v| v as u32 as i64, |v| v as u32 as i64),
        Type::Long | Type::ULong | Type::LongLong | Type::ULongLong => {
            to_int(|v| v, |v| v as i64)
        }
        Type::Float => Constant::Float(val.as_f64() as f32 as f64),
        Type::Double | Type::LongDouble => Constant::Float(val.as_f64()),
        _ => return Err(not_constant(node)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Token;

    fn int(v: i64) -> AstNode {
        AstNode::new(NodeKind::IntLiteral(v), Type::Int, Token::default())
    }

    fn float(v: f64) -> AstNode {
        AstNode::new(NodeKind::FloatLiteral(v), Type::Double, Token::default())
    }

    fn bin(op: BinaryOp, lhs: AstNode, rhs: AstNode) -> AstNode {
        AstNode::new(
            NodeKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            Type::Int,
            Token::default(),
        )
    }

    fn un(op: UnaryOp, operand: AstNode) -> AstNode {
        AstNode::new(
            NodeKind::Unary {
                op,
                operand: Box::new(operand),
            },
            Type::Int,
            Token::default(),
        )
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(
            eval(&bin(BinaryOp::Add, int(2), int(3))).unwrap(),
            Constant::Int(5)
        );
        assert_eq!(
            eval(&bin(BinaryOp::Mul, int(4), int(-6))).unwrap(),
            Constant::Int(-24)
        );
        assert_eq!(
            eval(&bin(BinaryOp::Add, int(1), float(0.5))).unwrap(),
            Constant::Float(1.5)
        );
    }

    #[test]
    fn test_comparisons_yield_int() {
        assert_eq!(
            eval(&bin(BinaryOp::Less, int(1), int(2))).unwrap(),
            Constant::Int(1)
        );
        assert_eq!(
            eval(&bin(BinaryOp::Equal, float(1.0), float(2.0))).unwrap(),
            Constant::Int(0)
        );
    }

    #[test]
    fn test_integer_only_ops_reject_floats() {
        assert!(eval(&bin(BinaryOp::Mod, float(1.0), int(2))).is_err());
        assert!(eval(&bin(BinaryOp::BitwiseAnd, int(1), float(2.0))).is_err());
        assert!(eval(&bin(BinaryOp::LeftShift, float(1.0), int(1))).is_err());
        assert!(eval(&un(UnaryOp::BitwiseNot, float(1.0))).is_err());
    }

    #[test]
    fn test_division_by_zero_is_not_constant() {
        assert!(eval(&bin(BinaryOp::Div, int(1), int(0))).is_err());
        assert!(eval(&bin(BinaryOp::Mod, int(1), int(0))).is_err());
    }

    #[test]
    fn test_unary() {
        assert_eq!(eval(&un(UnaryOp::Negative, int(7))).unwrap(), Constant::Int(-7));
        assert_eq!(eval(&un(UnaryOp::LogicalNot, int(0))).unwrap(), Constant::Int(1));
        assert_eq!(eval(&un(UnaryOp::BitwiseNot, int(0))).unwrap(), Constant::Int(-1));
    }

    #[test]
    fn test_ternary_and_logical() {
        let t = AstNode::new(
            NodeKind::Ternary {
                cond: Box::new(int(0)),
                then: Box::new(int(1)),
                els: Box::new(int(2)),
            },
            Type::Int,
            Token::default(),
        );
        assert_eq!(eval(&t).unwrap(), Constant::Int(2));
        assert_eq!(
            eval(&bin(BinaryOp::LogicalOr, int(0), int(3))).unwrap(),
            Constant::Int(1)
        );
    }

    #[test]
    fn test_cast_truncates_and_wraps() {
        let mut cast = AstNode::new(
            NodeKind::Cast {
                operand: Box::new(int(300)),
            },
            Type::Char,
            Token::default(),
        );
        assert_eq!(eval(&cast).unwrap(), Constant::Int(44));

        cast.ty = Type::UChar;
        assert_eq!(eval(&cast).unwrap(), Constant::Int(44));

        let neg = AstNode::new(
            NodeKind::Cast {
                operand: Box::new(int(-1)),
            },
            Type::UInt,
            Token::default(),
        );
        assert_eq!(eval(&neg).unwrap(), Constant::Int(4294967295));
    }

    #[test]
    fn test_cast_float_to_int() {
        let cast = AstNode::new(
            NodeKind::Cast {
                operand: Box::new(float(3.9)),
            },
            Type::Int,
            Token::default(),
        );
        assert_eq!(eval(&cast).unwrap(), Constant::Int(3));
    }

    #[test]
    fn test_sizeof_in_bytes() {
        let s = AstNode::new(
            NodeKind::SizeOf {
                operand: None,
                query: Some(Type::array_of(Type::Int, 3)),
            },
            Type::Int,
            Token::default(),
        );
        assert_eq!(eval(&s).unwrap(), Constant::Int(12));
    }

    #[test]
    fn test_non_constant_rejected() {
        let var = AstNode::new(NodeKind::VariableAccess, Type::Int, Token::default());
        let err = eval(&var).unwrap_err();
        assert_eq!(err.kind, DiagKind::ConstantExpr);
    }
}
