//! The instruction set.
//!
//! One variant per opcode the front-end emits. Branch targets and phi
//! predecessors are stored as resolved block labels so an instruction prints
//! without consulting the enclosing function.

use crate::types::Type;
use crate::value::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    And,
    Or,
    Xor,
    Shl,
    AShr,
    LShr,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl BinOp {
    fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add nsw",
            BinOp::Sub => "sub nsw",
            BinOp::Mul => "mul nsw",
            BinOp::SDiv => "sdiv",
            BinOp::UDiv => "udiv",
            BinOp::SRem => "srem",
            BinOp::URem => "urem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::AShr => "ashr",
            BinOp::LShr => "lshr",
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
        }
    }
}

/// Integer comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl IPred {
    fn mnemonic(self) -> &'static str {
        match self {
            IPred::Eq => "eq",
            IPred::Ne => "ne",
            IPred::Slt => "slt",
            IPred::Sle => "sle",
            IPred::Sgt => "sgt",
            IPred::Sge => "sge",
            IPred::Ult => "ult",
            IPred::Ule => "ule",
            IPred::Ugt => "ugt",
            IPred::Uge => "uge",
        }
    }
}

/// Float comparison predicates (ordered forms, plus `une` for truthiness).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FPred {
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
    Une,
}

impl FPred {
    fn mnemonic(self) -> &'static str {
        match self {
            FPred::Oeq => "oeq",
            FPred::One => "one",
            FPred::Olt => "olt",
            FPred::Ole => "ole",
            FPred::Ogt => "ogt",
            FPred::Oge => "oge",
            FPred::Une => "une",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    PtrToInt,
    IntToPtr,
    Bitcast,
    SiToFp,
    UiToFp,
    FpToSi,
    FpToUi,
    FpTrunc,
    FpExt,
}

impl CastOp {
    fn mnemonic(self) -> &'static str {
        match self {
            CastOp::Trunc => "trunc",
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::PtrToInt => "ptrtoint",
            CastOp::IntToPtr => "inttoptr",
            CastOp::Bitcast => "bitcast",
            CastOp::SiToFp => "sitofp",
            CastOp::UiToFp => "uitofp",
            CastOp::FpToSi => "fptosi",
            CastOp::FpToUi => "fptoui",
            CastOp::FpTrunc => "fptrunc",
            CastOp::FpExt => "fpext",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    /// Stack slot in the entry block
    Alloca { ty: Type, align: u32 },
    Binary { op: BinOp, ty: Type, lhs: Value, rhs: Value },
    /// Integer negation, printed as `sub <ty> 0, x`
    Neg { ty: Type, operand: Value },
    FNeg { ty: Type, operand: Value },
    ICmp { pred: IPred, ty: Type, lhs: Value, rhs: Value },
    FCmp { pred: FPred, ty: Type, lhs: Value, rhs: Value },
    Load { ty: Type, addr: Value },
    Store { ty: Type, value: Value, addr: Value },
    /// Indexed address computation over `base_ty`
    Gep { base_ty: Type, addr: Value, indices: Vec<(Type, Value)> },
    Cast { op: CastOp, from: Type, value: Value, to: Type },
    Call {
        ret: Type,
        callee: Value,
        args: Vec<(Type, Value)>,
        /// Declared parameter types; printed in the callee type when variadic
        param_tys: Vec<Type>,
        variadic: bool,
    },
    Phi { ty: Type, incomings: Vec<(Value, String)> },
    Br { dest: String },
    CondBr { cond: Value, then_dest: String, else_dest: String },
    Switch {
        ty: Type,
        value: Value,
        default: String,
        cases: Vec<(i64, String)>,
    },
    Ret { ty: Type, value: Option<Value> },
    Unreachable,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::Switch { .. }
                | InstKind::Ret { .. }
                | InstKind::Unreachable
        )
    }
}

/// A single instruction: an optional result value plus the operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub result: Option<Value>,
    pub kind: InstKind,
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(res) = &self.result {
            write!(f, "{} = ", res)?;
        }
        match &self.kind {
            InstKind::Alloca { ty, align } => write!(f, "alloca {}, align {}", ty, align),
            InstKind::Binary { op, ty, lhs, rhs } => {
                write!(f, "{} {} {}, {}", op.mnemonic(), ty, lhs, rhs)
            }
            InstKind::Neg { ty, operand } => write!(f, "sub {} 0, {}", ty, operand),
            InstKind::FNeg { ty, operand } => write!(f, "fneg {} {}", ty, operand),
            InstKind::ICmp { pred, ty, lhs, rhs } => {
                write!(f, "icmp {} {} {}, {}", pred.mnemonic(), ty, lhs, rhs)
            }
            InstKind::FCmp { pred, ty, lhs, rhs } => {
                write!(f, "fcmp {} {} {}, {}", pred.mnemonic(), ty, lhs, rhs)
            }
            InstKind::Load { ty, addr } => write!(f, "load {}, ptr {}", ty, addr),
            InstKind::Store { ty, value, addr } => {
                write!(f, "store {} {}, ptr {}", ty, value, addr)
            }
            InstKind::Gep { base_ty, addr, indices } => {
                write!(f, "getelementptr inbounds {}, ptr {}", base_ty, addr)?;
                for (ty, idx) in indices {
                    write!(f, ", {} {}", ty, idx)?;
                }
                Ok(())
            }
            InstKind::Cast { op, from, value, to } => {
                write!(f, "{} {} {} to {}", op.mnemonic(), from, value, to)
            }
            InstKind::Call { ret, callee, args, param_tys, variadic } => {
                if *variadic {
                    let params: Vec<String> = param_tys.iter().map(|t| t.to_string()).collect();
                    write!(f, "call {} ({}, ...) {}(", ret, params.join(", "), callee)?;
                } else {
                    write!(f, "call {} {}(", ret, callee)?;
                }
                for (i, (ty, val)) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", ty, val)?;
                }
                write!(f, ")")
            }
            InstKind::Phi { ty, incomings } => {
                write!(f, "phi {} ", ty)?;
                for (i, (val, label)) in incomings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[ {}, %{} ]", val, label)?;
                }
                Ok(())
            }
            InstKind::Br { dest } => write!(f, "br label %{}", dest),
            InstKind::CondBr { cond, then_dest, else_dest } => {
                write!(f, "br i1 {}, label %{}, label %{}", cond, then_dest, else_dest)
            }
            InstKind::Switch { ty, value, default, cases } => {
                write!(f, "switch {} {}, label %{} [", ty, value, default)?;
                for (val, label) in cases {
                    write!(f, " {} {}, label %{}", ty, val, label)?;
                }
                write!(f, " ]")
            }
            InstKind::Ret { ty, value } => match value {
                Some(v) => write!(f, "ret {} {}", ty, v),
                None => write!(f, "ret void"),
            },
            InstKind::Unreachable => write!(f, "unreachable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp(n: u32) -> Option<Value> {
        Some(Value::Temp(n))
    }

    #[test]
    fn test_binary_display() {
        let inst = Inst {
            result: temp(0),
            kind: InstKind::Binary {
                op: BinOp::Add,
                ty: Type::I32,
                lhs: Value::ConstInt(1),
                rhs: Value::ConstInt(2),
            },
        };
        assert_eq!(inst.to_string(), "%t0 = add nsw i32 1, 2");
    }

    #[test]
    fn test_memory_display() {
        let load = Inst {
            result: temp(1),
            kind: InstKind::Load {
                ty: Type::I32,
                addr: Value::Local("a.addr".into()),
            },
        };
        assert_eq!(load.to_string(), "%t1 = load i32, ptr %a.addr");

        let store = Inst {
            result: None,
            kind: InstKind::Store {
                ty: Type::I32,
                value: Value::Temp(1),
                addr: Value::Local("b.addr".into()),
            },
        };
        assert_eq!(store.to_string(), "store i32 %t1, ptr %b.addr");
    }

    #[test]
    fn test_gep_display() {
        let gep = Inst {
            result: temp(2),
            kind: InstKind::Gep {
                base_ty: Type::Struct("P".into()),
                addr: Value::Local("p.addr".into()),
                indices: vec![
                    (Type::I32, Value::ConstInt(0)),
                    (Type::I32, Value::ConstInt(1)),
                ],
            },
        };
        assert_eq!(
            gep.to_string(),
            "%t2 = getelementptr inbounds %struct.P, ptr %p.addr, i32 0, i32 1"
        );
    }

    #[test]
    fn test_variadic_call_display() {
        let call = Inst {
            result: temp(3),
            kind: InstKind::Call {
                ret: Type::I32,
                callee: Value::Global("printf".into()),
                args: vec![
                    (Type::Ptr, Value::Global(".str.0".into())),
                    (Type::I32, Value::Temp(1)),
                ],
                param_tys: vec![Type::Ptr],
                variadic: true,
            },
        };
        assert_eq!(
            call.to_string(),
            "%t3 = call i32 (ptr, ...) @printf(ptr @.str.0, i32 %t1)"
        );
    }

    #[test]
    fn test_terminator_display() {
        let sw = Inst {
            result: None,
            kind: InstKind::Switch {
                ty: Type::I8,
                value: Value::Temp(0),
                default: "sw.default".into(),
                cases: vec![(65, "sw.case0".into()), (66, "sw.case1".into())],
            },
        };
        assert_eq!(
            sw.to_string(),
            "switch i8 %t0, label %sw.default [ i8 65, label %sw.case0 i8 66, label %sw.case1 ]"
        );
        assert!(sw.kind.is_terminator());

        let phi = Inst {
            result: temp(4),
            kind: InstKind::Phi {
                ty: Type::I32,
                incomings: vec![
                    (Value::Temp(1), "land.rhs".into()),
                    (Value::ConstInt(0), "land.false".into()),
                ],
            },
        };
        assert_eq!(
            phi.to_string(),
            "%t4 = phi i32 [ %t1, %land.rhs ], [ 0, %land.false ]"
        );
        assert!(!phi.kind.is_terminator());
    }
}
