//! Values and compile-time constants.

use crate::types::Type;
use std::fmt;

/// An SSA value as it appears in an instruction operand position.
///
/// Temporaries are numbered per function and print as `%tN`; named locals
/// (parameters and stack slots) print as `%name`. Globals and functions print
/// as `@name`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Temp(u32),
    Local(String),
    Global(String),
    ConstInt(i64),
    ConstFloat(f64),
    Null,
}

impl Value {
    pub fn is_const(&self) -> bool {
        matches!(self, Value::ConstInt(_) | Value::ConstFloat(_) | Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Temp(n) => write!(f, "%t{}", n),
            Value::Local(name) => write!(f, "%{}", name),
            Value::Global(name) => write!(f, "@{}", name),
            Value::ConstInt(v) => write!(f, "{}", v),
            Value::ConstFloat(v) => write!(f, "{}", format_float(*v)),
            Value::Null => write!(f, "null"),
        }
    }
}

/// Render a float the way `.ll` files expect: either a clean decimal with a
/// trailing point or the raw 64-bit hex pattern.
pub(crate) fn format_float(v: f64) -> String {
    // LLVM accepts decimal floats only when they round-trip exactly.
    let dec = format!("{:e}", v);
    if dec.parse::<f64>() == Ok(v) && v.is_finite() {
        let plain = format!("{}", v);
        if plain.contains('.') || plain.contains('e') {
            plain
        } else {
            format!("{}.0", plain)
        }
    } else {
        format!("0x{:016X}", v.to_bits())
    }
}

/// A global-initializer constant, built by a recursive walk over the type
/// structure. Aggregates mirror the type tree; `Zero` stands for any
/// all-zero value of its type.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(Type, i64),
    Float(Type, f64),
    NullPtr,
    /// Address of another global, printed as `@name`
    Global(String),
    /// NUL-terminated byte string, printed as `c"..."`
    Str(Vec<u8>),
    Array(Type, Vec<Constant>),
    Struct(Type, Vec<Constant>),
    Zero(Type),
}

impl Constant {
    pub fn ty(&self) -> Type {
        match self {
            Constant::Int(ty, _) | Constant::Float(ty, _) => ty.clone(),
            Constant::NullPtr | Constant::Global(_) => Type::Ptr,
            Constant::Str(bytes) => Type::array(Type::I8, bytes.len() as u64),
            Constant::Array(ty, _) | Constant::Struct(ty, _) | Constant::Zero(ty) => ty.clone(),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(_, v) => write!(f, "{}", v),
            Constant::Float(_, v) => write!(f, "{}", format_float(*v)),
            Constant::NullPtr => write!(f, "null"),
            Constant::Global(name) => write!(f, "@{}", name),
            Constant::Str(bytes) => {
                write!(f, "c\"")?;
                for &b in bytes {
                    match b {
                        b'"' | b'\\' => write!(f, "\\{:02X}", b)?,
                        0x20..=0x7e => write!(f, "{}", b as char)?,
                        _ => write!(f, "\\{:02X}", b)?,
                    }
                }
                write!(f, "\"")
            }
            Constant::Array(_, elems) => {
                write!(f, "[")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", e.ty(), e)?;
                }
                write!(f, "]")
            }
            Constant::Struct(_, elems) => {
                write!(f, "{{ ")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", e.ty(), e)?;
                }
                write!(f, " }}")
            }
            Constant::Zero(_) => write!(f, "zeroinitializer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Temp(3).to_string(), "%t3");
        assert_eq!(Value::Local("a.addr".into()).to_string(), "%a.addr");
        assert_eq!(Value::Global("main".into()).to_string(), "@main");
        assert_eq!(Value::ConstInt(-7).to_string(), "-7");
        assert_eq!(Value::Null.to_string(), "null");
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(Value::ConstFloat(1.5).to_string(), "1.5");
        assert_eq!(Value::ConstFloat(2.0).to_string(), "2.0");
        assert_eq!(Value::ConstFloat(0.0).to_string(), "0.0");
    }

    #[test]
    fn test_string_constant_escaping() {
        let c = Constant::Str(b"hi\n\0".to_vec());
        assert_eq!(c.to_string(), "c\"hi\\0A\\00\"");
        assert_eq!(c.ty(), Type::array(Type::I8, 4));
    }

    #[test]
    fn test_aggregate_constants() {
        let arr = Constant::Array(
            Type::array(Type::I32, 2),
            vec![Constant::Int(Type::I32, 1), Constant::Int(Type::I32, 2)],
        );
        assert_eq!(arr.to_string(), "[i32 1, i32 2]");

        let st = Constant::Struct(
            Type::Struct("P".into()),
            vec![Constant::Int(Type::I32, 1), Constant::Zero(Type::I64)],
        );
        assert_eq!(st.to_string(), "{ i32 1, i64 zeroinitializer }");
    }
}
