//! The C type model.
//!
//! A closed tagged variant: scalar kinds with fixed size/alignment, pointers,
//! arrays, records, and function types. Records and arrays sit behind
//! `Rc<RefCell<...>>` because the language mutates them after creation —
//! `struct S;` completes later, and `int a[] = {...}` learns its extent from
//! the initializer — and every AST node holding the type must observe the
//! update. Function types carry `has_body` in a `Cell` for the same reason.
//!
//! Sizes are bytes for the assumed LP64 target: char 1, short 2, int 4,
//! long/long long/pointer 8, float 4, double/long double 8.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Struct,
    Union,
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagKind::Struct => write!(f, "struct"),
            TagKind::Union => write!(f, "union"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Type {
    Void,
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
    LongDouble,
    Pointer(Rc<Type>),
    Array(Rc<RefCell<ArrayType>>),
    Record(Rc<RefCell<RecordType>>),
    Func(Rc<FuncType>),
}

#[derive(Debug)]
pub struct ArrayType {
    pub elem: Type,
    /// Element count; negative means incomplete (to be inferred)
    pub len: i64,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub ty: Type,
    pub name: String,
    pub offset: usize,
    pub index: usize,
}

#[derive(Debug)]
pub struct RecordType {
    pub name: String,
    pub tag: TagKind,
    pub members: Vec<Member>,
    pub complete: bool,
    pub size: usize,
    pub align: usize,
    /// Union lowering: index of the largest member
    pub dominant: usize,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub ty: Type,
    pub name: String,
}

#[derive(Debug)]
pub struct FuncType {
    pub ret: Type,
    pub params: Vec<Param>,
    pub name: String,
    pub variadic: bool,
    pub has_body: Cell<bool>,
}

fn roundup(n: usize, align: usize) -> usize {
    if align == 0 {
        return n;
    }
    n.div_ceil(align) * align
}

impl RecordType {
    pub fn incomplete(name: &str, tag: TagKind) -> Self {
        RecordType {
            name: name.to_string(),
            tag,
            members: Vec::new(),
            complete: false,
            size: 0,
            align: 1,
            dominant: 0,
        }
    }

    /// Install the member list and lay the record out.
    pub fn set_members(&mut self, members: Vec<(Type, String)>) {
        self.members.clear();
        match self.tag {
            TagKind::Struct => self.layout_struct(members),
            TagKind::Union => self.layout_union(members),
        }
        self.complete = true;
    }

    fn layout_struct(&mut self, members: Vec<(Type, String)>) {
        let mut offset = 0usize;
        let mut max_align = 1usize;
        for (index, (ty, name)) in members.into_iter().enumerate() {
            let align = ty.align();
            offset = roundup(offset, align);
            max_align = max_align.max(align);
            self.members.push(Member {
                offset,
                index,
                name,
                ty: ty.clone(),
            });
            offset += ty.size();
        }
        self.align = max_align;
        self.size = roundup(offset, max_align);
    }

    fn layout_union(&mut self, members: Vec<(Type, String)>) {
        let mut max_size = 0usize;
        let mut max_align = 1usize;
        let mut dominant = 0usize;
        for (index, (ty, name)) in members.into_iter().enumerate() {
            let size = ty.size();
            if size > max_size {
                max_size = size;
                dominant = index;
            }
            max_align = max_align.max(ty.align());
            self.members.push(Member {
                offset: 0,
                index,
                name,
                ty,
            });
        }
        self.align = max_align;
        self.size = roundup(max_size, max_align);
        self.dominant = dominant;
    }

    pub fn find_member(&self, name: &str) -> Option<Member> {
        self.members.iter().find(|m| m.name == name).cloned()
    }
}

impl Type {
    pub fn pointer_to(base: Type) -> Type {
        Type::Pointer(Rc::new(base))
    }

    pub fn array_of(elem: Type, len: i64) -> Type {
        Type::Array(Rc::new(RefCell::new(ArrayType { elem, len })))
    }

    pub fn record(rec: RecordType) -> Type {
        Type::Record(Rc::new(RefCell::new(rec)))
    }

    pub fn func(ret: Type, params: Vec<Param>, name: &str, variadic: bool) -> Type {
        Type::Func(Rc::new(FuncType {
            ret,
            params,
            name: name.to_string(),
            variadic,
            has_body: Cell::new(false),
        }))
    }

    pub fn size(&self) -> usize {
        match self {
            Type::Void => 0,
            Type::Char | Type::UChar => 1,
            Type::Short | Type::UShort => 2,
            Type::Int | Type::UInt | Type::Float => 4,
            Type::Long | Type::ULong | Type::LongLong | Type::ULongLong => 8,
            Type::Double | Type::LongDouble => 8,
            Type::Pointer(_) | Type::Func(_) => 8,
            Type::Array(arr) => {
                let arr = arr.borrow();
                if arr.len < 0 {
                    0
                } else {
                    arr.len as usize * arr.elem.size()
                }
            }
            Type::Record(rec) => rec.borrow().size,
        }
    }

    pub fn align(&self) -> usize {
        match self {
            Type::Void => 1,
            Type::Array(arr) => arr.borrow().elem.align(),
            Type::Record(rec) => rec.borrow().align,
            _ => self.size().max(1),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Type::Char
                | Type::UChar
                | Type::Short
                | Type::UShort
                | Type::Int
                | Type::UInt
                | Type::Long
                | Type::ULong
                | Type::LongLong
                | Type::ULongLong
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float | Type::Double | Type::LongDouble)
    }

    pub fn is_arith(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_signed(&self) -> bool {
        !matches!(
            self,
            Type::UChar | Type::UShort | Type::UInt | Type::ULong | Type::ULongLong
        )
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Type::Record(_))
    }

    pub fn is_func(&self) -> bool {
        matches!(self, Type::Func(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Scalar per the condition rules: arithmetic or pointer.
    pub fn is_scalar(&self) -> bool {
        self.is_arith() || self.is_pointer()
    }

    pub fn pointee(&self) -> Option<Type> {
        match self {
            Type::Pointer(base) => Some((**base).clone()),
            _ => None,
        }
    }

    pub fn array_elem(&self) -> Option<Type> {
        match self {
            Type::Array(arr) => Some(arr.borrow().elem.clone()),
            _ => None,
        }
    }

    pub fn array_len(&self) -> Option<i64> {
        match self {
            Type::Array(arr) => Some(arr.borrow().len),
            _ => None,
        }
    }

    /// Fix an inferred array extent. No-op on non-arrays.
    pub fn set_array_len(&self, len: i64) {
        if let Type::Array(arr) = self {
            arr.borrow_mut().len = len;
        }
    }

    pub fn as_record(&self) -> Option<Rc<RefCell<RecordType>>> {
        match self {
            Type::Record(rec) => Some(rec.clone()),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<Rc<FuncType>> {
        match self {
            Type::Func(func) => Some(func.clone()),
            _ => None,
        }
    }

    /// The function type behind a call target: either the type itself or the
    /// pointee of a function pointer.
    pub fn callable(&self) -> Option<Rc<FuncType>> {
        match self {
            Type::Func(func) => Some(func.clone()),
            Type::Pointer(base) => base.as_func(),
            _ => None,
        }
    }

    /// Array-to-pointer decay; other types pass through.
    pub fn decayed(&self) -> Type {
        match self {
            Type::Array(arr) => Type::pointer_to(arr.borrow().elem.clone()),
            _ => self.clone(),
        }
    }

    /// Integer promotion: anything narrower than `int` widens to `int`.
    pub fn promoted(&self) -> Type {
        if self.is_integer() && self.size() < 4 {
            Type::Int
        } else {
            self.clone()
        }
    }

    /// The usual arithmetic conversion target for a pair of operands.
    /// Floats dominate by width; integers promote to at least `int` and then
    /// to the wider operand, unsigned winning at equal width.
    pub fn usual_arith(lhs: &Type, rhs: &Type) -> Type {
        if matches!(lhs, Type::LongDouble) || matches!(rhs, Type::LongDouble) {
            return Type::LongDouble;
        }
        if matches!(lhs, Type::Double) || matches!(rhs, Type::Double) {
            return Type::Double;
        }
        if matches!(lhs, Type::Float) || matches!(rhs, Type::Float) {
            return Type::Float;
        }
        let l = lhs.promoted();
        let r = rhs.promoted();
        let width = l.size().max(r.size());
        let unsigned = (l.size() == width && !l.is_signed()) || (r.size() == width && !r.is_signed());
        match (width, unsigned) {
            (8, true) => Type::ULong,
            (8, false) => Type::Long,
            (_, true) => Type::UInt,
            (_, false) => Type::Int,
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Pointer(a), Type::Pointer(b)) => a == b,
            (Type::Array(a), Type::Array(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len == b.len && a.elem == b.elem
            }
            (Type::Record(a), Type::Record(b)) => {
                Rc::ptr_eq(a, b) || a.borrow().name == b.borrow().name
            }
            (Type::Func(a), Type::Func(b)) => Rc::ptr_eq(a, b) || a.name == b.name,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Char => write!(f, "char"),
            Type::UChar => write!(f, "unsigned char"),
            Type::Short => write!(f, "short"),
            Type::UShort => write!(f, "unsigned short"),
            Type::Int => write!(f, "int"),
            Type::UInt => write!(f, "unsigned int"),
            Type::Long => write!(f, "long"),
            Type::ULong => write!(f, "unsigned long"),
            Type::LongLong => write!(f, "long long"),
            Type::ULongLong => write!(f, "unsigned long long"),
            Type::Float => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::LongDouble => write!(f, "long double"),
            Type::Pointer(base) => write!(f, "{} *", base),
            Type::Array(arr) => {
                let arr = arr.borrow();
                if arr.len < 0 {
                    write!(f, "{} []", arr.elem)
                } else {
                    write!(f, "{} [{}]", arr.elem, arr.len)
                }
            }
            Type::Record(rec) => {
                let rec = rec.borrow();
                write!(f, "{} {}", rec.tag, rec.name)
            }
            Type::Func(func) => {
                write!(f, "{} (", func.ret)?;
                for (i, p) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.ty)?;
                }
                if func.variadic {
                    if !func.params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_sizes() {
        assert_eq!(Type::Char.size(), 1);
        assert_eq!(Type::Short.size(), 2);
        assert_eq!(Type::Int.size(), 4);
        assert_eq!(Type::Long.size(), 8);
        assert_eq!(Type::LongLong.size(), 8);
        assert_eq!(Type::Float.size(), 4);
        assert_eq!(Type::Double.size(), 8);
        assert_eq!(Type::pointer_to(Type::Int).size(), 8);
    }

    #[test]
    fn test_array_layout() {
        let arr = Type::array_of(Type::Int, 3);
        assert_eq!(arr.size(), 12);
        assert_eq!(arr.align(), 4);

        let nested = Type::array_of(Type::array_of(Type::Int, 5), 3);
        assert_eq!(nested.size(), 60);

        let flex = Type::array_of(Type::Char, -1);
        assert_eq!(flex.size(), 0);
        flex.set_array_len(3);
        assert_eq!(flex.size(), 3);
    }

    #[test]
    fn test_struct_layout_padding() {
        let mut rec = RecordType::incomplete("S", TagKind::Struct);
        rec.set_members(vec![
            (Type::Char, "c".into()),
            (Type::Int, "i".into()),
            (Type::Char, "d".into()),
        ]);
        assert_eq!(rec.members[0].offset, 0);
        assert_eq!(rec.members[1].offset, 4);
        assert_eq!(rec.members[2].offset, 8);
        assert_eq!(rec.align, 4);
        assert_eq!(rec.size, 12);
        // Offsets are non-decreasing and aligned.
        for m in &rec.members {
            assert_eq!(m.offset % m.ty.align(), 0);
        }
    }

    #[test]
    fn test_union_layout_dominant() {
        let mut rec = RecordType::incomplete("U", TagKind::Union);
        rec.set_members(vec![
            (Type::Char, "c".into()),
            (Type::Double, "d".into()),
            (Type::Int, "i".into()),
        ]);
        for m in &rec.members {
            assert_eq!(m.offset, 0);
        }
        assert_eq!(rec.dominant, 1);
        assert_eq!(rec.size, 8);
        assert_eq!(rec.align, 8);
    }

    #[test]
    fn test_predicates() {
        assert!(Type::UChar.is_integer());
        assert!(Type::Double.is_float());
        assert!(Type::Int.is_arith());
        assert!(!Type::pointer_to(Type::Int).is_arith());
        assert!(Type::pointer_to(Type::Int).is_scalar());
        assert!(Type::Int.is_signed());
        assert!(!Type::UInt.is_signed());
    }

    #[test]
    fn test_usual_arith() {
        assert_eq!(Type::usual_arith(&Type::Char, &Type::Char), Type::Int);
        assert_eq!(Type::usual_arith(&Type::Int, &Type::Long), Type::Long);
        assert_eq!(Type::usual_arith(&Type::UInt, &Type::Int), Type::UInt);
        assert_eq!(Type::usual_arith(&Type::ULong, &Type::Int), Type::ULong);
        assert_eq!(Type::usual_arith(&Type::Int, &Type::Float), Type::Float);
        assert_eq!(Type::usual_arith(&Type::Float, &Type::Double), Type::Double);
    }

    #[test]
    fn test_decay_and_promotion() {
        let arr = Type::array_of(Type::Int, 4);
        assert_eq!(arr.decayed(), Type::pointer_to(Type::Int));
        assert_eq!(Type::Short.promoted(), Type::Int);
        assert_eq!(Type::Long.promoted(), Type::Long);
    }

    #[test]
    fn test_callable() {
        let fty = Type::func(Type::Int, vec![], "f", false);
        assert!(fty.callable().is_some());
        let fptr = Type::pointer_to(fty);
        assert!(fptr.callable().is_some());
        assert!(Type::Int.callable().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::pointer_to(Type::Int).to_string(), "int *");
        assert_eq!(Type::array_of(Type::Char, 3).to_string(), "char [3]");
        let rec = Type::record(RecordType::incomplete("S", TagKind::Struct));
        assert_eq!(rec.to_string(), "struct S");
    }
}
