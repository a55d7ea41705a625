//! Diagnostics.
//!
//! The front-end is single-shot: the first rule violation wins and unwinds
//! the whole compilation as an `Err(Diag)`. Nothing here terminates the
//! process; the CLI decides what an error is worth as an exit code, and
//! library callers (tests included) just match on the result.

use crate::lexer::Token;
use std::fmt;

/// Where a diagnostic points, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SrcLoc {
    pub row: u32,
    pub col: u32,
}

impl SrcLoc {
    pub fn new(row: u32, col: u32) -> Self {
        SrcLoc { row, col }
    }
}

impl fmt::Display for SrcLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.row, self.col)
    }
}

/// The error taxonomy. One variant per reportable condition; the payload is
/// already folded into [`Diag::message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagKind {
    // lexical
    UnknownChar,
    UnclosedCharacter,
    UnclosedString,
    NumericConstant,
    // syntactic
    Expected,
    Miss,
    // types
    Type,
    BinaryExprType,
    ExpectedType,
    ArrSize,
    LargeLength,
    // lvalues
    ExpectedLValue,
    // names
    Undefined,
    Redefined,
    // constants
    ConstantExpr,
    IntConstantExpr,
    // control flow
    BreakStmt,
    ContinueStmt,
    CaseStmt,
    DefaultStmt,
    MultiDefaultStmt,
    // emitter invariants
    Internal,
}

impl DiagKind {
    fn label(self) -> &'static str {
        match self {
            DiagKind::UnknownChar => "unknown character",
            DiagKind::UnclosedCharacter => "unclosed character literal",
            DiagKind::UnclosedString => "unclosed string literal",
            DiagKind::NumericConstant => "malformed numeric constant",
            DiagKind::Expected => "expected",
            DiagKind::Miss => "missing",
            DiagKind::Type => "illegal type specifier",
            DiagKind::BinaryExprType => "invalid operands to binary expression",
            DiagKind::ExpectedType => "operand of wrong type",
            DiagKind::ArrSize => "array size must be positive",
            DiagKind::LargeLength => "initializer is longer than the array",
            DiagKind::ExpectedLValue => "expression is not assignable",
            DiagKind::Undefined => "undefined symbol",
            DiagKind::Redefined => "redefined symbol",
            DiagKind::ConstantExpr => "expression is not a compile-time constant",
            DiagKind::IntConstantExpr => "expression is not an integer constant",
            DiagKind::BreakStmt => "'break' outside of loop or switch",
            DiagKind::ContinueStmt => "'continue' outside of loop",
            DiagKind::CaseStmt => "'case' outside of switch",
            DiagKind::DefaultStmt => "'default' outside of switch",
            DiagKind::MultiDefaultStmt => "multiple 'default' labels in one switch",
            DiagKind::Internal => "internal error",
        }
    }
}

/// A fatal compilation error.
#[derive(Debug, Clone, PartialEq)]
pub struct Diag {
    pub kind: DiagKind,
    pub message: String,
    pub loc: SrcLoc,
}

impl Diag {
    pub fn new(kind: DiagKind, loc: SrcLoc, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let message = if detail.is_empty() {
            kind.label().to_string()
        } else {
            format!("{}: {}", kind.label(), detail)
        };
        Diag { kind, message, loc }
    }

    /// Anchor a diagnostic at a token.
    pub fn at(kind: DiagKind, tok: &Token, detail: impl Into<String>) -> Self {
        Diag::new(kind, SrcLoc::new(tok.row, tok.col), detail)
    }

    pub fn expected(tok: &Token, what: &str) -> Self {
        Diag::at(
            DiagKind::Expected,
            tok,
            format!("{}, got '{}'", what, tok.text),
        )
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Diag::new(DiagKind::Internal, SrcLoc::default(), detail)
    }
}

impl fmt::Display for Diag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: error: {}", self.loc, self.message)
    }
}

impl std::error::Error for Diag {}

pub type DiagResult<T> = Result<T, Diag>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diag_display() {
        let d = Diag::new(DiagKind::Undefined, SrcLoc::new(3, 7), "'foo'");
        assert_eq!(d.to_string(), "3:7: error: undefined symbol: 'foo'");
    }

    #[test]
    fn test_diag_without_detail() {
        let d = Diag::new(DiagKind::ArrSize, SrcLoc::new(1, 1), "");
        assert_eq!(d.to_string(), "1:1: error: array size must be positive");
    }

    #[test]
    fn test_expected_includes_both_sides() {
        let mut tok = Token::default();
        tok.row = 2;
        tok.col = 5;
        tok.text = "}".to_string();
        let d = Diag::expected(&tok, "';'");
        assert_eq!(d.kind, DiagKind::Expected);
        assert!(d.message.contains("';'"));
        assert!(d.message.contains("'}'"));
    }
}
