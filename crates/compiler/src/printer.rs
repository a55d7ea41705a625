//! Textual AST printer.
//!
//! Renders the typed tree back to C-like source for `--emit ast` and for
//! eyeballing what Sema committed (conversion choices, operand swaps, folded
//! case labels all show up here). Expressions print fully parenthesized, so
//! output is canonical: printing the same tree twice is byte-identical, and
//! re-parsing a printed expression reproduces the same shape.

use crate::ast::{AstNode, BinaryOp, NodeKind, Program, UnaryOp};
use std::fmt::Write as _;

pub fn print_program(program: &Program) -> String {
    let mut printer = Printer {
        out: String::new(),
        indent: 0,
    };
    for decl in &program.ext_decls {
        printer.stmt(decl);
    }
    printer.out
}

/// Render a single expression (used by tests).
pub fn print_expr(node: &AstNode) -> String {
    let mut printer = Printer {
        out: String::new(),
        indent: 0,
    };
    printer.expr(node);
    printer.out
}

struct Printer {
    out: String,
    indent: usize,
}

fn binary_op_text(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Equal => "==",
        BinaryOp::NotEqual => "!=",
        BinaryOp::Less => "<",
        BinaryOp::LessEqual => "<=",
        BinaryOp::Greater => ">",
        BinaryOp::GreaterEqual => ">=",
        BinaryOp::LogicalOr => "||",
        BinaryOp::LogicalAnd => "&&",
        BinaryOp::BitwiseOr => "|",
        BinaryOp::BitwiseAnd => "&",
        BinaryOp::BitwiseXor => "^",
        BinaryOp::LeftShift => "<<",
        BinaryOp::RightShift => ">>",
        BinaryOp::Comma => ",",
        BinaryOp::Assign => "=",
        BinaryOp::AddAssign => "+=",
        BinaryOp::SubAssign => "-=",
        BinaryOp::MulAssign => "*=",
        BinaryOp::DivAssign => "/=",
        BinaryOp::ModAssign => "%=",
        BinaryOp::BitwiseOrAssign => "|=",
        BinaryOp::BitwiseXorAssign => "^=",
        BinaryOp::BitwiseAndAssign => "&=",
        BinaryOp::LeftShiftAssign => "<<=",
        BinaryOp::RightShiftAssign => ">>=",
    }
}

fn unary_op_text(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Positive => "+",
        UnaryOp::Negative => "-",
        UnaryOp::Deref => "*",
        UnaryOp::Addr => "&",
        UnaryOp::Inc => "++",
        UnaryOp::Dec => "--",
        UnaryOp::LogicalNot => "!",
        UnaryOp::BitwiseNot => "~",
    }
}

impl Printer {
    fn line_start(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn expr(&mut self, node: &AstNode) {
        match &node.kind {
            NodeKind::Binary { op, lhs, rhs } => {
                self.out.push('(');
                self.expr(lhs);
                let _ = write!(self.out, " {} ", binary_op_text(*op));
                self.expr(rhs);
                self.out.push(')');
            }
            NodeKind::Ternary { cond, then, els } => {
                self.out.push('(');
                self.expr(cond);
                self.out.push_str(" ? ");
                self.expr(then);
                self.out.push_str(" : ");
                self.expr(els);
                self.out.push(')');
            }
            NodeKind::Cast { operand } => {
                let _ = write!(self.out, "({})", node.ty);
                self.expr(operand);
            }
            NodeKind::Unary { op, operand } => {
                self.out.push('(');
                self.out.push_str(unary_op_text(*op));
                self.expr(operand);
                self.out.push(')');
            }
            NodeKind::SizeOf { operand, query } => match query {
                Some(ty) => {
                    let _ = write!(self.out, "sizeof({})", ty);
                }
                None => {
                    self.out.push_str("sizeof ");
                    if let Some(operand) = operand {
                        self.expr(operand);
                    }
                }
            },
            NodeKind::PostInc { operand } => {
                self.expr(operand);
                self.out.push_str("++");
            }
            NodeKind::PostDec { operand } => {
                self.expr(operand);
                self.out.push_str("--");
            }
            NodeKind::Subscript { base, index } => {
                self.expr(base);
                self.out.push('[');
                self.expr(index);
                self.out.push(']');
            }
            NodeKind::MemberDot { base, member } => {
                self.expr(base);
                let _ = write!(self.out, ".{}", member.name);
            }
            NodeKind::MemberArrow { base, member } => {
                self.expr(base);
                let _ = write!(self.out, "->{}", member.name);
            }
            NodeKind::Call { callee, args } => {
                self.expr(callee);
                self.out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(arg);
                }
                self.out.push(')');
            }
            NodeKind::IntLiteral(v) => {
                let _ = write!(self.out, "{}", v);
            }
            NodeKind::FloatLiteral(v) => {
                let _ = write!(self.out, "{}", v);
            }
            NodeKind::StringLiteral(bytes) => {
                self.out.push('"');
                for &b in bytes {
                    match b {
                        b'\n' => self.out.push_str("\\n"),
                        b'\t' => self.out.push_str("\\t"),
                        b'"' => self.out.push_str("\\\""),
                        b'\\' => self.out.push_str("\\\\"),
                        0x20..=0x7e => self.out.push(b as char),
                        _ => {
                            let _ = write!(self.out, "\\x{:02x}", b);
                        }
                    }
                }
                self.out.push('"');
            }
            NodeKind::VariableAccess => {
                self.out.push_str(node.name());
            }
            _ => {
                // Statement nodes never reach expression position.
                self.out.push_str("<stmt>");
            }
        }
    }

    fn decl_item(&mut self, node: &AstNode) {
        if let NodeKind::VariableDecl { init, .. } = &node.kind {
            let _ = write!(self.out, "{} {}", node.ty, node.name());
            if !init.is_empty() {
                self.out.push_str(" = ");
                if init.len() == 1 && init[0].path == [0] {
                    self.expr(&init[0].value);
                } else {
                    self.out.push('{');
                    for (i, iv) in init.iter().enumerate() {
                        if i > 0 {
                            self.out.push_str(", ");
                        }
                        // Path suffix after the leading deref index.
                        let path: Vec<String> =
                            iv.path[1..].iter().map(|p| p.to_string()).collect();
                        let _ = write!(self.out, "[{}]=", path.join("."));
                        self.expr(&iv.value);
                    }
                    self.out.push('}');
                }
            }
        }
    }

    fn stmt(&mut self, node: &AstNode) {
        match &node.kind {
            NodeKind::Block { items } => {
                self.line_start();
                self.out.push_str("{\n");
                self.indent += 1;
                for item in items {
                    self.stmt(item);
                }
                self.indent -= 1;
                self.line_start();
                self.out.push_str("}\n");
            }
            NodeKind::Decl { items } => {
                self.line_start();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.decl_item(item);
                }
                self.out.push_str(";\n");
            }
            NodeKind::VariableDecl { .. } => {
                self.line_start();
                self.decl_item(node);
                self.out.push_str(";\n");
            }
            NodeKind::FuncDecl { body } => {
                let func = node.ty.as_func().expect("function decl without func type");
                self.line_start();
                let _ = write!(self.out, "{} {}(", func.ret, func.name);
                for (i, p) in func.params.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    let _ = write!(self.out, "{} {}", p.ty, p.name);
                }
                if func.variadic {
                    if !func.params.is_empty() {
                        self.out.push_str(", ");
                    }
                    self.out.push_str("...");
                }
                self.out.push(')');
                match body {
                    Some(body) => {
                        self.out.push('\n');
                        self.stmt(body);
                    }
                    None => self.out.push_str(";\n"),
                }
            }
            NodeKind::If { cond, then, els } => {
                self.line_start();
                self.out.push_str("if (");
                self.expr(cond);
                self.out.push_str(")\n");
                self.nested(then.as_deref());
                if let Some(els) = els {
                    self.line_start();
                    self.out.push_str("else\n");
                    self.nested(Some(els));
                }
            }
            NodeKind::For {
                init,
                cond,
                inc,
                body,
                ..
            } => {
                self.line_start();
                self.out.push_str("for (");
                if let Some(init) = init {
                    match &init.kind {
                        NodeKind::Decl { items } => {
                            for (i, item) in items.iter().enumerate() {
                                if i > 0 {
                                    self.out.push_str(", ");
                                }
                                self.decl_item(item);
                            }
                        }
                        _ => self.expr(init),
                    }
                }
                self.out.push_str("; ");
                if let Some(cond) = cond {
                    self.expr(cond);
                }
                self.out.push_str("; ");
                if let Some(inc) = inc {
                    self.expr(inc);
                }
                self.out.push_str(")\n");
                self.nested(body.as_deref());
            }
            NodeKind::DoWhile { cond, body, .. } => {
                self.line_start();
                self.out.push_str("do\n");
                self.nested(Some(body));
                self.line_start();
                self.out.push_str("while (");
                self.expr(cond);
                self.out.push_str(");\n");
            }
            NodeKind::Switch { cond, body, .. } => {
                self.line_start();
                self.out.push_str("switch (");
                self.expr(cond);
                self.out.push_str(")\n");
                self.nested(Some(body));
            }
            NodeKind::Case { value, body, .. } => {
                self.line_start();
                let _ = write!(self.out, "case {}:\n", value);
                self.nested(Some(body));
            }
            NodeKind::Default { body } => {
                self.line_start();
                self.out.push_str("default:\n");
                self.nested(Some(body));
            }
            NodeKind::Break { .. } => {
                self.line_start();
                self.out.push_str("break;\n");
            }
            NodeKind::Continue { .. } => {
                self.line_start();
                self.out.push_str("continue;\n");
            }
            NodeKind::Return { value } => {
                self.line_start();
                self.out.push_str("return");
                if let Some(value) = value {
                    self.out.push(' ');
                    self.expr(value);
                }
                self.out.push_str(";\n");
            }
            _ => {
                // Expression statement.
                self.line_start();
                self.expr(node);
                self.out.push_str(";\n");
            }
        }
    }

    fn nested(&mut self, node: Option<&AstNode>) {
        match node {
            None => {
                self.indent += 1;
                self.line_start();
                self.out.push_str(";\n");
                self.indent -= 1;
            }
            Some(node) => {
                if matches!(node.kind, NodeKind::Block { .. }) {
                    self.stmt(node);
                } else {
                    self.indent += 1;
                    self.stmt(node);
                    self.indent -= 1;
                }
            }
        }
    }
}
