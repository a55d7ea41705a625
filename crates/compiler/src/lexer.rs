//! Lexer: byte stream to tokens.
//!
//! Context-free by design — `identifier` vs. `type-name` is the parser's
//! problem, answered through the symbol table. The lexer's one concession to
//! the grammar is the checkpoint stack: `save_state`/`restore_state` nest, so
//! the parser can speculate through declarators and rewind.

use crate::diag::{Diag, DiagKind, DiagResult, SrcLoc};
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    Str,
    Identifier,
    // keywords
    KwInt,
    KwIf,
    KwElse,
    KwFor,
    KwBreak,
    KwContinue,
    KwSizeof,
    KwStruct,
    KwUnion,
    KwVoid,
    KwReturn,
    KwChar,
    KwShort,
    KwLong,
    KwFloat,
    KwDouble,
    KwSigned,
    KwUnsigned,
    KwTypedef,
    KwConst,
    KwVolatile,
    KwStatic,
    KwExtern,
    KwAuto,
    KwRegister,
    KwInline,
    KwWhile,
    KwDo,
    KwSwitch,
    KwCase,
    KwDefault,
    // punctuators
    Minus,
    Plus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Semi,
    Equal,
    Comma,
    LBrace,
    RBrace,
    EqualEqual,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    PipePipe,
    Pipe,
    Amp,
    AmpAmp,
    LessLess,
    GreaterGreater,
    Caret,
    PlusPlus,
    MinusMinus,
    Tilde,
    Exclaim,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    PercentEqual,
    LessLessEqual,
    GreaterGreaterEqual,
    AmpEqual,
    CaretEqual,
    PipeEqual,
    Question,
    Colon,
    LBracket,
    RBracket,
    Dot,
    Arrow,
    Ellipsis,
    Eof,
}

impl TokenKind {
    pub fn spelling(self) -> &'static str {
        match self {
            TokenKind::Number => "number",
            TokenKind::Str => "string",
            TokenKind::Identifier => "identifier",
            TokenKind::KwInt => "int",
            TokenKind::KwIf => "if",
            TokenKind::KwElse => "else",
            TokenKind::KwFor => "for",
            TokenKind::KwBreak => "break",
            TokenKind::KwContinue => "continue",
            TokenKind::KwSizeof => "sizeof",
            TokenKind::KwStruct => "struct",
            TokenKind::KwUnion => "union",
            TokenKind::KwVoid => "void",
            TokenKind::KwReturn => "return",
            TokenKind::KwChar => "char",
            TokenKind::KwShort => "short",
            TokenKind::KwLong => "long",
            TokenKind::KwFloat => "float",
            TokenKind::KwDouble => "double",
            TokenKind::KwSigned => "signed",
            TokenKind::KwUnsigned => "unsigned",
            TokenKind::KwTypedef => "typedef",
            TokenKind::KwConst => "const",
            TokenKind::KwVolatile => "volatile",
            TokenKind::KwStatic => "static",
            TokenKind::KwExtern => "extern",
            TokenKind::KwAuto => "auto",
            TokenKind::KwRegister => "register",
            TokenKind::KwInline => "inline",
            TokenKind::KwWhile => "while",
            TokenKind::KwDo => "do",
            TokenKind::KwSwitch => "switch",
            TokenKind::KwCase => "case",
            TokenKind::KwDefault => "default",
            TokenKind::Minus => "-",
            TokenKind::Plus => "+",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Semi => ";",
            TokenKind::Equal => "=",
            TokenKind::Comma => ",",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::EqualEqual => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::Less => "<",
            TokenKind::LessEqual => "<=",
            TokenKind::Greater => ">",
            TokenKind::GreaterEqual => ">=",
            TokenKind::PipePipe => "||",
            TokenKind::Pipe => "|",
            TokenKind::Amp => "&",
            TokenKind::AmpAmp => "&&",
            TokenKind::LessLess => "<<",
            TokenKind::GreaterGreater => ">>",
            TokenKind::Caret => "^",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::Tilde => "~",
            TokenKind::Exclaim => "!",
            TokenKind::PlusEqual => "+=",
            TokenKind::MinusEqual => "-=",
            TokenKind::StarEqual => "*=",
            TokenKind::SlashEqual => "/=",
            TokenKind::PercentEqual => "%=",
            TokenKind::LessLessEqual => "<<=",
            TokenKind::GreaterGreaterEqual => ">>=",
            TokenKind::AmpEqual => "&=",
            TokenKind::CaretEqual => "^=",
            TokenKind::PipeEqual => "|=",
            TokenKind::Question => "?",
            TokenKind::Colon => ":",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Dot => ".",
            TokenKind::Arrow => "->",
            TokenKind::Ellipsis => "...",
            TokenKind::Eof => "end of file",
        }
    }
}

/// A token with position info, the source slice, and — for literals — the
/// decoded value and a type hint the parser hands straight to Sema.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based source row
    pub row: u32,
    /// 1-based source column
    pub col: u32,
    pub text: String,
    /// Integer literal / char literal value
    pub ival: i64,
    /// Float literal value
    pub fval: f64,
    /// Decoded string literal bytes (without the implicit NUL)
    pub bytes: Vec<u8>,
    /// Literal type hint (numeric rule or `char[len+1]` for strings)
    pub ty: Option<Type>,
}

impl Token {
    fn at(kind: TokenKind, row: u32, col: u32, text: &str) -> Self {
        Token {
            kind,
            row,
            col,
            text: text.to_string(),
            ival: 0,
            fval: 0.0,
            bytes: Vec::new(),
            ty: None,
        }
    }

    pub fn loc(&self) -> SrcLoc {
        SrcLoc::new(self.row, self.col)
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

impl Default for Token {
    fn default() -> Self {
        Token::at(TokenKind::Eof, 0, 0, "")
    }
}

#[derive(Clone, Copy)]
struct State {
    pos: usize,
    line_head: usize,
    row: u32,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    file_name: String,
    pos: usize,
    line_head: usize,
    row: u32,
    states: Vec<State>,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn keyword_kind(text: &str) -> Option<TokenKind> {
    Some(match text {
        "int" => TokenKind::KwInt,
        "if" => TokenKind::KwIf,
        "else" => TokenKind::KwElse,
        "for" => TokenKind::KwFor,
        "break" => TokenKind::KwBreak,
        "continue" => TokenKind::KwContinue,
        "sizeof" => TokenKind::KwSizeof,
        "struct" => TokenKind::KwStruct,
        "union" => TokenKind::KwUnion,
        "void" => TokenKind::KwVoid,
        "return" => TokenKind::KwReturn,
        "char" => TokenKind::KwChar,
        "short" => TokenKind::KwShort,
        "long" => TokenKind::KwLong,
        "float" => TokenKind::KwFloat,
        "double" => TokenKind::KwDouble,
        "signed" => TokenKind::KwSigned,
        "unsigned" => TokenKind::KwUnsigned,
        "typedef" => TokenKind::KwTypedef,
        "const" => TokenKind::KwConst,
        "volatile" => TokenKind::KwVolatile,
        "static" => TokenKind::KwStatic,
        "extern" => TokenKind::KwExtern,
        "auto" => TokenKind::KwAuto,
        "register" => TokenKind::KwRegister,
        "inline" => TokenKind::KwInline,
        "while" => TokenKind::KwWhile,
        "do" => TokenKind::KwDo,
        "switch" => TokenKind::KwSwitch,
        "case" => TokenKind::KwCase,
        "default" => TokenKind::KwDefault,
        _ => return None,
    })
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, file_name: &str) -> Self {
        Lexer {
            src: src.as_bytes(),
            file_name: file_name.to_string(),
            pos: 0,
            line_head: 0,
            row: 1,
            states: Vec::new(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Push the full cursor onto the checkpoint stack.
    pub fn save_state(&mut self) {
        self.states.push(State {
            pos: self.pos,
            line_head: self.line_head,
            row: self.row,
        });
    }

    /// Pop the checkpoint stack and rewind to it.
    pub fn restore_state(&mut self) {
        let state = self.states.pop().expect("unbalanced lexer restore");
        self.pos = state.pos;
        self.line_head = state.line_head;
        self.row = state.row;
    }

    fn byte(&self, off: usize) -> u8 {
        *self.src.get(self.pos + off).unwrap_or(&0)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s.as_bytes())
    }

    fn newline(&mut self) {
        self.row += 1;
        self.line_head = self.pos + 1;
    }

    fn loc_here(&self) -> SrcLoc {
        SrcLoc::new(self.row, (self.pos - self.line_head + 1) as u32)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.byte(0) {
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'\n' => {
                    self.newline();
                    self.pos += 1;
                }
                b'/' if self.byte(1) == b'/' => {
                    while self.pos < self.src.len() && self.byte(0) != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if self.byte(1) == b'*' => {
                    self.pos += 2;
                    while self.pos < self.src.len() && !self.starts_with("*/") {
                        if self.byte(0) == b'\n' {
                            self.newline();
                        }
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 2).min(self.src.len());
                }
                _ => break,
            }
            if self.pos >= self.src.len() {
                break;
            }
        }
    }

    pub fn next_token(&mut self) -> DiagResult<Token> {
        self.skip_trivia();

        if self.pos >= self.src.len() {
            let mut tok = Token::default();
            tok.row = self.row;
            tok.col = (self.pos.saturating_sub(self.line_head) + 1) as u32;
            return Ok(tok);
        }

        let row = self.row;
        let col = (self.pos - self.line_head + 1) as u32;
        let start = self.pos;
        let b = self.byte(0);

        if b == b'\'' {
            return self.lex_char(row, col, start);
        }
        if b == b'"' {
            return self.lex_string(row, col);
        }
        if b.is_ascii_digit() || (b == b'.' && self.byte(1).is_ascii_digit()) {
            return self.lex_number(row, col, start);
        }
        if is_ident_start(b) {
            while is_ident_continue(self.byte(0)) {
                self.pos += 1;
            }
            let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
            let kind = keyword_kind(text).unwrap_or(TokenKind::Identifier);
            return Ok(Token::at(kind, row, col, text));
        }
        self.lex_punct(row, col, start)
    }

    /// Decode one (possibly escaped) character of a char or string literal.
    fn unescape(&mut self) -> u8 {
        let b = self.byte(0);
        if b != b'\\' {
            self.pos += 1;
            return b;
        }
        self.pos += 1;
        let esc = match self.byte(0) {
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0b,
            other => other,
        };
        self.pos += 1;
        esc
    }

    fn lex_char(&mut self, row: u32, col: u32, start: usize) -> DiagResult<Token> {
        self.pos += 1; // opening quote
        let value = self.unescape();
        if self.byte(0) != b'\'' {
            return Err(Diag::new(DiagKind::UnclosedCharacter, self.loc_here(), ""));
        }
        self.pos += 1;
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        let mut tok = Token::at(TokenKind::Number, row, col, text);
        tok.ival = value as i64;
        tok.ty = Some(Type::Int);
        Ok(tok)
    }

    fn lex_string(&mut self, row: u32, col: u32) -> DiagResult<Token> {
        self.pos += 1; // opening quote
        let start = self.pos;
        let mut bytes = Vec::new();
        while self.byte(0) != b'"' {
            if self.pos >= self.src.len() {
                return Err(Diag::new(DiagKind::UnclosedString, self.loc_here(), ""));
            }
            bytes.push(self.unescape());
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        self.pos += 1; // closing quote
        let mut tok = Token::at(TokenKind::Str, row, col, text);
        tok.ty = Some(Type::array_of(Type::Char, bytes.len() as i64 + 1));
        tok.bytes = bytes;
        Ok(tok)
    }

    /// Find the end of a numeric token: digits, dots, suffix letters, and
    /// sign characters after an exponent marker.
    fn numeric_end(&self, start: usize) -> usize {
        let mut p = start;
        loop {
            let b = *self.src.get(p).unwrap_or(&0);
            let next = *self.src.get(p + 1).unwrap_or(&0);
            if (b == b'e' || b == b'E' || b == b'p' || b == b'P') && (next == b'+' || next == b'-')
            {
                p += 2;
            } else if b.is_ascii_alphanumeric() || b == b'.' {
                p += 1;
            } else {
                break;
            }
        }
        p
    }

    fn lex_number(&mut self, row: u32, col: u32, start: usize) -> DiagResult<Token> {
        let end = self.numeric_end(start);
        let text = std::str::from_utf8(&self.src[start..end])
            .unwrap_or_default()
            .to_string();

        if let Some((value, ty)) = convert_int(&self.src[start..end]) {
            self.pos = end;
            let mut tok = Token::at(TokenKind::Number, row, col, &text);
            tok.ival = value as i64;
            tok.ty = Some(ty);
            return Ok(tok);
        }

        match convert_float(&self.src[start..end]) {
            Some((value, ty)) => {
                self.pos = end;
                let mut tok = Token::at(TokenKind::Number, row, col, &text);
                tok.fval = value;
                tok.ty = Some(ty);
                Ok(tok)
            }
            None => Err(Diag::new(
                DiagKind::NumericConstant,
                SrcLoc::new(row, col),
                format!("'{}'", text),
            )),
        }
    }

    fn lex_punct(&mut self, row: u32, col: u32, start: usize) -> DiagResult<Token> {
        // Longest match first within each leading character.
        let table: &[(&str, TokenKind)] = &[
            ("<<=", TokenKind::LessLessEqual),
            (">>=", TokenKind::GreaterGreaterEqual),
            ("...", TokenKind::Ellipsis),
            ("++", TokenKind::PlusPlus),
            ("+=", TokenKind::PlusEqual),
            ("--", TokenKind::MinusMinus),
            ("-=", TokenKind::MinusEqual),
            ("->", TokenKind::Arrow),
            ("*=", TokenKind::StarEqual),
            ("/=", TokenKind::SlashEqual),
            ("%=", TokenKind::PercentEqual),
            ("==", TokenKind::EqualEqual),
            ("!=", TokenKind::NotEqual),
            ("<=", TokenKind::LessEqual),
            (">=", TokenKind::GreaterEqual),
            ("<<", TokenKind::LessLess),
            (">>", TokenKind::GreaterGreater),
            ("||", TokenKind::PipePipe),
            ("|=", TokenKind::PipeEqual),
            ("&&", TokenKind::AmpAmp),
            ("&=", TokenKind::AmpEqual),
            ("^=", TokenKind::CaretEqual),
            ("+", TokenKind::Plus),
            ("-", TokenKind::Minus),
            ("*", TokenKind::Star),
            ("/", TokenKind::Slash),
            ("%", TokenKind::Percent),
            ("(", TokenKind::LParen),
            (")", TokenKind::RParen),
            (";", TokenKind::Semi),
            ("=", TokenKind::Equal),
            (",", TokenKind::Comma),
            ("{", TokenKind::LBrace),
            ("}", TokenKind::RBrace),
            ("<", TokenKind::Less),
            (">", TokenKind::Greater),
            ("|", TokenKind::Pipe),
            ("&", TokenKind::Amp),
            ("^", TokenKind::Caret),
            ("~", TokenKind::Tilde),
            ("!", TokenKind::Exclaim),
            ("?", TokenKind::Question),
            (":", TokenKind::Colon),
            ("[", TokenKind::LBracket),
            ("]", TokenKind::RBracket),
            (".", TokenKind::Dot),
        ];
        for (text, kind) in table {
            if self.starts_with(text) {
                self.pos += text.len();
                let slice = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
                return Ok(Token::at(*kind, row, col, slice));
            }
        }
        Err(Diag::new(
            DiagKind::UnknownChar,
            SrcLoc::new(row, col),
            format!("'{}'", self.byte(0) as char),
        ))
    }
}

/// Try to read an integer constant (binary, octal, decimal or hex, with
/// U/L/LL suffixes). Returns `None` when the token is not a valid integer —
/// the caller falls back to the float rule.
fn convert_int(s: &[u8]) -> Option<(u64, Type)> {
    let mut p = 0usize;
    let mut base = 10u64;
    if s.len() > 2 && (s.starts_with(b"0x") || s.starts_with(b"0X")) && s[2].is_ascii_hexdigit() {
        p = 2;
        base = 16;
    } else if s.len() > 2 && (s.starts_with(b"0b") || s.starts_with(b"0B")) && (s[2] == b'0' || s[2] == b'1') {
        p = 2;
        base = 2;
    } else if s.first() == Some(&b'0') {
        base = 8;
    }

    let mut val: u64 = 0;
    let digits_start = p;
    while p < s.len() {
        let d = match s[p] {
            b @ b'0'..=b'9' => (b - b'0') as u64,
            b @ b'a'..=b'f' => (b - b'a') as u64 + 10,
            b @ b'A'..=b'F' => (b - b'A') as u64 + 10,
            _ => break,
        };
        if d >= base {
            break;
        }
        val = val.wrapping_mul(base).wrapping_add(d);
        p += 1;
    }
    if p == digits_start && base != 8 {
        return None;
    }

    // U, L and LL suffixes in any case and order.
    let rest = &s[p..];
    let mut long = false;
    let mut unsigned = false;
    let eat = |pat: &[&str]| -> usize {
        for cand in pat {
            if rest.len() >= cand.len()
                && rest[..cand.len()].eq_ignore_ascii_case(cand.as_bytes())
            {
                return cand.len();
            }
        }
        0
    };
    let n3 = eat(&["llu", "ull"]);
    if n3 == 3 {
        long = true;
        unsigned = true;
        p += 3;
    } else {
        let n2 = eat(&["lu", "ul", "ll"]);
        if n2 == 2 {
            if rest[..2].eq_ignore_ascii_case(b"ll") {
                long = true;
            } else {
                long = true;
                unsigned = true;
            }
            p += 2;
        } else if !rest.is_empty() && (rest[0] == b'l' || rest[0] == b'L') {
            long = true;
            p += 1;
        } else if !rest.is_empty() && (rest[0] == b'u' || rest[0] == b'U') {
            unsigned = true;
            p += 1;
        }
    }

    if p != s.len() {
        return None;
    }

    let ty = if base == 10 {
        if long && unsigned {
            Type::ULong
        } else if long {
            Type::Long
        } else if unsigned {
            if val >> 32 != 0 { Type::ULong } else { Type::UInt }
        } else if val >> 31 != 0 {
            Type::Long
        } else {
            Type::Int
        }
    } else if long && unsigned {
        Type::ULong
    } else if long {
        if val >> 63 != 0 { Type::ULong } else { Type::Long }
    } else if unsigned {
        if val >> 32 != 0 { Type::ULong } else { Type::UInt }
    } else if val >> 63 != 0 {
        Type::ULong
    } else if val >> 32 != 0 {
        Type::Long
    } else if val >> 31 != 0 {
        Type::UInt
    } else {
        Type::Int
    };

    Some((val, ty))
}

/// Read a floating constant with an optional `f`/`l` suffix.
fn convert_float(s: &[u8]) -> Option<(f64, Type)> {
    let mut end = 0usize;
    while end < s.len() && s[end].is_ascii_digit() {
        end += 1;
    }
    if s.get(end) == Some(&b'.') {
        end += 1;
        while end < s.len() && s[end].is_ascii_digit() {
            end += 1;
        }
    }
    if matches!(s.get(end), Some(b'e') | Some(b'E')) {
        let mut e = end + 1;
        if matches!(s.get(e), Some(b'+') | Some(b'-')) {
            e += 1;
        }
        if s.get(e).is_some_and(|b| b.is_ascii_digit()) {
            end = e;
            while end < s.len() && s[end].is_ascii_digit() {
                end += 1;
            }
        }
    }

    let value: f64 = std::str::from_utf8(&s[..end]).ok()?.parse().ok()?;

    let ty = match s.get(end) {
        Some(b'f') | Some(b'F') => {
            end += 1;
            Type::Float
        }
        Some(b'l') | Some(b'L') => {
            end += 1;
            Type::LongDouble
        }
        _ => Type::Double,
    };

    if end != s.len() {
        return None;
    }
    Some((value, ty))
}
