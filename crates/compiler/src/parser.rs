//! Recursive-descent parser with Sema threaded inline.
//!
//! One token of lookahead, plus a rewind facility for the two places the C
//! grammar refuses to be LL(1): parenthesized declarators and the top-level
//! function-vs-variable split. Both use the same move — checkpoint the lexer,
//! parse speculatively with Sema silenced, rewind, then parse for real.
//!
//! Loop and switch statements hand out [`LoopId`] handles from three parser
//! stacks; `break`/`continue` nodes capture the innermost handle so the
//! emitter can resolve jump targets without back-pointers into the tree.

use crate::ast::{AstNode, BinaryOp, InitValue, LoopId, NodeKind, Program, UnaryOp};
use crate::diag::{Diag, DiagKind, DiagResult};
use crate::eval;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::sema::{Mode, Sema};
use crate::types::{Param, TagKind, Type};

struct SwitchFrame {
    has_default: bool,
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    sema: Sema,
    tok: Token,
    break_targets: Vec<LoopId>,
    continue_targets: Vec<LoopId>,
    switch_frames: Vec<SwitchFrame>,
    next_loop_id: u32,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>, sema: Sema) -> DiagResult<Self> {
        let mut parser = Parser {
            lexer,
            sema,
            tok: Token::default(),
            break_targets: Vec::new(),
            continue_targets: Vec::new(),
            switch_frames: Vec::new(),
            next_loop_id: 0,
        };
        parser.advance()?;
        Ok(parser)
    }

    // ---- token plumbing -------------------------------------------------

    fn advance(&mut self) -> DiagResult<()> {
        self.tok = self.lexer.next_token()?;
        Ok(())
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.tok.kind == kind
    }

    fn expect(&self, kind: TokenKind) -> DiagResult<()> {
        if self.at(kind) {
            Ok(())
        } else {
            Err(Diag::expected(&self.tok, &format!("'{}'", kind.spelling())))
        }
    }

    fn consume(&mut self, kind: TokenKind) -> DiagResult<()> {
        self.expect(kind)?;
        self.advance()
    }

    /// Checkpoint the lexer and remember the current token; pair with
    /// [`Parser::rewind`].
    fn checkpoint(&mut self) -> Token {
        self.lexer.save_state();
        self.tok.clone()
    }

    fn rewind(&mut self, saved: Token) {
        self.lexer.restore_state();
        self.tok = saved;
    }

    fn fresh_loop_id(&mut self) -> LoopId {
        let id = LoopId(self.next_loop_id);
        self.next_loop_id += 1;
        id
    }

    fn empty_block(&self, tok: &Token) -> AstNode {
        AstNode::new(NodeKind::Block { items: Vec::new() }, Type::Void, tok.clone())
    }

    // ---- program --------------------------------------------------------

    pub fn parse_program(&mut self) -> DiagResult<Program> {
        let mut program = Program::new(self.lexer.file_name());
        while !self.at(TokenKind::Eof) {
            let node = if self.is_func_decl()? {
                self.parse_func_decl()?
            } else {
                self.parse_decl_stmt(true)?
            };
            if let Some(node) = node {
                program.ext_decls.push(node);
            }
        }
        Ok(program)
    }

    /// Function definition and declaration share a long prefix with variable
    /// declarations. Peek through declaration-specifiers and a declarator
    /// with Sema silenced, look at the resulting type, and rewind.
    fn is_func_decl(&mut self) -> DiagResult<bool> {
        self.sema.push_mode(Mode::Skip);
        let saved = self.checkpoint();
        let result = self.peek_func_decl();
        self.rewind(saved);
        self.sema.pop_mode();
        result
    }

    fn peek_func_decl(&mut self) -> DiagResult<bool> {
        let (base, _) = self.parse_decl_spec()?;
        if self.at(TokenKind::Semi) {
            return Ok(false);
        }
        let node = self.declarator(base, true)?;
        Ok(node.ty.is_func())
    }

    fn parse_func_decl(&mut self) -> DiagResult<Option<AstNode>> {
        let (base, is_typedef) = self.parse_decl_spec()?;

        // One scope for the parameters and the body together.
        self.sema.enter_scope();
        let node = self.declarator(base, true)?;

        if is_typedef {
            self.consume(TokenKind::Semi)?;
            self.sema.exit_scope();
            self.sema.typedef_decl(node.ty.clone(), &node.tok)?;
            return Ok(None);
        }

        let body = if self.at(TokenKind::Semi) {
            self.consume(TokenKind::Semi)?;
            None
        } else {
            Some(self.parse_block_stmt()?)
        };
        self.sema.exit_scope();
        self.sema.func_decl(&node.tok, node.ty.clone(), body).map(Some)
    }

    // ---- declaration specifiers ----------------------------------------

    /// Is this token the start of a declaration? Keywords answer directly;
    /// identifiers ask the symbol table whether they are typedef aliases.
    fn is_type_start(&self, tok: &Token) -> DiagResult<bool> {
        match tok.kind {
            TokenKind::KwVoid
            | TokenKind::KwChar
            | TokenKind::KwShort
            | TokenKind::KwInt
            | TokenKind::KwLong
            | TokenKind::KwFloat
            | TokenKind::KwDouble
            | TokenKind::KwSigned
            | TokenKind::KwUnsigned
            | TokenKind::KwStatic
            | TokenKind::KwExtern
            | TokenKind::KwAuto
            | TokenKind::KwRegister
            | TokenKind::KwTypedef
            | TokenKind::KwConst
            | TokenKind::KwVolatile
            | TokenKind::KwInline
            | TokenKind::KwStruct
            | TokenKind::KwUnion => Ok(true),
            TokenKind::Identifier => Ok(self.sema.typedef_access(tok)?.is_some()),
            _ => Ok(false),
        }
    }

    /// `const static unsigned long long int` and friends: accumulate four
    /// orthogonal dimensions, validate combinations after every step, and
    /// select the canonical type at the end.
    fn parse_decl_spec(&mut self) -> DiagResult<(Type, bool)> {
        #[derive(PartialEq, Clone, Copy)]
        enum Kind {
            Unset,
            Void,
            Char,
            Int,
            Float,
            Double,
        }
        #[derive(PartialEq, Clone, Copy)]
        enum Size {
            Unset,
            Short,
            Long,
            LongLong,
        }
        #[derive(PartialEq, Clone, Copy)]
        enum Sign {
            Unset,
            Signed,
            Unsigned,
        }

        if !self.is_type_start(&self.tok.clone())? {
            return Err(Diag::at(DiagKind::Type, &self.tok, ""));
        }

        let mut kind = Kind::Unset;
        let mut size = Size::Unset;
        let mut sign = Sign::Unset;
        let mut has_sclass = false;
        let mut is_typedef = false;
        let mut usertype: Option<Type> = None;

        let err = |tok: &Token| Err(Diag::at(DiagKind::Type, tok, ""));

        loop {
            if self.at(TokenKind::Eof) {
                return Err(Diag::expected(&self.tok, "declaration specifier"));
            }

            // A leading identifier may be a typedef alias.
            if kind == Kind::Unset && usertype.is_none() && self.at(TokenKind::Identifier) {
                if let Some(def) = self.sema.typedef_access(&self.tok)? {
                    usertype = Some(def);
                    self.advance()?;
                    // fall through to the combination checks
                    if kind != Kind::Unset || size != Size::Unset || sign != Sign::Unset {
                        return err(&self.tok);
                    }
                    continue;
                }
            }

            match self.tok.kind {
                TokenKind::KwTypedef => {
                    if has_sclass {
                        return err(&self.tok);
                    }
                    has_sclass = true;
                    is_typedef = true;
                    self.advance()?;
                }
                TokenKind::KwExtern
                | TokenKind::KwStatic
                | TokenKind::KwAuto
                | TokenKind::KwRegister => {
                    if has_sclass {
                        return err(&self.tok);
                    }
                    has_sclass = true;
                    self.advance()?;
                }
                // Accepted and discarded.
                TokenKind::KwConst | TokenKind::KwVolatile | TokenKind::KwInline => {
                    self.advance()?;
                }
                TokenKind::KwVoid => {
                    if kind != Kind::Unset {
                        return err(&self.tok);
                    }
                    kind = Kind::Void;
                    self.advance()?;
                }
                TokenKind::KwChar => {
                    if kind != Kind::Unset {
                        return err(&self.tok);
                    }
                    kind = Kind::Char;
                    self.advance()?;
                }
                TokenKind::KwInt => {
                    if kind != Kind::Unset {
                        return err(&self.tok);
                    }
                    kind = Kind::Int;
                    self.advance()?;
                }
                TokenKind::KwFloat => {
                    if kind != Kind::Unset {
                        return err(&self.tok);
                    }
                    kind = Kind::Float;
                    self.advance()?;
                }
                TokenKind::KwDouble => {
                    if kind != Kind::Unset {
                        return err(&self.tok);
                    }
                    kind = Kind::Double;
                    self.advance()?;
                }
                TokenKind::KwSigned => {
                    if sign != Sign::Unset {
                        return err(&self.tok);
                    }
                    sign = Sign::Signed;
                    self.advance()?;
                }
                TokenKind::KwUnsigned => {
                    if sign != Sign::Unset {
                        return err(&self.tok);
                    }
                    sign = Sign::Unsigned;
                    self.advance()?;
                }
                TokenKind::KwShort => {
                    if size != Size::Unset {
                        return err(&self.tok);
                    }
                    size = Size::Short;
                    self.advance()?;
                }
                TokenKind::KwLong => {
                    size = match size {
                        Size::Unset => Size::Long,
                        Size::Long => Size::LongLong,
                        _ => return err(&self.tok),
                    };
                    self.advance()?;
                }
                TokenKind::KwStruct | TokenKind::KwUnion => {
                    if usertype.is_some() {
                        return err(&self.tok);
                    }
                    usertype = Some(self.parse_record_spec()?);
                }
                _ => break,
            }

            // Combination checks after each accepted specifier.
            if size == Size::Short && !matches!(kind, Kind::Unset | Kind::Int) {
                return err(&self.tok);
            }
            if matches!(size, Size::Long) && !matches!(kind, Kind::Unset | Kind::Int | Kind::Double)
            {
                return err(&self.tok);
            }
            if size == Size::LongLong && !matches!(kind, Kind::Unset | Kind::Int) {
                return err(&self.tok);
            }
            if sign != Sign::Unset && matches!(kind, Kind::Void | Kind::Float | Kind::Double) {
                return err(&self.tok);
            }
            if usertype.is_some()
                && (kind != Kind::Unset || size != Size::Unset || sign != Sign::Unset)
            {
                return err(&self.tok);
            }
        }

        if let Some(ty) = usertype {
            return Ok((ty, is_typedef));
        }

        let unsigned = sign == Sign::Unsigned;
        let ty = match kind {
            Kind::Void => Type::Void,
            Kind::Char => {
                if unsigned {
                    Type::UChar
                } else {
                    Type::Char
                }
            }
            Kind::Float => Type::Float,
            Kind::Double => {
                if size == Size::Long {
                    Type::LongDouble
                } else {
                    Type::Double
                }
            }
            Kind::Int | Kind::Unset => match size {
                Size::Short => {
                    if unsigned {
                        Type::UShort
                    } else {
                        Type::Short
                    }
                }
                Size::Long => {
                    if unsigned {
                        Type::ULong
                    } else {
                        Type::Long
                    }
                }
                Size::LongLong => {
                    if unsigned {
                        Type::ULongLong
                    } else {
                        Type::LongLong
                    }
                }
                Size::Unset => {
                    if unsigned {
                        Type::UInt
                    } else {
                        Type::Int
                    }
                }
            },
        };
        Ok((ty, is_typedef))
    }

    /// `struct S { ... }`, `struct S`, or an anonymous `struct { ... }`.
    fn parse_record_spec(&mut self) -> DiagResult<Type> {
        let tag = match self.tok.kind {
            TokenKind::KwStruct => TagKind::Struct,
            TokenKind::KwUnion => TagKind::Union,
            _ => unreachable!("record spec without struct/union keyword"),
        };
        self.advance()?;

        let name_tok = if self.at(TokenKind::Identifier) {
            let tok = self.tok.clone();
            self.advance()?;
            Some(tok)
        } else {
            None
        };

        if self.at(TokenKind::LBrace) {
            let members = self.parse_member_list()?;
            match name_tok {
                Some(tok) => self.sema.tag_decl(&tok, tag, members),
                None => Ok(self.sema.anony_tag_decl(tag, members)),
            }
        } else {
            match name_tok {
                Some(tok) => Ok(self.sema.tag_ref(&tok, tag)),
                None => Err(Diag::expected(&self.tok, "identifier or '{'")),
            }
        }
    }

    fn parse_member_list(&mut self) -> DiagResult<Vec<(Type, String)>> {
        self.consume(TokenKind::LBrace)?;
        self.sema.enter_scope();
        let mut members = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(Diag::expected(&self.tok, "'}'"));
            }
            if let Some(decl) = self.parse_decl_stmt(false)? {
                if let NodeKind::Decl { items } = decl.kind {
                    for item in items {
                        members.push((item.ty.clone(), item.tok.text.clone()));
                    }
                }
            }
        }
        self.sema.exit_scope();
        self.consume(TokenKind::RBrace)?;
        Ok(members)
    }

    // ---- declarators ----------------------------------------------------

    /// declarator ::= "*"* direct-declarator
    fn declarator(&mut self, mut base: Type, is_global: bool) -> DiagResult<AstNode> {
        while self.at(TokenKind::Star) {
            self.consume(TokenKind::Star)?;
            base = Type::pointer_to(base);
        }
        self.direct_declarator(base, is_global)
    }

    /// direct-declarator ::= identifier suffix* | "(" declarator ")" suffix*
    ///
    /// For the parenthesized form the true base of the inner declarator is
    /// whatever the *suffix* builds out of `base` — which sits to the right
    /// of text we have not parsed yet. So: speculatively parse the inner
    /// declarator against a dummy base to find the suffix, apply the suffix
    /// to `base` for real, rewind, and parse the inner declarator again with
    /// the now-correct base.
    fn direct_declarator(&mut self, base: Type, is_global: bool) -> DiagResult<AstNode> {
        let mut decl_node;
        if self.at(TokenKind::LParen) {
            let saved = self.checkpoint();
            self.sema.push_mode(Mode::Skip);
            let suffixed = self.peek_declarator_suffix(base, is_global);
            self.rewind(saved);
            self.sema.pop_mode();
            let suffixed = suffixed?;

            self.consume(TokenKind::LParen)?;
            decl_node = self.declarator(suffixed, is_global)?;
            self.consume(TokenKind::RParen)?;
            // Re-consume the suffix tokens; the computed type is discarded,
            // but function parameters get declared on this pass.
            let iden = self.tok.clone();
            self.direct_declarator_suffix(&iden, Type::Int, is_global)?;
        } else if self.at(TokenKind::Identifier) {
            let iden = self.tok.clone();
            self.consume(TokenKind::Identifier)?;
            let full = self.direct_declarator_suffix(&iden, base, is_global)?;
            decl_node = self.sema.variable_decl(&iden, full, is_global)?;
        } else {
            return Err(Diag::expected(&self.tok, "identifier or '('"));
        }

        if self.at(TokenKind::Equal) {
            self.advance()?;
            let ty = decl_node.ty.clone();
            let mut inits: Vec<InitValue> = Vec::new();
            let mut path: Vec<i64> = vec![0];
            let braced = self.at(TokenKind::LBrace);
            self.parse_initializer(&mut inits, &ty, &mut path, braced)?;
            if let NodeKind::VariableDecl { init, .. } = &mut decl_node.kind {
                *init = inits;
            }
        }
        Ok(decl_node)
    }

    /// The speculative leg of the parenthesized-declarator trick.
    fn peek_declarator_suffix(&mut self, base: Type, is_global: bool) -> DiagResult<Type> {
        self.consume(TokenKind::LParen)?;
        self.declarator(Type::Int, is_global)?;
        self.consume(TokenKind::RParen)?;
        let iden = self.tok.clone();
        self.direct_declarator_suffix(&iden, base, is_global)
    }

    fn direct_declarator_suffix(
        &mut self,
        iden: &Token,
        base: Type,
        is_global: bool,
    ) -> DiagResult<Type> {
        if self.at(TokenKind::LBracket) {
            self.array_suffix(base, is_global)
        } else if self.at(TokenKind::LParen) {
            self.func_suffix(iden, base, is_global)
        } else {
            Ok(base)
        }
    }

    /// Array suffixes are right-associative on types: `a[3][5]` is an array
    /// of 3 arrays of 5.
    fn array_suffix(&mut self, base: Type, is_global: bool) -> DiagResult<Type> {
        if !self.at(TokenKind::LBracket) {
            return Ok(base);
        }
        self.consume(TokenKind::LBracket)?;
        let mut count = -1i64;
        if !self.at(TokenKind::RBracket) {
            let size_tok = self.tok.clone();
            let expr = self.parse_expr()?;
            let constant = eval::eval(&expr)?;
            count = constant
                .as_int()
                .ok_or_else(|| Diag::expected(&size_tok, "integer constant"))?;
            if count <= 0 {
                return Err(Diag::at(DiagKind::ArrSize, &size_tok, ""));
            }
        }
        self.consume(TokenKind::RBracket)?;
        let inner = self.array_suffix(base, is_global)?;
        // Only the outermost dimension may be inferred.
        if inner.array_len().is_some_and(|len| len < 0) {
            return Err(Diag::at(
                DiagKind::ArrSize,
                &self.tok,
                "only the outermost array dimension may be omitted",
            ));
        }
        Ok(Type::array_of(inner, count))
    }

    fn func_suffix(&mut self, iden: &Token, base: Type, is_global: bool) -> DiagResult<Type> {
        self.consume(TokenKind::LParen)?;
        let mut params: Vec<Param> = Vec::new();
        let mut variadic = false;
        let mut i = 0;
        while !self.at(TokenKind::RParen) {
            if i > 0 && self.at(TokenKind::Comma) {
                self.consume(TokenKind::Comma)?;
            }
            if self.at(TokenKind::KwVoid) {
                self.consume(TokenKind::KwVoid)?;
                break;
            }
            if i > 0 && self.at(TokenKind::Ellipsis) {
                variadic = true;
                self.consume(TokenKind::Ellipsis)?;
                break;
            }
            let (ty, _) = self.parse_decl_spec()?;
            let node = self.declarator(ty, is_global)?;
            // Parameters of array type decay to pointers.
            let pty = if node.ty.is_array() {
                node.ty.decayed()
            } else {
                node.ty.clone()
            };
            params.push(Param {
                ty: pty,
                name: node.tok.text.clone(),
            });
            i += 1;
        }
        self.consume(TokenKind::RParen)?;
        Ok(Type::func(base, params, &iden.text, variadic))
    }

    // ---- initializers ---------------------------------------------------

    fn is_char_array(ty: &Type) -> bool {
        ty.array_elem().is_some_and(|elem| matches!(elem, Type::Char))
    }

    /// Flatten one initializer level into `{sub-type, expr, index path}`
    /// triples. Returns `true` when a closing `}` ended the level early.
    fn parse_initializer(
        &mut self,
        arr: &mut Vec<InitValue>,
        decl_ty: &Type,
        path: &mut Vec<i64>,
        has_lbrace: bool,
    ) -> DiagResult<bool> {
        if self.at(TokenKind::RBrace) {
            if !has_lbrace {
                return Err(Diag::at(DiagKind::Miss, &self.tok, "'{'"));
            }
            return Ok(true);
        }

        if Self::is_char_array(decl_ty) && self.at(TokenKind::Str) {
            self.parse_string_initializer(arr, decl_ty, path)?;
            return Ok(false);
        }

        if self.at(TokenKind::LBrace) {
            self.consume(TokenKind::LBrace)?;

            if Self::is_char_array(decl_ty) && self.at(TokenKind::Str) {
                self.parse_string_initializer(arr, decl_ty, path)?;
            } else if decl_ty.is_array() {
                let size = decl_ty.array_len().unwrap_or(-1);
                let elem = decl_ty.array_elem().expect("array without element type");
                let is_flex = size < 0;
                let mut i = 0i64;
                while i < size || is_flex {
                    if i > 0 && self.at(TokenKind::Comma) {
                        self.consume(TokenKind::Comma)?;
                    }
                    path.push(i);
                    let end = self.parse_initializer(arr, &elem, path, true)?;
                    path.pop();
                    if end {
                        break;
                    }
                    i += 1;
                }
                if is_flex {
                    decl_ty.set_array_len(i);
                }
            } else if let Some(rec) = decl_ty.as_record() {
                let (tag, member_tys) = {
                    let rec = rec.borrow();
                    (
                        rec.tag,
                        rec.members.iter().map(|m| m.ty.clone()).collect::<Vec<_>>(),
                    )
                };
                match tag {
                    TagKind::Struct => {
                        for (i, mty) in member_tys.iter().enumerate() {
                            if i > 0 && self.at(TokenKind::Comma) {
                                self.consume(TokenKind::Comma)?;
                            }
                            path.push(i as i64);
                            let end = self.parse_initializer(arr, mty, path, true)?;
                            path.pop();
                            if end {
                                break;
                            }
                        }
                    }
                    TagKind::Union => {
                        // Only the first member takes an initializer.
                        if let Some(mty) = member_tys.first() {
                            path.push(0);
                            self.parse_initializer(arr, mty, path, true)?;
                            path.pop();
                        }
                    }
                }
            }
            if has_lbrace {
                self.consume(TokenKind::RBrace)?;
            }
        } else {
            let node = self.parse_assign_expr()?;
            arr.push(self.sema.decl_init_value(decl_ty.clone(), node, path));
        }
        Ok(false)
    }

    /// `char s[N] = "..."`: expand each character, pad with NULs if there is
    /// room, infer N when it was omitted.
    fn parse_string_initializer(
        &mut self,
        arr: &mut Vec<InitValue>,
        decl_ty: &Type,
        path: &mut Vec<i64>,
    ) -> DiagResult<()> {
        let cur = self.tok.clone();
        let bytes = self.tok.bytes.clone();
        self.consume(TokenKind::Str)?;

        let slen = bytes.len() as i64;
        let mut len = decl_ty.array_len().unwrap_or(-1);
        if len < 0 {
            decl_ty.set_array_len(slen + 1);
            len = slen + 1;
        }
        if len < slen {
            return Err(Diag::at(DiagKind::LargeLength, &cur, ""));
        }

        for (i, &b) in bytes.iter().enumerate() {
            let node = self.sema.number_from(&cur, b as i64, Type::Char);
            path.push(i as i64);
            arr.push(self.sema.decl_init_value(Type::Char, node, path));
            path.pop();
        }
        for i in slen..len {
            let node = self.sema.number_from(&cur, 0, Type::Char);
            path.push(i);
            arr.push(self.sema.decl_init_value(Type::Char, node, path));
            path.pop();
        }
        Ok(())
    }

    // ---- statements -----------------------------------------------------

    fn parse_stmt(&mut self) -> DiagResult<Option<AstNode>> {
        if self.at(TokenKind::Semi) {
            self.advance()?;
            return Ok(None);
        }
        if self.is_type_start(&self.tok.clone())? {
            return self.parse_decl_stmt(false);
        }
        match self.tok.kind {
            TokenKind::KwIf => self.parse_if_stmt().map(Some),
            TokenKind::LBrace => self.parse_block_stmt().map(Some),
            TokenKind::KwFor => self.parse_for_stmt().map(Some),
            TokenKind::KwBreak => self.parse_break_stmt().map(Some),
            TokenKind::KwContinue => self.parse_continue_stmt().map(Some),
            TokenKind::KwReturn => self.parse_return_stmt().map(Some),
            TokenKind::KwWhile => self.parse_while_stmt().map(Some),
            TokenKind::KwDo => self.parse_do_while_stmt().map(Some),
            TokenKind::KwSwitch => self.parse_switch_stmt().map(Some),
            TokenKind::KwCase => self.parse_case_stmt().map(Some),
            TokenKind::KwDefault => self.parse_default_stmt().map(Some),
            _ => self.parse_expr_stmt().map(Some),
        }
    }

    fn parse_decl_stmt(&mut self, is_global: bool) -> DiagResult<Option<AstNode>> {
        let start = self.tok.clone();
        let (base, is_typedef) = self.parse_decl_spec()?;

        // `struct S { ... };` or a stray `int;` — nothing to declare.
        if self.at(TokenKind::Semi) {
            self.consume(TokenKind::Semi)?;
            return Ok(None);
        }

        if is_typedef {
            let mut i = 0;
            while !self.at(TokenKind::Semi) {
                if i > 0 {
                    self.consume(TokenKind::Comma)?;
                }
                i += 1;
                // The declarator is parsed silently: the name being
                // introduced must not resolve or collide as a variable.
                self.sema.push_mode(Mode::Skip);
                let node = self.declarator(base.clone(), is_global);
                self.sema.pop_mode();
                let node = node?;
                self.sema.typedef_decl(node.ty.clone(), &node.tok)?;
            }
            self.consume(TokenKind::Semi)?;
            return Ok(None);
        }

        let mut items = Vec::new();
        let mut i = 0;
        while !self.at(TokenKind::Semi) {
            if i > 0 {
                self.consume(TokenKind::Comma)?;
            }
            i += 1;
            items.push(self.declarator(base.clone(), is_global)?);
        }
        self.consume(TokenKind::Semi)?;
        Ok(Some(AstNode::new(
            NodeKind::Decl { items },
            Type::Void,
            start,
        )))
    }

    fn parse_block_stmt(&mut self) -> DiagResult<AstNode> {
        let start = self.tok.clone();
        self.sema.enter_scope();
        self.consume(TokenKind::LBrace)?;
        let mut items = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(Diag::expected(&self.tok, "'}'"));
            }
            if let Some(stmt) = self.parse_stmt()? {
                items.push(stmt);
            }
        }
        self.consume(TokenKind::RBrace)?;
        self.sema.exit_scope();
        Ok(AstNode::new(NodeKind::Block { items }, Type::Void, start))
    }

    fn parse_expr_stmt(&mut self) -> DiagResult<AstNode> {
        let expr = self.parse_expr()?;
        self.consume(TokenKind::Semi)?;
        Ok(expr)
    }

    fn parse_if_stmt(&mut self) -> DiagResult<AstNode> {
        let start = self.tok.clone();
        self.consume(TokenKind::KwIf)?;
        self.consume(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.consume(TokenKind::RParen)?;
        let then = self.parse_stmt()?;
        let els = if self.at(TokenKind::KwElse) {
            self.consume(TokenKind::KwElse)?;
            self.parse_stmt()?
        } else {
            None
        };
        Ok(self.sema.if_stmt(cond, then, els, &start))
    }

    fn parse_for_stmt(&mut self) -> DiagResult<AstNode> {
        let start = self.tok.clone();
        self.consume(TokenKind::KwFor)?;
        self.consume(TokenKind::LParen)?;

        self.sema.enter_scope();
        let id = self.fresh_loop_id();
        self.break_targets.push(id);
        self.continue_targets.push(id);

        let init = if self.is_type_start(&self.tok.clone())? {
            self.parse_decl_stmt(false)?
        } else {
            let init = if self.at(TokenKind::Semi) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.consume(TokenKind::Semi)?;
            init
        };

        let cond = if self.at(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.consume(TokenKind::Semi)?;

        let inc = if self.at(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.consume(TokenKind::RParen)?;

        let body = self.parse_stmt()?;

        self.break_targets.pop();
        self.continue_targets.pop();
        self.sema.exit_scope();

        Ok(AstNode::new(
            NodeKind::For {
                id,
                init: init.map(Box::new),
                cond: cond.map(Box::new),
                inc: inc.map(Box::new),
                body: body.map(Box::new),
            },
            Type::Void,
            start,
        ))
    }

    fn parse_while_stmt(&mut self) -> DiagResult<AstNode> {
        let start = self.tok.clone();
        self.consume(TokenKind::KwWhile)?;
        self.consume(TokenKind::LParen)?;

        let id = self.fresh_loop_id();
        self.break_targets.push(id);
        self.continue_targets.push(id);

        let cond = if self.at(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.consume(TokenKind::RParen)?;
        let body = self.parse_stmt()?;

        self.break_targets.pop();
        self.continue_targets.pop();

        Ok(AstNode::new(
            NodeKind::For {
                id,
                init: None,
                cond: cond.map(Box::new),
                inc: None,
                body: body.map(Box::new),
            },
            Type::Void,
            start,
        ))
    }

    fn parse_do_while_stmt(&mut self) -> DiagResult<AstNode> {
        let start = self.tok.clone();
        self.consume(TokenKind::KwDo)?;

        let id = self.fresh_loop_id();
        self.break_targets.push(id);
        self.continue_targets.push(id);

        let body = self
            .parse_stmt()?
            .unwrap_or_else(|| self.empty_block(&start));

        self.consume(TokenKind::KwWhile)?;
        self.consume(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.consume(TokenKind::RParen)?;
        self.consume(TokenKind::Semi)?;

        self.break_targets.pop();
        self.continue_targets.pop();

        Ok(AstNode::new(
            NodeKind::DoWhile {
                id,
                cond: Box::new(cond),
                body: Box::new(body),
            },
            Type::Void,
            start,
        ))
    }

    fn parse_break_stmt(&mut self) -> DiagResult<AstNode> {
        let start = self.tok.clone();
        let target = *self
            .break_targets
            .last()
            .ok_or_else(|| Diag::at(DiagKind::BreakStmt, &self.tok, ""))?;
        self.consume(TokenKind::KwBreak)?;
        self.consume(TokenKind::Semi)?;
        Ok(AstNode::new(NodeKind::Break { target }, Type::Void, start))
    }

    fn parse_continue_stmt(&mut self) -> DiagResult<AstNode> {
        let start = self.tok.clone();
        let target = *self
            .continue_targets
            .last()
            .ok_or_else(|| Diag::at(DiagKind::ContinueStmt, &self.tok, ""))?;
        self.consume(TokenKind::KwContinue)?;
        self.consume(TokenKind::Semi)?;
        Ok(AstNode::new(
            NodeKind::Continue { target },
            Type::Void,
            start,
        ))
    }

    fn parse_return_stmt(&mut self) -> DiagResult<AstNode> {
        let start = self.tok.clone();
        self.consume(TokenKind::KwReturn)?;
        let value = if self.at(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.consume(TokenKind::Semi)?;
        Ok(AstNode::new(
            NodeKind::Return {
                value: value.map(Box::new),
            },
            Type::Void,
            start,
        ))
    }

    fn parse_switch_stmt(&mut self) -> DiagResult<AstNode> {
        let start = self.tok.clone();
        self.consume(TokenKind::KwSwitch)?;
        self.consume(TokenKind::LParen)?;
        let cond_tok = self.tok.clone();
        let cond = self.parse_expr()?;
        if !cond.ty.is_integer() {
            return Err(Diag::expected(&cond_tok, "integer type"));
        }
        self.consume(TokenKind::RParen)?;

        let id = self.fresh_loop_id();
        self.break_targets.push(id);
        self.switch_frames.push(SwitchFrame { has_default: false });

        let body = self
            .parse_stmt()?
            .unwrap_or_else(|| self.empty_block(&start));

        self.break_targets.pop();
        let frame = self.switch_frames.pop().expect("switch frame underflow");

        Ok(AstNode::new(
            NodeKind::Switch {
                id,
                cond: Box::new(cond),
                body: Box::new(body),
                has_default: frame.has_default,
            },
            Type::Void,
            start,
        ))
    }

    /// Statements between one `case` label and the next are gathered into a
    /// block so a label can carry multiple statements.
    fn gather_label_body(&mut self, start: &Token) -> DiagResult<AstNode> {
        let mut items = Vec::new();
        while !matches!(
            self.tok.kind,
            TokenKind::KwCase | TokenKind::KwDefault | TokenKind::RBrace
        ) {
            if self.at(TokenKind::Eof) {
                return Err(Diag::expected(&self.tok, "'}'"));
            }
            if let Some(stmt) = self.parse_stmt()? {
                items.push(stmt);
            }
        }
        Ok(AstNode::new(
            NodeKind::Block { items },
            Type::Void,
            start.clone(),
        ))
    }

    fn parse_case_stmt(&mut self) -> DiagResult<AstNode> {
        let start = self.tok.clone();
        if self.switch_frames.is_empty() {
            return Err(Diag::at(DiagKind::CaseStmt, &self.tok, ""));
        }
        self.consume(TokenKind::KwCase)?;
        let val_tok = self.tok.clone();
        let expr = self.parse_expr()?;
        let value = eval::eval(&expr)?
            .as_int()
            .ok_or_else(|| Diag::at(DiagKind::IntConstantExpr, &val_tok, ""))?;
        self.consume(TokenKind::Colon)?;
        let body = self.gather_label_body(&start)?;
        Ok(AstNode::new(
            NodeKind::Case {
                value,
                expr: Box::new(expr),
                body: Box::new(body),
            },
            Type::Void,
            start,
        ))
    }

    fn parse_default_stmt(&mut self) -> DiagResult<AstNode> {
        let start = self.tok.clone();
        match self.switch_frames.last_mut() {
            None => return Err(Diag::at(DiagKind::DefaultStmt, &self.tok, "")),
            Some(frame) => {
                if frame.has_default {
                    return Err(Diag::at(DiagKind::MultiDefaultStmt, &self.tok, ""));
                }
                frame.has_default = true;
            }
        }
        self.consume(TokenKind::KwDefault)?;
        self.consume(TokenKind::Colon)?;
        let body = self.gather_label_body(&start)?;
        Ok(AstNode::new(
            NodeKind::Default {
                body: Box::new(body),
            },
            Type::Void,
            start,
        ))
    }

    // ---- expressions ----------------------------------------------------

    fn parse_expr(&mut self) -> DiagResult<AstNode> {
        let mut left = self.parse_assign_expr()?;
        while self.at(TokenKind::Comma) {
            let op_tok = self.tok.clone();
            self.consume(TokenKind::Comma)?;
            let right = self.parse_assign_expr()?;
            left = self.sema.binary_expr(left, right, BinaryOp::Comma, &op_tok)?;
        }
        Ok(left)
    }

    fn assign_op(&self) -> Option<BinaryOp> {
        Some(match self.tok.kind {
            TokenKind::Equal => BinaryOp::Assign,
            TokenKind::PlusEqual => BinaryOp::AddAssign,
            TokenKind::MinusEqual => BinaryOp::SubAssign,
            TokenKind::StarEqual => BinaryOp::MulAssign,
            TokenKind::SlashEqual => BinaryOp::DivAssign,
            TokenKind::PercentEqual => BinaryOp::ModAssign,
            TokenKind::PipeEqual => BinaryOp::BitwiseOrAssign,
            TokenKind::AmpEqual => BinaryOp::BitwiseAndAssign,
            TokenKind::CaretEqual => BinaryOp::BitwiseXorAssign,
            TokenKind::LessLessEqual => BinaryOp::LeftShiftAssign,
            TokenKind::GreaterGreaterEqual => BinaryOp::RightShiftAssign,
            _ => return None,
        })
    }

    /// Assignment is right-associative: `a = b = 3`.
    fn parse_assign_expr(&mut self) -> DiagResult<AstNode> {
        let left = self.parse_conditional_expr()?;
        let Some(op) = self.assign_op() else {
            return Ok(left);
        };
        let op_tok = self.tok.clone();
        self.advance()?;
        let right = self.parse_assign_expr()?;
        self.sema.binary_expr(left, right, op, &op_tok)
    }

    fn parse_conditional_expr(&mut self) -> DiagResult<AstNode> {
        let cond = self.parse_log_or_expr()?;
        if !self.at(TokenKind::Question) {
            return Ok(cond);
        }
        let q_tok = self.tok.clone();
        self.consume(TokenKind::Question)?;
        let then = self.parse_expr()?;
        self.consume(TokenKind::Colon)?;
        let els = self.parse_conditional_expr()?;
        self.sema.ternary_expr(cond, then, els, &q_tok)
    }

    fn parse_log_or_expr(&mut self) -> DiagResult<AstNode> {
        let mut left = self.parse_log_and_expr()?;
        while self.at(TokenKind::PipePipe) {
            let op_tok = self.tok.clone();
            self.advance()?;
            let right = self.parse_log_and_expr()?;
            left = self
                .sema
                .binary_expr(left, right, BinaryOp::LogicalOr, &op_tok)?;
        }
        Ok(left)
    }

    fn parse_log_and_expr(&mut self) -> DiagResult<AstNode> {
        let mut left = self.parse_bit_or_expr()?;
        while self.at(TokenKind::AmpAmp) {
            let op_tok = self.tok.clone();
            self.advance()?;
            let right = self.parse_bit_or_expr()?;
            left = self
                .sema
                .binary_expr(left, right, BinaryOp::LogicalAnd, &op_tok)?;
        }
        Ok(left)
    }

    fn parse_bit_or_expr(&mut self) -> DiagResult<AstNode> {
        let mut left = self.parse_bit_xor_expr()?;
        while self.at(TokenKind::Pipe) {
            let op_tok = self.tok.clone();
            self.advance()?;
            let right = self.parse_bit_xor_expr()?;
            left = self
                .sema
                .binary_expr(left, right, BinaryOp::BitwiseOr, &op_tok)?;
        }
        Ok(left)
    }

    fn parse_bit_xor_expr(&mut self) -> DiagResult<AstNode> {
        let mut left = self.parse_bit_and_expr()?;
        while self.at(TokenKind::Caret) {
            let op_tok = self.tok.clone();
            self.advance()?;
            let right = self.parse_bit_and_expr()?;
            left = self
                .sema
                .binary_expr(left, right, BinaryOp::BitwiseXor, &op_tok)?;
        }
        Ok(left)
    }

    fn parse_bit_and_expr(&mut self) -> DiagResult<AstNode> {
        let mut left = self.parse_equal_expr()?;
        while self.at(TokenKind::Amp) {
            let op_tok = self.tok.clone();
            self.advance()?;
            let right = self.parse_equal_expr()?;
            left = self
                .sema
                .binary_expr(left, right, BinaryOp::BitwiseAnd, &op_tok)?;
        }
        Ok(left)
    }

    fn parse_equal_expr(&mut self) -> DiagResult<AstNode> {
        let mut left = self.parse_relational_expr()?;
        while self.at(TokenKind::EqualEqual) || self.at(TokenKind::NotEqual) {
            let op_tok = self.tok.clone();
            let op = if self.at(TokenKind::EqualEqual) {
                BinaryOp::Equal
            } else {
                BinaryOp::NotEqual
            };
            self.advance()?;
            let right = self.parse_relational_expr()?;
            left = self.sema.binary_expr(left, right, op, &op_tok)?;
        }
        Ok(left)
    }

    fn parse_relational_expr(&mut self) -> DiagResult<AstNode> {
        let mut left = self.parse_shift_expr()?;
        loop {
            let op = match self.tok.kind {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                _ => break,
            };
            let op_tok = self.tok.clone();
            self.advance()?;
            let right = self.parse_shift_expr()?;
            left = self.sema.binary_expr(left, right, op, &op_tok)?;
        }
        Ok(left)
    }

    fn parse_shift_expr(&mut self) -> DiagResult<AstNode> {
        let mut left = self.parse_add_expr()?;
        while self.at(TokenKind::LessLess) || self.at(TokenKind::GreaterGreater) {
            let op_tok = self.tok.clone();
            let op = if self.at(TokenKind::LessLess) {
                BinaryOp::LeftShift
            } else {
                BinaryOp::RightShift
            };
            self.advance()?;
            let right = self.parse_add_expr()?;
            left = self.sema.binary_expr(left, right, op, &op_tok)?;
        }
        Ok(left)
    }

    fn parse_add_expr(&mut self) -> DiagResult<AstNode> {
        let mut left = self.parse_mult_expr()?;
        while self.at(TokenKind::Plus) || self.at(TokenKind::Minus) {
            let op_tok = self.tok.clone();
            let op = if self.at(TokenKind::Plus) {
                BinaryOp::Add
            } else {
                BinaryOp::Sub
            };
            self.advance()?;
            let right = self.parse_mult_expr()?;
            left = self.sema.binary_expr(left, right, op, &op_tok)?;
        }
        Ok(left)
    }

    fn parse_mult_expr(&mut self) -> DiagResult<AstNode> {
        let mut left = self.parse_cast_expr()?;
        loop {
            let op = match self.tok.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let op_tok = self.tok.clone();
            self.advance()?;
            let right = self.parse_cast_expr()?;
            left = self.sema.binary_expr(left, right, op, &op_tok)?;
        }
        Ok(left)
    }

    /// `(type) expr` vs. a parenthesized expression: peek one token past the
    /// `(` and ask whether it starts a type name.
    fn parse_cast_expr(&mut self) -> DiagResult<AstNode> {
        if !self.at(TokenKind::LParen) {
            return self.parse_unary_expr();
        }
        self.lexer.save_state();
        let peeked = self.lexer.next_token()?;
        let is_type = self.is_type_start(&peeked)?;
        self.lexer.restore_state();

        if !is_type {
            return self.parse_unary_expr();
        }
        let cast_tok = self.tok.clone();
        self.consume(TokenKind::LParen)?;
        let ty = self.parse_type_name()?;
        self.consume(TokenKind::RParen)?;
        let operand = self.parse_cast_expr()?;
        Ok(self.sema.cast_expr(ty, operand, &cast_tok))
    }

    fn is_unary_start(&self) -> bool {
        matches!(
            self.tok.kind,
            TokenKind::PlusPlus
                | TokenKind::MinusMinus
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Amp
                | TokenKind::Exclaim
                | TokenKind::Tilde
                | TokenKind::KwSizeof
        )
    }

    fn parse_unary_expr(&mut self) -> DiagResult<AstNode> {
        if !self.is_unary_start() {
            return self.parse_postfix_expr();
        }

        if self.at(TokenKind::KwSizeof) {
            return self.parse_sizeof_expr();
        }

        let op = match self.tok.kind {
            TokenKind::Plus => UnaryOp::Positive,
            TokenKind::Minus => UnaryOp::Negative,
            TokenKind::Star => UnaryOp::Deref,
            TokenKind::Amp => UnaryOp::Addr,
            TokenKind::PlusPlus => UnaryOp::Inc,
            TokenKind::MinusMinus => UnaryOp::Dec,
            TokenKind::Exclaim => UnaryOp::LogicalNot,
            TokenKind::Tilde => UnaryOp::BitwiseNot,
            _ => unreachable!("unary operator expected"),
        };
        let op_tok = self.tok.clone();
        self.advance()?;
        let operand = self.parse_unary_expr()?;
        self.sema.unary_expr(operand, op, &op_tok)
    }

    /// `sizeof(type)` vs. `sizeof expr` — another one-token peek behind `(`.
    fn parse_sizeof_expr(&mut self) -> DiagResult<AstNode> {
        let sizeof_tok = self.tok.clone();
        self.consume(TokenKind::KwSizeof)?;

        let mut is_type = false;
        if self.at(TokenKind::LParen) {
            self.lexer.save_state();
            let peeked = self.lexer.next_token()?;
            is_type = self.is_type_start(&peeked)?;
            self.lexer.restore_state();
        }

        if is_type {
            self.consume(TokenKind::LParen)?;
            let ty = self.parse_type_name()?;
            self.consume(TokenKind::RParen)?;
            Ok(self.sema.sizeof_expr(None, Some(ty), &sizeof_tok))
        } else {
            let operand = self.parse_unary_expr()?;
            Ok(self.sema.sizeof_expr(Some(operand), None, &sizeof_tok))
        }
    }

    /// Abstract type name, e.g. `sizeof(int *[5][6])`.
    fn parse_type_name(&mut self) -> DiagResult<Type> {
        let (mut base, _) = self.parse_decl_spec()?;
        while self.at(TokenKind::Star) {
            self.consume(TokenKind::Star)?;
            base = Type::pointer_to(base);
        }
        let iden = self.tok.clone();
        self.direct_declarator_suffix(&iden, base, false)
    }

    fn parse_postfix_expr(&mut self) -> DiagResult<AstNode> {
        let mut left = self.parse_primary_expr()?;
        loop {
            match self.tok.kind {
                TokenKind::PlusPlus => {
                    let tok = self.tok.clone();
                    left = self.sema.post_inc(left, &tok)?;
                    self.consume(TokenKind::PlusPlus)?;
                }
                TokenKind::MinusMinus => {
                    let tok = self.tok.clone();
                    left = self.sema.post_dec(left, &tok)?;
                    self.consume(TokenKind::MinusMinus)?;
                }
                TokenKind::LBracket => {
                    let tok = self.tok.clone();
                    self.consume(TokenKind::LBracket)?;
                    let index = self.parse_expr()?;
                    self.consume(TokenKind::RBracket)?;
                    left = self.sema.subscript(left, index, &tok)?;
                }
                TokenKind::Dot => {
                    let dot = self.tok.clone();
                    self.consume(TokenKind::Dot)?;
                    let iden = self.tok.clone();
                    self.consume(TokenKind::Identifier)?;
                    left = self.sema.member_dot(left, &iden, &dot)?;
                }
                TokenKind::Arrow => {
                    let arrow = self.tok.clone();
                    self.consume(TokenKind::Arrow)?;
                    let iden = self.tok.clone();
                    self.consume(TokenKind::Identifier)?;
                    left = self.sema.member_arrow(left, &iden, &arrow)?;
                }
                TokenKind::LParen => {
                    self.consume(TokenKind::LParen)?;
                    let mut args = Vec::new();
                    let mut i = 0;
                    while !self.at(TokenKind::RParen) {
                        if i > 0 && self.at(TokenKind::Comma) {
                            self.consume(TokenKind::Comma)?;
                        }
                        args.push(self.parse_assign_expr()?);
                        i += 1;
                    }
                    self.consume(TokenKind::RParen)?;
                    left = self.sema.func_call(left, args)?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_primary_expr(&mut self) -> DiagResult<AstNode> {
        match self.tok.kind {
            TokenKind::LParen => {
                self.advance()?;
                let expr = self.parse_expr()?;
                self.consume(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Identifier => {
                let tok = self.tok.clone();
                let expr = self.sema.variable_access(&tok)?;
                self.advance()?;
                Ok(expr)
            }
            TokenKind::Str => {
                let tok = self.tok.clone();
                let ty = tok.ty.clone().unwrap_or(Type::pointer_to(Type::Char));
                let expr = self.sema.string_expr(&tok, ty);
                self.consume(TokenKind::Str)?;
                Ok(expr)
            }
            _ => {
                self.expect(TokenKind::Number)?;
                let tok = self.tok.clone();
                let ty = tok.ty.clone().unwrap_or(Type::Int);
                let expr = self.sema.number_expr(&tok, ty);
                self.advance()?;
                Ok(expr)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> DiagResult<Program> {
        let lexer = Lexer::new(src, "test.c");
        let mut parser = Parser::new(lexer, Sema::new())?;
        parser.parse_program()
    }

    fn first_decl_type(src: &str) -> Type {
        let program = parse(src).unwrap();
        match &program.ext_decls[0].kind {
            NodeKind::Decl { items } => items[0].ty.clone(),
            NodeKind::FuncDecl { .. } => program.ext_decls[0].ty.clone(),
            other => panic!("expected declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_simple_declarations() {
        assert_eq!(first_decl_type("int a;"), Type::Int);
        assert_eq!(first_decl_type("unsigned long long x;"), Type::ULongLong);
        assert_eq!(first_decl_type("short int s;"), Type::Short);
        assert_eq!(first_decl_type("long double d;"), Type::LongDouble);
        assert_eq!(first_decl_type("int *p;"), Type::pointer_to(Type::Int));
    }

    #[test]
    fn test_illegal_specifier_combinations() {
        for src in [
            "short double d;",
            "unsigned void v;",
            "static extern int x;",
            "typedef static int t;",
            "long float f;",
        ] {
            let err = parse(src).unwrap_err();
            assert_eq!(err.kind, DiagKind::Type, "src: {}", src);
        }
    }

    #[test]
    fn test_array_declarator_right_associativity() {
        // int a[3][5] is array(3, array(5, int))
        let ty = first_decl_type("int a[3][5];");
        assert_eq!(ty.array_len(), Some(3));
        let inner = ty.array_elem().unwrap();
        assert_eq!(inner.array_len(), Some(5));
        assert_eq!(inner.array_elem().unwrap(), Type::Int);
    }

    #[test]
    fn test_paren_declarators() {
        // pointer to array of 3 int
        let ty = first_decl_type("int (*p)[3];");
        let pointee = ty.pointee().unwrap();
        assert_eq!(pointee.array_len(), Some(3));
        assert_eq!(pointee.array_elem().unwrap(), Type::Int);

        // array of 3 pointer to int
        let ty = first_decl_type("int *p[3];");
        assert_eq!(ty.array_len(), Some(3));
        assert_eq!(ty.array_elem().unwrap(), Type::pointer_to(Type::Int));
    }

    #[test]
    fn test_function_pointer_declarator() {
        let ty = first_decl_type("int (*f)(int a);");
        let func = ty.pointee().unwrap().as_func().unwrap();
        assert_eq!(func.ret, Type::Int);
        assert_eq!(func.params.len(), 1);
        assert_eq!(func.params[0].ty, Type::Int);
    }

    #[test]
    fn test_nested_paren_declarator() {
        // pointer to array of 2 pointers to int
        let ty = first_decl_type("int *(*p)[2];");
        let arr = ty.pointee().unwrap();
        assert_eq!(arr.array_len(), Some(2));
        assert_eq!(arr.array_elem().unwrap(), Type::pointer_to(Type::Int));
    }

    #[test]
    fn test_array_size_bounds() {
        assert!(parse("int a[3];").is_ok());
        let err = parse("int a[0];").unwrap_err();
        assert_eq!(err.kind, DiagKind::ArrSize);
        let err = parse("int a[-1];").unwrap_err();
        assert_eq!(err.kind, DiagKind::ArrSize);
        // Constant expressions fold.
        let ty = first_decl_type("int a[2 + 3];");
        assert_eq!(ty.array_len(), Some(5));
    }

    #[test]
    fn test_inner_flexible_dimension_rejected() {
        assert!(parse("int main() { int a[2][]; return 0; }").is_err());
    }

    #[test]
    fn test_flexible_array_from_braces() {
        let ty = first_decl_type("int a[] = {1, 2, 3};");
        assert_eq!(ty.array_len(), Some(3));
    }

    #[test]
    fn test_string_initializer_lengths() {
        // char s[] = "hi" finalizes to char[3] including the NUL.
        let ty = first_decl_type("char s[] = \"hi\";");
        assert_eq!(ty.array_len(), Some(3));
        // Oversized initializer is rejected.
        let err = parse("char s[2] = \"abc\";").unwrap_err();
        assert_eq!(err.kind, DiagKind::LargeLength);
    }

    #[test]
    fn test_initializer_flattening_paths() {
        let program = parse("int a[2][2] = {{1, 2}, {3, 4}};").unwrap();
        let NodeKind::Decl { items } = &program.ext_decls[0].kind else {
            panic!("expected decl");
        };
        let NodeKind::VariableDecl { init, .. } = &items[0].kind else {
            panic!("expected variable decl");
        };
        let paths: Vec<Vec<i64>> = init.iter().map(|iv| iv.path.clone()).collect();
        assert_eq!(
            paths,
            vec![vec![0, 0, 0], vec![0, 0, 1], vec![0, 1, 0], vec![0, 1, 1]]
        );
    }

    #[test]
    fn test_struct_and_union_decls() {
        let ty = first_decl_type("struct P { int x; int y; } p;");
        let rec = ty.as_record().unwrap();
        assert_eq!(rec.borrow().members.len(), 2);
        assert_eq!(rec.borrow().size, 8);

        let ty = first_decl_type("union U { char c; long l; } u;");
        let rec = ty.as_record().unwrap();
        assert_eq!(rec.borrow().dominant, 1);
    }

    #[test]
    fn test_record_redeclaration_rules() {
        // Redeclaring an incomplete tag and completing it are both fine.
        assert!(parse("struct S; struct S; struct S { int x; };").is_ok());
        // A second body is rejected.
        let err = parse("struct S { int x; }; struct S { int y; };").unwrap_err();
        assert_eq!(err.kind, DiagKind::Redefined);
    }

    #[test]
    fn test_anonymous_record() {
        let ty = first_decl_type("struct { int a; int b; } x;");
        let rec = ty.as_record().unwrap();
        assert!(rec.borrow().name.starts_with("__anony_struct_"));
    }

    #[test]
    fn test_typedef_disambiguation() {
        // `t` only parses as a declaration start because of the typedef.
        let program = parse("typedef int t; t x; int main() { t y; y = 1; return y; }");
        assert!(program.is_ok());
    }

    #[test]
    fn test_typedef_of_pointer_and_array() {
        let program = parse("typedef int *ip; ip p; typedef int arr[4]; arr a;").unwrap();
        // Both declarations should exist with the aliased types.
        let NodeKind::Decl { items } = &program.ext_decls[0].kind else {
            panic!("expected decl");
        };
        assert_eq!(items[0].ty, Type::pointer_to(Type::Int));
        let NodeKind::Decl { items } = &program.ext_decls[1].kind else {
            panic!("expected decl");
        };
        assert_eq!(items[0].ty.array_len(), Some(4));
    }

    #[test]
    fn test_function_declarations() {
        // Declaration then definition: accepted.
        assert!(parse("int f(int a); int f(int a) { return a; }").is_ok());
        // Two declarations: accepted.
        assert!(parse("int f(int a); int f(int a);").is_ok());
        // Two definitions: rejected.
        let err = parse("int f() { return 1; } int f() { return 2; }").unwrap_err();
        assert_eq!(err.kind, DiagKind::Redefined);
    }

    #[test]
    fn test_variadic_function_decl() {
        let ty = first_decl_type("int printf(char *fmt, ...);");
        let func = ty.as_func().unwrap();
        assert!(func.variadic);
        assert_eq!(func.params.len(), 1);
    }

    #[test]
    fn test_break_continue_outside_loop() {
        let err = parse("int main() { break; return 0; }").unwrap_err();
        assert_eq!(err.kind, DiagKind::BreakStmt);
        let err = parse("int main() { continue; return 0; }").unwrap_err();
        assert_eq!(err.kind, DiagKind::ContinueStmt);
    }

    #[test]
    fn test_break_targets_innermost() {
        let program = parse(
            "int main() { for (;;) { while (1) { break; } continue; } return 0; }",
        )
        .unwrap();
        // Walk to the statements and compare loop ids.
        let NodeKind::FuncDecl { body: Some(body) } = &program.ext_decls[0].kind else {
            panic!("expected function with body");
        };
        let NodeKind::Block { items } = &body.kind else {
            panic!()
        };
        let NodeKind::For {
            id: outer_id,
            body: Some(for_body),
            ..
        } = &items[0].kind
        else {
            panic!("expected for");
        };
        let NodeKind::Block { items } = &for_body.kind else {
            panic!()
        };
        let NodeKind::For {
            id: inner_id,
            body: Some(while_body),
            ..
        } = &items[0].kind
        else {
            panic!("expected while-as-for");
        };
        let NodeKind::Block { items: wb } = &while_body.kind else {
            panic!()
        };
        let NodeKind::Break { target } = &wb[0].kind else {
            panic!("expected break");
        };
        assert_eq!(target, inner_id);
        let NodeKind::Continue { target } = &items[1].kind else {
            panic!("expected continue");
        };
        assert_eq!(target, outer_id);
    }

    #[test]
    fn test_switch_rules() {
        // Non-integer switch expression.
        let err = parse("int main() { double d = 1.0; switch (d) {} return 0; }").unwrap_err();
        assert_eq!(err.kind, DiagKind::Expected);
        // Case outside switch.
        let err = parse("int main() { case 1:; return 0; }").unwrap_err();
        assert_eq!(err.kind, DiagKind::CaseStmt);
        // Multiple defaults.
        let err =
            parse("int main() { switch (1) { default: break; default: break; } return 0; }")
                .unwrap_err();
        assert_eq!(err.kind, DiagKind::MultiDefaultStmt);
        // Case labels must be integer constants.
        let err = parse("int main() { switch (1) { case 1.5: break; } return 0; }").unwrap_err();
        assert_eq!(err.kind, DiagKind::IntConstantExpr);
    }

    #[test]
    fn test_switch_case_values_fold() {
        let program =
            parse("int main() { switch (1) { case 'A' + 1: break; } return 0; }").unwrap();
        let NodeKind::FuncDecl { body: Some(body) } = &program.ext_decls[0].kind else {
            panic!()
        };
        let NodeKind::Block { items } = &body.kind else {
            panic!()
        };
        let NodeKind::Switch { body, has_default, .. } = &items[0].kind else {
            panic!("expected switch");
        };
        assert!(!*has_default);
        let NodeKind::Block { items } = &body.kind else {
            panic!()
        };
        let NodeKind::Case { value, .. } = &items[0].kind else {
            panic!("expected case");
        };
        assert_eq!(*value, 66);
    }

    #[test]
    fn test_expression_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let program = parse("int x = 1 + 2 * 3;").unwrap();
        let NodeKind::Decl { items } = &program.ext_decls[0].kind else {
            panic!()
        };
        let NodeKind::VariableDecl { init, .. } = &items[0].kind else {
            panic!()
        };
        let NodeKind::Binary { op, rhs, .. } = &init[0].value.kind else {
            panic!("expected binary init");
        };
        assert_eq!(*op, BinaryOp::Add);
        let NodeKind::Binary { op: inner, .. } = &rhs.kind else {
            panic!("expected nested multiply");
        };
        assert_eq!(*inner, BinaryOp::Mul);
    }

    #[test]
    fn test_cast_vs_paren_expr() {
        // (long)x is a cast; (x) is not.
        assert!(parse("int main() { int x = 1; long y = (long)x; return 0; }").is_ok());
        assert!(parse("int main() { int x = 1; int y = (x); return y; }").is_ok());
    }

    #[test]
    fn test_sizeof_forms() {
        let program = parse("int a = sizeof(int); int main() { int x; int b = sizeof x; return b; }");
        assert!(program.is_ok());
    }

    #[test]
    fn test_undefined_variable() {
        let err = parse("int main() { return nope; }").unwrap_err();
        assert_eq!(err.kind, DiagKind::Undefined);
    }

    #[test]
    fn test_struct_tag_and_variable_namespaces() {
        assert!(parse("struct foo { int x; }; int foo; struct foo f;").is_ok());
    }

    #[test]
    fn test_ternary_and_comma() {
        assert!(parse("int main() { int a = 1, b = 2; int c = a ? b : 3; return c, a; }").is_ok());
    }

    #[test]
    fn test_ternary_condition_must_be_scalar() {
        let err = parse("struct S { int x; }; int main() { struct S s; return s ? 1 : 2; }")
            .unwrap_err();
        assert_eq!(err.kind, DiagKind::ExpectedType);
    }

    #[test]
    fn test_global_and_local_shadowing() {
        assert!(parse("int x = 1; int main() { int x = 2; { int x = 3; } return x; }").is_ok());
    }
}
