use std::rc::Rc;

use crate::syntax::ast::*;
use crate::error::{Error, ErrorCode};
use crate::syntax::token::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse(mut self) -> Result<Chunk, Vec<Error>> {
        let mut errors = Vec::new();
        let mut body = Vec::new();
        let span = self.span();

        while !self.is_at_end() {
            let pos_before = self.pos;

            match self.parse_stmt() {
                Ok(Some(stmt)) => {
                    let is_return = matches!(stmt, Stmt::Return(..));
                    body.push(stmt);
                    if is_return && !self.is_at_end() {
                        errors.push(self.unexpected("<eof> after 'return'"));
                        self.recover();
                    }
                }
                Ok(None) => {}
                Err(e) => { errors.push(e); self.recover(); }
            }

            // guarantee progress: if nothing was consumed, force-advance
            // to prevent an infinite loop on unrecognised tokens
            if self.pos == pos_before {
                self.advance();
            }
        }

        if errors.is_empty() {
            let main = FuncBody { name: Some("main chunk".into()), params: Vec::new(), is_vararg: true, body, span };
            Ok(Chunk { body: Rc::new(main) })
        } else {
            Err(errors)
        }
    }

    // ─── Blocks ──────────────────────────────────────────────────────────────

    /// Statements up to (not including) the next block terminator.
    fn parse_block(&mut self) -> Result<Vec<Stmt>, Error> {
        let mut stmts = Vec::new();
        while !self.peek_kind().is_block_end() {
            if let Some(stmt) = self.parse_stmt()? {
                let is_return = matches!(stmt, Stmt::Return(..));
                stmts.push(stmt);
                if is_return && !self.peek_kind().is_block_end() {
                    return Err(self.unexpected("end of block after 'return'"));
                }
            }
        }
        Ok(stmts)
    }

    // ─── Statements ──────────────────────────────────────────────────────────

    /// Returns `None` for an empty statement (`;`).
    fn parse_stmt(&mut self) -> Result<Option<Stmt>, Error> {
        let stmt = match self.peek_kind() {
            TokenKind::Semicolon => { self.advance(); return Ok(None); }
            TokenKind::Local    => self.parse_local()?,
            TokenKind::Function => self.parse_function_stmt()?,
            TokenKind::If       => self.parse_if()?,
            TokenKind::While    => self.parse_while()?,
            TokenKind::Repeat   => self.parse_repeat()?,
            TokenKind::For      => self.parse_for()?,
            TokenKind::Return   => self.parse_return()?,
            TokenKind::Do => {
                let span = self.span();
                self.advance();
                let body = self.parse_block()?;
                self.expect(TokenKind::End)?;
                Stmt::Do(body, span)
            }
            TokenKind::Break => {
                let span = self.span();
                self.advance();
                Stmt::Break(span)
            }
            _ => self.parse_expr_stmt()?,
        };
        Ok(Some(stmt))
    }

    fn parse_local(&mut self) -> Result<Stmt, Error> {
        let span = self.span();
        self.expect(TokenKind::Local)?;
        if self.matches(TokenKind::Function) {
            let name = self.expect_ident()?;
            let func = self.parse_func_body(Some(name.clone()), false)?;
            return Ok(Stmt::LocalFunction { name, func, span });
        }
        let mut names = vec![self.expect_ident()?];
        while self.matches(TokenKind::Comma) {
            names.push(self.expect_ident()?);
        }
        let values = if self.matches(TokenKind::Eq) {
            self.parse_expr_list()?
        } else {
            Vec::new()
        };
        Ok(Stmt::Local(LocalStmt { names, values, span }))
    }

    /// `function a.b.c:m(params) ... end`
    fn parse_function_stmt(&mut self) -> Result<Stmt, Error> {
        let span = self.span();
        self.expect(TokenKind::Function)?;
        let mut path = vec![self.expect_ident()?];
        while self.matches(TokenKind::Dot) {
            path.push(self.expect_ident()?);
        }
        let method = if self.matches(TokenKind::Colon) {
            Some(self.expect_ident()?)
        } else {
            None
        };
        let mut full_name = path.join(".");
        if let Some(m) = &method {
            full_name.push(':');
            full_name.push_str(m);
        }
        let func = self.parse_func_body(Some(full_name), method.is_some())?;
        Ok(Stmt::Function(FunctionStmt { path, method, func, span }))
    }

    /// Parameter list and body, from `(` through the closing `end`.
    fn parse_func_body(&mut self, name: Option<String>, is_method: bool) -> Result<Rc<FuncBody>, Error> {
        let span = self.span();
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if is_method {
            params.push("self".to_string());
        }
        let mut is_vararg = false;
        while !self.check(TokenKind::RParen) && !self.is_at_end() {
            if self.matches(TokenKind::Ellipsis) {
                is_vararg = true;
                break;
            }
            params.push(self.expect_ident()?);
            if !self.matches(TokenKind::Comma) { break; }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        self.expect(TokenKind::End)?;
        Ok(Rc::new(FuncBody { name, params, is_vararg, body, span }))
    }

    fn parse_if(&mut self) -> Result<Stmt, Error> {
        let span = self.span();
        self.expect(TokenKind::If)?;
        let mut branches = Vec::new();
        let condition = self.parse_expr()?;
        self.expect(TokenKind::Then)?;
        branches.push((condition, self.parse_block()?));

        let mut else_block = None;
        loop {
            if self.matches(TokenKind::ElseIf) {
                let condition = self.parse_expr()?;
                self.expect(TokenKind::Then)?;
                branches.push((condition, self.parse_block()?));
            } else if self.matches(TokenKind::Else) {
                else_block = Some(self.parse_block()?);
                self.expect(TokenKind::End)?;
                break;
            } else {
                self.expect(TokenKind::End)?;
                break;
            }
        }
        Ok(Stmt::If(IfStmt { branches, else_block, span }))
    }

    fn parse_while(&mut self) -> Result<Stmt, Error> {
        let span = self.span();
        self.expect(TokenKind::While)?;
        let condition = self.parse_expr()?;
        self.expect(TokenKind::Do)?;
        let body = self.parse_block()?;
        self.expect(TokenKind::End)?;
        Ok(Stmt::While(WhileStmt { condition, body, span }))
    }

    fn parse_repeat(&mut self) -> Result<Stmt, Error> {
        let span = self.span();
        self.expect(TokenKind::Repeat)?;
        let body = self.parse_block()?;
        self.expect(TokenKind::Until)?;
        let condition = self.parse_expr()?;
        Ok(Stmt::Repeat(RepeatStmt { body, condition, span }))
    }

    fn parse_for(&mut self) -> Result<Stmt, Error> {
        let span = self.span();
        self.expect(TokenKind::For)?;
        let first = self.expect_ident()?;

        if self.matches(TokenKind::Eq) {
            let start = self.parse_expr()?;
            self.expect(TokenKind::Comma)?;
            let limit = self.parse_expr()?;
            let step = if self.matches(TokenKind::Comma) { Some(self.parse_expr()?) } else { None };
            self.expect(TokenKind::Do)?;
            let body = self.parse_block()?;
            self.expect(TokenKind::End)?;
            return Ok(Stmt::NumericFor(NumericFor { var: first, start, limit, step, body, span }));
        }

        let mut names = vec![first];
        while self.matches(TokenKind::Comma) {
            names.push(self.expect_ident()?);
        }
        self.expect(TokenKind::In)?;
        let exprs = self.parse_expr_list()?;
        self.expect(TokenKind::Do)?;
        let body = self.parse_block()?;
        self.expect(TokenKind::End)?;
        Ok(Stmt::GenericFor(GenericFor { names, exprs, body, span }))
    }

    fn parse_return(&mut self) -> Result<Stmt, Error> {
        let span = self.span();
        self.expect(TokenKind::Return)?;
        let values = if self.peek_kind().is_block_end() || self.check(TokenKind::Semicolon) {
            Vec::new()
        } else {
            self.parse_expr_list()?
        };
        self.matches(TokenKind::Semicolon);
        Ok(Stmt::Return(values, span))
    }

    /// Assignment (`a, b.c = ...`) or a call statement.
    fn parse_expr_stmt(&mut self) -> Result<Stmt, Error> {
        let span = self.span();
        let first = self.parse_suffixed_expr()?;

        if self.check(TokenKind::Eq) || self.check(TokenKind::Comma) {
            let mut targets = vec![first];
            while self.matches(TokenKind::Comma) {
                targets.push(self.parse_suffixed_expr()?);
            }
            for target in &targets {
                if !matches!(target, Expr::Ident(..) | Expr::Index { .. }) {
                    let s = target.span();
                    return Err(Error::new(ErrorCode::P003, s.line, s.column,
                        "cannot assign to this expression"));
                }
            }
            self.expect(TokenKind::Eq)?;
            let values = self.parse_expr_list()?;
            return Ok(Stmt::Assign(Assign { targets, values, span }));
        }

        match first {
            Expr::Call { .. } | Expr::MethodCall { .. } => Ok(Stmt::Call(first)),
            _ => Err(Error::new(ErrorCode::P003, span.line, span.column,
                "syntax error: expected an assignment or a function call")),
        }
    }

    // ─── Expressions (precedence climbing) ───────────────────────────────────

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>, Error> {
        let mut exprs = vec![self.parse_expr()?];
        while self.matches(TokenKind::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn parse_expr(&mut self) -> Result<Expr, Error> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_and()?;
        while self.check(TokenKind::Or) {
            let span = left.span().clone();
            self.advance();
            let right = self.parse_and()?;
            left = Expr::BinOp { left: Box::new(left), op: BinOp::Or, right: Box::new(right), span };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_comparison()?;
        while self.check(TokenKind::And) {
            let span = left.span().clone();
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::BinOp { left: Box::new(left), op: BinOp::And, right: Box::new(right), span };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_concat()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq    => BinOp::Eq,
                TokenKind::TildeEq => BinOp::NotEq,
                TokenKind::Lt      => BinOp::Lt,
                TokenKind::LtEq    => BinOp::LtEq,
                TokenKind::Gt      => BinOp::Gt,
                TokenKind::GtEq    => BinOp::GtEq,
                _ => break,
            };
            let span = left.span().clone();
            self.advance();
            let right = self.parse_concat()?;
            left = Expr::BinOp { left: Box::new(left), op, right: Box::new(right), span };
        }
        Ok(left)
    }

    /// `..` is right-associative.
    fn parse_concat(&mut self) -> Result<Expr, Error> {
        let left = self.parse_addition()?;
        if self.check(TokenKind::DotDot) {
            let span = left.span().clone();
            self.advance();
            let right = self.parse_concat()?;
            return Ok(Expr::BinOp { left: Box::new(left), op: BinOp::Concat, right: Box::new(right), span });
        }
        Ok(left)
    }

    fn parse_addition(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_multiplication()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus  => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let span = left.span().clone();
            self.advance();
            let right = self.parse_multiplication()?;
            left = Expr::BinOp { left: Box::new(left), op, right: Box::new(right), span };
        }
        Ok(left)
    }

    fn parse_multiplication(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star       => BinOp::Mul,
                TokenKind::Slash      => BinOp::Div,
                TokenKind::SlashSlash => BinOp::IDiv,
                TokenKind::Percent    => BinOp::Mod,
                _ => break,
            };
            let span = left.span().clone();
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinOp { left: Box::new(left), op, right: Box::new(right), span };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        let span = self.span();
        let op = match self.peek_kind() {
            TokenKind::Minus => UnOp::Neg,
            TokenKind::Not   => UnOp::Not,
            TokenKind::Hash  => UnOp::Len,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::UnOp { op, operand: Box::new(operand), span })
    }

    /// `^` binds tighter than unary operators on its left and is
    /// right-associative: `-2^2` is `-(2^2)`, `2^-1` is allowed.
    fn parse_power(&mut self) -> Result<Expr, Error> {
        let base = self.parse_simple_expr()?;
        if self.check(TokenKind::Caret) {
            let span = base.span().clone();
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expr::BinOp { left: Box::new(base), op: BinOp::Pow, right: Box::new(exponent), span });
        }
        Ok(base)
    }

    fn parse_simple_expr(&mut self) -> Result<Expr, Error> {
        let tok = self.peek().clone();
        let span = Span::new(tok.line, tok.column);

        match tok.kind {
            TokenKind::Nil        => { self.advance(); Ok(Expr::Nil(span)) }
            TokenKind::True       => { self.advance(); Ok(Expr::Bool(true, span)) }
            TokenKind::False      => { self.advance(); Ok(Expr::Bool(false, span)) }
            TokenKind::Integer(n) => { self.advance(); Ok(Expr::Integer(n, span)) }
            TokenKind::Number(n)  => { self.advance(); Ok(Expr::Number(n, span)) }
            TokenKind::Str(s)     => { self.advance(); Ok(Expr::Str(s, span)) }
            TokenKind::Ellipsis   => { self.advance(); Ok(Expr::Vararg(span)) }
            TokenKind::Function   => {
                self.advance();
                Ok(Expr::Function(self.parse_func_body(None, false)?))
            }
            TokenKind::LBrace     => self.parse_table(),
            _ => self.parse_suffixed_expr(),
        }
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, Error> {
        let tok = self.peek().clone();
        let span = Span::new(tok.line, tok.column);
        match tok.kind {
            TokenKind::Ident(name) => { self.advance(); Ok(Expr::Ident(name, span)) }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Paren(Box::new(expr), span))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// Primary expression followed by any chain of `.name`, `[key]`,
    /// `:method(args)` and call suffixes.
    fn parse_suffixed_expr(&mut self) -> Result<Expr, Error> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            let span = expr.span().clone();
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let key_span = self.span();
                    let name = self.expect_ident()?;
                    expr = Expr::Index { expr: Box::new(expr), key: Box::new(Expr::Str(name, key_span)), span };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::Index { expr: Box::new(expr), key: Box::new(key), span };
                }
                TokenKind::Colon => {
                    self.advance();
                    let method = self.expect_ident()?;
                    let args = self.parse_call_args()?;
                    expr = Expr::MethodCall { expr: Box::new(expr), method, args, span };
                }
                TokenKind::LParen | TokenKind::LBrace | TokenKind::Str(_) => {
                    let args = self.parse_call_args()?;
                    expr = Expr::Call { callee: Box::new(expr), args, span };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    // ─── Argument lists ──────────────────────────────────────────────────────

    /// `(a, b)`, a single table constructor, or a single string literal.
    fn parse_call_args(&mut self) -> Result<Vec<Expr>, Error> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Str(s) => {
                self.advance();
                Ok(vec![Expr::Str(s, Span::new(tok.line, tok.column))])
            }
            TokenKind::LBrace => Ok(vec![self.parse_table()?]),
            _ => {
                self.expect(TokenKind::LParen)?;
                let args = if self.check(TokenKind::RParen) { Vec::new() } else { self.parse_expr_list()? };
                self.expect(TokenKind::RParen)?;
                Ok(args)
            }
        }
    }

    fn parse_table(&mut self) -> Result<Expr, Error> {
        let span = self.span();
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let field = match self.peek_kind() {
                TokenKind::LBracket => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    self.expect(TokenKind::Eq)?;
                    TableField::Keyed(key, self.parse_expr()?)
                }
                TokenKind::Ident(name) if self.peek_next_is(TokenKind::Eq) => {
                    self.advance();
                    self.advance();
                    TableField::Named(name, self.parse_expr()?)
                }
                _ => TableField::Positional(self.parse_expr()?),
            };
            fields.push(field);
            if !self.matches(TokenKind::Comma) && !self.matches(TokenKind::Semicolon) { break; }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Expr::Table(fields, span))
    }

    // ─── Token primitives ────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> TokenKind {
        self.tokens[self.pos].kind.clone()
    }

    fn peek_next_is(&self, kind: TokenKind) -> bool {
        self.tokens.get(self.pos + 1).is_some_and(|t| t.kind == kind)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() { self.pos += 1; }
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.tokens[self.pos].kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) { self.advance(); true } else { false }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, Error> {
        if self.check(kind.clone()) {
            Ok(self.advance())
        } else {
            let tok = self.peek();
            Err(Error::new(
                ErrorCode::P002,
                tok.line,
                tok.column,
                format!("expected {}, found {}", kind.describe(), tok.kind.describe()),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<String, Error> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Ident(s) => { self.advance(); Ok(s) }
            _ => Err(self.error_at(&tok, &format!("expected identifier, found {}", tok.kind.describe()))),
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.tokens[self.pos].kind, TokenKind::Eof)
    }

    fn span(&self) -> Span {
        let tok = self.peek();
        Span::new(tok.line, tok.column)
    }

    fn unexpected(&self, expected: &str) -> Error {
        let tok = self.peek();
        Error::new(
            ErrorCode::P001,
            tok.line,
            tok.column,
            format!("expected {}, found {}", expected, tok.kind.describe()),
        )
    }

    fn error_at(&self, tok: &Token, msg: &str) -> Error {
        Error::new(ErrorCode::P001, tok.line, tok.column, msg)
    }

    /// Skip tokens until something that looks like the start of a new
    /// statement. Used after a parse error to attempt recovery.
    fn recover(&mut self) {
        loop {
            match self.peek_kind() {
                TokenKind::Eof
                | TokenKind::Local
                | TokenKind::Function
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Repeat
                | TokenKind::Do
                | TokenKind::Return
                | TokenKind::End => break,
                _ => { self.advance(); }
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
