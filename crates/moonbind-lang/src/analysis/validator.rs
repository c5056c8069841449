//! Structural validation of a parsed chunk:
//! - `break` only inside `while`, `repeat` or `for`
//! - `...` only inside a function declared with `...`

use crate::syntax::ast::*;
use crate::error::{Error, ErrorCode};

pub struct Validator {
    loop_depth: usize,
    in_vararg: bool,
    errors: Vec<Error>,
}

impl Validator {
    pub fn new() -> Self {
        Self { loop_depth: 0, in_vararg: false, errors: Vec::new() }
    }

    pub fn validate(mut self, chunk: &Chunk) -> Vec<Error> {
        self.in_vararg = chunk.body.is_vararg;
        self.check_block(&chunk.body.body);
        self.errors
    }

    /// A function body starts a fresh loop context; `break` cannot cross it.
    fn check_function(&mut self, func: &FuncBody) {
        let saved = (self.loop_depth, self.in_vararg);
        self.loop_depth = 0;
        self.in_vararg = func.is_vararg;
        self.check_block(&func.body);
        (self.loop_depth, self.in_vararg) = saved;
    }

    fn check_loop_body(&mut self, body: &[Stmt]) {
        self.loop_depth += 1;
        self.check_block(body);
        self.loop_depth -= 1;
    }

    fn check_block(&mut self, stmts: &[Stmt]) {
        for s in stmts { self.check_stmt(s); }
    }

    // ── statements ────────────────────────────────────────────────────────────

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Local(l) => self.check_exprs(&l.values),
            Stmt::Assign(a) => {
                self.check_exprs(&a.targets);
                self.check_exprs(&a.values);
            }
            Stmt::Call(e) => self.check_expr(e),
            Stmt::Do(body, _) => self.check_block(body),
            Stmt::While(w) => {
                self.check_expr(&w.condition);
                self.check_loop_body(&w.body);
            }
            Stmt::Repeat(r) => {
                self.loop_depth += 1;
                self.check_block(&r.body);
                self.check_expr(&r.condition);
                self.loop_depth -= 1;
            }
            Stmt::If(i) => {
                for (cond, body) in &i.branches {
                    self.check_expr(cond);
                    self.check_block(body);
                }
                if let Some(e) = &i.else_block {
                    self.check_block(e);
                }
            }
            Stmt::NumericFor(f) => {
                self.check_expr(&f.start);
                self.check_expr(&f.limit);
                if let Some(step) = &f.step { self.check_expr(step); }
                self.check_loop_body(&f.body);
            }
            Stmt::GenericFor(f) => {
                self.check_exprs(&f.exprs);
                self.check_loop_body(&f.body);
            }
            Stmt::Function(f) => self.check_function(&f.func),
            Stmt::LocalFunction { func, .. } => self.check_function(func),
            Stmt::Return(values, _) => self.check_exprs(values),
            Stmt::Break(span) => {
                if self.loop_depth == 0 {
                    self.errors.push(Error::new(
                        ErrorCode::S001, span.line, span.column,
                        "`break` outside a loop",
                    ));
                }
            }
        }
    }

    // ── expressions ───────────────────────────────────────────────────────────

    fn check_exprs(&mut self, exprs: &[Expr]) {
        for e in exprs { self.check_expr(e); }
    }

    fn check_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Vararg(span) => {
                if !self.in_vararg {
                    self.errors.push(Error::new(
                        ErrorCode::S002, span.line, span.column,
                        "cannot use `...` outside a vararg function",
                    ));
                }
            }
            Expr::Index { expr, key, .. } => {
                self.check_expr(expr);
                self.check_expr(key);
            }
            Expr::Call { callee, args, .. } => {
                self.check_expr(callee);
                self.check_exprs(args);
            }
            Expr::MethodCall { expr, args, .. } => {
                self.check_expr(expr);
                self.check_exprs(args);
            }
            Expr::Function(f) => self.check_function(f),
            Expr::BinOp { left, right, .. } => {
                self.check_expr(left);
                self.check_expr(right);
            }
            Expr::UnOp { operand, .. } => self.check_expr(operand),
            Expr::Table(fields, _) => {
                for field in fields {
                    match field {
                        TableField::Positional(v) | TableField::Named(_, v) => self.check_expr(v),
                        TableField::Keyed(k, v) => {
                            self.check_expr(k);
                            self.check_expr(v);
                        }
                    }
                }
            }
            Expr::Paren(inner, _) => self.check_expr(inner),
            Expr::Nil(_) | Expr::Bool(..) | Expr::Integer(..) | Expr::Number(..)
            | Expr::Str(..) | Expr::Ident(..) => {}
        }
    }
}
