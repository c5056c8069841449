//! Tree-walking interpreter. Evaluates a validated chunk against a Context.
//! Userdata indexing and assignment are routed through the type hooks the
//! context holds; the interpreter itself knows nothing about native types.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::error::RuntimeError;
use crate::runtime::context::Context;
use crate::runtime::value::{float_to_integer, format_number, Closure, Function, Table, Value};
use crate::syntax::ast::{self, BinOp, Chunk, Expr, FuncBody, Stmt, TableField, UnOp};

/// Remaining native stack that triggers growth before a script call or a
/// nested evaluation.
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each new stack segment.
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

// ─── Scopes ──────────────────────────────────────────────────────────────────

/// One `local` statement's bindings, linked to the enclosing scope. Closures
/// capture the node current at their creation, so later `local`s in the same
/// block are invisible to them.
pub struct Scope {
    names: Vec<Rc<str>>,
    values: RefCell<Vec<Value>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    fn root() -> Rc<Scope> {
        Rc::new(Scope { names: Vec::new(), values: RefCell::new(Vec::new()), parent: None })
    }

    fn bind(parent: &Rc<Scope>, names: Vec<Rc<str>>, values: Vec<Value>) -> Rc<Scope> {
        Rc::new(Scope { names, values: RefCell::new(values), parent: Some(parent.clone()) })
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        let mut node = self;
        loop {
            if let Some(i) = node.names.iter().rposition(|n| &**n == name) {
                return Some(node.values.borrow()[i].clone());
            }
            node = node.parent.as_deref()?;
        }
    }

    /// Returns `false` if no local named `name` is in scope.
    fn assign(&self, name: &str, value: Value) -> bool {
        let mut node = self;
        loop {
            if let Some(i) = node.names.iter().rposition(|n| &**n == name) {
                node.values.borrow_mut()[i] = value;
                return true;
            }
            match node.parent.as_deref() {
                Some(p) => node = p,
                None => return false,
            }
        }
    }
}

// ─── Control flow ────────────────────────────────────────────────────────────

enum Flow {
    Normal,
    Break,
    Return(Vec<Value>),
}

// ─── Interpreter ─────────────────────────────────────────────────────────────

pub struct Interpreter<'a> {
    ctx: &'a mut Context,
    /// Extra arguments of each active vararg function, innermost last.
    varargs: Vec<Rc<[Value]>>,
}

impl<'a> Interpreter<'a> {
    pub fn new(ctx: &'a mut Context) -> Self {
        Self { ctx, varargs: Vec::new() }
    }

    fn err(&self, line: usize, msg: impl Into<String>) -> RuntimeError {
        RuntimeError::new(line, msg)
    }

    // ─── Entry points ────────────────────────────────────────────────────────

    pub fn run_chunk(&mut self, chunk: &Chunk) -> Result<Vec<Value>, RuntimeError> {
        let main = Closure { body: chunk.body.clone(), scope: Scope::root() };
        self.call_closure(&main, Vec::new())
    }

    /// Call any function value; `line` is attached to errors raised inside
    /// native code.
    pub fn call_value(&mut self, f: &Value, args: Vec<Value>, line: usize) -> Result<Vec<Value>, RuntimeError> {
        let Value::Function(func) = f else {
            return Err(self.err(line, format!("attempt to call a {} value", f.type_name())));
        };
        self.ctx.enter_call().map_err(|e| e.at_line(line))?;
        let result = match func {
            Function::Native(native) => {
                trace!(function = native.name(), argc = args.len(), "native call");
                self.ctx.call_native(native, args)
            }
            Function::Script(closure) => self.call_closure(closure, args),
        };
        self.ctx.leave_call();
        result.map_err(|e| e.at_line(line))
    }

    /// Script calls run on a grown stack segment when the native stack is
    /// low, so deep recursion ends in the call-depth error rather than a
    /// native overflow.
    fn call_closure(&mut self, closure: &Closure, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.call_closure_inner(closure, args))
    }

    fn call_closure_inner(&mut self, closure: &Closure, mut args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
        let body = closure.body.clone();
        let nparams = body.params.len();
        let extra: Rc<[Value]> = if args.len() > nparams {
            args.split_off(nparams).into()
        } else {
            Rc::from(Vec::new())
        };
        args.resize(nparams, Value::Nil);
        let names = body.params.iter().map(|p| Rc::from(p.as_str())).collect();
        let scope = Scope::bind(&closure.scope, names, args);

        if body.is_vararg {
            self.varargs.push(extra);
        }
        let flow = self.exec_block(&body.body, &scope);
        if body.is_vararg {
            self.varargs.pop();
        }

        match flow? {
            Flow::Return(values) => Ok(values),
            Flow::Normal | Flow::Break => Ok(Vec::new()),
        }
    }

    fn make_closure(&self, body: &Rc<FuncBody>, scope: &Rc<Scope>) -> Value {
        Value::Function(Function::Script(Rc::new(Closure { body: body.clone(), scope: scope.clone() })))
    }

    // ─── Statements ──────────────────────────────────────────────────────────

    fn exec_block(&mut self, stmts: &[Stmt], scope: &Rc<Scope>) -> Result<Flow, RuntimeError> {
        self.exec_block_scoped(stmts, scope).map(|(flow, _)| flow)
    }

    /// Also returns the innermost scope, for `repeat ... until` conditions
    /// that see the body's locals.
    fn exec_block_scoped(&mut self, stmts: &[Stmt], scope: &Rc<Scope>) -> Result<(Flow, Rc<Scope>), RuntimeError> {
        let mut scope = scope.clone();
        for stmt in stmts {
            match self.exec_stmt(stmt, &mut scope)? {
                Flow::Normal => {}
                flow => return Ok((flow, scope)),
            }
        }
        Ok((Flow::Normal, scope))
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &mut Rc<Scope>) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Local(l) => {
                let values = self.eval_adjusted(&l.values, scope, l.names.len())?;
                let names = l.names.iter().map(|n| Rc::from(n.as_str())).collect();
                *scope = Scope::bind(scope, names, values);
                Ok(Flow::Normal)
            }

            Stmt::LocalFunction { name, func, .. } => {
                // bound before the body closes over it, so it can recurse
                *scope = Scope::bind(scope, vec![Rc::from(name.as_str())], vec![Value::Nil]);
                let f = self.make_closure(func, scope);
                scope.assign(name, f);
                Ok(Flow::Normal)
            }

            Stmt::Assign(a) => {
                let values = self.eval_adjusted(&a.values, scope, a.targets.len())?;
                for (target, value) in a.targets.iter().zip(values) {
                    self.assign(target, value, scope)?;
                }
                Ok(Flow::Normal)
            }

            Stmt::Call(e) => {
                self.eval_multi(e, scope)?;
                Ok(Flow::Normal)
            }

            Stmt::Do(body, _) => self.exec_block(body, scope),

            Stmt::While(w) => {
                while self.eval(&w.condition, scope)?.is_truthy() {
                    match self.exec_block(&w.body, scope)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal => {}
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::Repeat(r) => {
                loop {
                    let (flow, inner) = self.exec_block_scoped(&r.body, scope)?;
                    match flow {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal => {}
                    }
                    if self.eval(&r.condition, &inner)?.is_truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::If(i) => {
                for (condition, body) in &i.branches {
                    if self.eval(condition, scope)?.is_truthy() {
                        return self.exec_block(body, scope);
                    }
                }
                match &i.else_block {
                    Some(body) => self.exec_block(body, scope),
                    None => Ok(Flow::Normal),
                }
            }

            Stmt::NumericFor(f) => self.exec_numeric_for(f, scope),
            Stmt::GenericFor(f) => self.exec_generic_for(f, scope),

            Stmt::Function(f) => {
                let closure = self.make_closure(&f.func, scope);
                let line = f.span.line;
                let (last, prefix) = match &f.method {
                    Some(m) => (m.as_str(), &f.path[..]),
                    None => match f.path.split_last() {
                        Some((last, prefix)) => (last.as_str(), prefix),
                        None => return Err(self.err(line, "function statement without a name")),
                    },
                };
                if prefix.is_empty() {
                    self.assign_name(last, closure, scope);
                    return Ok(Flow::Normal);
                }
                let mut obj = self.lookup_name(&prefix[0], scope);
                for key in &prefix[1..] {
                    obj = self.index(obj, Value::from(key.as_str()), line)?;
                }
                self.set_index(obj, Value::from(last), closure, line)?;
                Ok(Flow::Normal)
            }

            Stmt::Return(values, _) => Ok(Flow::Return(self.eval_list(values, scope)?)),

            Stmt::Break(_) => Ok(Flow::Break),
        }
    }

    fn exec_numeric_for(&mut self, f: &ast::NumericFor, scope: &Rc<Scope>) -> Result<Flow, RuntimeError> {
        let line = f.span.line;
        let start = self.eval(&f.start, scope)?;
        let limit = self.eval(&f.limit, scope)?;
        let step = match &f.step {
            Some(e) => self.eval(e, scope)?,
            None => Value::Integer(1),
        };
        let var: Rc<str> = Rc::from(f.var.as_str());

        if let (Value::Integer(i0), Value::Integer(step)) = (&start, &step) {
            let (i0, step) = (*i0, *step);
            if step == 0 {
                return Err(self.err(line, "'for' step is zero"));
            }
            let Some(limit) = for_integer_limit(&limit, step) else {
                return Err(self.err(line, "'for' limit must be a number"));
            };
            if (step > 0 && i0 > limit) || (step < 0 && i0 < limit) {
                return Ok(Flow::Normal);
            }
            let mut i = i0;
            loop {
                let body_scope = Scope::bind(scope, vec![var.clone()], vec![Value::Integer(i)]);
                match self.exec_block(&f.body, &body_scope)? {
                    Flow::Break => break,
                    Flow::Return(v) => return Ok(Flow::Return(v)),
                    Flow::Normal => {}
                }
                i = match i.checked_add(step) {
                    Some(next) if (step > 0 && next <= limit) || (step < 0 && next >= limit) => next,
                    _ => break,
                };
            }
            return Ok(Flow::Normal);
        }

        let Some(x0) = start.to_number() else {
            return Err(self.err(line, "'for' initial value must be a number"));
        };
        let Some(limit) = limit.to_number() else {
            return Err(self.err(line, "'for' limit must be a number"));
        };
        let Some(step) = step.to_number() else {
            return Err(self.err(line, "'for' step must be a number"));
        };
        if step == 0.0 {
            return Err(self.err(line, "'for' step is zero"));
        }
        let mut x = x0;
        while (step > 0.0 && x <= limit) || (step < 0.0 && x >= limit) {
            let body_scope = Scope::bind(scope, vec![var.clone()], vec![Value::Number(x)]);
            match self.exec_block(&f.body, &body_scope)? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal => {}
            }
            x += step;
        }
        Ok(Flow::Normal)
    }

    /// `for k, v in f, s, ctl do`: call `f(s, ctl)` until its first result
    /// is nil.
    fn exec_generic_for(&mut self, f: &ast::GenericFor, scope: &Rc<Scope>) -> Result<Flow, RuntimeError> {
        let line = f.span.line;
        let mut init = self.eval_adjusted(&f.exprs, scope, 3)?.into_iter();
        let iter = init.next().unwrap_or(Value::Nil);
        let state = init.next().unwrap_or(Value::Nil);
        let mut control = init.next().unwrap_or(Value::Nil);
        let names: Vec<Rc<str>> = f.names.iter().map(|n| Rc::from(n.as_str())).collect();

        loop {
            let mut values = self.call_value(&iter, vec![state.clone(), control.clone()], line)?;
            let first = values.first().cloned().unwrap_or(Value::Nil);
            if first.is_nil() {
                break;
            }
            control = first;
            values.resize(names.len(), Value::Nil);
            let body_scope = Scope::bind(scope, names.clone(), values);
            match self.exec_block(&f.body, &body_scope)? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal => {}
            }
        }
        Ok(Flow::Normal)
    }

    // ─── Assignment ──────────────────────────────────────────────────────────

    fn assign(&mut self, target: &Expr, value: Value, scope: &Rc<Scope>) -> Result<(), RuntimeError> {
        match target {
            Expr::Ident(name, _) => {
                self.assign_name(name, value, scope);
                Ok(())
            }
            Expr::Index { expr, key, span } => {
                let obj = self.eval(expr, scope)?;
                let key = self.eval(key, scope)?;
                self.set_index(obj, key, value, span.line)
            }
            other => Err(self.err(other.span().line, "cannot assign to this expression")),
        }
    }

    fn assign_name(&mut self, name: &str, value: Value, scope: &Rc<Scope>) {
        if !scope.assign(name, value.clone()) {
            self.ctx.set_global_value(name, value);
        }
    }

    fn lookup_name(&self, name: &str, scope: &Rc<Scope>) -> Value {
        scope.lookup(name).unwrap_or_else(|| self.ctx.get_global(name))
    }

    // ─── Indexing ────────────────────────────────────────────────────────────

    fn index(&mut self, obj: Value, key: Value, line: usize) -> Result<Value, RuntimeError> {
        match &obj {
            Value::Table(t) => Ok(t.borrow().get(&key)),
            // strings share the `string` library as their method table
            Value::Str(_) => match self.ctx.get_global("string") {
                Value::Table(lib) => Ok(lib.borrow().get(&key)),
                _ => Err(self.err(line, "attempt to index a string value")),
            },
            Value::UserData(block) => {
                let hook = self.ctx.metatable(block.tag()).and_then(|mt| mt.index.clone());
                let Some(hook) = hook else {
                    return Err(self.err(line, format!("attempt to index a {} value", block.tag())));
                };
                let results = self.ctx.call_native(&hook, vec![obj.clone(), key]).map_err(|e| e.at_line(line))?;
                Ok(results.into_iter().next().unwrap_or(Value::Nil))
            }
            _ => Err(self.err(line, format!("attempt to index a {} value", obj.type_name()))),
        }
    }

    fn set_index(&mut self, obj: Value, key: Value, value: Value, line: usize) -> Result<(), RuntimeError> {
        match &obj {
            Value::Table(t) => t.borrow_mut().set(key, value).map_err(|e| e.at_line(line)),
            Value::UserData(block) => {
                let hook = self.ctx.metatable(block.tag()).and_then(|mt| mt.newindex.clone());
                let Some(hook) = hook else {
                    return Err(self.err(line, format!("attempt to index a {} value", block.tag())));
                };
                self.ctx.call_native(&hook, vec![obj.clone(), key, value]).map_err(|e| e.at_line(line))?;
                Ok(())
            }
            _ => Err(self.err(line, format!("attempt to index a {} value", obj.type_name()))),
        }
    }

    // ─── Expressions ─────────────────────────────────────────────────────────

    /// Evaluate to exactly one value.
    fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Value, RuntimeError> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.eval_inner(expr, scope))
    }

    fn eval_inner(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Nil(_)        => Ok(Value::Nil),
            Expr::Bool(b, _)    => Ok(Value::Bool(*b)),
            Expr::Integer(n, _) => Ok(Value::Integer(*n)),
            Expr::Number(n, _)  => Ok(Value::Number(*n)),
            Expr::Str(s, _)     => Ok(Value::from(s.as_str())),
            Expr::Ident(name, _) => Ok(self.lookup_name(name, scope)),

            Expr::Vararg(_) | Expr::Call { .. } | Expr::MethodCall { .. } => {
                Ok(self.eval_multi(expr, scope)?.into_iter().next().unwrap_or(Value::Nil))
            }

            Expr::Index { expr: obj, key, span } => {
                let o = self.eval(obj, scope)?;
                let k = self.eval(key, scope)?;
                if matches!(o, Value::Nil) {
                    return Err(self.err(span.line, format!(
                        "attempt to index a nil value{}", describe_target(obj, scope)
                    )));
                }
                self.index(o, k, span.line)
            }

            Expr::Function(body) => Ok(self.make_closure(body, scope)),

            Expr::BinOp { left, op: BinOp::And, right, .. } => {
                let l = self.eval(left, scope)?;
                if l.is_truthy() { self.eval(right, scope) } else { Ok(l) }
            }
            Expr::BinOp { left, op: BinOp::Or, right, .. } => {
                let l = self.eval(left, scope)?;
                if l.is_truthy() { Ok(l) } else { self.eval(right, scope) }
            }
            Expr::BinOp { left, op, right, span } => {
                let l = self.eval(left, scope)?;
                let r = self.eval(right, scope)?;
                eval_binop(*op, l, r, span.line)
            }

            Expr::UnOp { op, operand, span } => {
                let v = self.eval(operand, scope)?;
                eval_unop(*op, v, span.line)
            }

            Expr::Table(fields, _) => self.eval_table(fields, scope),

            Expr::Paren(inner, _) => self.eval(inner, scope),
        }
    }

    /// Evaluate an expression that may produce several values. Non-multi
    /// expressions produce exactly one.
    fn eval_multi(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Vec<Value>, RuntimeError> {
        match expr {
            Expr::Vararg(_) => Ok(self.varargs.last().map(|v| v.to_vec()).unwrap_or_default()),

            Expr::Call { callee, args, span } => {
                let f = self.eval(callee, scope)?;
                let argv = self.eval_list(args, scope)?;
                if !matches!(f, Value::Function(_)) {
                    return Err(self.err(span.line, format!(
                        "attempt to call a {} value{}", f.type_name(), describe_target(callee, scope)
                    )));
                }
                self.call_value(&f, argv, span.line)
            }

            Expr::MethodCall { expr: obj, method, args, span } => {
                let o = self.eval(obj, scope)?;
                if matches!(o, Value::Nil) {
                    return Err(self.err(span.line, format!(
                        "attempt to index a nil value{}", describe_target(obj, scope)
                    )));
                }
                let f = self.index(o.clone(), Value::from(method.as_str()), span.line)?;
                if !matches!(f, Value::Function(_)) {
                    return Err(self.err(span.line, format!(
                        "attempt to call a {} value (method '{method}')", f.type_name()
                    )));
                }
                let mut argv = vec![o];
                argv.extend(self.eval_list(args, scope)?);
                self.call_value(&f, argv, span.line)
            }

            other => Ok(vec![self.eval(other, scope)?]),
        }
    }

    /// Every expression contributes one value except the last, which
    /// expands if it is a call or `...`.
    fn eval_list(&mut self, exprs: &[Expr], scope: &Rc<Scope>) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(exprs.len());
        for (i, e) in exprs.iter().enumerate() {
            if i + 1 == exprs.len() && e.is_multi() {
                values.extend(self.eval_multi(e, scope)?);
            } else {
                values.push(self.eval(e, scope)?);
            }
        }
        Ok(values)
    }

    /// `eval_list` truncated or nil-padded to `n` values.
    fn eval_adjusted(&mut self, exprs: &[Expr], scope: &Rc<Scope>, n: usize) -> Result<Vec<Value>, RuntimeError> {
        let mut values = self.eval_list(exprs, scope)?;
        values.resize(n, Value::Nil);
        Ok(values)
    }

    fn eval_table(&mut self, fields: &[TableField], scope: &Rc<Scope>) -> Result<Value, RuntimeError> {
        let mut table = Table::new();
        let mut position = 1i64;
        for (i, field) in fields.iter().enumerate() {
            match field {
                TableField::Positional(e) if i + 1 == fields.len() && e.is_multi() => {
                    for v in self.eval_multi(e, scope)? {
                        table.set(Value::Integer(position), v)?;
                        position += 1;
                    }
                }
                TableField::Positional(e) => {
                    let v = self.eval(e, scope)?;
                    table.set(Value::Integer(position), v)?;
                    position += 1;
                }
                TableField::Named(name, e) => {
                    let v = self.eval(e, scope)?;
                    table.set_str(name, v);
                }
                TableField::Keyed(k, e) => {
                    let key = self.eval(k, scope)?;
                    let v = self.eval(e, scope)?;
                    table.set(key, v).map_err(|err| err.at_line(k.span().line))?;
                }
            }
        }
        Ok(Value::new_table(table))
    }
}

/// ` (global 'x')`, ` (local 'x')` or ` (field 'x')` for error messages.
fn describe_target(expr: &Expr, scope: &Rc<Scope>) -> String {
    match expr {
        Expr::Ident(name, _) if scope.lookup(name).is_some() => format!(" (local '{name}')"),
        Expr::Ident(name, _) => format!(" (global '{name}')"),
        Expr::Index { key, .. } => match key.as_ref() {
            Expr::Str(s, _) => format!(" (field '{s}')"),
            _ => String::new(),
        },
        _ => String::new(),
    }
}

/// Integer loop limit: float limits are clipped toward the loop direction.
fn for_integer_limit(limit: &Value, step: i64) -> Option<i64> {
    match limit {
        Value::Integer(n) => Some(*n),
        other => {
            let f = other.to_number()?;
            if f.is_nan() {
                return None;
            }
            let clipped = if step > 0 { f.floor() } else { f.ceil() };
            Some(if clipped >= 9.223_372_036_854_775_807e18 {
                i64::MAX
            } else if clipped <= -9.223_372_036_854_775_808e18 {
                i64::MIN
            } else {
                clipped as i64
            })
        }
    }
}

// ─── Operators ───────────────────────────────────────────────────────────────

fn arith_operands(l: &Value, r: &Value, line: usize) -> Result<(f64, f64), RuntimeError> {
    match (l.to_number(), r.to_number()) {
        (Some(a), Some(b)) => Ok((a, b)),
        (None, _) => Err(RuntimeError::new(line, format!("attempt to perform arithmetic on a {} value", l.type_name()))),
        (_, None) => Err(RuntimeError::new(line, format!("attempt to perform arithmetic on a {} value", r.type_name()))),
    }
}

/// Integer view for arithmetic: integers stay integers, numeric strings
/// convert; floats do not.
fn int_operand(v: &Value) -> Option<i64> {
    match v {
        Value::Integer(n) => Some(*n),
        Value::Str(s) => match crate::runtime::value::str_to_number(s) {
            Some(Value::Integer(n)) => Some(n),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn eval_binop(op: BinOp, l: Value, r: Value, line: usize) -> Result<Value, RuntimeError> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::IDiv | BinOp::Mod => {
            if let (Some(a), Some(b)) = (int_operand(&l), int_operand(&r)) {
                return int_arith(op, a, b, line);
            }
            let (a, b) = arith_operands(&l, &r, line)?;
            Ok(Value::Number(match op {
                BinOp::Add  => a + b,
                BinOp::Sub  => a - b,
                BinOp::Mul  => a * b,
                BinOp::IDiv => (a / b).floor(),
                _ => {
                    let m = a % b;
                    if m != 0.0 && (m < 0.0) != (b < 0.0) { m + b } else { m }
                }
            }))
        }
        BinOp::Div => {
            let (a, b) = arith_operands(&l, &r, line)?;
            Ok(Value::Number(a / b))
        }
        BinOp::Pow => {
            let (a, b) = arith_operands(&l, &r, line)?;
            Ok(Value::Number(a.powf(b)))
        }
        BinOp::Concat => {
            let part = |v: &Value| match v {
                Value::Str(s) => Ok(s.to_string()),
                Value::Integer(n) => Ok(n.to_string()),
                Value::Number(n) => Ok(format_number(*n)),
                other => Err(RuntimeError::new(line, format!("attempt to concatenate a {} value", other.type_name()))),
            };
            Ok(Value::from(part(&l)? + &part(&r)?))
        }
        BinOp::Eq    => Ok(Value::Bool(l.raw_equal(&r))),
        BinOp::NotEq => Ok(Value::Bool(!l.raw_equal(&r))),
        BinOp::Lt    => less_than(&l, &r, line).map(Value::Bool),
        BinOp::LtEq  => less_equal(&l, &r, line).map(Value::Bool),
        BinOp::Gt    => less_than(&r, &l, line).map(Value::Bool),
        BinOp::GtEq  => less_equal(&r, &l, line).map(Value::Bool),
        // short-circuit forms are handled by the evaluator
        BinOp::And   => Ok(if l.is_truthy() { r } else { l }),
        BinOp::Or    => Ok(if l.is_truthy() { l } else { r }),
    }
}

fn int_arith(op: BinOp, a: i64, b: i64, line: usize) -> Result<Value, RuntimeError> {
    let n = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::IDiv => {
            if b == 0 {
                return Err(RuntimeError::new(line, "attempt to perform 'n//0'"));
            }
            let q = a.wrapping_div(b);
            if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q }
        }
        _ => {
            if b == 0 {
                return Err(RuntimeError::new(line, "attempt to perform 'n%0'"));
            }
            let m = a.wrapping_rem(b);
            if m != 0 && ((m < 0) != (b < 0)) { m + b } else { m }
        }
    };
    Ok(Value::Integer(n))
}

fn less_than(l: &Value, r: &Value, line: usize) -> Result<bool, RuntimeError> {
    match (l, r) {
        (Value::Integer(a), Value::Integer(b)) => Ok(a < b),
        (Value::Integer(_) | Value::Number(_), Value::Integer(_) | Value::Number(_)) => {
            Ok(num(l) < num(r))
        }
        (Value::Str(a), Value::Str(b)) => Ok(a < b),
        _ => Err(compare_error(l, r, line)),
    }
}

fn less_equal(l: &Value, r: &Value, line: usize) -> Result<bool, RuntimeError> {
    match (l, r) {
        (Value::Integer(a), Value::Integer(b)) => Ok(a <= b),
        (Value::Integer(_) | Value::Number(_), Value::Integer(_) | Value::Number(_)) => {
            Ok(num(l) <= num(r))
        }
        (Value::Str(a), Value::Str(b)) => Ok(a <= b),
        _ => Err(compare_error(l, r, line)),
    }
}

fn num(v: &Value) -> f64 {
    v.to_number().unwrap_or(f64::NAN)
}

fn compare_error(l: &Value, r: &Value, line: usize) -> RuntimeError {
    let (a, b) = (l.type_name(), r.type_name());
    if a == b {
        RuntimeError::new(line, format!("attempt to compare two {a} values"))
    } else {
        RuntimeError::new(line, format!("attempt to compare {a} with {b}"))
    }
}

pub(crate) fn eval_unop(op: UnOp, v: Value, line: usize) -> Result<Value, RuntimeError> {
    match op {
        UnOp::Not => Ok(Value::Bool(!v.is_truthy())),
        UnOp::Neg => match &v {
            Value::Integer(n) => Ok(Value::Integer(n.wrapping_neg())),
            Value::Number(n)  => Ok(Value::Number(-n)),
            other => match int_operand(other) {
                Some(n) => Ok(Value::Integer(n.wrapping_neg())),
                None => other.to_number().map(|n| Value::Number(-n)).ok_or_else(|| {
                    RuntimeError::new(line, format!("attempt to perform arithmetic on a {} value", other.type_name()))
                }),
            },
        },
        UnOp::Len => match &v {
            Value::Str(s)   => Ok(Value::Integer(s.len() as i64)),
            Value::Table(t) => Ok(Value::Integer(t.borrow().len())),
            other => Err(RuntimeError::new(line, format!("attempt to get length of a {} value", other.type_name()))),
        },
    }
}

/// Integer result when a float has an exact integer value.
pub(crate) fn normalize_integral(n: f64) -> Value {
    match float_to_integer(n) {
        Some(i) => Value::Integer(i),
        None => Value::Number(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_stays_integer() {
        assert_eq!(eval_binop(BinOp::Add, Value::Integer(2), Value::Integer(3), 1).unwrap(), Value::Integer(5));
        assert!(matches!(eval_binop(BinOp::Div, Value::Integer(6), Value::Integer(3), 1).unwrap(), Value::Number(_)));
    }

    #[test]
    fn floor_division_and_modulo_follow_sign_of_divisor() {
        assert_eq!(eval_binop(BinOp::IDiv, Value::Integer(-7), Value::Integer(2), 1).unwrap(), Value::Integer(-4));
        assert_eq!(eval_binop(BinOp::Mod, Value::Integer(-7), Value::Integer(2), 1).unwrap(), Value::Integer(1));
        assert_eq!(eval_binop(BinOp::Mod, Value::Number(5.5), Value::Number(-2.0), 1).unwrap(), Value::Number(-0.5));
    }

    #[test]
    fn integer_division_by_zero_is_error() {
        assert!(eval_binop(BinOp::IDiv, Value::Integer(1), Value::Integer(0), 3).is_err());
        let err = eval_binop(BinOp::Mod, Value::Integer(1), Value::Integer(0), 3).unwrap_err();
        assert_eq!(err.message, "attempt to perform 'n%0'");
    }

    #[test]
    fn string_coercion_in_arithmetic() {
        assert_eq!(eval_binop(BinOp::Add, Value::from("10"), Value::Integer(1), 1).unwrap(), Value::Integer(11));
        let err = eval_binop(BinOp::Add, Value::from("ten"), Value::Integer(1), 4).unwrap_err();
        assert_eq!(err.line, 4);
    }

    #[test]
    fn concat_formats_numbers() {
        let v = eval_binop(BinOp::Concat, Value::Number(1.0), Value::Integer(2), 1).unwrap();
        assert_eq!(v, Value::from("1.02"));
    }

    #[test]
    fn mixed_comparison() {
        assert_eq!(eval_binop(BinOp::Lt, Value::Integer(1), Value::Number(1.5), 1).unwrap(), Value::Bool(true));
        assert!(eval_binop(BinOp::Lt, Value::Integer(1), Value::from("2"), 1).is_err());
    }

    #[test]
    fn length_operator() {
        assert_eq!(eval_unop(UnOp::Len, Value::from("abc"), 1).unwrap(), Value::Integer(3));
        assert!(eval_unop(UnOp::Len, Value::Integer(3), 1).is_err());
    }

    #[test]
    fn integral_normalization() {
        assert!(matches!(normalize_integral(3.0), Value::Integer(3)));
        assert!(matches!(normalize_integral(3.5), Value::Number(_)));
    }
}
