use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{ErrorCode, RuntimeError};
use crate::runtime::context::Context;
use crate::runtime::heap::Block;
use crate::runtime::value::{Table, Value};

/// The view a native function gets of its invocation: 1-based argument
/// slots, a place to push results, and the owning context for callbacks.
pub struct CallFrame<'a> {
    ctx: &'a mut Context,
    base: usize,
    argc: usize,
    name: Rc<str>,
}

impl<'a> CallFrame<'a> {
    pub(crate) fn new(ctx: &'a mut Context, base: usize, argc: usize, name: Rc<str>) -> Self {
        Self { ctx, base, argc, name }
    }

    /// Name of the running function, used in argument errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn argc(&self) -> usize {
        self.argc
    }

    pub fn context(&mut self) -> &mut Context {
        self.ctx
    }

    // ─── Arguments ───────────────────────────────────────────────────────────

    /// Argument `n` (1-based); `nil` past the end.
    pub fn arg(&self, n: usize) -> Value {
        if n == 0 || n > self.argc {
            return Value::Nil;
        }
        self.ctx.stack_slice(self.base + n - 1, self.base + n).first().cloned().unwrap_or(Value::Nil)
    }

    pub fn args(&self) -> Vec<Value> {
        self.ctx.stack_slice(self.base, self.base + self.argc).to_vec()
    }

    pub fn check_any(&self, n: usize) -> Result<Value, RuntimeError> {
        if n > self.argc {
            return Err(self.arg_error(n, "value expected"));
        }
        Ok(self.arg(n))
    }

    pub fn check_integer(&self, n: usize) -> Result<i64, RuntimeError> {
        let v = self.arg(n);
        match v {
            Value::Integer(i) => Ok(i),
            Value::Number(_) | Value::Str(_) if v.to_number().is_some() => v
                .to_integer()
                .ok_or_else(|| self.arg_error(n, "number has no integer representation")),
            _ => Err(self.type_error(n, "number", &v)),
        }
    }

    pub fn opt_integer(&self, n: usize, default: i64) -> Result<i64, RuntimeError> {
        if self.arg(n).is_nil() { Ok(default) } else { self.check_integer(n) }
    }

    pub fn check_number(&self, n: usize) -> Result<f64, RuntimeError> {
        let v = self.arg(n);
        v.to_number().ok_or_else(|| self.type_error(n, "number", &v))
    }

    /// Strings, and numbers converted to their string form.
    pub fn check_string(&self, n: usize) -> Result<Rc<str>, RuntimeError> {
        match self.arg(n) {
            Value::Str(s) => Ok(s),
            v @ (Value::Integer(_) | Value::Number(_)) => Ok(Rc::from(v.to_string())),
            v => Err(self.type_error(n, "string", &v)),
        }
    }

    pub fn check_table(&self, n: usize) -> Result<Rc<RefCell<Table>>, RuntimeError> {
        match self.arg(n) {
            Value::Table(t) => Ok(t),
            v => Err(self.type_error(n, "table", &v)),
        }
    }

    pub fn to_boolean(&self, n: usize) -> bool {
        self.arg(n).is_truthy()
    }

    /// The block behind argument `n`, which must carry `tag`.
    pub fn check_userdata(&self, n: usize, tag: &str) -> Result<Rc<Block>, RuntimeError> {
        match self.arg(n) {
            Value::UserData(block) if block.tag() == tag => Ok(block),
            v => Err(self.type_error(n, tag, &v)),
        }
    }

    /// Borrow the native object behind argument `n` as a `T`. Objects of a
    /// derived type are projected to their embedded `T` through the type's
    /// cast hook.
    pub fn with_userdata<T: Any, R>(&self, n: usize, f: impl FnOnce(&mut T) -> R) -> Result<R, RuntimeError> {
        let v = self.arg(n);
        let Value::UserData(block) = &v else {
            return Err(self.type_error(n, short_type_name::<T>(), &v));
        };
        let cast = self.ctx.metatable(block.tag()).and_then(|mt| mt.cast.clone());
        let outcome = block.with_mut(|obj| {
            let target: Option<&mut T> = if obj.is::<T>() {
                obj.downcast_mut::<T>()
            } else {
                cast.as_ref()
                    .and_then(|c| c(obj, TypeId::of::<T>()))
                    .and_then(|o| o.downcast_mut::<T>())
            };
            target.map(f)
        });
        match outcome {
            Ok(Some(r)) => Ok(r),
            Ok(None) => Err(self.type_error(n, short_type_name::<T>(), &v)),
            Err(why) => Err(RuntimeError::with_code(ErrorCode::R008, why.describe(block.tag()))),
        }
    }

    // ─── Results ─────────────────────────────────────────────────────────────

    pub fn push(&mut self, value: impl Into<Value>) {
        self.ctx.push(value.into());
    }

    /// Push every value and return how many were pushed.
    pub fn push_all(&mut self, values: Vec<Value>) -> usize {
        let n = values.len();
        for v in values {
            self.ctx.push(v);
        }
        n
    }

    /// Call back into the runtime.
    pub fn call(&mut self, f: &Value, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
        self.ctx.call(f, args)
    }

    // ─── Errors ──────────────────────────────────────────────────────────────

    pub fn arg_error(&self, n: usize, msg: &str) -> RuntimeError {
        RuntimeError::with_code(ErrorCode::R005, format!("bad argument #{n} to '{}' ({msg})", self.name))
    }

    fn type_error(&self, n: usize, expected: &str, got: &Value) -> RuntimeError {
        let got = match got {
            Value::UserData(b) => b.tag().to_string(),
            Value::Nil if n > self.argc => "no value".to_string(),
            other => other.type_name().to_string(),
        };
        self.arg_error(n, &format!("{expected} expected, got {got}"))
    }
}

/// `my_crate::module::Thing` → `Thing`.
fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
