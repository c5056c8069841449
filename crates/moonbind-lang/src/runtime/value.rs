use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::runtime::frame::CallFrame;
use crate::runtime::heap::Block;
use crate::runtime::interpreter::Scope;
use crate::syntax::ast::FuncBody;

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Str(Rc<str>),
    Table(Rc<RefCell<Table>>),
    Function(Function),
    /// A native object living in the context's heap.
    UserData(Rc<Block>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil         => "nil",
            Value::Bool(_)     => "boolean",
            Value::Integer(_)  => "number",
            Value::Number(_)   => "number",
            Value::Str(_)      => "string",
            Value::Table(_)    => "table",
            Value::Function(_) => "function",
            Value::UserData(_) => "userdata",
        }
    }

    /// Only `nil` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn new_table(table: Table) -> Self {
        Value::Table(Rc::new(RefCell::new(table)))
    }

    pub fn native(name: &str, f: impl Fn(&mut CallFrame<'_>) -> Result<usize, RuntimeError> + 'static) -> Self {
        Value::Function(Function::Native(NativeFunction::new(name, f)))
    }

    /// Numeric view with string coercion (`"10" + 1` is 11).
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Number(n)  => Some(*n),
            Value::Str(s)     => str_to_number(s).and_then(|v| v.to_number()),
            _ => None,
        }
    }

    /// Integer view: integers, floats with an exact integer value, and
    /// strings that convert to either.
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Number(n)  => float_to_integer(*n),
            Value::Str(s)     => str_to_number(s).and_then(|v| v.to_integer()),
            _ => None,
        }
    }

    /// Identity/primitive equality; no metamethods are consulted.
    pub fn raw_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil)               => true,
            (Value::Bool(a), Value::Bool(b))       => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b))   => a == b,
            (Value::Integer(a), Value::Number(b))
            | (Value::Number(b), Value::Integer(a)) => (*a as f64) == *b && float_to_integer(*b) == Some(*a),
            (Value::Str(a), Value::Str(b))         => a == b,
            (Value::Table(a), Value::Table(b))     => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::UserData(a), Value::UserData(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_equal(other)
    }
}

/// `tostring` formatting.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil         => f.write_str("nil"),
            Value::Bool(b)     => write!(f, "{b}"),
            Value::Integer(n)  => write!(f, "{n}"),
            Value::Number(n)   => f.write_str(&format_number(*n)),
            Value::Str(s)      => f.write_str(s),
            Value::Table(t)    => write!(f, "table: {:p}", Rc::as_ptr(t)),
            Value::Function(Function::Script(c)) => write!(f, "function: {:p}", Rc::as_ptr(c)),
            Value::Function(Function::Native(n)) => write!(f, "builtin: {}", n.name()),
            Value::UserData(b) => write!(f, "{}: {:p}", b.tag(), Rc::as_ptr(b)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self { Value::Integer(n) }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self { Value::Integer(n as i64) }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self { Value::Number(n) }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::Str(Rc::from(s)) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Value::Str(Rc::from(s)) }
}

// ─── Numbers ─────────────────────────────────────────────────────────────────

/// Floats with an integral value print with a trailing `.0` so they stay
/// distinguishable from integers.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if n.fract() == 0.0 && n.abs() < 1e16 {
        format!("{n:.1}")
    } else if n.abs() >= 1e16 || (n != 0.0 && n.abs() < 1e-4) {
        format!("{n:e}")
    } else {
        format!("{n}")
    }
}

/// Exact conversion; `None` for fractional, NaN or out-of-range floats.
pub fn float_to_integer(n: f64) -> Option<i64> {
    if n.fract() == 0.0 && n >= -9.223_372_036_854_775_808e18 && n < 9.223_372_036_854_775_808e18 {
        Some(n as i64)
    } else {
        None
    }
}

/// Parse a numeric literal the way `tonumber` does: surrounding whitespace
/// is ignored; decimal and hex integers, decimal floats with exponents.
pub fn str_to_number(s: &str) -> Option<Value> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        // hex integers wrap around like integer overflow
        let n = hex.chars().fold(0i64, |acc, c| {
            acc.wrapping_mul(16).wrapping_add(c.to_digit(16).map_or(0, i64::from))
        });
        return Some(Value::Integer(if negative { n.wrapping_neg() } else { n }));
    }
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) {
        return None;
    }
    if digits.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = s.parse::<i64>() {
            return Some(Value::Integer(n));
        }
    }
    s.parse::<f64>().ok().map(Value::Number)
}

// ─── Functions ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Function {
    Script(Rc<Closure>),
    Native(NativeFunction),
}

impl Function {
    pub fn ptr_eq(&self, other: &Function) -> bool {
        match (self, other) {
            (Function::Script(a), Function::Script(b)) => Rc::ptr_eq(a, b),
            (Function::Native(a), Function::Native(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// A script function: shared body plus the scope it closed over.
pub struct Closure {
    pub(crate) body: Rc<FuncBody>,
    pub(crate) scope: Rc<Scope>,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure({})", self.body.name.as_deref().unwrap_or("<anonymous>"))
    }
}

/// Signature every native callable follows: arguments are read from the
/// frame, results are pushed onto it, and the count of pushed results is
/// returned.
pub type NativeFn = dyn Fn(&mut CallFrame<'_>) -> Result<usize, RuntimeError>;

#[derive(Clone)]
pub struct NativeFunction {
    name: Rc<str>,
    func: Rc<NativeFn>,
}

impl NativeFunction {
    pub fn new(name: &str, f: impl Fn(&mut CallFrame<'_>) -> Result<usize, RuntimeError> + 'static) -> Self {
        Self { name: Rc::from(name), func: Rc::new(f) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_rc(&self) -> Rc<str> {
        self.name.clone()
    }

    pub fn call(&self, frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
        (self.func)(frame)
    }

    pub fn ptr_eq(&self, other: &NativeFunction) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.func), Rc::as_ptr(&other.func))
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.func) as *const () as usize
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

// ─── Tables ──────────────────────────────────────────────────────────────────

/// Normalized key. Floats with an integral value collapse onto the integer
/// key; reference types key by identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum TableKey {
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Ref(usize),
}

impl TableKey {
    /// `None` for keys that cannot index a table (`nil`, NaN).
    fn of(v: &Value) -> Option<TableKey> {
        match v {
            Value::Nil => None,
            Value::Bool(b) => Some(TableKey::Bool(*b)),
            Value::Integer(n) => Some(TableKey::Int(*n)),
            Value::Number(n) if n.is_nan() => None,
            Value::Number(n) => Some(match float_to_integer(*n) {
                Some(i) => TableKey::Int(i),
                None => TableKey::Float(n.to_bits()),
            }),
            Value::Str(s) => Some(TableKey::Str(s.clone())),
            Value::Table(t) => Some(TableKey::Ref(Rc::as_ptr(t) as *const () as usize)),
            Value::Function(Function::Script(c)) => Some(TableKey::Ref(Rc::as_ptr(c) as *const () as usize)),
            Value::Function(Function::Native(n)) => Some(TableKey::Ref(n.addr())),
            Value::UserData(b) => Some(TableKey::Ref(Rc::as_ptr(b) as *const () as usize)),
        }
    }
}

/// Associative array. Entries keep the original key value so traversal can
/// hand it back to scripts.
#[derive(Default)]
pub struct Table {
    entries: BTreeMap<TableKey, (Value, Value)>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Value) -> Value {
        TableKey::of(key)
            .and_then(|k| self.entries.get(&k))
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Nil)
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.entries
            .get(&TableKey::Str(Rc::from(key)))
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Nil)
    }

    /// Assigning `nil` removes the entry.
    pub fn set(&mut self, key: Value, value: Value) -> Result<(), RuntimeError> {
        let Some(k) = TableKey::of(&key) else {
            let what = if key.is_nil() { "nil" } else { "NaN" };
            return Err(RuntimeError::new(0, format!("table index is {what}")));
        };
        if value.is_nil() {
            self.entries.remove(&k);
        } else {
            // integral float keys are stored as integers
            let key = match k { TableKey::Int(i) => Value::Integer(i), _ => key };
            self.entries.insert(k, (key, value));
        }
        Ok(())
    }

    pub fn set_str(&mut self, key: &str, value: Value) {
        let key: Rc<str> = Rc::from(key);
        if value.is_nil() {
            self.entries.remove(&TableKey::Str(key));
        } else {
            self.entries.insert(TableKey::Str(key.clone()), (Value::Str(key), value));
        }
    }

    /// Border: the largest `n` such that keys `1..=n` are all present.
    pub fn len(&self) -> i64 {
        let mut n = 0;
        while self.entries.contains_key(&TableKey::Int(n + 1)) {
            n += 1;
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Append at position `len() + 1`.
    pub fn push(&mut self, value: Value) {
        let n = self.len() + 1;
        if !value.is_nil() {
            self.entries.insert(TableKey::Int(n), (Value::Integer(n), value));
        }
    }

    /// Entry following `key` in traversal order; `nil` starts the traversal.
    /// Removing entries during traversal is allowed.
    pub fn next(&self, key: &Value) -> Option<(Value, Value)> {
        let entry = if key.is_nil() {
            self.entries.iter().next()
        } else {
            let k = TableKey::of(key)?;
            self.entries.range((Bound::Excluded(k), Bound::Unbounded)).next()
        };
        entry.map(|(_, (k, v))| (k.clone(), v.clone()))
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Table({} entries)", self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_float_keys_alias_integer_keys() {
        let mut t = Table::new();
        t.set(Value::Number(2.0), Value::from("two")).unwrap();
        assert_eq!(t.get(&Value::Integer(2)), Value::from("two"));
        let (k, _) = t.next(&Value::Nil).unwrap();
        assert!(matches!(k, Value::Integer(2)));
    }

    #[test]
    fn nil_and_nan_keys_are_rejected() {
        let mut t = Table::new();
        assert!(t.set(Value::Nil, Value::Integer(1)).is_err());
        assert!(t.set(Value::Number(f64::NAN), Value::Integer(1)).is_err());
        assert_eq!(t.get(&Value::Nil), Value::Nil);
    }

    #[test]
    fn assigning_nil_removes_entry() {
        let mut t = Table::new();
        t.set_str("a", Value::Integer(1));
        t.set_str("a", Value::Nil);
        assert!(t.is_empty());
    }

    #[test]
    fn border_length() {
        let mut t = Table::new();
        t.push(Value::Integer(10));
        t.push(Value::Integer(20));
        t.set(Value::Integer(4), Value::Integer(40)).unwrap();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn traversal_visits_every_entry_once() {
        let mut t = Table::new();
        t.push(Value::Integer(1));
        t.set_str("x", Value::Bool(true));
        t.set(Value::Number(0.5), Value::Integer(3)).unwrap();
        let mut key = Value::Nil;
        let mut seen = 0;
        while let Some((k, _)) = t.next(&key) {
            seen += 1;
            key = k;
        }
        assert_eq!(seen, 3);
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(1.0), "1.0");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(f64::INFINITY), "inf");
        assert_eq!(Value::Integer(15).to_string(), "15");
    }

    #[test]
    fn string_coercion() {
        assert_eq!(str_to_number(" 42 "), Some(Value::Integer(42)));
        assert_eq!(str_to_number("0x10"), Some(Value::Integer(16)));
        assert_eq!(str_to_number("1e2"), Some(Value::Number(100.0)));
        assert_eq!(str_to_number("inf"), None);
        assert_eq!(str_to_number("12abc"), None);
        assert_eq!(Value::from("3.0").to_integer(), Some(3));
    }

    #[test]
    fn mixed_numeric_equality() {
        assert_eq!(Value::Integer(1), Value::Number(1.0));
        assert_ne!(Value::Integer(1), Value::Number(1.5));
        assert_ne!(Value::from("1"), Value::Integer(1));
    }
}
