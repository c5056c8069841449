//! Global built-ins: printing, conversion, errors, iteration.

use crate::error::{ErrorCode, RuntimeError};
use crate::runtime::frame::CallFrame;
use crate::runtime::value::{str_to_number, Value};
use super::{f, Export, Library};

pub struct BaseLibrary;

impl Library for BaseLibrary {
    fn name(&self) -> &'static str { "base" }

    fn global(&self) -> bool { true }

    fn exports(&self) -> Vec<Export> {
        vec![
            f("print",          print),
            f("type",           type_of),
            f("tostring",       tostring),
            f("tonumber",       tonumber),
            f("pcall",          pcall),
            f("error",          error),
            f("assert",         assert),
            f("select",         select),
            f("pairs",          pairs),
            f("ipairs",         ipairs),
            f("next",           next),
            f("rawequal",       rawequal),
            f("rawlen",         rawlen),
            f("collectgarbage", collectgarbage),
        ]
    }
}

fn print(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let line = frame.args().iter().map(|v| v.to_string()).collect::<Vec<_>>().join("\t");
    frame.context().write_line(line);
    Ok(0)
}

fn type_of(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let v = frame.check_any(1)?;
    frame.push(v.type_name());
    Ok(1)
}

fn tostring(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let v = frame.check_any(1)?;
    frame.push(v.to_string());
    Ok(1)
}

/// `tonumber(v [, base])`; `nil` when the conversion fails.
fn tonumber(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    if frame.arg(2).is_nil() {
        let v = frame.check_any(1)?;
        let result = match &v {
            Value::Integer(_) | Value::Number(_) => v.clone(),
            Value::Str(s) => str_to_number(s).unwrap_or(Value::Nil),
            _ => Value::Nil,
        };
        frame.push(result);
        return Ok(1);
    }
    let base = frame.check_integer(2)?;
    if !(2..=36).contains(&base) {
        return Err(frame.arg_error(2, "base out of range"));
    }
    let s = frame.check_string(1)?;
    let digits = s.trim().to_ascii_lowercase();
    let (negative, digits) = match digits.strip_prefix('-') {
        Some(rest) => (true, rest.to_string()),
        None => (false, digits),
    };
    let result = match i64::from_str_radix(&digits, base as u32) {
        Ok(n) if !digits.is_empty() => Value::Integer(if negative { -n } else { n }),
        _ => Value::Nil,
    };
    frame.push(result);
    Ok(1)
}

/// `pcall(f, ...)`: `true, results...` on success, `false, message` on error.
fn pcall(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let f = frame.check_any(1)?;
    let args = frame.args().into_iter().skip(1).collect();
    match frame.call(&f, args) {
        Ok(results) => {
            frame.push(true);
            Ok(1 + frame.push_all(results))
        }
        Err(e) => {
            frame.push(false);
            frame.push(e.message);
            Ok(2)
        }
    }
}

fn error(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let msg = match frame.arg(1) {
        Value::Nil => "nil".to_string(),
        v => v.to_string(),
    };
    Err(RuntimeError::with_code(ErrorCode::R006, msg))
}

fn assert(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    if frame.check_any(1)?.is_truthy() {
        let args = frame.args();
        return Ok(frame.push_all(args));
    }
    let msg = match frame.arg(2) {
        Value::Nil => "assertion failed!".to_string(),
        v => v.to_string(),
    };
    Err(RuntimeError::with_code(ErrorCode::R006, msg))
}

/// `select('#', ...)` counts; `select(n, ...)` returns from the n-th on,
/// negative `n` counting from the end.
fn select(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let rest: Vec<Value> = frame.args().into_iter().skip(1).collect();
    if let Value::Str(s) = frame.arg(1) {
        if &*s == "#" {
            frame.push(rest.len() as i64);
            return Ok(1);
        }
    }
    let n = frame.check_integer(1)?;
    let len = rest.len() as i64;
    let start = if n < 0 { len + n } else { n - 1 };
    if n == 0 || start < 0 {
        return Err(frame.arg_error(1, "index out of range"));
    }
    let picked = rest.into_iter().skip(start as usize).collect();
    Ok(frame.push_all(picked))
}

fn pairs(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let t = frame.check_table(1)?;
    frame.push(Value::native("next", next));
    frame.push(Value::Table(t));
    frame.push(Value::Nil);
    Ok(3)
}

fn ipairs(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let t = frame.check_table(1)?;
    frame.push(Value::native("ipairs_iter", ipairs_iter));
    frame.push(Value::Table(t));
    frame.push(0i64);
    Ok(3)
}

fn ipairs_iter(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let t = frame.check_table(1)?;
    let i = frame.check_integer(2)? + 1;
    let v = t.borrow().get(&Value::Integer(i));
    if v.is_nil() {
        return Ok(0);
    }
    frame.push(i);
    frame.push(v);
    Ok(2)
}

fn next(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let t = frame.check_table(1)?;
    let entry = t.borrow().next(&frame.arg(2));
    match entry {
        Some((k, v)) => {
            frame.push(k);
            frame.push(v);
            Ok(2)
        }
        None => {
            frame.push(Value::Nil);
            Ok(1)
        }
    }
}

fn rawequal(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let a = frame.check_any(1)?;
    let b = frame.check_any(2)?;
    frame.push(a.raw_equal(&b));
    Ok(1)
}

fn rawlen(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let n = match frame.arg(1) {
        Value::Table(t) => t.borrow().len(),
        Value::Str(s) => s.len() as i64,
        _ => return Err(frame.arg_error(1, "table or string expected")),
    };
    frame.push(n);
    Ok(1)
}

/// `collectgarbage([opt])`: `"collect"` (default) runs a full collection;
/// `"count"` reports heap usage in KiB.
fn collectgarbage(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let opt = match frame.arg(1) {
        Value::Nil => "collect".into(),
        _ => frame.check_string(1)?,
    };
    match &*opt {
        "collect" => {
            frame.context().collect_garbage();
            frame.push(0i64);
            Ok(1)
        }
        "count" => {
            let kib = frame.context().heap().bytes_in_use() as f64 / 1024.0;
            frame.push(kib);
            Ok(1)
        }
        other => Err(frame.arg_error(1, &format!("invalid option '{other}'"))),
    }
}
