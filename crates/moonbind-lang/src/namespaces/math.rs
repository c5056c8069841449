use crate::error::RuntimeError;
use crate::runtime::frame::CallFrame;
use crate::runtime::interpreter::normalize_integral;
use crate::runtime::value::{float_to_integer, Value};
use super::{c, f, Export, Library};

pub struct MathLibrary;

impl Library for MathLibrary {
    fn name(&self) -> &'static str { "math" }

    fn exports(&self) -> Vec<Export> {
        vec![
            f("floor",     floor),
            f("ceil",      ceil),
            f("abs",       abs),
            f("max",       max),
            f("min",       min),
            f("sqrt",      sqrt),
            f("fmod",      fmod),
            f("tointeger", tointeger),

            c("pi",         Value::Number(std::f64::consts::PI)),
            c("huge",       Value::Number(f64::INFINITY)),
            c("maxinteger", Value::Integer(i64::MAX)),
            c("mininteger", Value::Integer(i64::MIN)),
        ]
    }
}

fn floor(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let v = match frame.arg(1) {
        Value::Integer(n) => Value::Integer(n),
        _ => normalize_integral(frame.check_number(1)?.floor()),
    };
    frame.push(v);
    Ok(1)
}

fn ceil(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let v = match frame.arg(1) {
        Value::Integer(n) => Value::Integer(n),
        _ => normalize_integral(frame.check_number(1)?.ceil()),
    };
    frame.push(v);
    Ok(1)
}

fn abs(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let v = match frame.arg(1) {
        Value::Integer(n) => Value::Integer(n.wrapping_abs()),
        _ => Value::Number(frame.check_number(1)?.abs()),
    };
    frame.push(v);
    Ok(1)
}

/// Shared by `max`/`min`: keeps the winning argument's original value.
fn extremum(frame: &mut CallFrame<'_>, wins: fn(f64, f64) -> bool) -> Result<usize, RuntimeError> {
    let mut best_n = frame.check_number(1)?;
    let mut best = frame.arg(1);
    for i in 2..=frame.argc() {
        let n = frame.check_number(i)?;
        if wins(n, best_n) {
            best_n = n;
            best = frame.arg(i);
        }
    }
    if let Value::Str(_) = best {
        best = Value::Number(best_n);
    }
    frame.push(best);
    Ok(1)
}

fn max(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    extremum(frame, |a, b| a > b)
}

fn min(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    extremum(frame, |a, b| a < b)
}

fn sqrt(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let n = frame.check_number(1)?;
    frame.push(n.sqrt());
    Ok(1)
}

/// Remainder truncated toward zero (C `fmod`), unlike `%`.
fn fmod(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    if let (Value::Integer(a), Value::Integer(b)) = (frame.arg(1), frame.arg(2)) {
        if b == 0 {
            return Err(frame.arg_error(2, "zero"));
        }
        frame.push(a.wrapping_rem(b));
        return Ok(1);
    }
    let a = frame.check_number(1)?;
    let b = frame.check_number(2)?;
    frame.push(a % b);
    Ok(1)
}

fn tointeger(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let v = match frame.arg(1) {
        Value::Integer(n) => Value::Integer(n),
        Value::Number(n) => float_to_integer(n).map_or(Value::Nil, Value::Integer),
        _ => Value::Nil,
    };
    frame.push(v);
    Ok(1)
}
