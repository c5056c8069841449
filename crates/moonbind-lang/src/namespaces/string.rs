//! Byte-oriented string functions. Also reachable as methods on string
//! values: `("x"):upper()`.

use crate::error::RuntimeError;
use crate::runtime::frame::CallFrame;
use super::{f, Export, Library};

pub struct StringLibrary;

impl Library for StringLibrary {
    fn name(&self) -> &'static str { "string" }

    fn exports(&self) -> Vec<Export> {
        vec![
            f("len",   len),
            f("upper", upper),
            f("lower", lower),
            f("rep",   rep),
            f("sub",   sub),
        ]
    }
}

fn len(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let s = frame.check_string(1)?;
    frame.push(s.len() as i64);
    Ok(1)
}

fn upper(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let s = frame.check_string(1)?;
    frame.push(s.to_ascii_uppercase());
    Ok(1)
}

fn lower(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let s = frame.check_string(1)?;
    frame.push(s.to_ascii_lowercase());
    Ok(1)
}

/// Largest string `string.rep` will build.
const MAX_STRING_BYTES: usize = 1 << 30;

/// `string.rep(s, n [, sep])`
fn rep(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let s = frame.check_string(1)?;
    let n = frame.check_integer(2)?;
    let sep = if frame.arg(3).is_nil() { None } else { Some(frame.check_string(3)?) };
    if n <= 0 {
        frame.push("");
        return Ok(1);
    }
    let sep_len = sep.as_ref().map_or(0, |sep| sep.len());
    let count = usize::try_from(n).unwrap_or(usize::MAX);
    let total = s
        .len()
        .checked_mul(count)
        .and_then(|body| sep_len.checked_mul(count - 1).and_then(|seps| body.checked_add(seps)))
        .filter(|&total| total <= MAX_STRING_BYTES)
        .ok_or_else(|| RuntimeError::new(0, "resulting string too large"))?;
    if total == 0 {
        frame.push("");
        return Ok(1);
    }

    let mut out = String::with_capacity(total);
    for i in 0..count {
        if i > 0 {
            if let Some(sep) = &sep {
                out.push_str(sep);
            }
        }
        out.push_str(&s);
    }
    frame.push(out);
    Ok(1)
}

/// `string.sub(s, i [, j])` with 1-based, end-inclusive, negative-from-end
/// indices.
fn sub(frame: &mut CallFrame<'_>) -> Result<usize, RuntimeError> {
    let s = frame.check_string(1)?;
    let len = s.len() as i64;
    let i = frame.opt_integer(2, 1)?;
    let j = frame.opt_integer(3, -1)?;
    let start = if i < 0 { (len + i + 1).max(1) } else { i.max(1) };
    let end = if j < 0 { len + j + 1 } else { j.min(len) };
    let out = if start > end {
        String::new()
    } else {
        String::from_utf8_lossy(&s.as_bytes()[(start - 1) as usize..end as usize]).into_owned()
    };
    frame.push(out);
    Ok(1)
}
