pub mod validator;


use crate::syntax::ast::Chunk;
use crate::error::Error;
use validator::Validator;

// ─── Entry point ─────────────────────────────────────────────────────────────

/// Semantic checks run between parsing and execution. Lua resolves names
/// at runtime, so what remains is structural: `break` placement and `...`
/// visibility.
///
/// Returns every problem found, not just the first.
pub fn validate(chunk: &Chunk) -> Result<(), Vec<Error>> {
    let errors = Validator::new().validate(chunk);
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
