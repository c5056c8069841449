pub mod syntax;
pub mod types;
pub mod runtime;
pub mod analysis;
pub mod error;
pub mod namespaces;
pub mod config;

pub use config::{ConfigError, RuntimeConfig};
pub use error::{BindingError, Error, ErrorCode, RuntimeError, ScriptError};
pub use syntax::token::{Token, TokenKind};
pub use runtime::context::Context;
pub use runtime::frame::CallFrame;
pub use runtime::heap::ObjectRef;
pub use runtime::value::Value;
pub use types::{Base, FieldType, Member, TypeDescriptor, TypeRegistry};

use std::any::Any;

use tracing::debug;

use crate::syntax::ast::Chunk;

// ─── Public API ───────────────────────────────────────────────────────────────

/// Lex, parse and validate source text. Returns every diagnostic found.
pub fn compile(source: &str) -> Result<Chunk, Vec<Error>> {
    let tokens = syntax::lexer::Lexer::new(source).tokenize()?;
    let chunk = syntax::parser::Parser::new(tokens).parse()?;
    analysis::validate(&chunk)?;
    Ok(chunk)
}

// ─── Runtime manager ──────────────────────────────────────────────────────────

/// Owns one runtime context and is the embedder's entry point.
///
/// Lifecycle:
///   1. `RuntimeManager::new()` opens a context with the standard library.
///   2. `apply_registry(&reg)` installs a native type; `instantiate(&reg)`
///      allocates an instance and leaves its handle on the value stack,
///      where `set_global(name)` can bind it.
///   3. `execute(source)` runs script text against the installed types.
///   4. Dropping the manager finalizes every object still alive.
pub struct RuntimeManager {
    ctx: Context,
}

impl RuntimeManager {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        debug!(?config, "opening runtime");
        Self { ctx: Context::new(config) }
    }

    pub fn apply_registry<T: Any>(&mut self, registry: &TypeRegistry<T>) -> Result<(), BindingError> {
        registry.generate_bindings(&mut self.ctx)
    }

    pub fn instantiate<T: Any>(&mut self, registry: &TypeRegistry<T>) -> Result<ObjectRef<T>, BindingError> {
        registry.allocate(&mut self.ctx)
    }

    pub fn instantiate_with<T: Any>(
        &mut self,
        registry: &TypeRegistry<T>,
        value: T,
    ) -> Result<ObjectRef<T>, BindingError> {
        registry.allocate_with(&mut self.ctx, value)
    }

    /// Compile and run `source`. Values returned by the chunk stay on the
    /// value stack.
    pub fn execute(&mut self, source: &str) -> Result<(), ScriptError> {
        self.ctx.execute(source).map(|_| ())
    }

    /// Pop the most recently produced value into global `name`.
    pub fn set_global(&mut self, name: &str) -> Result<(), RuntimeError> {
        self.ctx.set_global(name)
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.ctx.get_global(name)
    }

    pub fn collect_garbage(&mut self) -> usize {
        self.ctx.collect_garbage()
    }

    /// Lines printed since the last call. Empty unless `capture_output` is set.
    pub fn take_output(&mut self) -> Vec<String> {
        self.ctx.take_output()
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }
}

impl Default for RuntimeManager {
    fn default() -> Self {
        Self::new()
    }
}
