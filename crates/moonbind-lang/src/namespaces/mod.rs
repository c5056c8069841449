use crate::error::RuntimeError;
use crate::runtime::context::Context;
use crate::runtime::frame::CallFrame;
use crate::runtime::value::{NativeFunction, Table, Value};

pub mod base;
pub mod math;
pub mod string;

// ─── Export ───────────────────────────────────────────────────────────────────

pub type LibFn = fn(&mut CallFrame<'_>) -> Result<usize, RuntimeError>;

pub enum ExportKind {
    Function(LibFn),
    Constant(Value),
}

pub struct Export {
    pub name: &'static str,
    pub kind: ExportKind,
}

pub(crate) fn f(name: &'static str, func: LibFn) -> Export {
    Export { name, kind: ExportKind::Function(func) }
}

pub(crate) fn c(name: &'static str, value: Value) -> Export {
    Export { name, kind: ExportKind::Constant(value) }
}

// ─── Library interface ────────────────────────────────────────────────────────

/// A set of built-ins opened into a context. Libraries with `global() ==
/// true` install their exports directly as globals; the rest become a table
/// named after the library.
pub trait Library {
    fn name(&self) -> &'static str;
    fn exports(&self) -> Vec<Export>;

    fn global(&self) -> bool { false }

    fn open(&self, ctx: &mut Context) {
        let prefix = if self.global() { String::new() } else { format!("{}.", self.name()) };
        let mut table = Table::new();
        for export in self.exports() {
            let value = match export.kind {
                ExportKind::Function(func) => {
                    let native = NativeFunction::new(&format!("{prefix}{}", export.name), func);
                    Value::Function(crate::runtime::value::Function::Native(native))
                }
                ExportKind::Constant(v) => v,
            };
            if self.global() {
                ctx.set_global_value(export.name, value);
            } else {
                table.set_str(export.name, value);
            }
        }
        if !self.global() {
            ctx.set_global_value(self.name(), Value::new_table(table));
        }
    }
}

// ─── Registry ─────────────────────────────────────────────────────────────────

pub struct LibraryRegistry {
    libraries: Vec<Box<dyn Library>>,
}

impl LibraryRegistry {
    pub fn new() -> Self { Self { libraries: Vec::new() } }

    pub fn register(&mut self, lib: Box<dyn Library>) { self.libraries.push(lib); }

    pub fn get(&self, name: &str) -> Option<&dyn Library> {
        self.libraries.iter().find(|l| l.name() == name).map(|l| l.as_ref())
    }

    pub fn open_all(&self, ctx: &mut Context) {
        for lib in &self.libraries {
            lib.open(ctx);
        }
    }

    pub fn standard() -> Self {
        let mut r = Self::new();
        r.register(Box::new(base::BaseLibrary));
        r.register(Box::new(math::MathLibrary));
        r.register(Box::new(string::StringLibrary));
        r
    }
}

impl Default for LibraryRegistry {
    fn default() -> Self { Self::standard() }
}
