use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::error::{ErrorCode, RuntimeError, ScriptError};
use crate::namespaces::LibraryRegistry;
use crate::runtime::frame::CallFrame;
use crate::runtime::heap::{Block, Heap};
use crate::runtime::interpreter::Interpreter;
use crate::runtime::value::{NativeFunction, Table, Value};

// ─── Type hooks ──────────────────────────────────────────────────────────────

/// Projects a native object to an embedded object of another native type.
pub type CastFn = Rc<dyn Fn(&mut dyn Any, TypeId) -> Option<&mut dyn Any>>;

/// Hooks the runtime consults for userdata carrying a given tag.
pub struct Metatable {
    pub name: Rc<str>,
    /// Native type stored in blocks with this tag.
    pub native: TypeId,
    /// `obj.key` / `obj:key(...)`; called with `(obj, key)`.
    pub index: Option<NativeFunction>,
    /// `obj.key = v`; called with `(obj, key, v)`.
    pub newindex: Option<NativeFunction>,
    /// Finalizer; called with `(obj)` before the block is reclaimed.
    pub gc: Option<NativeFunction>,
    pub cast: Option<CastFn>,
}

impl Metatable {
    pub fn new(name: &str, native: TypeId) -> Self {
        Self { name: Rc::from(name), native, index: None, newindex: None, gc: None, cast: None }
    }
}

// ─── Context ─────────────────────────────────────────────────────────────────

/// One runtime instance: globals, value stack, registered types and the
/// heap. Single-threaded; every value handle is `Rc`-based.
pub struct Context {
    globals: Rc<RefCell<Table>>,
    stack: Vec<Value>,
    types: HashMap<String, Rc<Metatable>>,
    heap: Heap,
    config: RuntimeConfig,
    output: Vec<String>,
    depth: usize,
    closed: bool,
}

impl Context {
    pub fn new(config: RuntimeConfig) -> Self {
        let open_stdlib = config.open_stdlib;
        let mut ctx = Self {
            globals: Rc::new(RefCell::new(Table::new())),
            stack: Vec::new(),
            types: HashMap::new(),
            heap: Heap::new(),
            config,
            output: Vec::new(),
            depth: 0,
            closed: false,
        };
        if open_stdlib {
            LibraryRegistry::standard().open_all(&mut ctx);
        }
        ctx
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // ── value stack ──────────────────────────────────────────────────────────

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    pub fn top(&self) -> Option<&Value> {
        self.stack.last()
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub(crate) fn stack_slice(&self, from: usize, to: usize) -> &[Value] {
        let to = to.min(self.stack.len());
        let from = from.min(to);
        &self.stack[from..to]
    }

    // ── globals ──────────────────────────────────────────────────────────────

    /// Pop the top of the value stack into the global `name`.
    pub fn set_global(&mut self, name: &str) -> Result<(), RuntimeError> {
        let value = self.pop().ok_or_else(|| {
            RuntimeError::with_code(ErrorCode::R009, format!("no value on the stack to assign to global '{name}'"))
        })?;
        self.set_global_value(name, value);
        Ok(())
    }

    pub fn set_global_value(&mut self, name: &str, value: Value) {
        self.globals.borrow_mut().set_str(name, value);
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.globals.borrow().get_str(name)
    }

    pub fn globals(&self) -> Rc<RefCell<Table>> {
        self.globals.clone()
    }

    // ── types ────────────────────────────────────────────────────────────────

    /// Register hooks under `meta.name`. Returns `false` and leaves the
    /// existing entry untouched when the name is taken.
    pub fn define_type(&mut self, meta: Metatable) -> bool {
        if self.types.contains_key(&*meta.name) {
            return false;
        }
        self.types.insert(meta.name.to_string(), Rc::new(meta));
        true
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn metatable(&self, name: &str) -> Option<Rc<Metatable>> {
        self.types.get(name).cloned()
    }

    // ── heap ─────────────────────────────────────────────────────────────────

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Reserve a block for a native object. Collects first when the
    /// configured threshold would be exceeded.
    pub fn new_userdata(&mut self, tag: &str, size: usize) -> Rc<Block> {
        if let Some(threshold) = self.config.gc_threshold {
            if self.heap.bytes_in_use() + size > threshold {
                self.collect_garbage();
            }
        }
        self.heap.reserve(tag, size)
    }

    /// Finalize and release every block no longer referenced from script
    /// values. Returns the number of blocks reclaimed.
    pub fn collect_garbage(&mut self) -> usize {
        let mut reclaimed = 0;
        loop {
            let dead = self.heap.unreachable();
            if dead.is_empty() {
                break;
            }
            for block in &dead {
                self.finalize_block(block);
            }
            self.heap.release(&dead);
            reclaimed += dead.len();
        }
        debug!(
            reclaimed,
            bytes_in_use = self.heap.bytes_in_use(),
            total_reserved = self.heap.total_reserved(),
            total_released = self.heap.total_released(),
            "collected garbage"
        );
        reclaimed
    }

    fn finalize_block(&mut self, block: &Rc<Block>) {
        if !block.is_live() {
            return;
        }
        let hook = self.types.get(block.tag()).and_then(|mt| mt.gc.clone());
        if let Some(hook) = hook {
            if let Err(e) = self.call_native(&hook, vec![Value::UserData(block.clone())]) {
                warn!(type_name = block.tag(), error = %e, "finalizer failed");
            }
        }
        // no hook, or the hook failed before finalizing
        block.finalize();
    }

    /// Finalize every live object (newest first) and drop all script
    /// state. Idempotent; runs automatically on drop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.stack.clear();
        let blocks = self.heap.drain_newest_first();
        debug!(blocks = blocks.len(), total_reserved = self.heap.total_reserved(), "closing context");
        for block in &blocks {
            self.finalize_block(block);
        }
        self.globals.borrow_mut().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ── output ───────────────────────────────────────────────────────────────

    pub fn write_line(&mut self, line: String) {
        if self.config.capture_output {
            self.output.push(line);
        } else {
            println!("{line}");
        }
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    // ── calls ────────────────────────────────────────────────────────────────

    pub(crate) fn enter_call(&mut self) -> Result<(), RuntimeError> {
        if self.depth >= self.config.max_call_depth {
            return Err(RuntimeError::with_code(
                ErrorCode::R007,
                format!("stack overflow (call depth exceeded {})", self.config.max_call_depth),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave_call(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Run a native function with `args` in a fresh frame on top of the
    /// value stack. The stack is restored on return.
    pub fn call_native(&mut self, f: &NativeFunction, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
        let base = self.stack.len();
        let argc = args.len();
        self.stack.extend(args);
        let result = {
            let mut frame = CallFrame::new(self, base, argc, f.name_rc());
            f.call(&mut frame)
        };
        match result {
            Ok(n) => {
                let top = self.stack.len();
                let n = n.min(top.saturating_sub(base));
                let results = self.stack.split_off(top - n);
                self.stack.truncate(base);
                Ok(results)
            }
            Err(e) => {
                self.stack.truncate(base);
                Err(e)
            }
        }
    }

    /// Call any function value.
    pub fn call(&mut self, f: &Value, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
        Interpreter::new(self).call_value(f, args, 0)
    }

    /// Compile and run `source`. The chunk's return values are pushed onto
    /// the value stack; their count is returned.
    pub fn execute(&mut self, source: &str) -> Result<usize, ScriptError> {
        if self.closed {
            return Err(RuntimeError::new(0, "context is closed").into());
        }
        let chunk = crate::compile(source)?;
        debug!(bytes = source.len(), "executing chunk");
        let results = Interpreter::new(self).run_chunk(&chunk)?;
        let n = results.len();
        self.stack.extend(results);
        Ok(n)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.close();
    }
}
