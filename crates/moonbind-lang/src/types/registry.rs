//! Type registry: the builder for one native type's script binding.
//!
//! Members and free functions are collected here, then `generate_bindings`
//! installs the dispatch hooks and a namespace table into a context.
//! Installing seals the descriptor; a sealed member table never changes
//! while scripts dispatch through it.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::{BindingError, ErrorCode, RuntimeError};
use crate::runtime::context::{CastFn, Context, Metatable};
use crate::runtime::frame::CallFrame;
use crate::runtime::heap::{Block, ObjectRef, Unavailable};
use crate::runtime::value::{Function, NativeFunction, Table, Value};
use super::descriptor::{projection, BaseLink, TypeDescriptor};
use super::member::{FieldAccessor, FieldError, FieldType, Member};

/// Namespace entry reserved for the default constructor.
pub const CREATE: &str = "Create";

// ─── Bases ────────────────────────────────────────────────────────────────────

/// A base type embedded in `D`, with the projection from `D` to it.
pub struct Base<D> {
    link: BaseLink,
    _marker: PhantomData<fn(&mut D)>,
}

impl<D: Any> Base<D> {
    pub fn of<B: Any>(registry: &TypeRegistry<B>, project: impl Fn(&mut D) -> &mut B + 'static) -> Self {
        let f = projection(move |obj| {
            obj.downcast_mut::<D>().map(|d| project(d) as &mut dyn Any)
        });
        Self {
            link: BaseLink::new(registry.descriptor.clone(), Rc::new(f)),
            _marker: PhantomData,
        }
    }
}

fn cast_hook<F>(f: F) -> F
where
    F: for<'o> Fn(&'o mut dyn Any, TypeId) -> Option<&'o mut dyn Any>,
{
    f
}

// ─── TypeRegistry ─────────────────────────────────────────────────────────────

pub struct TypeRegistry<T> {
    descriptor: Rc<TypeDescriptor>,
    free_functions: BTreeMap<String, NativeFunction>,
    factory: Rc<dyn Fn() -> T>,
}

impl<T: Any + Default> TypeRegistry<T> {
    pub fn new(name: &str) -> Self {
        Self::with_factory(name, Vec::new(), T::default)
    }

    pub fn with_bases(name: &str, bases: Vec<Base<T>>) -> Self {
        Self::with_factory(name, bases, T::default)
    }
}

impl<T: Any> TypeRegistry<T> {
    /// Registry whose `Create` and `allocate` build instances with `factory`.
    pub fn with_factory(name: &str, bases: Vec<Base<T>>, factory: impl Fn() -> T + 'static) -> Self {
        let links = bases.into_iter().map(|b| b.link).collect();
        Self {
            descriptor: Rc::new(TypeDescriptor::new(name, TypeId::of::<T>(), links)),
            free_functions: BTreeMap::new(),
            factory: Rc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &Rc<TypeDescriptor> {
        &self.descriptor
    }

    // ── registration ─────────────────────────────────────────────────────────

    /// Expose `func` as `obj:name(...)`. The receiver is argument 1.
    pub fn register_method(
        &mut self,
        name: &str,
        func: impl Fn(&mut CallFrame<'_>) -> Result<usize, RuntimeError> + 'static,
    ) -> Result<(), BindingError> {
        self.descriptor.register_member(name, Member::Method(NativeFunction::new(name, func)))
    }

    /// Expose the field reached by `project` as `obj.name`.
    pub fn register_field<F: FieldType>(
        &mut self,
        name: &str,
        project: impl Fn(&mut T) -> &mut F + 'static,
    ) -> Result<(), BindingError> {
        self.descriptor.register_member(name, Member::Field(FieldAccessor::new(project)))
    }

    /// Expose `func` as `TypeName.name(...)`, callable without an instance.
    pub fn register_free_function(
        &mut self,
        name: &str,
        func: impl Fn(&mut CallFrame<'_>) -> Result<usize, RuntimeError> + 'static,
    ) -> Result<(), BindingError> {
        if self.descriptor.is_sealed() {
            return Err(BindingError::Sealed(self.name().to_string()));
        }
        if name == CREATE || self.free_functions.contains_key(name) {
            return Err(BindingError::DuplicateMember {
                type_name: self.name().to_string(),
                member: name.to_string(),
            });
        }
        let qualified = format!("{}.{name}", self.name());
        self.free_functions.insert(name.to_string(), NativeFunction::new(&qualified, func));
        Ok(())
    }

    // ── installation ─────────────────────────────────────────────────────────

    /// Install the dispatch hooks and the global namespace table for this
    /// type into `ctx`, then seal the descriptor and its bases. Fails without
    /// touching `ctx` when the type or a global of the same name exists.
    pub fn generate_bindings(&self, ctx: &mut Context) -> Result<(), BindingError> {
        let name = self.name();
        if ctx.has_type(name) {
            return Err(BindingError::DescriptorCollision(name.to_string()));
        }
        if !ctx.get_global(name).is_nil() {
            return Err(BindingError::GlobalCollision(name.to_string()));
        }

        let descriptor = self.descriptor.clone();
        let cast: CastFn = Rc::new(cast_hook(move |obj, target| descriptor.project(obj, target)));

        let mut meta = Metatable::new(name, TypeId::of::<T>());
        meta.index = Some(index_hook(self.descriptor.clone()));
        meta.newindex = Some(newindex_hook(self.descriptor.clone()));
        meta.gc = Some(gc_hook(name));
        meta.cast = Some(cast);
        ctx.define_type(meta);

        let mut namespace = Table::new();
        for (fname, func) in &self.free_functions {
            namespace.set_str(fname, Value::Function(Function::Native(func.clone())));
        }
        namespace.set_str(CREATE, Value::Function(Function::Native(self.create_function())));
        ctx.set_global_value(name, Value::new_table(namespace));

        self.descriptor.seal();
        debug!(
            type_name = name,
            members = self.descriptor.member_count(),
            free_functions = self.free_functions.len(),
            bases = self.descriptor.bases().len(),
            "installed type bindings"
        );
        Ok(())
    }

    fn create_function(&self) -> NativeFunction {
        let name: Rc<str> = Rc::from(self.name());
        let factory = self.factory.clone();
        NativeFunction::new(&format!("{name}.{CREATE}"), move |frame| {
            let block = spawn(frame.context(), &name, factory())
                .map_err(|e| RuntimeError::with_code(ErrorCode::R001, e.to_string()))?;
            frame.push(Value::UserData(block));
            Ok(1)
        })
    }

    // ── allocation ───────────────────────────────────────────────────────────

    /// Allocate a default instance in `ctx`'s heap and push its handle onto
    /// the value stack.
    pub fn allocate(&self, ctx: &mut Context) -> Result<ObjectRef<T>, BindingError> {
        self.allocate_with(ctx, (self.factory)())
    }

    pub fn allocate_with(&self, ctx: &mut Context, value: T) -> Result<ObjectRef<T>, BindingError> {
        let block = spawn(ctx, self.name(), value)?;
        let handle = ObjectRef::new(&block);
        ctx.push(Value::UserData(block));
        Ok(handle)
    }
}

fn spawn<T: Any>(ctx: &mut Context, name: &str, value: T) -> Result<Rc<Block>, BindingError> {
    match ctx.metatable(name) {
        Some(meta) if meta.native == TypeId::of::<T>() => {}
        _ => return Err(BindingError::NotInstalled(name.to_string())),
    }
    let block = ctx.new_userdata(name, size_of::<T>());
    block.construct(value);
    debug!(type_name = name, size = block.size(), "allocated native object");
    Ok(block)
}

// ─── Dispatch hooks ───────────────────────────────────────────────────────────

fn missing_member(key: &str) -> RuntimeError {
    RuntimeError::with_code(ErrorCode::R002, format!("failed to find key '{key}'"))
}

fn unavailable(block: &Block, why: Unavailable) -> RuntimeError {
    RuntimeError::with_code(ErrorCode::R008, why.describe(block.tag()))
}

fn bad_self(descriptor: &TypeDescriptor) -> RuntimeError {
    RuntimeError::with_code(ErrorCode::R005, format!("bad self for a field of '{}'", descriptor.name()))
}

fn index_hook(descriptor: Rc<TypeDescriptor>) -> NativeFunction {
    NativeFunction::new(&format!("{}.__index", descriptor.name()), move |frame| {
        let block = frame.check_userdata(1, descriptor.name())?;
        let key = frame.arg(2).to_string();
        trace!(type_name = descriptor.name(), key = %key, "index");
        let value = match descriptor.find_named_member(&key) {
            Some(Member::Method(method)) => Value::Function(Function::Native(method)),
            Some(Member::Field(field)) => block
                .with_mut(|obj| descriptor.project(obj, field.owner()).and_then(|o| field.get(o)))
                .map_err(|why| unavailable(&block, why))?
                .ok_or_else(|| bad_self(&descriptor))?,
            None => return Err(missing_member(&key)),
        };
        frame.push(value);
        Ok(1)
    })
}

fn newindex_hook(descriptor: Rc<TypeDescriptor>) -> NativeFunction {
    NativeFunction::new(&format!("{}.__newindex", descriptor.name()), move |frame| {
        let block = frame.check_userdata(1, descriptor.name())?;
        let key = frame.arg(2).to_string();
        let value = frame.arg(3);
        trace!(type_name = descriptor.name(), key = %key, "newindex");
        let field = match descriptor.find_named_member(&key) {
            Some(Member::Field(field)) => field,
            Some(Member::Method(_)) => {
                return Err(RuntimeError::with_code(ErrorCode::R004, format!("cannot assign to method '{key}'")));
            }
            None => return Err(missing_member(&key)),
        };
        let outcome = block
            .with_mut(|obj| match descriptor.project(obj, field.owner()) {
                Some(target) => field.set(target, &value),
                None => Err(FieldError::WrongOwner),
            })
            .map_err(|why| unavailable(&block, why))?;
        match outcome {
            Ok(()) => Ok(0),
            Err(FieldError::Mismatch) => Err(RuntimeError::with_code(
                ErrorCode::R003,
                format!(
                    "type mismatch: field '{key}' expects {}, got {}",
                    field.kind().name(),
                    value.type_name()
                ),
            )),
            Err(FieldError::WrongOwner) => Err(bad_self(&descriptor)),
        }
    })
}

/// Drops the native value in place; the block itself stays with the heap.
fn gc_hook(name: &str) -> NativeFunction {
    let tag: Rc<str> = Rc::from(name);
    NativeFunction::new(&format!("{name}.__gc"), move |frame| {
        let block = frame.check_userdata(1, &tag)?;
        if block.finalize() {
            debug!(type_name = %tag, "finalized native object");
        }
        Ok(0)
    })
}
