use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

use crate::runtime::value::{NativeFunction, Value};

// ─── Field marshaling ─────────────────────────────────────────────────────────

/// Dynamic kind a field marshals to and from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Boolean,
    Integer,
    String,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Boolean => "boolean",
            FieldKind::Integer => "integer",
            FieldKind::String  => "string",
        }
    }
}

/// Native types that can back a script-visible field.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be exposed as a script field",
    label = "unsupported field type",
    note = "supported field types are `bool`, `i8`, `i16`, `i32`, `i64` and `String`"
)]
pub trait FieldType: Sized + 'static {
    const KIND: FieldKind;

    fn to_value(&self) -> Value;

    /// `None` when `v` has the wrong kind or does not fit.
    fn from_value(v: &Value) -> Option<Self>;
}

impl FieldType for bool {
    const KIND: FieldKind = FieldKind::Boolean;

    fn to_value(&self) -> Value { Value::Bool(*self) }

    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

macro_rules! integer_field {
    ($($t:ty),*) => {$(
        impl FieldType for $t {
            const KIND: FieldKind = FieldKind::Integer;

            fn to_value(&self) -> Value { Value::Integer(i64::from(*self)) }

            fn from_value(v: &Value) -> Option<Self> {
                let n = match v {
                    Value::Integer(n) => *n,
                    Value::Number(f) => crate::runtime::value::float_to_integer(*f)?,
                    _ => return None,
                };
                <$t>::try_from(n).ok()
            }
        }
    )*};
}

integer_field!(i8, i16, i32, i64);

impl FieldType for String {
    const KIND: FieldKind = FieldKind::String;

    fn to_value(&self) -> Value { Value::from(self.as_str()) }

    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Str(s) => Some(s.to_string()),
            _ => None,
        }
    }
}

// ─── Accessors ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    /// The object handed in is not the field's owner type.
    WrongOwner,
    /// The value's dynamic kind does not match the field.
    Mismatch,
}

type Getter = Rc<dyn Fn(&mut dyn Any) -> Option<Value>>;
type Setter = Rc<dyn Fn(&mut dyn Any, &Value) -> Result<(), FieldError>>;

/// Getter/setter pair over a field of `owner`. Callers project derived
/// objects to `owner` before invoking either side.
#[derive(Clone)]
pub struct FieldAccessor {
    kind: FieldKind,
    owner: TypeId,
    get: Getter,
    set: Setter,
}

impl FieldAccessor {
    pub fn new<T: Any, F: FieldType>(projection: impl Fn(&mut T) -> &mut F + 'static) -> Self {
        let projection = Rc::new(projection);
        let read = projection.clone();
        let get: Getter = Rc::new(move |obj: &mut dyn Any| {
            obj.downcast_mut::<T>().map(|t| read(t).to_value())
        });
        let set: Setter = Rc::new(move |obj: &mut dyn Any, v: &Value| {
            let t = obj.downcast_mut::<T>().ok_or(FieldError::WrongOwner)?;
            // convert first so a mismatch leaves the field untouched
            let new = F::from_value(v).ok_or(FieldError::Mismatch)?;
            *projection(t) = new;
            Ok(())
        });
        Self { kind: F::KIND, owner: TypeId::of::<T>(), get, set }
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn owner(&self) -> TypeId {
        self.owner
    }

    pub fn get(&self, obj: &mut dyn Any) -> Option<Value> {
        (self.get)(obj)
    }

    pub fn set(&self, obj: &mut dyn Any, v: &Value) -> Result<(), FieldError> {
        (self.set)(obj, v)
    }
}

impl fmt::Debug for FieldAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldAccessor({})", self.kind.name())
    }
}

// ─── Member ───────────────────────────────────────────────────────────────────

/// What a name on a native type resolves to.
#[derive(Debug, Clone)]
pub enum Member {
    Method(NativeFunction),
    Field(FieldAccessor),
}
