pub mod member;
pub mod descriptor;
pub mod registry;

pub use descriptor::TypeDescriptor;
pub use member::{FieldAccessor, FieldKind, FieldType, Member};
pub use registry::{Base, TypeRegistry};
