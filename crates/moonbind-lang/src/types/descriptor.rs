use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::error::BindingError;
use super::member::Member;

/// Derived object → embedded base object.
pub type Projection = Rc<dyn Fn(&mut dyn Any) -> Option<&mut dyn Any>>;

/// Pins a closure to the higher-ranked projection signature so the output
/// borrow is tied to the input.
pub(crate) fn projection<F>(f: F) -> F
where
    F: for<'o> Fn(&'o mut dyn Any) -> Option<&'o mut dyn Any>,
{
    f
}

// ─── Base links ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct BaseLink {
    descriptor: Rc<TypeDescriptor>,
    project: Projection,
}

impl BaseLink {
    pub fn new(descriptor: Rc<TypeDescriptor>, project: Projection) -> Self {
        Self { descriptor, project }
    }

    pub fn descriptor(&self) -> &Rc<TypeDescriptor> {
        &self.descriptor
    }
}

impl fmt::Debug for BaseLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BaseLink({})", self.descriptor.name)
    }
}

// ─── TypeDescriptor ───────────────────────────────────────────────────────────

/// Script-facing shape of one native type: its name, its bases and its
/// member table. Bases must exist before the derived descriptor is built,
/// so the base graph is acyclic.
pub struct TypeDescriptor {
    name: String,
    native: TypeId,
    bases: Vec<BaseLink>,
    members: RefCell<HashMap<String, Member>>,
    sealed: Cell<bool>,
}

impl TypeDescriptor {
    pub fn new(name: &str, native: TypeId, bases: Vec<BaseLink>) -> Self {
        Self {
            name: name.to_string(),
            native,
            bases,
            members: RefCell::new(HashMap::new()),
            sealed: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bases(&self) -> &[BaseLink] {
        &self.bases
    }

    pub fn has_bases(&self) -> bool {
        !self.bases.is_empty()
    }

    pub fn native_type(&self) -> TypeId {
        self.native
    }

    pub fn member_count(&self) -> usize {
        self.members.borrow().len()
    }

    // ── member table ─────────────────────────────────────────────────────────

    pub fn register_member(&self, name: &str, member: Member) -> Result<(), BindingError> {
        if self.sealed.get() {
            return Err(BindingError::Sealed(self.name.clone()));
        }
        let mut members = self.members.borrow_mut();
        if members.contains_key(name) {
            return Err(BindingError::DuplicateMember {
                type_name: self.name.clone(),
                member: name.to_string(),
            });
        }
        members.insert(name.to_string(), member);
        Ok(())
    }

    /// Local members first, then each base depth-first in registration
    /// order. The first hit wins.
    pub fn find_named_member(&self, name: &str) -> Option<Member> {
        let mut visited = HashSet::new();
        self.find_in(name, &mut visited)
    }

    fn find_in(&self, name: &str, visited: &mut HashSet<*const TypeDescriptor>) -> Option<Member> {
        if !visited.insert(self as *const _) {
            return None;
        }
        if let Some(m) = self.members.borrow().get(name) {
            return Some(m.clone());
        }
        self.bases.iter().find_map(|b| b.descriptor.find_in(name, visited))
    }

    // ── installation ─────────────────────────────────────────────────────────

    /// Seal this descriptor and every transitive base. Installed dispatch
    /// walks the bases at lookup time, so they freeze together.
    pub fn seal(&self) {
        let mut visited = HashSet::new();
        self.seal_in(&mut visited);
    }

    fn seal_in(&self, visited: &mut HashSet<*const TypeDescriptor>) {
        if !visited.insert(self as *const _) {
            return;
        }
        self.sealed.set(true);
        for b in &self.bases {
            b.descriptor.seal_in(visited);
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.get()
    }

    // ── projection ───────────────────────────────────────────────────────────

    /// Whether `target` is this type or one of its (transitive) bases.
    pub fn reaches(&self, target: TypeId) -> bool {
        self.native == target || self.bases.iter().any(|b| b.descriptor.reaches(target))
    }

    /// Walk base links from an object of this type down to its embedded
    /// object of type `target`.
    pub fn project<'o>(&self, obj: &'o mut dyn Any, target: TypeId) -> Option<&'o mut dyn Any> {
        if Any::type_id(&*obj) == target {
            return Some(obj);
        }
        let link = self.bases.iter().find(|b| b.descriptor.reaches(target))?;
        let inner = (link.project)(obj)?;
        link.descriptor.project(inner, target)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.members.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("bases", &self.bases)
            .field("members", &names)
            .field("sealed", &self.sealed.get())
            .finish()
    }
}
