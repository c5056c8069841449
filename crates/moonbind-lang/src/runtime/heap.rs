//! Runtime-managed memory for native objects.
//!
//! A block goes through `Reserved → Live → Finalized`. The heap owns every
//! block; script values hold additional strong references. A block whose
//! only owner is the heap is unreachable and may be finalized and released.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::runtime::value::Value;

// ─── Blocks ──────────────────────────────────────────────────────────────────

pub enum BlockState {
    /// Memory handed out, object not yet constructed.
    Reserved,
    Live(Box<dyn Any>),
    /// Destructor has run; the block stays owned by the heap until reclaimed.
    Finalized,
}

/// Why a block's object could not be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    Reserved,
    Finalized,
    /// Already mutably borrowed further up the native call chain.
    Borrowed,
}

impl Unavailable {
    pub fn describe(&self, tag: &str) -> String {
        match self {
            Unavailable::Reserved  => format!("{tag} object has not been constructed"),
            Unavailable::Finalized => format!("attempt to use a finalized {tag} object"),
            Unavailable::Borrowed  => format!("{tag} object is already in use"),
        }
    }
}

pub struct Block {
    tag: Rc<str>,
    size: usize,
    state: RefCell<BlockState>,
}

impl Block {
    /// Name of the native type this block was reserved for.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_live(&self) -> bool {
        matches!(*self.state.borrow(), BlockState::Live(_))
    }

    pub fn is_finalized(&self) -> bool {
        matches!(*self.state.borrow(), BlockState::Finalized)
    }

    /// Place a constructed object into a reserved block. Returns `false` and
    /// drops `value` if the block is not in the reserved state.
    pub fn construct<T: Any>(&self, value: T) -> bool {
        let mut state = self.state.borrow_mut();
        if !matches!(*state, BlockState::Reserved) {
            return false;
        }
        *state = BlockState::Live(Box::new(value));
        true
    }

    /// Run the object's destructor in place. Returns `false` when there was
    /// nothing to finalize (reserved, already finalized, or borrowed).
    pub fn finalize(&self) -> bool {
        let old = match self.state.try_borrow_mut() {
            Ok(mut state) => match *state {
                BlockState::Live(_) => std::mem::replace(&mut *state, BlockState::Finalized),
                _ => return false,
            },
            Err(_) => return false,
        };
        // the destructor runs after the borrow is released
        drop(old);
        true
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut dyn Any) -> R) -> Result<R, Unavailable> {
        let mut state = self.state.try_borrow_mut().map_err(|_| Unavailable::Borrowed)?;
        match &mut *state {
            BlockState::Live(obj) => Ok(f(&mut **obj)),
            BlockState::Reserved  => Err(Unavailable::Reserved),
            BlockState::Finalized => Err(Unavailable::Finalized),
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.try_borrow() {
            Ok(s) => match *s {
                BlockState::Reserved  => "reserved",
                BlockState::Live(_)   => "live",
                BlockState::Finalized => "finalized",
            },
            Err(_) => "borrowed",
        };
        write!(f, "Block({}, {} bytes, {state})", self.tag, self.size)
    }
}

// ─── Heap ────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct Heap {
    blocks: Vec<Rc<Block>>,
    bytes_in_use: usize,
    total_reserved: usize,
    total_released: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, tag: &str, size: usize) -> Rc<Block> {
        let block = Rc::new(Block {
            tag: Rc::from(tag),
            size,
            state: RefCell::new(BlockState::Reserved),
        });
        self.blocks.push(block.clone());
        self.bytes_in_use += size;
        self.total_reserved += 1;
        block
    }

    pub fn bytes_in_use(&self) -> usize {
        self.bytes_in_use
    }

    /// Blocks currently owned by the heap, reclaimed or not yet.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn total_reserved(&self) -> usize {
        self.total_reserved
    }

    pub fn total_released(&self) -> usize {
        self.total_released
    }

    /// Blocks referenced by nothing but the heap itself.
    pub(crate) fn unreachable(&self) -> Vec<Rc<Block>> {
        self.blocks
            .iter()
            .filter(|b| Rc::strong_count(b) == 1)
            .cloned()
            .collect()
    }

    /// Drop the heap's ownership of `dead`.
    pub(crate) fn release(&mut self, dead: &[Rc<Block>]) {
        let before = self.blocks.len();
        self.blocks.retain(|b| !dead.iter().any(|d| Rc::ptr_eq(b, d)));
        let released: usize = dead.iter().map(|b| b.size).sum();
        self.bytes_in_use = self.bytes_in_use.saturating_sub(released);
        self.total_released += before - self.blocks.len();
    }

    /// Every block, most recent first. Used at teardown.
    pub(crate) fn drain_newest_first(&mut self) -> Vec<Rc<Block>> {
        let mut blocks = std::mem::take(&mut self.blocks);
        self.total_released += blocks.len();
        self.bytes_in_use = 0;
        blocks.reverse();
        blocks
    }
}

// ─── Native-side references ──────────────────────────────────────────────────

/// Non-owning handle to a native object allocated in a context's heap.
/// Never keeps the object alive; every accessor returns `None` once the
/// object has been finalized or its block reclaimed.
pub struct ObjectRef<T> {
    block: Weak<Block>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        Self { block: self.block.clone(), _marker: PhantomData }
    }
}

impl<T> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block.upgrade() {
            Some(b) => write!(f, "ObjectRef({b:?})"),
            None => f.write_str("ObjectRef(<reclaimed>)"),
        }
    }
}

impl<T: Any> ObjectRef<T> {
    pub(crate) fn new(block: &Rc<Block>) -> Self {
        Self { block: Rc::downgrade(block), _marker: PhantomData }
    }

    pub fn is_alive(&self) -> bool {
        self.block.upgrade().is_some_and(|b| b.is_live())
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.with_mut(|t| f(t))
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let block = self.block.upgrade()?;
        block.with_mut(|obj| obj.downcast_mut::<T>().map(f)).ok().flatten()
    }

    /// Script value for the object, if its block still exists.
    pub fn to_value(&self) -> Option<Value> {
        self.block.upgrade().map(Value::UserData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Tracked(Rc<Cell<usize>>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn block_lifecycle() {
        let mut heap = Heap::new();
        let block = heap.reserve("Thing", 16);
        assert!(!block.is_live());
        assert!(block.construct(5u32));
        assert!(block.is_live());
        assert!(!block.construct(6u32));
        assert!(block.finalize());
        assert!(block.is_finalized());
        assert!(!block.finalize());
    }

    #[test]
    fn finalize_runs_destructor_once() {
        let drops = Rc::new(Cell::new(0));
        let mut heap = Heap::new();
        let block = heap.reserve("Tracked", 8);
        block.construct(Tracked(drops.clone()));
        block.finalize();
        block.finalize();
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn unreachable_only_lists_heap_owned_blocks() {
        let mut heap = Heap::new();
        let kept = heap.reserve("A", 4);
        heap.reserve("B", 4);
        let dead = heap.unreachable();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].tag(), "B");
        heap.release(&dead);
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.bytes_in_use(), 4);
        assert_eq!(heap.total_reserved(), 2);
        assert_eq!(heap.total_released(), 1);
        drop(kept);
    }

    #[test]
    fn object_ref_does_not_keep_block_alive() {
        let mut heap = Heap::new();
        let block = heap.reserve("N", 8);
        block.construct(7i64);
        let r: ObjectRef<i64> = ObjectRef::new(&block);
        assert_eq!(r.with(|n| *n), Some(7));
        drop(block);
        let dead = heap.unreachable();
        heap.release(&dead);
        drop(dead);
        assert!(!r.is_alive());
        assert_eq!(r.with(|n| *n), None);
    }

    #[test]
    fn object_ref_wrong_type_is_none() {
        let mut heap = Heap::new();
        let block = heap.reserve("N", 8);
        block.construct(7i64);
        let r: ObjectRef<String> = ObjectRef::new(&block);
        assert_eq!(r.with(|s| s.len()), None);
    }

    #[test]
    fn nested_borrow_is_reported() {
        let mut heap = Heap::new();
        let block = heap.reserve("N", 8);
        block.construct(1u8);
        let inner = block.with_mut(|_| block.with_mut(|_| ()));
        assert_eq!(inner, Ok(Err(Unavailable::Borrowed)));
    }

    #[test]
    fn teardown_order_is_newest_first() {
        let mut heap = Heap::new();
        heap.reserve("first", 1);
        heap.reserve("second", 1);
        let order: Vec<_> = heap.drain_newest_first().iter().map(|b| b.tag().to_string()).collect();
        assert_eq!(order, vec!["second", "first"]);
        assert!(heap.is_empty());
    }
}
