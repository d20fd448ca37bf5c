//! Per-operation state of one serialization or deserialization call.

use core::any::{Any, TypeId};
use core::fmt;
use core::ops::{Deref, DerefMut};

use crate::config::SerializationConfig;
use crate::error::{Error, Result};
use crate::hash::HashMap;
use crate::value::SharedModel;

// -----------------------------------------------------------------------------
// RefId

/// Identity of a model instance: the address of its data.
///
/// A model borrowed through a [`Shared`](crate::Shared) handle and the handle
/// itself have the same identity. Two equal but distinct instances do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId(usize);

impl RefId {
    #[inline]
    pub fn of<T: ?Sized>(value: &T) -> Self {
        Self(core::ptr::from_ref(value).cast::<()>() as usize)
    }

    #[inline]
    pub(crate) const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }
}

// -----------------------------------------------------------------------------
// Scratch

/// A type-keyed bag where backends keep state for the duration of one call.
#[derive(Default)]
pub struct Scratch {
    slots: HashMap<TypeId, Box<dyn Any>>,
}

impl Scratch {
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.slots.get(&TypeId::of::<T>())?.downcast_ref()
    }

    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.slots.get_mut(&TypeId::of::<T>())?.downcast_mut()
    }

    /// Returns the previous value of this type, if any.
    pub fn insert<T: Any>(&mut self, value: T) -> Option<T> {
        self.slots
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast().ok())
            .map(|old| *old)
    }

    pub fn remove<T: Any>(&mut self) -> Option<T> {
        self.slots
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast().ok())
            .map(|old| *old)
    }

    pub fn get_or_insert_with<T: Any>(&mut self, init: impl FnOnce() -> T) -> &mut T {
        let slot = self
            .slots
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(init()));
        match slot.downcast_mut() {
            Some(value) => value,
            // Slots are keyed by the type id of their content.
            None => unreachable!(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for Scratch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scratch")
            .field("len", &self.slots.len())
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// SerializationContext

/// State shared by every nested step of one top-level call.
///
/// - the reference stack: identities of the models currently being written,
///   used to detect cycles;
/// - the object table of graph mode: identity to id when writing, id to
///   instance when reading;
/// - the [`Scratch`] bag for backend state;
/// - the configuration, read-only.
///
/// A context is created per call and dropped when the call returns.
pub struct SerializationContext<'c> {
    config: &'c SerializationConfig,
    stack: Vec<RefId>,
    depth: usize,
    written: HashMap<RefId, u32>,
    // Shared instances written in graph mode, held so their addresses stay
    // unique until the call ends.
    pinned: Vec<SharedModel>,
    objects: HashMap<u32, SharedModel>,
    next_id: u32,
    scratch: Scratch,
}

impl<'c> SerializationContext<'c> {
    pub fn new(config: &'c SerializationConfig) -> Self {
        Self {
            config,
            stack: Vec::new(),
            depth: 0,
            written: HashMap::default(),
            pinned: Vec::new(),
            objects: HashMap::default(),
            next_id: 1,
            scratch: Scratch::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &'c SerializationConfig {
        self.config
    }

    /// Current nesting of objects and collections.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    #[inline]
    pub fn scratch_mut(&mut self) -> &mut Scratch {
        &mut self.scratch
    }

    // -------------------------------------------------------------------------
    // Reference stack

    #[inline]
    pub fn push_reference(&mut self, id: RefId) {
        self.stack.push(id);
    }

    /// Removes the most recent occurrence of `id`.
    pub fn pop_reference(&mut self, id: RefId) {
        if let Some(pos) = self.stack.iter().rposition(|x| *x == id) {
            self.stack.remove(pos);
        }
    }

    #[inline]
    pub fn contains_reference(&self, id: RefId) -> bool {
        self.stack.contains(&id)
    }

    /// Enters one nesting level, optionally pushing `reference`.
    ///
    /// Both are undone when the returned guard is dropped, on every path.
    pub fn enter(&mut self, reference: Option<RefId>) -> Result<ContextGuard<'_, 'c>> {
        if self.depth >= self.config.max_depth {
            return Err(Error::DepthExceeded {
                max_depth: self.config.max_depth,
                member: None,
            });
        }
        self.depth += 1;
        if let Some(id) = reference {
            self.push_reference(id);
        }
        Ok(ContextGuard { cx: self, reference })
    }

    // -------------------------------------------------------------------------
    // Object table

    /// The id assigned to `id` when it was first written.
    #[inline]
    pub fn written_id(&self, id: RefId) -> Option<u32> {
        self.written.get(&id).copied()
    }

    /// Assigns the next object id to `id`.
    ///
    /// The caller keeps the instance at `id` alive for the rest of the call,
    /// otherwise a later allocation at the same address would be taken for
    /// it. See [`assign_shared_id`](Self::assign_shared_id).
    pub fn assign_id(&mut self, id: RefId) -> u32 {
        let next = self.next_id;
        self.next_id += 1;
        self.written.insert(id, next);
        next
    }

    /// Assigns the next object id to a shared instance and holds on to it
    /// until the context is dropped.
    ///
    /// Instances created while writing, by a hook or a converter, would
    /// otherwise be freed once written.
    pub fn assign_shared_id(&mut self, shared: &SharedModel) -> u32 {
        self.pinned.push(shared.clone());
        self.assign_id(shared.ref_id())
    }

    /// Makes a deserialized instance reachable for later back-references.
    pub fn register_object(&mut self, id: u32, model: SharedModel) {
        self.objects.insert(id, model);
    }

    pub fn resolve_object(&self, id: u32) -> Option<&SharedModel> {
        self.objects.get(&id)
    }
}

impl fmt::Debug for SerializationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializationContext")
            .field("depth", &self.depth)
            .field("stack", &self.stack)
            .field("written", &self.written.len())
            .field("objects", &self.objects.len())
            .field("scratch", &self.scratch)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// ContextGuard

/// One nesting level of a [`SerializationContext`], see
/// [`SerializationContext::enter`].
pub struct ContextGuard<'g, 'c> {
    cx: &'g mut SerializationContext<'c>,
    reference: Option<RefId>,
}

impl<'c> Deref for ContextGuard<'_, 'c> {
    type Target = SerializationContext<'c>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.cx
    }
}

impl DerefMut for ContextGuard<'_, '_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.cx
    }
}

impl Drop for ContextGuard<'_, '_> {
    fn drop(&mut self) {
        if let Some(id) = self.reference {
            self.cx.pop_reference(id);
        }
        self.cx.depth -= 1;
    }
}
