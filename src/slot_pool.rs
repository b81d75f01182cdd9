//! SlotPool: growable storage with stable slot ids.
//!
//! Backed by a `SlotMap`, so a freed slot is reused before the pool
//! grows and an id keeps naming the same slot even after the backing
//! vector reallocates. Callers never hold addresses into the pool, only
//! ids, which is what makes growth invisible to handles.

use crate::error::Error;
use slotmap::{Key, SlotMap};

slotmap::new_key_type! {
    /// Stable identifier of a value slot within one pool.
    pub struct SlotId;
}

#[derive(Clone, Debug)]
pub(crate) struct SlotPool<T, I: Key = SlotId> {
    slots: SlotMap<I, T>,
}

impl<T, I: Key> Default for SlotPool<T, I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, I: Key> SlotPool<T, I> {
    pub(crate) fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
        }
    }

    /// Activate a slot holding `value`: a free slot if one exists,
    /// otherwise a new one at the end.
    pub(crate) fn allocate(&mut self, value: T) -> I {
        let before = self.slots.capacity();
        let id = self.slots.insert(value);
        let after = self.slots.capacity();
        if after != before {
            tracing::trace!(
                ty = core::any::type_name::<T>(),
                from = before,
                to = after,
                "slot pool grew"
            );
        }
        id
    }

    /// Free a slot. Its id stops resolving; the slot may be handed out again.
    pub(crate) fn deactivate(&mut self, id: I) -> Option<T> {
        self.slots.remove(id)
    }

    pub(crate) fn access(&self, id: I) -> Result<&T, Error> {
        self.slots.get(id).ok_or(Error::InvalidHandle)
    }

    pub(crate) fn access_mut(&mut self, id: I) -> Result<&mut T, Error> {
        self.slots.get_mut(id).ok_or(Error::InvalidHandle)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Active slots; used to visit registered handles.
    pub(crate) fn active(&self) -> impl Iterator<Item = &T> {
        self.slots.values()
    }
}
