//! KeyIndex: key to slot-id mapping for one (container, value type, key type).

use crate::slot_pool::SlotId;
use core::borrow::Borrow;
use core::hash::Hash;
use hashbrown::HashMap;

#[derive(Clone, Debug)]
pub(crate) struct KeyIndex<K> {
    ids: HashMap<K, SlotId>,
}

impl<K> Default for KeyIndex<K> {
    fn default() -> Self {
        Self {
            ids: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> KeyIndex<K> {
    pub(crate) fn get<Q>(&self, key: &Q) -> Option<SlotId>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.ids.get(key).copied()
    }

    /// Slot for `key`, calling `allocate` for a fresh slot the first time
    /// the key is seen. The owned key is only built on that first sight.
    /// Once mapped, a key never moves to another slot.
    pub(crate) fn get_or_create<Q, E>(
        &mut self,
        key: &Q,
        allocate: impl FnOnce() -> Result<SlotId, E>,
    ) -> Result<SlotId, E>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq + ToOwned<Owned = K>,
    {
        if let Some(id) = self.get(key) {
            return Ok(id);
        }
        let id = allocate()?;
        self.ids.insert(key.to_owned(), id);
        Ok(id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }
}
