//! SmartMap: the container that hands out [`Handle`]s.

use crate::error::Error;
use crate::handle::Handle;
use crate::lifecycle::LifecycleTables;
use crate::store::{ContainerId, Store};
use core::borrow::Borrow;
use core::fmt;
use core::hash::Hash;

/// Heterogeneous keyed store.
///
/// `lookup::<T, Q>(key)` returns a handle to the `T` stored under `key`,
/// creating a default `T` the first time that (type, key) pair is seen.
/// Any number of value and key types can be mixed on one map; a value
/// of type `T` under key `k` is independent from every other type, key,
/// and map.
///
/// Keys are passed borrowed and stored owned (`Q::Owned`), so `&str` and
/// `&String` keys address the same `String`-keyed entry.
///
/// Relocation:
/// - `clone` / `clone_from` copy every value; handles stay with the source.
/// - `take` / `assign_from` move every value to another map identity and
///   re-target existing handles to it.
/// - Dropping the map detaches its handles.
/// - A plain Rust move keeps the map's identity; handles are unaffected.
///
/// Each (map, type) pair keeps its values in its own cell. A value borrow
/// from [`Handle::get`] or [`Handle::get_mut`] therefore never blocks
/// moving or dropping any map, nor anything done to other maps or types.
/// Copying a map panics while one of its own values is mutably borrowed,
/// the way cloning a `RefCell` does.
pub struct SmartMap {
    id: ContainerId,
    store: Store,
    tables: LifecycleTables,
}

impl SmartMap {
    /// Empty map in the calling thread's [`Store::current`].
    pub fn new() -> Self {
        Self::with_store(&Store::current())
    }

    pub fn with_store(store: &Store) -> Self {
        Self {
            id: store.inner.fresh_container(),
            store: store.clone(),
            tables: LifecycleTables::default(),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Handle to the `T` stored under `key`.
    ///
    /// `T: Clone` is required even if the map is never copied: the first
    /// lookup of a type installs the copier for it along with the mover.
    ///
    /// # Panics
    /// If `key` is new and a value of this map's `T` is currently borrowed
    /// through a handle. See [`SmartMap::try_lookup`].
    pub fn lookup<T, Q>(&mut self, key: &Q) -> Handle<T>
    where
        T: Default + Clone + 'static,
        Q: ?Sized + Hash + Eq + ToOwned,
        Q::Owned: Eq + Hash + Clone + Borrow<Q> + 'static,
    {
        match self.try_lookup(key) {
            Ok(handle) => handle,
            Err(e) => panic!("SmartMap::lookup: {e}"),
        }
    }

    /// Like [`SmartMap::lookup`], but reports [`Error::AlreadyBorrowed`]
    /// instead of panicking.
    pub fn try_lookup<T, Q>(&mut self, key: &Q) -> Result<Handle<T>, Error>
    where
        T: Default + Clone + 'static,
        Q: ?Sized + Hash + Eq + ToOwned,
        Q::Owned: Eq + Hash + Clone + Borrow<Q> + 'static,
    {
        let inner = &self.store.inner;
        let ty = inner.index_of::<T>();
        let key_ty = inner.index_of::<Q::Owned>();
        let (pool, slot) = inner.slot_for::<T, Q>(self.id, ty, key_ty, key)?;
        self.tables.install::<T, Q::Owned>(ty, key_ty);
        Ok(Handle::attach(&self.store, ty, self.id, pool, slot))
    }

    /// Move this map's contents into a new map and leave `self` empty.
    ///
    /// Every handle obtained from `self` now resolves through the returned
    /// map. `self` keeps its identity and can be used again.
    pub fn take(&mut self) -> SmartMap {
        let mut moved = SmartMap::with_store(&self.store);
        moved.tables = core::mem::take(&mut self.tables);
        moved
            .tables
            .move_all(&self.store.inner, self.id, Some(moved.id));
        moved
    }

    /// Replace this map's contents with `other`'s, leaving `other` empty.
    ///
    /// Handles into the previous contents of `self` become detached;
    /// handles obtained from `other` are re-targeted to `self`.
    pub fn assign_from(&mut self, other: &mut SmartMap) {
        self.erase();
        self.adopt_store(&other.store);
        self.tables = core::mem::take(&mut other.tables);
        self.tables
            .move_all(&self.store.inner, other.id, Some(self.id));
    }

    fn erase(&mut self) {
        self.tables.move_all(&self.store.inner, self.id, None);
        self.tables = LifecycleTables::default();
    }

    /// Switch to `store`, taking a fresh identity there. Only valid on a
    /// map with no state.
    fn adopt_store(&mut self, store: &Store) {
        if !Store::ptr_eq(&self.store, store) {
            self.store = store.clone();
            self.id = store.inner.fresh_container();
        }
    }
}

impl Default for SmartMap {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SmartMap {
    /// Deep copy under a new identity. Handles into `self` keep pointing
    /// at `self`.
    fn clone(&self) -> Self {
        let copy = SmartMap {
            id: self.store.inner.fresh_container(),
            store: self.store.clone(),
            tables: self.tables.clone(),
        };
        copy.tables.copy_all(&self.store.inner, self.id, copy.id);
        copy
    }

    /// Erase this map's contents, then copy `source`'s in.
    fn clone_from(&mut self, source: &Self) {
        self.erase();
        self.adopt_store(&source.store);
        self.tables = source.tables.clone();
        self.tables.copy_all(&self.store.inner, source.id, self.id);
    }
}

impl Drop for SmartMap {
    fn drop(&mut self) {
        self.tables.move_all(&self.store.inner, self.id, None);
    }
}

impl fmt::Debug for SmartMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartMap")
            .field("id", &self.id)
            .field("types", &self.tables)
            .finish()
    }
}
