//! Store: owner of every container's per-type state.
//!
//! State is partitioned by (type, container). Each pool has its own
//! `RefCell`, shared with the handles into it, so a value borrow pins one
//! pool and nothing else. The registries mapping (type, container) to
//! pools, key indexes and handle registries sit behind `RefCell`s of their
//! own that are only borrowed for the duration of a store call, never
//! while user code runs and never by a handle's value guard.

use crate::error::Error;
use crate::handle::{Binding, HandleRegistry, RegistrationId};
use crate::key_index::KeyIndex;
use crate::slot_pool::{SlotId, SlotPool};
use crate::type_registry::{TypeIndex, TypeRegistry};
use core::any::Any;
use core::borrow::Borrow;
use core::cell::{Cell, RefCell};
use core::fmt;
use core::hash::Hash;
use hashbrown::HashMap;
use std::rc::Rc;

/// Identity token of one [`SmartMap`](crate::SmartMap) within its store.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ContainerId(u64);

/// One (container, type) pool. Handles share the cell, so a value borrow
/// pins only its own pool.
pub(crate) type PoolCell<T> = Rc<RefCell<SlotPool<T>>>;

type Pools<T> = HashMap<ContainerId, PoolCell<T>>;
type Indexes<K> = HashMap<ContainerId, KeyIndex<K>>;

/// State detached from the store during a relocation. Dropped only once
/// every store borrow has been released, since values may own handles
/// or maps of their own.
pub(crate) type Graveyard = Vec<Box<dyn Any>>;

pub(crate) struct StoreInner {
    types: RefCell<TypeRegistry>,
    values: RefCell<HashMap<TypeIndex, Box<dyn Any>>>,
    keys: RefCell<HashMap<(TypeIndex, TypeIndex), Box<dyn Any>>>,
    handles: RefCell<HashMap<(TypeIndex, ContainerId), HandleRegistry>>,
    next_container: Cell<u64>,
}

/// Registry object holding the storage of every map created from it.
///
/// Cloning a `Store` yields another reference to the same registry.
/// Maps built with [`SmartMap::new`](crate::SmartMap::new) share the
/// calling thread's [`Store::current`]; a separate `Store` isolates
/// its maps' type indices and storage from everything else.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Rc<StoreInner>,
}

thread_local! {
    static CURRENT: Store = Store::new();
}

impl Store {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(StoreInner {
                types: RefCell::new(TypeRegistry::new()),
                values: RefCell::new(HashMap::new()),
                keys: RefCell::new(HashMap::new()),
                handles: RefCell::new(HashMap::new()),
                next_container: Cell::new(0),
            }),
        }
    }

    /// The calling thread's default store.
    pub fn current() -> Self {
        CURRENT.with(Store::clone)
    }

    pub fn ptr_eq(a: &Store, b: &Store) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// Index this store assigns to `T`.
    pub fn type_index<T: 'static>(&self) -> TypeIndex {
        self.inner.index_of::<T>()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("types", &self.inner.types.try_borrow().map(|t| t.len()).ok())
            .field("containers", &self.inner.next_container.get())
            .finish()
    }
}

fn typed<V: 'static>(slot: &dyn Any) -> Option<&V> {
    let typed = slot.downcast_ref::<V>();
    debug_assert!(typed.is_some(), "type index resolves to exactly one type per store");
    typed
}

fn typed_mut<V: 'static>(slot: &mut dyn Any) -> Option<&mut V> {
    let typed = slot.downcast_mut::<V>();
    debug_assert!(typed.is_some(), "type index resolves to exactly one type per store");
    typed
}

/// Re-key `from`'s entry to `to`, or erase it when `to` is `None`.
fn relocate<V: 'static>(
    map: &mut HashMap<ContainerId, V>,
    from: ContainerId,
    to: Option<ContainerId>,
    graveyard: &mut Graveyard,
) {
    let Some(state) = map.remove(&from) else {
        return;
    };
    match to {
        Some(to) => {
            if let Some(old) = map.insert(to, state) {
                graveyard.push(Box::new(old));
            }
        }
        None => graveyard.push(Box::new(state)),
    }
}

fn index_in<K: 'static>(
    keys: &mut HashMap<(TypeIndex, TypeIndex), Box<dyn Any>>,
    site: (TypeIndex, TypeIndex),
    container: ContainerId,
) -> Result<&mut KeyIndex<K>, Error> {
    let indexes = keys
        .entry(site)
        .or_insert_with(|| Box::new(Indexes::<K>::new()));
    let indexes = typed_mut::<Indexes<K>>(indexes.as_mut()).ok_or(Error::InvalidHandle)?;
    Ok(indexes.entry(container).or_default())
}

impl StoreInner {
    pub(crate) fn index_of<T: 'static>(&self) -> TypeIndex {
        self.types.borrow_mut().index_of::<T>()
    }

    pub(crate) fn fresh_container(&self) -> ContainerId {
        let id = self.next_container.get();
        self.next_container.set(id + 1);
        ContainerId(id)
    }

    /// `container`'s pool for `T`, created on first use. Only the pool
    /// registry is borrowed, and only for the duration of this call.
    fn pool<T: 'static>(&self, ty: TypeIndex, container: ContainerId) -> Result<PoolCell<T>, Error> {
        let mut values = self.values.try_borrow_mut()?;
        let pools = values
            .entry(ty)
            .or_insert_with(|| Box::new(Pools::<T>::new()));
        let pools = typed_mut::<Pools<T>>(pools.as_mut()).ok_or(Error::InvalidHandle)?;
        Ok(Rc::clone(pools.entry(container).or_default()))
    }

    pub(crate) fn existing_pool<T: 'static>(
        &self,
        ty: TypeIndex,
        container: ContainerId,
    ) -> Option<PoolCell<T>> {
        let values = self.values.borrow();
        values
            .get(&ty)
            .and_then(|p| typed::<Pools<T>>(p.as_ref()))
            .and_then(|pools| pools.get(&container))
            .cloned()
    }

    /// Pool and slot holding `key`'s value of type `T` in `container`,
    /// creating the pool, the key index and the slot on first use.
    ///
    /// A hit never borrows the pool itself. A miss borrows the pool
    /// mutably, so it fails with `AlreadyBorrowed` while a value of the
    /// same (container, type) is borrowed.
    pub(crate) fn slot_for<T, Q>(
        &self,
        container: ContainerId,
        ty: TypeIndex,
        key_ty: TypeIndex,
        key: &Q,
    ) -> Result<(PoolCell<T>, SlotId), Error>
    where
        T: Default + 'static,
        Q: ?Sized + Hash + Eq + ToOwned,
        Q::Owned: Eq + Hash + Borrow<Q> + 'static,
    {
        let pool = self.pool::<T>(ty, container)?;
        {
            let mut keys = self.keys.try_borrow_mut()?;
            if let Some(slot) = index_in::<Q::Owned>(&mut keys, (ty, key_ty), container)?.get(key) {
                return Ok((pool, slot));
            }
        }
        // `T::default` may be user code using this store; no borrow is held.
        let value = T::default();
        let mut keys = self.keys.try_borrow_mut()?;
        let slot = index_in::<Q::Owned>(&mut keys, (ty, key_ty), container)?
            .get_or_create(key, || Ok::<_, Error>(pool.try_borrow_mut()?.allocate(value)))?;
        drop(keys);
        Ok((pool, slot))
    }

    pub(crate) fn register(
        &self,
        ty: TypeIndex,
        container: ContainerId,
        binding: &Rc<Binding>,
    ) -> RegistrationId {
        self.handles
            .borrow_mut()
            .entry((ty, container))
            .or_default()
            .allocate(Rc::downgrade(binding))
    }

    pub(crate) fn unregister(&self, ty: TypeIndex, container: ContainerId, id: RegistrationId) {
        if let Some(registry) = self.handles.borrow_mut().get_mut(&(ty, container)) {
            registry.deactivate(id);
        }
    }

    #[cfg(test)]
    pub(crate) fn live_handles(&self, ty: TypeIndex, container: ContainerId) -> usize {
        self.handles
            .borrow()
            .get(&(ty, container))
            .map_or(0, |r| r.len())
    }

    #[cfg(test)]
    pub(crate) fn has_pool<T: 'static>(&self, ty: TypeIndex, container: ContainerId) -> bool {
        self.existing_pool::<T>(ty, container).is_some()
    }
}

// Movers and copiers. Instantiated per type and stored as function
// pointers in each map's lifecycle tables.

pub(crate) fn move_pool<T: 'static>(
    store: &StoreInner,
    ty: TypeIndex,
    from: ContainerId,
    to: Option<ContainerId>,
    graveyard: &mut Graveyard,
) {
    let mut values = store.values.borrow_mut();
    let Some(pools) = values
        .get_mut(&ty)
        .and_then(|p| typed_mut::<Pools<T>>(p.as_mut()))
    else {
        return;
    };
    let Some(pool) = pools.remove(&from) else {
        return;
    };
    match to {
        Some(to) => {
            if let Some(old) = pools.insert(to, pool) {
                graveyard.push(Box::new(old));
            }
        }
        None => {
            // Detached handles may still share the cell; the values go now
            // unless one of them is borrowed, in which case they go with the
            // last handle.
            if let Ok(mut contents) = pool.try_borrow_mut() {
                graveyard.push(Box::new(core::mem::take(&mut *contents)));
            }
            graveyard.push(Box::new(pool));
        }
    }
}

/// Clone `from`'s pool into a fresh cell under `to`. The source stays in
/// place, shared-borrowed, while `T::clone` runs, so a panicking clone
/// leaves it intact.
///
/// # Panics
/// If a value of the source pool is mutably borrowed.
pub(crate) fn copy_pool<T: Clone + 'static>(
    store: &StoreInner,
    ty: TypeIndex,
    from: ContainerId,
    to: ContainerId,
    graveyard: &mut Graveyard,
) {
    let Some(source) = store.existing_pool::<T>(ty, from) else {
        return;
    };
    let copy = SlotPool::clone(&RefCell::borrow(&source));
    let mut values = store.values.borrow_mut();
    if let Some(pools) = values
        .get_mut(&ty)
        .and_then(|p| typed_mut::<Pools<T>>(p.as_mut()))
    {
        if let Some(old) = pools.insert(to, Rc::new(RefCell::new(copy))) {
            graveyard.push(Box::new(old));
        }
    }
}

/// Re-key `from`'s handle registry and point every live handle in it at
/// `to`; with no destination the handles become detached.
pub(crate) fn move_handles(
    store: &StoreInner,
    ty: TypeIndex,
    from: ContainerId,
    to: Option<ContainerId>,
    graveyard: &mut Graveyard,
) {
    let mut handles = store.handles.borrow_mut();
    let Some(registry) = handles.remove(&(ty, from)) else {
        return;
    };
    let mut retargeted = 0usize;
    for binding in registry.active().filter_map(|w| w.upgrade()) {
        binding.retarget(to);
        retargeted += 1;
    }
    tracing::trace!(?from, ?to, retargeted, "handles re-targeted");
    match to {
        Some(to) => {
            if let Some(old) = handles.insert((ty, to), registry) {
                graveyard.push(Box::new(old));
            }
        }
        None => graveyard.push(Box::new(registry)),
    }
}

/// Handles are never shared between maps: the copy starts with an empty
/// registry of its own.
pub(crate) fn copy_handles(
    store: &StoreInner,
    ty: TypeIndex,
    _from: ContainerId,
    to: ContainerId,
    _graveyard: &mut Graveyard,
) {
    store.handles.borrow_mut().entry((ty, to)).or_default();
}

pub(crate) fn move_index<K: 'static>(
    store: &StoreInner,
    site: (TypeIndex, TypeIndex),
    from: ContainerId,
    to: Option<ContainerId>,
    graveyard: &mut Graveyard,
) {
    let mut keys = store.keys.borrow_mut();
    if let Some(indexes) = keys
        .get_mut(&site)
        .and_then(|i| typed_mut::<Indexes<K>>(i.as_mut()))
    {
        relocate(indexes, from, to, graveyard);
    }
}

/// Clone `from`'s key index under `to`, leaving the source in place.
pub(crate) fn copy_index<K: Clone + 'static>(
    store: &StoreInner,
    site: (TypeIndex, TypeIndex),
    from: ContainerId,
    to: ContainerId,
    graveyard: &mut Graveyard,
) {
    let copy = {
        let keys = store.keys.borrow();
        let Some(source) = keys
            .get(&site)
            .and_then(|i| typed::<Indexes<K>>(i.as_ref()))
            .and_then(|indexes| indexes.get(&from))
        else {
            return;
        };
        source.clone()
    };
    let mut keys = store.keys.borrow_mut();
    if let Some(indexes) = keys
        .get_mut(&site)
        .and_then(|i| typed_mut::<Indexes<K>>(i.as_mut()))
    {
        if let Some(old) = indexes.insert(to, copy) {
            graveyard.push(Box::new(old));
        }
    }
}
