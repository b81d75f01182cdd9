//! Handle: user-facing reference to one value in a [`SmartMap`](crate::SmartMap).
//!
//! A handle names its value by (pool, slot id) and resolves the slot id
//! against the pool on every access. Nothing address-like is cached, so
//! storage growth never needs to be reported back to handles. The pool
//! cell is the one its container owns; moving the container re-keys that
//! same cell, so the handle keeps resolving through it.
//!
//! The container half lives in a [`Binding`] shared with the container's
//! handle registry. The registry holds it weakly; it is the only path by
//! which a map moving or dropping re-targets or detaches its handles.

use crate::error::Error;
use crate::slot_pool::{SlotId, SlotPool};
use crate::store::{ContainerId, PoolCell, Store};
use crate::type_registry::TypeIndex;
use core::cell::{Cell, Ref, RefMut};
use core::fmt;
use std::rc::{Rc, Weak};

slotmap::new_key_type! {
    /// A handle's entry in its container's registry.
    pub(crate) struct RegistrationId;
}

/// Per (container, type) set of live handles.
pub(crate) type HandleRegistry = SlotPool<Weak<Binding>, RegistrationId>;

/// Container a handle currently belongs to; `None` once detached.
#[derive(Debug)]
pub(crate) struct Binding {
    container: Cell<Option<ContainerId>>,
}

impl Binding {
    fn new(container: ContainerId) -> Self {
        Self {
            container: Cell::new(Some(container)),
        }
    }

    #[inline]
    fn get(&self) -> Option<ContainerId> {
        self.container.get()
    }

    pub(crate) fn retarget(&self, to: Option<ContainerId>) {
        self.container.set(to);
    }
}

struct Link<T> {
    store: Store,
    ty: TypeIndex,
    pool: PoolCell<T>,
    slot: SlotId,
    binding: Rc<Binding>,
    registration: RegistrationId,
}

/// Reference to a value of type `T` held by a [`SmartMap`](crate::SmartMap).
///
/// Cloning registers a second, independent handle to the same value.
/// Moving the map with [`SmartMap::take`](crate::SmartMap::take) or
/// [`SmartMap::assign_from`](crate::SmartMap::assign_from) re-targets the
/// handle; dropping the map detaches it, after which every accessor
/// returns [`Error::DetachedHandle`]. `Handle::default()` is detached, so
/// `std::mem::take(&mut h)` moves a handle out and leaves `h` detached.
pub struct Handle<T: 'static> {
    link: Option<Link<T>>,
}

impl<T: 'static> Handle<T> {
    pub(crate) fn attach(
        store: &Store,
        ty: TypeIndex,
        container: ContainerId,
        pool: PoolCell<T>,
        slot: SlotId,
    ) -> Self {
        let binding = Rc::new(Binding::new(container));
        let registration = store.inner.register(ty, container, &binding);
        Self {
            link: Some(Link {
                store: store.clone(),
                ty,
                pool,
                slot,
                binding,
                registration,
            }),
        }
    }

    /// Container this handle resolves through, if any.
    pub fn container(&self) -> Option<ContainerId> {
        self.link.as_ref().and_then(|l| l.binding.get())
    }

    pub fn is_attached(&self) -> bool {
        self.container().is_some()
    }

    fn resolve(&self) -> Result<(&Link<T>, ContainerId), Error> {
        let link = self.link.as_ref().ok_or(Error::DetachedHandle)?;
        let container = link.binding.get().ok_or(Error::DetachedHandle)?;
        Ok((link, container))
    }

    /// Borrow the value.
    ///
    /// Fails with [`Error::AlreadyBorrowed`] while a value of the same map
    /// and type is mutably borrowed. Other maps and types are unaffected.
    pub fn get(&self) -> Result<Ref<'_, T>, Error> {
        let (link, _) = self.resolve()?;
        let pool = link.pool.try_borrow()?;
        Ref::filter_map(pool, |pool| pool.access(link.slot).ok()).map_err(|_| Error::InvalidHandle)
    }

    /// Mutably borrow the value.
    ///
    /// The borrow is exclusive over the values of this map and type for
    /// its duration, so it fails with [`Error::AlreadyBorrowed`] while any
    /// other borrow of them is alive.
    pub fn get_mut(&self) -> Result<RefMut<'_, T>, Error> {
        let (link, _) = self.resolve()?;
        let pool = link.pool.try_borrow_mut()?;
        RefMut::filter_map(pool, |pool| pool.access_mut(link.slot).ok())
            .map_err(|_| Error::InvalidHandle)
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, Error> {
        let value = self.get()?;
        Ok(f(&value))
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, Error> {
        let mut value = self.get_mut()?;
        Ok(f(&mut value))
    }

    /// Overwrite the value, returning the previous one.
    pub fn replace(&self, value: T) -> Result<T, Error> {
        self.with_mut(|slot| core::mem::replace(slot, value))
    }
}

impl<T: 'static> Default for Handle<T> {
    fn default() -> Self {
        Self { link: None }
    }
}

impl<T: 'static> Clone for Handle<T> {
    fn clone(&self) -> Self {
        match self.resolve() {
            Ok((link, container)) => Self::attach(
                &link.store,
                link.ty,
                container,
                Rc::clone(&link.pool),
                link.slot,
            ),
            Err(_) => Self::default(),
        }
    }

    /// Keeps the existing registration when both handles already belong to
    /// the same container; otherwise re-registers under the source's.
    fn clone_from(&mut self, source: &Self) {
        if let (Some(dst), Ok((src, container))) = (self.link.as_mut(), source.resolve()) {
            if dst.binding.get() == Some(container) && Store::ptr_eq(&dst.store, &src.store) {
                dst.pool = Rc::clone(&src.pool);
                dst.slot = src.slot;
                return;
            }
        }
        *self = source.clone();
    }
}

impl<T: 'static> Drop for Handle<T> {
    fn drop(&mut self) {
        if let Some(link) = &self.link {
            if let Some(container) = link.binding.get() {
                link.store.inner.unregister(link.ty, container, link.registration);
            }
        }
    }
}

impl<T: 'static> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Handle");
        d.field("ty", &core::any::type_name::<T>());
        match &self.link {
            Some(link) => d
                .field("container", &link.binding.get())
                .field("slot", &link.slot),
            None => d.field("container", &Option::<ContainerId>::None),
        };
        d.finish()
    }
}
