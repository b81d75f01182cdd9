//! Lifecycle tables: type-erased copy/move/erase of a map's state.
//!
//! A `SmartMap` has no compile-time list of the types it holds. Each
//! lookup installs, for its value type `T`, a table of function pointers
//! to the monomorphized movers and copiers for `T`'s pool and handle
//! registry, and one mover/copier pair per key type used with `T`. The
//! relocation driver walks those tables without knowing any of the types.

use crate::store::{self, ContainerId, Graveyard, StoreInner};
use crate::type_registry::TypeIndex;
use core::fmt;
use core::hash::Hash;

type Mover<S> = fn(&StoreInner, S, ContainerId, Option<ContainerId>, &mut Graveyard);
type Copier<S> = fn(&StoreInner, S, ContainerId, ContainerId, &mut Graveyard);

#[derive(Copy, Clone)]
struct KeyOps {
    key_ty: TypeIndex,
    move_index: Mover<(TypeIndex, TypeIndex)>,
    copy_index: Copier<(TypeIndex, TypeIndex)>,
}

#[derive(Clone)]
struct LifecycleTable {
    ty: TypeIndex,
    move_pool: Mover<TypeIndex>,
    move_handles: Mover<TypeIndex>,
    copy_pool: Copier<TypeIndex>,
    copy_handles: Copier<TypeIndex>,
    // Indexed by the key type's index.
    key_ops: Vec<Option<KeyOps>>,
}

impl LifecycleTable {
    fn new<T: Clone + 'static>(ty: TypeIndex) -> Self {
        Self {
            ty,
            move_pool: store::move_pool::<T>,
            move_handles: store::move_handles,
            copy_pool: store::copy_pool::<T>,
            copy_handles: store::copy_handles,
            key_ops: Vec::new(),
        }
    }

    fn add_key<K: Eq + Hash + Clone + 'static>(&mut self, key_ty: TypeIndex) {
        let i = key_ty.as_usize();
        if self.key_ops.len() <= i {
            self.key_ops.resize(i + 1, None);
        }
        if self.key_ops[i].is_none() {
            tracing::trace!(
                value_ty = self.ty.as_usize(),
                key_ty = i,
                key = core::any::type_name::<K>(),
                "key index installed"
            );
            self.key_ops[i] = Some(KeyOps {
                key_ty,
                move_index: store::move_index::<K>,
                copy_index: store::copy_index::<K>,
            });
        }
    }

    fn keys(&self) -> impl Iterator<Item = &KeyOps> + '_ {
        self.key_ops.iter().flatten()
    }
}

/// A map's lifecycle tables, one slot per value type index.
#[derive(Clone, Default)]
pub(crate) struct LifecycleTables {
    tables: Vec<Option<LifecycleTable>>,
}

impl LifecycleTables {
    /// Make sure relocations of this map cover `T` and its `K`-keyed index.
    /// Installing the same pair again is a no-op.
    pub(crate) fn install<T, K>(&mut self, ty: TypeIndex, key_ty: TypeIndex)
    where
        T: Clone + 'static,
        K: Eq + Hash + Clone + 'static,
    {
        let i = ty.as_usize();
        if self.tables.len() <= i {
            self.tables.resize(i + 1, None);
        }
        let table = self.tables[i].get_or_insert_with(|| {
            tracing::trace!(
                value_ty = i,
                value = core::any::type_name::<T>(),
                "lifecycle table installed"
            );
            LifecycleTable::new::<T>(ty)
        });
        table.add_key::<K>(key_ty);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tables.iter().all(Option::is_none)
    }

    pub(crate) fn len(&self) -> usize {
        self.tables.iter().flatten().count()
    }

    /// Re-key all of `from`'s state to `to`, re-targeting its handles; with
    /// no destination, erase it and detach the handles.
    pub(crate) fn move_all(&self, store: &StoreInner, from: ContainerId, to: Option<ContainerId>) {
        if self.is_empty() {
            return;
        }
        let mut graveyard = Graveyard::new();
        for table in self.tables.iter().flatten() {
            (table.move_pool)(store, table.ty, from, to, &mut graveyard);
            (table.move_handles)(store, table.ty, from, to, &mut graveyard);
            for ops in table.keys() {
                (ops.move_index)(store, (table.ty, ops.key_ty), from, to, &mut graveyard);
            }
        }
        match to {
            Some(to) => tracing::debug!(?from, ?to, types = self.len(), "map moved"),
            None => tracing::debug!(?from, types = self.len(), "map erased"),
        }
        drop(graveyard);
    }

    /// Duplicate `from`'s values and key indexes under `to`. `from` is
    /// left untouched and keeps its handles; `to` starts with none.
    pub(crate) fn copy_all(&self, store: &StoreInner, from: ContainerId, to: ContainerId) {
        if self.is_empty() {
            return;
        }
        let mut graveyard = Graveyard::new();
        for table in self.tables.iter().flatten() {
            (table.copy_pool)(store, table.ty, from, to, &mut graveyard);
            (table.copy_handles)(store, table.ty, from, to, &mut graveyard);
            for ops in table.keys() {
                (ops.copy_index)(store, (table.ty, ops.key_ty), from, to, &mut graveyard);
            }
        }
        tracing::debug!(?from, ?to, types = self.len(), "map copied");
        drop(graveyard);
    }
}

impl fmt::Debug for LifecycleTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.tables.iter().flatten().map(|t| {
                (t.ty, t.key_ops.iter().filter(|k| k.is_some()).count())
            }))
            .finish()
    }
}
