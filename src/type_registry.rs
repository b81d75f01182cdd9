//! Stable small-integer identifiers for Rust types.

use core::any::TypeId;
use hashbrown::HashMap;

/// Dense index assigned to a type the first time a store sees it.
///
/// Indices start at zero and are never reused, so they can address
/// per-type tables stored in a `Vec`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TypeIndex(u32);

impl TypeIndex {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Default)]
pub(crate) struct TypeRegistry {
    indices: HashMap<TypeId, TypeIndex>,
    next: u32,
}

impl TypeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Index for `T`, allocating the next unused one on first call.
    pub(crate) fn index_of<T: ?Sized + 'static>(&mut self) -> TypeIndex {
        let next = &mut self.next;
        *self.indices.entry(TypeId::of::<T>()).or_insert_with(|| {
            let idx = TypeIndex(*next);
            *next += 1;
            tracing::trace!(index = idx.0, ty = core::any::type_name::<T>(), "type index assigned");
            idx
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.indices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_type_same_index() {
        let mut r = TypeRegistry::new();
        let a = r.index_of::<String>();
        let b = r.index_of::<String>();
        assert_eq!(a, b);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn indices_are_dense_and_monotonic() {
        let mut r = TypeRegistry::new();
        let a = r.index_of::<u8>();
        let b = r.index_of::<String>();
        let c = r.index_of::<Vec<u8>>();
        assert_eq!(
            (a.as_usize(), b.as_usize(), c.as_usize()),
            (0, 1, 2)
        );
        // Re-querying an early type does not advance the counter.
        assert_eq!(r.index_of::<u8>(), a);
        assert_eq!(r.index_of::<i64>().as_usize(), 3);
    }

    #[test]
    fn unsized_types_are_indexable() {
        let mut r = TypeRegistry::new();
        let s = r.index_of::<str>();
        let owned = r.index_of::<String>();
        assert_ne!(s, owned);
    }
}
