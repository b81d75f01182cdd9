//! smart-map: a single-threaded heterogeneous keyed store whose handles
//! survive storage growth and relocation of the whole container.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: let a caller ask one container for "the `T` under key `k`" for
//!   any `T` and any key type, without the container declaring its types,
//!   and keep every handle it gave out correct when the container is
//!   copied, moved or dropped.
//! - Layers:
//!   - TypeRegistry: dense `TypeIndex` per Rust type, assigned on first use.
//!   - SlotPool<T>: `SlotMap`-backed storage with stable `SlotId`s, one
//!     `Rc<RefCell<_>>` per (container, type).
//!   - KeyIndex<K>: `K -> SlotId`, allocating a default value on first sight.
//!   - HandleRegistry: per (container, type) slot pool of weak links to the
//!     bindings of live handles.
//!   - Store: owns all of the above, partitioned by (type, container).
//!   - LifecycleTables: per-map function-pointer tables that move, copy or
//!     erase the map's state for every type it has used.
//!   - SmartMap / Handle: public surface.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` (no atomics, no locks).
//! - The store only grows: there is no removal, eviction or iteration.
//! - Handles never cache addresses. They hold their pool cell and a slot
//!   id and resolve the id on every access, so pool growth needs no
//!   bookkeeping. The container binding decides whether access is allowed.
//!
//! Identity and relocation
//! - A map's identity is a `ContainerId` issued by its store, not its
//!   address; a Rust move of a `SmartMap` changes nothing.
//! - `take`/`assign_from` re-key the map's state to another identity in
//!   O(types + key types + live handles) and re-target the handle bindings
//!   registered under it.
//! - Drop erases the map's state and clears the bindings, so a handle that
//!   outlives its map fails with `Error::DetachedHandle` instead of
//!   reading freed storage.
//!
//! Borrowing
//! - Each (container, type) pool is its own `RefCell`, shared by the
//!   handles into it. Accessors report conflicts within that pool as
//!   `Error::AlreadyBorrowed`. Other maps and types are never blocked.
//! - Store registries are borrowed only inside a store call, so moving or
//!   dropping a map never conflicts with an outstanding value borrow.
//! - Copies clone each pool in place under a shared borrow. A panicking
//!   `Clone` leaves the source untouched.
//! - State removed by a relocation is dropped only after all store borrows
//!   are released, so values may themselves own handles or maps.

mod error;
mod handle;
mod key_index;
mod lifecycle;
mod slot_pool;
mod smart_map;
mod store;
mod type_registry;

// Public surface
pub use error::Error;
pub use handle::Handle;
pub use smart_map::SmartMap;
pub use store::{ContainerId, Store};
pub use type_registry::TypeIndex;
