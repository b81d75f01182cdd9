//! Failure reporting for handle access and lookups.

/// Errors reported by [`Handle`](crate::Handle) accessors and
/// [`SmartMap::try_lookup`](crate::SmartMap::try_lookup).
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// The handle is not attached to any container: it was default-constructed,
    /// taken from, or its container was dropped.
    #[error("handle is detached from its container")]
    DetachedHandle,
    /// The slot id does not name an active slot of the pool it was resolved against.
    #[error("handle does not refer to an active slot")]
    InvalidHandle,
    /// Value storage for this store is already borrowed incompatibly.
    #[error("value storage is already borrowed")]
    AlreadyBorrowed,
}

impl From<core::cell::BorrowError> for Error {
    fn from(_: core::cell::BorrowError) -> Self {
        Error::AlreadyBorrowed
    }
}

impl From<core::cell::BorrowMutError> for Error {
    fn from(_: core::cell::BorrowMutError) -> Self {
        Error::AlreadyBorrowed
    }
}
