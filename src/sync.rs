#[cfg(feature = "loom")]
mod imp {
    pub(crate) use loom::sync::RwLock;
}

#[cfg(not(feature = "loom"))]
mod imp {
    pub(crate) use std::sync::RwLock;
}

pub(crate) use imp::*;
use std::sync::{LockResult, PoisonError};

/// Recovers the guard of a poisoned lock.
///
/// Every structure guarded in this crate stays consistent after a panic in
/// another holder (single inserts/removals), so poisoning is not an error.
pub(crate) fn recover<G>(result: LockResult<G>) -> G {
    result.unwrap_or_else(PoisonError::into_inner)
}
