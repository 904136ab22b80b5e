//! Lock helpers
//!
//! Registry locks are only ever held for short, non-async critical sections,
//! so a poisoned lock still guards consistent data and is recovered.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
