//! Lock acquisition for shared engine state.
//!
//! A poisoned lock means a thread panicked in the middle of a critical
//! section, so the guarded state may be half-mutated. Nothing can be
//! trusted after that point: the failure is logged and the process aborts.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::error;

/// Acquires shared access, aborting on poison.
pub(crate) fn read<'a, T>(lock: &'a RwLock<T>, operation: &'static str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(_) => abort(operation),
    }
}

/// Acquires exclusive access, aborting on poison.
pub(crate) fn write<'a, T>(
    lock: &'a RwLock<T>,
    operation: &'static str,
) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(_) => abort(operation),
    }
}

/// Locks a mutex, aborting on poison.
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, operation: &'static str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => abort(operation),
    }
}

fn abort(operation: &'static str) -> ! {
    error!(operation, "Lock poisoned by a panicked thread, aborting");
    std::process::abort()
}
