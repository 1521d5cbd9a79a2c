#![forbid(unsafe_code)]

//! Per-thread teardown registry.
//!
//! Every mounted harness registers its unmount here and removes the entry
//! when it is unmounted. [`cleanup`] runs whatever is left, newest first,
//! so a test that forgets to unmount does not leak a live root into the
//! next one. Tests can register their own teardown with [`add_cleanup`].
//!
//! # Failure Modes
//!
//! - A panicking callback does not stop the others; the first panic is
//!   re-raised once every callback has run.

use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};

use tracing::debug;

/// Handle for removing a registered cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CleanupId(u64);

type Callback = Box<dyn FnOnce()>;

thread_local! {
    static REGISTRY: RefCell<Vec<(CleanupId, Callback)>> = const { RefCell::new(Vec::new()) };
    static NEXT_ID: Cell<u64> = const { Cell::new(0) };
}

/// Register `f` to run on the next [`cleanup`].
pub fn add_cleanup(f: impl FnOnce() + 'static) -> CleanupId {
    let id = NEXT_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        CleanupId(id)
    });
    REGISTRY.with(|registry| registry.borrow_mut().push((id, Box::new(f))));
    id
}

/// Drop a registration without running it. Returns whether it was present.
pub fn remove_cleanup(id: CleanupId) -> bool {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        let before = registry.len();
        registry.retain(|(entry, _)| *entry != id);
        registry.len() != before
    })
}

/// Number of registrations pending on this thread.
#[must_use]
pub fn pending_cleanups() -> usize {
    REGISTRY.with(|registry| registry.borrow().len())
}

/// Unmount every live harness and run user cleanups, newest first.
pub fn cleanup() {
    let callbacks = REGISTRY.with(|registry| std::mem::take(&mut *registry.borrow_mut()));
    if callbacks.is_empty() {
        return;
    }
    debug!(count = callbacks.len(), "running registered cleanups");

    let mut first_panic = None;
    for (_, callback) in callbacks.into_iter().rev() {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(callback)) {
            first_panic.get_or_insert(payload);
        }
    }
    if let Some(payload) = first_panic {
        resume_unwind(payload);
    }
}
