#![forbid(unsafe_code)]

//! Filtering of panic output for failures the harness captures.
//!
//! A hook that panics inside the test host is an expected, recorded
//! outcome, so its panic message should not clutter test output. The first
//! [`suppress_error_output`] call installs a process-wide panic hook that
//! stays silent while the panicking thread holds an [`ErrorOutputGuard`],
//! and defers to the previously installed hook otherwise.
//!
//! # Invariants
//!
//! - Suppression is per thread; a panic on another thread still prints.
//! - Guards nest; output resumes when the outermost guard drops.

use std::cell::Cell;
use std::sync::OnceLock;

thread_local! {
    static SUPPRESS_DEPTH: Cell<u32> = const { Cell::new(0) };
}

fn install_filtering_hook() {
    static HOOK: OnceLock<()> = OnceLock::new();
    HOOK.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if is_suppressed() {
                return;
            }
            previous(info);
        }));
    });
}

/// Whether panic output is currently silenced on this thread.
#[must_use]
pub fn is_suppressed() -> bool {
    SUPPRESS_DEPTH.with(Cell::get) > 0
}

/// Silence panic output on this thread until the guard drops.
#[must_use = "output is only suppressed while the guard is alive"]
pub fn suppress_error_output() -> ErrorOutputGuard {
    install_filtering_hook();
    SUPPRESS_DEPTH.with(|depth| depth.set(depth.get() + 1));
    ErrorOutputGuard { _private: () }
}

/// Guard returned by [`suppress_error_output`].
#[derive(Debug)]
pub struct ErrorOutputGuard {
    _private: (),
}

impl Drop for ErrorOutputGuard {
    fn drop(&mut self) {
        SUPPRESS_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}
