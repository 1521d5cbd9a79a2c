#![forbid(unsafe_code)]

//! Scoped flush boundary for renders and notifications.
//!
//! While a [`BatchScope`] is alive, root re-renders and [`Observable`]
//! notifications are queued instead of running. When the outermost scope
//! exits, the queue is drained until it stays empty, so callers of [`act`]
//! observe a fully settled tree: every state update, re-render, effect and
//! notification triggered inside the scope has already happened.
//!
//! # Usage
//!
//! ```
//! use hooktest_runtime::reactive::batch::{BatchScope, is_batching};
//! use hooktest_runtime::reactive::Observable;
//!
//! let x = Observable::new(0);
//! {
//!     let _batch = BatchScope::new();
//!     x.set(1); // notification deferred
//!     x.set(3); // coalesced with the first set
//!     assert!(is_batching());
//! } // subscribers run here, once, with value 3
//! assert!(!is_batching());
//! ```
//!
//! # Invariants
//!
//! 1. Nested batches are supported: only the outermost scope triggers flush.
//! 2. Values are updated immediately; only notifications and renders are
//!    deferred.
//! 3. Work queued while a flush is running is executed by that same flush.
//! 4. Flush calls deferred callbacks in the order they were first enqueued.
//!
//! # Failure Modes
//!
//! - **Callback panics during flush**: remaining callbacks are still called.
//!   The first panic is re-raised after the queue drains.
//! - **Scope dropped while unwinding**: the queue is discarded instead of
//!   flushed, so a panicking `act` body never runs half-applied work.
//! - **Runaway feedback**: a flush that keeps re-queueing work is cut off
//!   after [`MAX_FLUSH_ROUNDS`] rounds and the remainder is dropped.
//!
//! [`Observable`]: super::Observable

use std::cell::RefCell;
use std::future::Future;
use tracing::{debug_span, error, trace};
use web_time::Instant;

/// Upper bound on drain rounds in a single flush.
pub const MAX_FLUSH_ROUNDS: u32 = 1_000;

/// A deferred unit of work: a render or a subscriber notification.
type DeferredTask = Box<dyn FnOnce()>;

/// Deferred callback entry optionally keyed for in-batch coalescing.
struct DeferredEntry {
    key: Option<usize>,
    task: DeferredTask,
}

impl DeferredEntry {
    fn unkeyed(task: DeferredTask) -> Self {
        Self { key: None, task }
    }

    fn keyed(key: usize, task: DeferredTask) -> Self {
        Self {
            key: Some(key),
            task,
        }
    }
}

/// Thread-local batch context.
struct BatchContext {
    /// Nesting depth. Only flush when this reaches 0.
    depth: u32,
    /// Set while the outermost scope drains the queue.
    flushing: bool,
    /// Queued work to run on flush.
    deferred: Vec<DeferredEntry>,
}

thread_local! {
    static BATCH_CTX: RefCell<Option<BatchContext>> = const { RefCell::new(None) };
}

/// Returns true if a batch is currently active on this thread.
pub fn is_batching() -> bool {
    BATCH_CTX.with(|ctx| ctx.borrow().is_some())
}

/// Enqueue work to run when the current batch exits.
///
/// If no batch is active, the work runs immediately.
///
/// Returns `true` if the work was deferred, `false` if it ran immediately.
pub fn defer_or_run(f: impl FnOnce() + 'static) -> bool {
    BATCH_CTX.with(|ctx| {
        let mut guard = ctx.borrow_mut();
        if let Some(ref mut batch) = *guard {
            batch.deferred.push(DeferredEntry::unkeyed(Box::new(f)));
            true
        } else {
            drop(guard); // Release borrow before calling f.
            f();
            false
        }
    })
}

/// Enqueue work keyed by `key`.
///
/// If the key is already queued in the current round, the previously queued
/// callback is replaced so the latest callback wins while preserving the
/// original enqueue order.
pub fn defer_or_run_keyed(key: usize, f: impl FnOnce() + 'static) -> bool {
    BATCH_CTX.with(|ctx| {
        let mut guard = ctx.borrow_mut();
        if let Some(ref mut batch) = *guard {
            if let Some(entry) = batch
                .deferred
                .iter_mut()
                .find(|entry| entry.key == Some(key))
            {
                entry.task = Box::new(f);
            } else {
                batch.deferred.push(DeferredEntry::keyed(key, Box::new(f)));
            }
            true
        } else {
            drop(guard); // Release borrow before calling f.
            f();
            false
        }
    })
}

/// Take the next round of queued work, marking the context as flushing.
fn take_round() -> Vec<DeferredTask> {
    BATCH_CTX.with(|ctx| match *ctx.borrow_mut() {
        Some(ref mut batch) => {
            batch.flushing = true;
            std::mem::take(&mut batch.deferred)
                .into_iter()
                .map(|entry| entry.task)
                .collect()
        }
        None => Vec::new(),
    })
}

/// Drain the queue until it stays empty. Called by the outermost scope.
fn flush() {
    let start = Instant::now();
    let span = debug_span!(
        "hooktest.flush",
        rounds = tracing::field::Empty,
        tasks = tracing::field::Empty,
        duration_us = tracing::field::Empty
    );
    let _enter = span.enter();

    let mut first_panic: Option<Box<dyn std::any::Any + Send>> = None;
    let mut rounds = 0u32;
    let mut tasks = 0u64;
    loop {
        let round = take_round();
        if round.is_empty() {
            break;
        }
        rounds += 1;
        if rounds > MAX_FLUSH_ROUNDS {
            error!(
                dropped = round.len(),
                rounds, "flush exceeded round limit; dropping queued work"
            );
            break;
        }
        trace!(round = rounds, queued = round.len(), "draining deferred work");
        tasks += round.len() as u64;
        // If a callback panics, we still try to run the rest.
        for task in round {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
            if let Err(payload) = result
                && first_panic.is_none()
            {
                first_panic = Some(payload);
            }
        }
    }

    span.record("rounds", rounds);
    span.record("tasks", tasks);
    span.record("duration_us", start.elapsed().as_micros() as u64);

    if let Some(payload) = first_panic {
        BATCH_CTX.with(|ctx| *ctx.borrow_mut() = None);
        std::panic::resume_unwind(payload);
    }
}

/// RAII guard that begins a batch scope.
///
/// While a `BatchScope` is alive, renders and observable notifications are
/// deferred. When the outermost `BatchScope` drops, all deferred work runs.
///
/// Nested `BatchScope`s are supported; only the outermost one flushes.
pub struct BatchScope {
    /// Whether this scope is the outermost (responsible for flush).
    is_root: bool,
}

impl BatchScope {
    /// Begin a new batch scope.
    ///
    /// If already inside a batch, this increments the nesting depth.
    #[must_use]
    pub fn new() -> Self {
        let is_root = BATCH_CTX.with(|ctx| {
            let mut guard = ctx.borrow_mut();
            match *guard {
                Some(ref mut batch) => {
                    batch.depth += 1;
                    false
                }
                None => {
                    *guard = Some(BatchContext {
                        depth: 1,
                        flushing: false,
                        deferred: Vec::new(),
                    });
                    true
                }
            }
        });
        Self { is_root }
    }

    /// Number of deferred tasks queued in the current batch.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        BATCH_CTX.with(|ctx| ctx.borrow().as_ref().map_or(0, |b| b.deferred.len()))
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        let should_flush = BATCH_CTX.with(|ctx| {
            let mut guard = ctx.borrow_mut();
            if let Some(ref mut batch) = *guard {
                batch.depth = batch.depth.saturating_sub(1);
                batch.depth == 0 && !batch.flushing
            } else {
                false
            }
        });

        if !should_flush {
            return;
        }

        if std::thread::panicking() {
            BATCH_CTX.with(|ctx| *ctx.borrow_mut() = None);
            return;
        }

        flush();
        BATCH_CTX.with(|ctx| *ctx.borrow_mut() = None);
    }
}

impl std::fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScope")
            .field("is_root", &self.is_root)
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Run `f` inside a flush boundary.
///
/// Every render, effect and notification caused by `f` has run by the time
/// `act` returns.
pub fn act<R>(f: impl FnOnce() -> R) -> R {
    let scope = BatchScope::new();
    let out = f();
    drop(scope);
    out
}

/// Async flavor of [`act`]: the scope stays open across the awaited future
/// and flushes once it completes.
///
/// The scope is thread-local, so while `fut` is pending every render on
/// this thread is deferred, including renders caused by timers and spawned
/// tasks. Do not await a harness wait inside `act_async`: the update it
/// waits for only lands after the scope closes, so the wait times out.
pub async fn act_async<F: Future>(fut: F) -> F::Output {
    let scope = BatchScope::new();
    let out = fut.await;
    drop(scope);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
