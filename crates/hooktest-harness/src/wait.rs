#![forbid(unsafe_code)]

//! Async wait utilities bound to a [`RenderHookHarness`].
//!
//! | Wait | Resolves when |
//! |------|---------------|
//! | [`wait_for_next_update`](RenderHookHarness::wait_for_next_update) | the next update notification after the call arrives |
//! | [`wait_for`](RenderHookHarness::wait_for) | the predicate returns `true` |
//! | [`wait_for_value_to_change`](RenderHookHarness::wait_for_value_to_change) | the selected value differs from its value at call time |
//!
//! Each call is a small state machine, `Waiting -> Resolved | TimedOut |
//! Errored`, driven by `tokio::select!` over the update channel, an
//! optional polling interval and an optional deadline. Waits only suspend
//! the calling task; hooks that update from spawned tasks or timers keep
//! running on the same thread meanwhile.
//!
//! # Invariants
//!
//! - The update receiver is subscribed before the first check, so no
//!   notification between the check and the first suspension is missed.
//! - When the deadline fires, the waiter yields once and checks again
//!   before reporting a timeout, letting already-scheduled work land.
//! - Dropping a wait future releases its receiver and timers; nothing
//!   fires after a wait has finished.
//!
//! # Failure Modes
//!
//! - [`HarnessError::Timeout`] when the window elapses.
//! - [`HarnessError::Unmounted`] when the harness is unmounted before or
//!   during the wait.
//! - [`HarnessError::Render`] from `wait_for_next_update` when the awaited
//!   update captured a hook failure.
//! - [`HarnessError::Callback`] when a predicate or selector panics.
//! - Awaiting a wait inside [`act_async`](hooktest_runtime::act_async)
//!   defers every render until that boundary closes, so the wait times
//!   out. A warning is logged when a wait starts inside a boundary.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use hooktest_runtime::{act, is_batching, panic_message};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{Instrument, debug, debug_span, warn};

use crate::config::HarnessConfig;
use crate::controller::RenderHookHarness;
use crate::error::{HarnessError, Result};
use crate::host::UpdateSignal;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Limit {
    #[default]
    Inherit,
    Disabled,
    After(Duration),
}

impl Limit {
    fn resolve(self, inherited: Option<Duration>) -> Option<Duration> {
        match self {
            Self::Inherit => inherited,
            Self::Disabled => None,
            Self::After(duration) => Some(duration),
        }
    }
}

/// Timeout and polling settings for a single wait.
///
/// Unset values fall back to the harness's [`HarnessConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitOptions {
    timeout: Limit,
    interval: Limit,
}

impl WaitOptions {
    /// Use the harness defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up after `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Limit::After(timeout);
        self
    }

    /// Wait without a deadline.
    #[must_use]
    pub fn no_timeout(mut self) -> Self {
        self.timeout = Limit::Disabled;
        self
    }

    /// Re-check `wait_for` predicates every `interval` as well as on
    /// updates.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Limit::After(interval);
        self
    }

    /// Re-check `wait_for` predicates only on updates.
    #[must_use]
    pub fn no_interval(mut self) -> Self {
        self.interval = Limit::Disabled;
        self
    }

    fn resolve_timeout(&self, config: &HarnessConfig) -> Option<Duration> {
        self.timeout.resolve(config.default_timeout)
    }

    fn resolve_interval(&self, config: &HarnessConfig) -> Option<Duration> {
        self.interval.resolve(config.default_interval)
    }
}

struct Deadline(Option<Instant>);

impl Deadline {
    fn after(timeout: Option<Duration>) -> Self {
        Self(timeout.map(|timeout| Instant::now() + timeout))
    }

    async fn reached(&self) {
        match self.0 {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn timeout_ms(timeout: Option<Duration>) -> Option<u64> {
    timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
}

/// Run a user callback inside the flush boundary, turning a panic into a
/// [`HarnessError::Callback`].
fn guarded<R>(operation: &'static str, f: impl FnOnce() -> R) -> Result<R> {
    catch_unwind(AssertUnwindSafe(|| act(f))).map_err(|payload| HarnessError::Callback {
        operation,
        message: panic_message(payload.as_ref()),
    })
}

/// Outcome of a change on the update channel.
fn observe(
    operation: &'static str,
    changed: std::result::Result<(), watch::error::RecvError>,
    updates: &mut watch::Receiver<UpdateSignal>,
) -> Result<UpdateSignal> {
    if changed.is_err() {
        return Err(HarnessError::Unmounted { operation });
    }
    let signal = *updates.borrow_and_update();
    if signal.unmounted {
        debug!(operation, "harness unmounted while waiting");
        return Err(HarnessError::Unmounted { operation });
    }
    Ok(signal)
}

impl<P: 'static, V: 'static> RenderHookHarness<P, V> {
    fn subscribe(&self, operation: &'static str) -> Result<watch::Receiver<UpdateSignal>> {
        self.ensure_mounted(operation)?;
        if is_batching() {
            warn!(
                operation,
                "wait started inside a flush boundary; renders land only after it closes"
            );
        }
        Ok(self.state.subscribe())
    }

    /// Wait for the next update of the hook.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Timeout`] when no update arrives in time,
    /// [`HarnessError::Render`] when the hook failed during the update,
    /// [`HarnessError::Unmounted`] when the harness is or becomes unmounted.
    pub async fn wait_for_next_update(&self, options: WaitOptions) -> Result<()> {
        const OPERATION: &str = "wait_for_next_update";
        let mut updates = self.subscribe(OPERATION)?;
        let start_cycle = self.state.results.cycles();
        let timeout = options.resolve_timeout(&self.config);
        let span = debug_span!(
            "hooktest.wait",
            operation = OPERATION,
            timeout_ms = timeout_ms(timeout)
        );

        async move {
            let deadline = Deadline::after(timeout);
            loop {
                tokio::select! {
                    biased;
                    changed = updates.changed() => {
                        let signal = observe(OPERATION, changed, &mut updates)?;
                        if let Some(err) = self.state.results.first_error_since(start_cycle) {
                            warn!(cycle = err.cycle(), error = %err, "awaited update failed");
                            return Err(HarnessError::Render(err));
                        }
                        debug!(cycle = signal.cycle, "next update observed");
                        return Ok(());
                    }
                    () = deadline.reached() => {
                        tokio::task::yield_now().await;
                        if updates.has_changed().unwrap_or(false) {
                            continue;
                        }
                        return Err(self.timed_out(OPERATION, timeout));
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Wait until `predicate` returns `true`.
    ///
    /// The predicate runs inside [`act`] immediately, after every update
    /// and on every polling interval.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Timeout`] when the predicate stays `false`,
    /// [`HarnessError::Callback`] when it panics,
    /// [`HarnessError::Unmounted`] when the harness is or becomes unmounted.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut() -> bool,
        options: WaitOptions,
    ) -> Result<()> {
        self.wait_until("wait_for", predicate, options).await
    }

    /// Wait until `selector` returns a value different (`!=`) from the one
    /// it returned when the wait started.
    ///
    /// # Errors
    ///
    /// As for [`wait_for`](Self::wait_for).
    pub async fn wait_for_value_to_change<T: PartialEq>(
        &self,
        selector: impl FnMut() -> T,
        options: WaitOptions,
    ) -> Result<()> {
        self.wait_for_value_to_change_by(selector, |before, now| before != now, options)
            .await
    }

    /// Like [`wait_for_value_to_change`](Self::wait_for_value_to_change)
    /// with a custom `changed(initial, now)` comparison, e.g. pointer
    /// identity via `Rc::ptr_eq`.
    ///
    /// # Errors
    ///
    /// As for [`wait_for`](Self::wait_for).
    pub async fn wait_for_value_to_change_by<T>(
        &self,
        mut selector: impl FnMut() -> T,
        mut changed: impl FnMut(&T, &T) -> bool,
        options: WaitOptions,
    ) -> Result<()> {
        const OPERATION: &str = "wait_for_value_to_change";
        self.ensure_mounted(OPERATION)?;
        let initial = guarded(OPERATION, &mut selector)?;
        self.wait_until(OPERATION, || changed(&initial, &selector()), options)
            .await
    }

    async fn wait_until(
        &self,
        operation: &'static str,
        mut predicate: impl FnMut() -> bool,
        options: WaitOptions,
    ) -> Result<()> {
        let mut updates = self.subscribe(operation)?;
        let timeout = options.resolve_timeout(&self.config);
        let interval = options.resolve_interval(&self.config);
        let span = debug_span!(
            "hooktest.wait",
            operation,
            timeout_ms = timeout_ms(timeout),
            checks = tracing::field::Empty
        );

        async move {
            let mut checks = 1u32;
            if guarded(operation, &mut predicate)? {
                tracing::Span::current().record("checks", checks);
                return Ok(());
            }

            let deadline = Deadline::after(timeout);
            let mut ticker = interval.filter(|period| !period.is_zero()).map(|period| {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            });

            loop {
                tokio::select! {
                    biased;
                    changed = updates.changed() => {
                        observe(operation, changed, &mut updates)?;
                    }
                    () = next_tick(&mut ticker) => {}
                    () = deadline.reached() => {
                        tokio::task::yield_now().await;
                        checks += 1;
                        tracing::Span::current().record("checks", checks);
                        if guarded(operation, &mut predicate)? {
                            return Ok(());
                        }
                        return Err(self.timed_out(operation, timeout));
                    }
                }
                checks += 1;
                if guarded(operation, &mut predicate)? {
                    tracing::Span::current().record("checks", checks);
                    return Ok(());
                }
            }
        }
        .instrument(span)
        .await
    }

    fn timed_out(&self, operation: &'static str, timeout: Option<Duration>) -> HarnessError {
        let timeout = timeout.unwrap_or_default();
        warn!(
            operation,
            timeout_ms = timeout_ms(Some(timeout)),
            cycles = self.state.results.cycles(),
            "wait timed out"
        );
        HarnessError::Timeout { operation, timeout }
    }
}
