#![forbid(unsafe_code)]

//! Test host: the invisible component that invokes the hook under test.
//!
//! Each invocation reads the props slot, calls the hook inside
//! `catch_unwind`, appends the outcome to the result history and schedules
//! one update notification. The notification is deferred through the
//! runtime's flush queue, so it is published only after the render pass
//! that produced it (effects included) has settled.
//!
//! # Invariants
//!
//! - A panic in the hook or in the wrapper never escapes the host; it
//!   becomes an `Error` result.
//! - Every pushed result is followed by exactly one publish.
//! - After [`HostState::close`] the channel stays marked unmounted.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use hooktest_runtime::{Element, RuntimeError, component, defer_or_run, panic_message};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::error::RenderError;
use crate::error_output::suppress_error_output;
use crate::result::{HookResult, ResultContainer};

/// Value carried by the update channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSignal {
    /// Cycle number of the newest published result.
    pub cycle: u64,
    /// Set once the harness is unmounted.
    pub unmounted: bool,
}

/// Renders the children passed to it, usually inside context providers.
pub type Wrapper = Rc<dyn Fn(&dyn Fn())>;

/// The hook under test, called with the current props.
pub(crate) type HookCallback<P, V> = Rc<dyn Fn(&P) -> V>;

pub(crate) struct HostState<P, V> {
    props: RefCell<Rc<P>>,
    pub(crate) results: Rc<ResultContainer<V>>,
    pub(crate) updates: watch::Sender<UpdateSignal>,
    filter_errors: bool,
}

impl<P: 'static, V: 'static> HostState<P, V> {
    pub(crate) fn new(initial_props: P, filter_errors: bool) -> Rc<Self> {
        let (updates, _) = watch::channel(UpdateSignal::default());
        Rc::new(Self {
            props: RefCell::new(Rc::new(initial_props)),
            results: Rc::new(ResultContainer::new()),
            updates,
            filter_errors,
        })
    }

    pub(crate) fn replace_props(&self, props: P) {
        *self.props.borrow_mut() = Rc::new(props);
    }

    /// One invocation of the hook under test.
    fn invoke(self: &Rc<Self>, callback: &dyn Fn(&P) -> V) {
        let props = Rc::clone(&*self.props.borrow());
        let outcome = {
            let _quiet = self.filter_errors.then(suppress_error_output);
            catch_unwind(AssertUnwindSafe(|| callback(&props)))
        };
        let result = match outcome {
            Ok(value) => HookResult::Value(value),
            Err(payload) => {
                let cycle = self.results.cycles() + 1;
                let err = RenderError::new(panic_message(payload.as_ref()), cycle);
                warn!(cycle, error = %err, "hook panicked; captured as error result");
                HookResult::Error(err)
            }
        };
        let cycle = self.results.push(result);
        self.schedule_publish(cycle);
    }

    /// Render the wrapper, capturing a panic raised by the wrapper itself.
    ///
    /// A panic in the hook is already captured by the host inside it.
    fn run_wrapper(self: &Rc<Self>, render: impl FnOnce()) {
        let outcome = {
            let _quiet = self.filter_errors.then(suppress_error_output);
            catch_unwind(AssertUnwindSafe(render))
        };
        if let Err(payload) = outcome {
            let cycle = self.results.cycles() + 1;
            let err = RenderError::new(panic_message(payload.as_ref()), cycle);
            warn!(cycle, error = %err, "wrapper panicked; captured as error result");
            let cycle = self.results.push(HookResult::Error(err));
            self.schedule_publish(cycle);
        }
    }

    /// Record a failure the runtime reported outside any hook call.
    pub(crate) fn record_failure(self: &Rc<Self>, err: &RuntimeError) {
        let cycle = self.results.cycles() + 1;
        warn!(cycle, error = %err, error_type = err.error_type(), "render failed");
        let cycle = self
            .results
            .push(HookResult::Error(RenderError::new(err.to_string(), cycle)));
        self.schedule_publish(cycle);
    }

    fn schedule_publish(self: &Rc<Self>, cycle: u64) {
        let weak = Rc::downgrade(self);
        defer_or_run(move || {
            if let Some(state) = weak.upgrade() {
                state.publish(cycle);
            }
        });
    }

    fn publish(&self, cycle: u64) {
        let sent = self.updates.send_if_modified(|signal| {
            if signal.unmounted {
                return false;
            }
            signal.cycle = cycle;
            true
        });
        if sent {
            trace!(cycle, receivers = self.updates.receiver_count(), "update published");
        }
    }

    /// Mark the channel unmounted so pending waits fail fast. Idempotent.
    pub(crate) fn close(&self) {
        let closed = self.updates.send_if_modified(|signal| {
            !std::mem::replace(&mut signal.unmounted, true)
        });
        if closed {
            debug!(cycles = self.results.cycles(), "update channel closed");
        }
    }

    pub(crate) fn filter_errors(&self) -> bool {
        self.filter_errors
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<UpdateSignal> {
        self.updates.subscribe()
    }
}

/// Element rendering the optional wrapper and the host component inside it.
pub(crate) fn element<P: 'static, V: 'static>(
    state: Rc<HostState<P, V>>,
    callback: HookCallback<P, V>,
    wrapper: Option<Wrapper>,
) -> Element {
    let host_state = Rc::clone(&state);
    let host: Rc<dyn Fn()> = Rc::new(move || component(|| host_state.invoke(&*callback)));
    match wrapper {
        None => host,
        Some(wrapper) => Rc::new(move || component(|| state.run_wrapper(|| wrapper(&*host)))),
    }
}
