#![forbid(unsafe_code)]

//! Render controller: mounts the test host and owns the props lifecycle.
//!
//! [`render_hook`] and [`render_hook_with`] mount a fresh root whose only
//! job is to call the hook under test. The returned [`RenderHookHarness`]
//! re-renders it with new props, unmounts it, and (see [`crate::wait`])
//! waits for it to update.
//!
//! Every mutation runs inside [`act`], so effects and the update
//! notification have settled when the call returns.
//!
//! # Failure Modes
//!
//! - **Driving an unmounted harness**: `rerender*` and the waits return
//!   [`HarnessError::Unmounted`]; `unmount` itself is a no-op.
//! - **Hook panics / render loops**: recorded in the result history, never
//!   returned from `rerender*`.

use std::cell::Cell;
use std::rc::Rc;

use hooktest_runtime::{Root, RootOptions, RuntimeError, act};
use tokio::sync::watch;
use tracing::debug;

use crate::cleanup::{CleanupId, add_cleanup, remove_cleanup};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::error_output::suppress_error_output;
use crate::host::{self, HookCallback, HostState, UpdateSignal, Wrapper};
use crate::result::ResultView;

/// Options for [`render_hook_with`].
pub struct RenderHookOptions<P> {
    initial_props: P,
    wrapper: Option<Wrapper>,
    config: Option<HarnessConfig>,
}

impl<P> RenderHookOptions<P> {
    /// Options with the props passed to the first render.
    pub fn new(initial_props: P) -> Self {
        Self {
            initial_props,
            wrapper: None,
            config: None,
        }
    }

    /// Render the hook inside `wrapper`, which must call the children it is
    /// given (typically inside [`provide_context`](hooktest_runtime::provide_context)).
    #[must_use]
    pub fn wrapper(mut self, wrapper: impl Fn(&dyn Fn()) + 'static) -> Self {
        self.wrapper = Some(Rc::new(wrapper));
        self
    }

    /// Use `config` instead of [`HarnessConfig::global`].
    #[must_use]
    pub fn config(mut self, config: HarnessConfig) -> Self {
        self.config = Some(config);
        self
    }
}

impl<P: Default> Default for RenderHookOptions<P> {
    fn default() -> Self {
        Self::new(P::default())
    }
}

impl<P: std::fmt::Debug> std::fmt::Debug for RenderHookOptions<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderHookOptions")
            .field("initial_props", &self.initial_props)
            .field("wrapper", &self.wrapper.is_some())
            .field("config", &self.config)
            .finish()
    }
}

/// Render a hook that takes no props.
pub fn render_hook<V, F>(callback: F) -> RenderHookHarness<(), V>
where
    V: 'static,
    F: Fn() -> V + 'static,
{
    render_hook_with(move |_: &()| callback(), RenderHookOptions::new(()))
}

/// Render a hook with props and options.
pub fn render_hook_with<P, V, F>(callback: F, options: RenderHookOptions<P>) -> RenderHookHarness<P, V>
where
    P: 'static,
    V: 'static,
    F: Fn(&P) -> V + 'static,
{
    let RenderHookOptions {
        initial_props,
        wrapper,
        config,
    } = options;
    let config = config.unwrap_or_else(|| HarnessConfig::global().clone());

    let state: Rc<HostState<P, V>> = HostState::new(initial_props, config.filter_error_output);
    let weak = Rc::downgrade(&state);
    let root_options = RootOptions::new().on_error(move |err| {
        if let Some(state) = weak.upgrade() {
            state.record_failure(err);
        }
    });
    let callback: HookCallback<P, V> = Rc::new(callback);
    let element = host::element(Rc::clone(&state), callback, wrapper);
    let root = Rc::new(act(|| Root::mount_with(element, root_options)));

    let cleanup_id = add_cleanup({
        let root = Rc::clone(&root);
        let state = Rc::clone(&state);
        move || teardown(&root, &state)
    });
    debug!(cycles = state.results.cycles(), "hook harness mounted");

    RenderHookHarness {
        result: ResultView::new(Rc::clone(&state.results)),
        state,
        root,
        config,
        cleanup_id: Cell::new(Some(cleanup_id)),
    }
}

/// Closes the update channel when dropped, so pending waits fail fast even
/// if unmounting unwinds.
struct CloseOnExit<'a, P: 'static, V: 'static>(&'a HostState<P, V>);

impl<P: 'static, V: 'static> Drop for CloseOnExit<'_, P, V> {
    fn drop(&mut self) {
        self.0.close();
    }
}

fn teardown<P: 'static, V: 'static>(root: &Root, state: &HostState<P, V>) {
    let _close = CloseOnExit(state);
    if root.is_mounted() {
        let _quiet = state.filter_errors().then(suppress_error_output);
        act(|| root.unmount());
    }
}

/// Handle to a mounted hook.
///
/// Dropping the handle unmounts the hook unless
/// [`HarnessConfig::skip_auto_cleanup`] is set, in which case it stays
/// mounted until [`cleanup`](crate::cleanup::cleanup) runs.
pub struct RenderHookHarness<P: 'static, V: 'static> {
    /// Live view of the hook's results.
    pub result: ResultView<V>,
    pub(crate) state: Rc<HostState<P, V>>,
    root: Rc<Root>,
    pub(crate) config: HarnessConfig,
    cleanup_id: Cell<Option<CleanupId>>,
}

impl<P: 'static, V: 'static> RenderHookHarness<P, V> {
    /// Replace the props and render again.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Unmounted`] after [`unmount`](Self::unmount).
    pub fn rerender_with(&self, props: P) -> Result<()> {
        self.ensure_mounted("rerender")?;
        self.state.replace_props(props);
        self.render("rerender")
    }

    /// Render again with the current props.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Unmounted`] after [`unmount`](Self::unmount).
    pub fn rerender(&self) -> Result<()> {
        self.ensure_mounted("rerender")?;
        self.render("rerender")
    }

    fn render(&self, operation: &'static str) -> Result<()> {
        match act(|| self.root.rerender()) {
            Err(RuntimeError::Unmounted) => Err(HarnessError::Unmounted { operation }),
            // Render failures are already in the result history.
            Ok(()) | Err(_) => {
                debug!(cycles = self.state.results.cycles(), "hook rerendered");
                Ok(())
            }
        }
    }

    /// Unmount the hook, running its effect cleanups. Idempotent.
    ///
    /// Waits still pending on this harness fail with
    /// [`HarnessError::Unmounted`].
    pub fn unmount(&self) {
        if let Some(id) = self.cleanup_id.take() {
            remove_cleanup(id);
        }
        teardown(&self.root, &self.state);
    }

    /// Whether the hook is still mounted.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.root.is_mounted()
    }

    /// Number of completed invocation cycles.
    #[must_use]
    pub fn render_count(&self) -> usize {
        self.result.len()
    }

    /// Receiver for update notifications published after this call.
    #[must_use]
    pub fn updates(&self) -> watch::Receiver<UpdateSignal> {
        self.state.subscribe()
    }

    pub(crate) fn ensure_mounted(&self, operation: &'static str) -> Result<()> {
        if self.root.is_mounted() {
            Ok(())
        } else {
            Err(HarnessError::Unmounted { operation })
        }
    }
}

impl<P: 'static, V: 'static> Drop for RenderHookHarness<P, V> {
    fn drop(&mut self) {
        if !self.config.skip_auto_cleanup {
            self.unmount();
        }
    }
}

impl<P: 'static, V: std::fmt::Debug + 'static> std::fmt::Debug for RenderHookHarness<P, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderHookHarness")
            .field("mounted", &self.is_mounted())
            .field("result", &self.result)
            .finish()
    }
}
