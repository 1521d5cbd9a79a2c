#![forbid(unsafe_code)]

//! Root renderer: mounts an element tree and drives its render passes.
//!
//! A [`Root`] owns the component states of one tree. Rendering is
//! synchronous and single-threaded:
//!
//! 1. the element runs, components claim their state by call order;
//! 2. effects queued during the body run in order;
//! 3. if any state changed during 1-2 the pass repeats, up to
//!    [`MAX_RENDER_PASSES`] passes.
//!
//! State updates made outside a render pass are routed through
//! [`defer_or_run_keyed`]: inside a flush boundary they coalesce into one
//! render when the boundary closes, outside one they render immediately.
//!
//! # Failure Modes
//!
//! - **Render loop**: state that changes on every pass stops after
//!   [`MAX_RENDER_PASSES`] with [`RuntimeError::RenderLimitExceeded`].
//! - **Panicking effect or cleanup**: the panic is caught, reported as
//!   [`RuntimeError::EffectPanicked`] and the remaining effects or
//!   cleanups still run. Unmount always completes.
//! - **Panicking element body**: propagates to the caller; the root stays
//!   mounted and consistent for the next render.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, debug_span, error, trace, warn};
use web_time::Instant;

use crate::component::{ComponentState, RootFrameGuard};
use crate::error::{Result, RuntimeError};
use crate::panic_message;
use crate::reactive::batch::{BatchScope, defer_or_run_keyed, is_batching};

/// Maximum consecutive passes in one render before giving up.
pub const MAX_RENDER_PASSES: u32 = 50;

/// A renderable tree: a function that calls [`component`](crate::component)
/// for each component it renders.
pub type Element = Rc<dyn Fn()>;

/// Callback receiving errors that have no synchronous caller.
pub type ErrorHandler = Rc<dyn Fn(&RuntimeError)>;

/// Options for [`Root::mount_with`].
#[derive(Clone, Default)]
pub struct RootOptions {
    on_error: Option<ErrorHandler>,
}

impl RootOptions {
    /// Default options: errors are only logged.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler for render-loop and effect failures.
    #[must_use]
    pub fn on_error(mut self, handler: impl Fn(&RuntimeError) + 'static) -> Self {
        self.on_error = Some(Rc::new(handler));
        self
    }
}

impl std::fmt::Debug for RootOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootOptions")
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Shared interior of a [`Root`]. Hook state holds weak references to it.
pub(crate) struct RootInner {
    element: RefCell<Element>,
    components: RefCell<Vec<Rc<ComponentState>>>,
    pending_effects: RefCell<Vec<Box<dyn FnOnce()>>>,
    mounted: Cell<bool>,
    rendering: Cell<bool>,
    dirty: Cell<bool>,
    commits: Cell<u64>,
    options: RootOptions,
}

/// Clears the rendering flag when a render ends, including by panic.
struct RenderingGuard<'a> {
    root: &'a RootInner,
}

impl<'a> RenderingGuard<'a> {
    fn enter(root: &'a RootInner) -> Self {
        root.rendering.set(true);
        Self { root }
    }
}

impl Drop for RenderingGuard<'_> {
    fn drop(&mut self) {
        self.root.rendering.set(false);
    }
}

impl RootInner {
    fn key(self: &Rc<Self>) -> usize {
        Rc::as_ptr(self) as *const () as usize
    }

    pub(crate) fn component_at(&self, index: usize) -> Rc<ComponentState> {
        let mut components = self.components.borrow_mut();
        if let Some(existing) = components.get(index) {
            return Rc::clone(existing);
        }
        let state = Rc::new(ComponentState::default());
        components.push(Rc::clone(&state));
        state
    }

    pub(crate) fn queue_effect(&self, effect: Box<dyn FnOnce()>) {
        self.pending_effects.borrow_mut().push(effect);
    }

    /// Request a re-render after a state change.
    pub(crate) fn schedule(self: &Rc<Self>) {
        if !self.mounted.get() {
            trace!("state update on unmounted root ignored");
            return;
        }
        if self.rendering.get() {
            self.dirty.set(true);
            return;
        }
        if !is_batching() {
            debug!("state update outside act; rendering synchronously");
        }
        let weak = Rc::downgrade(self);
        defer_or_run_keyed(self.key(), move || {
            if let Some(root) = weak.upgrade() {
                // Failures were already reported to the error handler.
                let _ = root.render();
            }
        });
    }

    fn report(&self, err: &RuntimeError) {
        if let Some(handler) = &self.options.on_error {
            handler(err);
        }
    }

    fn render(self: &Rc<Self>) -> Result<()> {
        if !self.mounted.get() {
            return Err(RuntimeError::Unmounted);
        }
        if self.rendering.get() {
            self.dirty.set(true);
            return Ok(());
        }

        let _batch = BatchScope::new();
        let _rendering = RenderingGuard::enter(self);
        let start = Instant::now();
        let span = debug_span!(
            "hooktest.render",
            passes = tracing::field::Empty,
            duration_us = tracing::field::Empty
        );
        let _enter = span.enter();

        let mut passes = 0u32;
        loop {
            if passes == MAX_RENDER_PASSES {
                let err = RuntimeError::RenderLimitExceeded { passes };
                error!(passes, "render did not settle; giving up");
                self.dirty.set(false);
                self.report(&err);
                return Err(err);
            }
            passes += 1;
            self.dirty.set(false);
            self.render_pass();
            self.run_effects();
            if !self.dirty.get() || !self.mounted.get() {
                break;
            }
        }

        self.commits.set(self.commits.get() + 1);
        span.record("passes", passes);
        span.record("duration_us", start.elapsed().as_micros() as u64);
        Ok(())
    }

    fn render_pass(self: &Rc<Self>) {
        let element = Rc::clone(&*self.element.borrow());
        let rendered = {
            let frame = RootFrameGuard::enter(Rc::clone(self));
            element();
            frame.rendered()
        };
        let removed = {
            let mut components = self.components.borrow_mut();
            if components.len() > rendered {
                components.split_off(rendered)
            } else {
                Vec::new()
            }
        };
        for state in removed.iter().rev() {
            self.release(state);
        }
    }

    /// Unmount one component, reporting cleanups that panicked.
    fn release(&self, state: &ComponentState) {
        for message in state.unmount() {
            let err = RuntimeError::EffectPanicked { message };
            warn!(error = %err, "effect cleanup panicked");
            self.report(&err);
        }
    }

    fn run_effects(&self) {
        loop {
            let effects = std::mem::take(&mut *self.pending_effects.borrow_mut());
            if effects.is_empty() {
                break;
            }
            for effect in effects {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(effect));
                if let Err(payload) = outcome {
                    let err = RuntimeError::EffectPanicked {
                        message: panic_message(payload.as_ref()),
                    };
                    warn!(error = %err, "effect panicked");
                    self.report(&err);
                }
            }
        }
    }

    fn unmount(&self) {
        if !self.mounted.replace(false) {
            return;
        }
        self.pending_effects.borrow_mut().clear();
        let components = std::mem::take(&mut *self.components.borrow_mut());
        for state in components.iter().rev() {
            self.release(state);
        }
        debug!(commits = self.commits.get(), "root unmounted");
    }
}

/// A mounted element tree.
///
/// Dropping a `Root` unmounts it.
pub struct Root {
    inner: Rc<RootInner>,
}

impl Root {
    /// Mount `element` and render it synchronously.
    ///
    /// Render failures are logged; use [`Root::mount_with`] to observe them.
    pub fn mount(element: Element) -> Self {
        Self::mount_with(element, RootOptions::default())
    }

    /// Mount `element` with options and render it synchronously, effects
    /// included.
    pub fn mount_with(element: Element, options: RootOptions) -> Self {
        let inner = Rc::new(RootInner {
            element: RefCell::new(element),
            components: RefCell::new(Vec::new()),
            pending_effects: RefCell::new(Vec::new()),
            mounted: Cell::new(true),
            rendering: Cell::new(false),
            dirty: Cell::new(false),
            commits: Cell::new(0),
            options,
        });
        debug!("root mounted");
        // Failures were already reported to the error handler.
        let _ = inner.render();
        Self { inner }
    }

    /// Replace the element and re-render.
    pub fn update(&self, element: Element) -> Result<()> {
        if !self.inner.mounted.get() {
            return Err(RuntimeError::Unmounted);
        }
        *self.inner.element.borrow_mut() = element;
        self.inner.render()
    }

    /// Re-render the current element.
    pub fn rerender(&self) -> Result<()> {
        self.inner.render()
    }

    /// Unmount the tree, running effect cleanups. Idempotent.
    pub fn unmount(&self) {
        self.inner.unmount();
    }

    /// Whether the tree is still mounted.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.get()
    }

    /// Number of completed renders (each may span several passes).
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.get()
    }
}

impl Drop for Root {
    fn drop(&mut self) {
        self.inner.unmount();
    }
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Root")
            .field("mounted", &self.inner.mounted.get())
            .field("components", &self.inner.components.borrow().len())
            .field("commits", &self.inner.commits.get())
            .finish()
    }
}
