#![forbid(unsafe_code)]

//! Component frames and hook slot storage.
//!
//! Hooks are identified by call order, the same way components are
//! identified by call order within a root's render pass. Two thread-local
//! stacks track what is rendering right now:
//!
//! - the root stack, whose top frame hands out component positions;
//! - the component stack, whose top frame hands out hook slot positions.
//!
//! Frames are pushed and popped by RAII guards so a panicking render body
//! leaves both stacks balanced.
//!
//! # Failure Modes
//!
//! - Calling a hook outside [`component`] panics.
//! - Calling hooks in a different order than the previous render panics
//!   when a slot's stored type no longer matches.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use crate::panic_message;
use crate::root::RootInner;

/// Cleanup registered by an effect, run when the effect re-fires or the
/// component unmounts.
pub(crate) type CleanupCell = RefCell<Option<Box<dyn FnOnce()>>>;

/// Per-component hook storage.
#[derive(Default)]
pub(crate) struct ComponentState {
    slots: RefCell<Vec<Rc<dyn Any>>>,
    cleanups: RefCell<Vec<Rc<CleanupCell>>>,
}

impl ComponentState {
    pub(crate) fn register_cleanup(&self, cell: Rc<CleanupCell>) {
        self.cleanups.borrow_mut().push(cell);
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Run effect cleanups (last registered first) and drop hook storage.
    ///
    /// A panicking cleanup does not stop the others; the messages of those
    /// that panicked are returned.
    pub(crate) fn unmount(&self) -> Vec<String> {
        let cells = std::mem::take(&mut *self.cleanups.borrow_mut());
        let mut panicked = Vec::new();
        for cell in cells.iter().rev() {
            let cleanup = cell.borrow_mut().take();
            if let Some(cleanup) = cleanup
                && let Err(payload) = catch_unwind(AssertUnwindSafe(cleanup))
            {
                panicked.push(panic_message(payload.as_ref()));
            }
        }
        let slots = std::mem::take(&mut *self.slots.borrow_mut());
        drop(slots);
        panicked
    }
}

struct RootFrame {
    root: Rc<RootInner>,
    next_component: usize,
}

struct ComponentFrame {
    root: Rc<RootInner>,
    state: Rc<ComponentState>,
    next_slot: usize,
}

thread_local! {
    static ROOT_STACK: RefCell<Vec<RootFrame>> = const { RefCell::new(Vec::new()) };
    static COMPONENT_STACK: RefCell<Vec<ComponentFrame>> = const { RefCell::new(Vec::new()) };
}

/// Guard for a root render pass. Pops its frame on drop.
pub(crate) struct RootFrameGuard;

impl RootFrameGuard {
    pub(crate) fn enter(root: Rc<RootInner>) -> Self {
        ROOT_STACK.with(|stack| {
            stack.borrow_mut().push(RootFrame {
                root,
                next_component: 0,
            });
        });
        Self
    }

    /// Number of components rendered in this pass so far.
    pub(crate) fn rendered(&self) -> usize {
        ROOT_STACK.with(|stack| stack.borrow().last().map_or(0, |f| f.next_component))
    }
}

impl Drop for RootFrameGuard {
    fn drop(&mut self) {
        ROOT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

struct ComponentFrameGuard;

impl Drop for ComponentFrameGuard {
    fn drop(&mut self) {
        COMPONENT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Render `body` as a child component of the root currently rendering.
///
/// The component keeps its hook state across passes as long as it is
/// rendered at the same position.
///
/// # Panics
///
/// Panics when called outside a root render pass.
pub fn component<R>(body: impl FnOnce() -> R) -> R {
    let (root, state) = ROOT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let Some(frame) = stack.last_mut() else {
            panic!("component() called outside of a root render pass");
        };
        let index = frame.next_component;
        frame.next_component += 1;
        let state = frame.root.component_at(index);
        (Rc::clone(&frame.root), state)
    });
    COMPONENT_STACK.with(|stack| {
        stack.borrow_mut().push(ComponentFrame {
            root,
            state,
            next_slot: 0,
        });
    });
    let _guard = ComponentFrameGuard;
    body()
}

/// Handles available to a hook while its component renders.
pub(crate) struct HookEnv {
    pub(crate) root: Rc<RootInner>,
    pub(crate) component: Rc<ComponentState>,
}

/// Fetch (or create with `init`) the next hook slot of the rendering
/// component.
pub(crate) fn hook_slot<S: 'static>(
    hook: &'static str,
    init: impl FnOnce(&HookEnv) -> S,
) -> (Rc<S>, HookEnv) {
    let (env, index) = COMPONENT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let Some(frame) = stack.last_mut() else {
            panic!("{hook} called outside of a component render");
        };
        let index = frame.next_slot;
        frame.next_slot += 1;
        let env = HookEnv {
            root: Rc::clone(&frame.root),
            component: Rc::clone(&frame.state),
        };
        (env, index)
    });

    let existing = env.component.slots.borrow().get(index).cloned();
    let slot = match existing {
        Some(stored) => match stored.downcast::<S>() {
            Ok(slot) => slot,
            Err(_) => panic!(
                "{hook} at hook slot {index} does not match the previous render; \
                 hooks must be called in the same order on every render"
            ),
        },
        None => {
            let slot = Rc::new(init(&env));
            let erased: Rc<dyn Any> = slot.clone();
            env.component.slots.borrow_mut().push(erased);
            slot
        }
    };
    (slot, env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root::Root;
    use std::cell::Cell;

    #[test]
    fn component_outside_root_panics() {
        let outcome = std::panic::catch_unwind(|| component(|| ()));
        assert!(outcome.is_err());
    }

    #[test]
    fn hook_slot_outside_component_panics() {
        let outcome = std::panic::catch_unwind(|| {
            let _ = hook_slot("use_test", |_| 0u8);
        });
        assert!(outcome.is_err());
    }

    #[test]
    fn slots_persist_across_passes() {
        let created = Rc::new(Cell::new(0u32));
        let seen = Rc::new(Cell::new(0usize));
        let (c, s) = (Rc::clone(&created), Rc::clone(&seen));
        let root = Root::mount(Rc::new(move || {
            component(|| {
                let c = Rc::clone(&c);
                let (slot, env) = hook_slot("use_test", move |_| {
                    c.set(c.get() + 1);
                    Cell::new(7u32)
                });
                assert_eq!(slot.get(), 7);
                s.set(env.component.slot_count());
            });
        }));
        root.rerender().expect("rerender");
        root.rerender().expect("rerender");
        assert_eq!(created.get(), 1);
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn slot_type_mismatch_panics() {
        let flip = Rc::new(Cell::new(false));
        let f = Rc::clone(&flip);
        let root = Root::mount(Rc::new(move || {
            component(|| {
                if f.get() {
                    let _ = hook_slot("use_b", |_| String::new());
                } else {
                    let _ = hook_slot("use_a", |_| 0u32);
                }
            });
        }));
        flip.set(true);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| root.rerender()));
        assert!(outcome.is_err());
        // Stacks stay balanced after the panic.
        assert!(std::panic::catch_unwind(|| component(|| ())).is_err());
    }
}
