#![forbid(unsafe_code)]

//! Hooks: call-order-indexed state attached to the rendering component.
//!
//! | Hook | Returns |
//! |------|---------|
//! | [`use_state`] | current value and a [`SetState`] handle |
//! | [`use_reducer`] | current state and a [`Dispatch`] handle |
//! | [`use_ref`] | a [`HookRef`] that survives renders without triggering them |
//! | [`use_memo`] | a value recomputed when its deps change |
//! | [`use_effect`] / [`use_effect_with_cleanup`] | runs after the render body when deps change |
//! | [`use_observable`] | the current value of an [`Observable`], re-rendering on change |
//!
//! State handles apply updates eagerly and then schedule a render of the
//! owning root. Setting a value equal to the current one is a no-op.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::{Rc, Weak};

use crate::component::{CleanupCell, hook_slot};
use crate::reactive::observable::{Observable, Subscription};
use crate::root::RootInner;

struct StateSlot<T> {
    value: RefCell<T>,
    root: Weak<RootInner>,
}

/// Handle for updating a [`use_state`] value from anywhere on the thread,
/// including spawned tasks and effects.
pub struct SetState<T> {
    slot: Rc<StateSlot<T>>,
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for SetState<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetState")
            .field("value", &self.slot.value.borrow())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> SetState<T> {
    /// Replace the value.
    pub fn set(&self, value: T) {
        self.update(move |_| value);
    }

    /// Compute the next value from the latest one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let current = self.slot.value.borrow().clone();
        let next = f(&current);
        if next == current {
            return;
        }
        *self.slot.value.borrow_mut() = next;
        if let Some(root) = self.slot.root.upgrade() {
            root.schedule();
        }
    }

    /// Latest value, which may be newer than the one returned by the
    /// render that produced this handle.
    #[must_use]
    pub fn get(&self) -> T {
        self.slot.value.borrow().clone()
    }
}

/// Hold a value across renders. `init` runs on the first render only.
pub fn use_state<T: Clone + PartialEq + 'static>(init: impl FnOnce() -> T) -> (T, SetState<T>) {
    let (slot, _) = hook_slot("use_state", |env| StateSlot {
        value: RefCell::new(init()),
        root: Rc::downgrade(&env.root),
    });
    let value = slot.value.borrow().clone();
    (value, SetState { slot })
}

/// Dispatches actions to a [`use_reducer`] state.
pub struct Dispatch<A> {
    apply: Rc<dyn Fn(A)>,
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            apply: Rc::clone(&self.apply),
        }
    }
}

impl<A> Dispatch<A> {
    /// Apply `action` through the reducer of the render that produced this
    /// handle.
    pub fn dispatch(&self, action: A) {
        (self.apply)(action);
    }
}

impl<A> std::fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch").finish_non_exhaustive()
    }
}

/// State driven by a reducer function.
pub fn use_reducer<S, A, R>(reducer: R, init: impl FnOnce() -> S) -> (S, Dispatch<A>)
where
    S: Clone + PartialEq + 'static,
    A: 'static,
    R: Fn(&S, A) -> S + 'static,
{
    let (state, set_state) = use_state(init);
    let dispatch = Dispatch {
        apply: Rc::new(move |action: A| set_state.update(|current| reducer(current, action))),
    };
    (state, dispatch)
}

/// Mutable cell that survives renders. Writing to it never re-renders.
pub struct HookRef<T> {
    cell: Rc<RefCell<T>>,
}

impl<T> Clone for HookRef<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T> HookRef<T> {
    /// Replace the stored value.
    pub fn set(&self, value: T) {
        *self.cell.borrow_mut() = value;
    }

    /// Read the stored value by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.cell.borrow())
    }

    /// Mutate the stored value in place.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.cell.borrow_mut())
    }
}

impl<T: Clone> HookRef<T> {
    /// Clone of the stored value.
    #[must_use]
    pub fn get(&self) -> T {
        self.cell.borrow().clone()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for HookRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HookRef").field(&self.cell.borrow()).finish()
    }
}

/// A cell that persists across renders.
pub fn use_ref<T: 'static>(init: impl FnOnce() -> T) -> HookRef<T> {
    let (cell, _) = hook_slot("use_ref", |_| RefCell::new(init()));
    HookRef { cell }
}

struct MemoSlot<D, T> {
    deps: RefCell<Option<D>>,
    value: RefCell<Option<T>>,
}

/// Recompute `compute` only when `deps` differ from the previous render.
pub fn use_memo<D, T>(deps: D, compute: impl FnOnce() -> T) -> T
where
    D: PartialEq + 'static,
    T: Clone + 'static,
{
    let (slot, _) = hook_slot("use_memo", |_| MemoSlot::<D, T> {
        deps: RefCell::new(None),
        value: RefCell::new(None),
    });
    let stale = slot.deps.borrow().as_ref() != Some(&deps);
    let mut cached = slot.value.borrow_mut();
    match cached.as_ref() {
        Some(value) if !stale => value.clone(),
        _ => {
            let value = compute();
            *cached = Some(value.clone());
            drop(cached);
            *slot.deps.borrow_mut() = Some(deps);
            value
        }
    }
}

struct EffectSlot<D> {
    deps: RefCell<Option<D>>,
    cleanup: Rc<CleanupCell>,
}

/// Run `effect` after the render body whenever `deps` change.
///
/// Use `()` as deps for an effect that runs once after mount.
pub fn use_effect<D, F>(deps: D, effect: F)
where
    D: PartialEq + 'static,
    F: FnOnce() + 'static,
{
    use_effect_with_cleanup(deps, move || {
        effect();
        || {}
    });
}

/// Like [`use_effect`], with a cleanup that runs before the effect fires
/// again and when the component unmounts.
pub fn use_effect_with_cleanup<D, F, C>(deps: D, effect: F)
where
    D: PartialEq + 'static,
    F: FnOnce() -> C + 'static,
    C: FnOnce() + 'static,
{
    let (slot, env) = hook_slot("use_effect", |env| {
        let cleanup: Rc<CleanupCell> = Rc::new(RefCell::new(None));
        env.component.register_cleanup(Rc::clone(&cleanup));
        EffectSlot::<D> {
            deps: RefCell::new(None),
            cleanup,
        }
    });
    let changed = slot.deps.borrow().as_ref() != Some(&deps);
    if !changed {
        return;
    }
    *slot.deps.borrow_mut() = Some(deps);

    let cell = Rc::clone(&slot.cleanup);
    env.root.queue_effect(Box::new(move || {
        let previous = cell.borrow_mut().take();
        let cleaned = previous.map(|previous| catch_unwind(AssertUnwindSafe(previous)));
        let cleanup = effect();
        *cell.borrow_mut() = Some(Box::new(cleanup));
        // The new effect is in place; surface the old cleanup's panic now.
        if let Some(Err(payload)) = cleaned {
            resume_unwind(payload);
        }
    }));
}

struct ObservableSlot {
    _subscription: Subscription,
}

/// Read an [`Observable`] and re-render whenever it changes.
///
/// The subscription is made against the observable passed on the first
/// render and lives until the component unmounts.
pub fn use_observable<T: Clone + PartialEq + 'static>(source: &Observable<T>) -> T {
    let _ = hook_slot("use_observable", |env| {
        let root = Rc::downgrade(&env.root);
        let subscription = source.subscribe(move || {
            if let Some(root) = root.upgrade() {
                root.schedule();
            }
        });
        ObservableSlot {
            _subscription: subscription,
        }
    });
    source.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::component;
    use crate::reactive::batch::act;
    use crate::root::Root;
    use std::cell::Cell;

    /// Mount a single-component tree and expose the last value it produced.
    fn mount<V: 'static>(hook: impl Fn() -> V + 'static) -> (Root, Rc<RefCell<Option<V>>>) {
        let out = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&out);
        let root = Root::mount(Rc::new(move || {
            let value = component(&hook);
            *sink.borrow_mut() = Some(value);
        }));
        (root, out)
    }

    #[test]
    fn use_state_keeps_value_and_rerenders_on_set() {
        let (_root, out) = mount(|| use_state(|| 1));
        let (value, set) = out.borrow().clone().expect("rendered");
        assert_eq!(value, 1);

        act(|| set.set(5));
        assert_eq!(out.borrow().as_ref().map(|(v, _)| *v), Some(5));

        act(|| set.update(|v| v * 2));
        assert_eq!(out.borrow().as_ref().map(|(v, _)| *v), Some(10));
        assert_eq!(set.get(), 10);
    }

    #[test]
    fn setting_equal_value_does_not_render() {
        let renders = Rc::new(Cell::new(0u32));
        let r = Rc::clone(&renders);
        let (_root, out) = mount(move || {
            r.set(r.get() + 1);
            use_state(|| "same".to_string())
        });
        let (_, set) = out.borrow().clone().expect("rendered");
        act(|| set.set("same".to_string()));
        assert_eq!(renders.get(), 1);
    }

    #[test]
    fn use_reducer_applies_actions() {
        #[derive(Debug)]
        enum Action {
            Add(i32),
            Reset,
        }
        let (_root, out) = mount(|| {
            use_reducer(
                |state: &i32, action: Action| match action {
                    Action::Add(n) => state + n,
                    Action::Reset => 0,
                },
                || 0,
            )
        });
        let dispatch = out.borrow().as_ref().map(|(_, d)| d.clone()).expect("rendered");
        act(|| {
            dispatch.dispatch(Action::Add(3));
            dispatch.dispatch(Action::Add(4));
        });
        assert_eq!(out.borrow().as_ref().map(|(s, _)| *s), Some(7));
        act(|| dispatch.dispatch(Action::Reset));
        assert_eq!(out.borrow().as_ref().map(|(s, _)| *s), Some(0));
    }

    #[test]
    fn use_ref_persists_without_rendering() {
        let renders = Rc::new(Cell::new(0u32));
        let r = Rc::clone(&renders);
        let (root, out) = mount(move || {
            r.set(r.get() + 1);
            use_ref(|| 0u32)
        });
        let cell = out.borrow().clone().expect("rendered");
        cell.set(9);
        cell.with_mut(|v| *v += 1);
        assert_eq!(renders.get(), 1);
        root.rerender().expect("rerender");
        let again = out.borrow().clone().expect("rendered");
        assert_eq!(again.get(), 10);
    }

    #[test]
    fn use_memo_recomputes_only_on_dep_change() {
        let computed = Rc::new(Cell::new(0u32));
        let dep = Rc::new(Cell::new(1u32));
        let (c, d) = (Rc::clone(&computed), Rc::clone(&dep));
        let (root, out) = mount(move || {
            let c = Rc::clone(&c);
            use_memo(d.get(), move || {
                c.set(c.get() + 1);
                "memo"
            })
        });
        root.rerender().expect("rerender");
        assert_eq!(computed.get(), 1);
        dep.set(2);
        root.rerender().expect("rerender");
        assert_eq!(computed.get(), 2);
        assert_eq!(*out.borrow(), Some("memo"));
    }

    #[test]
    fn effect_cleanup_runs_before_refire_and_on_unmount() {
        let log = Rc::new(RefCell::new(Vec::<String>::new()));
        let dep = Rc::new(Cell::new(0u32));
        let (l, d) = (Rc::clone(&log), Rc::clone(&dep));
        let (root, _out) = mount(move || {
            let l = Rc::clone(&l);
            let n = d.get();
            use_effect_with_cleanup(n, move || {
                l.borrow_mut().push(format!("run {n}"));
                move || l.borrow_mut().push(format!("cleanup {n}"))
            });
        });
        dep.set(1);
        root.rerender().expect("rerender");
        root.rerender().expect("rerender");
        root.unmount();
        assert_eq!(
            *log.borrow(),
            vec!["run 0", "cleanup 0", "run 1", "cleanup 1"]
        );
    }

    #[test]
    fn use_observable_rerenders_on_external_change() {
        let store = Observable::new(1);
        let source = store.clone();
        let (_root, out) = mount(move || use_observable(&source));
        assert_eq!(*out.borrow(), Some(1));
        store.set(2);
        assert_eq!(*out.borrow(), Some(2));
    }

    #[test]
    fn use_observable_unsubscribes_on_unmount() {
        let store = Observable::new(1);
        let source = store.clone();
        let (root, _out) = mount(move || use_observable(&source));
        root.unmount();
        store.set(2);
        assert_eq!(store.listener_count(), 0);
    }
}
