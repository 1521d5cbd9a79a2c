#![forbid(unsafe_code)]

//! External stores read by hooks through
//! [`use_observable`](crate::hooks::use_observable).
//!
//! An [`Observable`] holds a value and a list of change listeners.
//! Listeners get no value: they learn that the store changed and read it
//! themselves. For a mounted hook the listener schedules its root, and the
//! render that follows reads the store.
//!
//! Every notification is routed through [`defer_or_run_keyed`] with the
//! listener's address as key. Outside a flush boundary listeners run
//! immediately; inside [`act`](super::batch::act) a listener runs once per
//! flush round however many writes preceded it.
//!
//! # Invariants
//!
//! - The revision counts value-changing writes and nothing else.
//! - Writing a value equal to the current one notifies nobody.
//! - A listener whose [`Subscription`] is gone is never called again.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::trace;

use super::batch::defer_or_run_keyed;

type Listener = Rc<dyn Fn()>;

struct Store<T> {
    value: RefCell<T>,
    revision: Cell<u64>,
    listeners: RefCell<Vec<Weak<dyn Fn()>>>,
}

/// Shared store handle. Clones point at the same store.
pub struct Observable<T> {
    store: Rc<Store<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.store.value.borrow())
            .field("revision", &self.store.revision.get())
            .finish_non_exhaustive()
    }
}

impl<T: PartialEq + 'static> Observable<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            store: Rc::new(Store {
                value: RefCell::new(value),
                revision: Cell::new(0),
                listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.store.value.borrow().clone()
    }

    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.store.value.borrow())
    }

    /// Store `value` and notify listeners if it differs from the current one.
    pub fn set(&self, value: T) {
        {
            let mut current = self.store.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        self.changed();
    }

    /// Compute the next value from the current one, then [`set`](Self::set) it.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.store.value.borrow());
        self.set(next);
    }

    /// Register `listener`; it stays registered while the returned
    /// [`Subscription`] lives.
    pub fn subscribe(&self, listener: impl Fn() + 'static) -> Subscription {
        let listener: Listener = Rc::new(listener);
        self.store
            .listeners
            .borrow_mut()
            .push(Rc::downgrade(&listener));
        Subscription {
            _listener: listener,
        }
    }

    /// Number of value-changing writes so far.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.store.revision.get()
    }

    /// Listeners whose subscription is still alive.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.store
            .listeners
            .borrow()
            .iter()
            .filter(|listener| listener.strong_count() > 0)
            .count()
    }

    fn changed(&self) {
        let revision = self.store.revision.get() + 1;
        self.store.revision.set(revision);
        let live: Vec<Listener> = {
            let mut listeners = self.store.listeners.borrow_mut();
            listeners.retain(|listener| listener.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        trace!(revision, listeners = live.len(), "observable changed");
        for listener in live {
            let key = Rc::as_ptr(&listener) as *const () as usize;
            defer_or_run_keyed(key, move || listener());
        }
    }
}

/// Keeps a listener registered. Dropping it unsubscribes.
pub struct Subscription {
    _listener: Listener,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::batch::act;

    fn counting(store: &Observable<i32>) -> (Subscription, Rc<Cell<u32>>) {
        let calls = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&calls);
        (store.subscribe(move || c.set(c.get() + 1)), calls)
    }

    #[test]
    fn revision_moves_only_on_change() {
        let store = Observable::new(1);
        store.set(1);
        store.update(|n| *n);
        assert_eq!(store.revision(), 0);
        store.set(2);
        store.update(|n| n * 10);
        assert_eq!(store.revision(), 2);
        assert_eq!(store.get(), 20);
    }

    #[test]
    fn listener_reads_the_store_it_watches() {
        let store = Observable::new(String::from("a"));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (source, s) = (store.clone(), Rc::clone(&seen));
        let _sub = store.subscribe(move || s.borrow_mut().push(source.get()));
        store.set("b".into());
        store.update(|v| format!("{v}c"));
        assert_eq!(*seen.borrow(), vec!["b", "bc"]);
    }

    #[test]
    fn equal_write_is_silent() {
        let store = Observable::new(5);
        let (_sub, calls) = counting(&store);
        store.set(5);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn dropped_subscription_is_never_called() {
        let store = Observable::new(0);
        let (sub, calls) = counting(&store);
        assert_eq!(store.listener_count(), 1);
        drop(sub);
        assert_eq!(store.listener_count(), 0);
        store.set(1);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn writes_inside_act_notify_each_listener_once() {
        let store = Observable::new(0);
        let (_a, a_calls) = counting(&store);
        let (_b, b_calls) = counting(&store);
        act(|| {
            for n in 1..=4 {
                store.set(n);
            }
            assert_eq!(a_calls.get(), 0);
        });
        assert_eq!((a_calls.get(), b_calls.get()), (1, 1));
        assert_eq!(store.revision(), 4);
    }

    #[test]
    fn listener_can_unsubscribe_a_sibling() {
        let store = Observable::new(0);
        let sibling: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&sibling);
        let _first = store.subscribe(move || drop(slot.borrow_mut().take()));
        let (second, calls) = counting(&store);
        *sibling.borrow_mut() = Some(second);

        store.set(1);
        store.set(2);
        assert_eq!(calls.get(), 1);
        assert_eq!(store.listener_count(), 1);
    }
}
