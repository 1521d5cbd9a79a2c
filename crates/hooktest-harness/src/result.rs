#![forbid(unsafe_code)]

//! Result history of the hook under test.
//!
//! Every invocation of the hook appends one immutable snapshot. Test code
//! reads the history through a [`ResultView`].
//!
//! # Invariants
//!
//! - Snapshots are append-only and never mutated after they are pushed.
//! - `len()` equals the number of completed invocation cycles.
//! - [`ResultView::current`] is the value of the newest `Value` snapshot.
//! - [`ResultView::error`] is `Some` only while the newest snapshot is an
//!   `Error`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{HarnessError, RenderError};

/// Outcome of one invocation of the hook under test.
#[derive(Debug, Clone, PartialEq)]
pub enum HookResult<V> {
    /// The hook has not been invoked yet.
    Pending,
    /// The hook returned normally.
    Value(V),
    /// The hook panicked, or the runtime failed the render.
    Error(RenderError),
}

impl<V> HookResult<V> {
    /// The value, if this is a `Value`.
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// The error, if this is an `Error`.
    pub fn error(&self) -> Option<&RenderError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Whether this is an `Error`.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Append-only history written by the test host.
pub(crate) struct ResultContainer<V> {
    history: RefCell<Vec<Rc<HookResult<V>>>>,
}

impl<V> ResultContainer<V> {
    pub(crate) fn new() -> Self {
        Self {
            history: RefCell::new(Vec::new()),
        }
    }

    /// Append an outcome and return its 1-based cycle number.
    pub(crate) fn push(&self, outcome: HookResult<V>) -> u64 {
        let mut history = self.history.borrow_mut();
        history.push(Rc::new(outcome));
        history.len() as u64
    }

    /// Number of snapshots pushed so far.
    pub(crate) fn cycles(&self) -> u64 {
        self.history.borrow().len() as u64
    }

    /// First error among the snapshots pushed after cycle `after`.
    pub(crate) fn first_error_since(&self, after: u64) -> Option<RenderError> {
        let history = self.history.borrow();
        let start = usize::try_from(after).unwrap_or(usize::MAX);
        history
            .iter()
            .skip(start)
            .find_map(|result| result.error().cloned())
    }
}

/// Read-only live view of a harness's results.
///
/// Clones share the same history.
pub struct ResultView<V> {
    container: Rc<ResultContainer<V>>,
}

impl<V> Clone for ResultView<V> {
    fn clone(&self) -> Self {
        Self {
            container: Rc::clone(&self.container),
        }
    }
}

impl<V> ResultView<V> {
    pub(crate) fn new(container: Rc<ResultContainer<V>>) -> Self {
        Self { container }
    }

    /// Call `f` with the newest successful value.
    ///
    /// # Errors
    ///
    /// [`HarnessError::NoValue`] when the hook has never returned normally.
    pub fn with_current<R>(&self, f: impl FnOnce(&V) -> R) -> Result<R, HarnessError> {
        let latest_value = {
            let history = self.container.history.borrow();
            history
                .iter()
                .rev()
                .find(|result| result.value().is_some())
                .cloned()
        };
        latest_value
            .as_deref()
            .and_then(HookResult::value)
            .map(f)
            .ok_or(HarnessError::NoValue)
    }

    /// Error of the newest snapshot, when it is an error.
    #[must_use]
    pub fn error(&self) -> Option<RenderError> {
        self.latest().error().cloned()
    }

    /// Every snapshot, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<Rc<HookResult<V>>> {
        self.container.history.borrow().clone()
    }

    /// Newest snapshot, or `Pending` before the first invocation.
    #[must_use]
    pub fn latest(&self) -> Rc<HookResult<V>> {
        self.container
            .history
            .borrow()
            .last()
            .cloned()
            .unwrap_or_else(|| Rc::new(HookResult::Pending))
    }

    /// Number of completed invocation cycles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.container.history.borrow().len()
    }

    /// Whether the hook has not been invoked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> ResultView<V> {
    /// Clone of the newest successful value.
    ///
    /// # Errors
    ///
    /// [`HarnessError::NoValue`] when the hook has never returned normally.
    pub fn current(&self) -> Result<V, HarnessError> {
        self.with_current(V::clone)
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for ResultView<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultView")
            .field("len", &self.len())
            .field("latest", &self.latest())
            .finish()
    }
}
