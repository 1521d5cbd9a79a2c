#![forbid(unsafe_code)]

//! Context values passed down a render without threading arguments.
//!
//! [`provide_context`] makes a value visible to everything rendered inside
//! its `children` closure; [`use_context`] reads the nearest provided value
//! of the requested type. Providers nest: an inner provider of the same type
//! shadows the outer one until it returns.
//!
//! # Invariants
//!
//! - A provider's value is visible only while its `children` closure runs,
//!   including when that closure panics.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<(TypeId, Rc<dyn Any>)>> = const { RefCell::new(Vec::new()) };
}

struct ProviderGuard;

impl Drop for ProviderGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Render `children` with `value` available to [`use_context`].
pub fn provide_context<T: 'static, R>(value: T, children: impl FnOnce() -> R) -> R {
    CONTEXT_STACK.with(|stack| {
        stack
            .borrow_mut()
            .push((TypeId::of::<T>(), Rc::new(value) as Rc<dyn Any>));
    });
    let _guard = ProviderGuard;
    children()
}

/// Nearest provided value of type `T`, if any provider is active.
#[must_use]
pub fn use_context<T: Clone + 'static>() -> Option<T> {
    CONTEXT_STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .rev()
            .find(|(id, _)| *id == TypeId::of::<T>())
            .and_then(|(_, value)| value.downcast_ref::<T>().cloned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Theme(&'static str);

    #[test]
    fn missing_context_is_none() {
        assert_eq!(use_context::<Theme>(), None);
    }

    #[test]
    fn inner_provider_shadows_outer() {
        let seen = provide_context(Theme("dark"), || {
            let outer = use_context::<Theme>();
            let inner = provide_context(Theme("light"), use_context::<Theme>);
            (outer, inner, use_context::<Theme>())
        });
        assert_eq!(
            seen,
            (
                Some(Theme("dark")),
                Some(Theme("light")),
                Some(Theme("dark"))
            )
        );
        assert_eq!(use_context::<Theme>(), None);
    }

    #[test]
    fn providers_of_different_types_coexist() {
        provide_context(Theme("dark"), || {
            provide_context(3u8, || {
                assert_eq!(use_context::<Theme>(), Some(Theme("dark")));
                assert_eq!(use_context::<u8>(), Some(3));
            });
        });
    }

    #[test]
    fn panicking_children_pop_the_provider() {
        let outcome = std::panic::catch_unwind(|| {
            let () = provide_context(Theme("dark"), || panic!("child failed"));
        });
        assert!(outcome.is_err());
        assert_eq!(use_context::<Theme>(), None);
    }
}
