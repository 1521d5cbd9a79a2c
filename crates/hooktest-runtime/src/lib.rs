#![forbid(unsafe_code)]

//! Hooktest Runtime
//!
//! A small single-threaded reactive renderer for exercising hook functions:
//! roots mount element trees, components own call-order-indexed hook state,
//! and state updates are coalesced at [`act`] flush boundaries.
//!
//! # Key Components
//!
//! - [`Root`] - Mounts an element and drives its render passes
//! - [`component`] - Renders a body with its own hook state
//! - [`use_state`], [`use_reducer`], [`use_ref`], [`use_memo`],
//!   [`use_effect`], [`use_observable`] - Hooks
//! - [`provide_context`] / [`use_context`] - Values passed down a render
//! - [`act`] / [`act_async`] - Flush boundary for state updates
//! - [`Observable`] - Shared external store with change notification
//!
//! # Role in Hooktest
//! `hooktest-runtime` is what the harness renders hooks into. It knows
//! nothing about results or waiting; the harness layers those on top.

pub mod component;
pub mod context;
pub mod error;
pub mod hooks;
pub mod reactive;
pub mod root;

use std::any::Any;

pub use component::component;
pub use context::{provide_context, use_context};
pub use error::{Result, RuntimeError};
pub use hooks::{
    Dispatch, HookRef, SetState, use_effect, use_effect_with_cleanup, use_memo, use_observable,
    use_reducer, use_ref, use_state,
};
pub use reactive::{
    BatchScope, Observable, Subscription, act, act_async, defer_or_run, defer_or_run_keyed,
    is_batching,
};
pub use root::{Element, ErrorHandler, MAX_RENDER_PASSES, Root, RootOptions};

/// Human-readable message from a panic payload.
///
/// Payloads from `panic!` are `&str` or `String`; anything else gets a
/// generic message.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}
