#![forbid(unsafe_code)]

//! Reactive primitives: the flush boundary and observable stores.

pub mod batch;
pub mod observable;

pub use batch::{BatchScope, act, act_async, defer_or_run, defer_or_run_keyed, is_batching};
pub use observable::{Observable, Subscription};
