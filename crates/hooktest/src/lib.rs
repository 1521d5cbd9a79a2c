#![forbid(unsafe_code)]

//! Hooktest public facade crate.
//!
//! Re-exports the harness and the runtime hooks it renders into, plus a
//! prelude for test modules.
//!
//! ```
//! use hooktest::prelude::*;
//!
//! let harness = render_hook(|| use_state(|| "ready"));
//! assert_eq!(harness.result.current().map(|(value, _)| value), Ok("ready"));
//! ```

// --- Harness re-exports ----------------------------------------------------

pub use hooktest_harness::{
    CleanupId, ErrorOutputGuard, HarnessConfig, HarnessError, HookResult, RenderError,
    RenderHookHarness, RenderHookOptions, ResultView, UpdateSignal, WaitOptions, Wrapper,
    add_cleanup, cleanup, pending_cleanups, remove_cleanup, render_hook, render_hook_with,
    suppress_error_output,
};

// --- Runtime re-exports ----------------------------------------------------

pub use hooktest_runtime::{
    Dispatch, HookRef, Observable, Root, RootOptions, RuntimeError, SetState, Subscription, act,
    act_async, component, provide_context, use_context, use_effect, use_effect_with_cleanup,
    use_memo, use_observable, use_reducer, use_ref, use_state,
};

/// Standard result type for harness APIs.
pub type Result<T> = hooktest_harness::Result<T>;

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        HarnessError, HookResult, Observable, RenderHookHarness, RenderHookOptions, Result,
        SetState, WaitOptions, act, act_async, cleanup, provide_context, render_hook,
        render_hook_with, use_context, use_effect, use_effect_with_cleanup, use_memo,
        use_observable, use_reducer, use_ref, use_state,
    };

    pub use crate::{harness, runtime};
}

pub use hooktest_harness as harness;
pub use hooktest_runtime as runtime;
