#![forbid(unsafe_code)]

//! Hooktest Harness
//!
//! Renders a hook outside of any visible UI and lets a test drive and
//! observe it.
//!
//! # Key Components
//!
//! - [`render_hook`] / [`render_hook_with`] - Mount a hook and get a
//!   [`RenderHookHarness`]
//! - [`ResultView`] - `current()`, `error()` and the full `all()` history
//! - [`RenderHookHarness::wait_for_next_update`],
//!   [`RenderHookHarness::wait_for`],
//!   [`RenderHookHarness::wait_for_value_to_change`] - Async waits
//! - [`cleanup`] - Unmount every harness still alive on this thread
//! - [`HarnessConfig`] - Defaults, overridable from `HOOKTEST_*` variables
//!
//! # Example
//!
//! ```
//! use hooktest_harness::{render_hook, act};
//! use hooktest_runtime::use_state;
//!
//! let harness = render_hook(|| use_state(|| 0));
//! let (_, set_count) = harness.result.current().unwrap();
//! act(|| set_count.update(|n| n + 1));
//! assert_eq!(harness.result.current().unwrap().0, 1);
//! ```

pub mod cleanup;
pub mod config;
pub mod controller;
pub mod error;
pub mod error_output;
pub mod host;
pub mod result;
pub mod wait;

pub use cleanup::{CleanupId, add_cleanup, cleanup, pending_cleanups, remove_cleanup};
pub use config::HarnessConfig;
pub use controller::{RenderHookHarness, RenderHookOptions, render_hook, render_hook_with};
pub use error::{HarnessError, RenderError, Result};
pub use error_output::{ErrorOutputGuard, suppress_error_output};
pub use host::{UpdateSignal, Wrapper};
pub use hooktest_runtime::{act, act_async};
pub use result::{HookResult, ResultView};
pub use wait::WaitOptions;
