#![forbid(unsafe_code)]

//! Harness configuration.
//!
//! Defaults can be changed for a whole test binary through environment
//! variables, and per harness through [`RenderHookOptions::config`].
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `HOOKTEST_TIMEOUT_MS` | default wait timeout; `0` disables it |
//! | `HOOKTEST_INTERVAL_MS` | default `wait_for` polling interval; `0` disables it |
//! | `HOOKTEST_SKIP_AUTO_CLEANUP` | `1`/`true`: dropping a harness does not unmount it |
//! | `HOOKTEST_DISABLE_ERROR_FILTERING` | `1`/`true`: print panics captured from hooks |
//!
//! [`RenderHookOptions::config`]: crate::controller::RenderHookOptions::config

use std::sync::OnceLock;
use std::time::Duration;

/// Default wait timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default `wait_for` polling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);

/// Harness-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Timeout used when [`WaitOptions`](crate::wait::WaitOptions) leaves it
    /// unset. `None` waits forever.
    pub default_timeout: Option<Duration>,
    /// Polling interval used by `wait_for` when unset. `None` checks only on
    /// updates.
    pub default_interval: Option<Duration>,
    /// Leave harnesses mounted when their handle is dropped.
    pub skip_auto_cleanup: bool,
    /// Silence panic output from hooks whose failure is captured.
    pub filter_error_output: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            default_timeout: Some(DEFAULT_TIMEOUT),
            default_interval: Some(DEFAULT_INTERVAL),
            skip_auto_cleanup: false,
            filter_error_output: true,
        }
    }
}

impl HarnessConfig {
    /// Defaults overridden by `HOOKTEST_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_timeout: env_millis("HOOKTEST_TIMEOUT_MS").unwrap_or(defaults.default_timeout),
            default_interval: env_millis("HOOKTEST_INTERVAL_MS")
                .unwrap_or(defaults.default_interval),
            skip_auto_cleanup: env_flag("HOOKTEST_SKIP_AUTO_CLEANUP"),
            filter_error_output: !env_flag("HOOKTEST_DISABLE_ERROR_FILTERING"),
        }
    }

    /// Process-wide configuration, read from the environment once.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<HarnessConfig> = OnceLock::new();
        GLOBAL.get_or_init(Self::from_env)
    }

    /// Set the default wait timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the default polling interval.
    #[must_use]
    pub fn interval(mut self, interval: Option<Duration>) -> Self {
        self.default_interval = interval;
        self
    }

    /// Keep the harness mounted when its handle is dropped.
    #[must_use]
    pub fn skip_auto_cleanup(mut self, skip: bool) -> Self {
        self.skip_auto_cleanup = skip;
        self
    }

    /// Toggle silencing of captured hook panics.
    #[must_use]
    pub fn filter_error_output(mut self, filter: bool) -> Self {
        self.filter_error_output = filter;
        self
    }
}

/// `Some(None)` for `0`, `Some(Some(d))` for a positive value, `None` when
/// unset or unparsable.
fn env_millis(key: &str) -> Option<Option<Duration>> {
    env_u64(key).map(|ms| (ms > 0).then(|| Duration::from_millis(ms)))
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str) -> bool {
    matches!(
        std::env::var(key).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE")
    )
}
