#![forbid(unsafe_code)]

//! Harness error model.
//!
//! # Design Principles
//!
//! 1. **Hook failures are data**: a panic inside the hook under test becomes
//!    a [`RenderError`] stored in the result history, never an `Err` from a
//!    harness call that did not ask about it.
//! 2. **Misuse is loud**: reading a value that does not exist, or driving a
//!    harness after unmount, is returned to the caller immediately.
//! 3. **Observability**: every variant carries a stable
//!    [`HarnessError::error_type`] label for tracing fields.

use std::fmt;
use std::time::Duration;

// ── Captured hook failure ───────────────────────────────────────────────

/// A failure captured while invoking the hook under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderError {
    message: String,
    cycle: u64,
}

impl RenderError {
    pub(crate) fn new(message: impl Into<String>, cycle: u64) -> Self {
        Self {
            message: message.into(),
            cycle,
        }
    }

    /// The panic or runtime failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Invocation cycle (1-based) in which the failure was captured.
    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }
}

// ── Harness error ───────────────────────────────────────────────────────

/// Errors returned by harness operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarnessError {
    /// `current()` was read before the hook produced a value.
    NoValue,
    /// The operation needs a mounted harness.
    Unmounted { operation: &'static str },
    /// A wait did not complete within its window.
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    /// The hook failed during an awaited update.
    Render(RenderError),
    /// A predicate or selector passed to a wait panicked.
    Callback {
        operation: &'static str,
        message: String,
    },
}

/// Standard result type for harness APIs.
pub type Result<T> = std::result::Result<T, HarnessError>;

impl HarnessError {
    /// Error type label for tracing.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NoValue => "no_value",
            Self::Unmounted { .. } => "unmounted",
            Self::Timeout { .. } => "timeout",
            Self::Render(_) => "render",
            Self::Callback { .. } => "callback",
        }
    }

    /// Whether this is a [`HarnessError::Timeout`].
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// ── Display ─────────────────────────────────────────────────────────────

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoValue => write!(
                f,
                "no value: the hook has not completed a successful render yet"
            ),
            Self::Unmounted { operation } => {
                write!(f, "cannot {operation}: the harness is unmounted")
            }
            Self::Timeout { operation, timeout } => {
                write!(f, "Timed out in {operation} after {}ms.", timeout.as_millis())
            }
            Self::Render(err) => write!(f, "hook failed in render {}: {err}", err.cycle),
            Self::Callback { operation, message } => {
                write!(f, "callback passed to {operation} panicked: {message}")
            }
        }
    }
}

// ── std::error::Error ───────────────────────────────────────────────────

impl std::error::Error for RenderError {}

impl std::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Render(err) => Some(err),
            _ => None,
        }
    }
}

// ── From conversions ────────────────────────────────────────────────────

impl From<RenderError> for HarnessError {
    fn from(err: RenderError) -> Self {
        Self::Render(err)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use super::*;

    #[test]
    fn timeout_message_names_operation_and_millis() {
        let err = HarnessError::Timeout {
            operation: "wait_for_next_update",
            timeout: Duration::from_millis(100),
        };
        assert_eq!(
            err.to_string(),
            "Timed out in wait_for_next_update after 100ms."
        );
        assert!(err.is_timeout());
        assert_eq!(err.error_type(), "timeout");
    }

    #[test]
    fn render_error_is_source_of_render_variant() {
        let err = HarnessError::from(RenderError::new("boom", 3));
        assert!(err.to_string().contains("render 3"));
        assert_eq!(StdError::source(&err).map(ToString::to_string), Some("boom".into()));
    }

    #[test]
    fn unmounted_names_operation() {
        let err = HarnessError::Unmounted {
            operation: "rerender",
        };
        assert_eq!(err.to_string(), "cannot rerender: the harness is unmounted");
        assert!(StdError::source(&err).is_none());
    }

    #[test]
    fn error_type_labels_are_distinct() {
        let labels = [
            HarnessError::NoValue.error_type(),
            HarnessError::Unmounted { operation: "x" }.error_type(),
            HarnessError::Timeout {
                operation: "x",
                timeout: Duration::ZERO,
            }
            .error_type(),
            HarnessError::Render(RenderError::new("m", 1)).error_type(),
            HarnessError::Callback {
                operation: "x",
                message: String::new(),
            }
            .error_type(),
        ];
        let unique: std::collections::BTreeSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }
}
