#![forbid(unsafe_code)]

//! Runtime error model.

use std::fmt;

/// Errors reported by a [`Root`](crate::root::Root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The root was unmounted before the operation.
    Unmounted,
    /// State kept changing during a render pass; the root gave up after
    /// `passes` consecutive passes.
    RenderLimitExceeded { passes: u32 },
    /// An effect or effect cleanup panicked.
    EffectPanicked { message: String },
}

impl RuntimeError {
    /// Error type label for tracing.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Unmounted => "unmounted",
            Self::RenderLimitExceeded { .. } => "render_limit",
            Self::EffectPanicked { .. } => "effect_panicked",
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmounted => write!(f, "root is not mounted"),
            Self::RenderLimitExceeded { passes } => write!(
                f,
                "too many re-renders: state still changing after {passes} passes"
            ),
            Self::EffectPanicked { message } => write!(f, "effect panicked: {message}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Standard result type for runtime APIs.
pub type Result<T> = std::result::Result<T, RuntimeError>;
