//! Error types for Tether core primitives.

/// Timer-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    /// The timer ID is invalid, was stopped, or was a one-shot that already fired.
    #[error("Invalid or expired timer ID")]
    InvalidTimerId,
}
