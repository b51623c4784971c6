//! Error types for the gridmdp crate

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by MDP construction, policy iteration and simulation.
///
/// None of these are transient: each one reports a contract violation at
/// construction or usage time and is propagated to the caller unchanged.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("cannot add a transition from terminal state {state}")]
    InvalidTransitionTarget { state: String },

    #[error("invalid marking for state {state}: {reason}")]
    InvalidStateMarking { state: String, reason: String },

    #[error("unknown state {state}")]
    UnknownState { state: String },

    #[error("the MDP has no initial state")]
    NoInitialState,

    #[error(
        "probability mass exhausted for {state} under {action}: draw {draw} > cumulative {total}"
    )]
    ProbabilityMassError {
        state: String,
        action: String,
        draw: f64,
        total: f64,
    },

    #[error("invalid action {action}: {reason}")]
    InvalidAction { action: String, reason: String },

    #[error("transition weight {weight} must be positive and finite")]
    InvalidWeight { weight: f64 },

    #[error("parameter {name} = {value} is out of range")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("failed to load configuration {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn unknown_state<S: std::fmt::Debug>(state: &S) -> Self {
        Error::UnknownState {
            state: format!("{state:?}"),
        }
    }

    pub(crate) fn marking<S: std::fmt::Debug>(state: &S, reason: &str) -> Self {
        Error::InvalidStateMarking {
            state: format!("{state:?}"),
            reason: reason.to_string(),
        }
    }
}

/// Checks that a discount, step size or exploration rate lies in `[low, 1]`,
/// excluding `low` itself when `open_low` is set.
pub(crate) fn check_unit_interval(name: &'static str, value: f64, open_low: bool) -> Result<()> {
    let above_low = if open_low { value > 0.0 } else { value >= 0.0 };
    if above_low && value <= 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter { name, value })
    }
}
