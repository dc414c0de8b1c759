//! Converged-or-degraded results of an optimization.

use std::fmt;

use serde::Serialize;

use crate::solver::{SolveReport, SolveStatus};

/// Why a solve was not accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
    pub status: SolveStatus,
    pub iterations: usize,
    pub outer_iterations: usize,
    pub constraint_violation: f64,
    pub optimality: f64,
}

impl From<&SolveReport> for FailureReport {
    fn from(report: &SolveReport) -> Self {
        Self {
            status: report.status,
            iterations: report.iterations,
            outer_iterations: report.outer_iterations,
            constraint_violation: report.constraint_violation,
            optimality: report.optimality,
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} after {} iterations ({} outer): constraint violation {:.3e}, optimality {:.3e}",
            self.status,
            self.iterations,
            self.outer_iterations,
            self.constraint_violation,
            self.optimality
        )
    }
}

/// Result of an optimization that either converged or was replaced by a fallback.
///
/// Degraded runs keep the solver's last iterate next to the substituted value so callers
/// can log or inspect it.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Converged(T),
    Degraded {
        fallback: T,
        last_iterate: T,
        report: FailureReport,
    },
}

impl<T> Outcome<T> {
    /// The value downstream consumers should use.
    pub fn value(&self) -> &T {
        match self {
            Outcome::Converged(value) => value,
            Outcome::Degraded { fallback, .. } => fallback,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Outcome::Converged(value) => value,
            Outcome::Degraded { fallback, .. } => fallback,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Outcome::Converged(_))
    }

    pub fn report(&self) -> Option<&FailureReport> {
        match self {
            Outcome::Converged(_) => None,
            Outcome::Degraded { report, .. } => Some(report),
        }
    }

    pub fn map<U, F: Fn(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Converged(value) => Outcome::Converged(f(value)),
            Outcome::Degraded {
                fallback,
                last_iterate,
                report,
            } => Outcome::Degraded {
                fallback: f(fallback),
                last_iterate: f(last_iterate),
                report,
            },
        }
    }
}
