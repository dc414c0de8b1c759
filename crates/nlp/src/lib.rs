//! Nonlinear programming for the descent planner.
//!
//! Problems are explicit descriptions (variables, bounds, objective, constraints) handed to
//! a stateless [`solve`] call; nothing about a solve survives outside its [`SolveReport`].
//! Problems whose objective is only piecewise smooth go to [`pattern_search`] instead.

pub mod outcome;
pub mod pattern;
pub mod problem;
pub mod solver;

pub use nalgebra::{DMatrix, DVector};
pub use outcome::{FailureReport, Outcome};
pub use pattern::pattern_search;
pub use problem::{Problem, finite_difference_gradient, finite_difference_jacobian, symmetrize};
pub use solver::{SolveReport, SolveStatus, SolverSettings, solve};
