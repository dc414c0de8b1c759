//! Derivative-free pattern search for small problems whose objective jumps.
//!
//! Trial points move along the null space of the equality Jacobian taken at the start, so
//! linear equalities hold at every accepted point. Points outside the bounds, or with a
//! larger constraint violation than the start (or `tol`, whichever is larger), are
//! rejected outright. Each poll round accepts the first improving direction; a round
//! without one halves the mesh.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::problem::Problem;
use crate::solver::{SolveReport, SolveStatus, SolverSettings, constraint_violation};

/// Mesh size of the first round, in scaled variables.
const INITIAL_MESH: f64 = 0.25;
const MIN_DIRECTION_NORM: f64 = 1e-8;

/// Minimize `problem` from `initial` by polling.
///
/// `settings.max_iter` caps poll rounds. The search converges once the mesh falls to
/// `tol` and is acceptable when the budget runs out with the mesh under `acceptable_tol`.
/// The reported optimality is the final mesh size.
pub fn pattern_search<P: Problem + ?Sized>(
    problem: &P,
    initial: &DVector<f64>,
    settings: &SolverSettings,
) -> SolveReport {
    let scale = problem.variable_scale().map(|s| if s > 0.0 { s } else { 1.0 });
    let lower = problem.lower_bounds().component_div(&scale);
    let upper = problem.upper_bounds().component_div(&scale);

    let mut y = initial.component_div(&scale);
    let x0 = y.component_mul(&scale);
    let start_violation =
        constraint_violation(&problem.equalities(&x0), &problem.inequalities(&x0));
    let allowed = start_violation.max(settings.tol);
    let directions = poll_directions(problem, &x0, &scale);

    let admissible = |candidate: &DVector<f64>| -> bool {
        let inside = candidate
            .iter()
            .zip(lower.iter().zip(upper.iter()))
            .all(|(v, (lo, hi))| v >= lo && v <= hi);
        if !inside {
            return false;
        }
        let x = candidate.component_mul(&scale);
        constraint_violation(&problem.equalities(&x), &problem.inequalities(&x)) <= allowed
    };

    let mut value = problem.objective(&x0);
    let mut mesh = INITIAL_MESH;
    let mut rounds = 0;
    let mut status = if value.is_finite() {
        SolveStatus::MaxIterations
    } else {
        SolveStatus::NumericalFailure
    };

    while status == SolveStatus::MaxIterations && rounds < settings.max_iter {
        if mesh <= settings.tol {
            status = SolveStatus::Converged;
            break;
        }
        rounds += 1;

        let mut improved = None;
        'poll: for direction in &directions {
            for sign in [1.0, -1.0] {
                let candidate = &y + direction * (sign * mesh);
                if !admissible(&candidate) {
                    continue;
                }
                let candidate_value = problem.objective(&candidate.component_mul(&scale));
                if candidate_value.is_finite() && candidate_value < value {
                    improved = Some((candidate, candidate_value));
                    break 'poll;
                }
            }
        }

        match improved {
            Some((candidate, candidate_value)) => {
                y = candidate;
                value = candidate_value;
            }
            None => mesh *= 0.5,
        }
    }

    if status == SolveStatus::MaxIterations {
        if mesh <= settings.tol {
            status = SolveStatus::Converged;
        } else if mesh <= settings.acceptable_tol {
            status = SolveStatus::Acceptable;
        }
    }

    let x = y.component_mul(&scale);
    let violation = constraint_violation(&problem.equalities(&x), &problem.inequalities(&x));
    debug!(rounds, mesh, objective = value, violation, status = ?status, "pattern search finished");
    SolveReport {
        objective: problem.objective(&x),
        x,
        constraint_violation: violation,
        optimality: mesh,
        iterations: rounds,
        outer_iterations: 1,
        status,
    }
}

/// Unit columns of the projector onto the null space of the scaled equality Jacobian.
/// Without equalities these are the coordinate axes.
fn poll_directions<P: Problem + ?Sized>(
    problem: &P,
    x: &DVector<f64>,
    scale: &DVector<f64>,
) -> Vec<DVector<f64>> {
    let n = x.len();
    let mut projector = DMatrix::identity(n, n);
    if !problem.equalities(x).is_empty() {
        let jac = problem.equality_jacobian(x) * DMatrix::from_diagonal(scale);
        let gram = &jac * jac.transpose();
        if let Some(factor) = gram.cholesky() {
            projector -= jac.transpose() * factor.solve(&jac);
        }
    }

    projector
        .column_iter()
        .filter_map(|column| {
            let norm = column.norm();
            (norm > MIN_DIRECTION_NORM).then(|| column.into_owned() / norm)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Split a fixed budget into three parts as close to `(1, 2, 3)` as a staircase allows.
    struct StaircaseSplit;

    impl Problem for StaircaseSplit {
        fn dimension(&self) -> usize {
            3
        }
        fn lower_bounds(&self) -> DVector<f64> {
            DVector::from_element(3, 0.5)
        }
        fn upper_bounds(&self) -> DVector<f64> {
            DVector::from_element(3, 6.0)
        }
        fn objective(&self, x: &DVector<f64>) -> f64 {
            let target = [1.0, 2.0, 3.0];
            x.iter()
                .zip(target.iter())
                .map(|(v, t)| (v - t).powi(2) + (10.0 * v).floor() * 1e-3)
                .sum()
        }
        fn equalities(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_element(1, (x.sum() - 6.0) / 6.0)
        }
        fn equality_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_element(1, x.len(), 1.0 / 6.0)
        }
    }

    struct Unbounded;

    impl Problem for Unbounded {
        fn dimension(&self) -> usize {
            2
        }
        fn lower_bounds(&self) -> DVector<f64> {
            DVector::from_element(2, f64::NEG_INFINITY)
        }
        fn upper_bounds(&self) -> DVector<f64> {
            DVector::from_element(2, f64::INFINITY)
        }
        fn objective(&self, x: &DVector<f64>) -> f64 {
            (x[0] + 1.0).abs() + (x[1] - 0.5).abs()
        }
    }

    #[test]
    fn search_keeps_the_budget_and_finds_the_split() {
        let start = DVector::from_element(3, 2.0);
        let report = pattern_search(&StaircaseSplit, &start, &SolverSettings::default());
        assert_eq!(report.status, SolveStatus::Converged);
        assert!((report.x.sum() - 6.0).abs() < 1e-9);
        assert!((report.x[0] - 1.0).abs() < 0.1, "x = {:?}", report.x.as_slice());
        assert!((report.x[2] - 3.0).abs() < 0.1, "x = {:?}", report.x.as_slice());
        assert!(report.objective < StaircaseSplit.objective(&start));
        assert!(report.optimality <= 1e-6);
    }

    #[test]
    fn nonsmooth_minimum_is_reached_along_the_axes() {
        let report = pattern_search(
            &Unbounded,
            &DVector::from_vec(vec![3.0, -2.0]),
            &SolverSettings::default(),
        );
        assert_eq!(report.status, SolveStatus::Converged);
        assert!((report.x[0] + 1.0).abs() < 1e-5);
        assert!((report.x[1] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn small_budget_reports_the_mesh_it_reached() {
        let settings = SolverSettings {
            max_iter: 3,
            ..SolverSettings::default()
        };
        let report = pattern_search(&Unbounded, &DVector::from_vec(vec![3.0, -2.0]), &settings);
        assert_eq!(report.status, SolveStatus::MaxIterations);
        assert_eq!(report.iterations, 3);
        assert!(report.optimality >= 0.25 / 8.0);
    }
}
