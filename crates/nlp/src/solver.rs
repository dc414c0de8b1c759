//! Augmented-Lagrangian solver with a projected-Newton inner loop.
//!
//! Equalities and inequalities enter a Powell-Hestenes-Rockafellar merit function; box
//! bounds are handled exactly by projection. Iteration happens on scaled variables
//! `y = x / scale` so that airspeeds, distances, and masses share one step length.
//!
//! Each inner iteration takes a Newton step on the variables off their bounds, using the
//! problem's Lagrangian Hessian plus the Gauss-Newton penalty term, and searches along
//! the projection arc. A spectral projected-gradient step takes over when the Newton
//! step is not a descent direction.

use cda_config::SolverConfig;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use tracing::debug;

use crate::problem::Problem;

const ARMIJO_SLOPE: f64 = 1e-4;
const MIN_LINE_STEP: f64 = 1e-12;
const MIN_SPECTRAL_STEP: f64 = 1e-10;
const MAX_SPECTRAL_STEP: f64 = 1e4;
const VIOLATION_REDUCTION: f64 = 0.25;
/// Distance (scaled) within which a variable pushed outward by the gradient counts as
/// sitting on its bound.
const ACTIVE_MARGIN: f64 = 1e-3;
const MAX_REGULARIZATION_TRIES: usize = 16;

/// Iteration caps, tolerances, and penalty schedule for one solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverSettings {
    /// Cap on inner iterations summed over all outer iterations.
    pub max_iter: usize,
    pub max_outer_iter: usize,
    pub tol: f64,
    pub acceptable_tol: f64,
    pub initial_penalty: f64,
    pub penalty_growth: f64,
    pub max_penalty: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self::from(&SolverConfig::default())
    }
}

impl From<&SolverConfig> for SolverSettings {
    fn from(config: &SolverConfig) -> Self {
        Self {
            max_iter: config.max_iter,
            max_outer_iter: config.max_outer_iter,
            tol: config.tol,
            acceptable_tol: config.acceptable_tol,
            initial_penalty: 10.0,
            penalty_growth: 10.0,
            max_penalty: 1e8,
        }
    }
}

/// Terminal state of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolveStatus {
    /// Feasibility and stationarity both within `tol`.
    Converged,
    /// Both within `acceptable_tol` when the iteration budget ran out.
    Acceptable,
    MaxIterations,
    /// The merit function or its gradient stopped being finite.
    NumericalFailure,
}

impl SolveStatus {
    pub fn is_success(self) -> bool {
        matches!(self, SolveStatus::Converged | SolveStatus::Acceptable)
    }
}

/// Everything a solve produced. `x` is the last iterate whatever the status.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub x: DVector<f64>,
    pub objective: f64,
    /// Infinity norm of equality residuals and inequality shortfalls.
    pub constraint_violation: f64,
    /// Infinity norm of the projected Lagrangian gradient in scaled variables.
    pub optimality: f64,
    pub iterations: usize,
    pub outer_iterations: usize,
    pub status: SolveStatus,
}

struct Merit<'a, P: Problem + ?Sized> {
    problem: &'a P,
    scale: &'a DVector<f64>,
    objective_scale: f64,
    lambda_eq: DVector<f64>,
    lambda_ineq: DVector<f64>,
    penalty: f64,
}

impl<P: Problem + ?Sized> Merit<'_, P> {
    fn unscale(&self, y: &DVector<f64>) -> DVector<f64> {
        y.component_mul(self.scale)
    }

    fn value(&self, y: &DVector<f64>) -> f64 {
        let x = self.unscale(y);
        let mu = self.penalty;
        let c = self.problem.equalities(&x);
        let g = self.problem.inequalities(&x);

        let mut total = self.objective_scale * self.problem.objective(&x);
        total += self.lambda_eq.dot(&c) + 0.5 * mu * c.norm_squared();
        for (lambda, gi) in self.lambda_ineq.iter().zip(g.iter()) {
            let shifted = (lambda - mu * gi).max(0.0);
            total += (shifted * shifted - lambda * lambda) / (2.0 * mu);
        }
        total
    }

    fn gradient(&self, y: &DVector<f64>) -> DVector<f64> {
        let x = self.unscale(y);
        let mu = self.penalty;
        let mut grad = self.problem.gradient(&x) * self.objective_scale;

        let c = self.problem.equalities(&x);
        if !c.is_empty() {
            let weights = &self.lambda_eq + &c * mu;
            grad += self.problem.equality_jacobian(&x).tr_mul(&weights);
        }

        let g = self.problem.inequalities(&x);
        if !g.is_empty() {
            let weights = DVector::from_iterator(
                g.len(),
                self.lambda_ineq
                    .iter()
                    .zip(g.iter())
                    .map(|(lambda, gi)| (lambda - mu * gi).max(0.0)),
            );
            grad -= self.problem.inequality_jacobian(&x).tr_mul(&weights);
        }

        grad.component_mul(self.scale)
    }

    /// Hessian of the merit function in scaled variables.
    fn hessian(&self, y: &DVector<f64>) -> DMatrix<f64> {
        let x = self.unscale(y);
        let mu = self.penalty;
        let c = self.problem.equalities(&x);
        let g = self.problem.inequalities(&x);

        let eq_weights = &self.lambda_eq + &c * mu;
        let ineq_weights = DVector::from_iterator(
            g.len(),
            self.lambda_ineq
                .iter()
                .zip(g.iter())
                .map(|(lambda, gi)| (lambda - mu * gi).max(0.0)),
        );
        let negated = -&ineq_weights;
        let mut hessian =
            self.problem
                .lagrangian_hessian(&x, self.objective_scale, &eq_weights, &negated);

        if !c.is_empty() {
            let jac = self.problem.equality_jacobian(&x);
            hessian += jac.tr_mul(&jac) * mu;
        }
        if ineq_weights.iter().any(|w| *w > 0.0) {
            let jac = self.problem.inequality_jacobian(&x);
            for (row, weight) in ineq_weights.iter().enumerate() {
                if *weight > 0.0 {
                    let grad_row = jac.row(row);
                    hessian += grad_row.tr_mul(&grad_row) * mu;
                }
            }
        }

        let d = DMatrix::from_diagonal(self.scale);
        &d * hessian * &d
    }
}

struct Bounds {
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl Bounds {
    fn project(&self, y: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            y.len(),
            y.iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .map(|(v, (lo, hi))| v.max(*lo).min(*hi)),
        )
    }

    fn stationarity(&self, y: &DVector<f64>, grad: &DVector<f64>) -> f64 {
        inf_norm(&(self.project(&(y - grad)) - y))
    }
}

fn inf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

pub(crate) fn constraint_violation(c: &DVector<f64>, g: &DVector<f64>) -> f64 {
    let ineq = g.iter().fold(0.0_f64, |acc, v| acc.max(-v));
    inf_norm(c).max(ineq)
}

fn is_finite(v: &DVector<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}

enum InnerExit {
    Stationary,
    Budget,
    Stalled,
    NonFinite,
}

/// Solve `problem` from `initial`, returning the last iterate and how the solve ended.
///
/// The initial point is projected onto the bounds first; it does not need to be feasible.
pub fn solve<P: Problem + ?Sized>(
    problem: &P,
    initial: &DVector<f64>,
    settings: &SolverSettings,
) -> SolveReport {
    let scale = problem.variable_scale().map(|s| if s > 0.0 { s } else { 1.0 });
    let bounds = Bounds {
        lower: problem.lower_bounds().component_div(&scale),
        upper: problem.upper_bounds().component_div(&scale),
    };

    let mut y = bounds.project(&initial.component_div(&scale));
    let x0 = y.component_mul(&scale);
    let mut merit = Merit {
        problem,
        scale: &scale,
        objective_scale: problem.objective_scale(),
        lambda_eq: DVector::zeros(problem.equalities(&x0).len()),
        lambda_ineq: DVector::zeros(problem.inequalities(&x0).len()),
        penalty: settings.initial_penalty,
    };

    let mut iterations = 0;
    let mut outer_iterations = 0;
    let mut inner_tol = 0.1_f64.max(settings.tol);
    let mut previous_violation = f64::INFINITY;
    let mut optimality = f64::INFINITY;
    let mut current_violation = f64::INFINITY;
    let mut status = SolveStatus::MaxIterations;

    while outer_iterations < settings.max_outer_iter {
        outer_iterations += 1;
        let (exit, residual) = minimize_inner(
            &merit,
            &bounds,
            &mut y,
            inner_tol,
            settings.max_iter,
            &mut iterations,
        );
        optimality = residual;
        if matches!(exit, InnerExit::NonFinite) {
            status = SolveStatus::NumericalFailure;
            break;
        }

        let x = y.component_mul(&scale);
        let c = problem.equalities(&x);
        let g = problem.inequalities(&x);
        current_violation = constraint_violation(&c, &g);
        if !current_violation.is_finite() {
            status = SolveStatus::NumericalFailure;
            break;
        }

        let mu = merit.penalty;
        merit.lambda_eq += &c * mu;
        for (lambda, gi) in merit.lambda_ineq.iter_mut().zip(g.iter()) {
            *lambda = (*lambda - mu * gi).max(0.0);
        }

        debug!(
            outer = outer_iterations,
            iterations,
            penalty = mu,
            violation = current_violation,
            optimality,
            "augmented lagrangian step"
        );

        if current_violation <= settings.tol && optimality <= settings.tol {
            status = SolveStatus::Converged;
            break;
        }
        if iterations >= settings.max_iter {
            break;
        }
        if matches!(exit, InnerExit::Stalled) && current_violation <= settings.tol {
            break;
        }

        if current_violation > VIOLATION_REDUCTION * previous_violation {
            merit.penalty = (merit.penalty * settings.penalty_growth).min(settings.max_penalty);
        }
        previous_violation = previous_violation.min(current_violation);
        inner_tol = (inner_tol * 0.1).max(settings.tol);
    }

    if status == SolveStatus::MaxIterations
        && current_violation <= settings.acceptable_tol
        && optimality <= settings.acceptable_tol
    {
        status = SolveStatus::Acceptable;
    }

    let x = y.component_mul(&scale);
    SolveReport {
        objective: problem.objective(&x),
        x,
        constraint_violation: current_violation,
        optimality,
        iterations,
        outer_iterations,
        status,
    }
}

/// Projected Newton with an Armijo search along the projection arc, falling back to a
/// spectral projected-gradient step.
fn minimize_inner<P: Problem + ?Sized>(
    merit: &Merit<'_, P>,
    bounds: &Bounds,
    y: &mut DVector<f64>,
    tolerance: f64,
    max_iter: usize,
    iterations: &mut usize,
) -> (InnerExit, f64) {
    let mut value = merit.value(y);
    let mut grad = merit.gradient(y);
    if !value.is_finite() || !is_finite(&grad) {
        return (InnerExit::NonFinite, f64::INFINITY);
    }
    let mut residual = bounds.stationarity(y, &grad);
    let mut spectral = 1.0 / residual.max(1.0);

    loop {
        if residual <= tolerance {
            return (InnerExit::Stationary, residual);
        }
        if *iterations >= max_iter {
            return (InnerExit::Budget, residual);
        }
        *iterations += 1;

        let current: &DVector<f64> = y;
        let newton = newton_direction(merit, bounds, current, &grad, residual)
            .and_then(|direction| arc_search(merit, bounds, current, value, &grad, &direction));
        let accepted = match newton {
            Some(step) => Some(step),
            None => {
                let direction = bounds.project(&(current - &grad * spectral)) - current;
                arc_search(merit, bounds, current, value, &grad, &direction)
            }
        };
        let Some((candidate, candidate_value)) = accepted else {
            return (InnerExit::Stalled, residual);
        };

        let candidate_grad = merit.gradient(&candidate);
        if !is_finite(&candidate_grad) {
            return (InnerExit::NonFinite, residual);
        }

        let s = &candidate - &*y;
        let delta = &candidate_grad - &grad;
        let curvature = s.dot(&delta);
        spectral = if curvature > 0.0 {
            (s.norm_squared() / curvature).clamp(MIN_SPECTRAL_STEP, MAX_SPECTRAL_STEP)
        } else {
            MAX_SPECTRAL_STEP
        };

        *y = candidate;
        value = candidate_value;
        grad = candidate_grad;
        residual = bounds.stationarity(y, &grad);
    }
}

/// Newton direction on the free variables; variables held at a bound by the gradient move
/// along the negative gradient and are clipped by the projection.
fn newton_direction<P: Problem + ?Sized>(
    merit: &Merit<'_, P>,
    bounds: &Bounds,
    y: &DVector<f64>,
    grad: &DVector<f64>,
    residual: f64,
) -> Option<DVector<f64>> {
    let margin = ACTIVE_MARGIN.min(residual);
    let mut free = Vec::with_capacity(y.len());
    let mut direction = DVector::zeros(y.len());
    for i in 0..y.len() {
        let (lo, hi) = (bounds.lower[i], bounds.upper[i]);
        if lo == hi {
            continue;
        }
        let held_low = y[i] <= lo + margin && grad[i] > 0.0;
        let held_high = y[i] >= hi - margin && grad[i] < 0.0;
        if held_low || held_high {
            direction[i] = -grad[i];
        } else {
            free.push(i);
        }
    }
    if free.is_empty() {
        return Some(direction);
    }

    let hessian = merit.hessian(y);
    if !hessian.iter().all(|v| v.is_finite()) {
        return None;
    }
    let reduced = hessian.select_rows(&free).select_columns(&free);
    let rhs = -DVector::from_iterator(free.len(), free.iter().map(|&i| grad[i]));
    let diagonal_size = reduced.diagonal().iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));

    let mut shift = 0.0;
    for _ in 0..MAX_REGULARIZATION_TRIES {
        let shifted = &reduced + DMatrix::identity(free.len(), free.len()) * shift;
        if let Some(factor) = shifted.cholesky() {
            let step = factor.solve(&rhs);
            for (k, &i) in free.iter().enumerate() {
                direction[i] = step[k];
            }
            return Some(direction);
        }
        shift = if shift == 0.0 {
            1e-8 * diagonal_size
        } else {
            shift * 10.0
        };
    }
    None
}

/// Backtrack along `project(y + t d)` until the Armijo condition holds.
fn arc_search<P: Problem + ?Sized>(
    merit: &Merit<'_, P>,
    bounds: &Bounds,
    y: &DVector<f64>,
    value: f64,
    grad: &DVector<f64>,
    direction: &DVector<f64>,
) -> Option<(DVector<f64>, f64)> {
    let mut step = 1.0;
    while step >= MIN_LINE_STEP {
        let candidate = bounds.project(&(y + direction * step));
        let decrease = grad.dot(&(&candidate - y));
        if decrease < 0.0 {
            let candidate_value = merit.value(&candidate);
            if candidate_value.is_finite() && candidate_value <= value + ARMIJO_SLOPE * decrease {
                return Some((candidate, candidate_value));
            }
        }
        step *= 0.5;
    }
    None
}
