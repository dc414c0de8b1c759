//! Trapezoidal direct transcription of the descent into an NLP.
//!
//! Decision vector layout: the four states of every node `0..=N` first, then the two
//! controls of every interval `0..N`. Interval `k` evaluates the dynamics at
//! `(x_k, u_k)` and `(x_{k+1}, u_k)`, for both the fuel quadrature and the defects.

use cda_config::DescentConfig;
use cda_dynamics::{AircraftState, Control, PointMassModel, Sensitivities};
use cda_nlp::{DMatrix, DVector, Problem};

use crate::Trajectory;

/// Characteristic magnitudes of `V, d, h, m`; defects are normalized by the same values.
const STATE_SCALE: [f64; 4] = [100.0, 1e5, 1e4, 1e4];
/// Characteristic magnitudes of `T, gamma`.
const CONTROL_SCALE: [f64; 2] = [1e4, 0.05];
const FUEL_SCALE_KG: f64 = 1e3;
/// Lower altitude bound standing in for `h > 0`.
const ALTITUDE_FLOOR_M: f64 = 1e-3;

/// Index arithmetic for the decision vector.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    intervals: usize,
}

impl Layout {
    pub(crate) fn new(intervals: usize) -> Self {
        Self { intervals }
    }

    pub(crate) fn nodes(&self) -> usize {
        self.intervals + 1
    }

    pub(crate) fn len(&self) -> usize {
        4 * self.nodes() + 2 * self.intervals
    }

    pub(crate) fn state(&self, node: usize, component: usize) -> usize {
        4 * node + component
    }

    pub(crate) fn control(&self, interval: usize, component: usize) -> usize {
        4 * self.nodes() + 2 * interval + component
    }
}

/// Explicit problem description handed to the stateless solver.
pub(crate) struct CollocationProblem<'a> {
    model: &'a PointMassModel,
    config: &'a DescentConfig,
    layout: Layout,
    step_s: f64,
}

struct IntervalEval {
    start: cda_dynamics::Evaluation,
    end: cda_dynamics::Evaluation,
}

impl<'a> CollocationProblem<'a> {
    pub(crate) fn new(model: &'a PointMassModel, config: &'a DescentConfig) -> Self {
        Self {
            model,
            config,
            layout: Layout::new(config.scenario.intervals),
            step_s: config.scenario.step_s(),
        }
    }

    fn node(&self, x: &DVector<f64>, k: usize) -> AircraftState {
        let l = &self.layout;
        AircraftState::from_array([
            x[l.state(k, 0)],
            x[l.state(k, 1)],
            x[l.state(k, 2)],
            x[l.state(k, 3)],
        ])
    }

    fn control(&self, x: &DVector<f64>, k: usize) -> Control {
        let l = &self.layout;
        Control::from_array([x[l.control(k, 0)], x[l.control(k, 1)]])
    }

    fn interval(&self, x: &DVector<f64>, k: usize) -> IntervalEval {
        let u = self.control(x, k);
        IntervalEval {
            start: self.model.evaluate(&self.node(x, k), &u),
            end: self.model.evaluate(&self.node(x, k + 1), &u),
        }
    }

    /// Hessian contribution of one dynamics evaluation at `(state, control)` inside interval
    /// `k`: `sigma * half * F - half * sum_i w_i f_i / S_i` over the six local inputs.
    fn evaluation_hessian(
        &self,
        state: &AircraftState,
        control: &Control,
        objective_weight: f64,
        defect_weights: &[f64],
    ) -> [[f64; 6]; 6] {
        let half = 0.5 * self.step_s;
        let local_gradient = |z: &[f64; 6]| -> [f64; 6] {
            let sens = self.model.sensitivities(
                &AircraftState::from_array([z[0], z[1], z[2], z[3]]),
                &Control::from_array([z[4], z[5]]),
            );
            let mut out = [0.0; 6];
            for (j, value) in out.iter_mut().enumerate() {
                let mut total = objective_weight * half * sens[4][j];
                for i in 0..4 {
                    total -= defect_weights[i] * half * sens[i][j] / STATE_SCALE[i];
                }
                *value = total;
            }
            out
        };

        let x = state.to_array();
        let u = control.to_array();
        let base = [x[0], x[1], x[2], x[3], u[0], u[1]];
        let base_gradient = local_gradient(&base);
        let mut hessian = [[0.0; 6]; 6];
        for j in 0..6 {
            let step = self.model.inward_step(j, base[j]);
            let mut shifted = base;
            shifted[j] += step;
            let shifted_gradient = local_gradient(&shifted);
            for i in 0..6 {
                hessian[i][j] = (shifted_gradient[i] - base_gradient[i]) / step;
            }
        }
        for i in 0..6 {
            for j in 0..i {
                let mean = 0.5 * (hessian[i][j] + hessian[j][i]);
                hessian[i][j] = mean;
                hessian[j][i] = mean;
            }
        }
        hessian
    }

    fn interval_sensitivities(&self, x: &DVector<f64>, k: usize) -> (Sensitivities, Sensitivities) {
        let u = self.control(x, k);
        (
            self.model.sensitivities(&self.node(x, k), &u),
            self.model.sensitivities(&self.node(x, k + 1), &u),
        )
    }

    /// Flatten a trajectory (controls taken from its first `N` entries) into a decision vector.
    pub(crate) fn pack(&self, trajectory: &Trajectory) -> DVector<f64> {
        let l = &self.layout;
        let mut x = DVector::zeros(l.len());
        for k in 0..l.nodes() {
            let state = trajectory.state(k).to_array();
            for (i, value) in state.iter().enumerate() {
                x[l.state(k, i)] = *value;
            }
        }
        for k in 0..self.layout.intervals {
            let control = trajectory.control(k).to_array();
            for (j, value) in control.iter().enumerate() {
                x[l.control(k, j)] = *value;
            }
        }
        x
    }

    /// Rebuild a trajectory from a decision vector, padding controls with their last value.
    pub(crate) fn unpack(&self, x: &DVector<f64>) -> Trajectory {
        let l = &self.layout;
        let n = self.layout.intervals;
        let column = |component: usize| -> Vec<f64> {
            (0..l.nodes()).map(|k| x[l.state(k, component)]).collect()
        };
        let padded = |component: usize| -> Vec<f64> {
            (0..l.nodes())
                .map(|k| x[l.control(k.min(n - 1), component)])
                .collect()
        };
        Trajectory {
            time_s: cda_core::grid::linspace(0.0, self.config.scenario.horizon_s, l.nodes()),
            airspeed_m_s: column(0),
            distance_m: column(1),
            altitude_m: column(2),
            mass_kg: column(3),
            thrust_newtons: padded(0),
            flight_path_rad: padded(1),
        }
    }
}

impl Problem for CollocationProblem<'_> {
    fn dimension(&self) -> usize {
        self.layout.len()
    }

    fn lower_bounds(&self) -> DVector<f64> {
        let a = &self.config.aircraft;
        let s = &self.config.scenario;
        let l = &self.layout;
        let mut lower = DVector::from_element(l.len(), f64::NEG_INFINITY);
        for k in 0..l.nodes() {
            lower[l.state(k, 0)] = a.min_airspeed_m_s;
            lower[l.state(k, 2)] = ALTITUDE_FLOOR_M;
            lower[l.state(k, 3)] = a.min_mass_kg();
        }
        for k in 0..l.intervals {
            lower[l.control(k, 0)] = 0.0;
            lower[l.control(k, 1)] = -a.max_flight_path_rad();
        }
        lower[l.state(0, 0)] = s.initial_airspeed_m_s;
        lower[l.state(0, 1)] = 0.0;
        lower[l.state(0, 2)] = s.initial_altitude_m();
        lower[l.state(0, 3)] = a.reference_mass_kg;
        lower
    }

    fn upper_bounds(&self) -> DVector<f64> {
        let a = &self.config.aircraft;
        let s = &self.config.scenario;
        let l = &self.layout;
        let mut upper = DVector::from_element(l.len(), f64::INFINITY);
        for k in 0..l.nodes() {
            upper[l.state(k, 0)] = a.max_airspeed_m_s;
        }
        for k in 0..l.intervals {
            upper[l.control(k, 0)] = a.thrust_ceiling_newtons();
            upper[l.control(k, 1)] = a.max_flight_path_rad();
        }
        upper[l.state(0, 0)] = s.initial_airspeed_m_s;
        upper[l.state(0, 1)] = 0.0;
        upper[l.state(0, 2)] = s.initial_altitude_m();
        upper[l.state(0, 3)] = a.reference_mass_kg;
        upper
    }

    fn objective(&self, x: &DVector<f64>) -> f64 {
        (0..self.layout.intervals)
            .map(|k| {
                let eval = self.interval(x, k);
                0.5 * self.step_s * (eval.start.fuel_flow_kg_s + eval.end.fuel_flow_kg_s)
            })
            .sum()
    }

    fn gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        let l = &self.layout;
        let half = 0.5 * self.step_s;
        let mut grad = DVector::zeros(l.len());
        for k in 0..l.intervals {
            let (start, end) = self.interval_sensitivities(x, k);
            for i in 0..4 {
                grad[l.state(k, i)] += half * start[4][i];
                grad[l.state(k + 1, i)] += half * end[4][i];
            }
            for j in 0..2 {
                grad[l.control(k, j)] += half * (start[4][4 + j] + end[4][4 + j]);
            }
        }
        grad
    }

    fn equalities(&self, x: &DVector<f64>) -> DVector<f64> {
        let l = &self.layout;
        let half = 0.5 * self.step_s;
        let mut defects = DVector::zeros(4 * l.intervals);
        for k in 0..l.intervals {
            let eval = self.interval(x, k);
            let f0 = eval.start.rate.to_array();
            let f1 = eval.end.rate.to_array();
            for i in 0..4 {
                let jump = x[l.state(k + 1, i)] - x[l.state(k, i)];
                defects[4 * k + i] = (jump - half * (f0[i] + f1[i])) / STATE_SCALE[i];
            }
        }
        defects
    }

    fn equality_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let l = &self.layout;
        let half = 0.5 * self.step_s;
        let mut jac = DMatrix::zeros(4 * l.intervals, l.len());
        for k in 0..l.intervals {
            let (start, end) = self.interval_sensitivities(x, k);
            for i in 0..4 {
                let row = 4 * k + i;
                let inv = 1.0 / STATE_SCALE[i];
                for j in 0..4 {
                    let identity = if i == j { 1.0 } else { 0.0 };
                    jac[(row, l.state(k, j))] = (-identity - half * start[i][j]) * inv;
                    jac[(row, l.state(k + 1, j))] = (identity - half * end[i][j]) * inv;
                }
                for j in 0..2 {
                    jac[(row, l.control(k, j))] =
                        -half * (start[i][4 + j] + end[i][4 + j]) * inv;
                }
            }
        }
        jac
    }

    /// Only the dynamics are nonlinear: each interval contributes two 6x6 blocks, one per
    /// end node paired with the interval's control. The terminal bands are linear.
    fn lagrangian_hessian(
        &self,
        x: &DVector<f64>,
        objective_weight: f64,
        equality_weights: &DVector<f64>,
        _inequality_weights: &DVector<f64>,
    ) -> DMatrix<f64> {
        let l = &self.layout;
        let mut hessian = DMatrix::zeros(l.len(), l.len());
        for k in 0..l.intervals {
            let control = self.control(x, k);
            let weights = &equality_weights.as_slice()[4 * k..4 * k + 4];
            for node in [k, k + 1] {
                let block =
                    self.evaluation_hessian(&self.node(x, node), &control, objective_weight, weights);
                let index = [
                    l.state(node, 0),
                    l.state(node, 1),
                    l.state(node, 2),
                    l.state(node, 3),
                    l.control(k, 0),
                    l.control(k, 1),
                ];
                for (a, &row) in index.iter().enumerate() {
                    for (b, &column) in index.iter().enumerate() {
                        hessian[(row, column)] += block[a][b];
                    }
                }
            }
        }
        hessian
    }

    fn inequalities(&self, x: &DVector<f64>) -> DVector<f64> {
        let s = &self.config.scenario;
        let l = &self.layout;
        let n = l.intervals;
        let h = x[l.state(n, 2)];
        let d = x[l.state(n, 1)];
        let (h_target, h_tol) = (s.target_altitude_m(), s.altitude_tolerance_m());
        let (d_target, d_tol) = (s.target_distance_m(), s.distance_tolerance_m());
        DVector::from_vec(vec![
            (h - (h_target - h_tol)) / STATE_SCALE[2],
            ((h_target + h_tol) - h) / STATE_SCALE[2],
            (d - (d_target - d_tol)) / STATE_SCALE[1],
            ((d_target + d_tol) - d) / STATE_SCALE[1],
        ])
    }

    fn inequality_jacobian(&self, _x: &DVector<f64>) -> DMatrix<f64> {
        let l = &self.layout;
        let n = l.intervals;
        let mut jac = DMatrix::zeros(4, l.len());
        jac[(0, l.state(n, 2))] = 1.0 / STATE_SCALE[2];
        jac[(1, l.state(n, 2))] = -1.0 / STATE_SCALE[2];
        jac[(2, l.state(n, 1))] = 1.0 / STATE_SCALE[1];
        jac[(3, l.state(n, 1))] = -1.0 / STATE_SCALE[1];
        jac
    }

    fn variable_scale(&self) -> DVector<f64> {
        let l = &self.layout;
        let mut scale = DVector::zeros(l.len());
        for k in 0..l.nodes() {
            for (i, s) in STATE_SCALE.iter().enumerate() {
                scale[l.state(k, i)] = *s;
            }
        }
        for k in 0..l.intervals {
            for (j, s) in CONTROL_SCALE.iter().enumerate() {
                scale[l.control(k, j)] = *s;
            }
        }
        scale
    }

    fn objective_scale(&self) -> f64 {
        1.0 / FUEL_SCALE_KG
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cda_nlp::{finite_difference_gradient, finite_difference_jacobian, symmetrize};

    fn small_config() -> DescentConfig {
        let mut config = DescentConfig::default();
        config.scenario.intervals = 4;
        config
    }

    #[test]
    fn layout_places_controls_after_states() {
        let layout = Layout::new(20);
        assert_eq!(layout.len(), 4 * 21 + 2 * 20);
        assert_eq!(layout.state(20, 3), 83);
        assert_eq!(layout.control(0, 0), 84);
        assert_eq!(layout.control(19, 1), layout.len() - 1);
    }

    #[test]
    fn pack_and_unpack_preserve_the_guess() {
        let config = small_config();
        let model = PointMassModel::new(&config.aircraft);
        let problem = CollocationProblem::new(&model, &config);
        let guess = crate::initial_guess(&config);
        let restored = problem.unpack(&problem.pack(&guess));
        assert_eq!(restored, guess);
    }

    #[test]
    fn closed_form_derivatives_match_finite_differences() {
        let config = small_config();
        let model = PointMassModel::new(&config.aircraft);
        let problem = CollocationProblem::new(&model, &config);
        let x = problem.pack(&crate::initial_guess(&config));

        let grad = problem.gradient(&x);
        let fd_grad = finite_difference_gradient(&x, |z| problem.objective(z));
        for j in 0..x.len() {
            let tol = 1e-4 * fd_grad[j].abs().max(1.0);
            assert!((grad[j] - fd_grad[j]).abs() < tol, "gradient {j}");
        }

        let jac = problem.equality_jacobian(&x);
        let fd_jac = finite_difference_jacobian(&x, |z| problem.equalities(z));
        for r in 0..jac.nrows() {
            for c in 0..jac.ncols() {
                let tol = 1e-4 * fd_jac[(r, c)].abs().max(1e-3);
                assert!(
                    (jac[(r, c)] - fd_jac[(r, c)]).abs() < tol,
                    "jacobian ({r}, {c}): {} vs {}",
                    jac[(r, c)],
                    fd_jac[(r, c)]
                );
            }
        }
    }

    #[test]
    fn interval_hessian_matches_differenced_lagrangian_gradient() {
        let config = small_config();
        let model = PointMassModel::new(&config.aircraft);
        let problem = CollocationProblem::new(&model, &config);
        let x = problem.pack(&crate::initial_guess(&config));
        let weights = DVector::from_fn(4 * problem.layout.intervals, |i, _| {
            0.3 * ((i % 5) as f64 - 2.0)
        });
        let none = DVector::zeros(0);

        let hessian = problem.lagrangian_hessian(&x, 0.7, &weights, &none);
        let reference = symmetrize(finite_difference_jacobian(&x, |z| {
            problem.gradient(z) * 0.7 + problem.equality_jacobian(z).tr_mul(&weights)
        }));

        assert!(reference.norm() > 0.0);
        let gap = (&hessian - &reference).norm();
        assert!(gap <= 1e-3 * reference.norm(), "gap {gap} vs {}", reference.norm());
        assert_eq!(hessian, hessian.transpose());
    }

    #[test]
    fn fallback_guess_meets_terminal_bands() {
        let config = DescentConfig::default();
        let model = PointMassModel::new(&config.aircraft);
        let problem = CollocationProblem::new(&model, &config);
        let x = problem.pack(&crate::initial_guess(&config));
        assert!(problem.inequalities(&x).iter().all(|g| *g >= -1e-12));
    }
}
