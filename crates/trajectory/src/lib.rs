//! Minimum-fuel continuous descent by direct transcription.
//!
//! [`solve`] builds the trapezoidal collocation problem for the configured scenario, runs
//! the NLP solver from a linear initial guess, and returns either the converged
//! trajectory or the deterministic linear fallback together with the solver's last
//! iterate.

mod transcription;

use cda_config::{ConfigError, DescentConfig};
use cda_core::grid::linspace;
use cda_dynamics::{AircraftState, Control, PointMassModel};
use cda_nlp::{FailureReport, Outcome, SolverSettings};
use serde::Serialize;
use tracing::{info, warn};

use self::transcription::CollocationProblem;

/// Time-aligned descent trajectory; every series has `N + 1` entries.
///
/// Controls act on intervals, so their last entry repeats the final interval's value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    pub time_s: Vec<f64>,
    pub airspeed_m_s: Vec<f64>,
    pub distance_m: Vec<f64>,
    pub altitude_m: Vec<f64>,
    pub mass_kg: Vec<f64>,
    pub thrust_newtons: Vec<f64>,
    pub flight_path_rad: Vec<f64>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.time_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_s.is_empty()
    }

    pub fn state(&self, k: usize) -> AircraftState {
        AircraftState {
            airspeed_m_s: self.airspeed_m_s[k],
            distance_m: self.distance_m[k],
            altitude_m: self.altitude_m[k],
            mass_kg: self.mass_kg[k],
        }
    }

    pub fn control(&self, k: usize) -> Control {
        Control {
            thrust_newtons: self.thrust_newtons[k],
            flight_path_rad: self.flight_path_rad[k],
        }
    }

    /// Fuel burned according to the integrated mass state.
    pub fn mass_fuel_burned_kg(&self) -> f64 {
        match (self.mass_kg.first(), self.mass_kg.last()) {
            (Some(first), Some(last)) => first - last,
            _ => 0.0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrajectoryError {
    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),
}

fn linear_states(config: &DescentConfig) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
    let s = &config.scenario;
    let m0 = config.aircraft.reference_mass_kg;
    let nodes = s.intervals + 1;
    (
        linspace(0.0, s.horizon_s, nodes),
        linspace(s.initial_airspeed_m_s, s.final_airspeed_guess_m_s, nodes),
        linspace(0.0, s.target_distance_m(), nodes),
        linspace(s.initial_altitude_m(), s.target_altitude_m(), nodes),
        linspace(m0, s.guess_final_mass_fraction * m0, nodes),
    )
}

/// Linear state interpolation with constant low thrust and a constant descent angle.
pub fn initial_guess(config: &DescentConfig) -> Trajectory {
    let s = &config.scenario;
    let (time_s, airspeed_m_s, distance_m, altitude_m, mass_kg) = linear_states(config);
    let nodes = time_s.len();
    Trajectory {
        time_s,
        airspeed_m_s,
        distance_m,
        altitude_m,
        mass_kg,
        thrust_newtons: vec![s.guess_thrust_fraction * config.aircraft.max_thrust_newtons; nodes],
        flight_path_rad: vec![-s.guess_flight_path_deg.to_radians(); nodes],
    }
}

/// Trajectory substituted when the solver does not converge.
///
/// States match the initial guess; controls are the degenerate constants
/// `T = guess_thrust_fraction * T_max` and `gamma = fallback_flight_path_rad`.
pub fn fallback_trajectory(config: &DescentConfig) -> Trajectory {
    let s = &config.scenario;
    let (time_s, airspeed_m_s, distance_m, altitude_m, mass_kg) = linear_states(config);
    let nodes = time_s.len();
    Trajectory {
        time_s,
        airspeed_m_s,
        distance_m,
        altitude_m,
        mass_kg,
        thrust_newtons: vec![s.guess_thrust_fraction * config.aircraft.max_thrust_newtons; nodes],
        flight_path_rad: vec![s.fallback_flight_path_rad; nodes],
    }
}

/// Trapezoidal defects `x[k+1] - x[k] - dt/2 (f_k + f_{k+1})` per interval, in state units.
pub fn collocation_residuals(model: &PointMassModel, trajectory: &Trajectory) -> Vec<[f64; 4]> {
    (0..trajectory.len().saturating_sub(1))
        .map(|k| {
            let dt = trajectory.time_s[k + 1] - trajectory.time_s[k];
            let u = trajectory.control(k);
            let x0 = trajectory.state(k);
            let x1 = trajectory.state(k + 1);
            let f0 = model.evaluate(&x0, &u).rate.to_array();
            let f1 = model.evaluate(&x1, &u).rate.to_array();
            let (a, b) = (x0.to_array(), x1.to_array());
            let mut residual = [0.0; 4];
            for i in 0..4 {
                residual[i] = b[i] - a[i] - 0.5 * dt * (f0[i] + f1[i]);
            }
            residual
        })
        .collect()
}

/// Solve the minimum-fuel descent for `config`.
pub fn solve(config: &DescentConfig) -> Result<Outcome<Trajectory>, TrajectoryError> {
    config.validate()?;
    let model = PointMassModel::new(&config.aircraft);
    let problem = CollocationProblem::new(&model, config);
    let guess = initial_guess(config);
    let settings = SolverSettings::from(&config.trajectory_solver);

    let report = cda_nlp::solve(&problem, &problem.pack(&guess), &settings);
    let last_iterate = problem.unpack(&report.x);

    if report.status.is_success() {
        info!(
            status = ?report.status,
            iterations = report.iterations,
            fuel_kg = report.objective,
            "descent trajectory converged"
        );
        return Ok(Outcome::Converged(last_iterate));
    }

    let failure = FailureReport::from(&report);
    warn!(
        status = ?failure.status,
        iterations = failure.iterations,
        violation = failure.constraint_violation,
        airspeed = ?last_iterate.airspeed_m_s,
        distance = ?last_iterate.distance_m,
        altitude = ?last_iterate.altitude_m,
        mass = ?last_iterate.mass_kg,
        thrust = ?last_iterate.thrust_newtons,
        flight_path = ?last_iterate.flight_path_rad,
        "descent optimization failed, falling back to linear profile"
    );
    Ok(Outcome::Degraded {
        fallback: fallback_trajectory(config),
        last_iterate,
        report: failure,
    })
}
