//! Fuel bookkeeping along a nominal trajectory.

use cda_dynamics::PointMassModel;
use cda_trajectory::Trajectory;
use serde::Serialize;

/// Per-node fuel flow and trapezoidal cumulative fuel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuelProfile {
    pub fuel_flow_kg_s: Vec<f64>,
    pub cumulative_fuel_kg: Vec<f64>,
}

impl FuelProfile {
    pub fn total_kg(&self) -> f64 {
        self.cumulative_fuel_kg.last().copied().unwrap_or(0.0)
    }
}

/// Integrate fuel with the same trapezoidal rule the optimizer minimizes.
///
/// Interval `k` uses control `k` at both ends, so the reported flow at node `k` is
/// evaluated with control `k` and the final node with the last interval's control.
pub fn fuel_profile(model: &PointMassModel, trajectory: &Trajectory) -> FuelProfile {
    let n = trajectory.len();
    let mut fuel_flow_kg_s = vec![0.0; n];
    let mut cumulative_fuel_kg = vec![0.0; n];

    for k in 0..n.saturating_sub(1) {
        let dt = trajectory.time_s[k + 1] - trajectory.time_s[k];
        let control = trajectory.control(k);
        let start = model.evaluate(&trajectory.state(k), &control).fuel_flow_kg_s;
        let end = model
            .evaluate(&trajectory.state(k + 1), &control)
            .fuel_flow_kg_s;
        fuel_flow_kg_s[k] = start;
        fuel_flow_kg_s[k + 1] = end;
        cumulative_fuel_kg[k + 1] = cumulative_fuel_kg[k] + 0.5 * dt * (start + end);
    }

    FuelProfile {
        fuel_flow_kg_s,
        cumulative_fuel_kg,
    }
}

/// Remaining distance to the final node at each node.
pub fn distance_to_go(distance_m: &[f64]) -> Vec<f64> {
    let total = distance_m.last().copied().unwrap_or(0.0);
    distance_m.iter().map(|d| total - d).collect()
}
