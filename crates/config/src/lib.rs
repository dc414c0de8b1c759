//! Configuration models and loaders for the STA descent planner.
//!
//! Every section carries the A320-class defaults used by the reference scenario, so a
//! configuration file only needs to list the values it overrides.

use std::path::Path;

use cda_core::units::{ft_to_m, nm_to_m};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Complete, immutable description of one planning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescentConfig {
    pub aircraft: AircraftConfig,
    pub scenario: ScenarioConfig,
    pub spacing: SpacingConfig,
    pub trajectory_solver: SolverConfig,
    pub sta_solver: SolverConfig,
}

impl Default for DescentConfig {
    fn default() -> Self {
        Self {
            aircraft: AircraftConfig::default(),
            scenario: ScenarioConfig::default(),
            spacing: SpacingConfig::default(),
            trajectory_solver: SolverConfig::default(),
            sta_solver: SolverConfig::placement(),
        }
    }
}

/// Airframe, engine, and atmosphere parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AircraftConfig {
    pub gravity_m_s2: f64,
    pub sea_level_density_kg_m3: f64,
    pub wing_area_m2: f64,
    pub reference_mass_kg: f64,
    pub zero_lift_drag: f64,
    pub induced_drag_factor: f64,
    pub max_thrust_newtons: f64,
    pub fuel_flow: FuelFlowConfig,
    pub min_airspeed_m_s: f64,
    pub max_airspeed_m_s: f64,
    pub max_flight_path_deg: f64,
    /// Lowest admissible mass as a fraction of `reference_mass_kg`.
    pub min_mass_fraction: f64,
    /// Thrust ceiling used by the trajectory optimizer, as a fraction of `max_thrust_newtons`.
    pub max_thrust_fraction: f64,
}

impl Default for AircraftConfig {
    fn default() -> Self {
        Self {
            gravity_m_s2: 9.81,
            sea_level_density_kg_m3: 1.225,
            wing_area_m2: 122.6,
            reference_mass_kg: 68_000.0,
            zero_lift_drag: 0.031,
            induced_drag_factor: 0.045,
            max_thrust_newtons: 2.0 * 75_000.0,
            fuel_flow: FuelFlowConfig::default(),
            min_airspeed_m_s: 150.0,
            max_airspeed_m_s: 250.0,
            max_flight_path_deg: 3.0,
            min_mass_fraction: 0.8,
            max_thrust_fraction: 0.2,
        }
    }
}

impl AircraftConfig {
    /// Maximum flight-path angle magnitude in radians.
    pub fn max_flight_path_rad(&self) -> f64 {
        self.max_flight_path_deg.to_radians()
    }

    /// Lowest admissible aircraft mass in kilograms.
    pub fn min_mass_kg(&self) -> f64 {
        self.min_mass_fraction * self.reference_mass_kg
    }

    /// Upper thrust bound applied during trajectory optimization.
    pub fn thrust_ceiling_newtons(&self) -> f64 {
        self.max_thrust_fraction * self.max_thrust_newtons
    }
}

/// Coefficients of the cubic fuel-flow polynomial in normalized thrust.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuelFlowConfig {
    pub linear: f64,
    pub quadratic: f64,
    pub cubic: f64,
    /// Coefficient of the `thrust * altitude` chemistry term.
    pub altitude: f64,
}

impl Default for FuelFlowConfig {
    fn default() -> Self {
        Self {
            linear: 0.01,
            quadratic: 0.01,
            cubic: 0.01,
            altitude: 1e-8,
        }
    }
}

/// Boundary conditions, horizon, and initial-guess shape of the descent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub initial_airspeed_m_s: f64,
    /// End point of the linear airspeed guess; not a constraint.
    pub final_airspeed_guess_m_s: f64,
    pub initial_altitude_ft: f64,
    pub target_altitude_ft: f64,
    pub altitude_tolerance_ft: f64,
    pub target_distance_nm: f64,
    pub distance_tolerance_nm: f64,
    pub horizon_s: f64,
    pub intervals: usize,
    pub guess_thrust_fraction: f64,
    pub guess_flight_path_deg: f64,
    pub guess_final_mass_fraction: f64,
    pub fallback_flight_path_rad: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            initial_airspeed_m_s: 200.0,
            final_airspeed_guess_m_s: 180.0,
            initial_altitude_ft: 37_000.0,
            target_altitude_ft: 5_000.0,
            altitude_tolerance_ft: 200.0,
            target_distance_nm: 200.0,
            distance_tolerance_nm: 2.0,
            horizon_s: 3_600.0,
            intervals: 20,
            guess_thrust_fraction: 0.05,
            guess_flight_path_deg: 3.0,
            guess_final_mass_fraction: 0.95,
            fallback_flight_path_rad: -0.02,
        }
    }
}

impl ScenarioConfig {
    pub fn initial_altitude_m(&self) -> f64 {
        ft_to_m(self.initial_altitude_ft)
    }

    pub fn target_altitude_m(&self) -> f64 {
        ft_to_m(self.target_altitude_ft)
    }

    pub fn altitude_tolerance_m(&self) -> f64 {
        ft_to_m(self.altitude_tolerance_ft)
    }

    pub fn target_distance_m(&self) -> f64 {
        nm_to_m(self.target_distance_nm)
    }

    pub fn distance_tolerance_m(&self) -> f64 {
        nm_to_m(self.distance_tolerance_nm)
    }

    /// Width of one collocation interval in seconds.
    pub fn step_s(&self) -> f64 {
        self.horizon_s / self.intervals.max(1) as f64
    }
}

/// Parameters of the uncertainty model, the link metrics, and STA placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpacingConfig {
    pub required_separation_nm: f64,
    /// Deterministic tailwind offset added to airspeed and to uncertainty drift.
    pub wind_offset_m_s: f64,
    pub initial_uncertainty_nm: f64,
    /// Elapsed time after which the correction denominator is frozen.
    pub correction_threshold_s: f64,
    /// Cap on the speed correction as a fraction of nominal airspeed.
    pub max_correction_fraction: f64,
    pub min_link_duration_s: f64,
    pub throughput_weight: f64,
    pub infeasible_penalty: f64,
    pub link_counts: Vec<usize>,
}

impl Default for SpacingConfig {
    fn default() -> Self {
        Self {
            required_separation_nm: 3.0,
            wind_offset_m_s: 5.0,
            initial_uncertainty_nm: 1.3,
            correction_threshold_s: 1_000.0,
            max_correction_fraction: 0.2,
            min_link_duration_s: 50.0,
            throughput_weight: 10.0,
            infeasible_penalty: 1e6,
            link_counts: vec![1, 2, 3, 4, 5],
        }
    }
}

impl SpacingConfig {
    pub fn required_separation_m(&self) -> f64 {
        nm_to_m(self.required_separation_nm)
    }

    pub fn initial_uncertainty_m(&self) -> f64 {
        nm_to_m(self.initial_uncertainty_nm)
    }
}

/// Iteration caps and tolerances for one nonlinear solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Cap on Newton iterations across the whole solve, or on poll rounds for STA
    /// placement.
    pub max_iter: usize,
    /// Cap on multiplier updates.
    pub max_outer_iter: usize,
    pub tol: f64,
    pub acceptable_tol: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iter: 1_000,
            max_outer_iter: 40,
            tol: 1e-6,
            acceptable_tol: 1e-4,
        }
    }
}

impl SolverConfig {
    /// Budget for STA placement, whose problems have a handful of variables.
    pub fn placement() -> Self {
        Self {
            max_iter: 200,
            max_outer_iter: 20,
            ..Self::default()
        }
    }
}

impl DescentConfig {
    /// Reject parameter sets the models cannot evaluate meaningfully.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.aircraft;
        let s = &self.scenario;
        let sp = &self.spacing;
        ensure(a.reference_mass_kg > 0.0, "aircraft.reference_mass_kg must be positive")?;
        ensure(a.wing_area_m2 > 0.0, "aircraft.wing_area_m2 must be positive")?;
        ensure(
            a.sea_level_density_kg_m3 > 0.0,
            "aircraft.sea_level_density_kg_m3 must be positive",
        )?;
        ensure(a.max_thrust_newtons > 0.0, "aircraft.max_thrust_newtons must be positive")?;
        ensure(
            a.min_airspeed_m_s > 0.0 && a.min_airspeed_m_s < a.max_airspeed_m_s,
            "aircraft airspeed bounds must satisfy 0 < min < max",
        )?;
        ensure(
            a.max_flight_path_deg > 0.0 && a.max_flight_path_deg < 90.0,
            "aircraft.max_flight_path_deg must lie in (0, 90)",
        )?;
        ensure(
            (0.0..=1.0).contains(&a.min_mass_fraction),
            "aircraft.min_mass_fraction must lie in [0, 1]",
        )?;
        ensure(
            a.max_thrust_fraction > 0.0,
            "aircraft.max_thrust_fraction must be positive",
        )?;
        ensure(s.horizon_s > 0.0, "scenario.horizon_s must be positive")?;
        ensure(s.intervals > 0, "scenario.intervals must be at least 1")?;
        ensure(
            s.initial_altitude_ft > 0.0 && s.target_altitude_ft > 0.0,
            "scenario altitudes must be positive",
        )?;
        ensure(
            s.altitude_tolerance_ft >= 0.0 && s.distance_tolerance_nm >= 0.0,
            "scenario tolerances must be non-negative",
        )?;
        ensure(
            sp.min_link_duration_s > 0.0,
            "spacing.min_link_duration_s must be positive",
        )?;
        ensure(!sp.link_counts.is_empty(), "spacing.link_counts must not be empty")?;
        ensure(
            sp.link_counts.iter().all(|&n| n > 0),
            "spacing.link_counts entries must be at least 1",
        )?;
        for (name, solver) in [
            ("trajectory_solver", &self.trajectory_solver),
            ("sta_solver", &self.sta_solver),
        ] {
            if solver.max_iter == 0 || solver.max_outer_iter == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} iteration caps must be at least 1"
                )));
            }
            if !(solver.tol > 0.0 && solver.acceptable_tol >= solver.tol) {
                return Err(ConfigError::Invalid(format!(
                    "{name} tolerances must satisfy 0 < tol <= acceptable_tol"
                )));
            }
        }
        Ok(())
    }
}

fn ensure(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Invalid(message.to_string()))
    }
}

/// Errors that can occur while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Load and validate a run configuration from a TOML or YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<DescentConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;
    let config: DescentConfig = if path.extension().map(|ext| ext == "toml").unwrap_or(false) {
        toml::from_str(&contents)?
    } else {
        serde_yaml::from_str(&contents)?
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = DescentConfig::default();
        config.validate().expect("default config");
        assert_eq!(config.sta_solver.max_iter, 200);
        assert_eq!(config.trajectory_solver.max_iter, 1_000);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.toml");
        let mut file = std::fs::File::create(&path).expect("create");
        writeln!(file, "[scenario]\nintervals = 12\n\n[spacing]\nlink_counts = [1, 3]").unwrap();

        let config = load_config(&path).expect("load toml");
        assert_eq!(config.scenario.intervals, 12);
        assert_eq!(config.spacing.link_counts, vec![1, 3]);
        assert_eq!(config.aircraft, AircraftConfig::default());
        assert!((config.scenario.horizon_s - 3_600.0).abs() < 1e-12);
    }

    #[test]
    fn yaml_is_selected_for_other_extensions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, "aircraft:\n  reference_mass_kg: 70000.0\n").unwrap();

        let config = load_config(&path).expect("load yaml");
        assert!((config.aircraft.reference_mass_kg - 70_000.0).abs() < 1e-9);
        assert!((config.aircraft.min_mass_kg() - 56_000.0).abs() < 1e-9);
    }

    #[test]
    fn validation_rejects_inverted_speed_bounds() {
        let mut config = DescentConfig::default();
        config.aircraft.min_airspeed_m_s = 260.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validation_rejects_zero_link_count() {
        let mut config = DescentConfig::default();
        config.spacing.link_counts = vec![1, 0];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unit_helpers_convert_scenario_targets() {
        let s = ScenarioConfig::default();
        assert!((s.initial_altitude_m() - 11_277.6).abs() < 1e-9);
        assert!((s.target_distance_m() - 370_400.0).abs() < 1e-9);
        assert!((s.step_s() - 180.0).abs() < 1e-12);
    }
}
