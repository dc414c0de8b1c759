use sta_descent::config::DescentConfig;
use sta_descent::dynamics::PointMassModel;
use sta_descent::nlp::Outcome;
use sta_descent::trajectory::{
    Trajectory, collocation_residuals, fallback_trajectory, initial_guess, solve,
};
use sta_descent::units::{ft_to_m, nm_to_m};

/// Defect tolerance per state in state units: acceptable tolerance times the state scale.
const RESIDUAL_TOL: [f64; 4] = [1e-2, 10.0, 1.0, 1.0];

fn short_feasible_config() -> DescentConfig {
    let mut config = DescentConfig::default();
    config.scenario.horizon_s = 1_200.0;
    config.scenario.intervals = 8;
    config.scenario.target_distance_nm = 120.0;
    config.scenario.target_altitude_ft = 10_000.0;
    config
}

fn assert_operational_envelope(config: &DescentConfig, trajectory: &Trajectory) {
    let a = &config.aircraft;
    let s = &config.scenario;
    let n = s.intervals;
    assert_eq!(trajectory.len(), n + 1);
    assert!((trajectory.altitude_m[0] - s.initial_altitude_m()).abs() < 1e-6);
    assert!((trajectory.airspeed_m_s[0] - s.initial_airspeed_m_s).abs() < 1e-6);
    assert!(trajectory.distance_m[0].abs() < 1e-6);
    assert!((trajectory.mass_kg[0] - a.reference_mass_kg).abs() < 1e-6);

    assert!((trajectory.altitude_m[n] - s.target_altitude_m()).abs() <= s.altitude_tolerance_m() + 1.0);
    assert!((trajectory.distance_m[n] - s.target_distance_m()).abs() <= s.distance_tolerance_m() + 10.0);

    for k in 0..=n {
        assert!(trajectory.airspeed_m_s[k] >= a.min_airspeed_m_s - 1e-6);
        assert!(trajectory.airspeed_m_s[k] <= a.max_airspeed_m_s + 1e-6);
        assert!(trajectory.mass_kg[k] >= a.min_mass_kg() - 1e-6);
        assert!(trajectory.altitude_m[k] > 0.0);
        assert!(trajectory.thrust_newtons[k] >= -1e-9);
        assert!(trajectory.thrust_newtons[k] <= a.thrust_ceiling_newtons() + 1e-6);
        assert!(trajectory.flight_path_rad[k].abs() <= a.max_flight_path_rad() + 1e-9);
    }
    for k in 0..n {
        assert!(trajectory.mass_kg[k + 1] <= trajectory.mass_kg[k] + RESIDUAL_TOL[3]);
    }
}

fn check_outcome(config: &DescentConfig, outcome: &Outcome<Trajectory>) {
    let model = PointMassModel::new(&config.aircraft);
    match outcome {
        Outcome::Converged(trajectory) => {
            assert_operational_envelope(config, trajectory);
            for residual in collocation_residuals(&model, trajectory) {
                for (r, tol) in residual.iter().zip(RESIDUAL_TOL.iter()) {
                    assert!(r.abs() <= *tol, "collocation residual {r} exceeds {tol}");
                }
            }
        }
        Outcome::Degraded {
            fallback,
            last_iterate,
            report,
        } => {
            assert_eq!(fallback, &fallback_trajectory(config));
            assert_eq!(last_iterate.len(), config.scenario.intervals + 1);
            assert!(!report.status.is_success());
            assert_operational_envelope(config, fallback);
        }
    }
}

#[test]
fn initial_guess_interpolates_boundary_values() {
    let config = DescentConfig::default();
    let guess = initial_guess(&config);
    let n = config.scenario.intervals;
    assert_eq!(guess.len(), n + 1);
    assert_eq!(guess.time_s[n], 3_600.0);
    assert_eq!(guess.airspeed_m_s[0], 200.0);
    assert_eq!(guess.airspeed_m_s[n], 180.0);
    assert_eq!(guess.distance_m[n], nm_to_m(200.0));
    assert_eq!(guess.altitude_m[0], ft_to_m(37_000.0));
    assert_eq!(guess.altitude_m[n], ft_to_m(5_000.0));
    assert_eq!(guess.mass_kg[n], 0.95 * 68_000.0);
    assert!(guess.thrust_newtons.iter().all(|&t| t == 7_500.0));
    assert!(
        guess
            .flight_path_rad
            .iter()
            .all(|&g| (g + 3.0_f64.to_radians()).abs() < 1e-15)
    );
}

#[test]
fn fallback_uses_degenerate_constant_controls() {
    let config = DescentConfig::default();
    let fallback = fallback_trajectory(&config);
    let guess = initial_guess(&config);
    assert_eq!(fallback.time_s, guess.time_s);
    assert_eq!(fallback.altitude_m, guess.altitude_m);
    assert_eq!(fallback.mass_kg, guess.mass_kg);
    assert_eq!(fallback.thrust_newtons, vec![0.05 * 150_000.0; 21]);
    assert_eq!(fallback.flight_path_rad, vec![-0.02; 21]);
    assert!((fallback.mass_fuel_burned_kg() - 3_400.0).abs() < 1e-9);
}

#[test]
fn reference_descent_meets_boundary_bands() {
    let config = DescentConfig::default();
    let outcome = solve(&config).expect("solve");
    check_outcome(&config, &outcome);

    let trajectory = outcome.value();
    assert!((trajectory.altitude_m[0] - ft_to_m(37_000.0)).abs() < 1e-6);
    let n = config.scenario.intervals;
    assert!((trajectory.altitude_m[n] - ft_to_m(5_000.0)).abs() <= ft_to_m(200.0) + 1.0);
    assert!((trajectory.distance_m[n] - nm_to_m(200.0)).abs() <= nm_to_m(2.0) + 10.0);
}

#[test]
fn short_descent_converges_onto_the_dynamics() {
    let config = short_feasible_config();
    let outcome = solve(&config).expect("solve");
    assert!(outcome.is_converged(), "short descent degraded: {outcome:?}");
    check_outcome(&config, &outcome);

    let trajectory = outcome.value();
    assert!(trajectory.mass_fuel_burned_kg() > 0.0);
    assert!(trajectory.mass_fuel_burned_kg() < fallback_trajectory(&config).mass_fuel_burned_kg());
}

#[test]
fn solve_is_deterministic() {
    let config = short_feasible_config();
    let first = solve(&config).expect("first solve");
    let second = solve(&config).expect("second solve");
    assert_eq!(first, second);
}

#[test]
fn invalid_configuration_is_rejected() {
    let mut config = DescentConfig::default();
    config.scenario.intervals = 0;
    assert!(solve(&config).is_err());
}

#[test]
fn residuals_of_a_straight_line_profile_are_reported_per_interval() {
    let config = DescentConfig::default();
    let model = PointMassModel::new(&config.aircraft);
    let residuals = collocation_residuals(&model, &fallback_trajectory(&config));
    assert_eq!(residuals.len(), config.scenario.intervals);
    // The linear guess does not satisfy the dynamics.
    assert!(residuals.iter().any(|r| r.iter().any(|v| v.abs() > 1.0)));
}
