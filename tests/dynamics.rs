use sta_descent::config::AircraftConfig;
use sta_descent::dynamics::{AircraftState, Control, PointMassModel};

fn model() -> PointMassModel {
    PointMassModel::new(&AircraftConfig::default())
}

fn cruise_state() -> AircraftState {
    AircraftState {
        airspeed_m_s: 200.0,
        distance_m: 10_000.0,
        altitude_m: 9_000.0,
        mass_kg: 66_000.0,
    }
}

#[test]
fn fuel_flow_is_non_negative_inside_the_envelope() {
    let model = model();
    let a = model.aircraft().clone();
    for &v in &[a.min_airspeed_m_s, 180.0, 220.0, a.max_airspeed_m_s] {
        for &h in &[500.0, 4_000.0, 8_000.0, 11_277.6] {
            for &thrust_fraction in &[0.0, 0.05, 0.1, a.max_thrust_fraction] {
                for &gamma_deg in &[-3.0, -1.5, 0.0, 3.0] {
                    let state = AircraftState {
                        airspeed_m_s: v,
                        distance_m: 0.0,
                        altitude_m: h,
                        mass_kg: 0.9 * a.reference_mass_kg,
                    };
                    let control = Control {
                        thrust_newtons: thrust_fraction * a.max_thrust_newtons,
                        flight_path_rad: f64::to_radians(gamma_deg),
                    };
                    let eval = model.evaluate(&state, &control);
                    assert!(eval.fuel_flow_kg_s >= 0.0);
                    assert_eq!(eval.rate.mass_kg_s, -eval.fuel_flow_kg_s);
                    assert!(eval.rate.to_array().iter().all(|r| r.is_finite()));
                }
            }
        }
    }
}

#[test]
fn rates_follow_point_mass_equations() {
    let model = model();
    let a = model.aircraft().clone();
    let state = cruise_state();
    let control = Control {
        thrust_newtons: 10_000.0,
        flight_path_rad: -0.03,
    };
    let eval = model.evaluate(&state, &control);

    let rho = a.sea_level_density_kg_m3 * (1.0 - 2.255e-5 * state.altitude_m).powf(4.258);
    let q_s = 0.5 * rho * state.airspeed_m_s.powi(2) * a.wing_area_m2;
    let cl = state.mass_kg * a.gravity_m_s2 * control.flight_path_rad.cos() / (q_s + 1e-6);
    let drag = (a.zero_lift_drag + a.induced_drag_factor * cl * cl) * q_s;
    let expected_dv = (control.thrust_newtons - drag) / state.mass_kg
        - a.gravity_m_s2 * control.flight_path_rad.sin();

    assert!((eval.rate.airspeed_m_s2 - expected_dv).abs() < 1e-12);
    assert!(
        (eval.rate.distance_m_s - state.airspeed_m_s * control.flight_path_rad.cos()).abs() < 1e-12
    );
    assert!(
        (eval.rate.altitude_m_s - state.airspeed_m_s * control.flight_path_rad.sin()).abs() < 1e-12
    );
    assert!(eval.rate.altitude_m_s < 0.0);
}

#[test]
fn available_thrust_scales_with_density_ratio() {
    let model = model();
    let a = model.aircraft();
    assert!((model.available_thrust(0.0) - a.max_thrust_newtons).abs() < 1e-9);
    let high = model.available_thrust(11_000.0);
    assert!(high > 0.0 && high < 0.5 * a.max_thrust_newtons);
}

#[test]
fn inputs_outside_the_envelope_are_clamped() {
    let model = model();
    let a = model.aircraft().clone();
    let state = cruise_state();

    let slow = AircraftState {
        airspeed_m_s: 20.0,
        ..state
    };
    let at_min = AircraftState {
        airspeed_m_s: a.min_airspeed_m_s,
        ..state
    };
    let control = Control {
        thrust_newtons: -5_000.0,
        flight_path_rad: -0.5,
    };
    let clamped = Control {
        thrust_newtons: 0.0,
        flight_path_rad: -a.max_flight_path_rad(),
    };
    assert_eq!(
        model.evaluate(&slow, &control),
        model.evaluate(&at_min, &clamped)
    );

    let light = AircraftState {
        mass_kg: 1_000.0,
        ..state
    };
    let at_floor = AircraftState {
        mass_kg: a.min_mass_kg(),
        ..state
    };
    assert_eq!(
        model.evaluate(&light, &clamped),
        model.evaluate(&at_floor, &clamped)
    );
}

#[test]
fn evaluation_is_continuous_across_clamp_boundaries() {
    let model = model();
    let a = model.aircraft().clone();
    let eps = 1e-7;
    let state = cruise_state();
    let control = Control {
        thrust_newtons: 8_000.0,
        flight_path_rad: -0.02,
    };

    let samples: Vec<(AircraftState, Control, AircraftState, Control)> = vec![
        (
            AircraftState {
                airspeed_m_s: a.min_airspeed_m_s - eps,
                ..state
            },
            control,
            AircraftState {
                airspeed_m_s: a.min_airspeed_m_s + eps,
                ..state
            },
            control,
        ),
        (
            state,
            Control {
                flight_path_rad: -a.max_flight_path_rad() - eps,
                ..control
            },
            state,
            Control {
                flight_path_rad: -a.max_flight_path_rad() + eps,
                ..control
            },
        ),
        (
            state,
            Control {
                thrust_newtons: -eps,
                ..control
            },
            state,
            Control {
                thrust_newtons: eps,
                ..control
            },
        ),
        (
            AircraftState {
                mass_kg: a.min_mass_kg() - eps,
                ..state
            },
            control,
            AircraftState {
                mass_kg: a.min_mass_kg() + eps,
                ..state
            },
            control,
        ),
    ];

    for (s0, u0, s1, u1) in samples {
        let lo = model.evaluate(&s0, &u0);
        let hi = model.evaluate(&s1, &u1);
        for (x, y) in lo.rate.to_array().iter().zip(hi.rate.to_array().iter()) {
            assert!((x - y).abs() < 1e-4, "jump {x} vs {y}");
        }
        assert!((lo.fuel_flow_kg_s - hi.fuel_flow_kg_s).abs() < 1e-5);
    }
}

fn central_difference(
    model: &PointMassModel,
    state: &AircraftState,
    control: &Control,
) -> [[f64; 6]; 5] {
    let pack = |z: &[f64; 6]| -> [f64; 5] {
        let eval = model.evaluate(
            &AircraftState::from_array([z[0], z[1], z[2], z[3]]),
            &Control::from_array([z[4], z[5]]),
        );
        let r = eval.rate.to_array();
        [r[0], r[1], r[2], r[3], eval.fuel_flow_kg_s]
    };
    let x = state.to_array();
    let u = control.to_array();
    let base = [x[0], x[1], x[2], x[3], u[0], u[1]];
    let mut out = [[0.0; 6]; 5];
    for j in 0..6 {
        let step = if j == 5 { 1e-6 } else { 1e-6 * base[j].abs().max(1.0) };
        let mut plus = base;
        let mut minus = base;
        plus[j] += step;
        minus[j] -= step;
        let (p, m) = (pack(&plus), pack(&minus));
        for i in 0..5 {
            out[i][j] = (p[i] - m[i]) / (2.0 * step);
        }
    }
    out
}

#[test]
fn closed_form_sensitivities_match_central_differences() {
    let model = model();
    let states = [
        cruise_state(),
        AircraftState {
            airspeed_m_s: 165.0,
            distance_m: 250_000.0,
            altitude_m: 2_000.0,
            mass_kg: 64_500.0,
        },
        AircraftState {
            airspeed_m_s: 240.0,
            distance_m: 0.0,
            altitude_m: 11_200.0,
            mass_kg: 68_000.0,
        },
    ];
    let controls = [
        Control {
            thrust_newtons: 9_000.0,
            flight_path_rad: -0.03,
        },
        Control {
            thrust_newtons: 25_000.0,
            flight_path_rad: 0.01,
        },
    ];
    for state in &states {
        for control in &controls {
            let exact = model.sensitivities(state, control);
            let numeric = central_difference(&model, state, control);
            for i in 0..5 {
                for j in 0..6 {
                    let tol = 1e-5 * numeric[i][j].abs().max(1e-4);
                    assert!(
                        (exact[i][j] - numeric[i][j]).abs() <= tol,
                        "d(out {i})/d(in {j}): {} vs {}",
                        exact[i][j],
                        numeric[i][j]
                    );
                }
            }
        }
    }
}

#[test]
fn sensitivities_match_closed_form_kinematics() {
    let model = model();
    let state = cruise_state();
    let control = Control {
        thrust_newtons: 9_000.0,
        flight_path_rad: -0.03,
    };
    let sens = model.sensitivities(&state, &control);

    assert_eq!(sens[1][0], control.flight_path_rad.cos());
    assert_eq!(sens[2][5], state.airspeed_m_s * control.flight_path_rad.cos());
    assert_eq!(sens[1][1], 0.0);
    for j in 0..6 {
        assert_eq!(sens[3][j], -sens[4][j]);
    }
    assert!(sens[4][4] > 0.0);
    assert!(sens[0][4] > 0.0);
}

#[test]
fn bounds_keep_their_inside_slope() {
    let model = model();
    let a = model.aircraft().clone();
    let state = AircraftState {
        airspeed_m_s: a.min_airspeed_m_s,
        ..cruise_state()
    };
    let idle = Control {
        thrust_newtons: 0.0,
        flight_path_rad: -a.max_flight_path_rad(),
    };
    let sens = model.sensitivities(&state, &idle);

    // Idle thrust: only the linear and altitude terms of the polynomial survive.
    let expected = a.fuel_flow.linear / model.available_thrust(state.altitude_m)
        + a.fuel_flow.altitude * state.altitude_m;
    assert!((sens[4][4] - expected).abs() < 1e-15);
    assert!(sens[0][4] > 0.0);
    assert!((sens[1][0] - idle.flight_path_rad.cos()).abs() < 1e-15);
    assert!(sens[2][5] > 0.0);

    // Outside the envelope the clamped input has no effect.
    let below = AircraftState {
        airspeed_m_s: a.min_airspeed_m_s - 10.0,
        ..state
    };
    assert_eq!(model.sensitivities(&below, &idle)[1][0], 0.0);
}

#[test]
fn raw_polynomial_is_not_floored() {
    let model = model();
    assert!(model.fuel_flow_polynomial(-1_000.0, 3_000.0) < 0.0);
    let eval = model.evaluate(
        &cruise_state(),
        &Control {
            thrust_newtons: -1_000.0,
            flight_path_rad: -0.02,
        },
    );
    assert_eq!(eval.fuel_flow_kg_s, 0.0);
}
