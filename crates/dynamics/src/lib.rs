//! Point-mass longitudinal dynamics for a jet transport in a continuous descent.
//!
//! The model is a total function: inputs outside the admissible envelope are clamped
//! before use, so optimizer iterates that stray out of bounds still produce finite rates.

use cda_config::AircraftConfig;
use serde::Serialize;

/// Floor added to the dynamic-pressure term of the lift balance.
const LIFT_DENOMINATOR_EPS: f64 = 1e-6;
/// ISA troposphere lapse factor (1/m) and exponent of the density power law.
const DENSITY_LAPSE_PER_M: f64 = 2.255e-5;
const DENSITY_EXPONENT: f64 = 4.258;

/// Aircraft state `(V, d, h, m)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AircraftState {
    pub airspeed_m_s: f64,
    pub distance_m: f64,
    pub altitude_m: f64,
    pub mass_kg: f64,
}

impl AircraftState {
    pub fn from_array(v: [f64; 4]) -> Self {
        Self {
            airspeed_m_s: v[0],
            distance_m: v[1],
            altitude_m: v[2],
            mass_kg: v[3],
        }
    }

    pub fn to_array(&self) -> [f64; 4] {
        [
            self.airspeed_m_s,
            self.distance_m,
            self.altitude_m,
            self.mass_kg,
        ]
    }
}

/// Control input `(T, gamma)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Control {
    pub thrust_newtons: f64,
    pub flight_path_rad: f64,
}

impl Control {
    pub fn from_array(v: [f64; 2]) -> Self {
        Self {
            thrust_newtons: v[0],
            flight_path_rad: v[1],
        }
    }

    pub fn to_array(&self) -> [f64; 2] {
        [self.thrust_newtons, self.flight_path_rad]
    }
}

/// Time derivative of [`AircraftState`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateRate {
    pub airspeed_m_s2: f64,
    pub distance_m_s: f64,
    pub altitude_m_s: f64,
    pub mass_kg_s: f64,
}

impl StateRate {
    pub fn to_array(&self) -> [f64; 4] {
        [
            self.airspeed_m_s2,
            self.distance_m_s,
            self.altitude_m_s,
            self.mass_kg_s,
        ]
    }
}

/// Output of one model evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub rate: StateRate,
    /// Fuel-flow rate in kg/s; equals `-rate.mass_kg_s`.
    pub fuel_flow_kg_s: f64,
}

/// Partial derivatives of `[dV, dd, dh, dm, fuel_flow]` with respect to
/// `[V, d, h, m, T, gamma]`.
pub type Sensitivities = [[f64; 6]; 5];

fn pass_through(inside: bool) -> f64 {
    if inside { 1.0 } else { 0.0 }
}

/// Point-mass model bound to one aircraft configuration.
#[derive(Debug, Clone)]
pub struct PointMassModel {
    aircraft: AircraftConfig,
}

impl PointMassModel {
    pub fn new(aircraft: &AircraftConfig) -> Self {
        Self {
            aircraft: aircraft.clone(),
        }
    }

    pub fn aircraft(&self) -> &AircraftConfig {
        &self.aircraft
    }

    /// Air density from the ISA troposphere power law.
    pub fn air_density(&self, altitude_m: f64) -> f64 {
        let base = (1.0 - DENSITY_LAPSE_PER_M * altitude_m).max(0.0);
        self.aircraft.sea_level_density_kg_m3 * base.powf(DENSITY_EXPONENT)
    }

    /// Static thrust available at altitude, scaled by the density ratio.
    pub fn available_thrust(&self, altitude_m: f64) -> f64 {
        let a = &self.aircraft;
        a.max_thrust_newtons * (self.air_density(altitude_m) / a.sea_level_density_kg_m3)
    }

    /// Raw fuel-flow polynomial in kg/s, without clamping or flooring.
    ///
    /// Link metrics integrate this directly; [`PointMassModel::evaluate`] floors it at zero.
    pub fn fuel_flow_polynomial(&self, thrust_newtons: f64, altitude_m: f64) -> f64 {
        let c = &self.aircraft.fuel_flow;
        let ratio = thrust_newtons / self.available_thrust(altitude_m).max(f64::MIN_POSITIVE);
        c.cubic * ratio.powi(3)
            + c.quadratic * ratio.powi(2)
            + c.linear * ratio
            + c.altitude * thrust_newtons * altitude_m
    }

    /// State derivatives and fuel flow for one state/control pair.
    pub fn evaluate(&self, state: &AircraftState, control: &Control) -> Evaluation {
        let a = &self.aircraft;
        let gamma_max = a.max_flight_path_rad();

        let thrust = control.thrust_newtons.max(0.0);
        let v = state.airspeed_m_s.max(a.min_airspeed_m_s);
        let mass = state.mass_kg.max(a.min_mass_kg());
        let gamma = control.flight_path_rad.clamp(-gamma_max, gamma_max);
        let h = state.altitude_m;

        let rho = self.air_density(h);
        let dynamic_force = 0.5 * rho * v * v * a.wing_area_m2;
        let lift_coefficient =
            mass * a.gravity_m_s2 * gamma.cos() / (dynamic_force + LIFT_DENOMINATOR_EPS);
        let drag_coefficient =
            a.zero_lift_drag + a.induced_drag_factor * lift_coefficient * lift_coefficient;
        let drag = drag_coefficient * dynamic_force;

        let fuel_flow = self.fuel_flow_polynomial(thrust, h).max(0.0);

        Evaluation {
            rate: StateRate {
                airspeed_m_s2: (thrust - drag) / mass - a.gravity_m_s2 * gamma.sin(),
                distance_m_s: v * gamma.cos(),
                altitude_m_s: v * gamma.sin(),
                mass_kg_s: -fuel_flow,
            },
            fuel_flow_kg_s: fuel_flow,
        }
    }

    /// Closed-form partials of the rates and fuel flow.
    ///
    /// Clamped inputs take their derivative from inside the envelope, including on the
    /// bound itself.
    pub fn sensitivities(&self, state: &AircraftState, control: &Control) -> Sensitivities {
        let a = &self.aircraft;
        let g = a.gravity_m_s2;
        let gamma_max = a.max_flight_path_rad();

        let pass_v = pass_through(state.airspeed_m_s >= a.min_airspeed_m_s);
        let pass_m = pass_through(state.mass_kg >= a.min_mass_kg());
        let pass_t = pass_through(control.thrust_newtons >= 0.0);
        let pass_gamma = pass_through(control.flight_path_rad.abs() <= gamma_max);

        let thrust = control.thrust_newtons.max(0.0);
        let v = state.airspeed_m_s.max(a.min_airspeed_m_s);
        let mass = state.mass_kg.max(a.min_mass_kg());
        let gamma = control.flight_path_rad.clamp(-gamma_max, gamma_max);
        let h = state.altitude_m;
        let (sin_g, cos_g) = gamma.sin_cos();

        let rho = self.air_density(h);
        let rho_h = self.air_density_slope(h);
        let q = 0.5 * rho * v * v * a.wing_area_m2;
        let q_v = rho * v * a.wing_area_m2;
        let q_h = 0.5 * v * v * a.wing_area_m2 * rho_h;
        let weight = mass * g * cos_g;
        let denom = q + LIFT_DENOMINATOR_EPS;
        let lift_coefficient = weight / denom;
        let drag =
            (a.zero_lift_drag + a.induced_drag_factor * lift_coefficient * lift_coefficient) * q;
        // D = CD0 q + k W^2 q / (q + eps)^2
        let drag_q = a.zero_lift_drag
            + a.induced_drag_factor * weight * weight * (LIFT_DENOMINATOR_EPS - q)
                / (denom * denom * denom);
        let drag_w = 2.0 * a.induced_drag_factor * weight * q / (denom * denom);

        let mut out = [[0.0; 6]; 5];

        out[0][0] = -drag_q * q_v / mass * pass_v;
        out[0][2] = -drag_q * q_h / mass;
        out[0][3] = (-drag_w * g * cos_g / mass - (thrust - drag) / (mass * mass)) * pass_m;
        out[0][4] = pass_t / mass;
        out[0][5] = (drag_w * g * sin_g - g * cos_g) * pass_gamma;

        out[1][0] = cos_g * pass_v;
        out[1][5] = -v * sin_g * pass_gamma;

        out[2][0] = sin_g * pass_v;
        out[2][5] = v * cos_g * pass_gamma;

        let (fuel_t, fuel_h) = self.fuel_flow_partials(thrust, h);
        let pass_fuel = pass_through(self.fuel_flow_polynomial(thrust, h) >= 0.0);
        out[4][2] = fuel_h * pass_fuel;
        out[4][4] = fuel_t * pass_t * pass_fuel;
        for j in 0..6 {
            out[3][j] = -out[4][j];
        }
        out
    }

    /// `d rho / d h` of [`PointMassModel::air_density`].
    fn air_density_slope(&self, altitude_m: f64) -> f64 {
        let base = 1.0 - DENSITY_LAPSE_PER_M * altitude_m;
        if base <= 0.0 {
            return 0.0;
        }
        -self.aircraft.sea_level_density_kg_m3
            * DENSITY_EXPONENT
            * DENSITY_LAPSE_PER_M
            * base.powf(DENSITY_EXPONENT - 1.0)
    }

    /// Partials of [`PointMassModel::fuel_flow_polynomial`] with respect to thrust and altitude.
    fn fuel_flow_partials(&self, thrust_newtons: f64, altitude_m: f64) -> (f64, f64) {
        let a = &self.aircraft;
        let c = &a.fuel_flow;
        let available = self.available_thrust(altitude_m);
        if available <= f64::MIN_POSITIVE {
            return (c.altitude * altitude_m, c.altitude * thrust_newtons);
        }
        let available_h =
            a.max_thrust_newtons * self.air_density_slope(altitude_m) / a.sea_level_density_kg_m3;
        let ratio = thrust_newtons / available;
        let polynomial_r = 3.0 * c.cubic * ratio * ratio + 2.0 * c.quadratic * ratio + c.linear;
        let ratio_h = -thrust_newtons * available_h / (available * available);
        (
            polynomial_r / available + c.altitude * altitude_m,
            polynomial_r * ratio_h + c.altitude * thrust_newtons,
        )
    }

    /// Difference step for input `j` of `[V, d, h, m, T, gamma]`: forward, except where a
    /// forward step would leave the flight-path envelope.
    pub fn inward_step(&self, j: usize, value: f64) -> f64 {
        let step = if j == 5 {
            1e-7
        } else {
            1e-7 * value.abs().max(1.0)
        };
        if j == 5 && value + step > self.aircraft.max_flight_path_rad() {
            -step
        } else {
            step
        }
    }
}
