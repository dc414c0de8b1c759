//! Deterministic propagation of arrival-position uncertainty under STA speed corrections.

use cda_config::SpacingConfig;
use serde::Serialize;

use crate::{SpacingError, check_len};

/// Guard added to the time-to-STA denominator.
const TIME_TO_GO_EPS: f64 = 1e-6;

/// Positional spread `x` (m) and applied speed correction `s` (m/s) per grid point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UncertaintySeries {
    pub position_m: Vec<f64>,
    pub correction_m_s: Vec<f64>,
}

impl UncertaintySeries {
    pub fn len(&self) -> usize {
        self.position_m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position_m.is_empty()
    }

    pub fn max_position_m(&self) -> f64 {
        self.position_m
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Speed correction needed at `time_s` to absorb `spread_m` before `sta_s`.
///
/// Zero once the STA is reached. Past the correction threshold the time-to-go is frozen at
/// `sta - threshold`, and the result never exceeds the configured fraction of
/// `nominal_speed_m_s`.
pub fn speed_correction(
    time_s: f64,
    spread_m: f64,
    sta_s: f64,
    nominal_speed_m_s: f64,
    spacing: &SpacingConfig,
) -> f64 {
    if time_s >= sta_s {
        return 0.0;
    }
    let time_to_go = if time_s <= spacing.correction_threshold_s {
        sta_s - time_s
    } else {
        sta_s - spacing.correction_threshold_s
    };
    let correction = spread_m / (time_to_go + TIME_TO_GO_EPS);
    correction.min(spacing.max_correction_fraction * nominal_speed_m_s)
}

/// Scan the time grid once, integrating `x[i] = x[i-1] + (w0 - s[i]) dt`.
///
/// The active STA is the first entry not earlier than the current time, or the last entry
/// once the set is exhausted; it is tracked with a pointer that only moves forward.
pub fn simulate_uncertainty(
    times_s: &[f64],
    nominal_speeds_m_s: &[f64],
    sta_times_s: &[f64],
    spacing: &SpacingConfig,
) -> Result<UncertaintySeries, SpacingError> {
    if times_s.is_empty() {
        return Err(SpacingError::EmptyGrid);
    }
    check_len("nominal speed", times_s.len(), nominal_speeds_m_s.len())?;
    let Some(last_sta) = sta_times_s.len().checked_sub(1) else {
        return Err(SpacingError::EmptyStaTimes);
    };

    let n = times_s.len();
    let mut position_m = vec![0.0; n];
    let mut correction_m_s = vec![0.0; n];
    position_m[0] = spacing.initial_uncertainty_m();

    let mut active = 0;
    for i in 1..n {
        let t = times_s[i];
        while active < last_sta && sta_times_s[active] < t {
            active += 1;
        }
        let dt = t - times_s[i - 1];
        let s = speed_correction(
            t,
            position_m[i - 1],
            sta_times_s[active],
            nominal_speeds_m_s[i - 1],
            spacing,
        );
        correction_m_s[i] = s;
        position_m[i] = position_m[i - 1] + (spacing.wind_offset_m_s - s) * dt;
    }

    Ok(UncertaintySeries {
        position_m,
        correction_m_s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correction_vanishes_at_and_after_sta() {
        let spacing = SpacingConfig::default();
        assert_eq!(speed_correction(720.0, 3000.0, 720.0, 200.0, &spacing), 0.0);
        assert_eq!(speed_correction(900.0, 3000.0, 720.0, 200.0, &spacing), 0.0);
    }

    #[test]
    fn correction_freezes_time_to_go_past_threshold() {
        let spacing = SpacingConfig::default();
        let early = speed_correction(500.0, 1000.0, 3600.0, 200.0, &spacing);
        assert!((early - 1000.0 / 3100.0).abs() < 1e-9);
        let late = speed_correction(3000.0, 1000.0, 3600.0, 200.0, &spacing);
        assert!((late - 1000.0 / 2600.0).abs() < 1e-9);
    }

    #[test]
    fn correction_is_capped_by_nominal_speed() {
        let spacing = SpacingConfig::default();
        let s = speed_correction(700.0, 50_000.0, 720.0, 180.0, &spacing);
        assert!((s - 36.0).abs() < 1e-12);
    }

    #[test]
    fn pointer_uses_last_sta_once_exhausted() {
        let spacing = SpacingConfig::default();
        let times = [0.0, 100.0, 200.0, 300.0];
        let speeds = [200.0; 4];
        let series = simulate_uncertainty(&times, &speeds, &[0.0, 150.0], &spacing).unwrap();
        // t = 200 and t = 300 are past the last STA, so no correction applies.
        assert_eq!(series.correction_m_s[2], 0.0);
        assert_eq!(series.correction_m_s[3], 0.0);
        let x1 = series.position_m[1];
        assert!((series.position_m[3] - (x1 + 2.0 * 100.0 * spacing.wind_offset_m_s)).abs() < 1e-9);
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let spacing = SpacingConfig::default();
        let err = simulate_uncertainty(&[0.0, 1.0], &[200.0], &[0.0, 1.0], &spacing).unwrap_err();
        assert!(matches!(err, SpacingError::LengthMismatch { .. }));
        let err = simulate_uncertainty(&[0.0, 1.0], &[200.0; 2], &[], &spacing).unwrap_err();
        assert_eq!(err, SpacingError::EmptyStaTimes);
    }
}
