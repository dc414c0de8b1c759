//! Core units, constants, and shared grid helpers for the STA descent planner workspace.

/// Conversion factors expressed in SI units.
pub mod constants {
    /// Metres per international foot.
    pub const METERS_PER_FOOT: f64 = 0.3048;
    /// Metres per nautical mile.
    pub const METERS_PER_NAUTICAL_MILE: f64 = 1_852.0;
    /// Seconds per minute.
    pub const SECONDS_PER_MINUTE: f64 = 60.0;
}

/// Basic unit conversion helpers.
pub mod units {
    use super::constants::{METERS_PER_FOOT, METERS_PER_NAUTICAL_MILE};

    /// Convert feet to metres.
    #[inline]
    pub fn ft_to_m(v: f64) -> f64 {
        v * METERS_PER_FOOT
    }

    /// Convert metres to feet.
    #[inline]
    pub fn m_to_ft(v: f64) -> f64 {
        v / METERS_PER_FOOT
    }

    /// Convert nautical miles to metres.
    #[inline]
    pub fn nm_to_m(v: f64) -> f64 {
        v * METERS_PER_NAUTICAL_MILE
    }

    /// Convert metres to nautical miles.
    #[inline]
    pub fn m_to_nm(v: f64) -> f64 {
        v / METERS_PER_NAUTICAL_MILE
    }

    /// Convert kilograms per second to kilograms per minute.
    #[inline]
    pub fn kg_s_to_kg_min(v: f64) -> f64 {
        v * super::constants::SECONDS_PER_MINUTE
    }
}

/// Uniform grids and 1-D interpolation over them.
pub mod grid {
    /// `count` evenly spaced samples from `start` to `end` inclusive.
    ///
    /// The last sample is pinned to `end` so cumulative round-off never moves the endpoint.
    pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
        match count {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let step = (end - start) / (count - 1) as f64;
                let mut values: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();
                values[count - 1] = end;
                values
            }
        }
    }

    /// Piecewise-linear interpolation of `ys` over ascending `xs`, clamped at both ends.
    ///
    /// Returns `None` when the inputs are empty or of different lengths.
    pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> Option<f64> {
        if xs.is_empty() || xs.len() != ys.len() {
            return None;
        }
        let last = xs.len() - 1;
        if x <= xs[0] {
            return Some(ys[0]);
        }
        if x >= xs[last] {
            return Some(ys[last]);
        }
        let upper = xs.partition_point(|&v| v <= x).min(last);
        let lower = upper - 1;
        let span = xs[upper] - xs[lower];
        if span <= 0.0 {
            return Some(ys[upper]);
        }
        let frac = (x - xs[lower]) / span;
        Some(ys[lower] + frac * (ys[upper] - ys[lower]))
    }
}
