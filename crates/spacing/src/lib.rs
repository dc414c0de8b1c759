//! STA-based spacing analysis on top of a nominal descent trajectory.
//!
//! - [`uncertainty`] propagates the positional spread and the speed correction that
//!   absorbs it ahead of each scheduled time of arrival.
//! - [`metrics`] scores one link (throughput proxy and polynomial fuel burn) and splits a
//!   trajectory into links.
//! - [`waypoints`] places interior STA waypoints by trading fuel against the weakest
//!   link's throughput.

pub mod metrics;
pub mod uncertainty;
pub mod waypoints;

pub use metrics::{
    LinkEvaluation, LinkMetrics, LinkSegment, SegmentView, compute_link_metrics, evaluate_links,
    link_segments, segment_range,
};
pub use uncertainty::{UncertaintySeries, simulate_uncertainty, speed_correction};
pub use waypoints::{evenly_spaced_sta_times, optimize_sta_waypoints, placement_score};

/// Borrowed nominal trajectory series consumed by the spacing analysis.
///
/// Thrust may be shorter than the time grid; consumers reuse its last value.
#[derive(Debug, Clone, Copy)]
pub struct DescentProfile<'a> {
    pub times_s: &'a [f64],
    pub airspeed_m_s: &'a [f64],
    pub altitude_m: &'a [f64],
    pub thrust_newtons: &'a [f64],
}

impl<'a> DescentProfile<'a> {
    pub fn new(
        times_s: &'a [f64],
        airspeed_m_s: &'a [f64],
        altitude_m: &'a [f64],
        thrust_newtons: &'a [f64],
    ) -> Result<Self, SpacingError> {
        if times_s.is_empty() {
            return Err(SpacingError::EmptyGrid);
        }
        check_len("airspeed", times_s.len(), airspeed_m_s.len())?;
        check_len("altitude", times_s.len(), altitude_m.len())?;
        if thrust_newtons.is_empty() {
            return Err(SpacingError::EmptyThrust);
        }
        Ok(Self {
            times_s,
            airspeed_m_s,
            altitude_m,
            thrust_newtons,
        })
    }

    pub fn len(&self) -> usize {
        self.times_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times_s.is_empty()
    }

    /// Time of the last grid point.
    pub fn end_time_s(&self) -> f64 {
        self.times_s.last().copied().unwrap_or(0.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SpacingError {
    #[error("time grid is empty")]
    EmptyGrid,
    #[error("thrust series is empty")]
    EmptyThrust,
    #[error("{series} series has {actual} samples, expected {expected}")]
    LengthMismatch {
        series: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("link metrics need at least two samples, got {0}")]
    InsufficientSamples(usize),
    #[error("link count must be at least one")]
    ZeroLinkCount,
    #[error("STA time set is empty")]
    EmptyStaTimes,
    #[error("total duration must be positive and finite, got {0}")]
    InvalidDuration(f64),
}

pub(crate) fn check_len(
    series: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), SpacingError> {
    if expected == actual {
        Ok(())
    } else {
        Err(SpacingError::LengthMismatch {
            series,
            expected,
            actual,
        })
    }
}
