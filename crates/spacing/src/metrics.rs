//! Per-link throughput and fuel metrics, and the split of a trajectory into links.

use std::ops::Range;

use cda_config::SpacingConfig;
use cda_dynamics::PointMassModel;
use serde::Serialize;

use crate::uncertainty::{UncertaintySeries, simulate_uncertainty};
use crate::{DescentProfile, SpacingError, check_len};

/// Guard added to the ground-speed denominator of the separation time.
const GROUND_SPEED_EPS: f64 = 1e-6;

/// Throughput proxy and fuel burn of one link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkMetrics {
    /// Inverse of the worst pairwise separation time, aircraft per second.
    pub throughput_per_s: f64,
    /// Left-Riemann sum of the fuel-flow polynomial, kg.
    pub fuel_kg: f64,
}

/// Borrowed samples of one link.
#[derive(Debug, Clone, Copy)]
pub struct SegmentView<'a> {
    pub times_s: &'a [f64],
    pub airspeed_m_s: &'a [f64],
    pub position_m: &'a [f64],
    pub correction_m_s: &'a [f64],
    pub altitude_m: &'a [f64],
    pub thrust_newtons: &'a [f64],
}

impl<'a> SegmentView<'a> {
    /// Slice a profile and its uncertainty series down to `range`.
    ///
    /// The thrust slice is clipped to the available samples and keeps at least the last
    /// one, matching the reuse-last rule of [`compute_link_metrics`].
    pub fn slice(
        profile: &DescentProfile<'a>,
        uncertainty: &'a UncertaintySeries,
        range: Range<usize>,
    ) -> Self {
        let thrust = profile.thrust_newtons;
        let thrust_start = range.start.min(thrust.len().saturating_sub(1));
        let thrust_end = range.end.min(thrust.len()).max(thrust_start + 1).min(thrust.len());
        Self {
            times_s: &profile.times_s[range.clone()],
            airspeed_m_s: &profile.airspeed_m_s[range.clone()],
            position_m: &uncertainty.position_m[range.clone()],
            correction_m_s: &uncertainty.correction_m_s[range.clone()],
            altitude_m: &profile.altitude_m[range],
            thrust_newtons: &thrust[thrust_start..thrust_end],
        }
    }
}

/// Throughput and fuel for one link.
///
/// Ground speed is `V + w0 - s`; the separation time of each sample is
/// `(2 x + x_req) / V_gs` and throughput is the inverse of the largest one. Fuel uses the
/// unfloored fuel-flow polynomial at each left endpoint, so it can differ from the fuel
/// implied by the mass state.
pub fn compute_link_metrics(
    model: &PointMassModel,
    spacing: &SpacingConfig,
    segment: &SegmentView<'_>,
) -> Result<LinkMetrics, SpacingError> {
    let n = segment.times_s.len();
    check_len("airspeed", n, segment.airspeed_m_s.len())?;
    check_len("uncertainty", n, segment.position_m.len())?;
    check_len("speed correction", n, segment.correction_m_s.len())?;
    check_len("altitude", n, segment.altitude_m.len())?;
    if n < 2 {
        return Err(SpacingError::InsufficientSamples(n));
    }
    let Some(&last_thrust) = segment.thrust_newtons.last() else {
        return Err(SpacingError::EmptyThrust);
    };

    let x_req = spacing.required_separation_m();
    let worst_separation_s = (0..n)
        .map(|i| {
            let ground_speed =
                segment.airspeed_m_s[i] + spacing.wind_offset_m_s - segment.correction_m_s[i];
            (2.0 * segment.position_m[i] + x_req) / (ground_speed + GROUND_SPEED_EPS)
        })
        .fold(f64::NEG_INFINITY, f64::max);

    let fuel_kg: f64 = (0..n - 1)
        .map(|i| {
            let dt = segment.times_s[i + 1] - segment.times_s[i];
            let thrust = segment.thrust_newtons.get(i).copied().unwrap_or(last_thrust);
            model.fuel_flow_polynomial(thrust, segment.altitude_m[i]) * dt
        })
        .sum();

    Ok(LinkMetrics {
        throughput_per_s: 1.0 / worst_separation_s,
        fuel_kg,
    })
}

/// Indices of the grid points with `start_s <= t <= end_s` on an ascending grid.
pub fn segment_range(times_s: &[f64], start_s: f64, end_s: f64) -> Range<usize> {
    let first = times_s.partition_point(|&t| t < start_s);
    let past_last = times_s.partition_point(|&t| t <= end_s);
    first..past_last.max(first)
}

/// One link induced by an STA time set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkSegment {
    pub start_s: f64,
    pub end_s: f64,
    pub range: Range<usize>,
    /// Segment from the last STA to the end of the grid.
    pub trailing: bool,
}

impl LinkSegment {
    pub fn samples(&self) -> usize {
        self.range.len()
    }
}

/// Links between consecutive STA times, followed by the trailing link from the last STA
/// to the end of the grid when it holds at least two samples.
pub fn link_segments(times_s: &[f64], sta_times_s: &[f64]) -> Vec<LinkSegment> {
    let mut segments: Vec<LinkSegment> = sta_times_s
        .windows(2)
        .map(|w| LinkSegment {
            start_s: w[0],
            end_s: w[1],
            range: segment_range(times_s, w[0], w[1]),
            trailing: false,
        })
        .collect();

    if let (Some(&last_sta), Some(&end)) = (sta_times_s.last(), times_s.last()) {
        let range = segment_range(times_s, last_sta, end);
        if range.len() >= 2 {
            segments.push(LinkSegment {
                start_s: last_sta,
                end_s: end,
                range,
                trailing: true,
            });
        }
    }
    segments
}

/// Uncertainty run plus the metrics of every scoreable link for one STA time set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkEvaluation {
    pub uncertainty: UncertaintySeries,
    pub segments: Vec<LinkSegment>,
    /// Metrics per entry of `segments`; `None` where a link has fewer than two samples.
    pub metrics: Vec<Option<LinkMetrics>>,
}

impl LinkEvaluation {
    pub fn scored(&self) -> impl Iterator<Item = &LinkMetrics> {
        self.metrics.iter().flatten()
    }

    /// Highest link throughput, if any link was scoreable.
    pub fn dominant_throughput(&self) -> Option<f64> {
        self.scored()
            .map(|m| m.throughput_per_s)
            .reduce(f64::max)
    }

    pub fn weakest_throughput(&self) -> Option<f64> {
        self.scored()
            .map(|m| m.throughput_per_s)
            .reduce(f64::min)
    }

    pub fn total_fuel_kg(&self) -> f64 {
        self.scored().map(|m| m.fuel_kg).sum()
    }

    /// True when an STA-bounded link has fewer than two samples.
    pub fn has_starved_link(&self) -> bool {
        self.segments
            .iter()
            .zip(&self.metrics)
            .any(|(segment, metrics)| !segment.trailing && metrics.is_none())
    }
}

/// Simulate uncertainty for `sta_times_s` and score each induced link.
pub fn evaluate_links(
    profile: &DescentProfile<'_>,
    model: &PointMassModel,
    spacing: &SpacingConfig,
    sta_times_s: &[f64],
) -> Result<LinkEvaluation, SpacingError> {
    let uncertainty =
        simulate_uncertainty(profile.times_s, profile.airspeed_m_s, sta_times_s, spacing)?;
    let segments = link_segments(profile.times_s, sta_times_s);
    let metrics = segments
        .iter()
        .map(|segment| {
            if segment.samples() < 2 {
                return Ok(None);
            }
            let view = SegmentView::slice(profile, &uncertainty, segment.range.clone());
            compute_link_metrics(model, spacing, &view).map(Some)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LinkEvaluation {
        uncertainty,
        segments,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_range_is_inclusive_on_both_ends() {
        let times = [0.0, 180.0, 360.0, 540.0, 720.0];
        assert_eq!(segment_range(&times, 180.0, 540.0), 1..4);
        assert_eq!(segment_range(&times, 100.0, 200.0), 1..2);
        assert_eq!(segment_range(&times, 600.0, 100.0), 4..4);
    }

    #[test]
    fn trailing_segment_needs_two_samples() {
        let times = [0.0, 180.0, 360.0, 540.0, 720.0];
        let full = link_segments(&times, &[0.0, 720.0]);
        assert_eq!(full.len(), 1);
        assert!(!full[0].trailing);

        let short = link_segments(&times, &[0.0, 360.0]);
        assert_eq!(short.len(), 2);
        assert!(short[1].trailing);
        assert_eq!(short[1].range, 2..5);
    }
}
