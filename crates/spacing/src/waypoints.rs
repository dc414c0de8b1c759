//! Placement of STA waypoints along a nominal descent.
//!
//! The decision variables are the link durations. They are bounded to
//! `[min_link_duration, total]`, must sum to the total duration, and the placement score
//! is the total link fuel minus the weighted throughput of the weakest link. Segment
//! membership changes whenever an STA crosses a grid node, so the score is only piecewise
//! smooth and the durations are placed by pattern search.

use cda_config::{SolverConfig, SpacingConfig};
use cda_core::grid::linspace;
use cda_dynamics::PointMassModel;
use cda_nlp::{DMatrix, DVector, FailureReport, Outcome, Problem, SolverSettings, pattern_search};
use tracing::{debug, info, warn};

use crate::metrics::evaluate_links;
use crate::{DescentProfile, SpacingError};

/// `link_count + 1` STA times evenly spread over `[0, total_duration_s]`.
pub fn evenly_spaced_sta_times(link_count: usize, total_duration_s: f64) -> Vec<f64> {
    linspace(0.0, total_duration_s, link_count + 1)
}

/// Score of one STA time set; lower is better.
///
/// Any STA-bounded link with fewer than two grid samples rejects the set with the
/// configured penalty.
pub fn placement_score(
    profile: &DescentProfile<'_>,
    model: &PointMassModel,
    spacing: &SpacingConfig,
    sta_times_s: &[f64],
) -> Result<f64, SpacingError> {
    let evaluation = evaluate_links(profile, model, spacing, sta_times_s)?;
    if evaluation.has_starved_link() {
        return Ok(spacing.infeasible_penalty);
    }
    Ok(match evaluation.weakest_throughput() {
        Some(weakest) => evaluation.total_fuel_kg() - spacing.throughput_weight * weakest,
        None => spacing.infeasible_penalty,
    })
}

/// Cumulative times with the last one pinned to `total_s`, so accumulated rounding never
/// moves the final STA off the horizon end.
fn pinned_sta_times(durations: &[f64], total_s: f64) -> Vec<f64> {
    let mut times = cumulative_sta_times(durations);
    if let Some(last) = times.last_mut() {
        *last = total_s;
    }
    times
}

fn cumulative_sta_times(durations: &[f64]) -> Vec<f64> {
    let mut times = Vec::with_capacity(durations.len() + 1);
    let mut elapsed = 0.0;
    times.push(elapsed);
    for duration in durations {
        elapsed += duration;
        times.push(elapsed);
    }
    times
}

struct StaPlacementProblem<'a> {
    profile: DescentProfile<'a>,
    model: &'a PointMassModel,
    spacing: &'a SpacingConfig,
    link_count: usize,
    total_s: f64,
}

impl Problem for StaPlacementProblem<'_> {
    fn dimension(&self) -> usize {
        self.link_count
    }

    fn lower_bounds(&self) -> DVector<f64> {
        DVector::from_element(self.link_count, self.spacing.min_link_duration_s)
    }

    fn upper_bounds(&self) -> DVector<f64> {
        DVector::from_element(self.link_count, self.total_s)
    }

    fn objective(&self, x: &DVector<f64>) -> f64 {
        let sta_times = pinned_sta_times(x.as_slice(), self.total_s);
        placement_score(&self.profile, self.model, self.spacing, &sta_times)
            .unwrap_or(self.spacing.infeasible_penalty)
    }

    fn equalities(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_element(1, (x.sum() - self.total_s) / self.total_s)
    }

    fn equality_jacobian(&self, _x: &DVector<f64>) -> DMatrix<f64> {
        DMatrix::from_element(1, self.link_count, 1.0 / self.total_s)
    }

    fn inequalities(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![
            (x.min() - self.spacing.min_link_duration_s) / self.total_s,
            (self.total_s - x.max()) / self.total_s,
        ])
    }

    fn variable_scale(&self) -> DVector<f64> {
        DVector::from_element(self.link_count, self.total_s / self.link_count as f64)
    }
}

/// Place `link_count - 1` interior STA waypoints over `[0, total_duration_s]`.
///
/// Returns `link_count + 1` STA times starting at 0 and ending at `total_duration_s`. A
/// single link needs no optimization. The search starts from the even split and only
/// accepts improvements, so a converged placement never scores worse than it. When the
/// search does not converge the result is degraded to [`evenly_spaced_sta_times`].
pub fn optimize_sta_waypoints(
    link_count: usize,
    total_duration_s: f64,
    profile: &DescentProfile<'_>,
    model: &PointMassModel,
    spacing: &SpacingConfig,
    solver: &SolverConfig,
) -> Result<Outcome<Vec<f64>>, SpacingError> {
    if link_count == 0 {
        return Err(SpacingError::ZeroLinkCount);
    }
    if !(total_duration_s.is_finite() && total_duration_s > 0.0) {
        return Err(SpacingError::InvalidDuration(total_duration_s));
    }
    if link_count == 1 {
        return Ok(Outcome::Converged(vec![0.0, total_duration_s]));
    }

    let initial = DVector::from_element(link_count, total_duration_s / link_count as f64);
    let initial_score = placement_score(
        profile,
        model,
        spacing,
        &pinned_sta_times(initial.as_slice(), total_duration_s),
    )?;
    let problem = StaPlacementProblem {
        profile: *profile,
        model,
        spacing,
        link_count,
        total_s: total_duration_s,
    };

    let report = pattern_search(&problem, &initial, &SolverSettings::from(solver));
    let last_iterate = cumulative_sta_times(report.x.as_slice());
    debug!(
        link_count,
        initial_score,
        score = report.objective,
        rounds = report.iterations,
        mesh = report.optimality,
        "STA placement search finished"
    );

    if report.status.is_success() {
        let sta_times = pinned_sta_times(report.x.as_slice(), total_duration_s);
        info!(link_count, sta_times = ?sta_times, "STA placement converged");
        return Ok(Outcome::Converged(sta_times));
    }

    let failure = FailureReport::from(&report);
    warn!(
        link_count,
        status = ?failure.status,
        iterations = failure.iterations,
        violation = failure.constraint_violation,
        durations = ?report.x.as_slice(),
        "STA optimization failed, using evenly spaced STA times"
    );
    Ok(Outcome::Degraded {
        fallback: evenly_spaced_sta_times(link_count, total_duration_s),
        last_iterate,
        report: failure,
    })
}
