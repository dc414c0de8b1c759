//! End-to-end run: optimize the descent once, score the two-waypoint baseline, then place
//! and score STA waypoints for every configured link count.

pub mod fuel;

use cda_config::{ConfigError, DescentConfig};
use cda_core::grid::interp;
use cda_core::units::m_to_nm;
use cda_dynamics::PointMassModel;
use cda_export::archive::{
    BaselineSummary, LinkCountSummary, ResultArchive, TrajectorySeries, timestamp,
};
use cda_nlp::Outcome;
use cda_spacing::{
    DescentProfile, LinkEvaluation, LinkMetrics, SpacingError, evaluate_links,
    optimize_sta_waypoints,
};
use cda_trajectory::{Trajectory, TrajectoryError};
use tracing::info;

pub use fuel::{FuelProfile, distance_to_go, fuel_profile};

/// Top-level pipeline error.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),
    #[error("trajectory optimization failed: {0}")]
    Trajectory(#[from] TrajectoryError),
    #[error("spacing analysis failed: {0}")]
    Spacing(#[from] SpacingError),
    #[error("baseline link has fewer than two samples")]
    BaselineUnavailable,
}

/// Placement and scoring for one link count.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkCountResult {
    pub link_count: usize,
    pub sta_times: Outcome<Vec<f64>>,
    pub evaluation: LinkEvaluation,
    /// Dominant link throughput, or the baseline when no link was scoreable.
    pub throughput_per_s: f64,
    /// Distance to go at each STA time, by linear interpolation of the distance flown.
    pub sta_distance_to_go_m: Vec<f64>,
}

impl LinkCountResult {
    pub fn max_uncertainty_m(&self) -> f64 {
        self.evaluation.uncertainty.max_position_m()
    }
}

/// Everything one run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub trajectory: Outcome<Trajectory>,
    pub fuel: FuelProfile,
    pub distance_to_go_m: Vec<f64>,
    pub baseline: LinkMetrics,
    pub links: Vec<LinkCountResult>,
}

impl PipelineReport {
    /// Trajectory consumers should use: the converged solution or the fallback.
    pub fn nominal(&self) -> &Trajectory {
        self.trajectory.value()
    }

    pub fn to_archive(&self) -> ResultArchive {
        let t = self.nominal();
        ResultArchive {
            generated_at: timestamp(),
            trajectory_converged: self.trajectory.is_converged(),
            total_fuel_kg: self.fuel.total_kg(),
            mass_fuel_burned_kg: t.mass_fuel_burned_kg(),
            trajectory: TrajectorySeries {
                time_s: t.time_s.clone(),
                airspeed_m_s: t.airspeed_m_s.clone(),
                distance_m: t.distance_m.clone(),
                altitude_m: t.altitude_m.clone(),
                mass_kg: t.mass_kg.clone(),
                thrust_newtons: t.thrust_newtons.clone(),
                flight_path_rad: t.flight_path_rad.clone(),
                fuel_flow_kg_s: self.fuel.fuel_flow_kg_s.clone(),
                cumulative_fuel_kg: self.fuel.cumulative_fuel_kg.clone(),
                distance_to_go_m: self.distance_to_go_m.clone(),
            },
            baseline: BaselineSummary {
                throughput_per_s: self.baseline.throughput_per_s,
                fuel_kg: self.baseline.fuel_kg,
            },
            links: self
                .links
                .iter()
                .map(|link| LinkCountSummary {
                    link_count: link.link_count,
                    converged: link.sta_times.is_converged(),
                    sta_times_s: link.sta_times.value().clone(),
                    sta_distance_to_go_nm: link
                        .sta_distance_to_go_m
                        .iter()
                        .map(|&d| m_to_nm(d))
                        .collect(),
                    uncertainty_nm: link
                        .evaluation
                        .uncertainty
                        .position_m
                        .iter()
                        .map(|&x| m_to_nm(x))
                        .collect(),
                    correction_m_s: link.evaluation.uncertainty.correction_m_s.clone(),
                    max_uncertainty_nm: m_to_nm(link.max_uncertainty_m()),
                    throughput_per_s: link.throughput_per_s,
                    fuel_kg: link.evaluation.total_fuel_kg(),
                    link_throughput_per_s: link
                        .evaluation
                        .scored()
                        .map(|m| m.throughput_per_s)
                        .collect(),
                    link_fuel_kg: link.evaluation.scored().map(|m| m.fuel_kg).collect(),
                })
                .collect(),
        }
    }
}

/// Borrow the series the spacing analysis needs from a trajectory.
pub fn descent_profile(trajectory: &Trajectory) -> Result<DescentProfile<'_>, SpacingError> {
    DescentProfile::new(
        &trajectory.time_s,
        &trajectory.airspeed_m_s,
        &trajectory.altitude_m,
        &trajectory.thrust_newtons,
    )
}

/// Metrics of the whole trajectory treated as one link bounded by STAs at 0 and `t_f`.
pub fn baseline_metrics(
    profile: &DescentProfile<'_>,
    model: &PointMassModel,
    config: &DescentConfig,
) -> Result<LinkMetrics, PipelineError> {
    let sta_times = [0.0, config.scenario.horizon_s];
    let evaluation = evaluate_links(profile, model, &config.spacing, &sta_times)?;
    evaluation
        .metrics
        .first()
        .copied()
        .flatten()
        .ok_or(PipelineError::BaselineUnavailable)
}

/// Place STA waypoints for `link_count` links and score the resulting placement.
pub fn evaluate_link_count(
    link_count: usize,
    trajectory: &Trajectory,
    model: &PointMassModel,
    config: &DescentConfig,
    baseline: &LinkMetrics,
) -> Result<LinkCountResult, PipelineError> {
    let profile = descent_profile(trajectory)?;
    let sta_times = optimize_sta_waypoints(
        link_count,
        profile.end_time_s(),
        &profile,
        model,
        &config.spacing,
        &config.sta_solver,
    )?;
    let evaluation = evaluate_links(&profile, model, &config.spacing, sta_times.value())?;
    let throughput_per_s = evaluation
        .dominant_throughput()
        .unwrap_or(baseline.throughput_per_s);

    let total_distance = trajectory.distance_m.last().copied().unwrap_or(0.0);
    let sta_distance_to_go_m = sta_times
        .value()
        .iter()
        .map(|&t| {
            let flown = interp(t, &trajectory.time_s, &trajectory.distance_m).unwrap_or(0.0);
            total_distance - flown
        })
        .collect();

    info!(
        link_count,
        converged = sta_times.is_converged(),
        throughput = throughput_per_s,
        max_uncertainty_nm = m_to_nm(evaluation.uncertainty.max_position_m()),
        "link count evaluated"
    );

    Ok(LinkCountResult {
        link_count,
        sta_times,
        evaluation,
        throughput_per_s,
        sta_distance_to_go_m,
    })
}

/// Run the full pipeline for `config`.
pub fn run(config: &DescentConfig) -> Result<PipelineReport, PipelineError> {
    config.validate()?;
    let model = PointMassModel::new(&config.aircraft);

    let trajectory = cda_trajectory::solve(config)?;
    let nominal = trajectory.value();
    let fuel = fuel_profile(&model, nominal);
    let distance_to_go_m = distance_to_go(&nominal.distance_m);
    info!(
        converged = trajectory.is_converged(),
        total_fuel_kg = fuel.total_kg(),
        "nominal descent ready"
    );

    let profile = descent_profile(nominal)?;
    let baseline = baseline_metrics(&profile, &model, config)?;
    info!(
        throughput = baseline.throughput_per_s,
        fuel_kg = baseline.fuel_kg,
        "baseline evaluated"
    );

    let links = config
        .spacing
        .link_counts
        .iter()
        .map(|&count| evaluate_link_count(count, nominal, &model, config, &baseline))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PipelineReport {
        trajectory,
        fuel,
        distance_to_go_m,
        baseline,
        links,
    })
}
