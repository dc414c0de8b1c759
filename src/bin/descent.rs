use std::path::PathBuf;

use clap::Parser;
use sta_descent::config::{DescentConfig, load_config};
use sta_descent::export::{archive, table};
use sta_descent::pipeline::{self, PipelineReport};
use sta_descent::units::{m_to_ft, m_to_nm};
use tracing_subscriber::EnvFilter;

/// Optimize a continuous descent and evaluate STA waypoint placements along it.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Fuel-optimal CDA trajectory with STA throughput analysis"
)]
struct Cli {
    /// TOML or YAML configuration (defaults to the built-in reference scenario)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory receiving the JSON archive and the trajectory CSV
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Link counts to evaluate, overriding the configuration (e.g. 1,2,3)
    #[arg(long, value_delimiter = ',')]
    link_counts: Option<Vec<usize>>,

    /// Log level for the planner crates when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print the report without writing any files
    #[arg(long, default_value_t = false)]
    no_export: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DescentConfig::default(),
    };
    if let Some(counts) = cli.link_counts.clone() {
        config.spacing.link_counts = counts;
    }

    let report = pipeline::run(&config)?;
    print_report(&report);

    if !cli.no_export {
        let archive_path = cli.output_dir.join("cda_results.json");
        let csv_path = cli.output_dir.join("cda_trajectory.csv");
        let archive = report.to_archive();
        archive::write_archive(&archive_path, &archive)?;
        table::write_trajectory_csv(&csv_path, &archive.trajectory)?;
        println!("Archive written to {}", archive_path.display());
        println!("Trajectory table written to {}", csv_path.display());
    }

    Ok(())
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!(
            "sta_descent={level},cda_trajectory={level},cda_spacing={level}"
        ))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn print_report(report: &PipelineReport) {
    println!("=== Descent ===");
    if let Some(failure) = report.trajectory.report() {
        println!("Trajectory solver did not converge ({failure}); using fallback profile");
    }
    let nominal = report.nominal();
    if let (Some(&h), Some(&d)) = (nominal.altitude_m.last(), nominal.distance_m.last()) {
        println!(
            "Final Altitude (ft): {:.0}, Distance Flown (NM): {:.2}",
            m_to_ft(h),
            m_to_nm(d)
        );
    }
    println!("Total Fuel (kg): {:.3}", report.fuel.total_kg());
    println!(
        "Mass-integrated Fuel (kg): {:.3}",
        nominal.mass_fuel_burned_kg()
    );
    println!("Baseline Fuel (kg): {:.3}", report.baseline.fuel_kg);
    println!(
        "Baseline Throughput (aircraft/s): {:.6}",
        report.baseline.throughput_per_s
    );

    println!("=== STA Links ===");
    for link in &report.links {
        let n = link.link_count;
        let degraded = if link.sta_times.is_converged() {
            ""
        } else {
            " (evenly spaced fallback)"
        };
        println!(
            "Max Path Uncertainty (NM) for N={n}: {:.4}",
            m_to_nm(link.max_uncertainty_m())
        );
        println!(
            "Throughput (aircraft/s) for N={n}: {:.6}",
            link.throughput_per_s
        );
        println!(
            "STA Times for N={n}: {}{degraded}",
            format_series(link.sta_times.value(), 1)
        );
        let distances: Vec<f64> = link
            .sta_distance_to_go_m
            .iter()
            .map(|&d| m_to_nm(d))
            .collect();
        println!(
            "STA Distances to go (NM) for N={n}: {}",
            format_series(&distances, 2)
        );
    }
}

fn format_series(values: &[f64], precision: usize) -> String {
    let parts: Vec<String> = values
        .iter()
        .map(|v| format!("{v:.precision$}"))
        .collect();
    format!("[{}]", parts.join(", "))
}
