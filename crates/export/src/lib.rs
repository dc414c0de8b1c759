//! Export helpers for JSON archives and CSV tables.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Create a writer for the target path, handling stdout (`-`) by convention.
pub fn writer_for_path(path: &Path) -> io::Result<Box<dyn Write>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    Ok(Box::new(BufWriter::new(file)))
}

pub mod archive {
    use serde::{Deserialize, Serialize};
    use std::fs::File;
    use std::io::{self, BufReader, Write};
    use std::path::Path;

    /// Nominal trajectory and its fuel bookkeeping, one entry per grid node.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TrajectorySeries {
        pub time_s: Vec<f64>,
        pub airspeed_m_s: Vec<f64>,
        pub distance_m: Vec<f64>,
        pub altitude_m: Vec<f64>,
        pub mass_kg: Vec<f64>,
        pub thrust_newtons: Vec<f64>,
        pub flight_path_rad: Vec<f64>,
        pub fuel_flow_kg_s: Vec<f64>,
        pub cumulative_fuel_kg: Vec<f64>,
        pub distance_to_go_m: Vec<f64>,
    }

    /// Two-waypoint reference evaluation.
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct BaselineSummary {
        pub throughput_per_s: f64,
        pub fuel_kg: f64,
    }

    /// Results for one evaluated link count.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct LinkCountSummary {
        pub link_count: usize,
        pub converged: bool,
        pub sta_times_s: Vec<f64>,
        pub sta_distance_to_go_nm: Vec<f64>,
        pub uncertainty_nm: Vec<f64>,
        pub correction_m_s: Vec<f64>,
        pub max_uncertainty_nm: f64,
        /// Dominant link throughput, or the baseline when no link was scoreable.
        pub throughput_per_s: f64,
        pub fuel_kg: f64,
        /// Throughput of each scoreable link, in STA order.
        pub link_throughput_per_s: Vec<f64>,
        pub link_fuel_kg: Vec<f64>,
    }

    /// Everything a run produces, keyed by name for offline reuse.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ResultArchive {
        pub generated_at: String,
        pub trajectory_converged: bool,
        pub total_fuel_kg: f64,
        pub mass_fuel_burned_kg: f64,
        pub trajectory: TrajectorySeries,
        pub baseline: BaselineSummary,
        pub links: Vec<LinkCountSummary>,
    }

    /// RFC 3339 timestamp of the current UTC time.
    pub fn timestamp() -> String {
        chrono::Utc::now().to_rfc3339()
    }

    /// Write the archive as pretty-printed JSON; `-` writes to stdout.
    pub fn write_archive(path: &Path, archive: &ResultArchive) -> io::Result<()> {
        let mut writer = super::writer_for_path(path)?;
        serde_json::to_writer_pretty(&mut writer, archive)?;
        writeln!(writer)?;
        writer.flush()
    }

    pub fn read_archive(path: &Path) -> io::Result<ResultArchive> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

pub mod table {
    use serde::Serialize;
    use std::io;
    use std::path::Path;

    use crate::archive::TrajectorySeries;

    /// CSV row emitted by the trajectory exporter.
    #[derive(Debug, Clone, Serialize)]
    pub struct Record {
        pub time_s: f64,
        pub airspeed_m_s: f64,
        pub distance_m: f64,
        pub altitude_m: f64,
        pub mass_kg: f64,
        pub thrust_newtons: f64,
        pub flight_path_rad: f64,
        pub fuel_flow_kg_s: f64,
        pub cumulative_fuel_kg: f64,
        pub distance_to_go_m: f64,
    }

    /// Rows of `series`, truncated to its shortest column.
    pub fn records(series: &TrajectorySeries) -> Vec<Record> {
        let n = [
            series.time_s.len(),
            series.airspeed_m_s.len(),
            series.distance_m.len(),
            series.altitude_m.len(),
            series.mass_kg.len(),
            series.thrust_newtons.len(),
            series.flight_path_rad.len(),
            series.fuel_flow_kg_s.len(),
            series.cumulative_fuel_kg.len(),
            series.distance_to_go_m.len(),
        ]
        .into_iter()
        .min()
        .unwrap_or(0);

        (0..n)
            .map(|i| Record {
                time_s: series.time_s[i],
                airspeed_m_s: series.airspeed_m_s[i],
                distance_m: series.distance_m[i],
                altitude_m: series.altitude_m[i],
                mass_kg: series.mass_kg[i],
                thrust_newtons: series.thrust_newtons[i],
                flight_path_rad: series.flight_path_rad[i],
                fuel_flow_kg_s: series.fuel_flow_kg_s[i],
                cumulative_fuel_kg: series.cumulative_fuel_kg[i],
                distance_to_go_m: series.distance_to_go_m[i],
            })
            .collect()
    }

    /// Write the trajectory table with a header row; `-` writes to stdout.
    pub fn write_trajectory_csv(path: &Path, series: &TrajectorySeries) -> io::Result<()> {
        let mut writer = csv::Writer::from_writer(super::writer_for_path(path)?);
        for record in records(series) {
            writer.serialize(record)?;
        }
        writer.flush()
    }
}
