use clap::Parser;
use plotters::prelude::*;
use sta_descent::export::archive::{ResultArchive, read_archive};
use sta_descent::units::{kg_s_to_kg_min, m_to_nm};
use std::fs;
use std::ops::Range;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Render the four-panel descent figure from a result archive"
)]
struct Cli {
    #[arg(long)]
    input: PathBuf,
    #[arg(long, default_value = "results/cda_results.png")]
    output: PathBuf,
    #[arg(long, default_value_t = 1200)]
    width: u32,
    #[arg(long, default_value_t = 800)]
    height: u32,
}

const SERIES_COLORS: [RGBColor; 6] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
];

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let archive = read_archive(&cli.input)?;
    if archive.trajectory.time_s.is_empty() {
        return Err(anyhow::anyhow!("Archive holds an empty trajectory"));
    }

    if let Some(parent) = cli.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let output_str = cli
        .output
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Output path contains invalid UTF-8"))?;
    let root = BitMapBackend::new(output_str, (cli.width, cli.height)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((2, 2));

    let font_family = select_font_family();
    let caption_font = FontDesc::new(font_family, 20.0, FontStyle::Bold);
    let label_font = FontDesc::new(font_family, 14.0, FontStyle::Normal);

    // Distance to go is drawn negative so the approach reads left to right.
    let to_go_nm: Vec<f64> = archive
        .trajectory
        .distance_to_go_m
        .iter()
        .map(|&d| -m_to_nm(d))
        .collect();
    let fuel_flow_kg_min: Vec<f64> = archive
        .trajectory
        .fuel_flow_kg_s
        .iter()
        .map(|&f| kg_s_to_kg_min(f))
        .collect();

    draw_lines(
        &panels[0],
        "Fuel Flow Rate vs. Distance to Go",
        "Fuel Flow Rate (kg/min)",
        &[(String::new(), pairs(&to_go_nm, &fuel_flow_kg_min))],
        &caption_font,
        &label_font,
    )?;
    draw_lines(
        &panels[1],
        "Total Fuel Consumption vs. Distance to Go",
        "Total Fuel Consumption (kg)",
        &[(
            String::new(),
            pairs(&to_go_nm, &archive.trajectory.cumulative_fuel_kg),
        )],
        &caption_font,
        &label_font,
    )?;

    let uncertainty: Vec<(String, Vec<(f64, f64)>)> = archive
        .links
        .iter()
        .map(|link| {
            (
                format!("N = {}", link.link_count),
                pairs(&to_go_nm, &link.uncertainty_nm),
            )
        })
        .collect();
    draw_lines(
        &panels[2],
        "Path Uncertainty vs. Distance to Go",
        "Path Uncertainty (NM)",
        &uncertainty,
        &caption_font,
        &label_font,
    )?;

    draw_throughput(&panels[3], &archive, &caption_font, &label_font)?;

    root.present()?;
    println!("Figure written to {}", cli.output.display());
    Ok(())
}

fn pairs(xs: &[f64], ys: &[f64]) -> Vec<(f64, f64)> {
    xs.iter().copied().zip(ys.iter().copied()).collect()
}

fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() || !hi.is_finite() {
        return 0.0..1.0;
    }
    let pad = ((hi - lo) * 0.05).max(hi.abs().max(1e-9) * 1e-3);
    (lo - pad)..(hi + pad)
}

fn draw_lines<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    caption: &str,
    y_desc: &str,
    series: &[(String, Vec<(f64, f64)>)],
    caption_font: &FontDesc<'_>,
    label_font: &FontDesc<'_>,
) -> anyhow::Result<()>
where
    DB::ErrorType: 'static,
{
    let x_range = padded_range(series.iter().flat_map(|(_, p)| p.iter().map(|&(x, _)| x)));
    let y_range = padded_range(series.iter().flat_map(|(_, p)| p.iter().map(|&(_, y)| y)));

    let mut chart = ChartBuilder::on(area)
        .margin(12)
        .caption(caption, caption_font.clone())
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;
    chart
        .configure_mesh()
        .x_desc("Distance to Go (NM)")
        .y_desc(y_desc)
        .label_style(label_font.clone())
        .draw()?;

    let labelled = series.iter().any(|(label, _)| !label.is_empty());
    for (idx, (label, points)) in series.iter().enumerate() {
        let color = SERIES_COLORS[idx % SERIES_COLORS.len()];
        let drawn = chart.draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))?;
        if !label.is_empty() {
            drawn.label(label.as_str()).legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 16, y)], color.stroke_width(2))
            });
        }
    }
    if labelled {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font(label_font.clone())
            .draw()?;
    }
    Ok(())
}

fn draw_throughput<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    archive: &ResultArchive,
    caption_font: &FontDesc<'_>,
    label_font: &FontDesc<'_>,
) -> anyhow::Result<()>
where
    DB::ErrorType: 'static,
{
    let optimized: Vec<(f64, f64)> = archive
        .links
        .iter()
        .max_by_key(|link| link.link_count)
        .map(|link| pairs(&link.link_fuel_kg, &link.link_throughput_per_s))
        .unwrap_or_default();
    let baseline = (archive.baseline.fuel_kg, archive.baseline.throughput_per_s);

    let all = || optimized.iter().copied().chain(std::iter::once(baseline));
    let x_range = padded_range(all().map(|(x, _)| x));
    let y_range = padded_range(all().map(|(_, y)| y));

    let mut chart = ChartBuilder::on(area)
        .margin(12)
        .caption("Throughput vs. Fuel Consumption", caption_font.clone())
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range, y_range)?;
    chart
        .configure_mesh()
        .x_desc("Fuel Consumption per Link (kg)")
        .y_desc("Throughput (aircraft/s)")
        .label_style(label_font.clone())
        .y_label_formatter(&|v| format!("{v:.4}"))
        .draw()?;

    chart
        .draw_series(
            optimized
                .iter()
                .map(|&p| Circle::new(p, 5, BLUE.filled())),
        )?
        .label("Optimized STAs")
        .legend(|(x, y)| Circle::new((x + 8, y), 5, BLUE.filled()));
    chart
        .draw_series(std::iter::once(Circle::new(baseline, 6, RED.filled())))?
        .label("Baseline (No STAs)")
        .legend(|(x, y)| Circle::new((x + 8, y), 5, RED.filled()));
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(label_font.clone())
        .draw()?;
    Ok(())
}

fn select_font_family() -> FontFamily<'static> {
    if cfg!(target_os = "macos") {
        FontFamily::Name("Helvetica")
    } else if cfg!(target_os = "windows") {
        FontFamily::Name("Arial")
    } else {
        FontFamily::SansSerif
    }
}
