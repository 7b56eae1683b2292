//! SVG rendering of run results.
//!
//! One chart per family: component concentration profiles (with measured points
//! overlaid when concentration data is attached), complementary states, and the
//! absorbance profiles against wavelength for spectral runs.

use crate::data::ConcentrationData;
use crate::error::{KinFitError, Result};
use crate::results::ResultsObject;
use ndarray::{Array1, Array2};
use plotters::prelude::*;
use std::path::{Path, PathBuf};

fn plot_error<E: std::fmt::Display>(e: E) -> KinFitError {
    KinFitError::ComputationError(format!("plot rendering failed: {}", e))
}

/// Padded (min, max) range over a set of values; degenerate ranges get unit width.
fn padded_range<'a>(values: impl Iterator<Item = &'a f64>) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in values {
        if v.is_finite() {
            min = min.min(v);
            max = max.max(v);
        }
    }
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if min == max {
        return (min - 1.0, max + 1.0);
    }
    let pad = (max - min) * 0.05;
    (min - pad, max + pad)
}

/// Draw one multi-series line chart of `matrix` columns against `index`.
fn line_chart(
    path: &Path,
    title: &str,
    x_label: &str,
    y_label: &str,
    index: &Array1<f64>,
    columns: &[String],
    matrix: &Array2<f64>,
    overlay: Option<(&ConcentrationData, &[String])>,
) -> Result<()> {
    let root = SVGBackend::new(path, (900, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let (x_min, x_max) = padded_range(index.iter());
    let mut all_values: Vec<f64> = matrix.iter().copied().collect();
    if let Some((data, _)) = overlay {
        all_values.extend(data.values().iter().copied().filter(|v| !v.is_nan()));
    }
    let (y_min, y_max) = padded_range(all_values.iter());

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc(x_label)
        .y_desc(y_label)
        .draw()
        .map_err(plot_error)?;

    for (col, name) in columns.iter().enumerate() {
        let series: Vec<(f64, f64)> = index
            .iter()
            .zip(matrix.column(col).iter())
            .map(|(&x, &y)| (x, y))
            .collect();
        let color = Palette99::pick(col);
        chart
            .draw_series(LineSeries::new(series, &color))
            .map_err(plot_error)?
            .label(name.clone())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], &Palette99::pick(col))
            });
    }

    if let Some((data, model_columns)) = overlay {
        for (data_col, name) in data.components().iter().enumerate() {
            let Some(col) = model_columns.iter().position(|c| c == name) else {
                continue;
            };
            let color = Palette99::pick(col);
            let points: Vec<(f64, f64)> = data
                .times()
                .iter()
                .zip(data.values().column(data_col).iter())
                .filter(|(_, v)| !v.is_nan())
                .map(|(&t, &v)| (t, v))
                .collect();
            chart
                .draw_series(
                    points
                        .into_iter()
                        .map(move |p| Circle::new(p, 3, color.filled())),
                )
                .map_err(plot_error)?;
        }
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    Ok(())
}

/// Render all charts of a results object under `dir`; returns the files written.
pub fn render_results(
    name: &str,
    results: &ResultsObject,
    concentration: Option<&ConcentrationData>,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let simulation = &results.simulation;
    let components: Vec<String> = simulation.components().to_vec();

    let z_path = dir.join(format!("{}_Z.svg", name));
    line_chart(
        &z_path,
        &format!("{}: concentration profiles", name),
        "time",
        "concentration",
        simulation.times(),
        &components,
        simulation.z(),
        concentration.map(|d| (d, components.as_slice())),
    )?;
    written.push(z_path);

    if !simulation.states().is_empty() {
        let x_path = dir.join(format!("{}_X.svg", name));
        line_chart(
            &x_path,
            &format!("{}: complementary states", name),
            "time",
            "state value",
            simulation.times(),
            simulation.states(),
            simulation.x(),
            None,
        )?;
        written.push(x_path);
    }

    if let (Some(s), Some(wavelengths)) = (&results.s, &results.wavelengths) {
        let s_path = dir.join(format!("{}_S.svg", name));
        line_chart(
            &s_path,
            &format!("{}: absorbance profiles", name),
            "wavelength",
            "absorbance",
            wavelengths,
            &components,
            s,
            None,
        )?;
        written.push(s_path);
    }

    Ok(written)
}
