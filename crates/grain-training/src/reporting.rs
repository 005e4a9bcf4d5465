//! Training artefacts: SVG learning curves, sample previews and JSON summaries.

use std::fs;
use std::path::{Path, PathBuf};

use grain_core::{ClassIndex, Error, Result, TrainingHistory};
use grain_dataset::{chw_to_rgb, ImageItem};
use serde::Serialize;

/// Chart styling constants
const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 500.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 80.0;
const MARGIN_LEFT: f64 = 80.0;

const COLOR_PRIMARY: &str = "#3498db";
const COLOR_SECONDARY: &str = "#e67e22";
const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

/// Tile edge length in the sample preview
const TILE_SIZE: f64 = 160.0;

/// Number of training images shown in the sample preview
pub const SAMPLE_COUNT: usize = 5;

/// A data point for a line chart
#[derive(Debug, Clone)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
}

/// A data series for charts
#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    pub points: Vec<DataPoint>,
    pub color: String,
}

impl DataSeries {
    /// One point per epoch, numbered from 1
    pub fn per_epoch(name: &str, values: &[f64], color: &str) -> Self {
        Self {
            name: name.to_string(),
            points: values
                .iter()
                .enumerate()
                .map(|(i, &y)| DataPoint { x: (i + 1) as f64, y })
                .collect(),
            color: color.to_string(),
        }
    }
}

/// How the y axis is scaled and labelled
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum YAxis {
    /// Values in [0, 1] shown as percentages
    Fraction,
    /// From 0 up to the largest value
    Auto,
}

/// Render a line chart as SVG
pub fn line_chart_svg(
    title: &str,
    x_label: &str,
    y_label: &str,
    series: &[DataSeries],
    y_axis: YAxis,
) -> String {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let (x_min, x_max, _, data_y_max) = find_ranges(series);
    let (x_min, x_max) = if x_max > x_min { (x_min, x_max) } else { (x_min - 1.0, x_min + 1.0) };
    let y_min = 0.0;
    let y_max = match y_axis {
        YAxis::Fraction => 1.0,
        YAxis::Auto if data_y_max.is_finite() && data_y_max > 0.0 => data_y_max * 1.1,
        YAxis::Auto => 1.0,
    };

    let scale_x = |x: f64| MARGIN_LEFT + ((x - x_min) / (x_max - x_min)) * plot_width;
    let scale_y = |y: f64| {
        MARGIN_TOP + plot_height - ((y.clamp(y_min, y_max) - y_min) / (y_max - y_min)) * plot_height
    };

    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        CHART_WIDTH, CHART_HEIGHT, CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        CHART_WIDTH / 2.0, COLOR_TEXT, escape_xml(title)
    ));

    // Grid lines
    for i in 0..=5 {
        let value = y_min + (i as f64 / 5.0) * (y_max - y_min);
        let y = scale_y(value);
        let tick = match y_axis {
            YAxis::Fraction => format!("{:.0}%", value * 100.0),
            YAxis::Auto => format!("{:.2}", value),
        };

        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT, y, MARGIN_LEFT + plot_width, y, COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            MARGIN_LEFT - 10.0, y + 4.0, COLOR_TEXT, tick
        ));
    }

    // Axes
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT,
        MARGIN_TOP + plot_height,
        MARGIN_LEFT + plot_width,
        MARGIN_TOP + plot_height,
        COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, MARGIN_TOP + plot_height, COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0, CHART_HEIGHT - 20.0, COLOR_TEXT, escape_xml(x_label)
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {})">{}</text>"#,
        CHART_HEIGHT / 2.0, COLOR_TEXT, CHART_HEIGHT / 2.0, escape_xml(y_label)
    ));

    for series_data in series {
        if series_data.points.is_empty() {
            continue;
        }

        let path = series_data
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let command = if i == 0 { "M" } else { "L" };
                format!("{} {} {}", command, scale_x(p.x), scale_y(p.y))
            })
            .collect::<Vec<_>>()
            .join(" ");
        svg.push_str(&format!(
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="3"/>"#,
            path, series_data.color
        ));

        for point in &series_data.points {
            svg.push_str(&format!(
                r#"<circle cx="{}" cy="{}" r="4" fill="{}" stroke="white" stroke-width="2"/>"#,
                scale_x(point.x),
                scale_y(point.y),
                series_data.color
            ));
        }
    }

    // X-axis tick labels from the first series
    if let Some(first) = series.first() {
        for point in &first.points {
            svg.push_str(&format!(
                r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{}">{:.0}</text>"#,
                scale_x(point.x), MARGIN_TOP + plot_height + 20.0, COLOR_TEXT, point.x
            ));
        }
    }

    // Legend
    let mut legend_y = MARGIN_TOP + 10.0;
    for series_data in series {
        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="15" height="15" fill="{}"/>"#,
            CHART_WIDTH - MARGIN_RIGHT - 140.0, legend_y, series_data.color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            CHART_WIDTH - MARGIN_RIGHT - 120.0,
            legend_y + 12.0,
            COLOR_TEXT,
            escape_xml(&series_data.name)
        ));
        legend_y += 25.0;
    }

    svg.push_str("</svg>");
    svg
}

/// Paths of the two learning-curve charts
#[derive(Debug, Clone)]
pub struct HistoryCharts {
    pub accuracy: PathBuf,
    pub loss: PathBuf,
}

/// Writes `accuracy.svg` and `loss.svg`, each with a training and a validation series
pub fn save_history_charts(history: &TrainingHistory, output_dir: &Path) -> Result<HistoryCharts> {
    fs::create_dir_all(output_dir)?;

    let accuracy = output_dir.join("accuracy.svg");
    fs::write(
        &accuracy,
        line_chart_svg(
            "Training and Validation Accuracy",
            "Epoch",
            "Accuracy",
            &[
                DataSeries::per_epoch("Training accuracy", &history.accuracy, COLOR_PRIMARY),
                DataSeries::per_epoch(
                    "Validation accuracy",
                    &history.val_accuracy,
                    COLOR_SECONDARY,
                ),
            ],
            YAxis::Fraction,
        ),
    )?;

    let loss = output_dir.join("loss.svg");
    fs::write(
        &loss,
        line_chart_svg(
            "Training and Validation Loss",
            "Epoch",
            "Loss",
            &[
                DataSeries::per_epoch("Training loss", &history.loss, COLOR_PRIMARY),
                DataSeries::per_epoch("Validation loss", &history.val_loss, COLOR_SECONDARY),
            ],
            YAxis::Auto,
        ),
    )?;

    Ok(HistoryCharts { accuracy, loss })
}

/// Saves up to [`SAMPLE_COUNT`] images as PNG tiles plus `samples.svg`,
/// a single row of the tiles titled with their class names.
///
/// Returns the path of the SVG preview.
pub fn save_sample_grid(
    items: &[ImageItem],
    classes: &ClassIndex,
    image_size: usize,
    rescale: f32,
    output_dir: &Path,
) -> Result<PathBuf> {
    let samples_dir = output_dir.join("samples");
    fs::create_dir_all(&samples_dir)?;

    let shown = &items[..items.len().min(SAMPLE_COUNT)];
    let width = TILE_SIZE * shown.len().max(1) as f64 + 20.0 * (shown.len() + 1) as f64;
    let height = TILE_SIZE + 70.0;

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {width} {height}" width="{width}" height="{height}"><rect width="{width}" height="{height}" fill="white"/>"#
    );

    for (i, item) in shown.iter().enumerate() {
        let class_name = classes
            .name(item.label)
            .ok_or_else(|| Error::Model(format!("Sample label {} has no class name", item.label)))?;

        let tile = chw_to_rgb(&item.image, image_size, rescale)?;
        let file_name = format!("sample_{i}.png");
        tile.save(samples_dir.join(&file_name))?;

        let x = 20.0 + i as f64 * (TILE_SIZE + 20.0);
        svg.push_str(&format!(
            r#"<text x="{}" y="30" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
            x + TILE_SIZE / 2.0,
            COLOR_TEXT,
            escape_xml(class_name)
        ));
        svg.push_str(&format!(
            r#"<image href="samples/{file_name}" x="{x}" y="45" width="{TILE_SIZE}" height="{TILE_SIZE}"/>"#
        ));
    }

    svg.push_str("</svg>");
    let path = output_dir.join("samples.svg");
    fs::write(&path, svg)?;
    Ok(path)
}

/// Pretty-printed JSON artefact
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn find_ranges(series: &[DataSeries]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;

    for s in series {
        for p in &s.points {
            x_min = x_min.min(p.x);
            x_max = x_max.max(p.x);
            y_min = y_min.min(p.y);
            y_max = y_max.max(p.y);
        }
    }

    if !x_min.is_finite() {
        return (0.0, 1.0, 0.0, 1.0);
    }
    (x_min, x_max, y_min, y_max)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
