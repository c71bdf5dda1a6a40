//! SVG Chart Generator for Evaluation Plots
//!
//! Renders the two plots produced after a training run:
//! - predicted vs. true attribute scatter with the least-squares regression line
//! - per-epoch R² history for the train and validation splits
//!
//! Charts are plain SVG strings so no plotting backend is required.

use std::fs;
use std::path::Path;

use crate::utils::metrics::linear_fit;

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 500.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 80.0;
const MARGIN_LEFT: f64 = 80.0;

pub const COLOR_PRIMARY: &str = "#3498db";
pub const COLOR_SECONDARY: &str = "#2ecc71";
pub const COLOR_TERTIARY: &str = "#e74c3c";
const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

/// A data point for a chart
#[derive(Debug, Clone, Copy)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
}

/// A named data series
#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    pub points: Vec<DataPoint>,
    pub color: String,
}

impl DataSeries {
    /// Series of `(epoch, value)` points, skipping non-finite values
    pub fn from_history(name: &str, values: &[f64], color: &str) -> Self {
        let points = values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(|(epoch, &v)| DataPoint {
                x: epoch as f64,
                y: v,
            })
            .collect();

        Self {
            name: name.to_string(),
            points,
            color: color.to_string(),
        }
    }
}

/// Linear mapping from data space to plot pixels
struct Frame {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl Frame {
    fn plot_width() -> f64 {
        CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT
    }

    fn plot_height() -> f64 {
        CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM
    }

    fn px(&self, x: f64) -> f64 {
        let span = (self.x_max - self.x_min).max(f64::EPSILON);
        MARGIN_LEFT + (x - self.x_min) / span * Self::plot_width()
    }

    fn py(&self, y: f64) -> f64 {
        let span = (self.y_max - self.y_min).max(f64::EPSILON);
        MARGIN_TOP + Self::plot_height() - (y - self.y_min) / span * Self::plot_height()
    }
}

fn open_svg(svg: &mut String, title: &str) {
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
        CHART_WIDTH / 2.0,
        COLOR_TEXT,
        escape_xml(title)
    ));
}

fn draw_axes(svg: &mut String, frame: &Frame, x_label: &str, y_label: &str) {
    let plot_width = Frame::plot_width();
    let plot_height = Frame::plot_height();

    for i in 0..=5 {
        let value = frame.y_min + (i as f64 / 5.0) * (frame.y_max - frame.y_min);
        let y = frame.py(value);
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT,
            y,
            MARGIN_LEFT + plot_width,
            y,
            COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.2}</text>"#,
            MARGIN_LEFT - 10.0,
            y + 4.0,
            COLOR_TEXT,
            value
        ));

        let x_value = frame.x_min + (i as f64 / 5.0) * (frame.x_max - frame.x_min);
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{}">{:.2}</text>"#,
            frame.px(x_value),
            MARGIN_TOP + plot_height + 20.0,
            COLOR_TEXT,
            x_value
        ));
    }

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
        MARGIN_LEFT,
        MARGIN_TOP,
        MARGIN_LEFT,
        MARGIN_TOP + plot_height,
        COLOR_AXIS
    ));

    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0,
        CHART_HEIGHT - 20.0,
        COLOR_TEXT,
        escape_xml(x_label)
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {})">{}</text>"#,
        CHART_HEIGHT / 2.0,
        COLOR_TEXT,
        CHART_HEIGHT / 2.0,
        escape_xml(y_label)
    ));
}

fn draw_legend(svg: &mut String, entries: &[(&str, &str)]) {
    let mut legend_y = MARGIN_TOP + 10.0;
    for (name, color) in entries {
        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="15" height="15" fill="{}"/>"#,
            CHART_WIDTH - MARGIN_RIGHT - 160.0,
            legend_y,
            color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            CHART_WIDTH - MARGIN_RIGHT - 140.0,
            legend_y + 12.0,
            COLOR_TEXT,
            escape_xml(name)
        ));
        legend_y += 25.0;
    }
}

/// Render a line chart (used for R² per epoch) as an SVG string.
///
/// The y axis spans [0, 1] unless a value falls outside it.
pub fn render_line_chart(title: &str, x_label: &str, y_label: &str, series: &[DataSeries]) -> String {
    let (x_min, x_max, y_min, y_max) = find_ranges(series.iter().flat_map(|s| s.points.iter()));
    let frame = Frame {
        x_min: if x_min.is_finite() { x_min } else { 0.0 },
        x_max: if x_max.is_finite() { x_max.max(x_min + 1.0) } else { 1.0 },
        y_min: y_min.min(0.0),
        y_max: if y_max.is_finite() { y_max.max(1.0) } else { 1.0 },
    };

    let mut svg = String::new();
    open_svg(&mut svg, title);
    draw_axes(&mut svg, &frame, x_label, y_label);

    for series_data in series {
        if series_data.points.is_empty() {
            continue;
        }

        let mut path = String::new();
        for (i, point) in series_data.points.iter().enumerate() {
            let command = if i == 0 { "M" } else { " L" };
            path.push_str(&format!("{} {} {}", command, frame.px(point.x), frame.py(point.y)));
        }
        svg.push_str(&format!(
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="3"/>"#,
            path, series_data.color
        ));

        for point in &series_data.points {
            svg.push_str(&format!(
                r#"<circle cx="{}" cy="{}" r="4" fill="{}" stroke="white" stroke-width="2"/>"#,
                frame.px(point.x),
                frame.py(point.y),
                series_data.color
            ));
        }
    }

    let legend: Vec<(&str, &str)> = series
        .iter()
        .map(|s| (s.name.as_str(), s.color.as_str()))
        .collect();
    draw_legend(&mut svg, &legend);

    svg.push_str("</svg>");
    svg
}

/// Render predicted-vs-true scatter with its regression line as an SVG string.
pub fn render_scatter_chart(title: &str, truth: &[f32], predicted: &[f32]) -> String {
    let points: Vec<DataPoint> = truth
        .iter()
        .zip(predicted)
        .filter(|(t, p)| t.is_finite() && p.is_finite())
        .map(|(&t, &p)| DataPoint {
            x: t as f64,
            y: p as f64,
        })
        .collect();

    let (x_min, x_max, y_min, y_max) = find_ranges(points.iter());
    let lo = x_min.min(y_min);
    let hi = x_max.max(y_max);
    let (lo, hi) = if lo.is_finite() && hi.is_finite() && hi > lo {
        (lo, hi)
    } else {
        (0.0, 1.0)
    };
    let frame = Frame {
        x_min: lo,
        x_max: hi,
        y_min: lo,
        y_max: hi,
    };

    let fit = linear_fit(truth, predicted);
    let mut svg = String::new();
    open_svg(
        &mut svg,
        &format!("{} (r2 = {:.3})", title, fit.r_squared()),
    );
    draw_axes(&mut svg, &frame, "True score", "Predicted score");

    for point in &points {
        svg.push_str(&format!(
            r#"<circle cx="{}" cy="{}" r="3" fill="{}" fill-opacity="0.6"/>"#,
            frame.px(point.x),
            frame.py(point.y),
            COLOR_PRIMARY
        ));
    }

    // identity reference
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1" stroke-dasharray="6 4"/>"#,
        frame.px(lo),
        frame.py(lo),
        frame.px(hi),
        frame.py(hi),
        COLOR_AXIS
    ));

    if fit.slope.is_finite() && fit.intercept.is_finite() {
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
            frame.px(lo),
            frame.py(fit.predict(lo)),
            frame.px(hi),
            frame.py(fit.predict(hi)),
            COLOR_TERTIARY
        ));
    }

    draw_legend(
        &mut svg,
        &[("samples", COLOR_PRIMARY), ("regression", COLOR_TERTIARY)],
    );

    svg.push_str("</svg>");
    svg
}

/// Write a line chart to `output_path`
pub fn generate_line_chart(
    title: &str,
    x_label: &str,
    y_label: &str,
    series: &[DataSeries],
    output_path: &Path,
) -> std::io::Result<()> {
    fs::write(output_path, render_line_chart(title, x_label, y_label, series))
}

/// Write a scatter chart to `output_path`
pub fn generate_scatter_chart(
    title: &str,
    truth: &[f32],
    predicted: &[f32],
    output_path: &Path,
) -> std::io::Result<()> {
    fs::write(output_path, render_scatter_chart(title, truth, predicted))
}

fn find_ranges<'a>(points: impl Iterator<Item = &'a DataPoint>) -> (f64, f64, f64, f64) {
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;

    for p in points {
        x_min = x_min.min(p.x);
        x_max = x_max.max(p.x);
        y_min = y_min.min(p.y);
        y_max = y_max.max(p.y);
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_history_series_skips_nan() {
        let series = DataSeries::from_history("validate", &[0.1, f64::NAN, 0.3], COLOR_PRIMARY);
        assert_eq!(series.points.len(), 2);
        assert_eq!(series.points[1].x, 2.0);
    }

    #[test]
    fn test_line_chart_contains_series() {
        let series = vec![
            DataSeries::from_history("train", &[0.1, 0.2, 0.4], COLOR_PRIMARY),
            DataSeries::from_history("validate", &[0.05, 0.15, 0.2], COLOR_SECONDARY),
        ];
        let svg = render_line_chart("R2 & epochs", "Epoch", "r2", &series);
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<path").count(), 2);
        assert!(svg.contains("R2 &amp; epochs"));
    }

    #[test]
    fn test_scatter_chart_has_regression_line() {
        let truth = [0.0, 0.25, 0.5, 0.75, 1.0];
        let predicted = [0.1, 0.2, 0.55, 0.7, 0.9];
        let svg = render_scatter_chart("Validate", &truth, &predicted);
        assert_eq!(svg.matches("<circle").count(), 5);
        assert!(svg.contains(COLOR_TERTIARY));
    }

    #[test]
    fn test_scatter_chart_degenerate_input() {
        let svg = render_scatter_chart("Empty", &[], &[]);
        assert!(svg.contains("</svg>"));
    }

    #[test]
    fn test_chart_written_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.svg");
        let series = vec![DataSeries::from_history("train", &[0.2, 0.3], COLOR_PRIMARY)];
        generate_line_chart("History", "Epoch", "r2", &series, &path).unwrap();
        assert!(path.exists());
    }
}
