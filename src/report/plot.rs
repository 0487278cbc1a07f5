//! Log-log SVG plots.

use std::{fs::File, io::{BufWriter, Write}, path::Path};

use anyhow::{ensure, Context, Result};

const WIDTH: f64 = 600.0;
const HEIGHT: f64 = 600.0;
const MARGIN: f64 = 60.0;

pub(crate) struct PlotWriter {
    writer: BufWriter<File>,
}

/// Implement std::io::Write so `write!` / `writeln!` work.
impl Write for PlotWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> { self.writer.write(buf) }

    fn flush(&mut self) -> std::io::Result<()> { self.writer.flush() }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> { self.writer.write_all(buf) }
}

impl PlotWriter {
    /// Create a new plot writer to a file path.
    pub(crate) fn new(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("[report::plot] Failed to create {}", path.display()))?;

        Ok(Self { writer: BufWriter::new(file) })
    }

    /// Write the SVG header, including the XML declaration and opening tag.
    fn write_header(&mut self) -> Result<()> {
        writeln!(self, r##"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"##)?;
        writeln!(
            self,
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">"##
        )?;
        writeln!(self, r##"<rect width="100%" height="100%" fill="#ffffff"/>"##)?;
        Ok(())
    }

    /// Write SVG styles for plot marks.
    fn write_styles(&mut self) -> Result<()> {
        writeln!(self, r##"<defs>
<style>
    .pt {{ fill: #2563eb; fill-opacity: 0.6; }}
    .ident {{ stroke: #111827; stroke-width: 1; }}
    .axis {{ font: 14px sans-serif; fill: #111827; }}
    .frame {{ fill: none; stroke: #9ca3af; stroke-width: 1; }}
</style>
</defs>"##)?;
        Ok(())
    }

    /// Write the closing </svg> tag.
    fn write_footer(&mut self) -> Result<()> {
        writeln!(self, "</svg>")?;
        Ok(())
    }
}

/// Pixel position of `value` on a log axis spanning `lo..hi`.
fn log_scale(value: f64, lo: f64, hi: f64) -> f64 {
    (value.ln() - lo.ln()) / (hi.ln() - lo.ln()) * (WIDTH - 2.0 * MARGIN)
}

/// Truth-vs-prediction scatter on log-log axes with an identity
/// reference line. Axis limits run from 0.8 to 1.1x the largest value
/// on either axis; nonpositive values cannot be placed on a log axis
/// and are skipped.
pub(crate) fn scatter_loglog(
    path: &Path,
    truth: &[f64],
    predicted: &[f64],
    x_label: &str,
    y_label: &str,
) -> Result<()> {
    ensure!(
        truth.len() == predicted.len(),
        "[report::plot] truth len ({}) != prediction len ({})",
        truth.len(),
        predicted.len()
    );
    let max = truth.iter().chain(predicted).fold(0.0_f64, |acc, &v| acc.max(v));
    ensure!(max > 0.0, "[report::plot] nothing positive to plot");
    let lo = 0.8;
    let hi = 1.1 * max.max(1.0);

    let mut plot = PlotWriter::new(path)?;
    plot.write_header()?;
    plot.write_styles()?;
    writeln!(
        plot,
        r##"<rect class="frame" x="{MARGIN}" y="{MARGIN}" width="{}" height="{}"/>"##,
        WIDTH - 2.0 * MARGIN,
        HEIGHT - 2.0 * MARGIN
    )?;

    // Identity line spans the full axis range.
    writeln!(
        plot,
        r##"<line class="ident" x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}"/>"##,
        MARGIN + log_scale(lo, lo, hi),
        HEIGHT - MARGIN - log_scale(lo, lo, hi),
        MARGIN + log_scale(hi, lo, hi),
        HEIGHT - MARGIN - log_scale(hi, lo, hi),
    )?;

    for (&t, &p) in truth.iter().zip(predicted) {
        if t <= 0.0 || p <= 0.0 {
            continue;
        }
        writeln!(
            plot,
            r##"<circle class="pt" cx="{:.2}" cy="{:.2}" r="1.5"/>"##,
            MARGIN + log_scale(t.max(lo), lo, hi),
            HEIGHT - MARGIN - log_scale(p.max(lo), lo, hi),
        )?;
    }

    write_axis_labels(&mut plot, x_label, y_label)?;
    plot.write_footer()
}

/// Value-frequency scatter on log-log axes (flow-count distribution).
pub(crate) fn frequency_loglog(
    path: &Path,
    points: &[(f64, f64)],
    x_label: &str,
    y_label: &str,
) -> Result<()> {
    ensure!(!points.is_empty(), "[report::plot] nothing to plot");
    let x_max = points.iter().fold(0.0_f64, |acc, &(x, _)| acc.max(x));
    let y_max = points.iter().fold(0.0_f64, |acc, &(_, y)| acc.max(y));
    ensure!(x_max > 0.0 && y_max > 0.0, "[report::plot] nothing positive to plot");
    let lo = 0.8;
    let x_hi = 1.1 * x_max.max(1.0);
    let y_hi = 1.1 * y_max.max(1.0);

    let mut plot = PlotWriter::new(path)?;
    plot.write_header()?;
    plot.write_styles()?;
    writeln!(
        plot,
        r##"<rect class="frame" x="{MARGIN}" y="{MARGIN}" width="{}" height="{}"/>"##,
        WIDTH - 2.0 * MARGIN,
        HEIGHT - 2.0 * MARGIN
    )?;

    for &(x, y) in points {
        if x <= 0.0 || y <= 0.0 {
            continue;
        }
        writeln!(
            plot,
            r##"<circle class="pt" cx="{:.2}" cy="{:.2}" r="2"/>"##,
            MARGIN + log_scale(x.max(lo), lo, x_hi),
            HEIGHT - MARGIN - log_scale(y.max(lo), lo, y_hi),
        )?;
    }

    write_axis_labels(&mut plot, x_label, y_label)?;
    plot.write_footer()
}

fn write_axis_labels(plot: &mut PlotWriter, x_label: &str, y_label: &str) -> Result<()> {
    writeln!(
        plot,
        r##"<text class="axis" x="{:.0}" y="{:.0}" text-anchor="middle">{x_label}</text>"##,
        WIDTH / 2.0,
        HEIGHT - MARGIN / 3.0,
    )?;
    writeln!(
        plot,
        r##"<text class="axis" x="{:.0}" y="{:.0}" text-anchor="middle" transform="rotate(-90 {:.0} {:.0})">{y_label}</text>"##,
        MARGIN / 3.0,
        HEIGHT / 2.0,
        MARGIN / 3.0,
        HEIGHT / 2.0,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scatter_produces_wellformed_svg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scatter.svg");

        scatter_loglog(&path, &[10.0, 120.0, 3.0], &[11.0, 100.0, 5.0], "Truth", "Prediction")
            .unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.starts_with("<?xml"));
        assert_eq!(svg.matches("<circle").count(), 3);
        assert!(svg.contains("Truth") && svg.contains("Prediction"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn mismatched_lengths_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scatter.svg");
        assert!(scatter_loglog(&path, &[1.0], &[1.0, 2.0], "x", "y").is_err());
    }

    #[test]
    fn frequency_plot_skips_nonpositive_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("freq.svg");

        frequency_loglog(&path, &[(3.0, 120.0), (4.0, 0.0), (9.0, 2.0)], "Flow", "Frequency")
            .unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert_eq!(svg.matches("<circle").count(), 2);
    }
}
