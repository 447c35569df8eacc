use std::path::Path;

use image::{Rgba, RgbaImage};
use plotters::prelude::*;
use rayon::prelude::*;

use super::histogram1d::Histogram;
use crate::error::Result;
use crate::histoer::colormaps::{ColorMap, ColormapOptions};
use crate::histoer::grid::Grid2D;

pub const BLUE: RGBColor = RGBColor(0, 0, 204);
pub const RED: RGBColor = RGBColor(204, 0, 0);

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

/// One histogram of a [`HistogramPlot`], drawn as a step line.
pub struct Series<'a> {
    pub histogram: &'a Histogram,
    pub label: String,
    pub color: RGBColor,
}

/// Vertical arrow from the x axis up to half the tallest bin, tip at the top.
pub struct Arrow {
    pub x: f64,
    pub label: String,
    pub color: RGBColor,
}

/// Overlay of histograms sharing one range, with a legend, an optional arrow and a text note.
pub struct HistogramPlot<'a> {
    pub title: String,
    pub x_desc: String,
    pub y_desc: String,
    pub series: Vec<Series<'a>>,
    pub arrow: Option<Arrow>,
    /// Drawn under the legend, e.g. the p-value
    pub note: Option<String>,
}

impl<'a> HistogramPlot<'a> {
    pub fn new(title: &str, x_desc: &str) -> Self {
        Self {
            title: title.to_owned(),
            x_desc: x_desc.to_owned(),
            y_desc: "Events".to_owned(),
            series: vec![],
            arrow: None,
            note: None,
        }
    }

    pub fn series(mut self, histogram: &'a Histogram, label: &str, color: RGBColor) -> Self {
        self.series.push(Series {
            histogram,
            label: label.to_owned(),
            color,
        });
        self
    }

    pub fn arrow(mut self, x: f64, label: &str, color: RGBColor) -> Self {
        self.arrow = Some(Arrow {
            x,
            label: label.to_owned(),
            color,
        });
        self
    }

    pub fn note(mut self, note: String) -> Self {
        self.note = Some(note);
        self
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let Some(first) = self.series.first() else {
            log::warn!("Nothing to draw in {}", path.display());
            return Ok(());
        };
        let (x_min, x_max) = first.histogram.range;
        let maximum = self
            .series
            .iter()
            .map(|series| series.histogram.maximum())
            .max()
            .unwrap_or(0)
            .max(1) as f64;
        let y_max = 1.1 * maximum;

        let root = BitMapBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&self.title, ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_min..x_max, 0.0..y_max)?;

        chart
            .configure_mesh()
            .x_desc(self.x_desc.as_str())
            .y_desc(self.y_desc.as_str())
            .draw()?;

        for series in &self.series {
            let color = series.color;
            let histogram = series.histogram;
            let points = std::iter::once((histogram.range.0, 0.0))
                .chain(histogram.line_points().into_iter().map(|[x, y]| (x, y)))
                .chain(std::iter::once((histogram.range.1, 0.0)));
            chart
                .draw_series(LineSeries::new(points, color.stroke_width(2)))?
                .label(series.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }

        if let Some(arrow) = &self.arrow {
            let color = arrow.color;
            let top = 0.5 * maximum;
            let head_width = 0.01 * (x_max - x_min);
            let head_height = 0.04 * y_max;
            chart
                .draw_series(std::iter::once(PathElement::new(
                    vec![(arrow.x, 0.0), (arrow.x, top - head_height)],
                    color.stroke_width(2),
                )))?
                .label(arrow.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
            chart.draw_series(std::iter::once(Polygon::new(
                vec![
                    (arrow.x - head_width, top - head_height),
                    (arrow.x + head_width, top - head_height),
                    (arrow.x, top),
                ],
                color.filled(),
            )))?;
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;

        if let Some(note) = &self.note {
            chart.draw_series(std::iter::once(Text::new(
                note.clone(),
                (x_min + 0.6 * (x_max - x_min), 0.62 * y_max),
                ("sans-serif", 18),
            )))?;
        }

        root.present()?;
        log::info!("Saved {}", path.display());
        Ok(())
    }
}

/// Heat map of a grid, one block of `pixels_per_bin` pixels per bin, y growing upwards.
pub fn heatmap_image(
    grid: &Grid2D,
    colormap: ColorMap,
    options: ColormapOptions,
    pixels_per_bin: u32,
) -> RgbaImage {
    let width = grid.nx() as u32 * pixels_per_bin;
    let height = grid.ny() as u32 * pixels_per_bin;
    let min = grid
        .contents
        .iter()
        .copied()
        .filter(|v| *v > 0.0)
        .fold(f64::INFINITY, f64::min);
    let min = if min.is_finite() { min } else { 0.0 };
    let max = grid.maximum();

    let mut pixels = vec![Rgba([0, 0, 0, 0]); (width * height) as usize];
    pixels.par_iter_mut().enumerate().for_each(|(i, pixel)| {
        let x = (i as u32 % width) / pixels_per_bin;
        let y = (height - 1 - i as u32 / width) / pixels_per_bin;
        *pixel = colormap.color(grid.content(x as usize, y as usize), min, max, options);
    });

    let mut image = RgbaImage::new(width, height);
    for (target, pixel) in image.pixels_mut().zip(pixels) {
        *target = pixel;
    }
    image
}

pub fn write_heatmap(path: &Path, grid: &Grid2D, colormap: ColorMap, options: ColormapOptions) -> Result<()> {
    let pixels_per_bin = (400 / grid.nx().max(grid.ny()).max(1) as u32).max(1);
    heatmap_image(grid, colormap, options, pixels_per_bin).save(path)?;
    log::debug!("Saved heat map {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histoer::axis::Axis;

    fn is_close(pixel: &Rgba<u8>, color: RGBColor) -> bool {
        let RGBColor(r, g, b) = color;
        [r, g, b]
            .iter()
            .zip(pixel.0.iter())
            .all(|(expected, actual)| expected.abs_diff(*actual) < 40)
    }

    #[test]
    fn test_histogram_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("GoodnessOfFit_distribution_LepHi_30.png");
        let mut histogram = Histogram::new("toys", 100, (0.0, 600.0));
        for value in [120.0, 130.0, 135.0, 250.0] {
            histogram.fill(value);
        }
        HistogramPlot::new("Expected and Observed GoF", "chi2")
            .series(&histogram, "Observed (toys)", RED)
            .arrow(140.0, "Expected (MC)", BLUE)
            .note("p-value = 0.2500".to_owned())
            .save(&path)
            .unwrap();

        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (WIDTH, HEIGHT));
        assert!(image.pixels().any(|p| is_close(p, RED)));
        assert!(image.pixels().any(|p| is_close(p, BLUE)));
        // axes, legend frame and labels are black
        let dark = image.pixels().filter(|p| p.0[0] < 60 && p.0[1] < 60 && p.0[2] < 60).count();
        assert!(dark > 500);
    }

    #[test]
    fn test_empty_plot_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        HistogramPlot::new("nothing", "limit").save(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_heatmap_orientation() {
        let grid = Grid2D::from_fn(Axis::uniform(2, (0.0, 2.0)), Axis::uniform(2, (0.0, 2.0)), |ix, iy| {
            (if (ix, iy) == (0, 1) { 10.0 } else { 1.0 }, 0.0)
        });
        let options = ColormapOptions {
            log_norm: false,
            reverse: false,
        };
        let image = heatmap_image(&grid, ColorMap::Viridis, options, 3);
        assert_eq!(image.dimensions(), (6, 6));
        // bin (0, 1) is the top-left block
        assert_eq!(*image.get_pixel(0, 0), ColorMap::Viridis.color(10.0, 1.0, 10.0, options));
        assert_eq!(*image.get_pixel(5, 5), ColorMap::Viridis.color(1.0, 1.0, 10.0, options));
    }
}
