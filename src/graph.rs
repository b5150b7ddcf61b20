//! Plotters backend: draws a composed figure to PNG or SVG.
//!
//! Every subplot gets its own cartesian chart. Traces are first turned into
//! simple marks (paths, dots, filled and outlined rectangles) in data space,
//! then drawn; categorical axes place category `i` at `i + 0.5`.

use crate::data::Series;
use crate::figure::{Figure, Placement, SlotAxes};
use crate::chart::BarMode;
use crate::palette::{qualitative_color, QUALITATIVE};
use crate::trace::{MarkerColor, Trace, TraceType};
use crate::{OutputFormat, RenderOptions};
use anyhow::{Context, Result};
use image::ImageEncoder;
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::collections::HashMap;
use std::ops::Range;

/// Bins used for numeric histograms
pub const HIST_BINS: usize = 20;

/// Bins per axis for 2D density maps
pub const DENSITY_BINS: usize = 20;

/// Anything that can turn a figure into encoded bytes
pub trait Backend {
    fn render(&self, figure: &Figure) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Default)]
pub struct PlottersBackend {
    options: RenderOptions,
}

impl PlottersBackend {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Pixel size: layout `width`/`height` win over the render options
    pub fn size(&self, figure: &Figure) -> (u32, u32) {
        let (width, height) = figure.layout.size();
        (
            width.unwrap_or(self.options.width).max(1),
            height.unwrap_or(self.options.height).max(1),
        )
    }
}

impl Backend for PlottersBackend {
    fn render(&self, figure: &Figure) -> Result<Vec<u8>> {
        let (width, height) = self.size(figure);
        tracing::debug!(width, height, traces = figure.placements.len(), "rendering figure");

        match self.options.format {
            OutputFormat::Png => {
                let len = usize::try_from(width)?
                    .checked_mul(usize::try_from(height)?)
                    .and_then(|n| n.checked_mul(3))
                    .context("Image dimensions too large")?;
                let mut buffer = vec![0u8; len];
                {
                    let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
                    draw_figure(&root, figure)?;
                    root.present().context("Failed to present drawing")?;
                }
                encode_png(&buffer, width, height)
            }
            OutputFormat::Svg => {
                let mut svg = String::new();
                {
                    let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
                    draw_figure(&root, figure)?;
                    root.present().context("Failed to present drawing")?;
                }
                Ok(svg.into_bytes())
            }
        }
    }
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut png_bytes = Vec::new();
    {
        let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
        encoder
            .write_image(buffer, width, height, image::ColorType::Rgb8)
            .context("Failed to encode PNG")?;
    }
    Ok(png_bytes)
}

/// Pixel rectangle of one subplot, relative to the plotting area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub row: usize,
    pub col: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Cumulative boundaries in `[0, 1]` for `n` tracks with optional weights
fn track_edges(weights: Option<&Vec<f64>>, n: usize) -> Vec<f64> {
    let weights: Vec<f64> = match weights {
        Some(w) if w.len() == n => w.clone(),
        _ => vec![1.0; n],
    };
    let total: f64 = weights.iter().sum();
    let mut edges = Vec::with_capacity(n + 1);
    let mut acc = 0.0;
    edges.push(0.0);
    for w in weights {
        acc += w / total;
        edges.push(acc);
    }
    edges
}

/// Rectangles of every occupied subplot in placement order, sized by the
/// column widths, row heights and span directives.
pub fn cell_rects(figure: &Figure, width: u32, height: u32) -> Vec<CellRect> {
    let cols = track_edges(figure.column_widths.as_ref(), figure.cols);
    let rows = track_edges(figure.row_heights.as_ref(), figure.rows);

    let mut rects: Vec<CellRect> = Vec::new();
    for p in &figure.placements {
        if rects.iter().any(|r| r.row == p.row && r.col == p.col) {
            continue;
        }
        let (rowspan, colspan) = figure
            .specs
            .as_ref()
            .and_then(|s| s.get(p.row - 1).and_then(|r| r.get(p.col - 1)).cloned().flatten())
            .map(|c| (c.rowspan_or_one(), c.colspan_or_one()))
            .unwrap_or((1, 1));
        let c1 = (p.col - 1 + colspan).min(figure.cols);
        let r1 = (p.row - 1 + rowspan).min(figure.rows);

        let x0 = (cols[p.col - 1] * width as f64).round() as u32;
        let x1 = (cols[c1] * width as f64).round() as u32;
        let y0 = (rows[p.row - 1] * height as f64).round() as u32;
        let y1 = (rows[r1] * height as f64).round() as u32;
        rects.push(CellRect {
            row: p.row,
            col: p.col,
            x: x0,
            y: y0,
            width: x1.saturating_sub(x0).max(1),
            height: y1.saturating_sub(y0).max(1),
        });
    }
    rects
}

fn draw_figure<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, figure: &Figure) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE).context("Failed to fill background")?;

    let mut area = match &figure.layout.title {
        Some(title) => root
            .titled(title, ("sans-serif", 24))
            .context("Failed to draw title")?,
        None => root.clone(),
    };

    let font = ("sans-serif", 16).into_font();
    if let Some(x_title) = &figure.layout.x_title {
        let (w, h) = area.dim_in_pixel();
        let (upper, lower) = area.split_vertically(h.saturating_sub(28));
        let style = TextStyle::from(font.clone()).pos(Pos::new(HPos::Center, VPos::Center));
        lower
            .draw_text(x_title, &style, ((w / 2) as i32, 14))
            .context("Failed to draw x axis title")?;
        area = upper;
    }
    if let Some(y_title) = &figure.layout.y_title {
        let (_, h) = area.dim_in_pixel();
        let (left, right) = area.split_horizontally(28);
        let style = TextStyle::from(font.clone().transform(FontTransform::Rotate270))
            .pos(Pos::new(HPos::Center, VPos::Center));
        left.draw_text(y_title, &style, (14, (h / 2) as i32))
            .context("Failed to draw y axis title")?;
        area = right;
    }

    let placements = figure.rendered_placements();
    let (w, h) = area.dim_in_pixel();
    for rect in cell_rects(figure, w, h) {
        let traces: Vec<&Trace> = placements
            .iter()
            .filter(|p: &&Placement| p.row == rect.row && p.col == rect.col)
            .map(|p| &p.trace)
            .collect();
        let axes = figure
            .layout
            .slot_axes
            .iter()
            .find(|a| a.row == rect.row && a.col == rect.col);
        let cell = area
            .clone()
            .shrink((rect.x as i32, rect.y as i32), (rect.width as i32, rect.height as i32));
        draw_subplot(&cell, &traces, axes, figure.layout.barmode)
            .with_context(|| format!("Failed to draw subplot ({}, {})", rect.row, rect.col))?;
    }
    Ok(())
}

/// How one axis maps values to plot coordinates
#[derive(Debug, Clone, PartialEq)]
pub enum AxisMap {
    Numeric,
    Categorical(Vec<String>),
}

impl AxisMap {
    /// Categorical as soon as any series carries labels
    pub fn from_series<'a>(series: impl Iterator<Item = &'a Series>) -> Self {
        let series: Vec<&Series> = series.collect();
        if series.iter().all(|s| s.is_numeric()) {
            return AxisMap::Numeric;
        }
        let mut categories: Vec<String> = Vec::new();
        for s in series {
            for label in s.distinct_labels() {
                if !categories.contains(&label) {
                    categories.push(label);
                }
            }
        }
        AxisMap::Categorical(categories)
    }

    pub fn positions(&self, series: &Series) -> Vec<f64> {
        match (self, series) {
            (AxisMap::Numeric, Series::Numbers(v)) => v.clone(),
            (AxisMap::Numeric, Series::Labels(v)) => {
                v.iter().map(|s| s.parse().unwrap_or(f64::NAN)).collect()
            }
            (AxisMap::Categorical(_), s) => s.to_strings().iter().map(|l| self.position_of(l)).collect(),
        }
    }

    pub fn position_of(&self, label: &str) -> f64 {
        match self {
            AxisMap::Numeric => label.parse().unwrap_or(f64::NAN),
            AxisMap::Categorical(c) => c
                .iter()
                .position(|x| x == label)
                .map(|i| i as f64 + 0.5)
                .unwrap_or(f64::NAN),
        }
    }

    pub fn label(&self, value: f64) -> String {
        match self {
            AxisMap::Numeric => format!("{}", value),
            AxisMap::Categorical(c) => {
                if value < 0.0 {
                    return String::new();
                }
                c.get(value.floor() as usize).cloned().unwrap_or_default()
            }
        }
    }

    fn is_categorical(&self) -> bool {
        matches!(self, AxisMap::Categorical(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// Label of the single box drawn when a box trace has no x values
fn box_label(trace: &Trace) -> String {
    trace.name.clone().unwrap_or_else(|| "box".to_string())
}

fn horizontal(trace: &Trace) -> bool {
    trace.orientation == Some(crate::chart::Orientation::Horizontal)
}

/// The series a trace positions along `axis`. Value axes of bars and
/// histograms are always numeric and contribute nothing here.
fn axis_series(trace: &Trace, axis: Axis) -> Option<Series> {
    match (trace.kind, axis) {
        (TraceType::Histogram, Axis::X) if horizontal(trace) => None,
        (TraceType::Histogram, Axis::Y) if !horizontal(trace) => None,
        (TraceType::Box, Axis::X) => Some(
            trace
                .x
                .clone()
                .unwrap_or_else(|| Series::Labels(vec![box_label(trace)])),
        ),
        (TraceType::Heatmap, _) => None,
        (_, Axis::X) => trace.x.clone(),
        (_, Axis::Y) => trace.y.clone(),
    }
}

#[derive(Debug, Clone)]
enum Mark {
    Path {
        points: Vec<(f64, f64)>,
        color: RGBAColor,
    },
    Dots {
        points: Vec<(f64, f64)>,
        colors: Vec<RGBAColor>,
    },
    Fill {
        from: (f64, f64),
        to: (f64, f64),
        color: RGBAColor,
    },
    Outline {
        from: (f64, f64),
        to: (f64, f64),
        color: RGBAColor,
    },
    /// Value written at the centre of a heatmap cell
    Text {
        at: (f64, f64),
        text: String,
        color: RGBAColor,
    },
}

impl Mark {
    fn points(&self) -> Vec<(f64, f64)> {
        match self {
            Mark::Path { points, .. } | Mark::Dots { points, .. } => points.clone(),
            Mark::Fill { from, to, .. } | Mark::Outline { from, to, .. } => vec![*from, *to],
            Mark::Text { at, .. } => vec![*at],
        }
    }
}

/// Shared state while turning the traces of one subplot into marks
struct SubplotContext {
    x_axis: AxisMap,
    y_axis: AxisMap,
    barmode: BarMode,
    /// Number of bar-like traces and the running index among them
    n_bars: usize,
    bar_index: usize,
    /// Stacked totals per band position (as bits), positive and negative
    stack: HashMap<u64, (f64, f64)>,
    hist_edges: Option<Vec<f64>>,
}

impl SubplotContext {
    fn new(traces: &[&Trace], barmode: Option<BarMode>) -> Self {
        let xs: Vec<Series> = traces.iter().filter_map(|t| axis_series(t, Axis::X)).collect();
        let ys: Vec<Series> = traces.iter().filter_map(|t| axis_series(t, Axis::Y)).collect();
        let x_axis = AxisMap::from_series(xs.iter());
        let y_axis = AxisMap::from_series(ys.iter());
        let n_bars = traces
            .iter()
            .filter(|t| matches!(t.kind, TraceType::Bar | TraceType::Histogram | TraceType::Box))
            .count();

        let mut ctx = Self {
            x_axis,
            y_axis,
            barmode: barmode.unwrap_or(BarMode::Group),
            n_bars,
            bar_index: 0,
            stack: HashMap::new(),
            hist_edges: None,
        };
        ctx.hist_edges = ctx.numeric_hist_edges(traces);
        ctx
    }

    /// Bin edges shared by every numeric histogram of the subplot
    fn numeric_hist_edges(&self, traces: &[&Trace]) -> Option<Vec<f64>> {
        let mut values = Vec::new();
        for t in traces.iter().filter(|t| t.kind == TraceType::Histogram) {
            let (series, axis) = if horizontal(t) {
                (t.y.as_ref(), &self.y_axis)
            } else {
                (t.x.as_ref(), &self.x_axis)
            };
            if axis.is_categorical() {
                return None;
            }
            if let Some(s) = series {
                values.extend(axis.positions(s).into_iter().filter(|v| v.is_finite()));
            }
        }
        if values.is_empty() {
            return None;
        }
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let width = if max > min { (max - min) / HIST_BINS as f64 } else { 1.0 };
        Some((0..=HIST_BINS).map(|i| min + i as f64 * width).collect())
    }

    /// Horizontal extent of bar `bar_index` inside a band centred on `center`
    fn dodge(&self, center: f64, band: f64, fill: f64) -> (f64, f64) {
        match self.barmode {
            BarMode::Group if self.n_bars > 1 => {
                let each = band * fill / self.n_bars as f64;
                let offset = (self.bar_index as f64 - (self.n_bars as f64 - 1.0) / 2.0) * each;
                (center + offset - each / 2.0, center + offset + each / 2.0)
            }
            _ => (center - band * fill / 2.0, center + band * fill / 2.0),
        }
    }

    /// Base and top of a bar of `value` at `center`, stacking when asked to
    fn extent(&mut self, center: f64, value: f64) -> (f64, f64) {
        match self.barmode {
            BarMode::Stack | BarMode::Relative => {
                let entry = self.stack.entry(center.to_bits()).or_insert((0.0, 0.0));
                if value >= 0.0 {
                    let base = entry.0;
                    entry.0 += value;
                    (base, base + value)
                } else {
                    let base = entry.1;
                    entry.1 += value;
                    (base, base + value)
                }
            }
            _ => (0.0, value),
        }
    }

    fn bar_alpha(&self) -> f64 {
        match self.barmode {
            BarMode::Overlay => 0.5,
            _ => 1.0,
        }
    }
}

/// Smallest gap between distinct sorted positions, 1.0 when there is none
fn band_width(positions: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = positions.iter().cloned().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.dedup();
    sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold(None, |acc: Option<f64>, gap| Some(acc.map_or(gap, |a| a.min(gap))))
        .unwrap_or(1.0)
}

fn trace_color(trace: &Trace, index: usize) -> RGBColor {
    trace
        .color()
        .map(|c| parse_color(Some(c)))
        .unwrap_or_else(|| parse_color(Some(&qualitative_color(index))))
}

fn trace_marks(trace: &Trace, index: usize, ctx: &mut SubplotContext) -> Vec<Mark> {
    let color = trace_color(trace, index);
    let alpha = trace.opacity.unwrap_or(1.0);
    match trace.kind {
        TraceType::Scatter => scatter_marks(trace, color.mix(alpha), ctx),
        TraceType::Bar => {
            let marks = bar_marks(trace, color.mix(alpha * ctx.bar_alpha()), ctx);
            ctx.bar_index += 1;
            marks
        }
        TraceType::Histogram => {
            let marks = histogram_marks(trace, color.mix(alpha * ctx.bar_alpha()), ctx);
            ctx.bar_index += 1;
            marks
        }
        TraceType::Box => {
            let marks = box_marks(trace, color.mix(alpha), ctx);
            ctx.bar_index += 1;
            marks
        }
        TraceType::Histogram2d => density_marks(trace, ctx),
        TraceType::Heatmap => heatmap_marks(trace),
    }
}

fn xy_points(trace: &Trace, ctx: &SubplotContext) -> Vec<(f64, f64)> {
    let xs = trace.x.as_ref().map(|s| ctx.x_axis.positions(s)).unwrap_or_default();
    let ys = trace.y.as_ref().map(|s| ctx.y_axis.positions(s)).unwrap_or_default();
    xs.into_iter().zip(ys).collect()
}

fn scatter_marks(trace: &Trace, color: RGBAColor, ctx: &SubplotContext) -> Vec<Mark> {
    let points = xy_points(trace, ctx);
    let mode = trace.mode.as_deref().unwrap_or("markers");
    let mut marks = Vec::new();

    if mode.contains("lines") {
        // NaN breaks the line
        for run in points.split(|(x, y)| !x.is_finite() || !y.is_finite()) {
            if run.len() > 1 {
                marks.push(Mark::Path {
                    points: run.to_vec(),
                    color,
                });
            }
        }
    }
    if mode.contains("markers") {
        let marker = trace.marker.as_ref();
        let colors: Vec<RGBAColor> = match marker.and_then(|m| m.color.as_ref()) {
            Some(MarkerColor::PerPoint(values)) => {
                let scale = marker.and_then(|m| m.colorscale.as_deref()).unwrap_or("Viridis");
                let (lo, hi) = min_max(values);
                values
                    .iter()
                    .map(|v| colorscale_color(scale, normalize(*v, lo, hi)).mix(color.3))
                    .collect()
            }
            _ => vec![color; points.len()],
        };
        let (points, colors): (Vec<_>, Vec<_>) = points
            .into_iter()
            .zip(colors)
            .filter(|((x, y), _)| x.is_finite() && y.is_finite())
            .unzip();
        marks.push(Mark::Dots { points, colors });
    }
    marks
}

fn bar_marks(trace: &Trace, color: RGBAColor, ctx: &mut SubplotContext) -> Vec<Mark> {
    let points = xy_points(trace, ctx);
    let flipped = horizontal(trace) || (ctx.y_axis.is_categorical() && !ctx.x_axis.is_categorical());

    let positions: Vec<f64> = points.iter().map(|&(x, y)| if flipped { y } else { x }).collect();
    let band = if (flipped && ctx.y_axis.is_categorical()) || (!flipped && ctx.x_axis.is_categorical()) {
        1.0
    } else {
        band_width(&positions)
    };

    let mut marks = Vec::new();
    for (x, y) in points {
        let (center, value) = if flipped { (y, x) } else { (x, y) };
        if !center.is_finite() || !value.is_finite() {
            continue;
        }
        let (lo, hi) = ctx.dodge(center, band, 0.8);
        let (base, top) = ctx.extent(center, value);
        let (from, to) = if flipped {
            ((base, lo), (top, hi))
        } else {
            ((lo, base), (hi, top))
        };
        marks.push(Mark::Fill { from, to, color });
    }
    marks
}

fn aggregate(func: &str, values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    match func {
        "sum" => values.iter().sum(),
        "avg" => values.iter().sum::<f64>() / values.len() as f64,
        "min" => values.iter().cloned().fold(f64::INFINITY, f64::min),
        "max" => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        _ => values.len() as f64,
    }
}

/// Bin (or count per category) and draw the result as bars
fn histogram_marks(trace: &Trace, color: RGBAColor, ctx: &mut SubplotContext) -> Vec<Mark> {
    let flipped = horizontal(trace);
    let (bin_series, value_series, bin_axis) = if flipped {
        (trace.y.as_ref(), trace.x.as_ref(), &ctx.y_axis)
    } else {
        (trace.x.as_ref(), trace.y.as_ref(), &ctx.x_axis)
    };
    let positions = match bin_series {
        Some(s) => bin_axis.positions(s),
        None => return Vec::new(),
    };
    let func = trace.histfunc.as_deref().unwrap_or("count");
    let weights: Option<Vec<f64>> = match (func, value_series) {
        ("count", _) | (_, None) => None,
        (_, Some(s)) => s.as_numbers().map(<[f64]>::to_vec),
    };

    // (center, width, values falling in the bin)
    let mut bins: Vec<(f64, f64, Vec<f64>)> = match (&ctx.hist_edges, bin_axis) {
        (Some(edges), AxisMap::Numeric) => edges
            .windows(2)
            .map(|w| ((w[0] + w[1]) / 2.0, w[1] - w[0], Vec::new()))
            .collect(),
        (_, AxisMap::Categorical(c)) => (0..c.len()).map(|i| (i as f64 + 0.5, 1.0, Vec::new())).collect(),
        _ => return Vec::new(),
    };
    for (i, &p) in positions.iter().enumerate() {
        if !p.is_finite() {
            continue;
        }
        let weight = match &weights {
            Some(w) => match w.get(i) {
                Some(v) if v.is_finite() => *v,
                _ => continue,
            },
            None => 1.0,
        };
        let slot = match &ctx.hist_edges {
            Some(edges) if !bin_axis.is_categorical() => {
                let width = edges[1] - edges[0];
                (((p - edges[0]) / width).floor() as usize).min(bins.len() - 1)
            }
            _ => p.floor() as usize,
        };
        if let Some(bin) = bins.get_mut(slot) {
            bin.2.push(weight);
        }
    }

    let total: f64 = bins.iter().map(|b| aggregate(func, &b.2)).sum();
    let fill = if bin_axis.is_categorical() { 0.8 } else { 1.0 };
    let mut marks = Vec::new();
    for (center, width, values) in bins {
        if values.is_empty() {
            continue;
        }
        let mut value = aggregate(func, &values);
        match trace.histnorm.as_deref() {
            Some("probability") if total > 0.0 => value /= total,
            Some("percent") if total > 0.0 => value *= 100.0 / total,
            Some("probability density") if total > 0.0 => value /= total * width,
            _ => {}
        }
        let (lo, hi) = ctx.dodge(center, width, fill);
        let (base, top) = ctx.extent(center, value);
        let (from, to) = if flipped {
            ((base, lo), (top, hi))
        } else {
            ((lo, base), (hi, top))
        };
        marks.push(Mark::Fill { from, to, color });
    }
    marks
}

fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    let n = sorted_data.len();
    if n == 0 { return 0.0; }
    if n == 1 { return sorted_data[0]; }

    let rank = p * (n - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = rank.ceil() as usize;

    if lower_idx == upper_idx {
        sorted_data[lower_idx]
    } else {
        let weight = rank - lower_idx as f64;
        sorted_data[lower_idx] * (1.0 - weight) + sorted_data[upper_idx] * weight
    }
}

/// Box, median, whiskers at 1.5 IQR and outliers per x group
fn box_marks(trace: &Trace, color: RGBAColor, ctx: &SubplotContext) -> Vec<Mark> {
    let ys = match &trace.y {
        Some(y) => ctx.y_axis.positions(y),
        None => return Vec::new(),
    };
    let xs: Vec<f64> = match &trace.x {
        Some(x) => ctx.x_axis.positions(x),
        None => vec![ctx.x_axis.position_of(&box_label(trace)); ys.len()],
    };

    let mut groups: Vec<(f64, Vec<f64>)> = Vec::new();
    for (x, y) in xs.into_iter().zip(ys) {
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        match groups.iter_mut().find(|(gx, _)| *gx == x) {
            Some((_, values)) => values.push(y),
            None => groups.push((x, vec![y])),
        }
    }

    let band = if ctx.x_axis.is_categorical() {
        1.0
    } else {
        band_width(&groups.iter().map(|(x, _)| *x).collect::<Vec<_>>())
    };

    let mut marks = Vec::new();
    for (x, mut ys) in groups {
        ys.sort_by(|a, b| a.total_cmp(b));
        let q1 = percentile(&ys, 0.25);
        let median = percentile(&ys, 0.50);
        let q3 = percentile(&ys, 0.75);
        let iqr = q3 - q1;
        let (lower_fence, upper_fence) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
        let low = ys.iter().cloned().filter(|&v| v >= lower_fence).fold(q1, f64::min);
        let high = ys.iter().cloned().filter(|&v| v <= upper_fence).fold(q3, f64::max);
        let outliers: Vec<(f64, f64)> = ys
            .iter()
            .filter(|&&v| v < lower_fence || v > upper_fence)
            .map(|&v| (x, v))
            .collect();

        let (lo, hi) = ctx.dodge(x, band, 0.6);
        let mid = (lo + hi) / 2.0;
        marks.push(Mark::Fill {
            from: (lo, q1),
            to: (hi, q3),
            color: color.mix(0.3),
        });
        marks.push(Mark::Outline {
            from: (lo, q1),
            to: (hi, q3),
            color,
        });
        marks.push(Mark::Path {
            points: vec![(lo, median), (hi, median)],
            color,
        });
        marks.push(Mark::Path {
            points: vec![(mid, q3), (mid, high)],
            color,
        });
        marks.push(Mark::Path {
            points: vec![(mid, q1), (mid, low)],
            color,
        });
        if !outliers.is_empty() {
            let colors = vec![color; outliers.len()];
            marks.push(Mark::Dots {
                points: outliers,
                colors,
            });
        }
    }
    marks
}

/// 2D histogram of x/y drawn as coloured cells
fn density_marks(trace: &Trace, ctx: &SubplotContext) -> Vec<Mark> {
    let points: Vec<(f64, f64)> = xy_points(trace, ctx)
        .into_iter()
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();
    if points.is_empty() {
        return Vec::new();
    }
    let (x_lo, x_hi) = min_max(&points.iter().map(|p| p.0).collect::<Vec<_>>());
    let (y_lo, y_hi) = min_max(&points.iter().map(|p| p.1).collect::<Vec<_>>());
    let x_w = if x_hi > x_lo { (x_hi - x_lo) / DENSITY_BINS as f64 } else { 1.0 };
    let y_w = if y_hi > y_lo { (y_hi - y_lo) / DENSITY_BINS as f64 } else { 1.0 };

    let mut counts = vec![vec![0usize; DENSITY_BINS]; DENSITY_BINS];
    for (x, y) in points {
        let i = (((x - x_lo) / x_w).floor() as usize).min(DENSITY_BINS - 1);
        let j = (((y - y_lo) / y_w).floor() as usize).min(DENSITY_BINS - 1);
        counts[j][i] += 1;
    }
    let max = counts.iter().flatten().copied().max().unwrap_or(1).max(1) as f64;
    let scale = trace.colorscale.as_deref().unwrap_or("Viridis");

    let mut marks = Vec::new();
    for (j, row) in counts.iter().enumerate() {
        for (i, &count) in row.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let x0 = x_lo + i as f64 * x_w;
            let y0 = y_lo + j as f64 * y_w;
            marks.push(Mark::Fill {
                from: (x0, y0),
                to: (x0 + x_w, y0 + y_w),
                color: colorscale_color(scale, count as f64 / max).mix(1.0),
            });
        }
    }
    marks
}

/// Matrix cells; row 0 at the bottom. `zmin`/`zmax` pin the colour range and
/// `text_auto` writes each value on its cell.
fn heatmap_marks(trace: &Trace) -> Vec<Mark> {
    let z = match &trace.z {
        Some(z) => z,
        None => return Vec::new(),
    };
    let values: Vec<f64> = z.iter().flatten().copied().collect();
    let (data_lo, data_hi) = min_max(&values);
    let (lo, hi) = (trace.zmin.unwrap_or(data_lo), trace.zmax.unwrap_or(data_hi));
    let scale = trace.colorscale.as_deref().unwrap_or("Viridis");
    let annotate = trace.extra.get("text_auto").and_then(|v| v.as_bool()).unwrap_or(false);

    let mut marks = Vec::new();
    for (r, row) in z.iter().enumerate() {
        for (c, &v) in row.iter().enumerate() {
            if !v.is_finite() {
                continue;
            }
            let t = normalize(v, lo, hi);
            marks.push(Mark::Fill {
                from: (c as f64, r as f64),
                to: (c as f64 + 1.0, r as f64 + 1.0),
                color: colorscale_color(scale, t).mix(1.0),
            });
            if annotate {
                let ink = if t > 0.6 { BLACK } else { WHITE };
                marks.push(Mark::Text {
                    at: (c as f64 + 0.5, r as f64 + 0.5),
                    text: format_cell(v),
                    color: ink.mix(1.0),
                });
            }
        }
    }
    marks
}

fn format_cell(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{:.2}", v)
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    let finite = values.iter().cloned().filter(|v| v.is_finite());
    let min = finite.clone().fold(f64::INFINITY, f64::min);
    let max = finite.fold(f64::NEG_INFINITY, f64::max);
    if min > max { (0.0, 1.0) } else { (min, max) }
}

fn normalize(v: f64, lo: f64, hi: f64) -> f64 {
    if hi > lo { ((v - lo) / (hi - lo)).clamp(0.0, 1.0) } else { 0.5 }
}

fn pad_range(min: f64, max: f64) -> Range<f64> {
    if min == max {
        (min - 1.0)..(max + 1.0)
    } else {
        let padding = (max - min) * 0.05;
        (min - padding)..(max + padding)
    }
}

/// Plot range for one axis: full bands on categorical axes, padded data
/// range otherwise
fn axis_range(axis: &AxisMap, values: impl Iterator<Item = f64>) -> Range<f64> {
    if let AxisMap::Categorical(c) = axis {
        return 0.0..(c.len().max(1) as f64);
    }
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if min > max {
        return 0.0..1.0;
    }
    pad_range(min, max)
}

fn draw_subplot<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    traces: &[&Trace],
    axes: Option<&SlotAxes>,
    barmode: Option<BarMode>,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let mut ctx = SubplotContext::new(traces, barmode);
    let marks: Vec<(usize, Vec<Mark>)> = traces
        .iter()
        .enumerate()
        .map(|(i, t)| (i, trace_marks(t, i, &mut ctx)))
        .collect();

    let points: Vec<(f64, f64)> = marks.iter().flat_map(|(_, m)| m.iter()).flat_map(Mark::points).collect();
    let x_range = axis_range(&ctx.x_axis, points.iter().map(|p| p.0));
    let y_range = axis_range(&ctx.y_axis, points.iter().map(|p| p.1));

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_range, y_range)
        .context("Failed to build chart")?;

    let x_axis = ctx.x_axis.clone();
    let y_axis = ctx.y_axis.clone();
    let x_fmt = |v: &f64| x_axis.label(*v);
    let y_fmt = |v: &f64| y_axis.label(*v);
    {
        let mut mesh = chart.configure_mesh();
        if let AxisMap::Categorical(c) = &x_axis {
            mesh.x_labels(c.len().max(1)).x_label_formatter(&x_fmt);
        }
        if let AxisMap::Categorical(c) = &y_axis {
            mesh.y_labels(c.len().max(1)).y_label_formatter(&y_fmt);
        }
        if let Some(title) = axes.and_then(|a| a.x_title.as_deref()) {
            mesh.x_desc(title);
        }
        if let Some(title) = axes.and_then(|a| a.y_title.as_deref()) {
            mesh.y_desc(title);
        }
        mesh.draw().context("Failed to draw mesh")?;
    }

    let mut labelled = false;
    for (i, drawn) in &marks {
        let trace = traces[*i];
        let legend = match (&trace.name, trace.showlegend) {
            (Some(name), Some(true)) => Some(name.as_str()),
            (Some(name), None) if traces.len() > 1 => Some(name.as_str()),
            _ => None,
        };
        for (k, mark) in drawn.iter().enumerate() {
            let label = if k == 0 { legend } else { None };
            labelled |= label.is_some();
            draw_mark(&mut chart, mark, label)?;
        }
    }

    if labelled {
        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .context("Failed to draw legend")?;
    }
    Ok(())
}

fn draw_mark<DB: DrawingBackend>(
    chart: &mut ChartContext<'_, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    mark: &Mark,
    label: Option<&str>,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let (anno, color) = match mark {
        Mark::Path { points, color } => (
            chart
                .draw_series(std::iter::once(PathElement::new(points.clone(), color.stroke_width(2))))
                .context("Failed to draw line series")?,
            *color,
        ),
        Mark::Dots { points, colors } => {
            let first = colors.first().copied().unwrap_or(BLUE.mix(1.0));
            (
                chart
                    .draw_series(
                        points
                            .iter()
                            .zip(colors.iter())
                            .map(|(&p, c)| Circle::new(p, 3, c.filled())),
                    )
                    .context("Failed to draw point series")?,
                first,
            )
        }
        Mark::Fill { from, to, color } => (
            chart
                .draw_series(std::iter::once(Rectangle::new([*from, *to], color.filled())))
                .context("Failed to draw bar")?,
            *color,
        ),
        Mark::Outline { from, to, color } => (
            chart
                .draw_series(std::iter::once(Rectangle::new([*from, *to], color.stroke_width(1))))
                .context("Failed to draw box")?,
            *color,
        ),
        Mark::Text { at, text, color } => {
            let style = TextStyle::from(("sans-serif", 12).into_font())
                .color(color)
                .pos(Pos::new(HPos::Center, VPos::Center));
            (
                chart
                    .draw_series(std::iter::once(Text::new(text.clone(), *at, style)))
                    .context("Failed to draw cell value")?,
                *color,
            )
        }
    };
    if let Some(label) = label {
        anno.label(label)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }
    Ok(())
}

/// Colour stops of the colorscales the renderer knows; unknown names fall
/// back to Viridis
fn colorscale_stops(name: &str) -> &'static [RGBColor] {
    const VIRIDIS: [RGBColor; 5] = [
        RGBColor(68, 1, 84),
        RGBColor(59, 82, 139),
        RGBColor(33, 145, 140),
        RGBColor(94, 201, 98),
        RGBColor(253, 231, 37),
    ];
    const PLASMA: [RGBColor; 5] = [
        RGBColor(13, 8, 135),
        RGBColor(126, 3, 168),
        RGBColor(204, 71, 120),
        RGBColor(248, 149, 64),
        RGBColor(240, 249, 33),
    ];
    const BLUES: [RGBColor; 3] = [RGBColor(247, 251, 255), RGBColor(107, 174, 214), RGBColor(8, 48, 107)];
    const REDS: [RGBColor; 3] = [RGBColor(255, 245, 240), RGBColor(251, 106, 74), RGBColor(103, 0, 13)];
    const GREYS: [RGBColor; 2] = [RGBColor(255, 255, 255), RGBColor(0, 0, 0)];
    const INFERNO: [RGBColor; 5] = [
        RGBColor(0, 0, 4),
        RGBColor(87, 16, 110),
        RGBColor(188, 55, 84),
        RGBColor(249, 142, 9),
        RGBColor(252, 255, 164),
    ];
    const ELECTRIC: [RGBColor; 6] = [
        RGBColor(0, 0, 0),
        RGBColor(30, 0, 100),
        RGBColor(120, 0, 100),
        RGBColor(160, 90, 0),
        RGBColor(230, 200, 0),
        RGBColor(255, 250, 220),
    ];

    match name.to_ascii_lowercase().as_str() {
        "plasma" => &PLASMA,
        "blues" => &BLUES,
        "reds" => &REDS,
        "greys" | "gray" | "grey" => &GREYS,
        "inferno" => &INFERNO,
        "electric" => &ELECTRIC,
        _ => &VIRIDIS,
    }
}

/// Colour at `t` in `[0, 1]` along a named colorscale
pub fn colorscale_color(name: &str, t: f64) -> RGBColor {
    let stops = colorscale_stops(name);
    let t = t.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
    let i = (t.floor() as usize).min(stops.len() - 2);
    let f = t - i as f64;
    let (a, b) = (stops[i], stops[i + 1]);
    let lerp = |u: u8, v: u8| (u as f64 + (v as f64 - u as f64) * f).round() as u8;
    RGBColor(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
}

/// Parse `#rrggbb` or a basic colour name
pub fn parse_color(color_str: Option<&str>) -> RGBColor {
    match color_str {
        Some(hex) if hex.starts_with('#') && hex.len() == 7 => {
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
            match (channel(1), channel(3), channel(5)) {
                (Some(r), Some(g), Some(b)) => RGBColor(r, g, b),
                _ => QUALITATIVE[0],
            }
        }
        Some("red") => RED,
        Some("green") => GREEN,
        Some("blue") => BLUE,
        Some("black") => BLACK,
        Some("yellow") => YELLOW,
        Some("cyan") => CYAN,
        Some("magenta") => MAGENTA,
        Some("white") => WHITE,
        _ => QUALITATIVE[0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subplot::CellSpec;

    fn trace(kind: TraceType, x: Series, y: Series) -> Trace {
        let mut t = Trace::new(kind);
        t.x = Some(x);
        t.y = Some(y);
        t
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color(Some("#ff0010")), RGBColor(255, 0, 16));
        assert_eq!(parse_color(Some("red")), RED);
        assert_eq!(parse_color(Some("#zzzzzz")), QUALITATIVE[0]);
        assert_eq!(parse_color(None), QUALITATIVE[0]);
    }

    #[test]
    fn test_colorscale_endpoints() {
        assert_eq!(colorscale_color("Viridis", 0.0), RGBColor(68, 1, 84));
        assert_eq!(colorscale_color("Viridis", 1.0), RGBColor(253, 231, 37));
        assert_eq!(colorscale_color("unknown", 0.0), colorscale_color("viridis", 0.0));
    }

    #[test]
    fn test_cell_rects_with_span_and_widths() {
        let mut fig = Figure::new(2, 2, None);
        fig.specs = Some(vec![
            vec![Some(CellSpec::colspan(2)), None],
            vec![None, None],
        ]);
        fig.column_widths = Some(vec![3.0, 1.0]);
        let t = trace(TraceType::Scatter, Series::from(vec![1.0]), Series::from(vec![1.0]));
        fig.add_trace(t.clone(), 1, 1).unwrap();
        fig.add_trace(t.clone(), 2, 1).unwrap();
        fig.add_trace(t, 2, 2).unwrap();

        let rects = cell_rects(&fig, 400, 200);
        assert_eq!(rects.len(), 3);
        assert_eq!((rects[0].x, rects[0].width, rects[0].height), (0, 400, 100));
        assert_eq!((rects[1].x, rects[1].y, rects[1].width), (0, 100, 300));
        assert_eq!((rects[2].x, rects[2].width), (300, 100));
    }

    #[test]
    fn test_axis_map_categorical() {
        let axis = AxisMap::from_series(
            [Series::from(vec!["a", "b"]), Series::from(vec!["b", "c"])].iter(),
        );
        assert_eq!(axis, AxisMap::Categorical(vec!["a".into(), "b".into(), "c".into()]));
        assert_eq!(axis.positions(&Series::from(vec!["c", "a"])), vec![2.5, 0.5]);
        assert_eq!(axis.label(1.5), "b");
    }

    #[test]
    fn test_grouped_bars_dodge() {
        let a = trace(TraceType::Bar, Series::from(vec!["x"]), Series::from(vec![2.0]));
        let b = trace(TraceType::Bar, Series::from(vec!["x"]), Series::from(vec![3.0]));
        let traces = vec![&a, &b];
        let mut ctx = SubplotContext::new(&traces, Some(BarMode::Group));
        let first = trace_marks(&a, 0, &mut ctx);
        let second = trace_marks(&b, 1, &mut ctx);
        match (&first[0], &second[0]) {
            (Mark::Fill { to: t1, .. }, Mark::Fill { from: f2, .. }) => assert!(t1.0 <= f2.0 + 1e-9),
            other => panic!("unexpected marks {:?}", other),
        }
    }

    #[test]
    fn test_stacked_bars_accumulate() {
        let a = trace(TraceType::Bar, Series::from(vec!["x"]), Series::from(vec![2.0]));
        let b = trace(TraceType::Bar, Series::from(vec!["x"]), Series::from(vec![3.0]));
        let traces = vec![&a, &b];
        let mut ctx = SubplotContext::new(&traces, Some(BarMode::Stack));
        trace_marks(&a, 0, &mut ctx);
        let second = trace_marks(&b, 1, &mut ctx);
        assert!(matches!(second[0], Mark::Fill { from: (_, base), to: (_, top), .. } if base == 2.0 && top == 5.0));
    }

    #[test]
    fn test_histogram_counts() {
        let mut h = Trace::new(TraceType::Histogram);
        h.x = Some(Series::from(vec!["a", "b", "a", "a"]));
        h.histfunc = Some("count".to_string());
        let traces = vec![&h];
        let mut ctx = SubplotContext::new(&traces, None);
        let marks = trace_marks(&h, 0, &mut ctx);
        let heights: Vec<f64> = marks
            .iter()
            .filter_map(|m| match m {
                Mark::Fill { to, .. } => Some(to.1),
                _ => None,
            })
            .collect();
        assert_eq!(heights, vec![3.0, 1.0]);
    }

    #[test]
    fn test_box_quartiles() {
        let mut b = Trace::new(TraceType::Box);
        b.y = Some(Series::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]));
        let traces = vec![&b];
        let mut ctx = SubplotContext::new(&traces, None);
        let marks = trace_marks(&b, 0, &mut ctx);
        assert!(matches!(marks[0], Mark::Fill { from: (_, q1), to: (_, q3), .. } if q1 == 2.0 && q3 == 4.0));
    }

    #[test]
    fn test_render_png_signature() {
        let mut fig = Figure::new(1, 1, None);
        fig.add_trace(
            trace(TraceType::Scatter, Series::from(vec![1.0, 2.0]), Series::from(vec![3.0, 4.0])),
            1,
            1,
        )
        .unwrap();
        let bytes = PlottersBackend::default().render(&fig).unwrap();
        assert_eq!(&bytes[0..4], &[0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn test_render_svg() {
        let mut fig = Figure::new(1, 1, None);
        fig.add_trace(
            trace(TraceType::Bar, Series::from(vec!["a", "b"]), Series::from(vec![1.0, 2.0])),
            1,
            1,
        )
        .unwrap();
        let backend = PlottersBackend::new(RenderOptions {
            format: OutputFormat::Svg,
            ..RenderOptions::default()
        });
        let bytes = backend.render(&fig).unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains("<svg"));
    }

    #[test]
    fn test_heatmap_range_and_annotations() {
        let mut h = Trace::new(TraceType::Heatmap);
        h.z = Some(vec![vec![0.0, 0.5], vec![0.5, 0.0]]);
        h.zmin = Some(-1.0);
        h.zmax = Some(1.0);
        h.colorscale = Some("Inferno".to_string());
        h.extra.insert("text_auto".to_string(), serde_json::Value::Bool(true));

        let marks = heatmap_marks(&h);
        assert_eq!(marks.len(), 8);
        let first_fill = marks.iter().find_map(|m| match m {
            Mark::Fill { color, .. } => Some(*color),
            _ => None,
        });
        assert_eq!(first_fill, Some(colorscale_color("Inferno", 0.5).mix(1.0)));
        assert!(marks
            .iter()
            .any(|m| matches!(m, Mark::Text { text, at, .. } if text == "0.50" && *at == (1.5, 0.5))));
    }

    #[test]
    fn test_new_colorscales_known() {
        assert_eq!(colorscale_color("Inferno", 0.0), RGBColor(0, 0, 4));
        assert_eq!(colorscale_color("Electric", 1.0), RGBColor(255, 250, 220));
    }

    #[test]
    fn test_render_rejects_oversized_canvas() {
        let mut fig = Figure::new(1, 1, None);
        fig.add_trace(
            trace(TraceType::Scatter, Series::from(vec![1.0, 2.0]), Series::from(vec![3.0, 4.0])),
            1,
            1,
        )
        .unwrap();
        let backend = PlottersBackend::new(RenderOptions {
            width: 4_000_000_000,
            height: 4_000_000_000,
            format: OutputFormat::Png,
        });
        assert!(backend.render(&fig).is_err());
    }
}
