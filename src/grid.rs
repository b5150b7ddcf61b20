//! Grid Composer: places chart descriptors into the slots of a layout
//! matrix and builds one figure out of them.
//!
//! A grid moves through `Empty → Populating → Ready → Built`. The figure is
//! built lazily by [`Grid::fig`] and cached; [`Grid::build`] and
//! [`Grid::rebuild`] always compose a fresh one. Adding charts drops the
//! cached figure.

use crate::chart::{ChartDescriptor, ChartKind};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::downsample::{self, Resampler, DEFAULT_MAX_POINTS, DEFAULT_THRESHOLD};
use crate::error::GridError;
use crate::figure::{Figure, SlotAxes};
use crate::layout::LayoutMatrix;
use crate::palette::{Palette, PaletteOptions};
use crate::subplot;
use crate::trace::{self, LegendTracker, TraceType};
use anyhow::Context;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GridOptions {
    /// Relative column widths, one per layout column
    #[serde(default)]
    pub column_widths: Option<Vec<f64>>,
    #[serde(default)]
    pub row_heights: Option<Vec<f64>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_downsample_threshold")]
    pub downsample_threshold: usize,
    #[serde(default = "default_max_points")]
    pub max_points: usize,
    #[serde(flatten)]
    pub palette: PaletteOptions,
    /// Layout keywords passed through to the figure verbatim
    #[serde(default)]
    pub layout: Map<String, Value>,
}

fn default_downsample_threshold() -> usize { DEFAULT_THRESHOLD }
fn default_max_points() -> usize { DEFAULT_MAX_POINTS }

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            column_widths: None,
            row_heights: None,
            title: None,
            downsample_threshold: default_downsample_threshold(),
            max_points: default_max_points(),
            palette: PaletteOptions::default(),
            layout: Map::new(),
        }
    }
}

impl GridOptions {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("Failed to parse grid options")
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn column_widths(mut self, widths: Vec<f64>) -> Self {
        self.column_widths = Some(widths);
        self
    }

    pub fn row_heights(mut self, heights: Vec<f64>) -> Self {
        self.row_heights = Some(heights);
        self
    }

    pub fn layout_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.layout.insert(key.into(), value.into());
        self
    }

    fn check(&self, layout: &LayoutMatrix) -> Result<(), GridError> {
        let check_len = |what: &str, values: &Option<Vec<f64>>, expected: usize| match values {
            Some(v) if v.len() != expected => Err(GridError::InvalidLayout(format!(
                "{} has {} entries but the layout has {}",
                what,
                v.len(),
                expected
            ))),
            Some(v) if v.iter().any(|w| !w.is_finite() || *w <= 0.0) => Err(GridError::InvalidLayout(
                format!("{} must be positive", what),
            )),
            _ => Ok(()),
        };
        check_len("column_widths", &self.column_widths, layout.cols())?;
        check_len("row_heights", &self.row_heights, layout.rows())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridState {
    Empty,
    Populating,
    Ready,
    Built,
}

#[derive(Debug, Clone)]
pub struct Grid {
    layout: LayoutMatrix,
    options: GridOptions,
    slots: Vec<Vec<ChartDescriptor>>,
    figure: Option<Figure>,
    diagnostics: Diagnostics,
}

impl Grid {
    pub fn new(layout: LayoutMatrix, options: GridOptions) -> Result<Self, GridError> {
        options.check(&layout)?;
        Ok(Self {
            layout,
            options,
            slots: Vec::new(),
            figure: None,
            diagnostics: Diagnostics::new(),
        })
    }

    pub fn from_cells(cells: Vec<Vec<usize>>) -> Result<Self, GridError> {
        Self::new(LayoutMatrix::new(cells)?, GridOptions::default())
    }

    /// Grid from layout text such as `"0 0; 1 2"`
    pub fn parse(layout: &str, options: GridOptions) -> Result<Self, GridError> {
        Self::new(layout.parse()?, options)
    }

    /// One row, one chart per column
    pub fn hstack(descriptors: Vec<ChartDescriptor>) -> Result<Self, GridError> {
        let mut grid = Self::new(LayoutMatrix::horizontal(descriptors.len())?, GridOptions::default())?;
        for d in descriptors {
            grid.add_one(d)?;
        }
        Ok(grid)
    }

    /// One column, one chart per row
    pub fn vstack(descriptors: Vec<ChartDescriptor>) -> Result<Self, GridError> {
        let mut grid = Self::new(LayoutMatrix::vertical(descriptors.len())?, GridOptions::default())?;
        for d in descriptors {
            grid.add_one(d)?;
        }
        Ok(grid)
    }

    /// Every chart overlaid in a single cell
    pub fn combine(descriptors: Vec<ChartDescriptor>) -> Result<Self, GridError> {
        let mut grid = Self::new(LayoutMatrix::horizontal(1)?, GridOptions::default())?;
        grid.add(descriptors)?;
        Ok(grid)
    }

    /// Replace the options, keeping the charts already added
    pub fn with_options(mut self, options: GridOptions) -> Result<Self, GridError> {
        options.check(&self.layout)?;
        self.options = options;
        self.figure = None;
        Ok(self)
    }

    /// Fill the next free slot with one or more charts drawn together.
    pub fn add(&mut self, descriptors: Vec<ChartDescriptor>) -> Result<&mut Self, GridError> {
        let max = self.layout.n_slots();
        if self.slots.len() >= max {
            return Err(GridError::TooManyObjects { max });
        }
        if descriptors.is_empty() {
            return Err(GridError::InvalidDescriptor(
                "a slot needs at least one chart".to_string(),
            ));
        }
        if let Some(d) = descriptors.iter().find(|d| !d.kind().is_arrangeable()) {
            return Err(GridError::NotArrangeable {
                kind: d.kind().display_name().to_string(),
            });
        }

        tracing::debug!(slot = self.slots.len(), charts = descriptors.len(), "slot filled");
        self.slots.push(descriptors);
        self.figure = None;
        Ok(self)
    }

    pub fn add_one(&mut self, descriptor: ChartDescriptor) -> Result<&mut Self, GridError> {
        self.add(vec![descriptor])
    }

    pub fn state(&self) -> GridState {
        if self.figure.is_some() {
            GridState::Built
        } else if self.slots.is_empty() {
            GridState::Empty
        } else if self.slots.len() == self.layout.n_slots() {
            GridState::Ready
        } else {
            GridState::Populating
        }
    }

    pub fn layout(&self) -> &LayoutMatrix {
        &self.layout
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    /// Every descriptor, in slot order
    pub fn descriptors(&self) -> impl Iterator<Item = &ChartDescriptor> {
        self.slots.iter().flatten()
    }

    /// Warnings produced by the last build
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Compose a fresh figure, replacing any cached one.
    pub fn build(&mut self) -> Result<&Figure, GridError> {
        // a failed build leaves the cached figure in place
        let figure = self.compose()?;
        Ok(self.figure.insert(figure))
    }

    /// The figure, built on first access and cached afterwards.
    pub fn fig(&mut self) -> Result<&Figure, GridError> {
        let figure = match self.figure.take() {
            Some(figure) => figure,
            None => self.compose()?,
        };
        Ok(self.figure.insert(figure))
    }

    /// Drop the cached figure and build again
    pub fn rebuild(&mut self) -> Result<&Figure, GridError> {
        self.build()
    }

    pub fn into_figure(mut self) -> Result<(Figure, Diagnostics), GridError> {
        let figure = match self.figure.take() {
            Some(figure) => figure,
            None => self.compose()?,
        };
        Ok((figure, self.diagnostics))
    }

    /// Render the figure with the default backend; returns the image path.
    pub fn show(&mut self) -> Result<PathBuf, GridError> {
        Ok(self.fig()?.show()?)
    }

    fn compose(&mut self) -> Result<Figure, GridError> {
        let expected = self.layout.n_slots();
        if self.slots.len() != expected {
            return Err(GridError::SlotCountMismatch {
                expected,
                got: self.slots.len(),
            });
        }
        let mut diagnostics = Diagnostics::new();

        // every slot must agree on one backend type
        let slot_types = self
            .slots
            .iter()
            .map(|slot| slot.iter().map(|d| d.kind().trace_type()).collect())
            .collect::<Result<Vec<Vec<TraceType>>, GridError>>()?;
        for (slot, types) in slot_types.iter().enumerate() {
            subplot::slot_type(slot, types)?;
        }

        let mut specs = subplot::base_specs(&self.layout);
        if let Some(specs) = specs.as_mut() {
            subplot::annotate(specs, &self.layout, &slot_types)?;
        }

        let palette = {
            let refs: Vec<&ChartDescriptor> = self.descriptors().collect();
            Palette::allocate(&refs, &self.options.palette, &mut diagnostics)
        };
        palette.apply(self.slots.iter_mut().flatten());

        for d in self.descriptors() {
            scan_missing(d, &mut diagnostics)?;
        }

        let mut figure = Figure::new(self.layout.rows(), self.layout.cols(), specs);
        figure.column_widths = self.options.column_widths.clone();
        figure.row_heights = self.options.row_heights.clone();

        self.infer_axis_titles(&mut figure);

        let mut legend = LegendTracker::new();
        for (slot, i, j) in self.layout.anchors() {
            for d in &self.slots[slot] {
                for trace in trace::project(d, &mut legend)? {
                    figure.add_trace(trace, i + 1, j + 1)?;
                }
            }
        }

        figure.layout.barmode = self
            .descriptors()
            .filter(|d| d.kind() == ChartKind::Histogram)
            .find_map(|d| d.histogram().map(|h| h.barmode));

        if let Some(shared) = self.shared_categories() {
            figure.layout.legend_itemclick = Some(false);
            diagnostics.warn(
                DiagnosticKind::LegendClickDisabled,
                format!(
                    "category '{}' appears in more than one subplot; legend click-to-hide is disabled",
                    shared
                ),
            );
        }

        figure.layout.title = self.options.title.clone();
        figure.update_layout(self.options.layout.clone());

        let refs: Vec<&ChartDescriptor> = self.descriptors().collect();
        if downsample::needs_downsampling(&refs, self.options.downsample_threshold) {
            let total = downsample::total_points(refs.iter().copied());
            figure.resampler = Some(Resampler::new(self.options.max_points));
            diagnostics.warn(
                DiagnosticKind::Downsampled,
                format!(
                    "about {} points to draw; line and scatter traces are resampled to {} points each",
                    total, self.options.max_points
                ),
            );
        }

        tracing::debug!(
            rows = figure.rows,
            cols = figure.cols,
            traces = figure.placements.len(),
            spans = figure.specs.is_some(),
            "figure composed"
        );
        self.diagnostics = diagnostics;
        Ok(figure)
    }

    /// Hoist an axis title to the outer grid when every titled chart agrees
    /// on it; otherwise title each slot whose own charts agree.
    fn infer_axis_titles(&self, figure: &mut Figure) {
        let titled = |d: &&ChartDescriptor| d.kind().supports_axis_titles();

        let x_shared = agreed(self.descriptors().filter(titled).map(|d| d.x_axis_title()));
        let y_shared = agreed(self.descriptors().filter(titled).map(|d| d.y_axis_title()));

        for (slot, i, j) in self.layout.anchors() {
            let charts = || self.slots[slot].iter().filter(titled);
            let x_title = match x_shared {
                Some(_) => None,
                None => agreed(charts().map(|d| d.x_axis_title())),
            };
            let y_title = match y_shared {
                Some(_) => None,
                None => agreed(charts().map(|d| d.y_axis_title())),
            };
            if x_title.is_some() || y_title.is_some() {
                figure.layout.slot_axes.push(SlotAxes {
                    row: i + 1,
                    col: j + 1,
                    x_title,
                    y_title,
                });
            }
        }

        figure.layout.x_title = x_shared;
        figure.layout.y_title = y_shared;
    }

    /// First category label carried by two different slots
    fn shared_categories(&self) -> Option<String> {
        let mut seen: Vec<HashSet<&str>> = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let labels: HashSet<&str> = slot
                .iter()
                .filter_map(ChartDescriptor::assignment)
                .flat_map(|a| a.labels())
                .collect();
            for earlier in &seen {
                let mut common: Vec<&str> = labels.intersection(earlier).copied().collect();
                common.sort_unstable();
                if let Some(first) = common.first() {
                    return Some(first.to_string());
                }
            }
            seen.push(labels);
        }
        None
    }
}

/// The title every item agrees on, if there is at least one and none differ
fn agreed(titles: impl Iterator<Item = Option<String>>) -> Option<String> {
    let mut agreed: Option<String> = None;
    for title in titles {
        let title = title?;
        match &agreed {
            Some(existing) if *existing != title => return None,
            Some(_) => {}
            None => agreed = Some(title),
        }
    }
    agreed
}

/// Warn about NaN or blank entries in the inputs a chart plots
fn scan_missing(d: &ChartDescriptor, diagnostics: &mut Diagnostics) -> Result<(), GridError> {
    for (axis, selector) in [("x", d.x()), ("y", d.y())] {
        let selector = match selector {
            Some(s) => s,
            None => continue,
        };
        let missing = d.resolve(selector)?.missing_count();
        if missing > 0 {
            let source = selector
                .column_name()
                .map(|c| format!("column '{}'", c))
                .unwrap_or_else(|| format!("{} values", axis));
            diagnostics.warn(
                DiagnosticKind::MissingValues,
                format!("{}: {} missing value(s) in {}", d.display_name(), missing, source),
            );
        }
    }
    if let Some(z) = d.matrix() {
        let missing = z.iter().flatten().filter(|v| v.is_nan()).count();
        if missing > 0 {
            diagnostics.warn(
                DiagnosticKind::MissingValues,
                format!("{}: {} missing value(s) in the matrix", d.display_name(), missing),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart;
    use crate::data::{PlotData, Series};
    use crate::subplot::CellSpec;

    fn line(y: Vec<f64>) -> ChartDescriptor {
        let n = y.len();
        chart::line().x(Series::index(n)).y(y).build().unwrap()
    }

    fn colored_bar(categories: Vec<&str>) -> ChartDescriptor {
        let n = categories.len();
        chart::bar()
            .x(Series::index(n))
            .y(vec![1.0; n])
            .color(categories)
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_requires_every_slot() {
        let mut grid = Grid::from_cells(vec![vec![0], vec![1]]).unwrap();
        grid.add_one(line(vec![1.0])).unwrap();
        assert!(matches!(
            grid.build(),
            Err(GridError::SlotCountMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn test_too_many_adds() {
        let mut grid = Grid::from_cells(vec![vec![0]]).unwrap();
        grid.add_one(line(vec![1.0])).unwrap();
        let err = grid.add_one(line(vec![2.0])).unwrap_err();
        assert!(matches!(err, GridError::TooManyObjects { max: 1 }));
    }

    #[test]
    fn test_state_transitions() {
        let mut grid = Grid::from_cells(vec![vec![0, 1]]).unwrap();
        assert_eq!(grid.state(), GridState::Empty);
        grid.add_one(line(vec![1.0])).unwrap();
        assert_eq!(grid.state(), GridState::Populating);
        grid.add_one(line(vec![2.0])).unwrap();
        assert_eq!(grid.state(), GridState::Ready);
        grid.fig().unwrap();
        assert_eq!(grid.state(), GridState::Built);
    }

    #[test]
    fn test_fig_is_cached() {
        let mut grid = Grid::hstack(vec![line(vec![1.0, 2.0])]).unwrap();
        let first = grid.fig().unwrap().clone();
        let second = grid.fig().unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(grid.rebuild().unwrap(), &first);
    }

    #[test]
    fn test_mixed_kinds_in_one_slot() {
        let bar = chart::bar().x(vec!["a"]).y(vec![1.0]).build().unwrap();
        let mut grid = Grid::combine(vec![line(vec![1.0]), bar]).unwrap();
        assert!(matches!(grid.build(), Err(GridError::MixedChartKinds { slot: 0 })));
    }

    #[test]
    fn test_line_and_scatter_share_a_slot() {
        let scatter = chart::scatter().x(vec![1.0]).y(vec![1.0]).build().unwrap();
        let mut grid = Grid::combine(vec![line(vec![1.0]), scatter]).unwrap();
        let fig = grid.build().unwrap();
        assert_eq!(fig.placements.len(), 2);
        assert!(fig.placements.iter().all(|p| p.row == 1 && p.col == 1));
    }

    #[test]
    fn test_not_arrangeable_kinds() {
        let table = PlotData::from_columns(vec![("a", Series::from(vec![1.0, 2.0]))]);
        let dist = chart::distribution(table).build().unwrap();
        let mut grid = Grid::from_cells(vec![vec![0]]).unwrap();
        let err = grid.add_one(dist).unwrap_err();
        assert!(matches!(err, GridError::NotArrangeable { .. }));
        assert!(err.to_string().contains("cannot be arranged"));
    }

    #[test]
    fn test_spanning_layout_placements() {
        let mut grid = Grid::from_cells(vec![vec![0, 0], vec![1, 2]]).unwrap();
        grid.add_one(line(vec![1.0])).unwrap();
        grid.add_one(line(vec![2.0])).unwrap();
        grid.add_one(line(vec![3.0])).unwrap();
        let fig = grid.build().unwrap();

        let cells: Vec<(usize, usize)> = fig.placements.iter().map(|p| (p.row, p.col)).collect();
        assert_eq!(cells, vec![(1, 1), (2, 1), (2, 2)]);
        let specs = fig.specs.as_ref().unwrap();
        assert_eq!(
            specs[0][0],
            Some(CellSpec {
                rowspan: None,
                colspan: Some(2),
                kind: Some(TraceType::Scatter)
            })
        );
    }

    #[test]
    fn test_shared_categories_disable_legend_click() {
        let mut grid = Grid::hstack(vec![colored_bar(vec!["A", "B"]), colored_bar(vec!["B", "A"])]).unwrap();
        let fig = grid.build().unwrap();
        assert_eq!(fig.layout.legend_itemclick, Some(false));
        assert!(grid.diagnostics().contains(DiagnosticKind::LegendClickDisabled));
    }

    #[test]
    fn test_distinct_categories_keep_legend_click() {
        let mut grid = Grid::hstack(vec![colored_bar(vec!["A", "B"]), colored_bar(vec!["C", "D"])]).unwrap();
        let fig = grid.build().unwrap();
        assert_eq!(fig.layout.legend_itemclick, None);
        // every category shows up once in the legend
        let shown = fig.traces().filter(|t| t.showlegend == Some(true)).count();
        assert_eq!(shown, 4);
    }

    #[test]
    fn test_axis_title_hoisting() {
        let table = PlotData::from_columns(vec![
            ("t", Series::from(vec![1.0, 2.0])),
            ("a", Series::from(vec![3.0, 4.0])),
            ("b", Series::from(vec![5.0, 6.0])),
        ]);
        let a = chart::line().data(table.clone()).x("t").y("a").build().unwrap();
        let b = chart::line().data(table).x("t").y("b").build().unwrap();
        let mut grid = Grid::vstack(vec![a, b]).unwrap();
        let fig = grid.build().unwrap();

        assert_eq!(fig.layout.x_title.as_deref(), Some("t"));
        assert_eq!(fig.layout.y_title, None);
        assert_eq!(fig.layout.slot_axes.len(), 2);
        assert_eq!(fig.layout.slot_axes[1].y_title.as_deref(), Some("b"));
        assert_eq!(fig.layout.slot_axes[1].x_title, None);
    }

    #[test]
    fn test_missing_values_warned() {
        let mut grid = Grid::hstack(vec![line(vec![1.0, f64::NAN, 3.0])]).unwrap();
        grid.build().unwrap();
        assert!(grid.diagnostics().contains(DiagnosticKind::MissingValues));
    }

    #[test]
    fn test_downsampling_attached() {
        let big = line(vec![0.5; 80_000]);
        let mut grid = Grid::hstack(vec![big]).unwrap();
        let fig = grid.build().unwrap();
        assert!(fig.is_downsampled());
        let warning = grid.diagnostics().of_kind(DiagnosticKind::Downsampled).next().unwrap();
        // x and y are both given directly
        assert!(warning.message.contains("160000"));
    }

    #[test]
    fn test_options_validation_and_layout() {
        let layout = LayoutMatrix::new(vec![vec![0, 1]]).unwrap();
        let bad = GridOptions::default().column_widths(vec![1.0]);
        assert!(Grid::new(layout.clone(), bad).is_err());

        let options = GridOptions::default()
            .column_widths(vec![0.7, 0.3])
            .title("Overview")
            .layout_option("width", 1200);
        let mut grid = Grid::new(layout, options).unwrap();
        grid.add_one(line(vec![1.0])).unwrap();
        grid.add_one(line(vec![2.0])).unwrap();
        let fig = grid.build().unwrap();
        assert_eq!(fig.column_widths, Some(vec![0.7, 0.3]));
        assert_eq!(fig.layout.title.as_deref(), Some("Overview"));
        assert_eq!(fig.layout.size(), (Some(1200), None));
    }

    #[test]
    fn test_options_from_json() {
        let options = GridOptions::from_json(
            r#"{"title": "T", "heatmap_threshold": 5, "layout": {"height": 400}}"#,
        )
        .unwrap();
        assert_eq!(options.title.as_deref(), Some("T"));
        assert_eq!(options.palette.heatmap_threshold, 5);
        assert_eq!(options.palette.default_colorscale, "Viridis");
        assert_eq!(options.downsample_threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_add_invalidates_cache() {
        let mut grid = Grid::from_cells(vec![vec![0, 1]]).unwrap();
        grid.add_one(line(vec![1.0])).unwrap();
        assert!(grid.fig().is_err());
        grid.add_one(line(vec![2.0])).unwrap();
        assert_eq!(grid.fig().unwrap().placements.len(), 2);
    }

    #[test]
    fn test_failed_build_keeps_cached_figure() {
        let mut grid = Grid::from_cells(vec![vec![0, 1]]).unwrap();
        grid.add_one(line(vec![1.0])).unwrap();
        grid.add_one(line(vec![2.0])).unwrap();
        let built = grid.build().unwrap().clone();

        // a third slot no longer matches the two-slot layout
        grid.slots.push(vec![line(vec![3.0])]);
        assert!(matches!(
            grid.build(),
            Err(GridError::SlotCountMismatch { expected: 2, got: 3 })
        ));
        assert_eq!(grid.state(), GridState::Built);
        assert_eq!(grid.fig().unwrap(), &built);
    }

    #[test]
    fn test_vstack_line_over_bar() {
        let top = chart::line().x(vec![1.0, 2.0, 3.0]).y(vec![1.0, 4.0, 9.0]).build().unwrap();
        let bottom = chart::bar().x(vec!["a", "b"]).y(vec![5.0, 2.0]).build().unwrap();
        let mut grid = Grid::vstack(vec![top, bottom]).unwrap();
        let fig = grid.fig().unwrap();

        assert_eq!((fig.rows, fig.cols), (2, 1));
        assert_eq!(fig.placements.len(), 2);

        let first = &fig.placements[0];
        assert_eq!((first.row, first.col), (1, 1));
        assert_eq!(first.trace.kind, TraceType::Scatter);
        assert_eq!(first.trace.mode.as_deref(), Some("lines"));

        let second = &fig.placements[1];
        assert_eq!((second.row, second.col), (2, 1));
        assert_eq!(second.trace.kind, TraceType::Bar);

        let spans = fig
            .specs
            .iter()
            .flatten()
            .flatten()
            .flatten()
            .any(|c| c.rowspan.is_some() || c.colspan.is_some());
        assert!(!spans);
        assert!(fig.resampler.is_none());
    }

    #[test]
    fn test_routed_colorscales_stay_per_chart() {
        let routed = |scale: &str| {
            chart::scatter()
                .x(vec![1.0, 2.0, 3.0])
                .y(vec![1.0, 2.0, 3.0])
                .color(vec!["a", "b", "c"])
                .continuous_color(true)
                .colorscale(scale)
                .build()
                .unwrap()
        };
        let mut grid = Grid::hstack(vec![routed("Viridis"), routed("Plasma")]).unwrap();
        let fig = grid.fig().unwrap();

        let scale_in = |col: usize| {
            fig.placements
                .iter()
                .find(|p| p.col == col)
                .and_then(|p| p.trace.marker.as_ref())
                .and_then(|m| m.colorscale.clone())
        };
        assert_eq!(scale_in(1).as_deref(), Some("Viridis"));
        assert_eq!(scale_in(2).as_deref(), Some("Plasma"));
        assert!(grid.diagnostics().contains(DiagnosticKind::MultipleColorscales));
    }

    #[test]
    fn test_downsampling_threshold_is_exclusive() {
        let options = GridOptions {
            downsample_threshold: 6,
            ..GridOptions::default()
        };
        // three x and three y values
        let mut at_limit = Grid::hstack(vec![line(vec![1.0, 2.0, 3.0])])
            .unwrap()
            .with_options(options.clone())
            .unwrap();
        assert!(!at_limit.build().unwrap().is_downsampled());

        let mut over = Grid::hstack(vec![line(vec![1.0, 2.0, 3.0, 4.0])])
            .unwrap()
            .with_options(options)
            .unwrap();
        assert!(over.build().unwrap().is_downsampled());
        assert!(over.diagnostics().contains(DiagnosticKind::Downsampled));
    }
}
