//! Chart descriptors: one value object per requested chart.
//!
//! A descriptor records *what* to draw (kind, data, selectors, display
//! options). It is validated once by [`ChartBuilder::build`] and never changes
//! afterwards, except for the colour assignment written by the palette
//! allocator when the descriptor is placed in a grid.

use crate::data::{PlotData, Series};
use crate::error::GridError;
use crate::trace::TraceType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Scatter,
    Line,
    Bar,
    Box,
    Histogram,
    /// 2D density of x/y
    Heatmap,
    /// Matrix of values shown as coloured cells
    Image,
    /// Overlaid density histograms of several columns
    Distribution,
    /// Scatter-plot matrix of the numeric columns of a table
    Matrix,
    /// Stand-alone annotated matrix (correlation, confusion)
    MatrixHeatmap,
    /// Line whose segments take the colour of their starting point
    ColoredLine,
}

impl ChartKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            ChartKind::Scatter => "Scatter",
            ChartKind::Line => "Line",
            ChartKind::Bar => "Bar",
            ChartKind::Box => "Box",
            ChartKind::Histogram => "Histogram",
            ChartKind::Heatmap => "Density Map",
            ChartKind::Image => "Image",
            ChartKind::Distribution => "Distribution Plot",
            ChartKind::Matrix => "Scatter Matrix",
            ChartKind::MatrixHeatmap => "Heatmap",
            ChartKind::ColoredLine => "Colored Line",
        }
    }

    /// Kinds whose rows can be split into coloured categories
    pub fn supports_color(&self) -> bool {
        matches!(
            self,
            ChartKind::Scatter
                | ChartKind::Line
                | ChartKind::Bar
                | ChartKind::Box
                | ChartKind::Histogram
                | ChartKind::ColoredLine
        )
    }

    /// Kinds drawn on an x/y plane with titled axes
    pub fn supports_axis_titles(&self) -> bool {
        self.supports_color() || matches!(self, ChartKind::Heatmap)
    }

    pub fn is_arrangeable(&self) -> bool {
        !matches!(
            self,
            ChartKind::Distribution | ChartKind::Matrix | ChartKind::MatrixHeatmap | ChartKind::ColoredLine
        )
    }

    /// Backend trace type this kind projects to
    pub fn trace_type(&self) -> Result<TraceType, GridError> {
        match self {
            ChartKind::Scatter | ChartKind::Line => Ok(TraceType::Scatter),
            ChartKind::Bar => Ok(TraceType::Bar),
            ChartKind::Box => Ok(TraceType::Box),
            ChartKind::Histogram => Ok(TraceType::Histogram),
            ChartKind::Heatmap => Ok(TraceType::Histogram2d),
            ChartKind::Image => Ok(TraceType::Heatmap),
            ChartKind::Distribution | ChartKind::Matrix | ChartKind::MatrixHeatmap | ChartKind::ColoredLine => {
                Err(GridError::NotArrangeable {
                    kind: self.display_name().to_string(),
                })
            }
        }
    }
}

/// Where an axis or colour grouping takes its values from.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Name of a column of the descriptor's table
    Column(String),
    /// Values given directly
    Values(Series),
}

impl Selector {
    pub fn column_name(&self) -> Option<&str> {
        match self {
            Selector::Column(name) => Some(name),
            Selector::Values(_) => None,
        }
    }
}

impl From<&str> for Selector {
    fn from(name: &str) -> Self {
        Selector::Column(name.to_string())
    }
}

impl From<String> for Selector {
    fn from(name: String) -> Self {
        Selector::Column(name)
    }
}

impl From<Series> for Selector {
    fn from(values: Series) -> Self {
        Selector::Values(values)
    }
}

impl From<Vec<f64>> for Selector {
    fn from(values: Vec<f64>) -> Self {
        Selector::Values(Series::from(values))
    }
}

impl From<Vec<i64>> for Selector {
    fn from(values: Vec<i64>) -> Self {
        Selector::Values(Series::from(values))
    }
}

impl From<Vec<&str>> for Selector {
    fn from(values: Vec<&str>) -> Self {
        Selector::Values(Series::from(values))
    }
}

impl From<Vec<String>> for Selector {
    fn from(values: Vec<String>) -> Self {
        Selector::Values(Series::from(values))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Table(PlotData),
    Raw,
    Matrix(Vec<Vec<f64>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl HistFunc {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistFunc::Count => "count",
            HistFunc::Sum => "sum",
            HistFunc::Avg => "avg",
            HistFunc::Min => "min",
            HistFunc::Max => "max",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    #[serde(rename = "v")]
    Vertical,
    #[serde(rename = "h")]
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarMode {
    Group,
    Relative,
    Overlay,
    Stack,
}

/// Histogram settings, inferred at build time when not given
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramOptions {
    pub histfunc: HistFunc,
    pub orientation: Orientation,
    pub barmode: BarMode,
}

/// Colour written onto a descriptor by the palette allocator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorAssignment {
    /// Uncoloured chart, drawn as one series under a synthetic label
    Single { label: String, color: String },
    /// One colour per category, in order of first appearance
    Discrete(Vec<(String, Option<String>)>),
    /// Continuous colorscale keyed by a per-point category index
    Continuous { colorscale: String, title: String },
}

impl ColorAssignment {
    /// Legend labels this assignment contributes
    pub fn labels(&self) -> Vec<&str> {
        match self {
            ColorAssignment::Single { label, .. } => vec![label.as_str()],
            ColorAssignment::Discrete(pairs) => pairs.iter().map(|(c, _)| c.as_str()).collect(),
            ColorAssignment::Continuous { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartDescriptor {
    pub(crate) kind: ChartKind,
    pub(crate) data: DataSource,
    pub(crate) x: Option<Selector>,
    pub(crate) y: Option<Selector>,
    pub(crate) color: Option<Selector>,
    pub(crate) name: Option<String>,
    pub(crate) title: Option<String>,
    pub(crate) x_title: Option<String>,
    pub(crate) y_title: Option<String>,
    pub(crate) continuous_color: bool,
    pub(crate) colorscale: Option<String>,
    pub(crate) histogram: Option<HistogramOptions>,
    pub(crate) columns: Vec<String>,
    pub(crate) options: Map<String, Value>,
    pub(crate) assigned: Option<ColorAssignment>,
}

impl ChartDescriptor {
    pub fn kind(&self) -> ChartKind {
        self.kind
    }

    pub fn data(&self) -> &DataSource {
        &self.data
    }

    pub fn x(&self) -> Option<&Selector> {
        self.x.as_ref()
    }

    pub fn y(&self) -> Option<&Selector> {
        self.y.as_ref()
    }

    pub fn color(&self) -> Option<&Selector> {
        self.color.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn histogram(&self) -> Option<&HistogramOptions> {
        self.histogram.as_ref()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn continuous_color(&self) -> bool {
        self.continuous_color
    }

    pub fn colorscale(&self) -> Option<&str> {
        self.colorscale.as_deref()
    }

    /// Colour written by the palette allocator, if the descriptor has been
    /// placed in a built grid.
    pub fn assignment(&self) -> Option<&ColorAssignment> {
        self.assigned.as_ref()
    }

    pub(crate) fn set_assignment(&mut self, assignment: Option<ColorAssignment>) {
        self.assigned = assignment;
    }

    /// Name shown in legends for an uncoloured series
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.kind.display_name())
    }

    pub fn table(&self) -> Option<&PlotData> {
        match &self.data {
            DataSource::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn matrix(&self) -> Option<&Vec<Vec<f64>>> {
        match &self.data {
            DataSource::Matrix(z) => Some(z),
            _ => None,
        }
    }

    /// Resolve a selector against this descriptor's data
    pub fn resolve(&self, selector: &Selector) -> Result<Series, GridError> {
        match selector {
            Selector::Values(values) => Ok(values.clone()),
            Selector::Column(name) => {
                let table = self.table().ok_or_else(|| {
                    GridError::InvalidDescriptor(format!(
                        "column '{}' selected but no table was given",
                        name
                    ))
                })?;
                table
                    .column(name)
                    .ok_or_else(|| GridError::ColumnNotFound(name.clone()))
            }
        }
    }

    /// Resolved x and y, with a positional index standing in for whichever
    /// one is missing. Histograms and box plots keep the missing axis as
    /// `None`: counting, or one box over all values.
    pub fn axes(&self) -> Result<(Option<Series>, Option<Series>), GridError> {
        let x = self.x.as_ref().map(|s| self.resolve(s)).transpose()?;
        let y = self.y.as_ref().map(|s| self.resolve(s)).transpose()?;

        if matches!(self.kind, ChartKind::Histogram | ChartKind::Box) {
            return Ok((x, y));
        }

        Ok(match (x, y) {
            (Some(x), None) => {
                let n = x.len();
                (Some(x), Some(Series::index(n)))
            }
            (None, Some(y)) => (Some(Series::index(y.len())), Some(y)),
            other => other,
        })
    }

    pub fn color_series(&self) -> Result<Option<Series>, GridError> {
        self.color.as_ref().map(|s| self.resolve(s)).transpose()
    }

    /// Label used for colorbars and colorscale bindings
    pub fn color_label(&self) -> String {
        match &self.color {
            Some(Selector::Column(name)) => name.clone(),
            _ => format!("{} color", self.display_name()),
        }
    }

    /// Explicit x title, otherwise the x column name
    pub fn x_axis_title(&self) -> Option<String> {
        self.x_title
            .clone()
            .or_else(|| self.x.as_ref().and_then(|s| s.column_name().map(String::from)))
    }

    pub fn y_axis_title(&self) -> Option<String> {
        self.y_title
            .clone()
            .or_else(|| self.y.as_ref().and_then(|s| s.column_name().map(String::from)))
    }

    /// Consume the descriptor into a figure of its own.
    pub fn into_figure(
        self,
    ) -> Result<(crate::figure::Figure, crate::diagnostics::Diagnostics), GridError> {
        crate::composite::standalone(self, crate::grid::GridOptions::default())
    }
}

/// Builder validating a descriptor before it can be used.
#[derive(Debug, Clone)]
pub struct ChartBuilder {
    descriptor: ChartDescriptor,
    histfunc: Option<HistFunc>,
    orientation: Option<Orientation>,
    barmode: Option<BarMode>,
    join_bars: bool,
}

impl ChartBuilder {
    pub fn new(kind: ChartKind) -> Self {
        Self {
            descriptor: ChartDescriptor {
                kind,
                data: DataSource::Raw,
                x: None,
                y: None,
                color: None,
                name: None,
                title: None,
                x_title: None,
                y_title: None,
                continuous_color: false,
                colorscale: None,
                histogram: None,
                columns: Vec::new(),
                options: Map::new(),
                assigned: None,
            },
            histfunc: None,
            orientation: None,
            barmode: None,
            join_bars: false,
        }
    }

    pub fn data(mut self, table: PlotData) -> Self {
        self.descriptor.data = DataSource::Table(table);
        self
    }

    pub fn x(mut self, selector: impl Into<Selector>) -> Self {
        self.descriptor.x = Some(selector.into());
        self
    }

    pub fn y(mut self, selector: impl Into<Selector>) -> Self {
        self.descriptor.y = Some(selector.into());
        self
    }

    pub fn color(mut self, selector: impl Into<Selector>) -> Self {
        self.descriptor.color = Some(selector.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.descriptor.name = Some(name.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.descriptor.title = Some(title.into());
        self
    }

    pub fn x_title(mut self, title: impl Into<String>) -> Self {
        self.descriptor.x_title = Some(title.into());
        self
    }

    pub fn y_title(mut self, title: impl Into<String>) -> Self {
        self.descriptor.y_title = Some(title.into());
        self
    }

    /// Opt into colorscale routing when the colour grouping has many values
    pub fn continuous_color(mut self, enabled: bool) -> Self {
        self.descriptor.continuous_color = enabled;
        self
    }

    pub fn colorscale(mut self, name: impl Into<String>) -> Self {
        self.descriptor.colorscale = Some(name.into());
        self
    }

    /// Columns used by distribution plots
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.descriptor.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Backend keyword effect passed through verbatim
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.descriptor.options.insert(key.into(), value.into());
        self
    }

    pub fn histfunc(mut self, histfunc: HistFunc) -> Self {
        self.histfunc = Some(histfunc);
        self
    }

    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn barmode(mut self, barmode: BarMode) -> Self {
        self.barmode = Some(barmode);
        self
    }

    pub fn join_bars(mut self, join: bool) -> Self {
        self.join_bars = join;
        self
    }

    pub fn build(self) -> Result<ChartDescriptor, GridError> {
        let ChartBuilder {
            mut descriptor,
            histfunc,
            orientation,
            barmode,
            join_bars,
        } = self;
        let kind = descriptor.kind;

        if descriptor.options.contains_key("name") {
            return Err(GridError::InvalidDescriptor(
                "option 'name' is reserved, use name() instead".to_string(),
            ));
        }

        match kind {
            ChartKind::Image | ChartKind::MatrixHeatmap => {
                let z = descriptor.matrix().ok_or_else(|| {
                    GridError::InvalidDescriptor(format!("{} needs a matrix of values", kind.display_name()))
                })?;
                let width = z.first().map(Vec::len).unwrap_or(0);
                if width == 0 || z.iter().any(|row| row.len() != width) {
                    return Err(GridError::InvalidDescriptor(format!(
                        "{} matrix must be non-empty and rectangular",
                        kind.display_name()
                    )));
                }
                return Ok(descriptor);
            }
            ChartKind::Distribution | ChartKind::Matrix => {
                let table = descriptor.table().ok_or_else(|| {
                    GridError::InvalidDescriptor(format!("{} needs a table", kind.display_name()))
                })?;
                for col in &descriptor.columns {
                    if !table.has_column(col) {
                        return Err(GridError::ColumnNotFound(col.clone()));
                    }
                }
                if let Some(color) = &descriptor.color {
                    descriptor.resolve(color)?;
                }
                return Ok(descriptor);
            }
            _ => {}
        }

        if descriptor.x.is_none() && descriptor.y.is_none() {
            return Err(GridError::InvalidDescriptor(format!(
                "{} needs at least one of x or y",
                kind.display_name()
            )));
        }

        if kind == ChartKind::ColoredLine && (descriptor.x.is_none() || descriptor.y.is_none() || descriptor.color.is_none()) {
            return Err(GridError::InvalidDescriptor(
                "Colored Line needs x, y and color".to_string(),
            ));
        }

        if descriptor.color.is_some() && !kind.supports_color() {
            return Err(GridError::InvalidDescriptor(format!(
                "{} does not support colour grouping",
                kind.display_name()
            )));
        }

        let (x, y) = descriptor.axes()?;
        if let (Some(x), Some(y)) = (&x, &y) {
            if x.len() != y.len() {
                return Err(GridError::InvalidDescriptor(format!(
                    "x and y lengths differ ({} vs {})",
                    x.len(),
                    y.len()
                )));
            }
        }

        if let Some(color) = descriptor.color_series()? {
            let n = x.as_ref().or(y.as_ref()).map(Series::len).unwrap_or(0);
            if color.len() != n {
                return Err(GridError::InvalidDescriptor(format!(
                    "colour sequence has {} values but the data has {}",
                    color.len(),
                    n
                )));
            }
        }

        if kind == ChartKind::Histogram {
            infer_histogram(&mut descriptor, x, y, histfunc, orientation, barmode, join_bars);
        }

        Ok(descriptor)
    }
}

/// Fill in histfunc, barmode, orientation and axis titles the way a reader
/// would expect from the data's shape.
fn infer_histogram(
    d: &mut ChartDescriptor,
    x: Option<Series>,
    y: Option<Series>,
    histfunc: Option<HistFunc>,
    orientation: Option<Orientation>,
    barmode: Option<BarMode>,
    join_bars: bool,
) {
    let barmode = barmode.unwrap_or(if join_bars {
        BarMode::Relative
    } else if d.y.is_some() || d.color.is_some() {
        BarMode::Group
    } else {
        BarMode::Relative
    });

    let mut y_as_color = false;
    let histfunc = histfunc.unwrap_or_else(|| match (&d.y, &y) {
        (None, _) => HistFunc::Count,
        (Some(Selector::Column(_)), Some(y_values)) if d.table().is_some() => {
            let x_numeric = x.as_ref().map(Series::is_numeric).unwrap_or(false);
            if x_numeric || y_values.is_numeric() {
                HistFunc::Sum
            } else {
                y_as_color = x.is_some();
                HistFunc::Count
            }
        }
        _ => HistFunc::Count,
    });

    if y_as_color && d.color.is_none() {
        d.color = d.y.clone();
    }

    let user_y_title = d.y_title.is_some();
    if !user_y_title {
        if let Some(Selector::Column(y_col)) = &d.y {
            d.y_title = Some(format!("{} of {}", histfunc.as_str(), y_col));
        } else if d.y.is_none() {
            d.y_title = Some(histfunc.as_str().to_string());
        }
    }

    let mut orientation = orientation.unwrap_or(Orientation::Vertical);
    if histfunc == HistFunc::Count {
        let distinct = |s: &Option<Series>| {
            s.as_ref()
                .map(|s| s.to_strings().into_iter().collect::<HashSet<_>>().len())
                .unwrap_or(0)
        };
        let (x_cnt, y_cnt) = (distinct(&x), distinct(&y));
        if x_cnt > 0 && y_cnt > 0 && x_cnt > y_cnt {
            if d.x_title.is_none() {
                if let Some(Selector::Column(x_col)) = &d.x {
                    d.x_title = Some(format!("{} of {}", histfunc.as_str(), x_col));
                }
            }
            if !user_y_title {
                d.y_title = d.y.as_ref().and_then(|s| s.column_name().map(String::from));
            }
            orientation = Orientation::Horizontal;
        }
    }

    d.histogram = Some(HistogramOptions {
        histfunc,
        orientation,
        barmode,
    });
}

pub fn scatter() -> ChartBuilder {
    ChartBuilder::new(ChartKind::Scatter)
}

pub fn line() -> ChartBuilder {
    ChartBuilder::new(ChartKind::Line)
}

pub fn bar() -> ChartBuilder {
    ChartBuilder::new(ChartKind::Bar)
}

pub fn box_plot() -> ChartBuilder {
    ChartBuilder::new(ChartKind::Box)
}

pub fn histogram() -> ChartBuilder {
    ChartBuilder::new(ChartKind::Histogram)
}

pub fn density_heatmap() -> ChartBuilder {
    ChartBuilder::new(ChartKind::Heatmap)
}

pub fn image(z: Vec<Vec<f64>>) -> ChartBuilder {
    let mut builder = ChartBuilder::new(ChartKind::Image);
    builder.descriptor.data = DataSource::Matrix(z);
    builder
}

/// Annotated matrix. Correlation and confusion matrices are recognised from
/// their values and styled accordingly.
pub fn heatmap(z: Vec<Vec<f64>>) -> ChartBuilder {
    let mut builder = ChartBuilder::new(ChartKind::MatrixHeatmap);
    builder.descriptor.data = DataSource::Matrix(z);
    builder
}

pub fn colored_line() -> ChartBuilder {
    ChartBuilder::new(ChartKind::ColoredLine)
}

pub fn distribution(table: PlotData) -> ChartBuilder {
    ChartBuilder::new(ChartKind::Distribution).data(table)
}

pub fn scatter_matrix(table: PlotData) -> ChartBuilder {
    ChartBuilder::new(ChartKind::Matrix).data(table)
}
