// Stand-alone figures for single charts, including the kinds that cannot be
// placed in a grid

use crate::chart::{self, BarMode, ChartDescriptor, ChartKind, Selector};
use crate::data::PlotData;
use crate::diagnostics::Diagnostics;
use crate::error::GridError;
use crate::figure::{Figure, SlotAxes};
use crate::grid::{Grid, GridOptions};
use crate::layout::LayoutMatrix;
use crate::palette::qualitative_color;
use crate::trace::{base_trace, LegendTracker, Marker, MarkerColor, Trace, TraceType};
use serde_json::Value;

pub const DISTRIBUTION_TITLE: &str = "Distribution Plot";
pub const MATRIX_SIZE: u64 = 800;
pub const CORRELATION_TITLE: &str = "Correlation Matrix";
pub const CONFUSION_TITLE: &str = "Confusion Matrix";
pub const CORRELATION_COLORSCALE: &str = "Inferno";
pub const CONFUSION_COLORSCALE: &str = "Electric";

/// What a matrix heatmap's values look like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixFlavour {
    Plain,
    /// Every value in `[-1, 1]`
    Correlation,
    /// Non-negative whole numbers
    Confusion,
}

impl MatrixFlavour {
    /// Flavour and default colour range inferred from the values. A matrix
    /// of zeros and ones is a confusion matrix that keeps the correlation
    /// range.
    pub fn infer(z: &[Vec<f64>]) -> (Self, Option<(f64, f64)>) {
        let values: Vec<f64> = z.iter().flatten().copied().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return (MatrixFlavour::Plain, None);
        }
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        let mut flavour = MatrixFlavour::Plain;
        let mut range = None;
        if min >= -1.0 && max <= 1.0 {
            flavour = MatrixFlavour::Correlation;
            range = Some((-1.0, 1.0));
        }
        if min >= 0.0 && values.iter().all(|v| v.fract() == 0.0) {
            flavour = MatrixFlavour::Confusion;
        }
        (flavour, range)
    }

    fn title(&self) -> Option<&'static str> {
        match self {
            MatrixFlavour::Plain => None,
            MatrixFlavour::Correlation => Some(CORRELATION_TITLE),
            MatrixFlavour::Confusion => Some(CONFUSION_TITLE),
        }
    }

    fn colorscale(&self) -> Option<&'static str> {
        match self {
            MatrixFlavour::Plain => None,
            MatrixFlavour::Correlation => Some(CORRELATION_COLORSCALE),
            MatrixFlavour::Confusion => Some(CONFUSION_COLORSCALE),
        }
    }
}

/// Build the figure a single descriptor shows on its own.
pub fn standalone(
    descriptor: ChartDescriptor,
    options: GridOptions,
) -> Result<(Figure, Diagnostics), GridError> {
    match descriptor.kind() {
        ChartKind::Distribution => distribution_figure(&descriptor, options),
        ChartKind::Matrix => matrix_figure(&descriptor, options),
        ChartKind::MatrixHeatmap => heatmap_figure(&descriptor, options),
        ChartKind::ColoredLine => colored_line_figure(&descriptor, options),
        _ => {
            let mut options = options;
            if options.title.is_none() {
                options.title = descriptor.title().map(String::from);
            }
            Grid::combine(vec![descriptor])?
                .with_options(options)?
                .into_figure()
        }
    }
}

/// Columns a composite chart draws: the selected ones, or every numeric one
fn selected_columns(d: &ChartDescriptor, table: &PlotData) -> Result<Vec<String>, GridError> {
    let exclude = d.color().and_then(Selector::column_name);
    let columns: Vec<String> = if d.columns().is_empty() {
        table
            .numeric_columns()
            .into_iter()
            .filter(|c| Some(c.as_str()) != exclude)
            .collect()
    } else {
        d.columns().to_vec()
    };
    if columns.is_empty() {
        return Err(GridError::InvalidDescriptor(format!(
            "{} needs at least one numeric column",
            d.kind().display_name()
        )));
    }
    Ok(columns)
}

fn table_of(d: &ChartDescriptor) -> Result<&PlotData, GridError> {
    d.table().ok_or_else(|| {
        GridError::InvalidDescriptor(format!("{} needs a table", d.kind().display_name()))
    })
}

/// Overlaid probability-density histograms, one per column
fn distribution_figure(
    d: &ChartDescriptor,
    options: GridOptions,
) -> Result<(Figure, Diagnostics), GridError> {
    let table = table_of(d)?;
    let columns = selected_columns(d, table)?;

    let mut figure = Figure::new(1, 1, None);
    for (i, name) in columns.iter().enumerate() {
        let values = table
            .column(name)
            .ok_or_else(|| GridError::ColumnNotFound(name.clone()))?;
        if !values.is_numeric() {
            return Err(GridError::InvalidDescriptor(format!(
                "column '{}' is not numeric",
                name
            )));
        }

        let mut trace = Trace::new(TraceType::Histogram);
        trace.x = Some(values);
        trace.name = Some(name.clone());
        trace.legendgroup = Some(name.clone());
        trace.histnorm = Some("probability density".to_string());
        trace.opacity = Some(0.7);
        trace.marker = Some(Marker {
            color: Some(MarkerColor::Single(qualitative_color(i))),
            ..Default::default()
        });
        trace.extra = d.options().clone();
        figure.add_trace(trace, 1, 1)?;
    }

    figure.layout.barmode = Some(BarMode::Overlay);
    figure.layout.title = Some(
        options
            .title
            .clone()
            .or_else(|| d.title().map(String::from))
            .unwrap_or_else(|| DISTRIBUTION_TITLE.to_string()),
    );
    figure.update_layout(options.layout);

    tracing::debug!(series = columns.len(), "distribution figure built");
    Ok((figure, Diagnostics::new()))
}

/// k×k scatter matrix: box plots on the diagonal, pairwise scatters elsewhere
fn matrix_figure(
    d: &ChartDescriptor,
    options: GridOptions,
) -> Result<(Figure, Diagnostics), GridError> {
    let table = table_of(d)?;
    let columns = selected_columns(d, table)?;
    let k = columns.len();

    let cells: Vec<Vec<usize>> = (0..k).map(|r| (r * k..(r + 1) * k).collect()).collect();
    let mut grid = Grid::new(LayoutMatrix::new(cells)?, options.clone())?;

    for row in &columns {
        for col in &columns {
            let mut builder = if row == col {
                chart::box_plot().y(row.as_str()).name(row.as_str())
            } else {
                chart::scatter().x(col.as_str()).y(row.as_str())
            };
            builder = builder.data(table.clone());
            if let Some(color) = d.color() {
                builder = builder.color(color.clone());
            }
            grid.add_one(builder.build()?)?;
        }
    }

    let (mut figure, diagnostics) = grid.into_figure()?;

    if options.title.is_none() {
        figure.layout.title = d.title().map(String::from);
    }
    let mut layout = d.options().clone();
    for key in ["width", "height"] {
        layout.entry(key).or_insert(Value::from(MATRIX_SIZE));
    }
    // grid-level options win over the chart's own
    for key in options.layout.keys() {
        layout.remove(key);
    }
    figure.update_layout(layout);

    tracing::debug!(columns = k, "scatter matrix built");
    Ok((figure, diagnostics))
}

/// Annotated matrix styled after its inferred flavour. Explicit title,
/// colorscale and `range_color` win over the inferred ones.
fn heatmap_figure(
    d: &ChartDescriptor,
    options: GridOptions,
) -> Result<(Figure, Diagnostics), GridError> {
    let z = d.matrix().ok_or_else(|| {
        GridError::InvalidDescriptor(format!("{} needs a matrix of values", d.kind().display_name()))
    })?;
    let (flavour, inferred_range) = MatrixFlavour::infer(z);

    let mut trace = base_trace(d, TraceType::Heatmap);
    trace.z = Some(z.clone());
    trace.colorscale = d
        .colorscale()
        .map(String::from)
        .or_else(|| flavour.colorscale().map(String::from));

    let range = match trace.extra.remove("range_color") {
        Some(Value::Array(bounds)) => match bounds.as_slice() {
            [lo, hi] => lo.as_f64().zip(hi.as_f64()),
            _ => None,
        },
        _ => None,
    }
    .or(inferred_range);
    if let Some((lo, hi)) = range {
        trace.zmin = Some(lo);
        trace.zmax = Some(hi);
    }
    if flavour == MatrixFlavour::Confusion {
        trace.extra.entry("text_auto").or_insert(Value::Bool(true));
    }

    let mut figure = Figure::new(1, 1, None);
    figure.add_trace(trace, 1, 1)?;
    figure.layout.title = options
        .title
        .clone()
        .or_else(|| d.title().map(String::from))
        .or_else(|| flavour.title().map(String::from));
    figure.update_layout(options.layout);

    tracing::debug!(?flavour, rows = z.len(), "matrix heatmap built");
    Ok((figure, Diagnostics::new()))
}

/// One two-point line trace per segment, coloured by the category of the
/// segment's first point. Each category shows in the legend once.
fn colored_line_figure(
    d: &ChartDescriptor,
    options: GridOptions,
) -> Result<(Figure, Diagnostics), GridError> {
    let (x, y) = match d.axes()? {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(GridError::InvalidDescriptor(
                "Colored Line needs x and y".to_string(),
            ))
        }
    };
    let color = d
        .color_series()?
        .ok_or_else(|| GridError::InvalidDescriptor("Colored Line needs color".to_string()))?;
    let categories = color.distinct_labels();

    let mut legend = LegendTracker::new();
    let mut figure = Figure::new(1, 1, None);
    let n = x.len();
    for (i, label) in color.to_strings().into_iter().enumerate() {
        let segment: Vec<usize> = (i..(i + 2).min(n)).collect();
        let shade = categories.iter().position(|c| *c == label).unwrap_or(0);

        let mut trace = base_trace(d, TraceType::Scatter);
        trace.mode.get_or_insert_with(|| "lines".to_string());
        trace.x = Some(x.select(&segment));
        trace.y = Some(y.select(&segment));
        trace.showlegend = Some(legend.first_sighting(&label));
        trace.legendgroup = Some(label.clone());
        trace.marker = Some(Marker {
            color: Some(MarkerColor::Single(qualitative_color(shade))),
            ..Default::default()
        });
        trace.name = Some(label);
        figure.add_trace(trace, 1, 1)?;
    }

    figure.layout.title = options.title.clone().or_else(|| d.title().map(String::from));
    figure.layout.slot_axes.push(SlotAxes {
        row: 1,
        col: 1,
        x_title: d.x_axis_title(),
        y_title: d.y_axis_title(),
    });
    figure.update_layout(options.layout);

    tracing::debug!(segments = n, categories = categories.len(), "colored line built");
    Ok((figure, Diagnostics::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Series;

    fn iris() -> PlotData {
        PlotData::from_columns(vec![
            ("sepal", Series::from(vec![5.1, 4.9, 6.3, 5.8])),
            ("petal", Series::from(vec![1.4, 1.3, 4.9, 5.1])),
            ("species", Series::from(vec!["setosa", "setosa", "virginica", "virginica"])),
        ])
    }

    #[test]
    fn test_distribution_defaults() {
        let d = chart::distribution(iris()).build().unwrap();
        let (fig, diags) = d.into_figure().unwrap();

        assert_eq!(fig.layout.title.as_deref(), Some(DISTRIBUTION_TITLE));
        assert_eq!(fig.layout.barmode, Some(BarMode::Overlay));
        assert_eq!(fig.placements.len(), 2);
        let first = &fig.placements[0].trace;
        assert_eq!(first.kind, TraceType::Histogram);
        assert_eq!(first.histnorm.as_deref(), Some("probability density"));
        assert_eq!(first.color(), Some(qualitative_color(0).as_str()));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_distribution_selected_columns_and_title() {
        let d = chart::distribution(iris())
            .columns(&["petal"])
            .title("Petals")
            .build()
            .unwrap();
        let (fig, _) = d.into_figure().unwrap();
        assert_eq!(fig.placements.len(), 1);
        assert_eq!(fig.placements[0].trace.name.as_deref(), Some("petal"));
        assert_eq!(fig.layout.title.as_deref(), Some("Petals"));
    }

    #[test]
    fn test_distribution_rejects_text_column() {
        let d = chart::distribution(iris()).columns(&["species"]).build().unwrap();
        assert!(matches!(d.into_figure(), Err(GridError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_scatter_matrix_shape() {
        let d = chart::scatter_matrix(iris()).color("species").build().unwrap();
        let (fig, _) = d.into_figure().unwrap();

        assert_eq!((fig.rows, fig.cols), (2, 2));
        assert_eq!(fig.layout.size(), (Some(800), Some(800)));

        let diagonal: Vec<&Trace> = fig
            .placements
            .iter()
            .filter(|p| p.row == p.col)
            .map(|p| &p.trace)
            .collect();
        assert!(diagonal.iter().all(|t| t.kind == TraceType::Box));

        // two species per cell, four cells
        assert_eq!(fig.placements.len(), 8);
    }

    #[test]
    fn test_scatter_matrix_size_override() {
        let d = chart::scatter_matrix(iris())
            .option("width", 500)
            .build()
            .unwrap();
        let (fig, _) = d.into_figure().unwrap();
        assert_eq!(fig.layout.size(), (Some(500), Some(800)));
    }

    #[test]
    fn test_standalone_uses_chart_title() {
        let d = chart::line().y(vec![1.0, 2.0]).title("Trend").build().unwrap();
        let (fig, _) = d.into_figure().unwrap();
        assert_eq!(fig.layout.title.as_deref(), Some("Trend"));
        assert_eq!(fig.placements.len(), 1);
    }

    #[test]
    fn test_correlation_matrix_inferred() {
        let d = chart::heatmap(vec![vec![1.0, -0.3], vec![-0.3, 1.0]]).build().unwrap();
        let (fig, _) = d.into_figure().unwrap();

        assert_eq!(fig.layout.title.as_deref(), Some(CORRELATION_TITLE));
        let trace = &fig.placements[0].trace;
        assert_eq!(trace.kind, TraceType::Heatmap);
        assert_eq!(trace.colorscale.as_deref(), Some(CORRELATION_COLORSCALE));
        assert_eq!((trace.zmin, trace.zmax), (Some(-1.0), Some(1.0)));
        assert!(!trace.extra.contains_key("text_auto"));
    }

    #[test]
    fn test_confusion_matrix_inferred() {
        let d = chart::heatmap(vec![vec![12.0, 3.0], vec![1.0, 9.0]]).build().unwrap();
        let (fig, _) = d.into_figure().unwrap();

        assert_eq!(fig.layout.title.as_deref(), Some(CONFUSION_TITLE));
        let trace = &fig.placements[0].trace;
        assert_eq!(trace.colorscale.as_deref(), Some(CONFUSION_COLORSCALE));
        assert_eq!(trace.zmin, None);
        assert_eq!(trace.extra.get("text_auto"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_binary_matrix_is_confusion_with_unit_range() {
        let (flavour, range) = MatrixFlavour::infer(&[vec![0.0, 1.0], vec![1.0, 0.0]]);
        assert_eq!(flavour, MatrixFlavour::Confusion);
        assert_eq!(range, Some((-1.0, 1.0)));
        assert_eq!(MatrixFlavour::infer(&[vec![2.5, -7.0]]), (MatrixFlavour::Plain, None));
    }

    #[test]
    fn test_heatmap_explicit_settings_win() {
        let d = chart::heatmap(vec![vec![0.2, 0.4], vec![0.6, 0.8]])
            .title("Weights")
            .colorscale("Blues")
            .option("range_color", vec![0.0, 2.0])
            .build()
            .unwrap();
        let (fig, _) = d.into_figure().unwrap();

        assert_eq!(fig.layout.title.as_deref(), Some("Weights"));
        let trace = &fig.placements[0].trace;
        assert_eq!(trace.colorscale.as_deref(), Some("Blues"));
        assert_eq!((trace.zmin, trace.zmax), (Some(0.0), Some(2.0)));
        assert!(!trace.extra.contains_key("range_color"));
    }

    #[test]
    fn test_heatmap_cannot_be_arranged() {
        let d = chart::heatmap(vec![vec![1.0]]).build().unwrap();
        assert!(matches!(Grid::combine(vec![d]), Err(GridError::NotArrangeable { .. })));
    }

    #[test]
    fn test_colored_line_segments() {
        let d = chart::colored_line()
            .x(vec![1.0, 2.0, 3.0, 4.0])
            .y(vec![1.0, 4.0, 9.0, 16.0])
            .color(vec!["cool", "warm", "cool", "warm"])
            .title("Temperature")
            .build()
            .unwrap();
        let (fig, _) = d.into_figure().unwrap();

        assert_eq!(fig.layout.title.as_deref(), Some("Temperature"));
        assert_eq!(fig.placements.len(), 4);

        let first = &fig.placements[0].trace;
        assert_eq!(first.mode.as_deref(), Some("lines"));
        assert_eq!(first.x, Some(Series::from(vec![1.0, 2.0])));
        assert_eq!(first.name.as_deref(), Some("cool"));
        assert_eq!(first.color(), Some(qualitative_color(0).as_str()));

        let shown: Vec<Option<bool>> = fig.traces().map(|t| t.showlegend).collect();
        assert_eq!(shown, vec![Some(true), Some(true), Some(false), Some(false)]);
        assert_eq!(fig.placements[2].trace.color(), first.color());
        assert_eq!(fig.placements[1].trace.color(), Some(qualitative_color(1).as_str()));
        assert_eq!(fig.placements[3].trace.x, Some(Series::from(vec![4.0])));
    }

    #[test]
    fn test_colored_line_cannot_be_arranged() {
        let d = chart::colored_line()
            .x(vec![1.0, 2.0])
            .y(vec![1.0, 2.0])
            .color(vec!["a", "b"])
            .build()
            .unwrap();
        assert!(matches!(Grid::hstack(vec![d]), Err(GridError::NotArrangeable { .. })));
    }
}
