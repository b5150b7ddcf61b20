//! Backend trace objects and the per-kind projection of descriptors into them.

use crate::chart::{ChartDescriptor, ChartKind, ColorAssignment, Orientation};
use crate::data::Series;
use crate::error::GridError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Trace types understood by the plotting backend. Also used as the subplot
/// type of a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceType {
    Scatter,
    Bar,
    Box,
    Histogram,
    Histogram2d,
    Heatmap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MarkerColor {
    Single(String),
    PerPoint(Vec<f64>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Marker {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<MarkerColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colorscale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub showscale: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colorbar_title: Option<String>,
}

impl Marker {
    pub fn single_color(&self) -> Option<&str> {
        match &self.color {
            Some(MarkerColor::Single(c)) => Some(c),
            _ => None,
        }
    }
}

/// Declarative trace handed to the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: TraceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<Series>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<Series>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<Vec<Vec<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub showlegend: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legendgroup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub histfunc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub histnorm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colorscale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zmin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zmax: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Trace {
    pub fn new(kind: TraceType) -> Self {
        Self {
            kind,
            x: None,
            y: None,
            z: None,
            name: None,
            mode: None,
            showlegend: None,
            legendgroup: None,
            marker: None,
            orientation: None,
            histfunc: None,
            histnorm: None,
            opacity: None,
            colorscale: None,
            zmin: None,
            zmax: None,
            extra: Map::new(),
        }
    }

    /// Number of data points carried by the trace
    pub fn len(&self) -> usize {
        let xy = self
            .x
            .as_ref()
            .map(Series::len)
            .max(self.y.as_ref().map(Series::len))
            .unwrap_or(0);
        let z: usize = self.z.as_ref().map(|z| z.iter().map(Vec::len).sum()).unwrap_or(0);
        xy.max(z)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn color(&self) -> Option<&str> {
        self.marker.as_ref().and_then(Marker::single_color)
    }
}

/// Remembers which legend entries have already been shown so that a category
/// split across several traces appears once.
#[derive(Debug, Default)]
pub struct LegendTracker {
    shown: HashSet<String>,
}

impl LegendTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time `label` is seen
    pub fn first_sighting(&mut self, label: &str) -> bool {
        self.shown.insert(label.to_string())
    }
}

/// Project a descriptor into zero or more backend traces.
pub fn project(d: &ChartDescriptor, legend: &mut LegendTracker) -> Result<Vec<Trace>, GridError> {
    match d.kind() {
        ChartKind::Scatter => project_scatter(d, legend),
        ChartKind::Line => project_line(d, legend),
        ChartKind::Bar => project_xy(d, TraceType::Bar, legend),
        ChartKind::Box => project_xy(d, TraceType::Box, legend),
        ChartKind::Histogram => project_histogram(d, legend),
        ChartKind::Heatmap => project_density(d),
        ChartKind::Image => project_image(d),
        ChartKind::Distribution | ChartKind::Matrix | ChartKind::MatrixHeatmap | ChartKind::ColoredLine => {
            Err(GridError::NotArrangeable {
                kind: d.kind().display_name().to_string(),
            })
        }
    }
}

fn project_scatter(d: &ChartDescriptor, legend: &mut LegendTracker) -> Result<Vec<Trace>, GridError> {
    let mut traces = project_xy(d, TraceType::Scatter, legend)?;
    for trace in &mut traces {
        trace.mode.get_or_insert_with(|| "markers".to_string());
    }
    Ok(traces)
}

fn project_line(d: &ChartDescriptor, legend: &mut LegendTracker) -> Result<Vec<Trace>, GridError> {
    let mut traces = project_xy(d, TraceType::Scatter, legend)?;
    for trace in &mut traces {
        trace.mode.get_or_insert_with(|| "lines".to_string());
    }
    Ok(traces)
}

fn project_histogram(d: &ChartDescriptor, legend: &mut LegendTracker) -> Result<Vec<Trace>, GridError> {
    let mut traces = project_xy(d, TraceType::Histogram, legend)?;
    if let Some(h) = d.histogram() {
        for trace in &mut traces {
            trace.orientation = Some(h.orientation);
            trace.histfunc = Some(h.histfunc.as_str().to_string());
        }
    }
    Ok(traces)
}

fn project_density(d: &ChartDescriptor) -> Result<Vec<Trace>, GridError> {
    let (x, y) = d.axes()?;
    let mut trace = base_trace(d, TraceType::Histogram2d);
    trace.x = x;
    trace.y = y;
    trace.colorscale = d.colorscale().map(String::from);
    Ok(vec![trace])
}

fn project_image(d: &ChartDescriptor) -> Result<Vec<Trace>, GridError> {
    let mut trace = base_trace(d, TraceType::Heatmap);
    trace.z = d.matrix().cloned();
    trace.colorscale = d.colorscale().map(String::from);
    Ok(vec![trace])
}

/// Trace carrying the descriptor's name and verbatim options
pub(crate) fn base_trace(d: &ChartDescriptor, kind: TraceType) -> Trace {
    let mut trace = Trace::new(kind);
    trace.name = d.name().map(String::from);
    let mut extra = d.options().clone();
    if let Some(Value::String(mode)) = extra.remove("mode") {
        trace.mode = Some(mode);
    }
    if let Some(opacity) = extra.get("opacity").and_then(Value::as_f64) {
        trace.opacity = Some(opacity);
        extra.remove("opacity");
    }
    trace.extra = extra;
    trace
}

/// x/y projection shared by the colour-grouping kinds: one trace per category
/// when coloured, one trace otherwise.
fn project_xy(d: &ChartDescriptor, kind: TraceType, legend: &mut LegendTracker) -> Result<Vec<Trace>, GridError> {
    let (x, y) = d.axes()?;

    let with_data = |x: Option<Series>, y: Option<Series>| {
        let mut trace = base_trace(d, kind);
        trace.x = x;
        trace.y = y;
        trace
    };

    match d.assignment() {
        None => Ok(vec![with_data(x, y)]),
        Some(ColorAssignment::Single { label, color }) => {
            let mut trace = with_data(x, y);
            trace.name = Some(label.clone());
            trace.legendgroup = Some(label.clone());
            trace.showlegend = Some(legend.first_sighting(label));
            trace.marker = Some(Marker {
                color: Some(MarkerColor::Single(color.clone())),
                ..Default::default()
            });
            Ok(vec![trace])
        }
        Some(ColorAssignment::Discrete(colors)) => {
            let categories = match d.color_series()? {
                Some(series) => series.to_strings(),
                None => return Ok(vec![with_data(x, y)]),
            };
            let mut traces = Vec::with_capacity(colors.len());
            for (category, color) in colors {
                let indices: Vec<usize> = categories
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| *c == category)
                    .map(|(i, _)| i)
                    .collect();
                let mut trace = with_data(
                    x.as_ref().map(|s| s.select(&indices)),
                    y.as_ref().map(|s| s.select(&indices)),
                );
                trace.name = Some(category.clone());
                trace.legendgroup = Some(category.clone());
                trace.showlegend = Some(legend.first_sighting(category));
                trace.marker = Some(Marker {
                    color: color.clone().map(MarkerColor::Single),
                    ..Default::default()
                });
                traces.push(trace);
            }
            Ok(traces)
        }
        Some(ColorAssignment::Continuous { colorscale, title }) => {
            let categories = d
                .color_series()?
                .map(|s| s.to_strings())
                .unwrap_or_default();
            let order: Vec<String> = d
                .color_series()?
                .map(|s| s.distinct_labels())
                .unwrap_or_default();
            let per_point: Vec<f64> = categories
                .iter()
                .map(|c| order.iter().position(|o| o == c).unwrap_or(0) as f64)
                .collect();
            let mut trace = with_data(x, y);
            trace.name = Some(title.clone());
            trace.showlegend = Some(false);
            trace.marker = Some(Marker {
                color: Some(MarkerColor::PerPoint(per_point)),
                colorscale: Some(colorscale.clone()),
                showscale: Some(true),
                colorbar_title: Some(title.clone()),
            });
            Ok(vec![trace])
        }
    }
}
