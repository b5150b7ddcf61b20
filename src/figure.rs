//! The composed figure: grid shape, spec matrix, placed traces and layout.

use crate::chart::BarMode;
use crate::downsample::Resampler;
use crate::error::GridError;
use crate::graph::{Backend, PlottersBackend};
use crate::subplot::SubplotSpec;
use crate::trace::Trace;
use crate::{OutputFormat, RenderOptions};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// A trace and the 1-based grid cell it is drawn in
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub trace: Trace,
    pub row: usize,
    pub col: usize,
}

/// Axis titles inferred for one slot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotAxes {
    pub row: usize,
    pub col: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FigureLayout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Outer x title shared by every slot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub slot_axes: Vec<SlotAxes>,
    /// `Some(false)` when clicking a legend entry must not hide traces
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legend_itemclick: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barmode: Option<BarMode>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FigureLayout {
    /// Pixel size requested through layout options, if any
    pub fn size(&self) -> (Option<u32>, Option<u32>) {
        let get = |key: &str| {
            self.extra
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
        };
        (get("width"), get("height"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub rows: usize,
    pub cols: usize,
    pub specs: Option<SubplotSpec>,
    pub column_widths: Option<Vec<f64>>,
    pub row_heights: Option<Vec<f64>>,
    pub placements: Vec<Placement>,
    pub layout: FigureLayout,
    pub resampler: Option<Resampler>,
}

impl Figure {
    pub fn new(rows: usize, cols: usize, specs: Option<SubplotSpec>) -> Self {
        Self {
            rows,
            cols,
            specs,
            column_widths: None,
            row_heights: None,
            placements: Vec::new(),
            layout: FigureLayout::default(),
            resampler: None,
        }
    }

    /// Place a trace in the 1-based cell `(row, col)`
    pub fn add_trace(&mut self, trace: Trace, row: usize, col: usize) -> Result<(), GridError> {
        if row == 0 || col == 0 || row > self.rows || col > self.cols {
            return Err(GridError::InvalidLayout(format!(
                "cell ({}, {}) is outside a {}x{} grid",
                row, col, self.rows, self.cols
            )));
        }
        self.placements.push(Placement { trace, row, col });
        Ok(())
    }

    /// Merge layout options. `title` and `barmode` land in their typed
    /// fields, everything else is kept verbatim.
    pub fn update_layout(&mut self, options: Map<String, Value>) {
        for (key, value) in options {
            if key == "title" {
                if let Value::String(title) = &value {
                    self.layout.title = Some(title.clone());
                    continue;
                }
            }
            if key == "barmode" {
                if let Ok(mode) = serde_json::from_value::<BarMode>(value.clone()) {
                    self.layout.barmode = Some(mode);
                    continue;
                }
            }
            self.layout.extra.insert(key, value);
        }
    }

    pub fn traces(&self) -> impl Iterator<Item = &Trace> {
        self.placements.iter().map(|p| &p.trace)
    }

    pub fn is_downsampled(&self) -> bool {
        self.resampler.is_some()
    }

    /// Placements as they are drawn: resampled when the figure carries a
    /// resampler.
    pub fn rendered_placements(&self) -> Vec<Placement> {
        match &self.resampler {
            None => self.placements.clone(),
            Some(resampler) => self
                .placements
                .iter()
                .map(|p| Placement {
                    trace: resampler.apply(&p.trace),
                    row: p.row,
                    col: p.col,
                })
                .collect(),
        }
    }

    /// Backend-neutral JSON: grid shape, traces with their cells, layout.
    pub fn to_json(&self) -> Result<Value, GridError> {
        let mut data = Vec::with_capacity(self.placements.len());
        for placement in self.rendered_placements() {
            let mut trace = serde_json::to_value(&placement.trace)
                .map_err(|e| GridError::Backend(e.to_string()))?;
            if let Value::Object(obj) = &mut trace {
                obj.insert("row".to_string(), placement.row.into());
                obj.insert("col".to_string(), placement.col.into());
            }
            data.push(trace);
        }

        Ok(serde_json::json!({
            "grid": {
                "rows": self.rows,
                "cols": self.cols,
                "specs": self.specs,
                "column_widths": self.column_widths,
                "row_heights": self.row_heights,
            },
            "data": data,
            "layout": self.layout,
            "resampler": self.resampler,
        }))
    }

    pub fn render(&self, backend: &dyn Backend) -> Result<Vec<u8>> {
        backend.render(self)
    }

    /// Write the figure to `path`; the extension picks PNG or SVG.
    pub fn write_image(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("svg") => OutputFormat::Svg,
            _ => OutputFormat::Png,
        };
        let backend = PlottersBackend::new(RenderOptions {
            format,
            ..RenderOptions::default()
        });
        let bytes = self.render(&backend)?;
        std::fs::write(path, bytes).with_context(|| format!("Failed to write '{}'", path.display()))?;
        Ok(())
    }

    /// Render to a PNG in the temp directory and return its path
    pub fn show(&self) -> Result<PathBuf> {
        let path = std::env::temp_dir().join(format!("plotgrid-{}.png", std::process::id()));
        self.write_image(&path)?;
        tracing::info!(path = %path.display(), "figure written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Series;
    use crate::trace::TraceType;

    fn line_trace(n: usize) -> Trace {
        let mut trace = Trace::new(TraceType::Scatter);
        trace.x = Some(Series::index(n));
        trace.y = Some(Series::from(vec![1.0; n]));
        trace.mode = Some("lines".to_string());
        trace
    }

    #[test]
    fn test_add_trace_bounds() {
        let mut fig = Figure::new(2, 1, None);
        assert!(fig.add_trace(line_trace(3), 2, 1).is_ok());
        assert!(fig.add_trace(line_trace(3), 3, 1).is_err());
        assert!(fig.add_trace(line_trace(3), 0, 1).is_err());
        assert_eq!(fig.traces().count(), 1);
    }

    #[test]
    fn test_update_layout() {
        let mut fig = Figure::new(1, 1, None);
        let mut options = Map::new();
        options.insert("title".to_string(), "Sales".into());
        options.insert("barmode".to_string(), "stack".into());
        options.insert("width".to_string(), 800.into());
        fig.update_layout(options);

        assert_eq!(fig.layout.title.as_deref(), Some("Sales"));
        assert_eq!(fig.layout.barmode, Some(BarMode::Stack));
        assert_eq!(fig.layout.size(), (Some(800), None));
    }

    #[test]
    fn test_size_ignores_values_beyond_u32() {
        let mut fig = Figure::new(1, 1, None);
        let mut options = Map::new();
        options.insert("width".to_string(), (1u64 << 33).into());
        options.insert("height".to_string(), 600.into());
        fig.update_layout(options);
        assert_eq!(fig.layout.size(), (None, Some(600)));
    }

    #[test]
    fn test_to_json_shape() {
        let mut fig = Figure::new(1, 2, None);
        fig.add_trace(line_trace(3), 1, 2).unwrap();
        fig.layout.legend_itemclick = Some(false);

        let json = fig.to_json().unwrap();
        assert_eq!(json["grid"]["rows"], 1);
        assert_eq!(json["grid"]["cols"], 2);
        assert!(json["grid"]["specs"].is_null());
        assert_eq!(json["data"][0]["type"], "scatter");
        assert_eq!(json["data"][0]["col"], 2);
        assert_eq!(json["layout"]["legend_itemclick"], false);
    }

    #[test]
    fn test_resampler_applies_on_export() {
        let mut fig = Figure::new(1, 1, None);
        fig.add_trace(line_trace(10_000), 1, 1).unwrap();
        fig.resampler = Some(Resampler::new(500));

        assert_eq!(fig.placements[0].trace.len(), 10_000);
        assert!(fig.rendered_placements()[0].trace.len() <= 500);
        let json = fig.to_json().unwrap();
        assert!(json["data"][0]["y"].as_array().unwrap().len() <= 500);
    }
}
