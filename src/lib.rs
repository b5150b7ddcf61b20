// Library exports for plotgrid

pub mod chart;
pub mod composite;
pub mod csv_reader;
pub mod data;
pub mod diagnostics;
pub mod downsample;
pub mod error;
pub mod figure;
pub mod graph;
pub mod grid;
pub mod layout;
pub mod palette;
pub mod subplot;
pub mod trace;

pub use chart::{ChartBuilder, ChartDescriptor, ChartKind, Selector};
pub use data::{PlotData, Series};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::GridError;
pub use figure::Figure;
pub use graph::{Backend, PlottersBackend};
pub use grid::{Grid, GridOptions, GridState};
pub use layout::LayoutMatrix;
pub use palette::{Palette, PaletteOptions};
pub use subplot::{CellSpec, SubplotSpec};

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum OutputFormat {
    #[serde(rename = "png")]
    #[default]
    Png,
    #[serde(rename = "svg")]
    Svg,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenderOptions {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default, rename = "type")]
    pub format: OutputFormat,
}

fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 600 }

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            format: OutputFormat::Png,
        }
    }
}
