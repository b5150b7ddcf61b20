// Colour bookkeeping shared by every chart of a grid

use crate::chart::{ChartDescriptor, ColorAssignment};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use plotters::style::RGBColor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Qualitative palette cycled through for categorical colouring
pub const QUALITATIVE: [RGBColor; 10] = [
    RGBColor(99, 110, 250),
    RGBColor(239, 85, 59),
    RGBColor(0, 204, 150),
    RGBColor(171, 99, 250),
    RGBColor(255, 161, 90),
    RGBColor(25, 211, 243),
    RGBColor(255, 102, 146),
    RGBColor(182, 232, 128),
    RGBColor(255, 151, 255),
    RGBColor(254, 203, 82),
];

pub fn rgb_to_hex(color: &RGBColor) -> String {
    format!("#{:02x}{:02x}{:02x}", color.0, color.1, color.2)
}

/// Get color for a specific index (wraps around if index > palette size)
pub fn qualitative_color(index: usize) -> String {
    rgb_to_hex(&QUALITATIVE[index % QUALITATIVE.len()])
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaletteOptions {
    /// Colour groupings with more distinct values than this may switch to a
    /// colorscale
    #[serde(default = "default_heatmap_threshold")]
    pub heatmap_threshold: usize,
    #[serde(default = "default_colorscale")]
    pub default_colorscale: String,
}

fn default_heatmap_threshold() -> usize { 2 }
fn default_colorscale() -> String { "Viridis".to_string() }

impl Default for PaletteOptions {
    fn default() -> Self {
        Self {
            heatmap_threshold: default_heatmap_threshold(),
            default_colorscale: default_colorscale(),
        }
    }
}

/// Category → colour bindings for one set of descriptors.
///
/// A key is bound either to a discrete colour or to a colorscale, never both;
/// the first binding wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Palette {
    discrete: Vec<(String, String)>,
    colorscales: Vec<(String, String)>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    #[serde(skip)]
    assignments: Vec<Option<ColorAssignment>>,
}

impl Palette {
    /// Scan descriptors in order and bind every category they show.
    ///
    /// Never fails: a colour selector that cannot be resolved is treated as
    /// absent.
    pub fn allocate(
        descriptors: &[&ChartDescriptor],
        options: &PaletteOptions,
        diagnostics: &mut Diagnostics,
    ) -> Palette {
        let mut palette = Palette::default();
        let mut position = 0;

        for d in descriptors {
            if !d.kind().supports_color() {
                palette.assignments.push(None);
                continue;
            }
            position += 1;

            let assignment = match d.color_series().ok().flatten() {
                None => {
                    let label = format!("{} {}", d.display_name(), position);
                    let color = palette.bind(&label);
                    match color {
                        Some(color) => ColorAssignment::Single { label, color },
                        None => ColorAssignment::Discrete(vec![(label, None)]),
                    }
                }
                Some(series) => {
                    let categories = series.distinct_labels();
                    if categories.len() > options.heatmap_threshold && d.continuous_color() {
                        // one colorscale per descriptor, even when two share a colour label
                        let key = format!("{} {}", d.color_label(), position);
                        let scale = d
                            .colorscale()
                            .map(String::from)
                            .unwrap_or_else(|| options.default_colorscale.clone());
                        let colorscale = palette.bind_colorscale(&key, scale);
                        match colorscale {
                            Some(colorscale) => ColorAssignment::Continuous {
                                colorscale,
                                title: d.color_label(),
                            },
                            None => palette.bind_all(categories),
                        }
                    } else {
                        palette.bind_all(categories)
                    }
                }
            };

            if let Some(scale) = d.colorscale() {
                if !matches!(assignment, ColorAssignment::Continuous { .. }) {
                    diagnostics.warn(
                        DiagnosticKind::IgnoredArgument,
                        format!(
                            "colorscale '{}' of {} is ignored; its colours stay discrete",
                            scale,
                            d.display_name()
                        ),
                    );
                }
            }
            palette.assignments.push(Some(assignment));
        }

        if palette.colorscales.len() > 1 {
            diagnostics.warn(
                DiagnosticKind::MultipleColorscales,
                format!(
                    "{} colorscale-coloured groupings share one grid ({}); their colorbars may overlap the legend",
                    palette.colorscales.len(),
                    palette
                        .colorscales
                        .iter()
                        .map(|(k, _)| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            );
        }

        tracing::debug!(
            discrete = palette.discrete.len(),
            colorscales = palette.colorscales.len(),
            "palette allocated"
        );
        palette
    }

    /// Write each descriptor's assignment, in the order given to `allocate`.
    pub fn apply<'a>(&self, descriptors: impl IntoIterator<Item = &'a mut ChartDescriptor>) {
        for (d, assignment) in descriptors.into_iter().zip(self.assignments.iter()) {
            d.set_assignment(assignment.clone());
        }
    }

    fn bind_all(&mut self, categories: Vec<String>) -> ColorAssignment {
        ColorAssignment::Discrete(
            categories
                .into_iter()
                .map(|c| {
                    let color = self.bind(&c);
                    (c, color)
                })
                .collect(),
        )
    }

    /// Discrete colour for `key`; `None` if the key already holds a colorscale
    fn bind(&mut self, key: &str) -> Option<String> {
        if let Some(&i) = self.index.get(key) {
            return Some(self.discrete[i].1.clone());
        }
        if self.colorscale(key).is_some() {
            return None;
        }
        let color = qualitative_color(self.discrete.len());
        self.index.insert(key.to_string(), self.discrete.len());
        self.discrete.push((key.to_string(), color.clone()));
        Some(color)
    }

    fn bind_colorscale(&mut self, key: &str, scale: String) -> Option<String> {
        if self.index.contains_key(key) {
            return None;
        }
        if let Some(existing) = self.colorscale(key) {
            return Some(existing.to_string());
        }
        self.colorscales.push((key.to_string(), scale.clone()));
        Some(scale)
    }

    pub fn color(&self, key: &str) -> Option<&str> {
        self.index.get(key).map(|&i| self.discrete[i].1.as_str())
    }

    pub fn colorscale(&self, key: &str) -> Option<&str> {
        self.colorscales
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, s)| s.as_str())
    }

    /// Discrete bindings in allocation order
    pub fn colors(&self) -> &[(String, String)] {
        &self.discrete
    }

    pub fn colorscales(&self) -> &[(String, String)] {
        &self.colorscales
    }

    pub fn is_empty(&self) -> bool {
        self.discrete.is_empty() && self.colorscales.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart;

    fn colored(categories: Vec<&str>) -> ChartDescriptor {
        let n = categories.len();
        chart::scatter()
            .x(vec![0.0; n])
            .y(vec![0.0; n])
            .color(categories)
            .build()
            .unwrap()
    }

    #[test]
    fn test_rgb_to_hex() {
        assert_eq!(rgb_to_hex(&RGBColor(255, 0, 16)), "#ff0010");
        assert_eq!(qualitative_color(0), "#636efa");
        assert_eq!(qualitative_color(10), qualitative_color(0));
    }

    #[test]
    fn test_empty_input_gives_empty_palette() {
        let mut diags = Diagnostics::new();
        let palette = Palette::allocate(&[], &PaletteOptions::default(), &mut diags);
        assert!(palette.is_empty());
        assert!(diags.is_empty());
    }

    #[test]
    fn test_uncolored_charts_get_synthetic_labels() {
        let a = chart::line().y(vec![1.0]).build().unwrap();
        let b = chart::line().y(vec![2.0]).name("Temp").build().unwrap();
        let mut diags = Diagnostics::new();
        let palette = Palette::allocate(&[&a, &b], &PaletteOptions::default(), &mut diags);

        assert_eq!(palette.colors()[0].0, "Line 1");
        assert_eq!(palette.colors()[1].0, "Temp 2");
        assert_ne!(palette.color("Line 1"), palette.color("Temp 2"));
    }

    #[test]
    fn test_shared_categories_share_colors() {
        let a = colored(vec!["A", "B", "A"]);
        let b = colored(vec!["B", "C"]);
        let mut diags = Diagnostics::new();
        let palette = Palette::allocate(&[&a, &b], &PaletteOptions::default(), &mut diags);

        let keys: Vec<&str> = palette.colors().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
        assert_eq!(palette.color("B"), Some(qualitative_color(1).as_str()));
    }

    #[test]
    fn test_allocation_is_deterministic() {
        let a = colored(vec!["x", "y", "z"]);
        let b = chart::bar().y(vec![1.0]).build().unwrap();
        let c = colored(vec!["z", "w"]);
        let opts = PaletteOptions::default();

        let first = Palette::allocate(&[&a, &b, &c], &opts, &mut Diagnostics::new());
        let second = Palette::allocate(&[&a, &b, &c], &opts, &mut Diagnostics::new());
        assert_eq!(first.colors(), second.colors());
    }

    #[test]
    fn test_palette_cycles() {
        let labels: Vec<String> = (0..12).map(|i| format!("c{}", i)).collect();
        let d = colored(labels.iter().map(String::as_str).collect());
        let palette = Palette::allocate(&[&d], &PaletteOptions::default(), &mut Diagnostics::new());
        assert_eq!(palette.color("c10"), palette.color("c0"));
        assert_eq!(palette.color("c11"), palette.color("c1"));
    }

    #[test]
    fn test_continuous_routing_requires_opt_in() {
        let plain = colored(vec!["a", "b", "c"]);
        let palette = Palette::allocate(&[&plain], &PaletteOptions::default(), &mut Diagnostics::new());
        assert!(palette.colorscales().is_empty());

        let n = 3;
        let routed = chart::scatter()
            .x(vec![0.0; n])
            .y(vec![0.0; n])
            .color(vec!["a", "b", "c"])
            .continuous_color(true)
            .colorscale("Plasma")
            .build()
            .unwrap();
        let palette = Palette::allocate(&[&routed], &PaletteOptions::default(), &mut Diagnostics::new());
        assert!(palette.colors().is_empty());
        assert_eq!(palette.colorscale("Scatter color 1"), Some("Plasma"));
    }

    #[test]
    fn test_unnamed_routed_charts_keep_their_own_colorscales() {
        let make = |scale: &str| {
            chart::scatter()
                .x(vec![0.0; 3])
                .y(vec![0.0; 3])
                .color(vec!["a", "b", "c"])
                .continuous_color(true)
                .colorscale(scale)
                .build()
                .unwrap()
        };
        let mut a = make("Viridis");
        let mut b = make("Plasma");
        let mut diags = Diagnostics::new();
        let palette = Palette::allocate(&[&a, &b], &PaletteOptions::default(), &mut diags);

        assert_eq!(palette.colorscale("Scatter color 1"), Some("Viridis"));
        assert_eq!(palette.colorscale("Scatter color 2"), Some("Plasma"));
        assert!(diags.contains(DiagnosticKind::MultipleColorscales));

        palette.apply(vec![&mut a, &mut b]);
        assert!(matches!(
            b.assignment(),
            Some(ColorAssignment::Continuous { colorscale, title }) if colorscale == "Plasma" && title == "Scatter color"
        ));
    }

    #[test]
    fn test_colorscale_on_discrete_grouping_is_reported() {
        let d = chart::scatter()
            .x(vec![0.0; 3])
            .y(vec![0.0; 3])
            .color(vec!["a", "b", "c"])
            .colorscale("Plasma")
            .build()
            .unwrap();
        let mut diags = Diagnostics::new();
        let palette = Palette::allocate(&[&d], &PaletteOptions::default(), &mut diags);
        assert_eq!(palette.colors().len(), 3);
        assert!(diags.contains(DiagnosticKind::IgnoredArgument));

        let mut diags = Diagnostics::new();
        let plain = colored(vec!["a", "b", "c"]);
        Palette::allocate(&[&plain], &PaletteOptions::default(), &mut diags);
        assert!(!diags.contains(DiagnosticKind::IgnoredArgument));
    }

    #[test]
    fn test_two_values_stay_discrete() {
        let d = chart::scatter()
            .x(vec![0.0, 0.0])
            .y(vec![0.0, 0.0])
            .color(vec!["a", "b"])
            .continuous_color(true)
            .build()
            .unwrap();
        let palette = Palette::allocate(&[&d], &PaletteOptions::default(), &mut Diagnostics::new());
        assert_eq!(palette.colors().len(), 2);
    }

    #[test]
    fn test_multiple_colorscales_warn() {
        let make = |name: &str| {
            chart::scatter()
                .x(vec![0.0; 3])
                .y(vec![0.0; 3])
                .color(vec!["a", "b", "c"])
                .name(name)
                .continuous_color(true)
                .build()
                .unwrap()
        };
        let a = make("first");
        let b = make("second");
        let mut diags = Diagnostics::new();
        let palette = Palette::allocate(&[&a, &b], &PaletteOptions::default(), &mut diags);
        assert_eq!(palette.colorscales().len(), 2);
        assert!(diags.contains(DiagnosticKind::MultipleColorscales));
    }

    #[test]
    fn test_apply_writes_assignments() {
        let mut a = colored(vec!["A"]);
        let mut b = chart::image(vec![vec![1.0]]).build().unwrap();
        let palette = {
            let refs = [&a, &b];
            Palette::allocate(&refs, &PaletteOptions::default(), &mut Diagnostics::new())
        };
        palette.apply(vec![&mut a, &mut b]);
        assert!(matches!(a.assignment(), Some(ColorAssignment::Discrete(_))));
        assert_eq!(b.assignment(), None);
    }
}
