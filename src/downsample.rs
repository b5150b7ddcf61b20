// Large-input detection and min/max bucket decimation

use crate::chart::{ChartDescriptor, DataSource, Selector};
use crate::trace::{MarkerColor, Trace, TraceType};
use serde::Serialize;

/// Point count above which a figure gets a resampler
pub const DEFAULT_THRESHOLD: usize = 75_000;

/// Points kept per trace once resampling kicks in
pub const DEFAULT_MAX_POINTS: usize = 1_000;

/// Points a descriptor feeds into the figure: table rows, lengths of values
/// given directly and matrix cells. Column names count nothing.
pub fn point_count(d: &ChartDescriptor) -> usize {
    let source = match d.data() {
        DataSource::Table(table) => table.len(),
        DataSource::Matrix(z) => z.iter().map(Vec::len).sum(),
        DataSource::Raw => 0,
    };
    let raw: usize = [d.x(), d.y(), d.color()]
        .into_iter()
        .flatten()
        .map(|s| match s {
            Selector::Values(values) => values.len(),
            Selector::Column(_) => 0,
        })
        .sum();
    source + raw
}

pub fn total_points<'a>(descriptors: impl IntoIterator<Item = &'a ChartDescriptor>) -> usize {
    descriptors.into_iter().map(point_count).sum()
}

/// True when the summed input exceeds `threshold`
pub fn needs_downsampling(descriptors: &[&ChartDescriptor], threshold: usize) -> bool {
    total_points(descriptors.iter().copied()) > threshold
}

/// Reduces line and scatter traces to a point budget when they are rendered
/// or exported. Other trace types pass through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resampler {
    pub max_points: usize,
}

impl Default for Resampler {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
        }
    }
}

impl Resampler {
    pub fn new(max_points: usize) -> Self {
        Self { max_points }
    }

    pub fn apply(&self, trace: &Trace) -> Trace {
        if trace.kind != TraceType::Scatter || trace.len() <= self.max_points {
            return trace.clone();
        }
        let y = match trace.y.as_ref().and_then(|y| y.as_numbers()) {
            Some(y) => y,
            None => return trace.clone(),
        };

        let keep = minmax_indices(y, self.max_points);
        let mut out = trace.clone();
        out.x = trace.x.as_ref().map(|x| x.select(&keep));
        out.y = trace.y.as_ref().map(|y| y.select(&keep));
        if let Some(marker) = out.marker.as_mut() {
            if let Some(MarkerColor::PerPoint(colors)) = &marker.color {
                let selected = keep.iter().filter_map(|&i| colors.get(i).copied()).collect();
                marker.color = Some(MarkerColor::PerPoint(selected));
            }
        }
        out
    }
}

/// Indices kept by min/max bucket decimation: the first and last point, plus
/// the lowest and highest point of each bucket in between. Never returns more
/// than `max_points` indices; indices are ascending.
pub fn minmax_indices(y: &[f64], max_points: usize) -> Vec<usize> {
    let n = y.len();
    if n <= max_points {
        return (0..n).collect();
    }
    if max_points < 4 {
        return [0, n - 1].into_iter().take(max_points).collect();
    }

    let interior = n - 2;
    let n_buckets = (max_points - 2) / 2;
    let bucket_size = (interior + n_buckets - 1) / n_buckets;

    let mut keep = Vec::with_capacity(max_points);
    keep.push(0);
    let mut start = 1;
    while start < n - 1 {
        let end = (start + bucket_size).min(n - 1);
        let (mut lo, mut hi) = (start, start);
        for i in start..end {
            if y[i] < y[lo] || y[lo].is_nan() {
                lo = i;
            }
            if y[i] > y[hi] || y[hi].is_nan() {
                hi = i;
            }
        }
        keep.push(lo.min(hi));
        if lo != hi {
            keep.push(lo.max(hi));
        }
        start = end;
    }
    keep.push(n - 1);
    keep
}
