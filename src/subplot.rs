// Subplot spec matrix handed to the backend alongside the grid shape

use crate::error::GridError;
use crate::layout::LayoutMatrix;
use crate::trace::TraceType;
use serde::Serialize;

/// One entry of the spec matrix. Serializes the way the plotting backend
/// reads it: `{"colspan": 2, "type": "scatter"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CellSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rowspan: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colspan: Option<usize>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<TraceType>,
}

impl CellSpec {
    pub fn colspan(n: usize) -> Self {
        Self {
            colspan: Some(n),
            ..Default::default()
        }
    }

    pub fn rowspan(n: usize) -> Self {
        Self {
            rowspan: Some(n),
            ..Default::default()
        }
    }

    pub fn of_type(kind: TraceType) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn rowspan_or_one(&self) -> usize {
        self.rowspan.unwrap_or(1)
    }

    pub fn colspan_or_one(&self) -> usize {
        self.colspan.unwrap_or(1)
    }
}

/// `None` marks a cell covered by a span, or a plain cell
pub type SubplotSpec = Vec<Vec<Option<CellSpec>>>;

/// Merge directives for `layout`, or `None` when it has at least
/// `rows + cols` distinct slots and the default grid suffices.
///
/// Rows are scanned first, then columns; a cell claimed by both keeps the
/// column's row-span. A single-row layout has no columns to merge.
pub fn base_specs(layout: &LayoutMatrix) -> Option<SubplotSpec> {
    let (rows, cols) = (layout.rows(), layout.cols());
    if layout.n_slots() >= rows + cols {
        tracing::debug!(slots = layout.n_slots(), rows, cols, "no subplot specs needed");
        return None;
    }

    let mut specs: SubplotSpec = vec![vec![None; cols]; rows];

    for i in 0..rows {
        let row = layout.row(i);
        if row.len() > 1 && row.iter().all(|&s| s == row[0]) {
            specs[i] = vec![None; cols];
            specs[i][0] = Some(CellSpec::colspan(cols));
        }
    }

    for j in 0..cols {
        let column = layout.column(j);
        if rows > 1 && column.iter().all(|&s| s == column[0]) {
            for (i, row) in specs.iter_mut().enumerate() {
                row[j] = if i == 0 { Some(CellSpec::rowspan(rows)) } else { None };
            }
        }
    }

    Some(specs)
}

/// The single backend type shared by every chart of a slot
pub fn slot_type(slot: usize, types: &[TraceType]) -> Result<TraceType, GridError> {
    let first = *types
        .first()
        .ok_or_else(|| GridError::InvalidLayout(format!("slot {} holds no charts", slot)))?;
    if types.iter().any(|&t| t != first) {
        return Err(GridError::MixedChartKinds { slot });
    }
    Ok(first)
}

/// Attach each slot's type to the first cell where the slot is met, in
/// row-major order. `slot_types[s]` lists the types of slot `s`'s charts.
pub fn annotate(
    specs: &mut SubplotSpec,
    layout: &LayoutMatrix,
    slot_types: &[Vec<TraceType>],
) -> Result<(), GridError> {
    for (slot, i, j) in layout.anchors() {
        let types = slot_types.get(slot).map(Vec::as_slice).unwrap_or(&[]);
        let kind = slot_type(slot, types)?;
        specs[i][j].get_or_insert_with(CellSpec::default).kind = Some(kind);
    }
    Ok(())
}
