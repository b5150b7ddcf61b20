use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

/// Tabular input: named columns, string cells.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl PlotData {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Build a table from `(column name, values)` pairs. Columns shorter than
    /// the longest one are padded with empty cells.
    pub fn from_columns(columns: Vec<(&str, Series)>) -> Self {
        let headers = columns.iter().map(|(name, _)| name.to_string()).collect();
        let n_rows = columns.iter().map(|(_, s)| s.len()).max().unwrap_or(0);
        let mut rows = vec![Vec::with_capacity(columns.len()); n_rows];
        for (_, series) in &columns {
            let cells = series.to_strings();
            for (i, row) in rows.iter_mut().enumerate() {
                row.push(cells.get(i).cloned().unwrap_or_default());
            }
        }
        Self { headers, rows }
    }

    /// Create PlotData from a JSON Array of Objects
    pub fn from_json(value: &Value) -> Result<Self> {
        let array = value
            .as_array()
            .ok_or_else(|| anyhow!("Input data must be a JSON array of objects"))?;

        if array.is_empty() {
            return Err(anyhow!("Input data array is empty"));
        }

        // Extract headers from the first object
        let first_obj = array[0]
            .as_object()
            .ok_or_else(|| anyhow!("Items in array must be objects"))?;

        let headers: Vec<String> = first_obj.keys().cloned().collect();

        let mut rows = Vec::new();
        for item in array {
            let obj = item
                .as_object()
                .ok_or_else(|| anyhow!("Items in array must be objects"))?;

            let mut row = Vec::new();
            for header in &headers {
                let val_str = match obj.get(header) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    Some(Value::Bool(b)) => b.to_string(),
                    Some(Value::Null) | None => "".to_string(),
                    _ => return Err(anyhow!("Unsupported value type for field '{}'", header)),
                };
                row.push(val_str);
            }
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Extract one column. A column whose non-empty cells all parse as numbers
    /// becomes `Series::Numbers` (empty cells turn into NaN); anything else is
    /// kept as labels.
    pub fn column(&self, name: &str) -> Option<Series> {
        let idx = self.column_index(name)?;
        let cells: Vec<&str> = self
            .rows
            .iter()
            .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
            .collect();
        Some(Series::parse(&cells))
    }

    /// Names of the columns that hold numbers, in header order.
    pub fn numeric_columns(&self) -> Vec<String> {
        self.headers
            .iter()
            .filter(|h| matches!(self.column(h), Some(Series::Numbers(_))))
            .cloned()
            .collect()
    }
}

/// A raw sequence of values for one axis, colour grouping or table column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Series {
    Numbers(Vec<f64>),
    Labels(Vec<String>),
}

impl Series {
    /// Positional index `0..n`
    pub fn index(n: usize) -> Self {
        Series::Numbers((0..n).map(|i| i as f64).collect())
    }

    fn parse(cells: &[&str]) -> Self {
        let numeric = cells
            .iter()
            .filter(|c| !c.trim().is_empty())
            .all(|c| c.trim().parse::<f64>().is_ok());
        let any_value = cells.iter().any(|c| !c.trim().is_empty());

        if numeric && any_value {
            Series::Numbers(
                cells
                    .iter()
                    .map(|c| c.trim().parse::<f64>().unwrap_or(f64::NAN))
                    .collect(),
            )
        } else {
            Series::Labels(cells.iter().map(|c| c.to_string()).collect())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Series::Numbers(v) => v.len(),
            Series::Labels(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Series::Numbers(_))
    }

    pub fn as_numbers(&self) -> Option<&[f64]> {
        match self {
            Series::Numbers(v) => Some(v),
            Series::Labels(_) => None,
        }
    }

    /// Number of missing entries: NaN for numbers, blank strings for labels.
    pub fn missing_count(&self) -> usize {
        match self {
            Series::Numbers(v) => v.iter().filter(|x| x.is_nan()).count(),
            Series::Labels(v) => v.iter().filter(|s| s.trim().is_empty()).count(),
        }
    }

    /// Every value rendered as a category label.
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            Series::Numbers(v) => v.iter().map(|x| format_number(*x)).collect(),
            Series::Labels(v) => v.clone(),
        }
    }

    /// Distinct labels in order of first appearance.
    pub fn distinct_labels(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.to_strings()
            .into_iter()
            .filter(|label| seen.insert(label.clone()))
            .collect()
    }

    /// Keep only the entries at `indices`.
    pub fn select(&self, indices: &[usize]) -> Series {
        match self {
            Series::Numbers(v) => Series::Numbers(indices.iter().filter_map(|&i| v.get(i).copied()).collect()),
            Series::Labels(v) => Series::Labels(indices.iter().filter_map(|&i| v.get(i).cloned()).collect()),
        }
    }
}

impl From<Vec<f64>> for Series {
    fn from(values: Vec<f64>) -> Self {
        Series::Numbers(values)
    }
}

impl From<Vec<i64>> for Series {
    fn from(values: Vec<i64>) -> Self {
        Series::Numbers(values.into_iter().map(|v| v as f64).collect())
    }
}

impl From<Vec<String>> for Series {
    fn from(values: Vec<String>) -> Self {
        Series::Labels(values)
    }
}

impl From<Vec<&str>> for Series {
    fn from(values: Vec<&str>) -> Self {
        Series::Labels(values.into_iter().map(String::from).collect())
    }
}

/// Integral floats print without a fractional part so that `1.0` and `"1"`
/// name the same category.
fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.is_finite() && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        x.to_string()
    }
}
