// CSV loading for tabular chart data

use crate::data::PlotData;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read a CSV document with a header row into PlotData
pub fn read_csv<R: Read>(reader: R) -> Result<PlotData> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(String::from)
        .collect();

    if headers.is_empty() {
        anyhow::bail!("CSV must have a header row");
    }

    let mut rows = Vec::new();
    for (idx, record) in csv_reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse CSV record {}", idx + 1))?;
        rows.push(record.iter().map(String::from).collect());
    }

    if rows.is_empty() {
        anyhow::bail!("CSV must contain at least one data row");
    }

    Ok(PlotData::new(headers, rows))
}

/// Read a CSV file from disk
pub fn read_csv_file(path: impl AsRef<Path>) -> Result<PlotData> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
    read_csv(file)
}
