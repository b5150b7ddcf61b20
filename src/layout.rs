// Layout matrices: which slot occupies which grid cell

use crate::error::GridError;
use nom::{
    branch::alt,
    character::complete::{char, digit1, multispace0, one_of},
    bytes::complete::{take_while, take_while1},
    combinator::{all_consuming, map_res, value},
    multi::separated_list1,
    sequence::{delimited, pair, tuple},
    IResult,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::str::FromStr;

/// R×C grid of slot indices. Equal indices merge into one spanning cell; the
/// indices used must be exactly `0..n`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<Vec<usize>>")]
pub struct LayoutMatrix {
    cells: Vec<Vec<usize>>,
    n_slots: usize,
}

impl LayoutMatrix {
    pub fn new(cells: Vec<Vec<usize>>) -> Result<Self, GridError> {
        let cols = cells.first().map(Vec::len).unwrap_or(0);
        if cells.is_empty() || cols == 0 {
            return Err(GridError::InvalidLayout("layout must have at least one cell".to_string()));
        }
        if let Some(i) = cells.iter().position(|row| row.len() != cols) {
            return Err(GridError::InvalidLayout(format!(
                "row {} has {} cells, expected {}",
                i,
                cells[i].len(),
                cols
            )));
        }

        let distinct: BTreeSet<usize> = cells.iter().flatten().copied().collect();
        let n_slots = distinct.len();
        if distinct.iter().copied().ne(0..n_slots) {
            return Err(GridError::InvalidLayout(format!(
                "slot indices must be the contiguous range 0..{}, got {:?}",
                n_slots, distinct
            )));
        }

        Ok(Self { cells, n_slots })
    }

    /// Single row `[[0, 1, ..., n-1]]`
    pub fn horizontal(n: usize) -> Result<Self, GridError> {
        Self::new(vec![(0..n).collect()])
    }

    /// Single column `[[0], [1], ..., [n-1]]`
    pub fn vertical(n: usize) -> Result<Self, GridError> {
        Self::new((0..n).map(|i| vec![i]).collect())
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn cols(&self) -> usize {
        self.cells[0].len()
    }

    /// Number of distinct slots
    pub fn n_slots(&self) -> usize {
        self.n_slots
    }

    pub fn get(&self, row: usize, col: usize) -> usize {
        self.cells[row][col]
    }

    pub fn row(&self, row: usize) -> &[usize] {
        &self.cells[row]
    }

    pub fn column(&self, col: usize) -> Vec<usize> {
        self.cells.iter().map(|row| row[col]).collect()
    }

    pub fn cells(&self) -> &[Vec<usize>] {
        &self.cells
    }

    /// Slots in row-major visitation order, each with the zero-based cell
    /// where it is first met.
    pub fn anchors(&self) -> Vec<(usize, usize, usize)> {
        let mut seen = vec![false; self.n_slots];
        let mut anchors = Vec::with_capacity(self.n_slots);
        for (i, row) in self.cells.iter().enumerate() {
            for (j, &slot) in row.iter().enumerate() {
                if !seen[slot] {
                    seen[slot] = true;
                    anchors.push((slot, i, j));
                }
            }
        }
        anchors
    }
}

impl TryFrom<Vec<Vec<usize>>> for LayoutMatrix {
    type Error = GridError;

    fn try_from(cells: Vec<Vec<usize>>) -> Result<Self, Self::Error> {
        LayoutMatrix::new(cells)
    }
}

impl FromStr for LayoutMatrix {
    type Err = GridError;

    /// Accepts `"0 0; 1 2"`, one row per line, or `"[[0, 0], [1, 2]]"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, cells) = parse_layout(s)
            .map_err(|e| GridError::InvalidLayout(format!("cannot parse '{}': {:?}", s.trim(), e)))?;
        LayoutMatrix::new(cells)
    }
}

/// Parse layout text into rows of slot indices
pub fn parse_layout(input: &str) -> IResult<&str, Vec<Vec<usize>>> {
    all_consuming(delimited(multispace0, alt((bracketed, plain)), multispace0))(input)
}

fn number(input: &str) -> IResult<&str, usize> {
    map_res(digit1, str::parse)(input)
}

fn inline_ws(input: &str) -> IResult<&str, &str> {
    take_while(|c| c == ' ' || c == '\t' || c == '\r')(input)
}

fn comma(input: &str) -> IResult<&str, char> {
    delimited(multispace0, char(','), multispace0)(input)
}

/// Cells of a plain row: commas or runs of blanks
fn cell_sep(input: &str) -> IResult<&str, ()> {
    alt((
        value((), tuple((inline_ws, char(','), inline_ws))),
        value((), take_while1(|c| c == ' ' || c == '\t')),
    ))(input)
}

fn row_sep(input: &str) -> IResult<&str, ()> {
    value((), tuple((inline_ws, one_of(";\n"), multispace0)))(input)
}

fn plain(input: &str) -> IResult<&str, Vec<Vec<usize>>> {
    separated_list1(row_sep, separated_list1(cell_sep, number))(input)
}

fn bracketed_row(input: &str) -> IResult<&str, Vec<usize>> {
    delimited(
        pair(char('['), multispace0),
        separated_list1(comma, number),
        pair(multispace0, char(']')),
    )(input)
}

fn bracketed(input: &str) -> IResult<&str, Vec<Vec<usize>>> {
    delimited(
        pair(char('['), multispace0),
        separated_list1(comma, bracketed_row),
        pair(multispace0, char(']')),
    )(input)
}
