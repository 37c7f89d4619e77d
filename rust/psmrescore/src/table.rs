//! A small column-named table of string cells.
//!
//! Feature tables move between pipeline stages (and the external classifier)
//! as delimited text with a header row. The set of columns depends on the
//! configuration, so rows are kept as strings and columns are parsed on
//! demand by the stage that needs them.

use crate::errors::{
    RescoreError,
    Result,
};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Cells written by upstream tools for a missing value.
fn is_missing(cell: &str) -> bool {
    matches!(cell.trim(), "" | "NaN" | "nan" | "NA")
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn from_reader<R: std::io::Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .from_reader(reader);
        let columns = rdr.headers()?.iter().map(String::from).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            rows.push(record?.iter().map(String::from).collect());
        }
        Ok(Self { columns, rows })
    }

    /// Reads a table whose last column may spill over into extra cells.
    ///
    /// Percolator writes one protein per trailing cell; the surplus cells are
    /// joined back into the last column with `joiner`.
    pub fn from_reader_spilling_last<R: std::io::Read>(
        reader: R,
        delimiter: u8,
        joiner: &str,
    ) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(reader);
        let columns: Vec<String> = rdr.headers()?.iter().map(String::from).collect();
        let width = columns.len();
        let mut rows = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            if record.len() < width {
                return Err(RescoreError::RowLength {
                    row,
                    got: record.len(),
                    expected: width,
                });
            }
            let mut cells: Vec<String> = record.iter().take(width).map(String::from).collect();
            if record.len() > width && width > 0 {
                let tail: Vec<&str> = record.iter().skip(width - 1).collect();
                cells[width - 1] = tail.join(joiner);
            }
            rows.push(cells);
        }
        Ok(Self { columns, rows })
    }

    pub fn read_delimited(path: &Path, delimiter: u8) -> Result<Self> {
        let file = File::open(path).map_err(|e| RescoreError::io(e, path))?;
        Self::from_reader(file, delimiter)
    }

    pub fn read_tsv(path: &Path) -> Result<Self> {
        Self::read_delimited(path, b'\t')
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        Self::read_delimited(path, b',')
    }

    pub fn to_writer<W: std::io::Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in self.rows.iter() {
            wtr.write_record(row)?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    pub fn write_delimited(&self, path: &Path, delimiter: u8) -> Result<()> {
        let file = File::create(path).map_err(|e| RescoreError::io(e, path))?;
        self.to_writer(file, delimiter)
    }

    pub fn write_tsv(&self, path: &Path) -> Result<()> {
        self.write_delimited(path, b'\t')
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        self.write_delimited(path, b',')
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn require_column(&self, name: &str, context: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| RescoreError::missing_column(name, context))
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(RescoreError::RowLength {
                row: self.rows.len(),
                got: row.len(),
                expected: self.columns.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Borrowed view of one column.
    pub fn column(&self, name: &str) -> Result<Vec<&str>> {
        let idx = self.require_column(name, "reading column")?;
        Ok(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Parses every cell of a column, failing on the first bad (or missing) cell.
    pub fn parse_column<T: FromStr>(&self, name: &str) -> Result<Vec<T>> {
        let idx = self.require_column(name, "parsing column")?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, r)| {
                r[idx].trim().parse::<T>().map_err(|_| RescoreError::ParseValue {
                    column: name.to_string(),
                    value: r[idx].clone(),
                    row,
                })
            })
            .collect()
    }

    /// Parses a column that may be absent or contain missing cells.
    ///
    /// Returns `None` when the column does not exist.
    pub fn parse_optional_column<T: FromStr>(&self, name: &str) -> Result<Option<Vec<Option<T>>>> {
        let Some(idx) = self.column_index(name) else {
            return Ok(None);
        };
        self.rows
            .iter()
            .enumerate()
            .map(|(row, r)| {
                let cell = &r[idx];
                if is_missing(cell) {
                    return Ok(None);
                }
                cell.trim()
                    .parse::<T>()
                    .map(Some)
                    .map_err(|_| RescoreError::ParseValue {
                        column: name.to_string(),
                        value: cell.clone(),
                        row,
                    })
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Adds a column, or replaces its values if it already exists.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(RescoreError::RowLength {
                row: 0,
                got: values.len(),
                expected: self.rows.len(),
            });
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row[idx] = v;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.push(v);
                }
            }
        }
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Result<()> {
        let idx = self.require_column(name, "dropping column")?;
        self.columns.remove(idx);
        for row in self.rows.iter_mut() {
            row.remove(idx);
        }
        Ok(())
    }

    /// Renames a column if present, returns whether anything changed.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(idx) if from != to => {
                self.columns[idx] = to.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn map_column(&mut self, name: &str, f: impl Fn(&str) -> String) -> Result<()> {
        let idx = self.require_column(name, "transforming column")?;
        for row in self.rows.iter_mut() {
            row[idx] = f(&row[idx]);
        }
        Ok(())
    }

    /// Projects the table onto `names`, in that order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let indices = names
            .iter()
            .map(|n| self.require_column(n.as_ref(), "selecting columns"))
            .collect::<Result<Vec<_>>>()?;
        Ok(Table {
            columns: names.iter().map(|n| n.as_ref().to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| indices.iter().map(|&i| r[i].clone()).collect())
                .collect(),
        })
    }

    /// Copy of the rows at `indices`, in that order.
    pub fn take_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Stable sort by a numeric column, largest first.
    ///
    /// Cells that do not parse as numbers sort after every number and keep
    /// their relative order.
    pub fn sort_descending_by(&mut self, name: &str) -> Result<()> {
        let idx = self.require_column(name, "sorting")?;
        let key = |row: &Vec<String>| row[idx].trim().parse::<f64>().ok().filter(|v| !v.is_nan());
        self.rows.sort_by(|a, b| match (key(a), key(b)) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        Ok(())
    }

    /// Keeps the first row seen for every distinct combination of `keys`.
    ///
    /// Returns the number of rows removed.
    pub fn dedup_by_columns(&mut self, keys: &[&str]) -> Result<usize> {
        let indices = keys
            .iter()
            .map(|k| self.require_column(k, "deduplicating"))
            .collect::<Result<Vec<_>>>()?;
        let before = self.rows.len();
        let mut seen: HashSet<Vec<String>> = HashSet::with_capacity(before);
        self.rows
            .retain(|row| seen.insert(indices.iter().map(|&i| row[i].clone()).collect()));
        Ok(before - self.rows.len())
    }
}
