//! The table produced by an extraction pass.

use std::collections::BTreeMap;

use clap::ValueEnum;
use schemars::JsonSchema;
use serde::ser::SerializeMap as _;

use crate::prelude::*;

/// Name of the column holding the 1-based page number.
pub const PAGE_COLUMN: &str = "Page";

/// Output formats for an [`ExtractionResult`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum TableFormat {
    /// Comma-separated values with a header row.
    #[default]
    Csv,
    /// One JSON object per line, keys in column order.
    Jsonl,
}

/// One row per page, one column per distinct field name, plus the page
/// number.
///
/// The column set is fixed when the table is created. Two regions with the
/// same field name share a column, and the later region's value wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionResult {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ExtractionResult {
    /// Create an empty table with a `Page` column followed by `field_names`.
    pub fn new<I, S>(field_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut columns = vec![PAGE_COLUMN.to_owned()];
        for name in field_names {
            let name = name.into();
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
        Self {
            columns,
            rows: vec![],
        }
    }

    /// Our column names, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Our rows. Each row has one value per column.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// How many rows do we have?
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Append the row for a page. Fields are written in order, so a repeated
    /// field name keeps the last value.
    pub fn push_page<'a, I>(&mut self, page_number: usize, fields: I)
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        let mut row = vec![String::new(); self.columns.len()];
        row[0] = page_number.to_string();
        for (name, value) in fields {
            if let Some(idx) = self.column_index(name) {
                row[idx] = value;
            } else {
                warn!(column = name, "Dropping value for unknown column");
            }
        }
        self.rows.push(row);
    }

    /// Look up a cell.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| r[idx].as_str())
    }

    /// Overwrite a cell.
    pub fn set(&mut self, row: usize, column: &str, value: impl Into<String>) -> Result<()> {
        let idx = self
            .column_index(column)
            .ok_or_else(|| anyhow!("no column named {:?}", column))?;
        let row_count = self.rows.len();
        let cells = self
            .rows
            .get_mut(row)
            .ok_or_else(|| anyhow!("row {} out of range ({} rows)", row, row_count))?;
        cells[idx] = value.into();
        Ok(())
    }

    /// Append a blank row, numbered after the last row. Returns its index.
    pub fn append_row(&mut self) -> usize {
        let page_number = self.rows.len() + 1;
        self.push_page(page_number, std::iter::empty());
        self.rows.len() - 1
    }

    /// Remove a row.
    pub fn remove_row(&mut self, row: usize) -> Option<Vec<String>> {
        (row < self.rows.len()).then(|| self.rows.remove(row))
    }

    /// Rows as ordered records, for serialization.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(|values| Record {
            columns: &self.columns,
            values,
        })
    }

    /// Render the table in the requested format.
    pub fn to_bytes(&self, format: TableFormat) -> Result<Vec<u8>> {
        match format {
            TableFormat::Csv => self.to_csv(),
            TableFormat::Jsonl => self.to_jsonl(),
        }
    }

    /// Render as CSV, with a header row.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut wtr = csv::WriterBuilder::new().from_writer(Vec::<u8>::new());
        wtr.write_record(&self.columns)
            .context("failed to write CSV header")?;
        for row in &self.rows {
            wtr.write_record(row).context("failed to write CSV row")?;
        }
        wtr.into_inner()
            .map_err(|err| anyhow!("failed to flush CSV output: {}", err.error()))
    }

    /// Render as JSON Lines.
    pub fn to_jsonl(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for record in self.records() {
            serde_json::to_writer(&mut out, &record)
                .context("failed to serialize extraction record")?;
            out.push(b'\n');
        }
        Ok(out)
    }
}

/// A borrowed row which serializes as a JSON object in column order.
pub struct Record<'a> {
    columns: &'a [String],
    values: &'a [String],
}

impl Serialize for Record<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Schema of one JSONL output record. Used only by the `schema` subcommand.
#[derive(Debug, Deserialize, JsonSchema)]
#[allow(dead_code)]
pub struct ExtractionRecord {
    /// The 1-based page number.
    #[serde(rename = "Page")]
    pub page: String,

    /// Extracted text, keyed by field name. Empty if the region could not be
    /// recognized.
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}
