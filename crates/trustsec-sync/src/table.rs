//! Tabular workbook files.
//!
//! A workbook is a JSON document of named tables, each a header row plus
//! string rows. Import reads `Matrix` and `Acls`; export also writes the
//! tag, policy and cell colour tables.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use trustsec_common::{ErsError, ErsResult};

/// Headers plus string rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    /// Index of a header, compared case-insensitively.
    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(header))
    }

    /// Cell text at `row`/`column`; empty when the row is short.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Named tables of one export or import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workbook {
    #[serde(rename = "Matrix")]
    pub matrix: Table,
    #[serde(rename = "Acls", default)]
    pub acls: Table,
    #[serde(rename = "Tags", default, skip_serializing_if = "Table::is_empty")]
    pub tags: Table,
    #[serde(rename = "Policies", default, skip_serializing_if = "Table::is_empty")]
    pub policies: Table,
    /// Class and fill of every matrix position
    #[serde(rename = "Colours", default, skip_serializing_if = "Table::is_empty")]
    pub colours: Table,
}

impl Workbook {
    /// Read a workbook file.
    pub fn read(path: impl AsRef<Path>) -> ErsResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| ErsError::shape(format!("{}: {}", path.display(), e)))
    }

    /// Write the workbook as pretty-printed JSON.
    pub fn write(&self, path: impl AsRef<Path>) -> ErsResult<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| ErsError::shape(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }
}
