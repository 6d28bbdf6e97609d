//! Tag-by-tag policy matrix.
//!
//! Rows carry tag name, value and description; each data column is a tag
//! name. A cell holds comma-joined ACL names, a default-rule keyword, or
//! nothing.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use trustsec_common::{ErsError, ErsResult};

use crate::table::Table;
use crate::types::{validate_name, DESCRIPTION_MAX_LEN};

/// Identity column headers, in order.
pub const HEADER_NAME: &str = "SGT";
pub const HEADER_VALUE: &str = "Value";
pub const HEADER_DESCRIPTION: &str = "Description";
pub const IDENTITY_HEADERS: [&str; 3] = [HEADER_NAME, HEADER_VALUE, HEADER_DESCRIPTION];

/// Row metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixRow {
    pub name: String,
    pub value: u16,
    pub description: String,
}

impl MatrixRow {
    pub fn new(name: impl Into<String>, value: u16, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            description: description.into(),
        }
    }
}

/// Row ordering for export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Name,
    Value,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "value" => Ok(SortKey::Value),
            _ => Err(format!("Unknown sort key '{}', expected name or value", s)),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Name => write!(f, "name"),
            SortKey::Value => write!(f, "value"),
        }
    }
}

/// Dense policy matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matrix {
    rows: Vec<MatrixRow>,
    columns: Vec<String>,
    /// (row name, column name) -> text; empty cells are absent
    cells: HashMap<(String, String), String>,
}

impl Matrix {
    /// Empty matrix whose columns are the row names.
    pub fn square(rows: Vec<MatrixRow>) -> Self {
        let columns = rows.iter().map(|r| r.name.clone()).collect();
        Self {
            rows,
            columns,
            cells: HashMap::new(),
        }
    }

    pub fn rows(&self) -> &[MatrixRow] {
        &self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row(&self, name: &str) -> Option<&MatrixRow> {
        self.rows.iter().find(|r| r.name == name)
    }

    pub fn get(&self, row: &str, column: &str) -> Option<&str> {
        self.cells
            .get(&(row.to_string(), column.to_string()))
            .map(String::as_str)
    }

    /// Write a cell. Returns false when the row or column is not part of
    /// the matrix; empty text clears the cell.
    pub fn set(&mut self, row: &str, column: &str, text: impl Into<String>) -> bool {
        if self.row(row).is_none() || !self.columns.iter().any(|c| c == column) {
            return false;
        }
        let key = (row.to_string(), column.to_string());
        let text = text.into();
        if text.is_empty() {
            self.cells.remove(&key);
        } else {
            self.cells.insert(key, text);
        }
        true
    }

    /// Sort rows and reorder columns to follow them.
    pub fn sort_by(&mut self, key: SortKey) {
        match key {
            SortKey::Name => self.rows.sort_by(|a, b| a.name.cmp(&b.name)),
            SortKey::Value => self
                .rows
                .sort_by(|a, b| a.value.cmp(&b.value).then_with(|| a.name.cmp(&b.name))),
        }
        let position: HashMap<&str, usize> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.as_str(), i))
            .collect();
        self.columns
            .sort_by_key(|c| position.get(c.as_str()).copied().unwrap_or(usize::MAX));
    }

    /// Non-empty cells as (row, column, text), row-major.
    pub fn non_empty_cells(&self) -> Vec<(&str, &str, &str)> {
        let mut out = Vec::new();
        for row in &self.rows {
            for column in &self.columns {
                if let Some(text) = self.get(&row.name, column) {
                    out.push((row.name.as_str(), column.as_str(), text));
                }
            }
        }
        out
    }

    pub fn to_table(&self) -> Table {
        let headers = IDENTITY_HEADERS
            .iter()
            .map(|h| h.to_string())
            .chain(self.columns.iter().cloned());
        let mut table = Table::new(headers);
        for row in &self.rows {
            let mut cells = vec![
                row.name.clone(),
                row.value.to_string(),
                row.description.clone(),
            ];
            cells.extend(
                self.columns
                    .iter()
                    .map(|c| self.get(&row.name, c).unwrap_or("").to_string()),
            );
            table.push_row(cells);
        }
        table
    }

    /// Parse and validate a matrix table.
    ///
    /// Every problem is a shape error; nothing here touches the network.
    pub fn from_table(table: &Table) -> ErsResult<Self> {
        if table.headers.len() < IDENTITY_HEADERS.len()
            || !IDENTITY_HEADERS
                .iter()
                .zip(&table.headers)
                .all(|(expected, actual)| actual.trim().eq_ignore_ascii_case(expected))
        {
            return Err(ErsError::shape(format!(
                "matrix must start with columns {}, found {:?}",
                IDENTITY_HEADERS.join(", "),
                table.headers.iter().take(3).collect::<Vec<_>>()
            )));
        }

        let columns: Vec<String> = table.headers[IDENTITY_HEADERS.len()..]
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut seen_columns = HashSet::new();
        for column in &columns {
            if !seen_columns.insert(column.as_str()) {
                return Err(ErsError::shape(format!("duplicate column '{}'", column)));
            }
        }

        let mut rows = Vec::new();
        let mut seen_rows = HashSet::new();
        let mut cells = HashMap::new();
        for (index, raw) in table.rows.iter().enumerate() {
            if raw.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            if raw.len() > table.headers.len()
                && raw[table.headers.len()..].iter().any(|c| !c.trim().is_empty())
            {
                return Err(ErsError::shape(format!(
                    "row {} has more cells than headers",
                    index + 1
                )));
            }

            let row = parse_row(table, index)?;
            if !seen_rows.insert(row.name.clone()) {
                return Err(ErsError::shape(format!("duplicate tag '{}'", row.name)));
            }

            for (offset, column) in columns.iter().enumerate() {
                let text = table.cell(index, IDENTITY_HEADERS.len() + offset).trim();
                if !text.is_empty() {
                    cells.insert((row.name.clone(), column.clone()), text.to_string());
                }
            }
            rows.push(row);
        }

        for column in &columns {
            if !seen_rows.contains(column) {
                return Err(ErsError::shape(format!(
                    "column '{}' is not a declared row",
                    column
                )));
            }
        }

        Ok(Self {
            rows,
            columns,
            cells,
        })
    }
}

fn parse_row(table: &Table, index: usize) -> ErsResult<MatrixRow> {
    let name = table.cell(index, 0).trim();
    validate_name("tag", name)?;

    let raw_value = table.cell(index, 1).trim();
    let value = raw_value.parse::<u16>().map_err(|_| {
        ErsError::shape(format!(
            "tag '{}' has value '{}', expected 0-65535",
            name, raw_value
        ))
    })?;

    let description = table.cell(index, 2).trim();
    if description.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(ErsError::shape(format!(
            "description of tag '{}' exceeds {} characters",
            name, DESCRIPTION_MAX_LEN
        )));
    }

    Ok(MatrixRow::new(name, value, description))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_table() -> Table {
        let mut table = Table::new(["SGT", "Value", "Description", "Employees", "Guests"]);
        table.push_row(["Employees", "4", "d1", "", "BlockMalware"]);
        table.push_row(["Guests", "6", "d2", "", ""]);
        table
    }

    #[test]
    fn test_from_table() {
        let matrix = Matrix::from_table(&sample_table()).unwrap();
        assert_eq!(matrix.rows().len(), 2);
        assert_eq!(matrix.get("Employees", "Guests"), Some("BlockMalware"));
        assert_eq!(matrix.get("Guests", "Employees"), None);
        assert_eq!(
            matrix.non_empty_cells(),
            vec![("Employees", "Guests", "BlockMalware")]
        );
    }

    #[test]
    fn test_table_roundtrip() {
        let matrix = Matrix::from_table(&sample_table()).unwrap();
        assert_eq!(matrix.to_table(), sample_table());
    }

    #[test]
    fn test_identity_headers_required() {
        let mut table = sample_table();
        table.headers[0] = "Name".into();
        assert!(matches!(
            Matrix::from_table(&table),
            Err(ErsError::Shape { .. })
        ));
    }

    #[test]
    fn test_undeclared_column() {
        let mut table = sample_table();
        table.headers.push("Contractors".into());
        let err = Matrix::from_table(&table).err().unwrap();
        assert!(err.to_string().contains("Contractors"));
    }

    #[test]
    fn test_row_validation() {
        let mut bad_value = sample_table();
        bad_value.rows[0][1] = "70000".into();
        assert!(Matrix::from_table(&bad_value).is_err());

        let mut duplicate = sample_table();
        duplicate.rows[1][0] = "Employees".into();
        assert!(Matrix::from_table(&duplicate).is_err());

        let mut long_name = sample_table();
        long_name.rows[1][0] = "x".repeat(33);
        assert!(Matrix::from_table(&long_name).is_err());
    }

    #[test]
    fn test_blank_and_short_rows() {
        let mut table = sample_table();
        table.rows.push(vec![String::new(); 5]);
        table.rows[1].truncate(3);
        let matrix = Matrix::from_table(&table).unwrap();
        assert_eq!(matrix.rows().len(), 2);
    }

    #[test]
    fn test_sort_by_value_reorders_columns() {
        let mut matrix = Matrix::square(vec![
            MatrixRow::new("Zeta", 3, ""),
            MatrixRow::new("Alpha", 9, ""),
        ]);
        assert!(matrix.set("Zeta", "Alpha", "deny ip"));
        assert!(!matrix.set("Zeta", "Missing", "deny ip"));

        matrix.sort_by(SortKey::Name);
        assert_eq!(matrix.columns(), ["Alpha", "Zeta"]);
        matrix.sort_by(SortKey::Value);
        assert_eq!(matrix.columns(), ["Zeta", "Alpha"]);
        assert_eq!(matrix.get("Zeta", "Alpha"), Some("deny ip"));
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!("VALUE".parse::<SortKey>(), Ok(SortKey::Value));
        assert!("colour".parse::<SortKey>().is_err());
    }
}
