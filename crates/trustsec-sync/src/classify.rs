//! Export cell classification for presentation.
//!
//! Maps matrix text to a policy intent and a fill colour. Nothing here
//! affects synchronization.

use std::fmt;

use crate::matrix::Matrix;
use crate::table::Table;
use crate::types::is_reserved_value;

/// Policy intent of one matrix cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellClass {
    Empty,
    Default,
    Allow,
    Deny,
    Custom,
}

impl CellClass {
    /// Fill colour as `#RRGGBB`. Empty cells share the default fill.
    pub fn colour(&self) -> &'static str {
        match self {
            CellClass::Empty | CellClass::Default => colours::DEFAULT,
            CellClass::Allow => colours::ALLOW,
            CellClass::Deny => colours::DENY,
            CellClass::Custom => colours::CUSTOM,
        }
    }
}

impl fmt::Display for CellClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CellClass::Empty => "empty",
            CellClass::Default => "default",
            CellClass::Allow => "allow",
            CellClass::Deny => "deny",
            CellClass::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// Presentation colours.
pub mod colours {
    /// Status green
    pub const ALLOW: &str = "#6CC04A";
    /// Status red, 40% lighter
    pub const DENY: &str = "#EF7775";
    /// Light grey, also used for empty cells
    pub const DEFAULT: &str = "#F2F2F2";
    /// Status blue
    pub const CUSTOM: &str = "#64BBE3";
    /// Light grey, rows with a reserved tag value
    pub const RESERVED: &str = "#F2F2F2";
}

/// Headers of the colour table emitted with an export.
pub const COLOUR_HEADERS: [&str; 5] = ["SGT", "Destination", "Class", "Reserved", "Colour"];

/// Classify cell text by case-sensitive prefix.
pub fn classify(text: &str) -> CellClass {
    if text.is_empty() {
        CellClass::Empty
    } else if text.starts_with("default") {
        CellClass::Default
    } else if text.starts_with("allow") || text.starts_with("permit") {
        CellClass::Allow
    } else if text.starts_with("deny") {
        CellClass::Deny
    } else {
        CellClass::Custom
    }
}

/// Presentation of one matrix position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedCell {
    pub row: String,
    pub column: String,
    pub class: CellClass,
    /// Source row carries a platform reserved tag value
    pub reserved: bool,
}

impl ClassifiedCell {
    /// Reserved rows take the reserved colour regardless of content.
    pub fn colour(&self) -> &'static str {
        if self.reserved {
            colours::RESERVED
        } else {
            self.class.colour()
        }
    }
}

/// Classify every position of the matrix, row-major.
///
/// Only the row's own tag value marks a position reserved; the destination
/// column plays no part.
pub fn classify_matrix(matrix: &Matrix) -> Vec<ClassifiedCell> {
    let mut out = Vec::with_capacity(matrix.rows().len() * matrix.columns().len());
    for row in matrix.rows() {
        let reserved = is_reserved_value(row.value);
        for column in matrix.columns() {
            out.push(ClassifiedCell {
                row: row.name.clone(),
                column: column.clone(),
                class: classify(matrix.get(&row.name, column).unwrap_or("")),
                reserved,
            });
        }
    }
    out
}

/// Render the classification of every matrix position as a flat table.
pub fn colour_table(matrix: &Matrix) -> Table {
    let mut table = Table::new(COLOUR_HEADERS);
    for cell in classify_matrix(matrix) {
        let colour = cell.colour();
        table.push_row([
            cell.row,
            cell.column,
            cell.class.to_string(),
            cell.reserved.to_string(),
            colour.to_string(),
        ]);
    }
    table
}
