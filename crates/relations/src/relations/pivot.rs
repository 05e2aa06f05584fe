//! Pivot records and wide-row splitting

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::backends::Row;

/// One pivot-table row attached to a record resolved through
/// `BelongsToMany`. Holds only pivot columns.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotRecord {
    /// Attribute name the owning record exposes this under
    pub name: String,
    pub table: String,
    pub attributes: Row,
}

impl PivotRecord {
    pub fn new(name: impl Into<String>, table: impl Into<String>, attributes: Row) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            attributes,
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }
}

impl Serialize for PivotRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.attributes.serialize(serializer)
    }
}

/// Split a joined row into `(target, pivot)` columns. Columns starting with
/// `prefix` go to the pivot side with the prefix removed; everything else
/// stays with the target.
pub fn split_pivot_row(row: Row, prefix: &str) -> (Row, Row) {
    let mut target = Row::new();
    let mut pivot = Row::new();
    for (column, value) in row {
        match column.strip_prefix(prefix) {
            Some(stripped) if !prefix.is_empty() => {
                pivot.insert(stripped.to_string(), value);
            }
            _ => {
                target.insert(column, value);
            }
        }
    }
    (target, pivot)
}
