//! Query Builder SELECT, ORDER BY and GROUP BY operations

use super::builder::Query;
use super::types::*;

impl Query {
    /// Add columns to the projection. `*` and `table.*` are allowed.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.fields.extend(columns.iter().map(|c| Field {
            column: ColumnRef::parse(c),
            alias: None,
        }));
        self
    }

    /// Project a column under another name
    pub fn select_as(mut self, column: &str, alias: &str) -> Self {
        self.fields.push(Field {
            column: ColumnRef::parse(column),
            alias: Some(alias.to_string()),
        });
        self
    }

    /// Add ORDER BY clause
    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push((ColumnRef::parse(column), OrderDirection::Asc));
        self
    }

    /// Add ORDER BY DESC clause
    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by.push((ColumnRef::parse(column), OrderDirection::Desc));
        self
    }

    /// Add GROUP BY clause
    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by.push(ColumnRef::parse(column));
        self
    }
}
