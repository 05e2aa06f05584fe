//! Query Builder Types - Core types and enums for query building

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelationError;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Equal => write!(f, "="),
            Operator::NotEqual => write!(f, "<>"),
            Operator::GreaterThan => write!(f, ">"),
            Operator::GreaterThanOrEqual => write!(f, ">="),
            Operator::LessThan => write!(f, "<"),
            Operator::LessThanOrEqual => write!(f, "<="),
            Operator::Like => write!(f, "LIKE"),
            Operator::NotLike => write!(f, "NOT LIKE"),
        }
    }
}

impl FromStr for Operator {
    type Err = RelationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "=" | "==" => Ok(Operator::Equal),
            "!=" | "<>" => Ok(Operator::NotEqual),
            ">" => Ok(Operator::GreaterThan),
            ">=" => Ok(Operator::GreaterThanOrEqual),
            "<" => Ok(Operator::LessThan),
            "<=" => Ok(Operator::LessThanOrEqual),
            "LIKE" => Ok(Operator::Like),
            "NOT LIKE" => Ok(Operator::NotLike),
            other => Err(RelationError::Query(format!("unknown operator '{}'", other))),
        }
    }
}

/// A column, optionally qualified by a table name or alias
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

impl ColumnRef {
    /// Parse `column` or `table.column`
    pub fn parse(reference: &str) -> Self {
        match reference.rsplit_once('.') {
            Some((table, column)) => Self::qualified(table, column),
            None => Self {
                table: None,
                column: reference.to_string(),
            },
        }
    }

    pub fn qualified(table: &str, column: &str) -> Self {
        Self {
            table: Some(table.to_string()),
            column: column.to_string(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.column == "*"
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(reference: &str) -> Self {
        Self::parse(reference)
    }
}

impl From<String> for ColumnRef {
    fn from(reference: String) -> Self {
        Self::parse(&reference)
    }
}

impl From<&String> for ColumnRef {
    fn from(reference: &String) -> Self {
        Self::parse(reference)
    }
}

/// WHERE / ON / HAVING building block
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column <op> value`
    Compare {
        column: ColumnRef,
        operator: Operator,
        value: Value,
    },
    /// `column [NOT] IN (values)`
    In {
        column: ColumnRef,
        values: Vec<Value>,
        negated: bool,
    },
    /// `column IS [NOT] NULL`
    Null { column: ColumnRef, negated: bool },
    /// `left <op> right`, both columns
    Columns {
        left: ColumnRef,
        operator: Operator,
        right: ColumnRef,
    },
    /// Raw SQL expression, rendered verbatim
    Raw(String),
}

impl Condition {
    pub fn eq(column: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
        Condition::Compare {
            column: column.into(),
            operator: Operator::Equal,
            value: value.into(),
        }
    }

    pub fn columns_eq(left: impl Into<ColumnRef>, right: impl Into<ColumnRef>) -> Self {
        Condition::Columns {
            left: left.into(),
            operator: Operator::Equal,
            right: right.into(),
        }
    }
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// Join clause
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub alias: Option<String>,
    pub on: Vec<Condition>,
}

impl JoinClause {
    /// Name the joined table is referenced by
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

/// Projected column
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub column: ColumnRef,
    pub alias: Option<String>,
}

/// Aggregate functions
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    /// `COUNT(*)` when no column is given
    Count(Option<String>),
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
}

impl Aggregate {
    pub fn count() -> Self {
        Aggregate::Count(None)
    }

    pub fn column(&self) -> Option<&str> {
        match self {
            Aggregate::Count(column) => column.as_deref(),
            Aggregate::Sum(column)
            | Aggregate::Avg(column)
            | Aggregate::Min(column)
            | Aggregate::Max(column) => Some(column),
        }
    }

    /// Same aggregate applied to a column of another table
    pub fn qualify(&self, table: &str) -> Self {
        let qualify = |column: &str| {
            if column.contains('.') || column == "*" {
                column.to_string()
            } else {
                format!("{}.{}", table, column)
            }
        };
        match self {
            Aggregate::Count(column) => Aggregate::Count(column.as_deref().map(qualify)),
            Aggregate::Sum(column) => Aggregate::Sum(qualify(column)),
            Aggregate::Avg(column) => Aggregate::Avg(qualify(column)),
            Aggregate::Min(column) => Aggregate::Min(qualify(column)),
            Aggregate::Max(column) => Aggregate::Max(qualify(column)),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Count(None) => write!(f, "COUNT(*)"),
            Aggregate::Count(Some(column)) => write!(f, "COUNT({})", column),
            // Casts keep numeric results decodable without NUMERIC support
            Aggregate::Sum(column) => write!(f, "CAST(SUM({}) AS DOUBLE PRECISION)", column),
            Aggregate::Avg(column) => write!(f, "CAST(AVG({}) AS DOUBLE PRECISION)", column),
            Aggregate::Min(column) => write!(f, "MIN({})", column),
            Aggregate::Max(column) => write!(f, "MAX({})", column),
        }
    }
}

/// HAVING clause comparing an aggregate against a value
#[derive(Debug, Clone, PartialEq)]
pub struct HavingCondition {
    pub aggregate: Aggregate,
    pub operator: Operator,
    pub value: Value,
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Statement kinds supported by the builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryType {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
}
