//! Query Builder WHERE clause operations

use serde_json::Value;

use super::builder::Query;
use super::types::*;

impl Query {
    /// Add a pre-built condition
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add WHERE condition with equality
    pub fn where_eq<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_op(column, Operator::Equal, value)
    }

    /// Add WHERE condition with not equal
    pub fn where_ne<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_op(column, Operator::NotEqual, value)
    }

    /// Add WHERE condition with greater than
    pub fn where_gt<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_op(column, Operator::GreaterThan, value)
    }

    /// Add WHERE condition with greater than or equal
    pub fn where_gte<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_op(column, Operator::GreaterThanOrEqual, value)
    }

    /// Add WHERE condition with less than
    pub fn where_lt<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_op(column, Operator::LessThan, value)
    }

    /// Add WHERE condition with less than or equal
    pub fn where_lte<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_op(column, Operator::LessThanOrEqual, value)
    }

    /// Add WHERE condition with LIKE
    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.where_op(column, Operator::Like, pattern)
    }

    /// Add WHERE condition with an arbitrary operator
    pub fn where_op<T: Into<Value>>(mut self, column: &str, operator: Operator, value: T) -> Self {
        self.conditions.push(Condition::Compare {
            column: ColumnRef::parse(column),
            operator,
            value: value.into(),
        });
        self
    }

    /// Add WHERE condition with IN
    pub fn where_in<T: Into<Value>>(mut self, column: &str, values: Vec<T>) -> Self {
        self.conditions.push(Condition::In {
            column: ColumnRef::parse(column),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        });
        self
    }

    /// Add WHERE condition with NOT IN
    pub fn where_not_in<T: Into<Value>>(mut self, column: &str, values: Vec<T>) -> Self {
        self.conditions.push(Condition::In {
            column: ColumnRef::parse(column),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        });
        self
    }

    /// Add WHERE condition with IS NULL
    pub fn where_null(mut self, column: &str) -> Self {
        self.conditions.push(Condition::Null {
            column: ColumnRef::parse(column),
            negated: false,
        });
        self
    }

    /// Add WHERE condition with IS NOT NULL
    pub fn where_not_null(mut self, column: &str) -> Self {
        self.conditions.push(Condition::Null {
            column: ColumnRef::parse(column),
            negated: true,
        });
        self
    }

    /// Compare two columns
    pub fn where_column(mut self, left: &str, operator: Operator, right: &str) -> Self {
        self.conditions.push(Condition::Columns {
            left: ColumnRef::parse(left),
            operator,
            right: ColumnRef::parse(right),
        });
        self
    }

    /// Add raw WHERE condition. Only SQL backends understand these.
    pub fn where_raw(mut self, raw_condition: &str) -> Self {
        self.conditions.push(Condition::Raw(raw_condition.to_string()));
        self
    }

    /// Add a HAVING clause over an aggregate
    pub fn having<T: Into<Value>>(mut self, aggregate: Aggregate, operator: Operator, value: T) -> Self {
        self.having.push(HavingCondition {
            aggregate,
            operator,
            value: value.into(),
        });
        self
    }
}
