//! Query Builder - Core builder implementation

use indexmap::IndexMap;
use serde_json::Value;

use super::types::*;

/// Structured query handed to a [`QueryExecutor`](crate::backends::QueryExecutor).
///
/// Relations build these instead of raw SQL so that every backend can
/// interpret them: PostgreSQL renders them through
/// [`to_sql_with_params`](Query::to_sql_with_params), the in-memory backend
/// evaluates them directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub(crate) query_type: QueryType,
    pub(crate) table: String,
    pub(crate) alias: Option<String>,
    pub(crate) fields: Vec<Field>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) group_by: Vec<ColumnRef>,
    pub(crate) having: Vec<HavingCondition>,
    pub(crate) order_by: Vec<(ColumnRef, OrderDirection)>,
    pub(crate) limit_count: Option<i64>,
    pub(crate) offset_value: Option<i64>,
    pub(crate) values: IndexMap<String, Value>,
    pub(crate) conflict_columns: Vec<String>,
    pub(crate) distinct: bool,
}

impl Query {
    /// SELECT from `table`
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Default::default()
        }
    }

    /// SELECT from `table AS alias`
    pub fn table_as(table: &str, alias: &str) -> Self {
        Self {
            table: table.to_string(),
            alias: Some(alias.to_string()),
            ..Default::default()
        }
    }

    /// INSERT a single row
    pub fn insert_into(table: &str, values: IndexMap<String, Value>) -> Self {
        Self {
            query_type: QueryType::Insert,
            table: table.to_string(),
            values,
            ..Default::default()
        }
    }

    /// UPDATE rows matching the conditions added afterwards
    pub fn update(table: &str, values: IndexMap<String, Value>) -> Self {
        Self {
            query_type: QueryType::Update,
            table: table.to_string(),
            values,
            ..Default::default()
        }
    }

    /// DELETE rows matching the conditions added afterwards
    pub fn delete_from(table: &str) -> Self {
        Self {
            query_type: QueryType::Delete,
            table: table.to_string(),
            ..Default::default()
        }
    }

    /// Turn an INSERT into an upsert keyed on `columns`
    pub fn on_conflict(mut self, columns: &[&str]) -> Self {
        self.conflict_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Add a SELECT DISTINCT modifier
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Name the base table is referenced by
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn conflict_columns(&self) -> &[String] {
        &self.conflict_columns
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn group_by_columns(&self) -> &[ColumnRef] {
        &self.group_by
    }

    pub fn having_conditions(&self) -> &[HavingCondition] {
        &self.having
    }

    pub fn order_clauses(&self) -> &[(ColumnRef, OrderDirection)] {
        &self.order_by
    }

    pub fn limit_value(&self) -> Option<i64> {
        self.limit_count
    }

    pub fn offset(&self) -> Option<i64> {
        self.offset_value
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Same query without ordering and paging, for totals
    pub fn without_paging(mut self) -> Self {
        self.order_by.clear();
        self.limit_count = None;
        self.offset_value = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constructors() {
        let select = Query::table_as("users", "owner");
        assert_eq!(select.query_type(), QueryType::Select);
        assert_eq!(select.qualifier(), "owner");
        assert_eq!(select.table_name(), "users");

        let mut values = IndexMap::new();
        values.insert("user_id".to_string(), json!(1));
        let insert = Query::insert_into("role_user", values).on_conflict(&["user_id", "role_id"]);
        assert_eq!(insert.query_type(), QueryType::Insert);
        assert_eq!(insert.conflict_columns(), &["user_id".to_string(), "role_id".to_string()]);
    }
}
