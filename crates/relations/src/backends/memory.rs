//! In-memory backend
//!
//! Evaluates structured queries against tables held in process memory and
//! logs every statement it receives, so callers can assert how many round
//! trips an operation made. Raw conditions are rejected because there is no
//! SQL parser behind this backend.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::core::{QueryExecutor, Row};
use crate::error::{RelationError, RelationResult};
use crate::query::{
    Aggregate, ColumnRef, Condition, Field, JoinType, Operator, OrderDirection, Query, QueryType,
};
use crate::value::{as_f64, compare_values, key_of, keys_equal};

/// One table's row inside a joined tuple
#[derive(Debug, Clone)]
struct Source {
    qualifier: String,
    table: String,
    row: Option<Row>,
}

type Tuple = Vec<Source>;

#[derive(Debug, Default)]
struct MemoryState {
    tables: indexmap::IndexMap<String, Vec<Row>>,
    log: Vec<String>,
}

/// [`QueryExecutor`] over in-process tables
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: Mutex<MemoryState>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows to a table, creating it if needed. Not logged.
    pub async fn seed(&self, table: &str, rows: Vec<Row>) {
        let mut state = self.state.lock().await;
        state.tables.entry(table.to_string()).or_default().extend(rows);
    }

    /// Current contents of a table
    pub async fn table_rows(&self, table: &str) -> Vec<Row> {
        let state = self.state.lock().await;
        state.tables.get(table).cloned().unwrap_or_default()
    }

    /// Number of statements executed since creation or the last `clear_log`
    pub async fn statement_count(&self) -> usize {
        self.state.lock().await.log.len()
    }

    /// Executed statements rendered as inline SQL
    pub async fn statements(&self) -> Vec<String> {
        self.state.lock().await.log.clone()
    }

    pub async fn clear_log(&self) {
        self.state.lock().await.log.clear();
    }
}

impl MemoryState {
    fn record(&mut self, sql: String) {
        debug!(sql = %sql, "memory statement");
        self.log.push(sql);
    }

    fn sources(&self, table: &str, qualifier: &str) -> Vec<Source> {
        self.tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|row| Source {
                        qualifier: qualifier.to_string(),
                        table: table.to_string(),
                        row: Some(row.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// FROM, JOIN and WHERE
    fn filtered_tuples(&self, query: &Query) -> RelationResult<Vec<Tuple>> {
        let mut tuples: Vec<Tuple> = self
            .sources(query.table_name(), query.qualifier())
            .into_iter()
            .map(|source| vec![source])
            .collect();

        for join in query.joins() {
            let candidates = self.sources(&join.table, join.qualifier());
            let mut joined = Vec::new();
            for tuple in tuples {
                let mut matched = false;
                for candidate in &candidates {
                    let mut extended = tuple.clone();
                    extended.push(candidate.clone());
                    if all_match(&extended, &join.on)? {
                        matched = true;
                        joined.push(extended);
                    }
                }
                if !matched && join.join_type == JoinType::Left {
                    let mut extended = tuple;
                    extended.push(Source {
                        qualifier: join.qualifier().to_string(),
                        table: join.table.clone(),
                        row: None,
                    });
                    joined.push(extended);
                }
            }
            tuples = joined;
        }

        let mut filtered = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            if all_match(&tuple, query.conditions())? {
                filtered.push(tuple);
            }
        }
        Ok(filtered)
    }

    /// GROUP BY and HAVING; one representative tuple per surviving group
    fn grouped(&self, query: &Query, tuples: Vec<Tuple>) -> RelationResult<Vec<Tuple>> {
        if query.group_by_columns().is_empty() {
            return Ok(tuples);
        }

        let mut groups: indexmap::IndexMap<Vec<String>, Vec<Tuple>> = indexmap::IndexMap::new();
        for tuple in tuples {
            let key = query
                .group_by_columns()
                .iter()
                .map(|column| key_of(&resolve(&tuple, column)).unwrap_or_default())
                .collect();
            groups.entry(key).or_default().push(tuple);
        }

        let mut representatives = Vec::new();
        for (_, group) in groups {
            let mut keep = true;
            for having in query.having_conditions() {
                let actual = aggregate_tuples(&group, &having.aggregate);
                if !compare(having.operator, &actual, &having.value) {
                    keep = false;
                    break;
                }
            }
            if keep {
                if let Some(first) = group.into_iter().next() {
                    representatives.push(first);
                }
            }
        }
        Ok(representatives)
    }

    fn select(&self, query: &Query) -> RelationResult<Vec<Row>> {
        let tuples = self.filtered_tuples(query)?;
        let mut tuples = self.grouped(query, tuples)?;

        if !query.order_clauses().is_empty() {
            tuples.sort_by(|a, b| {
                for (column, direction) in query.order_clauses() {
                    let ordering = compare_values(&resolve(a, column), &resolve(b, column));
                    let ordering = match direction {
                        OrderDirection::Asc => ordering,
                        OrderDirection::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = query.offset().unwrap_or(0).max(0) as usize;
        let limit = query.limit_value().map(|l| l.max(0) as usize).unwrap_or(usize::MAX);

        let mut rows: Vec<Row> = tuples
            .iter()
            .skip(offset)
            .take(limit)
            .map(|tuple| project(tuple, query.fields()))
            .collect();

        if query.is_distinct() {
            let mut seen = std::collections::HashSet::new();
            rows.retain(|row| seen.insert(Value::from(serde_json::Map::from_iter(row.clone())).to_string()));
        }
        Ok(rows)
    }

    fn aggregate(&self, query: &Query, aggregate: &Aggregate) -> RelationResult<Value> {
        if query.group_by_columns().is_empty() {
            let tuples = self.filtered_tuples(query)?;
            return Ok(aggregate_tuples(&tuples, aggregate));
        }

        let rows = self.select(&query.clone().without_paging())?;
        let tuples: Vec<Tuple> = rows
            .into_iter()
            .map(|row| {
                vec![Source {
                    qualifier: "aggregate_source".to_string(),
                    table: "aggregate_source".to_string(),
                    row: Some(row),
                }]
            })
            .collect();
        Ok(aggregate_tuples(&tuples, &unqualified(aggregate)))
    }

    fn insert(&mut self, query: &Query, primary_key: Option<&str>) -> (u64, Option<Value>) {
        let mut row = query.values().clone();
        let table = self.tables.entry(query.table_name().to_string()).or_default();

        if !query.conflict_columns().is_empty() {
            let existing = table.iter_mut().find(|existing| {
                query.conflict_columns().iter().all(|column| {
                    matches!(
                        (existing.get(column), row.get(column)),
                        (Some(a), Some(b)) if keys_equal(a, b)
                    )
                })
            });
            if let Some(existing) = existing {
                for (column, value) in row {
                    if !query.conflict_columns().contains(&column) {
                        existing.insert(column, value);
                    }
                }
                let key = primary_key.and_then(|pk| existing.get(pk).cloned());
                return (1, key);
            }
        }

        if let Some(pk) = primary_key {
            if row.get(pk).map_or(true, Value::is_null) {
                let next = table
                    .iter()
                    .filter_map(|existing| existing.get(pk).and_then(as_f64))
                    .fold(0i64, |max, id| max.max(id as i64))
                    + 1;
                row.shift_insert(0, pk.to_string(), Value::from(next));
            }
        }

        let key = primary_key.and_then(|pk| row.get(pk).cloned());
        table.push(row);
        (1, key)
    }

    fn update(&mut self, query: &Query) -> RelationResult<u64> {
        let qualifier = query.qualifier().to_string();
        let table_name = query.table_name().to_string();
        let Some(table) = self.tables.get_mut(&table_name) else {
            return Ok(0);
        };

        let mut affected = 0;
        for row in table.iter_mut() {
            let tuple = single(&qualifier, &table_name, row.clone());
            if all_match(&tuple, query.conditions())? {
                for (column, value) in query.values() {
                    row.insert(column.clone(), value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    fn delete(&mut self, query: &Query) -> RelationResult<u64> {
        let qualifier = query.qualifier().to_string();
        let table_name = query.table_name().to_string();
        let Some(table) = self.tables.get_mut(&table_name) else {
            return Ok(0);
        };

        let mut kept = Vec::with_capacity(table.len());
        let mut affected = 0;
        for row in table.drain(..) {
            let tuple = single(&qualifier, &table_name, row.clone());
            if all_match(&tuple, query.conditions())? {
                affected += 1;
            } else {
                kept.push(row);
            }
        }
        *table = kept;
        Ok(affected)
    }
}

#[async_trait]
impl QueryExecutor for MemoryDatabase {
    async fn fetch_all(&self, query: &Query) -> RelationResult<Vec<Row>> {
        if query.query_type() != QueryType::Select {
            return Err(RelationError::Query("fetch_all requires a SELECT statement".to_string()));
        }
        let mut state = self.state.lock().await;
        state.record(query.to_sql());
        state.select(query)
    }

    async fn aggregate(&self, query: &Query, aggregate: &Aggregate) -> RelationResult<Value> {
        let mut state = self.state.lock().await;
        state.record(query.aggregate_sql(aggregate));
        state.aggregate(query, aggregate)
    }

    async fn insert(&self, query: &Query, primary_key: &str) -> RelationResult<Option<Value>> {
        if query.query_type() != QueryType::Insert {
            return Err(RelationError::Query("insert requires an INSERT statement".to_string()));
        }
        let mut state = self.state.lock().await;
        state.record(query.to_sql());
        Ok(state.insert(query, Some(primary_key)).1)
    }

    async fn execute(&self, query: &Query) -> RelationResult<u64> {
        let mut state = self.state.lock().await;
        state.record(query.to_sql());
        match query.query_type() {
            QueryType::Insert => Ok(state.insert(query, None).0),
            QueryType::Update => state.update(query),
            QueryType::Delete => state.delete(query),
            QueryType::Select => Err(RelationError::Query(
                "execute requires an INSERT, UPDATE or DELETE statement".to_string(),
            )),
        }
    }
}

fn single(qualifier: &str, table: &str, row: Row) -> Tuple {
    vec![Source {
        qualifier: qualifier.to_string(),
        table: table.to_string(),
        row: Some(row),
    }]
}

/// Look a column up in a joined tuple. Qualified references match an alias
/// or table name; bare ones take the first source that has the column.
fn resolve(tuple: &[Source], column: &ColumnRef) -> Value {
    match &column.table {
        Some(table) => tuple
            .iter()
            .find(|source| &source.qualifier == table)
            .or_else(|| tuple.iter().find(|source| &source.table == table))
            .and_then(|source| source.row.as_ref())
            .and_then(|row| row.get(&column.column))
            .cloned()
            .unwrap_or(Value::Null),
        None => tuple
            .iter()
            .filter_map(|source| source.row.as_ref())
            .find_map(|row| row.get(&column.column))
            .cloned()
            .unwrap_or(Value::Null),
    }
}

fn all_match(tuple: &[Source], conditions: &[Condition]) -> RelationResult<bool> {
    for condition in conditions {
        if !matches_condition(tuple, condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_condition(tuple: &[Source], condition: &Condition) -> RelationResult<bool> {
    Ok(match condition {
        Condition::Compare {
            column,
            operator,
            value,
        } => {
            let actual = resolve(tuple, column);
            if value.is_null() {
                match operator {
                    Operator::NotEqual => !actual.is_null(),
                    _ => actual.is_null(),
                }
            } else {
                compare(*operator, &actual, value)
            }
        }
        Condition::In {
            column,
            values,
            negated,
        } => {
            let actual = resolve(tuple, column);
            if actual.is_null() {
                false
            } else {
                values.iter().any(|value| keys_equal(&actual, value)) != *negated
            }
        }
        Condition::Null { column, negated } => resolve(tuple, column).is_null() != *negated,
        Condition::Columns {
            left,
            operator,
            right,
        } => compare(*operator, &resolve(tuple, left), &resolve(tuple, right)),
        Condition::Raw(raw) => {
            return Err(RelationError::Query(format!(
                "raw condition '{}' is not supported by the in-memory backend",
                raw
            )))
        }
    })
}

/// SQL comparison semantics: anything compared with NULL is false
fn compare(operator: Operator, left: &Value, right: &Value) -> bool {
    if left.is_null() || right.is_null() {
        return false;
    }
    match operator {
        Operator::Equal => keys_equal(left, right) || left == right,
        Operator::NotEqual => !(keys_equal(left, right) || left == right),
        Operator::GreaterThan => ordering(left, right) == Ordering::Greater,
        Operator::GreaterThanOrEqual => ordering(left, right) != Ordering::Less,
        Operator::LessThan => ordering(left, right) == Ordering::Less,
        Operator::LessThanOrEqual => ordering(left, right) != Ordering::Greater,
        Operator::Like => like(left, right),
        Operator::NotLike => !like(left, right),
    }
}

fn ordering(left: &Value, right: &Value) -> Ordering {
    match (as_f64(left), as_f64(right)) {
        (Some(a), Some(b)) if !(left.is_string() && right.is_string()) => {
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        _ => compare_values(left, right),
    }
}

fn like(value: &Value, pattern: &Value) -> bool {
    match (value.as_str(), pattern.as_str()) {
        (Some(text), Some(pattern)) => like_match(
            &text.chars().collect::<Vec<_>>(),
            &pattern.chars().collect::<Vec<_>>(),
        ),
        _ => false,
    }
}

fn like_match(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((&'%', rest)) => (0..=text.len()).any(|skip| like_match(&text[skip..], rest)),
        Some((&'_', rest)) => !text.is_empty() && like_match(&text[1..], rest),
        Some((c, rest)) => text.first() == Some(c) && like_match(&text[1..], rest),
    }
}

fn project(tuple: &[Source], fields: &[Field]) -> Row {
    let mut row = Row::new();
    if fields.is_empty() {
        for source in tuple {
            if let Some(source_row) = &source.row {
                for (column, value) in source_row {
                    row.entry(column.clone()).or_insert_with(|| value.clone());
                }
            }
        }
        return row;
    }

    for field in fields {
        if field.column.is_wildcard() {
            for source in tuple {
                let selected = match &field.column.table {
                    Some(table) => &source.qualifier == table || &source.table == table,
                    None => true,
                };
                if let (true, Some(source_row)) = (selected, &source.row) {
                    for (column, value) in source_row {
                        row.insert(column.clone(), value.clone());
                    }
                }
            }
        } else {
            let name = field.alias.clone().unwrap_or_else(|| field.column.column.clone());
            row.insert(name, resolve(tuple, &field.column));
        }
    }
    row
}

fn aggregate_tuples(tuples: &[Tuple], aggregate: &Aggregate) -> Value {
    let column = aggregate.column().map(ColumnRef::parse);
    let values: Vec<Value> = match &column {
        Some(column) => tuples
            .iter()
            .map(|tuple| resolve(tuple, column))
            .filter(|value| !value.is_null())
            .collect(),
        None => Vec::new(),
    };

    match aggregate {
        Aggregate::Count(None) => Value::from(tuples.len() as i64),
        Aggregate::Count(Some(_)) => Value::from(values.len() as i64),
        Aggregate::Sum(_) | Aggregate::Avg(_) => {
            let numbers: Vec<f64> = values.iter().filter_map(as_f64).collect();
            if numbers.is_empty() {
                return Value::Null;
            }
            let sum: f64 = numbers.iter().sum();
            if matches!(aggregate, Aggregate::Sum(_)) {
                Value::from(sum)
            } else {
                Value::from(sum / numbers.len() as f64)
            }
        }
        Aggregate::Min(_) => values
            .into_iter()
            .min_by(compare_values)
            .unwrap_or(Value::Null),
        Aggregate::Max(_) => values
            .into_iter()
            .max_by(compare_values)
            .unwrap_or(Value::Null),
    }
}

/// Aggregate over projected rows, where table qualifiers no longer apply
fn unqualified(aggregate: &Aggregate) -> Aggregate {
    let strip = |column: &str| ColumnRef::parse(column).column;
    match aggregate {
        Aggregate::Count(column) => Aggregate::Count(column.as_deref().map(strip)),
        Aggregate::Sum(column) => Aggregate::Sum(strip(column)),
        Aggregate::Avg(column) => Aggregate::Avg(strip(column)),
        Aggregate::Min(column) => Aggregate::Min(strip(column)),
        Aggregate::Max(column) => Aggregate::Max(strip(column)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::row_from_json;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn seeded() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.seed(
            "users",
            vec![
                row_from_json(json!({"id": 1, "name": "ada"})),
                row_from_json(json!({"id": 2, "name": "bob"})),
                row_from_json(json!({"id": 3, "name": "cy"})),
            ],
        )
        .await;
        db.seed(
            "posts",
            vec![
                row_from_json(json!({"id": 10, "user_id": 1, "votes": 3})),
                row_from_json(json!({"id": 11, "user_id": 1, "votes": 4})),
                row_from_json(json!({"id": 12, "user_id": 2, "votes": 1})),
            ],
        )
        .await;
        db
    }

    #[tokio::test]
    async fn test_select_where_in_and_order() {
        let db = seeded().await;
        let rows = db
            .fetch_all(&Query::table("posts").where_in("user_id", vec![json!("1")]).order_by_desc("votes"))
            .await
            .unwrap();
        let ids: Vec<Value> = rows.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(11), json!(10)]);
        assert_eq!(db.statement_count().await, 1);
    }

    #[tokio::test]
    async fn test_left_join_group_having() {
        let db = seeded().await;
        let query = Query::table("users")
            .select(&["users.*"])
            .left_join_as("posts", "posts_rel", "posts_rel.user_id", "users.id")
            .group_by("users.id")
            .having(Aggregate::Count(Some("posts_rel.id".to_string())), Operator::LessThan, 1);
        let rows = db.fetch_all(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("cy"));
        assert!(rows[0].get("votes").is_none());

        assert_eq!(db.count(&query).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_projection_aliases() {
        let db = seeded().await;
        let query = Query::table("posts")
            .select(&["posts.id"])
            .select_as("users.name", "pivot__name")
            .join("users", "users.id", "posts.user_id")
            .where_eq("posts.id", 12);
        let rows = db.fetch_all(&query).await.unwrap();
        assert_eq!(rows, vec![row_from_json(json!({"id": 12, "pivot__name": "bob"}))]);
    }

    #[tokio::test]
    async fn test_aggregates() {
        let db = seeded().await;
        let posts = Query::table("posts").where_eq("user_id", 1);
        assert_eq!(db.aggregate(&posts, &Aggregate::Sum("votes".into())).await.unwrap(), json!(7.0));
        assert_eq!(db.aggregate(&posts, &Aggregate::Max("votes".into())).await.unwrap(), json!(4));
        let none = Query::table("posts").where_eq("user_id", 9);
        assert_eq!(db.aggregate(&none, &Aggregate::Avg("votes".into())).await.unwrap(), Value::Null);
        assert_eq!(db.count(&none).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_generates_keys_and_upserts() {
        let db = seeded().await;
        let id = db
            .insert(&Query::insert_into("users", row_from_json(json!({"name": "dee"}))), "id")
            .await
            .unwrap();
        assert_eq!(id, Some(json!(4)));

        let pivot = Query::insert_into("role_user", row_from_json(json!({"user_id": 1, "role_id": 2, "level": "a"})))
            .on_conflict(&["user_id", "role_id"]);
        db.execute(&pivot).await.unwrap();
        let pivot = Query::insert_into("role_user", row_from_json(json!({"user_id": 1, "role_id": 2, "level": "b"})))
            .on_conflict(&["user_id", "role_id"]);
        db.execute(&pivot).await.unwrap();
        let rows = db.table_rows("role_user").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["level"], json!("b"));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = seeded().await;
        let updated = db
            .execute(&Query::update("posts", row_from_json(json!({"votes": 0}))).where_eq("user_id", 1))
            .await
            .unwrap();
        assert_eq!(updated, 2);
        let deleted = db
            .execute(&Query::delete_from("posts").where_in("id", vec![10, 12]))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(db.table_rows("posts").await.len(), 1);
    }

    #[tokio::test]
    async fn test_raw_conditions_rejected() {
        let db = seeded().await;
        let err = db.fetch_all(&Query::table("users").where_raw("id > 1")).await.unwrap_err();
        assert!(matches!(err, RelationError::Query(_)));
    }

    #[test]
    fn test_like_matching() {
        assert!(like(&json!("hello world"), &json!("hello%")));
        assert!(like(&json!("cat"), &json!("c_t")));
        assert!(!like(&json!("cart"), &json!("c_t")));
    }
}
