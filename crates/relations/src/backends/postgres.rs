//! PostgreSQL Backend Implementation
//!
//! Renders [`Query`] with `$n` placeholders and runs it on a sqlx `PgPool`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::Postgres;
use tracing::debug;

use super::core::{QueryExecutor, Row};
use crate::error::{RelationError, RelationResult};
use crate::query::{Aggregate, Query, QueryType};

/// [`QueryExecutor`] backed by a PostgreSQL connection pool
#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a small pool to `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> RelationResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn prepare<'q>(
        sql: &'q str,
        params: &[Value],
    ) -> RelationResult<sqlx::query::Query<'q, Postgres, PgArguments>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_json_value(query, param)?;
        }
        Ok(query)
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn fetch_all(&self, query: &Query) -> RelationResult<Vec<Row>> {
        let (sql, params) = query.to_sql_with_params();
        debug!(sql = %sql, params = params.len(), "fetch_all");
        let rows = Self::prepare(&sql, &params)?
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RelationError::Database(format!("Query fetch failed: {}", e)))?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn aggregate(&self, query: &Query, aggregate: &Aggregate) -> RelationResult<Value> {
        let (sql, params) = query.aggregate_sql_with_params(aggregate);
        debug!(sql = %sql, params = params.len(), "aggregate");
        let row = Self::prepare(&sql, &params)?
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RelationError::Database(format!("Aggregate failed: {}", e)))?;
        Ok(row
            .map(|row| row_to_json(&row))
            .and_then(|mut row| row.shift_remove("aggregate"))
            .unwrap_or(Value::Null))
    }

    async fn insert(&self, query: &Query, primary_key: &str) -> RelationResult<Option<Value>> {
        if query.query_type() != QueryType::Insert {
            return Err(RelationError::Query("insert requires an INSERT statement".to_string()));
        }
        let (sql, params) = query.to_sql_with_params();
        let sql = format!("{} RETURNING {}", sql, primary_key);
        debug!(sql = %sql, params = params.len(), "insert");
        let row = Self::prepare(&sql, &params)?
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RelationError::Database(format!("Insert failed: {}", e)))?;
        Ok(row.and_then(|row| row_to_json(&row).shift_remove(primary_key)))
    }

    async fn execute(&self, query: &Query) -> RelationResult<u64> {
        let (sql, params) = query.to_sql_with_params();
        debug!(sql = %sql, params = params.len(), "execute");
        let result = Self::prepare(&sql, &params)?
            .execute(&self.pool)
            .await
            .map_err(|e| RelationError::Database(format!("Query execution failed: {}", e)))?;
        Ok(result.rows_affected())
    }
}

/// Bind a JSON parameter with the closest native PostgreSQL type
fn bind_json_value<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> RelationResult<sqlx::query::Query<'q, Postgres, PgArguments>> {
    match value {
        Value::Null => Ok(query.bind(Option::<String>::None)),
        Value::Bool(b) => Ok(query.bind(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(query.bind(i))
            } else if let Some(f) = n.as_f64() {
                Ok(query.bind(f))
            } else {
                Err(RelationError::Query(format!("unsupported numeric parameter {}", n)))
            }
        }
        Value::String(s) => Ok(query.bind(s.clone())),
        Value::Array(_) | Value::Object(_) => Ok(query.bind(value.clone())),
    }
}

/// Convert a PostgreSQL row to an ordered JSON row
fn row_to_json(row: &PgRow) -> Row {
    use sqlx::{Column, Row as _};

    let mut map = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = if let Ok(value) = row.try_get::<Option<i64>, _>(i) {
            value.map_or(Value::Null, Value::from)
        } else if let Ok(value) = row.try_get::<Option<i32>, _>(i) {
            value.map_or(Value::Null, Value::from)
        } else if let Ok(value) = row.try_get::<Option<i16>, _>(i) {
            value.map_or(Value::Null, Value::from)
        } else if let Ok(value) = row.try_get::<Option<f64>, _>(i) {
            value.map_or(Value::Null, Value::from)
        } else if let Ok(value) = row.try_get::<Option<bool>, _>(i) {
            value.map_or(Value::Null, Value::Bool)
        } else if let Ok(value) = row.try_get::<Option<String>, _>(i) {
            value.map_or(Value::Null, Value::String)
        } else if let Ok(value) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i) {
            value.map_or(Value::Null, |v| Value::String(v.to_rfc3339()))
        } else if let Ok(value) = row.try_get::<Option<chrono::NaiveDateTime>, _>(i) {
            value.map_or(Value::Null, |v| Value::String(v.to_string()))
        } else if let Ok(value) = row.try_get::<Option<uuid::Uuid>, _>(i) {
            value.map_or(Value::Null, |v| Value::String(v.to_string()))
        } else if let Ok(value) = row.try_get::<Option<Value>, _>(i) {
            value.unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        map.insert(column.name().to_string(), value);
    }
    map
}
