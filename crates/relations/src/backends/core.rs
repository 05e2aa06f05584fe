//! Core Database Abstractions
//!
//! The relation engine never talks to a driver directly. Every statement is
//! a structured [`Query`] handed to a [`QueryExecutor`], which returns rows as
//! ordered column-to-JSON maps.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::RelationResult;
use crate::query::{Aggregate, Query};
use crate::value::as_f64;

/// One result row, columns in projection order
pub type Row = IndexMap<String, Value>;

/// Executes structured queries against a database
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute a SELECT and return every row
    async fn fetch_all(&self, query: &Query) -> RelationResult<Vec<Row>>;

    /// Execute a SELECT and return the first row, if any
    async fn fetch_one(&self, query: &Query) -> RelationResult<Option<Row>> {
        let limited = query.clone().limit(1);
        Ok(self.fetch_all(&limited).await?.into_iter().next())
    }

    /// Compute an aggregate over the rows a SELECT would return
    async fn aggregate(&self, query: &Query, aggregate: &Aggregate) -> RelationResult<Value>;

    /// Count the rows a SELECT would return
    async fn count(&self, query: &Query) -> RelationResult<u64> {
        let value = self.aggregate(query, &Aggregate::count()).await?;
        Ok(as_f64(&value).map(|n| n as u64).unwrap_or(0))
    }

    /// Execute an INSERT and return the value of `primary_key` for the new row
    async fn insert(&self, query: &Query, primary_key: &str) -> RelationResult<Option<Value>>;

    /// Execute an INSERT, UPDATE or DELETE and return the affected row count
    async fn execute(&self, query: &Query) -> RelationResult<u64>;
}
