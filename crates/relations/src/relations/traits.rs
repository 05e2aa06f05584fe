//! Relationship Traits - the contract every association kind implements

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use super::metadata::{RelationDescriptor, RelationKind};
use crate::backends::QueryExecutor;
use crate::error::{RelationError, RelationResult};
use crate::model::{Record, RelationValue};
use crate::query::{Aggregate, Operator, Query};
use crate::value::as_f64;

/// Caller-supplied query customization, applied after the relation's own
/// key constraints
pub type QueryFilter = Arc<dyn Fn(Query) -> Query + Send + Sync>;

/// Wrap a closure as a [`QueryFilter`]
pub fn query_filter<F>(filter: F) -> QueryFilter
where
    F: Fn(Query) -> Query + Send + Sync + 'static,
{
    Arc::new(filter)
}

/// Nested relations and an optional filter for one resolution call
#[derive(Clone, Default)]
pub struct LoadOptions {
    /// Relations to eager load on the resolved records; dotted paths nest
    pub with: Vec<String>,
    pub filter: Option<QueryFilter>,
    /// Filters for paths listed in `with`
    pub nested_filters: IndexMap<String, QueryFilter>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with.extend(relations.into_iter().map(Into::into));
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Eager load `path` on the resolved records, narrowed by `filter`
    pub fn with_filter<F>(mut self, path: &str, filter: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        if !self.with.iter().any(|p| p == path) {
            self.with.push(path.to_string());
        }
        self.nested_filters.insert(path.to_string(), Arc::new(filter));
        self
    }

    pub(crate) fn apply(&self, query: Query) -> Query {
        apply_filter(self.filter.as_ref(), query)
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("with", &self.with)
            .field("filter", &self.filter.is_some())
            .field("nested_filters", &self.nested_filters.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub(crate) fn apply_filter(filter: Option<&QueryFilter>, query: Query) -> Query {
    match filter {
        Some(filter) => filter(query),
        None => query,
    }
}

/// Common interface of every association kind.
///
/// Kinds that cannot express an operation return
/// [`RelationError::Unsupported`] before touching the database.
#[async_trait]
pub trait RelationStrategy: Send + Sync {
    fn descriptor(&self) -> &RelationDescriptor;

    fn kind(&self) -> RelationKind {
        self.descriptor().kind
    }

    /// Resolve the relation for a single owner
    async fn get_results(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        options: &LoadOptions,
    ) -> RelationResult<RelationValue>;

    /// Resolve the relation for a whole batch of owners and store the result
    /// in each owner's relation cache
    async fn eager_load(
        &self,
        conn: &dyn QueryExecutor,
        owners: &mut [Record],
        options: &LoadOptions,
    ) -> RelationResult<()>;

    /// Aggregate over the owner's related rows
    async fn relation_aggregate(
        &self,
        _conn: &dyn QueryExecutor,
        _owner: &Record,
        _aggregate: &Aggregate,
        _filter: Option<&QueryFilter>,
    ) -> RelationResult<Value> {
        Err(RelationError::unsupported(self.kind(), "relation_aggregate"))
    }

    /// Number of related rows for the owner
    async fn relation_count(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        filter: Option<&QueryFilter>,
    ) -> RelationResult<u64> {
        match self
            .relation_aggregate(conn, owner, &Aggregate::count(), filter)
            .await
        {
            Err(RelationError::Unsupported { kind, .. }) => {
                Err(RelationError::unsupported(kind, "relation_count"))
            }
            result => result.map(|value| as_f64(&value).map_or(0, |n| n as u64)),
        }
    }

    /// Correlated `COUNT(*)` subquery against the owner table, for embedding
    /// in a parent query
    fn relation_count_query(&self, _filter: Option<&QueryFilter>) -> RelationResult<String> {
        Err(RelationError::unsupported(self.kind(), "relation_count"))
    }

    /// Owner query keeping owners whose related row count satisfies
    /// `operator count`
    fn has(&self, _operator: Operator, _count: i64) -> RelationResult<Query> {
        Err(RelationError::unsupported(self.kind(), "has"))
    }

    /// Owner query keeping owners with at least one related row matching
    /// `filter`. The related table is referenced by the relation name.
    fn has_where(&self, _filter: &QueryFilter) -> RelationResult<Query> {
        Err(RelationError::unsupported(self.kind(), "has_where"))
    }
}
