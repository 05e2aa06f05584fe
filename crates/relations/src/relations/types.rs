//! Relation - one resolved association of any kind
//!
//! Reads go through [`RelationStrategy`]. Mutations exist only on some
//! kinds; calling one on any other kind fails with
//! [`RelationError::Unsupported`] before any query is issued.

use std::sync::Arc;

use serde_json::Value;

use super::belongs_to::BelongsTo;
use super::belongs_to_many::{AttachInput, Attached, BelongsToMany, SyncChanges, SyncEntry};
use super::has_many::HasMany;
use super::has_many_through::HasManyThrough;
use super::has_one::HasOne;
use super::metadata::{RelationDescriptor, RelationKind};
use super::morph_many::MorphMany;
use super::morph_one::MorphOne;
use super::morph_to::MorphTo;
use super::traits::{LoadOptions, QueryFilter, RelationStrategy};
use crate::backends::{QueryExecutor, Row};
use crate::error::{RelationError, RelationResult};
use crate::model::{ModelRegistry, Record, RelationValue};
use crate::query::{Aggregate, Operator, Page, Query};

#[derive(Debug, Clone)]
pub enum Relation {
    HasOne(HasOne),
    BelongsTo(BelongsTo),
    HasMany(HasMany),
    HasManyThrough(HasManyThrough),
    BelongsToMany(BelongsToMany),
    MorphOne(MorphOne),
    MorphMany(MorphMany),
    MorphTo(MorphTo),
}

impl Relation {
    /// Build the strategy for `descriptor` against `registry`
    pub fn from_descriptor(registry: &Arc<ModelRegistry>, descriptor: &RelationDescriptor) -> RelationResult<Self> {
        Ok(match descriptor.kind {
            RelationKind::HasOne => Relation::HasOne(HasOne::new(registry, descriptor)?),
            RelationKind::BelongsTo => Relation::BelongsTo(BelongsTo::new(registry, descriptor)?),
            RelationKind::HasMany => Relation::HasMany(HasMany::new(registry, descriptor)?),
            RelationKind::HasManyThrough => Relation::HasManyThrough(HasManyThrough::new(registry, descriptor)?),
            RelationKind::BelongsToMany => Relation::BelongsToMany(BelongsToMany::new(registry, descriptor)?),
            RelationKind::MorphOne => Relation::MorphOne(MorphOne::new(registry, descriptor)?),
            RelationKind::MorphMany => Relation::MorphMany(MorphMany::new(registry, descriptor)?),
            RelationKind::MorphTo => Relation::MorphTo(MorphTo::new(registry, descriptor)?),
        })
    }

    pub fn strategy(&self) -> &dyn RelationStrategy {
        match self {
            Relation::HasOne(r) => r,
            Relation::BelongsTo(r) => r,
            Relation::HasMany(r) => r,
            Relation::HasManyThrough(r) => r,
            Relation::BelongsToMany(r) => r,
            Relation::MorphOne(r) => r,
            Relation::MorphMany(r) => r,
            Relation::MorphTo(r) => r,
        }
    }

    pub fn descriptor(&self) -> &RelationDescriptor {
        self.strategy().descriptor()
    }

    pub fn kind(&self) -> RelationKind {
        self.descriptor().kind
    }

    fn unsupported(&self, operation: &'static str) -> RelationError {
        RelationError::unsupported(self.kind(), operation)
    }

    pub async fn get_results(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        options: &LoadOptions,
    ) -> RelationResult<RelationValue> {
        self.strategy().get_results(conn, owner, options).await
    }

    pub async fn eager_load(
        &self,
        conn: &dyn QueryExecutor,
        owners: &mut [Record],
        options: &LoadOptions,
    ) -> RelationResult<()> {
        self.strategy().eager_load(conn, owners, options).await
    }

    pub async fn relation_count(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        filter: Option<&QueryFilter>,
    ) -> RelationResult<u64> {
        self.strategy().relation_count(conn, owner, filter).await
    }

    pub async fn relation_aggregate(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        aggregate: &Aggregate,
        filter: Option<&QueryFilter>,
    ) -> RelationResult<Value> {
        self.strategy()
            .relation_aggregate(conn, owner, aggregate, filter)
            .await
    }

    pub fn relation_count_query(&self, filter: Option<&QueryFilter>) -> RelationResult<String> {
        self.strategy().relation_count_query(filter)
    }

    pub fn has(&self, operator: Operator, count: i64) -> RelationResult<Query> {
        self.strategy().has(operator, count)
    }

    pub fn has_where(&self, filter: &QueryFilter) -> RelationResult<Query> {
        self.strategy().has_where(filter)
    }

    /// Unsaved related record with the relation's keys filled in
    pub fn make(&self, owner: &Record, data: Row) -> RelationResult<Record> {
        match self {
            Relation::HasOne(r) => r.make(owner, data),
            Relation::HasMany(r) => r.make(owner, data),
            Relation::MorphOne(r) => r.make(owner, data),
            Relation::MorphMany(r) => r.make(owner, data),
            _ => Err(self.unsupported("make")),
        }
    }

    /// Insert a related record. For `BelongsTo` the owner is re-pointed and
    /// saved; for `BelongsToMany` the new target is attached without extra
    /// pivot columns.
    pub async fn save(&self, conn: &dyn QueryExecutor, owner: &mut Record, data: Row) -> RelationResult<Record> {
        match self {
            Relation::HasOne(r) => r.save(conn, owner, data).await,
            Relation::BelongsTo(r) => r.save(conn, owner, data).await,
            Relation::HasMany(r) => r.save(conn, owner, data).await,
            Relation::BelongsToMany(r) => r.save(conn, owner, data, Row::new()).await,
            Relation::MorphOne(r) => r.save(conn, owner, data).await,
            Relation::MorphMany(r) => r.save(conn, owner, data).await,
            _ => Err(self.unsupported("save")),
        }
    }

    pub async fn save_all(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        dataset: Vec<Row>,
    ) -> RelationResult<Option<Record>> {
        match self {
            Relation::HasMany(r) => r.save_all(conn, owner, dataset).await,
            Relation::MorphMany(r) => r.save_all(conn, owner, dataset).await,
            _ => Err(self.unsupported("save_all")),
        }
    }

    pub async fn paginate(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        page: i64,
        per_page: i64,
        filter: Option<&QueryFilter>,
    ) -> RelationResult<Page<Record>> {
        match self {
            Relation::HasMany(r) => r.paginate(conn, owner, page, per_page, filter).await,
            Relation::MorphMany(r) => r.paginate(conn, owner, page, per_page, filter).await,
            _ => Err(self.unsupported("paginate")),
        }
    }

    pub async fn attach(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        input: impl Into<AttachInput>,
        extras: Row,
    ) -> RelationResult<Attached> {
        match self {
            Relation::BelongsToMany(r) => r.attach(conn, owner, input, extras).await,
            _ => Err(self.unsupported("attach")),
        }
    }

    pub async fn detach(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        ids: Option<Vec<Value>>,
        cascade: bool,
    ) -> RelationResult<u64> {
        match self {
            Relation::BelongsToMany(r) => r.detach(conn, owner, ids, cascade).await,
            _ => Err(self.unsupported("detach")),
        }
    }

    pub async fn sync(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        entries: Vec<SyncEntry>,
        detach_missing: bool,
    ) -> RelationResult<SyncChanges> {
        match self {
            Relation::BelongsToMany(r) => r.sync(conn, owner, entries, detach_missing).await,
            _ => Err(self.unsupported("sync")),
        }
    }

    pub async fn associate(
        &self,
        conn: &dyn QueryExecutor,
        owner: &mut Record,
        target: &Record,
    ) -> RelationResult<()> {
        match self {
            Relation::BelongsTo(r) => r.associate(conn, owner, target).await,
            Relation::MorphTo(r) => r.associate(conn, owner, target).await,
            _ => Err(self.unsupported("associate")),
        }
    }

    pub async fn dissociate(&self, conn: &dyn QueryExecutor, owner: &mut Record) -> RelationResult<()> {
        match self {
            Relation::BelongsTo(r) => r.dissociate(conn, owner).await,
            Relation::MorphTo(r) => r.dissociate(conn, owner).await,
            _ => Err(self.unsupported("dissociate")),
        }
    }

    /// Add a pivot constraint; only meaningful for `BelongsToMany`
    pub fn where_pivot(self, column: &str, operator: Operator, value: impl Into<Value>) -> RelationResult<Self> {
        match self {
            Relation::BelongsToMany(r) => Ok(Relation::BelongsToMany(r.where_pivot(column, operator, value))),
            other => Err(other.unsupported("where_pivot")),
        }
    }
}
