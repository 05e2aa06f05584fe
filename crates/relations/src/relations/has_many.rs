//! HasMany Relationship - many target rows carry the owner's key

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::keyed::KeyedRelation;
use super::metadata::RelationDescriptor;
use super::traits::{LoadOptions, QueryFilter, RelationStrategy};
use crate::backends::{QueryExecutor, Row};
use crate::error::RelationResult;
use crate::model::{ModelRegistry, Record, RelationValue};
use crate::query::{Aggregate, Operator, Page, Query};

impl KeyedRelation {
    pub(crate) async fn get_many(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        options: &LoadOptions,
    ) -> RelationResult<RelationValue> {
        Ok(RelationValue::Many(self.fetch_for(conn, owner, options).await?))
    }

    /// Batch resolution storing an ordered collection per owner
    pub(crate) async fn eager_load_many(
        &self,
        conn: &dyn QueryExecutor,
        owners: &mut [Record],
        options: &LoadOptions,
    ) -> RelationResult<()> {
        let index = self.fetch_batch(conn, owners, options).await?;
        for owner in owners.iter_mut() {
            let related = self.matches_for(&index, owner);
            owner.set_relation(self.name(), RelationValue::Many(related));
        }
        Ok(())
    }
}

/// `owner.local_key = target.foreign_key`, any number of targets
#[derive(Debug, Clone)]
pub struct HasMany {
    core: KeyedRelation,
}

impl HasMany {
    pub fn new(registry: &Arc<ModelRegistry>, descriptor: &RelationDescriptor) -> RelationResult<Self> {
        Ok(Self {
            core: KeyedRelation::new(registry, descriptor)?,
        })
    }

    /// Build a related record with the foreign key filled in, unsaved
    pub fn make(&self, owner: &Record, data: Row) -> RelationResult<Record> {
        self.core.make(owner, data)
    }

    pub async fn save(&self, conn: &dyn QueryExecutor, owner: &Record, data: Row) -> RelationResult<Record> {
        self.core.save(conn, owner, data).await
    }

    /// Insert every entry; stops at the first failure and returns the last
    /// record saved
    pub async fn save_all(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        dataset: Vec<Row>,
    ) -> RelationResult<Option<Record>> {
        self.core.save_all(conn, owner, dataset).await
    }

    /// One page of the owner's related records
    pub async fn paginate(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        page: i64,
        per_page: i64,
        filter: Option<&QueryFilter>,
    ) -> RelationResult<Page<Record>> {
        self.core.paginate(conn, owner, page, per_page, filter).await
    }
}

#[async_trait]
impl RelationStrategy for HasMany {
    fn descriptor(&self) -> &RelationDescriptor {
        &self.core.descriptor
    }

    async fn get_results(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        options: &LoadOptions,
    ) -> RelationResult<RelationValue> {
        self.core.get_many(conn, owner, options).await
    }

    async fn eager_load(
        &self,
        conn: &dyn QueryExecutor,
        owners: &mut [Record],
        options: &LoadOptions,
    ) -> RelationResult<()> {
        self.core.eager_load_many(conn, owners, options).await
    }

    async fn relation_aggregate(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        aggregate: &Aggregate,
        filter: Option<&QueryFilter>,
    ) -> RelationResult<Value> {
        self.core.aggregate(conn, owner, aggregate, filter).await
    }

    fn relation_count_query(&self, filter: Option<&QueryFilter>) -> RelationResult<String> {
        Ok(self.core.count_query_sql(filter))
    }

    fn has(&self, operator: Operator, count: i64) -> RelationResult<Query> {
        Ok(self.core.has_query(operator, count))
    }

    fn has_where(&self, filter: &QueryFilter) -> RelationResult<Query> {
        Ok(self.core.has_where_query(filter))
    }
}
