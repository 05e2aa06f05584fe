//! MorphMany Relationship - HasMany narrowed by the owner's discriminator

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::keyed::KeyedRelation;
use super::metadata::RelationDescriptor;
use super::traits::{LoadOptions, QueryFilter, RelationStrategy};
use crate::backends::{QueryExecutor, Row};
use crate::error::RelationResult;
use crate::model::{ModelRegistry, Record, RelationValue};
use crate::query::{Aggregate, Page};

#[derive(Debug, Clone)]
pub struct MorphMany {
    core: KeyedRelation,
}

impl MorphMany {
    pub fn new(registry: &Arc<ModelRegistry>, descriptor: &RelationDescriptor) -> RelationResult<Self> {
        Ok(Self {
            core: KeyedRelation::new(registry, descriptor)?,
        })
    }

    pub fn type_value(&self) -> Option<&Value> {
        self.core.discriminator.as_ref().map(|(_, value)| value)
    }

    pub fn make(&self, owner: &Record, data: Row) -> RelationResult<Record> {
        self.core.make(owner, data)
    }

    pub async fn save(&self, conn: &dyn QueryExecutor, owner: &Record, data: Row) -> RelationResult<Record> {
        self.core.save(conn, owner, data).await
    }

    pub async fn save_all(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        dataset: Vec<Row>,
    ) -> RelationResult<Option<Record>> {
        self.core.save_all(conn, owner, dataset).await
    }

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

// has / has_where keep the unsupported defaults
#[async_trait]
impl RelationStrategy for MorphMany {
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
}
