//! MorphOne Relationship - HasOne narrowed by the owner's discriminator

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::keyed::KeyedRelation;
use super::metadata::RelationDescriptor;
use super::traits::{LoadOptions, QueryFilter, RelationStrategy};
use crate::backends::{QueryExecutor, Row};
use crate::error::RelationResult;
use crate::model::{ModelRegistry, Record, RelationValue};
use crate::query::{Aggregate, Operator, Query};

/// `target.{name}_id = owner.id AND target.{name}_type = <owner type>`
#[derive(Debug, Clone)]
pub struct MorphOne {
    core: KeyedRelation,
}

impl MorphOne {
    pub fn new(registry: &Arc<ModelRegistry>, descriptor: &RelationDescriptor) -> RelationResult<Self> {
        Ok(Self {
            core: KeyedRelation::new(registry, descriptor)?,
        })
    }

    /// Discriminator value this relation matches on
    pub fn type_value(&self) -> Option<&Value> {
        self.core.discriminator.as_ref().map(|(_, value)| value)
    }

    /// Related record with key and discriminator filled in, unsaved
    pub fn make(&self, owner: &Record, data: Row) -> RelationResult<Record> {
        self.core.make(owner, data)
    }

    pub async fn save(&self, conn: &dyn QueryExecutor, owner: &Record, data: Row) -> RelationResult<Record> {
        self.core.save(conn, owner, data).await
    }
}

#[async_trait]
impl RelationStrategy for MorphOne {
    fn descriptor(&self) -> &RelationDescriptor {
        &self.core.descriptor
    }

    async fn get_results(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        options: &LoadOptions,
    ) -> RelationResult<RelationValue> {
        self.core.get_one(conn, owner, options).await
    }

    async fn eager_load(
        &self,
        conn: &dyn QueryExecutor,
        owners: &mut [Record],
        options: &LoadOptions,
    ) -> RelationResult<()> {
        self.core.eager_load_one(conn, owners, options).await
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
}
