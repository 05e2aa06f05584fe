//! BelongsTo Relationship - the owner row carries the target's key

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::keyed::KeyedRelation;
use super::metadata::RelationDescriptor;
use super::traits::{LoadOptions, QueryFilter, RelationStrategy};
use crate::backends::{QueryExecutor, Row};
use crate::error::{RelationError, RelationResult};
use crate::model::{ModelRegistry, Record, RelationValue};
use crate::query::{Aggregate, Operator, Query};
use crate::value::display_key;

/// `owner.foreign_key = target.local_key`
#[derive(Debug, Clone)]
pub struct BelongsTo {
    core: KeyedRelation,
}

impl BelongsTo {
    pub fn new(registry: &Arc<ModelRegistry>, descriptor: &RelationDescriptor) -> RelationResult<Self> {
        Ok(Self {
            core: KeyedRelation::new(registry, descriptor)?,
        })
    }

    /// Point the owner at `target`, persist the owner and cache the target
    pub async fn associate(
        &self,
        conn: &dyn QueryExecutor,
        owner: &mut Record,
        target: &Record,
    ) -> RelationResult<()> {
        let key = target
            .get(&self.core.target_key)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| {
                RelationError::MissingInput(format!(
                    "{} has no value for '{}'",
                    target.model_name(),
                    self.core.target_key
                ))
            })?;

        owner.set_attribute(self.core.owner_key.clone(), key.clone());
        owner.save(conn).await?;
        owner.set_relation(self.core.name(), RelationValue::One(Box::new(target.clone())));

        info!(
            relation = %self.core.name(),
            owner = %owner.model_name(),
            key = %display_key(&key),
            "owner associated"
        );
        Ok(())
    }

    /// Clear the owner's key, persist the owner and drop the cached target
    pub async fn dissociate(&self, conn: &dyn QueryExecutor, owner: &mut Record) -> RelationResult<()> {
        owner.set_attribute(self.core.owner_key.clone(), Value::Null);
        owner.save(conn).await?;
        owner.forget_relation(self.core.name());

        info!(relation = %self.core.name(), owner = %owner.model_name(), "owner dissociated");
        Ok(())
    }

    /// Insert a new target and associate the owner with it
    pub async fn save(&self, conn: &dyn QueryExecutor, owner: &mut Record, data: Row) -> RelationResult<Record> {
        let mut target = Record::with_attributes(self.core.target.clone(), data);
        target.save(conn).await?;
        self.associate(conn, owner, &target).await?;
        Ok(target)
    }
}

#[async_trait]
impl RelationStrategy for BelongsTo {
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

    fn has_where(&self, filter: &QueryFilter) -> RelationResult<Query> {
        Ok(self.core.has_where_query(filter))
    }
}
