//! HasManyThrough Relationship - owner -> intermediate -> target
//!
//! Lazy resolution is one three-way join. Eager resolution is two queries:
//! the intermediate keys for the batch, then the targets for those keys.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::hydration::{fetch_records, load_nested, with_owner};
use super::key_index::EagerBatchKeyIndex;
use super::metadata::{RelationDescriptor, ThroughConfig};
use super::traits::{LoadOptions, RelationStrategy};
use crate::backends::QueryExecutor;
use crate::error::RelationResult;
use crate::model::{ModelInfo, ModelRegistry, Record, RelationValue};
use crate::query::Query;
use crate::value::{distinct_keys, key_of};

#[derive(Debug, Clone)]
pub struct HasManyThrough {
    descriptor: RelationDescriptor,
    registry: Arc<ModelRegistry>,
    owner: Arc<ModelInfo>,
    through_model: Arc<ModelInfo>,
    target: Arc<ModelInfo>,
    through: ThroughConfig,
}

impl HasManyThrough {
    pub fn new(registry: &Arc<ModelRegistry>, descriptor: &RelationDescriptor) -> RelationResult<Self> {
        let through = descriptor.through_config()?.clone();
        Ok(Self {
            descriptor: descriptor.clone(),
            registry: registry.clone(),
            owner: registry.model(&descriptor.owner_model)?,
            through_model: registry.model(&through.model)?,
            target: registry.model(&descriptor.target_model)?,
            through,
        })
    }

    fn target_column(&self, column: &str) -> String {
        format!("{}.{}", self.target.table, column)
    }

    fn through_column(&self, column: &str) -> String {
        format!("{}.{}", self.through_model.table, column)
    }

    fn owner_column(&self, column: &str) -> String {
        format!("{}.{}", self.owner.table, column)
    }

    /// target JOIN through JOIN owner, filtered on the owner's key
    fn join_query(&self, key: Value) -> Query {
        Query::table(&self.target.table)
            .select(&[self.target_column("*").as_str()])
            .join(
                &self.through_model.table,
                &self.through_column(&self.through.local_key),
                &self.target_column(&self.descriptor.foreign_key),
            )
            .join(
                &self.owner.table,
                &self.owner_column(&self.descriptor.local_key),
                &self.through_column(&self.through.first_key),
            )
            .where_eq(&self.owner_column(&self.descriptor.local_key), key)
    }
}

// has / has_where / aggregates keep the unsupported defaults
#[async_trait]
impl RelationStrategy for HasManyThrough {
    fn descriptor(&self) -> &RelationDescriptor {
        &self.descriptor
    }

    async fn get_results(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        options: &LoadOptions,
    ) -> RelationResult<RelationValue> {
        let Some(key) = owner.get(&self.descriptor.local_key).filter(|v| !v.is_null()) else {
            return Ok(RelationValue::Many(Vec::new()));
        };
        let query = options.apply(self.join_query(key.clone()));
        let mut records = fetch_records(conn, &self.target, &query).await?;
        load_nested(conn, &self.registry, &mut records, options).await?;
        Ok(RelationValue::Many(with_owner(records, owner)))
    }

    async fn eager_load(
        &self,
        conn: &dyn QueryExecutor,
        owners: &mut [Record],
        options: &LoadOptions,
    ) -> RelationResult<()> {
        let owner_keys = distinct_keys(owners.iter().filter_map(|o| o.get(&self.descriptor.local_key)));
        let index = if owner_keys.is_empty() {
            if !owners.is_empty() {
                warn!(relation = %self.descriptor.name, "eager load skipped: no owner keys");
            }
            EagerBatchKeyIndex::default()
        } else {
            let through_query = Query::table(&self.through_model.table)
                .select(&[
                    self.through_column(&self.through.local_key).as_str(),
                    self.through_column(&self.through.first_key).as_str(),
                ])
                .where_in(&self.through_column(&self.through.first_key), owner_keys.clone());
            let through_rows = conn.fetch_all(&through_query).await?;

            // intermediate key -> owner key
            let mut owner_of: HashMap<String, Value> = HashMap::new();
            for row in &through_rows {
                if let (Some(local), Some(owner_key)) = (
                    row.get(&self.through.local_key).and_then(key_of),
                    row.get(&self.through.first_key),
                ) {
                    owner_of.insert(local, owner_key.clone());
                }
            }

            let through_keys = distinct_keys(through_rows.iter().filter_map(|r| r.get(&self.through.local_key)));
            if through_keys.is_empty() {
                EagerBatchKeyIndex::default()
            } else {
                let target_query = options.apply(
                    Query::table(&self.target.table)
                        .where_in(&self.target_column(&self.descriptor.foreign_key), through_keys.clone()),
                );
                let mut records = fetch_records(conn, &self.target, &target_query).await?;
                debug!(
                    relation = %self.descriptor.name,
                    owners = owners.len(),
                    intermediates = through_keys.len(),
                    related = records.len(),
                    "eager through batch loaded"
                );
                load_nested(conn, &self.registry, &mut records, options).await?;

                let foreign_key = &self.descriptor.foreign_key;
                EagerBatchKeyIndex::build(records, |record| {
                    record
                        .get(foreign_key)
                        .and_then(key_of)
                        .and_then(|k| owner_of.get(&k).cloned())
                })
            }
        };

        for owner in owners.iter_mut() {
            let related = owner
                .get(&self.descriptor.local_key)
                .map(|key| index.get(key).to_vec())
                .unwrap_or_default();
            let related = with_owner(related, owner);
            owner.set_relation(self.descriptor.name.clone(), RelationValue::Many(related));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_join_query_walks_through_intermediate() {
        let registry = ModelRegistry::builder()
            .model(ModelInfo::new("Country", "countries").relation(RelationDescriptor::has_many_through(
                "posts",
                "Post",
                ThroughConfig::new("User", "country_id"),
                "user_id",
            )))
            .model(ModelInfo::new("User", "users"))
            .model(ModelInfo::new("Post", "posts"))
            .build()
            .unwrap();
        let descriptor = registry.descriptor("Country", "posts").unwrap();
        let through = HasManyThrough::new(&registry, descriptor).unwrap();

        assert_eq!(
            through.join_query(json!(7)).to_sql(),
            "SELECT posts.* FROM posts \
             INNER JOIN users ON users.id = posts.user_id \
             INNER JOIN countries ON countries.id = users.country_id \
             WHERE countries.id = 7"
        );
    }
}
