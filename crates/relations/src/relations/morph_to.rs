//! MorphTo Relationship - the owner stores a key and a discriminator naming
//! the target model.
//!
//! The referenced row must exist: a dangling reference is a
//! [`RelationError::RecordNotFound`], never an empty result.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::binding::{check_bindings, write_bindings};
use super::hydration::{fetch_records, load_nested};
use super::key_index::EagerBatchKeyIndex;
use super::metadata::{PolymorphicConfig, RelationDescriptor};
use super::traits::{LoadOptions, RelationStrategy};
use crate::backends::QueryExecutor;
use crate::error::{RelationError, RelationResult};
use crate::model::{ModelInfo, ModelRegistry, Record, RelationValue};
use crate::query::Query;
use crate::value::{display_key, distinct_keys};

#[derive(Debug, Clone)]
pub struct MorphTo {
    descriptor: RelationDescriptor,
    registry: Arc<ModelRegistry>,
    morph: PolymorphicConfig,
}

impl MorphTo {
    pub fn new(registry: &Arc<ModelRegistry>, descriptor: &RelationDescriptor) -> RelationResult<Self> {
        Ok(Self {
            descriptor: descriptor.clone(),
            registry: registry.clone(),
            morph: descriptor.morph_config()?.clone(),
        })
    }

    /// `(discriminator, key)` stored on the owner, when both are set
    fn reference(&self, owner: &Record) -> Option<(String, Value)> {
        let discriminator = match owner.get(&self.morph.type_column) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => return None,
        };
        match owner.get(&self.morph.id_column).filter(|v| !v.is_null()) {
            Some(key) => Some((discriminator, key.clone())),
            None => {
                warn!(
                    relation = %self.descriptor.name,
                    discriminator = %discriminator,
                    "polymorphic type set without a key"
                );
                None
            }
        }
    }

    fn not_found(target: &ModelInfo, key: &Value) -> RelationError {
        RelationError::RecordNotFound {
            model: target.name.clone(),
            key: display_key(key),
        }
    }

    /// Point the owner at `target`: key and discriminator are both written,
    /// the owner is saved and the target cached.
    pub async fn associate(
        &self,
        conn: &dyn QueryExecutor,
        owner: &mut Record,
        target: &Record,
    ) -> RelationResult<()> {
        let key = target.primary_key().cloned().ok_or_else(|| {
            RelationError::MissingInput(format!(
                "{} has no primary key value to associate",
                target.model_name()
            ))
        })?;
        let discriminator = self.registry.morph_type_of(target.model());

        owner.set_attribute(self.morph.id_column.clone(), key.clone());
        owner.set_attribute(self.morph.type_column.clone(), Value::String(discriminator.clone()));
        owner.save(conn).await?;
        owner.set_relation(self.descriptor.name.clone(), RelationValue::One(Box::new(target.clone())));

        info!(
            relation = %self.descriptor.name,
            discriminator = %discriminator,
            key = %display_key(&key),
            "polymorphic owner associated"
        );
        Ok(())
    }

    /// Clear key and discriminator, save the owner and drop the cache entry
    pub async fn dissociate(&self, conn: &dyn QueryExecutor, owner: &mut Record) -> RelationResult<()> {
        owner.set_attribute(self.morph.id_column.clone(), Value::Null);
        owner.set_attribute(self.morph.type_column.clone(), Value::Null);
        owner.save(conn).await?;
        owner.forget_relation(&self.descriptor.name);

        info!(relation = %self.descriptor.name, "polymorphic owner dissociated");
        Ok(())
    }
}

// aggregates / count / has / has_where keep the unsupported defaults
#[async_trait]
impl RelationStrategy for MorphTo {
    fn descriptor(&self) -> &RelationDescriptor {
        &self.descriptor
    }

    async fn get_results(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        options: &LoadOptions,
    ) -> RelationResult<RelationValue> {
        let Some((discriminator, key)) = self.reference(owner) else {
            return Ok(RelationValue::Empty);
        };
        let target = self.registry.resolve_morph_type(&discriminator)?;
        let query = options.apply(
            Query::table(&target.table).where_eq(&target.qualified_key(), key.clone()),
        );

        let mut records = fetch_records(conn, &target, &query).await?;
        if records.is_empty() {
            return Err(Self::not_found(&target, &key));
        }
        records.truncate(1);
        load_nested(conn, &self.registry, &mut records, options).await?;

        let mut record = records.remove(0);
        record.set_owner(owner.snapshot());
        Ok(RelationValue::One(Box::new(record)))
    }

    /// One query per distinct discriminator in the batch. Every owner is
    /// resolved before any is written, so a dangling reference leaves the
    /// batch untouched.
    async fn eager_load(
        &self,
        conn: &dyn QueryExecutor,
        owners: &mut [Record],
        options: &LoadOptions,
    ) -> RelationResult<()> {
        let references: Vec<Option<(String, Value)>> = owners.iter().map(|o| self.reference(o)).collect();

        let mut by_type: IndexMap<String, Vec<&Value>> = IndexMap::new();
        for (discriminator, key) in references.iter().flatten() {
            by_type.entry(discriminator.clone()).or_default().push(key);
        }

        let mut indexes: HashMap<String, (Arc<ModelInfo>, EagerBatchKeyIndex)> = HashMap::new();
        for (discriminator, keys) in by_type {
            let target = self.registry.resolve_morph_type(&discriminator)?;
            let keys = distinct_keys(keys);
            let query = options.apply(
                Query::table(&target.table).where_in(&target.qualified_key(), keys.clone()),
            );
            let mut records = fetch_records(conn, &target, &query).await?;
            debug!(
                relation = %self.descriptor.name,
                discriminator = %discriminator,
                keys = keys.len(),
                related = records.len(),
                "eager polymorphic batch loaded"
            );
            load_nested(conn, &self.registry, &mut records, options).await?;
            let index = EagerBatchKeyIndex::by_column(records, &target.primary_key);
            indexes.insert(discriminator, (target, index));
        }

        let mut resolved = Vec::with_capacity(owners.len());
        for (owner, reference) in owners.iter().zip(&references) {
            let related = match reference {
                None => None,
                Some((discriminator, key)) => {
                    let (target, index) = indexes
                        .get(discriminator)
                        .ok_or_else(|| RelationError::UnknownModel(discriminator.clone()))?;
                    let mut record = index
                        .first(key)
                        .cloned()
                        .ok_or_else(|| Self::not_found(target, key))?;
                    record.set_owner(owner.snapshot());
                    Some(record)
                }
            };
            resolved.push(related);
        }

        let bindings = &self.descriptor.bindings;
        if !bindings.is_empty() {
            for owner in owners.iter() {
                check_bindings(owner, bindings)?;
            }
        }
        for (owner, related) in owners.iter_mut().zip(resolved) {
            if bindings.is_empty() {
                owner.set_relation(self.descriptor.name.clone(), RelationValue::from_option(related));
            } else {
                write_bindings(owner, bindings, related.as_ref());
            }
        }
        Ok(())
    }
}
