//! Direct-key relations: one column on the owner matched against one column
//! on the target, optionally narrowed by a discriminator on the target.
//!
//! `HasOne`, `BelongsTo`, `HasMany`, `MorphOne` and `MorphMany` are thin
//! wrappers over [`KeyedRelation`]; they differ only in which side holds the
//! key and whether the result is one record or many.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::hydration::{fetch_records, load_nested, with_owner};
use super::key_index::EagerBatchKeyIndex;
use super::metadata::{RelationDescriptor, RelationKind};
use super::traits::{apply_filter, LoadOptions, QueryFilter};
use crate::backends::{QueryExecutor, Row};
use crate::error::{RelationError, RelationResult};
use crate::model::{ModelInfo, ModelRegistry, Record};
use crate::query::{Aggregate, Condition, JoinType, Operator, Page, Query};
use crate::value::{display_key, distinct_keys};

#[derive(Debug, Clone)]
pub(crate) struct KeyedRelation {
    pub(crate) descriptor: RelationDescriptor,
    pub(crate) registry: Arc<ModelRegistry>,
    pub(crate) owner: Arc<ModelInfo>,
    pub(crate) target: Arc<ModelInfo>,
    /// Owner column holding the match value
    pub(crate) owner_key: String,
    /// Target column compared against it
    pub(crate) target_key: String,
    /// `(type column, value)` required on target rows
    pub(crate) discriminator: Option<(String, Value)>,
}

impl KeyedRelation {
    pub(crate) fn new(registry: &Arc<ModelRegistry>, descriptor: &RelationDescriptor) -> RelationResult<Self> {
        let owner = registry.model(&descriptor.owner_model)?;
        let target = registry.model(&descriptor.target_model)?;

        let (owner_key, target_key) = match descriptor.kind {
            RelationKind::BelongsTo => (descriptor.foreign_key.clone(), descriptor.local_key.clone()),
            _ => (descriptor.local_key.clone(), descriptor.foreign_key.clone()),
        };

        let discriminator = match descriptor.kind {
            RelationKind::MorphOne | RelationKind::MorphMany => {
                let morph = descriptor.morph_config()?;
                let value = morph
                    .type_value
                    .clone()
                    .unwrap_or_else(|| registry.morph_type_of(&owner));
                Some((morph.type_column.clone(), Value::String(value)))
            }
            _ => None,
        };

        Ok(Self {
            descriptor: descriptor.clone(),
            registry: registry.clone(),
            owner,
            target,
            owner_key,
            target_key,
            discriminator,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn qualified_target_key(&self) -> String {
        format!("{}.{}", self.target.table, self.target_key)
    }

    /// Non-null match value on the owner
    pub(crate) fn owner_value(&self, owner: &Record) -> Option<Value> {
        owner.get(&self.owner_key).filter(|v| !v.is_null()).cloned()
    }

    fn require_owner_value(&self, owner: &Record) -> RelationResult<Value> {
        self.owner_value(owner).ok_or_else(|| {
            RelationError::MissingInput(format!(
                "{} has no value for '{}' required by relation '{}'",
                owner.model_name(),
                self.owner_key,
                self.name()
            ))
        })
    }

    /// Rows of the target table, discriminator applied
    pub(crate) fn base_query(&self) -> Query {
        let query = Query::table(&self.target.table);
        match &self.discriminator {
            Some((column, value)) => {
                query.where_eq(&format!("{}.{}", self.target.table, column), value.clone())
            }
            None => query,
        }
    }

    fn owner_query(&self, key: Value, filter: Option<&QueryFilter>) -> Query {
        apply_filter(filter, self.base_query().where_eq(&self.qualified_target_key(), key))
    }

    /// Related records of one owner, nested relations loaded, each carrying
    /// an owner snapshot. No query is issued when the owner has no key.
    pub(crate) async fn fetch_for(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        options: &LoadOptions,
    ) -> RelationResult<Vec<Record>> {
        let Some(key) = self.owner_value(owner) else {
            return Ok(Vec::new());
        };
        let query = self.owner_query(key, options.filter.as_ref());
        let mut records = fetch_records(conn, &self.target, &query).await?;
        load_nested(conn, &self.registry, &mut records, options).await?;
        Ok(with_owner(records, owner))
    }

    /// One `IN` query for every owner in the batch, indexed by target key
    pub(crate) async fn fetch_batch(
        &self,
        conn: &dyn QueryExecutor,
        owners: &[Record],
        options: &LoadOptions,
    ) -> RelationResult<EagerBatchKeyIndex> {
        let keys = distinct_keys(owners.iter().filter_map(|owner| owner.get(&self.owner_key)));
        if keys.is_empty() {
            if !owners.is_empty() {
                warn!(relation = %self.name(), owners = owners.len(), "eager load skipped: no owner keys");
            }
            return Ok(EagerBatchKeyIndex::default());
        }

        let query = options.apply(self.base_query().where_in(&self.qualified_target_key(), keys.clone()));
        let mut records = fetch_records(conn, &self.target, &query).await?;
        debug!(
            relation = %self.name(),
            owners = owners.len(),
            keys = keys.len(),
            related = records.len(),
            "eager batch loaded"
        );

        load_nested(conn, &self.registry, &mut records, options).await?;
        Ok(EagerBatchKeyIndex::by_column(records, &self.target_key))
    }

    /// Matches for one owner out of a batch index, with owner snapshots
    pub(crate) fn matches_for(&self, index: &EagerBatchKeyIndex, owner: &Record) -> Vec<Record> {
        let related = owner
            .get(&self.owner_key)
            .map(|key| index.get(key).to_vec())
            .unwrap_or_default();
        with_owner(related, owner)
    }

    /// Name the related table goes by inside owner-side queries
    fn alias(&self) -> String {
        related_alias(self.name(), &self.owner.table)
    }

    fn join_conditions(&self) -> Vec<Condition> {
        let alias = self.alias();
        let mut conditions = vec![Condition::columns_eq(
            format!("{}.{}", alias, self.target_key),
            format!("{}.{}", self.owner.table, self.owner_key),
        )];
        if let Some((column, value)) = &self.discriminator {
            conditions.push(Condition::eq(format!("{}.{}", alias, column), value.clone()));
        }
        conditions
    }

    /// Owners grouped against a LEFT JOIN, filtered on the related count
    pub(crate) fn has_query(&self, operator: Operator, count: i64) -> Query {
        let owner_table = &self.owner.table;
        Query::table(owner_table)
            .select(&[format!("{}.*", owner_table).as_str()])
            .join_with(JoinType::Left, &self.target.table, Some(&self.alias()), self.join_conditions())
            .group_by(&self.owner.qualified_key())
            .having(
                Aggregate::Count(Some(format!("{}.{}", self.alias(), self.target_key))),
                operator,
                count,
            )
    }

    /// Owners with at least one related row passing `filter`
    pub(crate) fn has_where_query(&self, filter: &QueryFilter) -> Query {
        let owner_table = &self.owner.table;
        let query = Query::table(owner_table)
            .select(&[format!("{}.*", owner_table).as_str()])
            .join_with(JoinType::Inner, &self.target.table, Some(&self.alias()), self.join_conditions())
            .group_by(&self.owner.qualified_key());
        filter(query)
    }

    /// Correlated against the outer owner table; the related table is
    /// aliased whenever its name would otherwise shadow the owner's
    pub(crate) fn count_query_sql(&self, filter: Option<&QueryFilter>) -> String {
        let alias = self.alias();
        let mut query = aliased_table(&self.target.table, &alias);
        if let Some((column, value)) = &self.discriminator {
            query = query.where_eq(&format!("{}.{}", alias, column), value.clone());
        }
        let query = query.where_column(
            &format!("{}.{}", alias, self.target_key),
            Operator::Equal,
            &format!("{}.{}", self.owner.table, self.owner_key),
        );
        apply_filter(filter, query).aggregate_sql(&Aggregate::count())
    }

    pub(crate) async fn aggregate(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        aggregate: &Aggregate,
        filter: Option<&QueryFilter>,
    ) -> RelationResult<Value> {
        let Some(key) = self.owner_value(owner) else {
            return Ok(empty_aggregate(aggregate));
        };
        let query = self.owner_query(key, filter);
        conn.aggregate(&query, &aggregate.qualify(&self.target.table))
            .await
    }

    /// Unsaved target record with the key and discriminator filled in
    pub(crate) fn make(&self, owner: &Record, data: Row) -> RelationResult<Record> {
        let key = self.require_owner_value(owner)?;
        let mut record = Record::with_attributes(self.target.clone(), data);
        record.set_attribute(self.target_key.clone(), key);
        if let Some((column, value)) = &self.discriminator {
            record.set_attribute(column.clone(), value.clone());
        }
        Ok(record)
    }

    pub(crate) async fn save(&self, conn: &dyn QueryExecutor, owner: &Record, data: Row) -> RelationResult<Record> {
        let mut record = self.make(owner, data)?;
        record.save(conn).await?;
        debug!(
            relation = %self.name(),
            owner_key = %display_key(&record.value(&self.target_key)),
            "related record saved"
        );
        Ok(record)
    }

    /// Save each entry in order; the first failure aborts the rest. Returns
    /// the last saved record.
    pub(crate) async fn save_all(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        dataset: Vec<Row>,
    ) -> RelationResult<Option<Record>> {
        let mut last = None;
        for data in dataset {
            last = Some(self.save(conn, owner, data).await?);
        }
        Ok(last)
    }

    pub(crate) async fn paginate(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        page: i64,
        per_page: i64,
        filter: Option<&QueryFilter>,
    ) -> RelationResult<Page<Record>> {
        let Some(key) = self.owner_value(owner) else {
            return Ok(Page::new(Vec::new(), 0, page, per_page));
        };
        let query = self.owner_query(key, filter);
        let total = conn.count(&query.clone().without_paging()).await?;
        let records = fetch_records(conn, &self.target, &query.paginate(per_page, page)).await?;
        Ok(Page::new(with_owner(records, owner), total, page, per_page))
    }
}

/// Alias for a related table referenced from owner-side queries: the
/// relation name, unless that collides with the owner table
pub(crate) fn related_alias(relation: &str, owner_table: &str) -> String {
    if relation == owner_table {
        format!("{}_related", relation)
    } else {
        relation.to_string()
    }
}

/// `table`, or `table AS alias` when the two differ
pub(crate) fn aliased_table(table: &str, alias: &str) -> Query {
    if table == alias {
        Query::table(table)
    } else {
        Query::table_as(table, alias)
    }
}

/// Aggregate result when the owner has no key: zero for counts, null
/// otherwise
pub(crate) fn empty_aggregate(aggregate: &Aggregate) -> Value {
    match aggregate {
        Aggregate::Count(_) => Value::from(0),
        _ => Value::Null,
    }
}
