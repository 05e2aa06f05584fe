//! BelongsToMany Relationship - many-to-many through a pivot table
//!
//! Resolving queries join the pivot table and project its columns under the
//! configured prefix; hydration moves them into a [`PivotRecord`] on each
//! target. Pivot rows are written through attach, detach and sync.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::hydration::{hydrate_with_pivot, load_nested, with_owner};
use super::keyed::{aliased_table, empty_aggregate, related_alias};
use super::key_index::EagerBatchKeyIndex;
use super::metadata::{PivotConfig, PivotConstraint, RelationDescriptor};
use super::pivot::PivotRecord;
use super::traits::{apply_filter, LoadOptions, QueryFilter, RelationStrategy};
use crate::backends::{QueryExecutor, Row};
use crate::error::{RelationError, RelationResult};
use crate::model::{ModelInfo, ModelRegistry, Record, RelationValue};
use crate::query::{Aggregate, Operator, Query};
use crate::value::{distinct_keys, key_of};

/// Target identification accepted by [`BelongsToMany::attach`]
#[derive(Debug, Clone)]
pub enum AttachInput {
    Id(Value),
    Ids(Vec<Value>),
    /// Attributes of a target that is inserted first
    New(Row),
    /// A target record; saved first when not yet persisted
    Record(Record),
}

impl From<Value> for AttachInput {
    fn from(id: Value) -> Self {
        AttachInput::Id(id)
    }
}

impl From<i64> for AttachInput {
    fn from(id: i64) -> Self {
        AttachInput::Id(Value::from(id))
    }
}

impl From<Vec<Value>> for AttachInput {
    fn from(ids: Vec<Value>) -> Self {
        AttachInput::Ids(ids)
    }
}

impl From<Vec<i64>> for AttachInput {
    fn from(ids: Vec<i64>) -> Self {
        AttachInput::Ids(ids.into_iter().map(Value::from).collect())
    }
}

impl From<Record> for AttachInput {
    fn from(record: Record) -> Self {
        AttachInput::Record(record)
    }
}

/// Pivot rows written by one attach call
#[derive(Debug, Clone, PartialEq)]
pub enum Attached {
    One(PivotRecord),
    Many(Vec<PivotRecord>),
}

impl Attached {
    pub fn len(&self) -> usize {
        match self {
            Attached::One(_) => 1,
            Attached::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<PivotRecord> {
        match self {
            Attached::One(record) => vec![record],
            Attached::Many(records) => records,
        }
    }
}

/// Desired target for [`BelongsToMany::sync`], with extra pivot columns
#[derive(Debug, Clone, PartialEq)]
pub struct SyncEntry {
    pub id: Value,
    pub pivot: Row,
}

impl SyncEntry {
    pub fn new(id: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            pivot: Row::new(),
        }
    }

    pub fn with_pivot(mut self, pivot: Row) -> Self {
        self.pivot = pivot;
        self
    }
}

impl From<i64> for SyncEntry {
    fn from(id: i64) -> Self {
        SyncEntry::new(id)
    }
}

impl From<Value> for SyncEntry {
    fn from(id: Value) -> Self {
        SyncEntry::new(id)
    }
}

impl From<&str> for SyncEntry {
    fn from(id: &str) -> Self {
        SyncEntry::new(id)
    }
}

/// Target ids touched by a sync, per outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncChanges {
    pub attached: Vec<Value>,
    pub detached: Vec<Value>,
    /// Existing rows re-written because extra pivot columns were supplied
    pub updated: Vec<Value>,
}

impl SyncChanges {
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty() && self.updated.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BelongsToMany {
    descriptor: RelationDescriptor,
    registry: Arc<ModelRegistry>,
    owner: Arc<ModelInfo>,
    target: Arc<ModelInfo>,
    pivot: PivotConfig,
    timestamps: bool,
}

impl BelongsToMany {
    pub fn new(registry: &Arc<ModelRegistry>, descriptor: &RelationDescriptor) -> RelationResult<Self> {
        let pivot = descriptor.pivot_config()?.clone();
        let timestamps = pivot
            .with_timestamps
            .unwrap_or(registry.config().pivot_timestamps);
        Ok(Self {
            descriptor: descriptor.clone(),
            registry: registry.clone(),
            owner: registry.model(&descriptor.owner_model)?,
            target: registry.model(&descriptor.target_model)?,
            pivot,
            timestamps,
        })
    }

    /// Extra pivot-table constraint applied to reads and detaches
    pub fn where_pivot(mut self, column: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.pivot.constraints.push(PivotConstraint {
            column: column.to_string(),
            operator,
            value: value.into(),
        });
        self
    }

    pub fn pivot_table(&self) -> &str {
        &self.pivot.table
    }

    fn pivot_column(&self, column: &str) -> String {
        format!("{}.{}", self.pivot.table, column)
    }

    fn target_key(&self) -> String {
        format!("{}.{}", self.target.table, self.descriptor.foreign_key)
    }

    /// Pivot columns carried on every resolved record
    fn pivot_columns(&self) -> Vec<String> {
        let mut columns = vec![self.pivot.local_key.clone(), self.pivot.foreign_key.clone()];
        columns.extend(self.pivot.additional_columns.iter().cloned());
        if self.timestamps {
            columns.push("created_at".to_string());
            columns.push("updated_at".to_string());
        }
        columns
    }

    fn constrained(&self, mut query: Query) -> Query {
        for constraint in &self.pivot.constraints {
            query = query.where_op(
                &self.pivot_column(&constraint.column),
                constraint.operator,
                constraint.value.clone(),
            );
        }
        query
    }

    /// Target rows joined to their pivot rows
    fn joined(&self) -> Query {
        self.joined_as(&self.target.table)
    }

    /// [`joined`](Self::joined) with the target table referenced as `alias`
    fn joined_as(&self, alias: &str) -> Query {
        let query = aliased_table(&self.target.table, alias).join(
            &self.pivot.table,
            &self.pivot_column(&self.pivot.foreign_key),
            &format!("{}.{}", alias, self.descriptor.foreign_key),
        );
        self.constrained(query)
    }

    /// Joined query projecting target columns plus prefixed pivot columns
    fn resolving_query(&self) -> Query {
        let prefix = &self.registry.config().pivot_prefix;
        let mut query = self
            .joined()
            .select(&[format!("{}.*", self.target.table).as_str()]);
        for column in self.pivot_columns() {
            query = query.select_as(&self.pivot_column(&column), &format!("{}{}", prefix, column));
        }
        query
    }

    fn hydrate(&self, rows: Vec<Row>) -> Vec<Record> {
        let config = self.registry.config();
        hydrate_with_pivot(
            &self.target,
            rows,
            &config.pivot_prefix,
            &config.pivot_attribute,
            &self.pivot.table,
        )
    }

    fn owner_value(&self, owner: &Record) -> Option<Value> {
        owner
            .get(&self.descriptor.local_key)
            .filter(|v| !v.is_null())
            .cloned()
    }

    fn require_owner_value(&self, owner: &Record) -> RelationResult<Value> {
        self.owner_value(owner).ok_or_else(|| {
            RelationError::MissingInput(format!(
                "{} has no value for '{}' required by relation '{}'",
                owner.model_name(),
                self.descriptor.local_key,
                self.descriptor.name
            ))
        })
    }

    /// Target ids currently pivoted to the owner
    pub async fn current_ids(&self, conn: &dyn QueryExecutor, owner: &Record) -> RelationResult<Vec<Value>> {
        let key = self.require_owner_value(owner)?;
        let query = self.constrained(
            Query::table(&self.pivot.table)
                .select(&[self.pivot_column(&self.pivot.foreign_key).as_str()])
                .where_eq(&self.pivot_column(&self.pivot.local_key), key),
        );
        let rows = conn.fetch_all(&query).await?;
        Ok(distinct_keys(rows.iter().filter_map(|row| row.get(&self.pivot.foreign_key))))
    }

    fn missing_target_id(&self, record: &Record) -> RelationError {
        RelationError::MissingInput(format!(
            "{} record has no value for '{}'",
            record.model_name(),
            self.descriptor.foreign_key
        ))
    }

    /// An unsaved target can only be attached when its pivot-referenced
    /// column is set or is the primary key the insert generates
    fn ensure_target_id_derivable(&self, record: &Record) -> RelationResult<()> {
        let column = &self.descriptor.foreign_key;
        let generated = *column == self.target.primary_key;
        if generated || record.get(column).map_or(false, |v| !v.is_null()) {
            Ok(())
        } else {
            Err(self.missing_target_id(record))
        }
    }

    async fn target_id(&self, conn: &dyn QueryExecutor, record: &mut Record) -> RelationResult<Value> {
        if !record.exists() {
            self.ensure_target_id_derivable(record)?;
            record.save(conn).await?;
        }
        record
            .get(&self.descriptor.foreign_key)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| self.missing_target_id(record))
    }

    fn pivot_row(&self, owner_key: &Value, target_id: &Value, extras: &Row) -> Row {
        let mut row = Row::new();
        row.insert(self.pivot.local_key.clone(), owner_key.clone());
        row.insert(self.pivot.foreign_key.clone(), target_id.clone());
        for (column, value) in extras {
            row.insert(column.clone(), value.clone());
        }
        if self.timestamps {
            let now = Value::String(Utc::now().to_rfc3339());
            row.entry("created_at".to_string()).or_insert_with(|| now.clone());
            row.insert("updated_at".to_string(), now);
        }
        row
    }

    async fn write_pivots(
        &self,
        conn: &dyn QueryExecutor,
        owner_key: &Value,
        ids: &[Value],
        extras: &Row,
    ) -> RelationResult<Vec<PivotRecord>> {
        let conflict = [self.pivot.local_key.as_str(), self.pivot.foreign_key.as_str()];
        let mut written = Vec::with_capacity(ids.len());
        for id in ids {
            let row = self.pivot_row(owner_key, id, extras);
            conn.execute(&Query::insert_into(&self.pivot.table, row.clone()).on_conflict(&conflict))
                .await?;
            written.push(PivotRecord::new(
                self.registry.config().pivot_attribute.clone(),
                self.pivot.table.clone(),
                row,
            ));
        }
        Ok(written)
    }

    /// Insert one pivot row per identified target. Rows already present are
    /// updated with `extras`.
    pub async fn attach(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        input: impl Into<AttachInput>,
        extras: Row,
    ) -> RelationResult<Attached> {
        let owner_key = self.require_owner_value(owner)?;
        let ids = match input.into() {
            AttachInput::Id(id) => vec![id],
            AttachInput::Ids(ids) => ids,
            AttachInput::New(data) => {
                let mut record = Record::with_attributes(self.target.clone(), data);
                vec![self.target_id(conn, &mut record).await?]
            }
            AttachInput::Record(mut record) => vec![self.target_id(conn, &mut record).await?],
        };

        if ids.is_empty() || ids.iter().any(|id| key_of(id).is_none()) {
            return Err(RelationError::MissingInput(format!(
                "relation '{}' needs at least one non-null target id to attach",
                self.descriptor.name
            )));
        }

        let mut written = self.write_pivots(conn, &owner_key, &ids, &extras).await?;
        info!(relation = %self.descriptor.name, count = written.len(), "pivot rows attached");

        Ok(match written.len() {
            1 => Attached::One(written.remove(0)),
            _ => Attached::Many(written),
        })
    }

    /// Remove the owner's pivot rows, all of them or those for `ids`.
    /// With `cascade` the targets themselves are deleted too.
    pub async fn detach(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        ids: Option<Vec<Value>>,
        cascade: bool,
    ) -> RelationResult<u64> {
        let owner_key = self.require_owner_value(owner)?;
        if matches!(&ids, Some(ids) if ids.is_empty()) {
            return Ok(0);
        }

        let cascade_ids = match (&ids, cascade) {
            (_, false) => Vec::new(),
            (Some(ids), true) => ids.clone(),
            (None, true) => self.current_ids(conn, owner).await?,
        };

        let mut query = self.constrained(
            Query::delete_from(&self.pivot.table)
                .where_eq(&self.pivot_column(&self.pivot.local_key), owner_key),
        );
        if let Some(ids) = ids {
            query = query.where_in(&self.pivot_column(&self.pivot.foreign_key), ids);
        }
        let detached = conn.execute(&query).await?;

        if !cascade_ids.is_empty() {
            let deleted = conn
                .execute(&Query::delete_from(&self.target.table).where_in(&self.target_key(), cascade_ids))
                .await?;
            debug!(relation = %self.descriptor.name, deleted, "detached targets deleted");
        }

        info!(relation = %self.descriptor.name, detached, "pivot rows detached");
        Ok(detached)
    }

    /// Make the owner's pivot rows match `entries`.
    ///
    /// Every entry already attached whose pivot map is non-empty is
    /// re-written and reported as updated, whether or not the stored values
    /// differ.
    pub async fn sync(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        entries: Vec<SyncEntry>,
        detach_missing: bool,
    ) -> RelationResult<SyncChanges> {
        let owner_key = self.require_owner_value(owner)?;
        let mut desired = HashSet::with_capacity(entries.len());
        for entry in &entries {
            let key = key_of(&entry.id).ok_or_else(|| {
                RelationError::MissingInput(format!(
                    "relation '{}' cannot sync a null target id",
                    self.descriptor.name
                ))
            })?;
            desired.insert(key);
        }

        let current = self.current_ids(conn, owner).await?;
        let mut present: HashSet<String> = current.iter().filter_map(key_of).collect();
        let mut changes = SyncChanges::default();

        if detach_missing {
            let missing: Vec<Value> = current
                .into_iter()
                .filter(|id| key_of(id).map_or(false, |k| !desired.contains(&k)))
                .collect();
            if !missing.is_empty() {
                self.detach(conn, owner, Some(missing.clone()), false).await?;
                for id in &missing {
                    if let Some(k) = key_of(id) {
                        present.remove(&k);
                    }
                }
                changes.detached = missing;
            }
        }

        for entry in entries {
            let Some(key) = key_of(&entry.id) else { continue };
            if !present.contains(&key) {
                self.write_pivots(conn, &owner_key, std::slice::from_ref(&entry.id), &entry.pivot)
                    .await?;
                present.insert(key);
                changes.attached.push(entry.id);
            } else if !entry.pivot.is_empty() {
                self.write_pivots(conn, &owner_key, std::slice::from_ref(&entry.id), &entry.pivot)
                    .await?;
                changes.updated.push(entry.id);
            }
        }

        info!(
            relation = %self.descriptor.name,
            attached = changes.attached.len(),
            detached = changes.detached.len(),
            updated = changes.updated.len(),
            "pivot rows synced"
        );
        Ok(changes)
    }

    /// Insert a new target and attach it with `pivot` columns
    pub async fn save(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        data: Row,
        pivot: Row,
    ) -> RelationResult<Record> {
        self.require_owner_value(owner)?;
        let mut record = Record::with_attributes(self.target.clone(), data);
        self.ensure_target_id_derivable(&record)?;
        record.save(conn).await?;
        let attached = self.attach(conn, owner, record.clone(), pivot).await?;
        if let Some(pivot) = attached.into_vec().into_iter().next() {
            record.set_pivot(pivot);
        }
        Ok(record)
    }
}

// has / has_where keep the unsupported defaults
#[async_trait]
impl RelationStrategy for BelongsToMany {
    fn descriptor(&self) -> &RelationDescriptor {
        &self.descriptor
    }

    async fn get_results(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        options: &LoadOptions,
    ) -> RelationResult<RelationValue> {
        let Some(key) = self.owner_value(owner) else {
            return Ok(RelationValue::Many(Vec::new()));
        };
        let query = options.apply(
            self.resolving_query()
                .where_eq(&self.pivot_column(&self.pivot.local_key), key),
        );
        let mut records = self.hydrate(conn.fetch_all(&query).await?);
        load_nested(conn, &self.registry, &mut records, options).await?;
        Ok(RelationValue::Many(with_owner(records, owner)))
    }

    async fn eager_load(
        &self,
        conn: &dyn QueryExecutor,
        owners: &mut [Record],
        options: &LoadOptions,
    ) -> RelationResult<()> {
        let keys = distinct_keys(owners.iter().filter_map(|o| o.get(&self.descriptor.local_key)));
        let index = if keys.is_empty() {
            if !owners.is_empty() {
                warn!(relation = %self.descriptor.name, "eager load skipped: no owner keys");
            }
            EagerBatchKeyIndex::default()
        } else {
            let query = options.apply(
                self.resolving_query()
                    .where_in(&self.pivot_column(&self.pivot.local_key), keys.clone()),
            );
            let mut records = self.hydrate(conn.fetch_all(&query).await?);
            debug!(
                relation = %self.descriptor.name,
                owners = owners.len(),
                keys = keys.len(),
                related = records.len(),
                "eager pivot batch loaded"
            );
            load_nested(conn, &self.registry, &mut records, options).await?;

            let local_key = &self.pivot.local_key;
            EagerBatchKeyIndex::build(records, |record| {
                record.pivot().and_then(|pivot| pivot.get(local_key)).cloned()
            })
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

    async fn relation_aggregate(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        aggregate: &Aggregate,
        filter: Option<&QueryFilter>,
    ) -> RelationResult<Value> {
        let Some(key) = self.owner_value(owner) else {
            return Ok(empty_aggregate(aggregate));
        };
        let query = apply_filter(
            filter,
            self.joined()
                .where_eq(&self.pivot_column(&self.pivot.local_key), key),
        );
        conn.aggregate(&query, &aggregate.qualify(&self.target.table))
            .await
    }

    fn relation_count_query(&self, filter: Option<&QueryFilter>) -> RelationResult<String> {
        let alias = related_alias(&self.descriptor.name, &self.owner.table);
        let query = self.joined_as(&alias).where_column(
            &self.pivot_column(&self.pivot.local_key),
            Operator::Equal,
            &format!("{}.{}", self.owner.table, self.descriptor.local_key),
        );
        Ok(apply_filter(filter, query).aggregate_sql(&Aggregate::count()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelationConfig;
    use crate::relations::metadata::RelationDescriptor;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn relation(pivot: PivotConfig, config: RelationConfig) -> BelongsToMany {
        let registry = ModelRegistry::builder()
            .config(config)
            .model(ModelInfo::new("User", "users").relation(RelationDescriptor::belongs_to_many("roles", "Role", pivot)))
            .model(ModelInfo::new("Role", "roles"))
            .build()
            .unwrap();
        let descriptor = registry.descriptor("User", "roles").unwrap().clone();
        BelongsToMany::new(&registry, &descriptor).unwrap()
    }

    #[test]
    fn test_resolving_query_prefixes_pivot_columns() {
        let roles = relation(
            PivotConfig::new("role_user", "user_id", "role_id").with_columns(&["level"]),
            RelationConfig::default(),
        );

        let sql = roles.resolving_query().to_sql();

        assert!(sql.starts_with("SELECT roles.*, role_user.user_id AS pivot__user_id"));
        assert!(sql.contains("role_user.level AS pivot__level"));
        assert!(sql.contains("INNER JOIN role_user ON role_user.role_id = roles.id"));
        assert!(!sql.contains("created_at"));
    }

    #[test]
    fn test_timestamps_follow_config_unless_overridden() {
        let config = RelationConfig::default().with_pivot_timestamps(true);
        let stamped = relation(PivotConfig::new("role_user", "user_id", "role_id"), config.clone());
        assert_eq!(
            stamped.pivot_columns(),
            vec!["user_id", "role_id", "created_at", "updated_at"]
        );

        let plain = relation(
            PivotConfig::new("role_user", "user_id", "role_id").with_timestamps(false),
            config,
        );
        assert_eq!(plain.pivot_columns(), vec!["user_id", "role_id"]);
    }

    #[test]
    fn test_where_pivot_constrains_joined_queries() {
        let roles = relation(PivotConfig::new("role_user", "user_id", "role_id"), RelationConfig::default())
            .where_pivot("active", Operator::Equal, true);

        assert!(roles.joined().to_sql().contains("role_user.active = TRUE"));
        assert_eq!(
            roles.relation_count_query(None).unwrap(),
            "SELECT COUNT(*) AS aggregate FROM roles INNER JOIN role_user ON role_user.role_id = roles.id \
             WHERE role_user.active = TRUE AND role_user.user_id = users.id"
        );
    }

    #[test]
    fn test_self_referential_count_query_aliases_target() {
        let registry = ModelRegistry::builder()
            .model(ModelInfo::new("User", "users").relation(RelationDescriptor::belongs_to_many(
                "friends",
                "User",
                PivotConfig::new("friendships", "user_id", "friend_id"),
            )))
            .build()
            .unwrap();
        let descriptor = registry.descriptor("User", "friends").unwrap().clone();
        let friends = BelongsToMany::new(&registry, &descriptor).unwrap();

        assert_eq!(
            friends.relation_count_query(None).unwrap(),
            "SELECT COUNT(*) AS aggregate FROM users AS friends \
             INNER JOIN friendships ON friendships.friend_id = friends.id \
             WHERE friendships.user_id = users.id"
        );
    }

    #[test]
    fn test_attach_input_conversions() {
        assert!(matches!(AttachInput::from(3i64), AttachInput::Id(id) if id == json!(3)));
        assert!(matches!(AttachInput::from(vec![1i64, 2]), AttachInput::Ids(ids) if ids.len() == 2));
        assert_eq!(SyncEntry::from("a").id, json!("a"));
    }

    #[test]
    fn test_sync_changes_serialize_by_outcome() {
        let changes = SyncChanges {
            attached: vec![json!(1)],
            detached: vec![],
            updated: vec![json!(2)],
        };
        assert!(!changes.is_empty());
        assert_eq!(
            serde_json::to_value(&changes).unwrap(),
            json!({"attached": [1], "detached": [], "updated": [2]})
        );
    }
}
