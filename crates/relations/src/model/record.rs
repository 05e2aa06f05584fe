//! Dynamic records: attributes, relation cache and persistence

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use super::info::ModelInfo;
use super::registry::ModelRegistry;
use crate::backends::{QueryExecutor, Row};
use crate::error::{RelationError, RelationResult};
use crate::query::Query;
use crate::relations::binding::bind_related;
use crate::relations::pivot::PivotRecord;
use crate::relations::{LoadOptions, Relation};

/// Resolved value of one relation
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    One(Box<Record>),
    Many(Vec<Record>),
    Empty,
}

impl RelationValue {
    pub fn as_one(&self) -> Option<&Record> {
        match self {
            RelationValue::One(record) => Some(record),
            _ => None,
        }
    }

    /// Records held by this value; a single record yields a one-element slice
    pub fn as_many(&self) -> &[Record] {
        match self {
            RelationValue::One(record) => std::slice::from_ref(record.as_ref()),
            RelationValue::Many(records) => records,
            RelationValue::Empty => &[],
        }
    }

    pub fn as_many_mut(&mut self) -> &mut [Record] {
        match self {
            RelationValue::One(record) => std::slice::from_mut(record.as_mut()),
            RelationValue::Many(records) => records,
            RelationValue::Empty => &mut [],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_many().is_empty()
    }

    pub fn len(&self) -> usize {
        self.as_many().len()
    }

    pub(crate) fn from_option(record: Option<Record>) -> Self {
        record.map_or(RelationValue::Empty, |r| RelationValue::One(Box::new(r)))
    }
}

impl Serialize for RelationValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RelationValue::One(record) => record.serialize(serializer),
            RelationValue::Many(records) => records.serialize(serializer),
            RelationValue::Empty => serializer.serialize_none(),
        }
    }
}

/// A row of some model with its relation cache
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    model: Arc<ModelInfo>,
    attributes: Row,
    relations: IndexMap<String, RelationValue>,
    pivot: Option<PivotRecord>,
    owner: Option<Box<Record>>,
    bound: IndexSet<String>,
    exists: bool,
}

impl Record {
    /// New, unsaved record
    pub fn new(model: Arc<ModelInfo>) -> Self {
        Self {
            model,
            attributes: Row::new(),
            relations: IndexMap::new(),
            pivot: None,
            owner: None,
            bound: IndexSet::new(),
            exists: false,
        }
    }

    /// New, unsaved record with attributes
    pub fn with_attributes(model: Arc<ModelInfo>, attributes: Row) -> Self {
        let mut record = Self::new(model);
        record.fill(attributes);
        record
    }

    /// Record hydrated from a fetched row
    pub fn from_row(model: Arc<ModelInfo>, row: Row) -> Self {
        let mut record = Self::with_attributes(model, row);
        record.exists = true;
        record
    }

    pub fn model(&self) -> &Arc<ModelInfo> {
        &self.model
    }

    pub fn model_name(&self) -> &str {
        &self.model.name
    }

    pub fn table(&self) -> &str {
        &self.model.table
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Attribute value, `Null` when absent
    pub fn value(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        self.bound.shift_remove(&name);
        self.attributes.insert(name, value.into());
    }

    pub fn fill(&mut self, attributes: Row) {
        for (name, value) in attributes {
            self.set_attribute(name, value);
        }
    }

    /// Primary key value; `None` while unset or null
    pub fn primary_key(&self) -> Option<&Value> {
        self.get(&self.model.primary_key).filter(|v| !v.is_null())
    }

    /// Copy of this record without relations, pivot, owner or bound
    /// attributes
    pub fn snapshot(&self) -> Record {
        let attributes = self
            .attributes
            .iter()
            .filter(|(name, _)| !self.bound.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Record {
            model: self.model.clone(),
            attributes,
            relations: IndexMap::new(),
            pivot: None,
            owner: None,
            bound: IndexSet::new(),
            exists: self.exists,
        }
    }

    pub fn relations(&self) -> &IndexMap<String, RelationValue> {
        &self.relations
    }

    /// Cached relation value, if resolved
    pub fn related(&self, name: &str) -> Option<&RelationValue> {
        self.relations.get(name)
    }

    pub fn related_mut(&mut self, name: &str) -> Option<&mut RelationValue> {
        self.relations.get_mut(name)
    }

    pub fn related_one(&self, name: &str) -> Option<&Record> {
        self.related(name).and_then(RelationValue::as_one)
    }

    pub fn related_many(&self, name: &str) -> &[Record] {
        self.related(name).map(RelationValue::as_many).unwrap_or(&[])
    }

    /// Replace the cached value of a relation
    pub fn set_relation(&mut self, name: impl Into<String>, value: RelationValue) {
        self.relations.insert(name.into(), value);
    }

    pub fn forget_relation(&mut self, name: &str) -> Option<RelationValue> {
        self.relations.shift_remove(name)
    }

    pub fn pivot(&self) -> Option<&PivotRecord> {
        self.pivot.as_ref()
    }

    /// Snapshot of the record this one was resolved for
    pub fn owner(&self) -> Option<&Record> {
        self.owner.as_deref()
    }

    /// Mutable access to the owner snapshot. Changes never reach the
    /// original owner.
    pub fn owner_mut(&mut self) -> Option<&mut Record> {
        self.owner.as_deref_mut()
    }

    pub(crate) fn set_pivot(&mut self, pivot: PivotRecord) {
        self.pivot = Some(pivot);
    }

    pub(crate) fn set_owner(&mut self, owner: Record) {
        self.owner = Some(Box::new(owner));
    }

    pub(crate) fn bind_attribute(&mut self, name: &str, value: Value) {
        self.attributes.insert(name.to_string(), value);
        self.bound.insert(name.to_string());
    }

    /// True when the attribute was projected from a related record
    pub fn is_bound(&self, name: &str) -> bool {
        self.bound.contains(name)
    }

    /// Persisted columns: bound attributes never reach the table
    fn persistable(&self) -> Row {
        self.attributes
            .iter()
            .filter(|(name, _)| !self.bound.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Insert or update this record
    pub async fn save(&mut self, conn: &dyn QueryExecutor) -> RelationResult<()> {
        let pk = self.model.primary_key.clone();
        let mut values = self.persistable();

        if self.exists {
            let key = self.primary_key().cloned().ok_or_else(|| {
                RelationError::MissingInput(format!("{} has no primary key value", self.model.name))
            })?;
            values.shift_remove(&pk);
            if values.is_empty() {
                return Ok(());
            }
            conn.execute(&Query::update(&self.model.table, values).where_eq(&pk, key))
                .await?;
        } else {
            if values.get(&pk).map_or(false, Value::is_null) {
                values.shift_remove(&pk);
            }
            let generated = conn
                .insert(&Query::insert_into(&self.model.table, values), &pk)
                .await?;
            if self.primary_key().is_none() {
                if let Some(key) = generated {
                    self.attributes.insert(pk, key);
                }
            }
            self.exists = true;
        }

        debug!(model = %self.model.name, key = ?self.primary_key(), "record saved");
        Ok(())
    }

    /// Delete this record by primary key
    pub async fn delete(&mut self, conn: &dyn QueryExecutor) -> RelationResult<u64> {
        let key = self.primary_key().cloned().ok_or_else(|| {
            RelationError::MissingInput(format!("{} has no primary key value", self.model.name))
        })?;
        let affected = conn
            .execute(&Query::delete_from(&self.model.table).where_eq(&self.model.primary_key, key))
            .await?;
        self.exists = false;
        Ok(affected)
    }

    /// Strategy for the relation `name` declared on this record's model
    pub fn relation(&self, registry: &Arc<ModelRegistry>, name: &str) -> RelationResult<Relation> {
        let descriptor = registry.descriptor(&self.model.name, name)?;
        Relation::from_descriptor(registry, descriptor)
    }

    /// Resolve a relation lazily and cache it. Relations with bound
    /// attributes write those onto this record instead of caching.
    pub async fn load(
        &mut self,
        conn: &dyn QueryExecutor,
        registry: &Arc<ModelRegistry>,
        name: &str,
        options: &LoadOptions,
    ) -> RelationResult<RelationValue> {
        let relation = self.relation(registry, name)?;
        let value = relation.get_results(conn, self, options).await?;
        let descriptor = relation.descriptor();
        if descriptor.has_bindings() {
            bind_related(self, &descriptor.bindings, value.as_one())?;
        } else {
            self.set_relation(name, value.clone());
        }
        Ok(value)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = self.relations.len() + usize::from(self.pivot.is_some());
        let mut map = serializer.serialize_map(Some(self.attributes.len() + extra))?;
        for (name, value) in &self.attributes {
            map.serialize_entry(name, value)?;
        }
        for (name, value) in &self.relations {
            map.serialize_entry(name, value)?;
        }
        if let Some(pivot) = &self.pivot {
            map.serialize_entry(&pivot.name, pivot)?;
        }
        map.end()
    }
}
