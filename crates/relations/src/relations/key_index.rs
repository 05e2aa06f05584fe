//! Per-call index from key values to related records

use std::collections::HashMap;

use serde_json::Value;

use crate::model::Record;
use crate::value::key_of;

/// Groups related records by a normalized key so each owner can pick up its
/// matches. Built once per eager-load call and dropped afterwards.
#[derive(Debug, Default)]
pub struct EagerBatchKeyIndex {
    buckets: HashMap<String, Vec<Record>>,
    total: usize,
}

impl EagerBatchKeyIndex {
    /// Index `records` by `column`
    pub fn by_column(records: Vec<Record>, column: &str) -> Self {
        Self::build(records, |record| record.get(column).cloned())
    }

    /// Index `records` by a key extracted from each one. Records without a
    /// key are dropped.
    pub fn build<F>(records: Vec<Record>, key: F) -> Self
    where
        F: Fn(&Record) -> Option<Value>,
    {
        let mut index = Self::default();
        for record in records {
            if let Some(k) = key(&record).as_ref().and_then(key_of) {
                index.buckets.entry(k).or_default().push(record);
                index.total += 1;
            }
        }
        index
    }

    /// Records matching `key`, in fetch order
    pub fn get(&self, key: &Value) -> &[Record] {
        key_of(key)
            .and_then(|k| self.buckets.get(&k))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn first(&self, key: &Value) -> Option<&Record> {
        self.get(key).first()
    }

    /// Number of distinct keys
    pub fn key_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of indexed records
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
