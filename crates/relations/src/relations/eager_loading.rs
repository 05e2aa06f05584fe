//! Eager Loading System - resolves named relations for a whole batch of
//! records, one batch per relation and nesting level.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use super::traits::{LoadOptions, QueryFilter};
use super::types::Relation;
use crate::backends::QueryExecutor;
use crate::error::RelationResult;
use crate::model::{ModelRegistry, Record};
use crate::query::Query;

/// What to load under one top-level relation name
#[derive(Clone, Default)]
struct LoadNode {
    /// Remaining dotted paths below this relation
    children: Vec<String>,
    filter: Option<QueryFilter>,
    /// Filters for `children`, keyed by the remaining path
    nested_filters: IndexMap<String, QueryFilter>,
}

impl LoadNode {
    fn options(&self) -> LoadOptions {
        LoadOptions {
            with: self.children.clone(),
            filter: self.filter.clone(),
            nested_filters: self.nested_filters.clone(),
        }
    }
}

/// Batch loader for relation paths such as `posts` or `posts.comments.author`.
///
/// ```ignore
/// let mut users = fetch_users(&db).await?;
/// EagerLoader::new(registry.clone())
///     .with("posts.comments")
///     .with_filter("posts", |q| q.where_eq("posts.published", true))
///     .load(&db, &mut users)
///     .await?;
/// ```
#[derive(Clone)]
pub struct EagerLoader {
    registry: Arc<ModelRegistry>,
    nodes: IndexMap<String, LoadNode>,
}

fn split_path(path: &str) -> Option<(&str, Option<&str>)> {
    let path = path.trim().trim_matches('.');
    if path.is_empty() {
        return None;
    }
    Some(match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    })
}

impl EagerLoader {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            nodes: IndexMap::new(),
        }
    }

    /// Add a relation path to load; dotted segments nest
    pub fn with(mut self, path: &str) -> Self {
        if let Some((head, rest)) = split_path(path) {
            let node = self.nodes.entry(head.to_string()).or_default();
            if let Some(rest) = rest {
                if !node.children.iter().any(|child| child == rest) {
                    node.children.push(rest.to_string());
                }
            }
        }
        self
    }

    pub fn with_all<I, S>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        paths.into_iter().fold(self, |loader, path| loader.with(path.as_ref()))
    }

    /// Add a path whose last relation's query is narrowed by `filter`
    pub fn with_filter<F>(self, path: &str, filter: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        self.with_query_filter(path, Arc::new(filter))
    }

    pub fn with_query_filter(mut self, path: &str, filter: QueryFilter) -> Self {
        self = self.with(path);
        if let Some((head, rest)) = split_path(path) {
            if let Some(node) = self.nodes.get_mut(head) {
                match rest {
                    Some(rest) => {
                        node.nested_filters.insert(rest.to_string(), filter);
                    }
                    None => node.filter = Some(filter),
                }
            }
        }
        self
    }

    /// Top-level relation names in load order
    pub fn relations(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resolve every configured relation on `records`, which must all be of
    /// the same model. Results land in each record's relation cache.
    pub async fn load(&self, conn: &dyn QueryExecutor, records: &mut [Record]) -> RelationResult<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let model = first.model().clone();

        for (name, node) in &self.nodes {
            let descriptor = self.registry.descriptor(&model.name, name)?;
            let relation = Relation::from_descriptor(&self.registry, descriptor)?;
            debug!(
                model = %model.name,
                relation = %name,
                kind = %relation.kind(),
                owners = records.len(),
                nested = node.children.len(),
                "eager loading relation"
            );
            relation.eager_load(conn, records, &node.options()).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for EagerLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes: Vec<(&String, &Vec<String>)> = self
            .nodes
            .iter()
            .map(|(name, node)| (name, &node.children))
            .collect();
        f.debug_struct("EagerLoader").field("nodes", &nodes).finish()
    }
}
