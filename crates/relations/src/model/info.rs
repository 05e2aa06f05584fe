//! Model metadata: table, primary key and declared relations

use indexmap::IndexMap;

use crate::relations::metadata::RelationDescriptor;

/// Static description of one model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub table: String,
    pub primary_key: String,
    /// Discriminator stored by polymorphic relations pointing at this model
    pub morph_alias: Option<String>,
    pub relations: IndexMap<String, RelationDescriptor>,
}

impl ModelInfo {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: "id".to_string(),
            morph_alias: None,
            relations: IndexMap::new(),
        }
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn with_morph_alias(mut self, alias: impl Into<String>) -> Self {
        self.morph_alias = Some(alias.into());
        self
    }

    /// Declare a relation on this model
    pub fn relation(mut self, descriptor: RelationDescriptor) -> Self {
        let descriptor = descriptor.with_owner(&self.name);
        self.relations.insert(descriptor.name.clone(), descriptor);
        self
    }

    pub fn descriptor(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(name)
    }

    /// `table.primary_key`
    pub fn qualified_key(&self) -> String {
        format!("{}.{}", self.table, self.primary_key)
    }
}
