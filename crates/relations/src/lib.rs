//! # elif-relations: relation resolution for elif-orm
//!
//! Turns declared associations between models into batched queries and
//! attaches the results to the records that asked for them.
//!
//! Supported kinds: `HasOne`, `BelongsTo`, `HasMany`, `HasManyThrough`,
//! `BelongsToMany` (pivot table), `MorphOne`, `MorphMany` and `MorphTo`.
//! Eager loading issues a fixed number of queries per relation regardless of
//! how many owners are loaded.
//!
//! Queries are built as structured [`Query`] values and executed through a
//! [`QueryExecutor`]; [`PgExecutor`] runs them on PostgreSQL and
//! [`MemoryDatabase`] evaluates them in process.

pub mod backends;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod relations;
pub mod value;

pub use backends::{row_from_json, MemoryDatabase, PgExecutor, QueryExecutor, Row};
pub use config::{MorphFallback, RelationConfig};
pub use error::{RelationError, RelationResult};
pub use model::{ModelInfo, ModelRegistry, ModelRegistryBuilder, Record, RelationValue};
pub use query::{Aggregate, Condition, Operator, OrderDirection, Page, Query};
pub use relations::{
    query_filter, AttachInput, Attached, BoundAttribute, EagerLoader, LoadOptions, PivotConfig,
    PivotRecord, PolymorphicConfig, QueryFilter, Relation, RelationDescriptor, RelationKind,
    RelationStrategy, SyncChanges, SyncEntry, ThroughConfig,
};
