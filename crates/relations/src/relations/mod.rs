//! Relations Module - association strategies, pivot handling and eager loading

pub mod metadata;
pub mod traits;
pub mod types;
pub mod eager_loading;

// Strategies
pub mod has_one;
pub mod belongs_to;
pub mod has_many;
pub mod has_many_through;
pub mod belongs_to_many;
pub mod morph_one;
pub mod morph_many;
pub mod morph_to;

// Shared resolution machinery
pub mod pivot;
pub mod key_index;
pub(crate) mod binding;
pub(crate) mod hydration;
pub(crate) mod keyed;
mod one_to_one;

pub use metadata::*;
pub use traits::*;
pub use types::Relation;
pub use eager_loading::EagerLoader;

pub use has_one::HasOne;
pub use belongs_to::BelongsTo;
pub use has_many::HasMany;
pub use has_many_through::HasManyThrough;
pub use belongs_to_many::{AttachInput, Attached, BelongsToMany, SyncChanges, SyncEntry};
pub use morph_one::MorphOne;
pub use morph_many::MorphMany;
pub use morph_to::MorphTo;

pub use pivot::{split_pivot_row, PivotRecord};
pub use key_index::EagerBatchKeyIndex;
