//! Models: static metadata, the registry, and dynamic records

pub mod info;
pub mod record;
pub mod registry;

pub use info::ModelInfo;
pub use record::{Record, RelationValue};
pub use registry::{ModelRegistry, ModelRegistryBuilder};
