//! Database Backends
//!
//! `core` defines the executor contract; `postgres` and `memory` implement it.

pub mod core;
pub mod memory;
pub mod postgres;

use serde_json::Value;

pub use self::core::{QueryExecutor, Row};
pub use memory::MemoryDatabase;
pub use postgres::PgExecutor;

/// Build a row from a JSON object. Non-object values yield an empty row.
pub fn row_from_json(value: Value) -> Row {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => Row::new(),
    }
}
