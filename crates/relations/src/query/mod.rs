//! Query Builder Module - structured queries shared by every backend

pub mod builder;
pub mod joins;
pub mod pagination;
pub mod select;
pub mod sql_generation;
pub mod types;
pub mod where_clause;

pub use builder::Query;
pub use pagination::Page;
pub use sql_generation::format_value;
pub use types::{
    Aggregate, ColumnRef, Condition, Field, HavingCondition, JoinClause, JoinType, Operator,
    OrderDirection, QueryType,
};
