//! Query Builder JOIN operations

use super::builder::Query;
use super::types::*;

impl Query {
    /// Add INNER JOIN on `left = right`
    pub fn join(self, table: &str, left: &str, right: &str) -> Self {
        self.push_join(JoinType::Inner, table, None, left, right)
    }

    /// Add INNER JOIN with an alias for the joined table
    pub fn join_as(self, table: &str, alias: &str, left: &str, right: &str) -> Self {
        self.push_join(JoinType::Inner, table, Some(alias), left, right)
    }

    /// Add LEFT JOIN on `left = right`
    pub fn left_join(self, table: &str, left: &str, right: &str) -> Self {
        self.push_join(JoinType::Left, table, None, left, right)
    }

    /// Add LEFT JOIN with an alias for the joined table
    pub fn left_join_as(self, table: &str, alias: &str, left: &str, right: &str) -> Self {
        self.push_join(JoinType::Left, table, Some(alias), left, right)
    }

    /// Add a join with extra ON conditions beyond the key equality
    pub fn join_with(mut self, join_type: JoinType, table: &str, alias: Option<&str>, on: Vec<Condition>) -> Self {
        self.joins.push(JoinClause {
            join_type,
            table: table.to_string(),
            alias: alias.map(str::to_string),
            on,
        });
        self
    }

    fn push_join(self, join_type: JoinType, table: &str, alias: Option<&str>, left: &str, right: &str) -> Self {
        self.join_with(join_type, table, alias, vec![Condition::columns_eq(left, right)])
    }
}
