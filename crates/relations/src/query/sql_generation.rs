//! Query Builder SQL generation
//!
//! Renders [`Query`] as PostgreSQL. Parameterized output uses `$n`
//! placeholders; `to_sql` inlines literals and is meant for logging and
//! for the relation-existence subqueries handed to callers.

use serde_json::Value;

use super::builder::Query;
use super::types::*;

/// Accumulates SQL text and bound parameters
struct SqlWriter {
    sql: String,
    params: Vec<Value>,
    inline: bool,
}

impl SqlWriter {
    fn new(inline: bool) -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
            inline,
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn bind(&mut self, value: &Value) {
        if self.inline {
            self.sql.push_str(&format_value(value));
        } else {
            self.params.push(value.clone());
            self.sql.push_str(&format!("${}", self.params.len()));
        }
    }

    fn finish(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }
}

impl Query {
    /// Generate SQL with parameter placeholders and return the parameters
    pub fn to_sql_with_params(&self) -> (String, Vec<Value>) {
        let mut writer = SqlWriter::new(false);
        self.write_statement(&mut writer);
        writer.finish()
    }

    /// Generate SQL with literal values inlined
    pub fn to_sql(&self) -> String {
        let mut writer = SqlWriter::new(true);
        self.write_statement(&mut writer);
        writer.finish().0
    }

    /// `SELECT <aggregate> AS aggregate` over this query's rows.
    /// Grouped queries are wrapped so that COUNT counts groups.
    pub fn aggregate_sql_with_params(&self, aggregate: &Aggregate) -> (String, Vec<Value>) {
        let mut writer = SqlWriter::new(false);
        self.write_aggregate(&mut writer, aggregate);
        writer.finish()
    }

    /// Inline variant of [`aggregate_sql_with_params`](Self::aggregate_sql_with_params)
    pub fn aggregate_sql(&self, aggregate: &Aggregate) -> String {
        let mut writer = SqlWriter::new(true);
        self.write_aggregate(&mut writer, aggregate);
        writer.finish().0
    }

    fn write_statement(&self, w: &mut SqlWriter) {
        match self.query_type {
            QueryType::Select => self.write_select(w),
            QueryType::Insert => self.write_insert(w),
            QueryType::Update => self.write_update(w),
            QueryType::Delete => self.write_delete(w),
        }
    }

    fn write_aggregate(&self, w: &mut SqlWriter, aggregate: &Aggregate) {
        if self.group_by.is_empty() {
            w.push(&format!("SELECT {} AS aggregate", aggregate));
            self.write_from(w);
            self.write_where(w);
        } else {
            let inner = self.clone().without_paging();
            w.push(&format!("SELECT {} AS aggregate FROM (", aggregate));
            inner.write_select(w);
            w.push(") AS aggregate_source");
        }
    }

    fn write_select(&self, w: &mut SqlWriter) {
        w.push(if self.distinct { "SELECT DISTINCT " } else { "SELECT " });

        if self.fields.is_empty() {
            w.push("*");
        } else {
            let fields: Vec<String> = self
                .fields
                .iter()
                .map(|field| match &field.alias {
                    Some(alias) => format!("{} AS {}", field.column, alias),
                    None => field.column.to_string(),
                })
                .collect();
            w.push(&fields.join(", "));
        }

        self.write_from(w);
        self.write_where(w);

        if !self.group_by.is_empty() {
            let columns: Vec<String> = self.group_by.iter().map(ToString::to_string).collect();
            w.push(&format!(" GROUP BY {}", columns.join(", ")));
        }

        if !self.having.is_empty() {
            w.push(" HAVING ");
            for (i, having) in self.having.iter().enumerate() {
                if i > 0 {
                    w.push(" AND ");
                }
                w.push(&format!("{} {} ", having.aggregate, having.operator));
                w.bind(&having.value);
            }
        }

        if !self.order_by.is_empty() {
            let clauses: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, direction)| format!("{} {}", column, direction))
                .collect();
            w.push(&format!(" ORDER BY {}", clauses.join(", ")));
        }

        if let Some(limit) = self.limit_count {
            w.push(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset_value {
            w.push(&format!(" OFFSET {}", offset));
        }
    }

    fn write_from(&self, w: &mut SqlWriter) {
        w.push(&format!(" FROM {}", self.table));
        if let Some(alias) = &self.alias {
            w.push(&format!(" AS {}", alias));
        }

        for join in &self.joins {
            w.push(&format!(" {} {}", join.join_type, join.table));
            if let Some(alias) = &join.alias {
                w.push(&format!(" AS {}", alias));
            }
            w.push(" ON ");
            write_conditions(w, &join.on);
        }
    }

    fn write_where(&self, w: &mut SqlWriter) {
        if !self.conditions.is_empty() {
            w.push(" WHERE ");
            write_conditions(w, &self.conditions);
        }
    }

    fn write_insert(&self, w: &mut SqlWriter) {
        let columns: Vec<&str> = self.values.keys().map(String::as_str).collect();
        w.push(&format!("INSERT INTO {} ({}) VALUES (", self.table, columns.join(", ")));
        for (i, value) in self.values.values().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.bind(value);
        }
        w.push(")");

        if !self.conflict_columns.is_empty() {
            w.push(&format!(" ON CONFLICT ({})", self.conflict_columns.join(", ")));
            let updates: Vec<String> = self
                .values
                .keys()
                .filter(|column| !self.conflict_columns.contains(column))
                .map(|column| format!("{} = EXCLUDED.{}", column, column))
                .collect();
            if updates.is_empty() {
                w.push(" DO NOTHING");
            } else {
                w.push(&format!(" DO UPDATE SET {}", updates.join(", ")));
            }
        }
    }

    fn write_update(&self, w: &mut SqlWriter) {
        w.push(&format!("UPDATE {} SET ", self.table));
        for (i, (column, value)) in self.values.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push(&format!("{} = ", column));
            w.bind(value);
        }
        self.write_where(w);
    }

    fn write_delete(&self, w: &mut SqlWriter) {
        w.push(&format!("DELETE FROM {}", self.table));
        self.write_where(w);
    }
}

fn write_conditions(w: &mut SqlWriter, conditions: &[Condition]) {
    for (i, condition) in conditions.iter().enumerate() {
        if i > 0 {
            w.push(" AND ");
        }
        match condition {
            Condition::Compare {
                column,
                operator,
                value,
            } => {
                if value.is_null() {
                    match operator {
                        Operator::NotEqual => w.push(&format!("{} IS NOT NULL", column)),
                        _ => w.push(&format!("{} IS NULL", column)),
                    }
                } else {
                    w.push(&format!("{} {} ", column, operator));
                    w.bind(value);
                }
            }
            Condition::In {
                column,
                values,
                negated,
            } => {
                if values.is_empty() {
                    // IN () is invalid SQL
                    w.push(if *negated { "1 = 1" } else { "1 = 0" });
                    continue;
                }
                w.push(&format!("{} {} (", column, if *negated { "NOT IN" } else { "IN" }));
                for (j, value) in values.iter().enumerate() {
                    if j > 0 {
                        w.push(", ");
                    }
                    w.bind(value);
                }
                w.push(")");
            }
            Condition::Null { column, negated } => {
                w.push(&format!("{} IS {}NULL", column, if *negated { "NOT " } else { "" }));
            }
            Condition::Columns {
                left,
                operator,
                right,
            } => w.push(&format!("{} {} {}", left, operator, right)),
            Condition::Raw(raw) => w.push(&format!("({})", raw)),
        }
    }
}

/// Format a value as a SQL literal
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Array(_) | Value::Object(_) => {
            format!("'{}'", value.to_string().replace('\'', "''"))
        }
    }
}
