//! Parameterized SQL statement builder
//!
//! Every literal coming from a request becomes a `$n` placeholder; the
//! rendered [`Statement`] carries the parameter values in placeholder order.
//! Identifiers are always double-quoted.

use serde_json::Value as JsonValue;

use crate::filter::Predicate;

/// Rendered SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<JsonValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<JsonValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Statement kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// Request-scoped query description
#[derive(Debug, Clone)]
pub struct Query {
    kind: QueryKind,
    schema: Option<String>,
    table: String,
    fields: Vec<String>,
    filter: Predicate,
    limit: Option<u64>,
    offset: Option<u64>,
    values: Vec<(String, JsonValue)>,
    returning: bool,
}

impl Query {
    fn new(kind: QueryKind, table: &str) -> Self {
        Self {
            kind,
            schema: None,
            table: table.to_string(),
            fields: Vec::new(),
            filter: Predicate::Empty,
            limit: None,
            offset: None,
            values: Vec::new(),
            returning: false,
        }
    }

    pub fn select(table: &str) -> Self {
        Self::new(QueryKind::Select, table)
    }

    pub fn insert(table: &str) -> Self {
        Self::new(QueryKind::Insert, table)
    }

    pub fn update(table: &str) -> Self {
        Self::new(QueryKind::Update, table)
    }

    pub fn delete(table: &str) -> Self {
        Self::new(QueryKind::Delete, table)
    }

    #[must_use]
    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    /// Comma-separated projection; blank or `*` selects every column.
    #[must_use]
    pub fn fields(mut self, fields: &str) -> Self {
        let fields: Vec<String> = fields
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(ToString::to_string)
            .collect();

        self.fields = if fields.iter().any(|f| f == "*") {
            Vec::new()
        } else {
            fields
        };
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Predicate) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: Option<u64>) -> Self {
        self.offset = offset;
        self
    }

    /// Column/value pairs written by an insert or update
    #[must_use]
    pub fn values(mut self, values: Vec<(String, JsonValue)>) -> Self {
        self.values = values;
        self
    }

    #[must_use]
    pub fn returning(mut self, returning: bool) -> Self {
        self.returning = returning;
        self
    }

    /// Render to SQL text and parameters
    #[must_use]
    pub fn render(&self) -> Statement {
        let mut params = Vec::new();
        let sql = match self.kind {
            QueryKind::Select => self.render_select(&mut params),
            QueryKind::Insert => self.render_insert(&mut params),
            QueryKind::Update if self.values.is_empty() => self.render_lookup(&mut params),
            QueryKind::Update => self.render_update(&mut params),
            QueryKind::Delete => self.render_delete(&mut params),
        };
        Statement { sql, params }
    }

    fn table_ref(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.table)),
            None => quote_ident(&self.table),
        }
    }

    fn projection(&self) -> String {
        if self.fields.is_empty() {
            "*".to_string()
        } else {
            self.fields
                .iter()
                .map(|f| quote_ident(f))
                .collect::<Vec<_>>()
                .join(", ")
        }
    }

    fn push_where(&self, sql: &mut String, params: &mut Vec<JsonValue>) {
        if let Some(condition) = render_predicate(&self.filter, params) {
            sql.push_str(" WHERE ");
            sql.push_str(&condition);
        }
    }

    fn push_window(&self, sql: &mut String) {
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    }

    fn push_returning(&self, sql: &mut String) {
        if self.returning {
            sql.push_str(" RETURNING *");
        }
    }

    fn render_select(&self, params: &mut Vec<JsonValue>) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.projection(), self.table_ref());
        self.push_where(&mut sql, params);
        self.push_window(&mut sql);
        sql
    }

    // An update with nothing to set degrades to a lookup of the targeted rows.
    fn render_lookup(&self, params: &mut Vec<JsonValue>) -> String {
        let mut sql = format!("SELECT * FROM {}", self.table_ref());
        self.push_where(&mut sql, params);
        sql
    }

    fn render_insert(&self, params: &mut Vec<JsonValue>) -> String {
        let mut sql = if self.values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table_ref())
        } else {
            let columns: Vec<String> = self.values.iter().map(|(c, _)| quote_ident(c)).collect();
            let placeholders: Vec<String> = self
                .values
                .iter()
                .map(|(_, v)| bind(params, v.clone()))
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table_ref(),
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        self.push_returning(&mut sql);
        sql
    }

    fn render_update(&self, params: &mut Vec<JsonValue>) -> String {
        let assignments: Vec<String> = self
            .values
            .iter()
            .map(|(c, v)| format!("{} = {}", quote_ident(c), bind(params, v.clone())))
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.table_ref(),
            assignments.join(", ")
        );
        self.push_where(&mut sql, params);
        self.push_returning(&mut sql);
        sql
    }

    fn render_delete(&self, params: &mut Vec<JsonValue>) -> String {
        let table = self.table_ref();
        let mut sql = format!("DELETE FROM {table}");

        if self.limit.is_none() && self.offset.is_none() {
            self.push_where(&mut sql, params);
        } else {
            // Postgres DELETE has no LIMIT/OFFSET; window the row ids instead
            let mut inner = format!("SELECT ctid FROM {table}");
            self.push_where(&mut inner, params);
            self.push_window(&mut inner);
            sql.push_str(&format!(" WHERE ctid IN ({inner})"));
        }

        self.push_returning(&mut sql);
        sql
    }
}

/// Quote an identifier, doubling embedded quotes
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn bind(params: &mut Vec<JsonValue>, value: JsonValue) -> String {
    params.push(value);
    format!("${}", params.len())
}

/// Render a predicate, appending its literals to `params` in order.
/// Returns `None` for a predicate that matches everything.
fn render_predicate(predicate: &Predicate, params: &mut Vec<JsonValue>) -> Option<String> {
    match predicate {
        Predicate::Empty => None,
        Predicate::False => Some("FALSE".to_string()),
        Predicate::Compare { column, op, value } => Some(format!(
            "{} {} {}",
            quote_ident(column),
            op.as_sql(),
            bind(params, value.clone())
        )),
        Predicate::In { values, .. } if values.is_empty() => Some("FALSE".to_string()),
        Predicate::In { column, values } => {
            let placeholders: Vec<String> =
                values.iter().map(|v| bind(params, v.clone())).collect();
            Some(format!(
                "{} IN ({})",
                quote_ident(column),
                placeholders.join(", ")
            ))
        }
        Predicate::Null { column, negated } => Some(format!(
            "{} IS {}NULL",
            quote_ident(column),
            if *negated { "NOT " } else { "" }
        )),
        Predicate::And(left, right) => {
            let left = render_predicate(left, params);
            let right = render_predicate(right, params);
            match (left, right) {
                (Some(l), Some(r)) => Some(format!("({l}) AND ({r})")),
                (one, None) | (None, one) => one,
            }
        }
        Predicate::Or(left, right) => {
            // an unrestricted side drops the whole disjunction, bindings included
            let mark = params.len();
            let left = render_predicate(left, params);
            let right = render_predicate(right, params);
            match (left, right) {
                (Some(l), Some(r)) => Some(format!("({l}) OR ({r})")),
                _ => {
                    params.truncate(mark);
                    None
                }
            }
        }
    }
}
