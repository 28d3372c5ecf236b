//! Live catalog introspection
//!
//! Every call goes to the database; nothing is cached between requests, so
//! tables created or dropped at runtime are visible immediately.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::debug;

use data_common::error::{Error, Result};
use data_common::types::Document;

use crate::backend::{Cell, Database};
use crate::query::Statement;

/// Reserved identity column, never writable through a document
pub const IDENTITY_COLUMN: &str = "id";

const TABLE_EXISTS_SQL: &str =
    "SELECT COUNT(*) FROM pg_catalog.pg_tables WHERE schemaname = $1 AND tablename = $2";

const COLUMNS_SQL: &str = "SELECT column_name::text AS column_name \
     FROM information_schema.columns \
     WHERE table_schema = $1 AND table_name = $2 AND column_name <> $3 \
     ORDER BY ordinal_position";

/// Catalog lookups scoped to one schema
#[derive(Clone)]
pub struct Catalog {
    db: Arc<dyn Database>,
    schema: String,
}

impl Catalog {
    pub fn new(db: Arc<dyn Database>, schema: &str) -> Self {
        Self {
            db,
            schema: schema.to_string(),
        }
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Whether a table with exactly this (case-sensitive) name exists
    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        let statement = Statement::new(
            TABLE_EXISTS_SQL,
            vec![
                JsonValue::String(self.schema.clone()),
                JsonValue::String(name.to_string()),
            ],
        );
        let result = self.db.query(&statement).await?;

        let count = match result.rows.first().and_then(|row| row.first()) {
            Some(Cell::Int(n)) => *n,
            Some(Cell::Null) | None => 0,
            Some(other) => {
                return Err(Error::Execution(format!(
                    "unexpected catalog count value: {other:?}"
                )))
            }
        };

        debug!(collection = name, exists = count > 0, "checked collection");
        Ok(count > 0)
    }

    /// Writable column names of a collection in ordinal order, identity excluded
    pub async fn legal_columns(&self, collection: &str) -> Result<Vec<String>> {
        let statement = Statement::new(
            COLUMNS_SQL,
            vec![
                JsonValue::String(self.schema.clone()),
                JsonValue::String(collection.to_string()),
                JsonValue::String(IDENTITY_COLUMN.to_string()),
            ],
        );
        let result = self.db.query(&statement).await?;

        result
            .rows
            .into_iter()
            .map(|row| match row.into_iter().next() {
                Some(Cell::Text(name)) => Ok(name),
                other => Err(Error::Execution(format!(
                    "unexpected catalog column value: {other:?}"
                ))),
            })
            .collect()
    }
}

/// Keep only the document entries whose key is a legal column.
///
/// Unknown keys are dropped silently; the result follows catalog order.
#[must_use]
pub fn retain_legal(document: &Document, columns: &[String]) -> Vec<(String, JsonValue)> {
    columns
        .iter()
        .filter_map(|column| {
            document
                .get(column)
                .map(|value| (column.clone(), value.clone()))
        })
        .collect()
}
