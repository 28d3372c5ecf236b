//! Database seam
//!
//! The executor only needs to run a parameterized [`Statement`] and get a
//! tabular result (or an affected-row count) back. [`crate::postgres`]
//! provides the production implementation; [`ScriptedDatabase`] replays
//! canned results for tests and local development.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use data_common::error::{Error, Result};

use crate::query::Statement;

/// A single decoded column value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
    /// One-dimensional array, elements decoded like top-level cells
    Array(Vec<Cell>),
}

/// Tabular statement result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// Column names in select order
    pub columns: Vec<String>,
    /// One entry per row, aligned with `columns`
    pub rows: Vec<Vec<Cell>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { columns, rows }
    }

    /// Single-cell result as produced by `SELECT COUNT(*)`
    pub fn count(n: i64) -> Self {
        Self::new(vec!["count".to_string()], vec![vec![Cell::Int(n)]])
    }

    /// Single text column, one row per value
    pub fn column<S: AsRef<str>>(name: &str, values: &[S]) -> Self {
        Self::new(
            vec![name.to_string()],
            values
                .iter()
                .map(|v| vec![Cell::Text(v.as_ref().to_string())])
                .collect(),
        )
    }
}

/// Statement execution contract
#[async_trait]
pub trait Database: Send + Sync {
    /// Run a statement that yields rows
    async fn query(&self, statement: &Statement) -> Result<RowSet>;

    /// Run a statement and report the number of affected rows
    async fn execute(&self, statement: &Statement) -> Result<u64>;
}

/// Canned reply for [`ScriptedDatabase`]
#[derive(Debug, Clone)]
pub enum Reply {
    Rows(RowSet),
    Affected(u64),
    Fail(String),
}

/// Database double that answers statements from a FIFO script and
/// records every statement it receives.
#[derive(Default)]
pub struct ScriptedDatabase {
    replies: Mutex<VecDeque<Reply>>,
    log: Mutex<Vec<Statement>>,
}

impl ScriptedDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply
    #[must_use]
    pub fn reply(self, reply: Reply) -> Self {
        self.replies.lock().push_back(reply);
        self
    }

    /// Queue a row-set reply
    #[must_use]
    pub fn rows(self, rows: RowSet) -> Self {
        self.reply(Reply::Rows(rows))
    }

    /// Statements received so far
    pub fn statements(&self) -> Vec<Statement> {
        self.log.lock().clone()
    }

    /// Replies not yet consumed
    pub fn pending(&self) -> usize {
        self.replies.lock().len()
    }

    fn next(&self, statement: &Statement) -> Result<Reply> {
        self.log.lock().push(statement.clone());
        self.replies.lock().pop_front().ok_or_else(|| {
            Error::Execution(format!("no scripted reply for: {}", statement.sql))
        })
    }
}

#[async_trait]
impl Database for ScriptedDatabase {
    async fn query(&self, statement: &Statement) -> Result<RowSet> {
        match self.next(statement)? {
            Reply::Rows(rows) => Ok(rows),
            Reply::Fail(message) => Err(Error::Execution(message)),
            other @ Reply::Affected(_) => Err(Error::Execution(format!(
                "expected rows, script had {other:?}"
            ))),
        }
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        match self.next(statement)? {
            Reply::Affected(n) => Ok(n),
            Reply::Rows(rows) => Ok(rows.rows.len() as u64),
            Reply::Fail(message) => Err(Error::Execution(message)),
        }
    }
}
