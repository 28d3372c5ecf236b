//! Data REST API Service
//!
//! Exposes every table of one PostgreSQL schema as a JSON collection:
//! - `GET /{collection}` with `where`, `limit`, `offset` and `fields`
//! - `POST /{collection}` to create a document
//! - `GET`, `PUT` and `DELETE` on `/{collection}/{id}`
//!
//! Collections and their writable columns are looked up in the live catalog
//! on every request; all request values reach SQL as bound parameters.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod catalog;
pub mod executor;
pub mod filter;
pub mod handlers;
pub mod params;
pub mod postgres;
pub mod query;
pub mod rows;
pub mod server;

pub use backend::{Cell, Database, Reply, RowSet, ScriptedDatabase};
pub use executor::Executor;
pub use handlers::DataState;
pub use postgres::PgDatabase;
pub use server::{routes, DataServer};
