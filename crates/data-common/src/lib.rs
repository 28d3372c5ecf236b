//! Data Service Common Types and Utilities
//!
//! Shared error taxonomy, configuration, and API error bodies for the
//! generic table REST service.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod types;

pub use config::DataConfig;
pub use error::{Error, Result};
