//! REST data service for `LumaDB`
//!
//! Serves the tables of one PostgreSQL schema as JSON collections with
//! filtering, pagination and single-document CRUD.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub use data_common as common;
pub use data_rest as rest;

use std::sync::Arc;
use tracing::info;

use actix_web::dev::Server;

use data_common::config::DataConfig;
use data_common::error::Result;
use data_rest::{DataServer, PgDatabase};

/// Data service: connection pool plus HTTP server
pub struct DataService {
    config: DataConfig,
    database: Arc<PgDatabase>,
    server: DataServer,
}

impl DataService {
    /// Connect to the database and prepare the HTTP server
    ///
    /// # Errors
    /// Returns an error if the pool cannot be built or the database does not answer.
    pub async fn new(config: DataConfig) -> Result<Self> {
        info!("Initializing data service");

        let database = Arc::new(PgDatabase::connect(&config.database).await?);
        let server = DataServer::new(&config.server, database.clone());

        Ok(Self {
            config,
            database,
            server,
        })
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    /// Bind the listener. The returned server runs until it is awaited to
    /// completion; [`DataService::shutdown`] may be called at any point after
    /// this returns.
    ///
    /// # Errors
    /// Returns an error if the listener cannot be bound.
    pub fn start(&self) -> Result<Server> {
        info!(
            "  - REST service: http://{}:{}",
            self.config.server.host, self.config.server.port
        );
        self.server.start()
    }

    /// Stop the server and close the pool
    ///
    /// # Errors
    /// Currently infallible.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down data service");
        self.server.stop().await;
        self.database.close();
        Ok(())
    }
}
