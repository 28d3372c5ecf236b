//! REST API server implementation

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::dev::{Server, ServerHandle};
use actix_web::{middleware, web, App, HttpServer};
use parking_lot::Mutex;
use tracing::info;

use data_common::config::ServerConfig;
use data_common::error::Result;

use crate::backend::Database;
use crate::executor::Executor;
use crate::handlers::{self, DataState};

/// Collection REST server
pub struct DataServer {
    config: ServerConfig,
    state: web::Data<DataState>,
    handle: Mutex<Option<ServerHandle>>,
}

impl DataServer {
    pub fn new(config: &ServerConfig, db: Arc<dyn Database>) -> Self {
        let executor = Executor::new(db, config);
        Self {
            config: config.clone(),
            state: web::Data::new(DataState::new(executor)),
            handle: Mutex::new(None),
        }
    }

    /// Bind the listener and build the server. The stop handle is stored
    /// before this returns, so [`DataServer::stop`] works even if the
    /// returned future has not been polled yet. Await it to serve requests.
    pub fn start(&self) -> Result<Server> {
        let state = self.state.clone();
        let host = self.config.host.clone();
        let port = self.config.port;

        info!("Starting data REST API on {}:{}", host, port);
        info!("  Schema: {}", self.config.schema);

        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .wrap(Cors::permissive())
                .wrap(middleware::Logger::default())
                .configure(routes)
        })
        .workers(self.config.workers)
        .disable_signals()
        .bind((host.as_str(), port))?
        .run();

        *self.handle.lock() = Some(server.handle());
        Ok(server)
    }

    /// Stop accepting connections and let in-flight requests finish
    pub async fn stop(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.stop(true).await;
            info!("Data REST API stopped");
        }
    }
}

/// Route table; `/health` is registered ahead of the collection routes, so
/// a table named `health` is reachable only through `/health/{id}`.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health_handler))
        .route("/{collection}", web::get().to(handlers::read_handler))
        .route("/{collection}", web::post().to(handlers::create_handler))
        .route("/{collection}/{id}", web::get().to(handlers::find_handler))
        .route("/{collection}/{id}", web::put().to(handlers::update_handler))
        .route("/{collection}/{id}", web::delete().to(handlers::delete_handler))
        .default_service(web::route().to(handlers::not_found_handler));
}
