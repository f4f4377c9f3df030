//! HTTP module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. The replica is constructed and wired up by the caller
//! between `start()` and `serve()`.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use super::config::NetworkConfig;
use super::handlers::{
    count_handler, delete_handler, dequeue_handler, enqueue_handler, extend_release_handler,
    health_handler, items_handler, liveness_handler, peek_handler, peek_keys_handler,
    priority_count_handler, readiness_handler, AppState, JsonReplica,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;

/// Manages the `api/` HTTP server lifecycle for one partition replica.
///
/// 1. `new()` -- allocates the shutdown controller
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    replica: Arc<JsonReplica>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    #[must_use]
    pub fn new(config: NetworkConfig, replica: Arc<JsonReplica>) -> Self {
        Self {
            config,
            listener: None,
            replica,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router for the `api/` prefix.
    pub fn build_router(&self) -> Router {
        build_router(&self.config, Arc::clone(&self.replica), Arc::clone(&self.shutdown))
    }

    /// Binds the TCP listener. Returns the actual bound port (useful when
    /// the configured port is `0`, an OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!("api listener bound to {}:{}", self.config.host, port);
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let listener = self.listener.expect("start() must be called before serve()");
        let router = build_router(&self.config, Arc::clone(&self.replica), Arc::clone(&self.shutdown));

        self.shutdown.set_ready();
        info!("serving api/ requests");

        axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;

        self.shutdown.trigger_shutdown();
        let _ = self.shutdown.wait_for_drain(std::time::Duration::from_secs(30)).await;
        Ok(())
    }
}

fn build_router(config: &NetworkConfig, replica: Arc<JsonReplica>, shutdown: Arc<ShutdownController>) -> Router {
    let state = AppState {
        replica,
        shutdown,
        config: Arc::new(config.clone()),
        start_time: Instant::now(),
    };

    let api = Router::new()
        .route("/prioritycount", get(priority_count_handler))
        .route("/count", get(count_handler))
        .route("/", get(dequeue_handler))
        .route("/peek", get(peek_handler))
        .route("/peekkeys", get(peek_keys_handler))
        .route("/items", get(items_handler))
        .route("/{band}", post(enqueue_handler))
        .route("/", put(extend_release_handler))
        .route("/{key}", delete(delete_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .nest("/api", api)
        .layer(build_http_layers(config))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::PartitionConfig;
    use crate::health::OperationCounters;
    use crate::replica::PartitionReplica;
    use crate::store::memory::InMemoryStateStore;

    use super::*;

    fn test_replica() -> Arc<JsonReplica> {
        Arc::new(
            PartitionReplica::new(
                0,
                InMemoryStateStore::new(5),
                Arc::new(PartitionConfig::default()),
                Arc::new(OperationCounters::new()),
            )
            .unwrap(),
        )
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = NetworkModule::new(NetworkConfig::default(), test_replica());
        assert!(module.listener.is_none());
    }

    #[test]
    fn build_router_creates_router() {
        let module = NetworkModule::new(NetworkConfig::default(), test_replica());
        let _router = module.build_router();
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = NetworkModule::new(NetworkConfig::default(), test_replica());
        let port = module.start().await.expect("start should succeed");
        assert!(port > 0, "OS-assigned port should be > 0");
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    #[should_panic(expected = "start() must be called before serve()")]
    async fn serve_panics_without_start() {
        let module = NetworkModule::new(NetworkConfig::default(), test_replica());
        let _ = module.serve(std::future::pending::<()>()).await;
    }
}
