//! Application builder tying the container lifecycle to an [axum] application.
//!
//! [FaststackApp] wraps a [Router] and a [LifespanManager]. Every request going through the
//! resulting router runs inside a [ContainerContext](faststack_di::context::ContainerContext) with
//! the current [HttpConnection](context::HttpConnection) and the application container published,
//! and the container is torn down after the server stops.
//!
//! ```no_run
//! use axum::routing::get;
//! use faststack::app::AppBuilder;
//!
//! # async fn run() -> Result<(), faststack::app::AppError> {
//! AppBuilder::new()
//!     .build()
//!     .route("/", get(|| async { "Hello" }))
//!     .run()
//!     .await
//! # }
//! ```

pub mod context;
pub mod extract;
pub mod lifespan;

use crate::app::context::publish_request_context;
use crate::app::lifespan::{LifespanError, LifespanManager, LifespanPtr};
use crate::config::ApplicationConfig;
use crate::ioc::FaststackContainer;
use crate::logging::init_tracing;
use axum::extract::Request;
use axum::response::IntoResponse;
use axum::routing::{MethodRouter, Route};
use axum::Router;
use config::ConfigError;
use faststack_di::container::ContainerPtr;
use std::convert::Infallible;
use std::future::Future;
use std::net::{AddrParseError, SocketAddr};
use thiserror::Error;
use tokio::net::TcpListener;
use tower::{Layer, Service};
use tracing::{info, warn};

/// Errors related to bootstrapping servers.
#[derive(Error, Debug)]
pub enum ServerBootstrapError {
    #[error("Error parsing listen address: {0}")]
    ListenAddressParseError(AddrParseError),
    #[error("Error binding server: {0}")]
    BindError(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Error reading application config: {0}")]
    ConfigError(#[source] ConfigError),
    #[error(transparent)]
    ServerBootstrapError(#[from] ServerBootstrapError),
    #[error("Server error: {0}")]
    ServeError(#[source] std::io::Error),
    #[error(transparent)]
    LifespanError(#[from] LifespanError),
}

/// Builder for [FaststackApp].
#[derive(Default)]
pub struct AppBuilder {
    container: Option<ContainerPtr>,
    connected: Vec<ContainerPtr>,
    lifespan: Option<LifespanPtr>,
    router: Router,
}

impl AppBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Uses given container instead of the [global](FaststackContainer::global) one.
    pub fn with_container(mut self, container: ContainerPtr) -> Self {
        self.container = Some(container);
        self
    }

    /// Connects an additional container, which will be torn down together with the main one.
    pub fn connect_container(mut self, container: ContainerPtr) -> Self {
        self.connected.push(container);
        self
    }

    /// Sets custom startup/shutdown hooks, run around the server.
    pub fn with_lifespan(mut self, lifespan: LifespanPtr) -> Self {
        self.lifespan = Some(lifespan);
        self
    }

    /// Uses given router as the base for the application.
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn build(self) -> FaststackApp {
        let container = self
            .container
            .unwrap_or_else(|| FaststackContainer::global().clone() as ContainerPtr);

        if !self.connected.is_empty() {
            container.connect_containers(self.connected);
        }

        FaststackApp {
            router: self.router,
            lifespan: LifespanManager::new(self.lifespan, container),
        }
    }
}

/// Application ready to be served.
pub struct FaststackApp {
    router: Router,
    lifespan: LifespanManager,
}

impl FaststackApp {
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    /// See [Router::route].
    pub fn route(mut self, path: &str, method_router: MethodRouter) -> Self {
        self.router = self.router.route(path, method_router);
        self
    }

    /// See [Router::merge].
    pub fn merge<R: Into<Router>>(mut self, other: R) -> Self {
        self.router = self.router.merge(other);
        self
    }

    /// See [Router::layer]. Request context is published before any layer added here runs.
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<Route> + Clone + Send + 'static,
        L::Service: Service<Request> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.router = self.router.layer(layer);
        self
    }

    #[inline]
    pub fn container(&self) -> &ContainerPtr {
        self.lifespan.container()
    }

    /// Returns the final router, with request context middleware as the outermost layer. The
    /// lifespan is not run in this case, so the container needs to be torn down manually.
    pub fn into_router(self) -> Router {
        with_request_context(self.router, self.lifespan.container().clone())
    }

    /// Runs given server function inside the application lifespan: custom startup, server, custom
    /// shutdown, container teardown.
    pub async fn run_with<F, Fut>(self, serve: F) -> Result<Fut::Output, AppError>
    where
        F: FnOnce(Router) -> Fut,
        Fut: Future,
    {
        let router = with_request_context(self.router, self.lifespan.container().clone());
        self.lifespan
            .run(serve(router))
            .await
            .map_err(AppError::LifespanError)
    }

    /// Serves the application on given listener until the shutdown signal completes.
    pub async fn serve<S>(self, listener: TcpListener, shutdown: S) -> Result<(), AppError>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        self.run_with(|router| async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
        })
        .await?
        .map_err(AppError::ServeError)
    }

    /// Serves the application according to [ApplicationConfig], until Ctrl-C or SIGTERM.
    pub async fn run(self) -> Result<(), AppError> {
        let config = ApplicationConfig::init_from_environment().map_err(AppError::ConfigError)?;
        if config.install_tracing_logger {
            init_tracing();
        }

        let address: SocketAddr = config
            .server
            .listen_address
            .parse()
            .map_err(ServerBootstrapError::ListenAddressParseError)?;
        let listener = TcpListener::bind(address)
            .await
            .map_err(ServerBootstrapError::BindError)?;

        info!(%address, "Listening for connections.");

        self.serve(listener, shutdown_signal()).await
    }
}

fn with_request_context(router: Router, container: ContainerPtr) -> Router {
    router.layer(axum::middleware::from_fn_with_state(
        container,
        publish_request_context,
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "Cannot listen for Ctrl+C.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(%error, "Cannot listen for SIGTERM.");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down."),
        _ = terminate => info!("Received SIGTERM, shutting down."),
    }
}
