//! HTTP server assembly.
//!
//! Both daemons build their routers through this builder so they share
//! one middleware stack: request tracing, gzip compression, and CORS.

use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Enable CORS.
    pub cors_enabled: bool,
    /// Enable request tracing.
    pub tracing_enabled: bool,
    /// Enable gzip compression.
    pub compression_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            cors_enabled: true,
            tracing_enabled: true,
            compression_enabled: true,
        }
    }
}

impl ServerConfig {
    /// Config bound to a specific port on all interfaces.
    #[must_use]
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            ..Default::default()
        }
    }
}

/// Router builder with the house middleware stack.
pub struct ServerBuilder {
    config: ServerConfig,
    router: Router,
}

impl ServerBuilder {
    /// Builder with default config and an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            router: Router::new(),
        }
    }

    /// Builder with explicit config.
    #[must_use]
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
        }
    }

    /// Set the router.
    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Bind to a port on all interfaces.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.bind_addr = SocketAddr::from(([0, 0, 0, 0], port));
        self
    }

    /// Apply the configured middleware and return the router.
    #[must_use]
    pub fn build(self) -> Router {
        let mut router = self.router;
        if self.config.tracing_enabled {
            router = router.layer(TraceLayer::new_for_http());
        }
        if self.config.compression_enabled {
            router = router.layer(CompressionLayer::new());
        }
        if self.config.cors_enabled {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }
        router
    }

    /// Bind, serve, and drain gracefully when `shutdown_signal` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn run_with_shutdown<F>(self, shutdown_signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.bind_addr;
        let router = self.build();

        info!("Starting server on {addr}");
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => warn!("Received Ctrl+C, shutting down"),
        () = terminate => warn!("Received terminate signal, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.cors_enabled);
    }

    #[test]
    fn config_with_port() {
        assert_eq!(ServerConfig::with_port(8081).bind_addr.port(), 8081);
    }

    #[test]
    fn builder_applies_port() {
        let builder = ServerBuilder::new().port(9000);
        assert_eq!(builder.config.bind_addr.port(), 9000);
    }

    #[test]
    fn builder_with_router_builds() {
        let router = Router::new().route("/health", get(|| async { "ok" }));
        let _app = ServerBuilder::new().router(router).build();
    }
}
