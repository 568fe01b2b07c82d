use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::dispatch::JobDispatcher;
use crate::http::routes::create_router;

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl HttpConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct HttpServer {
    config: HttpConfig,
    dispatcher: Arc<JobDispatcher>,
}

impl HttpServer {
    pub fn new(dispatcher: Arc<JobDispatcher>, config: HttpConfig) -> Self {
        Self { config, dispatcher }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Application router with every layer applied
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.dispatcher)).layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .into_inner(),
        )
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(&self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.addr()).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Serving dispatch API on http://{}", local_addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}
