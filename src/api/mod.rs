//! HTTP API module (spec.md §6).
//!
//! Single surface: `POST /complete`, `POST /stream`, `POST /auto-select`,
//! `GET /health`. Structured the same way as the teacher's
//! `CircuitBreakerApiServer`/`CircuitBreakerApiServerBuilder` pair — a
//! config-driven router builder with a fluent builder — generalized around
//! `OrchestratorCore` instead of `LLMRouter`/`CostOptimizer`.

pub mod handlers;
pub mod types;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::CoreConfig;
use crate::catalog::ProviderCatalog;
use crate::orchestrator::OrchestratorCore;
use std::sync::Arc;

/// API server configuration (spec.md §6).
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub port: u16,
    pub host: String,
    pub cors_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            cors_enabled: true,
        }
    }
}

/// The orchestration core's HTTP server.
pub struct OrchestratorApiServer {
    config: ApiConfig,
    core: OrchestratorCore,
}

impl OrchestratorApiServer {
    pub fn new(config: ApiConfig, core: OrchestratorCore) -> Self {
        Self { config, core }
    }

    pub fn create_router(&self) -> Router {
        let router = Router::new()
            .route("/complete", post(handlers::complete))
            .route("/stream", post(handlers::stream))
            .route("/auto-select", post(handlers::auto_select))
            .route("/health", get(handlers::health_check))
            .with_state(self.core.clone());

        if self.config.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.create_router();
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!("orchestration core listening on http://{}", addr);
        info!("  POST /complete");
        info!("  POST /stream");
        info!("  POST /auto-select");
        info!("  GET  /health");

        axum::Server::bind(&addr.parse()?)
            .serve(app.into_make_service())
            .await?;

        Ok(())
    }
}

/// Builder pattern for `OrchestratorApiServer`.
pub struct OrchestratorApiServerBuilder {
    config: ApiConfig,
    core_config: CoreConfig,
    catalog: Option<Arc<ProviderCatalog>>,
}

impl OrchestratorApiServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ApiConfig::default(),
            core_config: CoreConfig::default(),
            catalog: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn with_host(mut self, host: String) -> Self {
        self.config.host = host;
        self
    }

    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.config.cors_enabled = enabled;
        self
    }

    pub fn with_core_config(mut self, core_config: CoreConfig) -> Self {
        self.core_config = core_config;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<ProviderCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn build(self) -> OrchestratorApiServer {
        let catalog = self.catalog.unwrap_or_else(|| Arc::new(ProviderCatalog::new()));
        let core = OrchestratorCore::new(self.core_config, catalog);
        OrchestratorApiServer::new(self.config, core)
    }
}

impl Default for OrchestratorApiServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = OrchestratorApiServerBuilder::new().build();
        let app = server.create_router();

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method(Method::GET)
                    .uri("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn complete_with_no_providers_returns_422() {
        let server = OrchestratorApiServerBuilder::new().build();
        let app = server.create_router();

        let body = serde_json::json!({"prompt": "hello"}).to_string();
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method(Method::POST)
                    .uri("/complete")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn builder_applies_port_and_cors_overrides() {
        let server = OrchestratorApiServerBuilder::new()
            .with_port(9090)
            .with_cors(false)
            .build();
        assert_eq!(server.config.port, 9090);
        assert!(!server.config.cors_enabled);
    }
}
