//! HTTP surface for running untrusted code in sandboxes
//!
//! Exposes `GET /languages` and `POST /run` over a shared [`CodeRunner`].
//! Input problems are answered with 400 before any sandbox exists; a
//! submission that compiles or runs with a non-zero exit code is still a 200,
//! with the step details in the body. Only orchestration failures are 5xx.

pub mod error;

pub use error::{Result, ServerError};

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::{middleware, Router};
use coderun_core::config::{ExecutionConfig, ServerSettings};
use coderun_core::{CodeRunner, ExecutionOutcome, Submission};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Body of `POST /run`. Both fields are optional so that missing values get
/// the dedicated error messages instead of a generic JSON rejection.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Configuration for the code runner server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Enable CORS
    pub enable_cors: bool,
    /// CORS allowed origins (if None, allows any origin)
    pub cors_origins: Option<Vec<String>>,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Enable request logging
    pub enable_logging: bool,
    /// Watchdog budget per submission; unlimited when None
    pub execution_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            enable_cors: true,
            cors_origins: None, // Allow any origin
            max_body_size: 1024 * 1024, // 1MB
            enable_logging: true,
            execution_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the server configuration from the loaded file sections.
    pub fn from_settings(server: &ServerSettings, execution: &ExecutionConfig) -> Result<Self> {
        let config = Self::new()
            .with_bind_addr_str(&server.bind_addr)?
            .with_cors(server.enable_cors)
            .with_max_body_size(server.max_body_size)
            .with_logging(server.enable_logging)
            .with_execution_timeout(execution.timeout_secs.map(Duration::from_secs));
        if server.cors_origins.is_empty() {
            Ok(config)
        } else {
            Ok(config.with_cors_origins(server.cors_origins.clone()))
        }
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address '{}': {}", addr, e)))?;
        Ok(self)
    }

    /// Enable or disable CORS.
    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    /// Set allowed CORS origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Set maximum request body size.
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Enable or disable request logging.
    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }

    /// Set the per-submission watchdog budget.
    pub fn with_execution_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.execution_timeout = timeout;
        self
    }
}

/// Shared application state containing the runner and configuration.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<CodeRunner>,
    pub config: ServerConfig,
}

/// Cancels a submission's token once its budget runs out; aborted on drop.
struct Watchdog {
    task: JoinHandle<()>,
}

impl Watchdog {
    fn arm(cancel: CancellationToken, budget: Duration) -> Self {
        let task = tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            log::warn!("Execution exceeded {:?}, cancelling", budget);
            cancel.cancel();
        });
        Self { task }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Handler for the /languages GET endpoint.
async fn languages_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "languages": app_state.runner.registry().ids()
    }))
}

/// Handler for the /run POST endpoint.
async fn run_handler(
    State(app_state): State<AppState>,
    payload: std::result::Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<ExecutionOutcome>> {
    let Json(request) = payload.map_err(|e| ServerError::invalid_request(e.body_text()))?;
    let submission = Submission::new(request.code, request.language, app_state.runner.registry())?;
    log::info!(
        "Running {} submission ({} bytes)",
        submission.language().id,
        submission.code().len()
    );

    let cancel = CancellationToken::new();
    // A dropped handler (client went away) cancels the run instead of
    // abandoning the sandbox.
    let _disconnect_guard = cancel.clone().drop_guard();
    let _watchdog = app_state
        .config
        .execution_timeout
        .map(|budget| Watchdog::arm(cancel.clone(), budget));

    // Run on its own task so teardown completes even if this future is dropped.
    let runner = app_state.runner.clone();
    let outcome = tokio::spawn(async move { runner.run(&submission, cancel).await })
        .await
        .map_err(|e| ServerError::internal(format!("Execution task failed: {}", e)))??;

    Ok(Json(outcome))
}

/// The code runner HTTP server.
pub struct CodeRunServer {
    runner: Arc<CodeRunner>,
    config: ServerConfig,
}

impl CodeRunServer {
    /// Create a new server with custom configuration.
    pub fn with_config(runner: CodeRunner, config: ServerConfig) -> Self {
        Self {
            runner: Arc::new(runner),
            config,
        }
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            runner: self.runner.clone(),
            config: self.config.clone(),
        };

        let mut router = Router::new()
            .route(
                "/health",
                get(|| async {
                    Json(HealthResponse {
                        status: "healthy".to_string(),
                        timestamp: chrono::Utc::now(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    })
                }),
            )
            .route("/languages", get(languages_handler))
            .route("/run", post(run_handler))
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(state);

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>,
                 next: axum::middleware::Next| async {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();

                    // Health probes are frequent; keep them out of info logs
                    if uri.path() == "/health" {
                        log::debug!("Request {} {} {}", request_id, method, uri);
                    } else {
                        log::info!("Request {} {} {}", request_id, method, uri);
                    }

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    let duration = start.elapsed();

                    log::info!(
                        "Response {} {} completed in {:?}",
                        request_id,
                        response.status(),
                        duration
                    );
                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors_layer = if let Some(ref origins) = self.config.cors_origins {
                let origins: std::result::Result<Vec<_>, _> =
                    origins.iter().map(|s| s.parse()).collect();
                match origins {
                    Ok(origins) => CorsLayer::new()
                        .allow_origin(origins)
                        .allow_methods(Any)
                        .allow_headers(Any),
                    Err(_) => {
                        log::warn!("Invalid CORS origin configured, allowing any origin");
                        CorsLayer::permissive()
                    }
                }
            } else {
                CorsLayer::permissive()
            };
            router = router.layer(cors_layer);
        }

        router
    }

    /// Start the server with graceful shutdown support.
    ///
    /// The server will shut down when the provided shutdown signal is received.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!("coderun server starting on {}", self.config.bind_addr);
        log::info!("Languages: http://{}/languages", self.config.bind_addr);
        log::info!("Run endpoint: http://{}/run", self.config.bind_addr);
        log::info!(
            "Registered languages: {}",
            self.runner.registry().ids().join(", ")
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("coderun server shut down gracefully");
        Ok(())
    }
}

/// Utility function to create a shutdown signal from Ctrl+C.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}

#[cfg(test)]
mod tests;
