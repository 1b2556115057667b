use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use planwright_engine::{AssetLibrary, ContextAssembler, PackagingEngine, SessionService};
use planwright_store::DocumentStore;

use crate::handlers::{ai, artifacts, packages, sessions};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub body_limit_bytes: usize,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3001,
            request_timeout: Duration::from_secs(300),
            body_limit_bytes: 10 * 1024 * 1024,
            cors_origins: Vec::new(),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub assembler: Arc<ContextAssembler>,
    pub packaging: Arc<PackagingEngine>,
    pub library: AssetLibrary,
    pub documents: DocumentStore,
    pub started_at: Instant,
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::permissive().allow_origin(AllowOrigin::list(allowed))
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/api/health", get(sessions::health))
        .route("/api/sessions", post(sessions::create).get(sessions::list))
        .route("/api/sessions/{id}", get(sessions::get).delete(sessions::delete))
        .route("/api/sessions/{id}/archive", post(sessions::archive))
        .route("/api/sessions/{id}/progress", get(sessions::progress))
        .route(
            "/api/sessions/{id}/phases/{phase}/complete",
            post(sessions::complete_phase),
        )
        .route(
            "/api/sessions/{id}/phases/{phase}/checklists/{name}",
            post(sessions::record_checklist),
        )
        .route("/api/checklists/{name}/validate", post(sessions::validate_checklist))
        .route("/api/ai/chat", post(ai::chat))
        .route("/api/ai/generate-template", post(ai::generate_template))
        .route("/api/ai/suggestions", post(ai::suggestions))
        .route("/api/ai/status", get(ai::status))
        .route("/api/ai/sessions/{id}/files", get(artifacts::list))
        .route(
            "/api/ai/sessions/{id}/files/{filename}",
            get(artifacts::read).delete(artifacts::delete),
        )
        .route("/api/ai/sessions/{id}/context", get(artifacts::context))
        .route(
            "/api/generator/package/{session_id}",
            post(packages::build).delete(packages::cancel),
        )
        .route("/api/generator/preview/{session_id}", get(packages::preview))
        .route("/api/generator/download/{package_id}", get(packages::download))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown` fires. In-flight requests are allowed to
/// finish.
pub async fn start(
    config: ServerConfig,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(state, &config);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    info!(addr = %local_addr, "planwright server started");

    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await;
        if let Err(e) = result {
            warn!(error = %e, "server stopped with error");
        }
        info!("planwright server stopped");
    });

    Ok(ServerHandle {
        addr: local_addr,
        server,
    })
}

/// Handle returned by [`start`].
pub struct ServerHandle {
    pub addr: SocketAddr,
    server: JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait for the server task to exit after shutdown was requested.
    pub async fn wait(self) {
        let _ = self.server.await;
    }
}
