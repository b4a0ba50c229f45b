use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::signal;

use crate::{
    app::App,
    search::SearchInput,
    types::SearchOutcome,
    vault::{CacheState, VaultError},
};

type SharedState = Arc<App>;

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/api/search", post(search))
        .route("/api/cache", get(cache_status))
        .route("/api/cache/refresh", post(cache_refresh))
        .route("/api/cache/rebuild", post(cache_rebuild))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(app)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

pub async fn start_daemon(addr: &str, app: App) -> anyhow::Result<()> {
    let app = Arc::new(app);

    // searches are served from whatever is cached so far
    app.spawn_cache_build();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!(
        "listening on {addr} vault={} mode={:?}",
        app.config.vault.root.display(),
        app.config.search.mode
    );

    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

#[derive(Debug)]
struct HttpError(VaultError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            VaultError::NotFound(_) => StatusCode::NOT_FOUND,
            VaultError::Io(_) | VaultError::Other(_) => {
                log::error!("{self:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl From<VaultError> for HttpError {
    fn from(value: VaultError) -> Self {
        HttpError(value)
    }
}

async fn search(
    State(state): State<SharedState>,
    Json(input): Json<SearchInput>,
) -> Json<SearchOutcome> {
    Json(state.router.search(input).await)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheStatus {
    pub state: CacheState,
    pub ready: bool,
    pub building: bool,
    pub entries: usize,
}

async fn cache_status(State(state): State<SharedState>) -> Json<CacheStatus> {
    let cache_state = state.cache.state();
    Json(CacheStatus {
        state: cache_state,
        ready: cache_state == CacheState::Ready,
        building: cache_state == CacheState::Building,
        entries: state.cache.len(),
    })
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    path: String,
}

async fn cache_refresh(
    State(state): State<SharedState>,
    Json(request): Json<RefreshRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let cached = state.cache.refresh_entry(&request.path).await?;
    Ok(Json(json!({"path": request.path, "cached": cached})))
}

async fn cache_rebuild(State(state): State<SharedState>) -> impl IntoResponse {
    if state.cache.is_building() {
        return (StatusCode::CONFLICT, Json(json!({"started": false})));
    }

    state.router.invalidate_caches();
    state.spawn_cache_build();
    (StatusCode::ACCEPTED, Json(json!({"started": true})))
}
