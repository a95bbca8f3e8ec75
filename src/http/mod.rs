//! Read-only HTTP API over the ledger, profiles and leaderboards.

pub mod auth;
pub mod handlers;
pub mod params;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::cache::{Leaderboard, ProfileResolver};
use crate::metrics::Metrics;
use crate::slack::ConnectionManager;
use crate::store::{SqliteStore, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub store: SqliteStore,
    pub profiles: Arc<ProfileResolver>,
    pub leaderboard: Arc<Leaderboard>,
    pub connection: Arc<ConnectionManager>,
    pub metrics: Metrics,
}

#[derive(Debug)]
pub enum HttpError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Store(StoreError),
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::BadRequest(msg) => write!(f, "{}", msg),
            HttpError::Unauthorized => write!(f, "Unauthorized"),
            HttpError::NotFound(msg) => write!(f, "{}", msg),
            HttpError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for HttpError {}

impl From<StoreError> for HttpError {
    fn from(err: StoreError) -> Self {
        HttpError::Store(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self {
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::Unauthorized => StatusCode::UNAUTHORIZED,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::Store(e) => {
                log::error!("❌ Database error while serving request: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

/// Build the full router. Routes under the bearer guard stay open when
/// `api_token` is `None` or empty.
pub fn router(state: AppState, api_token: Option<String>) -> Router {
    let token = api_token.filter(|t| !t.is_empty()).map(Arc::new);

    let protected = Router::new()
        .route("/api/given", get(handlers::given))
        .route("/api/received", get(handlers::received))
        .route("/api/user", get(handlers::user))
        .route("/api/users", get(handlers::users))
        .route("/api/stats/timeline", get(handlers::timeline))
        .route("/api/stats/quarterly", get(handlers::quarterly))
        .route("/api/stats/top", get(handlers::top))
        .route("/api/stats/heatmap", get(handlers::heatmap))
        .route("/api/stats/pairs", get(handlers::pairs))
        .route_layer(middleware::from_fn_with_state(token, auth::require_bearer));

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .route("/api/health", get(handlers::health))
        .route("/api/givers", get(handlers::givers))
        .route("/api/recipients", get(handlers::recipients))
        .merge(protected)
        .with_state(state)
}

/// Serve until `shutdown` fires, then drain in-flight requests.
pub async fn serve(listener: TcpListener, app: Router, shutdown: CancellationToken) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
