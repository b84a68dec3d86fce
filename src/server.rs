use crate::config::AppConfig;
use crate::handlers;
use crate::observability::{self, RouteMetrics};
use crate::store::ItemStore;
use axum::Router;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{Response, StatusCode};
use axum::middleware;
use axum::routing::get;
use http::header::CONTENT_TYPE;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

const METRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: ItemStore,
    pub metrics: Option<Arc<RouteMetrics>>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: ItemStore) -> Self {
        let metrics_enabled = config
            .observability
            .as_ref()
            .is_some_and(|observability| observability.metrics.enabled);

        Self {
            metrics: metrics_enabled.then(|| Arc::new(RouteMetrics::new())),
            config,
            store,
        }
    }
}

pub fn build_app(config: Arc<AppConfig>) -> Router {
    build_app_with_store(config, ItemStore::new())
}

pub fn build_app_with_store(config: Arc<AppConfig>, store: ItemStore) -> Router {
    let state = AppState::new(config, store);
    let upload_limit = state.config.upload.max_bytes;

    let mut router = Router::new()
        .route("/", get(handlers::index).post(handlers::upload_avatar))
        .route("/test", get(handlers::list_items).post(handlers::push_item))
        .route(
            "/user",
            get(handlers::get_user).post(handlers::normalize_user),
        )
        .route("/user/auth", get(handlers::get_user_auth))
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route("/persist/", get(handlers::persist_cookie))
        .route("/persist/return", get(handlers::return_cookie))
        .route("/api/content", get(handlers::api_content));

    if state.metrics.is_some()
        && let Some(observability) = &state.config.observability
    {
        router = router.route(&observability.metrics.path, get(metrics_handler));
    }

    router
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            observability::track_request,
        ))
        .with_state(state)
}

pub async fn run_server(config: Arc<AppConfig>) -> Result<(), String> {
    let listen_addr: SocketAddr = config
        .listen
        .parse()
        .map_err(|err| format!("invalid listen address `{}`: {err}", config.listen))?;
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|err| format!("failed to bind `{listen_addr}`: {err}"))?;

    let app = build_app(config);
    info!(listen = %listen_addr, "running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| format!("server error: {err}"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

async fn metrics_handler(State(state): State<AppState>) -> Response<Body> {
    let Some(encoded) = state.metrics.as_ref().map(|metrics| metrics.encode()) else {
        return json_error(StatusCode::NOT_FOUND, "route_not_found");
    };

    let mut response = Response::new(Body::from(encoded));
    response.headers_mut().insert(
        CONTENT_TYPE,
        http::HeaderValue::from_static(METRICS_CONTENT_TYPE),
    );
    response
}

async fn not_found_handler() -> Response<Body> {
    json_error(StatusCode::NOT_FOUND, "route_not_found")
}

fn json_error(status: StatusCode, code: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(format!(r#"{{"error":"{code}"}}"#)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}
