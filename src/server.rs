use crate::api;
use crate::config::AppConfig;
use crate::initdata::InitDataValidator;
use crate::shutdown;
use axum::Router;
use axum::handler::HandlerWithoutStateExt;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub validator: Option<Arc<InitDataValidator>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let validator = config
            .bot_token
            .as_deref()
            .map(|token| Arc::new(InitDataValidator::new(token, config.init_data_max_age)));
        Self {
            config: Arc::new(config),
            validator,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config.static_root)
        .precompressed_br()
        .not_found_service(api::not_found.into_service());

    let config = state.config.clone();
    let router = Router::new()
        .route("/api/open", get(api::open))
        .route("/app", get(api::render_app))
        .route("/miniapp.js", get(api::serve_script))
        .fallback_service(static_files)
        .method_not_allowed_fallback(api::method_not_allowed)
        .with_state(state);
    apply_middleware(router, &config)
}

fn apply_middleware(router: Router, config: &AppConfig) -> Router {
    let mut router = router.layer(CatchPanicLayer::custom(handle_panic));
    if config.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }
    router.layer(TraceLayer::new_for_http())
}

fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!(%detail, "request handler panicked");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
}

/// Serves until `shutdown` flips, then drains connections for at most
/// `config.shutdown_grace`.
pub async fn run(
    listener: TcpListener,
    state: AppState,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let grace = state.config.shutdown_grace;
    let router = build_router(state);
    info!(addr = %listener.local_addr()?, "server started");

    let server = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown::requested(shutdown.clone()))
        .into_future();

    tokio::select! {
        res = server => res.map_err(|e| anyhow::anyhow!(e))?,
        _ = async {
            shutdown::requested(shutdown).await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(?grace, "graceful shutdown timed out; dropping open connections");
        }
    }
    info!("server stopped");
    Ok(())
}
