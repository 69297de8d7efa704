use crate::greeting::GreetingRenderer;
use crate::initdata::InitDataValidator;
use crate::open::InProcessOpenTransport;
use crate::server::AppState;
use crate::webapp::InitDataProvider;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use std::sync::Arc;
use tracing::{info, warn};

/// Status `/api/open` answers for `raw_query`.
pub fn open_status(validator: Option<&InitDataValidator>, raw_query: &str) -> StatusCode {
    let Some(validator) = validator else {
        warn!("open called but no bot token is configured");
        return StatusCode::SERVICE_UNAVAILABLE;
    };
    match validator.validate(raw_query) {
        Ok(validated) => {
            match &validated.user {
                Some(user) => info!(
                    user_id = user.id,
                    username = ?user.username,
                    auth_date = ?validated.auth_date,
                    "mini app opened"
                ),
                None => info!(auth_date = ?validated.auth_date, "mini app opened without user"),
            }
            StatusCode::OK
        }
        Err(err) => {
            info!(%err, "rejected init data");
            StatusCode::UNAUTHORIZED
        }
    }
}

pub async fn open(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let status = open_status(state.validator.as_deref(), query.as_deref().unwrap_or_default());
    if status == StatusCode::UNAUTHORIZED {
        (status, "unauthorized").into_response()
    } else if status == StatusCode::SERVICE_UNAVAILABLE {
        (status, "bot token not configured").into_response()
    } else {
        status.into_response()
    }
}

/// Server-side rendered greeting page for the init data in the query string.
pub async fn render_app(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let init_data = query.unwrap_or_default();
    let shell = load_shell(&state).await;
    let renderer = GreetingRenderer::new(
        Arc::new(InitDataProvider::new(&init_data)),
        Arc::new(InProcessOpenTransport::new(state.validator.clone())),
    );
    match renderer.render_html(&shell) {
        Ok((html, _open)) => Html(html).into_response(),
        Err(err) => {
            warn!(%err, "failed to render greeting page");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn load_shell(state: &AppState) -> String {
    let path = state.config.index_path();
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => html,
        Err(_) => crate::sdk::default_shell_html(),
    }
}

pub async fn serve_script() -> impl IntoResponse {
    let mut resp = Response::new(crate::sdk::miniapp_script());
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/javascript"),
    );
    resp
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

pub async fn method_not_allowed() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}
