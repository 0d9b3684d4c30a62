//! Route handlers for the monitor's HTTP surface.

use std::net::SocketAddr;

use askama::Template;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::{routing::get, Router};
use tracing::{debug, error};

use super::state::AppState;
use crate::monitor::Health;

pub fn monitor_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/health", get(health))
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate<'a> {
    version: &'a str,
    endpoint: &'a str,
}

/// Caller address as recorded by the listener, if any. Routers driven without
/// connect info (tests, embedding) simply log an unknown source.
fn source_addr(request: &Request) -> Option<SocketAddr> {
    let addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    if addr.is_none() {
        debug!("remote address unavailable");
    }
    addr
}

async fn status(State(state): State<AppState>, request: Request) -> Response {
    let report = state.monitor.status(source_addr(&request)).await;
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        report.body,
    )
        .into_response()
}

async fn health(State(state): State<AppState>, request: Request) -> Response {
    let code = match state.monitor.health(source_addr(&request)).await {
        Health::Healthy => StatusCode::OK,
        Health::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = if code.is_success() { "ok\n" } else { "unavailable\n" };
    (code, [(header::CACHE_CONTROL, "no-store")], body).into_response()
}

async fn index(State(state): State<AppState>) -> Response {
    let page = IndexTemplate {
        version: state.monitor.telemetry().version(),
        endpoint: state.monitor.endpoint(),
    };
    match page.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "failed to render landing page");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}
