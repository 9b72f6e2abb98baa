//! Bot operational controls and the inbound message endpoint.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;

use shopkeep_bot::{BotStatus, Inbound};

use crate::app::dto;
use crate::app::services::AppServices;

const DEFAULT_OUTBOX_LIMIT: usize = 50;

pub fn router() -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/updates", post(update))
        .route("/outbox", get(outbox))
}

fn status_body(status: BotStatus) -> Response {
    Json(json!({ "status": status })).into_response()
}

pub async fn status(Extension(services): Extension<Arc<AppServices>>) -> Response {
    status_body(services.gateway.status())
}

pub async fn start(Extension(services): Extension<Arc<AppServices>>) -> Response {
    status_body(services.gateway.start(Utc::now()))
}

pub async fn stop(Extension(services): Extension<Arc<AppServices>>) -> Response {
    status_body(services.gateway.stop(Utc::now()))
}

/// POST /bot/updates
///
/// One inbound chat message. Always 200: command failures are part of the
/// reply (`failure` field), not HTTP errors.
pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Json(message): Json<Inbound>,
) -> Response {
    let reply = services.gateway.handle(message).await;
    Json(reply).into_response()
}

/// GET /bot/outbox?limit=N
///
/// Notifications sent to users, newest first.
pub async fn outbox(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::LimitQuery>,
) -> Response {
    Json(services.outbox.recent(query.or(DEFAULT_OUTBOX_LIMIT))).into_response()
}
