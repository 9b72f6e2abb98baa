use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;

use shopkeep_core::UserId;
use shopkeep_events::{StatusEnvelope, StatusEvent};

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users))
        .route("/:id/block", post(block_user))
        .route("/:id/unblock", post(unblock_user))
}

pub async fn list_users(Extension(services): Extension<Arc<AppServices>>) -> Response {
    Json(services.users.list()).into_response()
}

pub async fn block_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    set_blocked(&services, &id, true)
}

pub async fn unblock_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    set_blocked(&services, &id, false)
}

fn set_blocked(services: &AppServices, raw_id: &str, blocked: bool) -> Response {
    let id: UserId = match errors::parse_id(raw_id, "user") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.users.set_blocked(id, blocked) {
        Ok(profile) => {
            let (event_type, verb) = if blocked {
                ("user.blocked", "blocked")
            } else {
                ("user.unblocked", "unblocked")
            };
            let event = StatusEvent::new(event_type, format!("User {} {verb}", profile.display_name()))
                .with_user(id);
            services.publish(StatusEnvelope::for_user(id, Utc::now(), event));
            Json(profile).into_response()
        }
        Err(e) => errors::user_error_to_response(e),
    }
}
