//! Operator dashboard: counters, live status feed, recent events.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    response::{
        IntoResponse, Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
    routing::get,
};
use serde_json::json;
use tokio_stream::{Stream, StreamExt};

use shopkeep_events::{EventBus, StatusCategory, StatusEnvelope, SubscriptionError};

use crate::app::dto::{self, StatusEventView};
use crate::app::services::AppServices;

const DEFAULT_LOG_LIMIT: usize = 50;

pub fn router() -> Router {
    Router::new()
        .route("/snapshot", get(snapshot))
        .route("/events", get(stream_events))
        .route("/logs", get(logs))
}

/// GET /dashboard/snapshot
pub async fn snapshot(Extension(services): Extension<Arc<AppServices>>) -> Response {
    Json(services.snapshot()).into_response()
}

/// GET /dashboard/logs?limit=N
///
/// Most recent status events, newest first.
pub async fn logs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::LimitQuery>,
) -> Response {
    let events: Vec<StatusEventView> = services
        .event_log
        .recent(query.or(DEFAULT_LOG_LIMIT))
        .iter()
        .map(StatusEventView::from)
        .collect();
    Json(events).into_response()
}

/// GET /dashboard/events
///
/// Server-Sent Events feed of status events. Event names are the status
/// category (`order`, `user`, `system`). A subscriber that falls behind gets
/// an `overrun` event carrying how many events it missed, then the feed resumes.
/// When the broadcaster shuts down the feed sends a `closed` event and ends.
pub async fn stream_events(
    Extension(services): Extension<Arc<AppServices>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = services
        .bus
        .subscribe()
        .into_stream()
        .map(|item| Ok::<_, Infallible>(to_sse(item)));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn to_sse(item: Result<StatusEnvelope, SubscriptionError>) -> SseEvent {
    match item {
        Ok(envelope) => {
            let view = StatusEventView::from(&envelope);
            let data = serde_json::to_string(&view).unwrap_or_else(|_| "{}".to_string());
            let name = match view.category {
                StatusCategory::Order => "order",
                StatusCategory::User => "user",
                StatusCategory::System => "system",
            };
            SseEvent::default()
                .id(view.event_id.to_string())
                .event(name)
                .data(data)
        }
        Err(SubscriptionError::Overrun { skipped }) => SseEvent::default()
            .event("overrun")
            .data(json!({ "skipped": skipped }).to_string()),
        Err(SubscriptionError::Closed) => SseEvent::default().event("closed").data("{}"),
    }
}
