use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;

use shopkeep_core::{OrderId, UserId};
use shopkeep_orders::{Order, OrderError, OrderFilter, OrderStatus};

use crate::app::dto::{self, OrderView};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/process", post(process_order))
        .route("/:id/deliver", post(deliver_order))
        .route("/:id/cancel", post(cancel_order))
}

/// GET /orders?status=pending&user_id=42
pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::OrderListQuery>,
) -> Response {
    let status = match query.status.as_deref().map(str::parse::<OrderStatus>).transpose() {
        Ok(s) => s,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_status", e.to_string()),
    };
    let filter = OrderFilter {
        status,
        user_id: query.user_id.map(UserId::new),
    };
    let orders: Vec<OrderView> = services.orders.list(&filter).iter().map(OrderView::from).collect();
    Json(orders).into_response()
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    order_response(services.orders.get(id))
}

/// POST /orders/:id/process (Pending → Processing; commits stock)
pub async fn process_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    order_response(services.orders.start_processing(id, Utc::now()))
}

/// POST /orders/:id/deliver (Processing → Delivered)
pub async fn deliver_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    order_response(services.orders.deliver(id, Utc::now()))
}

/// POST /orders/:id/cancel with optional `{ "reason": "..." }`
pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Option<Json<dto::CancelOrderRequest>>,
) -> Response {
    let id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let reason = body
        .and_then(|Json(b)| b.reason)
        .filter(|r| !r.trim().is_empty());
    order_response(services.orders.cancel(id, reason, Utc::now()))
}

fn order_response(result: Result<Order, OrderError>) -> Response {
    match result {
        Ok(order) => Json(OrderView::from(&order)).into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}
