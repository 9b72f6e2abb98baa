use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;

use shopkeep_core::{LocationId, ProductId};
use shopkeep_events::StatusEnvelope;

use crate::app::dto;
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_stock))
        .route("/:product/:location/adjust", post(adjust_stock))
}

/// GET /inventory: every stock row.
pub async fn list_stock(Extension(services): Extension<Arc<AppServices>>) -> Response {
    Json(services.ledger.rows()).into_response()
}

/// POST /inventory/:product/:location/adjust with `{ "delta": -3 }`
pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path((product, location)): Path<(String, String)>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> Response {
    let product: ProductId = match errors::parse_id(&product, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let location: LocationId = match errors::parse_id(&location, "location") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(e) = services.catalog.product(product) {
        return errors::catalog_error_to_response(e);
    }
    if let Err(e) = services.catalog.location(location) {
        return errors::catalog_error_to_response(e);
    }

    match services.ledger.adjust(product, location, body.delta) {
        Ok(level) => {
            services.publish(StatusEnvelope::operational(
                "stock.adjusted",
                format!(
                    "Stock of product #{product} at location #{location} adjusted by {}; on hand {}",
                    body.delta, level.on_hand
                ),
                Utc::now(),
            ));
            Json(level).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}
