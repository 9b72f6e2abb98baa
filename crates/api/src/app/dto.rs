use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shopkeep_catalog::Product;
use shopkeep_core::{CategoryId, LocationId, ManufacturerId, Money, OrderId, ProductId, UserId};
use shopkeep_events::{StatusCategory, StatusEnvelope};
use shopkeep_inventory::StockLevel;
use shopkeep_orders::{Order, OrderLine, OrderStatus, PaymentMethod};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub manufacturer_id: ManufacturerId,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub price_cents: u64,
    pub variation: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLocationRequest {
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateManufacturerRequest {
    pub name: String,
}

/// Body of both creating and renaming a category.
#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetCategoryRequest {
    pub category_id: Option<CategoryId>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct OrderLineView {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub quantity: u32,
    pub unit_price_cents: u64,
    pub total_cents: u64,
}

impl From<&OrderLine> for OrderLineView {
    fn from(line: &OrderLine) -> Self {
        Self {
            product_id: line.product_id,
            location_id: line.location_id,
            quantity: line.quantity,
            unit_price_cents: line.unit_price.cents(),
            total_cents: line.total().cents(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment: PaymentMethod,
    pub lines: Vec<OrderLineView>,
    pub total_cents: u64,
    pub total: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        let total: Money = order.total();
        Self {
            id: order.id_typed(),
            user_id: order.user_id(),
            status: order.status(),
            payment: order.payment(),
            lines: order.lines().iter().map(OrderLineView::from).collect(),
            total_cents: total.cents(),
            total: total.to_string(),
            note: order.note().map(str::to_string),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

/// A catalog product with its stock at every location.
#[derive(Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub stock: Vec<StockLevel>,
}

/// A status event as observers see it (SSE feed and recent log).
#[derive(Debug, Serialize)]
pub struct StatusEventView {
    pub event_id: Uuid,
    pub category: StatusCategory,
    pub event_type: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<&StatusEnvelope> for StatusEventView {
    fn from(envelope: &StatusEnvelope) -> Self {
        let payload = envelope.payload();
        let order_id = envelope.order_id();
        Self {
            event_id: envelope.event_id(),
            category: envelope.category(),
            event_type: payload.event_type.clone(),
            message: payload.message.clone(),
            timestamp: envelope.occurred_at(),
            order_id,
            sequence_number: order_id.map(|_| envelope.sequence_number()),
            user_id: payload.user_id,
            status: payload.status.clone(),
            note: payload.note.clone(),
        }
    }
}
