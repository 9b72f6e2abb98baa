use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
};

use shopkeep_catalog::{NewLocation, NewProduct};
use shopkeep_core::{CategoryId, Money, ProductId};

use crate::app::dto::{self, ProductView};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id/category", put(set_product_category))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:id", put(rename_category))
        .route("/categories/:id/products", get(list_category_products))
        .route("/locations", get(list_locations).post(create_location))
        .route("/manufacturers", get(list_manufacturers).post(create_manufacturer))
}

/// GET /catalog/products (with stock per location)
pub async fn list_products(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let rows = services.ledger.rows();
    let products: Vec<ProductView> = services
        .catalog
        .products()
        .into_iter()
        .map(|product| ProductView {
            stock: rows.iter().filter(|r| r.product == product.id).copied().collect(),
            product,
        })
        .collect();
    Json(products).into_response()
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateProductRequest>,
) -> Response {
    let input = NewProduct {
        name: body.name,
        manufacturer_id: body.manufacturer_id,
        category_id: body.category_id,
        price: Money::from_cents(body.price_cents),
        variation: body.variation,
        description: body.description,
    };
    match services.catalog.add_product(input) {
        Ok(product) => (StatusCode::CREATED, Json(product)).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

/// PUT /catalog/products/:id/category (`null` clears it)
pub async fn set_product_category(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetCategoryRequest>,
) -> Response {
    let id: ProductId = match errors::parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.catalog.set_category(id, body.category_id) {
        Ok(product) => Json(product).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn list_categories(Extension(services): Extension<Arc<AppServices>>) -> Response {
    Json(services.catalog.categories()).into_response()
}

pub async fn create_category(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CategoryRequest>,
) -> Response {
    match services.catalog.add_category(&body.name) {
        Ok(category) => (StatusCode::CREATED, Json(category)).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn rename_category(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::CategoryRequest>,
) -> Response {
    let id: CategoryId = match errors::parse_id(&id, "category") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.catalog.rename_category(id, &body.name) {
        Ok(category) => Json(category).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

/// GET /catalog/categories/:id/products (products on sale only)
pub async fn list_category_products(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: CategoryId = match errors::parse_id(&id, "category") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(e) = services.catalog.category(id) {
        return errors::catalog_error_to_response(e);
    }
    Json(services.catalog.products_in_category(id)).into_response()
}

pub async fn list_locations(Extension(services): Extension<Arc<AppServices>>) -> Response {
    Json(services.catalog.locations()).into_response()
}

pub async fn create_location(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateLocationRequest>,
) -> Response {
    let input = NewLocation {
        name: body.name,
        address: body.address,
    };
    match services.catalog.add_location(input) {
        Ok(location) => (StatusCode::CREATED, Json(location)).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn list_manufacturers(Extension(services): Extension<Arc<AppServices>>) -> Response {
    Json(services.catalog.manufacturers()).into_response()
}

pub async fn create_manufacturer(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateManufacturerRequest>,
) -> Response {
    match services.catalog.add_manufacturer(&body.name) {
        Ok(manufacturer) => (StatusCode::CREATED, Json(manufacturer)).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}
