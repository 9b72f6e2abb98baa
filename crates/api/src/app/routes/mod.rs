use axum::Router;

pub mod bot;
pub mod catalog;
pub mod dashboard;
pub mod inventory;
pub mod orders;
pub mod system;
pub mod users;

/// Router for every endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .nest("/dashboard", dashboard::router())
        .nest("/bot", bot::router())
        .nest("/orders", orders::router())
        .nest("/catalog", catalog::router())
        .nest("/inventory", inventory::router())
        .nest("/users", users::router())
}
