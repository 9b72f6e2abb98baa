//! HTTP API: process wiring, configuration, and the dashboard/operator surface.

pub mod app;
pub mod config;

pub use app::build_app;
pub use app::services::{AppServices, DashboardSnapshot, Workers};
pub use config::{AppConfig, ConfigError};
