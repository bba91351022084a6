pub mod config;
pub mod error;
pub mod handlers;
pub mod repository;
pub mod service;
pub mod store;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use repository::{
    InMemoryRepository, RecordFilter, RecordRepository, RepositoryError, SqliteRepository,
};
pub use service::ReviewService;
pub use store::RecordStore;

pub fn get_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub struct AppState {
    pub service: ReviewService,
    pub max_upload_bytes: usize,
}

/// All routes of the review API, with request tracing.
pub fn app_router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/products", get(handlers::list_products))
        .route("/upload", post(handlers::upload_document))
        .route("/products/:art_nr", get(handlers::open_product))
        .route("/products/:art_nr/save", post(handlers::save_product))
        .route(
            "/products/:art_nr/generate",
            post(handlers::generate_description),
        )
        .route("/products/:art_nr/approve", post(handlers::approve_product))
        .route("/products/:art_nr/reject", post(handlers::reject_product))
        .route("/export.csv", get(handlers::export_csv))
        .route("/export.xlsx", get(handlers::export_xlsx))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
