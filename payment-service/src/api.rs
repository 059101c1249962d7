use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection};
use tower_http::timeout::TimeoutLayer;

use crate::handlers;

pub type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/payments/debit", post(handlers::debit))
        .route("/api/payments/compensate", post(handlers::compensate))
        .route("/api/payment/try", post(handlers::try_reserve))
        .route("/api/payment/confirm", post(handlers::confirm))
        .route("/api/payment/cancel", post(handlers::cancel))
        .route("/api/payment/xa", post(handlers::xa))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}
