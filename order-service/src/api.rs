use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;

use crate::dtm::{Orchestrator, Protocol};
use crate::handlers;
use crate::store::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub protocol: Protocol,
    pub orchestrator: Orchestrator,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/orders", post(handlers::create_order))
        .route("/api/orders/:order_id", get(handlers::get_order))
        .route("/api/orders/create", post(handlers::saga_create))
        .route("/api/orders/complete", post(handlers::saga_complete))
        .route("/api/orders/compensate", post(handlers::saga_compensate))
        .route("/api/orders/try", post(handlers::tcc_try))
        .route("/api/orders/confirm", post(handlers::tcc_confirm))
        .route("/api/orders/cancel", post(handlers::tcc_cancel))
        .route("/api/orders/xa", post(handlers::xa))
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
