use crate::error::ErrorBody;
use crate::transport::http::handlers::{health, resources};
use crate::transport::http::types::{AppState, HealthResponse};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck_handler,
        resources::get_list_handler,
        resources::get_count_handler,
        resources::get_by_id_handler,
        resources::post_handler,
        resources::put_handler,
        resources::delete_handler
    ),
    components(schemas(ErrorBody, HealthResponse))
)]
#[allow(dead_code)]
pub struct ApiDoc;

/// Generic resource routes under `base_path` (e.g. `/api/generic`), plus `/health`.
pub fn create_router(app_state: AppState, base_path: &str) -> Router {
    let collection = format!("{}/:resource", base_path);
    let count = format!("{}/:resource/count", base_path);
    let item = format!("{}/:resource/:id", base_path);

    Router::new()
        .route("/health", get(health::healthcheck_handler))
        .route(
            &collection,
            get(resources::get_list_handler).post(resources::post_handler),
        )
        .route(&count, get(resources::get_count_handler))
        .route(
            &item,
            get(resources::get_by_id_handler)
                .put(resources::put_handler)
                .delete(resources::delete_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
