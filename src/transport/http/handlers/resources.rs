//! Generic CRUD handlers. Each one only translates HTTP into an `OperationRequest`;
//! all semantics live in the dispatcher.

use crate::domain::hooks::LifecycleEvent;
use crate::transport::http::types::{
    into_http_response, json_body, location_base, operation_request, AppState, ListQuery,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

#[utoipa::path(
    get,
    path = "/api/generic/{resource}",
    params(
        ("resource" = String, Path, description = "Resource name (e.g. user-alert-messages)"),
        ListQuery
    ),
    responses(
        (status = 200, description = "One page of records", body = [serde_json::Value]),
        (status = 400, description = "Invalid paging or ordering parameter", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown resource", body = crate::error::ErrorBody),
        (status = 500, description = "Unexpected error", body = crate::error::ErrorBody)
    )
)]
pub async fn get_list_handler(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let request = operation_request(LifecycleEvent::GetList, resource, None, query, headers);
    into_http_response(state.dispatcher.dispatch(request).await)
}

#[utoipa::path(
    get,
    path = "/api/generic/{resource}/count",
    params(
        ("resource" = String, Path, description = "Resource name")
    ),
    responses(
        (status = 200, description = "Number of records", body = i64),
        (status = 404, description = "Unknown resource", body = crate::error::ErrorBody),
        (status = 500, description = "Unexpected error", body = crate::error::ErrorBody)
    )
)]
pub async fn get_count_handler(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let request = operation_request(LifecycleEvent::GetCount, resource, None, query, headers);
    into_http_response(state.dispatcher.dispatch(request).await)
}

#[utoipa::path(
    get,
    path = "/api/generic/{resource}/{id}",
    params(
        ("resource" = String, Path, description = "Resource name"),
        ("id" = String, Path, description = "Identifier column value")
    ),
    responses(
        (status = 200, description = "The record", body = serde_json::Value),
        (status = 404, description = "Unknown resource or record", body = crate::error::ErrorBody),
        (status = 500, description = "Unexpected error (e.g. duplicate id)", body = crate::error::ErrorBody)
    )
)]
pub async fn get_by_id_handler(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let request = operation_request(LifecycleEvent::Get, resource, Some(id), query, headers);
    into_http_response(state.dispatcher.dispatch(request).await)
}

#[utoipa::path(
    post,
    path = "/api/generic/{resource}",
    params(
        ("resource" = String, Path, description = "Resource name")
    ),
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Created; `location` header references the new record"),
        (status = 400, description = "Invalid field", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown resource", body = crate::error::ErrorBody),
        (status = 500, description = "Unexpected error", body = crate::error::ErrorBody)
    )
)]
pub async fn post_handler(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    let base = location_base(&headers, uri.path());
    let request = operation_request(LifecycleEvent::Post, resource, None, query, headers)
        .with_body(body)
        .with_location_base(base);
    into_http_response(state.dispatcher.dispatch(request).await)
}

#[utoipa::path(
    put,
    path = "/api/generic/{resource}/{id}",
    params(
        ("resource" = String, Path, description = "Resource name"),
        ("id" = String, Path, description = "Identifier column value")
    ),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Updated"),
        (status = 400, description = "Invalid field", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown resource or record", body = crate::error::ErrorBody),
        (status = 500, description = "Unexpected error", body = crate::error::ErrorBody)
    )
)]
pub async fn put_handler(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    let request =
        operation_request(LifecycleEvent::Put, resource, Some(id), query, headers).with_body(body);
    into_http_response(state.dispatcher.dispatch(request).await)
}

#[utoipa::path(
    delete,
    path = "/api/generic/{resource}/{id}",
    params(
        ("resource" = String, Path, description = "Resource name"),
        ("id" = String, Path, description = "Identifier column value")
    ),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Unknown resource or record", body = crate::error::ErrorBody),
        (status = 500, description = "Unexpected error", body = crate::error::ErrorBody)
    )
)]
pub async fn delete_handler(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let request = operation_request(LifecycleEvent::Delete, resource, Some(id), query, headers);
    into_http_response(state.dispatcher.dispatch(request).await)
}
