use crate::app::dispatcher::TransactionalDispatcher;
use crate::domain::hooks::LifecycleEvent;
use crate::domain::operation::{OperationRequest, OperationResult};
use crate::error::ApiError;
use axum::extract::rejection::JsonRejection;
use axum::http::header::HOST;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<TransactionalDispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Arc<TransactionalDispatcher>) -> Self {
        Self { dispatcher }
    }
}

/// Query parameters understood by `getList` (documentation only; handlers read the raw map).
#[derive(Deserialize, Debug, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
#[allow(dead_code)]
pub struct ListQuery {
    /// 1-based page number (default 1)
    pub page: Option<i64>,
    /// Rows per page (default 25)
    pub page_size: Option<i64>,
    /// Field to order by (default: identifier column)
    pub order_by: Option<String>,
    /// `true` for descending order
    pub order_by_desc: Option<bool>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Builds the generic request from what axum extracted.
pub fn operation_request(
    event: LifecycleEvent,
    resource: String,
    id: Option<String>,
    query: BTreeMap<String, String>,
    headers: HeaderMap,
) -> OperationRequest {
    let mut request = OperationRequest::new(event, resource);
    request.id = id;
    request.query = query;
    request.headers = headers;
    request
}

/// `<scheme>://<host><path>` of the current request, used for `location` headers.
pub fn location_base(headers: &HeaderMap, path: &str) -> String {
    let scheme = match headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
    {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
        _ => "http",
    };
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{}://{}{}", scheme, host, path)
}

/// Write payloads must be JSON; anything else is a 400 before the transaction starts.
pub fn json_body(body: Result<Json<JsonValue>, JsonRejection>) -> Result<JsonValue, ApiError> {
    match body {
        Ok(Json(v)) => Ok(v),
        Err(e) => Err(ApiError::bad_request(format!("Invalid JSON body: {}", e.body_text()))),
    }
}

pub fn into_http_response(result: Result<OperationResult, ApiError>) -> Response {
    match result {
        Ok(result) => (result.status, result.headers, Json(result.body)).into_response(),
        Err(e) => e.into_response(),
    }
}
