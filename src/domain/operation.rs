//! Request / response values flowing through the dispatcher and the hook chains.

use crate::domain::hooks::LifecycleEvent;
use crate::error::{ApiError, ApiResult};
use axum::http::{HeaderMap, StatusCode};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

pub const DEFAULT_PAGE_SIZE: i64 = 25;

/// One generic CRUD request. Hooks may mutate any field before the core operation reads it.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub event: LifecycleEvent,
    /// External resource name, e.g. `user-alert-messages`.
    pub resource: String,
    pub id: Option<String>,
    pub body: Option<JsonValue>,
    /// Raw query string parameters.
    pub query: BTreeMap<String, String>,
    /// Equality filter applied to `getList`, keyed by field name. Usually set by a pre-hook.
    pub filter: Map<String, JsonValue>,
    pub headers: HeaderMap,
    /// `<scheme>://<host><path>` of the collection; the `post` location header is built on it.
    pub location_base: Option<String>,
    /// Free-form values hooks use to hand state to later hooks.
    pub locals: Map<String, JsonValue>,
}

impl OperationRequest {
    pub fn new(event: LifecycleEvent, resource: impl Into<String>) -> Self {
        Self {
            event,
            resource: resource.into(),
            id: None,
            body: None,
            query: BTreeMap::new(),
            filter: Map::new(),
            headers: HeaderMap::new(),
            location_base: None,
            locals: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_location_base(mut self, base: impl Into<String>) -> Self {
        self.location_base = Some(base.into());
        self
    }

    /// The `{id}` path parameter; missing only if the caller built the request wrongly.
    pub fn require_id(&self) -> ApiResult<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| ApiError::bad_request(format!("Missing id for event \"{}\"", self.event)))
    }

    /// The write payload as an object. Absent body counts as `{}`.
    pub fn body_object(&self) -> ApiResult<Map<String, JsonValue>> {
        match &self.body {
            None | Some(JsonValue::Null) => Ok(Map::new()),
            Some(JsonValue::Object(obj)) => Ok(obj.clone()),
            Some(_) => Err(ApiError::bad_request("Request body must be a JSON object")),
        }
    }
}

/// Mutable result holder populated by pre-hooks, the core operation and post-hooks.
/// The last writer of `status`/`body` wins.
#[derive(Debug, Clone)]
pub struct PendingResponse {
    pub status: StatusCode,
    pub body: Option<JsonValue>,
    pub headers: HeaderMap,
}

impl Default for PendingResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            body: None,
            headers: HeaderMap::new(),
        }
    }
}

impl PendingResponse {
    /// True once something (a pre-hook or the core operation) produced the body.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn set_body(&mut self, body: JsonValue) {
        self.body = Some(body);
    }
}

/// Final outcome handed back to the transport.
#[derive(Debug, Clone)]
pub struct OperationResult {
    pub status: StatusCode,
    pub body: JsonValue,
    pub headers: HeaderMap,
}

impl From<PendingResponse> for OperationResult {
    fn from(pending: PendingResponse) -> Self {
        Self {
            status: pending.status,
            body: pending.body.unwrap_or(JsonValue::Null),
            headers: pending.headers,
        }
    }
}

/// Validated `getList` parameters. `order_by` is still a field name at this point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub page: i64,
    pub page_size: i64,
    pub order_by: Option<String>,
    pub order_desc: bool,
}

impl ListParams {
    pub fn from_query(query: &BTreeMap<String, String>, default_page_size: i64) -> ApiResult<Self> {
        let order_desc = match query.get("orderByDesc").map(|s| s.as_str()) {
            None | Some("") | Some("false") => false,
            Some("true") => true,
            Some(other) => {
                return Err(ApiError::bad_request(format!(
                    "Invalid orderByDesc value \"{}\"",
                    other
                )))
            }
        };

        let order_by = query.get("orderBy").filter(|s| !s.is_empty()).cloned();
        let page = parse_positive(query.get("page"), "page", 1)?;
        let page_size = parse_positive(query.get("pageSize"), "pageSize", default_page_size)?;

        Ok(Self {
            page,
            page_size,
            order_by,
            order_desc,
        })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

fn parse_positive(raw: Option<&String>, name: &str, default: i64) -> ApiResult<i64> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid {} value \"{}\"", name, raw)))?;
    if value < 1 {
        return Err(ApiError::bad_request(format!(
            "{} must be > 0 but was \"{}\"",
            name, value
        )));
    }
    Ok(value)
}
