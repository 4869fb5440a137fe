//! TransactionalDispatcher: runs pre-hooks, the core operation and post-hooks of one
//! request inside a single transaction.
//!
//! ```text
//! Begin -> PreHooks -> CoreOp -> PostHooks -> Commit
//!   \________\___________\__________\______-> Rollback
//! ```
//!
//! Any error after `Begin` rolls everything back, including statements hooks issued.

use crate::app::query_builder::QueryBuilder;
use crate::domain::hooks::{run_chain, HookPhase, HookRegistry, LifecycleEvent};
use crate::domain::operation::{
    OperationRequest, OperationResult, PendingResponse, DEFAULT_PAGE_SIZE,
};
use crate::domain::schema::{SchemaRegistry, SchemaSnapshot, Table};
use crate::error::{ApiError, ApiResult};
use axum::http::header::LOCATION;
use axum::http::{HeaderValue, StatusCode};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::{Map, Value as JsonValue};
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::Instrument;

pub struct TransactionalDispatcher {
    pool: PgPool,
    schema: Arc<SchemaRegistry>,
    hooks: RwLock<Arc<HookRegistry>>,
    default_page_size: i64,
}

impl TransactionalDispatcher {
    pub fn new(pool: PgPool, schema: Arc<SchemaRegistry>, hooks: HookRegistry) -> Self {
        Self {
            pool,
            schema,
            hooks: RwLock::new(Arc::new(hooks)),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_default_page_size(mut self, page_size: i64) -> Self {
        self.default_page_size = page_size.max(1);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    pub async fn hooks(&self) -> Arc<HookRegistry> {
        self.hooks.read().await.clone()
    }

    /// Swaps the hook registry as a whole. Requests already dispatching keep the
    /// registry they started with.
    pub async fn replace_hooks(&self, hooks: HookRegistry) {
        *self.hooks.write().await = Arc::new(hooks);
    }

    /// Runs one request to completion and commits, or rolls back and returns the error.
    pub async fn dispatch(&self, request: OperationRequest) -> ApiResult<OperationResult> {
        let span = tracing::info_span!(
            "dispatch",
            event = %request.event,
            resource = %request.resource,
            id = ?request.id
        );
        self.dispatch_inner(request).instrument(span).await
    }

    async fn dispatch_inner(&self, mut request: OperationRequest) -> ApiResult<OperationResult> {
        let hooks = self.hooks().await;
        let schema = self.schema.snapshot().await;

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    query = ?request.query,
                    body = ?request.body,
                    "could not begin transaction"
                );
                return Err(ApiError::internal(format!("could not begin transaction: {}", e)));
            }
        };

        let mut response = PendingResponse::default();
        let outcome = self
            .run_phases(&hooks, &schema, &mut request, &mut response, &mut tx)
            .await;

        match outcome {
            Ok(()) => {
                if let Err(e) = tx.commit().await {
                    tracing::error!(error = %e, "commit failed");
                    return Err(ApiError::Database(e));
                }
                tracing::debug!(status = %response.status, "committed");
                Ok(OperationResult::from(response))
            }
            Err(err) => {
                let rollback = tx.rollback().await;
                Err(rolled_back(err, rollback, &request))
            }
        }
    }

    async fn run_phases(
        &self,
        hooks: &HookRegistry,
        schema: &SchemaSnapshot,
        request: &mut OperationRequest,
        response: &mut PendingResponse,
        conn: &mut PgConnection,
    ) -> ApiResult<()> {
        let event = request.event;
        let pre = hooks.chain_for(event, &request.resource, HookPhase::Pre);
        run_chain(&pre, request, response, conn).await?;

        if response.has_body() {
            tracing::debug!("pre-hooks produced the response, skipping core operation");
        } else {
            self.core_operation(schema, request, response, conn).await?;
        }

        // Pre-hooks may have redirected the request; post-hooks follow the resource it ended on.
        let post = hooks.chain_for(event, &request.resource, HookPhase::Post);
        run_chain(&post, request, response, conn).await
    }

    async fn core_operation(
        &self,
        schema: &SchemaSnapshot,
        request: &OperationRequest,
        response: &mut PendingResponse,
        conn: &mut PgConnection,
    ) -> ApiResult<()> {
        let table = schema.resolve_resource(&request.resource)?;
        let qb = QueryBuilder::new(schema, table);

        match request.event {
            LifecycleEvent::GetList => {
                let params = qb.list_params(&request.query, self.default_page_size)?;
                let rows = qb.list(conn, &params, &request.filter).await?;
                response.set_body(JsonValue::Array(rows));
            }
            LifecycleEvent::GetCount => {
                let count = qb.count(conn).await?;
                response.set_body(JsonValue::from(count));
            }
            LifecycleEvent::Get => {
                let record = qb.get_by_id(conn, request.require_id()?).await?;
                response.set_body(record);
            }
            LifecycleEvent::Post => {
                let record = write_payload(schema, table, request)?;
                let id = qb.insert(conn, &record).await?;
                let location = location_for(request, &id);
                let value = HeaderValue::from_str(&location)
                    .map_err(|e| ApiError::internal(format!("invalid location header: {}", e)))?;
                response.headers.insert(LOCATION, value);
                response.status = StatusCode::CREATED;
            }
            LifecycleEvent::Put => {
                let id = request.require_id()?;
                let record = write_payload(schema, table, request)?;
                qb.update(conn, id, &record).await?;
                response.status = StatusCode::OK;
            }
            LifecycleEvent::Delete => {
                qb.delete(conn, request.require_id()?).await?;
                response.status = StatusCode::OK;
            }
        }
        Ok(())
    }
}

/// Body fields -> columns, rejected with `BadRequest` if any column is unknown.
fn write_payload(
    schema: &SchemaSnapshot,
    table: &Table,
    request: &OperationRequest,
) -> ApiResult<Map<String, JsonValue>> {
    let naming = schema.naming();
    let mut record = Map::new();
    for (field, value) in request.body_object()? {
        record.insert(naming.field_to_column(&field), value);
    }
    table.validate_columns(record.keys().map(|k| k.as_str()), naming)?;
    Ok(record)
}

/// Logs a rolled-back request and hands back the error that caused it. A failed
/// rollback is logged too but never replaces that error.
fn rolled_back(
    err: ApiError,
    rollback: Result<(), sqlx::Error>,
    request: &OperationRequest,
) -> ApiError {
    if let Err(rollback_err) = rollback {
        tracing::error!(error = %rollback_err, cause = %err, "rollback failed");
    }
    if err.is_classified() {
        tracing::warn!(
            error = %err,
            query = ?request.query,
            body = ?request.body,
            "request rolled back"
        );
    } else {
        tracing::error!(
            error = %err,
            query = ?request.query,
            body = ?request.body,
            "request rolled back"
        );
    }
    err
}

/// Characters escaped when an id becomes a path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn location_for(request: &OperationRequest, id: &JsonValue) -> String {
    let raw = match id {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };
    let id = utf8_percent_encode(&raw, PATH_SEGMENT);
    match request.location_base.as_deref() {
        Some(base) => format!("{}/{}", base.trim_end_matches('/'), id),
        None => format!("{}/{}", request.resource, id),
    }
}
