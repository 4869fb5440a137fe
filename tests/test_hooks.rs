//! End-to-end tests for pre/post hooks: short-circuiting, ordering and rollback.

mod common;

use async_trait::async_trait;
use axum::http::{HeaderValue, StatusCode};
use common::{error_body, start, TestResult};
use pg_rest_hooks::{
    ApiError, ApiResult, Hook, HookPhase, HookRegistry, LifecycleEvent, OperationRequest,
    PendingResponse,
};
use serde_json::{json, Value as JsonValue};
use sqlx::PgConnection;

const RESOURCE: &str = "user-alert-messages";

/// Writes a marker row through the request's transaction.
struct InsertMarker {
    schema: String,
    message: &'static str,
}

#[async_trait]
impl Hook for InsertMarker {
    async fn call(
        &self,
        _request: &mut OperationRequest,
        _response: &mut PendingResponse,
        conn: &mut PgConnection,
    ) -> ApiResult<()> {
        let sql = format!(
            "INSERT INTO \"{}\".user_alert_messages_for_hooks (user_name, message) VALUES ('hook', $1)",
            self.schema
        );
        sqlx::query(&sql).bind(self.message).execute(&mut *conn).await?;
        Ok(())
    }
}

struct Fail(fn() -> ApiError);

#[async_trait]
impl Hook for Fail {
    async fn call(
        &self,
        _request: &mut OperationRequest,
        _response: &mut PendingResponse,
        _conn: &mut PgConnection,
    ) -> ApiResult<()> {
        Err((self.0)())
    }
}

struct RespondWith(JsonValue);

#[async_trait]
impl Hook for RespondWith {
    async fn call(
        &self,
        _request: &mut OperationRequest,
        response: &mut PendingResponse,
        _conn: &mut PgConnection,
    ) -> ApiResult<()> {
        response.set_body(self.0.clone());
        Ok(())
    }
}

/// Appends a tag to `locals.trace`.
struct Tag(&'static str);

#[async_trait]
impl Hook for Tag {
    async fn call(
        &self,
        request: &mut OperationRequest,
        _response: &mut PendingResponse,
        _conn: &mut PgConnection,
    ) -> ApiResult<()> {
        let trace = request
            .locals
            .entry("trace")
            .or_insert_with(|| JsonValue::Array(Vec::new()));
        if let JsonValue::Array(tags) = trace {
            tags.push(json!(self.0));
        }
        Ok(())
    }
}

/// Replaces the response body with `locals.trace`.
struct EchoTrace;

#[async_trait]
impl Hook for EchoTrace {
    async fn call(
        &self,
        request: &mut OperationRequest,
        response: &mut PendingResponse,
        _conn: &mut PgConnection,
    ) -> ApiResult<()> {
        let trace = request.locals.get("trace").cloned().unwrap_or(json!([]));
        response.set_body(trace);
        Ok(())
    }
}

/// Restricts lists to the user named in the `x-user-name` header.
struct OwnRowsOnly;

#[async_trait]
impl Hook for OwnRowsOnly {
    async fn call(
        &self,
        request: &mut OperationRequest,
        _response: &mut PendingResponse,
        _conn: &mut PgConnection,
    ) -> ApiResult<()> {
        let user = request
            .headers
            .get("x-user-name")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::with_status(StatusCode::UNAUTHORIZED, "missing user"))?
            .to_string();
        request.filter.insert("userName".to_string(), json!(user));
        Ok(())
    }
}

struct Accepted;

#[async_trait]
impl Hook for Accepted {
    async fn call(
        &self,
        _request: &mut OperationRequest,
        response: &mut PendingResponse,
        _conn: &mut PgConnection,
    ) -> ApiResult<()> {
        response.status = StatusCode::ACCEPTED;
        response
            .headers
            .insert("x-hook", HeaderValue::from_static("post"));
        Ok(())
    }
}

/// Sends the request to another resource.
struct Redirect(&'static str);

#[async_trait]
impl Hook for Redirect {
    async fn call(
        &self,
        request: &mut OperationRequest,
        _response: &mut PendingResponse,
        _conn: &mut PgConnection,
    ) -> ApiResult<()> {
        request.resource = self.0.to_string();
        Ok(())
    }
}

/// Records which post chain ran in an `x-post` header.
struct Stamp(&'static str);

#[async_trait]
impl Hook for Stamp {
    async fn call(
        &self,
        _request: &mut OperationRequest,
        response: &mut PendingResponse,
        _conn: &mut PgConnection,
    ) -> ApiResult<()> {
        response
            .headers
            .insert("x-post", HeaderValue::from_static(self.0));
        Ok(())
    }
}

/// Kills its own backend connection, then fails, so the rollback cannot succeed.
struct DropConnectionThenFail;

#[async_trait]
impl Hook for DropConnectionThenFail {
    async fn call(
        &self,
        _request: &mut OperationRequest,
        _response: &mut PendingResponse,
        conn: &mut PgConnection,
    ) -> ApiResult<()> {
        let _ = sqlx::query("SELECT pg_terminate_backend(pg_backend_pid())")
            .execute(&mut *conn)
            .await;
        Err(ApiError::with_status(StatusCode::CONFLICT, "record is locked"))
    }
}

fn marker(schema: &str, message: &'static str) -> InsertMarker {
    InsertMarker {
        schema: schema.to_string(),
        message,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pre_hook_body_skips_core_operation() -> TestResult {
    let mut hooks: HookRegistry = HookRegistry::new();
    hooks
        .add_resource_hook(
            LifecycleEvent::GetList,
            RESOURCE,
            HookPhase::Pre,
            RespondWith(json!([{"canned": true}])),
        )
        .add_resource_hook(
            LifecycleEvent::Post,
            RESOURCE,
            HookPhase::Pre,
            RespondWith(json!({"queued": true})),
        );
    let Some(server) = start("it_hooks_short_circuit", hooks).await? else {
        return Ok(());
    };

    let (status, body) = server.get_json(RESOURCE).await?;
    assert_eq!(status, 200);
    assert_eq!(body, json!([{"canned": true}]));

    let res = server
        .client
        .post(server.url(RESOURCE))
        .json(&json!({"userName": "user3", "message": "message text"}))
        .send()
        .await?;
    assert_eq!(res.status().as_u16(), 200);
    assert!(res.headers().get(reqwest::header::LOCATION).is_none());
    assert_eq!(res.json::<JsonValue>().await?, json!({"queued": true}));
    assert_eq!(server.count_rows("user_alert_messages").await?, 3);

    // Other resources are not affected.
    let (status, body) = server.get_json("user-alert-messages-for-hooks").await?;
    assert_eq!(status, 200);
    assert_eq!(body, json!([]));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_pre_hook_rolls_back() -> TestResult {
    let schema = "it_hooks_pre_fail";
    let mut hooks: HookRegistry = HookRegistry::new();
    hooks
        .add_resource_hook(LifecycleEvent::Delete, RESOURCE, HookPhase::Pre, marker(schema, "pre"))
        .add_resource_hook(
            LifecycleEvent::Delete,
            RESOURCE,
            HookPhase::Pre,
            Fail(|| ApiError::bad_request("deletes are disabled")),
        );
    let Some(server) = start(schema, hooks).await? else {
        return Ok(());
    };

    let res = server.client.delete(server.url("user-alert-messages/1")).send().await?;
    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(
        res.json::<JsonValue>().await?,
        error_body(400, "deletes are disabled")
    );
    assert_eq!(server.count_rows("user_alert_messages").await?, 3);
    assert_eq!(server.count_rows("user_alert_messages_for_hooks").await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_post_hook_rolls_back_core_write() -> TestResult {
    let schema = "it_hooks_post_fail";
    let mut hooks: HookRegistry = HookRegistry::new();
    hooks
        .add_resource_hook(LifecycleEvent::Post, RESOURCE, HookPhase::Pre, marker(schema, "pre"))
        .add_resource_hook(LifecycleEvent::Post, RESOURCE, HookPhase::Post, marker(schema, "post"))
        .add_resource_hook(
            LifecycleEvent::Post,
            RESOURCE,
            HookPhase::Post,
            Fail(|| ApiError::internal("audit sink unavailable")),
        );
    let Some(server) = start(schema, hooks).await? else {
        return Ok(());
    };

    let res = server
        .client
        .post(server.url(RESOURCE))
        .json(&json!({"userName": "user3", "message": "message text"}))
        .send()
        .await?;
    assert_eq!(res.status().as_u16(), 500);
    assert_eq!(res.json::<JsonValue>().await?, error_body(500, "Unexpected error"));
    assert_eq!(server.count_rows("user_alert_messages").await?, 3);
    assert_eq!(server.count_rows("user_alert_messages_for_hooks").await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_successful_hooks_commit_with_core_write() -> TestResult {
    let schema = "it_hooks_commit";
    let mut hooks: HookRegistry = HookRegistry::new();
    hooks
        .add_resource_hook(LifecycleEvent::Put, RESOURCE, HookPhase::Pre, marker(schema, "pre"))
        .add_resource_hook(LifecycleEvent::Put, RESOURCE, HookPhase::Post, marker(schema, "post"))
        .add_resource_hook(LifecycleEvent::Put, RESOURCE, HookPhase::Post, Accepted);
    let Some(server) = start(schema, hooks).await? else {
        return Ok(());
    };

    let res = server
        .client
        .put(server.url("user-alert-messages/2"))
        .json(&json!({"message": "edited"}))
        .send()
        .await?;
    assert_eq!(res.status().as_u16(), 202);
    assert_eq!(
        res.headers().get("x-hook").and_then(|v| v.to_str().ok()),
        Some("post")
    );
    assert_eq!(server.count_rows("user_alert_messages_for_hooks").await?, 2);

    let (_, body) = server.get_json("user-alert-messages/2").await?;
    assert_eq!(body["message"], json!("edited"));

    // Core failure: the pre-hook marker is rolled back with it.
    let res = server
        .client
        .put(server.url("user-alert-messages/99"))
        .json(&json!({"message": "edited"}))
        .send()
        .await?;
    assert_eq!(res.status().as_u16(), 404);
    assert_eq!(server.count_rows("user_alert_messages_for_hooks").await?, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hook_order_global_then_resource() -> TestResult {
    let mut hooks: HookRegistry = HookRegistry::new();
    hooks
        .add_global_hook(LifecycleEvent::GetCount, HookPhase::Pre, Tag("global-1"))
        .add_resource_hook(LifecycleEvent::GetCount, RESOURCE, HookPhase::Pre, Tag("resource-1"))
        .add_global_hook(LifecycleEvent::GetCount, HookPhase::Pre, Tag("global-2"))
        .add_resource_hook(LifecycleEvent::GetCount, RESOURCE, HookPhase::Post, Tag("resource-post"))
        .add_global_hook(LifecycleEvent::GetCount, HookPhase::Post, Tag("global-post"))
        .add_global_hook(LifecycleEvent::GetCount, HookPhase::Post, EchoTrace);
    let Some(server) = start("it_hooks_order", hooks).await? else {
        return Ok(());
    };

    // EchoTrace is the last global post-hook, so it runs before the resource post-hook.
    let (status, body) = server.get_json("user-alert-messages/count").await?;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!(["global-1", "global-2", "resource-1", "global-post"])
    );

    let (status, body) = server.get_json("user-alert-messages-for-hooks/count").await?;
    assert_eq!(status, 200);
    assert_eq!(body, json!(["global-1", "global-2", "global-post"]));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pre_hook_filter_and_status() -> TestResult {
    let mut hooks: HookRegistry = HookRegistry::new();
    hooks.add_resource_hook(LifecycleEvent::GetList, RESOURCE, HookPhase::Pre, OwnRowsOnly);
    let Some(server) = start("it_hooks_filter", hooks).await? else {
        return Ok(());
    };

    let res = server
        .client
        .get(server.url(RESOURCE))
        .header("x-user-name", "a user")
        .send()
        .await?;
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(
        res.json::<JsonValue>().await?,
        json!([{"id": 2, "userName": "a user", "message": "message2"}])
    );

    let (status, body) = server.get_json(RESOURCE).await?;
    assert_eq!(status, 401);
    assert_eq!(body, error_body(401, "missing user"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replace_hooks() -> TestResult {
    let Some(server) = start("it_hooks_replace", HookRegistry::new()).await? else {
        return Ok(());
    };

    let (_, body) = server.get_json("user-alert-messages/count").await?;
    assert_eq!(body, json!(3));

    let mut hooks: HookRegistry = HookRegistry::new();
    hooks.register("getCount", Some(RESOURCE), HookPhase::Pre, RespondWith(json!(-1)))?;
    server.service.replace_hooks(hooks).await;

    let (_, body) = server.get_json("user-alert-messages/count").await?;
    assert_eq!(body, json!(-1));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_post_hooks_follow_redirected_resource() -> TestResult {
    let mut hooks: HookRegistry = HookRegistry::new();
    hooks
        .add_resource_hook(
            LifecycleEvent::GetCount,
            RESOURCE,
            HookPhase::Pre,
            Redirect("user-alert-messages-for-hooks"),
        )
        .add_resource_hook(LifecycleEvent::GetCount, RESOURCE, HookPhase::Post, Stamp("requested"))
        .add_resource_hook(
            LifecycleEvent::GetCount,
            "user-alert-messages-for-hooks",
            HookPhase::Post,
            Stamp("redirected"),
        );
    let Some(server) = start("it_hooks_redirect", hooks).await? else {
        return Ok(());
    };

    let res = server.client.get(server.url("user-alert-messages/count")).send().await?;
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(
        res.headers().get("x-post").and_then(|v| v.to_str().ok()),
        Some("redirected")
    );
    // The count comes from the table the pre-hook chose.
    assert_eq!(res.json::<JsonValue>().await?, json!(0));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_rollback_keeps_hook_status() -> TestResult {
    let mut hooks: HookRegistry = HookRegistry::new();
    hooks.add_resource_hook(LifecycleEvent::Delete, RESOURCE, HookPhase::Pre, DropConnectionThenFail);
    let Some(server) = start("it_hooks_rollback_fails", hooks).await? else {
        return Ok(());
    };

    let res = server.client.delete(server.url("user-alert-messages/1")).send().await?;
    assert_eq!(res.status().as_u16(), 409);
    assert_eq!(res.json::<JsonValue>().await?, error_body(409, "record is locked"));
    assert_eq!(server.count_rows("user_alert_messages").await?, 3);

    // The pool replaces the dead connection.
    let (status, _) = server.get_json("user-alert-messages/count").await?;
    assert_eq!(status, 200);
    Ok(())
}

#[test]
fn test_register_rejects_unknown_event() {
    let mut hooks: HookRegistry = HookRegistry::new();
    let err = hooks
        .register("getAll", None, HookPhase::Pre, RespondWith(json!(null)))
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "invalid event value \"getAll\"");
    assert!(hooks.is_empty());
}
