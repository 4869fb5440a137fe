//! Shared harness for the end-to-end tests.
//!
//! Every test works in its own Postgres schema, seeded with the same fixture rows, and
//! talks to an in-process server bound to an ephemeral port. Tests are skipped when
//! `DATABASE_URL` is not set.

#![allow(dead_code)]

use pg_rest_hooks::{DatabaseService, HookRegistry, ServiceConfig};
use serde_json::{json, Value as JsonValue};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use std::env;
use std::sync::Arc;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const BASE_PATH: &str = "/api/generic";

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    pub pool: PgPool,
    pub schema: String,
    pub service: Arc<DatabaseService>,
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}/{}", self.base_url, BASE_PATH, path.trim_start_matches('/'))
    }

    pub async fn get_json(&self, path: &str) -> Result<(u16, JsonValue), reqwest::Error> {
        let res = self.client.get(self.url(path)).send().await?;
        let status = res.status().as_u16();
        let body = res.json::<JsonValue>().await?;
        Ok((status, body))
    }

    /// Row count of a table in this test's schema, read outside the service.
    pub async fn count_rows(&self, table: &str) -> Result<i64, sqlx::Error> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\".\"{}\"", self.schema, table);
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    pub fn config(&self) -> ServiceConfig {
        config_for(&self.schema)
    }
}

pub fn database_url() -> Option<String> {
    dotenv::dotenv().ok();
    match env::var("DATABASE_URL") {
        Ok(url) => Some(url),
        Err(_) => {
            println!("DATABASE_URL not set, skipping");
            None
        }
    }
}

pub fn config_for(schema: &str) -> ServiceConfig {
    let url = env::var("DATABASE_URL").unwrap_or_default();
    ServiceConfig::new(url)
        .with_schema_name(schema)
        .with_base_path(BASE_PATH)
}

pub async fn connect(url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new().max_connections(5).connect(url).await
}

/// Drops and recreates `schema` with the fixture tables:
///
/// - `user_alert_messages`: three rows, serial `id`
/// - `user_alert_messages_for_hooks`: empty, written to by test hooks
/// - `user_alert_messages_bad_id`: `id` is not unique, two rows share id 1
pub async fn reset_schema(pool: &PgPool, schema: &str) -> Result<(), sqlx::Error> {
    let ddl = format!(
        r#"
        DROP SCHEMA IF EXISTS "{s}" CASCADE;
        CREATE SCHEMA "{s}";
        CREATE TABLE "{s}".user_alert_messages (
            id serial PRIMARY KEY,
            user_name text NOT NULL,
            message text
        );
        INSERT INTO "{s}".user_alert_messages (user_name, message) VALUES
            ('b user', 'message1'),
            ('a user', 'message2'),
            ('c user', 'message3');
        CREATE TABLE "{s}".user_alert_messages_for_hooks (
            id serial PRIMARY KEY,
            user_name text NOT NULL,
            message text
        );
        CREATE TABLE "{s}".user_alert_messages_bad_id (
            id integer NOT NULL,
            user_name text NOT NULL,
            message text
        );
        INSERT INTO "{s}".user_alert_messages_bad_id (id, user_name, message) VALUES
            (1, 'b user', 'message1'),
            (1, 'a user', 'message2'),
            (2, 'c user', 'message3');
        "#,
        s = schema
    );
    pool.execute(ddl.as_str()).await?;
    Ok(())
}

pub async fn drop_schema(pool: &PgPool, schema: &str) -> Result<(), sqlx::Error> {
    let sql = format!("DROP SCHEMA IF EXISTS \"{}\" CASCADE", schema);
    pool.execute(sql.as_str()).await?;
    Ok(())
}

/// Seeds `schema` and starts a server for it. `None` when no database is configured.
pub async fn start(
    schema: &str,
    hooks: HookRegistry,
) -> Result<Option<TestServer>, Box<dyn std::error::Error>> {
    let Some(url) = database_url() else {
        return Ok(None);
    };
    let pool = connect(&url).await?;
    reset_schema(&pool, schema).await?;
    let server = start_with(pool, config_for(schema), hooks).await?;
    Ok(Some(server))
}

/// Starts a server for an already prepared schema.
pub async fn start_with(
    pool: PgPool,
    config: ServiceConfig,
    hooks: HookRegistry,
) -> Result<TestServer, Box<dyn std::error::Error>> {
    let service = Arc::new(DatabaseService::with_pool(pool.clone(), &config, hooks).await?);
    let router = service.router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Ok(TestServer {
        base_url: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        pool,
        schema: config.schema.schema_name.clone(),
        service,
        server_handle,
    })
}

/// The fixture rows of `user_alert_messages`, as the API returns them.
pub fn seed_rows() -> Vec<JsonValue> {
    vec![
        json!({"id": 1, "userName": "b user", "message": "message1"}),
        json!({"id": 2, "userName": "a user", "message": "message2"}),
        json!({"id": 3, "userName": "c user", "message": "message3"}),
    ]
}

pub fn error_body(code: u16, message: &str) -> JsonValue {
    json!({"code": code, "message": message})
}

/// The id at the end of a `location` header.
pub fn id_from_location(res: &reqwest::Response) -> Option<i64> {
    res.headers()
        .get(reqwest::header::LOCATION)?
        .to_str()
        .ok()?
        .rsplit('/')
        .next()?
        .parse()
        .ok()
}
