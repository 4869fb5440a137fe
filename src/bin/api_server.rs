// src/bin/api_server.rs

use pg_rest_hooks::infra::logging;
use pg_rest_hooks::transport;
use pg_rest_hooks::{DatabaseService, HookRegistry, ServiceConfig};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;
    logging::init(config.log_format);

    tracing::info!(
        base_path = %config.base_path,
        schema = %config.schema.schema_name,
        ignored_tables = ?config.schema.ignored_tables,
        "starting service"
    );

    // A schema error here is fatal: the server never starts listening.
    let service = DatabaseService::new(&config, HookRegistry::new()).await?;

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);
    let app = service
        .router()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", transport::http::ApiDoc::openapi()))
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "API server listening");
    tracing::info!("Swagger UI available at /swagger-ui");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    service.pool().close().await;
    tracing::info!("graceful shutdown complete");
    Ok(())
}
