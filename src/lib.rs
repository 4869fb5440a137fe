pub mod app;
pub mod domain;
pub mod error;
pub mod infra;
pub mod transport;

// Convenience re-exports (keeps call-sites clean)
pub use app::database_service::DatabaseService;
pub use app::dispatcher::TransactionalDispatcher;
pub use app::query_builder::QueryBuilder;
pub use domain::hooks::{Hook, HookPhase, HookRegistry, LifecycleEvent};
pub use domain::naming::{CamelSnake, HyphenUnderscore, NameTranslator, Naming};
pub use domain::operation::{OperationRequest, OperationResult, PendingResponse};
pub use domain::schema::{ColumnType, SchemaConfig, SchemaRegistry, SchemaSnapshot, Table};
pub use error::{ApiError, ApiResult};
pub use infra::config::ServiceConfig;
