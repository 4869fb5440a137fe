//! Lifecycle hooks: caller-supplied code that runs before or after the core operation
//! of an event, inside the request's transaction.

use crate::domain::operation::{OperationRequest, PendingResponse};
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use sqlx::PgConnection;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub mod registry;

pub use registry::HookRegistry;

/// The closed set of CRUD lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleEvent {
    Get,
    GetList,
    GetCount,
    Post,
    Put,
    Delete,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 6] = [
        LifecycleEvent::Get,
        LifecycleEvent::GetList,
        LifecycleEvent::GetCount,
        LifecycleEvent::Post,
        LifecycleEvent::Put,
        LifecycleEvent::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Get => "get",
            LifecycleEvent::GetList => "getList",
            LifecycleEvent::GetCount => "getCount",
            LifecycleEvent::Post => "post",
            LifecycleEvent::Put => "put",
            LifecycleEvent::Delete => "delete",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LifecycleEvent::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| ApiError::InvalidEvent(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    Pre,
    Post,
}

/// A hook. `C` is the transaction handle hooks receive; it is a Postgres connection
/// in the service and can be anything in tests.
///
/// Returning `Err` stops the chain and rolls the request's transaction back.
#[async_trait]
pub trait Hook<C: ?Sized + Send + 'static = PgConnection>: Send + Sync {
    async fn call(
        &self,
        request: &mut OperationRequest,
        response: &mut PendingResponse,
        conn: &mut C,
    ) -> ApiResult<()>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

pub type HookRef<C = PgConnection> = Arc<dyn Hook<C>>;

/// Runs `chain` in order, stopping at the first hook that fails.
pub async fn run_chain<C: ?Sized + Send + 'static>(
    chain: &[HookRef<C>],
    request: &mut OperationRequest,
    response: &mut PendingResponse,
    conn: &mut C,
) -> ApiResult<()> {
    for hook in chain {
        if let Err(e) = hook.call(request, response, conn).await {
            tracing::debug!(hook = hook.name(), error = %e, "hook aborted the chain");
            return Err(e);
        }
    }
    Ok(())
}
