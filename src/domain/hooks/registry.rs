//! HookRegistry: ordered storage of global and resource-scoped hooks per event and phase.

use crate::domain::hooks::{Hook, HookPhase, HookRef, LifecycleEvent};
use crate::error::ApiResult;
use sqlx::PgConnection;
use std::collections::HashMap;
use std::sync::Arc;

type Slot = (LifecycleEvent, HookPhase);

pub struct HookRegistry<C: ?Sized + Send + 'static = PgConnection> {
    global: HashMap<Slot, Vec<HookRef<C>>>,
    by_resource: HashMap<Slot, HashMap<String, Vec<HookRef<C>>>>,
}

impl<C: ?Sized + Send + 'static> HookRegistry<C> {
    pub fn new() -> Self {
        Self {
            global: HashMap::new(),
            by_resource: HashMap::new(),
        }
    }

    /// Appends a hook that runs for every resource.
    pub fn add_global_hook<H>(&mut self, event: LifecycleEvent, phase: HookPhase, hook: H) -> &mut Self
    where
        H: Hook<C> + 'static,
    {
        self.global
            .entry((event, phase))
            .or_default()
            .push(Arc::new(hook));
        self
    }

    /// Appends a hook that runs only for `resource` (exact match on the external name).
    pub fn add_resource_hook<H>(
        &mut self,
        event: LifecycleEvent,
        resource: impl Into<String>,
        phase: HookPhase,
        hook: H,
    ) -> &mut Self
    where
        H: Hook<C> + 'static,
    {
        self.by_resource
            .entry((event, phase))
            .or_default()
            .entry(resource.into())
            .or_default()
            .push(Arc::new(hook));
        self
    }

    /// Registration by event name. Fails with `InvalidEvent` for names outside the closed set.
    pub fn register<H>(
        &mut self,
        event: &str,
        resource: Option<&str>,
        phase: HookPhase,
        hook: H,
    ) -> ApiResult<&mut Self>
    where
        H: Hook<C> + 'static,
    {
        let event: LifecycleEvent = event.parse()?;
        Ok(match resource {
            Some(resource) => self.add_resource_hook(event, resource, phase, hook),
            None => self.add_global_hook(event, phase, hook),
        })
    }

    /// Global hooks in registration order, then the hooks scoped to `resource`.
    pub fn chain_for(&self, event: LifecycleEvent, resource: &str, phase: HookPhase) -> Vec<HookRef<C>> {
        let slot = (event, phase);
        let mut chain: Vec<HookRef<C>> = self.global.get(&slot).cloned().unwrap_or_default();
        if let Some(scoped) = self.by_resource.get(&slot).and_then(|m| m.get(resource)) {
            chain.extend(scoped.iter().cloned());
        }
        chain
    }

    pub fn is_empty(&self) -> bool {
        self.global.values().all(|v| v.is_empty())
            && self
                .by_resource
                .values()
                .all(|m| m.values().all(|v| v.is_empty()))
    }
}

impl<C: ?Sized + Send + 'static> Default for HookRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
