//! Request contexts for `Request`-scoped providers.
//!
//! A request id is never stored as "current" on the injector. It is carried by
//! a [`RequestScope`] guard and threaded through each resolution call, so two
//! scopes can be active at the same time and resolve independently.

use serde::Serialize;
use std::{any::Any, fmt, sync::Arc};

use crate::{
    container::Container,
    error::ContainerResult,
    instance::Instance,
};

/// Ephemeral id owning one set of request-scoped instances
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RequestId(String);

impl RequestId {
    /// Fresh v4 uuid
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Active request context. Dropping it ends the context and clears every
/// request-scoped instance built under its id, on every exit path.
pub struct RequestScope<'a> {
    container: &'a Container,
    id: RequestId,
    ended: bool,
}

impl<'a> RequestScope<'a> {
    pub(crate) fn new(container: &'a Container) -> Self {
        Self {
            container,
            id: RequestId::generate(),
            ended: false,
        }
    }

    /// Id to pass to [`Container::resolve_in`] from async code
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Resolve under this context
    pub fn resolve(&self, token: &str) -> ContainerResult<Instance> {
        self.container.resolve_in(token, &self.id)
    }

    pub fn resolve_as<T>(&self, token: &str) -> ContainerResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.container.resolve_as_in(token, &self.id)
    }

    /// End the context now; returns how many cached instances were dropped
    pub fn end(mut self) -> usize {
        self.ended = true;
        self.container.end_request_context(&self.id)
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        if !self.ended {
            self.container.end_request_context(&self.id);
        }
    }
}

impl fmt::Debug for RequestScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope").field("id", &self.id).finish()
    }
}
