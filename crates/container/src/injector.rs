//! Resolution engine.
//!
//! Resolution is single-pass, depth-first and eagerly caching. Each top-level
//! call owns its own [`ResolutionContext`] (resolution stack + optional request
//! id); nothing about an in-flight resolution is stored on the [`Injector`].
//! Re-entering a token that is already on the stack is a hard
//! `CircularDependency` failure, there are no lazy proxies.

use serde::Serialize;
use std::{
    any::Any,
    cell::RefCell,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{debug, trace};

use crate::{
    container::Container,
    error::{ContainerError, ContainerResult},
    instance::Instance,
    provider::{Provider, ProviderKind, Scope, Token},
    registry::ProviderRegistry,
    request::RequestId,
};

/// Per-call resolution state
#[derive(Debug, Default)]
pub struct ResolutionContext {
    stack: Vec<Token>,
    request: Option<RequestId>,
}

impl ResolutionContext {
    pub fn new(request: Option<RequestId>) -> Self {
        Self {
            stack: Vec::new(),
            request,
        }
    }
}

/// Pops the resolution stack when dropped, whatever the exit path
struct StackGuard<'a> {
    ctx: &'a RefCell<ResolutionContext>,
}

impl<'a> StackGuard<'a> {
    fn enter(ctx: &'a RefCell<ResolutionContext>, token: &str) -> ContainerResult<Self> {
        let mut state = ctx.borrow_mut();
        if state.stack.iter().any(|t| t == token) {
            let mut path = state.stack.clone();
            path.push(token.to_string());
            return Err(ContainerError::CircularDependency { path });
        }
        state.stack.push(token.to_string());
        Ok(Self { ctx })
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        self.ctx.borrow_mut().stack.pop();
    }
}

/// Handle passed to factories. Resolving through it continues the current
/// chain, so cycles that pass through factory code are still detected.
pub struct Resolver<'a> {
    container: &'a Container,
    ctx: RefCell<ResolutionContext>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(container: &'a Container, request: Option<RequestId>) -> Self {
        Self {
            container,
            ctx: RefCell::new(ResolutionContext::new(request)),
        }
    }

    /// Resolve within the current chain and request context
    pub fn resolve(&self, token: &str) -> ContainerResult<Instance> {
        self.container.injector().resolve_with(token, self)
    }

    pub fn resolve_as<T>(&self, token: &str) -> ContainerResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let instance = self.resolve(token)?;
        instance
            .downcast::<T>()
            .ok_or_else(|| ContainerError::TypeMismatch {
                token: token.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    pub fn container(&self) -> &'a Container {
        self.container
    }

    /// Request context this chain resolves under, if any
    pub fn request_id(&self) -> Option<RequestId> {
        self.ctx.borrow().request.clone()
    }

    /// Tokens currently being resolved, oldest first
    pub fn stack(&self) -> Vec<Token> {
        self.ctx.borrow().stack.clone()
    }
}

impl fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("ctx", &self.ctx).finish()
    }
}

/// Resolution counters
#[derive(Debug, Default)]
struct InjectorCounters {
    resolutions: AtomicU64,
    cache_hits: AtomicU64,
    constructions: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InjectorStats {
    pub resolutions: u64,
    pub cache_hits: u64,
    pub constructions: u64,
    pub failures: u64,
}

impl InjectorStats {
    /// Share of resolutions served from a cache, `0.0` before any resolution
    pub fn cache_hit_rate(&self) -> f64 {
        if self.resolutions > 0 {
            (self.cache_hits as f64 / self.resolutions as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Resolution engine shared by every call into the container.
/// Holds no per-call state; each call carries its own [`ResolutionContext`].
pub struct Injector {
    registry: Arc<ProviderRegistry>,
    counters: InjectorCounters,
}

impl Injector {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            counters: InjectorCounters::default(),
        }
    }

    pub fn stats(&self) -> InjectorStats {
        InjectorStats {
            resolutions: self.counters.resolutions.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            constructions: self.counters.constructions.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn resolve_with(
        &self,
        token: &str,
        resolver: &Resolver<'_>,
    ) -> ContainerResult<Instance> {
        self.counters.resolutions.fetch_add(1, Ordering::Relaxed);
        let result = self.resolve_inner(token, resolver);
        if result.is_err() {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn resolve_inner(&self, token: &str, resolver: &Resolver<'_>) -> ContainerResult<Instance> {
        let _guard = StackGuard::enter(&resolver.ctx, token)?;

        let provider = self
            .registry
            .get(token)
            .ok_or_else(|| ContainerError::unknown_provider(token))?;

        if let ProviderKind::Alias(target) = provider.kind() {
            trace!("Alias '{}' defers to '{}'", token, target);
            return resolver.resolve(target);
        }

        match provider.scope() {
            Scope::Singleton => {
                if let Some(instance) = provider.singleton_instance() {
                    return Ok(self.cache_hit(token, instance));
                }
                let _build = provider.build_guard();
                if let Some(instance) = provider.singleton_instance() {
                    return Ok(self.cache_hit(token, instance));
                }
                let instance = self.construct(&provider, resolver)?;
                provider.store_singleton(instance.clone());
                debug!("Cached singleton '{}'", token);
                Ok(instance)
            }
            Scope::Transient => self.construct(&provider, resolver),
            Scope::Request => {
                let request = resolver
                    .request_id()
                    .filter(|id| resolver.container().is_request_active(id))
                    .ok_or_else(|| ContainerError::ScopeContext {
                        token: token.to_string(),
                    })?;
                if let Some(instance) = provider.request_instance(&request) {
                    return Ok(self.cache_hit(token, instance));
                }
                let _build = provider.build_guard();
                if let Some(instance) = provider.request_instance(&request) {
                    return Ok(self.cache_hit(token, instance));
                }
                let instance = self.construct(&provider, resolver)?;
                provider.store_request_instance(&request, instance.clone());
                // the context may have ended while this instance was built
                if !resolver.container().is_request_active(&request) {
                    provider.clear_request(&request);
                }
                debug!("Cached '{}' for request {}", token, request);
                Ok(instance)
            }
        }
    }

    fn cache_hit(&self, token: &str, instance: Instance) -> Instance {
        self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        trace!("Cache hit for '{}'", token);
        instance
    }

    /// Resolve dependencies left to right, then build. Values are never
    /// injected, so their declared dependencies are not resolved.
    fn construct(&self, provider: &Provider, resolver: &Resolver<'_>) -> ContainerResult<Instance> {
        let resolved = match provider.kind() {
            ProviderKind::Value(_) => Vec::new(),
            _ => provider
                .dependencies()
                .iter()
                .map(|dep| resolver.resolve(dep))
                .collect::<ContainerResult<Vec<_>>>()?,
        };

        let instance = provider.create_instance(&resolved, resolver)?;
        self.counters.constructions.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Constructed '{}' ({}) with {} dependencies",
            provider.token(),
            provider.kind().name(),
            resolved.len()
        );
        Ok(instance)
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("providers", &self.registry.len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_guard_pops_on_drop() {
        let ctx = RefCell::new(ResolutionContext::default());
        {
            let _a = StackGuard::enter(&ctx, "A").unwrap();
            {
                let _b = StackGuard::enter(&ctx, "B").unwrap();
                assert_eq!(ctx.borrow().stack, vec!["A".to_string(), "B".to_string()]);
            }
            assert_eq!(ctx.borrow().stack, vec!["A".to_string()]);
        }
        assert!(ctx.borrow().stack.is_empty());
    }

    #[test]
    fn test_stack_guard_reports_full_path() {
        let ctx = RefCell::new(ResolutionContext::default());
        let _a = StackGuard::enter(&ctx, "A").unwrap();
        let _b = StackGuard::enter(&ctx, "B").unwrap();
        let err = StackGuard::enter(&ctx, "A").err().expect("cycle");

        assert_eq!(
            err.cycle_path().unwrap(),
            &["A".to_string(), "B".to_string(), "A".to_string()]
        );
        // failed enter leaves the stack untouched
        assert_eq!(ctx.borrow().stack.len(), 2);
    }

    #[test]
    fn test_hit_rate() {
        let stats = InjectorStats {
            resolutions: 4,
            cache_hits: 1,
            constructions: 3,
            failures: 0,
        };
        assert!((stats.cache_hit_rate() - 25.0).abs() < f64::EPSILON);
        assert_eq!(InjectorStats::default().cache_hit_rate(), 0.0);
    }
}
