//! Ordered startup and teardown of singleton providers.
//!
//! State machine: `Uninitialized -> Initializing -> Initialized -> Destroying
//! -> Uninitialized`. Hooks run strictly one after another; an async hook is
//! awaited to completion before the next provider is touched.

use common::OperationTimer;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::{
    container::Container,
    error::{ContainerError, ContainerResult},
    instance::Instance,
    provider::{Provider, Scope, Token},
    registry::ProviderRegistry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Initialized,
    Destroying,
}

struct LifecycleInner {
    state: LifecycleState,
    init_order: Vec<Token>,
    before_update: Vec<Arc<Provider>>,
    after_update: Vec<Arc<Provider>>,
}

/// Which per-frame list to walk
#[derive(Debug, Clone, Copy)]
enum FramePhase {
    Before,
    After,
}

/// Drives `onInit`/`onDestroy` across singletons and caches the frame hook
/// lists. Owned by the container; all state sits behind one mutex.
pub struct LifecycleManager {
    registry: Arc<ProviderRegistry>,
    inner: Mutex<LifecycleInner>,
    hook_timeout: Option<Duration>,
}

impl LifecycleManager {
    pub fn new(registry: Arc<ProviderRegistry>, hook_timeout: Option<Duration>) -> Self {
        Self {
            registry,
            inner: Mutex::new(LifecycleInner {
                state: LifecycleState::Uninitialized,
                init_order: Vec::new(),
                before_update: Vec::new(),
                after_update: Vec::new(),
            }),
            hook_timeout,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == LifecycleState::Initialized
    }

    /// Tokens in the order their initialization completed
    pub fn init_order(&self) -> Vec<Token> {
        self.inner.lock().init_order.clone()
    }

    /// Number of providers on the (beforeUpdate, afterUpdate) lists
    pub fn hooked_counts(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.before_update.len(), inner.after_update.len())
    }

    /// Initialize every uninitialized singleton provider in priority order.
    /// Calling it again once initialized is a no-op.
    pub async fn initialize_all(
        &self,
        container: &Container,
        args: &[Value],
    ) -> ContainerResult<()> {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                LifecycleState::Initialized => {
                    warn!("initialize_all called on an initialized container, ignoring");
                    return Ok(());
                }
                LifecycleState::Initializing | LifecycleState::Destroying => {
                    return Err(ContainerError::InvalidState {
                        message: format!("cannot initialize while {:?}", inner.state),
                    });
                }
                LifecycleState::Uninitialized => inner.state = LifecycleState::Initializing,
            }
        }

        info!("🚀 Initializing container providers");
        let mut timer = OperationTimer::new("container.initialize_all");
        let result = self.run_initialization(container, args).await;

        let mut inner = self.inner.lock();
        match &result {
            Ok(()) => {
                let (before, after) = self.collect_frame_hooks();
                inner.before_update = before;
                inner.after_update = after;
                inner.state = LifecycleState::Initialized;
                timer.add_field("initialized", inner.init_order.len());
                info!(
                    "✅ Initialized {} providers ({} beforeUpdate, {} afterUpdate)",
                    inner.init_order.len(),
                    inner.before_update.len(),
                    inner.after_update.len()
                );
            }
            Err(e) => {
                // no rollback: providers that completed stay initialized
                inner.state = LifecycleState::Uninitialized;
                error!("❌ Initialization halted: {}", e);
            }
        }
        drop(inner);
        timer.finish_with_result(result.as_ref().map(|_| ()));
        result
    }

    async fn run_initialization(
        &self,
        container: &Container,
        args: &[Value],
    ) -> ContainerResult<()> {
        let mut singletons: Vec<Arc<Provider>> = self
            .registry
            .all()
            .into_iter()
            .filter(|p| p.scope() == Scope::Singleton)
            .collect();
        // stable: ties keep registration order
        singletons.sort_by_key(|p| p.priority());

        for provider in singletons {
            if provider.is_initialized() {
                debug!("'{}' already initialized, skipping", provider.token());
                continue;
            }

            let instance = container.resolve(provider.token())?;
            if let Some(hook) = provider.hooks().on_init.as_deref() {
                self.call_async_hook(&provider, &instance, hook, args).await?;
            }

            self.inner.lock().init_order.push(provider.token().to_string());
            provider.set_initialized(true);
            debug!(
                "Initialized '{}' (priority {})",
                provider.token(),
                provider.priority()
            );
        }
        Ok(())
    }

    fn collect_frame_hooks(&self) -> (Vec<Arc<Provider>>, Vec<Arc<Provider>>) {
        let mut providers = self.registry.all();
        providers.sort_by_key(|p| p.priority());

        let before = providers
            .iter()
            .filter(|p| p.hooks().before_update.is_some())
            .cloned()
            .collect();
        let after = providers
            .into_iter()
            .filter(|p| p.hooks().after_update.is_some())
            .collect();
        (before, after)
    }

    async fn call_async_hook(
        &self,
        provider: &Provider,
        instance: &Instance,
        hook: &str,
        args: &[Value],
    ) -> ContainerResult<()> {
        let Some(target) = instance.hooks().filter(|h| h.responds_to(hook)) else {
            debug!(
                "'{}' declares hook '{}' but its instance does not respond to it",
                provider.token(),
                hook
            );
            return Ok(());
        };

        let call = target.call_async(hook, args);
        let outcome = match self.hook_timeout {
            Some(limit) => match timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(anyhow::anyhow!("timed out after {}ms", limit.as_millis())),
            },
            None => call.await,
        };

        outcome.map_err(|e| {
            error!("Hook '{}' failed on '{}': {:#}", hook, provider.token(), e);
            ContainerError::hook(provider.token(), hook, e)
        })
    }

    pub fn before_update(&self, dt: f64) -> ContainerResult<()> {
        self.run_frame(FramePhase::Before, dt)
    }

    pub fn after_update(&self, dt: f64) -> ContainerResult<()> {
        self.run_frame(FramePhase::After, dt)
    }

    fn run_frame(&self, phase: FramePhase, dt: f64) -> ContainerResult<()> {
        let providers = {
            let inner = self.inner.lock();
            match phase {
                FramePhase::Before => inner.before_update.clone(),
                FramePhase::After => inner.after_update.clone(),
            }
        };

        for provider in providers {
            let hook = match phase {
                FramePhase::Before => provider.hooks().before_update.as_deref(),
                FramePhase::After => provider.hooks().after_update.as_deref(),
            };
            let (Some(hook), Some(instance)) = (hook, provider.singleton_instance()) else {
                continue;
            };
            if let Some(target) = instance.hooks().filter(|h| h.responds_to(hook)) {
                target
                    .call_frame(hook, dt)
                    .map_err(|e| ContainerError::hook(provider.token(), hook, e))?;
            }
        }
        Ok(())
    }

    /// Run `onDestroy` hooks in reverse init order and return to
    /// `Uninitialized`. A failing hook halts the pass; the state is reset
    /// either way.
    pub async fn destroy_all(&self) -> ContainerResult<()> {
        let order = {
            let mut inner = self.inner.lock();
            match inner.state {
                LifecycleState::Initializing | LifecycleState::Destroying => {
                    return Err(ContainerError::InvalidState {
                        message: format!("cannot destroy while {:?}", inner.state),
                    });
                }
                LifecycleState::Uninitialized if inner.init_order.is_empty() => {
                    debug!("destroy_all on an uninitialized container, nothing to do");
                    return Ok(());
                }
                _ => inner.state = LifecycleState::Destroying,
            }
            inner.init_order.clone()
        };

        info!("🛑 Destroying {} providers", order.len());
        let mut timer = OperationTimer::new("container.destroy_all");
        timer.add_field("providers", order.len());
        let result = self.run_teardown(&order).await;

        {
            let mut inner = self.inner.lock();
            inner.init_order.clear();
            inner.before_update.clear();
            inner.after_update.clear();
            inner.state = LifecycleState::Uninitialized;
        }
        timer.finish_with_result(result.as_ref().map(|_| ()));
        result
    }

    async fn run_teardown(&self, order: &[Token]) -> ContainerResult<()> {
        for token in order.iter().rev() {
            let Some(provider) = self.registry.get(token) else {
                continue;
            };
            if !provider.is_initialized() {
                continue;
            }
            if let (Some(hook), Some(instance)) = (
                provider.hooks().on_destroy.as_deref(),
                provider.singleton_instance(),
            ) {
                self.call_async_hook(&provider, &instance, hook, &[]).await?;
            }
            provider.set_initialized(false);
            debug!("Destroyed '{}'", token);
        }
        Ok(())
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LifecycleManager")
            .field("state", &inner.state)
            .field("init_order", &inner.init_order)
            .finish()
    }
}
