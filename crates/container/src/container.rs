//! Composition root: provider and module registries, the injector and the
//! lifecycle manager behind one public API.
//!
//! Duplicate registrations are never errors, but the two registration paths
//! treat them differently:
//! - module path ([`Container::register`]): first registration wins, later
//!   duplicates are skipped with a warning;
//! - standalone path ([`Container::register_provider`] and friends): the
//!   existing entry is overwritten with a warning.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::{
    any::Any,
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
    future::Future,
    sync::Arc,
};
use tracing::{debug, info, warn};

use crate::{
    config::ContainerConfig,
    error::{ContainerError, ContainerResult},
    graph::DependencyGraph,
    injector::{Injector, InjectorStats, Resolver},
    instance::Instance,
    lifecycle::{LifecycleManager, LifecycleState},
    module::{Module, ModuleDefinition},
    provider::{Provider, ProviderDefinition, ProviderSummary, Token},
    registry::ProviderRegistry,
    request::{RequestId, RequestScope},
};

#[derive(Default)]
struct ModuleRegistry {
    order: Vec<String>,
    modules: HashMap<String, Arc<Module>>,
    global: BTreeSet<String>,
}

impl ModuleRegistry {
    fn all(&self) -> Vec<Arc<Module>> {
        self.order
            .iter()
            .filter_map(|name| self.modules.get(name).cloned())
            .collect()
    }
}

/// The composition root. Owns every provider and module, and wires the
/// injector and lifecycle manager to them.
pub struct Container {
    config: ContainerConfig,
    registry: Arc<ProviderRegistry>,
    modules: RwLock<ModuleRegistry>,
    injector: Injector,
    lifecycle: LifecycleManager,
    active_requests: Mutex<HashSet<RequestId>>,
}

impl Container {
    /// Empty container with default settings
    pub fn new() -> Self {
        Self::build(ContainerConfig::default())
    }

    /// Create a container and register the config's literal values
    pub fn with_config(config: ContainerConfig) -> ContainerResult<Self> {
        let values = config.values.clone();
        let container = Self::build(config);
        for (token, value) in values {
            container.register_value(token, Instance::new(value))?;
        }
        Ok(container)
    }

    fn build(config: ContainerConfig) -> Self {
        let registry = Arc::new(ProviderRegistry::new());
        Self {
            injector: Injector::new(registry.clone()),
            lifecycle: LifecycleManager::new(registry.clone(), config.hook_timeout()),
            registry,
            modules: RwLock::new(ModuleRegistry::default()),
            active_requests: Mutex::new(HashSet::new()),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub(crate) fn injector(&self) -> &Injector {
        &self.injector
    }

    // === Registration ===

    /// Register a module and its providers. A module name that is already
    /// registered is skipped; a provider token already claimed is skipped.
    pub fn register(&self, definition: ModuleDefinition) -> ContainerResult<()> {
        let name = definition.name().to_string();
        if self.modules.read().modules.contains_key(&name) {
            warn!("Module '{}' is already registered, skipping", name);
            return Ok(());
        }

        let providers = definition
            .providers()
            .iter()
            .cloned()
            .map(Provider::new)
            .collect::<ContainerResult<Vec<_>>>()?;

        let module = Arc::new(Module::new(definition));
        {
            let mut modules = self.modules.write();
            if module.is_global() {
                modules.global.insert(name.clone());
            }
            modules.order.push(name.clone());
            modules.modules.insert(name.clone(), module);
        }

        let mut registered = 0;
        for provider in providers {
            let token = provider.token().to_string();
            if self.registry.insert_if_absent(provider) {
                registered += 1;
            } else {
                let owner = self
                    .registry
                    .get(&token)
                    .and_then(|p| p.module().map(str::to_string))
                    .unwrap_or_else(|| "<standalone>".to_string());
                warn!(
                    "Provider '{}' from module '{}' is already registered by '{}', skipping",
                    token, name, owner
                );
            }
        }

        info!("📦 Registered module '{}' ({} providers)", name, registered);
        Ok(())
    }

    /// Register a standalone provider, overwriting an existing entry
    pub fn register_provider(&self, definition: ProviderDefinition) -> ContainerResult<()> {
        let provider = Provider::new(definition)?;
        let token = provider.token().to_string();
        if self.registry.insert_or_replace(provider).is_some() {
            warn!("Provider '{}' was already registered, overwriting", token);
        } else {
            debug!("Registered provider '{}'", token);
        }
        Ok(())
    }

    /// Register a ready-made value as a singleton
    pub fn register_value(&self, token: impl Into<Token>, value: Instance) -> ContainerResult<()> {
        self.register_provider(ProviderDefinition::value(token, value))
    }

    /// Register a singleton factory called with `deps` resolved in order
    pub fn register_factory<I, S, F>(
        &self,
        token: impl Into<Token>,
        dependencies: I,
        factory: F,
    ) -> ContainerResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<Token>,
        F: Fn(&Resolver<'_>, &[Instance]) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        self.register_provider(
            ProviderDefinition::factory(token, factory).with_dependencies(dependencies),
        )
    }

    // === Queries ===

    pub fn has(&self, token: &str) -> bool {
        self.registry.contains(token)
    }

    /// Live provider entry for `token`, including its caches
    pub fn get_provider(&self, token: &str) -> Option<Arc<Provider>> {
        self.registry.get(token)
    }

    /// All providers in registration order
    pub fn get_providers(&self) -> Vec<Arc<Provider>> {
        self.registry.all()
    }

    /// Singletons that have been built, in registration order
    pub fn get_singletons(&self) -> Vec<(Token, Instance)> {
        self.registry
            .all()
            .into_iter()
            .filter_map(|p| p.singleton_instance().map(|i| (p.token().to_string(), i)))
            .collect()
    }

    // === Resolution ===

    /// Resolve `token` outside any request context
    pub fn resolve(&self, token: &str) -> ContainerResult<Instance> {
        Resolver::new(self, None).resolve(token)
    }

    /// Resolve with an explicit request context. Request-scoped providers
    /// fail with `ScopeContext` unless `request` is still active.
    pub fn resolve_in(&self, token: &str, request: &RequestId) -> ContainerResult<Instance> {
        Resolver::new(self, Some(request.clone())).resolve(token)
    }

    /// Resolve and downcast, failing with `TypeMismatch` on a wrong `T`
    pub fn resolve_as<T>(&self, token: &str) -> ContainerResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        Resolver::new(self, None).resolve_as(token)
    }

    pub fn resolve_as_in<T>(&self, token: &str, request: &RequestId) -> ContainerResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        Resolver::new(self, Some(request.clone())).resolve_as(token)
    }

    /// Resolve every provider carrying `tag`, in priority order
    pub fn resolve_all(&self, tag: &str) -> ContainerResult<Vec<Instance>> {
        let mut tagged: Vec<_> = self
            .registry
            .all()
            .into_iter()
            .filter(|p| p.has_tag(tag))
            .collect();
        tagged.sort_by_key(|p| p.priority());
        tagged.iter().map(|p| self.resolve(p.token())).collect()
    }

    /// Resolve each token in order, stopping at the first failure
    pub fn resolve_many<I, S>(&self, tokens: I) -> ContainerResult<Vec<Instance>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokens
            .into_iter()
            .map(|t| self.resolve(t.as_ref()))
            .collect()
    }

    // === Request contexts ===

    /// Start a request context. The returned guard ends it when dropped.
    pub fn create_request_context(&self) -> RequestScope<'_> {
        let scope = RequestScope::new(self);
        self.active_requests.lock().insert(scope.id().clone());
        debug!("Started request context {}", scope.id());
        scope
    }

    /// Deactivate `request` and clear every request-scoped instance cached
    /// under it. Returns the number of instances dropped; ending twice is
    /// harmless.
    pub fn end_request_context(&self, request: &RequestId) -> usize {
        self.active_requests.lock().remove(request);
        let cleared = self
            .registry
            .all()
            .iter()
            .filter(|p| p.clear_request(request))
            .count();
        debug!(
            "Ended request context {} ({} instances cleared)",
            request, cleared
        );
        cleared
    }

    /// Run `f` inside a fresh request context, ended on every exit path
    pub fn run_in_request_context<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&RequestScope<'_>) -> R,
    {
        let scope = self.create_request_context();
        f(&scope)
    }

    /// Async variant of [`Container::run_in_request_context`]; the future
    /// receives the request id to resolve with via [`Container::resolve_in`].
    pub async fn run_in_request_context_async<F, Fut, R>(&self, f: F) -> R
    where
        F: FnOnce(RequestId) -> Fut,
        Fut: Future<Output = R>,
    {
        let scope = self.create_request_context();
        f(scope.id().clone()).await
    }

    /// Whether `request` was created here and has not ended yet
    pub fn is_request_active(&self, request: &RequestId) -> bool {
        self.active_requests.lock().contains(request)
    }

    pub fn active_request_count(&self) -> usize {
        self.active_requests.lock().len()
    }

    // === Linking and validation ===

    /// Resolve module imports to live modules and link global modules into
    /// every other module. Safe to call repeatedly.
    pub fn link_modules(&self) -> ContainerResult<()> {
        let modules = self.modules.read();
        let all = modules.all();

        for module in &all {
            module.clear_imports();
            for import in module.definition().imports() {
                let target = modules.modules.get(import).ok_or_else(|| {
                    ContainerError::configuration(format!(
                        "module '{}' imports unknown module '{}'",
                        module.name(),
                        import
                    ))
                })?;
                module.link_import(target.clone());
            }
        }

        for global in modules.global.iter().filter_map(|g| modules.modules.get(g)) {
            for module in all.iter().filter(|m| m.name() != global.name()) {
                module.link_import(global.clone());
            }
        }

        debug!("Linked {} modules", all.len());
        Ok(())
    }

    /// Link modules, check every dependency exists and, when configured,
    /// reject dependency cycles before anything is built.
    pub fn validate(&self) -> ContainerResult<()> {
        self.link_modules()?;

        let providers = self.registry.all();
        let mut missing = Vec::new();
        for provider in &providers {
            let targets = provider
                .dependencies()
                .iter()
                .map(String::as_str)
                .chain(provider.alias_target());
            for dep in targets {
                if !self.registry.contains(dep) {
                    missing.push(format!("{} -> {}", provider.token(), dep));
                }
            }
        }
        if !missing.is_empty() {
            return Err(ContainerError::configuration(format!(
                "unresolvable dependencies: {}",
                missing.join(", ")
            )));
        }

        if self.config.warn_on_hidden_dependencies {
            self.warn_hidden_dependencies(&providers);
        }

        if self.config.validate_graph_on_init {
            let graph = DependencyGraph::from_providers(&providers);
            if let Some(cycle) = graph.find_cycles().into_iter().next() {
                return Err(ContainerError::CircularDependency { path: cycle });
            }
        }

        debug!("✅ Validated {} providers", providers.len());
        Ok(())
    }

    fn warn_hidden_dependencies(&self, providers: &[Arc<Provider>]) {
        let modules = self.modules.read();
        for provider in providers {
            let Some(module) = provider.module().and_then(|m| modules.modules.get(m)) else {
                continue;
            };
            for dep in provider.dependencies() {
                if !module.can_see(dep) {
                    warn!(
                        "'{}' in module '{}' depends on '{}', which the module does not import",
                        provider.token(),
                        module.name(),
                        dep
                    );
                }
            }
        }
    }

    // === Lifecycle ===

    /// Validate (unless already initialized), then run `onInit` on every
    /// singleton in priority order. `args` are passed to each hook.
    pub async fn initialize_all(&self, args: &[Value]) -> ContainerResult<()> {
        if !self.lifecycle.is_initialized() {
            self.validate()?;
        }
        self.lifecycle.initialize_all(self, args).await
    }

    /// Per-frame `beforeUpdate` on every built singleton that declares it
    pub fn before_update(&self, dt: f64) -> ContainerResult<()> {
        self.lifecycle.before_update(dt)
    }

    pub fn after_update(&self, dt: f64) -> ContainerResult<()> {
        self.lifecycle.after_update(dt)
    }

    /// Run destroy hooks, then drop every cached instance regardless of how
    /// the hooks went. A call refused because initialization or teardown is
    /// already in flight leaves every cache untouched.
    pub async fn destroy_all(&self) -> ContainerResult<()> {
        let result = self.lifecycle.destroy_all().await;
        if let Err(err @ ContainerError::InvalidState { .. }) = &result {
            warn!("destroy_all refused: {}", err);
            return result;
        }
        for provider in self.registry.all() {
            provider.clear_instances();
        }
        info!("Container '{}' reset", self.config.name);
        result
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Tokens whose `onInit` completed, in the order they ran
    pub fn init_order(&self) -> Vec<Token> {
        self.lifecycle.init_order()
    }

    // === Introspection ===

    /// Fresh snapshot; later registrations are not reflected in it
    pub fn get_graph(&self) -> DependencyGraph {
        DependencyGraph::from_providers(&self.registry.all())
    }

    pub fn get_module_names(&self) -> Vec<String> {
        self.modules.read().order.clone()
    }

    pub fn get_module(&self, name: &str) -> Option<Arc<Module>> {
        self.modules.read().modules.get(name).cloned()
    }

    pub fn injector_stats(&self) -> InjectorStats {
        self.injector.stats()
    }

    /// Serializable snapshot of the whole container for diagnostics
    pub fn get_debug_info(&self) -> DebugInfo {
        let providers = self.registry.all();
        let modules = self.modules.read();
        let (before_update_hooks, after_update_hooks) = self.lifecycle.hooked_counts();

        DebugInfo {
            name: self.config.name.clone(),
            state: self.lifecycle.state(),
            provider_count: providers.len(),
            module_count: modules.order.len(),
            global_modules: modules.global.iter().cloned().collect(),
            singletons: providers
                .iter()
                .filter(|p| p.singleton_instance().is_some())
                .map(|p| p.token().to_string())
                .collect(),
            init_order: self.lifecycle.init_order(),
            before_update_hooks,
            after_update_hooks,
            injector: self.injector.stats(),
            providers: providers.iter().map(|p| p.summary()).collect(),
            modules: modules
                .all()
                .iter()
                .map(|m| ModuleSummary {
                    name: m.name().to_string(),
                    global: m.is_global(),
                    imports: m.import_names(),
                    providers: m.provider_tokens().into_iter().collect(),
                    exports: m.exported_tokens().into_iter().collect(),
                })
                .collect(),
        }
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.config.name)
            .field("providers", &self.registry.len())
            .field("modules", &self.modules.read().order)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub global: bool,
    pub imports: Vec<String>,
    pub providers: Vec<Token>,
    pub exports: Vec<Token>,
}

/// Snapshot of container state for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct DebugInfo {
    pub name: String,
    pub state: LifecycleState,
    pub provider_count: usize,
    pub module_count: usize,
    pub global_modules: Vec<String>,
    pub singletons: Vec<Token>,
    pub init_order: Vec<Token>,
    pub before_update_hooks: usize,
    pub after_update_hooks: usize,
    pub injector: InjectorStats,
    pub providers: Vec<ProviderSummary>,
    pub modules: Vec<ModuleSummary>,
}
