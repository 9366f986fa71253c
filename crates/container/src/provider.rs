//! Provider descriptors and their per-provider instance caches.
//!
//! A [`ProviderDefinition`] is the immutable description of how to build one
//! token; a [`Provider`] is the live registry entry that wraps a validated
//! definition together with its singleton / request caches and the
//! `initialized` flag the lifecycle manager maintains.

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    any::Any,
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};
use tracing::debug;

use crate::{
    error::{ContainerError, ContainerResult},
    injector::Resolver,
    instance::Instance,
    request::RequestId,
};

/// Unique string key identifying a service
pub type Token = String;

/// Lifetime policy for a provider's instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// One instance for the lifetime of the container
    #[default]
    Singleton,
    /// Never cached, every resolution builds a new instance
    Transient,
    /// One instance per active request context
    Request,
}

/// Hook names bound on a provider. `None` means the hook is not declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleHooks {
    pub on_init: Option<String>,
    pub on_destroy: Option<String>,
    pub before_update: Option<String>,
    pub after_update: Option<String>,
}

impl LifecycleHooks {
    pub const ON_INIT: &'static str = "onInit";
    pub const ON_DESTROY: &'static str = "onDestroy";
    pub const BEFORE_UPDATE: &'static str = "beforeUpdate";
    pub const AFTER_UPDATE: &'static str = "afterUpdate";

    /// All four hooks bound to their conventional names
    pub fn standard() -> Self {
        Self {
            on_init: Some(Self::ON_INIT.to_string()),
            on_destroy: Some(Self::ON_DESTROY.to_string()),
            before_update: Some(Self::BEFORE_UPDATE.to_string()),
            after_update: Some(Self::AFTER_UPDATE.to_string()),
        }
    }

    /// Rename the `onInit` hook
    pub fn with_on_init(mut self, name: impl Into<String>) -> Self {
        self.on_init = Some(name.into());
        self
    }

    pub fn with_on_destroy(mut self, name: impl Into<String>) -> Self {
        self.on_destroy = Some(name.into());
        self
    }

    pub fn with_before_update(mut self, name: impl Into<String>) -> Self {
        self.before_update = Some(name.into());
        self
    }

    pub fn with_after_update(mut self, name: impl Into<String>) -> Self {
        self.after_update = Some(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.on_init.is_none()
            && self.on_destroy.is_none()
            && self.before_update.is_none()
            && self.after_update.is_none()
    }
}

/// One entry of a class injection manifest: inject `token` into `slot`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    pub token: Token,
    pub slot: String,
}

/// Resolved dependencies handed to a class builder, keyed by slot name
pub struct Injections {
    owner: Token,
    slots: HashMap<String, Instance>,
}

impl Injections {
    /// Typed slot lookup
    pub fn get<T>(&self, slot: &str) -> anyhow::Result<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let instance = self
            .slots
            .get(slot)
            .ok_or_else(|| anyhow::anyhow!("'{}' has no injection slot '{}'", self.owner, slot))?;
        instance.downcast::<T>().ok_or_else(|| {
            anyhow::anyhow!(
                "slot '{}' of '{}' holds {} and not {}",
                slot,
                self.owner,
                instance.type_name(),
                std::any::type_name::<T>()
            )
        })
    }

    /// Instance injected into `slot`, if the manifest named it
    pub fn instance(&self, slot: &str) -> Option<&Instance> {
        self.slots.get(slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

type ClassBuilder = Arc<dyn Fn(&Injections) -> anyhow::Result<Instance> + Send + Sync>;

/// Factory signature: the resolver continues the current resolution chain,
/// followed by the resolved dependency values in declaration order.
pub type FactoryFn =
    Arc<dyn Fn(&Resolver<'_>, &[Instance]) -> anyhow::Result<Instance> + Send + Sync>;

/// Class construction: a builder plus the declarative injection manifest
#[derive(Clone)]
pub struct ClassSpec {
    builder: ClassBuilder,
    manifest: Vec<Injection>,
}

impl ClassSpec {
    /// Builder called with the injected slots
    pub fn new<F>(builder: F) -> Self
    where
        F: Fn(&Injections) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self {
            builder: Arc::new(builder),
            manifest: Vec::new(),
        }
    }

    /// Inject the instance resolved for `token` into `slot`
    pub fn inject(mut self, token: impl Into<Token>, slot: impl Into<String>) -> Self {
        self.manifest.push(Injection {
            token: token.into(),
            slot: slot.into(),
        });
        self
    }

    pub fn manifest(&self) -> &[Injection] {
        &self.manifest
    }
}

/// How a provider produces its instance
#[derive(Clone)]
pub enum ProviderKind {
    Class(ClassSpec),
    Factory(FactoryFn),
    Value(Instance),
    Alias(Token),
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Class(_) => "class",
            ProviderKind::Factory(_) => "factory",
            ProviderKind::Value(_) => "value",
            ProviderKind::Alias(_) => "alias",
        }
    }
}

impl fmt::Debug for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Class(spec) => f
                .debug_struct("Class")
                .field("manifest", &spec.manifest)
                .finish(),
            ProviderKind::Factory(_) => f.write_str("Factory"),
            ProviderKind::Value(instance) => f.debug_tuple("Value").field(instance).finish(),
            ProviderKind::Alias(target) => f.debug_tuple("Alias").field(target).finish(),
        }
    }
}

/// Immutable description of a provider
#[derive(Debug, Clone)]
pub struct ProviderDefinition {
    token: Token,
    kind: ProviderKind,
    dependencies: Vec<Token>,
    scope: Scope,
    priority: i32,
    hooks: LifecycleHooks,
    tags: BTreeSet<String>,
    module: Option<String>,
}

impl ProviderDefinition {
    fn with_kind(token: impl Into<Token>, kind: ProviderKind) -> Self {
        Self {
            token: token.into(),
            kind,
            dependencies: Vec::new(),
            scope: Scope::default(),
            priority: 0,
            hooks: LifecycleHooks::default(),
            tags: BTreeSet::new(),
            module: None,
        }
    }

    /// Build through a [`ClassSpec`] and its injection manifest
    pub fn class(token: impl Into<Token>, spec: ClassSpec) -> Self {
        Self::with_kind(token, ProviderKind::Class(spec))
    }

    /// Build by calling `factory` with the resolved dependencies
    pub fn factory<F>(token: impl Into<Token>, factory: F) -> Self
    where
        F: Fn(&Resolver<'_>, &[Instance]) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self::with_kind(token, ProviderKind::Factory(Arc::new(factory)))
    }

    /// Fixed value; every resolution returns the same instance
    pub fn value(token: impl Into<Token>, value: Instance) -> Self {
        Self::with_kind(token, ProviderKind::Value(value))
    }

    /// Resolve to whatever `target` resolves to
    pub fn alias(token: impl Into<Token>, target: impl Into<Token>) -> Self {
        Self::with_kind(token, ProviderKind::Alias(target.into()))
    }

    pub fn depends_on(mut self, token: impl Into<Token>) -> Self {
        let token = token.into();
        if !self.dependencies.contains(&token) {
            self.dependencies.push(token);
        }
        self
    }

    pub fn with_dependencies<I, S>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Token>,
    {
        tokens.into_iter().fold(self, |def, t| def.depends_on(t))
    }

    /// Lifetime of built instances; [`Scope::Singleton`] by default
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Lower priorities initialize first; `0` by default
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub(crate) fn in_module(mut self, module: &str) -> Self {
        self.module = Some(module.to_string());
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    pub fn dependencies(&self) -> &[Token] {
        &self.dependencies
    }

    /// Scope as configured on this definition
    pub fn get_scope(&self) -> Scope {
        self.scope
    }

    /// Priority as configured on this definition
    pub fn get_priority(&self) -> i32 {
        self.priority
    }

    /// Hook names as configured on this definition
    pub fn get_hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Owning module, stamped by `define_module`
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }
}

#[derive(Default)]
struct ProviderState {
    instance: Option<Instance>,
    initialized: bool,
    request_instances: HashMap<RequestId, Instance>,
}

/// Live registry entry: validated definition plus instance caches
pub struct Provider {
    definition: ProviderDefinition,
    /// Declared dependencies followed by manifest tokens not already declared
    dependencies: Vec<Token>,
    state: RwLock<ProviderState>,
    /// Serializes construct-and-cache for Singleton and Request scopes
    build_lock: Mutex<()>,
}

impl Provider {
    /// Validate `definition` and create an empty cache for it
    pub fn new(definition: ProviderDefinition) -> ContainerResult<Self> {
        if definition.token.trim().is_empty() {
            return Err(ContainerError::configuration(
                "provider token must not be empty",
            ));
        }

        if let Some(dep) = definition.dependencies.iter().find(|d| d.trim().is_empty()) {
            return Err(ContainerError::configuration(format!(
                "provider '{}' declares an empty dependency token {:?}",
                definition.token, dep
            )));
        }

        let mut dependencies = definition.dependencies.clone();
        match &definition.kind {
            ProviderKind::Alias(target) if target.trim().is_empty() => {
                return Err(ContainerError::configuration(format!(
                    "alias provider '{}' has an empty target token",
                    definition.token
                )));
            }
            ProviderKind::Alias(target) if *target == definition.token => {
                return Err(ContainerError::configuration(format!(
                    "alias provider '{}' points at itself",
                    definition.token
                )));
            }
            ProviderKind::Class(spec) => {
                let mut slots = BTreeSet::new();
                for injection in &spec.manifest {
                    if injection.token.trim().is_empty() || injection.slot.trim().is_empty() {
                        return Err(ContainerError::configuration(format!(
                            "class provider '{}' has an injection with an empty token or slot",
                            definition.token
                        )));
                    }
                    if !slots.insert(injection.slot.as_str()) {
                        return Err(ContainerError::configuration(format!(
                            "class provider '{}' injects slot '{}' twice",
                            definition.token, injection.slot
                        )));
                    }
                    if !dependencies.contains(&injection.token) {
                        dependencies.push(injection.token.clone());
                    }
                }
            }
            _ => {}
        }

        Ok(Self {
            definition,
            dependencies,
            state: RwLock::new(ProviderState::default()),
            build_lock: Mutex::new(()),
        })
    }

    pub fn definition(&self) -> &ProviderDefinition {
        &self.definition
    }

    pub fn token(&self) -> &str {
        &self.definition.token
    }

    pub fn kind(&self) -> &ProviderKind {
        &self.definition.kind
    }

    pub fn dependencies(&self) -> &[Token] {
        &self.dependencies
    }

    pub fn scope(&self) -> Scope {
        self.definition.scope
    }

    pub fn priority(&self) -> i32 {
        self.definition.priority
    }

    pub fn hooks(&self) -> &LifecycleHooks {
        &self.definition.hooks
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.definition.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.definition.tags.contains(tag)
    }

    pub fn module(&self) -> Option<&str> {
        self.definition.module.as_deref()
    }

    /// Target token for aliases, `None` for everything else
    pub fn alias_target(&self) -> Option<&str> {
        match &self.definition.kind {
            ProviderKind::Alias(target) => Some(target.as_str()),
            _ => None,
        }
    }

    /// Build a new instance from already resolved dependency values.
    ///
    /// `resolved` is aligned with [`Provider::dependencies`].
    pub fn create_instance(
        &self,
        resolved: &[Instance],
        resolver: &Resolver<'_>,
    ) -> ContainerResult<Instance> {
        match &self.definition.kind {
            ProviderKind::Class(spec) => {
                let mut slots = HashMap::with_capacity(spec.manifest.len());
                for injection in &spec.manifest {
                    if let Some(idx) = self.dependencies.iter().position(|d| d == &injection.token)
                    {
                        if let Some(instance) = resolved.get(idx) {
                            slots.insert(injection.slot.clone(), instance.clone());
                        }
                    }
                }
                let injections = Injections {
                    owner: self.definition.token.clone(),
                    slots,
                };
                (spec.builder)(&injections).map_err(|e| ContainerError::factory(self.token(), e))
            }
            ProviderKind::Factory(factory) => {
                factory(resolver, resolved).map_err(|e| ContainerError::factory(self.token(), e))
            }
            ProviderKind::Value(value) => Ok(value.clone()),
            ProviderKind::Alias(target) => Err(ContainerError::configuration(format!(
                "alias '{}' has no construction step, resolve '{}' instead",
                self.token(),
                target
            ))),
        }
    }

    pub(crate) fn build_guard(&self) -> MutexGuard<'_, ()> {
        self.build_lock.lock()
    }

    /// Cached singleton, if it has been built
    pub fn singleton_instance(&self) -> Option<Instance> {
        self.state.read().instance.clone()
    }

    pub(crate) fn store_singleton(&self, instance: Instance) {
        self.state.write().instance = Some(instance);
    }

    /// Instance cached for `request`, if any
    pub fn request_instance(&self, request: &RequestId) -> Option<Instance> {
        self.state.read().request_instances.get(request).cloned()
    }

    pub(crate) fn store_request_instance(&self, request: &RequestId, instance: Instance) {
        self.state
            .write()
            .request_instances
            .insert(request.clone(), instance);
    }

    pub(crate) fn clear_request(&self, request: &RequestId) -> bool {
        self.state.write().request_instances.remove(request).is_some()
    }

    /// Number of request contexts with a cached instance
    pub fn request_instance_count(&self) -> usize {
        self.state.read().request_instances.len()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    pub(crate) fn set_initialized(&self, initialized: bool) {
        self.state.write().initialized = initialized;
    }

    /// Drop the singleton and every request instance
    pub(crate) fn clear_instances(&self) {
        let mut state = self.state.write();
        state.instance = None;
        state.initialized = false;
        state.request_instances.clear();
        debug!("Cleared instance caches for '{}'", self.definition.token);
    }

    /// Serializable view for debug output
    pub fn summary(&self) -> ProviderSummary {
        let state = self.state.read();
        ProviderSummary {
            token: self.definition.token.clone(),
            kind: self.definition.kind.name(),
            scope: self.definition.scope,
            priority: self.definition.priority,
            dependencies: self.dependencies.clone(),
            tags: self.definition.tags.iter().cloned().collect(),
            module: self.definition.module.clone(),
            instantiated: state.instance.is_some(),
            initialized: state.initialized,
            request_instances: state.request_instances.len(),
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("token", &self.definition.token)
            .field("kind", &self.definition.kind.name())
            .field("scope", &self.definition.scope)
            .field("priority", &self.definition.priority)
            .field("dependencies", &self.dependencies)
            .field("module", &self.definition.module)
            .finish()
    }
}

/// Serializable snapshot of a provider for debug output
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSummary {
    pub token: Token,
    pub kind: &'static str,
    pub scope: Scope,
    pub priority: i32,
    pub dependencies: Vec<Token>,
    pub tags: Vec<String>,
    pub module: Option<String>,
    pub instantiated: bool,
    pub initialized: bool,
    pub request_instances: usize,
}
