//! Dependency-injection and lifecycle container.
//!
//! Providers describe how to build a value for a token (class, factory,
//! literal value or alias) and in which scope to cache it. Modules group
//! providers and control visibility through imports and exports. The
//! [`Container`] resolves tokens depth-first with cycle detection, runs
//! ordered `onInit`/`onDestroy` hooks and per-frame update hooks, and exposes
//! a [`DependencyGraph`] snapshot for offline analysis.

pub mod config;
pub mod container;
pub mod error;
pub mod graph;
pub mod injector;
pub mod instance;
pub mod lifecycle;
pub mod module;
pub mod provider;
pub mod registry;
pub mod request;

pub use config::{ContainerConfig, DEFAULT_ENV_PREFIX};
pub use container::{Container, DebugInfo, ModuleSummary};
pub use error::{ContainerError, ContainerResult, GraphError};
pub use graph::{DependencyGraph, GraphEdge, GraphNode, GraphStats, NodeMetadata};
pub use injector::{Injector, InjectorStats, ResolutionContext, Resolver};
pub use instance::{Instance, Lifecycle};
pub use lifecycle::{LifecycleManager, LifecycleState};
pub use module::{
    create_dynamic_module, define_module, DynamicModule, Module, ModuleConfig, ModuleDefinition,
    ModuleExtension,
};
pub use provider::{
    ClassSpec, FactoryFn, Injection, Injections, LifecycleHooks, Provider, ProviderDefinition,
    ProviderKind, ProviderSummary, Scope, Token,
};
pub use registry::ProviderRegistry;
pub use request::{RequestId, RequestScope};
