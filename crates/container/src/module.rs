//! Modules: named bundles of providers with import/export visibility.
//!
//! `define_module` turns a [`ModuleConfig`] into an immutable
//! [`ModuleDefinition`]. The container wraps every registered definition in a
//! live [`Module`], then links imports once all modules are known.

use parking_lot::RwLock;
use std::{collections::BTreeSet, fmt, sync::Arc};

use crate::{
    error::{ContainerError, ContainerResult},
    provider::{ProviderDefinition, Token},
};

/// Mutable input to [`define_module`]
#[derive(Debug, Clone, Default)]
pub struct ModuleConfig {
    pub name: String,
    pub imports: Vec<String>,
    pub providers: Vec<ProviderDefinition>,
    pub exports: Vec<Token>,
    pub global: bool,
}

impl ModuleConfig {
    /// Empty, non-global module config
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Make another module's exports visible to this one
    pub fn import(mut self, module: impl Into<String>) -> Self {
        self.imports.push(module.into());
        self
    }

    pub fn provider(mut self, provider: ProviderDefinition) -> Self {
        self.providers.push(provider);
        self
    }

    /// Expose `token` to importing modules
    pub fn export(mut self, token: impl Into<Token>) -> Self {
        self.exports.push(token.into());
        self
    }

    /// Global modules are visible everywhere without an import
    pub fn global(mut self, global: bool) -> Self {
        self.global = global;
        self
    }
}

/// Immutable module descriptor
#[derive(Debug, Clone)]
pub struct ModuleDefinition {
    name: String,
    imports: Vec<String>,
    providers: Vec<ProviderDefinition>,
    exports: Vec<Token>,
    global: bool,
}

impl ModuleDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module names as declared; linked to live modules by the container
    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    pub fn providers(&self) -> &[ProviderDefinition] {
        &self.providers
    }

    pub fn exports(&self) -> &[Token] {
        &self.exports
    }

    pub fn is_global(&self) -> bool {
        self.global
    }
}

/// Validate a module config and stamp its providers with the module name
pub fn define_module(config: ModuleConfig) -> ContainerResult<ModuleDefinition> {
    let name = config.name.trim().to_string();
    if name.is_empty() {
        return Err(ContainerError::configuration("module name is required"));
    }

    let providers = config
        .providers
        .into_iter()
        .map(|p| p.in_module(&name))
        .collect();

    Ok(ModuleDefinition {
        name,
        imports: config.imports,
        providers,
        exports: config.exports,
        global: config.global,
    })
}

/// Additional providers/imports/exports produced from runtime options
#[derive(Debug, Clone, Default)]
pub struct ModuleExtension {
    pub imports: Vec<String>,
    pub providers: Vec<ProviderDefinition>,
    pub exports: Vec<Token>,
}

/// Module whose contents depend on typed options.
///
/// Every [`DynamicModule::build`] call produces a fresh, independent
/// definition; the base config is never mutated.
pub struct DynamicModule<O> {
    base: ModuleConfig,
    configure: fn(&O) -> ModuleExtension,
}

impl<O> DynamicModule<O> {
    /// Build a fresh definition for `options`. Each call is independent.
    pub fn build(&self, options: &O) -> ContainerResult<ModuleDefinition> {
        let extension = (self.configure)(options);
        let mut config = self.base.clone();
        config.imports.extend(extension.imports);
        config.providers.extend(extension.providers);
        config.exports.extend(extension.exports);
        define_module(config)
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }
}

impl<O> fmt::Debug for DynamicModule<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicModule")
            .field("base", &self.base.name)
            .finish()
    }
}

pub fn create_dynamic_module<O>(
    base: ModuleConfig,
    configure: fn(&O) -> ModuleExtension,
) -> DynamicModule<O> {
    DynamicModule { base, configure }
}

/// Live module inside a container
pub struct Module {
    definition: ModuleDefinition,
    imports: RwLock<Vec<Arc<Module>>>,
}

impl Module {
    pub fn new(definition: ModuleDefinition) -> Self {
        Self {
            definition,
            imports: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &ModuleDefinition {
        &self.definition
    }

    pub fn is_global(&self) -> bool {
        self.definition.global
    }

    /// Record an imported module; linking the same module twice is a no-op
    pub fn link_import(&self, module: Arc<Module>) {
        let mut imports = self.imports.write();
        if !imports.iter().any(|m| m.name() == module.name()) {
            imports.push(module);
        }
    }

    pub(crate) fn clear_imports(&self) {
        self.imports.write().clear();
    }

    /// Linked imports, including global modules
    pub fn imports(&self) -> Vec<Arc<Module>> {
        self.imports.read().clone()
    }

    pub fn import_names(&self) -> Vec<String> {
        self.imports
            .read()
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    /// Tokens this module itself provides
    pub fn provider_tokens(&self) -> BTreeSet<Token> {
        self.definition
            .providers
            .iter()
            .map(|p| p.token().to_string())
            .collect()
    }

    /// Global modules export every provider they own; others exactly their
    /// declared `exports`.
    pub fn exported_tokens(&self) -> BTreeSet<Token> {
        if self.definition.global {
            self.provider_tokens()
        } else {
            self.definition.exports.iter().cloned().collect()
        }
    }

    /// Own providers plus everything exported by linked imports
    pub fn can_see(&self, token: &str) -> bool {
        self.definition.providers.iter().any(|p| p.token() == token)
            || self
                .imports
                .read()
                .iter()
                .any(|m| m.exported_tokens().contains(token))
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.definition.name)
            .field("global", &self.definition.global)
            .field("imports", &self.import_names())
            .field("providers", &self.provider_tokens())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;

    fn value(token: &str) -> ProviderDefinition {
        ProviderDefinition::value(token, Instance::new(()))
    }

    #[test]
    fn test_define_requires_name() {
        let err = define_module(ModuleConfig::default()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_define_stamps_providers() {
        let module = define_module(ModuleConfig::new("Audio").provider(value("Mixer"))).unwrap();
        assert_eq!(module.providers()[0].module(), Some("Audio"));
        assert!(module.imports().is_empty());
        assert!(!module.is_global());
    }

    #[test]
    fn test_global_exports_all_providers() {
        let module = Module::new(
            define_module(
                ModuleConfig::new("Core")
                    .provider(value("X"))
                    .provider(value("Y"))
                    .global(true),
            )
            .unwrap(),
        );
        let exported: Vec<_> = module.exported_tokens().into_iter().collect();
        assert_eq!(exported, vec!["X".to_string(), "Y".to_string()]);
    }

    #[test]
    fn test_non_global_exports_declared_only() {
        let module = Module::new(
            define_module(
                ModuleConfig::new("Physics")
                    .provider(value("World"))
                    .provider(value("Solver"))
                    .export("World"),
            )
            .unwrap(),
        );
        let exported: Vec<_> = module.exported_tokens().into_iter().collect();
        assert_eq!(exported, vec!["World".to_string()]);
    }

    #[test]
    fn test_visibility_through_imports() {
        let physics = Arc::new(Module::new(
            define_module(
                ModuleConfig::new("Physics")
                    .provider(value("World"))
                    .provider(value("Solver"))
                    .export("World"),
            )
            .unwrap(),
        ));
        let game = Module::new(
            define_module(ModuleConfig::new("Game").provider(value("Loop")).import("Physics"))
                .unwrap(),
        );

        assert!(!game.can_see("World"));
        game.link_import(physics.clone());
        game.link_import(physics);
        assert_eq!(game.import_names(), vec!["Physics".to_string()]);
        assert!(game.can_see("Loop"));
        assert!(game.can_see("World"));
        assert!(!game.can_see("Solver"));
    }

    #[derive(Debug)]
    struct AudioOptions {
        channels: u8,
    }

    fn configure_audio(options: &AudioOptions) -> ModuleExtension {
        let providers = (0..options.channels)
            .map(|i| value(&format!("Channel{i}")))
            .collect();
        ModuleExtension {
            providers,
            ..ModuleExtension::default()
        }
    }

    #[test]
    fn test_dynamic_module_builds_fresh_definitions() {
        let dynamic = create_dynamic_module(
            ModuleConfig::new("Audio").provider(value("Mixer")),
            configure_audio,
        );

        let two = dynamic.build(&AudioOptions { channels: 2 }).unwrap();
        let four = dynamic.build(&AudioOptions { channels: 4 }).unwrap();

        assert_eq!(two.providers().len(), 3);
        assert_eq!(four.providers().len(), 5);
        assert!(four.providers().iter().all(|p| p.module() == Some("Audio")));
        assert_eq!(dynamic.name(), "Audio");
    }
}
