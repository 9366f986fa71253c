//! Token → provider map that remembers registration order.

use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

use crate::provider::{Provider, Token};

#[derive(Default)]
struct RegistryInner {
    order: Vec<Token>,
    providers: HashMap<Token, Arc<Provider>>,
}

/// Provider registry shared by the container and its injector
#[derive(Default)]
pub struct ProviderRegistry {
    inner: RwLock<RegistryInner>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, token: &str) -> Option<Arc<Provider>> {
        self.inner.read().providers.get(token).cloned()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.inner.read().providers.contains_key(token)
    }

    /// Insert unless the token is already claimed. Returns `false` on conflict.
    pub fn insert_if_absent(&self, provider: Provider) -> bool {
        let mut inner = self.inner.write();
        if inner.providers.contains_key(provider.token()) {
            return false;
        }
        let token = provider.token().to_string();
        inner.order.push(token.clone());
        inner.providers.insert(token, Arc::new(provider));
        true
    }

    /// Insert, replacing an existing entry in place. Returns the replaced provider.
    pub fn insert_or_replace(&self, provider: Provider) -> Option<Arc<Provider>> {
        let mut inner = self.inner.write();
        let token = provider.token().to_string();
        let previous = inner.providers.insert(token.clone(), Arc::new(provider));
        if previous.is_none() {
            inner.order.push(token);
        }
        previous
    }

    /// All providers in registration order
    pub fn all(&self) -> Vec<Arc<Provider>> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|token| inner.providers.get(token).cloned())
            .collect()
    }

    /// Tokens in registration order
    pub fn tokens(&self) -> Vec<Token> {
        self.inner.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{instance::Instance, provider::ProviderDefinition};

    fn value(token: &str, v: u32) -> Provider {
        Provider::new(ProviderDefinition::value(token, Instance::new(v))).unwrap()
    }

    #[test]
    fn test_first_insert_wins_with_if_absent() {
        let registry = ProviderRegistry::new();
        assert!(registry.insert_if_absent(value("A", 1)));
        assert!(!registry.insert_if_absent(value("A", 2)));

        let kept = registry.get("A").unwrap();
        let instance = match kept.kind() {
            crate::provider::ProviderKind::Value(i) => i.clone(),
            other => panic!("unexpected kind {other:?}"),
        };
        assert_eq!(*instance.downcast::<u32>().unwrap(), 1);
    }

    #[test]
    fn test_replace_keeps_registration_position() {
        let registry = ProviderRegistry::new();
        registry.insert_or_replace(value("A", 1));
        registry.insert_or_replace(value("B", 1));
        let previous = registry.insert_or_replace(value("A", 2));

        assert!(previous.is_some());
        assert_eq!(registry.tokens(), vec!["A".to_string(), "B".to_string()]);
        assert_eq!(registry.len(), 2);
    }
}
