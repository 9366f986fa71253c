//! Built service instances and the hook surface the lifecycle manager calls.

use async_trait::async_trait;
use serde_json::Value;
use std::{
    any::Any,
    fmt,
    sync::Arc,
};

/// Named hooks an instance can respond to.
///
/// Providers declare hook *names* (`onInit`, `onDestroy`, `beforeUpdate`,
/// `afterUpdate` by convention); the instance decides at runtime whether it
/// answers to a given name. An instance that does not respond to a declared
/// hook is skipped silently.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Whether this instance exposes a hook with the given name
    fn responds_to(&self, hook: &str) -> bool;

    /// Invoke an init/destroy style hook; awaited to completion by the caller
    async fn call_async(&self, hook: &str, args: &[Value]) -> anyhow::Result<()> {
        let _ = (hook, args);
        Ok(())
    }

    /// Invoke a per-frame hook
    fn call_frame(&self, hook: &str, dt: f64) -> anyhow::Result<()> {
        let _ = (hook, dt);
        Ok(())
    }
}

/// Handle to a constructed service.
///
/// Cloning is cheap and preserves identity: two clones compare equal under
/// [`Instance::ptr_eq`].
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    hooks: Option<Arc<dyn Lifecycle>>,
    type_name: &'static str,
}

impl Instance {
    /// Wrap a value that exposes no lifecycle hooks
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an already shared value that exposes no lifecycle hooks
    pub fn from_arc<T>(value: Arc<T>) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            value,
            hooks: None,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Wrap a value whose hooks the lifecycle manager may call
    pub fn with_hooks<T>(value: T) -> Self
    where
        T: Lifecycle + Any,
    {
        Self::from_arc_with_hooks(Arc::new(value))
    }

    /// Like [`Instance::from_arc`], keeping the hook view of the same value
    pub fn from_arc_with_hooks<T>(value: Arc<T>) -> Self
    where
        T: Lifecycle + Any,
    {
        let hooks: Arc<dyn Lifecycle> = value.clone();
        Self {
            value,
            hooks: Some(hooks),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Typed view of the instance, `None` if the type does not match
    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.value.clone().downcast::<T>().ok()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.value), Arc::as_ptr(&other.value))
    }

    /// Type name of the stored value, for diagnostics
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn hooks(&self) -> Option<&Arc<dyn Lifecycle>> {
        self.hooks.as_ref()
    }

    /// Whether the instance responds to the named hook
    pub fn responds_to(&self, hook: &str) -> bool {
        self.hooks
            .as_ref()
            .map(|h| h.responds_to(hook))
            .unwrap_or(false)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_name)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain {
        value: i32,
    }

    struct Hooked;

    #[async_trait]
    impl Lifecycle for Hooked {
        fn responds_to(&self, hook: &str) -> bool {
            hook == "onInit"
        }
    }

    #[test]
    fn test_downcast_and_identity() {
        let instance = Instance::new(Plain { value: 7 });
        let clone = instance.clone();

        assert!(instance.ptr_eq(&clone));
        assert!(instance.is::<Plain>());
        assert_eq!(instance.downcast::<Plain>().map(|p| p.value), Some(7));
        assert!(instance.downcast::<String>().is_none());

        let other = Instance::new(Plain { value: 7 });
        assert!(!instance.ptr_eq(&other));
    }

    #[test]
    fn test_hooks_view_shares_allocation() {
        let shared = Arc::new(Hooked);
        let instance = Instance::from_arc_with_hooks(shared.clone());

        assert!(instance.responds_to("onInit"));
        assert!(!instance.responds_to("onDestroy"));
        let typed = instance.downcast::<Hooked>().expect("typed view");
        assert!(Arc::ptr_eq(&typed, &shared));
    }

    #[test]
    fn test_plain_instance_has_no_hooks() {
        let instance = Instance::new("value".to_string());
        assert!(!instance.responds_to("onInit"));
        assert!(instance.hooks().is_none());
        assert!(instance.type_name().contains("String"));
    }
}
