//! Shared fixtures for container integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use container::{Instance, Lifecycle, LifecycleHooks, ProviderDefinition};
use parking_lot::Mutex;
use serde_json::Value;
use std::{sync::Arc, time::Duration};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("container=debug")
        .with_test_writer()
        .try_init();
}

/// Ordered record of every hook call, as `"<name>.<hook>"`
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Entries for one hook, reduced to the instance names
    pub fn names_for(&self, hook: &str) -> Vec<String> {
        let suffix = format!(".{hook}");
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_suffix(&suffix).map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// Service answering the four standard hooks and recording each call
pub struct Recorder {
    pub name: String,
    log: EventLog,
    fail_on: Option<&'static str>,
    delay: Option<Duration>,
}

impl Recorder {
    pub fn new(name: impl Into<String>, log: EventLog) -> Self {
        Self {
            name: name.into(),
            log,
            fail_on: None,
            delay: None,
        }
    }

    pub fn failing_on(mut self, hook: &'static str) -> Self {
        self.fail_on = Some(hook);
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn record(&self, hook: &str) -> anyhow::Result<()> {
        self.log.push(format!("{}.{}", self.name, hook));
        if self.fail_on == Some(hook) {
            anyhow::bail!("{} refused {}", self.name, hook);
        }
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for Recorder {
    fn responds_to(&self, hook: &str) -> bool {
        matches!(
            hook,
            LifecycleHooks::ON_INIT
                | LifecycleHooks::ON_DESTROY
                | LifecycleHooks::BEFORE_UPDATE
                | LifecycleHooks::AFTER_UPDATE
        )
    }

    async fn call_async(&self, hook: &str, _args: &[Value]) -> anyhow::Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.record(hook)
    }

    fn call_frame(&self, hook: &str, _dt: f64) -> anyhow::Result<()> {
        self.record(hook)
    }
}

/// Singleton factory building a [`Recorder`] with all standard hooks declared
pub fn recorder_provider(token: &str, log: &EventLog) -> ProviderDefinition {
    let name = token.to_string();
    let log = log.clone();
    ProviderDefinition::factory(token, move |_, _| {
        Ok(Instance::with_hooks(Recorder::new(name.clone(), log.clone())))
    })
    .hooks(LifecycleHooks::standard())
}
