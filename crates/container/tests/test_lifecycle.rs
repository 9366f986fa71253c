//! Ordered init/teardown, frame hooks and hook failure handling

mod common;

use async_trait::async_trait;
use common::{recorder_provider, EventLog, Recorder};
use container::{
    Container, ContainerConfig, ContainerError, Instance, Lifecycle, LifecycleHooks,
    LifecycleState, ProviderDefinition, Scope,
};
use mockall::mock;
use serde_json::{json, Value};
use std::time::Duration;

mock! {
    pub Service {}

    #[async_trait]
    impl Lifecycle for Service {
        fn responds_to(&self, hook: &str) -> bool;
        async fn call_async(&self, hook: &str, args: &[Value]) -> anyhow::Result<()>;
        fn call_frame(&self, hook: &str, dt: f64) -> anyhow::Result<()>;
    }
}

fn chain(log: &EventLog) -> Container {
    let container = Container::new();
    container
        .register_provider(recorder_provider("A", log))
        .unwrap();
    container
        .register_provider(recorder_provider("B", log).depends_on("A"))
        .unwrap();
    container
        .register_provider(recorder_provider("C", log).depends_on("B"))
        .unwrap();
    container
}

#[tokio::test]
async fn test_init_once_and_teardown_in_reverse() {
    common::init_tracing();
    let log = EventLog::default();
    let container = chain(&log);

    container.initialize_all(&[]).await.unwrap();
    container.initialize_all(&[]).await.unwrap();

    assert_eq!(container.state(), LifecycleState::Initialized);
    assert_eq!(log.names_for(LifecycleHooks::ON_INIT), vec!["A", "B", "C"]);
    assert_eq!(container.init_order(), vec!["A", "B", "C"]);

    container.destroy_all().await.unwrap();
    assert_eq!(log.names_for(LifecycleHooks::ON_DESTROY), vec!["C", "B", "A"]);
    assert_eq!(container.state(), LifecycleState::Uninitialized);
    assert!(container.get_singletons().is_empty());
}

#[tokio::test]
async fn test_priority_orders_initialization() {
    let log = EventLog::default();
    let container = Container::new();
    for (token, priority) in [("Renderer", 10), ("Input", 0), ("Config", -10), ("Audio", 0)] {
        container
            .register_provider(recorder_provider(token, &log).priority(priority))
            .unwrap();
    }

    container.initialize_all(&[]).await.unwrap();
    // ties keep registration order
    assert_eq!(
        log.names_for(LifecycleHooks::ON_INIT),
        vec!["Config", "Input", "Audio", "Renderer"]
    );
}

#[tokio::test]
async fn test_transient_and_request_providers_not_initialized() {
    let log = EventLog::default();
    let container = Container::new();
    container
        .register_provider(recorder_provider("Bullet", &log).scope(Scope::Transient))
        .unwrap();
    container
        .register_provider(recorder_provider("Session", &log).scope(Scope::Request))
        .unwrap();
    container
        .register_provider(recorder_provider("World", &log))
        .unwrap();

    container.initialize_all(&[]).await.unwrap();
    assert_eq!(log.names_for(LifecycleHooks::ON_INIT), vec!["World"]);
}

#[tokio::test]
async fn test_hook_failure_halts_without_rollback() {
    let log = EventLog::default();
    let container = Container::new();
    container
        .register_provider(recorder_provider("A", &log))
        .unwrap();
    let failing_log = log.clone();
    container
        .register_provider(
            ProviderDefinition::factory("B", move |_, _| {
                Ok(Instance::with_hooks(
                    Recorder::new("B", failing_log.clone()).failing_on(LifecycleHooks::ON_INIT),
                ))
            })
            .hooks(LifecycleHooks::standard()),
        )
        .unwrap();
    container
        .register_provider(recorder_provider("C", &log))
        .unwrap();

    let err = container.initialize_all(&[]).await.unwrap_err();
    match &err {
        ContainerError::Hook { token, hook, reason } => {
            assert_eq!(token, "B");
            assert_eq!(hook, "onInit");
            assert!(reason.contains("refused"));
        }
        other => panic!("Expected Hook error, got {other:?}"),
    }

    assert_eq!(container.state(), LifecycleState::Uninitialized);
    assert_eq!(container.init_order(), vec!["A"]);
    assert!(container.get_provider("A").unwrap().is_initialized());
    assert!(!container.get_provider("C").unwrap().is_initialized());

    // what did start can still be torn down
    container.destroy_all().await.unwrap();
    assert_eq!(log.names_for(LifecycleHooks::ON_DESTROY), vec!["A"]);
}

#[tokio::test]
async fn test_hook_timeout() {
    let mut config = ContainerConfig::named("timeouts");
    config.hook_timeout_ms = Some(20);
    let container = Container::with_config(config).unwrap();
    let log = EventLog::default();
    let slow_log = log.clone();
    container
        .register_provider(
            ProviderDefinition::factory("Slow", move |_, _| {
                Ok(Instance::with_hooks(
                    Recorder::new("Slow", slow_log.clone()).slow(Duration::from_millis(500)),
                ))
            })
            .hooks(LifecycleHooks::standard()),
        )
        .unwrap();

    let err = container.initialize_all(&[]).await.unwrap_err();
    assert!(err.to_string().contains("timed out after 20ms"));
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_frame_hooks_follow_init() {
    let log = EventLog::default();
    let container = Container::new();
    container
        .register_provider(recorder_provider("Physics", &log).priority(5))
        .unwrap();
    container
        .register_provider(recorder_provider("Input", &log).priority(-5))
        .unwrap();

    // nothing is cached before initialization
    container.before_update(0.016).unwrap();
    assert!(log.entries().is_empty());

    container.initialize_all(&[]).await.unwrap();
    log.clear();

    container.before_update(0.016).unwrap();
    container.after_update(0.016).unwrap();
    assert_eq!(
        log.entries(),
        vec![
            "Input.beforeUpdate",
            "Physics.beforeUpdate",
            "Input.afterUpdate",
            "Physics.afterUpdate"
        ]
    );

    container.destroy_all().await.unwrap();
    log.clear();
    container.before_update(0.016).unwrap();
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_destroy_during_init_is_refused_and_keeps_instances() {
    let log = EventLog::default();
    let container = Container::new();
    container
        .register_provider(recorder_provider("A", &log))
        .unwrap();
    let slow_log = log.clone();
    container
        .register_provider(
            ProviderDefinition::factory("B", move |_, _| {
                Ok(Instance::with_hooks(
                    Recorder::new("B", slow_log.clone()).slow(Duration::from_millis(50)),
                ))
            })
            .hooks(LifecycleHooks::standard()),
        )
        .unwrap();

    let (init, destroy) = tokio::join!(container.initialize_all(&[]), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        container.destroy_all().await
    });

    init.unwrap();
    assert!(matches!(destroy, Err(ContainerError::InvalidState { .. })));
    assert_eq!(container.state(), LifecycleState::Initialized);
    assert_eq!(container.init_order(), vec!["A", "B"]);

    let a = container.get_provider("A").unwrap();
    assert!(a.is_initialized());
    let cached = a.singleton_instance().unwrap();
    assert!(cached.ptr_eq(&container.resolve("A").unwrap()));
    assert_eq!(log.names_for(LifecycleHooks::ON_INIT), vec!["A", "B"]);

    container.destroy_all().await.unwrap();
    assert_eq!(log.names_for(LifecycleHooks::ON_DESTROY), vec!["B", "A"]);
}

#[tokio::test]
async fn test_destroy_on_fresh_container_is_noop() {
    let container = Container::new();
    container.destroy_all().await.unwrap();
    assert_eq!(container.state(), LifecycleState::Uninitialized);
}

#[tokio::test]
async fn test_singletons_rebuilt_after_destroy() {
    let log = EventLog::default();
    let container = chain(&log);
    container.initialize_all(&[]).await.unwrap();
    let before = container.resolve("C").unwrap();

    container.destroy_all().await.unwrap();
    container.initialize_all(&[]).await.unwrap();
    let after = container.resolve("C").unwrap();

    assert!(!before.ptr_eq(&after));
    assert_eq!(log.names_for(LifecycleHooks::ON_INIT).len(), 6);
}

#[tokio::test]
async fn test_cycle_rejected_before_any_hook() {
    let log = EventLog::default();
    let container = Container::new();
    container
        .register_provider(recorder_provider("Early", &log).priority(-1))
        .unwrap();
    container
        .register_provider(recorder_provider("X", &log).depends_on("Y"))
        .unwrap();
    container
        .register_provider(recorder_provider("Y", &log).depends_on("X"))
        .unwrap();

    let err = container.initialize_all(&[]).await.unwrap_err();
    assert!(err.is_circular());
    assert!(log.entries().is_empty());
    assert_eq!(container.state(), LifecycleState::Uninitialized);
}

#[tokio::test]
async fn test_init_args_reach_hooks() {
    let mut mock = MockService::new();
    mock.expect_responds_to()
        .returning(|hook| hook.to_string() == LifecycleHooks::ON_INIT);
    mock.expect_call_async()
        .withf(|hook, args| {
            hook.to_string() == "onInit" && args.to_vec() == vec![json!({"seed": 7})]
        })
        .times(1)
        .returning(|_, _| Ok(()));
    mock.expect_call_frame().never();

    let container = Container::new();
    container
        .register_provider(
            ProviderDefinition::value("Mocked", Instance::with_hooks(mock)).hooks(
                LifecycleHooks::default()
                    .with_on_init(LifecycleHooks::ON_INIT)
                    .with_before_update(LifecycleHooks::BEFORE_UPDATE),
            ),
        )
        .unwrap();

    container
        .initialize_all(&[json!({"seed": 7})])
        .await
        .unwrap();
    // declared but not answered by the instance, so skipped
    container.before_update(1.0).unwrap();
    assert_eq!(container.get_debug_info().before_update_hooks, 1);
}
