mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{empty_configs, event_log, events, Recorder, Resource};
use compkit::{
    component_fn, run, AppBuilder, AppOptions, ComponentDescriptor, ComponentState, LifecycleError,
    ShutdownOptions, StartArgs,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn start_follows_dependencies_and_stop_reverses() {
    let log = event_log();
    // declared dependent-first on purpose
    let app = AppBuilder::new()
        .component(
            "b",
            ComponentDescriptor::singleton(Recorder::new("b", &log), "b").depends_on("a", "a"),
        )
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
        .build(&empty_configs(&["a", "b"]))
        .unwrap();

    app.start().await.unwrap();
    assert_eq!(events(&log, "start"), vec!["a", "b"]);
    assert_eq!(app.started_components(), vec!["a", "b"]);
    assert_eq!(app.state("b").unwrap(), ComponentState::Started);

    app.stop().await.unwrap();
    assert_eq!(events(&log, "stop"), vec!["b", "a"]);
    assert!(app.started_components().is_empty());
    assert_eq!(app.state("a").unwrap(), ComponentState::Stopped);
}

#[tokio::test]
async fn independent_singletons_start_in_declaration_order() {
    let log = event_log();
    let app = AppBuilder::new()
        .component("x", ComponentDescriptor::singleton(Recorder::new("x", &log), "x"))
        .component("y", ComponentDescriptor::singleton(Recorder::new("y", &log), "y"))
        .component("z", ComponentDescriptor::singleton(Recorder::new("z", &log), "z"))
        .build(&empty_configs(&["x", "y", "z"]))
        .unwrap();

    app.start().await.unwrap();
    assert_eq!(events(&log, "start"), vec!["x", "y", "z"]);
    app.stop().await.unwrap();
    assert_eq!(events(&log, "stop"), vec!["z", "y", "x"]);
}

#[tokio::test]
async fn singleton_cycle_is_rejected_before_any_start() {
    let log = event_log();
    let err = AppBuilder::new()
        .component(
            "c",
            ComponentDescriptor::singleton(Recorder::new("c", &log), "c").depends_on("d", "d"),
        )
        .component(
            "d",
            ComponentDescriptor::singleton(Recorder::new("d", &log), "d").depends_on("c", "c"),
        )
        .build(&empty_configs(&["c", "d"]))
        .unwrap_err();

    match err {
        LifecycleError::CircularDependency { path } => {
            assert!(path.contains(&"c".to_string()));
            assert!(path.contains(&"d".to_string()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn start_failure_rolls_back_and_a_retry_recovers() {
    let log = event_log();
    let flaky = Recorder::new("b", &log).failing_start();
    let switch = flaky.start_switch();
    let app = AppBuilder::new()
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
        .component("c", ComponentDescriptor::singleton(Recorder::new("c", &log), "c"))
        .component(
            "b",
            ComponentDescriptor::singleton(flaky, "b").depends_on("a", "a"),
        )
        .build(&empty_configs(&["a", "b", "c"]))
        .unwrap();

    match app.start().await.unwrap_err() {
        LifecycleError::ComponentStart { component, source } => {
            assert_eq!(component, "b");
            assert!(source.to_string().contains("refused to start"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(events(&log, "start"), vec!["a", "c"]);
    assert_eq!(events(&log, "stop"), vec!["c", "a"]);
    assert_eq!(app.state("b").unwrap(), ComponentState::Error);
    assert_eq!(app.state("a").unwrap(), ComponentState::Stopped);
    assert!(app.started_components().is_empty());
    assert!(app.healthcheck().await.is_empty());

    switch.store(false, Ordering::SeqCst);
    app.start().await.unwrap();
    assert_eq!(app.started_components(), vec!["a", "c", "b"]);
    assert_eq!(app.state("b").unwrap(), ComponentState::Started);
    app.stop().await.unwrap();
}

#[tokio::test]
async fn stop_is_a_noop_before_start_and_when_repeated() {
    let log = event_log();
    let app = AppBuilder::new()
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
        .build(&empty_configs(&["a"]))
        .unwrap();

    app.stop().await.unwrap();
    assert!(log.lock().is_empty());

    app.start().await.unwrap();
    app.stop().await.unwrap();
    app.stop().await.unwrap();
    assert_eq!(events(&log, "stop"), vec!["a"]);
}

#[tokio::test]
async fn start_twice_starts_each_singleton_once() {
    let log = event_log();
    let app = AppBuilder::new()
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
        .build(&empty_configs(&["a"]))
        .unwrap();

    app.start().await.unwrap();
    app.start().await.unwrap();
    assert_eq!(events(&log, "start"), vec!["a"]);

    // restart after stop re-arms the component
    app.stop().await.unwrap();
    app.start().await.unwrap();
    assert_eq!(events(&log, "start"), vec!["a", "a"]);
    assert_eq!(app.state("a").unwrap(), ComponentState::Started);
}

#[tokio::test]
async fn stop_failures_are_collected_after_every_component_was_stopped() {
    let log = event_log();
    let app = AppBuilder::new()
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
        .component(
            "b",
            ComponentDescriptor::singleton(Recorder::new("b", &log).failing_stop(), "b"),
        )
        .build(&empty_configs(&["a", "b"]))
        .unwrap();

    app.start().await.unwrap();
    match app.stop().await.unwrap_err() {
        LifecycleError::StopFailed { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].component, "b");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(events(&log, "stop"), vec!["b", "a"]);
    assert_eq!(app.state("b").unwrap(), ComponentState::Stopped);
}

#[tokio::test]
async fn stuck_stop_hook_times_out_without_blocking_the_rest() {
    let log = event_log();
    let stuck = component_fn(|_args: StartArgs| async move { Ok(()) }).on_stop(|_: Arc<()>| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    });
    let app = AppBuilder::new()
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
        .component("stuck", ComponentDescriptor::singleton(stuck, "stuck"))
        .options(AppOptions {
            stop_timeout: Some(Duration::from_millis(50)),
            ..AppOptions::default()
        })
        .build(&empty_configs(&["a", "stuck"]))
        .unwrap();

    app.start().await.unwrap();
    match app.stop().await.unwrap_err() {
        LifecycleError::StopFailed { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].component, "stuck");
            assert!(failures[0].error.to_string().contains("timed out"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(events(&log, "stop"), vec!["a"]);
    assert_eq!(app.state("stuck").unwrap(), ComponentState::Stopped);
}

#[tokio::test]
async fn singleton_lookup_returns_the_cached_instance() {
    let log = event_log();
    let app = AppBuilder::new()
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
        .build(&empty_configs(&["a"]))
        .unwrap();

    match app.get::<Resource>("a").await {
        Err(LifecycleError::NotStarted(name)) => assert_eq!(name, "a"),
        other => panic!("unexpected result: {other:?}"),
    }

    app.start().await.unwrap();
    let first = app.get::<Resource>("a").await.unwrap();
    let second = app.get::<Resource>("a").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.name, "a");

    assert!(matches!(
        app.get::<String>("a").await,
        Err(LifecycleError::TypeMismatch { .. })
    ));
    assert!(matches!(
        app.get::<Resource>("ghost").await,
        Err(LifecycleError::UnknownComponent(_))
    ));
}

#[tokio::test]
async fn started_dependency_is_injected_and_shadows_config() {
    let log = event_log();
    let consumer = component_fn(|args: StartArgs| async move {
        let upstream = args.dependency::<Resource>("upstream")?;
        let label = args
            .config("label")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        anyhow::Ok((upstream, label))
    });

    let mut configs = empty_configs(&["a"]);
    configs.insert(
        "consumer".to_string(),
        json!({"upstream": "literal", "label": "hello"}),
    );

    let app = AppBuilder::new()
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
        .component(
            "consumer",
            ComponentDescriptor::singleton(consumer, "consumer").depends_on("upstream", "a"),
        )
        .build(&configs)
        .unwrap();

    app.start().await.unwrap();
    let a = app.get::<Resource>("a").await.unwrap();
    let consumer = app.get::<(Arc<Resource>, String)>("consumer").await.unwrap();
    assert!(Arc::ptr_eq(&consumer.0, &a));
    assert_eq!(consumer.1, "hello");
    app.stop().await.unwrap();
}

#[tokio::test]
async fn healthcheck_reports_each_started_singleton() {
    let log = event_log();
    let slow = component_fn(|_args: StartArgs| async move { Ok(()) }).on_probe(|_: Arc<()>| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(true)
    });
    let broken = component_fn(|_args: StartArgs| async move { Ok(()) })
        .on_probe(|_: Arc<()>| async { Err(anyhow::anyhow!("connection reset")) });

    let app = AppBuilder::new()
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
        .component(
            "b",
            ComponentDescriptor::singleton(Recorder::new("b", &log).dead(), "b"),
        )
        .component("slow", ComponentDescriptor::singleton(slow, "slow"))
        .component("broken", ComponentDescriptor::singleton(broken, "broken"))
        .options(AppOptions {
            health_timeout: Some(Duration::from_millis(50)),
            ..AppOptions::default()
        })
        .build(&empty_configs(&["a", "b", "slow", "broken"]))
        .unwrap();

    assert!(app.healthcheck().await.is_empty());

    app.start().await.unwrap();
    let report = app.healthcheck().await;
    assert_eq!(report.len(), 4);
    assert!(report["a"]);
    assert!(!report["b"]);
    assert!(!report["slow"]);
    assert!(!report["broken"]);
    assert_eq!(events(&log, "probe"), vec!["a", "b"]);
    app.stop().await.unwrap();
}

#[tokio::test]
async fn configure_while_started_forces_error() {
    let log = event_log();
    let app = AppBuilder::new()
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
        .build(&empty_configs(&["a"]))
        .unwrap();

    app.start().await.unwrap();
    match app.configure("a", Default::default()).unwrap_err() {
        LifecycleError::InvalidTransition { component, from, to } => {
            assert_eq!(component, "a");
            assert_eq!(from, ComponentState::Started);
            assert_eq!(to, ComponentState::Configured);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(app.state("a").unwrap(), ComponentState::Error);

    // the instance is still released on stop
    app.stop().await.unwrap();
    assert_eq!(events(&log, "stop"), vec!["a"]);
    assert_eq!(app.state("a").unwrap(), ComponentState::Stopped);
}

#[tokio::test]
async fn running_component_in_error_cannot_be_reconfigured() {
    let log = event_log();
    let app = AppBuilder::new()
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
        .build(&empty_configs(&["a"]))
        .unwrap();

    app.start().await.unwrap();
    app.configure("a", Default::default()).unwrap_err();
    assert_eq!(app.state("a").unwrap(), ComponentState::Error);

    // still running: a second configure is rejected too
    match app.configure("a", Default::default()).unwrap_err() {
        LifecycleError::InvalidTransition { component, from, .. } => {
            assert_eq!(component, "a");
            assert_eq!(from, ComponentState::Error);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(app.state("a").unwrap(), ComponentState::Error);
    assert_eq!(app.started_components(), vec!["a"]);

    app.stop().await.unwrap();
    assert_eq!(events(&log, "stop"), vec!["a"]);
    assert_eq!(app.state("a").unwrap(), ComponentState::Stopped);

    // once stopped it accepts configuration and restarts
    app.configure("a", Default::default()).unwrap();
    app.start().await.unwrap();
    assert_eq!(events(&log, "start"), vec!["a", "a"]);
    app.stop().await.unwrap();
}

#[tokio::test]
async fn reconfigure_between_restarts_reaches_the_next_start() {
    let app = AppBuilder::new()
        .component(
            "greeter",
            ComponentDescriptor::singleton(
                component_fn(|args: StartArgs| async move {
                    #[derive(serde::Deserialize)]
                    struct Cfg {
                        greeting: String,
                    }
                    let cfg: Cfg = args.bind()?;
                    anyhow::Ok(cfg.greeting)
                }),
                "greeter",
            ),
        )
        .build(&json!({"greeter": {"greeting": "hello"}}))
        .unwrap();

    app.start().await.unwrap();
    assert_eq!(*app.get::<String>("greeter").await.unwrap(), "hello");
    app.stop().await.unwrap();

    let mut cfg = compkit::ConfigMap::new();
    cfg.insert("greeting".into(), json!("bonjour"));
    app.configure("greeter", cfg).unwrap();
    app.start().await.unwrap();
    assert_eq!(*app.get::<String>("greeter").await.unwrap(), "bonjour");
    app.stop().await.unwrap();
}

#[tokio::test]
async fn build_reports_missing_and_invalid_config() {
    let log = event_log();
    let missing = AppBuilder::new()
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "db"))
        .build(&empty_configs(&["cache"]))
        .unwrap_err();
    match missing {
        LifecycleError::MissingConfig {
            component,
            config_key,
        } => {
            assert_eq!(component, "a");
            assert_eq!(config_key, "db");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let invalid = AppBuilder::new()
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "db"))
        .build(&json!({"db": [1, 2, 3]}))
        .unwrap_err();
    assert!(matches!(invalid, LifecycleError::InvalidConfig { .. }));

    let duplicate = AppBuilder::new()
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
        .build(&empty_configs(&["a"]))
        .unwrap_err();
    assert!(matches!(duplicate, LifecycleError::DuplicateName(_)));
}

#[tokio::test]
async fn null_config_is_an_empty_mapping() {
    let log = event_log();
    let app = AppBuilder::new()
        .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
        .build(&json!({"a": null}))
        .unwrap();
    app.start().await.unwrap();
    assert!(app.get::<Resource>("a").await.unwrap().args.is_empty());
    app.stop().await.unwrap();
}

#[tokio::test]
async fn dependency_order_covers_all_components() {
    let log = event_log();
    let app = AppBuilder::new()
        .component("comp1", ComponentDescriptor::singleton(Recorder::new("comp1", &log), "k"))
        .component(
            "request_comp1",
            ComponentDescriptor::request(Recorder::new("request_comp1", &log), "k")
                .depends_on("c", "comp1"),
        )
        .component(
            "comp2",
            ComponentDescriptor::singleton(Recorder::new("comp2", &log), "k").depends_on("c", "comp1"),
        )
        .build(&empty_configs(&["k"]))
        .unwrap();

    assert_eq!(
        app.dependency_order().unwrap(),
        vec!["comp1", "request_comp1", "comp2"]
    );
}

#[tokio::test]
async fn runner_starts_waits_and_stops() {
    let log = event_log();
    let app = Arc::new(
        AppBuilder::new()
            .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
            .component(
                "b",
                ComponentDescriptor::singleton(Recorder::new("b", &log), "b").depends_on("a", "a"),
            )
            .build(&empty_configs(&["a", "b"]))
            .unwrap(),
    );

    let token = CancellationToken::new();
    let handle = tokio::spawn(run(app.clone(), ShutdownOptions::Token(token.clone())));

    assert!(common::wait_for(&log, "start:b", Duration::from_secs(2)).await);
    assert!(events(&log, "stop").is_empty());

    token.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(events(&log, "stop"), vec!["b", "a"]);
}

#[tokio::test]
async fn runner_returns_start_failure_without_waiting() {
    let log = event_log();
    let app = Arc::new(
        AppBuilder::new()
            .component("a", ComponentDescriptor::singleton(Recorder::new("a", &log), "a"))
            .component(
                "b",
                ComponentDescriptor::singleton(Recorder::new("b", &log).failing_start(), "b"),
            )
            .build(&empty_configs(&["a", "b"]))
            .unwrap(),
    );

    let never = Box::pin(std::future::pending::<()>());
    let err = run(app, ShutdownOptions::Future(never)).await.unwrap_err();
    assert!(matches!(err, LifecycleError::ComponentStart { .. }));
    assert_eq!(events(&log, "stop"), vec!["a"]);
}
