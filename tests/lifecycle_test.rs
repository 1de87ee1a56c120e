//! End-to-end lifecycle scenarios.

mod common;

use std::time::{Duration, Instant};

use common::*;
use service_orchestrator::config::ExportMode;
use service_orchestrator::lifecycle::{
    DrainIncomplete, LifecycleState, Orchestrator, OrchestratorError, Shutdown,
};
use service_orchestrator::net::{ListenerError, ListenerSource};
use service_orchestrator::resources::{AcquireStage, ResourceKind};
use service_orchestrator::HttpServer;
use tokio::net::TcpListener;

use LifecycleState::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serving_then_interrupt_stops_cleanly() {
    let mut config = test_config();
    config.resources = vec![
        spec("db", ResourceKind::Relational),
        spec("cache", ResourceKind::Cache),
        spec("queue", ResourceKind::QueueProducer),
    ];
    let connector = MockConnector::new();
    let interrupt = Shutdown::new();

    let orchestrator = Orchestrator::new(config)
        .with_connector(connector.as_connector())
        .with_trigger(interrupt.clone())
        .with_server(|_| Box::new(IdleServer));
    let lifecycle = orchestrator.state_view();
    let mut watch = orchestrator.subscribe();
    let run = tokio::spawn(orchestrator.run());

    wait_for_state(&mut watch, Serving).await;
    interrupt.trigger();

    run.await.unwrap().expect("clean shutdown");
    assert_eq!(
        lifecycle.history(),
        vec![Init, Starting, Serving, ShuttingDown, Stopped]
    );
    assert_eq!(connector.closes(), vec!["queue", "cache", "db"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listener_error_and_interrupt_run_one_cascade() {
    let mut config = test_config();
    config.resources = vec![
        spec("db", ResourceKind::Relational),
        spec("cache", ResourceKind::Cache),
    ];
    let connector = MockConnector::new();
    let interrupt = Shutdown::new();
    // Fired before the race starts, so both branches are ready at once.
    interrupt.trigger();

    let orchestrator = Orchestrator::new(config)
        .with_connector(connector.as_connector())
        .with_trigger(interrupt.clone())
        .with_server(|_| {
            Box::new(FailingServer {
                after: Duration::ZERO,
            })
        });
    let lifecycle = orchestrator.state_view();

    let result = orchestrator.run().await;

    let history = lifecycle.history();
    assert_eq!(history.iter().filter(|s| **s == ShuttingDown).count(), 1);
    assert_eq!(history.iter().filter(|s| **s == Stopped).count(), 1);
    assert_eq!(connector.closes(), vec!["cache", "db"]);

    // Whichever branch won, the cascade ran once and the outcome is coherent.
    match result {
        Ok(()) => {}
        Err(OrchestratorError::Shutdown(e)) => {
            assert_eq!(e.steps().collect::<Vec<_>>(), vec!["listener"]);
        }
        Err(other) => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listener_failure_triggers_shutdown() {
    let mut config = test_config();
    config.resources = vec![spec("db", ResourceKind::Relational)];
    let connector = MockConnector::new();

    let orchestrator = Orchestrator::new(config)
        .with_connector(connector.as_connector())
        .with_server(|_| {
            Box::new(FailingServer {
                after: Duration::from_millis(50),
            })
        });
    let lifecycle = orchestrator.state_view();

    let err = orchestrator.run().await.unwrap_err();
    let OrchestratorError::Shutdown(joined) = err else {
        panic!("expected joined shutdown error, got {err}");
    };
    assert_eq!(joined.steps().collect::<Vec<_>>(), vec!["listener"]);
    assert!(joined.failures()[0].source.is::<ListenerError>());
    assert_eq!(lifecycle.current(), Stopped);
    assert_eq!(connector.closes(), vec!["db"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bind_failure_is_a_listener_error() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = test_config();
    config.listener.port = taken.local_addr().unwrap().port();

    let orchestrator = Orchestrator::new(config).with_connector(MockConnector::new().as_connector());
    let err = orchestrator.run().await.unwrap_err();

    let OrchestratorError::Shutdown(joined) = err else {
        panic!("expected joined shutdown error, got {err}");
    };
    let listener = joined.failures()[0]
        .source
        .downcast_ref::<ListenerError>()
        .expect("listener error");
    assert!(matches!(listener, ListenerError::Bind { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn drain_deadline_cuts_off_slow_request() {
    let mut config = test_config();
    config.resources = vec![spec("slow", ResourceKind::Document)];
    config.listener.request_timeout_secs = 30;
    config.shutdown.drain_timeout_secs = 1;

    let connector = MockConnector::new();
    let interrupt = Shutdown::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let orchestrator = Orchestrator::new(config)
        .with_connector(connector.as_connector())
        .with_trigger(interrupt.clone())
        .with_server(move |ctx| Box::new(HttpServer::new(ListenerSource::Bound(listener), ctx)));
    let mut watch = orchestrator.subscribe();
    let run = tokio::spawn(orchestrator.run());
    wait_for_state(&mut watch, Serving).await;

    // Acquisition is done; from now on every backend call stalls.
    connector.set_ping_delay(Duration::from_secs(10));
    let client = tokio::spawn(async move {
        reqwest::get(format!("http://{addr}/resources/slow")).await
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    interrupt.trigger();
    let result = run.await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(4), "shutdown took {elapsed:?}");
    let OrchestratorError::Shutdown(joined) = result.unwrap_err() else {
        panic!("expected joined shutdown error");
    };
    let drain = joined.failures()[0]
        .source
        .downcast_ref::<DrainIncomplete>()
        .expect("drain reported incomplete");
    assert_eq!(drain.in_flight, 1);
    assert_eq!(drain.timeout, Duration::from_secs(1));
    assert_eq!(connector.closes(), vec!["slow"]);

    // The client sees either the cut-off response or a dropped connection.
    if let Ok(Ok(response)) = client.await {
        assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unhealthy_queue_unwinds_startup() {
    let mut config = test_config();
    config.resources = vec![
        spec("db", ResourceKind::Relational),
        spec("cache", ResourceKind::Cache),
        spec("queue", ResourceKind::QueueProducer),
    ];
    let connector = MockConnector::new().unhealthy("queue");

    let orchestrator = Orchestrator::new(config)
        .with_connector(connector.as_connector())
        .with_server(|_| panic!("server must not start"));
    let lifecycle = orchestrator.state_view();

    let err = orchestrator.run().await.unwrap_err();
    let OrchestratorError::Resources { source, telemetry } = err else {
        panic!("expected resource error, got {err}");
    };
    assert_eq!(source.source.name, "queue");
    assert_eq!(source.source.stage, AcquireStage::Probe);
    assert!(source.rollback.is_none());
    assert!(telemetry.is_none());

    assert_eq!(connector.closes(), vec!["queue", "cache", "db"]);
    assert_eq!(lifecycle.history(), vec![Init, Starting, Stopped]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn telemetry_failure_acquires_nothing() {
    let mut config = test_config();
    config.telemetry.mode = ExportMode::Production;
    config.telemetry.endpoint = "ftp://collector".into();
    config.resources = vec![spec("db", ResourceKind::Relational)];
    let connector = MockConnector::new();

    let orchestrator = Orchestrator::new(config).with_connector(connector.as_connector());
    let lifecycle = orchestrator.state_view();

    let err = orchestrator.run().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Telemetry(_)), "{err}");
    assert!(connector.connects().is_empty());
    assert_eq!(lifecycle.history(), vec![Init, Starting, Stopped]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_failures_are_joined_with_clean_steps() {
    let mut config = test_config();
    config.resources = vec![
        spec("db", ResourceKind::Relational),
        spec("cache", ResourceKind::Cache),
        spec("mongo", ResourceKind::Document),
    ];
    let connector = MockConnector::new()
        .failing_close("db")
        .failing_close("mongo");
    let interrupt = Shutdown::new();

    let orchestrator = Orchestrator::new(config)
        .with_connector(connector.as_connector())
        .with_trigger(interrupt.clone())
        .with_server(|_| Box::new(IdleServer));
    let mut watch = orchestrator.subscribe();
    let run = tokio::spawn(orchestrator.run());
    wait_for_state(&mut watch, Serving).await;
    interrupt.trigger();

    let err = run.await.unwrap().unwrap_err();
    let OrchestratorError::Shutdown(joined) = err else {
        panic!("expected joined shutdown error, got {err}");
    };
    assert_eq!(
        joined.steps().collect::<Vec<_>>(),
        vec!["resource:mongo", "resource:db"]
    );
    // Every close ran even though two failed.
    assert_eq!(connector.closes(), vec!["mongo", "cache", "db"]);
}
