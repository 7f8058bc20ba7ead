//! End-to-end runs against the scripted stream client and local files.

use std::sync::Arc;
use std::time::Duration;
use streamgen_core::{CaseId, MetricsSink, OrgSize};
use streamgen_output::testing::{Call, ScriptedStreamClient};
use streamgen_output::{
    file_publisher_factory, stream_publisher_factory, StreamClient, StreamError,
};
use streamgen_simulator::{GeneratorConfig, OutputKind, RunError, Runner, StatsRecorder};
use tokio_util::sync::CancellationToken;

fn config() -> GeneratorConfig {
    GeneratorConfig {
        global_prefix: "it".to_string(),
        interval_secs: 60,
        org_size: OrgSize::Tiny,
        seed: Some(7),
        drain_timeout_secs: 5,
        ..Default::default()
    }
}

fn stream_runner(
    config: GeneratorConfig,
    client: Arc<ScriptedStreamClient>,
    shutdown: CancellationToken,
) -> (Runner, Arc<StatsRecorder>) {
    let stats = Arc::new(StatsRecorder::new());
    let factory = stream_publisher_factory(
        client as Arc<dyn StreamClient>,
        config.publisher_settings(),
        stats.clone() as Arc<dyn MetricsSink>,
    );
    (Runner::new(config, factory, stats.clone(), shutdown), stats)
}

#[tokio::test(start_paused = true)]
async fn runs_until_duration_then_cleans_up() {
    let client = Arc::new(ScriptedStreamClient::new());
    let config = GeneratorConfig {
        run_for_secs: Some(150),
        cleanup_on_exit: true,
        cases: vec![CaseId::HeartbeatMessage, CaseId::TemperatureReading],
        ..config()
    };
    let (runner, _) = stream_runner(config, client.clone(), CancellationToken::new());

    let report = runner.run().await.unwrap();

    assert_eq!(report.orgs.len(), 2);
    assert_eq!(report.orgs[0].org_id, "1");
    assert_eq!(report.orgs[0].devices, 10);
    assert!(report.totals.cycles >= 2, "cycles {}", report.totals.cycles);
    assert!(report.totals.records_delivered >= 10);
    assert_eq!(report.totals.batches_abandoned, 0);
    assert_eq!(report.undelivered(), 0);

    let calls = client.calls();
    for stream in ["it_heartbeat_message_1", "it_temperature_reading_2"] {
        assert!(calls.contains(&Call::Create {
            stream: stream.to_string(),
            shard_count: 1,
        }));
        assert!(calls.contains(&Call::Delete {
            stream: stream.to_string(),
            force: true,
        }));
        assert!(!client.has_stream(stream));
    }
}

#[tokio::test(start_paused = true)]
async fn external_cancel_keeps_streams_without_cleanup() {
    let client = Arc::new(
        ScriptedStreamClient::new().with_stream("it_heartbeat_message_1", 1),
    );
    let shutdown = CancellationToken::new();
    let (runner, stats) = stream_runner(config(), client.clone(), shutdown.clone());

    let run = tokio::spawn(runner.run());
    tokio::time::sleep(Duration::from_secs(90)).await;
    shutdown.cancel();
    let report = run.await.unwrap().unwrap();

    assert!(report.totals.cycles >= 1);
    assert!(!stats.rows().is_empty());
    assert!(client.has_stream("it_heartbeat_message_1"));
    assert!(!client
        .calls()
        .iter()
        .any(|c| matches!(c, Call::Create { .. } | Call::Delete { .. })));
}

#[tokio::test(start_paused = true)]
async fn init_failure_aborts_and_cleans_initialized_streams() {
    let client = Arc::new(
        ScriptedStreamClient::new().with_stream("it_heartbeat_message_1", 1),
    );
    client.push_create(Err(StreamError::InvalidArgument(
        "shard limit exceeded".to_string(),
    )));
    let config = GeneratorConfig {
        cleanup_on_exit: true,
        cases: vec![CaseId::HeartbeatMessage, CaseId::DataChange],
        ..config()
    };
    let shutdown = CancellationToken::new();
    let (runner, stats) = stream_runner(config, client.clone(), shutdown.clone());

    let result = runner.run().await;

    assert!(matches!(result, Err(RunError::InitAborted(_))));
    assert!(shutdown.is_cancelled());
    assert!(!client.has_stream("it_heartbeat_message_1"));
    assert!(!client.has_stream("it_data_change_2"));
    assert!(client.put_requests().is_empty());
    assert!(stats.rows().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_during_init_returns() {
    let client = Arc::new(ScriptedStreamClient::new());
    for _ in 0..10_000 {
        client.push_describe(Err(StreamError::Throttled("slow down".to_string())));
    }
    let shutdown = CancellationToken::new();
    let (runner, stats) = stream_runner(config(), client.clone(), shutdown.clone());

    let run = tokio::spawn(runner.run());
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!run.is_finished());
    shutdown.cancel();

    let report = tokio::time::timeout(Duration::from_secs(60), run)
        .await
        .expect("run returns after cancellation")
        .unwrap()
        .unwrap();

    assert!(report.orgs.is_empty());
    assert!(stats.rows().is_empty());
    assert!(client.put_requests().is_empty());
    assert!(!client
        .calls()
        .iter()
        .any(|c| matches!(c, Call::Create { .. } | Call::Delete { .. })));
}

#[tokio::test(start_paused = true)]
async fn cancel_during_init_cleans_initialized_streams() {
    let client = Arc::new(
        ScriptedStreamClient::new().with_stream("it_heartbeat_message_1", 1),
    );
    // the second stream is reported as being created but never shows up
    client.push_create(Err(StreamError::InUse("creating".to_string())));
    let config = GeneratorConfig {
        cleanup_on_exit: true,
        cases: vec![CaseId::HeartbeatMessage, CaseId::DataChange],
        ..config()
    };
    let shutdown = CancellationToken::new();
    let (runner, _) = stream_runner(config, client.clone(), shutdown.clone());

    let run = tokio::spawn(runner.run());
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!run.is_finished());
    shutdown.cancel();

    let report = tokio::time::timeout(Duration::from_secs(60), run)
        .await
        .expect("run returns after cancellation")
        .unwrap()
        .unwrap();

    assert!(report.orgs.is_empty());
    assert!(!client.has_stream("it_heartbeat_message_1"));
    assert!(client.calls().contains(&Call::Delete {
        stream: "it_heartbeat_message_1".to_string(),
        force: true,
    }));
}

#[tokio::test(start_paused = true)]
async fn dry_run_touches_nothing() {
    let client = Arc::new(ScriptedStreamClient::new());
    let config = GeneratorConfig {
        dry_run: true,
        orgs_count: 3,
        ..config()
    };
    let (runner, _) = stream_runner(config, client.clone(), CancellationToken::new());

    let report = runner.run().await.unwrap();

    assert!(report.dry_run);
    assert!(report.orgs.is_empty());
    assert!(client.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn file_output_appends_events() {
    let dir = tempfile::tempdir().unwrap();
    let config = GeneratorConfig {
        run_for_secs: Some(130),
        output: streamgen_simulator::config::OutputSettings {
            kind: OutputKind::File,
            dir: dir.path().to_path_buf(),
        },
        ..config()
    };
    let stats = Arc::new(StatsRecorder::new());
    let factory = file_publisher_factory(
        dir.path().to_path_buf(),
        stats.clone() as Arc<dyn MetricsSink>,
    );
    let runner = Runner::new(config, factory, stats, CancellationToken::new());

    let report = runner.run().await.unwrap();

    let content = std::fs::read_to_string(dir.path().join("it_heartbeat_message_1")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert!(lines.len() >= 10, "lines {}", lines.len());
    assert_eq!(lines.len() as u64, report.totals.records_delivered);
    for line in lines {
        let json: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(json["status"] == "UP" || json["status"] == "DOWN");
    }
}

#[tokio::test]
async fn from_config_rejects_invalid_config() {
    let config = GeneratorConfig {
        cases: Vec::new(),
        ..config()
    };
    let result = Runner::from_config(config, CancellationToken::new());
    assert!(matches!(result, Err(RunError::Config(_))));
}
