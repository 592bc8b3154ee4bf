//! Trigger runs end to end: provisioning, execution and journaling.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use skycast_core::{AppError, Config, ConfigError, LlmConfig};
use skycast_scheduler::ScheduledTask;
use skycast_services::store::Snapshot;
use skycast_services::{
    JournalClient, MemoryStore, RunJournal, RunOutcome, RunPhase, TriggerKind, WeatherStore,
};
use skycast_weather::{FieldStats, HourlyMeasurement, MeasurementTags};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    Config {
        llm: LlmConfig {
            api_key: "test-key".to_string(),
            api_url: format!("{}/v1/chat/completions", server.uri()),
            max_retries: 0,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn fresh_store(hours: &[i64]) -> WeatherStore {
    let now = Utc::now();
    let measurements = hours
        .iter()
        .map(|h| {
            let mut fields = BTreeMap::new();
            fields.insert(
                "temperature".to_string(),
                FieldStats::new(3.0, 7.0, 5.0 + *h as f64),
            );
            HourlyMeasurement {
                timestamp: now - Duration::hours(*h),
                tags: MeasurementTags {
                    location: Some("Backyard".to_string()),
                },
                fields,
            }
        })
        .collect();

    WeatherStore::memory(MemoryStore::new(Snapshot {
        hourly_measurements: measurements,
        ..Default::default()
    }))
}

async fn mount_report(server: &MockServer, expected_calls: u64) {
    let content = serde_json::json!({
        "prediction_12h": {"temperature": {"min": 4.0, "max": 8.0}},
        "prediction_24h": {"temperature": {"min": 2.0, "max": 9.0}},
        "reasoning": "Boop! Cooling off.",
        "confidence": 0.65
    });
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content.to_string() } }]
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn journal() -> JournalClient {
    JournalClient::new(RunJournal::in_memory().unwrap())
}

#[tokio::test]
async fn test_scheduled_run_succeeds() {
    let server = MockServer::start().await;
    mount_report(&server, 1).await;

    let store = fresh_store(&[1, 4, 9]);
    let journal = journal();
    let task = ScheduledTask::new(config_for(&server), journal.clone()).with_store(store.clone());

    let prediction = task.run(TriggerKind::Scheduled).await.unwrap();
    assert_eq!(prediction.location, "Backyard");
    assert_eq!(prediction.confidence, 0.65);

    let stored = store.latest_prediction().await.unwrap().unwrap();
    assert_eq!(stored, prediction);

    let runs = journal.recent(5).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].trigger, TriggerKind::Scheduled);
    assert_eq!(runs[0].phase, RunPhase::Execute);
    assert_eq!(runs[0].outcome, RunOutcome::Succeeded);
    assert!(runs[0].finished_at.is_some());
}

#[tokio::test]
async fn test_missing_api_key_fails_before_execution() {
    let server = MockServer::start().await;
    mount_report(&server, 0).await;

    let mut config = config_for(&server);
    config.llm.api_key = String::new();

    let journal = journal();
    let task = ScheduledTask::new(config, journal.clone()).with_store(fresh_store(&[1]));

    let err = task.run(TriggerKind::Manual).await.unwrap_err();
    match &err {
        AppError::Config(ConfigError::MissingSetting(msg)) => {
            assert!(msg.contains("LLM_API_KEY"), "unexpected message: {msg}")
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let run = &journal.recent(1).await.unwrap()[0];
    assert_eq!(run.trigger, TriggerKind::Manual);
    assert_eq!(run.phase, RunPhase::Provision);
    assert_eq!(run.outcome, RunOutcome::Failed);
}

#[tokio::test]
async fn test_missing_mongo_uri_names_variable() {
    let server = MockServer::start().await;
    mount_report(&server, 0).await;

    let task = ScheduledTask::new(config_for(&server), journal());
    let err = task.provision().await.err().unwrap();

    assert!(err.to_string().contains("MONGO_URI"));
}

#[tokio::test]
async fn test_empty_window_fails_in_execution() {
    let server = MockServer::start().await;
    mount_report(&server, 0).await;

    let journal = journal();
    let task = ScheduledTask::new(config_for(&server), journal.clone()).with_store(fresh_store(&[30]));

    let err = task.run(TriggerKind::Scheduled).await.unwrap_err();
    assert!(matches!(err, AppError::NoMeasurements { hours: 12 }));

    let run = &journal.recent(1).await.unwrap()[0];
    assert_eq!(run.phase, RunPhase::Execute);
    assert_eq!(run.outcome, RunOutcome::Failed);
    assert_eq!(
        run.message.as_deref(),
        Some("No hourly measurements found for the last 12 hours")
    );
}

#[tokio::test]
async fn test_scheduled_run_ignores_recent_prediction() {
    let server = MockServer::start().await;
    mount_report(&server, 2).await;

    let store = fresh_store(&[2, 3]);
    let task = ScheduledTask::new(config_for(&server), journal()).with_store(store);

    let first = task.run(TriggerKind::Scheduled).await.unwrap();
    let second = task.run(TriggerKind::Manual).await.unwrap();
    assert!(second.created_at >= first.created_at);
}

#[tokio::test]
async fn test_broken_journal_does_not_stop_the_run() {
    let server = MockServer::start().await;
    mount_report(&server, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runs.db");
    let journal = JournalClient::new(RunJournal::open(&path).unwrap());
    rusqlite::Connection::open(&path)
        .unwrap()
        .execute_batch("DROP TABLE runs")
        .unwrap();
    assert!(journal.recent(1).await.is_err());

    let store = fresh_store(&[1, 2]);
    let task = ScheduledTask::new(config_for(&server), journal).with_store(store.clone());

    let prediction = task.run(TriggerKind::Scheduled).await.unwrap();
    assert_eq!(prediction.location, "Backyard");
    assert_eq!(store.latest_prediction().await.unwrap(), Some(prediction));
}

#[tokio::test]
async fn test_invalid_setting_is_not_reported_as_missing() {
    let server = MockServer::start().await;
    mount_report(&server, 0).await;

    let mut config = config_for(&server);
    config.llm.model = "   ".to_string();
    config.llm.timeout_secs = 0;

    let task = ScheduledTask::new(config, journal()).with_store(fresh_store(&[1]));
    let err = task.provision().await.err().unwrap();
    assert!(
        matches!(err, AppError::Config(ConfigError::Invalid(_))),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_oversized_window_is_rejected_before_execution() {
    let server = MockServer::start().await;
    mount_report(&server, 0).await;

    let mut config = config_for(&server);
    config.schedule.hours_to_analyze = u32::MAX;

    let journal = journal();
    let task = ScheduledTask::new(config, journal.clone()).with_store(fresh_store(&[1]));

    let err = task.run(TriggerKind::Manual).await.unwrap_err();
    assert!(matches!(err, AppError::Config(ConfigError::Invalid(_))));
    assert_eq!(journal.recent(1).await.unwrap()[0].phase, RunPhase::Provision);
}
