mod common;

use std::sync::Arc;
use std::time::Duration;

use casebook_lib::application::services::{OrchestratorState, SyncOrchestrator};
use casebook_lib::shared::config::AppConfig;
use casebook_lib::state::AppState;
use common::{Fault, enqueue_narrative, memory_harness, zero_delay_policy};

async fn wait_until_drained(orchestrator: &SyncOrchestrator) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while orchestrator.pending_count().await.expect("count") > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue drained in time");
}

#[tokio::test]
async fn foreground_trigger_drains_once_back_online() {
    let harness = memory_harness(zero_delay_policy(5)).await;
    let orchestrator = SyncOrchestrator::new(
        harness.manager.clone(),
        Arc::new(harness.connectivity.clone()),
    );
    harness.connectivity.set_reachable(false);
    enqueue_narrative(&harness.manager, "42", "filed from the field").await;

    let offline = orchestrator.trigger_foreground().await.expect("offline trigger");
    assert!(offline.was_skipped());
    assert_eq!(harness.server.call_count(), 0);

    harness.connectivity.set_reachable(true);
    let online = orchestrator.trigger_foreground().await.expect("online trigger");
    assert_eq!(online.succeeded, 1);
    assert_eq!(orchestrator.pending_count().await.expect("count"), 0);
}

#[tokio::test]
async fn periodic_schedule_retries_until_confirmed() {
    let harness = memory_harness(zero_delay_policy(5)).await;
    harness
        .server
        .push_faults(Fault::Retryable("HTTP 502".into()), 2);
    let orchestrator = SyncOrchestrator::new(
        harness.manager.clone(),
        Arc::new(harness.connectivity.clone()),
    );
    let mut states = orchestrator.subscribe_state();
    enqueue_narrative(&harness.manager, "42", "note").await;

    orchestrator
        .start_periodic(Duration::from_millis(15))
        .expect("start");
    assert_eq!(*states.borrow_and_update(), OrchestratorState::Scheduled);

    wait_until_drained(&orchestrator).await;
    assert_eq!(harness.server.call_count(), 3);

    orchestrator.stop();
    assert_eq!(orchestrator.state(), OrchestratorState::Stopped);

    enqueue_narrative(&harness.manager, "43", "after stop").await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(orchestrator.pending_count().await.expect("count"), 1);
}

#[tokio::test]
async fn app_state_wires_engine_from_config() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite:{}?mode=rwc", dir.path().join("app.db").display());
    config.sync.auto_sync = false;

    let state = AppState::with_config(config).await.expect("app state");

    assert_eq!(state.orchestrator.state(), OrchestratorState::Stopped);
    assert_eq!(state.sync_queue.pending_count().await.expect("count"), 0);

    let report = state.orchestrator.sync_now().await.expect("sync now");
    assert!(report.was_skipped());

    state.shutdown().await;
}
